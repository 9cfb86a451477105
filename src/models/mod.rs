//! Domain model module declarations.

pub mod endpoint;
pub mod task;
