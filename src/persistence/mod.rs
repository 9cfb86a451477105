//! Persistence layer modules.

pub mod db;
pub mod endpoint_repo;
pub mod schema;
pub mod task_repo;
