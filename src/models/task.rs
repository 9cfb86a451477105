//! Priority task model for the durable operator queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An operator-submitted command awaiting delivery to every open session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriorityTask {
    /// Store-assigned identifier; ascending in insertion order.
    pub id: i64,
    /// Shell command text, delivered verbatim.
    pub command: String,
    /// Enqueue timestamp.
    pub created_at: DateTime<Utc>,
}
