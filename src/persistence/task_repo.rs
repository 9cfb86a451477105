//! Priority task repository for `SQLite` persistence.
//!
//! Every method is a single statement. Sessions race freely on the table;
//! two sessions may both read a task before either deletes it.

use std::sync::Arc;

use chrono::Utc;

use crate::models::task::PriorityTask;
use crate::{AppError, Result};

use super::db::Database;

/// Repository for pending priority tasks.
#[derive(Clone)]
pub struct TaskRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    command: String,
    created_at: String,
}

impl TaskRow {
    fn into_task(self) -> Result<PriorityTask> {
        let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);

        Ok(PriorityTask {
            id: self.id,
            command: self.command,
            created_at,
        })
    }
}

impl TaskRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Enqueue `command` as a new task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn insert(&self, command: &str) -> Result<PriorityTask> {
        let created_at = Utc::now();

        let result = sqlx::query("INSERT INTO priority_task (command, created_at) VALUES (?1, ?2)")
            .bind(command)
            .bind(created_at.to_rfc3339())
            .execute(self.db.as_ref())
            .await?;

        Ok(PriorityTask {
            id: result.last_insert_rowid(),
            command: command.to_owned(),
            created_at,
        })
    }

    /// List all pending tasks in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self) -> Result<Vec<PriorityTask>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT id, command, created_at FROM priority_task ORDER BY id ASC",
        )
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// Delete one task by identifier.
    ///
    /// Returns `false` when the task was already gone (another session
    /// drained it first).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM priority_task WHERE id = ?1")
            .bind(id)
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every task whose text equals `command`.
    ///
    /// Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete_by_command(&self, command: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM priority_task WHERE command = ?1")
            .bind(command)
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}
