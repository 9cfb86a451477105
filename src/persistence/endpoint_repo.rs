//! Endpoint repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::endpoint::{EndpointAddress, EndpointRecord, IdentityField};
use crate::{AppError, Result};

use super::db::Database;

/// Repository for endpoint identity records.
#[derive(Clone)]
pub struct EndpointRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct EndpointRow {
    ip: String,
    port: i64,
    first_seen: String,
    last_seen: String,
    uname: Option<String>,
    user: Option<String>,
    nickname: Option<String>,
}

impl EndpointRow {
    fn into_record(self) -> Result<EndpointRecord> {
        let port = u16::try_from(self.port)
            .map_err(|_| AppError::Db(format!("invalid port: {}", self.port)))?;
        let ip = self
            .ip
            .parse()
            .map_err(|e| AppError::Db(format!("invalid ip '{}': {e}", self.ip)))?;

        Ok(EndpointRecord {
            address: EndpointAddress::new(std::net::SocketAddr::new(ip, port)),
            first_seen: parse_timestamp(&self.first_seen)?,
            last_seen: parse_timestamp(&self.last_seen)?,
            uname: self.uname,
            user: self.user,
            nickname: self.nickname,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid timestamp: {e}")))
}

/// Fixed update statement per identity field.
fn update_statement(field: IdentityField) -> &'static str {
    match field {
        IdentityField::Uname => "UPDATE endpoint SET uname = ?1 WHERE ip = ?2 AND port = ?3",
        IdentityField::User => "UPDATE endpoint SET user = ?1 WHERE ip = ?2 AND port = ?3",
        IdentityField::Nickname => {
            "UPDATE endpoint SET nickname = ?1 WHERE ip = ?2 AND port = ?3"
        }
    }
}

impl EndpointRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Ensure a record exists for `address`.
    ///
    /// A new address gets a stub with every identity field unset. An
    /// existing record only has `last_seen` refreshed; resolved fields are
    /// kept.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn upsert(&self, address: &EndpointAddress) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO endpoint (ip, port, first_seen, last_seen)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(ip, port) DO UPDATE SET last_seen = excluded.last_seen",
        )
        .bind(address.ip())
        .bind(i64::from(address.port()))
        .bind(&now)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Overwrite a single identity field on an existing record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no record exists for `address`, or
    /// `AppError::Db` if the update fails.
    pub async fn update_field(
        &self,
        address: &EndpointAddress,
        field: IdentityField,
        value: &str,
    ) -> Result<()> {
        let result = sqlx::query(update_statement(field))
            .bind(value)
            .bind(address.ip())
            .bind(i64::from(address.port()))
            .execute(self.db.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("endpoint {address}")));
        }
        Ok(())
    }

    /// Retrieve the record for `address`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or a row is malformed.
    pub async fn get(&self, address: &EndpointAddress) -> Result<Option<EndpointRecord>> {
        let row: Option<EndpointRow> = sqlx::query_as(
            "SELECT ip, port, first_seen, last_seen, uname, user, nickname
             FROM endpoint
             WHERE ip = ?1 AND port = ?2",
        )
        .bind(address.ip())
        .bind(i64::from(address.port()))
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(EndpointRow::into_record).transpose()
    }

    /// List every known endpoint, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or a row is malformed.
    pub async fn list(&self) -> Result<Vec<EndpointRecord>> {
        let rows: Vec<EndpointRow> = sqlx::query_as(
            "SELECT ip, port, first_seen, last_seen, uname, user, nickname
             FROM endpoint
             ORDER BY first_seen ASC, ip ASC, port ASC",
        )
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(EndpointRow::into_record).collect()
    }
}
