//! PostgreSQL-backed signing key repository
//!
//! Records live in the `signing` table, one column per key field. Single-record
//! read-modify-write and rotation run inside a transaction holding a row lock
//! (`SELECT ... FOR UPDATE`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPool, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::debug;

use crate::domain::signing_key::{
    signature_hint, KeyFilter, KeyMutation, RotationGuard, Scope, SigningKey,
    SigningKeyRepository,
};
use crate::domain::DomainError;

const COLUMNS: &str = r#"signature, email, scope, active, rotated, "timestamp", expiration, expiration_int, request_count, last_request_time, previous_key"#;

/// PostgreSQL implementation of SigningKeyRepository
#[derive(Debug, Clone)]
pub struct PostgresSigningKeyRepository {
    pool: PgPool,
}

impl PostgresSigningKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a filtered query selecting `projection`
    fn filtered_query(projection: &str, filter: &KeyFilter) -> QueryBuilder<'static, Postgres> {
        let mut builder =
            QueryBuilder::new(format!("SELECT {} FROM signing WHERE TRUE", projection));

        if let Some(active) = filter.active {
            builder.push(" AND active = ").push_bind(active);
        }

        if !filter.scopes.is_empty() {
            builder
                .push(" AND scope @> ")
                .push_bind(Json(filter.scopes.to_vec()));
        }

        if let Some(ref email) = filter.email {
            builder.push(" AND email = ").push_bind(email.clone());
        }

        if let Some(ref previous_key) = filter.previous_key {
            builder
                .push(" AND previous_key = ")
                .push_bind(previous_key.clone());
        }

        if let Some(cutoff) = filter.expires_at_or_before {
            builder.push(" AND expiration <= ").push_bind(cutoff);
        }

        builder.push(r#" ORDER BY "timestamp", signature"#);
        builder
    }

    fn insert_query(key: &SigningKey) -> Result<Query<'_, Postgres, PgArguments>, DomainError> {
        let query = sqlx::query(
            r#"
            INSERT INTO signing (
                signature, email, scope, active, rotated, "timestamp", expiration,
                expiration_int, request_count, last_request_time, previous_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (signature) DO NOTHING
            "#,
        )
        .bind(key.signature())
        .bind(key.email())
        .bind(Json(key.scope().to_vec()))
        .bind(key.is_active())
        .bind(key.is_rotated())
        .bind(key.timestamp())
        .bind(key.expiration())
        .bind(to_column(key.expiration_hours(), "expiration_int")?)
        .bind(to_column(key.request_count(), "request_count")?)
        .bind(key.last_request_time())
        .bind(key.previous_key());

        Ok(query)
    }
}

fn to_column(value: u32, column: &str) -> Result<i32, DomainError> {
    i32::try_from(value)
        .map_err(|_| DomainError::storage(format!("Value {} out of range for {}", value, column)))
}

fn from_column(value: i32, column: &str) -> Result<u32, DomainError> {
    u32::try_from(value)
        .map_err(|_| DomainError::storage(format!("Negative value {} stored in {}", value, column)))
}

fn read_row(row: &PgRow) -> Result<SigningKey, DomainError> {
    let column_error =
        |e: sqlx::Error| DomainError::storage(format!("Failed to read signing row: {}", e));

    let signature: String = row.try_get("signature").map_err(column_error)?;
    let email: Option<String> = row.try_get("email").map_err(column_error)?;
    let scope: Json<Vec<String>> = row.try_get("scope").map_err(column_error)?;
    let active: bool = row.try_get("active").map_err(column_error)?;
    let rotated: bool = row.try_get("rotated").map_err(column_error)?;
    let timestamp: DateTime<Utc> = row.try_get("timestamp").map_err(column_error)?;
    let expiration: DateTime<Utc> = row.try_get("expiration").map_err(column_error)?;
    let expiration_int: i32 = row.try_get("expiration_int").map_err(column_error)?;
    let request_count: i32 = row.try_get("request_count").map_err(column_error)?;
    let last_request_time: DateTime<Utc> =
        row.try_get("last_request_time").map_err(column_error)?;
    let previous_key: Option<String> = row.try_get("previous_key").map_err(column_error)?;

    Ok(SigningKey::new(signature, timestamp)
        .with_email(email)
        .with_scope(Scope::from(scope.0))
        .with_active(active)
        .with_rotated(rotated)
        .with_stored_expiration(expiration, from_column(expiration_int, "expiration_int")?)
        .with_request_state(
            from_column(request_count, "request_count")?,
            last_request_time,
        )
        .with_previous_key(previous_key))
}

#[async_trait]
impl SigningKeyRepository for PostgresSigningKeyRepository {
    async fn get(&self, signature: &str) -> Result<Option<SigningKey>, DomainError> {
        let query = format!("SELECT {} FROM signing WHERE signature = $1", COLUMNS);

        let row = sqlx::query(&query)
            .bind(signature)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get signing key: {}", e)))?;

        row.as_ref().map(read_row).transpose()
    }

    async fn exists(&self, signature: &str) -> Result<bool, DomainError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM signing WHERE signature = $1)")
            .bind(signature)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to check existence: {}", e)))
    }

    async fn insert(&self, key: SigningKey) -> Result<SigningKey, DomainError> {
        let result = Self::insert_query(&key)?
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to insert signing key: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::conflict(format!(
                "Signing key '{}' already exists",
                key.signature()
            )));
        }

        Ok(key)
    }

    async fn update_with(
        &self,
        signature: &str,
        mutation: KeyMutation<'_>,
    ) -> Result<Option<SigningKey>, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        let query = format!(
            "SELECT {} FROM signing WHERE signature = $1 FOR UPDATE",
            COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(signature)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to lock signing key: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut key = read_row(&row)?;

        // Dropping the transaction rolls it back
        mutation(&mut key)?;

        sqlx::query(
            r#"
            UPDATE signing
            SET email = $2, scope = $3, active = $4, rotated = $5, expiration = $6,
                expiration_int = $7, request_count = $8, last_request_time = $9,
                previous_key = $10
            WHERE signature = $1
            "#,
        )
        .bind(key.signature())
        .bind(key.email())
        .bind(Json(key.scope().to_vec()))
        .bind(key.is_active())
        .bind(key.is_rotated())
        .bind(key.expiration())
        .bind(to_column(key.expiration_hours(), "expiration_int")?)
        .bind(to_column(key.request_count(), "request_count")?)
        .bind(key.last_request_time())
        .bind(key.previous_key())
        .execute(&mut *tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to update signing key: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit update: {}", e)))?;

        Ok(Some(key))
    }

    async fn commit_rotation(
        &self,
        predecessor: &str,
        successor: SigningKey,
        guard: RotationGuard,
    ) -> Result<SigningKey, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        let query = format!(
            "SELECT {} FROM signing WHERE signature = $1 FOR UPDATE",
            COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(predecessor)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to lock signing key: {}", e)))?
            .ok_or_else(|| DomainError::key_not_found(predecessor))?;

        guard.check(&read_row(&row)?)?;

        sqlx::query("UPDATE signing SET active = FALSE, rotated = TRUE WHERE signature = $1")
            .bind(predecessor)
            .execute(&mut *tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to retire signing key: {}", e)))?;

        let inserted = Self::insert_query(&successor)?
            .execute(&mut *tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to insert successor: {}", e)))?;

        if inserted.rows_affected() == 0 {
            return Err(DomainError::conflict(format!(
                "Signing key '{}' already exists",
                successor.signature()
            )));
        }

        tx.commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit rotation: {}", e)))?;

        debug!(
            "Rotation committed: predecessor={}, successor={}",
            signature_hint(predecessor),
            signature_hint(successor.signature())
        );

        Ok(successor)
    }

    async fn find(&self, filter: &KeyFilter) -> Result<Vec<SigningKey>, DomainError> {
        let rows = Self::filtered_query(COLUMNS, filter)
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to query signing keys: {}", e)))?;

        rows.iter().map(read_row).collect()
    }

    async fn select_signatures(&self, filter: &KeyFilter) -> Result<Vec<String>, DomainError> {
        Self::filtered_query("signature", filter)
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to select signatures: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unfiltered_query() {
        let builder = PostgresSigningKeyRepository::filtered_query("signature", &KeyFilter::new());

        assert_eq!(
            builder.sql(),
            r#"SELECT signature FROM signing WHERE TRUE ORDER BY "timestamp", signature"#
        );
    }

    #[test]
    fn test_filtered_query_binds_every_criterion() {
        let cutoff = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let filter = KeyFilter::new()
            .with_active(true)
            .with_scopes(vec!["read", "test"])
            .with_email("owner@example.com")
            .with_previous_key("parent")
            .expiring_at_or_before(cutoff);

        let builder = PostgresSigningKeyRepository::filtered_query("signature", &filter);
        let sql = builder.sql();

        assert!(sql.contains("active = $1"));
        assert!(sql.contains("scope @> $2"));
        assert!(sql.contains("email = $3"));
        assert!(sql.contains("previous_key = $4"));
        assert!(sql.contains("expiration <= $5"));
    }

    #[test]
    fn test_column_conversion_bounds() {
        assert_eq!(to_column(24, "expiration_int").unwrap(), 24);
        assert!(to_column(u32::MAX, "expiration_int").is_err());
        assert_eq!(from_column(7, "request_count").unwrap(), 7);
        assert!(from_column(-1, "request_count").is_err());
    }
}
