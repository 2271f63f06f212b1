use sqlx::PgPool;

use crate::app_error::AppError;

pub mod subscriber;

const MAX_JSON_LOG_LEN: usize = 200;

/// Parse JSON value to target type, logging warning on failure.
///
/// Handles NULL gracefully (returns default without logging).
/// Only logs warnings for actual parse failures (type mismatches, corruption).
pub fn parse_json_with_fallback<T: serde::de::DeserializeOwned + Default>(
    json: &serde_json::Value,
    field_name: &str,
    entity_type: &str,
    entity_id: &str,
) -> T {
    // SQL NULL becomes Value::Null - treat as valid empty state, no warning
    if json.is_null() {
        return T::default();
    }

    serde_json::from_value(json.clone()).unwrap_or_else(|err| {
        let raw_str = json.to_string();
        let truncated = match raw_str.char_indices().nth(MAX_JSON_LOG_LEN) {
            Some((cut, _)) => format!("{}...", &raw_str[..cut]),
            None => raw_str,
        };

        tracing::warn!(
            field = field_name,
            entity_type = entity_type,
            entity_id = entity_id,
            raw_json = %truncated,
            error = %err,
            "Failed to parse JSON field, using default value"
        );
        T::default()
    })
}

#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    pub fn new(pool: PgPool) -> Self {
        PostgresPersistence { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound,
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                if msg.contains("null value") && msg.contains("violates not-null") {
                    AppError::InvalidInput("Required field is missing".into())
                } else if msg.contains("violates check constraint") {
                    AppError::InvalidInput("Billing value out of range".into())
                } else {
                    tracing::error!(error = ?err, "Database error");
                    AppError::Database("Database operation failed".into())
                }
            }
            _ => {
                tracing::error!(error = ?err, "Database error");
                AppError::Database("Database operation failed".into())
            }
        }
    }
}
