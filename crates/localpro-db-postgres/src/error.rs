//! Error types for the PostgreSQL target stores.

use localpro_reconcile::RepositoryError;
use sqlx_core::error::Error as SqlxError;

#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Connection-level failures, as opposed to a rejected statement.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            PostgresError::Database(
                SqlxError::Io(_)
                    | SqlxError::Tls(_)
                    | SqlxError::PoolTimedOut
                    | SqlxError::PoolClosed
                    | SqlxError::WorkerCrashed
            )
        )
    }
}

impl From<PostgresError> for RepositoryError {
    fn from(err: PostgresError) -> Self {
        if err.is_unavailable() {
            RepositoryError::unavailable(err.to_string())
        } else {
            RepositoryError::query(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, PostgresError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_unavailable() {
        let err: RepositoryError = PostgresError::from(SqlxError::PoolTimedOut).into();
        assert!(matches!(err, RepositoryError::Unavailable(_)));

        let err: RepositoryError = PostgresError::from(SqlxError::RowNotFound).into();
        assert!(matches!(err, RepositoryError::Query(_)));
    }
}
