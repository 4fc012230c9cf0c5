//! ストア境界のエラー型。

use thiserror::Error;

/// Errors returned by every store call. Callers decide whether a failure degrades the
/// feed or aborts it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("postgres query failed: {0}")]
    Postgres(#[from] sqlx::Error),
    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("malformed {what} in store: {detail}")]
    Malformed { what: &'static str, detail: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    #[must_use]
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::Unavailable(detail.into())
    }

    /// 接続断やプール枯渇など、再計算で回復しうる一時的な失敗かどうか。
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Postgres(error) => matches!(
                error,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            Self::Redis(error) => {
                error.is_timeout() || error.is_connection_dropped() || error.is_io_error()
            }
            Self::Unavailable(_) => true,
            Self::Malformed { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_transient() {
        assert!(StoreError::unavailable("redis down").is_transient());
    }

    #[test]
    fn malformed_is_not_transient() {
        let error = StoreError::Malformed {
            what: "post id",
            detail: "not-a-uuid".to_string(),
        };
        assert!(!error.is_transient());
        assert_eq!(
            error.to_string(),
            "malformed post id in store: not-a-uuid"
        );
    }

    #[test]
    fn row_not_found_is_not_transient() {
        let error = StoreError::from(sqlx::Error::RowNotFound);
        assert!(!error.is_transient());
    }
}
