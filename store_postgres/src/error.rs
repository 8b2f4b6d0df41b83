use thiserror::Error;

#[derive(Debug, Error)]
pub enum PostgresStoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("schema migration failed: {0}")]
    Migration(String),

    #[error("value out of range for {field}: {value}")]
    OutOfRange { field: &'static str, value: i64 },
}

impl PostgresStoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Sqlx(sqlx::Error::Io(_))
                | Self::Sqlx(sqlx::Error::PoolTimedOut)
                | Self::Sqlx(sqlx::Error::PoolClosed)
        )
    }
}

impl From<PostgresStoreError> for ballot_store::StoreError {
    fn from(e: PostgresStoreError) -> Self {
        if e.is_unavailable() {
            ballot_store::StoreError::Unavailable(e.to_string())
        } else {
            ballot_store::StoreError::Backend(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballot_store::StoreError;

    #[test]
    fn pool_timeout_is_unavailable() {
        let err = PostgresStoreError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(StoreError::from(err), StoreError::Unavailable(_)));
    }

    #[test]
    fn row_errors_are_backend_errors() {
        let err = PostgresStoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(StoreError::from(err), StoreError::Backend(_)));
    }
}
