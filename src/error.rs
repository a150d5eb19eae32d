//! Error types for cerrojo lock stores

/// Error type for lock store operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Raised when a lock is released by someone who does not hold it,
    /// including when no lock exists for the key at all.
    #[error("lock '{key}' is not owned by '{owner}'")]
    ReleaseNotOwned { key: String, owner: String },

    #[error("'{0}' is not implemented by this store")]
    Unimplemented(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub type Result<T> = std::result::Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LockError::ReleaseNotOwned {
            key: "job:42".to_string(),
            owner: "worker-2".to_string(),
        };
        assert_eq!(err.to_string(), "lock 'job:42' is not owned by 'worker-2'");

        let err = LockError::Unimplemented("extend");
        assert_eq!(err.to_string(), "'extend' is not implemented by this store");
    }

    #[test]
    fn test_from_db_err() {
        let err: LockError = sea_orm::DbErr::Custom("boom".to_string()).into();
        assert!(matches!(err, LockError::Database(_)));
    }
}
