//! Error types for the dialer
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in the dispatcher core
#[derive(Debug, Error)]
pub enum DialerError {
    /// Campaign not found in storage
    #[error("Campaign not found: {0}")]
    CampaignNotFound(i64),

    /// Call not found in storage
    #[error("Call not found: {0}")]
    CallNotFound(i64),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for dispatcher operations
pub type Result<T> = std::result::Result<T, DialerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_campaign_not_found_error() {
        let err = DialerError::CampaignNotFound(7);
        assert_eq!(err.to_string(), "Campaign not found: 7");
    }

    #[test]
    fn test_storage_error() {
        let err = DialerError::Storage("lock poisoned".to_string());
        assert_eq!(err.to_string(), "Storage error: lock poisoned");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: DialerError = io_err.into();
        assert!(matches!(err, DialerError::Io(_)));
        assert_eq!(err.to_string(), "IO error: read-only");
    }

    #[test]
    fn test_sqlite_error_conversion() {
        let err: DialerError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, DialerError::Database(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(DialerError::CallNotFound(1))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
