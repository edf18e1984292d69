use thiserror::Error;

#[derive(Debug, Error)]
pub enum SrsError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("theme {0} not found")]
    NotFound(i64),

    #[error("last review is not reversible (only the most recent same-day review can be undone)")]
    NotReversible,

    #[error("concurrent modification detected; retry the whole operation")]
    ConcurrentModification,

    #[error("storage unavailable: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for SrsError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(
                    err.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                SrsError::ConcurrentModification
            }
            _ => SrsError::Storage(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SrsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_maps_to_concurrent_modification() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(matches!(
            SrsError::from(busy),
            SrsError::ConcurrentModification
        ));
    }

    #[test]
    fn other_sqlite_errors_map_to_storage() {
        let e = rusqlite::Error::QueryReturnedNoRows;
        assert!(matches!(SrsError::from(e), SrsError::Storage(_)));
    }
}
