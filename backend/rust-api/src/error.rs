use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by the progress, points and quiz engines.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// Metric/log label
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::NotFound(_) => "not_found",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::Storage(_) => "storage",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::Storage(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Failure inside an open transaction. Keeps write conflicts distinguishable so
/// the whole unit of work can be replayed.
#[derive(Debug)]
pub(crate) enum TxError {
    Store(StoreError),
    Engine(EngineError),
}

impl TxError {
    pub(crate) fn is_conflict(&self) -> bool {
        matches!(self, TxError::Store(StoreError::Conflict(_)))
    }
}

impl From<StoreError> for TxError {
    fn from(err: StoreError) -> Self {
        TxError::Store(err)
    }
}

impl From<EngineError> for TxError {
    fn from(err: EngineError) -> Self {
        TxError::Engine(err)
    }
}

impl From<TxError> for EngineError {
    fn from(err: TxError) -> Self {
        match err {
            TxError::Store(err) => err.into(),
            TxError::Engine(err) => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_become_storage_errors() {
        let err: EngineError = StoreError::Backend("connection reset".to_string()).into();
        assert_eq!(err.kind(), "storage");
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn only_store_conflicts_are_replayable() {
        assert!(TxError::from(StoreError::Conflict("dup".to_string())).is_conflict());
        assert!(!TxError::from(StoreError::Backend("down".to_string())).is_conflict());
        assert!(!TxError::from(EngineError::NotFound("quiz".to_string())).is_conflict());
    }
}
