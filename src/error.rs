use thiserror::Error;

/// Errors surfaced by the marketplace core.
///
/// Business-rule failures (`InvalidTransition` through `Validation`) are meant
/// for user-facing messaging. `Internal` wraps anything the lower layers did
/// not anticipate and always implies the operation was rolled back.
#[derive(Error, Debug)]
pub enum MarketError {
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: String, available: String },
    #[error("insufficient frozen funds: requested {requested}, frozen {frozen}")]
    InsufficientFrozen { requested: String, frozen: String },
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid configuration for `{key}`: {reason}")]
    InvalidConfiguration { key: String, reason: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("order {order_id} completed but settlement is pending: {source}")]
    SettlementPending {
        order_id: u64,
        #[source]
        source: Box<MarketError>,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl MarketError {
    /// True for failures caused by the caller's request rather than the system.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            MarketError::InvalidTransition(_)
                | MarketError::Forbidden(_)
                | MarketError::InsufficientBalance { .. }
                | MarketError::InsufficientFrozen { .. }
                | MarketError::AlreadyExists(_)
                | MarketError::NotFound(_)
                | MarketError::Validation(_)
        )
    }

    /// True when repeating the same call may succeed without any state change by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MarketError::SettlementPending { .. } | MarketError::Conflict(_) | MarketError::Internal(_)
        )
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        MarketError::Internal(Box::new(std::io::Error::other(message.into())))
    }
}

impl From<serde_json::Error> for MarketError {
    fn from(e: serde_json::Error) -> Self {
        MarketError::Internal(Box::new(e))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for MarketError {
    fn from(e: rocksdb::Error) -> Self {
        MarketError::Internal(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(MarketError::Forbidden("x".into()).is_business());
        assert!(!MarketError::Forbidden("x".into()).is_retryable());
        assert!(MarketError::internal("boom").is_retryable());
        assert!(!MarketError::internal("boom").is_business());

        let pending = MarketError::SettlementPending {
            order_id: 7,
            source: Box::new(MarketError::internal("db down")),
        };
        assert!(pending.is_retryable());
        assert!(pending.to_string().contains("order 7"));
    }
}
