//! Error types for topicsim
//!
//! Steady-state operations (produce, tick, metrics reads) never fail: caller
//! facing degradations are expressed as fallbacks or logged no-ops. The
//! error type exists for configuration validation and strict lookups.

use thiserror::Error;

/// Result type alias for topicsim operations
pub type Result<T> = std::result::Result<T, SimError>;

/// Main error type for topicsim
#[derive(Error, Debug)]
pub enum SimError {
    #[error("invalid partition count: {0}")]
    InvalidPartitionCount(u32),

    #[error("invalid consumer count for group {group}: {count}")]
    InvalidConsumerCount { group: String, count: u32 },

    #[error("unknown consumer group: {0}")]
    UnknownGroup(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::InvalidPartitionCount(0);
        assert_eq!(err.to_string(), "invalid partition count: 0");

        let err = SimError::InvalidConsumerCount {
            group: "billing-service".to_string(),
            count: 0,
        };
        assert!(err.to_string().contains("billing-service"));

        let err = SimError::UnknownGroup("ghost".to_string());
        assert_eq!(err.to_string(), "unknown consumer group: ghost");
    }
}
