//! Engine Error Taxonomy
//!
//! Validation, ownership and state errors go straight back to the caller.
//! Configuration and dependency errors are logged with context and only an
//! opaque message is exposed.

use thiserror::Error;

use crate::external::{CacheError, OracleError};
use crate::store::{MatchId, StoreError};

/// Why an operation is invalid for the current match state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateViolation {
    /// Match is already over.
    #[error("match already finalized")]
    Finalized,
    /// Health hit zero and the revive has not been consumed yet.
    #[error("revive pending; consume the revive before submitting")]
    RevivePending,
    /// A result for this round was already recorded.
    #[error("round {0} already submitted")]
    RoundAlreadySubmitted(u32),
    /// Revive requested while health is above zero.
    #[error("revive not available while health remains")]
    ReviveNotNeeded,
    /// Revive already consumed for this match.
    #[error("revive already used")]
    ReviveUsed,
    /// Not enough local energy to start a match.
    #[error("not enough energy")]
    OutOfEnergy,
    /// Local energy already at the cap.
    #[error("energy already full")]
    EnergyFull,
}

/// Engine errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Malformed input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Missing match, profile or record.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// What was looked up.
        entity: &'static str,
        /// Lookup key.
        key: String,
    },

    /// Caller does not own the match.
    #[error("match {0} is not owned by the caller")]
    Ownership(MatchId),

    /// Operation invalid for the current match state.
    #[error("invalid match state: {0}")]
    State(#[from] StateViolation),

    /// Missing or inconsistent tier/pool/item configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Persistence, cache or oracle call failed.
    #[error("dependency failed: {0}")]
    Dependency(String),
}

impl EngineError {
    /// Shorthand for a missing match.
    pub fn match_not_found(id: MatchId) -> Self {
        EngineError::NotFound {
            entity: "match",
            key: id.to_string(),
        }
    }

    /// Whether the error must be hidden behind an opaque message.
    pub fn is_internal(&self) -> bool {
        matches!(self, EngineError::Configuration(_) | EngineError::Dependency(_))
    }

    /// Message safe to show to a caller.
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            "internal failure, please retry later".to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        EngineError::Dependency(format!("store: {}", err))
    }
}

impl From<CacheError> for EngineError {
    fn from(err: CacheError) -> Self {
        EngineError::Dependency(format!("cache: {}", err))
    }
}

impl From<OracleError> for EngineError {
    fn from(err: OracleError) -> Self {
        EngineError::Dependency(format!("oracle: {}", err))
    }
}

/// Engine result alias.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_errors_are_opaque() {
        let err = EngineError::Configuration("no tier for 3 trophies".into());
        assert!(err.is_internal());
        assert!(!err.public_message().contains("tier"));

        let err: EngineError = StoreError::Unavailable("db down".into()).into();
        assert!(matches!(err, EngineError::Dependency(_)));
        assert!(!err.public_message().contains("db down"));
    }

    #[test]
    fn test_caller_errors_are_transparent() {
        let err = EngineError::from(StateViolation::Finalized);
        assert!(!err.is_internal());
        assert_eq!(err.public_message(), "invalid match state: match already finalized");

        let err = EngineError::Ownership(MatchId(42));
        assert!(err.public_message().contains("42"));
    }
}
