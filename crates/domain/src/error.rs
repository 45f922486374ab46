//! Unified error type for the domain layer.

use thiserror::Error;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone)]
pub enum DomainError {
    /// Validation failed (e.g., invalid field values)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Parse error (for value objects and wire payloads)
    #[error("Parse error: {0}")]
    Parse(String),

    /// State transition not allowed
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

impl DomainError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create an invalid state transition error
    pub fn invalid_state_transition(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = DomainError::validation("target level below current");
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "Validation failed: target level below current"
        );
    }

    #[test]
    fn test_not_found_error() {
        let err = DomainError::not_found("ItemDetail", "/items/cheese_sword");
        assert!(matches!(err, DomainError::NotFound { .. }));
        assert!(err.to_string().contains("ItemDetail"));
        assert!(err.to_string().contains("/items/cheese_sword"));
    }

    #[test]
    fn test_invalid_state_transition() {
        let err = DomainError::invalid_state_transition("completed session cannot record attempts");
        assert!(err
            .to_string()
            .contains("completed session cannot record attempts"));
    }
}
