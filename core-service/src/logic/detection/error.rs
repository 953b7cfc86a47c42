//! Detection Errors
//!
//! Rule evaluation errors stay scoped to one rule; configuration errors
//! stay scoped to one rule definition.

use serde::Serialize;
use thiserror::Error;

// ============================================================================
// EVALUATION ERRORS
// ============================================================================

/// A single rule could not produce a verdict for a batch
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum RuleEvaluationError {
    /// Record at `index` lacks a field the rule reads
    #[error("record {index}: missing field '{field}'")]
    MissingField { index: usize, field: &'static str },

    /// Record at `index` carries a field value that cannot be interpreted
    #[error("record {index}: malformed {field} '{value}'")]
    MalformedField {
        index: usize,
        field: &'static str,
        value: String,
    },

    /// Failure reported by a caller-supplied predicate
    #[error("{0}")]
    Custom(String),
}

// ============================================================================
// CONFIGURATION ERRORS
// ============================================================================

/// A rule definition could not be turned into a rule
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("rule '{rule}': missing parameter '{parameter}'")]
    MissingParameter { rule: String, parameter: &'static str },

    #[error("rule '{rule}': invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        rule: String,
        parameter: &'static str,
        reason: String,
    },

    /// Entry is not shaped like a rule definition at all
    #[error("rule '{rule}': invalid definition: {reason}")]
    InvalidDefinition { rule: String, reason: String },

    #[error("duplicate rule name '{0}'")]
    DuplicateRule(String),

    #[error("rule name must not be empty")]
    EmptyName,

    #[error("IO error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl From<std::io::Error> for ConfigurationError {
    fn from(err: std::io::Error) -> Self {
        ConfigurationError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigurationError {
    fn from(err: serde_json::Error) -> Self {
        ConfigurationError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RuleEvaluationError::MissingField { index: 3, field: "dst_port" };
        assert_eq!(err.to_string(), "record 3: missing field 'dst_port'");

        let err = ConfigurationError::MissingParameter {
            rule: "flood".to_string(),
            parameter: "max_records",
        };
        assert_eq!(err.to_string(), "rule 'flood': missing parameter 'max_records'");
    }

    #[test]
    fn test_serde_error_converts_to_parse() {
        let err: ConfigurationError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, ConfigurationError::Parse(_)));
    }
}
