//! Detection Types
//!
//! Result types for rule evaluation.
//! KHÔNG chứa logic - chỉ data structures.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::error::RuleEvaluationError;
use super::record::ConnectionRecord;

// ============================================================================
// SEVERITY LEVELS
// ============================================================================

/// Severity attached to a rule (ordered Low < Critical)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSeverity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl RuleSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleSeverity::Low => "low",
            RuleSeverity::Medium => "medium",
            RuleSeverity::High => "high",
            RuleSeverity::Critical => "critical",
        }
    }

    pub fn is_high(&self) -> bool {
        matches!(self, RuleSeverity::High | RuleSeverity::Critical)
    }
}

impl std::fmt::Display for RuleSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// RULE STATUS
// ============================================================================

/// Per-rule verdict for one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum RuleStatus {
    Matched,
    NotMatched,
    /// Rule could not run on this batch
    Errored(RuleEvaluationError),
}

impl RuleStatus {
    pub fn is_matched(&self) -> bool {
        matches!(self, RuleStatus::Matched)
    }

    pub fn is_errored(&self) -> bool {
        matches!(self, RuleStatus::Errored(_))
    }
}

/// Outcome of one rule against one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub rule: String,
    pub severity: RuleSeverity,
    #[serde(flatten)]
    pub status: RuleStatus,
    /// Why the rule fired
    pub reason: Option<String>,
}

// ============================================================================
// EVALUATION RESULT
// ============================================================================

/// Every rule's outcome for a batch, in rule set order.
///
/// The batch is borrowed for the lifetime of the result and never copied.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult<'a> {
    #[serde(skip)]
    pub batch: &'a [ConnectionRecord],
    pub batch_size: usize,
    pub outcomes: Vec<RuleOutcome>,
}

impl<'a> EvaluationResult<'a> {
    pub fn new(batch: &'a [ConnectionRecord], outcomes: Vec<RuleOutcome>) -> Self {
        Self {
            batch,
            batch_size: batch.len(),
            outcomes,
        }
    }

    /// Names of rules that fired
    pub fn matched(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.status.is_matched())
            .map(|o| o.rule.as_str())
            .collect()
    }

    /// Matched names as an order-free set
    pub fn matched_set(&self) -> BTreeSet<String> {
        self.matched().into_iter().map(str::to_string).collect()
    }

    /// Rules that could not run, with their errors
    pub fn errored(&self) -> Vec<(&str, &RuleEvaluationError)> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.status {
                RuleStatus::Errored(e) => Some((o.rule.as_str(), e)),
                _ => None,
            })
            .collect()
    }

    pub fn outcome(&self, rule: &str) -> Option<&RuleOutcome> {
        self.outcomes.iter().find(|o| o.rule == rule)
    }

    pub fn is_match(&self, rule: &str) -> bool {
        self.outcome(rule).map_or(false, |o| o.status.is_matched())
    }

    pub fn has_matches(&self) -> bool {
        self.outcomes.iter().any(|o| o.status.is_matched())
    }

    pub fn has_errors(&self) -> bool {
        self.outcomes.iter().any(|o| o.status.is_errored())
    }

    /// Highest severity among matched rules
    pub fn highest_severity(&self) -> Option<RuleSeverity> {
        self.outcomes
            .iter()
            .filter(|o| o.status.is_matched())
            .map(|o| o.severity)
            .max()
    }
}
