//! Rule Evaluator
//!
//! CHỈ chứa logic evaluate - không có types definitions.
//! Input: batch of ConnectionRecord + RuleSet + EvaluatorConfig
//! Output: EvaluationResult
//!
//! The active RuleSet sits behind `RwLock<Arc<_>>`. An evaluation clones
//! the Arc once and runs lock-free on that snapshot, so a concurrent
//! `replace_rules` is seen either entirely or not at all.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rayon::prelude::*;

use super::config::{ErrorPolicy, EvaluatorConfig};
use super::error::RuleEvaluationError;
use super::record::ConnectionRecord;
use super::rules::Rule;
use super::ruleset::RuleSet;
use super::types::{EvaluationResult, RuleOutcome, RuleStatus};

// ============================================================================
// STATE
// ============================================================================

static EVALUATOR: Lazy<RuleEvaluator> = Lazy::new(|| {
    RuleEvaluator::with_config(RuleSet::builtin(), EvaluatorConfig::from_env())
});

// ============================================================================
// MAIN EVALUATION FUNCTION
// ============================================================================

/// Evaluate every rule against the batch with default options
pub fn evaluate<'a>(batch: &'a [ConnectionRecord], rules: &RuleSet) -> EvaluationResult<'a> {
    evaluate_with_config(batch, rules, &EvaluatorConfig::default())
}

/// Evaluate every rule against the batch.
///
/// Outcomes are listed in rule set order whether or not the rules ran
/// in parallel.
pub fn evaluate_with_config<'a>(
    batch: &'a [ConnectionRecord],
    rules: &RuleSet,
    config: &EvaluatorConfig,
) -> EvaluationResult<'a> {
    let policy = config.error_policy;
    let fan_out = config.parallel && rules.len() >= config.parallel_min_rules && rules.len() > 1;

    let outcomes: Vec<RuleOutcome> = if fan_out {
        rules
            .as_slice()
            .par_iter()
            .map(|rule| run_rule(rule.as_ref(), batch, policy))
            .collect()
    } else {
        rules.iter().map(|rule| run_rule(rule, batch, policy)).collect()
    };

    let result = EvaluationResult::new(batch, outcomes);
    log::debug!(
        "Evaluated {} rules on {} records: {} matched, {} errored",
        rules.len(),
        batch.len(),
        result.matched().len(),
        result.errored().len()
    );
    result
}

/// Run one rule, containing its errors (and panics) to its own outcome
fn run_rule(rule: &dyn Rule, batch: &[ConnectionRecord], policy: ErrorPolicy) -> RuleOutcome {
    let verdict = catch_unwind(AssertUnwindSafe(|| rule.evaluate(batch))).unwrap_or_else(|_| {
        Err(RuleEvaluationError::Custom(format!("rule '{}' panicked", rule.name())))
    });

    let (status, reason) = match verdict {
        Ok(Some(reason)) => {
            log::debug!("Rule '{}' matched: {}", rule.name(), reason);
            (RuleStatus::Matched, Some(reason))
        }
        Ok(None) => (RuleStatus::NotMatched, None),
        Err(e) => {
            log::warn!("Rule '{}' could not be evaluated: {}", rule.name(), e);
            match policy {
                ErrorPolicy::Report => (RuleStatus::Errored(e), None),
                ErrorPolicy::TreatAsNotMatched => (RuleStatus::NotMatched, None),
            }
        }
    };

    RuleOutcome {
        rule: rule.name().to_string(),
        severity: rule.severity(),
        status,
        reason,
    }
}

// ============================================================================
// RULE EVALUATOR
// ============================================================================

/// Holds the active rule set; safe to share across threads
pub struct RuleEvaluator {
    rules: RwLock<Arc<RuleSet>>,
    config: EvaluatorConfig,
}

impl RuleEvaluator {
    pub fn new(rules: RuleSet) -> Self {
        Self::with_config(rules, EvaluatorConfig::default())
    }

    pub fn with_config(rules: RuleSet, config: EvaluatorConfig) -> Self {
        Self {
            rules: RwLock::new(Arc::new(rules)),
            config,
        }
    }

    /// Evaluate against a snapshot of the current rule set
    pub fn evaluate<'a>(&self, batch: &'a [ConnectionRecord]) -> EvaluationResult<'a> {
        let snapshot = self.rules();
        evaluate_with_config(batch, &snapshot, &self.config)
    }

    /// Swap in a whole new rule set, returning the previous one
    pub fn replace_rules(&self, rules: RuleSet) -> Arc<RuleSet> {
        let names = rules.names().join(", ");
        let previous = std::mem::replace(&mut *self.rules.write(), Arc::new(rules));
        log::info!("Rule set replaced: [{}]", names);
        previous
    }

    /// Current rule set snapshot
    pub fn rules(&self) -> Arc<RuleSet> {
        Arc::clone(&*self.rules.read())
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::new(RuleSet::builtin())
    }
}

// ============================================================================
// PUBLIC API (process-wide evaluator)
// ============================================================================

/// Evaluate with the process-wide rule set
pub fn evaluate_global(batch: &[ConnectionRecord]) -> EvaluationResult<'_> {
    EVALUATOR.evaluate(batch)
}

/// Replace the process-wide rule set
pub fn reload(rules: RuleSet) -> Arc<RuleSet> {
    EVALUATOR.replace_rules(rules)
}

pub fn global_rules() -> Arc<RuleSet> {
    EVALUATOR.rules()
}

// ============================================================================
// TESTS
// ============================================================================
