//! Detection Module
//!
//! Evaluates a set of named rules against a batch of connection records
//! and reports which rules fired. Rules are pure: a verdict depends only
//! on the batch handed in.
//!
//! ## Structure
//! - `types`: Result types (RuleSeverity, RuleStatus, RuleOutcome, EvaluationResult)
//! - `record`: ConnectionRecord, DestAddr and Protocol
//! - `error`: RuleEvaluationError, ConfigurationError
//! - `config`: Rule definitions and evaluator options (serde-loadable)
//! - `rules`: Rule trait and built-in predicates
//! - `ruleset`: Named rule registry and load reporting
//! - `engine`: RuleEvaluator and the process-wide instance
//!
//! ## Usage
//! ```ignore
//! use traffic_sentinel_core::detection::{RuleEvaluator, RuleSet, RuleSetConfig};
//!
//! let report = RuleSet::load(&RuleSetConfig::from_file("rules.json")?);
//! let evaluator = RuleEvaluator::new(report.rule_set);
//! let result = evaluator.evaluate(&batch);
//! for name in result.matched() {
//!     raise_alert(name);
//! }
//! ```

pub mod types;
pub mod record;
pub mod error;
pub mod config;
pub mod rules;
pub mod ruleset;
pub mod engine;


// Re-export main types for convenience
pub use types::{
    RuleSeverity,
    RuleStatus,
    RuleOutcome,
    EvaluationResult,
};

pub use record::{ConnectionRecord, DestAddr, Protocol};

pub use error::{RuleEvaluationError, ConfigurationError};

pub use config::{RuleDefinition, RuleParams, RuleEntry, RuleSetConfig, EvaluatorConfig, ErrorPolicy};

pub use rules::{
    Rule,
    HoneypotPortRule,
    HoneypotIpRule,
    ExcessiveVolumeRule,
    MultiTargetScanRule,
    PredicateRule,
    build_rule,
};

pub use ruleset::{RuleSet, LoadReport};

pub use engine::{
    evaluate,
    evaluate_with_config,
    RuleEvaluator,
    evaluate_global,
    reload,
    global_rules,
};
