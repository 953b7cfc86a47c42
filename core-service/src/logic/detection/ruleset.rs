//! Rule Set
//!
//! Named rule registry. Names are unique and insertion order is kept
//! so that results are reported in a stable order.

use std::collections::HashMap;

use super::config::{RuleEntry, RuleSetConfig};
use super::error::ConfigurationError;
use super::rules::{build_rule, Rule};

// ============================================================================
// RULE SET
// ============================================================================

#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
    index: HashMap<String, usize>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four built-in rules with their example parameters
    pub fn builtin() -> Self {
        Self::load(&RuleSetConfig::default()).rule_set
    }

    /// Register a rule; names must be unique
    pub fn insert(&mut self, rule: Box<dyn Rule>) -> Result<(), ConfigurationError> {
        let name = rule.name().to_string();
        if name.trim().is_empty() {
            return Err(ConfigurationError::EmptyName);
        }
        if self.index.contains_key(&name) {
            return Err(ConfigurationError::DuplicateRule(name));
        }
        self.index.insert(name, self.rules.len());
        self.rules.push(rule);
        Ok(())
    }

    /// Builder form of `insert`
    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Result<Self, ConfigurationError> {
        self.insert(Box::new(rule))?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Rule> {
        self.index.get(name).map(|&i| self.rules[i].as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Rule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    pub(crate) fn as_slice(&self) -> &[Box<dyn Rule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Build every enabled definition, isolating failures per rule
    pub fn load(config: &RuleSetConfig) -> LoadReport {
        let mut report = LoadReport {
            rule_set: RuleSet::new(),
            errors: Vec::new(),
            skipped: Vec::new(),
            total: config.rules.len(),
        };

        for (position, entry) in config.rules.iter().enumerate() {
            let def = match entry {
                RuleEntry::Defined(def) => def,
                RuleEntry::Malformed(raw) => {
                    let name = entry.name(position);
                    let e = RuleEntry::diagnose(raw, &name);
                    log::warn!("Rejected rule '{}': {}", name, e);
                    report.errors.push((name, e));
                    continue;
                }
            };

            if !def.enabled {
                log::info!("Rule '{}' disabled, skipping", def.name);
                report.skipped.push(def.name.clone());
                continue;
            }

            let result = build_rule(def).and_then(|rule| report.rule_set.insert(rule));
            if let Err(e) = result {
                log::warn!("Rejected rule '{}' ({}): {}", def.name, def.params.kind(), e);
                report.errors.push((def.name.clone(), e));
            }
        }

        log::info!(
            "Loaded {} of {} rules ({} rejected, {} disabled)",
            report.loaded(),
            report.total,
            report.errors.len(),
            report.skipped.len()
        );

        report
    }
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet").field("rules", &self.names()).finish()
    }
}

// ============================================================================
// LOAD REPORT
// ============================================================================

/// Outcome of loading a rule file: what loaded and what did not
#[derive(Debug)]
pub struct LoadReport {
    pub rule_set: RuleSet,
    /// (rule name, reason) for every rejected definition
    pub errors: Vec<(String, ConfigurationError)>,
    /// Disabled definitions
    pub skipped: Vec<String>,
    /// Entries in the config, readable or not
    pub total: usize,
}

impl LoadReport {
    pub fn loaded(&self) -> usize {
        self.rule_set.len()
    }

    /// True when nothing was rejected
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_rule_set(self) -> RuleSet {
        self.rule_set
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{RULE_EXCESSIVE_VOLUME, RULE_HONEYPOT_IP, RULE_HONEYPOT_PORT, RULE_MULTI_TARGET_SCAN};
    use crate::logic::detection::config::{RuleDefinition, RuleParams};
    use crate::logic::detection::rules::HoneypotPortRule;
    use crate::logic::detection::types::RuleSeverity;
    use serde_json::json;

    #[test]
    fn test_builtin_rule_set() {
        let set = RuleSet::builtin();
        assert_eq!(set.names(), vec![
            RULE_HONEYPOT_PORT,
            RULE_HONEYPOT_IP,
            RULE_EXCESSIVE_VOLUME,
            RULE_MULTI_TARGET_SCAN,
        ]);
        assert!(set.get(RULE_HONEYPOT_IP).is_some());
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut set = RuleSet::new();
        set.insert(Box::new(HoneypotPortRule::new("trap", [23]))).unwrap();
        let err = set.insert(Box::new(HoneypotPortRule::new("trap", [25]))).unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateRule("trap".to_string()));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_load_partial_config() {
        let config = RuleSetConfig::new(vec![
            RuleDefinition::honeypot_port("trap", &[23]),
            RuleDefinition::new("flood", RuleSeverity::Medium, RuleParams::ExcessiveVolume {
                max_records: None,
                max_distinct: Some(json!(10)),
            }),
            RuleDefinition::multi_target_scan("scan", &[22], 3),
            RuleDefinition::honeypot_port("trap", &[21]),
        ]);

        let report = RuleSet::load(&config);
        assert_eq!(report.total, 4);
        assert_eq!(report.loaded(), 2);
        assert!(!report.is_complete());
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].0, "flood");
        assert!(matches!(report.errors[1].1, ConfigurationError::DuplicateRule(_)));
        assert_eq!(report.rule_set.names(), vec!["trap", "scan"]);
    }

    #[test]
    fn test_load_skips_disabled() {
        let mut disabled = RuleDefinition::honeypot_ip("decoy", &["1.2.3.4"]);
        disabled.enabled = false;
        let config = RuleSetConfig::new(vec![disabled]);

        let report = RuleSet::load(&config);
        assert!(report.is_complete());
        assert_eq!(report.loaded(), 0);
        assert_eq!(report.skipped, vec!["decoy".to_string()]);
    }

    #[test]
    fn test_empty_config() {
        let report = RuleSet::load(&RuleSetConfig::new(vec![]));
        assert!(report.rule_set.is_empty());
        assert!(report.is_complete());
    }

    /// A badly typed parameter rejects only its own rule
    #[test]
    fn test_load_isolates_mistyped_parameter() {
        let json = r#"{ "rules": [
            { "name": "trap", "kind": "honeypot_port", "ports": [23] },
            { "name": "flood", "kind": "excessive_volume", "max_records": "many", "max_distinct": 10 }
        ] }"#;
        let report = RuleSet::load(&RuleSetConfig::from_json_str(json).unwrap());

        assert_eq!(report.loaded(), 1);
        assert_eq!(report.total, 2);
        assert_eq!(report.rule_set.names(), vec!["trap"]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, "flood");
        assert!(matches!(
            report.errors[0].1,
            ConfigurationError::InvalidParameter { parameter: "max_records", .. }
        ));
    }

    #[test]
    fn test_load_reports_each_bad_entry() {
        let json = r#"{ "rules": [
            { "name": "fractional", "kind": "excessive_volume", "max_records": 10.5, "max_distinct": 10 },
            { "name": "text_port", "kind": "honeypot_port", "ports": ["23"] },
            { "name": "huge", "kind": "multi_target_scan", "ports": [22], "max_targets": 99999999999999999999 },
            { "name": "teleport", "kind": "teleport" },
            { "kind": "honeypot_port", "ports": [23] },
            { "name": "no_kind" },
            "not a rule",
            { "name": "ok", "kind": "honeypot_ip", "addresses": ["1.2.3.4"] }
        ] }"#;
        let report = RuleSet::load(&RuleSetConfig::from_json_str(json).unwrap());

        assert_eq!(report.total, 8);
        assert_eq!(report.loaded(), 1);
        assert_eq!(report.rule_set.names(), vec!["ok"]);

        let by_name: HashMap<_, _> = report.errors.iter().map(|(n, e)| (n.as_str(), e)).collect();
        assert_eq!(by_name.len(), 7);
        assert!(matches!(by_name["fractional"], ConfigurationError::InvalidParameter { parameter: "max_records", .. }));
        assert!(matches!(by_name["text_port"], ConfigurationError::InvalidParameter { parameter: "ports", .. }));
        assert!(matches!(by_name["huge"], ConfigurationError::InvalidParameter { parameter: "max_targets", .. }));
        assert!(matches!(by_name["teleport"], ConfigurationError::InvalidParameter { parameter: "kind", .. }));
        assert!(matches!(by_name["rule #5"], ConfigurationError::InvalidDefinition { .. }));
        assert!(matches!(by_name["no_kind"], ConfigurationError::MissingParameter { parameter: "kind", .. }));
        assert!(matches!(by_name["rule #7"], ConfigurationError::InvalidDefinition { .. }));
    }
}
