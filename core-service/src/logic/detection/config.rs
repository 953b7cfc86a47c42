//! Detection Configuration
//!
//! Rule definitions as loaded from a rule file, plus evaluator options.
//! Each entry of a rule file is parsed on its own and parameters are kept
//! as raw JSON until the rule is built, so a bad value becomes a per-rule
//! ConfigurationError instead of failing the whole file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::{
    self, DEFAULT_HONEYPOT_ADDRESSES, DEFAULT_HONEYPOT_PORTS, DEFAULT_MAX_DISTINCT_RECORDS,
    DEFAULT_MAX_RECORDS, DEFAULT_MAX_SCAN_TARGETS, DEFAULT_PARALLEL_MIN_RULES,
    DEFAULT_SCAN_PORTS, RULE_EXCESSIVE_VOLUME, RULE_HONEYPOT_IP, RULE_HONEYPOT_PORT,
    RULE_MULTI_TARGET_SCAN,
};
use super::error::ConfigurationError;
use super::types::RuleSeverity;

/// Kinds understood by `build_rule`
pub const RULE_KINDS: &[&str] = &["honeypot_port", "honeypot_ip", "excessive_volume", "multi_target_scan"];

// ============================================================================
// RULE DEFINITIONS
// ============================================================================

fn default_enabled() -> bool {
    true
}

/// One named rule as written in a rule file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub severity: RuleSeverity,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub params: RuleParams,
}

/// Predicate kind and its raw parameters (checked in `build_rule`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleParams {
    /// Any destination port in `ports`
    HoneypotPort {
        #[serde(default)]
        ports: Option<Value>,
    },
    /// Any destination address in `addresses`
    HoneypotIp {
        #[serde(default)]
        addresses: Option<Value>,
    },
    /// Record count > `max_records` or distinct records > `max_distinct`
    ExcessiveVolume {
        #[serde(default)]
        max_records: Option<Value>,
        #[serde(default)]
        max_distinct: Option<Value>,
    },
    /// Distinct destinations on `ports` > `max_targets`
    MultiTargetScan {
        #[serde(default)]
        ports: Option<Value>,
        #[serde(default)]
        max_targets: Option<Value>,
    },
}

impl RuleParams {
    pub fn kind(&self) -> &'static str {
        match self {
            RuleParams::HoneypotPort { .. } => "honeypot_port",
            RuleParams::HoneypotIp { .. } => "honeypot_ip",
            RuleParams::ExcessiveVolume { .. } => "excessive_volume",
            RuleParams::MultiTargetScan { .. } => "multi_target_scan",
        }
    }
}

impl RuleDefinition {
    pub fn new(name: impl Into<String>, severity: RuleSeverity, params: RuleParams) -> Self {
        Self {
            name: name.into(),
            description: None,
            severity,
            enabled: true,
            params,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn honeypot_port(name: impl Into<String>, ports: &[u16]) -> Self {
        Self::new(name, RuleSeverity::High, RuleParams::HoneypotPort {
            ports: Some(json!(ports)),
        })
    }

    pub fn honeypot_ip(name: impl Into<String>, addresses: &[&str]) -> Self {
        Self::new(name, RuleSeverity::Critical, RuleParams::HoneypotIp {
            addresses: Some(json!(addresses)),
        })
    }

    pub fn excessive_volume(name: impl Into<String>, max_records: u64, max_distinct: u64) -> Self {
        Self::new(name, RuleSeverity::Medium, RuleParams::ExcessiveVolume {
            max_records: Some(json!(max_records)),
            max_distinct: Some(json!(max_distinct)),
        })
    }

    pub fn multi_target_scan(name: impl Into<String>, ports: &[u16], max_targets: u64) -> Self {
        Self::new(name, RuleSeverity::High, RuleParams::MultiTargetScan {
            ports: Some(json!(ports)),
            max_targets: Some(json!(max_targets)),
        })
    }

    // ------------------------------------------------------------------------
    // Parameter validation
    // ------------------------------------------------------------------------

    pub(crate) fn require<'v>(&self, value: &'v Option<Value>, parameter: &'static str) -> Result<&'v Value, ConfigurationError> {
        match value {
            Some(Value::Null) | None => Err(ConfigurationError::MissingParameter {
                rule: self.name.clone(),
                parameter,
            }),
            Some(v) => Ok(v),
        }
    }

    pub(crate) fn invalid(&self, parameter: &'static str, reason: impl Into<String>) -> ConfigurationError {
        ConfigurationError::InvalidParameter {
            rule: self.name.clone(),
            parameter,
            reason: reason.into(),
        }
    }

    /// Non-negative whole number
    pub(crate) fn threshold(&self, value: &Option<Value>, parameter: &'static str) -> Result<u64, ConfigurationError> {
        match self.require(value, parameter)? {
            Value::Number(n) => match n.as_u64() {
                Some(v) => Ok(v),
                None if n.as_i64().is_some() => Err(self.invalid(parameter, format!("{} is negative", n))),
                None => Err(self.invalid(parameter, format!("{} is not a whole number", n))),
            },
            other => Err(self.invalid(parameter, format!("expected a non-negative integer, got {}", other))),
        }
    }

    /// Non-empty list of valid port numbers
    pub(crate) fn port_list(&self, value: &Option<Value>, parameter: &'static str) -> Result<Vec<u16>, ConfigurationError> {
        let items = match self.require(value, parameter)? {
            Value::Array(items) => items,
            other => return Err(self.invalid(parameter, format!("expected a list of ports, got {}", other))),
        };
        if items.is_empty() {
            return Err(self.invalid(parameter, "must not be empty"));
        }
        items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|p| u16::try_from(p).ok())
                    .ok_or_else(|| self.invalid(parameter, format!("{} is not a port", item)))
            })
            .collect()
    }

    /// Non-empty list of non-blank strings
    pub(crate) fn string_list(&self, value: &Option<Value>, parameter: &'static str) -> Result<Vec<String>, ConfigurationError> {
        let items = match self.require(value, parameter)? {
            Value::Array(items) => items,
            other => return Err(self.invalid(parameter, format!("expected a list of addresses, got {}", other))),
        };
        if items.is_empty() {
            return Err(self.invalid(parameter, "must not be empty"));
        }
        items
            .iter()
            .map(|item| match item.as_str().map(str::trim) {
                Some(s) if !s.is_empty() => Ok(s.to_string()),
                _ => Err(self.invalid(parameter, format!("{} is not an address", item))),
            })
            .collect()
    }
}

// ============================================================================
// RULE SET CONFIG
// ============================================================================

/// One entry of a rule file.
///
/// Entries that do not even have the shape of a definition (no name,
/// unknown kind, wrong field types outside the parameters) are kept raw
/// and reported when the rule set is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleEntry {
    Defined(RuleDefinition),
    Malformed(Value),
}

impl RuleEntry {
    pub fn definition(&self) -> Option<&RuleDefinition> {
        match self {
            RuleEntry::Defined(def) => Some(def),
            RuleEntry::Malformed(_) => None,
        }
    }

    /// Name used in reports; falls back to the entry position
    pub fn name(&self, position: usize) -> String {
        match self {
            RuleEntry::Defined(def) => def.name.clone(),
            RuleEntry::Malformed(raw) => raw
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("rule #{}", position + 1)),
        }
    }

    /// Why a malformed entry could not be read as a definition
    pub(crate) fn diagnose(raw: &Value, name: &str) -> ConfigurationError {
        if !raw.is_object() {
            return ConfigurationError::InvalidDefinition {
                rule: name.to_string(),
                reason: format!("expected an object, got {}", raw),
            };
        }

        match raw.get("kind") {
            None => return ConfigurationError::MissingParameter { rule: name.to_string(), parameter: "kind" },
            Some(Value::String(kind)) if !RULE_KINDS.contains(&kind.as_str()) => {
                return ConfigurationError::InvalidParameter {
                    rule: name.to_string(),
                    parameter: "kind",
                    reason: format!("unknown kind '{}'", kind),
                };
            }
            _ => {}
        }

        let reason = match serde_json::from_value::<RuleDefinition>(raw.clone()) {
            Err(e) => e.to_string(),
            Ok(_) => "unreadable definition".to_string(),
        };
        ConfigurationError::InvalidDefinition { rule: name.to_string(), reason }
    }
}

impl From<RuleDefinition> for RuleEntry {
    fn from(def: RuleDefinition) -> Self {
        RuleEntry::Defined(def)
    }
}

/// Contents of a rule file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetConfig {
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
}

impl Default for RuleSetConfig {
    /// The four built-in rules with example sentinel values
    fn default() -> Self {
        Self::new(vec![
            RuleDefinition::honeypot_port(RULE_HONEYPOT_PORT, DEFAULT_HONEYPOT_PORTS)
                .with_description("Traffic to a trap port"),
            RuleDefinition::honeypot_ip(RULE_HONEYPOT_IP, DEFAULT_HONEYPOT_ADDRESSES)
                .with_description("Traffic to a decoy host"),
            RuleDefinition::excessive_volume(
                RULE_EXCESSIVE_VOLUME,
                DEFAULT_MAX_RECORDS,
                DEFAULT_MAX_DISTINCT_RECORDS,
            )
            .with_description("Packet flood or many distinct packets"),
            RuleDefinition::multi_target_scan(
                RULE_MULTI_TARGET_SCAN,
                DEFAULT_SCAN_PORTS,
                DEFAULT_MAX_SCAN_TARGETS,
            )
            .with_description("SSH/HTTP/HTTPS scanning across many hosts"),
        ])
    }
}

impl RuleSetConfig {
    pub fn new(definitions: Vec<RuleDefinition>) -> Self {
        Self {
            rules: definitions.into_iter().map(RuleEntry::from).collect(),
        }
    }

    /// Entries that parsed as definitions
    pub fn definitions(&self) -> impl Iterator<Item = &RuleDefinition> {
        self.rules.iter().filter_map(RuleEntry::definition)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&content)?;
        log::info!("Loaded {} rule definitions from {}", config.rules.len(), path.display());
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigurationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ============================================================================
// EVALUATOR CONFIG
// ============================================================================

/// What a failing rule looks like in the result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Keep the error as `RuleStatus::Errored`
    #[default]
    Report,
    /// Fold the error into `RuleStatus::NotMatched`
    TreatAsNotMatched,
}

impl ErrorPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "report" | "errored" => Some(ErrorPolicy::Report),
            "not_matched" | "treat_as_not_matched" | "ignore" => Some(ErrorPolicy::TreatAsNotMatched),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    pub error_policy: ErrorPolicy,
    /// Fan rules out over a thread pool
    pub parallel: bool,
    /// Rule count below which evaluation stays sequential
    pub parallel_min_rules: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            error_policy: ErrorPolicy::Report,
            parallel: false,
            parallel_min_rules: DEFAULT_PARALLEL_MIN_RULES,
        }
    }
}

impl EvaluatorConfig {
    /// Load options from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let error_policy = match constants::get_error_policy() {
            Some(raw) => ErrorPolicy::parse(&raw).unwrap_or_else(|| {
                log::warn!("Unknown SENTINEL_ERROR_POLICY '{}', using 'report'", raw);
                ErrorPolicy::Report
            }),
            None => ErrorPolicy::Report,
        };

        Self {
            error_policy,
            parallel: constants::is_parallel_enabled(),
            parallel_min_rules: constants::get_parallel_min_rules(),
        }
    }

    /// Always parallel regardless of rule count
    pub fn parallel() -> Self {
        Self {
            parallel: true,
            parallel_min_rules: 0,
            ..Default::default()
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_rule_set_config() {
        let config = RuleSetConfig::default();
        let names: Vec<_> = config.definitions().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec![
            RULE_HONEYPOT_PORT,
            RULE_HONEYPOT_IP,
            RULE_EXCESSIVE_VOLUME,
            RULE_MULTI_TARGET_SCAN,
        ]);
    }

    #[test]
    fn test_parse_rule_file() {
        let json = r#"{
            "rules": [
                { "name": "trap", "kind": "honeypot_port", "ports": [20, 21], "severity": "critical" },
                { "name": "flood", "kind": "excessive_volume", "max_records": 500 }
            ]
        }"#;
        let config = RuleSetConfig::from_json_str(json).unwrap();
        let defs: Vec<_> = config.definitions().collect();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].severity, RuleSeverity::Critical);
        assert!(defs[0].enabled);
        assert_eq!(defs[1].params, RuleParams::ExcessiveVolume {
            max_records: Some(json!(500)),
            max_distinct: None,
        });
    }

    /// Badly typed parameters still parse; they are rejected per rule later
    #[test]
    fn test_mistyped_parameters_keep_the_file_readable() {
        let json = r#"{
            "rules": [
                { "name": "trap", "kind": "honeypot_port", "ports": [23] },
                { "name": "flood", "kind": "excessive_volume", "max_records": "many", "max_distinct": 10.5 },
                { "name": "scan", "kind": "multi_target_scan", "ports": ["22"], "max_targets": 18446744073709551616 }
            ]
        }"#;
        let config = RuleSetConfig::from_json_str(json).unwrap();
        assert_eq!(config.rules.len(), 3);
        assert_eq!(config.definitions().count(), 3);
    }

    #[test]
    fn test_unknown_kind_kept_as_malformed_entry() {
        let json = r#"{ "rules": [ { "name": "x", "kind": "teleport" }, 42 ] }"#;
        let config = RuleSetConfig::from_json_str(json).unwrap();
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.definitions().count(), 0);
        assert_eq!(config.rules[0].name(0), "x");
        assert_eq!(config.rules[1].name(1), "rule #2");

        let RuleEntry::Malformed(raw) = &config.rules[0] else { panic!("expected malformed entry") };
        assert!(matches!(
            RuleEntry::diagnose(raw, "x"),
            ConfigurationError::InvalidParameter { parameter: "kind", .. }
        ));
    }

    #[test]
    fn test_non_object_rules_field_is_parse_error() {
        let json = r#"{ "rules": "all of them" }"#;
        assert!(matches!(RuleSetConfig::from_json_str(json), Err(ConfigurationError::Parse(_))));
    }

    #[test]
    fn test_from_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = RuleSetConfig::default().to_json_pretty().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = RuleSetConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, RuleSetConfig::default());
    }

    #[test]
    fn test_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = RuleSetConfig::from_file(dir.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigurationError::Io(_))));
    }

    #[test]
    fn test_threshold_validation() {
        let def = RuleDefinition::excessive_volume("flood", 1, 1);
        assert_eq!(def.threshold(&Some(json!(5)), "max_records"), Ok(5));
        for bad in [json!(-1), json!(10.5), json!("many"), json!(true), json!([3])] {
            assert!(matches!(
                def.threshold(&Some(bad), "max_records"),
                Err(ConfigurationError::InvalidParameter { parameter: "max_records", .. })
            ));
        }
        assert!(matches!(
            def.threshold(&None, "max_records"),
            Err(ConfigurationError::MissingParameter { parameter: "max_records", .. })
        ));
        assert!(matches!(
            def.threshold(&Some(Value::Null), "max_records"),
            Err(ConfigurationError::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_port_list_validation() {
        let def = RuleDefinition::honeypot_port("trap", &[23]);
        assert_eq!(def.port_list(&Some(json!([22, 80])), "ports"), Ok(vec![22, 80]));
        assert!(def.port_list(&Some(json!([])), "ports").is_err());
        assert!(def.port_list(&Some(json!([70000])), "ports").is_err());
        assert!(def.port_list(&Some(json!(["22"])), "ports").is_err());
        assert!(def.port_list(&Some(json!(22)), "ports").is_err());
        assert!(def.port_list(&None, "ports").is_err());
    }

    #[test]
    fn test_string_list_validation() {
        let def = RuleDefinition::honeypot_ip("decoy", &["1.2.3.4"]);
        assert_eq!(
            def.string_list(&Some(json!([" 1.2.3.4", "decoy.local"])), "addresses"),
            Ok(vec!["1.2.3.4".to_string(), "decoy.local".to_string()])
        );
        assert!(def.string_list(&Some(json!([""])), "addresses").is_err());
        assert!(def.string_list(&Some(json!([1234])), "addresses").is_err());
        assert!(def.string_list(&Some(json!("1.2.3.4")), "addresses").is_err());
    }

    #[test]
    fn test_error_policy_parse() {
        assert_eq!(ErrorPolicy::parse("Report"), Some(ErrorPolicy::Report));
        assert_eq!(ErrorPolicy::parse("not_matched"), Some(ErrorPolicy::TreatAsNotMatched));
        assert_eq!(ErrorPolicy::parse("maybe"), None);
    }

    #[test]
    fn test_evaluator_config_defaults() {
        let config = EvaluatorConfig::default();
        assert_eq!(config.error_policy, ErrorPolicy::Report);
        assert!(!config.parallel);

        let parallel = EvaluatorConfig::parallel();
        assert!(parallel.parallel);
        assert_eq!(parallel.parallel_min_rules, 0);
    }

    /// All SENTINEL_* cases live in one test; the environment is process-wide
    #[test]
    fn test_evaluator_config_from_env() {
        const VARS: [&str; 3] = ["SENTINEL_ERROR_POLICY", "SENTINEL_PARALLEL", "SENTINEL_PARALLEL_MIN_RULES"];
        for var in VARS {
            std::env::remove_var(var);
        }
        assert_eq!(EvaluatorConfig::from_env(), EvaluatorConfig::default());

        std::env::set_var("SENTINEL_ERROR_POLICY", "not_matched");
        std::env::set_var("SENTINEL_PARALLEL", "true");
        std::env::set_var("SENTINEL_PARALLEL_MIN_RULES", "4");
        assert_eq!(constants::get_error_policy().as_deref(), Some("not_matched"));
        assert!(constants::is_parallel_enabled());
        assert_eq!(constants::get_parallel_min_rules(), 4);
        assert_eq!(EvaluatorConfig::from_env(), EvaluatorConfig {
            error_policy: ErrorPolicy::TreatAsNotMatched,
            parallel: true,
            parallel_min_rules: 4,
        });

        std::env::set_var("SENTINEL_ERROR_POLICY", "sometimes");
        std::env::set_var("SENTINEL_PARALLEL", "yes");
        std::env::set_var("SENTINEL_PARALLEL_MIN_RULES", "lots");
        assert_eq!(EvaluatorConfig::from_env(), EvaluatorConfig::default());

        std::env::set_var("SENTINEL_PARALLEL", "1");
        assert!(constants::is_parallel_enabled());

        for var in VARS {
            std::env::remove_var(var);
        }
    }
}
