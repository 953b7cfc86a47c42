//! Detection Rules
//!
//! Rule trait and the built-in traffic predicates.
//! Every rule reads the whole batch and never short-circuits on a hit,
//! so a malformed record yields the same verdict wherever it sits.

use std::collections::{BTreeSet, HashSet};

use super::config::{RuleDefinition, RuleParams};
use super::error::{ConfigurationError, RuleEvaluationError};
use super::record::{ConnectionRecord, DestAddr};
use super::types::RuleSeverity;

// ============================================================================
// RULE TRAIT
// ============================================================================

/// Named pure predicate over a batch.
///
/// `Ok(Some(reason))` means the rule fired, `Ok(None)` means it did not.
pub trait Rule: Send + Sync {
    fn name(&self) -> &str;

    fn severity(&self) -> RuleSeverity {
        RuleSeverity::Medium
    }

    fn description(&self) -> Option<&str> {
        None
    }

    fn evaluate(&self, batch: &[ConnectionRecord]) -> Result<Option<String>, RuleEvaluationError>;
}

/// Name, severity and description shared by the built-in rules
#[derive(Debug, Clone)]
struct RuleMeta {
    name: String,
    severity: RuleSeverity,
    description: Option<String>,
}

impl RuleMeta {
    fn new(name: impl Into<String>, severity: RuleSeverity) -> Self {
        Self { name: name.into(), severity, description: None }
    }

    fn from_definition(def: &RuleDefinition) -> Self {
        Self {
            name: def.name.clone(),
            severity: def.severity,
            description: def.description.clone(),
        }
    }
}

macro_rules! impl_rule_meta {
    () => {
        fn name(&self) -> &str {
            &self.meta.name
        }

        fn severity(&self) -> RuleSeverity {
            self.meta.severity
        }

        fn description(&self) -> Option<&str> {
            self.meta.description.as_deref()
        }
    };
}

fn format_list<T: std::fmt::Display>(items: impl IntoIterator<Item = T>) -> String {
    items.into_iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

// ============================================================================
// HONEYPOT PORT
// ============================================================================

/// Fires when any destination port is a sentinel port
#[derive(Debug, Clone)]
pub struct HoneypotPortRule {
    meta: RuleMeta,
    ports: HashSet<u16>,
}

impl HoneypotPortRule {
    pub fn new(name: impl Into<String>, ports: impl IntoIterator<Item = u16>) -> Self {
        Self {
            meta: RuleMeta::new(name, RuleSeverity::High),
            ports: ports.into_iter().collect(),
        }
    }

    pub fn with_severity(mut self, severity: RuleSeverity) -> Self {
        self.meta.severity = severity;
        self
    }
}

impl Rule for HoneypotPortRule {
    impl_rule_meta!();

    fn evaluate(&self, batch: &[ConnectionRecord]) -> Result<Option<String>, RuleEvaluationError> {
        let mut hits = BTreeSet::new();
        for (index, record) in batch.iter().enumerate() {
            let port = record.require_dst_port(index)?;
            if self.ports.contains(&port) {
                hits.insert(port);
            }
        }

        if hits.is_empty() {
            Ok(None)
        } else {
            Ok(Some(format!("honeypot ports contacted: {}", format_list(hits))))
        }
    }
}

// ============================================================================
// HONEYPOT IP
// ============================================================================

/// Fires when any destination address is a sentinel address.
///
/// Sentinels and record addresses may be IPs or host names; see `DestAddr`.
#[derive(Debug, Clone)]
pub struct HoneypotIpRule {
    meta: RuleMeta,
    addresses: HashSet<DestAddr>,
}

impl HoneypotIpRule {
    pub fn new<A: Into<DestAddr>>(name: impl Into<String>, addresses: impl IntoIterator<Item = A>) -> Self {
        Self {
            meta: RuleMeta::new(name, RuleSeverity::Critical),
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_severity(mut self, severity: RuleSeverity) -> Self {
        self.meta.severity = severity;
        self
    }
}

impl Rule for HoneypotIpRule {
    impl_rule_meta!();

    fn evaluate(&self, batch: &[ConnectionRecord]) -> Result<Option<String>, RuleEvaluationError> {
        let mut hits = BTreeSet::new();
        for (index, record) in batch.iter().enumerate() {
            let addr = record.require_dst_addr(index)?;
            if self.addresses.contains(&addr) {
                hits.insert(addr);
            }
        }

        if hits.is_empty() {
            Ok(None)
        } else {
            Ok(Some(format!("honeypot addresses contacted: {}", format_list(hits))))
        }
    }
}

// ============================================================================
// EXCESSIVE VOLUME
// ============================================================================

/// Fires on `len > max_records` or `distinct > max_distinct`.
///
/// Distinct means full-record equality, so retransmit bursts of one packet
/// only count once toward `max_distinct`.
#[derive(Debug, Clone)]
pub struct ExcessiveVolumeRule {
    meta: RuleMeta,
    max_records: u64,
    max_distinct: u64,
}

impl ExcessiveVolumeRule {
    pub fn new(name: impl Into<String>, max_records: u64, max_distinct: u64) -> Self {
        Self {
            meta: RuleMeta::new(name, RuleSeverity::Medium),
            max_records,
            max_distinct,
        }
    }

    pub fn with_severity(mut self, severity: RuleSeverity) -> Self {
        self.meta.severity = severity;
        self
    }
}

impl Rule for ExcessiveVolumeRule {
    impl_rule_meta!();

    fn evaluate(&self, batch: &[ConnectionRecord]) -> Result<Option<String>, RuleEvaluationError> {
        let total = batch.len() as u64;
        if total > self.max_records {
            return Ok(Some(format!("{} records > {}", total, self.max_records)));
        }

        let distinct = batch.iter().collect::<HashSet<_>>().len() as u64;
        if distinct > self.max_distinct {
            return Ok(Some(format!("{} distinct records > {}", distinct, self.max_distinct)));
        }

        Ok(None)
    }
}

// ============================================================================
// MULTI-TARGET SCAN
// ============================================================================

/// Fires when more than `max_targets` distinct hosts are contacted on
/// watched service ports
#[derive(Debug, Clone)]
pub struct MultiTargetScanRule {
    meta: RuleMeta,
    ports: HashSet<u16>,
    max_targets: u64,
}

impl MultiTargetScanRule {
    pub fn new(name: impl Into<String>, ports: impl IntoIterator<Item = u16>, max_targets: u64) -> Self {
        Self {
            meta: RuleMeta::new(name, RuleSeverity::High),
            ports: ports.into_iter().collect(),
            max_targets,
        }
    }

    pub fn with_severity(mut self, severity: RuleSeverity) -> Self {
        self.meta.severity = severity;
        self
    }
}

impl Rule for MultiTargetScanRule {
    impl_rule_meta!();

    fn evaluate(&self, batch: &[ConnectionRecord]) -> Result<Option<String>, RuleEvaluationError> {
        let mut targets = HashSet::new();
        for (index, record) in batch.iter().enumerate() {
            let port = record.require_dst_port(index)?;
            // Address only matters on watched ports
            if self.ports.contains(&port) {
                targets.insert(record.require_dst_addr(index)?);
            }
        }

        let count = targets.len() as u64;
        if count > self.max_targets {
            Ok(Some(format!("{} hosts contacted on watched ports > {}", count, self.max_targets)))
        } else {
            Ok(None)
        }
    }
}

// ============================================================================
// CUSTOM PREDICATES
// ============================================================================

type Predicate = dyn Fn(&[ConnectionRecord]) -> Result<bool, RuleEvaluationError> + Send + Sync;

/// Caller-supplied predicate registered under a name
pub struct PredicateRule {
    meta: RuleMeta,
    predicate: Box<Predicate>,
}

impl PredicateRule {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&[ConnectionRecord]) -> Result<bool, RuleEvaluationError> + Send + Sync + 'static,
    {
        Self {
            meta: RuleMeta::new(name, RuleSeverity::Medium),
            predicate: Box::new(predicate),
        }
    }

    pub fn with_severity(mut self, severity: RuleSeverity) -> Self {
        self.meta.severity = severity;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = Some(description.into());
        self
    }
}

impl std::fmt::Debug for PredicateRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateRule").field("meta", &self.meta).finish_non_exhaustive()
    }
}

impl Rule for PredicateRule {
    impl_rule_meta!();

    fn evaluate(&self, batch: &[ConnectionRecord]) -> Result<Option<String>, RuleEvaluationError> {
        if (self.predicate)(batch)? {
            let reason = self.meta.description.clone().unwrap_or_else(|| "predicate matched".to_string());
            Ok(Some(reason))
        } else {
            Ok(None)
        }
    }
}

// ============================================================================
// CONSTRUCTION FROM CONFIG
// ============================================================================

/// Build one rule from its definition
pub fn build_rule(def: &RuleDefinition) -> Result<Box<dyn Rule>, ConfigurationError> {
    if def.name.trim().is_empty() {
        return Err(ConfigurationError::EmptyName);
    }
    let meta = RuleMeta::from_definition(def);

    let rule: Box<dyn Rule> = match &def.params {
        RuleParams::HoneypotPort { ports } => {
            let ports = def.port_list(ports, "ports")?;
            Box::new(HoneypotPortRule { meta, ports: ports.into_iter().collect() })
        }

        RuleParams::HoneypotIp { addresses } => {
            let addresses = def.string_list(addresses, "addresses")?;
            Box::new(HoneypotIpRule {
                meta,
                addresses: addresses.iter().map(|a| DestAddr::parse(a)).collect(),
            })
        }

        RuleParams::ExcessiveVolume { max_records, max_distinct } => {
            let max_records = def.threshold(max_records, "max_records")?;
            let max_distinct = def.threshold(max_distinct, "max_distinct")?;
            Box::new(ExcessiveVolumeRule { meta, max_records, max_distinct })
        }

        RuleParams::MultiTargetScan { ports, max_targets } => {
            let ports = def.port_list(ports, "ports")?;
            let max_targets = def.threshold(max_targets, "max_targets")?;
            Box::new(MultiTargetScanRule { meta, ports: ports.into_iter().collect(), max_targets })
        }
    };

    Ok(rule)
}

// ============================================================================
// TESTS
// ============================================================================
