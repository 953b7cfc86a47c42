//! Central Configuration Constants
//!
//! Single source of truth for all detection defaults.
//! The sentinel values below are examples; every deployment is expected
//! to replace them through a rule file.

/// Ports that legitimate traffic should never contact (ftp-data, ftp, telnet, smtp)
pub const DEFAULT_HONEYPOT_PORTS: &[u16] = &[20, 21, 23, 25];

/// Decoy host address
pub const DEFAULT_HONEYPOT_ADDRESSES: &[&str] = &["1.2.3.4"];

/// Raw record count above which a batch is a flood
pub const DEFAULT_MAX_RECORDS: u64 = 100;

/// Distinct record count above which a batch is a flood
pub const DEFAULT_MAX_DISTINCT_RECORDS: u64 = 10;

/// Services watched for multi-host scanning (ssh, http, https)
pub const DEFAULT_SCAN_PORTS: &[u16] = &[22, 80, 443];

/// Distinct targets on watched services above which a batch is a scan
pub const DEFAULT_MAX_SCAN_TARGETS: u64 = 3;

/// Minimum rule count before evaluation fans out across threads
pub const DEFAULT_PARALLEL_MIN_RULES: usize = 16;

/// Built-in rule names
pub const RULE_HONEYPOT_PORT: &str = "honeypot_port";
pub const RULE_HONEYPOT_IP: &str = "honeypot_ip";
pub const RULE_EXCESSIVE_VOLUME: &str = "excessive_volume";
pub const RULE_MULTI_TARGET_SCAN: &str = "multi_target_scan";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get error policy name from environment ("report" or "not_matched")
pub fn get_error_policy() -> Option<String> {
    std::env::var("SENTINEL_ERROR_POLICY").ok()
}

/// Check if parallel evaluation is enabled
pub fn is_parallel_enabled() -> bool {
    std::env::var("SENTINEL_PARALLEL")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Get parallel threshold from environment or use default
pub fn get_parallel_min_rules() -> usize {
    std::env::var("SENTINEL_PARALLEL_MIN_RULES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_PARALLEL_MIN_RULES)
}
