//! Traffic Sentinel Core
//!
//! Evaluates named detection rules (honeypot hits, packet floods,
//! multi-host service scans) against batches of observed connections.
//! Log collection, alerting and persistence live outside this crate.

pub mod constants;
pub mod logic;

pub use logic::detection;
