//! Logic Module - Detection Engines
//!
//! ## Structure
//! - `detection/` - Connection records, rule registry and the rule evaluator

pub mod detection;
