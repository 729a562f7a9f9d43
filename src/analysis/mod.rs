//! Offline analysis of finished runs.
//!
//! This module detects malicious nodes from node statistics and compares
//! attack and mitigation runs recorded in the PDR results log.

pub mod comparison;
pub mod detection;
pub mod stats;

pub use comparison::{compare, read_pdr_log, ComparisonReport, ScenarioMetrics};
pub use detection::{detect, run_detection, DetectionReport, NodeRecord, ObservedScenario};
