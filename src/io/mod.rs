//! I/O modules for reading classifier thresholds

pub mod thresholds;

pub use thresholds::{parse_thresholds, InterestMap, Particle, PidField, ThresholdTable};
