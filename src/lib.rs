//! ncarb: polarimetric particle identification for weather radar
//!
//! This library classifies every bin of a polar scan into a hydrometeor
//! type with a fuzzy-logic classifier, deriving SNR and depolarization
//! ratio when the scan does not carry them, and stores the result as
//! `CLASS`/`CLASS2` parameters with interest quality fields.

pub mod types;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    Attribute, Codec, DataType, PidError, PidResult, PolarScan, QualityField, ScanParam,
    ValueType, MISSING,
};

pub use core::{
    BeamClassification, BeamMoments, ClassifierConfig, FuzzyClassifier, ParticleClassifier,
    PidConfig, PidProcessor, PidSummary, SharedClassifier,
};
pub use io::ThresholdTable;
