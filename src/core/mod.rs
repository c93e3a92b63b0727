//! Core particle identification modules

pub mod accessor;
pub mod derived;
pub mod temperature;
pub mod classifier;
pub mod output;
pub mod pid;

// Re-export main types
pub use accessor::{converted_ray, missing_ray};
pub use derived::{depolarization_ratio, synthesize_dr, synthesize_snr};
pub use temperature::{attach_temperature_profile, beam_heights, interpolate_profile, tempc_ray};
pub use classifier::{BeamClassification, BeamMoments, ClassifierConfig, FuzzyClassifier, ParticleClassifier};
pub use output::{empty_class_param, INTEREST_GAIN};
pub use pid::{LdrSource, PidConfig, PidProcessor, PidSummary, SharedClassifier};
