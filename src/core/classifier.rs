use crate::io::thresholds::{Particle, ThresholdTable};
use crate::types::{PidError, PidResult, MISSING};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The eight per-bin inputs of one beam, all of equal length
#[derive(Debug, Clone)]
pub struct BeamMoments<'a> {
    pub snr: ArrayView1<'a, f64>,
    pub dbz: ArrayView1<'a, f64>,
    pub zdr: ArrayView1<'a, f64>,
    pub kdp: ArrayView1<'a, f64>,
    /// LDR, or whatever stands in for it (DR, zeros)
    pub ldr: ArrayView1<'a, f64>,
    pub rhohv: ArrayView1<'a, f64>,
    pub phidp: ArrayView1<'a, f64>,
    pub tempc: ArrayView1<'a, f64>,
}

impl<'a> BeamMoments<'a> {
    pub fn nbins(&self) -> usize {
        self.snr.len()
    }

    fn check_lengths(&self) -> PidResult<()> {
        let nbins = self.nbins();
        let lengths = [
            ("DBZ", self.dbz.len()),
            ("ZDR", self.zdr.len()),
            ("KDP", self.kdp.len()),
            ("LDR", self.ldr.len()),
            ("RHOHV", self.rhohv.len()),
            ("PHIDP", self.phidp.len()),
            ("TEMPC", self.tempc.len()),
        ];
        for (name, len) in lengths {
            if len != nbins {
                return Err(PidError::Input(format!(
                    "{} has {} bins, SNR has {}",
                    name, len, nbins
                )));
            }
        }
        Ok(())
    }
}

/// Classification of the most recent beam. Class id 0 means no valid class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeamClassification {
    pub pid: Vec<u8>,
    pub pid2: Vec<u8>,
    pub interest: Vec<f64>,
    pub interest2: Vec<f64>,
}

impl BeamClassification {
    pub fn nbins(&self) -> usize {
        self.pid.len()
    }

    fn reset(&mut self, nbins: usize) {
        for ids in [&mut self.pid, &mut self.pid2] {
            ids.clear();
            ids.resize(nbins, 0);
        }
        for interest in [&mut self.interest, &mut self.interest2] {
            interest.clear();
            interest.resize(nbins, 0.0);
        }
    }
}

/// A per-beam particle classifier.
///
/// `compute_beam` fills the classifier's own output buffers, which
/// `output` exposes until the next call. The two calls form one critical
/// section when an instance is shared.
pub trait ParticleClassifier {
    fn compute_beam(&mut self, moments: &BeamMoments<'_>) -> PidResult<()>;

    fn output(&self) -> &BeamClassification;
}

/// Classifier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Value marking absent data in the input vectors
    pub missing: f64,
    /// Scores below this do not yield a class
    pub min_valid_interest: f64,
    /// Length of the median filter over primary classes, odd; 0 disables
    pub median_filter_len: usize,
    /// Substitute `missing_ldr_value` where LDR is missing
    pub replace_missing_ldr: bool,
    pub missing_ldr_value: f64,
    pub snr_threshold_db: f64,
    pub snr_upper_threshold_db: f64,
    /// Bins in the running window for ZDR and PHIDP texture
    pub sd_window: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            missing: MISSING,
            min_valid_interest: 0.5,
            median_filter_len: 0,
            replace_missing_ldr: false,
            missing_ldr_value: -32.0,
            snr_threshold_db: 3.0,
            snr_upper_threshold_db: 9999.0,
            sd_window: 9,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> PidResult<()> {
        if self.median_filter_len != 0 && self.median_filter_len % 2 == 0 {
            return Err(PidError::Configuration(format!(
                "Median filter length must be odd or 0, got {}",
                self.median_filter_len
            )));
        }
        if self.snr_upper_threshold_db < self.snr_threshold_db {
            return Err(PidError::Configuration(format!(
                "SNR upper threshold {} below lower threshold {}",
                self.snr_upper_threshold_db, self.snr_threshold_db
            )));
        }
        if self.sd_window == 0 {
            return Err(PidError::Configuration("Texture window must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Threshold-table fuzzy-logic particle classifier
#[derive(Debug, Clone)]
pub struct FuzzyClassifier {
    config: ClassifierConfig,
    table: Option<ThresholdTable>,
    output: BeamClassification,
}

impl FuzzyClassifier {
    /// Create a classifier with no thresholds loaded yet
    pub fn new(config: ClassifierConfig) -> PidResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            table: None,
            output: BeamClassification::default(),
        })
    }

    /// Create a classifier ready to use
    pub fn from_thresholds_file<P: AsRef<Path>>(path: P, config: ClassifierConfig) -> PidResult<Self> {
        let mut classifier = Self::new(config)?;
        classifier.read_thresholds_from_file(path)?;
        Ok(classifier)
    }

    /// Load (or replace) the threshold table
    pub fn read_thresholds_from_file<P: AsRef<Path>>(&mut self, path: P) -> PidResult<()> {
        let table = ThresholdTable::from_file(path)?;
        self.set_thresholds(table);
        Ok(())
    }

    pub fn set_thresholds(&mut self, table: ThresholdTable) {
        if self.table.is_some() {
            log::debug!("Replacing loaded PID thresholds");
        }
        self.table = Some(table);
    }

    pub fn is_loaded(&self) -> bool {
        self.table.is_some()
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn particles(&self) -> &[Particle] {
        self.table.as_ref().map(|t| t.particles.as_slice()).unwrap_or(&[])
    }

    fn is_missing(&self, value: f64) -> bool {
        value == self.config.missing || value.is_nan()
    }

    fn snr_ok(&self, snr: f64) -> bool {
        !self.is_missing(snr)
            && snr >= self.config.snr_threshold_db
            && snr <= self.config.snr_upper_threshold_db
    }

    /// Field values of one bin, in `PidField` order
    fn bin_fields(&self, moments: &BeamMoments<'_>, sdzdr: &[f64], sdphidp: &[f64], bin: usize) -> [f64; 8] {
        let mut ldr = moments.ldr[bin];
        if self.config.replace_missing_ldr && self.is_missing(ldr) {
            ldr = self.config.missing_ldr_value;
        }
        [
            moments.dbz[bin],
            moments.zdr[bin],
            moments.kdp[bin],
            ldr,
            moments.rhohv[bin],
            sdzdr[bin],
            sdphidp[bin],
            moments.tempc[bin],
        ]
    }

    /// Weighted mean interest of a particle over the fields that have data
    fn score(&self, table: &ThresholdTable, particle: &Particle, fields: &[f64; 8]) -> Option<f64> {
        let mut sum = 0.0;
        let mut weights = 0.0;
        for (field, map) in &particle.maps {
            let value = fields[field.index()];
            if self.is_missing(value) {
                continue;
            }
            let weight = table.weight(*field);
            sum += weight * map.interest(value);
            weights += weight;
        }
        if weights > 0.0 {
            Some(sum / weights)
        } else {
            None
        }
    }
}

impl ParticleClassifier for FuzzyClassifier {
    fn compute_beam(&mut self, moments: &BeamMoments<'_>) -> PidResult<()> {
        let table = self.table.as_ref().ok_or(PidError::ThresholdsNotLoaded)?;
        moments.check_lengths()?;

        let nbins = moments.nbins();
        let missing = self.config.missing;
        let sdzdr = running_sdev(moments.zdr, self.config.sd_window, missing);
        let sdphidp = running_sdev(moments.phidp, self.config.sd_window, missing);

        let min_valid = self.config.min_valid_interest;
        let mut out = BeamClassification::default();
        out.reset(nbins);
        // Per-bin (id, score) of every particle that could be scored
        let mut scores: Vec<Vec<(u8, f64)>> = vec![Vec::new(); nbins];

        for bin in 0..nbins {
            if !self.snr_ok(moments.snr[bin]) {
                continue;
            }
            let fields = self.bin_fields(moments, &sdzdr, &sdphidp, bin);
            scores[bin] = table
                .particles
                .iter()
                .filter_map(|particle| self.score(table, particle, &fields).map(|s| (particle.id, s)))
                .collect();

            if let Some((id, score)) = ranked(&scores[bin], None, min_valid) {
                out.pid[bin] = id;
                out.interest[bin] = score;
                if let Some((id2, score2)) = ranked(&scores[bin], Some(id), min_valid) {
                    out.pid2[bin] = id2;
                    out.interest2[bin] = score2;
                }
            }
        }

        if self.config.median_filter_len > 1 {
            let filtered = median_filter(&out.pid, self.config.median_filter_len);
            for (bin, &id) in filtered.iter().enumerate() {
                if id == out.pid[bin] {
                    continue;
                }
                let Some(score) = scores[bin].iter().find(|(p, _)| *p == id).map(|&(_, s)| s) else {
                    continue;
                };
                out.pid[bin] = id;
                out.interest[bin] = score;
                let (id2, score2) = ranked(&scores[bin], Some(id), min_valid).unwrap_or((0, 0.0));
                out.pid2[bin] = id2;
                out.interest2[bin] = score2;
            }
        }

        self.output = out;
        Ok(())
    }

    fn output(&self) -> &BeamClassification {
        &self.output
    }
}

/// Running standard deviation over `window` bins centred on each bin.
///
/// Bins with fewer than half the window (and fewer than two values) valid
/// come out as `missing`.
pub fn running_sdev(values: ArrayView1<'_, f64>, window: usize, missing: f64) -> Vec<f64> {
    let n = values.len();
    let half = window / 2;
    let needed = ((window + 1) / 2).max(2);
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            let valid: Vec<f64> = (lo..hi)
                .map(|j| values[j])
                .filter(|v| *v != missing && !v.is_nan())
                .collect();
            if valid.len() < needed {
                return missing;
            }
            let count = valid.len() as f64;
            let mean = valid.iter().sum::<f64>() / count;
            let var = valid.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
            var.sqrt()
        })
        .collect()
}

/// Highest-scoring particle at or above `min_valid`, skipping `exclude`.
/// The first of equal scores wins.
fn ranked(scores: &[(u8, f64)], exclude: Option<u8>, min_valid: f64) -> Option<(u8, f64)> {
    let mut best: Option<(u8, f64)> = None;
    for &(id, score) in scores {
        if Some(id) == exclude || score < min_valid {
            continue;
        }
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((id, score));
        }
    }
    best
}

/// Median of the classified neighbours of every classified bin.
///
/// When the window holds an even number of ids (ray ends, gaps) and the
/// bin's own id is one of the two middle values, the bin keeps it.
pub fn median_filter(ids: &[u8], len: usize) -> Vec<u8> {
    let half = len / 2;
    let n = ids.len();
    (0..n)
        .map(|i| {
            let own = ids[i];
            if own == 0 {
                return 0;
            }
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(n);
            let mut window: Vec<u8> = ids[lo..hi].iter().copied().filter(|&id| id != 0).collect();
            window.sort_unstable();
            let mid = window.len() / 2;
            if window.len() % 2 == 0 && (window[mid - 1] == own || window[mid] == own) {
                own
            } else {
                window[mid]
            }
        })
        .collect()
}
