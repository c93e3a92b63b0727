//! Particle identification over a whole polar scan.
//!
//! For every ray the processor gathers SNR, reflectivity, ZDR, KDP, an LDR
//! stand-in, RHOHV, PHIDP and temperature as physical values, hands them to
//! a [`ParticleClassifier`] and writes the classes and their interest into
//! `CLASS` (and `CLASS2` for the runner-up). SNR and DR are synthesized
//! first when the scan lacks them.

use crate::core::accessor::{constant_ray, converted_ray, missing_ray};
use crate::core::classifier::{BeamClassification, BeamMoments, ParticleClassifier};
use crate::core::derived::{synthesize_dr, synthesize_snr, SNR_FLOOR};
use crate::core::output::{empty_class_param, PID_NODATA};
use crate::core::temperature::tempc_ray;
use crate::types::{Codec, DataType, PidError, PidResult, PolarScan, ScanParam};
use ndarray::{Array1, ArrayViewMut1, Axis};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// Scan-level particle identification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidConfig {
    /// ZDR bias (dB) subtracted before classification
    pub zdr_offset: f64,
    /// Derive DR as an LDR stand-in when LDR is absent
    pub derive_dr: bool,
    /// Factor applied to ZDR when deriving DR; 0 leaves ZDR unscaled
    pub zdr_scale: f64,
    /// Also produce `CLASS2` with the runner-up class
    pub secondary: bool,
    /// Leave synthesized `SNRH`/`DR` in the scan
    pub keep_intermediates: bool,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            zdr_offset: 0.0,
            derive_dr: false,
            zdr_scale: 1.0,
            secondary: true,
            keep_intermediates: false,
        }
    }
}

/// What the classifier was given in place of LDR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LdrSource {
    Ldr,
    Dr,
    /// All-zero vector
    Zero,
}

/// Outcome of classifying one scan
#[derive(Debug, Clone, PartialEq)]
pub struct PidSummary {
    pub nrays: usize,
    pub nbins: usize,
    /// Bins that received a primary class
    pub classified_bins: usize,
    pub snr_synthesized: bool,
    pub dr_synthesized: bool,
    pub ldr_source: LdrSource,
}

/// Per-scan inputs shared by every ray
struct Preparation {
    ldr_source: LdrSource,
    snr_synthesized: bool,
    dr_synthesized: bool,
    /// SNR used when SNRH could neither be found nor derived
    snr_fallback: Option<Array1<f64>>,
    zero_ldr: Array1<f64>,
    tempc: Array1<f64>,
}

/// Moment vectors of one ray, dropped after its classification
struct RayVectors {
    snr: Option<Array1<f64>>,
    dbz: Array1<f64>,
    zdr: Array1<f64>,
    kdp: Array1<f64>,
    ldr: Option<Array1<f64>>,
    rhohv: Array1<f64>,
    phidp: Array1<f64>,
}

impl RayVectors {
    fn extract(scan: &PolarScan, prep: &Preparation, ray: usize, zdr_offset: f64) -> PidResult<Self> {
        let snr = match prep.snr_fallback {
            Some(_) => None,
            None => Some(moment_ray(scan, "SNRH", ray, 0.0)?),
        };
        let ldr = match prep.ldr_source {
            LdrSource::Ldr => Some(moment_ray(scan, "LDR", ray, 0.0)?),
            LdrSource::Dr => Some(moment_ray(scan, "DR", ray, 0.0)?),
            LdrSource::Zero => None,
        };
        Ok(Self {
            snr,
            dbz: moment_ray(scan, "DBZH", ray, 0.0)?,
            zdr: moment_ray(scan, "ZDR", ray, zdr_offset)?,
            kdp: moment_ray(scan, "KDP", ray, 0.0)?,
            ldr,
            rhohv: moment_ray(scan, "RHOHV", ray, 0.0)?,
            phidp: moment_ray(scan, "PHIDP", ray, 0.0)?,
        })
    }

    fn moments<'a>(&'a self, prep: &'a Preparation) -> BeamMoments<'a> {
        let snr = match (&self.snr, &prep.snr_fallback) {
            (Some(snr), _) | (None, Some(snr)) => snr.view(),
            (None, None) => prep.zero_ldr.view(),
        };
        BeamMoments {
            snr,
            dbz: self.dbz.view(),
            zdr: self.zdr.view(),
            kdp: self.kdp.view(),
            ldr: self.ldr.as_ref().unwrap_or(&prep.zero_ldr).view(),
            rhohv: self.rhohv.view(),
            phidp: self.phidp.view(),
            tempc: prep.tempc.view(),
        }
    }
}

/// A moment's ray, or a missing-filled ray when the scan lacks it
fn moment_ray(scan: &PolarScan, quantity: &str, ray: usize, bias: f64) -> PidResult<Array1<f64>> {
    if scan.has_parameter(quantity) {
        converted_ray(scan, quantity, ray, bias)
    } else {
        Ok(missing_ray(scan.nbins()))
    }
}

/// `CLASS` and optional `CLASS2` under construction
struct ClassOutputs {
    class: ScanParam,
    class2: Option<ScanParam>,
    classified_bins: usize,
}

impl ClassOutputs {
    fn new(nbins: usize, nrays: usize, secondary: bool) -> PidResult<Self> {
        let class = empty_class_param("CLASS", nbins, nrays)?;
        let class2 = if secondary {
            Some(empty_class_param("CLASS2", nbins, nrays)?)
        } else {
            None
        };
        Ok(Self {
            class,
            class2,
            classified_bins: 0,
        })
    }

    /// Writable rows of every ray, in ray order
    fn rows(&mut self) -> PidResult<Vec<RayRows<'_>>> {
        let class = class_rows(&mut self.class)?;
        let class2: Vec<Option<ClassRow<'_>>> = match self.class2.as_mut() {
            Some(param) => class_rows(param)?.into_iter().map(Some).collect(),
            None => (0..class.len()).map(|_| None).collect(),
        };
        Ok(class
            .into_iter()
            .zip(class2)
            .map(|(class, class2)| RayRows { class, class2 })
            .collect())
    }

    /// Move the finished parameters into the scan, all or nothing
    fn attach(self, scan: &mut PolarScan) -> PidResult<usize> {
        scan.check_extent(&self.class)?;
        if let Some(class2) = self.class2.as_ref() {
            scan.check_extent(class2)?;
        }
        scan.add_parameter(self.class)?;
        if let Some(class2) = self.class2 {
            scan.add_parameter(class2)?;
        }
        Ok(self.classified_bins)
    }
}

/// One ray of a class parameter and of its interest field
struct ClassRow<'a> {
    datatype: DataType,
    ids: ArrayViewMut1<'a, f64>,
    interest_codec: Codec,
    interest: ArrayViewMut1<'a, f64>,
}

impl ClassRow<'_> {
    /// Copy class ids and interest; returns the number of classified bins
    fn store(&mut self, ids: &[u8], interest: &[f64]) -> usize {
        let mut classified = 0;
        for (bin, (&id, &score)) in ids.iter().zip(interest).enumerate() {
            let (raw, score) = if id == 0 {
                (PID_NODATA, 0.0)
            } else {
                classified += 1;
                (id as f64, score.clamp(0.0, 1.0))
            };
            self.ids[bin] = self.datatype.saturate(raw);
            self.interest[bin] = self.interest_codec.encode(score);
        }
        classified
    }
}

fn class_rows(param: &mut ScanParam) -> PidResult<Vec<ClassRow<'_>>> {
    let datatype = param.codec.datatype;
    let field = param
        .quality_fields
        .first_mut()
        .ok_or_else(|| PidError::Processing(format!("{} has no interest field", param.quantity)))?;
    let interest_codec = field.codec;
    Ok(param
        .data
        .axis_iter_mut(Axis(0))
        .zip(field.data.axis_iter_mut(Axis(0)))
        .map(|(ids, interest)| ClassRow {
            datatype,
            ids,
            interest_codec,
            interest,
        })
        .collect())
}

/// Output rows of one ray in `CLASS` and `CLASS2`
struct RayRows<'a> {
    class: ClassRow<'a>,
    class2: Option<ClassRow<'a>>,
}

impl RayRows<'_> {
    /// Store one beam; returns the number of bins given a primary class
    fn store(&mut self, out: &BeamClassification) -> PidResult<usize> {
        let nbins = self.class.ids.len();
        let lengths = [out.pid.len(), out.pid2.len(), out.interest.len(), out.interest2.len()];
        if lengths.iter().any(|&len| len != nbins) {
            return Err(PidError::Processing(format!(
                "Classifier returned {:?} values for a ray of {} bins",
                lengths, nbins
            )));
        }

        let classified = self.class.store(&out.pid, &out.interest);
        if let Some(class2) = self.class2.as_mut() {
            class2.store(&out.pid2, &out.interest2);
        }
        Ok(classified)
    }
}

/// Runs particle identification over polar scans
pub struct PidProcessor {
    config: PidConfig,
}

impl PidProcessor {
    pub fn new(config: PidConfig) -> Self {
        Self { config }
    }

    /// Processor with default settings
    pub fn standard() -> Self {
        Self::new(PidConfig::default())
    }

    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    /// Classify every ray of `scan` with `classifier`, one ray at a time.
    ///
    /// On success the scan gains `CLASS` (and `CLASS2`), each with an
    /// interest quality field. On failure nothing is attached and any
    /// intermediate moments synthesized here are removed again.
    pub fn process_scan<C: ParticleClassifier>(
        &self,
        scan: &mut PolarScan,
        classifier: &mut C,
    ) -> PidResult<PidSummary> {
        let prep = self.prepare(scan)?;
        let outcome = self.classify_rays(scan, &prep, classifier);
        self.finish(scan, &prep, outcome)
    }

    /// Classify the rays of `scan` in parallel, one classifier clone per worker.
    ///
    /// Produces the same result as [`PidProcessor::process_scan`].
    #[cfg(feature = "parallel")]
    pub fn process_scan_parallel<C>(&self, scan: &mut PolarScan, classifier: &C) -> PidResult<PidSummary>
    where
        C: ParticleClassifier + Clone + Send + Sync,
    {
        let prep = self.prepare(scan)?;
        let outcome = self.run_parallel(scan, &prep, || classifier.clone(), |c: &mut C, moments, rows| {
            c.compute_beam(moments)?;
            rows.store(c.output())
        });
        self.finish(scan, &prep, outcome)
    }

    /// Classify the rays of `scan` in parallel through one shared classifier.
    ///
    /// Workers take turns on the classifier; each holds the lock from
    /// `compute_beam` until its output has been stored.
    #[cfg(feature = "parallel")]
    pub fn process_scan_shared<C>(&self, scan: &mut PolarScan, classifier: &SharedClassifier<C>) -> PidResult<PidSummary>
    where
        C: ParticleClassifier + Send,
    {
        let prep = self.prepare(scan)?;
        let outcome = self.run_parallel(scan, &prep, || (), |_, moments, rows| {
            let mut guard = classifier.lock()?;
            guard.compute_beam(moments)?;
            rows.store(guard.output())
        });
        self.finish(scan, &prep, outcome)
    }

    /// Synthesize what is missing and gather the inputs common to all rays
    fn prepare(&self, scan: &mut PolarScan) -> PidResult<Preparation> {
        let (nbins, nrays) = (scan.nbins(), scan.nrays());
        if nbins == 0 || nrays == 0 {
            return Err(PidError::Input(format!("Empty scan: {} rays x {} bins", nrays, nbins)));
        }
        log::info!("Particle identification for {} rays x {} bins", nrays, nbins);

        let mut dr_synthesized = false;
        let ldr_source = if scan.has_parameter("LDR") {
            LdrSource::Ldr
        } else if self.config.derive_dr {
            // DR adds its offset to ZDR, the classifier input subtracts the bias
            dr_synthesized = synthesize_dr(scan, -self.config.zdr_offset, self.config.zdr_scale)?;
            if scan.has_parameter("DR") {
                LdrSource::Dr
            } else {
                LdrSource::Zero
            }
        } else {
            LdrSource::Zero
        };
        log::debug!("LDR source: {:?}", ldr_source);

        let snr_synthesized = synthesize_snr(scan)?;
        let snr_fallback = if scan.has_parameter("SNRH") {
            None
        } else {
            log::warn!("No SNRH available, using {} dB throughout", SNR_FLOOR);
            Some(constant_ray(nbins, SNR_FLOOR))
        };

        Ok(Preparation {
            ldr_source,
            snr_synthesized,
            dr_synthesized,
            snr_fallback,
            zero_ldr: constant_ray(nbins, 0.0),
            tempc: tempc_ray(scan),
        })
    }

    fn classify_rays<C: ParticleClassifier>(
        &self,
        scan: &PolarScan,
        prep: &Preparation,
        classifier: &mut C,
    ) -> PidResult<ClassOutputs> {
        let mut outputs = ClassOutputs::new(scan.nbins(), scan.nrays(), self.config.secondary)?;
        let mut classified = 0;
        for (ray, mut rows) in outputs.rows()?.into_iter().enumerate() {
            let vectors = RayVectors::extract(scan, prep, ray, self.config.zdr_offset)?;
            classifier.compute_beam(&vectors.moments(prep))?;
            classified += rows.store(classifier.output())?;
        }
        outputs.classified_bins = classified;
        Ok(outputs)
    }

    /// Classify rays on the rayon pool, each worker writing straight into
    /// its ray's output rows
    #[cfg(feature = "parallel")]
    fn run_parallel<S, I, F>(&self, scan: &PolarScan, prep: &Preparation, init: I, classify: F) -> PidResult<ClassOutputs>
    where
        I: Fn() -> S + Send + Sync,
        F: Fn(&mut S, &BeamMoments<'_>, &mut RayRows<'_>) -> PidResult<usize> + Send + Sync,
    {
        use rayon::prelude::*;

        let zdr_offset = self.config.zdr_offset;
        let mut outputs = ClassOutputs::new(scan.nbins(), scan.nrays(), self.config.secondary)?;
        let classified = outputs
            .rows()?
            .into_par_iter()
            .enumerate()
            .map_init(init, |state, (ray, mut rows)| {
                let vectors = RayVectors::extract(scan, prep, ray, zdr_offset)?;
                classify(state, &vectors.moments(prep), &mut rows)
            })
            .try_reduce(|| 0, |a, b| Ok(a + b))?;
        outputs.classified_bins = classified;
        Ok(outputs)
    }

    fn finish(&self, scan: &mut PolarScan, prep: &Preparation, outcome: PidResult<ClassOutputs>) -> PidResult<PidSummary> {
        match outcome.and_then(|outputs| outputs.attach(scan)) {
            Ok(classified_bins) => {
                if !self.config.keep_intermediates {
                    remove_intermediates(scan, prep);
                }
                let summary = PidSummary {
                    nrays: scan.nrays(),
                    nbins: scan.nbins(),
                    classified_bins,
                    snr_synthesized: prep.snr_synthesized,
                    dr_synthesized: prep.dr_synthesized,
                    ldr_source: prep.ldr_source,
                };
                log::info!(
                    "Particle identification completed: {} of {} bins classified",
                    summary.classified_bins,
                    summary.nrays * summary.nbins
                );
                Ok(summary)
            }
            Err(e) => {
                log::error!("Particle identification failed: {}", e);
                remove_intermediates(scan, prep);
                Err(e)
            }
        }
    }
}

fn remove_intermediates(scan: &mut PolarScan, prep: &Preparation) {
    if prep.snr_synthesized {
        scan.remove_parameter("SNRH");
    }
    if prep.dr_synthesized {
        scan.remove_parameter("DR");
    }
}

/// A classifier shared between threads.
///
/// The lock is held from `compute_beam` until its output has been copied,
/// so concurrent callers never see each other's beams.
#[derive(Debug)]
pub struct SharedClassifier<C> {
    inner: Arc<Mutex<C>>,
}

impl<C> Clone for SharedClassifier<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: ParticleClassifier> SharedClassifier<C> {
    pub fn new(classifier: C) -> Self {
        Self {
            inner: Arc::new(Mutex::new(classifier)),
        }
    }

    /// Classify one beam and return a copy of the result
    pub fn classify(&self, moments: &BeamMoments<'_>) -> PidResult<BeamClassification> {
        let mut classifier = self.lock()?;
        classifier.compute_beam(moments)?;
        Ok(classifier.output().clone())
    }

    /// Exclusive access to the classifier for as long as the guard lives
    pub fn lock(&self) -> PidResult<MutexGuard<'_, C>> {
        self.inner
            .lock()
            .map_err(|_| PidError::Processing("Classifier lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::derived::{depolarization_ratio, DR_GAIN};
    use crate::core::output::{INTEREST_GAIN, PID_INTEREST_TASK};
    use crate::types::{ValueType, MISSING};

    /// Classifies every bin with data in `dbz` as class 2 with interest 0.6
    #[derive(Debug, Clone, Default)]
    struct DbzClassifier {
        output: BeamClassification,
        calls: usize,
        fail_on_call: Option<usize>,
    }

    impl ParticleClassifier for DbzClassifier {
        fn compute_beam(&mut self, moments: &BeamMoments<'_>) -> PidResult<()> {
            self.calls += 1;
            if self.fail_on_call == Some(self.calls) {
                return Err(PidError::Processing("injected".to_string()));
            }
            let n = moments.nbins();
            let pid: Vec<u8> = moments.dbz.iter().map(|&v| if v == MISSING { 0 } else { 2 }).collect();
            self.output = BeamClassification {
                interest: pid.iter().map(|&id| if id == 0 { 0.0 } else { 0.6 }).collect(),
                pid2: vec![0; n],
                interest2: vec![0.0; n],
                pid,
            };
            Ok(())
        }

        fn output(&self) -> &BeamClassification {
            &self.output
        }
    }

    fn scan() -> PolarScan {
        let mut scan = PolarScan::new(3, 2, 1000.0, 1.0);
        let mut dbzh = ScanParam::new("DBZH", Codec::new(0.5, -32.0, DataType::U8), 255.0, 0.0, 3, 2);
        dbzh.set_converted_value(0, 0, 10.0);
        dbzh.set_converted_value(2, 1, 40.0);
        scan.add_parameter(dbzh).unwrap();
        scan
    }

    #[test]
    fn test_process_scan_attaches_classes() {
        let mut scan = scan();
        let mut classifier = DbzClassifier::default();
        let summary = PidProcessor::standard().process_scan(&mut scan, &mut classifier).unwrap();

        assert_eq!(summary.classified_bins, 2);
        assert_eq!(summary.ldr_source, LdrSource::Zero);
        assert!(summary.snr_synthesized);
        assert_eq!(classifier.calls, 2);
        assert!(!scan.has_parameter("SNRH"));

        let class = scan.parameter("CLASS").unwrap();
        assert_eq!(class.converted_value(0, 0), (ValueType::Data, 2.0));
        assert_eq!(class.converted_value(1, 0).0, ValueType::Nodata);
        assert_eq!(class.converted_value(2, 1), (ValueType::Data, 2.0));

        let interest = class.quality_field_by_task(PID_INTEREST_TASK).unwrap();
        assert!((interest.converted_value(0, 0) - 0.6).abs() <= INTEREST_GAIN / 2.0);
        assert_eq!(interest.converted_value(1, 0), 0.0);

        let class2 = scan.parameter("CLASS2").unwrap();
        assert!((0..3).all(|bin| class2.converted_value(bin, 0).0 == ValueType::Nodata));
    }

    #[test]
    fn test_failed_ray_leaves_scan_unclassified() {
        let mut scan = scan();
        let mut classifier = DbzClassifier {
            fail_on_call: Some(2),
            ..Default::default()
        };
        let config = PidConfig {
            keep_intermediates: true,
            ..Default::default()
        };
        let result = PidProcessor::new(config).process_scan(&mut scan, &mut classifier);

        assert!(matches!(result, Err(PidError::Processing(_))));
        assert!(!scan.has_parameter("CLASS"));
        assert!(!scan.has_parameter("CLASS2"));
        assert!(!scan.has_parameter("SNRH"));
        assert!(scan.has_parameter("DBZH"));
    }

    #[test]
    fn test_keep_intermediates() {
        let mut scan = scan();
        let config = PidConfig {
            keep_intermediates: true,
            secondary: false,
            ..Default::default()
        };
        PidProcessor::new(config)
            .process_scan(&mut scan, &mut DbzClassifier::default())
            .unwrap();
        assert!(scan.has_parameter("SNRH"));
        assert!(scan.has_parameter("CLASS"));
        assert!(!scan.has_parameter("CLASS2"));
    }

    #[test]
    fn test_empty_scan_is_rejected() {
        let mut scan = PolarScan::new(0, 4, 1000.0, 0.0);
        let result = PidProcessor::standard().process_scan(&mut scan, &mut DbzClassifier::default());
        assert!(matches!(result, Err(PidError::Input(_))));
    }

    #[test]
    fn test_short_classifier_output_is_rejected() {
        let mut outputs = ClassOutputs::new(3, 1, true).unwrap();
        let beam = BeamClassification {
            pid: vec![1, 1],
            pid2: vec![0, 0],
            interest: vec![0.5, 0.5],
            interest2: vec![0.0, 0.0],
        };
        let mut rows = outputs.rows().unwrap();
        assert!(matches!(rows[0].store(&beam), Err(PidError::Processing(_))));
    }

    /// Records the ZDR each beam arrives with
    #[derive(Debug, Clone, Default)]
    struct ZdrRecorder {
        seen: Vec<Vec<f64>>,
        output: BeamClassification,
    }

    impl ParticleClassifier for ZdrRecorder {
        fn compute_beam(&mut self, moments: &BeamMoments<'_>) -> PidResult<()> {
            let n = moments.nbins();
            self.seen.push(moments.zdr.to_vec());
            self.output = BeamClassification {
                pid: vec![0; n],
                pid2: vec![0; n],
                interest: vec![0.0; n],
                interest2: vec![0.0; n],
            };
            Ok(())
        }

        fn output(&self) -> &BeamClassification {
            &self.output
        }
    }

    fn zdr_rhohv_scan() -> PolarScan {
        let mut scan = scan();
        let codec = Codec::new(1.0, 0.0, DataType::F64);
        let mut zdr = ScanParam::new("ZDR", codec, MISSING, MISSING, 3, 2);
        let mut rhohv = ScanParam::new("RHOHV", codec, MISSING, MISSING, 3, 2);
        for ray in 0..2 {
            for bin in 0..3 {
                zdr.set_converted_value(bin, ray, 0.5 + bin as f64);
                rhohv.set_converted_value(bin, ray, 0.97);
            }
        }
        zdr.set_value(2, 1, MISSING);
        scan.add_parameter(zdr).unwrap();
        scan.add_parameter(rhohv).unwrap();
        scan
    }

    #[test]
    fn test_zdr_offset_is_subtracted() {
        let mut scan = zdr_rhohv_scan();
        let mut recorder = ZdrRecorder::default();
        let config = PidConfig {
            zdr_offset: 0.25,
            ..Default::default()
        };
        PidProcessor::new(config).process_scan(&mut scan, &mut recorder).unwrap();

        assert_eq!(recorder.seen.len(), 2);
        assert_eq!(recorder.seen[0], vec![0.25, 1.25, 2.25]);
        assert_eq!(recorder.seen[1], vec![0.25, 1.25, MISSING]);
    }

    #[test]
    fn test_derived_dr_uses_corrected_zdr() {
        let bias = 0.4;
        let scale = 1.5;
        let mut scan = zdr_rhohv_scan();
        let config = PidConfig {
            zdr_offset: bias,
            zdr_scale: scale,
            derive_dr: true,
            keep_intermediates: true,
            ..Default::default()
        };
        let summary = PidProcessor::new(config)
            .process_scan(&mut scan, &mut DbzClassifier::default())
            .unwrap();
        assert_eq!(summary.ldr_source, LdrSource::Dr);

        let dr = scan.parameter("DR").unwrap();
        for bin in 0..3 {
            let zdr = 0.5 + bin as f64;
            let expected = depolarization_ratio(zdr - bias, 0.97, 0.0, scale);
            let (kind, value) = dr.converted_value(bin, 0);
            assert_eq!(kind, ValueType::Data);
            assert!(
                (value - expected).abs() <= DR_GAIN / 2.0 + 1e-9,
                "bin {}: {} vs {}",
                bin,
                value,
                expected
            );
        }
    }

    #[test]
    fn test_failed_attach_keeps_existing_class() {
        let mut scan = scan();
        let mut previous = empty_class_param("CLASS", 3, 2).unwrap();
        previous.set_value(0, 0, 7.0);
        scan.add_parameter(previous).unwrap();

        // CLASS2 of the wrong extent makes the attach fail after CLASS checks out
        let mut outputs = ClassOutputs::new(3, 2, true).unwrap();
        outputs.class2 = Some(empty_class_param("CLASS2", 4, 2).unwrap());

        assert!(matches!(outputs.attach(&mut scan), Err(PidError::Dimension { .. })));
        assert_eq!(scan.parameter("CLASS").unwrap().value(0, 0), 7.0);
        assert!(!scan.has_parameter("CLASS2"));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let mut sequential = scan();
        let mut parallel = scan();
        let processor = PidProcessor::standard();

        let a = processor.process_scan(&mut sequential, &mut DbzClassifier::default()).unwrap();
        let b = processor.process_scan_parallel(&mut parallel, &DbzClassifier::default()).unwrap();

        assert_eq!(a, b);
        assert_eq!(
            sequential.parameter("CLASS").unwrap().data,
            parallel.parameter("CLASS").unwrap().data
        );
    }
}
