use ncarb::{BeamClassification, BeamMoments, ParticleClassifier, PidResult, SharedClassifier};
use ndarray::Array1;
use std::sync::{Arc, Barrier};
use std::thread;

/// Writes the beam's reflectivity back as class ids, yielding between bins
/// so that unsynchronised callers would interleave
#[derive(Debug, Default)]
struct EchoClassifier {
    output: BeamClassification,
}

impl ParticleClassifier for EchoClassifier {
    fn compute_beam(&mut self, moments: &BeamMoments<'_>) -> PidResult<()> {
        let n = moments.nbins();
        self.output.pid.clear();
        self.output.interest.clear();
        for &dbz in moments.dbz.iter() {
            self.output.pid.push(dbz as u8);
            self.output.interest.push(1.0);
            thread::yield_now();
        }
        self.output.pid2 = vec![0; n];
        self.output.interest2 = vec![0.0; n];
        Ok(())
    }

    fn output(&self) -> &BeamClassification {
        &self.output
    }
}

struct Beam {
    fill: Array1<f64>,
    dbz: Array1<f64>,
}

impl Beam {
    fn tagged(tag: u8, nbins: usize) -> Self {
        Self {
            fill: Array1::zeros(nbins),
            dbz: Array1::from_elem(nbins, tag as f64),
        }
    }

    fn moments(&self) -> BeamMoments<'_> {
        BeamMoments {
            snr: self.fill.view(),
            dbz: self.dbz.view(),
            zdr: self.fill.view(),
            kdp: self.fill.view(),
            ldr: self.fill.view(),
            rhohv: self.fill.view(),
            phidp: self.fill.view(),
            tempc: self.fill.view(),
        }
    }
}

#[test]
fn test_guarded_calls_never_mix_rays() {
    let shared = SharedClassifier::new(EchoClassifier::default());
    let nbins = 64;

    let handles: Vec<_> = (1..=8u8)
        .map(|tag| {
            let shared = shared.clone();
            thread::spawn(move || {
                let beam = Beam::tagged(tag, nbins);
                for _ in 0..200 {
                    let out = shared.classify(&beam.moments()).expect("Classification failed");
                    assert_eq!(out.pid.len(), nbins);
                    assert!(
                        out.pid.iter().all(|&id| id == tag),
                        "ray {} received {:?}",
                        tag,
                        out.pid
                    );
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Worker panicked");
    }
}

#[test]
fn test_split_critical_section_reads_another_ray() {
    let shared = SharedClassifier::new(EchoClassifier::default());
    let barrier = Arc::new(Barrier::new(2));
    let nbins = 8;

    let other = {
        let shared = shared.clone();
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            {
                let mut classifier = shared.lock().expect("Lock failed");
                classifier
                    .compute_beam(&Beam::tagged(2, nbins).moments())
                    .expect("Classification failed");
            }
            barrier.wait();
        })
    };

    // Compute ray 1, then let go of the classifier before reading back
    {
        let mut classifier = shared.lock().expect("Lock failed");
        classifier
            .compute_beam(&Beam::tagged(1, nbins).moments())
            .expect("Classification failed");
    }
    barrier.wait();
    barrier.wait();
    let read_back = shared.lock().expect("Lock failed").output().pid.clone();

    other.join().expect("Worker panicked");
    assert_eq!(read_back, vec![2; nbins], "output of the other ray was expected");
}
