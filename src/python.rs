//! Python bindings: `Classifier`, `PolarScan` and `generate_pid`

use crate::core::{attach_temperature_profile, ClassifierConfig, FuzzyClassifier, PidConfig, PidProcessor};
use crate::core::output::PID_INTEREST_TASK;
use crate::core::temperature::TEMPC_ATTRIBUTE;
use crate::types::{Attribute, Codec, DataType, PidError, PolarScan, ScanParam};
use numpy::{PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::{PyIOError, PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

impl From<PidError> for PyErr {
    fn from(err: PidError) -> Self {
        match err {
            PidError::Io(_) => PyIOError::new_err(err.to_string()),
            PidError::MissingQuantity(_) => PyKeyError::new_err(err.to_string()),
            PidError::Configuration(_) | PidError::Input(_) | PidError::Dimension { .. } => {
                PyValueError::new_err(err.to_string())
            }
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

/// Python wrapper for FuzzyClassifier
#[pyclass(name = "Classifier")]
struct PyClassifier {
    inner: FuzzyClassifier,
}

#[pymethods]
impl PyClassifier {
    #[new]
    #[pyo3(signature = (thresholds_file, min_valid_interest = 0.5, median_filter_len = 0, replace_missing_ldr = false))]
    fn new(
        thresholds_file: String,
        min_valid_interest: f64,
        median_filter_len: usize,
        replace_missing_ldr: bool,
    ) -> PyResult<Self> {
        let config = ClassifierConfig {
            min_valid_interest,
            median_filter_len,
            replace_missing_ldr,
            ..Default::default()
        };
        let inner = FuzzyClassifier::from_thresholds_file(&thresholds_file, config)?;
        Ok(PyClassifier { inner })
    }

    /// (id, label, description) of every particle class
    fn particles(&self) -> Vec<(u8, String, String)> {
        self.inner
            .particles()
            .iter()
            .map(|p| (p.id, p.label.clone(), p.description.clone()))
            .collect()
    }
}

/// Python wrapper for PolarScan
#[pyclass(name = "PolarScan")]
struct PyPolarScan {
    inner: PolarScan,
}

#[pymethods]
impl PyPolarScan {
    #[new]
    #[pyo3(signature = (nbins, nrays, rscale, rstart, elangle = 0.0, height = 0.0))]
    fn new(nbins: usize, nrays: usize, rscale: f64, rstart: f64, elangle: f64, height: f64) -> Self {
        let mut inner = PolarScan::new(nbins, nrays, rscale, rstart);
        inner.elangle = elangle;
        inner.height = height;
        PyPolarScan { inner }
    }

    /// Add a moment from coded values, shape (nrays, nbins)
    #[pyo3(signature = (quantity, data, gain = 1.0, offset = 0.0, nodata = 255.0, undetect = 0.0))]
    fn add_parameter(
        &mut self,
        quantity: &str,
        data: PyReadonlyArray2<f64>,
        gain: f64,
        offset: f64,
        nodata: f64,
        undetect: f64,
    ) -> PyResult<()> {
        let codec = Codec::new(gain, offset, DataType::F64);
        let param = ScanParam::from_raw(quantity, codec, nodata, undetect, data.as_array().to_owned());
        self.inner.add_parameter(param)?;
        Ok(())
    }

    fn has_parameter(&self, quantity: &str) -> bool {
        self.inner.has_parameter(quantity)
    }

    fn parameter_names(&self) -> Vec<String> {
        self.inner.parameter_names().into_iter().map(String::from).collect()
    }

    /// Coded values of a parameter
    fn get_parameter(&self, py: Python, quantity: &str) -> PyResult<PyObject> {
        let param = self
            .inner
            .parameter(quantity)
            .ok_or_else(|| PidError::MissingQuantity(quantity.to_string()))?;
        Ok(param.data.to_pyarray(py).into())
    }

    /// Decoded interest attached to `CLASS` or `CLASS2`
    fn get_interest(&self, py: Python, quantity: &str) -> PyResult<PyObject> {
        let param = self
            .inner
            .parameter(quantity)
            .ok_or_else(|| PidError::MissingQuantity(quantity.to_string()))?;
        let field = param
            .quality_field_by_task(PID_INTEREST_TASK)
            .ok_or_else(|| PyKeyError::new_err(format!("{} has no interest field", quantity)))?;
        let interest = field.data.mapv(|raw| field.codec.decode(raw));
        Ok(interest.to_pyarray(py).into())
    }

    /// Set the per-bin temperature directly
    fn set_tempc(&mut self, tempc: Vec<f64>) {
        self.inner.add_attribute(TEMPC_ATTRIBUTE, Attribute::DoubleArray(tempc));
    }

    /// Derive the per-bin temperature from a vertical profile
    fn set_temperature_profile(&mut self, pheight: Vec<f64>, ptempc: Vec<f64>) -> PyResult<()> {
        attach_temperature_profile(&mut self.inner, &pheight, &ptempc)?;
        Ok(())
    }
}

/// Particle identification of a scan; returns the number of classified bins
#[pyfunction]
#[pyo3(signature = (scan, classifier, zdr_offset = 0.0, derive_dr = false, zdr_scale = 1.0))]
fn generate_pid(
    mut scan: PyRefMut<'_, PyPolarScan>,
    mut classifier: PyRefMut<'_, PyClassifier>,
    zdr_offset: f64,
    derive_dr: bool,
    zdr_scale: f64,
) -> PyResult<usize> {
    let processor = PidProcessor::new(PidConfig {
        zdr_offset,
        derive_dr,
        zdr_scale,
        ..Default::default()
    });
    let summary = processor.process_scan(&mut scan.inner, &mut classifier.inner)?;
    Ok(summary.classified_bins)
}

/// Python module definition
#[pymodule]
fn _ncarb(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyClassifier>()?;
    m.add_class::<PyPolarScan>()?;
    m.add_function(wrap_pyfunction!(generate_pid, m)?)?;
    Ok(())
}
