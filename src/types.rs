use ndarray::{Array2, ArrayView1};
use num_traits::{Bounded, NumCast, ToPrimitive};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Physical value standing in for both NODATA and UNDETECT in ray vectors
pub const MISSING: f64 = -9999.0;

/// Storage type of a parameter or quality field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    U8,
    I8,
    U16,
    I16,
    F32,
    F64,
}

impl DataType {
    /// Round and saturate a raw value to what this storage type can hold
    pub fn saturate(self, raw: f64) -> f64 {
        match self {
            DataType::U8 => saturate_as::<u8>(raw),
            DataType::I8 => saturate_as::<i8>(raw),
            DataType::U16 => saturate_as::<u16>(raw),
            DataType::I16 => saturate_as::<i16>(raw),
            DataType::F32 => raw as f32 as f64,
            DataType::F64 => raw,
        }
    }
}

fn saturate_as<T: Bounded + NumCast + ToPrimitive>(raw: f64) -> f64 {
    let lo = T::min_value().to_f64().unwrap_or(f64::MIN);
    let hi = T::max_value().to_f64().unwrap_or(f64::MAX);
    let rounded = raw.round().clamp(lo, hi);
    <T as NumCast>::from(rounded)
        .and_then(|v| v.to_f64())
        .unwrap_or(lo)
}

/// Linear gain/offset mapping between stored codes and physical values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Codec {
    pub gain: f64,
    pub offset: f64,
    pub datatype: DataType,
}

impl Codec {
    pub fn new(gain: f64, offset: f64, datatype: DataType) -> Self {
        Self { gain, offset, datatype }
    }

    /// Physical value of a stored code
    pub fn decode(&self, raw: f64) -> f64 {
        self.offset + self.gain * raw
    }

    /// Stored code for a physical value, rounded and saturated to the storage type
    pub fn encode(&self, value: f64) -> f64 {
        let raw = if self.gain != 0.0 {
            (value - self.offset) / self.gain
        } else {
            value - self.offset
        };
        self.datatype.saturate(raw)
    }
}

/// Classification of a decoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// A real measurement
    Data,
    /// Nothing measured or expected here
    Nodata,
    /// Measured but below the detection threshold
    Undetect,
}

/// Scan-, parameter- or quality-level attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attribute {
    Long(i64),
    Double(f64),
    String(String),
    LongArray(Vec<i64>),
    DoubleArray(Vec<f64>),
}

impl Attribute {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attribute::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_double_array(&self) -> Option<&[f64]> {
        match self {
            Attribute::DoubleArray(values) => Some(values),
            _ => None,
        }
    }
}

pub type Attributes = BTreeMap<String, Attribute>;

/// Auxiliary per-bin field attached to a parameter, e.g. classification interest
#[derive(Debug, Clone)]
pub struct QualityField {
    pub codec: Codec,
    /// Stored codes, shape (nrays, nbins)
    pub data: Array2<f64>,
    pub attributes: Attributes,
}

impl QualityField {
    pub fn new(codec: Codec, data: Array2<f64>) -> Self {
        Self {
            codec,
            data,
            attributes: Attributes::new(),
        }
    }

    pub fn converted_value(&self, bin: usize, ray: usize) -> f64 {
        self.codec.decode(self.data[[ray, bin]])
    }

    pub fn set_converted_value(&mut self, bin: usize, ray: usize, value: f64) {
        self.data[[ray, bin]] = self.codec.encode(value);
    }

    pub fn task(&self) -> Option<&str> {
        self.attributes.get("how/task").and_then(Attribute::as_str)
    }
}

/// One named moment of a polar scan, stored as coded values
#[derive(Debug, Clone)]
pub struct ScanParam {
    pub quantity: String,
    pub codec: Codec,
    pub nodata: f64,
    pub undetect: f64,
    /// Stored codes, shape (nrays, nbins)
    pub data: Array2<f64>,
    pub attributes: Attributes,
    pub quality_fields: Vec<QualityField>,
}

impl ScanParam {
    /// Create a parameter with every bin set to its nodata code
    pub fn new(quantity: &str, codec: Codec, nodata: f64, undetect: f64, nbins: usize, nrays: usize) -> Self {
        Self {
            quantity: quantity.to_string(),
            codec,
            nodata,
            undetect,
            data: Array2::from_elem((nrays, nbins), nodata),
            attributes: Attributes::new(),
            quality_fields: Vec::new(),
        }
    }

    /// Build a parameter from already coded values
    pub fn from_raw(quantity: &str, codec: Codec, nodata: f64, undetect: f64, data: Array2<f64>) -> Self {
        Self {
            quantity: quantity.to_string(),
            codec,
            nodata,
            undetect,
            data,
            attributes: Attributes::new(),
            quality_fields: Vec::new(),
        }
    }

    pub fn nbins(&self) -> usize {
        self.data.ncols()
    }

    pub fn nrays(&self) -> usize {
        self.data.nrows()
    }

    pub fn value(&self, bin: usize, ray: usize) -> f64 {
        self.data[[ray, bin]]
    }

    /// Store a raw code as is (apart from storage-type saturation)
    pub fn set_value(&mut self, bin: usize, ray: usize, raw: f64) {
        self.data[[ray, bin]] = self.codec.datatype.saturate(raw);
    }

    /// Decode one bin. Non-`Data` kinds carry the raw sentinel code.
    pub fn converted_value(&self, bin: usize, ray: usize) -> (ValueType, f64) {
        let raw = self.data[[ray, bin]];
        if raw == self.nodata {
            (ValueType::Nodata, raw)
        } else if raw == self.undetect {
            (ValueType::Undetect, raw)
        } else {
            (ValueType::Data, self.codec.decode(raw))
        }
    }

    /// Encode a physical value into one bin
    pub fn set_converted_value(&mut self, bin: usize, ray: usize, value: f64) {
        self.data[[ray, bin]] = self.codec.encode(value);
    }

    pub fn ray(&self, ray: usize) -> ArrayView1<'_, f64> {
        self.data.row(ray)
    }

    pub fn add_quality_field(&mut self, field: QualityField) {
        self.quality_fields.push(field);
    }

    /// First quality field whose `how/task` matches
    pub fn quality_field_by_task(&self, task: &str) -> Option<&QualityField> {
        self.quality_fields.iter().find(|f| f.task() == Some(task))
    }
}

/// One elevation sweep: `nbins` range gates along each of `nrays` rays
#[derive(Debug, Clone)]
pub struct PolarScan {
    nbins: usize,
    nrays: usize,
    /// Range gate spacing in metres
    pub rscale: f64,
    /// Range to the first gate in km
    pub rstart: f64,
    /// Elevation angle in radians
    pub elangle: f64,
    /// Antenna height above sea level in metres
    pub height: f64,
    params: BTreeMap<String, ScanParam>,
    attributes: Attributes,
}

impl PolarScan {
    pub fn new(nbins: usize, nrays: usize, rscale: f64, rstart: f64) -> Self {
        Self {
            nbins,
            nrays,
            rscale,
            rstart,
            elangle: 0.0,
            height: 0.0,
            params: BTreeMap::new(),
            attributes: Attributes::new(),
        }
    }

    pub fn nbins(&self) -> usize {
        self.nbins
    }

    pub fn nrays(&self) -> usize {
        self.nrays
    }

    pub fn has_parameter(&self, quantity: &str) -> bool {
        self.params.contains_key(quantity)
    }

    pub fn parameter(&self, quantity: &str) -> Option<&ScanParam> {
        self.params.get(quantity)
    }

    pub fn parameter_mut(&mut self, quantity: &str) -> Option<&mut ScanParam> {
        self.params.get_mut(quantity)
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        self.params.keys().map(String::as_str).collect()
    }

    /// Check that a parameter and its quality fields match the scan extent
    pub fn check_extent(&self, param: &ScanParam) -> PidResult<()> {
        let found = param.data.dim();
        if found != (self.nrays, self.nbins) {
            return Err(PidError::Dimension {
                quantity: param.quantity.clone(),
                expected: (self.nrays, self.nbins),
                found,
            });
        }
        for field in &param.quality_fields {
            if field.data.dim() != found {
                return Err(PidError::Dimension {
                    quantity: format!("{} quality field", param.quantity),
                    expected: found,
                    found: field.data.dim(),
                });
            }
        }
        Ok(())
    }

    /// Add or replace a parameter. Its extent must match the scan.
    pub fn add_parameter(&mut self, param: ScanParam) -> PidResult<()> {
        self.check_extent(&param)?;
        self.params.insert(param.quantity.clone(), param);
        Ok(())
    }

    pub fn remove_parameter(&mut self, quantity: &str) -> Option<ScanParam> {
        self.params.remove(quantity)
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn add_attribute(&mut self, name: &str, value: Attribute) {
        self.attributes.insert(name.to_string(), value);
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Attribute> {
        self.attributes.remove(name)
    }
}

/// Error types for particle identification
#[derive(Debug, thiserror::Error)]
pub enum PidError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Quantity {0} not present in scan")]
    MissingQuantity(String),

    #[error("Dimension mismatch for {quantity}: expected {expected:?}, found {found:?}")]
    Dimension {
        quantity: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Classification attempted before thresholds were loaded")]
    ThresholdsNotLoaded,

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for particle identification operations
pub type PidResult<T> = Result<T, PidError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturation() {
        assert_eq!(DataType::U8.saturate(300.4), 255.0);
        assert_eq!(DataType::U8.saturate(-3.0), 0.0);
        assert_eq!(DataType::U8.saturate(12.6), 13.0);
        assert_eq!(DataType::I8.saturate(-200.0), -128.0);
        assert_eq!(DataType::F64.saturate(1.25), 1.25);
    }

    #[test]
    fn test_converted_value_kinds() {
        let codec = Codec::new(0.5, -32.0, DataType::U8);
        let mut param = ScanParam::new("DBZH", codec, 255.0, 0.0, 3, 1);
        param.set_value(0, 0, 0.0);
        param.set_converted_value(1, 0, 10.0);

        assert_eq!(param.converted_value(0, 0).0, ValueType::Undetect);
        assert_eq!(param.converted_value(1, 0), (ValueType::Data, 10.0));
        assert_eq!(param.converted_value(2, 0).0, ValueType::Nodata);
    }

    #[test]
    fn test_add_parameter_checks_extent() {
        let mut scan = PolarScan::new(4, 2, 250.0, 0.0);
        let codec = Codec::new(1.0, 0.0, DataType::F64);
        let bad = ScanParam::new("ZDR", codec, MISSING, MISSING, 3, 2);
        assert!(matches!(scan.add_parameter(bad), Err(PidError::Dimension { .. })));

        let good = ScanParam::new("ZDR", codec, MISSING, MISSING, 4, 2);
        scan.add_parameter(good).unwrap();
        assert!(scan.has_parameter("ZDR"));
        assert!(scan.remove_parameter("ZDR").is_some());
        assert!(!scan.has_parameter("ZDR"));
    }
}
