use crate::types::{Attribute, Codec, DataType, PidError, PidResult, QualityField, ScanParam};
use ndarray::Array2;

pub const PID_GAIN: f64 = 1.0;
pub const PID_OFFSET: f64 = 0.0;
pub const PID_NODATA: f64 = 255.0;
pub const PID_UNDETECT: f64 = 0.0;
/// Gain of the interest quality field: [0, 1] in 0.5 % steps
pub const INTEREST_GAIN: f64 = 0.005;
pub const INTEREST_OFFSET: f64 = 0.0;

pub const PID_TASK: &str = "ncar.pid.hydrometeor_class";
pub const PID_INTEREST_TASK: &str = "ncar.pid.interest";

/// Codec of the interest quality fields attached to `CLASS` and `CLASS2`
pub fn interest_codec() -> Codec {
    Codec::new(INTEREST_GAIN, INTEREST_OFFSET, DataType::U8)
}

/// Allocate a `nrays x nbins` array without aborting when memory is short
fn try_alloc(quantity: &str, nbins: usize, nrays: usize, fill: f64) -> PidResult<Array2<f64>> {
    let len = nbins.checked_mul(nrays).ok_or_else(|| {
        PidError::Resource(format!("{} of {} x {} bins overflows", quantity, nrays, nbins))
    })?;
    let mut buffer: Vec<f64> = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|e| PidError::Resource(format!("Cannot allocate {}: {}", quantity, e)))?;
    buffer.resize(len, fill);
    Array2::from_shape_vec((nrays, nbins), buffer)
        .map_err(|e| PidError::Resource(format!("Cannot shape {}: {}", quantity, e)))
}

/// Empty classification parameter with its interest quality field.
///
/// Every bin starts as nodata and interest 0.
pub fn empty_class_param(quantity: &str, nbins: usize, nrays: usize) -> PidResult<ScanParam> {
    let codec = Codec::new(PID_GAIN, PID_OFFSET, DataType::U8);
    let data = try_alloc(quantity, nbins, nrays, PID_NODATA)?;
    let mut param = ScanParam::from_raw(quantity, codec, PID_NODATA, PID_UNDETECT, data);
    param
        .attributes
        .insert("how/task".to_string(), Attribute::String(PID_TASK.to_string()));

    let interest = try_alloc(quantity, nbins, nrays, 0.0)?;
    let mut field = QualityField::new(interest_codec(), interest);
    field
        .attributes
        .insert("how/task".to_string(), Attribute::String(PID_INTEREST_TASK.to_string()));
    param.add_quality_field(field);

    Ok(param)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueType;

    #[test]
    fn test_empty_class_param() {
        let param = empty_class_param("CLASS", 5, 3).unwrap();
        assert_eq!(param.quantity, "CLASS");
        assert_eq!(param.data.dim(), (3, 5));
        assert_eq!(param.codec.datatype, DataType::U8);
        assert_eq!((param.nodata, param.undetect), (255.0, 0.0));
        assert_eq!(param.converted_value(4, 2).0, ValueType::Nodata);
        assert_eq!(param.attributes["how/task"].as_str(), Some(PID_TASK));

        let field = param.quality_field_by_task(PID_INTEREST_TASK).unwrap();
        assert_eq!(field.data.dim(), (3, 5));
        assert_eq!(field.codec.gain, INTEREST_GAIN);
    }

    #[test]
    fn test_interest_round_trip() {
        let mut param = empty_class_param("CLASS", 201, 1).unwrap();
        let field = &mut param.quality_fields[0];
        for bin in 0..=200 {
            let interest = bin as f64 / 200.0 - 0.0013;
            let interest = interest.clamp(0.0, 1.0);
            field.set_converted_value(bin, 0, interest);
            let decoded = field.converted_value(bin, 0);
            assert!((decoded - interest).abs() <= INTEREST_GAIN / 2.0 + 1e-12);
        }
    }

    #[test]
    fn test_overflowing_extent_is_a_resource_error() {
        assert!(matches!(
            empty_class_param("CLASS", usize::MAX, 2),
            Err(PidError::Resource(_))
        ));
    }
}
