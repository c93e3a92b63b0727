use crate::types::{PidError, PidResult, PolarScan, ValueType, MISSING};
use ndarray::Array1;

/// Extract one ray of a moment as physical values.
///
/// Every `Data` bin becomes `value - bias`; NODATA and UNDETECT both become
/// [`MISSING`]. The quantity must be present: check with
/// [`PolarScan::has_parameter`] first.
pub fn converted_ray(scan: &PolarScan, quantity: &str, ray: usize, bias: f64) -> PidResult<Array1<f64>> {
    let param = scan
        .parameter(quantity)
        .ok_or_else(|| PidError::MissingQuantity(quantity.to_string()))?;

    if ray >= param.nrays() {
        return Err(PidError::Input(format!(
            "Ray {} out of range for {} with {} rays",
            ray,
            quantity,
            param.nrays()
        )));
    }

    let values = (0..param.nbins())
        .map(|bin| match param.converted_value(bin, ray) {
            (ValueType::Data, value) => value - bias,
            _ => MISSING,
        })
        .collect::<Vec<f64>>();

    Ok(Array1::from(values))
}

/// Ray of `nbins` missing values
pub fn missing_ray(nbins: usize) -> Array1<f64> {
    constant_ray(nbins, MISSING)
}

pub fn constant_ray(nbins: usize, value: f64) -> Array1<f64> {
    Array1::from_elem(nbins, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Codec, DataType, ScanParam};

    fn scan_with_zdr() -> PolarScan {
        let mut scan = PolarScan::new(4, 2, 250.0, 0.0);
        let mut zdr = ScanParam::new("ZDR", Codec::new(0.1, -8.0, DataType::U8), 255.0, 0.0, 4, 2);
        zdr.set_converted_value(0, 1, 1.0);
        zdr.set_converted_value(1, 1, -0.5);
        zdr.set_value(2, 1, 0.0);
        scan.add_parameter(zdr).unwrap();
        scan
    }

    #[test]
    fn test_converted_ray_applies_bias() {
        let scan = scan_with_zdr();
        let ray = converted_ray(&scan, "ZDR", 1, 0.25).unwrap();

        assert_eq!(ray.len(), 4);
        assert!((ray[0] - 0.75).abs() < 1e-9);
        assert!((ray[1] + 0.75).abs() < 1e-9);
        assert_eq!(ray[2], MISSING);
        assert_eq!(ray[3], MISSING);
    }

    #[test]
    fn test_all_sentinels_give_missing_ray() {
        let scan = scan_with_zdr();
        let ray = converted_ray(&scan, "ZDR", 0, 0.0).unwrap();
        assert!(ray.iter().all(|&v| v == MISSING));
    }

    #[test]
    fn test_absent_quantity_is_an_error() {
        let scan = scan_with_zdr();
        assert!(matches!(
            converted_ray(&scan, "KDP", 0, 0.0),
            Err(PidError::MissingQuantity(q)) if q == "KDP"
        ));
        assert!(matches!(converted_ray(&scan, "ZDR", 2, 0.0), Err(PidError::Input(_))));
    }
}
