//! Moments synthesized from the scan when the radar did not deliver them:
//! signal-to-noise ratio from reflectivity, and depolarization ratio from
//! ZDR and RHOHV as a stand-in for LDR.

use crate::types::{Codec, DataType, PidResult, PolarScan, ScanParam, ValueType, MISSING};

/// Range gate spacing (m) assumed when a scan reports none
pub const DEFAULT_RSCALE: f64 = 100.0;
/// Reflectivity of the receiver noise at 100 km, dBZ
pub const NOISE_DBZ_AT_100KM: f64 = 0.0;
/// SNR given to bins without detected reflectivity, dB
pub const SNR_FLOOR: f64 = -20.0;

/// DR codes span -49.8 to 0.8 dB; stronger (non-physical) values saturate
/// at code 254
pub const DR_GAIN: f64 = 0.2;
pub const DR_OFFSET: f64 = -50.0;
pub const DR_NODATA: f64 = 255.0;
pub const DR_UNDETECT: f64 = 0.0;
/// Upper RHOHV bound used in the DR formula
pub const RHOHV_CLAMP: f64 = 0.999;

/// Derive `SNRH` from `DBZH` and the range to each gate.
///
/// Returns `Ok(true)` when the parameter was added. A scan that already has
/// `SNRH`, or has no `DBZH` to derive it from, is left untouched.
pub fn synthesize_snr(scan: &mut PolarScan) -> PidResult<bool> {
    if scan.has_parameter("SNRH") {
        log::debug!("SNRH already present, nothing to synthesize");
        return Ok(false);
    }
    let dbzh = match scan.parameter("DBZH") {
        Some(param) => param,
        None => {
            log::warn!("No DBZH in scan, cannot estimate SNRH");
            return Ok(false);
        }
    };

    let (nbins, nrays) = (scan.nbins(), scan.nrays());
    let rscale_km = if scan.rscale > 0.0 { scan.rscale } else { DEFAULT_RSCALE } * 0.001;
    let noise: Vec<f64> = (0..nbins)
        .map(|bin| noise_dbz(scan.rstart, rscale_km, bin))
        .collect();

    let codec = Codec::new(1.0, 0.0, DataType::F64);
    let mut snrh = ScanParam::new("SNRH", codec, MISSING, MISSING, nbins, nrays);
    for ray in 0..nrays {
        for (bin, noise_dbz) in noise.iter().enumerate() {
            let snr = match dbzh.converted_value(bin, ray) {
                (ValueType::Data, dbz) => dbz - noise_dbz,
                _ => SNR_FLOOR,
            };
            snrh.set_value(bin, ray, snr);
        }
    }

    log::debug!("Synthesized SNRH for {} rays x {} bins", nrays, nbins);
    scan.add_parameter(snrh)?;
    Ok(true)
}

/// Noise-equivalent reflectivity at a gate, dBZ
pub fn noise_dbz(rstart_km: f64, rscale_km: f64, bin: usize) -> f64 {
    let mut range_km = rstart_km + bin as f64 * rscale_km;
    if range_km <= 0.0 {
        range_km = 0.5 * rscale_km;
    }
    NOISE_DBZ_AT_100KM + 20.0 * (range_km.log10() - 100.0f64.log10())
}

/// Depolarization ratio in dB from ZDR (dB) and RHOHV.
///
/// `zdr_offset` is added and `zdr_scale` multiplied in when non-zero, before
/// ZDR is linearized. RHOHV is capped at [`RHOHV_CLAMP`].
pub fn depolarization_ratio(zdr: f64, rhohv: f64, zdr_offset: f64, zdr_scale: f64) -> f64 {
    let mut zdr = zdr;
    if zdr_offset != 0.0 {
        zdr += zdr_offset;
    }
    if zdr_scale != 0.0 {
        zdr *= zdr_scale;
    }
    let z = 10.0f64.powf(zdr / 10.0);
    let rho = rhohv.min(RHOHV_CLAMP);
    let cross = 2.0 * z.sqrt() * rho;
    10.0 * ((z + 1.0 - cross) / (z + 1.0 + cross)).log10()
}

/// Codec of the `DR` parameter
pub fn dr_codec() -> Codec {
    Codec::new(DR_GAIN, DR_OFFSET, DataType::U8)
}

/// Stored code for a DR value, kept clear of the nodata and undetect codes
fn encode_dr(dr_db: f64) -> f64 {
    let raw = ((dr_db - DR_OFFSET) / DR_GAIN).round();
    if raw.is_nan() {
        return DR_NODATA;
    }
    raw.clamp(DR_UNDETECT + 1.0, DR_NODATA - 1.0)
}

/// Derive `DR` from `ZDR` and `RHOHV`.
///
/// Returns `Ok(false)` without touching the scan when either input is
/// missing or `DR` already exists.
pub fn synthesize_dr(scan: &mut PolarScan, zdr_offset: f64, zdr_scale: f64) -> PidResult<bool> {
    if scan.has_parameter("DR") {
        log::debug!("DR already present, nothing to synthesize");
        return Ok(false);
    }
    let (zdr, rhohv) = match (scan.parameter("ZDR"), scan.parameter("RHOHV")) {
        (Some(zdr), Some(rhohv)) => (zdr, rhohv),
        _ => {
            log::warn!("DR requires both ZDR and RHOHV, falling back to LDR proxy");
            return Ok(false);
        }
    };

    let (nbins, nrays) = (scan.nbins(), scan.nrays());
    let mut dr = ScanParam::new("DR", dr_codec(), DR_NODATA, DR_UNDETECT, nbins, nrays);

    for ray in 0..nrays {
        for bin in 0..nbins {
            let raw = match (zdr.converted_value(bin, ray), rhohv.converted_value(bin, ray)) {
                ((ValueType::Data, z), (ValueType::Data, rho)) => {
                    encode_dr(depolarization_ratio(z, rho, zdr_offset, zdr_scale))
                }
                // Rare: assume 0 dB ZDR where RHOHV is still measured
                ((ValueType::Undetect, _), (ValueType::Data, rho)) => {
                    encode_dr(depolarization_ratio(0.0, rho, zdr_offset, zdr_scale))
                }
                ((ValueType::Data, _), (ValueType::Undetect, _)) => DR_NODATA,
                _ => DR_UNDETECT,
            };
            dr.set_value(bin, ray, raw);
        }
    }

    log::debug!("Synthesized DR for {} rays x {} bins", nrays, nbins);
    scan.add_parameter(dr)?;
    Ok(true)
}
