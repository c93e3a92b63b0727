//! Temperature along the ray.
//!
//! The classifier wants a temperature for every bin. A scan carries it as the
//! `how/tempc` attribute, one value per bin, applied to every ray of the scan
//! regardless of azimuth. [`attach_temperature_profile`] builds that attribute
//! from a vertical profile (e.g. a sounding or NWP column) by interpolating
//! it at the beam-centre height of each bin.

use crate::types::{Attribute, PidError, PidResult, PolarScan, MISSING};
use ndarray::Array1;

pub const TEMPC_ATTRIBUTE: &str = "how/tempc";

/// Mean earth radius, metres
const EARTH_RADIUS: f64 = 6_371_000.0;
/// Effective earth radius factor for standard refraction
const REFRACTION_FACTOR: f64 = 4.0 / 3.0;

/// Per-bin temperature from `how/tempc`.
///
/// A missing attribute gives an all-[`MISSING`] ray; an attribute of the
/// wrong length is truncated or padded with [`MISSING`].
pub fn tempc_ray(scan: &PolarScan) -> Array1<f64> {
    let nbins = scan.nbins();
    let profile = match scan.attribute(TEMPC_ATTRIBUTE).and_then(Attribute::as_double_array) {
        Some(profile) => profile,
        None => {
            log::warn!("No {} attribute, temperature will be missing", TEMPC_ATTRIBUTE);
            return Array1::from_elem(nbins, MISSING);
        }
    };

    if profile.len() != nbins {
        log::warn!(
            "{} has {} values for {} bins, adjusting length",
            TEMPC_ATTRIBUTE,
            profile.len(),
            nbins
        );
    }

    (0..nbins)
        .map(|bin| profile.get(bin).copied().unwrap_or(MISSING))
        .collect()
}

/// Beam-centre height above sea level (m) of every bin of the scan
pub fn beam_heights(scan: &PolarScan) -> Array1<f64> {
    let effective_radius = REFRACTION_FACTOR * EARTH_RADIUS;
    let sin_elev = scan.elangle.sin();
    (0..scan.nbins())
        .map(|bin| {
            let range = scan.rstart * 1000.0 + (bin as f64 + 0.5) * scan.rscale;
            let h = (range * range
                + effective_radius * effective_radius
                + 2.0 * range * effective_radius * sin_elev)
                .sqrt()
                - effective_radius;
            h + scan.height
        })
        .collect()
}

/// Interpolate a vertical profile at the given heights.
///
/// `pheight` must be ascending. Heights outside the profile take the nearest
/// end value. `rheight` need not be sorted: the low tilts of some scans dip
/// before they climb.
pub fn interpolate_profile(pheight: &[f64], ptempc: &[f64], rheight: &[f64]) -> PidResult<Array1<f64>> {
    if pheight.len() != ptempc.len() {
        return Err(PidError::Input(format!(
            "Profile has {} heights but {} temperatures",
            pheight.len(),
            ptempc.len()
        )));
    }
    if pheight.is_empty() {
        return Err(PidError::Input("Empty temperature profile".to_string()));
    }
    if pheight.windows(2).any(|w| w[1] < w[0]) {
        return Err(PidError::Input("Profile heights must be ascending".to_string()));
    }

    let mut order: Vec<usize> = (0..rheight.len()).collect();
    order.sort_by(|&a, &b| rheight[a].total_cmp(&rheight[b]));

    let mut result = Array1::from_elem(rheight.len(), MISSING);
    let mut level = 0;
    for idx in order {
        let h = rheight[idx];
        while level + 1 < pheight.len() && pheight[level + 1] < h {
            level += 1;
        }
        result[idx] = interpolate_at(pheight, ptempc, level, h);
    }
    Ok(result)
}

fn interpolate_at(pheight: &[f64], ptempc: &[f64], level: usize, h: f64) -> f64 {
    let last = pheight.len() - 1;
    if h <= pheight[0] {
        return ptempc[0];
    }
    if h >= pheight[last] {
        return ptempc[last];
    }
    let (h0, h1) = (pheight[level], pheight[level + 1]);
    if h1 == h0 {
        return ptempc[level];
    }
    let weight = (h - h0) / (h1 - h0);
    ptempc[level] * (1.0 - weight) + ptempc[level + 1] * weight
}

/// Interpolate a vertical profile to the scan's bins and store it as `how/tempc`
pub fn attach_temperature_profile(scan: &mut PolarScan, pheight: &[f64], ptempc: &[f64]) -> PidResult<()> {
    let heights = beam_heights(scan);
    let tempc = interpolate_profile(pheight, ptempc, &heights.to_vec())?;
    log::debug!(
        "Attached temperature profile over {} bins ({:.0} m to {:.0} m)",
        tempc.len(),
        heights.iter().next().copied().unwrap_or(0.0),
        heights.iter().last().copied().unwrap_or(0.0)
    );
    scan.add_attribute(TEMPC_ATTRIBUTE, Attribute::DoubleArray(tempc.to_vec()));
    Ok(())
}
