use crate::types::{PidError, PidResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Inputs the fuzzy classifier scores particles on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PidField {
    Dbz,
    Zdr,
    Kdp,
    Ldr,
    Rhohv,
    /// Texture (running standard deviation) of ZDR
    SdZdr,
    /// Texture (running standard deviation) of PHIDP
    SdPhidp,
    Temp,
}

impl PidField {
    pub const ALL: [PidField; 8] = [
        PidField::Dbz,
        PidField::Zdr,
        PidField::Kdp,
        PidField::Ldr,
        PidField::Rhohv,
        PidField::SdZdr,
        PidField::SdPhidp,
        PidField::Temp,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            PidField::Dbz => "DBZ",
            PidField::Zdr => "ZDR",
            PidField::Kdp => "KDP",
            PidField::Ldr => "LDR",
            PidField::Rhohv => "RHOHV",
            PidField::SdZdr => "SDZDR",
            PidField::SdPhidp => "SDPHIDP",
            PidField::Temp => "TEMP",
        }
    }
}

impl fmt::Display for PidField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for PidField {
    type Err = PidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PidField::ALL
            .iter()
            .copied()
            .find(|field| field.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| PidError::Configuration(format!("Unknown field: {}", s)))
    }
}

/// Piecewise-linear membership function, constant beyond its end points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterestMap {
    pub points: Vec<(f64, f64)>,
}

impl InterestMap {
    pub fn interest(&self, x: f64) -> f64 {
        let points = &self.points;
        let (first, last) = match (points.first(), points.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return 0.0,
        };
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }
        for pair in points.windows(2) {
            let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);
            if x >= x0 && x <= x1 {
                if x1 == x0 {
                    return y1;
                }
                let weight = (x - x0) / (x1 - x0);
                return y0 * (1.0 - weight) + y1 * weight;
            }
        }
        last.1
    }
}

/// One particle class and the interest maps it is scored with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub label: String,
    pub id: u8,
    pub description: String,
    pub maps: Vec<(PidField, InterestMap)>,
}

/// Particle definitions and field weights read from a thresholds file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    pub particles: Vec<Particle>,
    weights: [f64; 8],
}

impl ThresholdTable {
    /// Read and validate a thresholds file
    pub fn from_file<P: AsRef<Path>>(path: P) -> PidResult<Self> {
        log::info!("Reading PID thresholds: {}", path.as_ref().display());
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| match e.kind() {
            std::io::ErrorKind::InvalidData => PidError::Configuration(format!(
                "{} is not a text file: {}",
                path.as_ref().display(),
                e
            )),
            _ => PidError::Io(e),
        })?;
        let table = parse_thresholds(&content)?;
        log::debug!(
            "Loaded {} particle classes from {}",
            table.particles.len(),
            path.as_ref().display()
        );
        Ok(table)
    }

    pub fn weight(&self, field: PidField) -> f64 {
        self.weights[field.index()]
    }

    pub fn particle(&self, id: u8) -> Option<&Particle> {
        self.particles.iter().find(|p| p.id == id)
    }

    fn validate(&self) -> PidResult<()> {
        if self.particles.is_empty() {
            return Err(PidError::Configuration("No particles defined".to_string()));
        }
        for particle in &self.particles {
            if particle.maps.is_empty() {
                return Err(PidError::Configuration(format!(
                    "Particle {} has no interest maps",
                    particle.label
                )));
            }
            for (field, map) in &particle.maps {
                if map.points.len() < 2 {
                    return Err(PidError::Configuration(format!(
                        "Interest map {}/{} needs at least two points",
                        particle.label, field
                    )));
                }
                if map.points.windows(2).any(|w| w[1].0 < w[0].0) {
                    return Err(PidError::Configuration(format!(
                        "Interest map {}/{} is not sorted by value",
                        particle.label, field
                    )));
                }
                if map.points.iter().any(|&(_, y)| !(0.0..=1.0).contains(&y)) {
                    return Err(PidError::Configuration(format!(
                        "Interest map {}/{} has interest outside [0, 1]",
                        particle.label, field
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Parse a thresholds table.
///
/// ```text
/// # comment
/// particle <label> <id> "<description>"
/// weight   <FIELD> <weight>
/// interest <label> <FIELD> (x,y) (x,y) ...
/// ```
pub fn parse_thresholds(content: &str) -> PidResult<ThresholdTable> {
    let particle_re = regex(r#"^particle\s+(\w+)\s+(\d+)\s+"([^"]*)"$"#)?;
    let weight_re = regex(r"^weight\s+(\w+)\s+(\S+)$")?;
    let interest_re = regex(r"^interest\s+(\w+)\s+(\w+)\s+(.+)$")?;
    let point_re = regex(r"\(\s*([^,()\s]+)\s*,\s*([^,()\s]+)\s*\)")?;

    let mut particles: Vec<Particle> = Vec::new();
    let mut weights = [1.0; 8];
    let mut ids = HashSet::new();

    for (lineno, raw_line) in content.lines().enumerate() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let at = |msg: String| PidError::Configuration(format!("line {}: {}", lineno + 1, msg));

        if let Some(cap) = particle_re.captures(line) {
            let label = cap[1].to_string();
            let id = cap[2]
                .parse::<u8>()
                .ok()
                .filter(|id| (1..=254).contains(id))
                .ok_or_else(|| at(format!("Particle id {} outside 1..=254", &cap[2])))?;
            if particles.iter().any(|p| p.label == label) {
                return Err(at(format!("Duplicate particle label {}", label)));
            }
            if !ids.insert(id) {
                return Err(at(format!("Duplicate particle id {}", id)));
            }
            particles.push(Particle {
                label,
                id,
                description: cap[3].to_string(),
                maps: Vec::new(),
            });
        } else if let Some(cap) = weight_re.captures(line) {
            let field = cap[1].parse::<PidField>().map_err(|e| at(e.to_string()))?;
            let weight = parse_number(&cap[2]).map_err(at)?;
            if weight < 0.0 {
                return Err(at(format!("Negative weight for {}", field)));
            }
            weights[field.index()] = weight;
        } else if let Some(cap) = interest_re.captures(line) {
            let field = cap[2].parse::<PidField>().map_err(|e| at(e.to_string()))?;
            let points_text = &cap[3];
            let points = point_re
                .captures_iter(points_text)
                .map(|p| Ok((parse_number(&p[1])?, parse_number(&p[2])?)))
                .collect::<Result<Vec<_>, String>>()
                .map_err(at)?;
            if !point_re.replace_all(points_text, "").trim().is_empty() {
                return Err(at(format!("Malformed points: {}", points_text)));
            }
            let particle = particles
                .iter_mut()
                .find(|p| p.label == cap[1])
                .ok_or_else(|| at(format!("Interest map for undeclared particle {}", &cap[1])))?;
            if particle.maps.iter().any(|(f, _)| *f == field) {
                return Err(at(format!("Duplicate {} map for {}", field, particle.label)));
            }
            particle.maps.push((field, InterestMap { points }));
        } else {
            return Err(at(format!("Unrecognized entry: {}", line)));
        }
    }

    let table = ThresholdTable { particles, weights };
    table.validate()?;
    Ok(table)
}

fn regex(pattern: &str) -> PidResult<Regex> {
    Regex::new(pattern).map_err(|e| PidError::Processing(format!("Regex error: {}", e)))
}

fn parse_number(input: &str) -> Result<f64, String> {
    input
        .parse::<f64>()
        .map_err(|e| format!("Parse error for '{}': {}", input, e))
        .and_then(|v| if v.is_finite() { Ok(v) } else { Err(format!("Non-finite value {}", input)) })
}
