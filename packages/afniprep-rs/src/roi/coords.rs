use serde::Serialize;
use std::fmt;
use std::path::Path;

use crate::error::{AfniPrepError, Result};

/// ROI centre in the dataset's coordinate order
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate(pub [f64; 3]);

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, z] = self.0;
        write!(f, "{} {} {}", x, y, z)
    }
}

/// Parse `a b c`, `a,b,c`, `a, b, c` or `(a, b, c)`.
pub fn parse_coordinate(line: &str) -> Result<Coordinate> {
    let cleaned = line.trim().trim_start_matches('(').trim_end_matches(')');
    let values: Vec<f64> = cleaned
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| AfniPrepError::ParseError(format!("coordinate '{}': {}", line.trim(), e)))?;

    match values.as_slice() {
        [x, y, z] => Ok(Coordinate([*x, *y, *z])),
        _ => Err(AfniPrepError::ParseError(format!(
            "coordinate '{}': expected 3 values, found {}",
            line.trim(),
            values.len()
        ))),
    }
}

/// Rewrite a comma-separated coordinate file as space-separated, which `3dUndump -xyz` requires.
///
/// Only the first line is read; files already in the right form are left untouched.
pub fn normalize_coordinate_file(path: &Path) -> Result<Coordinate> {
    let text = std::fs::read_to_string(path)?;
    let first = text.lines().next().unwrap_or("");
    let coordinate = parse_coordinate(first)?;

    if first.contains(',') || first.contains('(') {
        std::fs::write(path, coordinate.to_string())?;
        log::info!("Rewrote {} as space-separated", path.display());
    }
    Ok(coordinate)
}
