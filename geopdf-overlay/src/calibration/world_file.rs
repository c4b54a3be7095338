//! World-file (`.pgw`, `.jgw`, `.tfw`, ...) parsing.

use std::str::FromStr;

use super::AffineTransform;
use crate::error::CalibrationError;

/// The six coefficients of a world file, in file order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldFile {
    pub pixel_size_x: f64,
    pub rotation_y: f64,
    pub rotation_x: f64,
    pub pixel_size_y: f64,
    pub origin_x: f64,
    pub origin_y: f64,
}

impl WorldFile {
    /// Parse world-file text: exactly six numeric lines.
    pub fn parse(text: &str) -> Result<Self, CalibrationError> {
        let lines: Vec<&str> = text.trim().lines().collect();
        if lines.len() != 6 {
            return Err(CalibrationError::LineCount { found: lines.len() });
        }

        let mut values = [0.0; 6];
        for (idx, line) in lines.iter().enumerate() {
            let value = line.trim();
            values[idx] = value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| CalibrationError::InvalidNumber {
                    line: idx + 1,
                    value: value.to_string(),
                })?;
        }

        let [pixel_size_x, rotation_y, rotation_x, pixel_size_y, origin_x, origin_y] = values;
        Ok(Self {
            pixel_size_x,
            rotation_y,
            rotation_x,
            pixel_size_y,
            origin_x,
            origin_y,
        })
    }

    /// The transform in raster-pixel units, before any page rescaling.
    pub fn to_affine(&self) -> AffineTransform {
        AffineTransform {
            a: self.pixel_size_x,
            d: self.rotation_y,
            b: self.rotation_x,
            e: self.pixel_size_y,
            c: self.origin_x,
            f: self.origin_y,
        }
    }
}

impl FromStr for WorldFile {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
