//! Six-coefficient affine transform in world-file form.

use crate::geometry::{PagePoint, PlanarPoint};

/// Affine transform mapping page space to the planar projected system.
///
/// ```text
/// X = A·x + B·y + C
/// Y = D·x + E·y + F
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub d: f64,
    pub e: f64,
    pub c: f64,
    pub f: f64,
}

impl AffineTransform {
    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    pub fn is_finite(&self) -> bool {
        [self.a, self.b, self.c, self.d, self.e, self.f]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Multiply the four non-translation coefficients by `factor`.
    pub fn scale_linear(&self, factor: f64) -> Self {
        Self {
            a: self.a * factor,
            b: self.b * factor,
            d: self.d * factor,
            e: self.e * factor,
            ..*self
        }
    }

    pub fn apply(&self, p: PagePoint) -> PlanarPoint {
        PlanarPoint::new(
            self.a * p.x + self.b * p.y + self.c,
            self.d * p.x + self.e * p.y + self.f,
        )
    }

    /// Apply only the linear part, for mapping extents rather than positions.
    pub fn apply_linear(&self, dx: f64, dy: f64) -> (f64, f64) {
        (self.a * dx + self.b * dy, self.d * dx + self.e * dy)
    }

    /// Length of the transformed x and y unit vectors.
    pub fn axis_scales(&self) -> (f64, f64) {
        (self.a.hypot(self.d), self.b.hypot(self.e))
    }

    /// Inverse mapping, or `None` when the determinant is zero.
    pub fn inverse(&self) -> Option<InverseAffine> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }

        // The inverse of [a, b; d, e] is (1/det) * [e, -b; -d, a]
        Some(InverseAffine {
            a: self.e / det,
            b: -self.b / det,
            d: -self.d / det,
            e: self.a / det,
            origin_x: self.c,
            origin_y: self.f,
        })
    }
}

/// Precomputed inverse of an [`AffineTransform`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InverseAffine {
    a: f64,
    b: f64,
    d: f64,
    e: f64,
    origin_x: f64,
    origin_y: f64,
}

impl InverseAffine {
    pub fn apply(&self, p: PlanarPoint) -> PagePoint {
        let dx = p.x - self.origin_x;
        let dy = p.y - self.origin_y;
        PagePoint::new(self.a * dx + self.b * dy, self.d * dx + self.e * dy)
    }
}
