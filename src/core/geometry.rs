//! Planar tile footprints and their buffers.

use std::f64::consts::FRAC_PI_2;
use std::fmt::Write as _;

use thiserror::Error;

/// Errors that can occur when building geometry.
#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("buffer distance must be >= 0, got {0}")]
    NegativeDistance(f64),
}

/// Axis-aligned rectangle in projected coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Creates a box from `(min_x, max_x, min_y, max_y)`, the order tile headers report.
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True if the point lies inside or on the boundary.
    #[inline]
    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// True if the boxes share at least one point. Touching edges count.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.distance_to(other) == 0.0
    }

    /// Euclidean gap between two boxes, zero when they overlap or touch.
    pub fn distance_to(&self, other: &BoundingBox) -> f64 {
        let dx = (other.min_x - self.max_x).max(self.min_x - other.max_x).max(0.0);
        let dy = (other.min_y - self.max_y).max(self.min_y - other.max_y).max(0.0);
        dx.hypot(dy)
    }

    /// The footprint polygon, wound `(minX,minY), (maxX,minY), (maxX,maxY), (minX,maxY)`.
    pub fn to_polygon(&self) -> Polygon {
        Polygon::new(vec![
            [self.min_x, self.min_y],
            [self.max_x, self.min_y],
            [self.max_x, self.max_y],
            [self.min_x, self.max_y],
        ])
    }

    /// Buffers the box outward by `distance`.
    pub fn buffer(&self, distance: f64) -> Result<BufferedBox, GeometryError> {
        BufferedBox::new(*self, distance)
    }
}

/// A bounding box grown outward by a fixed distance with round corners.
///
/// This is the exact Minkowski sum of the rectangle and a disc, so
/// intersection tests need no polygon approximation: a rectangle meets the
/// buffer iff its gap to the original box is at most `distance`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferedBox {
    bbox: BoundingBox,
    distance: f64,
}

impl BufferedBox {
    pub fn new(bbox: BoundingBox, distance: f64) -> Result<Self, GeometryError> {
        // `!(d >= 0)` also rejects NaN
        if !(distance >= 0.0) {
            return Err(GeometryError::NegativeDistance(distance));
        }
        Ok(Self { bbox, distance })
    }

    /// The unbuffered box.
    pub fn inner(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Square envelope of the buffer.
    pub fn envelope(&self) -> BoundingBox {
        BoundingBox::new(
            self.bbox.min_x - self.distance,
            self.bbox.max_x + self.distance,
            self.bbox.min_y - self.distance,
            self.bbox.max_y + self.distance,
        )
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.bbox.distance_to(other) <= self.distance
    }

    /// Polygon approximation with `segments` vertices per quarter circle.
    pub fn to_polygon(&self, segments: usize) -> Polygon {
        if self.distance == 0.0 {
            return self.bbox.to_polygon();
        }

        let segments = segments.max(1);
        let d = self.distance;
        let b = &self.bbox;
        // Corner centres in the same winding order as the footprint, with the
        // start angle of each quarter arc.
        let corners = [
            ([b.min_x, b.min_y], 2.0 * FRAC_PI_2),
            ([b.max_x, b.min_y], 3.0 * FRAC_PI_2),
            ([b.max_x, b.max_y], 0.0),
            ([b.min_x, b.max_y], FRAC_PI_2),
        ];

        let mut ring = Vec::with_capacity(4 * (segments + 1));
        for ([cx, cy], start) in corners {
            for s in 0..=segments {
                let angle = start + FRAC_PI_2 * s as f64 / segments as f64;
                ring.push([cx + d * angle.cos(), cy + d * angle.sin()]);
            }
        }
        Polygon::new(ring)
    }
}

/// A simple polygon stored as an open ring of vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    ring: Vec<[f64; 2]>,
}

impl Polygon {
    pub fn new(ring: Vec<[f64; 2]>) -> Self {
        Self { ring }
    }

    pub fn vertices(&self) -> &[[f64; 2]] {
        &self.ring
    }

    /// Well-known text with the ring closed on its first vertex.
    pub fn to_wkt(&self) -> String {
        let mut wkt = String::from("POLYGON ((");
        let closing = self.ring.first();
        for (i, [x, y]) in self.ring.iter().chain(closing).enumerate() {
            if i > 0 {
                wkt.push_str(", ");
            }
            let _ = write!(wkt, "{} {}", x, y);
        }
        wkt.push_str("))");
        wkt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> BoundingBox {
        BoundingBox::new(0.0, 10.0, 0.0, 10.0)
    }

    #[test]
    fn test_polygon_winding() {
        let poly = BoundingBox::new(1.0, 2.0, 3.0, 4.0).to_polygon();
        assert_eq!(
            poly.vertices(),
            &[[1.0, 3.0], [2.0, 3.0], [2.0, 4.0], [1.0, 4.0]]
        );
    }

    #[test]
    fn test_wkt_is_closed() {
        let wkt = BoundingBox::new(0.0, 1.0, 0.0, 2.0).to_polygon().to_wkt();
        assert_eq!(wkt, "POLYGON ((0 0, 1 0, 1 2, 0 2, 0 0))");
    }

    #[test]
    fn test_intersects_touching_edges() {
        let right = BoundingBox::new(10.0, 20.0, 0.0, 10.0);
        let apart = BoundingBox::new(10.5, 20.0, 0.0, 10.0);
        assert!(unit().intersects(&right));
        assert!(!unit().intersects(&apart));
        assert_eq!(unit().distance_to(&apart), 0.5);
    }

    #[test]
    fn test_diagonal_distance() {
        let diag = BoundingBox::new(13.0, 20.0, 14.0, 20.0);
        assert!((unit().distance_to(&diag) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_negative_buffer_rejected() {
        assert_eq!(
            unit().buffer(-1.0),
            Err(GeometryError::NegativeDistance(-1.0))
        );
        assert!(unit().buffer(f64::NAN).is_err());
    }

    #[test]
    fn test_buffer_round_corners() {
        let buffered = unit().buffer(5.0).unwrap();
        assert!(buffered.intersects(&BoundingBox::new(12.0, 20.0, 13.0, 20.0)));
        // Inside the square envelope but outside the rounded corner.
        assert!(!buffered.intersects(&BoundingBox::new(14.0, 20.0, 14.0, 20.0)));
        assert!(buffered.envelope().contains_xy(14.0, 14.0));
    }

    #[test]
    fn test_zero_buffer_is_bbox() {
        let buffered = unit().buffer(0.0).unwrap();
        assert_eq!(buffered.to_polygon(8), unit().to_polygon());
        assert!(buffered.intersects(&unit()));
    }

    #[test]
    fn test_buffered_polygon_stays_on_buffer() {
        let buffered = unit().buffer(2.0).unwrap();
        let poly = buffered.to_polygon(4);
        assert_eq!(poly.vertices().len(), 20);
        for [x, y] in poly.vertices() {
            let gap = unit().distance_to(&BoundingBox::new(*x, *x, *y, *y));
            assert!((gap - 2.0).abs() < 1e-9, "vertex ({}, {}) gap {}", x, y, gap);
        }
    }
}
