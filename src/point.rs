//! The point store: an immutable, colored 3D point cloud with a precomputed
//! axis-aligned bounding box.

use crate::color::Color;
use nalgebra::Point3;

/// A single sample. Points are value types; once a `PointCloud` is built they
/// are never mutated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub position: Point3<f64>,
    pub color: Option<Color<u8>>,
}

impl Point {
    pub fn new(position: Point3<f64>, color: Option<Color<u8>>) -> Self {
        Point { position, color }
    }
}

/// An axis-aligned bounding box. Both `min` and `max` are `(0,0,0)` for an
/// empty point cloud.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Aabb {
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Aabb { min, max }
    }

    pub fn empty() -> Self {
        Aabb {
            min: Point3::origin(),
            max: Point3::origin(),
        }
    }

    pub fn min(&self) -> Point3<f64> {
        self.min
    }

    pub fn max(&self) -> Point3<f64> {
        self.max
    }

    pub fn diag(&self) -> nalgebra::Vector3<f64> {
        self.max - self.min
    }

    /// Inflates the box by `ratio * extent` on each side, per axis
    /// independently.
    pub fn padded(&self, ratio: f64) -> Aabb {
        let diag = self.diag();
        let pad = diag * ratio;
        Aabb {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    fn from_points<'a>(points: impl Iterator<Item = &'a Point3<f64>>) -> Aabb {
        let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        let mut any = false;
        for p in points {
            any = true;
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        if any {
            Aabb { min, max }
        } else {
            Aabb::empty()
        }
    }
}

/// An ordered, immutable sequence of points plus their tight bounding box.
#[derive(Debug, Clone)]
pub struct PointCloud {
    points: Vec<Point>,
    aabb: Aabb,
}

impl PointCloud {
    pub fn new(points: Vec<Point>) -> Self {
        let aabb = Aabb::from_points(points.iter().map(|p| &p.position));
        PointCloud { points, aabb }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}
