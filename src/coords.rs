//! The coordinate model: a pure function from physical build parameters
//! (inches per axis, DPI, layer height) to discrete raster dimensions and the
//! affine map between voxel indices and model-space coordinates.

use crate::point::Aabb;
use nalgebra::Point3;

/// Nanometers per inch, used to convert `layer_height_nm` into a Z-axis
/// voxel count.
pub const NM_PER_INCH: f64 = 25_400_000.0;

/// The physical parameters of a build.
#[derive(Debug, Clone, Copy)]
pub struct Physical {
    pub dpi: u32,
    pub layer_height_nm: u32,
    pub x_in: f64,
    pub y_in: f64,
    pub z_in: f64,
}

impl Default for Physical {
    fn default() -> Self {
        Physical {
            dpi: 300,
            layer_height_nm: 27_000,
            x_in: 1.0,
            y_in: 1.0,
            z_in: 1.0,
        }
    }
}

impl Physical {
    pub fn layers_per_inch(&self) -> f64 {
        NM_PER_INCH / f64::from(self.layer_height_nm)
    }

    /// `(W, H, D)`, each at least 1.
    pub fn dims(&self) -> (u32, u32, u32) {
        let w = (self.x_in * f64::from(self.dpi)).round().max(1.0) as u32;
        let h = (self.y_in * f64::from(self.dpi)).round().max(1.0) as u32;
        let d = (self.z_in * self.layers_per_inch()).round().max(1.0) as u32;
        (w.max(1), h.max(1), d.max(1))
    }
}

/// Maps a voxel index `(col, row, z)` to the model-space point at its
/// half-voxel-centered world position.
pub fn world_of(col: u32, row: u32, z: u32, aabb: &Aabb, dims: (u32, u32, u32)) -> Point3<f64> {
    let (w, h, d) = dims;
    let diag = aabb.diag();
    let min = aabb.min();
    let centered = |idx: u32, size: u32| (f64::from(idx) + 0.5) / f64::from(size);
    Point3::new(
        min.x + centered(col, w) * diag.x,
        min.y + centered(row, h) * diag.y,
        min.z + centered(z, d) * diag.z,
    )
}

/// The average of the three per-axis model-units-per-inch ratios, used to
/// convert an inch radius into model-space units for NN queries.
pub fn model_units_per_inch(aabb: &Aabb, x_in: f64, y_in: f64, z_in: f64) -> f64 {
    let diag = aabb.diag();
    let per_axis = |extent: f64, inches: f64| if inches > 0.0 { extent / inches } else { 0.0 };
    let rx = per_axis(diag.x, x_in);
    let ry = per_axis(diag.y, y_in);
    let rz = per_axis(diag.z, z_in);
    (rx + ry + rz) / 3.0
}
