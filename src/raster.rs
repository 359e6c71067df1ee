//! The per-layer rasterizer: for one Z layer, samples every voxel center,
//! queries the spatial index, and paints pixels according to the configured
//! shell policy.

use crate::color::Color;
use crate::coords::{world_of, Physical};
use crate::kdtree::{KdTree, NearestOptions};
use crate::point::Aabb;
use crate::slice::SliceImage;

pub const INTERIOR_FILL_COLOR: Color<u8> = Color {
    red: 247,
    green: 247,
    blue: 247,
    alpha: 128,
};

/// The rule mapping NN distance to pixel color.
#[derive(Debug, Clone, Copy)]
pub enum ShellPolicy {
    /// Paint the sample's own color when `d <= R`.
    ColorBySample,
    /// Paint the sample's color for `d <= r_inner`, a semi-transparent light
    /// gray shell for `r_inner < d <= r_outer`, and nothing beyond `r_outer`.
    TwoBand { r_inner: f64, r_outer: f64 },
}

/// When to run the interior flood fill relative to per-voxel sampling
///).
#[derive(Debug, Clone, Copy)]
pub enum InteriorFill {
    Off,
    BeforeSampling,
    AfterSamplingIfFilledExceeds(usize),
}

/// The NN query radius, isotropic or anisotropic.
#[derive(Debug, Clone, Copy)]
pub enum VoxelRadius {
    Isotropic(f64),
    Anisotropic { rx: f64, ry: f64, rz: f64 },
}

impl VoxelRadius {
    fn to_options(self) -> NearestOptions {
        match self {
            VoxelRadius::Isotropic(r) => NearestOptions::isotropic(r),
            VoxelRadius::Anisotropic { rx, ry, rz } => NearestOptions::anisotropic(rx, ry, rz),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RasterParams {
    pub dims: (u32, u32, u32),
    pub radius: VoxelRadius,
    pub shell_policy: ShellPolicy,
    pub interior_fill: InteriorFill,
}

fn shell_color(policy: ShellPolicy, distance: f64, sample: Option<Color<u8>>) -> Option<Color<u8>> {
    let sample = sample.unwrap_or(Color::opaque(255, 255, 255));
    match policy {
        ShellPolicy::ColorBySample => Some(sample),
        ShellPolicy::TwoBand { r_inner, r_outer } => {
            if distance > r_outer {
                None
            } else if distance > r_inner {
                Some(Color {
                    red: 247,
                    green: 247,
                    blue: 247,
                    alpha: 128,
                })
            } else {
                Some(sample)
            }
        }
    }
}

/// Rasterizes layer `z` into `image`, which must already be sized to
/// `(params.dims.0, params.dims.1)` and cleared by the caller.
///
/// Precondition: `image.width() == params.dims.0 && image.height() == params.dims.1`.
pub fn rasterize_layer(
    tree: &KdTree,
    aabb: &Aabb,
    params: &RasterParams,
    z: u32,
    image: &mut SliceImage,
) {
    let (w, h, d) = params.dims;
    debug_assert!(z < d);
    let options = params.radius.to_options();

    if let InteriorFill::BeforeSampling = params.interior_fill {
        image.flood_fill_from(w / 2, h / 2, INTERIOR_FILL_COLOR);
    }

    for row in 0..h {
        for col in 0..w {
            let world = world_of(col, row, z, aabb, (w, h, d));
            if let Some(hit) = tree.nearest(&world, &options) {
                if let Some(color) = shell_color(params.shell_policy, hit.distance, hit.point.color) {
                    image.set_color(col, row, color);
                }
            }
        }
    }

    if let InteriorFill::AfterSamplingIfFilledExceeds(threshold) = params.interior_fill {
        if image.count_filled() > threshold {
            image.flood_fill_from(w / 2, h / 2, INTERIOR_FILL_COLOR);
        }
    }
}

/// Convenience: derives `RasterParams.dims` and allocates a fresh image sized
/// to it from a `Physical` build description.
pub fn image_for(phys: &Physical) -> SliceImage {
    let (w, h, _d) = phys.dims();
    SliceImage::new(w, h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::{Point, PointCloud};
    use nalgebra::Point3;

    fn single_point_cloud() -> PointCloud {
        PointCloud::new(vec![Point::new(
            Point3::new(0.0, 0.0, 0.0),
            Some(Color::opaque(200, 100, 50)),
        )])
    }

    #[test]
    fn pixel_transparent_when_no_point_within_radius() {
        let cloud = single_point_cloud();
        let tree = KdTree::build(&cloud);
        let aabb = Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let params = RasterParams {
            dims: (4, 4, 1),
            radius: VoxelRadius::Isotropic(0.001),
            shell_policy: ShellPolicy::ColorBySample,
            interior_fill: InteriorFill::Off,
        };
        let mut image = SliceImage::new(4, 4);
        rasterize_layer(&tree, &aabb, &params, 0, &mut image);
        // The single point sits near the center; far corners must stay transparent.
        assert_eq!(image.get_pixel(0, 0).3, 0);
    }

    #[test]
    fn color_by_sample_paints_the_hit_color() {
        let cloud = single_point_cloud();
        let tree = KdTree::build(&cloud);
        let aabb = Aabb::new(Point3::new(-0.02, -0.02, -0.02), Point3::new(0.02, 0.02, 0.02));
        let params = RasterParams {
            dims: (4, 4, 1),
            radius: VoxelRadius::Isotropic(0.05),
            shell_policy: ShellPolicy::ColorBySample,
            interior_fill: InteriorFill::Off,
        };
        let mut image = SliceImage::new(4, 4);
        rasterize_layer(&tree, &aabb, &params, 0, &mut image);
        assert!(image.count_filled() > 0);
        for row in 0..4 {
            for col in 0..4 {
                let (r, g, b, a) = image.get_pixel(col, row);
                if a != 0 {
                    assert_eq!((r, g, b), (200, 100, 50));
                }
            }
        }
    }

    #[test]
    fn two_band_shell_bands_are_correct() {
        let cloud = single_point_cloud();
        let tree = KdTree::build(&cloud);
        let aabb = Aabb::new(Point3::new(-0.1, -0.1, -0.1), Point3::new(0.1, 0.1, 0.1));
        let params = RasterParams {
            dims: (20, 20, 1),
            radius: VoxelRadius::Isotropic(0.1),
            shell_policy: ShellPolicy::TwoBand {
                r_inner: 0.02,
                r_outer: 0.06,
            },
            interior_fill: InteriorFill::Off,
        };
        let mut image = SliceImage::new(20, 20);
        rasterize_layer(&tree, &aabb, &params, 0, &mut image);
        let mut saw_sample = false;
        let mut saw_shell = false;
        for row in 0..20 {
            for col in 0..20 {
                let (r, g, b, a) = image.get_pixel(col, row);
                if a == 0 {
                    continue;
                }
                if (r, g, b) == (200, 100, 50) {
                    saw_sample = true;
                } else {
                    assert_eq!((r, g, b, a), (247, 247, 247, 128));
                    saw_shell = true;
                }
            }
        }
        assert!(saw_sample && saw_shell);
    }
}
