//! Orchestrates one full build: constructs the spatial index once, then
//! rasterizes every layer and writes one PNG per layer. Layers are
//! independent given the shared read-only index, so they fan out across a
//! rayon thread pool the same way independent leaf-tile work fans out
//! across workers elsewhere in this codebase.

use crate::coords::{model_units_per_inch, Physical};
use crate::error::Result;
use crate::kdtree::KdTree;
use crate::point::PointCloud;
use crate::png_writer;
use crate::raster::{InteriorFill, RasterParams, ShellPolicy, VoxelRadius};
use crate::slice::SliceImage;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A single build's full parameter set (the CLI's `--help` output enumerates
/// every one of these).
#[derive(Debug, Clone)]
pub struct Job {
    pub physical: Physical,
    pub padding_ratio: f64,
    pub voxel_radius_in: f64,
    pub anisotropic_radii_in: Option<(f64, f64, f64)>,
    pub shell_policy: ShellPolicy,
    pub interior_fill: InteriorFill,
    pub output_dir: PathBuf,
}

fn voxel_radius(job: &Job, units_per_inch: f64) -> VoxelRadius {
    match job.anisotropic_radii_in {
        Some((rx, ry, rz)) => VoxelRadius::Anisotropic {
            rx: rx * units_per_inch,
            ry: ry * units_per_inch,
            rz: rz * units_per_inch,
        },
        None => VoxelRadius::Isotropic(job.voxel_radius_in * units_per_inch),
    }
}

/// Parses a PLY file, builds the index, and writes `out_{z}.png` for every
/// layer `0..D` into `job.output_dir`.
pub fn run(ply_path: &Path, job: &Job) -> Result<()> {
    let cloud = crate::ply::parse(ply_path)?;
    log::info!("loaded {} points from {:?}", cloud.len(), ply_path);
    generate_stack(&cloud, job)
}

/// The same build, starting from an already-parsed point cloud.
pub fn generate_stack(cloud: &PointCloud, job: &Job) -> Result<()> {
    let aabb = cloud.aabb().padded(job.padding_ratio);
    let dims = job.physical.dims();
    let (_w, _h, d) = dims;

    let units_per_inch = model_units_per_inch(&aabb, job.physical.x_in, job.physical.y_in, job.physical.z_in);
    let radius = voxel_radius(job, units_per_inch);

    let tree = KdTree::build(cloud);
    log::info!("built k-d tree over {} points", cloud.len());

    std::fs::create_dir_all(&job.output_dir)?;

    let params = RasterParams {
        dims,
        radius,
        shell_policy: job.shell_policy,
        interior_fill: job.interior_fill,
    };

    let progress = Mutex::new(pbr::ProgressBar::new(u64::from(d)));

    (0..d).into_par_iter().try_for_each(|z| -> Result<()> {
        let mut image = SliceImage::new(dims.0, dims.1);
        crate::raster::rasterize_layer(&tree, &aabb, &params, z, &mut image);
        let path = job.output_dir.join(format!("out_{}.png", z));
        png_writer::write_file(&path, image.width(), image.height(), image.as_bytes())?;
        progress.lock().unwrap().inc();
        Ok(())
    })?;
    progress.lock().unwrap().finish_println("");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::point::Point;
    use nalgebra::Point3;

    fn one_point_job(tmp: &Path) -> (PointCloud, Job) {
        let cloud = PointCloud::new(vec![Point::new(
            Point3::new(0.0, 0.0, 0.0),
            Some(Color::opaque(200, 100, 50)),
        )]);
        let job = Job {
            physical: Physical {
                dpi: 50,
                layer_height_nm: 27_000,
                x_in: 0.05,
                y_in: 0.05,
                z_in: 0.05,
            },
            padding_ratio: 0.5,
            voxel_radius_in: 0.01,
            anisotropic_radii_in: None,
            shell_policy: ShellPolicy::ColorBySample,
            interior_fill: InteriorFill::Off,
            output_dir: tmp.to_path_buf(),
        };
        (cloud, job)
    }

    #[test]
    fn writes_one_png_per_layer() {
        let dir = tempdir::TempDir::new("voxelprint-stack").unwrap();
        let (cloud, job) = one_point_job(dir.path());
        generate_stack(&cloud, &job).unwrap();

        let d = job.physical.dims().2;
        for z in 0..d {
            assert!(dir.path().join(format!("out_{}.png", z)).exists());
        }
    }

    #[test]
    fn rerunning_produces_byte_identical_output() {
        let dir_a = tempdir::TempDir::new("voxelprint-stack-a").unwrap();
        let dir_b = tempdir::TempDir::new("voxelprint-stack-b").unwrap();
        let (cloud, mut job_a) = one_point_job(dir_a.path());
        let mut job_b = job_a.clone();
        job_b.output_dir = dir_b.path().to_path_buf();
        job_a.output_dir = dir_a.path().to_path_buf();

        generate_stack(&cloud, &job_a).unwrap();
        generate_stack(&cloud, &job_b).unwrap();

        let d = job_a.physical.dims().2;
        for z in 0..d {
            let a = std::fs::read(dir_a.path().join(format!("out_{}.png", z))).unwrap();
            let b = std::fs::read(dir_b.path().join(format!("out_{}.png", z))).unwrap();
            assert_eq!(a, b);
        }
    }
}
