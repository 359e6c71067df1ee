//! The chamfer operator: a second pass over an existing slice
//! stack that carves all twelve cuboid edges and eight corners within `r`
//! inches of the global material bounding box.

use crate::coords::NM_PER_INCH;
use crate::error::{ErrorKind, Result};
use crate::natural_sort;
use crate::png_writer;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// The smallest axis-aligned box (in pixel/layer index space) containing
/// every slice pixel with non-zero alpha, across the whole stack.
#[derive(Debug, Clone, Copy)]
pub struct MaterialAabb {
    pub x0: u32,
    pub x1: u32,
    pub y0: u32,
    pub y1: u32,
    pub z0: u32,
    pub z1: u32,
}

/// Per-axis inch distances precomputed for one layer.
struct LayerFrame {
    dx_l: Vec<f64>,
    dx_r: Vec<f64>,
    dy_t: Vec<f64>,
    dy_b: Vec<f64>,
    dz_b: f64,
    dz_t: f64,
}

fn layer_frame(aabb: &MaterialAabb, z: u32, dpi: u32, layers_per_inch: f64) -> LayerFrame {
    let dpi = f64::from(dpi);
    let dx_l = (aabb.x0..=aabb.x1)
        .map(|x| f64::from(x - aabb.x0) / dpi)
        .collect();
    let dx_r = (aabb.x0..=aabb.x1)
        .map(|x| f64::from(aabb.x1 - x) / dpi)
        .collect();
    let dy_t = (aabb.y0..=aabb.y1)
        .map(|y| f64::from(y - aabb.y0) / dpi)
        .collect();
    let dy_b = (aabb.y0..=aabb.y1)
        .map(|y| f64::from(aabb.y1 - y) / dpi)
        .collect();
    let dz_b = f64::from(z.saturating_sub(aabb.z0)) / layers_per_inch;
    let dz_t = f64::from(aabb.z1.saturating_sub(z)) / layers_per_inch;
    LayerFrame {
        dx_l,
        dx_r,
        dy_t,
        dy_b,
        dz_b,
        dz_t,
    }
}

/// True if any of the twelve edge pairs or eight corner triples sums to
/// less than `r`.
pub fn chamfer_predicate(
    dx_l: f64,
    dx_r: f64,
    dy_t: f64,
    dy_b: f64,
    dz_b: f64,
    dz_t: f64,
    r: f64,
) -> bool {
    let edges = [
        dx_l + dy_t,
        dx_r + dy_t,
        dx_l + dy_b,
        dx_r + dy_b,
        dz_t + dx_l,
        dz_t + dx_r,
        dz_t + dy_t,
        dz_t + dy_b,
        dz_b + dx_l,
        dz_b + dx_r,
        dz_b + dy_t,
        dz_b + dy_b,
    ];
    if edges.iter().any(|&s| s < r) {
        return true;
    }
    let corners = [
        dz_t + dx_l + dy_t,
        dz_t + dx_r + dy_t,
        dz_t + dx_l + dy_b,
        dz_t + dx_r + dy_b,
        dz_b + dx_l + dy_t,
        dz_b + dx_r + dy_t,
        dz_b + dx_l + dy_b,
        dz_b + dx_r + dy_b,
    ];
    corners.iter().any(|&s| s < r)
}

/// Precomputes, for one layer, whether every voxel within the AABB rectangle
/// is chamfered. Indexed `[(y - aabb.y0) * w + (x - aabb.x0)]`.
fn predicate_bitmap(aabb: &MaterialAabb, z: u32, dpi: u32, layers_per_inch: f64, r: f64) -> Vec<bool> {
    let frame = layer_frame(aabb, z, dpi, layers_per_inch);
    let w = (aabb.x1 - aabb.x0 + 1) as usize;
    let h = (aabb.y1 - aabb.y0 + 1) as usize;
    let mut bitmap = vec![false; w * h];
    for (row, &dy_t) in frame.dy_t.iter().enumerate() {
        let dy_b = frame.dy_b[row];
        for (col, &dx_l) in frame.dx_l.iter().enumerate() {
            let dx_r = frame.dx_r[col];
            bitmap[row * w + col] =
                chamfer_predicate(dx_l, dx_r, dy_t, dy_b, frame.dz_b, frame.dz_t, r);
        }
    }
    bitmap
}

struct RawSlice {
    path: PathBuf,
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

fn list_png_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("png"))
                .unwrap_or(false)
        })
        .collect();
    if paths.is_empty() {
        return Err(ErrorKind::NoPngInputs(dir.to_path_buf()).into());
    }
    paths.sort_by(|a, b| {
        natural_sort::compare(
            &a.file_name().unwrap().to_string_lossy(),
            &b.file_name().unwrap().to_string_lossy(),
        )
    });
    Ok(paths)
}

fn read_slice(path: &Path) -> Result<RawSlice> {
    let image = image::open(path)?.to_rgba();
    let (width, height) = image.dimensions();
    Ok(RawSlice {
        path: path.to_path_buf(),
        width,
        height,
        rgba: image.into_raw(),
    })
}

fn slice_local_aabb(slice: &RawSlice) -> Option<(u32, u32, u32, u32)> {
    let mut found = false;
    let (mut x0, mut x1, mut y0, mut y1) = (u32::MAX, 0u32, u32::MAX, 0u32);
    for y in 0..slice.height {
        let row_start = 4 * (y as usize) * (slice.width as usize);
        for x in 0..slice.width {
            let alpha = slice.rgba[row_start + 4 * x as usize + 3];
            if alpha != 0 {
                found = true;
                x0 = x0.min(x);
                x1 = x1.max(x);
                y0 = y0.min(y);
                y1 = y1.max(y);
            }
        }
    }
    if found {
        Some((x0, x1, y0, y1))
    } else {
        None
    }
}

/// Parameters controlling one chamfer run.
#[derive(Debug, Clone, Copy)]
pub struct ChamferParams {
    pub radius_in: f64,
    pub debug: bool,
    pub dpi: u32,
    pub layer_height_nm: u32,
}

fn copy_unchanged(inputs: &[PathBuf], output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;
    for path in inputs {
        let dest = output_dir.join(path.file_name().unwrap());
        std::fs::copy(path, dest)?;
    }
    Ok(())
}

/// Runs the two-pass chamfer operator over every PNG in `input_dir`, writing
/// results to `output_dir`.
pub fn run(input_dir: &Path, output_dir: &Path, params: &ChamferParams) -> Result<()> {
    if params.radius_in < 0.0 || params.radius_in.is_nan() {
        return Err(ErrorKind::InvalidParameter(format!(
            "chamfer radius must be a non-negative number, got {}",
            params.radius_in
        ))
        .into());
    }

    let inputs = list_png_inputs(input_dir)?;
    log::info!("chamfering {} slices from {:?}", inputs.len(), input_dir);

    let first = read_slice(&inputs[0])?;
    let (width, height) = (first.width, first.height);
    let mut local_aabbs = Vec::with_capacity(inputs.len());
    local_aabbs.push(slice_local_aabb(&first));

    for path in &inputs[1..] {
        let slice = read_slice(path)?;
        if (slice.width, slice.height) != (width, height) {
            return Err(ErrorKind::DimensionMismatch(
                (width, height),
                (slice.width, slice.height),
                path.clone(),
            )
            .into());
        }
        local_aabbs.push(slice_local_aabb(&slice));
    }

    let mut material = None;
    for (z, local) in local_aabbs.iter().enumerate() {
        if let Some((x0, x1, y0, y1)) = local {
            let z = z as u32;
            material = Some(match material {
                None => MaterialAabb {
                    x0: *x0,
                    x1: *x1,
                    y0: *y0,
                    y1: *y1,
                    z0: z,
                    z1: z,
                },
                Some(m) => MaterialAabb {
                    x0: m.x0.min(*x0),
                    x1: m.x1.max(*x1),
                    y0: m.y0.min(*y0),
                    y1: m.y1.max(*y1),
                    z0: m.z0.min(z),
                    z1: m.z1.max(z),
                },
            });
        }
    }

    let aabb = match material {
        Some(a) => a,
        None => {
            log::info!("no material found in any slice; copying inputs unchanged");
            return copy_unchanged(&inputs, output_dir);
        }
    };

    std::fs::create_dir_all(output_dir)?;
    let layers_per_inch = NM_PER_INCH / f64::from(params.layer_height_nm);

    let bitmaps: Vec<Vec<bool>> = (aabb.z0..=aabb.z1)
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|z| predicate_bitmap(&aabb, z, params.dpi, layers_per_inch, params.radius_in))
        .collect();

    let aabb_w = (aabb.x1 - aabb.x0 + 1) as usize;

    let progress = pbr::ProgressBar::new(inputs.len() as u64);
    let progress = std::sync::Mutex::new(progress);

    for (z, path) in inputs.iter().enumerate() {
        let z = z as u32;
        let dest = output_dir.join(path.file_name().unwrap());
        if z < aabb.z0 || z > aabb.z1 {
            std::fs::copy(path, &dest)?;
        } else {
            let mut slice = read_slice(path)?;
            let bitmap = &bitmaps[(z - aabb.z0) as usize];
            let prev_bitmap = if z > aabb.z0 {
                Some(&bitmaps[(z - aabb.z0 - 1) as usize])
            } else {
                None
            };
            carve_layer(&mut slice, &aabb, aabb_w, bitmap, prev_bitmap, params.debug);
            png_writer::write_file(&dest, slice.width, slice.height, &slice.rgba)?;
        }
        progress.lock().unwrap().inc();
    }
    progress.lock().unwrap().finish_println("");

    Ok(())
}

fn bitmap_state(bitmap: &[bool], aabb: &MaterialAabb, aabb_w: usize, x: u32, y: u32) -> bool {
    if x < aabb.x0 || x > aabb.x1 || y < aabb.y0 || y > aabb.y1 {
        return false;
    }
    let row = (y - aabb.y0) as usize;
    let col = (x - aabb.x0) as usize;
    bitmap[row * aabb_w + col]
}

fn carve_layer(
    slice: &mut RawSlice,
    aabb: &MaterialAabb,
    aabb_w: usize,
    bitmap: &[bool],
    prev_bitmap: Option<&Vec<bool>>,
    debug: bool,
) {
    let center_x = f64::from(aabb.x0 + aabb.x1) / 2.0;
    let center_y = f64::from(aabb.y0 + aabb.y1) / 2.0;
    let (width, height) = (slice.width, slice.height);

    let mut marks: Vec<(u32, u32)> = Vec::new();
    let mut carves: Vec<(u32, u32)> = Vec::new();

    for y in aabb.y0..=aabb.y1 {
        for x in aabb.x0..=aabb.x1 {
            let alpha = slice.rgba[4 * (y as usize * width as usize + x as usize) + 3];
            if alpha == 0 {
                continue;
            }
            let chamfered_here = bitmap_state(bitmap, aabb, aabb_w, x, y);

            if debug {
                let horiz_transition = [(x.wrapping_sub(1), y), (x + 1, y), (x, y.wrapping_sub(1)), (x, y + 1)]
                    .iter()
                    .any(|&(nx, ny)| {
                        nx < width
                            && ny < height
                            && bitmap_state(bitmap, aabb, aabb_w, nx, ny) != chamfered_here
                    });
                let vert_transition = chamfered_here
                    && prev_bitmap
                        .map(|prev| !bitmap_state(prev, aabb, aabb_w, x, y))
                        .unwrap_or(true);

                if horiz_transition || vert_transition {
                    let dir_x: i64 = if f64::from(x) < center_x { 1 } else { -1 };
                    let dir_y: i64 = if f64::from(y) < center_y { 1 } else { -1 };
                    let candidates = [
                        (x as i64 + dir_x, y as i64),
                        (x as i64, y as i64 + dir_y),
                    ];
                    for (nx, ny) in candidates.iter() {
                        if *nx < 0 || *ny < 0 || *nx as u32 >= width || *ny as u32 >= height {
                            continue;
                        }
                        let (nx, ny) = (*nx as u32, *ny as u32);
                        if !bitmap_state(bitmap, aabb, aabb_w, nx, ny) {
                            marks.push((nx, ny));
                            break;
                        }
                    }
                }
            }

            if chamfered_here {
                carves.push((x, y));
            }
        }
    }

    for (x, y) in marks {
        let offset = 4 * (y as usize * width as usize + x as usize);
        slice.rgba[offset] = 0;
        slice.rgba[offset + 1] = 0;
        slice.rgba[offset + 2] = 0;
        slice.rgba[offset + 3] = 255;
    }
    for (x, y) in carves {
        slice.rgba[4 * (y as usize * width as usize + x as usize) + 3] = 0;
    }
}
