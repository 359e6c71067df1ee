use std::path::PathBuf;
use std::str::FromStr;

use structopt::StructOpt;
use voxelprint::raster::{InteriorFill, ShellPolicy};
use voxelprint::{chamfer, stack, Physical};

#[derive(Debug)]
enum ShellPolicyArg {
    ColorBySample,
    TwoBand,
}

impl FromStr for ShellPolicyArg {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "color-by-sample" => Ok(ShellPolicyArg::ColorBySample),
            "two-band" => Ok(ShellPolicyArg::TwoBand),
            other => Err(format!(
                "unknown shell policy '{}', expected 'color-by-sample' or 'two-band'",
                other
            )),
        }
    }
}

#[derive(Debug)]
enum InteriorFillArg {
    Off,
    BeforeSampling,
    AfterSampling,
}

impl FromStr for InteriorFillArg {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(InteriorFillArg::Off),
            "before-sampling" => Ok(InteriorFillArg::BeforeSampling),
            "after-sampling" => Ok(InteriorFillArg::AfterSampling),
            other => Err(format!(
                "unknown interior fill '{}', expected 'off', 'before-sampling' or 'after-sampling'",
                other
            )),
        }
    }
}

/// Converts a colored point cloud into a stack of raster slices, or
/// chamfers an existing slice stack.
#[derive(StructOpt, Debug)]
#[structopt(name = "voxelprint")]
enum Opt {
    /// Rasterizes a PLY point cloud into one PNG per Z layer.
    Slice(SliceArgs),
    /// Carves cuboid edges and corners of an existing slice stack.
    Chamfer(ChamferArgs),
}

#[derive(StructOpt, Debug)]
struct SliceArgs {
    /// Input point cloud, PLY ascii or binary_little_endian.
    #[structopt(parse(from_os_str))]
    ply: PathBuf,

    /// Directory `out_{z}.png` slices are written to.
    #[structopt(long, parse(from_os_str))]
    output_dir: PathBuf,

    #[structopt(long, default_value = "300")]
    dpi: u32,

    #[structopt(long, default_value = "27000")]
    layer_height_nm: u32,

    #[structopt(long)]
    x_in: f64,

    #[structopt(long)]
    y_in: f64,

    #[structopt(long)]
    z_in: f64,

    #[structopt(long, default_value = "0.0")]
    padding_ratio: f64,

    #[structopt(long)]
    voxel_radius_in: f64,

    /// Overrides the isotropic radius with `Rx,Ry,Rz` (in inches).
    #[structopt(long)]
    anisotropic_radii_in: Option<String>,

    #[structopt(long, default_value = "color-by-sample")]
    shell_policy: ShellPolicyArg,

    #[structopt(long, requires("r-outer-in"))]
    r_inner_in: Option<f64>,

    #[structopt(long, requires("r-inner-in"))]
    r_outer_in: Option<f64>,

    #[structopt(long, default_value = "off")]
    interior_fill: InteriorFillArg,

    #[structopt(long, default_value = "500")]
    interior_fill_threshold: usize,
}

#[derive(StructOpt, Debug)]
struct ChamferArgs {
    /// Directory of input slice PNGs.
    #[structopt(parse(from_os_str))]
    input_dir: PathBuf,

    /// Directory the chamfered slices are written to.
    #[structopt(long, parse(from_os_str))]
    output_dir: PathBuf,

    /// Bevel radius in inches.
    #[structopt(long)]
    chamfer_radius_in: f64,

    /// DPI the input slices were rasterized at.
    #[structopt(long, default_value = "300")]
    dpi: u32,

    /// Layer height (nm) the input slices were rasterized at.
    #[structopt(long, default_value = "27000")]
    layer_height_nm: u32,

    /// Draws a debug overlay marking chamfer boundary transitions.
    #[structopt(long)]
    chamfer_debug: bool,
}

fn parse_anisotropic(spec: &str) -> Result<(f64, f64, f64), String> {
    let parts: Vec<&str> = spec.split(',').collect();
    if parts.len() != 3 {
        return Err(format!(
            "anisotropic-radii-in expects 'Rx,Ry,Rz', got '{}'",
            spec
        ));
    }
    let parse_one = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|_| format!("not a number: '{}'", s))
    };
    Ok((parse_one(parts[0])?, parse_one(parts[1])?, parse_one(parts[2])?))
}

fn run_slice(args: SliceArgs) -> voxelprint::Result<()> {
    let anisotropic_radii_in = match &args.anisotropic_radii_in {
        Some(spec) => Some(parse_anisotropic(spec).map_err(voxelprint::ErrorKind::InvalidParameter)?),
        None => None,
    };

    let shell_policy = match args.shell_policy {
        ShellPolicyArg::ColorBySample => ShellPolicy::ColorBySample,
        ShellPolicyArg::TwoBand => {
            let r_inner = args.r_inner_in.ok_or_else(|| {
                voxelprint::ErrorKind::InvalidParameter(
                    "two-band shell policy requires --r-inner-in and --r-outer-in".to_string(),
                )
            })?;
            let r_outer = args.r_outer_in.ok_or_else(|| {
                voxelprint::ErrorKind::InvalidParameter(
                    "two-band shell policy requires --r-inner-in and --r-outer-in".to_string(),
                )
            })?;
            ShellPolicy::TwoBand {
                r_inner,
                r_outer,
            }
        }
    };

    let interior_fill = match args.interior_fill {
        InteriorFillArg::Off => InteriorFill::Off,
        InteriorFillArg::BeforeSampling => InteriorFill::BeforeSampling,
        InteriorFillArg::AfterSampling => {
            InteriorFill::AfterSamplingIfFilledExceeds(args.interior_fill_threshold)
        }
    };

    let job = stack::Job {
        physical: Physical {
            dpi: args.dpi,
            layer_height_nm: args.layer_height_nm,
            x_in: args.x_in,
            y_in: args.y_in,
            z_in: args.z_in,
        },
        padding_ratio: args.padding_ratio,
        voxel_radius_in: args.voxel_radius_in,
        anisotropic_radii_in,
        shell_policy,
        interior_fill,
        output_dir: args.output_dir,
    };

    stack::run(&args.ply, &job)
}

fn run_chamfer(args: ChamferArgs) -> voxelprint::Result<()> {
    let params = chamfer::ChamferParams {
        radius_in: args.chamfer_radius_in,
        debug: args.chamfer_debug,
        dpi: args.dpi,
        layer_height_nm: args.layer_height_nm,
    };
    chamfer::run(&args.input_dir, &args.output_dir, &params)
}

fn main() {
    env_logger::init();
    let opt = Opt::from_args();

    let result = match opt {
        Opt::Slice(args) => run_slice(args),
        Opt::Chamfer(args) => run_chamfer(args),
    };

    if let Err(err) = result {
        eprintln!("error: {}", err);
        std::process::exit(err.exit_code());
    }
}
