//! Error kinds for point cloud ingestion, rasterization, and chamfering.

use error_chain::error_chain;

error_chain! {
    foreign_links {
        Io(std::io::Error);
        Image(image::ImageError);
    }

    errors {
        InvalidInputFile(path: std::path::PathBuf) {
            description("input file missing or unreadable")
            display("invalid input file: {}", path.display())
        }

        HeaderMissingEndMarker {
            description("PLY header has no end_header marker")
            display("PLY header is missing its end_header marker")
        }

        UnsupportedFormat(format: String) {
            description("PLY format is neither ascii nor binary_little_endian")
            display("unsupported PLY format: {}", format)
        }

        MissingVertexElement {
            description("PLY file has no vertex element, or it has zero count")
            display("PLY file has no non-empty vertex element")
        }

        MissingCoordinate(axis: char) {
            description("PLY vertex element is missing a required coordinate")
            display("PLY vertex element is missing required coordinate '{}'", axis)
        }

        DimensionMismatch(expected: (u32, u32), found: (u32, u32), path: std::path::PathBuf) {
            description("slice images do not share one width/height")
            display(
                "slice {} has dimensions {:?}, expected {:?}",
                path.display(), found, expected
            )
        }

        InvalidParameter(message: String) {
            description("a numeric parameter is out of range or NaN")
            display("invalid parameter: {}", message)
        }

        NoPngInputs(dir: std::path::PathBuf) {
            description("chamfer input directory has no PNG files")
            display("no PNG inputs found in {}", dir.display())
        }
    }
}

impl Error {
    /// The process exit code spec §6 assigns to this error's class: `1` for
    /// usage/IO/input errors (malformed PLY or PNG inputs, bad parameters,
    /// missing files — including `Image`, since the only place that foreign
    /// link fires is decoding a user-supplied slice in the chamferer's input
    /// directory), `2` for internal failures (an error-chain `Msg` with no
    /// kind of its own).
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Msg(_) => 2,
            _ => 1,
        }
    }
}
