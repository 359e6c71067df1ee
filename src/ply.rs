//! PLY header and vertex stream ingestion: ASCII and binary
//! little-endian formats, tolerant of `property list` lines and of elements
//! other than `vertex`.

use crate::color::{normalize_channel, Color};
use crate::error::{Error, ErrorKind, Result};
use crate::point::{Point, PointCloud};
use byteorder::{LittleEndian, ReadBytesExt};
use fnv::FnvHashMap;
use nalgebra::Point3;
use std::io::{BufRead, BufReader, Read};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Ascii,
    BinaryLittleEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropertyType {
    F32,
    F64,
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
}

impl PropertyType {
    fn from_ply_name(name: &str) -> PropertyType {
        match name {
            "float" | "float32" => PropertyType::F32,
            "double" | "float64" => PropertyType::F64,
            "uchar" | "uint8" => PropertyType::U8,
            "char" | "int8" => PropertyType::I8,
            "ushort" | "uint16" => PropertyType::U16,
            "short" | "int16" => PropertyType::I16,
            "uint" | "uint32" => PropertyType::U32,
            "int" | "int32" => PropertyType::I32,
            // Documented fallback: unknown scalar types are read
            // as float32 little-endian.
            _ => PropertyType::F32,
        }
    }

    fn read_binary(self, r: &mut impl Read) -> std::io::Result<f64> {
        Ok(match self {
            PropertyType::F32 => f64::from(r.read_f32::<LittleEndian>()?),
            PropertyType::F64 => r.read_f64::<LittleEndian>()?,
            PropertyType::U8 => f64::from(r.read_u8()?),
            PropertyType::I8 => f64::from(r.read_i8()?),
            PropertyType::U16 => f64::from(r.read_u16::<LittleEndian>()?),
            PropertyType::I16 => f64::from(r.read_i16::<LittleEndian>()?),
            PropertyType::U32 => f64::from(r.read_u32::<LittleEndian>()?),
            PropertyType::I32 => f64::from(r.read_i32::<LittleEndian>()?),
        })
    }
}

struct VertexProperty {
    name: String,
    ty: PropertyType,
}

struct Header {
    format: Format,
    vertex_count: usize,
    properties: Vec<VertexProperty>,
}

/// Per-property byte offset and type within one vertex record, keyed by name;
/// used to locate `x,y,z` and the optional color channels regardless of
/// declaration order.
type PropertyIndex = FnvHashMap<String, usize>;

fn parse_header(reader: &mut impl BufRead) -> Result<Header> {
    let mut format = None;
    let mut vertex_count = None;
    let mut properties = Vec::new();
    let mut in_vertex_element = false;
    let mut saw_end_header = false;

    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            break;
        }
        let trimmed = line.trim();
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        match tokens.as_slice() {
            ["ply"] => {}
            ["format", fmt, _version] => {
                format = Some(match *fmt {
                    "ascii" => Format::Ascii,
                    "binary_little_endian" => Format::BinaryLittleEndian,
                    other => return Err(ErrorKind::UnsupportedFormat(other.to_string()).into()),
                });
            }
            ["comment", ..] => {}
            ["element", "vertex", count] => {
                in_vertex_element = true;
                vertex_count = count.parse::<usize>().ok();
            }
            ["element", ..] => {
                in_vertex_element = false;
            }
            ["property", "list", ..] => {
                // Tolerated and skipped; only relevant within
                // other elements such as `face`, which we also ignore.
            }
            ["property", ty, name] if in_vertex_element => {
                properties.push(VertexProperty {
                    name: (*name).to_string(),
                    ty: PropertyType::from_ply_name(ty),
                });
            }
            ["property", ..] => {}
            ["end_header"] => {
                saw_end_header = true;
                break;
            }
            _ => {}
        }
    }

    if !saw_end_header {
        return Err(ErrorKind::HeaderMissingEndMarker.into());
    }
    let format = format.ok_or_else(|| Error::from(ErrorKind::UnsupportedFormat(String::new())))?;
    let vertex_count = match vertex_count {
        Some(n) if n > 0 => n,
        _ => return Err(ErrorKind::MissingVertexElement.into()),
    };

    Ok(Header {
        format,
        vertex_count,
        properties,
    })
}

fn property_index(header: &Header) -> PropertyIndex {
    header
        .properties
        .iter()
        .enumerate()
        .map(|(i, p)| (p.name.clone(), i))
        .collect()
}

fn color_names() -> [(&'static str, &'static str, &'static str, &'static str); 2] {
    [
        ("r", "g", "b", "a"),
        ("red", "green", "blue", "alpha"),
    ]
}

fn find_color_indices(index: &PropertyIndex) -> Option<(usize, usize, usize, Option<usize>)> {
    for (r, g, b, a) in color_names().iter() {
        if let (Some(&ri), Some(&gi), Some(&bi)) = (index.get(*r), index.get(*g), index.get(*b)) {
            let ai = index.get(*a).copied();
            return Some((ri, gi, bi, ai));
        }
    }
    None
}

fn require_coords(index: &PropertyIndex) -> Result<(usize, usize, usize)> {
    let x = index
        .get("x")
        .copied()
        .ok_or_else(|| Error::from(ErrorKind::MissingCoordinate('x')))?;
    let y = index
        .get("y")
        .copied()
        .ok_or_else(|| Error::from(ErrorKind::MissingCoordinate('y')))?;
    let z = index
        .get("z")
        .copied()
        .ok_or_else(|| Error::from(ErrorKind::MissingCoordinate('z')))?;
    Ok((x, y, z))
}

fn build_point(
    values: &[f64],
    coords: (usize, usize, usize),
    color_idx: Option<(usize, usize, usize, Option<usize>)>,
) -> Point {
    let (xi, yi, zi) = coords;
    let position = Point3::new(values[xi], values[yi], values[zi]);
    let color = color_idx.map(|(ri, gi, bi, ai)| Color {
        red: normalize_channel(values[ri]),
        green: normalize_channel(values[gi]),
        blue: normalize_channel(values[bi]),
        alpha: ai.map_or(255, |ai| normalize_channel(values[ai])),
    });
    Point::new(position, color)
}

/// Parses a PLY file (ASCII or binary little-endian vertex stream) into a
/// `PointCloud`.
pub fn parse(path: &std::path::Path) -> Result<PointCloud> {
    let file = std::fs::File::open(path).map_err(|_| ErrorKind::InvalidInputFile(path.to_path_buf()))?;
    let mut reader = BufReader::new(file);
    let header = parse_header(&mut reader)?;
    let index = property_index(&header);
    let coords = require_coords(&index)?;
    let color_idx = find_color_indices(&index);

    let points = match header.format {
        Format::Ascii => parse_ascii_vertices(&mut reader, &header, coords, color_idx)?,
        Format::BinaryLittleEndian => {
            parse_binary_vertices(&mut reader, &header, coords, color_idx)?
        }
    };
    Ok(PointCloud::new(points))
}

fn parse_ascii_vertices(
    reader: &mut impl BufRead,
    header: &Header,
    coords: (usize, usize, usize),
    color_idx: Option<(usize, usize, usize, Option<usize>)>,
) -> Result<Vec<Point>> {
    let mut points = Vec::with_capacity(header.vertex_count);
    let mut line = String::new();
    let mut parsed = 0;
    while parsed < header.vertex_count {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let values: Vec<f64> = trimmed
            .split_whitespace()
            .take(header.properties.len())
            .map(|t| t.parse::<f64>().unwrap_or(0.0))
            .collect();
        points.push(build_point(&values, coords, color_idx));
        parsed += 1;
    }
    Ok(points)
}

fn parse_binary_vertices(
    reader: &mut impl Read,
    header: &Header,
    coords: (usize, usize, usize),
    color_idx: Option<(usize, usize, usize, Option<usize>)>,
) -> Result<Vec<Point>> {
    let mut points = Vec::with_capacity(header.vertex_count);
    let mut values = vec![0.0f64; header.properties.len()];
    for _ in 0..header.vertex_count {
        for (i, prop) in header.properties.iter().enumerate() {
            values[i] = prop.ty.read_binary(reader)?;
        }
        points.push(build_point(&values, coords, color_idx));
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse_str(contents: &str) -> Result<PointCloud> {
        let mut reader = BufReader::new(Cursor::new(contents.as_bytes().to_vec()));
        let header = parse_header(&mut reader)?;
        let index = property_index(&header);
        let coords = require_coords(&index)?;
        let color_idx = find_color_indices(&index);
        let points = parse_ascii_vertices(&mut reader, &header, coords, color_idx)?;
        Ok(PointCloud::new(points))
    }

    #[test]
    fn parses_ascii_vertices_with_rgb() {
        let ply = "ply\nformat ascii 1.0\nelement vertex 2\nproperty float x\nproperty float y\nproperty float z\nproperty uchar red\nproperty uchar green\nproperty uchar blue\nend_header\n0 0 0 200 100 50\n1 1 1 10 20 30\n";
        let cloud = parse_str(ply).unwrap();
        assert_eq!(cloud.len(), 2);
        assert_eq!(
            cloud.points()[0].color,
            Some(Color::opaque(200, 100, 50))
        );
    }

    #[test]
    fn normalized_color_channels_scale_by_255() {
        let ply = "ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\nproperty float y\nproperty float z\nproperty float r\nproperty float g\nproperty float b\nend_header\n0 0 0 1.0 0.5 0.0\n";
        let cloud = parse_str(ply).unwrap();
        let color = cloud.points()[0].color.unwrap();
        assert_eq!(color.red, 255);
        assert_eq!(color.green, 128);
        assert_eq!(color.blue, 0);
    }

    #[test]
    fn missing_end_header_is_an_error() {
        let ply = "ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\nproperty float y\nproperty float z\n0 0 0\n";
        let err = parse_str(ply).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::HeaderMissingEndMarker));
    }

    #[test]
    fn missing_coordinate_is_an_error() {
        let ply = "ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\nproperty float y\nend_header\n0 0\n";
        let err = parse_str(ply).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MissingCoordinate('z')));
    }

    #[test]
    fn unsupported_format_is_an_error() {
        let ply = "ply\nformat binary_big_endian 1.0\nelement vertex 1\nproperty float x\nproperty float y\nproperty float z\nend_header\n";
        let err = parse_str(ply).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnsupportedFormat(_)));
    }

    #[test]
    fn zero_count_vertex_element_is_an_error() {
        let ply = "ply\nformat ascii 1.0\nelement vertex 0\nproperty float x\nproperty float y\nproperty float z\nend_header\n";
        let err = parse_str(ply).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::MissingVertexElement));
    }

    #[test]
    fn property_list_lines_are_tolerated() {
        let ply = "ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\nproperty float y\nproperty float z\nelement face 1\nproperty list uchar int vertex_indices\nend_header\n0 0 0\n3 0 1 2\n";
        let cloud = parse_str(ply).unwrap();
        assert_eq!(cloud.len(), 1);
    }
}
