//! A deterministic, uncompressed-DEFLATE PNG encoder. This is the
//! one "external collaborator" contract the core voxelization engine owns an
//! implementation of, since the stack driver needs somewhere to write
//! slices. 8-bit RGBA, no interlace, filter type 0; `IDAT` holds a zlib
//! stream built from DEFLATE *stored* (uncompressed) blocks, so the same
//! input always produces byte-identical output regardless of the deflate
//! implementation's compression heuristics.

use crate::error::Result;
use byteorder::{BigEndian, WriteBytesExt};
use std::io::Write;

const STORED_BLOCK_MAX: usize = 65_535;

fn adler32(data: &[u8]) -> u32 {
    const MOD_ADLER: u32 = 65_521;
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for &byte in data {
        a = (a + u32::from(byte)) % MOD_ADLER;
        b = (b + a) % MOD_ADLER;
    }
    (b << 16) | a
}

/// Wraps `data` in deflate stored blocks (BTYPE=00), each up to 65,535 bytes.
fn deflate_stored(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / STORED_BLOCK_MAX * 5 + 5);
    if data.is_empty() {
        out.push(0x01); // BFINAL=1, BTYPE=00, padded to a byte.
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0xffffu16.to_le_bytes());
        return out;
    }
    let mut offset = 0;
    while offset < data.len() {
        let remaining = data.len() - offset;
        let len = remaining.min(STORED_BLOCK_MAX);
        let is_final = offset + len == data.len();
        out.push(if is_final { 0x01 } else { 0x00 });
        let len16 = len as u16;
        out.extend_from_slice(&len16.to_le_bytes());
        out.extend_from_slice(&(!len16).to_le_bytes());
        out.extend_from_slice(&data[offset..offset + len]);
        offset += len;
    }
    out
}

/// A zlib stream (CMF=0x78, FLG=0x01, then stored-block deflate data, then a
/// big-endian Adler-32 of the uncompressed bytes).
fn zlib_wrap(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 11);
    out.push(0x78);
    out.push(0x01);
    out.extend_from_slice(&deflate_stored(data));
    out.write_u32::<BigEndian>(adler32(data)).unwrap();
    out
}

fn write_chunk(out: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    out.write_u32::<BigEndian>(data.len() as u32).unwrap();
    let mut type_and_data = Vec::with_capacity(4 + data.len());
    type_and_data.extend_from_slice(chunk_type);
    type_and_data.extend_from_slice(data);
    out.extend_from_slice(&type_and_data);
    out.write_u32::<BigEndian>(crc32fast::hash(&type_and_data)).unwrap();
}

/// Packs `rgba` (4*width*height bytes, row-major) into filtered scanlines
/// (filter type 0, i.e. no filtering), one leading byte per row.
fn filter_scanlines(width: u32, height: u32, rgba: &[u8]) -> Vec<u8> {
    let stride = 4 * width as usize;
    let mut out = Vec::with_capacity((stride + 1) * height as usize);
    for row in 0..height as usize {
        out.push(0);
        out.extend_from_slice(&rgba[row * stride..(row + 1) * stride]);
    }
    out
}

/// Encodes `rgba` as a PNG and returns the raw file bytes. `rgba` must be
/// `4*width*height` bytes, row-major, top-to-bottom.
pub fn encode(width: u32, height: u32, rgba: &[u8]) -> Vec<u8> {
    assert_eq!(rgba.len(), 4 * width as usize * height as usize);

    let mut out = Vec::new();
    out.extend_from_slice(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);

    let mut ihdr = Vec::with_capacity(13);
    ihdr.write_u32::<BigEndian>(width).unwrap();
    ihdr.write_u32::<BigEndian>(height).unwrap();
    ihdr.push(8); // bit depth
    ihdr.push(6); // color type: RGBA
    ihdr.push(0); // compression method
    ihdr.push(0); // filter method
    ihdr.push(0); // interlace method
    write_chunk(&mut out, b"IHDR", &ihdr);

    let scanlines = filter_scanlines(width, height, rgba);
    let idat = zlib_wrap(&scanlines);
    write_chunk(&mut out, b"IDAT", &idat);

    write_chunk(&mut out, b"IEND", &[]);
    out
}

/// Encodes and writes `rgba` to `path`.
pub fn write_file(path: &std::path::Path, width: u32, height: u32, rgba: &[u8]) -> Result<()> {
    let bytes = encode(width, height, rgba);
    let mut file = std::fs::File::create(path)?;
    file.write_all(&bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_is_deterministic() {
        let rgba = vec![10u8, 20, 30, 255, 1, 2, 3, 0];
        let a = encode(2, 1, &rgba);
        let b = encode(2, 1, &rgba);
        assert_eq!(a, b);
    }

    #[test]
    fn starts_with_png_signature_and_ihdr() {
        let rgba = vec![0u8; 4 * 4 * 4];
        let bytes = encode(4, 4, &rgba);
        assert_eq!(&bytes[0..8], &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
        assert_eq!(&bytes[12..16], b"IHDR");
    }

    #[test]
    fn adler32_matches_known_vector() {
        // "Wikipedia" -> 0x11E60398 is the textbook reference vector.
        assert_eq!(adler32(b"Wikipedia"), 0x11E6_0398);
    }

    #[test]
    fn stored_blocks_split_at_65535_bytes() {
        let data = vec![7u8; 65_535 * 2 + 10];
        let deflated = deflate_stored(&data);
        // Three blocks: two full 65535-byte stored blocks plus a 10-byte tail,
        // each with a 5-byte stored-block header.
        assert_eq!(deflated.len(), data.len() + 5 * 3);
    }
}
