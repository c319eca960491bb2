//! Minimal NumPy `.npy` codec for embedding artifacts.
//!
//! Only little-endian `float32` arrays in C order are handled. The array shape
//! is written as 1-D and ignored on read, since the core treats embeddings as
//! a flat opaque buffer.

use std::io::{Error, ErrorKind};

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 64;

/// Serialize `values` as a version 1.0 `.npy` file.
pub fn encode_f32(values: &[f32]) -> Vec<u8> {
    let dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({},), }}",
        values.len()
    );
    // magic(6) + version(2) + header_len(2) + dict + padding + '\n'
    let unpadded = 10 + dict.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    let header_len = dict.len() + padding + 1;

    let mut out = Vec::with_capacity(10 + header_len + values.len() * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header_len as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out.extend(std::iter::repeat(b' ').take(padding));
    out.push(b'\n');
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Parse a `.npy` file holding `float32` data into a flat vector.
pub fn decode_f32(data: &[u8], name: &str) -> std::io::Result<Vec<f32>> {
    if data.len() < 10 {
        return Err(invalid(format!("{name}: file too short ({} bytes)", data.len())));
    }
    if &data[0..6] != MAGIC {
        return Err(invalid(format!("{name}: invalid numpy magic bytes")));
    }

    // major version at [6]; v1 uses a u16 header length, v2/v3 a u32.
    let (header_len, header_start) = match data[6] {
        1 => (u16::from_le_bytes([data[8], data[9]]) as usize, 10),
        2 | 3 if data.len() >= 12 => (
            u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize,
            12,
        ),
        v => return Err(invalid(format!("{name}: unsupported npy version {v}"))),
    };
    let data_offset = header_start + header_len;
    if data.len() < data_offset {
        return Err(invalid(format!(
            "{name}: header truncated (need {data_offset} bytes, got {})",
            data.len()
        )));
    }

    let header = String::from_utf8_lossy(&data[header_start..data_offset]);
    if !header.contains("'<f4'") {
        return Err(invalid(format!("{name}: expected little-endian float32 data")));
    }
    if header.contains("'fortran_order': True") {
        return Err(invalid(format!("{name}: fortran-ordered arrays are not supported")));
    }

    let float_data = &data[data_offset..];
    if float_data.len() % 4 != 0 {
        return Err(invalid(format!(
            "{name}: float data length {} is not a multiple of 4",
            float_data.len()
        )));
    }

    Ok(float_data
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn invalid(msg: String) -> Error {
    Error::new(ErrorKind::InvalidData, msg)
}
