//! Minimal reader for the NumPy `.npy` container.
//!
//! Supports version 1.x/2.x headers with little-endian `f4`/`f8` payloads in
//! C order, which covers every serialized depth array the benchmark consumes.
//! Singleton dimensions are squeezed away by the caller.

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Decoded array: dimensions as written (before squeezing) plus f32 samples.
#[derive(Debug)]
pub struct NpyArray {
    pub dims: Vec<usize>,
    pub data: Vec<f32>,
}

/// Parse a `.npy` byte buffer.
pub fn parse(bytes: &[u8]) -> Result<NpyArray, String> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err("not an npy file (bad magic)".to_string());
    }
    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => {
            let len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
            (len, 10)
        }
        2 | 3 => {
            if bytes.len() < 12 {
                return Err("truncated npy header length".to_string());
            }
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
            (len, 12)
        }
        v => return Err(format!("unsupported npy version {v}")),
    };
    let header_end = header_start + header_len;
    if bytes.len() < header_end {
        return Err("truncated npy header".to_string());
    }
    let header = std::str::from_utf8(&bytes[header_start..header_end])
        .map_err(|_| "npy header is not valid UTF-8".to_string())?;

    let descr = dict_str_value(header, "descr")?;
    let fortran = header
        .split("'fortran_order'")
        .nth(1)
        .map(|rest| rest.trim_start_matches([':', ' ']).starts_with("True"))
        .unwrap_or(false);
    if fortran {
        return Err("Fortran-ordered npy arrays are not supported".to_string());
    }
    let dims = parse_shape(header)?;

    let item_size = match descr.as_str() {
        "<f4" | "|f4" | "=f4" => 4,
        "<f8" | "|f8" | "=f8" => 8,
        other => return Err(format!("unsupported npy dtype '{other}'")),
    };
    let count: usize = dims.iter().product();
    let payload = &bytes[header_end..];
    if payload.len() != count * item_size {
        return Err(format!(
            "npy payload is {} bytes, expected {}",
            payload.len(),
            count * item_size
        ));
    }

    let data = if item_size == 4 {
        payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    } else {
        payload
            .chunks_exact(8)
            .map(|c| {
                f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
            })
            .collect()
    };
    Ok(NpyArray { dims, data })
}

fn dict_str_value(header: &str, key: &str) -> Result<String, String> {
    let pattern = format!("'{key}'");
    let rest = header
        .split(&pattern)
        .nth(1)
        .ok_or_else(|| format!("npy header missing '{key}'"))?;
    let rest = rest.trim_start_matches([':', ' ']);
    let quote = rest
        .chars()
        .next()
        .filter(|&c| c == '\'' || c == '"')
        .ok_or_else(|| format!("npy header '{key}' is not a string"))?;
    let inner = &rest[1..];
    let end = inner
        .find(quote)
        .ok_or_else(|| format!("unterminated '{key}' value"))?;
    Ok(inner[..end].to_string())
}

fn parse_shape(header: &str) -> Result<Vec<usize>, String> {
    let rest = header
        .split("'shape'")
        .nth(1)
        .ok_or_else(|| "npy header missing 'shape'".to_string())?;
    let open = rest
        .find('(')
        .ok_or_else(|| "npy shape is not a tuple".to_string())?;
    let close = rest[open..]
        .find(')')
        .ok_or_else(|| "unterminated npy shape tuple".to_string())?
        + open;
    rest[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| format!("bad dimension '{s}' in npy shape"))
        })
        .collect()
}

/// Serialize a 2-D f32 array as a version-1 `.npy` buffer.
///
/// Test fixture support; the evaluation pipeline itself only reads.
pub fn write_2d(w: usize, h: usize, data: &[f32]) -> Vec<u8> {
    assert_eq!(data.len(), w * h);
    let mut header = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': ({h}, {w}), }}");
    // Pad so magic + version + length + header is a multiple of 64, newline-terminated.
    let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
    let pad = (64 - unpadded % 64) % 64;
    header.extend(std::iter::repeat(' ').take(pad));
    header.push('\n');

    let mut out = Vec::with_capacity(unpadded + pad + data.len() * 4);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1u8, 0u8]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for &v in data {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}
