//! Reader for the PFM binary float-map format.
//!
//! Layout: an ASCII header of three newline-terminated lines (`PF` for
//! color with 3 channels or `Pf` for grayscale, `"<width> <height>"`, and a
//! signed scale whose sign encodes endianness, negative meaning
//! little-endian) followed by raw IEEE-754 32-bit samples in row-major order.

/// Decoded float map: dimensions, channel count, samples as written.
#[derive(Debug)]
pub struct PfmImage {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub data: Vec<f32>,
}

/// Parse a PFM byte buffer.
pub fn parse(bytes: &[u8]) -> Result<PfmImage, String> {
    let mut cursor = 0usize;
    let header = read_line(bytes, &mut cursor)?;
    let channels = match header.as_str() {
        "PF" => 3,
        "Pf" => 1,
        other => return Err(format!("not a PFM file (header '{other}')")),
    };

    let dims = read_line(bytes, &mut cursor)?;
    let mut parts = dims.split_whitespace();
    let width: usize = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| format!("bad PFM dimensions line '{dims}'"))?;
    let height: usize = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| format!("bad PFM dimensions line '{dims}'"))?;

    let scale_line = read_line(bytes, &mut cursor)?;
    let scale: f32 = scale_line
        .trim()
        .parse()
        .map_err(|_| format!("bad PFM scale line '{scale_line}'"))?;
    let little_endian = scale < 0.0;

    let samples = width * height * channels;
    let payload = &bytes[cursor..];
    if payload.len() != samples * 4 {
        return Err(format!(
            "PFM payload is {} bytes, expected {}",
            payload.len(),
            samples * 4
        ));
    }

    let data = payload
        .chunks_exact(4)
        .map(|c| {
            let b = [c[0], c[1], c[2], c[3]];
            if little_endian {
                f32::from_le_bytes(b)
            } else {
                f32::from_be_bytes(b)
            }
        })
        .collect();

    Ok(PfmImage {
        width,
        height,
        channels,
        data,
    })
}

fn read_line(bytes: &[u8], cursor: &mut usize) -> Result<String, String> {
    let rest = &bytes[*cursor..];
    let end = rest
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| "truncated PFM header".to_string())?;
    let line = String::from_utf8_lossy(&rest[..end]).trim_end().to_string();
    *cursor += end + 1;
    Ok(line)
}

/// Serialize a single-channel map as a `Pf` buffer (little-endian).
///
/// Test fixture support; the evaluation pipeline itself only reads.
pub fn write_grayscale(width: usize, height: usize, data: &[f32]) -> Vec<u8> {
    assert_eq!(data.len(), width * height);
    let mut out = format!("Pf\n{width} {height}\n-1.0\n").into_bytes();
    for &v in data {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_grayscale_little_endian() {
        let data = vec![1.0f32, 2.5, 0.0, -4.25];
        let bytes = write_grayscale(2, 2, &data);
        let img = parse(&bytes).unwrap();
        assert_eq!((img.width, img.height, img.channels), (2, 2, 1));
        assert_eq!(img.data, data);
    }

    #[test]
    fn parses_big_endian_color() {
        let mut bytes = b"PF\n1 1\n1.0\n".to_vec();
        for v in [0.5f32, 1.5, 2.5] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        let img = parse(&bytes).unwrap();
        assert_eq!(img.channels, 3);
        assert_eq!(img.data, vec![0.5, 1.5, 2.5]);
    }

    #[test]
    fn rejects_bad_header() {
        assert!(parse(b"P6\n1 1\n-1.0\n\0\0\0\0").is_err());
    }

    #[test]
    fn rejects_byte_count_mismatch() {
        let mut bytes = write_grayscale(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        bytes.pop();
        assert!(parse(&bytes).unwrap_err().contains("payload"));
    }
}
