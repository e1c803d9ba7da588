//! Lenient base64 decoding for FB2 `<binary>` payloads.
//!
//! Embedded binaries are frequently malformed: stray whitespace, line
//! breaks mid-quad, junk characters. The fast path is the standard decoder;
//! on failure a permissive pass skips invalid characters the way FBReader
//! does.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Decode base64, skipping characters the encoding does not define.
pub fn decode(raw: &[u8]) -> Vec<u8> {
    if let Ok(data) = STANDARD.decode(raw) {
        return data;
    }
    lenient_decode(raw)
}

fn lenient_decode(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() / 4 * 3);
    let mut quad = [0u8; 4];
    let mut quad_pos = 0;

    for &byte in raw {
        let value = match decode_byte(byte) {
            Some(v) => v,
            None => continue,
        };

        // Padding flushes whatever the quad holds.
        if value == 64 {
            flush_partial(&mut out, &quad, quad_pos);
            return out;
        }

        quad[quad_pos] = value;
        quad_pos += 1;
        if quad_pos == 4 {
            let triple = combine(&quad);
            out.push((triple >> 16) as u8);
            out.push((triple >> 8) as u8);
            out.push(triple as u8);
            quad_pos = 0;
        }
    }

    flush_partial(&mut out, &quad, quad_pos);
    out
}

fn flush_partial(out: &mut Vec<u8>, quad: &[u8; 4], quad_pos: usize) {
    if quad_pos == 0 {
        return;
    }
    let mut padded = *quad;
    for slot in padded.iter_mut().skip(quad_pos) {
        *slot = 0;
    }
    let triple = combine(&padded);
    if quad_pos >= 2 {
        out.push((triple >> 16) as u8);
    }
    if quad_pos >= 3 {
        out.push((triple >> 8) as u8);
    }
}

fn combine(quad: &[u8; 4]) -> u32 {
    (u32::from(quad[0]) << 18)
        | (u32::from(quad[1]) << 12)
        | (u32::from(quad[2]) << 6)
        | u32::from(quad[3])
}

/// Six-bit value of a base64 character; 64 marks padding.
fn decode_byte(byte: u8) -> Option<u8> {
    match byte {
        b'A'..=b'Z' => Some(byte - b'A'),
        b'a'..=b'z' => Some(byte - b'a' + 26),
        b'0'..=b'9' => Some(byte - b'0' + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        b'=' => Some(64),
        _ => None,
    }
}
