//! Bounded yEnc decoding for header inspection
//!
//! Only the leading bytes of an article payload are needed to recognize
//! an archive header, so decoding stops at a caller-supplied cap instead
//! of consuming the full body. No CRC verification: the trailer checksum
//! covers the whole part, which is never fully decoded here.

use crate::error::{Result, TriageError};

/// Decode the first `max_bytes` of a yEnc-encoded article body.
///
/// The body is walked as CRLF-delimited 8-bit lines: everything before
/// `=ybegin` is skipped, `=ypart` headers are skipped, `=yend` stops the
/// walk. Escape sequences (`=X`) decode as `(X - 64 - 42) mod 256`,
/// plain bytes as `(b - 42) mod 256`.
///
/// # Errors
///
/// [`TriageError::DecodeError`] if no output bytes were produced (no
/// `=ybegin` marker, or an empty payload).
pub fn decode_prefix(body: &[u8], max_bytes: usize) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(max_bytes.min(16 * 1024));
    let mut in_payload = false;

    for line in split_lines(body) {
        if !in_payload {
            if line.starts_with(b"=ybegin") {
                in_payload = true;
            }
            continue;
        }

        if line.starts_with(b"=ypart") {
            continue;
        }
        if line.starts_with(b"=yend") {
            break;
        }

        decode_line(line, &mut output, max_bytes);
        if output.len() >= max_bytes {
            break;
        }
    }

    if output.is_empty() {
        return Err(TriageError::DecodeError);
    }

    output.truncate(max_bytes);
    Ok(output)
}

/// Split on LF, tolerating a trailing CR on each line and a missing
/// final newline.
fn split_lines(input: &[u8]) -> impl Iterator<Item = &[u8]> {
    input.split(|&b| b == b'\n').map(|line| {
        if line.ends_with(b"\r") {
            &line[..line.len() - 1]
        } else {
            line
        }
    })
}

fn decode_line(line: &[u8], output: &mut Vec<u8>, max_bytes: usize) {
    let mut i = 0;
    while i < line.len() && output.len() < max_bytes {
        let byte = line[i];

        if byte == b'=' {
            // Escape sequence; an escape cut off by end-of-line is dropped
            if i + 1 >= line.len() {
                break;
            }
            i += 1;
            output.push(line[i].wrapping_sub(64).wrapping_sub(42));
        } else {
            output.push(byte.wrapping_sub(42));
        }

        i += 1;
    }
}

/// Encode bytes as a single-part yEnc block. Test helper for round-trip
/// checks; escapes the critical characters (NUL, TAB, LF, CR, '=', '.').
#[cfg(test)]
pub(crate) fn encode_block(name: &str, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(
        format!("=ybegin line=128 size={} name={}\r\n", data.len(), name).as_bytes(),
    );
    for &b in data {
        let enc = b.wrapping_add(42);
        match enc {
            0x00 | 0x09 | 0x0a | 0x0d | 0x3d | 0x2e => {
                out.push(b'=');
                out.push(enc.wrapping_add(64));
            }
            _ => out.push(enc),
        }
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(format!("=yend size={}\r\n", data.len()).as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_simple() {
        // "Test": each byte encoded as (b + 42) mod 256
        let mut input = Vec::new();
        input.extend_from_slice(b"=ybegin line=128 size=4 name=test.txt\r\n");
        input.extend_from_slice(&[126, 143, 157, 158]);
        input.extend_from_slice(b"\r\n=yend size=4\r\n");

        let decoded = decode_prefix(&input, 1024).unwrap();
        assert_eq!(decoded, b"Test");
    }

    #[test]
    fn test_decode_with_escape() {
        // 0x00 encodes to 42, a critical byte, escaped as "=j"
        let input = b"=ybegin line=128 size=1 name=t.bin\r\n=j\r\n=yend size=1\r\n";
        let decoded = decode_prefix(input, 1024).unwrap();
        assert_eq!(decoded, b"\x00");
    }

    #[test]
    fn test_decode_respects_cap() {
        let data: Vec<u8> = (0u8..=255).collect();
        let block = encode_block("cap.bin", &data);
        let decoded = decode_prefix(&block, 16).unwrap();
        assert_eq!(decoded, &data[..16]);
    }

    #[test]
    fn test_decode_skips_ypart() {
        let mut input = Vec::new();
        input.extend_from_slice(b"=ybegin part=1 total=2 line=128 size=4 name=f.rar\r\n");
        input.extend_from_slice(b"=ypart begin=1 end=4\r\n");
        input.extend_from_slice(&[126, 143, 157, 158]);
        input.extend_from_slice(b"\r\n=yend size=4\r\n");

        let decoded = decode_prefix(&input, 1024).unwrap();
        assert_eq!(decoded, b"Test");
    }

    #[test]
    fn test_decode_skips_preamble_lines() {
        let mut input = Vec::new();
        input.extend_from_slice(b"some header noise\r\nmore noise\r\n");
        input.extend_from_slice(b"=ybegin line=128 size=4 name=t.txt\r\n");
        input.extend_from_slice(&[126, 143, 157, 158]);
        input.extend_from_slice(b"\r\n=yend size=4\r\n");

        let decoded = decode_prefix(&input, 1024).unwrap();
        assert_eq!(decoded, b"Test");
    }

    #[test]
    fn test_no_ybegin_is_decode_error() {
        let err = decode_prefix(b"plain text body\r\nno markers here\r\n", 1024).unwrap_err();
        assert!(matches!(err, TriageError::DecodeError));
    }

    #[test]
    fn test_empty_payload_is_decode_error() {
        let input = b"=ybegin line=128 size=0 name=empty\r\n=yend size=0\r\n";
        let err = decode_prefix(input, 1024).unwrap_err();
        assert!(matches!(err, TriageError::DecodeError));
    }

    #[test]
    fn test_round_trip_recovers_bytes() {
        let data: Vec<u8> = (0u8..=255).cycle().take(600).collect();
        let block = encode_block("rt.bin", &data);
        let decoded = decode_prefix(&block, data.len()).unwrap();
        assert_eq!(decoded, data);
    }
}
