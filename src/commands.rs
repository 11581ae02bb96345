//! NNTP command builders and response parsers

use crate::error::{Result, TriageError};
use crate::response::NntpResponse;

/// Parse NNTP response line into code and message
pub fn parse_response_line(line: &str) -> Result<(u16, String)> {
    let bytes = line.as_bytes();
    if bytes.len() < 3
        || !bytes[0].is_ascii_digit()
        || !bytes[1].is_ascii_digit()
        || !bytes[2].is_ascii_digit()
    {
        return Err(TriageError::InvalidResponse(
            line.chars().take(100).collect(),
        ));
    }

    let code = line[0..3]
        .parse::<u16>()
        .map_err(|_| TriageError::InvalidResponse(line.chars().take(100).collect()))?;

    let message = if line.len() > 4 {
        line[4..].to_string()
    } else {
        String::new()
    };

    Ok((code, message))
}

/// Parse single-line NNTP response
pub fn parse_single_response(line: &str) -> Result<NntpResponse> {
    let (code, message) = parse_response_line(line)?;
    Ok(NntpResponse { code, message })
}

/// Build AUTHINFO USER command
pub fn authinfo_user(username: &str) -> String {
    format!("AUTHINFO USER {}\r\n", username)
}

/// Build AUTHINFO PASS command
pub fn authinfo_pass(password: &str) -> String {
    format!("AUTHINFO PASS {}\r\n", password)
}

/// Build STAT command (RFC 3977 §6.2.4)
pub fn stat(message_id: &str) -> String {
    format!("STAT {}\r\n", message_id)
}

/// Build BODY command (RFC 3977 §6.2.3)
pub fn body(message_id: &str) -> String {
    format!("BODY {}\r\n", message_id)
}

/// Build QUIT command
pub fn quit() -> &'static str {
    "QUIT\r\n"
}

/// Wrap a stored message-id in angle brackets for the wire.
///
/// Ids stored in NZB documents come without brackets; ids that already
/// carry them pass through unchanged.
pub fn wire_message_id(id: &str) -> String {
    if id.starts_with('<') && id.ends_with('>') {
        id.to_string()
    } else {
        format!("<{}>", id)
    }
}
