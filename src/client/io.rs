//! Low-level I/O for NNTP protocol communication
//!
//! Command transmission, single-line response parsing, and multi-line
//! body reads with dot-unstuffing. Body reads are 8-bit clean: yEnc
//! payloads must reach the decoder byte-for-byte.

use super::{NntpClient, NntpStream};
use crate::commands;
use crate::error::{Result, TriageError};
use crate::response::NntpResponse;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::trace;

const SINGLE_LINE_TIMEOUT: Duration = Duration::from_secs(60);
const BODY_TIMEOUT: Duration = Duration::from_secs(180);

impl NntpClient {
    /// Send a command to the server
    pub(super) async fn send_command(&mut self, command: &str) -> Result<()> {
        trace!("sending command: {}", command.trim());
        match &mut self.stream {
            NntpStream::Plain(s) => {
                s.get_mut().write_all(command.as_bytes()).await?;
                s.get_mut().flush().await?;
            }
            NntpStream::Tls(s) => {
                s.get_mut().write_all(command.as_bytes()).await?;
                s.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    async fn read_line_bytes(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        buf.clear();
        let n = match &mut self.stream {
            NntpStream::Plain(s) => s.read_until(b'\n', buf).await?,
            NntpStream::Tls(s) => s.read_until(b'\n', buf).await?,
        };
        Ok(n)
    }

    /// Read a single-line response
    pub(super) async fn read_response(&mut self) -> Result<NntpResponse> {
        self.read_response_with_timeout(SINGLE_LINE_TIMEOUT).await
    }

    /// Read a single-line response with custom timeout
    pub(super) async fn read_response_with_timeout(
        &mut self,
        timeout_duration: Duration,
    ) -> Result<NntpResponse> {
        let read_future = async {
            let mut line_bytes = Vec::with_capacity(512);
            self.read_line_bytes(&mut line_bytes).await?;

            if line_bytes.is_empty() {
                return Err(TriageError::ConnectionClosed);
            }

            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end();
            trace!("received: {}", line);

            commands::parse_single_response(line)
        };

        timeout(timeout_duration, read_future)
            .await
            .map_err(|_| TriageError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)))?
    }

    /// Read a multi-line body (terminated by ".\r\n") as raw bytes.
    ///
    /// Lines are dot-unstuffed and rejoined with CRLF. The connection is
    /// always drained to the terminator; only the first `store_limit`
    /// bytes are retained.
    pub(super) async fn read_body_data(&mut self, store_limit: usize) -> Result<Vec<u8>> {
        let read_future = async {
            let mut data: Vec<u8> = Vec::with_capacity(store_limit.min(64 * 1024));
            let mut line_bytes = Vec::with_capacity(4096);

            loop {
                let n = self.read_line_bytes(&mut line_bytes).await?;
                if n == 0 {
                    return Err(TriageError::ConnectionClosed);
                }

                let line = trim_crlf(&line_bytes);

                // Terminator
                if line == b"." {
                    break;
                }

                // Keep draining past the cap so the session stays usable
                if data.len() >= store_limit {
                    continue;
                }

                // Byte-stuffing: a leading ".." collapses to "."
                let line = if line.starts_with(b"..") {
                    &line[1..]
                } else {
                    line
                };

                data.extend_from_slice(line);
                data.extend_from_slice(b"\r\n");
            }

            data.truncate(store_limit);
            Ok(data)
        };

        timeout(BODY_TIMEOUT, read_future)
            .await
            .map_err(|_| TriageError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)))?
    }
}

fn trim_crlf(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}
