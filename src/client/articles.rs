//! Article probes (RFC 3977 §6.2)
//!
//! The triage wire subset: STAT to test existence, BODY to pull a
//! segment payload, QUIT on close.

use crate::commands;
use crate::error::{Result, TriageError};
use crate::response::codes;
use tracing::trace;

use super::NntpClient;

impl NntpClient {
    /// Check article existence without retrieving content (STAT)
    ///
    /// # Errors
    ///
    /// - [`TriageError::StatMissing`] - article does not exist (430)
    /// - [`TriageError::Protocol`] - unexpected server response
    pub async fn stat(&mut self, message_id: &str) -> Result<()> {
        trace!("STAT {}", message_id);

        let cmd = commands::stat(message_id);
        self.send_command(&cmd).await?;
        let response = self.read_response().await?;

        if response.code == codes::NO_SUCH_ARTICLE_ID {
            return Err(TriageError::StatMissing(message_id.to_string()));
        }

        if !response.is_success() {
            return Err(TriageError::Protocol {
                code: response.code,
                message: response.message,
            });
        }

        Ok(())
    }

    /// Fetch an article body (BODY), retaining at most `store_limit` bytes.
    ///
    /// The full body is drained from the connection regardless of the cap.
    ///
    /// # Errors
    ///
    /// - [`TriageError::BodyMissing`] - article does not exist (430)
    /// - [`TriageError::BodyError`] - body was empty
    /// - [`TriageError::Protocol`] - unexpected server response
    pub async fn fetch_body(&mut self, message_id: &str, store_limit: usize) -> Result<Vec<u8>> {
        trace!("BODY {}", message_id);

        let cmd = commands::body(message_id);
        self.send_command(&cmd).await?;
        let response = self.read_response().await?;

        if response.code == codes::NO_SUCH_ARTICLE_ID {
            return Err(TriageError::BodyMissing(message_id.to_string()));
        }

        if !response.is_success() {
            return Err(TriageError::Protocol {
                code: response.code,
                message: response.message,
            });
        }

        let data = self.read_body_data(store_limit).await?;
        if data.is_empty() {
            return Err(TriageError::BodyError(message_id.to_string()));
        }

        Ok(data)
    }

    /// Gracefully close the session (QUIT)
    ///
    /// Best-effort: response and transport errors are ignored.
    pub async fn quit(&mut self) {
        if self.send_command(commands::quit()).await.is_ok() {
            let _ = self.read_response().await;
        }
    }
}
