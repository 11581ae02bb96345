//! AUTHINFO USER/PASS authentication (RFC 4643 §2.3)

use super::{NntpClient, SessionState};
use crate::commands;
use crate::error::{Result, TriageError};
use crate::response::codes;
use tracing::debug;

impl NntpClient {
    /// Authenticate with AUTHINFO USER/PASS
    ///
    /// # Errors
    ///
    /// - [`TriageError::AuthFailed`] - invalid credentials
    /// - [`TriageError::ConnectionClosed`] - server closed the connection
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        debug!("authenticating as {}", username);

        if self.state == SessionState::Authenticated {
            return Err(TriageError::Protocol {
                code: codes::ACCESS_DENIED,
                message: "already authenticated".to_string(),
            });
        }

        let cmd = commands::authinfo_user(username);
        self.send_command(&cmd).await?;
        let response = self.read_response().await?;

        if response.code == codes::AUTH_CONTINUE {
            let cmd = commands::authinfo_pass(password);
            self.send_command(&cmd).await?;
            let response = self.read_response().await?;

            if response.code != codes::AUTH_ACCEPTED {
                return Err(TriageError::AuthFailed(response.message));
            }
        } else if response.code != codes::AUTH_ACCEPTED {
            return Err(TriageError::AuthFailed(response.message));
        }

        self.state = SessionState::Authenticated;
        debug!("authentication successful");
        Ok(())
    }
}
