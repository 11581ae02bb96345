//! NNTP response types and status codes

/// NNTP single-line response with status code and message
#[derive(Debug, Clone)]
pub struct NntpResponse {
    /// 3-digit NNTP response code
    pub code: u16,
    /// Status message from server
    pub message: String,
}

impl NntpResponse {
    /// Check if response indicates success (2xx)
    pub fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Check if response indicates continuation (3xx)
    pub fn is_continuation(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// Check if response indicates error (4xx or 5xx)
    pub fn is_error(&self) -> bool {
        self.code >= 400
    }
}

/// NNTP response codes (RFC 3977 subset used by the triage wire protocol)
#[allow(dead_code)]
pub mod codes {
    /// Server ready, posting allowed
    pub const READY_POSTING_ALLOWED: u16 = 200;
    /// Server ready, no posting
    pub const READY_NO_POSTING: u16 = 201;
    /// Closing connection (QUIT acknowledged)
    pub const CLOSING_CONNECTION: u16 = 205;
    /// Group selected
    pub const GROUP_SELECTED: u16 = 211;
    /// Article follows
    pub const ARTICLE_FOLLOWS: u16 = 220;
    /// Head follows
    pub const HEAD_FOLLOWS: u16 = 221;
    /// Body follows
    pub const BODY_FOLLOWS: u16 = 222;
    /// Article exists (STAT)
    pub const ARTICLE_STAT: u16 = 223;
    /// Authentication accepted
    pub const AUTH_ACCEPTED: u16 = 281;
    /// Continue with authentication
    pub const AUTH_CONTINUE: u16 = 381;
    /// Service temporarily unavailable
    pub const SERVICE_UNAVAILABLE: u16 = 400;
    /// No article with that message-id
    pub const NO_SUCH_ARTICLE_ID: u16 = 430;
    /// Authentication required (RFC 4643)
    pub const AUTH_REQUIRED: u16 = 480;
    /// Authentication rejected
    pub const AUTH_REJECTED: u16 = 481;
    /// Access denied / command unavailable
    pub const ACCESS_DENIED: u16 = 502;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_success() {
        let response = NntpResponse {
            code: 223,
            message: "0 <a@b> article exists".to_string(),
        };
        assert!(response.is_success());
        assert!(!response.is_continuation());
        assert!(!response.is_error());
    }

    #[test]
    fn test_is_continuation() {
        let response = NntpResponse {
            code: 381,
            message: "password required".to_string(),
        };
        assert!(!response.is_success());
        assert!(response.is_continuation());
    }

    #[test]
    fn test_is_error() {
        let response = NntpResponse {
            code: 430,
            message: "no such article".to_string(),
        };
        assert!(response.is_error());
        assert!(!response.is_success());
    }

    #[test]
    fn test_boundary_codes() {
        let at = |code| NntpResponse {
            code,
            message: String::new(),
        };
        assert!(!at(199).is_success());
        assert!(at(200).is_success());
        assert!(at(299).is_success());
        assert!(!at(300).is_success());
        assert!(at(400).is_error());
    }
}
