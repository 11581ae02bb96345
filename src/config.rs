//! Engine configuration

use std::path::PathBuf;

/// NNTP server configuration
///
/// Contains all the information needed to connect to an NNTP provider.
///
/// # Example
///
/// ```
/// use nzb_triage::NntpConfig;
///
/// let config = NntpConfig::new("news.example.com", 563, true)
///     .with_credentials("user", "pass");
/// assert!(config.use_tls);
/// ```
#[must_use]
#[derive(Debug, Clone)]
pub struct NntpConfig {
    /// Server hostname (e.g., "news.example.com")
    pub host: String,

    /// Server port (typically 119 for plain, 563 for TLS)
    pub port: u16,

    /// Use TLS encryption
    pub use_tls: bool,

    /// Allow insecure TLS connections (self-signed or expired certificates)
    ///
    /// **Security Warning:** Setting this to `true` disables certificate
    /// validation. Only use it for testing or with servers you trust on a
    /// secure network.
    pub allow_insecure_tls: bool,

    /// Username for authentication; no AUTHINFO is sent when absent
    pub user: Option<String>,

    /// Password for authentication
    pub pass: Option<String>,

    /// TCP connect timeout in milliseconds
    pub conn_timeout_ms: u64,
}

impl NntpConfig {
    /// Default TCP connect timeout (30 seconds)
    pub const DEFAULT_CONN_TIMEOUT_MS: u64 = 30_000;

    /// Create a new server configuration
    pub fn new(host: impl Into<String>, port: u16, use_tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            use_tls,
            allow_insecure_tls: false,
            user: None,
            pass: None,
            conn_timeout_ms: Self::DEFAULT_CONN_TIMEOUT_MS,
        }
    }

    /// Create a configuration for a plain connection on the standard port (119)
    pub fn plain(host: impl Into<String>) -> Self {
        Self::new(host, 119, false)
    }

    /// Create a configuration for a TLS connection on the standard secure port (563)
    pub fn tls(host: impl Into<String>) -> Self {
        Self::new(host, 563, true)
    }

    /// Attach AUTHINFO credentials
    pub fn with_credentials(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.pass = Some(pass.into());
        self
    }
}

/// Options for the per-NZB analyzer and the NNTP pool it drives
#[derive(Debug, Clone)]
pub struct TriageOptions {
    /// Local archive cache directories, consulted before any remote probe
    pub archive_dirs: Vec<PathBuf>,

    /// NNTP provider; remote checks are skipped when absent
    pub nntp: Option<NntpConfig>,

    /// Deadline for a whole analyzer batch in milliseconds
    pub health_check_timeout_ms: u64,

    /// Cap on yEnc-decoded bytes handed to the archive inspector
    pub max_decoded_bytes: usize,

    /// NNTP pool size
    pub nntp_max_connections: usize,

    /// Reuse the shared pool across batches when the configuration matches
    pub reuse_nntp_pool: bool,

    /// Pool-level keep-alive inspection interval in milliseconds
    pub nntp_keep_alive_ms: u64,

    /// Upper bound on concurrently analyzed NZBs within a batch
    pub max_parallel_nzbs: usize,

    /// Number of segment STAT probes per sampling pass
    pub stat_sample_count: usize,

    /// Number of additional archive candidates probed after a stored
    /// confirmation
    pub archive_sample_count: usize,
}

impl Default for TriageOptions {
    fn default() -> Self {
        Self {
            archive_dirs: Vec::new(),
            nntp: None,
            health_check_timeout_ms: 35_000,
            max_decoded_bytes: 16_384,
            nntp_max_connections: 60,
            reuse_nntp_pool: true,
            nntp_keep_alive_ms: 120_000,
            max_parallel_nzbs: usize::MAX,
            stat_sample_count: 1,
            archive_sample_count: 1,
        }
    }
}

/// Options for the triage-and-rank runner
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Total wall-clock budget across ranking, fetching and analysis
    pub time_budget_ms: u64,

    /// Maximum number of candidates kept after ranking and deduplication
    pub max_candidates: usize,

    /// Number of parallel NZB payload downloads
    pub download_concurrency: usize,

    /// Per-request download timeout in milliseconds
    pub download_timeout_ms: u64,

    /// Rank candidates by proximity to this size instead of by size alone
    pub preferred_size_bytes: Option<u64>,

    /// Indexer ids/names ranked ahead of everything else (case-insensitive)
    pub preferred_indexer_ids: Vec<String>,

    /// Analyzer and pool options
    pub triage: TriageOptions,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            time_budget_ms: 12_000,
            max_candidates: 25,
            download_concurrency: 8,
            download_timeout_ms: 10_000,
            preferred_size_bytes: None,
            preferred_indexer_ids: Vec::new(),
            triage: TriageOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_helper() {
        let config = NntpConfig::plain("news.example.com");
        assert_eq!(config.port, 119);
        assert!(!config.use_tls);
        assert!(config.user.is_none());
    }

    #[test]
    fn test_tls_helper() {
        let config = NntpConfig::tls("news.example.com");
        assert_eq!(config.port, 563);
        assert!(config.use_tls);
        assert!(!config.allow_insecure_tls);
    }

    #[test]
    fn test_with_credentials() {
        let config = NntpConfig::plain("localhost").with_credentials("user", "pass");
        assert_eq!(config.user.as_deref(), Some("user"));
        assert_eq!(config.pass.as_deref(), Some("pass"));
    }

    #[test]
    fn test_triage_defaults() {
        let opts = TriageOptions::default();
        assert_eq!(opts.health_check_timeout_ms, 35_000);
        assert_eq!(opts.max_decoded_bytes, 16_384);
        assert_eq!(opts.nntp_max_connections, 60);
        assert!(opts.reuse_nntp_pool);
        assert_eq!(opts.stat_sample_count, 1);
        assert_eq!(opts.archive_sample_count, 1);
    }

    #[test]
    fn test_runner_defaults() {
        let opts = RunnerOptions::default();
        assert_eq!(opts.time_budget_ms, 12_000);
        assert_eq!(opts.max_candidates, 25);
        assert_eq!(opts.download_concurrency, 8);
        assert_eq!(opts.download_timeout_ms, 10_000);
        assert!(opts.preferred_size_bytes.is_none());
    }
}
