#![doc = include_str!("../README.md")]

/// Per-NZB triage analysis and decision model
pub mod analyzer;
/// RAR/7z signature inspection
pub mod archive;
mod client;
/// NNTP command builders and response parsers
pub mod commands;
mod config;
mod error;
/// NZB payload fetching
pub mod fetch;
/// NZB document parser and archive candidate selection
pub mod nzb;
mod pool;
mod response;
/// Triage-and-rank runner
pub mod runner;
/// Bounded yEnc decoding
pub mod yenc;

pub use analyzer::{
    ArchiveFinding, BatchOutcome, Decision, FindingSource, NntpAccess, NzbDecision, TriageAnalyzer,
};
pub use archive::{inspect, ArchiveStatus, Inspection};
pub use client::{NntpClient, NntpIo};
pub use config::{NntpConfig, RunnerOptions, TriageOptions};
pub use error::{Result, TriageError};
pub use fetch::{HttpNzbFetcher, NzbFetcher};
pub use nzb::{canonical_archive_key, derive_filename, parse_nzb, NzbDocument, NzbFile, NzbSegment};
pub use pool::{
    ActivityTracker, ConnectionFactory, NntpConnectionFactory, NntpPool, PoolRegistry, PooledClient,
};
pub use response::{codes, NntpResponse};
pub use runner::{CandidateStatus, CandidateSummary, NzbCandidate, TriageReport, TriageRunner};
pub use yenc::decode_prefix;
