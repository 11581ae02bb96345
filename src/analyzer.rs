//! Per-NZB triage analysis
//!
//! For each NZB in a batch: parse the manifest, pick a representative
//! archive volume, consult the local archive cache, probe the NNTP store
//! (STAT for liveness, BODY + yEnc + header inspection for
//! streamability), and fold every finding into an accept/reject decision.

use crate::archive::{self, ArchiveStatus};
use crate::commands::wire_message_id;
use crate::config::TriageOptions;
use crate::error::Result;
use crate::nzb::{self, canonical_archive_key, NzbFile};
use crate::pool::NntpPool;
use crate::yenc;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Read cap for local archive files
const LOCAL_READ_LIMIT: usize = 256 * 1024;

/// Where a finding came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingSource {
    /// Local archive cache
    Local,
    /// NNTP STAT + BODY inspection
    Nntp,
    /// NNTP STAT sampling
    NntpStat,
}

impl FindingSource {
    /// Kebab-case wire form
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingSource::Local => "local",
            FindingSource::Nntp => "nntp",
            FindingSource::NntpStat => "nntp-stat",
        }
    }
}

/// One probe outcome for one archive file
#[derive(Debug, Clone)]
pub struct ArchiveFinding {
    /// Probe that produced this finding
    pub source: FindingSource,
    /// Archive filename, when one was derived
    pub filename: Option<String>,
    /// Subject of the file the finding concerns
    pub subject: String,
    /// Terminal status
    pub status: ArchiveStatus,
    /// Extra context (inspector details, error text)
    pub details: Option<String>,
    /// Local path, for cache hits
    pub path: Option<PathBuf>,
}

/// Accept/reject verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nothing disqualifying was found
    Accept,
    /// At least one blocker was raised
    Reject,
}

/// Outcome of analyzing one NZB
#[derive(Debug, Clone)]
pub struct NzbDecision {
    /// Accept iff `blockers` is empty
    pub decision: Decision,
    /// Hard disqualifiers
    pub blockers: BTreeSet<String>,
    /// Soft signals
    pub warnings: BTreeSet<String>,
    /// Number of files in the NZB
    pub file_count: usize,
    /// Title from the NZB head, when present
    pub nzb_title: Option<String>,
    /// Position of this NZB in the batch input
    pub nzb_index: usize,
    /// Every probe outcome, in the order produced
    pub archive_findings: Vec<ArchiveFinding>,
}

impl NzbDecision {
    /// Whether any finding confirms a stored archive or live segment
    pub fn has_positive_finding(&self) -> bool {
        self.archive_findings.iter().any(|f| f.status.is_positive())
    }
}

/// NNTP availability for a batch
#[derive(Clone)]
pub enum NntpAccess {
    /// Warm pool ready for probes
    Pool(Arc<NntpPool>),
    /// No NNTP provider configured
    Disabled,
    /// Pool construction failed with this error code
    Error(String),
}

/// Result of a batch analysis
#[derive(Debug)]
pub struct BatchOutcome {
    /// Decision per input index; `None` where the deadline cut analysis off
    pub decisions: Vec<Option<NzbDecision>>,
    /// Whether the health-check deadline expired
    pub timed_out: bool,
}

/// Accumulates findings and classifies them into blockers and warnings
struct DecisionBuilder {
    blockers: BTreeSet<String>,
    warnings: BTreeSet<String>,
    findings: Vec<ArchiveFinding>,
}

impl DecisionBuilder {
    fn new() -> Self {
        Self {
            blockers: BTreeSet::new(),
            warnings: BTreeSet::new(),
            findings: Vec::new(),
        }
    }

    fn record(&mut self, finding: ArchiveFinding) {
        if let Some(blocker) = finding.status.blocker() {
            self.blockers.insert(blocker.to_string());
        } else if let Some(warning) = finding.status.warning() {
            self.warnings.insert(warning.to_string());
        }
        self.findings.push(finding);
    }

    fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.insert(warning.into());
    }

    fn has_stored(&self) -> bool {
        self.findings.iter().any(|f| f.status.is_stored())
    }

    fn finish(self, file_count: usize, nzb_title: Option<String>, nzb_index: usize) -> NzbDecision {
        let decision = if self.blockers.is_empty() {
            Decision::Accept
        } else {
            Decision::Reject
        };
        NzbDecision {
            decision,
            blockers: self.blockers,
            warnings: self.warnings,
            file_count,
            nzb_title,
            nzb_index,
            archive_findings: self.findings,
        }
    }
}

/// Analyzes batches of NZB payloads
#[derive(Clone)]
pub struct TriageAnalyzer {
    options: Arc<TriageOptions>,
}

impl TriageAnalyzer {
    /// Create an analyzer over the given options
    pub fn new(options: TriageOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    /// Analyze a batch of NZB payloads.
    ///
    /// Worker tasks pull indices off a shared cursor, so decisions land
    /// in input order regardless of completion order. The whole batch
    /// runs under `health_check_timeout_ms`; on expiry, finished
    /// decisions are kept and the rest stay `None`.
    pub async fn analyze_batch(&self, payloads: Arc<Vec<String>>, nntp: NntpAccess) -> BatchOutcome {
        let batch_size = payloads.len();
        if batch_size == 0 {
            return BatchOutcome {
                decisions: Vec::new(),
                timed_out: false,
            };
        }

        let workers = self.options.max_parallel_nzbs.max(1).min(batch_size);
        let cursor = Arc::new(AtomicUsize::new(0));
        let results: Arc<Mutex<Vec<Option<NzbDecision>>>> =
            Arc::new(Mutex::new(vec![None; batch_size]));

        let mut tasks = JoinSet::new();
        for _ in 0..workers {
            let analyzer = self.clone();
            let payloads = payloads.clone();
            let nntp = nntp.clone();
            let cursor = cursor.clone();
            let results = results.clone();

            tasks.spawn(async move {
                loop {
                    let index = cursor.fetch_add(1, Ordering::Relaxed);
                    if index >= payloads.len() {
                        break;
                    }
                    let decision = analyzer.analyze_one(index, &payloads[index], &nntp).await;
                    results.lock().unwrap()[index] = Some(decision);
                }
            });
        }

        let deadline = Duration::from_millis(self.options.health_check_timeout_ms);
        let timed_out = timeout(deadline, async {
            while tasks.join_next().await.is_some() {}
        })
        .await
        .is_err();

        if timed_out {
            let e = crate::TriageError::HealthCheckTimeout;
            warn!("analyzer batch cut off: {} ({})", e, e.code());
            tasks.abort_all();
        }

        let decisions = std::mem::take(&mut *results.lock().unwrap());
        BatchOutcome {
            decisions,
            timed_out,
        }
    }

    /// Analyze one NZB, converting any error into a reject decision so
    /// the batch always continues.
    pub async fn analyze_one(&self, index: usize, xml: &str, nntp: &NntpAccess) -> NzbDecision {
        match self.try_analyze(index, xml, nntp).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!("analysis of NZB #{} failed: {}", index, e);
                let mut blockers = BTreeSet::new();
                blockers.insert("analysis-error".to_string());
                let mut warnings = BTreeSet::new();
                warnings.insert(format!("code:{}", e.code()));
                warnings.insert(e.to_string());
                NzbDecision {
                    decision: Decision::Reject,
                    blockers,
                    warnings,
                    file_count: 0,
                    nzb_title: None,
                    nzb_index: index,
                    archive_findings: Vec::new(),
                }
            }
        }
    }

    async fn try_analyze(
        &self,
        index: usize,
        xml: &str,
        nntp: &NntpAccess,
    ) -> Result<NzbDecision> {
        let document = nzb::parse_nzb(xml)?;
        let mut builder = DecisionBuilder::new();

        let candidates: Vec<NzbFile> = document
            .archive_candidates()
            .into_iter()
            .cloned()
            .collect();

        if candidates.is_empty() {
            builder.warn("no-archive-candidates");
            match nntp {
                NntpAccess::Disabled => builder.warn("nntp-disabled"),
                NntpAccess::Error(code) => builder.warn(format!("nntp-error:{}", code)),
                NntpAccess::Pool(pool) => {
                    let probes = sample_across_files(&document.files, self.options.stat_sample_count);
                    self.stat_probes(pool, probes, &mut builder).await;
                }
            }
            return Ok(builder.finish(document.files.len(), document.title, index));
        }

        if !self.options.archive_dirs.is_empty() {
            self.local_check(&candidates, &mut builder).await;
        }

        if let NntpAccess::Pool(pool) = nntp {
            self.remote_check(pool, &candidates, &mut builder).await;
        } else if let NntpAccess::Error(code) = nntp {
            builder.warn(format!("nntp-error:{}", code));
        } else if let NntpAccess::Disabled = nntp {
            builder.warn("nntp-disabled");
        }

        if !builder.has_stored() && builder.blockers.is_empty() {
            builder.warn("rar-m0-unverified");
        }

        Ok(builder.finish(document.files.len(), document.title, index))
    }

    /// Try each archive candidate against the local cache directories.
    async fn local_check(&self, candidates: &[NzbFile], builder: &mut DecisionBuilder) {
        for file in candidates {
            let Some(name) = file.filename.clone() else {
                builder.record(ArchiveFinding {
                    source: FindingSource::Local,
                    filename: None,
                    subject: file.subject.clone(),
                    status: ArchiveStatus::MissingFilename,
                    details: None,
                    path: None,
                });
                continue;
            };

            let mut found = false;
            'dirs: for candidate_name in candidate_filenames(&name) {
                for dir in &self.options.archive_dirs {
                    let path = dir.join(&candidate_name);

                    let metadata = match tokio::fs::metadata(&path).await {
                        Ok(m) => m,
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                        Err(e) => {
                            warn!("archive dir lookup failed for {:?}: {}", path, e);
                            builder.record(ArchiveFinding {
                                source: FindingSource::Local,
                                filename: Some(name.clone()),
                                subject: file.subject.clone(),
                                status: ArchiveStatus::IoError,
                                details: Some(e.to_string()),
                                path: Some(path),
                            });
                            continue;
                        }
                    };
                    if !metadata.is_file() {
                        continue;
                    }

                    match read_prefix(&path, LOCAL_READ_LIMIT).await {
                        Ok(buf) => {
                            let inspection = archive::inspect(&buf);
                            debug!(
                                "local archive {:?} inspected: {}",
                                path, inspection.status
                            );
                            builder.record(ArchiveFinding {
                                source: FindingSource::Local,
                                filename: Some(name.clone()),
                                subject: file.subject.clone(),
                                status: inspection.status,
                                details: inspection.details,
                                path: Some(path),
                            });
                        }
                        Err(e) => {
                            builder.record(ArchiveFinding {
                                source: FindingSource::Local,
                                filename: Some(name.clone()),
                                subject: file.subject.clone(),
                                status: ArchiveStatus::IoError,
                                details: Some(e.to_string()),
                                path: Some(path),
                            });
                        }
                    }
                    found = true;
                    break 'dirs;
                }
            }

            if !found {
                builder.record(ArchiveFinding {
                    source: FindingSource::Local,
                    filename: Some(name),
                    subject: file.subject.clone(),
                    status: ArchiveStatus::ArchiveNotFound,
                    details: None,
                    path: None,
                });
            }
        }
    }

    /// Probe the primary archive candidate remotely: STAT its first
    /// segment, pull and decode the body, inspect the header. On a
    /// stored confirmation, widen the evidence with extra STAT samples.
    async fn remote_check(
        &self,
        pool: &Arc<NntpPool>,
        candidates: &[NzbFile],
        builder: &mut DecisionBuilder,
    ) {
        for file in candidates.iter().filter(|f| f.segments.is_empty()) {
            builder.record(ArchiveFinding {
                source: FindingSource::Nntp,
                filename: file.filename.clone(),
                subject: file.subject.clone(),
                status: ArchiveStatus::ArchiveNoSegments,
                details: None,
                path: None,
            });
        }

        let Some(primary) = candidates.iter().find(|f| !f.segments.is_empty()) else {
            return;
        };

        let mut client = match pool.acquire().await {
            Ok(client) => client,
            Err(e) => {
                builder.warn(format!("nntp-error:{}", e.code()));
                return;
            }
        };
        let mut drop_client = false;

        let first_id = wire_message_id(&primary.segments[0].message_id);
        let stat_result = pool.stat(&mut client, &first_id).await;

        match stat_result {
            Err(e) => {
                drop_client = e.drops_client();
                let status = if e.is_missing_article() {
                    ArchiveStatus::StatMissing
                } else {
                    ArchiveStatus::StatError
                };
                builder.record(ArchiveFinding {
                    source: FindingSource::Nntp,
                    filename: primary.filename.clone(),
                    subject: primary.subject.clone(),
                    status,
                    details: Some(e.to_string()),
                    path: None,
                });
            }
            Ok(()) => {
                // Raw cap: yEnc overhead is small, escapes at worst double
                let store_limit = self.options.max_decoded_bytes * 2 + 4096;
                match pool.fetch_body(&mut client, &first_id, store_limit).await {
                    Err(e) => {
                        drop_client = e.drops_client();
                        let status = if e.is_missing_article() {
                            ArchiveStatus::BodyMissing
                        } else {
                            ArchiveStatus::BodyError
                        };
                        builder.record(ArchiveFinding {
                            source: FindingSource::Nntp,
                            filename: primary.filename.clone(),
                            subject: primary.subject.clone(),
                            status,
                            details: Some(e.to_string()),
                            path: None,
                        });
                    }
                    Ok(body) => {
                        match yenc::decode_prefix(&body, self.options.max_decoded_bytes) {
                            Err(e) => {
                                builder.record(ArchiveFinding {
                                    source: FindingSource::Nntp,
                                    filename: primary.filename.clone(),
                                    subject: primary.subject.clone(),
                                    status: ArchiveStatus::DecodeError,
                                    details: Some(e.to_string()),
                                    path: None,
                                });
                            }
                            Ok(prefix) => {
                                let inspection = archive::inspect(&prefix);
                                debug!(
                                    "remote archive {:?} inspected: {}",
                                    primary.filename, inspection.status
                                );
                                builder.record(ArchiveFinding {
                                    source: FindingSource::Nntp,
                                    filename: primary.filename.clone(),
                                    subject: primary.subject.clone(),
                                    status: inspection.status,
                                    details: inspection.details,
                                    path: None,
                                });
                            }
                        }
                    }
                }
            }
        }

        pool.release(client, drop_client);

        // Widen liveness evidence only once a stored archive is confirmed
        // and nothing disqualifying has surfaced
        if builder.has_stored() && builder.blockers.is_empty() {
            let mut probes = Vec::new();

            let extra = self.options.stat_sample_count.saturating_sub(1);
            for segment in sample_segments(&primary.segments[1..], extra) {
                probes.push(ProbeTarget {
                    filename: primary.filename.clone(),
                    subject: primary.subject.clone(),
                    message_id: segment.message_id.clone(),
                });
            }

            let others = candidates
                .iter()
                .filter(|f| !std::ptr::eq(*f, primary))
                .filter(|f| !f.segments.is_empty())
                .take(self.options.archive_sample_count);
            for file in others {
                probes.push(ProbeTarget {
                    filename: file.filename.clone(),
                    subject: file.subject.clone(),
                    message_id: file.segments[0].message_id.clone(),
                });
            }

            self.stat_probes(pool, probes, builder).await;
        }
    }

    /// Run a list of STAT probes, reacquiring a client whenever one is
    /// dropped mid-pass. Each probe yields exactly one finding.
    async fn stat_probes(
        &self,
        pool: &Arc<NntpPool>,
        probes: Vec<ProbeTarget>,
        builder: &mut DecisionBuilder,
    ) {
        if probes.is_empty() {
            return;
        }

        let mut client = None;
        for probe in probes {
            if client.is_none() {
                match pool.acquire().await {
                    Ok(c) => client = Some(c),
                    Err(e) => {
                        builder.record(ArchiveFinding {
                            source: FindingSource::NntpStat,
                            filename: probe.filename,
                            subject: probe.subject,
                            status: ArchiveStatus::SegmentError,
                            details: Some(e.to_string()),
                            path: None,
                        });
                        continue;
                    }
                }
            }

            let wire_id = wire_message_id(&probe.message_id);
            let result = pool
                .stat(client.as_mut().expect("client acquired"), &wire_id)
                .await;

            let (status, details) = match &result {
                Ok(()) => (ArchiveStatus::SegmentOk, None),
                Err(e) if e.is_missing_article() => {
                    (ArchiveStatus::SegmentMissing, Some(e.to_string()))
                }
                Err(e) => (ArchiveStatus::SegmentError, Some(e.to_string())),
            };

            builder.record(ArchiveFinding {
                source: FindingSource::NntpStat,
                filename: probe.filename,
                subject: probe.subject,
                status,
                details,
                path: None,
            });

            if let Err(e) = result {
                if e.drops_client() {
                    pool.release(client.take().expect("client acquired"), true);
                }
            }
        }

        if let Some(c) = client {
            pool.release(c, false);
        }
    }
}

struct ProbeTarget {
    filename: Option<String>,
    subject: String,
    message_id: String,
}

/// Sample up to `count` segments uniformly without replacement
fn sample_segments(segments: &[nzb::NzbSegment], count: usize) -> Vec<&nzb::NzbSegment> {
    let count = count.min(segments.len());
    if count == 0 {
        return Vec::new();
    }
    let mut indices =
        rand::seq::index::sample(&mut rand::thread_rng(), segments.len(), count).into_vec();
    indices.sort_unstable();
    indices.into_iter().map(|i| &segments[i]).collect()
}

/// Sample `count` unique segments uniformly across all files
fn sample_across_files(files: &[NzbFile], count: usize) -> Vec<ProbeTarget> {
    let all: Vec<(&NzbFile, &nzb::NzbSegment)> = files
        .iter()
        .flat_map(|f| f.segments.iter().map(move |s| (f, s)))
        .collect();

    let count = count.min(all.len());
    if count == 0 {
        return Vec::new();
    }

    let mut indices =
        rand::seq::index::sample(&mut rand::thread_rng(), all.len(), count).into_vec();
    indices.sort_unstable();
    indices
        .into_iter()
        .map(|i| {
            let (file, segment) = all[i];
            ProbeTarget {
                filename: file.filename.clone(),
                subject: file.subject.clone(),
                message_id: segment.message_id.clone(),
            }
        })
        .collect()
}

/// Expand an archive filename to its lookup variants: the original plus
/// the canonical `.rar` substitution when it differs.
fn candidate_filenames(name: &str) -> Vec<String> {
    let mut variants = vec![name.to_string()];
    let canonical = canonical_archive_key(name);
    if canonical != name.to_ascii_lowercase() {
        variants.push(canonical);
    }
    variants
}

async fn read_prefix(path: &std::path::Path, limit: usize) -> std::io::Result<Vec<u8>> {
    let file = tokio::fs::File::open(path).await?;
    let mut buf = Vec::with_capacity(limit.min(64 * 1024));
    file.take(limit as u64).read_to_end(&mut buf).await?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn nzb_with_rar() -> &'static str {
        r#"<nzb>
  <file subject="[01/10] - &quot;release.part01.rar&quot; yEnc (1/3)">
    <segments>
      <segment bytes="768000" number="1">seg1@example.com</segment>
      <segment bytes="768000" number="2">seg2@example.com</segment>
    </segments>
  </file>
</nzb>"#
    }

    fn nzb_without_archives() -> &'static str {
        r#"<nzb>
  <file subject="&quot;sample.mkv&quot; yEnc (1/2)">
    <segments>
      <segment bytes="768000" number="1">m1@example.com</segment>
    </segments>
  </file>
</nzb>"#
    }

    #[tokio::test]
    async fn no_archive_candidates_without_pool() {
        let analyzer = TriageAnalyzer::new(TriageOptions::default());
        let decision = analyzer
            .analyze_one(0, nzb_without_archives(), &NntpAccess::Disabled)
            .await;

        assert_eq!(decision.decision, Decision::Accept);
        assert!(decision.warnings.contains("no-archive-candidates"));
        assert!(decision.warnings.contains("nntp-disabled"));
        assert_eq!(decision.file_count, 1);
    }

    #[tokio::test]
    async fn pool_error_code_is_surfaced() {
        let analyzer = TriageAnalyzer::new(TriageOptions::default());
        let decision = analyzer
            .analyze_one(
                0,
                nzb_without_archives(),
                &NntpAccess::Error("ETIMEDOUT".to_string()),
            )
            .await;
        assert!(decision.warnings.contains("nntp-error:ETIMEDOUT"));
    }

    #[tokio::test]
    async fn unparseable_nzb_rejects_with_analysis_error() {
        let analyzer = TriageAnalyzer::new(TriageOptions::default());
        let decision = analyzer
            .analyze_one(3, "<nzb><file</nzb>", &NntpAccess::Disabled)
            .await;

        assert_eq!(decision.decision, Decision::Reject);
        assert!(decision.blockers.contains("analysis-error"));
        assert!(decision.warnings.iter().any(|w| w.starts_with("code:")));
        assert_eq!(decision.nzb_index, 3);
    }

    #[tokio::test]
    async fn unverified_warning_without_nntp() {
        let analyzer = TriageAnalyzer::new(TriageOptions::default());
        let decision = analyzer
            .analyze_one(0, nzb_with_rar(), &NntpAccess::Disabled)
            .await;

        assert_eq!(decision.decision, Decision::Accept);
        assert!(decision.warnings.contains("rar-m0-unverified"));
        assert!(decision.warnings.contains("nntp-disabled"));
    }

    #[tokio::test]
    async fn local_stored_archive_confirms() {
        let dir = test_dir("local-stored");
        let stored = crate::archive::tests::rar4_with_file_header(0, 0x30, b"movie.mkv");
        std::fs::write(dir.join("release.rar"), &stored).unwrap();

        let mut options = TriageOptions::default();
        options.archive_dirs = vec![dir.clone()];
        let analyzer = TriageAnalyzer::new(options);

        // The NZB names release.part01.rar; the canonical .rar variant hits
        let decision = analyzer
            .analyze_one(0, nzb_with_rar(), &NntpAccess::Disabled)
            .await;

        assert_eq!(decision.decision, Decision::Accept);
        assert!(decision.has_positive_finding());
        assert!(!decision.warnings.contains("rar-m0-unverified"));
        let finding = &decision.archive_findings[0];
        assert_eq!(finding.source, FindingSource::Local);
        assert_eq!(finding.status, ArchiveStatus::RarStored);
        assert!(finding.path.is_some());

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn local_encrypted_archive_blocks() {
        let dir = test_dir("local-encrypted");
        let encrypted = crate::archive::tests::rar4_with_file_header(0x0004, 0x30, b"x");
        std::fs::write(dir.join("release.rar"), &encrypted).unwrap();

        let mut options = TriageOptions::default();
        options.archive_dirs = vec![dir.clone()];
        let analyzer = TriageAnalyzer::new(options);

        let decision = analyzer
            .analyze_one(0, nzb_with_rar(), &NntpAccess::Disabled)
            .await;

        assert_eq!(decision.decision, Decision::Reject);
        assert!(decision.blockers.contains("rar-encrypted"));

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn local_miss_records_archive_not_found() {
        let dir = test_dir("local-miss");

        let mut options = TriageOptions::default();
        options.archive_dirs = vec![dir.clone()];
        let analyzer = TriageAnalyzer::new(options);

        let decision = analyzer
            .analyze_one(0, nzb_with_rar(), &NntpAccess::Disabled)
            .await;

        assert!(decision
            .archive_findings
            .iter()
            .any(|f| f.status == ArchiveStatus::ArchiveNotFound));
        assert!(decision.warnings.contains("archive-not-found"));

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let analyzer = TriageAnalyzer::new(TriageOptions::default());
        let payloads = Arc::new(vec![
            nzb_with_rar().to_string(),
            nzb_without_archives().to_string(),
            "<nzb><file</nzb>".to_string(),
        ]);

        let outcome = analyzer
            .analyze_batch(payloads, NntpAccess::Disabled)
            .await;

        assert!(!outcome.timed_out);
        assert_eq!(outcome.decisions.len(), 3);
        assert_eq!(outcome.decisions[0].as_ref().unwrap().nzb_index, 0);
        assert_eq!(outcome.decisions[1].as_ref().unwrap().nzb_index, 1);
        assert_eq!(
            outcome.decisions[2].as_ref().unwrap().decision,
            Decision::Reject
        );
    }

    #[tokio::test]
    async fn empty_batch_is_empty_outcome() {
        let analyzer = TriageAnalyzer::new(TriageOptions::default());
        let outcome = analyzer
            .analyze_batch(Arc::new(Vec::new()), NntpAccess::Disabled)
            .await;
        assert!(!outcome.timed_out);
        assert!(outcome.decisions.is_empty());
    }

    #[test]
    fn candidate_filenames_add_canonical_variant() {
        assert_eq!(
            candidate_filenames("Release.part01.rar"),
            vec!["Release.part01.rar".to_string(), "release.rar".to_string()]
        );
        assert_eq!(
            candidate_filenames("archive.rar"),
            vec!["archive.rar".to_string()]
        );
    }

    #[test]
    fn sampling_is_bounded_and_unique() {
        let segments: Vec<nzb::NzbSegment> = (1..=10)
            .map(|n| nzb::NzbSegment {
                number: n,
                bytes: 1,
                message_id: format!("s{}@x", n),
            })
            .collect();

        let sampled = sample_segments(&segments, 4);
        assert_eq!(sampled.len(), 4);
        let ids: std::collections::HashSet<_> =
            sampled.iter().map(|s| s.message_id.as_str()).collect();
        assert_eq!(ids.len(), 4);

        assert_eq!(sample_segments(&segments, 50).len(), 10);
        assert!(sample_segments(&segments, 0).is_empty());
    }

    fn test_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "nzb-triage-test-{}-{}",
            tag,
            std::process::id()
        ));
        if Path::new(&dir).exists() {
            std::fs::remove_dir_all(&dir).ok();
        }
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
