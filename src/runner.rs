//! Triage-and-rank runner
//!
//! Takes competing NZB candidates for one release, ranks and dedupes
//! them, downloads the payloads in parallel, analyzes them against the
//! NNTP store, and assembles one summary per candidate URL, all inside
//! a total wall-clock budget. The runner never fails its caller: every
//! degradation lands as a per-candidate status.

use crate::analyzer::{ArchiveFinding, Decision, NntpAccess, NzbDecision, TriageAnalyzer};
use crate::config::RunnerOptions;
use crate::error::TriageError;
use crate::fetch::NzbFetcher;
use crate::pool::PoolRegistry;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

/// One NZB download candidate
#[derive(Debug, Clone)]
pub struct NzbCandidate {
    /// Download URL; identity within a batch
    pub download_url: String,
    /// Release title as reported by the indexer
    pub title: Option<String>,
    /// Indexer id
    pub indexer_id: Option<String>,
    /// Indexer display name
    pub indexer_name: Option<String>,
    /// Reported size in bytes
    pub size: u64,
}

/// Terminal status of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateStatus {
    /// Accepted with positive liveness or streamability evidence
    Verified,
    /// Accepted without positive evidence
    Unverified,
    /// Rejected by at least one blocker
    Blocked,
    /// The NZB payload fetch itself failed
    FetchError,
    /// Never reached (budget exhausted before fetch, or no payload)
    Skipped,
    /// Triage timed out before this candidate was decided
    Pending,
    /// Analyzer finished without a decision (should not happen)
    Error,
}

impl CandidateStatus {
    /// Kebab-case wire form
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Verified => "verified",
            CandidateStatus::Unverified => "unverified",
            CandidateStatus::Blocked => "blocked",
            CandidateStatus::FetchError => "fetch-error",
            CandidateStatus::Skipped => "skipped",
            CandidateStatus::Pending => "pending",
            CandidateStatus::Error => "error",
        }
    }
}

/// Per-candidate triage summary
#[derive(Debug, Clone)]
pub struct CandidateSummary {
    /// Terminal status
    pub status: CandidateStatus,
    /// Hard disqualifiers
    pub blockers: BTreeSet<String>,
    /// Soft signals
    pub warnings: BTreeSet<String>,
    /// Index of the NZB in the analyzed batch, when analyzed
    pub nzb_index: Option<usize>,
    /// File count of the parsed NZB, when analyzed
    pub file_count: Option<usize>,
    /// Probe outcomes, when analyzed
    pub archive_findings: Vec<ArchiveFinding>,
    /// Candidate title
    pub title: Option<String>,
    /// Lowercased, trimmed title used for deduplication
    pub normalized_title: String,
    /// Indexer id of the candidate
    pub indexer_id: Option<String>,
    /// Indexer name of the candidate
    pub indexer_name: Option<String>,
}

/// Result of one runner invocation
#[derive(Debug)]
pub struct TriageReport {
    /// Summary per candidate URL; every ranked candidate appears once
    pub decisions: HashMap<String, CandidateSummary>,
    /// Total wall-clock spent
    pub elapsed_ms: u64,
    /// Whether any deadline expired
    pub timed_out: bool,
    /// Candidates surviving ranking and deduplication
    pub candidates_considered: usize,
    /// Candidates that received an analyzer decision
    pub evaluated_count: usize,
    /// Candidates whose payload fetch failed
    pub fetch_failures: usize,
    /// One-line human aggregate
    pub summary: Option<String>,
}

/// Ranks, fetches and triages NZB candidates
pub struct TriageRunner {
    fetcher: Arc<dyn NzbFetcher>,
    registry: Arc<PoolRegistry>,
    options: RunnerOptions,
}

impl TriageRunner {
    /// Create a runner over the injected fetcher and pool registry
    pub fn new(
        fetcher: Arc<dyn NzbFetcher>,
        registry: Arc<PoolRegistry>,
        options: RunnerOptions,
    ) -> Self {
        Self {
            fetcher,
            registry,
            options,
        }
    }

    /// Triage a batch of candidates. Never fails; every candidate URL in
    /// the ranked set appears exactly once in the report.
    pub async fn run(&self, candidates: Vec<NzbCandidate>) -> TriageReport {
        let start = Instant::now();
        let budget = Duration::from_millis(self.options.time_budget_ms);
        let timed_out = Arc::new(AtomicBool::new(false));

        self.registry.touch_activity();

        let ranked = rank_candidates(candidates, &self.options);
        let candidates_considered = ranked.len();
        debug!("triaging {} ranked candidates", candidates_considered);

        // Fetch stage: bounded parallel downloads off a shared cursor,
        // with a budget gate before each dispatch
        let fetch_results = self.fetch_stage(&ranked, start, budget, &timed_out).await;

        let fetch_failures = fetch_results
            .iter()
            .filter(|r| matches!(r, Some(Err(_))))
            .count();

        // Analyze stage: fetched payloads in ranked order, raced against
        // the remaining budget
        let mut payload_owner: Vec<usize> = Vec::new();
        let mut payloads: Vec<String> = Vec::new();
        for (i, result) in fetch_results.iter().enumerate() {
            if let Some(Ok(body)) = result {
                payload_owner.push(i);
                payloads.push(body.clone());
            }
        }

        let mut analyzer_timed_out = false;
        let mut batch_decisions: Vec<Option<NzbDecision>> = vec![None; payloads.len()];

        if !payloads.is_empty() {
            let remaining = budget
                .checked_sub(start.elapsed())
                .filter(|r| !r.is_zero());
            match remaining {
                None => {
                    timed_out.store(true, Ordering::Relaxed);
                }
                Some(remaining) => {
                    let analyzer = TriageAnalyzer::new(self.options.triage.clone());
                    let batch = Arc::new(payloads);
                    let analysis = async {
                        let access = self.pool_access().await;
                        analyzer.analyze_batch(batch, access).await
                    };

                    match timeout(remaining, analysis).await {
                        Ok(outcome) => {
                            analyzer_timed_out = outcome.timed_out;
                            batch_decisions = outcome.decisions;
                        }
                        Err(_) => {
                            let e = TriageError::TriageTimeout;
                            warn!("analysis raced out: {} ({})", e, e.code());
                            timed_out.store(true, Ordering::Relaxed);
                        }
                    }
                }
            }
        }

        let timed_out = timed_out.load(Ordering::Relaxed) || analyzer_timed_out;

        // Assembly: one summary per ranked candidate
        let mut decisions = HashMap::with_capacity(ranked.len());
        let mut evaluated_count = 0;

        let mut decided: HashMap<usize, NzbDecision> = HashMap::new();
        for (payload_index, decision) in batch_decisions.into_iter().enumerate() {
            if let Some(decision) = decision {
                decided.insert(payload_owner[payload_index], decision);
            }
        }

        for (i, candidate) in ranked.iter().enumerate() {
            let summary = match (&fetch_results[i], decided.remove(&i)) {
                (Some(Err(e)), _) => fetch_error_summary(candidate, e),
                (Some(Ok(_)), Some(decision)) => {
                    evaluated_count += 1;
                    decision_summary(candidate, decision)
                }
                (Some(Ok(_)), None) => {
                    // Analyzer never settled this payload
                    let status = if timed_out {
                        CandidateStatus::Pending
                    } else {
                        CandidateStatus::Error
                    };
                    bare_summary(candidate, status)
                }
                (None, _) => {
                    let status = if timed_out {
                        CandidateStatus::Pending
                    } else {
                        CandidateStatus::Skipped
                    };
                    bare_summary(candidate, status)
                }
            };
            decisions.insert(candidate.download_url.clone(), summary);
        }

        let summary_line = summarize(&decisions);

        TriageReport {
            decisions,
            elapsed_ms: start.elapsed().as_millis() as u64,
            timed_out,
            candidates_considered,
            evaluated_count,
            fetch_failures,
            summary: Some(summary_line),
        }
    }

    async fn fetch_stage(
        &self,
        ranked: &[NzbCandidate],
        start: Instant,
        budget: Duration,
        timed_out: &Arc<AtomicBool>,
    ) -> Vec<Option<Result<String, TriageError>>> {
        let total = ranked.len();
        let results: Arc<Mutex<Vec<Option<Result<String, TriageError>>>>> =
            Arc::new(Mutex::new((0..total).map(|_| None).collect()));
        if total == 0 {
            return Vec::new();
        }

        let urls: Arc<Vec<String>> =
            Arc::new(ranked.iter().map(|c| c.download_url.clone()).collect());
        let cursor = Arc::new(AtomicUsize::new(0));
        let workers = self.options.download_concurrency.max(1).min(total);
        let per_request = Duration::from_millis(self.options.download_timeout_ms);

        let mut tasks = JoinSet::new();
        for _ in 0..workers {
            let fetcher = self.fetcher.clone();
            let urls = urls.clone();
            let cursor = cursor.clone();
            let results = results.clone();
            let timed_out = timed_out.clone();

            tasks.spawn(async move {
                loop {
                    // Budget gate before each dispatch; in-flight requests
                    // in other workers drain on their own
                    if start.elapsed() >= budget {
                        timed_out.store(true, Ordering::Relaxed);
                        break;
                    }
                    let index = cursor.fetch_add(1, Ordering::Relaxed);
                    if index >= urls.len() {
                        break;
                    }

                    let result = match timeout(per_request, fetcher.fetch(&urls[index])).await {
                        Ok(r) => r,
                        Err(_) => Err(TriageError::Fetch(format!(
                            "download timed out for {}",
                            urls[index]
                        ))),
                    };

                    if let Err(e) = &result {
                        warn!("NZB fetch failed for {}: {}", urls[index], e);
                    }
                    results.lock().unwrap()[index] = Some(result);
                }
            });
        }

        while tasks.join_next().await.is_some() {}

        let taken = std::mem::take(&mut *results.lock().unwrap());
        taken
    }

    async fn pool_access(&self) -> NntpAccess {
        let Some(config) = &self.options.triage.nntp else {
            return NntpAccess::Disabled;
        };

        match self.registry.obtain(config, &self.options.triage).await {
            Ok(pool) => NntpAccess::Pool(pool),
            Err(e) => {
                warn!("NNTP pool unavailable: {}", e);
                NntpAccess::Error(e.code().to_string())
            }
        }
    }
}

/// Lowercased, trimmed title for deduplication
pub(crate) fn normalize_title(title: Option<&str>) -> String {
    title.unwrap_or("").trim().to_lowercase()
}

/// Rank candidates: dedupe by URL, preferred indexers first, size order
/// within each partition, dedupe by normalized title, truncate.
pub(crate) fn rank_candidates(
    candidates: Vec<NzbCandidate>,
    options: &RunnerOptions,
) -> Vec<NzbCandidate> {
    let mut seen_urls = HashSet::new();
    let unique: Vec<NzbCandidate> = candidates
        .into_iter()
        .filter(|c| !c.download_url.is_empty())
        .filter(|c| seen_urls.insert(c.download_url.clone()))
        .collect();

    let preferred_ids: Vec<String> = options
        .preferred_indexer_ids
        .iter()
        .map(|s| s.to_lowercase())
        .collect();

    let is_preferred = |candidate: &NzbCandidate| -> bool {
        if preferred_ids.is_empty() {
            return false;
        }
        let id_match = candidate
            .indexer_id
            .as_deref()
            .is_some_and(|id| preferred_ids.contains(&id.to_lowercase()));
        let name_match = candidate
            .indexer_name
            .as_deref()
            .is_some_and(|name| preferred_ids.contains(&name.to_lowercase()));
        id_match || name_match
    };

    let (mut preferred, mut fallback): (Vec<_>, Vec<_>) =
        unique.into_iter().partition(|c| is_preferred(c));

    // Stable sorts keep input order for equal keys
    let sort = |list: &mut Vec<NzbCandidate>| match options.preferred_size_bytes {
        Some(target) => list.sort_by_key(|c| {
            (
                c.size.abs_diff(target),
                std::cmp::Reverse(c.size),
            )
        }),
        None => list.sort_by_key(|c| std::cmp::Reverse(c.size)),
    };
    sort(&mut preferred);
    sort(&mut fallback);

    preferred.append(&mut fallback);

    let mut seen_titles = HashSet::new();
    let mut ranked: Vec<NzbCandidate> = preferred
        .into_iter()
        .filter(|c| {
            let normalized = normalize_title(c.title.as_deref());
            // Titles that normalize to empty never collide
            normalized.is_empty() || seen_titles.insert(normalized)
        })
        .collect();

    ranked.truncate(options.max_candidates);
    ranked
}

fn bare_summary(candidate: &NzbCandidate, status: CandidateStatus) -> CandidateSummary {
    CandidateSummary {
        status,
        blockers: BTreeSet::new(),
        warnings: BTreeSet::new(),
        nzb_index: None,
        file_count: None,
        archive_findings: Vec::new(),
        title: candidate.title.clone(),
        normalized_title: normalize_title(candidate.title.as_deref()),
        indexer_id: candidate.indexer_id.clone(),
        indexer_name: candidate.indexer_name.clone(),
    }
}

fn fetch_error_summary(candidate: &NzbCandidate, error: &TriageError) -> CandidateSummary {
    let mut summary = bare_summary(candidate, CandidateStatus::FetchError);
    summary.blockers.insert("fetch-error".to_string());
    summary.warnings.insert(error.to_string());
    summary
}

fn decision_summary(candidate: &NzbCandidate, decision: NzbDecision) -> CandidateSummary {
    let status = match decision.decision {
        Decision::Reject => CandidateStatus::Blocked,
        Decision::Accept => {
            if decision.has_positive_finding() {
                CandidateStatus::Verified
            } else {
                CandidateStatus::Unverified
            }
        }
    };

    CandidateSummary {
        status,
        blockers: decision.blockers,
        warnings: decision.warnings,
        nzb_index: Some(decision.nzb_index),
        file_count: Some(decision.file_count),
        archive_findings: decision.archive_findings,
        title: candidate.title.clone().or(decision.nzb_title),
        normalized_title: normalize_title(candidate.title.as_deref()),
        indexer_id: candidate.indexer_id.clone(),
        indexer_name: candidate.indexer_name.clone(),
    }
}

fn summarize(decisions: &HashMap<String, CandidateSummary>) -> String {
    let count = |status: CandidateStatus| {
        decisions
            .values()
            .filter(|s| s.status == status)
            .count()
    };
    format!(
        "{} verified, {} unverified, {} blocked, {} fetch errors, {} skipped, {} pending",
        count(CandidateStatus::Verified),
        count(CandidateStatus::Unverified),
        count(CandidateStatus::Blocked),
        count(CandidateStatus::FetchError),
        count(CandidateStatus::Skipped),
        count(CandidateStatus::Pending),
    )
}
