//! Bounded-concurrency search dispatch
//!
//! Records are split into batches; at most `max_concurrent` batches are in
//! flight at once. Each batch is one remote request, retried with doubling
//! backoff on transient failures. Cancellation is checked before every
//! attempt and interrupts backoff sleeps; a call already in flight runs to
//! completion or its timeout.

use crate::batcher::make_batches;
use crate::error::SearchError;
use crate::job::{JobStatus, QueryParameters, SearchJob};
use crate::progress::ProgressTracker;
use crate::service::{QueryReport, RawHit, SearchRequest, SearchService};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use virseq_common::config::SearchConfig;
use virseq_common::{ConsensusRecord, SearchHit, SearchResult};

/// Hits kept per query
pub const MAX_HITS_PER_QUERY: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    pub batch_size: usize,
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
    pub attempt_timeout: Duration,
    pub max_hits: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default())
    }
}

impl DispatchSettings {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_concurrent: config.max_concurrent,
            max_retries: config.max_retries,
            initial_retry_delay: Duration::from_secs(config.initial_retry_delay_secs),
            attempt_timeout: Duration::from_secs(config.attempt_timeout_secs),
            max_hits: MAX_HITS_PER_QUERY,
        }
    }
}

/// How a batch's retry loop ended
enum BatchOutcome {
    Reports(Vec<QueryReport>),
    Cancelled,
    Failed(String),
}

pub struct SearchDispatcher {
    service: Arc<dyn SearchService>,
    progress: Arc<ProgressTracker>,
    params: QueryParameters,
    settings: DispatchSettings,
}

impl SearchDispatcher {
    pub fn new(
        service: Arc<dyn SearchService>,
        progress: Arc<ProgressTracker>,
        params: QueryParameters,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            service,
            progress,
            params,
            settings,
        }
    }

    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.progress)
    }

    /// Search every record; results come back in record order
    pub async fn dispatch(&self, records: &[ConsensusRecord]) -> Vec<SearchResult> {
        self.progress.begin(records.len());

        let jobs = make_batches(records, self.settings.batch_size, &self.params);
        info!(
            records = records.len(),
            batches = jobs.len(),
            max_concurrent = self.settings.max_concurrent,
            "Starting search run"
        );

        let mut batches: Vec<(usize, Vec<SearchResult>)> = stream::iter(jobs)
            .map(|job| self.run_job(job))
            .buffer_unordered(self.settings.max_concurrent.max(1))
            .collect()
            .await;

        batches.sort_by_key(|(offset, _)| *offset);
        let results: Vec<SearchResult> = batches
            .into_iter()
            .flat_map(|(_, results)| results)
            .collect();

        let state = self.progress.finish();
        info!(
            completed = state.completed,
            total = state.total,
            status = ?state.status,
            "Search run finished"
        );
        results
    }

    async fn run_job(&self, mut job: SearchJob) -> (usize, Vec<SearchResult>) {
        job.status = JobStatus::Running;
        debug!(batch_id = %job.batch_id, offset = job.offset, queries = job.len(), "Batch started");

        let mut slots: Vec<Option<SearchResult>> = vec![None; job.len()];
        let mut payload: Vec<usize> = Vec::with_capacity(job.len());
        let cancelled = self.progress.is_cancelled();
        for (i, query) in job.queries.iter().enumerate() {
            if cancelled {
                slots[i] = Some(SearchResult::cancelled(&query.name, query.query_length()));
            } else if query.sequence.is_empty() {
                slots[i] = Some(SearchResult::failed(&query.name, 0, "No sequence data"));
            } else {
                payload.push(i);
            }
        }

        if !payload.is_empty() {
            let request = SearchRequest::new(
                job.params.clone(),
                payload
                    .iter()
                    .map(|&i| (job.queries[i].name.as_str(), job.queries[i].sequence.as_str())),
            );

            let outcome = self.search_with_retry(&job, &request).await;
            job.status = match &outcome {
                BatchOutcome::Reports(_) => JobStatus::Completed,
                BatchOutcome::Cancelled => JobStatus::Cancelled,
                BatchOutcome::Failed(_) => JobStatus::Failed,
            };

            match outcome {
                BatchOutcome::Reports(reports) => {
                    let mut reports = reports.into_iter();
                    for &i in &payload {
                        let query = &job.queries[i];
                        let length = query.query_length();
                        slots[i] = Some(match reports.next() {
                            Some(report) => SearchResult::with_hits(
                                &query.name,
                                length,
                                convert_hits(&report.hits, length, self.settings.max_hits),
                            ),
                            None => SearchResult::failed(&query.name, length, "No report returned"),
                        });
                    }
                }
                BatchOutcome::Cancelled => {
                    for &i in &payload {
                        let query = &job.queries[i];
                        slots[i] = Some(SearchResult::cancelled(&query.name, query.query_length()));
                    }
                }
                BatchOutcome::Failed(message) => {
                    for &i in &payload {
                        let query = &job.queries[i];
                        slots[i] = Some(SearchResult::failed(
                            &query.name,
                            query.query_length(),
                            message.as_str(),
                        ));
                    }
                }
            }
        } else if cancelled {
            info!(batch_id = %job.batch_id, "Batch cancelled before attempt");
            job.status = JobStatus::Cancelled;
        } else {
            job.status = JobStatus::Completed;
        }

        let state = self.progress.record_completed(job.len());
        info!(
            batch_id = %job.batch_id,
            status = ?job.status,
            completed = state.completed,
            total = state.total,
            "Batch finished"
        );

        let results = slots.into_iter().flatten().collect();
        (job.offset, results)
    }

    async fn search_with_retry(&self, job: &SearchJob, request: &SearchRequest) -> BatchOutcome {
        let token = self.progress.cancellation_token();
        let mut delay = self.settings.initial_retry_delay;
        let mut attempt: u32 = 0;

        loop {
            if self.progress.is_cancelled() {
                info!(batch_id = %job.batch_id, "Batch cancelled before attempt");
                return BatchOutcome::Cancelled;
            }
            attempt += 1;
            debug!(batch_id = %job.batch_id, attempt, "Submitting batch");

            let result =
                match tokio::time::timeout(self.settings.attempt_timeout, self.service.search(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(SearchError::Timeout(self.settings.attempt_timeout)),
                };

            let err = match result {
                Ok(reports) => return BatchOutcome::Reports(reports),
                Err(err) => err,
            };

            if !err.is_transient() {
                error!(batch_id = %job.batch_id, attempt, error = %err, "Batch failed");
                return BatchOutcome::Failed(err.to_string());
            }
            if attempt > self.settings.max_retries {
                error!(
                    batch_id = %job.batch_id,
                    attempt,
                    error = %err,
                    "Batch failed: retries exhausted"
                );
                return BatchOutcome::Failed(err.to_string());
            }

            warn!(
                batch_id = %job.batch_id,
                attempt,
                backoff_secs = delay.as_secs(),
                error = %err,
                "Search attempt failed, retrying"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => {}
            }
            delay = delay.saturating_mul(2);
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Organism name: the service's scientific name, else the `[...]` part of the title
pub fn organism_name(hit: &RawHit) -> String {
    if let Some(name) = hit.organism.as_deref().filter(|s| !s.is_empty()) {
        return name.to_string();
    }
    match (hit.title.find('['), hit.title.find(']')) {
        (Some(open), Some(close)) if open < close => hit.title[open + 1..close].to_string(),
        _ => String::new(),
    }
}

/// Rank and score raw hits against a query of `query_length` bases
pub fn convert_hits(hits: &[RawHit], query_length: usize, max_hits: usize) -> Vec<SearchHit> {
    hits.iter()
        .take(max_hits)
        .enumerate()
        .map(|(i, hit)| {
            let align = f64::from(hit.align_length);
            let identity_pct = if hit.align_length == 0 {
                0.0
            } else {
                round2(f64::from(hit.identities) / align * 100.0)
            };
            let query_coverage_pct = if query_length == 0 {
                0.0
            } else {
                round2(align / query_length as f64 * 100.0)
            };

            SearchHit {
                rank: i + 1,
                accession: hit.accession.clone(),
                title: hit.title.clone(),
                organism: organism_name(hit),
                query_coverage_pct,
                identity_pct,
                evalue: hit.evalue,
                bit_score: hit.bit_score,
                identities: hit.identities,
                align_length: hit.align_length,
                query_from: hit.query_from,
                query_to: hit.query_to,
                hit_from: hit.hit_from,
                hit_to: hit.hit_to,
                gaps: hit.gaps,
            }
        })
        .collect()
}
