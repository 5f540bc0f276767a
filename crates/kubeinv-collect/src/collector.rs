//! Collection run orchestration
//!
//! A run moves through `Idle -> Fetching -> Normalizing -> Grouping -> Done`.
//! Retryable fetch errors detour through `Retrying`, which sleeps with
//! exponential backoff before fetching again. Both the fetch and the sleep
//! race against the caller's cancellation token and the optional deadline.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kubeinv_k8s::DataSource;
use kubeinv_types::{
    CollectionReport, CollectionStatus, FetchError, NamespaceGroup, RawRecord, ResourceRecord,
    SkippedRecord,
};

use crate::grouper::group;
use crate::normalizer::{Strictness, normalize_all};

/// Tuning for one collection run
#[derive(Clone, Debug)]
pub struct CollectorConfig {
    /// Retries after the first failed fetch
    pub max_retries: u32,

    /// Delay before the first retry; doubles for every further retry
    pub base_delay: Duration,

    /// Upper bound for a single backoff delay
    pub max_delay: Duration,

    /// Deadline for the whole run
    pub timeout: Option<Duration>,

    pub strictness: Strictness,

    /// Only report records from this namespace
    pub namespace_filter: Option<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            timeout: None,
            strictness: Strictness::Strict,
            namespace_filter: None,
        }
    }
}

impl CollectorConfig {
    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Why a wait ended early
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Interrupted {
    Cancelled,
    DeadlineExceeded,
}

enum State {
    Idle,
    Fetching,
    Retrying(FetchError),
    Normalizing(Vec<RawRecord>),
    Grouping {
        records: Vec<ResourceRecord>,
        skipped: Vec<SkippedRecord>,
        fetched: usize,
    },
    Done(CollectionReport),
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Retrying(_) => "retrying",
            Self::Normalizing(_) => "normalizing",
            Self::Grouping { .. } => "grouping",
            Self::Done(_) => "done",
        }
    }
}

/// Runs one point-in-time inventory against a data source
pub struct Collector<S> {
    source: S,
    config: CollectorConfig,
}

impl<S: DataSource> Collector<S> {
    pub fn new(source: S, config: CollectorConfig) -> Self {
        Self { source, config }
    }

    /// Fetch, normalize and group, honouring retries and cancellation.
    ///
    /// Never fails: every outcome, including an unreachable data source, is
    /// described by the returned report.
    pub async fn collect(&self, cancel: &CancellationToken) -> CollectionReport {
        let deadline = self.config.timeout.map(|timeout| Instant::now() + timeout);
        let mut attempts: u32 = 0;
        // Error from the attempt before the one in flight
        let mut last_error: Option<FetchError> = None;
        let mut state = State::Idle;

        loop {
            debug!(state = state.name(), attempts, "collector state");
            state = match state {
                State::Done(report) => return report,

                State::Idle => State::Fetching,

                State::Fetching => {
                    attempts += 1;
                    match interruptible(self.source.fetch(), cancel, deadline).await {
                        Err(reason) => {
                            State::Done(self.interrupted(reason, attempts, last_error.take()))
                        }
                        Ok(Ok(raw)) => {
                            debug!(count = raw.len(), attempts, "fetch succeeded");
                            State::Normalizing(raw)
                        }
                        Ok(Err(err))
                            if err.is_retryable() && attempts <= self.config.max_retries =>
                        {
                            State::Retrying(err)
                        }
                        Ok(Err(err)) => {
                            warn!(attempts, error = %err, "giving up on data source");
                            State::Done(self.report(
                                CollectionStatus::TotalFailure,
                                attempts,
                                Some(err),
                            ))
                        }
                    }
                }

                State::Retrying(err) => {
                    let delay = self.config.backoff(attempts - 1);
                    warn!(
                        attempt = attempts,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "fetch failed, retrying"
                    );
                    match interruptible(tokio::time::sleep(delay), cancel, deadline).await {
                        Ok(()) => {
                            last_error = Some(err);
                            State::Fetching
                        }
                        Err(reason) => State::Done(self.interrupted(reason, attempts, Some(err))),
                    }
                }

                State::Normalizing(raw) => {
                    let fetched = raw.len();
                    let (records, skipped) = normalize_all(raw, self.config.strictness);
                    if !skipped.is_empty() {
                        warn!(skipped = skipped.len(), fetched, "some records could not be read");
                    }
                    State::Grouping {
                        records,
                        skipped,
                        fetched,
                    }
                }

                State::Grouping {
                    records,
                    skipped,
                    fetched,
                } => State::Done(self.assemble(records, skipped, fetched, attempts)),
            };
        }
    }

    fn assemble(
        &self,
        records: Vec<ResourceRecord>,
        skipped: Vec<SkippedRecord>,
        fetched: usize,
        attempts: u32,
    ) -> CollectionReport {
        // Status reflects the whole fetch, before any namespace filter
        let status = if records.is_empty() {
            CollectionStatus::TotalFailure
        } else if skipped.is_empty() {
            CollectionStatus::Success
        } else {
            CollectionStatus::PartialFailure
        };

        let groups = match &self.config.namespace_filter {
            Some(namespace) => group(records.into_iter().filter(|r| r.namespace() == namespace)),
            None => group(records),
        };

        info!(
            status = %status,
            namespaces = groups.len(),
            records = groups.record_count(),
            skipped = skipped.len(),
            attempts,
            "collection finished"
        );

        CollectionReport {
            status,
            groups,
            skipped,
            fetched,
            attempts,
            failure: None,
            namespace_filter: self.config.namespace_filter.clone(),
            collected_at: Utc::now(),
        }
    }

    fn interrupted(
        &self,
        reason: Interrupted,
        attempts: u32,
        last_error: Option<FetchError>,
    ) -> CollectionReport {
        match reason {
            Interrupted::Cancelled => info!(attempts, "collection cancelled"),
            Interrupted::DeadlineExceeded => warn!(
                attempts,
                timeout = ?self.config.timeout,
                "collection deadline exceeded"
            ),
        }
        self.report(CollectionStatus::Cancelled, attempts, last_error)
    }

    /// Report for a run that never got past fetching
    fn report(
        &self,
        status: CollectionStatus,
        attempts: u32,
        failure: Option<FetchError>,
    ) -> CollectionReport {
        CollectionReport {
            status,
            groups: NamespaceGroup::new(),
            skipped: Vec::new(),
            fetched: 0,
            attempts,
            failure,
            namespace_filter: self.config.namespace_filter.clone(),
            collected_at: Utc::now(),
        }
    }
}

/// Drive `future` unless the token fires or the deadline passes first
async fn interruptible<F: Future>(
    future: F,
    cancel: &CancellationToken,
    deadline: Option<Instant>,
) -> Result<F::Output, Interrupted> {
    let expiry = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupted::Cancelled),
        _ = expiry => Err(Interrupted::DeadlineExceeded),
        output = future => Ok(output),
    }
}
