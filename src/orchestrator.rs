//! Sweep scheduler.
//!
//! Every poll interval each configured source runs one sweep as its own
//! task: read cursor, plan the next range, fetch it, reconcile it, advance
//! the cursor. Sweeps are joined settle-all, so a failing source only stalls
//! its own cursor. Cancellation stops new sweeps from starting; the sweep in
//! flight is allowed to finish.

use crate::adapters::{BlockRange, SourceAdapter};
use crate::config::IndexerConfig;
use crate::error::SweepError;
use crate::models::SourceKind;
use crate::reconcile::{IngestReport, Reconciler};
use crate::store::CursorStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceState {
    Idle,
    Planning,
    Fetching,
    Persisting,
}

/// Progress of one source as reported by `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub chain: String,
    pub kind: SourceKind,
    pub state: SourceState,
    pub head: Option<u64>,
    pub last_indexed: Option<u64>,
    pub last_sweep_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_report: IngestReport,
}

pub type StatusRegistry = Arc<RwLock<BTreeMap<String, SourceStatus>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    CaughtUp { last_indexed: u64, head: u64 },
    Advanced { range: BlockRange, report: IngestReport },
}

fn source_label(chain: &str, kind: SourceKind) -> String {
    format!("{}/{}", chain, kind)
}

#[derive(Clone)]
pub struct Orchestrator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    cursors: Arc<dyn CursorStore>,
    reconciler: Arc<Reconciler>,
    sync_days: u64,
    confirmations: u64,
    poll_interval: Duration,
    status: StatusRegistry,
}

impl Orchestrator {
    pub fn new(
        config: &IndexerConfig,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        cursors: Arc<dyn CursorStore>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        let registry = adapters
            .iter()
            .map(|adapter| {
                let status = SourceStatus {
                    chain: adapter.chain().to_string(),
                    kind: adapter.kind(),
                    state: SourceState::Idle,
                    head: None,
                    last_indexed: None,
                    last_sweep_at: None,
                    last_error: None,
                    last_report: IngestReport::default(),
                };
                (source_label(adapter.chain(), adapter.kind()), status)
            })
            .collect();

        Self {
            adapters,
            cursors,
            reconciler,
            sync_days: config.sync_days,
            confirmations: config.confirmations,
            poll_interval: config.poll_interval(),
            status: Arc::new(RwLock::new(registry)),
        }
    }

    pub fn status(&self) -> StatusRegistry {
        self.status.clone()
    }

    /// Poll until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "Starting indexer: {} sources, poll interval {:?}",
            self.adapters.len(),
            self.poll_interval
        );

        while !cancel.is_cancelled() {
            let results = self.run_sweep().await;
            let failed = results.iter().filter(|(_, r)| r.is_err()).count();
            debug!("Sweep finished: {} ok, {} failed", results.len() - failed, failed);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!("Indexer stopped");
    }

    /// One sweep of every source, concurrently. Returns each source's
    /// outcome; no failure cancels a sibling.
    pub async fn run_sweep(&self) -> Vec<(String, Result<SweepOutcome, SweepError>)> {
        let mut tasks = JoinSet::new();
        for adapter in &self.adapters {
            let this = self.clone();
            let adapter = adapter.clone();
            tasks.spawn(async move {
                let label = source_label(adapter.chain(), adapter.kind());
                let result = this.sweep_source(adapter.as_ref()).await;
                (label, result)
            });
        }

        let mut results = Vec::with_capacity(self.adapters.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((label, result)) => {
                    self.record(&label, &result).await;
                    results.push((label, result));
                }
                Err(e) => error!("Source task aborted: {}", e),
            }
        }

        // a task that panicked never reported back
        let reported: HashSet<String> = results.iter().map(|(l, _)| l.clone()).collect();
        for adapter in &self.adapters {
            let label = source_label(adapter.chain(), adapter.kind());
            if !reported.contains(&label) {
                let result = Err(SweepError::Aborted(label.clone()));
                self.record(&label, &result).await;
                results.push((label, result));
            }
        }

        results
    }

    /// Plan, fetch, persist and advance one source by at most one batch.
    pub async fn sweep_source(
        &self,
        adapter: &dyn SourceAdapter,
    ) -> Result<SweepOutcome, SweepError> {
        let chain = adapter.chain();
        let kind = adapter.kind();
        let label = source_label(chain, kind);

        self.set_state(&label, SourceState::Planning).await;
        let head = adapter.current_height().await?;
        let safe_head = head.saturating_sub(self.confirmations);
        self.update(&label, |s| s.head = Some(head)).await;

        let (last_indexed, planned) = match self.cursors.get_cursor(chain, kind).await? {
            Some(cursor) => (cursor, adapter.plan_range(cursor, safe_head)),
            None => {
                let start = adapter.estimate_start_height(safe_head, self.sync_days);
                info!(
                    "[{}] No cursor, starting {} days back at block {}",
                    label, self.sync_days, start
                );
                // the first range includes `start` itself, block 0 included
                (
                    start.saturating_sub(1),
                    adapter.plan_first_range(start, safe_head),
                )
            }
        };

        let Some(range) = planned else {
            self.set_state(&label, SourceState::Idle).await;
            return Ok(SweepOutcome::CaughtUp {
                last_indexed,
                head: safe_head,
            });
        };

        self.set_state(&label, SourceState::Fetching).await;
        let events = adapter.fetch_range(range.from, range.to).await?;

        self.set_state(&label, SourceState::Persisting).await;
        let report = self.reconciler.ingest(chain, &events).await;
        self.cursors.set_cursor(chain, kind, range.to).await?;

        info!(
            "[{}] Indexed blocks {}-{} ({} behind head): {} events, {} new rows",
            label,
            range.from,
            range.to,
            safe_head - range.to,
            events.len(),
            report.total()
        );
        self.update(&label, |s| {
            s.state = SourceState::Idle;
            s.last_indexed = Some(range.to);
            s.last_report = report;
        })
        .await;

        Ok(SweepOutcome::Advanced { range, report })
    }

    async fn record(&self, label: &str, result: &Result<SweepOutcome, SweepError>) {
        let now = Utc::now();
        match result {
            Ok(outcome) => {
                self.update(label, |s| {
                    s.state = SourceState::Idle;
                    s.last_sweep_at = Some(now);
                    s.last_error = None;
                    if let SweepOutcome::CaughtUp { last_indexed, .. } = outcome {
                        s.last_indexed = Some(*last_indexed);
                    }
                })
                .await;
            }
            Err(e) => {
                warn!("[{}] Sweep failed, will retry: {}", label, e);
                self.update(label, |s| {
                    s.state = SourceState::Idle;
                    s.last_sweep_at = Some(now);
                    s.last_error = Some(e.to_string());
                })
                .await;
            }
        }
    }

    async fn set_state(&self, label: &str, state: SourceState) {
        self.update(label, |s| s.state = state).await;
    }

    async fn update(&self, label: &str, f: impl FnOnce(&mut SourceStatus)) {
        if let Some(status) = self.status.write().await.get_mut(label) {
            f(status);
        }
    }
}
