//! End-to-end refresh: retries, deadline and baseline merge
//!
//! ```text
//! run(label, credential)
//!   └─ timeout(deadline)
//!        ├─ collect ── retry on Transport, backoff = attempt × step
//!        ├─ get_batch → create_missing → get_batch (read-back wins)
//!        └─ record_snapshot (best effort)
//! ```

use crate::aggregator::AccountAggregator;
use crate::config::RetryConfig;
use crate::error::{EngineError, Result};
use crate::storage::BaselineStore;
use crate::types::{AccountRequest, AccountSnapshot, AggregationReport, Credential, PortfolioSummary};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};


#[derive(Clone)]
pub struct RetryOrchestrator {
    aggregator: Arc<AccountAggregator>,
    store: BaselineStore,
    config: RetryConfig,
}

impl RetryOrchestrator {
    pub fn new(aggregator: Arc<AccountAggregator>, store: BaselineStore, config: RetryConfig) -> Self {
        Self {
            aggregator,
            store,
            config,
        }
    }

    pub fn store(&self) -> &BaselineStore {
        &self.store
    }

    /// Refresh one account. Always returns a report; failures and the
    /// deadline surface through `diagnosis = ERROR` and `error`.
    pub async fn run(&self, label: &str, credential: &Credential) -> AggregationReport {
        let span = tracing::info_span!("refresh", label, id = %uuid::Uuid::new_v4());
        let deadline = self.config.deadline();

        async move {
            match tokio::time::timeout(deadline, self.refresh(label, credential)).await {
                Ok(Ok(report)) => {
                    info!(
                        total = %report.total_balance,
                        bots = report.bots.len(),
                        diagnosis = ?report.diagnosis,
                        "Refresh complete"
                    );
                    report
                }
                Ok(Err(e)) => {
                    error!("Refresh failed: {}", e);
                    AggregationReport::failed(label, e.to_string())
                }
                Err(_) => {
                    let e = EngineError::Timeout(deadline);
                    error!("Refresh abandoned: {}", e);
                    AggregationReport::failed(label, e.to_string())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Refresh several accounts in parallel. Reports come back in request order.
    pub async fn run_many(&self, requests: &[AccountRequest]) -> PortfolioSummary {
        let reports = join_all(
            requests
                .iter()
                .map(|req| self.run(&req.label, &req.credential)),
        )
        .await;

        PortfolioSummary::from_reports(reports)
    }

    /// Explicit "start tracking profit from now"
    pub async fn reset_baseline(&self, label: &str, bot_name: &str) -> Result<bool> {
        self.store.reset(label, bot_name).await
    }

    async fn refresh(&self, label: &str, credential: &Credential) -> Result<AggregationReport> {
        let snapshot = self.collect_with_retry(credential).await?;
        let baselines = self.resolve_baselines(label, &snapshot).await;
        let report = AggregationReport::from_snapshot(label, &snapshot, &baselines);

        if let Err(e) = self.store.record_snapshot(label, report.total_balance).await {
            warn!("Failed to record balance history: {}", e);
        }

        Ok(report)
    }

    async fn collect_with_retry(&self, credential: &Credential) -> Result<AccountSnapshot> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.aggregator.collect(credential).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let backoff = self.config.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        "Transient failure, retrying in {:?}: {}",
                        backoff,
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Seed missing baselines and read them back. Store trouble degrades to
    /// "no baselines" (zero profit) instead of failing the refresh.
    async fn resolve_baselines(&self, label: &str, snapshot: &AccountSnapshot) -> HashMap<String, Decimal> {
        let names: Vec<String> = snapshot.bots.iter().map(|b| b.name.clone()).collect();
        if names.is_empty() {
            return HashMap::new();
        }

        let seeded = async {
            let inserted = self.store.create_missing(label, &snapshot.observations()).await?;
            if inserted > 0 {
                info!(inserted, "New baselines seeded");
            }
            // Whatever row won a concurrent insert is the baseline.
            self.store.get_batch(label, &names).await
        };

        match seeded.await {
            Ok(baselines) => baselines,
            Err(e) => {
                warn!("Baseline store unavailable, profit not tracked this refresh: {}", e);
                HashMap::new()
            }
        }
    }
}
