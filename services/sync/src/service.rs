//! Connector orchestration: one lifecycle pass per connector, run
//! concurrently, never overlapping for the same connector.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use strata_config::{ConnectorConfig, ProviderKind, SyncConfig};
use strata_db::graph::repositories::EntityGraphRepository;

use crate::connector::{Connector, SyncResult};
use crate::gitlab::sync::GitLabConnector;
use crate::metrics::SyncMetrics;
use crate::okta::sync::OktaConnector;
use crate::reconcile::reconcile_group;
use crate::schedule::{run_every, timer_period, Trigger};

pub const NO_CONNECTORS_WARNING: &str = "no connectors enabled";

/// One configured connector and its bookkeeping.
pub struct ConnectorSlot {
    name: String,
    settings: ConnectorConfig,
    trigger: Trigger,
    connector: Arc<Mutex<Box<dyn Connector>>>,
    last_completed: StdMutex<Option<DateTime<Utc>>>,
}

impl ConnectorSlot {
    fn new(connector: Box<dyn Connector>, settings: ConnectorConfig) -> Self {
        Self {
            name: connector.name().to_owned(),
            trigger: Trigger::from_interval_secs(settings.sync_interval_secs),
            settings,
            connector: Arc::new(Mutex::new(connector)),
            last_completed: StdMutex::new(None),
        }
    }

    fn last_completed(&self) -> Option<DateTime<Utc>> {
        self.last_completed.lock().map(|t| *t).unwrap_or(None)
    }

    fn mark_completed(&self, at: DateTime<Utc>) {
        if let Ok(mut last) = self.last_completed.lock() {
            *last = Some(at);
        }
    }
}

#[derive(Debug)]
pub enum PassOutcome {
    Completed(SyncResult),
    /// The connector was already running a pass.
    Skipped,
}

#[derive(Debug, Default)]
pub struct CycleReport {
    pub results: Vec<SyncResult>,
    pub skipped: Vec<String>,
}

impl CycleReport {
    pub fn total_operations(&self) -> u64 {
        self.results.iter().map(SyncResult::total_operations).sum()
    }

    pub fn total_errors(&self) -> usize {
        self.results.iter().map(|r| r.errors().len()).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectorHealth {
    pub name: String,
    pub enabled: bool,
    pub trigger: String,
    pub interval_secs: u64,
    pub write_back_enabled: bool,
    pub last_completed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub running: bool,
    pub connectors: Vec<ConnectorHealth>,
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct ConnectorService {
    slots: Arc<Vec<Arc<ConnectorSlot>>>,
    graph: Arc<dyn EntityGraphRepository>,
    metrics: Arc<SyncMetrics>,
    running: Arc<AtomicBool>,
    warnings: Arc<Vec<String>>,
}

impl ConnectorService {
    /// One connector per enabled provider.
    pub fn initialize(
        config: &SyncConfig,
        graph: Arc<dyn EntityGraphRepository>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        let connectors = config
            .enabled()
            .map(|(kind, settings)| {
                let connector: Box<dyn Connector> = match kind {
                    ProviderKind::Okta => {
                        Box::new(OktaConnector::new(settings.clone(), graph.clone()))
                    }
                    ProviderKind::GitLab => {
                        Box::new(GitLabConnector::new(settings.clone(), graph.clone()))
                    }
                };
                (connector, settings.clone())
            })
            .collect();

        Self::with_connectors(connectors, graph, metrics)
    }

    pub fn with_connectors(
        connectors: Vec<(Box<dyn Connector>, ConnectorConfig)>,
        graph: Arc<dyn EntityGraphRepository>,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        let slots: Vec<Arc<ConnectorSlot>> = connectors
            .into_iter()
            .map(|(connector, settings)| Arc::new(ConnectorSlot::new(connector, settings)))
            .collect();

        let mut warnings = Vec::new();
        if slots.is_empty() {
            tracing::warn!("{NO_CONNECTORS_WARNING}");
            warnings.push(NO_CONNECTORS_WARNING.to_owned());
        }
        for slot in &slots {
            tracing::info!(
                connector = %slot.name,
                trigger = %slot.trigger,
                write_back = slot.settings.write_back_enabled,
                "connector initialized"
            );
        }

        Self {
            slots: Arc::new(slots),
            graph,
            metrics,
            running: Arc::new(AtomicBool::new(true)),
            warnings: Arc::new(warnings),
        }
    }

    pub fn metrics(&self) -> &SyncMetrics {
        &self.metrics
    }

    /// Run every connector once, concurrently, and wait for all of them.
    pub async fn run_cycle(&self) -> CycleReport {
        let handles: Vec<_> = self
            .slots
            .iter()
            .map(|slot| {
                let service = self.clone();
                let slot = slot.clone();
                tokio::spawn(async move { service.run_slot(&slot).await })
            })
            .collect();

        let mut report = CycleReport::default();
        for (slot, joined) in self.slots.iter().zip(join_all(handles).await) {
            match joined {
                Ok(PassOutcome::Completed(result)) => report.results.push(result),
                Ok(PassOutcome::Skipped) => report.skipped.push(slot.name.clone()),
                Err(e) => {
                    tracing::error!(connector = %slot.name, error = %e, "connector task failed");
                    report
                        .results
                        .push(SyncResult::failed(&slot.name, format!("task failed: {e}")));
                }
            }
        }

        tracing::info!(
            connectors = report.results.len(),
            skipped = report.skipped.len(),
            total_operations = report.total_operations(),
            total_errors = report.total_errors(),
            "sync cycle completed"
        );
        report
    }

    /// One exclusive `connect -> sync -> write-back -> disconnect` pass.
    pub async fn run_slot(&self, slot: &ConnectorSlot) -> PassOutcome {
        let Ok(mut connector) = slot.connector.clone().try_lock_owned() else {
            tracing::info!(connector = %slot.name, "pass already in progress, skipping");
            return PassOutcome::Skipped;
        };

        let result = match AssertUnwindSafe(self.pass(&mut **connector, slot))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(connector = %slot.name, panic = %message, "connector panicked");
                SyncResult::failed(&slot.name, format!("connector panicked: {message}"))
            }
        };

        match AssertUnwindSafe(connector.disconnect()).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(connector = %slot.name, error = %e, "disconnect failed"),
            Err(panic) => tracing::warn!(
                connector = %slot.name,
                panic = %panic_message(panic.as_ref()),
                "disconnect panicked"
            ),
        }

        let finished_at = Utc::now();
        self.metrics.record_pass(&result, finished_at);
        slot.mark_completed(finished_at);

        tracing::info!(connector = %slot.name, summary = ?result.summary(), "pass finished");
        PassOutcome::Completed(result)
    }

    async fn pass(&self, connector: &mut dyn Connector, slot: &ConnectorSlot) -> SyncResult {
        if let Err(e) = connector.connect().await {
            tracing::error!(connector = %slot.name, error = %e, "connect failed");
            return SyncResult::failed(&slot.name, e);
        }

        let mut result = match connector.sync().await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(connector = %slot.name, error = %e, "sync failed");
                return SyncResult::failed(&slot.name, e);
            }
        };

        self.write_back(&*connector, slot, &mut result).await;
        result
    }

    async fn write_back(&self, connector: &dyn Connector, slot: &ConnectorSlot, result: &mut SyncResult) {
        let Some(membership) = connector.group_membership() else {
            return;
        };

        let intents = match self.graph.list_membership_intents(&slot.name).await {
            Ok(intents) => intents,
            Err(e) => {
                tracing::warn!(connector = %slot.name, error = %e, "cannot read membership intents");
                result.push_error(format!("write-back: {e}"));
                return;
            }
        };

        let dry_run = !slot.settings.write_back_enabled;
        for intent in &intents {
            let report = reconcile_group(membership, intent, slot.settings.write_back_enabled).await;
            self.metrics.record_write_back(&slot.name, &report);
            if !report.plan.is_empty() {
                tracing::info!(
                    connector = %slot.name,
                    group_id = %intent.provider_group_id,
                    to_add = report.plan.to_add.len(),
                    to_remove = report.plan.to_remove.len(),
                    failures = report.failures(),
                    dry_run,
                    "membership reconciled"
                );
            }
        }
    }

    /// Spawn one timer per connector. Timers stop when `cancel` trips; a
    /// pass already running finishes first.
    pub fn schedule(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        self.slots
            .iter()
            .map(|slot| {
                let service = self.clone();
                let slot = slot.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let name = slot.name.clone();
                    let period = timer_period(slot.settings.sync_interval_secs);
                    run_every(&name, period, cancel, move || {
                        let service = service.clone();
                        let slot = slot.clone();
                        async move {
                            if let PassOutcome::Skipped = service.run_slot(&slot).await {
                                tracing::debug!(connector = %slot.name, "scheduled pass skipped");
                            }
                        }
                    })
                    .await;
                })
            })
            .collect()
    }

    /// Static liveness; makes no network calls.
    pub fn health_status(&self) -> HealthStatus {
        let running = self.running.load(Ordering::SeqCst);
        HealthStatus {
            status: if running { "ok" } else { "stopped" },
            running,
            connectors: self
                .slots
                .iter()
                .map(|slot| ConnectorHealth {
                    name: slot.name.clone(),
                    enabled: slot.settings.enabled,
                    trigger: slot.trigger.label(),
                    interval_secs: slot.settings.sync_interval_secs,
                    write_back_enabled: slot.settings.write_back_enabled,
                    last_completed: slot.last_completed(),
                })
                .collect(),
            warnings: self.warnings.as_ref().clone(),
        }
    }

    pub fn mark_stopped(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
