//! Prometheus sync metrics, exposed on `GET /metrics`.
//!
//! Every family is labeled by connector. Counters are atomic, so concurrent
//! passes record without coordination.

use std::sync::atomic::AtomicI64;

use chrono::{DateTime, Utc};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use crate::connector::SyncResult;
use crate::reconcile::ReconcileReport;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ConnectorLabels {
    pub connector: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PassLabels {
    pub connector: String,
    pub outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct WriteBackLabels {
    pub connector: String,
    pub operation: String,
    pub outcome: String,
}

pub struct SyncMetrics {
    registry: Registry,
    entities_created: Family<ConnectorLabels, Counter>,
    entities_updated: Family<ConnectorLabels, Counter>,
    organizations_created: Family<ConnectorLabels, Counter>,
    organizations_updated: Family<ConnectorLabels, Counter>,
    errors: Family<ConnectorLabels, Counter>,
    passes: Family<PassLabels, Counter>,
    write_back_mutations: Family<WriteBackLabels, Counter>,
    last_success: Family<ConnectorLabels, Gauge<i64, AtomicI64>>,
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("strata");
        let entities_created = Family::<ConnectorLabels, Counter>::default();
        let entities_updated = Family::<ConnectorLabels, Counter>::default();
        let organizations_created = Family::<ConnectorLabels, Counter>::default();
        let organizations_updated = Family::<ConnectorLabels, Counter>::default();
        let errors = Family::<ConnectorLabels, Counter>::default();
        let passes = Family::<PassLabels, Counter>::default();
        let write_back_mutations = Family::<WriteBackLabels, Counter>::default();
        let last_success = Family::<ConnectorLabels, Gauge<i64, AtomicI64>>::default();

        registry.register(
            "sync_entities_created",
            "Identities and groups created in the entity graph",
            entities_created.clone(),
        );
        registry.register(
            "sync_entities_updated",
            "Identities and groups updated in the entity graph",
            entities_updated.clone(),
        );
        registry.register(
            "sync_organizations_created",
            "Organizations created in the entity graph",
            organizations_created.clone(),
        );
        registry.register(
            "sync_organizations_updated",
            "Organizations updated in the entity graph",
            organizations_updated.clone(),
        );
        registry.register(
            "sync_errors",
            "Errors recorded by sync passes",
            errors.clone(),
        );
        registry.register(
            "sync_passes",
            "Completed sync passes by outcome",
            passes.clone(),
        );
        registry.register(
            "write_back_mutations",
            "Group membership mutations by operation and outcome",
            write_back_mutations.clone(),
        );
        registry.register(
            "sync_last_success_timestamp_seconds",
            "Unix time of the last pass that finished without errors",
            last_success.clone(),
        );

        Self {
            registry,
            entities_created,
            entities_updated,
            organizations_created,
            organizations_updated,
            errors,
            passes,
            write_back_mutations,
            last_success,
        }
    }

    pub fn record_pass(&self, result: &SyncResult, finished_at: DateTime<Utc>) {
        let labels = ConnectorLabels {
            connector: result.connector().to_owned(),
        };

        self.entities_created
            .get_or_create(&labels)
            .inc_by(result.entities_created());
        self.entities_updated
            .get_or_create(&labels)
            .inc_by(result.entities_updated());
        self.organizations_created
            .get_or_create(&labels)
            .inc_by(result.organizations_created());
        self.organizations_updated
            .get_or_create(&labels)
            .inc_by(result.organizations_updated());
        self.errors
            .get_or_create(&labels)
            .inc_by(result.errors().len() as u64);

        let outcome = match (result.has_errors(), result.total_operations()) {
            (false, _) => "success",
            (true, 0) => "failed",
            (true, _) => "partial",
        };
        self.passes
            .get_or_create(&PassLabels {
                connector: labels.connector.clone(),
                outcome: outcome.to_owned(),
            })
            .inc();

        if !result.has_errors() {
            self.last_success
                .get_or_create(&labels)
                .set(finished_at.timestamp());
        }
    }

    pub fn record_write_back(&self, connector: &str, report: &ReconcileReport) {
        if report.dry_run {
            let planned = [
                ("add", report.plan.to_add.len()),
                ("remove", report.plan.to_remove.len()),
            ];
            for (operation, count) in planned {
                if count > 0 {
                    self.write_back_mutations
                        .get_or_create(&WriteBackLabels {
                            connector: connector.to_owned(),
                            operation: operation.to_owned(),
                            outcome: "dry_run".to_owned(),
                        })
                        .inc_by(count as u64);
                }
            }
            return;
        }

        for result in &report.results {
            self.write_back_mutations
                .get_or_create(&WriteBackLabels {
                    connector: connector.to_owned(),
                    operation: result.operation.as_str().to_owned(),
                    outcome: if result.success { "success" } else { "failure" }.to_owned(),
                })
                .inc();
        }
    }

    /// Prometheus text exposition of every registered family.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{GroupMembershipResult, MembershipOperation};
    use crate::reconcile::plan;
    use chrono::TimeZone;
    use std::collections::BTreeSet;
    use strata_db::graph::models::UpsertOutcome;

    fn finished() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn clean_pass_updates_counters_and_last_success() {
        let metrics = SyncMetrics::new();
        let mut result = SyncResult::new("okta");
        result.record_entity(UpsertOutcome::Created);
        result.record_entity(UpsertOutcome::Created);
        result.record_entity(UpsertOutcome::Updated);

        metrics.record_pass(&result, finished());
        let text = metrics.encode().unwrap();

        assert!(text.contains(r#"strata_sync_entities_created_total{connector="okta"} 2"#));
        assert!(text.contains(r#"strata_sync_entities_updated_total{connector="okta"} 1"#));
        assert!(text.contains(r#"strata_sync_passes_total{connector="okta",outcome="success"} 1"#));
        assert!(text.contains(&format!(
            r#"strata_sync_last_success_timestamp_seconds{{connector="okta"}} {}"#,
            finished().timestamp()
        )));
    }

    #[test]
    fn failing_pass_leaves_last_success_untouched() {
        let metrics = SyncMetrics::new();
        let result = SyncResult::failed("gitlab", "transport error: HTTP 401");

        metrics.record_pass(&result, finished());
        let text = metrics.encode().unwrap();

        assert!(text.contains(r#"strata_sync_errors_total{connector="gitlab"} 1"#));
        assert!(text.contains(r#"strata_sync_passes_total{connector="gitlab",outcome="failed"} 1"#));
        assert!(!text.contains(r#"strata_sync_last_success_timestamp_seconds{connector="gitlab"}"#));
    }

    #[test]
    fn partial_pass_is_labelled_partial() {
        let metrics = SyncMetrics::new();
        let mut result = SyncResult::new("okta");
        result.record_organization(UpsertOutcome::Created);
        result.push_error("groups: page fetch failed");

        metrics.record_pass(&result, finished());
        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"strata_sync_passes_total{connector="okta",outcome="partial"} 1"#));
        assert!(text.contains(r#"strata_sync_organizations_created_total{connector="okta"} 1"#));
    }

    #[test]
    fn write_back_counts_by_operation_and_outcome() {
        let metrics = SyncMetrics::new();
        let desired: BTreeSet<String> = ["B".to_string()].into();
        let observed: BTreeSet<String> = ["D".to_string()].into();
        let report = ReconcileReport {
            plan: plan("00g1", &desired, &observed),
            dry_run: false,
            results: vec![
                GroupMembershipResult::succeeded(MembershipOperation::Add, "00g1", "B"),
                GroupMembershipResult::failed(MembershipOperation::Remove, "00g1", "D", "HTTP 403"),
            ],
        };

        metrics.record_write_back("okta", &report);
        let text = metrics.encode().unwrap();
        assert!(text.contains(
            r#"strata_write_back_mutations_total{connector="okta",operation="add",outcome="success"} 1"#
        ));
        assert!(text.contains(
            r#"strata_write_back_mutations_total{connector="okta",operation="remove",outcome="failure"} 1"#
        ));
    }

    #[test]
    fn dry_run_counts_planned_mutations() {
        let metrics = SyncMetrics::new();
        let desired: BTreeSet<String> = ["A".to_string(), "B".to_string()].into();
        let report = ReconcileReport {
            plan: plan("00g1", &desired, &BTreeSet::new()),
            dry_run: true,
            results: Vec::new(),
        };

        metrics.record_write_back("okta", &report);
        let text = metrics.encode().unwrap();
        assert!(text.contains(
            r#"strata_write_back_mutations_total{connector="okta",operation="add",outcome="dry_run"} 2"#
        ));
        assert!(!text.contains(r#"operation="remove""#));
    }
}
