//! Write-back: diff desired group membership against what the provider
//! reports and issue the minimal add/remove calls.

use std::collections::BTreeSet;

use serde::Serialize;

use strata_db::graph::models::MembershipIntent;

use crate::connector::{GroupMembership, GroupMembershipResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MembershipPlan {
    pub group_id: String,
    pub to_add: BTreeSet<String>,
    pub to_remove: BTreeSet<String>,
}

impl MembershipPlan {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    pub fn mutation_count(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }
}

/// `to_add = desired - observed`, `to_remove = observed - desired`.
pub fn plan(
    group_id: &str,
    desired: &BTreeSet<String>,
    observed: &BTreeSet<String>,
) -> MembershipPlan {
    MembershipPlan {
        group_id: group_id.to_owned(),
        to_add: desired.difference(observed).cloned().collect(),
        to_remove: observed.difference(desired).cloned().collect(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub plan: MembershipPlan,
    pub dry_run: bool,
    pub results: Vec<GroupMembershipResult>,
}

impl ReconcileReport {
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

/// Execute `plan`: one add per `to_add` id, one remove per `to_remove` id.
/// With write-back disabled nothing is called and the plan is reported as a
/// dry run.
pub async fn apply(
    membership: &dyn GroupMembership,
    plan: MembershipPlan,
    write_back_enabled: bool,
) -> ReconcileReport {
    if !write_back_enabled {
        if !plan.is_empty() {
            tracing::info!(
                group_id = %plan.group_id,
                to_add = plan.to_add.len(),
                to_remove = plan.to_remove.len(),
                "write-back disabled, membership diff not applied"
            );
        }
        return ReconcileReport {
            plan,
            dry_run: true,
            results: Vec::new(),
        };
    }

    let mut results = Vec::with_capacity(plan.mutation_count());
    for user_id in &plan.to_add {
        results.push(membership.add_group_member(&plan.group_id, user_id).await);
    }
    for user_id in &plan.to_remove {
        results.push(membership.remove_group_member(&plan.group_id, user_id).await);
    }

    for failed in results.iter().filter(|r| !r.success) {
        tracing::warn!(
            group_id = %failed.group_id,
            user_id = %failed.user_id,
            operation = failed.operation.as_str(),
            error = failed.error.as_deref().unwrap_or_default(),
            "membership mutation failed"
        );
    }

    ReconcileReport {
        plan,
        dry_run: false,
        results,
    }
}

/// Observe the provider's current members for one intent, then apply the diff.
pub async fn reconcile_group(
    membership: &dyn GroupMembership,
    intent: &MembershipIntent,
    write_back_enabled: bool,
) -> ReconcileReport {
    let observed = membership
        .get_group_members(&intent.provider_group_id)
        .await;
    let plan = plan(&intent.provider_group_id, &intent.member_ids, &observed);
    apply(membership, plan, write_back_enabled).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::MembershipOperation;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    struct RecordingMembership {
        observed: BTreeSet<String>,
        failing: BTreeSet<String>,
        calls: Mutex<Vec<(MembershipOperation, String)>>,
    }

    impl RecordingMembership {
        fn new(observed: &[&str]) -> Self {
            Self {
                observed: set(observed),
                failing: BTreeSet::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(MembershipOperation, String)> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, op: MembershipOperation, group_id: &str, user_id: &str) -> GroupMembershipResult {
            self.calls.lock().unwrap().push((op, user_id.to_owned()));
            if self.failing.contains(user_id) {
                GroupMembershipResult::failed(op, group_id, user_id, "HTTP 500 Internal Server Error: boom")
            } else {
                GroupMembershipResult::succeeded(op, group_id, user_id)
            }
        }
    }

    #[async_trait]
    impl GroupMembership for RecordingMembership {
        async fn get_group_members(&self, _group_id: &str) -> BTreeSet<String> {
            self.observed.clone()
        }

        async fn add_group_member(&self, group_id: &str, user_id: &str) -> GroupMembershipResult {
            self.record(MembershipOperation::Add, group_id, user_id)
        }

        async fn remove_group_member(
            &self,
            group_id: &str,
            user_id: &str,
        ) -> GroupMembershipResult {
            self.record(MembershipOperation::Remove, group_id, user_id)
        }
    }

    fn intent(members: &[&str]) -> MembershipIntent {
        MembershipIntent {
            provider: "okta".into(),
            provider_group_id: "00g1".into(),
            member_ids: set(members),
        }
    }

    #[test]
    fn plan_is_the_symmetric_difference() {
        let plan = plan("g", &set(&["A", "B", "C"]), &set(&["A", "D"]));
        assert_eq!(plan.to_add, set(&["B", "C"]));
        assert_eq!(plan.to_remove, set(&["D"]));
        assert_eq!(plan.mutation_count(), 3);
    }

    #[test]
    fn matching_sets_plan_nothing() {
        assert!(plan("g", &set(&["A"]), &set(&["A"])).is_empty());
    }

    #[tokio::test]
    async fn applies_exactly_the_diff() {
        let membership = RecordingMembership::new(&["A", "D"]);
        let report = reconcile_group(&membership, &intent(&["A", "B", "C"]), true).await;

        assert!(!report.dry_run);
        assert_eq!(report.failures(), 0);
        assert_eq!(
            membership.calls(),
            vec![
                (MembershipOperation::Add, "B".to_string()),
                (MembershipOperation::Add, "C".to_string()),
                (MembershipOperation::Remove, "D".to_string()),
            ]
        );
        assert!(membership.calls().iter().all(|(_, user)| user != "A"));
    }

    #[tokio::test]
    async fn disabled_write_back_is_a_dry_run() {
        let membership = RecordingMembership::new(&["A", "D"]);
        let report = reconcile_group(&membership, &intent(&["A", "B"]), false).await;

        assert!(report.dry_run);
        assert!(report.results.is_empty());
        assert_eq!(report.plan.to_add, set(&["B"]));
        assert_eq!(report.plan.to_remove, set(&["D"]));
        assert!(membership.calls().is_empty());
    }

    #[tokio::test]
    async fn unavailable_listing_never_removes() {
        let membership = RecordingMembership::new(&[]);
        let report = reconcile_group(&membership, &intent(&["A"]), true).await;

        assert!(report.plan.to_remove.is_empty());
        assert_eq!(membership.calls(), vec![(MembershipOperation::Add, "A".to_string())]);
    }

    #[tokio::test]
    async fn failed_mutation_is_reported_and_others_proceed() {
        let mut membership = RecordingMembership::new(&["D"]);
        membership.failing = set(&["B"]);

        let report = reconcile_group(&membership, &intent(&["B", "C"]), true).await;

        assert_eq!(report.results.len(), 3);
        assert_eq!(report.failures(), 1);
        let failed = report.results.iter().find(|r| !r.success).unwrap();
        assert_eq!(failed.user_id, "B");
        assert!(failed.error.as_deref().unwrap().contains("boom"));
    }
}
