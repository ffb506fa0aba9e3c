use async_trait::async_trait;

use crate::graph::models::{
    CanonicalGroup, CanonicalIdentity, CanonicalOrganization, MembershipIntent, UpsertedKey,
};
use strata_common::error::StrataResult;

#[async_trait]
pub trait EntityGraphRepository: Send + Sync {
    /// Insert or update an identity keyed by (provider, provider_id).
    /// On conflict, updates mutable fields but keeps the canonical id.
    async fn upsert_identity(&self, identity: &CanonicalIdentity) -> StrataResult<UpsertedKey>;

    /// Insert or update a group keyed by (provider, provider_group_id).
    async fn upsert_group(&self, group: &CanonicalGroup) -> StrataResult<UpsertedKey>;

    /// Insert or update an organization keyed by (provider, provider_org_id).
    async fn upsert_organization(
        &self,
        organization: &CanonicalOrganization,
    ) -> StrataResult<UpsertedKey>;

    /// Desired group memberships for one provider, one entry per group.
    async fn list_membership_intents(&self, provider: &str)
        -> StrataResult<Vec<MembershipIntent>>;
}
