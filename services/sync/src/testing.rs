//! In-memory entity graph shared by connector and orchestrator tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use strata_common::error::{StrataError, StrataResult};
use strata_db::graph::models::{
    CanonicalGroup, CanonicalIdentity, CanonicalOrganization, MembershipIntent, UpsertOutcome,
    UpsertedKey,
};
use strata_db::graph::repositories::EntityGraphRepository;

type NaturalKey = (String, String);

#[derive(Default)]
struct GraphState {
    identities: HashMap<NaturalKey, (Uuid, CanonicalIdentity)>,
    groups: HashMap<NaturalKey, (Uuid, CanonicalGroup)>,
    organizations: HashMap<NaturalKey, (Uuid, CanonicalOrganization)>,
    intents: Vec<MembershipIntent>,
    failing_ids: HashSet<String>,
}

#[derive(Clone, Default)]
pub struct InMemoryGraph {
    state: Arc<Mutex<GraphState>>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upsert of this native id fail.
    pub fn fail_on(&self, native_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_ids
            .insert(native_id.to_owned());
    }

    pub fn add_intent(&self, provider: &str, group_id: &str, members: &[&str]) {
        self.state.lock().unwrap().intents.push(MembershipIntent {
            provider: provider.to_owned(),
            provider_group_id: group_id.to_owned(),
            member_ids: members.iter().map(|m| m.to_string()).collect(),
        });
    }

    pub fn identity_count(&self) -> usize {
        self.state.lock().unwrap().identities.len()
    }

    pub fn group_count(&self) -> usize {
        self.state.lock().unwrap().groups.len()
    }

    pub fn organization_count(&self) -> usize {
        self.state.lock().unwrap().organizations.len()
    }

    pub fn identity(&self, provider: &str, provider_id: &str) -> Option<CanonicalIdentity> {
        self.state
            .lock()
            .unwrap()
            .identities
            .get(&(provider.to_owned(), provider_id.to_owned()))
            .map(|(_, identity)| identity.clone())
    }

    fn check(&self, native_id: &str) -> StrataResult<()> {
        if self.state.lock().unwrap().failing_ids.contains(native_id) {
            return Err(StrataError::Database(format!(
                "simulated failure for {native_id}"
            )));
        }
        Ok(())
    }
}

fn upsert<T>(map: &mut HashMap<NaturalKey, (Uuid, T)>, key: NaturalKey, value: T) -> UpsertedKey {
    match map.get_mut(&key) {
        Some((id, existing)) => {
            *existing = value;
            UpsertedKey {
                id: *id,
                outcome: UpsertOutcome::Updated,
            }
        }
        None => {
            let id = Uuid::new_v4();
            map.insert(key, (id, value));
            UpsertedKey {
                id,
                outcome: UpsertOutcome::Created,
            }
        }
    }
}

#[async_trait]
impl EntityGraphRepository for InMemoryGraph {
    async fn upsert_identity(&self, identity: &CanonicalIdentity) -> StrataResult<UpsertedKey> {
        self.check(&identity.provider_id)?;
        let key = (identity.provider.clone(), identity.provider_id.clone());
        let mut state = self.state.lock().unwrap();
        Ok(upsert(&mut state.identities, key, identity.clone()))
    }

    async fn upsert_group(&self, group: &CanonicalGroup) -> StrataResult<UpsertedKey> {
        self.check(&group.provider_group_id)?;
        let key = (group.provider.clone(), group.provider_group_id.clone());
        let mut state = self.state.lock().unwrap();
        Ok(upsert(&mut state.groups, key, group.clone()))
    }

    async fn upsert_organization(
        &self,
        organization: &CanonicalOrganization,
    ) -> StrataResult<UpsertedKey> {
        self.check(&organization.provider_org_id)?;
        let key = (
            organization.provider.clone(),
            organization.provider_org_id.clone(),
        );
        let mut state = self.state.lock().unwrap();
        Ok(upsert(&mut state.organizations, key, organization.clone()))
    }

    async fn list_membership_intents(
        &self,
        provider: &str,
    ) -> StrataResult<Vec<MembershipIntent>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .intents
            .iter()
            .filter(|intent| intent.provider == provider)
            .cloned()
            .collect())
    }
}
