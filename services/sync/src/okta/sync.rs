use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use strata_config::ConnectorConfig;
use strata_db::graph::repositories::EntityGraphRepository;

use super::client::{OktaClient, OktaClientConfig};
use super::models::{OktaGroup, OktaUser, PROVIDER};
use crate::connector::{
    Connector, ConnectorError, ConnectorState, GroupMembership, GroupMembershipResult,
    MembershipOperation, SyncResult,
};
use crate::pagination::Paginator;
use crate::stage::{run_stage, Canonical, Mapped, Stage};

const PAGE_SIZE: u32 = 200;

pub struct OktaConnector {
    config: ConnectorConfig,
    graph: Arc<dyn EntityGraphRepository>,
    client: Option<OktaClient>,
    state: ConnectorState,
}

impl OktaConnector {
    pub fn new(config: ConnectorConfig, graph: Arc<dyn EntityGraphRepository>) -> Self {
        Self {
            config,
            graph,
            client: None,
            state: ConnectorState::New,
        }
    }

    async fn build_client(&self) -> Result<OktaClient, ConnectorError> {
        let base_url = self
            .config
            .base_url
            .clone()
            .ok_or_else(|| ConnectorError::Config("okta base URL is not configured".into()))?;
        let api_token = self
            .config
            .credential
            .as_ref()
            .ok_or_else(|| ConnectorError::Config("okta credential is not configured".into()))?
            .resolve()
            .await?;

        OktaClient::new(OktaClientConfig {
            base_url,
            api_token,
            page_size: PAGE_SIZE,
            max_retries: self.config.max_retries,
            timeout_secs: self.config.timeout_secs,
        })
        .map_err(|e| ConnectorError::Config(e.to_string()))
    }

    async fn sync_users(&self, client: &OktaClient, result: &mut SyncResult) {
        let stage = Stage {
            provider: PROVIDER,
            name: "users",
            source: client,
            start_url: client.users_url(),
        };
        run_stage(stage, self.graph.as_ref(), result, |raw| {
            let user = OktaUser::from_value(raw)?;
            if !user.is_active() {
                return Ok(Mapped::Skip {
                    reason: format!("status {}", user.status),
                    native_id: user.id,
                });
            }
            Ok(Mapped::Upsert {
                entity: Canonical::Identity(user.to_identity()),
                native_id: user.id,
            })
        })
        .await;
    }

    async fn sync_groups(&self, client: &OktaClient, result: &mut SyncResult) {
        let stage = Stage {
            provider: PROVIDER,
            name: "groups",
            source: client,
            start_url: client.groups_url(),
        };
        run_stage(stage, self.graph.as_ref(), result, |raw| {
            let group = OktaGroup::from_value(raw)?;
            if !group.is_native() {
                return Ok(Mapped::Skip {
                    reason: format!("group type {}", group.group_type),
                    native_id: group.id,
                });
            }
            Ok(Mapped::Upsert {
                entity: Canonical::Group(group.to_group()),
                native_id: group.id,
            })
        })
        .await;
    }
}

#[async_trait]
impl Connector for OktaConnector {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn state(&self) -> ConnectorState {
        self.state
    }

    async fn connect(&mut self) -> Result<(), ConnectorError> {
        let client = self.build_client().await?;
        client.verify().await.map_err(ConnectorError::Transport)?;

        self.client = Some(client);
        self.state = ConnectorState::Connected;
        tracing::info!("okta connector connected");
        Ok(())
    }

    async fn sync(&mut self) -> Result<SyncResult, ConnectorError> {
        let client = match (&self.client, self.state) {
            (Some(client), ConnectorState::Connected) => client.clone(),
            _ => return Err(ConnectorError::NotConnected(PROVIDER.to_owned())),
        };

        self.state = ConnectorState::Syncing;
        let mut result = SyncResult::new(PROVIDER);
        self.sync_users(&client, &mut result).await;
        self.sync_groups(&client, &mut result).await;
        self.state = ConnectorState::Connected;

        tracing::info!(summary = ?result.summary(), "okta sync completed");
        Ok(result)
    }

    async fn disconnect(&mut self) -> Result<(), ConnectorError> {
        self.client = None;
        self.state = ConnectorState::Disconnected;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        match &self.client {
            Some(client) => match client.verify().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "okta health check failed");
                    false
                }
            },
            None => false,
        }
    }

    fn group_membership(&self) -> Option<&dyn GroupMembership> {
        Some(self)
    }
}

#[async_trait]
impl GroupMembership for OktaConnector {
    async fn get_group_members(&self, group_id: &str) -> BTreeSet<String> {
        let Some(client) = &self.client else {
            tracing::warn!(group_id, "okta client unavailable, reporting no members");
            return BTreeSet::new();
        };

        let mut members = BTreeSet::new();
        let mut pages = Paginator::new(client, client.group_members_url(group_id));
        while let Some(item) = pages.next_record().await {
            match item {
                Ok(raw) => match raw.get("id").and_then(Value::as_str) {
                    Some(id) => {
                        members.insert(id.to_owned());
                    }
                    None => tracing::debug!(group_id, "okta member record without id"),
                },
                // A partial listing must not be mistaken for the real one.
                Err(e) => {
                    tracing::warn!(group_id, error = %e, "okta member listing failed, reporting no members");
                    return BTreeSet::new();
                }
            }
        }
        members
    }

    async fn add_group_member(&self, group_id: &str, user_id: &str) -> GroupMembershipResult {
        let op = MembershipOperation::Add;
        let Some(client) = &self.client else {
            return GroupMembershipResult::failed(op, group_id, user_id, "okta is not connected");
        };
        match client.add_member(group_id, user_id).await {
            Ok(()) => GroupMembershipResult::succeeded(op, group_id, user_id),
            Err(e) => GroupMembershipResult::failed(op, group_id, user_id, e),
        }
    }

    async fn remove_group_member(&self, group_id: &str, user_id: &str) -> GroupMembershipResult {
        let op = MembershipOperation::Remove;
        let Some(client) = &self.client else {
            return GroupMembershipResult::failed(op, group_id, user_id, "okta is not connected");
        };
        match client.remove_member(group_id, user_id).await {
            Ok(()) => GroupMembershipResult::succeeded(op, group_id, user_id),
            Err(e) => GroupMembershipResult::failed(op, group_id, user_id, e),
        }
    }
}
