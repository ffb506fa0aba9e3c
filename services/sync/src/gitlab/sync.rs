use std::sync::Arc;

use async_trait::async_trait;

use strata_config::ConnectorConfig;
use strata_db::graph::repositories::EntityGraphRepository;

use super::client::{GitLabClient, GitLabClientConfig};
use super::models::{GitLabGroup, GitLabUser, PROVIDER};
use crate::connector::{Connector, ConnectorError, ConnectorState, SyncResult};
use crate::stage::{run_stage, Canonical, Mapped, Stage};

/// Read-only GitLab connector: users, organizations (top-level groups) and
/// subgroups. Exposes no write-back.
pub struct GitLabConnector {
    config: ConnectorConfig,
    graph: Arc<dyn EntityGraphRepository>,
    client: Option<GitLabClient>,
    state: ConnectorState,
}

impl GitLabConnector {
    pub fn new(config: ConnectorConfig, graph: Arc<dyn EntityGraphRepository>) -> Self {
        Self {
            config,
            graph,
            client: None,
            state: ConnectorState::New,
        }
    }

    async fn build_client(&self) -> Result<GitLabClient, ConnectorError> {
        let base_url = self
            .config
            .base_url
            .clone()
            .ok_or_else(|| ConnectorError::Config("gitlab base URL is not configured".into()))?;
        let private_token = self
            .config
            .credential
            .as_ref()
            .ok_or_else(|| ConnectorError::Config("gitlab credential is not configured".into()))?
            .resolve()
            .await?;

        GitLabClient::new(GitLabClientConfig {
            base_url,
            private_token,
            max_retries: self.config.max_retries,
            timeout_secs: self.config.timeout_secs,
        })
        .map_err(|e| ConnectorError::Config(e.to_string()))
    }

    async fn sync_users(&self, client: &GitLabClient, result: &mut SyncResult) {
        let stage = Stage {
            provider: PROVIDER,
            name: "users",
            source: client,
            start_url: client.users_url(),
        };
        run_stage(stage, self.graph.as_ref(), result, |raw| {
            let user = GitLabUser::from_value(raw)?;
            if !user.is_active() {
                return Ok(Mapped::Skip {
                    native_id: user.id.to_string(),
                    reason: format!("state {}", user.state.as_deref().unwrap_or("unknown")),
                });
            }
            Ok(Mapped::Upsert {
                native_id: user.id.to_string(),
                entity: Canonical::Identity(user.to_identity()),
            })
        })
        .await;
    }

    /// Top-level groups become organizations, subgroups become groups.
    async fn sync_groups(&self, client: &GitLabClient, result: &mut SyncResult) {
        let stage = Stage {
            provider: PROVIDER,
            name: "groups",
            source: client,
            start_url: client.groups_url(),
        };
        run_stage(stage, self.graph.as_ref(), result, |raw| {
            let group = GitLabGroup::from_value(raw)?;
            let entity = if group.is_top_level() {
                Canonical::Organization(group.to_organization())
            } else {
                Canonical::Group(group.to_group())
            };
            Ok(Mapped::Upsert {
                native_id: group.id.to_string(),
                entity,
            })
        })
        .await;
    }
}

#[async_trait]
impl Connector for GitLabConnector {
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
        tracing::info!("gitlab connector connected");
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

        tracing::info!(summary = ?result.summary(), "gitlab sync completed");
        Ok(result)
    }

    async fn disconnect(&mut self) -> Result<(), ConnectorError> {
        self.client = None;
        self.state = ConnectorState::Disconnected;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        match &self.client {
            Some(client) => client.verify().await.is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryGraph;
    use strata_config::CredentialRef;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> ConnectorConfig {
        ConnectorConfig {
            enabled: true,
            base_url: Some(base_url.to_string()),
            credential: Some(CredentialRef::Inline("glpat-test".into())),
            sync_interval_secs: 3600,
            write_back_enabled: false,
            max_retries: 0,
            timeout_secs: 5,
        }
    }

    async fn mount_verify(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/api/v4/user"))
            .and(header("private-token", "glpat-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": 1, "username": "sync-bot"})),
            )
            .mount(server)
            .await;
    }

    async fn mount_listing(server: &MockServer, listing: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(listing))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn connected(server: &MockServer, graph: &InMemoryGraph) -> GitLabConnector {
        let mut connector = GitLabConnector::new(test_config(&server.uri()), Arc::new(graph.clone()));
        connector.connect().await.expect("connect should succeed");
        connector
    }

    #[tokio::test]
    async fn sync_before_connect_fails_fast() {
        let mut connector =
            GitLabConnector::new(test_config("http://unused"), Arc::new(InMemoryGraph::new()));
        let err = connector.sync().await.unwrap_err();
        assert!(matches!(err, ConnectorError::NotConnected(name) if name == "gitlab"));
    }

    #[tokio::test]
    async fn unresolvable_credential_is_config_error() {
        let mut config = test_config("http://unused");
        config.credential = Some(CredentialRef::Env("STRATA_TEST_GITLAB_TOKEN_UNSET".into()));

        let mut connector = GitLabConnector::new(config, Arc::new(InMemoryGraph::new()));
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, ConnectorError::Config(_)));
    }

    #[tokio::test]
    async fn users_and_group_hierarchy_are_synced() {
        let server = MockServer::start().await;
        mount_verify(&server).await;
        mount_listing(
            &server,
            "/api/v4/users",
            serde_json::json!([
                {"id": 1, "username": "mia", "name": "Mia", "state": "active", "bot": false},
                {"id": 2, "username": "deploy_bot", "state": "active", "bot": true},
                {"id": 3, "username": "gone", "state": "blocked"}
            ]),
        )
        .await;
        mount_listing(
            &server,
            "/api/v4/groups",
            serde_json::json!([
                {"id": 10, "name": "Acme", "full_path": "acme", "parent_id": null},
                {"id": 11, "name": "Platform", "full_path": "acme/platform", "parent_id": 10}
            ]),
        )
        .await;

        let graph = InMemoryGraph::new();
        let mut connector = connected(&server, &graph).await;
        let result = connector.sync().await.unwrap();

        assert_eq!(result.entities_created(), 3);
        assert_eq!(result.organizations_created(), 1);
        assert!(!result.has_errors());
        assert_eq!(graph.identity_count(), 2);
        assert_eq!(graph.group_count(), 1);
        assert_eq!(graph.organization_count(), 1);

        let bot = graph.identity("gitlab", "2").unwrap();
        assert_eq!(
            bot.identity_type,
            strata_db::graph::models::IdentityType::ServiceAccount
        );
    }

    #[tokio::test]
    async fn resync_updates_organizations() {
        let server = MockServer::start().await;
        mount_verify(&server).await;
        mount_listing(&server, "/api/v4/users", serde_json::json!([])).await;
        mount_listing(
            &server,
            "/api/v4/groups",
            serde_json::json!([{"id": 10, "name": "Acme", "parent_id": null}]),
        )
        .await;

        let graph = InMemoryGraph::new();
        let mut connector = connected(&server, &graph).await;
        connector.sync().await.unwrap();
        let second = connector.sync().await.unwrap();

        assert_eq!(second.organizations_created(), 0);
        assert_eq!(second.organizations_updated(), 1);
    }

    #[tokio::test]
    async fn user_listing_failure_does_not_stop_groups() {
        let server = MockServer::start().await;
        mount_verify(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/v4/users"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;
        let next = format!(
            "<{}/api/v4/users?active=true&page=2&per_page=100>; rel=\"next\"",
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/api/v4/users"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([
                        {"id": 1, "username": "mia", "state": "active"}
                    ]))
                    .append_header("link", next.as_str()),
            )
            .mount(&server)
            .await;
        mount_listing(
            &server,
            "/api/v4/groups",
            serde_json::json!([{"id": 11, "name": "Platform", "parent_id": 10}]),
        )
        .await;

        let graph = InMemoryGraph::new();
        let mut connector = connected(&server, &graph).await;
        let result = connector.sync().await.unwrap();

        assert_eq!(result.entities_created(), 2);
        assert_eq!(result.errors().len(), 1);
        assert!(result.errors()[0].starts_with("users:"));
        assert_eq!(graph.group_count(), 1);
    }

    #[tokio::test]
    async fn records_without_optional_names_still_sync() {
        let server = MockServer::start().await;
        mount_verify(&server).await;
        mount_listing(
            &server,
            "/api/v4/users",
            serde_json::json!([{"id": 42, "state": "active", "name": "No Handle"}]),
        )
        .await;
        mount_listing(
            &server,
            "/api/v4/groups",
            serde_json::json!([{"id": 7, "full_path": "unnamed", "parent_id": null}]),
        )
        .await;

        let graph = InMemoryGraph::new();
        let mut connector = connected(&server, &graph).await;
        let result = connector.sync().await.unwrap();

        assert!(!result.has_errors(), "unexpected errors: {:?}", result.errors());
        assert_eq!(result.entities_created(), 1);
        assert_eq!(result.organizations_created(), 1);

        let user = graph.identity("gitlab", "42").unwrap();
        assert_eq!(user.username, "");
        assert_eq!(user.display_name, "No Handle");
    }

    #[tokio::test]
    async fn exposes_no_write_back() {
        let connector =
            GitLabConnector::new(test_config("http://unused"), Arc::new(InMemoryGraph::new()));
        assert!(connector.group_membership().is_none());
        assert!(!connector.health_check().await);
    }
}
