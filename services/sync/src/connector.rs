use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use strata_common::error::StrataError;
use strata_db::graph::models::UpsertOutcome;

/// Per-connector, per-pass tally of upserts and errors.
///
/// Only increments and appends are exposed, so a result never loses counts
/// during the pass that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    connector: String,
    entities_created: u64,
    entities_updated: u64,
    organizations_created: u64,
    organizations_updated: u64,
    errors: Vec<String>,
}

impl SyncResult {
    pub fn new(connector: impl Into<String>) -> Self {
        Self {
            connector: connector.into(),
            entities_created: 0,
            entities_updated: 0,
            organizations_created: 0,
            organizations_updated: 0,
            errors: Vec::new(),
        }
    }

    /// A pass that failed before producing anything: one error, no counts.
    pub fn failed(connector: impl Into<String>, error: impl fmt::Display) -> Self {
        let mut result = Self::new(connector);
        result.push_error(error.to_string());
        result
    }

    pub fn record_entity(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.entities_created += 1,
            UpsertOutcome::Updated => self.entities_updated += 1,
        }
    }

    pub fn record_organization(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.organizations_created += 1,
            UpsertOutcome::Updated => self.organizations_updated += 1,
        }
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn connector(&self) -> &str {
        &self.connector
    }

    pub fn entities_created(&self) -> u64 {
        self.entities_created
    }

    pub fn entities_updated(&self) -> u64 {
        self.entities_updated
    }

    pub fn organizations_created(&self) -> u64 {
        self.organizations_created
    }

    pub fn organizations_updated(&self) -> u64 {
        self.organizations_updated
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn total_operations(&self) -> u64 {
        self.entities_created
            + self.entities_updated
            + self.organizations_created
            + self.organizations_updated
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn summary(&self) -> SyncSummary {
        SyncSummary {
            connector: self.connector.clone(),
            entities_created: self.entities_created,
            entities_updated: self.entities_updated,
            organizations_created: self.organizations_created,
            organizations_updated: self.organizations_updated,
            errors: self.errors.len(),
            total_operations: self.total_operations(),
            has_errors: self.has_errors(),
        }
    }
}

/// Flat view of a [`SyncResult`] for logs and metrics.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SyncSummary {
    pub connector: String,
    pub entities_created: u64,
    pub entities_updated: u64,
    pub organizations_created: u64,
    pub organizations_updated: u64,
    pub errors: usize,
    pub total_operations: u64,
    pub has_errors: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorState {
    New,
    Connected,
    Syncing,
    Disconnected,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connector {0} is not connected")]
    NotConnected(String),
}

impl From<StrataError> for ConnectorError {
    fn from(err: StrataError) -> Self {
        match err {
            StrataError::Config(msg) | StrataError::Credential(msg) => Self::Config(msg),
            other => Self::Config(other.to_string()),
        }
    }
}

/// One provider record that could not be turned into a canonical entity.
#[derive(Debug, thiserror::Error)]
#[error("cannot map {kind} record: {reason}")]
pub struct MappingError {
    pub kind: &'static str,
    pub reason: String,
}

impl MappingError {
    pub fn new(kind: &'static str, reason: impl fmt::Display) -> Self {
        Self {
            kind,
            reason: reason.to_string(),
        }
    }
}

/// Lifecycle every provider implements.
///
/// `sync` only returns `Err` for connector-level failures (not connected);
/// stage and item failures are reported inside the returned [`SyncResult`].
#[async_trait]
pub trait Connector: Send + Sync {
    fn name(&self) -> &str;

    fn state(&self) -> ConnectorState;

    async fn connect(&mut self) -> Result<(), ConnectorError>;

    async fn sync(&mut self) -> Result<SyncResult, ConnectorError>;

    async fn disconnect(&mut self) -> Result<(), ConnectorError>;

    async fn health_check(&self) -> bool;

    /// Write-back primitives, for providers that support them.
    fn group_membership(&self) -> Option<&dyn GroupMembership> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipOperation {
    Add,
    Remove,
}

impl MembershipOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMembershipResult {
    pub success: bool,
    pub group_id: String,
    pub user_id: String,
    pub operation: MembershipOperation,
    pub error: Option<String>,
}

impl GroupMembershipResult {
    pub fn succeeded(operation: MembershipOperation, group_id: &str, user_id: &str) -> Self {
        Self {
            success: true,
            group_id: group_id.to_owned(),
            user_id: user_id.to_owned(),
            operation,
            error: None,
        }
    }

    pub fn failed(
        operation: MembershipOperation,
        group_id: &str,
        user_id: &str,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            group_id: group_id.to_owned(),
            user_id: user_id.to_owned(),
            operation,
            error: Some(error.into()),
        }
    }
}

/// Group membership primitives used by write-back. No diffing happens here.
#[async_trait]
pub trait GroupMembership: Send + Sync {
    /// Current native member ids; empty when the provider is unreachable.
    async fn get_group_members(&self, group_id: &str) -> BTreeSet<String>;

    /// Ensure `user_id` is a member. Already-present counts as success.
    async fn add_group_member(&self, group_id: &str, user_id: &str) -> GroupMembershipResult;

    /// Ensure `user_id` is not a member. Already-absent counts as success.
    async fn remove_group_member(&self, group_id: &str, user_id: &str)
        -> GroupMembershipResult;
}
