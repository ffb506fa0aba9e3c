use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Canonical key of an upserted record and whether the upsert inserted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertedKey {
    pub id: Uuid,
    pub outcome: UpsertOutcome,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IdentityType {
    User,
    ServiceAccount,
}

impl IdentityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::ServiceAccount => "service_account",
        }
    }
}

impl FromStr for IdentityType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "service_account" => Ok(Self::ServiceAccount),
            _ => Err(format!("unknown identity type: {value}")),
        }
    }
}

/// An identity keyed by `(provider, provider_id)`.
///
/// Deactivation is expressed through `active`; sync never deletes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalIdentity {
    pub provider: String,
    pub provider_id: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub identity_type: IdentityType,
    pub active: bool,
    /// Opaque provider attributes, always a JSON object.
    pub attributes: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalGroup {
    pub provider: String,
    pub provider_group_id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalOrganization {
    pub provider: String,
    pub provider_org_id: String,
    pub name: String,
    pub web_url: Option<String>,
}

/// Members a provider group should have, as recorded in the graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MembershipIntent {
    pub provider: String,
    pub provider_group_id: String,
    pub member_ids: BTreeSet<String>,
}
