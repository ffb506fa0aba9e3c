use serde::{Deserialize, Serialize};
use serde_json::Value;

use strata_db::graph::models::{
    CanonicalGroup, CanonicalIdentity, CanonicalOrganization, IdentityType,
};

use crate::connector::MappingError;

pub const PROVIDER: &str = "gitlab";

/// A user record from the GitLab REST API (`GET /api/v4/users`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabUser {
    pub id: u64,
    #[serde(default)]
    pub username: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub state: Option<String>,
    #[serde(default)]
    pub bot: Option<bool>,
    #[serde(default)]
    pub web_url: Option<String>,
}

impl GitLabUser {
    pub fn from_value(raw: Value) -> Result<Self, MappingError> {
        serde_json::from_value(raw).map_err(|e| MappingError::new("user", e))
    }

    pub fn is_active(&self) -> bool {
        self.state.as_deref() == Some("active")
    }

    /// Returns `true` if the account is a bot/service account.
    pub fn is_service_account(&self) -> bool {
        self.bot == Some(true)
    }

    pub fn to_identity(&self) -> CanonicalIdentity {
        CanonicalIdentity {
            provider: PROVIDER.to_owned(),
            provider_id: self.id.to_string(),
            username: self.username.clone(),
            email: self.email.clone().unwrap_or_default(),
            display_name: self.name.clone().unwrap_or_default(),
            identity_type: if self.is_service_account() {
                IdentityType::ServiceAccount
            } else {
                IdentityType::User
            },
            active: self.is_active(),
            attributes: serde_json::json!({
                "state": self.state,
                "web_url": self.web_url,
            }),
        }
    }
}

/// A group from `GET /api/v4/groups`. Top-level groups are namespaces that
/// own everything below them and map to organizations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabGroup {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub full_path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<u64>,
    #[serde(default)]
    pub web_url: Option<String>,
}

impl GitLabGroup {
    pub fn from_value(raw: Value) -> Result<Self, MappingError> {
        serde_json::from_value(raw).map_err(|e| MappingError::new("group", e))
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn to_organization(&self) -> CanonicalOrganization {
        CanonicalOrganization {
            provider: PROVIDER.to_owned(),
            provider_org_id: self.id.to_string(),
            name: self.name.clone(),
            web_url: self.web_url.clone(),
        }
    }

    pub fn to_group(&self) -> CanonicalGroup {
        CanonicalGroup {
            provider: PROVIDER.to_owned(),
            provider_group_id: self.id.to_string(),
            name: self
                .full_path
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| self.name.clone()),
            description: self.description.clone().unwrap_or_default(),
        }
    }
}

/// GitLab error bodies come as `{"message": ...}` (string or field map) or
/// OAuth-style `{"error": ..., "error_description": ...}`.
pub fn describe_error_body(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("message") {
        Some(Value::String(message)) if !message.is_empty() => return Some(message.clone()),
        Some(Value::Object(fields)) if !fields.is_empty() => {
            let parts: Vec<String> = fields
                .iter()
                .map(|(field, reasons)| match reasons {
                    Value::Array(items) => {
                        let reasons: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                        format!("{field} {}", reasons.join(", "))
                    }
                    other => format!("{field} {other}"),
                })
                .collect();
            return Some(parts.join("; "));
        }
        _ => {}
    }
    let error = value.get("error").and_then(Value::as_str)?;
    match value.get("error_description").and_then(Value::as_str) {
        Some(description) => Some(format!("{error}: {description}")),
        None => Some(error.to_owned()),
    }
}
