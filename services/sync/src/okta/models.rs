use serde::{Deserialize, Serialize};
use serde_json::Value;

use strata_db::graph::models::{CanonicalGroup, CanonicalIdentity, IdentityType};

use crate::connector::MappingError;

pub const PROVIDER: &str = "okta";

/// A user from `GET /api/v1/users`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OktaUser {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub profile: OktaUserProfile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OktaUserProfile {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
    /// Custom profile attributes, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl OktaUser {
    pub fn from_value(raw: Value) -> Result<Self, MappingError> {
        let user: Self = serde_json::from_value(raw).map_err(|e| MappingError::new("user", e))?;
        if user.id.trim().is_empty() {
            return Err(MappingError::new("user", "empty id"));
        }
        Ok(user)
    }

    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("ACTIVE")
    }

    pub fn is_service_account(&self) -> bool {
        matches!(
            self.profile
                .user_type
                .as_deref()
                .map(str::to_ascii_lowercase)
                .as_deref(),
            Some("service" | "service_account" | "serviceaccount")
        )
    }

    fn display_name(&self) -> String {
        if let Some(name) = self.profile.display_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_owned();
        }
        let full = [
            self.profile.first_name.as_deref(),
            self.profile.last_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
        if full.is_empty() {
            self.profile.login.clone().unwrap_or_default()
        } else {
            full
        }
    }

    pub fn to_identity(&self) -> CanonicalIdentity {
        CanonicalIdentity {
            provider: PROVIDER.to_owned(),
            provider_id: self.id.clone(),
            username: self.profile.login.clone().unwrap_or_default(),
            email: self.profile.email.clone().unwrap_or_default(),
            display_name: self.display_name(),
            identity_type: if self.is_service_account() {
                IdentityType::ServiceAccount
            } else {
                IdentityType::User
            },
            active: self.is_active(),
            attributes: serde_json::to_value(&self.profile)
                .unwrap_or_else(|_| Value::Object(Default::default())),
        }
    }
}

/// A group from `GET /api/v1/groups`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OktaGroup {
    pub id: String,
    #[serde(rename = "type", default)]
    pub group_type: String,
    #[serde(default)]
    pub profile: OktaGroupProfile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OktaGroupProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl OktaGroup {
    pub fn from_value(raw: Value) -> Result<Self, MappingError> {
        let group: Self =
            serde_json::from_value(raw).map_err(|e| MappingError::new("group", e))?;
        if group.id.trim().is_empty() {
            return Err(MappingError::new("group", "empty id"));
        }
        Ok(group)
    }

    /// Okta-mastered groups. `APP_GROUP` (imported from an app or directory)
    /// and `BUILT_IN` groups are mirrors and are not ours to write.
    pub fn is_native(&self) -> bool {
        self.group_type == "OKTA_GROUP"
    }

    pub fn to_group(&self) -> CanonicalGroup {
        CanonicalGroup {
            provider: PROVIDER.to_owned(),
            provider_group_id: self.id.clone(),
            name: self.profile.name.clone().unwrap_or_default(),
            description: self.profile.description.clone().unwrap_or_default(),
        }
    }
}

/// Okta's structured error body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OktaErrorBody {
    #[serde(default)]
    pub error_code: String,
    #[serde(default)]
    pub error_summary: String,
    #[serde(default)]
    pub error_causes: Vec<OktaErrorCause>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OktaErrorCause {
    #[serde(default)]
    pub error_summary: String,
}

impl OktaErrorBody {
    pub fn describe(&self) -> String {
        let mut message = if self.error_code.is_empty() {
            self.error_summary.clone()
        } else {
            format!("{}: {}", self.error_code, self.error_summary)
        };
        let causes: Vec<&str> = self
            .error_causes
            .iter()
            .map(|c| c.error_summary.as_str())
            .filter(|s| !s.is_empty())
            .collect();
        if !causes.is_empty() {
            message.push_str(&format!(" ({})", causes.join("; ")));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_full_user() {
        let raw = serde_json::json!({
            "id": "00u1ab",
            "status": "ACTIVE",
            "profile": {
                "login": "mia@example.com",
                "email": "mia@example.com",
                "firstName": "Mia",
                "lastName": "Krystof",
                "department": "Platform"
            }
        });
        let user = OktaUser::from_value(raw).expect("should deserialize");
        assert!(user.is_active());

        let identity = user.to_identity();
        assert_eq!(identity.provider, "okta");
        assert_eq!(identity.provider_id, "00u1ab");
        assert_eq!(identity.username, "mia@example.com");
        assert_eq!(identity.display_name, "Mia Krystof");
        assert_eq!(identity.identity_type, IdentityType::User);
        assert_eq!(identity.attributes["department"], "Platform");
    }

    #[test]
    fn missing_profile_fields_default_to_empty() {
        let user = OktaUser::from_value(serde_json::json!({"id": "00u2"})).unwrap();
        let identity = user.to_identity();
        assert_eq!(identity.username, "");
        assert_eq!(identity.email, "");
        assert_eq!(identity.display_name, "");
        assert!(!identity.active);
        assert!(identity.attributes.is_object());
    }

    #[test]
    fn display_name_prefers_explicit_value() {
        let user = OktaUser::from_value(serde_json::json!({
            "id": "00u3",
            "profile": {"displayName": "Ops Bot", "firstName": "Ops", "userType": "Service"}
        }))
        .unwrap();
        let identity = user.to_identity();
        assert_eq!(identity.display_name, "Ops Bot");
        assert_eq!(identity.identity_type, IdentityType::ServiceAccount);
    }

    #[test]
    fn user_without_id_is_a_mapping_error() {
        let err = OktaUser::from_value(serde_json::json!({"status": "ACTIVE"})).unwrap_err();
        assert_eq!(err.kind, "user");

        let err = OktaUser::from_value(serde_json::json!({"id": " "})).unwrap_err();
        assert!(err.to_string().contains("empty id"));
    }

    #[test]
    fn only_okta_groups_are_native() {
        for (ty, native) in [("OKTA_GROUP", true), ("APP_GROUP", false), ("BUILT_IN", false)] {
            let group = OktaGroup::from_value(serde_json::json!({
                "id": "00g1",
                "type": ty,
                "profile": {"name": "Engineering"}
            }))
            .unwrap();
            assert_eq!(group.is_native(), native, "{ty}");
        }
    }

    #[test]
    fn group_maps_to_canonical() {
        let group = OktaGroup::from_value(serde_json::json!({
            "id": "00g9",
            "type": "OKTA_GROUP",
            "profile": {"name": "SRE"}
        }))
        .unwrap();
        let canonical = group.to_group();
        assert_eq!(canonical.provider_group_id, "00g9");
        assert_eq!(canonical.name, "SRE");
        assert_eq!(canonical.description, "");
    }

    #[test]
    fn error_body_describes_code_summary_and_causes() {
        let body: OktaErrorBody = serde_json::from_str(
            r#"{"errorCode":"E0000001","errorSummary":"Api validation failed: login","errorCauses":[{"errorSummary":"login: An object with this field already exists"}]}"#,
        )
        .unwrap();
        assert_eq!(
            body.describe(),
            "E0000001: Api validation failed: login (login: An object with this field already exists)"
        );
    }
}
