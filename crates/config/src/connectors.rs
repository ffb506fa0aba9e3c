use std::fmt;

use strata_common::error::StrataResult;

use crate::credentials::CredentialRef;
use crate::env::{get_flag, get_optional, parse_var_or};

/// Providers this build knows how to sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Okta,
    GitLab,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Okta, ProviderKind::GitLab];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Okta => "okta",
            Self::GitLab => "gitlab",
        }
    }

    /// Prefix of this provider's environment variables.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::Okta => "OKTA",
            Self::GitLab => "GITLAB",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub credential: Option<CredentialRef>,
    pub sync_interval_secs: u64,
    pub write_back_enabled: bool,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: None,
            credential: None,
            sync_interval_secs: 3600,
            write_back_enabled: false,
            max_retries: 3,
            timeout_secs: 30,
        }
    }
}

impl ConnectorConfig {
    /// Load one provider's settings from `<PREFIX>_*` variables.
    ///
    /// Endpoint and credential stay optional here; a connector that lacks
    /// them fails at connect time, not at startup.
    pub fn from_env(kind: ProviderKind) -> StrataResult<Self> {
        let prefix = kind.env_prefix();
        let key = |name: &str| format!("{prefix}_{name}");

        let credential = get_optional(&key("CREDENTIAL"))
            .map(|raw| raw.parse::<CredentialRef>())
            .transpose()?;

        Ok(Self {
            enabled: get_flag(&key("ENABLED"), false)?,
            base_url: get_optional(&key("BASE_URL"))
                .map(|url| url.trim_end_matches('/').to_owned()),
            credential,
            sync_interval_secs: parse_var_or(&key("SYNC_INTERVAL_SECS"), 3600)?,
            write_back_enabled: get_flag(&key("WRITE_BACK_ENABLED"), false)?,
            max_retries: parse_var_or(&key("MAX_RETRIES"), 3)?,
            timeout_secs: parse_var_or(&key("TIMEOUT_SECS"), 30)?,
        })
    }
}

/// Per-provider settings for the whole process, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    pub providers: Vec<(ProviderKind, ConnectorConfig)>,
}

impl SyncConfig {
    pub fn from_env() -> StrataResult<Self> {
        let _ = dotenvy::dotenv();

        let providers = ProviderKind::ALL
            .iter()
            .map(|kind| ConnectorConfig::from_env(*kind).map(|cfg| (*kind, cfg)))
            .collect::<StrataResult<Vec<_>>>()?;

        Ok(Self { providers })
    }

    pub fn enabled(&self) -> impl Iterator<Item = &(ProviderKind, ConnectorConfig)> {
        self.providers.iter().filter(|(_, cfg)| cfg.enabled)
    }
}
