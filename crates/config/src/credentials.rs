use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use strata_common::error::{StrataError, StrataResult};

/// Where a connector finds its API credential.
///
/// Parsed from config as `env:VAR_NAME`, `file:/path/to/token`, or a literal
/// token. Resolution is deferred until the connector connects.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialRef {
    Env(String),
    File(PathBuf),
    Inline(String),
}

impl CredentialRef {
    pub async fn resolve(&self) -> StrataResult<String> {
        let value = match self {
            Self::Env(var) => std::env::var(var).map_err(|_| {
                StrataError::Credential(format!("credential variable {var} is not set"))
            })?,
            Self::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                StrataError::Credential(format!(
                    "credential file {} is unreadable: {e}",
                    path.display()
                ))
            })?,
            Self::Inline(token) => token.clone(),
        };

        let value = value.trim().to_owned();
        if value.is_empty() {
            return Err(StrataError::Credential(format!("credential {self:?} is empty")));
        }
        Ok(value)
    }
}

impl FromStr for CredentialRef {
    type Err = StrataError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if let Some(var) = raw.strip_prefix("env:") {
            if var.is_empty() {
                return Err(StrataError::Config("empty env: credential reference".into()));
            }
            return Ok(Self::Env(var.to_owned()));
        }
        if let Some(path) = raw.strip_prefix("file:") {
            if path.is_empty() {
                return Err(StrataError::Config("empty file: credential reference".into()));
            }
            return Ok(Self::File(PathBuf::from(path)));
        }
        if raw.is_empty() {
            return Err(StrataError::Config("empty credential reference".into()));
        }
        Ok(Self::Inline(raw.to_owned()))
    }
}

// Inline tokens must never reach the logs.
impl fmt::Debug for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Env(var) => write!(f, "env:{var}"),
            Self::File(path) => write!(f, "file:{}", path.display()),
            Self::Inline(_) => f.write_str("inline:<redacted>"),
        }
    }
}
