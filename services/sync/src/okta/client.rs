use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};

use super::models::OktaErrorBody;
use crate::pagination::{Page, PageSource, PaginationError};
use crate::rest::{RestClient, RestClientConfig, RestClientError};

#[derive(Debug, Clone)]
pub struct OktaClientConfig {
    pub base_url: String,
    pub api_token: String,
    pub page_size: u32,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

/// Okta management API client (`Authorization: SSWS <token>`).
#[derive(Clone)]
pub struct OktaClient {
    rest: RestClient,
    page_size: u32,
}

impl OktaClient {
    pub fn new(config: OktaClientConfig) -> Result<Self, RestClientError> {
        let rest_config = RestClientConfig::new(
            &config.base_url,
            config.max_retries,
            Duration::from_secs(config.timeout_secs),
        );
        let rest = RestClient::new(
            rest_config,
            AUTHORIZATION,
            &format!("SSWS {}", config.api_token),
        )?;
        Ok(Self {
            rest,
            page_size: config.page_size,
        })
    }

    pub fn users_url(&self) -> String {
        self.rest.url(&format!(
            "/api/v1/users?limit={}&filter=status%20eq%20%22ACTIVE%22",
            self.page_size
        ))
    }

    pub fn groups_url(&self) -> String {
        self.rest
            .url(&format!("/api/v1/groups?limit={}", self.page_size))
    }

    pub fn group_members_url(&self, group_id: &str) -> String {
        self.rest.url(&format!(
            "/api/v1/groups/{group_id}/users?limit={}",
            self.page_size
        ))
    }

    fn membership_url(&self, group_id: &str, user_id: &str) -> String {
        self.rest
            .url(&format!("/api/v1/groups/{group_id}/users/{user_id}"))
    }

    /// Cheapest authenticated read: one user.
    pub async fn verify(&self) -> Result<(), String> {
        self.rest
            .get_page(&self.rest.url("/api/v1/users?limit=1"))
            .await
            .map(|_| ())
            .map_err(decode_error)
    }

    /// `PUT` is idempotent in Okta: an existing member yields 204 as well.
    pub async fn add_member(&self, group_id: &str, user_id: &str) -> Result<(), String> {
        self.rest
            .execute(Method::PUT, &self.membership_url(group_id, user_id))
            .await
            .map(|_| ())
            .map_err(decode_error)
    }

    /// Ensures the user is absent. A 404 means the membership is already gone.
    pub async fn remove_member(&self, group_id: &str, user_id: &str) -> Result<(), String> {
        match self
            .rest
            .execute(Method::DELETE, &self.membership_url(group_id, user_id))
            .await
        {
            Ok(_) => Ok(()),
            Err(RestClientError::HttpError { status, .. }) if status == StatusCode::NOT_FOUND => {
                tracing::debug!(group_id, user_id, "okta membership already absent");
                Ok(())
            }
            Err(e) => Err(decode_error(e)),
        }
    }
}

#[async_trait]
impl PageSource for OktaClient {
    async fn fetch_page(&self, url: &str) -> Result<Page, PaginationError> {
        self.rest
            .get_page(url)
            .await
            .map_err(|e| PaginationError::Fetch(decode_error(e)))
    }
}

/// Prefer Okta's own error summary; fall back to status plus raw body.
pub fn decode_error(err: RestClientError) -> String {
    match &err {
        RestClientError::HttpError { body, .. } => {
            match serde_json::from_str::<OktaErrorBody>(body) {
                Ok(parsed) if !parsed.error_summary.is_empty() => parsed.describe(),
                _ => err.to_string(),
            }
        }
        _ => err.to_string(),
    }
}
