use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderName;

use super::models::describe_error_body;
use crate::pagination::{Page, PageSource, PaginationError};
use crate::rest::{RestClient, RestClientConfig, RestClientError};

const PER_PAGE: u32 = 100;

#[derive(Debug, Clone)]
pub struct GitLabClientConfig {
    pub base_url: String,
    pub private_token: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

#[derive(Clone)]
pub struct GitLabClient {
    rest: RestClient,
}

impl GitLabClient {
    pub fn new(config: GitLabClientConfig) -> Result<Self, RestClientError> {
        let rest_config = RestClientConfig::new(
            &config.base_url,
            config.max_retries,
            Duration::from_secs(config.timeout_secs),
        );
        let rest = RestClient::new(
            rest_config,
            HeaderName::from_static("private-token"),
            &config.private_token,
        )?;
        Ok(Self { rest })
    }

    pub fn users_url(&self) -> String {
        self.rest
            .url(&format!("/api/v4/users?active=true&per_page={PER_PAGE}"))
    }

    pub fn groups_url(&self) -> String {
        self.rest.url(&format!("/api/v4/groups?per_page={PER_PAGE}"))
    }

    /// `GET /api/v4/user`: the token's own account.
    pub async fn verify(&self) -> Result<(), String> {
        self.rest
            .get_page(&self.rest.url("/api/v4/user"))
            .await
            .map(|_| ())
            .map_err(decode_error)
    }
}

#[async_trait]
impl PageSource for GitLabClient {
    async fn fetch_page(&self, url: &str) -> Result<Page, PaginationError> {
        self.rest
            .get_page(url)
            .await
            .map_err(|e| PaginationError::Fetch(decode_error(e)))
    }
}

pub fn decode_error(err: RestClientError) -> String {
    match &err {
        RestClientError::HttpError { status, body } => match describe_error_body(body) {
            Some(message) => format!("HTTP {status}: {message}"),
            None => err.to_string(),
        },
        _ => err.to_string(),
    }
}
