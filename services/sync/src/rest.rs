use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue, LINK};
use reqwest::{Client, Method, Response, StatusCode};

use crate::pagination::Page;

#[derive(Debug, Clone)]
pub struct RestClientConfig {
    pub base_url: String,
    pub max_retries: u32,
    pub timeout: Duration,
    /// Unit of the exponential backoff between retries.
    pub backoff_unit: Duration,
}

impl RestClientConfig {
    pub fn new(base_url: &str, max_retries: u32, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            max_retries,
            timeout,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RestClientError {
    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },

    #[error("invalid credential header: {0}")]
    InvalidCredential(String),
}

/// Pooled HTTP client for one provider: fixed auth header, per-request
/// timeout, retries on timeouts, connect errors, 429 and 5xx.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    config: RestClientConfig,
    auth_name: HeaderName,
    auth_value: HeaderValue,
}

impl RestClient {
    pub fn new(
        config: RestClientConfig,
        auth_name: HeaderName,
        auth_value: &str,
    ) -> Result<Self, RestClientError> {
        let mut auth_value = HeaderValue::from_str(auth_value)
            .map_err(|e| RestClientError::InvalidCredential(e.to_string()))?;
        auth_value.set_sensitive(true);

        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            auth_name,
            auth_value,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// GET one page and keep its `Link` header for the paginator.
    pub async fn get_page(&self, url: &str) -> Result<Page, RestClientError> {
        let response = self.request_with_retry(Method::GET, url).await?;
        let link = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response.json::<serde_json::Value>().await?;
        Ok(Page { body, link })
    }

    /// Issue a body-less request and discard the success body.
    pub async fn execute(&self, method: Method, url: &str) -> Result<StatusCode, RestClientError> {
        let response = self.request_with_retry(method, url).await?;
        Ok(response.status())
    }

    async fn request_with_retry(
        &self,
        method: Method,
        url: &str,
    ) -> Result<Response, RestClientError> {
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = self.config.backoff_unit * backoff_factor(attempt);
                tracing::warn!(attempt, backoff_ms = backoff.as_millis() as u64, "retrying after backoff");
                tokio::time::sleep(backoff).await;
            }

            let response = match self
                .client
                .request(method.clone(), url)
                .header(self.auth_name.clone(), self.auth_value.clone())
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() || e.is_connect() {
                        continue;
                    }
                    return Err(RestClientError::RequestError(e));
                }
            };

            let status = response.status();

            if status.is_success() {
                return Ok(response);
            }

            // Honor Retry-After header for 429
            if status == StatusCode::TOO_MANY_REQUESTS {
                if let Some(retry_after) = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                {
                    let wait = std::cmp::min(retry_after, 60);
                    tracing::warn!(wait, "rate-limited, waiting Retry-After");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                last_error = "429 Too Many Requests".to_string();
                continue;
            }

            // Retry on 5xx
            if status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                last_error = format!("{status}: {body}");
                continue;
            }

            // Fail fast on 4xx (except 429 handled above)
            let body = response.text().await.unwrap_or_default();
            return Err(RestClientError::HttpError { status, body });
        }

        Err(RestClientError::MaxRetriesExceeded {
            attempts: self.config.max_retries.saturating_add(1),
            last_error,
        })
    }
}

/// Doubling multiplier of the backoff unit, capped at 30.
fn backoff_factor(attempt: u32) -> u32 {
    (1u32 << attempt.min(5)).min(30)
}
