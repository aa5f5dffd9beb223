use anyhow::Result;
use chrono::{Local, NaiveDate};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER},
    Client,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{RetryPolicy, Sleeper, TariffApiError, TariffProvider, TokioSleeper};
use crate::models::{BoxTariffResponse, Config, ProblemDetails};

/// Fixed network timeout for every attempt
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Wildberries common API client for box tariffs
pub struct WbTariffsClient {
    client: Client,
    base_url: String,
    api_key: HeaderValue,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl WbTariffsClient {
    /// Create a new client from application configuration
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_settings(
            &config.wb_base_url,
            &config.wb_api_key,
            RetryPolicy::new(config.max_retries, config.backoff_base_ms, config.backoff_max_ms),
        )
    }

    pub fn with_settings(base_url: &str, api_key: &str, retry: RetryPolicy) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(anyhow::anyhow!("WB API key must not be empty"));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("tariff-sync/1.0")
            .build()?;

        let mut api_key = HeaderValue::from_str(api_key)?;
        api_key.set_sensitive(true);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the wait strategy used between attempts
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// GET with retries for rate limits and transient failures.
    ///
    /// 401 and 400 fail at once. 429 honours `Retry-After`, falling back to the
    /// exponential backoff. 5xx and transport errors use the backoff only.
    async fn request_with_retry<T>(&self, url: &str, query: &[(&str, String)]) -> Result<T, TariffApiError>
    where
        T: DeserializeOwned,
    {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, self.api_key.clone());
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut attempt: u32 = 0;

        loop {
            info!("[WB API] Requesting {} {:?}", url, query);

            let response = match self
                .client
                .get(url)
                .headers(headers.clone())
                .query(query)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    attempt += 1;
                    let message = if e.is_timeout() {
                        format!("request timed out: {}", e)
                    } else {
                        format!("network error: {}", e)
                    };

                    if attempt > self.retry.max_retries {
                        return Err(TariffApiError::Transient { status: None, message });
                    }

                    let wait = self.retry.backoff(attempt);
                    warn!(
                        "{} (attempt {}/{}), retrying in {:?}",
                        message,
                        attempt,
                        self.retry.max_retries + 1,
                        wait
                    );
                    self.sleeper.sleep(wait).await;
                    continue;
                }
            };

            let status = response.status();

            if status.is_success() {
                let body = response
                    .text()
                    .await
                    .map_err(|e| TariffApiError::Decode(e.to_string()))?;
                debug!("API response received: {} bytes", body.len());
                return serde_json::from_str(&body).map_err(|e| TariffApiError::Decode(e.to_string()));
            }

            attempt += 1;
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            let problem = ProblemDetails::from_body(&body);

            match status.as_u16() {
                401 => {
                    let message = problem
                        .as_ref()
                        .and_then(|p| p.detail.clone().or_else(|| p.title.clone()))
                        .unwrap_or_else(|| "Unauthorized".to_string());
                    return Err(TariffApiError::Unauthorized { message, problem });
                }
                400 => return Err(TariffApiError::BadRequest { problem }),
                429 => {
                    if attempt > self.retry.max_retries {
                        return Err(TariffApiError::RateLimited { retry_after, problem });
                    }

                    let wait = self.retry.rate_limit_delay(attempt, retry_after);
                    warn!(
                        "Rate limited (429) on attempt {}/{}, retrying in {:?}",
                        attempt,
                        self.retry.max_retries + 1,
                        wait
                    );
                    self.sleeper.sleep(wait).await;
                }
                code if status.is_server_error() => {
                    if attempt > self.retry.max_retries {
                        return Err(TariffApiError::Transient {
                            status: Some(code),
                            message: format!("server error {}: {}", status, body),
                        });
                    }

                    let wait = self.retry.backoff(attempt);
                    warn!(
                        "Server error {} on attempt {}/{}, retrying in {:?}",
                        status,
                        attempt,
                        self.retry.max_retries + 1,
                        wait
                    );
                    self.sleeper.sleep(wait).await;
                }
                code => return Err(TariffApiError::Api { status: code, problem }),
            }
        }
    }
}

#[async_trait::async_trait]
impl TariffProvider for WbTariffsClient {
    async fn get_box_tariffs(
        &self,
        date: Option<NaiveDate>,
    ) -> Result<BoxTariffResponse, TariffApiError> {
        let date = date.unwrap_or_else(|| Local::now().date_naive());
        let url = format!("{}/tariffs/box", self.base_url);

        self.request_with_retry(&url, &[("date", date.format("%Y-%m-%d").to_string())])
            .await
    }
}

/// Retry-After in whole seconds, if present and numeric
fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}
