use chrono::NaiveDate;
use std::time::Duration;

use crate::models::{BoxTariffResponse, ProblemDetails};

pub mod wb_client;
pub use wb_client::WbTariffsClient;

/// Failure classes of the tariff API client
#[derive(Debug, thiserror::Error)]
pub enum TariffApiError {
    /// 401, never retried
    #[error("unauthorized: {message}")]
    Unauthorized {
        message: String,
        problem: Option<ProblemDetails>,
    },

    /// 400, never retried
    #[error("bad request")]
    BadRequest { problem: Option<ProblemDetails> },

    /// 429 after the retry budget ran out
    #[error("rate limited and retries exhausted (retry after: {retry_after:?}s)")]
    RateLimited {
        retry_after: Option<u64>,
        problem: Option<ProblemDetails>,
    },

    /// 5xx or network/timeout failure after the retry budget ran out
    #[error("transient failure: {message}")]
    Transient { status: Option<u16>, message: String },

    /// Any other unexpected status
    #[error("API request failed with status {status}")]
    Api {
        status: u16,
        problem: Option<ProblemDetails>,
    },

    /// Successful status with a body that does not match the tariff shape
    #[error("failed to decode tariff response: {0}")]
    Decode(String),
}

impl TariffApiError {
    /// HTTP status associated with the failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            TariffApiError::Unauthorized { .. } => Some(401),
            TariffApiError::BadRequest { .. } => Some(400),
            TariffApiError::RateLimited { .. } => Some(429),
            TariffApiError::Transient { status, .. } => *status,
            TariffApiError::Api { status, .. } => Some(*status),
            TariffApiError::Decode(_) => None,
        }
    }

    pub fn problem(&self) -> Option<&ProblemDetails> {
        match self {
            TariffApiError::Unauthorized { problem, .. }
            | TariffApiError::BadRequest { problem }
            | TariffApiError::RateLimited { problem, .. }
            | TariffApiError::Api { problem, .. } => problem.as_ref(),
            TariffApiError::Transient { .. } | TariffApiError::Decode(_) => None,
        }
    }
}

/// Retry budget and exponential backoff for the tariff API
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(1000),
            backoff_max: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base_ms: u64, backoff_max_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_base: Duration::from_millis(backoff_base_ms),
            backoff_max: Duration::from_millis(backoff_max_ms),
        }
    }

    /// Exponential delay for the given failed attempt count (1-based), capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }

    /// Delay before retrying a 429; a positive Retry-After wins over backoff
    pub fn rate_limit_delay(&self, attempt: u32, retry_after: Option<u64>) -> Duration {
        match retry_after {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => self.backoff(attempt),
        }
    }
}

/// Non-blocking wait used between retry attempts
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Default sleeper backed by the tokio timer
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Source of box tariffs
#[async_trait::async_trait]
pub trait TariffProvider: Send + Sync {
    /// Fetch box tariffs for `date`, or for today in the local calendar when `None`
    async fn get_box_tariffs(
        &self,
        date: Option<NaiveDate>,
    ) -> Result<BoxTariffResponse, TariffApiError>;
}
