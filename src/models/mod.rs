use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Warehouse identity as stored in the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: i64,
    pub warehouse_name: String,
    pub geo_name: String,
}

/// One warehouse's tariff snapshot for one calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TariffRecord {
    pub warehouse_id: i64,
    pub day: NaiveDate,
    pub fetched_at: DateTime<Utc>,
    pub dt_next_box: Option<String>,
    pub dt_till_max: Option<String>,
    pub box_delivery_base: Option<f64>,
    pub box_delivery_coef_expr: Option<f64>,
    pub box_delivery_liter: Option<f64>,
    pub box_delivery_marketplace_base: Option<f64>,
    pub box_delivery_marketplace_coef_expr: Option<f64>,
    pub box_delivery_marketplace_liter: Option<f64>,
    pub box_storage_base: Option<f64>,
    pub box_storage_coef_expr: Option<f64>,
    pub box_storage_liter: Option<f64>,
}

/// Tariff row joined with its warehouse attributes, as read back for export
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestTariffRow {
    pub warehouse_name: Option<String>,
    pub geo_name: Option<String>,
    pub record: TariffRecord,
}

// ============================================================================
// Upstream tariff API payloads
// ============================================================================

/// Envelope returned by `GET /tariffs/box`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxTariffResponse {
    pub response: BoxTariffEnvelope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxTariffEnvelope {
    pub data: TariffData,
}

/// Tariffs for all warehouses on one date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TariffData {
    #[serde(rename = "dtNextBox", default)]
    pub dt_next_box: Option<String>,
    #[serde(rename = "dtTillMax", default)]
    pub dt_till_max: Option<String>,
    #[serde(rename = "warehouseList", default)]
    pub warehouse_list: Vec<WarehouseTariff>,
}

/// Per-warehouse box tariff, decimals arrive as comma-formatted strings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarehouseTariff {
    pub warehouse_name: String,
    pub geo_name: String,
    #[serde(default)]
    pub box_delivery_base: Option<String>,
    #[serde(default)]
    pub box_delivery_coef_expr: Option<String>,
    #[serde(default)]
    pub box_delivery_liter: Option<String>,
    #[serde(default)]
    pub box_delivery_marketplace_base: Option<String>,
    #[serde(default)]
    pub box_delivery_marketplace_coef_expr: Option<String>,
    #[serde(default)]
    pub box_delivery_marketplace_liter: Option<String>,
    #[serde(default)]
    pub box_storage_base: Option<String>,
    #[serde(default)]
    pub box_storage_coef_expr: Option<String>,
    #[serde(default)]
    pub box_storage_liter: Option<String>,
}

/// Structured error metadata returned by the tariff API.
///
/// Every field is optional; missing fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ProblemDetails {
    /// Best-effort extraction from a response body.
    ///
    /// Only fields of the expected JSON type are kept. Returns `None` when the
    /// body is not a JSON object.
    pub fn from_body(body: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        let obj = value.as_object()?;

        let text = |key: &str| obj.get(key).and_then(|v| v.as_str()).map(str::to_string);

        Some(ProblemDetails {
            title: text("title"),
            detail: text("detail"),
            code: text("code"),
            request_id: text("requestId"),
            origin: text("origin"),
            status: obj
                .get("status")
                .and_then(|v| v.as_u64())
                .and_then(|v| u16::try_from(v).ok()),
            timestamp: text("timestamp"),
        })
    }
}

// ============================================================================
// Configuration
// ============================================================================

pub const DEFAULT_WB_BASE_URL: &str = "https://common-api.wildberries.ru/api/v1";
pub const DEFAULT_FETCH_CRON: &str = "0 0 * * * *";

/// Where the Google service account key comes from
#[derive(Debug, Clone, PartialEq)]
pub enum GoogleCredentialsSource {
    /// Base64-encoded service account JSON
    Base64(String),
    /// Path to a service account JSON file
    Path(String),
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub wb_api_key: String,
    pub wb_base_url: String,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub database_path: String,
    pub app_port: u16,
    pub fetch_cron: String,
    pub google_credentials: Option<GoogleCredentialsSource>,
    pub seed_spreadsheet_ids: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let wb_api_key = std::env::var("WB_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("WB_API_KEY environment variable required"))?;

        let google_credentials = match (
            std::env::var("GOOGLE_SA_CREDENTIALS").ok().filter(|v| !v.is_empty()),
            std::env::var("GOOGLE_SA_PATH").ok().filter(|v| !v.is_empty()),
        ) {
            (Some(encoded), _) => Some(GoogleCredentialsSource::Base64(encoded)),
            (None, Some(path)) => Some(GoogleCredentialsSource::Path(path)),
            (None, None) => None,
        };

        Ok(Config {
            wb_api_key,
            wb_base_url: std::env::var("WB_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_WB_BASE_URL.to_string()),
            max_retries: env_number("WB_MAX_RETRIES", 3),
            backoff_base_ms: env_number("WB_BACKOFF_BASE_MS", 1000),
            backoff_max_ms: env_number("WB_BACKOFF_MAX_MS", 30_000),
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "tariffs.db".to_string()),
            app_port: env_number("APP_PORT", 5000),
            fetch_cron: std::env::var("FETCH_CRON")
                .unwrap_or_else(|_| DEFAULT_FETCH_CRON.to_string()),
            google_credentials,
            seed_spreadsheet_ids: parse_spreadsheet_ids(
                &std::env::var("SEED_SPREADSHEET_IDS").unwrap_or_default(),
            ),
        })
    }
}

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Split a comma-separated id list, dropping blanks
pub fn parse_spreadsheet_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}
