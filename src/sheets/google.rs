use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use super::{SheetsApi, SheetsError};
use crate::models::GoogleCredentialsSource;

const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const PROBE_SPREADSHEET_ID: &str = "tariff-sync-health-probe";

/// Service account key file (only the fields needed for the JWT grant)
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Load the key from base64 JSON or from a file path
    pub fn load(source: &GoogleCredentialsSource) -> Result<Self> {
        let json = match source {
            GoogleCredentialsSource::Base64(encoded) => {
                let bytes = general_purpose::STANDARD
                    .decode(encoded.trim())
                    .context("GOOGLE_SA_CREDENTIALS is not valid base64")?;
                String::from_utf8(bytes).context("GOOGLE_SA_CREDENTIALS is not UTF-8")?
            }
            GoogleCredentialsSource::Path(path) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read service account file {}", path))?,
        };

        serde_json::from_str(&json).context("invalid service account JSON")
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct StoredToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Google Sheets v4 client authenticated as a service account
pub struct GoogleSheetsClient {
    client: Client,
    base_url: String,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    current_token: Arc<Mutex<Option<StoredToken>>>,
}

impl GoogleSheetsClient {
    pub fn new(source: &GoogleCredentialsSource) -> Result<Self> {
        Self::from_key(ServiceAccountKey::load(source)?)
    }

    pub fn from_key(key: ServiceAccountKey) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| anyhow!("invalid service account private key: {}", e))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("tariff-sync/1.0")
            .build()?;

        Ok(Self {
            client,
            base_url: SHEETS_BASE_URL.to_string(),
            key,
            encoding_key,
            current_token: Arc::new(Mutex::new(None)),
        })
    }

    /// Point the client at a different Sheets API host
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Get access token, exchanging a fresh JWT when the cached one is about to expire
    async fn get_access_token(&self) -> Result<String, SheetsError> {
        let mut guard = self.current_token.lock().await;
        if let Some(token) = &*guard {
            if token.expires_at > Utc::now() + chrono::Duration::minutes(1) {
                return Ok(token.access_token.clone());
            }
        }

        let token = self.exchange_jwt().await?;
        let access_token = token.access_token.clone();
        *guard = Some(token);
        Ok(access_token)
    }

    async fn exchange_jwt(&self) -> Result<StoredToken, SheetsError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
        };

        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| SheetsError::Auth(format!("failed to sign JWT: {}", e)))?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| SheetsError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SheetsError::Auth(format!("token exchange failed with {}: {}", status, error_text)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SheetsError::Decode(e.to_string()))?;

        info!("Obtained Google access token for {}", self.key.client_email);
        Ok(StoredToken {
            access_token: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, SheetsError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| SheetsError::Transport(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| SheetsError::Transport(format!("invalid base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Turn a non-success response into an error, reading Google's `error.message`
async fn error_from_response(response: Response) -> SheetsError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or(body);

    SheetsError::Http {
        status: status.as_u16(),
        message,
    }
}

#[async_trait::async_trait]
impl SheetsApi for GoogleSheetsClient {
    async fn find_sheet_id(&self, spreadsheet_id: &str, title: &str) -> Result<Option<i64>, SheetsError> {
        let token = self.get_access_token().await?;
        let url = self.url(&["v4", "spreadsheets", spreadsheet_id])?;

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(&[("fields", "sheets.properties(sheetId,title)")])
            .send()
            .await
            .map_err(|e| SheetsError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: Value = response.json().await.map_err(|e| SheetsError::Decode(e.to_string()))?;
        let sheet_id = body
            .get("sheets")
            .and_then(|s| s.as_array())
            .into_iter()
            .flatten()
            .filter_map(|sheet| sheet.get("properties"))
            .find(|props| props.get("title").and_then(|t| t.as_str()) == Some(title))
            .and_then(|props| props.get("sheetId").and_then(|id| id.as_i64()));

        debug!("Sheet {} in {}: {:?}", title, spreadsheet_id, sheet_id);
        Ok(sheet_id)
    }

    async fn add_sheet(&self, spreadsheet_id: &str, title: &str) -> Result<i64, SheetsError> {
        let token = self.get_access_token().await?;
        let batch_update = format!("{}:batchUpdate", spreadsheet_id);
        let url = self.url(&["v4", "spreadsheets", batch_update.as_str()])?;
        let body = json!({
            "requests": [{ "addSheet": { "properties": { "title": title } } }]
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SheetsError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return match error_from_response(response).await {
                SheetsError::Http { status, message }
                    if status == StatusCode::BAD_REQUEST.as_u16() && message.contains("already exists") =>
                {
                    Err(SheetsError::AlreadyExists)
                }
                other => Err(other),
            };
        }

        let reply: Value = response.json().await.map_err(|e| SheetsError::Decode(e.to_string()))?;
        reply
            .pointer("/replies/0/addSheet/properties/sheetId")
            .and_then(|id| id.as_i64())
            .ok_or_else(|| SheetsError::Decode("addSheet reply without sheetId".to_string()))
    }

    async fn write_values(&self, spreadsheet_id: &str, range: &str, values: &[Vec<Value>]) -> Result<(), SheetsError> {
        let token = self.get_access_token().await?;
        let url = self.url(&["v4", "spreadsheets", spreadsheet_id, "values", range])?;
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": values,
        });

        let response = self
            .client
            .put(url)
            .bearer_auth(token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&body)
            .send()
            .await
            .map_err(|e| SheetsError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }

    /// A lookup of a spreadsheet that does not exist. Client-error answers
    /// (400/401/403/404) still prove the API is reachable.
    async fn probe(&self) -> Result<(), SheetsError> {
        let token = self.get_access_token().await?;
        let url = self.url(&["v4", "spreadsheets", PROBE_SPREADSHEET_ID])?;

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(&[("fields", "spreadsheetId")])
            .send()
            .await
            .map_err(|e| SheetsError::Transport(e.to_string()))?;

        match response.status().as_u16() {
            200..=299 | 400 | 401 | 403 | 404 => Ok(()),
            _ => Err(error_from_response(response).await),
        }
    }
}
