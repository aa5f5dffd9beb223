use serde_json::Value;

pub mod exporter;
pub mod google;

pub use exporter::{ExportSummary, SpreadsheetExporter, SHEET_TITLE};
pub use google::GoogleSheetsClient;

/// Failures talking to the spreadsheet API
#[derive(Debug, thiserror::Error)]
pub enum SheetsError {
    /// A sheet with the requested title exists already
    #[error("sheet already exists")]
    AlreadyExists,

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("sheets API returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("sheets request failed: {0}")]
    Transport(String),

    #[error("unexpected sheets response: {0}")]
    Decode(String),
}

/// Operations the exporter needs from a spreadsheet service
#[async_trait::async_trait]
pub trait SheetsApi: Send + Sync {
    /// Numeric id of the tab named `title`, if present
    async fn find_sheet_id(&self, spreadsheet_id: &str, title: &str) -> Result<Option<i64>, SheetsError>;

    /// Create a tab named `title`, returning its id
    async fn add_sheet(&self, spreadsheet_id: &str, title: &str) -> Result<i64, SheetsError>;

    /// Overwrite `range` with `values` (row-major, user-entered interpretation)
    async fn write_values(&self, spreadsheet_id: &str, range: &str, values: &[Vec<Value>]) -> Result<(), SheetsError>;

    /// Reachability and credential check
    async fn probe(&self) -> Result<(), SheetsError>;
}
