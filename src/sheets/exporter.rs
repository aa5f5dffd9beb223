//! Publishes today's stored tariffs to every registered spreadsheet.

use anyhow::{anyhow, Result};
use chrono::{Local, NaiveDate};
use serde_json::{Number, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{SheetsApi, SheetsError};
use crate::database::DatabaseManager;
use crate::models::LatestTariffRow;
use crate::tariff_storage::TariffStorage;

/// Tab that receives the export in every destination
pub const SHEET_TITLE: &str = "stocks_coefs";

/// Column labels of the exported table
pub const HEADER: [&str; 15] = [
    "Дата",
    "Время выгрузки",
    "Следующий бокс",
    "Действует до",
    "Название склада",
    "Местоположение",
    "Базовая стоимость доставки",
    "Коэф. доставки",
    "За литр доставки",
    "Базовая доставка маркетплейс",
    "Коэф. доставки маркетплейс",
    "За литр доставки маркетплейс",
    "Базовая стоимость хранения",
    "Коэф. хранения",
    "За литр хранения",
];

const FETCHED_AT_FORMAT: &str = "%d.%m.%Y, %H:%M:%S";

/// Outcome of one export pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSummary {
    pub destinations: usize,
    pub rows: usize,
    pub updated: usize,
    pub failed: Vec<String>,
}

/// Blank for missing or non-finite values, a JSON number otherwise
pub fn normalize_cell(value: Option<f64>) -> Value {
    value
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(String::new()))
}

fn text_cell(value: Option<&str>) -> Value {
    Value::String(value.unwrap_or_default().to_string())
}

/// Header row followed by one row per stored tariff, in storage order
pub fn build_table(rows: &[LatestTariffRow]) -> Vec<Vec<Value>> {
    let mut table = Vec::with_capacity(rows.len() + 1);
    table.push(HEADER.iter().map(|label| Value::String(label.to_string())).collect());

    for row in rows {
        let r = &row.record;
        table.push(vec![
            Value::String(r.day.format("%Y-%m-%d").to_string()),
            Value::String(r.fetched_at.with_timezone(&Local).format(FETCHED_AT_FORMAT).to_string()),
            text_cell(r.dt_next_box.as_deref()),
            text_cell(r.dt_till_max.as_deref()),
            text_cell(row.warehouse_name.as_deref()),
            text_cell(row.geo_name.as_deref()),
            normalize_cell(r.box_delivery_base),
            normalize_cell(r.box_delivery_coef_expr),
            normalize_cell(r.box_delivery_liter),
            normalize_cell(r.box_delivery_marketplace_base),
            normalize_cell(r.box_delivery_marketplace_coef_expr),
            normalize_cell(r.box_delivery_marketplace_liter),
            normalize_cell(r.box_storage_base),
            normalize_cell(r.box_storage_coef_expr),
            normalize_cell(r.box_storage_liter),
        ]);
    }

    table
}

pub struct SpreadsheetExporter {
    database: Arc<DatabaseManager>,
    storage: TariffStorage,
    sheets: Option<Arc<dyn SheetsApi>>,
}

impl SpreadsheetExporter {
    pub fn new(database: Arc<DatabaseManager>, storage: TariffStorage, sheets: Option<Arc<dyn SheetsApi>>) -> Self {
        Self {
            database,
            storage,
            sheets,
        }
    }

    pub fn sheets(&self) -> Option<&Arc<dyn SheetsApi>> {
        self.sheets.as_ref()
    }

    /// Export today's (local calendar) tariffs
    pub async fn export_tariffs_to_sheets(&self) -> Result<ExportSummary> {
        self.export_day(Local::now().date_naive()).await
    }

    /// Write the tariffs of `day` to every registered spreadsheet.
    ///
    /// A failing destination is logged and reported in the summary, the rest
    /// are still written.
    pub async fn export_day(&self, day: NaiveDate) -> Result<ExportSummary> {
        let ids = self.database.list_spreadsheets().await?;
        if ids.is_empty() {
            info!("No spreadsheets registered, nothing to export");
            return Ok(ExportSummary::default());
        }

        let rows = self.storage.get_latest_tariffs(day).await?;
        if rows.is_empty() {
            info!("No tariffs stored for {}, nothing to export", day);
            return Ok(ExportSummary {
                destinations: ids.len(),
                ..ExportSummary::default()
            });
        }

        let sheets = self
            .sheets
            .as_ref()
            .ok_or_else(|| anyhow!("Google service account credentials are not configured"))?;

        let table = build_table(&rows);
        let mut summary = ExportSummary {
            destinations: ids.len(),
            rows: rows.len(),
            ..ExportSummary::default()
        };

        for spreadsheet_id in ids {
            match export_to_spreadsheet(sheets.as_ref(), &spreadsheet_id, &table).await {
                Ok(()) => {
                    info!("Updated spreadsheet {} with {} rows", spreadsheet_id, rows.len());
                    summary.updated += 1;
                }
                Err(e) => {
                    error!("Failed to update spreadsheet {}: {}", spreadsheet_id, e);
                    summary.failed.push(spreadsheet_id);
                }
            }
        }

        Ok(summary)
    }
}

async fn export_to_spreadsheet(sheets: &dyn SheetsApi, spreadsheet_id: &str, table: &[Vec<Value>]) -> Result<(), SheetsError> {
    ensure_sheet(sheets, spreadsheet_id).await?;
    let range = format!("{}!A1", SHEET_TITLE);
    sheets.write_values(spreadsheet_id, &range, table).await
}

/// Find the export tab, creating it if missing. A concurrent creator winning
/// the race is resolved by looking the tab up again.
async fn ensure_sheet(sheets: &dyn SheetsApi, spreadsheet_id: &str) -> Result<i64, SheetsError> {
    if let Some(sheet_id) = sheets.find_sheet_id(spreadsheet_id, SHEET_TITLE).await? {
        return Ok(sheet_id);
    }

    match sheets.add_sheet(spreadsheet_id, SHEET_TITLE).await {
        Ok(sheet_id) => {
            info!("Created sheet {} in {}", SHEET_TITLE, spreadsheet_id);
            Ok(sheet_id)
        }
        Err(SheetsError::AlreadyExists) => {
            warn!("Sheet {} appeared in {} concurrently", SHEET_TITLE, spreadsheet_id);
            sheets
                .find_sheet_id(spreadsheet_id, SHEET_TITLE)
                .await?
                .ok_or_else(|| SheetsError::Decode(format!("sheet {} missing after create conflict", SHEET_TITLE)))
        }
        Err(e) => Err(e),
    }
}
