//! Normalization and idempotent persistence of fetched box tariffs.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};

use crate::database::DatabaseManager;
use crate::models::{BoxTariffResponse, LatestTariffRow, TariffRecord, WarehouseTariff};

/// Upper bound on concurrent per-warehouse upserts within one save
const MAX_CONCURRENT_UPSERTS: usize = 4;

/// A decimal string from upstream that could not be converted
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid decimal value {value:?} in field {field}")]
pub struct DecimalParseError {
    pub field: &'static str,
    pub value: String,
}

/// Convert an upstream comma-decimal string to a number.
///
/// `","` is the decimal separator. Missing values, blanks, `NaN` and the
/// upstream `-` placeholder mean "no value". Anything else that is not a
/// finite number is an error.
pub fn parse_decimal(field: &'static str, raw: Option<&str>) -> Result<Option<f64>, DecimalParseError> {
    let trimmed = match raw.map(str::trim) {
        None | Some("") | Some("-") => return Ok(None),
        Some(value) if value.eq_ignore_ascii_case("nan") => return Ok(None),
        Some(value) => value,
    };

    let normalized = trimmed.replace(',', ".");
    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(DecimalParseError {
            field,
            value: trimmed.to_string(),
        }),
    }
}

/// Outcome of one save
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveSummary {
    pub saved: usize,
    pub skipped: usize,
}

/// Writes warehouses and tariffs, reads back the latest day
#[derive(Clone)]
pub struct TariffStorage {
    database: Arc<DatabaseManager>,
}

impl TariffStorage {
    pub fn new(database: Arc<DatabaseManager>) -> Self {
        Self { database }
    }

    /// Persist every warehouse entry of `response` under `day`.
    ///
    /// Entries with malformed decimals are skipped and reported; database
    /// failures abort the save.
    pub async fn save_tariffs(&self, response: &BoxTariffResponse, day: NaiveDate) -> Result<SaveSummary> {
        let data = &response.response.data;
        let fetched_at = Utc::now();

        info!("Saving {} warehouse tariffs for {}", data.warehouse_list.len(), day);

        let results: Vec<Result<bool>> = stream::iter(data.warehouse_list.iter().cloned())
            .map(|entry| {
                let database = self.database.clone();
                let dt_next_box = data.dt_next_box.clone();
                let dt_till_max = data.dt_till_max.clone();

                async move {
                    // warehouse id is filled in once the entry is known to be valid
                    let mut record = match build_record(&entry, 0, day, fetched_at, dt_next_box, dt_till_max) {
                        Ok(record) => record,
                        Err(e) => {
                            warn!(
                                "Skipping tariff for {} ({}): {}",
                                entry.warehouse_name, entry.geo_name, e
                            );
                            return Ok(false);
                        }
                    };

                    let warehouse = database
                        .resolve_warehouse(&entry.warehouse_name, &entry.geo_name)
                        .await?;
                    record.warehouse_id = warehouse.id;

                    database.upsert_tariff(&record).await?;
                    Ok::<bool, anyhow::Error>(true)
                }
            })
            .buffer_unordered(MAX_CONCURRENT_UPSERTS)
            .collect()
            .await;

        let mut summary = SaveSummary::default();
        for result in results {
            if result? {
                summary.saved += 1;
            } else {
                summary.skipped += 1;
            }
        }

        info!("Saved {} tariffs for {} ({} skipped)", summary.saved, day, summary.skipped);
        Ok(summary)
    }

    /// Tariffs stored for `day`, newest fetch first, then by storage coefficient
    pub async fn get_latest_tariffs(&self, day: NaiveDate) -> Result<Vec<LatestTariffRow>> {
        self.database.get_latest_tariffs(day).await
    }
}

fn build_record(
    entry: &WarehouseTariff,
    warehouse_id: i64,
    day: NaiveDate,
    fetched_at: chrono::DateTime<Utc>,
    dt_next_box: Option<String>,
    dt_till_max: Option<String>,
) -> Result<TariffRecord, DecimalParseError> {
    Ok(TariffRecord {
        warehouse_id,
        day,
        fetched_at,
        dt_next_box,
        dt_till_max,
        box_delivery_base: parse_decimal("boxDeliveryBase", entry.box_delivery_base.as_deref())?,
        box_delivery_coef_expr: parse_decimal("boxDeliveryCoefExpr", entry.box_delivery_coef_expr.as_deref())?,
        box_delivery_liter: parse_decimal("boxDeliveryLiter", entry.box_delivery_liter.as_deref())?,
        box_delivery_marketplace_base: parse_decimal(
            "boxDeliveryMarketplaceBase",
            entry.box_delivery_marketplace_base.as_deref(),
        )?,
        box_delivery_marketplace_coef_expr: parse_decimal(
            "boxDeliveryMarketplaceCoefExpr",
            entry.box_delivery_marketplace_coef_expr.as_deref(),
        )?,
        box_delivery_marketplace_liter: parse_decimal(
            "boxDeliveryMarketplaceLiter",
            entry.box_delivery_marketplace_liter.as_deref(),
        )?,
        box_storage_base: parse_decimal("boxStorageBase", entry.box_storage_base.as_deref())?,
        box_storage_coef_expr: parse_decimal("boxStorageCoefExpr", entry.box_storage_coef_expr.as_deref())?,
        box_storage_liter: parse_decimal("boxStorageLiter", entry.box_storage_liter.as_deref())?,
    })
}
