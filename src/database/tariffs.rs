use anyhow::Result;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;

use super::DatabaseManager;
use crate::models::{LatestTariffRow, TariffRecord};

impl DatabaseManager {
    /// Insert a tariff, or overwrite the existing one for the same (warehouse_id, day)
    pub async fn upsert_tariff(&self, record: &TariffRecord) -> Result<()> {
        debug!("Upsert tariff for warehouse id={}, day={}", record.warehouse_id, record.day);

        sqlx::query(
            r#"
            INSERT INTO tariffs (
                warehouse_id, day, fetched_at, dt_next_box, dt_till_max,
                box_delivery_base, box_delivery_coef_expr, box_delivery_liter,
                box_delivery_marketplace_base, box_delivery_marketplace_coef_expr, box_delivery_marketplace_liter,
                box_storage_base, box_storage_coef_expr, box_storage_liter
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(warehouse_id, day) DO UPDATE SET
                fetched_at = excluded.fetched_at,
                dt_next_box = excluded.dt_next_box,
                dt_till_max = excluded.dt_till_max,
                box_delivery_base = excluded.box_delivery_base,
                box_delivery_coef_expr = excluded.box_delivery_coef_expr,
                box_delivery_liter = excluded.box_delivery_liter,
                box_delivery_marketplace_base = excluded.box_delivery_marketplace_base,
                box_delivery_marketplace_coef_expr = excluded.box_delivery_marketplace_coef_expr,
                box_delivery_marketplace_liter = excluded.box_delivery_marketplace_liter,
                box_storage_base = excluded.box_storage_base,
                box_storage_coef_expr = excluded.box_storage_coef_expr,
                box_storage_liter = excluded.box_storage_liter,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(record.warehouse_id)
        .bind(record.day)
        .bind(record.fetched_at)
        .bind(&record.dt_next_box)
        .bind(&record.dt_till_max)
        .bind(record.box_delivery_base)
        .bind(record.box_delivery_coef_expr)
        .bind(record.box_delivery_liter)
        .bind(record.box_delivery_marketplace_base)
        .bind(record.box_delivery_marketplace_coef_expr)
        .bind(record.box_delivery_marketplace_liter)
        .bind(record.box_storage_base)
        .bind(record.box_storage_coef_expr)
        .bind(record.box_storage_liter)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Tariff stored for one warehouse on one day
    pub async fn get_tariff(&self, warehouse_id: i64, day: NaiveDate) -> Result<Option<TariffRecord>> {
        let row = sqlx::query("SELECT * FROM tariffs WHERE warehouse_id = ? AND day = ?")
            .bind(warehouse_id)
            .bind(day)
            .fetch_optional(self.pool())
            .await?;

        row.as_ref().map(tariff_from_row).transpose()
    }

    /// All tariffs of `day` joined with warehouse attributes.
    ///
    /// Ordered by fetch time (newest first), then by storage coefficient.
    pub async fn get_latest_tariffs(&self, day: NaiveDate) -> Result<Vec<LatestTariffRow>> {
        debug!("Loading tariffs for day {}", day);

        let rows = sqlx::query(
            r#"
            SELECT w.warehouse_name, w.geo_name, t.*
            FROM tariffs t
            LEFT JOIN warehouses w ON t.warehouse_id = w.id
            WHERE t.day = ?
            ORDER BY t.fetched_at DESC, t.box_storage_coef_expr ASC NULLS LAST
            "#,
        )
        .bind(day)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|r| -> Result<LatestTariffRow> {
                Ok(LatestTariffRow {
                    warehouse_name: r.try_get("warehouse_name")?,
                    geo_name: r.try_get("geo_name")?,
                    record: tariff_from_row(r)?,
                })
            })
            .collect()
    }
}

fn tariff_from_row(r: &SqliteRow) -> Result<TariffRecord> {
    Ok(TariffRecord {
        warehouse_id: r.try_get("warehouse_id")?,
        day: r.try_get("day")?,
        fetched_at: r.try_get("fetched_at")?,
        dt_next_box: r.try_get("dt_next_box")?,
        dt_till_max: r.try_get("dt_till_max")?,
        box_delivery_base: r.try_get("box_delivery_base")?,
        box_delivery_coef_expr: r.try_get("box_delivery_coef_expr")?,
        box_delivery_liter: r.try_get("box_delivery_liter")?,
        box_delivery_marketplace_base: r.try_get("box_delivery_marketplace_base")?,
        box_delivery_marketplace_coef_expr: r.try_get("box_delivery_marketplace_coef_expr")?,
        box_delivery_marketplace_liter: r.try_get("box_delivery_marketplace_liter")?,
        box_storage_base: r.try_get("box_storage_base")?,
        box_storage_coef_expr: r.try_get("box_storage_coef_expr")?,
        box_storage_liter: r.try_get("box_storage_liter")?,
    })
}
