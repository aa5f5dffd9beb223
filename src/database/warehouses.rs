use anyhow::{anyhow, Result};
use sqlx::Row;
use tracing::{debug, info};

use super::DatabaseManager;
use crate::models::Warehouse;

impl DatabaseManager {
    /// Look up a warehouse by its (name, geo) identity
    pub async fn find_warehouse(&self, warehouse_name: &str, geo_name: &str) -> Result<Option<Warehouse>> {
        let row = sqlx::query(
            "SELECT id, warehouse_name, geo_name FROM warehouses WHERE warehouse_name = ? AND geo_name = ?",
        )
        .bind(warehouse_name)
        .bind(geo_name)
        .fetch_optional(self.pool())
        .await?;

        row.map(|r| -> Result<Warehouse> {
            Ok(Warehouse {
                id: r.try_get("id")?,
                warehouse_name: r.try_get("warehouse_name")?,
                geo_name: r.try_get("geo_name")?,
            })
        })
        .transpose()
    }

    /// Find-or-create a warehouse.
    ///
    /// The insert is conflict-tolerant: a concurrent caller that inserted the
    /// same pair first makes ours a no-op, and the winner's row is re-selected.
    pub async fn resolve_warehouse(&self, warehouse_name: &str, geo_name: &str) -> Result<Warehouse> {
        debug!("Resolving warehouse {}, {}", warehouse_name, geo_name);

        if let Some(existing) = self.find_warehouse(warehouse_name, geo_name).await? {
            return Ok(existing);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO warehouses (warehouse_name, geo_name)
            VALUES (?, ?)
            ON CONFLICT(warehouse_name, geo_name) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(warehouse_name)
        .bind(geo_name)
        .fetch_optional(self.pool())
        .await?;

        match inserted {
            Some(row) => {
                info!("Created new warehouse: {}, {}", warehouse_name, geo_name);
                Ok(Warehouse {
                    id: row.try_get("id")?,
                    warehouse_name: warehouse_name.to_string(),
                    geo_name: geo_name.to_string(),
                })
            }
            None => {
                debug!("Warehouse {}, {} inserted concurrently, re-reading", warehouse_name, geo_name);
                self.find_warehouse(warehouse_name, geo_name)
                    .await?
                    .ok_or_else(|| anyhow!("warehouse {} / {} vanished after conflict", warehouse_name, geo_name))
            }
        }
    }

    /// Manually remove a warehouse; its tariff rows go with it
    pub async fn remove_warehouse(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM warehouses WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
