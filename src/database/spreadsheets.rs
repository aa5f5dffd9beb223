use anyhow::Result;
use sqlx::Row;
use tracing::{debug, info, warn};

use super::DatabaseManager;

impl DatabaseManager {
    /// All configured export destinations
    pub async fn list_spreadsheets(&self) -> Result<Vec<String>> {
        debug!("Loading all spreadsheets");
        let rows = sqlx::query("SELECT spreadsheet_id FROM spreadsheets ORDER BY created_at, spreadsheet_id")
            .fetch_all(self.pool())
            .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("spreadsheet_id").map_err(anyhow::Error::from))
            .collect()
    }

    pub async fn insert_spreadsheet(&self, spreadsheet_id: &str) -> Result<()> {
        info!("Adding spreadsheet {}", spreadsheet_id);
        sqlx::query("INSERT INTO spreadsheets (spreadsheet_id) VALUES (?) ON CONFLICT(spreadsheet_id) DO NOTHING")
            .bind(spreadsheet_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn clear_spreadsheets(&self) -> Result<()> {
        info!("Clearing spreadsheets table");
        sqlx::query("DELETE FROM spreadsheets").execute(self.pool()).await?;
        Ok(())
    }

    /// Replace the destination set with `ids`; an empty list leaves the table untouched
    pub async fn seed_spreadsheets(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            warn!("SEED_SPREADSHEET_IDS is not set, spreadsheets were not seeded");
            return Ok(0);
        }

        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM spreadsheets").execute(&mut *tx).await?;
        for id in ids {
            sqlx::query("INSERT INTO spreadsheets (spreadsheet_id) VALUES (?) ON CONFLICT(spreadsheet_id) DO NOTHING")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!("Seeded {} spreadsheets", ids.len());
        Ok(ids.len())
    }
}
