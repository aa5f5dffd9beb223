use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use tracing::info;

pub mod spreadsheets;
pub mod tariffs;
pub mod warehouses;

/// SQLX-based database manager for warehouses, tariffs and export destinations
#[derive(Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    /// Open (or create) the SQLite database at `database_path` and ensure the schema
    pub async fn new(database_path: &str) -> Result<Self> {
        let path = database_path.strip_prefix("sqlite:").unwrap_or(database_path);

        // foreign_keys is per connection, so it goes on the connect options
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open database at {}", path))?;

        let db = Self { pool };
        db.create_schema().await?;
        info!("Database initialized at {}", path);

        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables directly instead of using migrations
    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS warehouses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                warehouse_name TEXT NOT NULL,
                geo_name TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(warehouse_name, geo_name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tariffs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                warehouse_id INTEGER NOT NULL REFERENCES warehouses(id) ON DELETE CASCADE,
                day DATE NOT NULL,
                fetched_at DATETIME NOT NULL,
                dt_next_box TEXT,
                dt_till_max TEXT,
                box_delivery_base REAL,
                box_delivery_coef_expr REAL,
                box_delivery_liter REAL,
                box_delivery_marketplace_base REAL,
                box_delivery_marketplace_coef_expr REAL,
                box_delivery_marketplace_liter REAL,
                box_storage_base REAL,
                box_storage_coef_expr REAL,
                box_storage_liter REAL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(warehouse_id, day)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tariffs_day ON tariffs(day)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS spreadsheets (
                spreadsheet_id TEXT PRIMARY KEY,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database schema ready");
        Ok(())
    }

    /// Trivial connectivity probe
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    /// Get database statistics: (warehouses, tariff records)
    pub async fn get_stats(&self) -> Result<(usize, usize)> {
        let warehouses: i64 = sqlx::query("SELECT COUNT(*) AS n FROM warehouses")
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;
        let tariffs: i64 = sqlx::query("SELECT COUNT(*) AS n FROM tariffs")
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;

        Ok((warehouses as usize, tariffs as usize))
    }
}
