//! One fetch, store and export cycle, serialized by an in-flight guard.

use chrono::{Local, NaiveDate};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::api::{TariffApiError, TariffProvider};
use crate::sheets::{ExportSummary, SpreadsheetExporter};
use crate::tariff_storage::{SaveSummary, TariffStorage};

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("a fetch cycle is already running")]
    AlreadyRunning,

    #[error("fetch failed: {0}")]
    Fetch(#[from] TariffApiError),

    #[error("store failed: {0}")]
    Store(anyhow::Error),

    #[error("export failed: {0}")]
    Export(anyhow::Error),
}

/// Result of a completed cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary {
    pub day: NaiveDate,
    pub fetched: usize,
    pub saved: SaveSummary,
    pub export: ExportSummary,
}

pub struct Orchestrator {
    provider: Arc<dyn TariffProvider>,
    storage: TariffStorage,
    exporter: Arc<SpreadsheetExporter>,
    in_flight: Mutex<()>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn TariffProvider>, storage: TariffStorage, exporter: Arc<SpreadsheetExporter>) -> Self {
        Self {
            provider,
            storage,
            exporter,
            in_flight: Mutex::new(()),
        }
    }

    pub fn exporter(&self) -> &Arc<SpreadsheetExporter> {
        &self.exporter
    }

    /// Fetch tariffs for `date` (today when `None`), persist them, then export.
    /// Without a date the export goes through the scheduled entry point.
    ///
    /// Only one cycle runs at a time; a call made while another is in progress
    /// returns [`CycleError::AlreadyRunning`] without touching anything.
    pub async fn run_cycle(&self, date: Option<NaiveDate>) -> Result<CycleSummary, CycleError> {
        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("Fetch cycle requested while another is running, skipping");
                return Err(CycleError::AlreadyRunning);
            }
        };

        let day = date.unwrap_or_else(|| Local::now().date_naive());
        let started = Instant::now();
        info!("🚀 Starting tariff cycle for {}", day);

        let response = self.provider.get_box_tariffs(Some(day)).await.map_err(|e| {
            error!("Tariff fetch for {} failed: {}", day, e);
            CycleError::Fetch(e)
        })?;
        let fetched = response.response.data.warehouse_list.len();

        let saved = self.storage.save_tariffs(&response, day).await.map_err(|e| {
            error!("Saving tariffs for {} failed: {}", day, e);
            CycleError::Store(e)
        })?;

        let export = match date {
            Some(day) => self.exporter.export_day(day).await,
            None => self.exporter.export_tariffs_to_sheets().await,
        };
        let export = export.map_err(|e| {
            error!("Export for {} failed: {}", day, e);
            CycleError::Export(e)
        })?;

        info!(
            "✅ Cycle for {} done in {:.2?}: fetched {}, saved {}, skipped {}, sheets updated {}/{}",
            day,
            started.elapsed(),
            fetched,
            saved.saved,
            saved.skipped,
            export.updated,
            export.destinations
        );

        Ok(CycleSummary {
            day,
            fetched,
            saved,
            export,
        })
    }
}
