//! In-memory stand-ins for the external seams

use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tariff_sync::api::{Sleeper, TariffApiError, TariffProvider};
use tariff_sync::models::BoxTariffResponse;
use tariff_sync::sheets::{SheetsApi, SheetsError};
use tokio::sync::Notify;

/// Records requested waits and returns at once
#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

/// One `write_values` call
#[derive(Debug, Clone)]
pub struct Write {
    pub spreadsheet_id: String,
    pub range: String,
    pub values: Vec<Vec<Value>>,
}

/// Spreadsheet service that keeps tabs and writes in memory
#[derive(Default)]
pub struct RecordingSheets {
    tabs: Mutex<HashSet<(String, String)>>,
    failing: HashSet<String>,
    writes: Mutex<Vec<Write>>,
}

impl RecordingSheets {
    pub fn failing_on(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|id| id.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    pub fn has_tab(&self, spreadsheet_id: &str, title: &str) -> bool {
        self.tabs
            .lock()
            .unwrap()
            .contains(&(spreadsheet_id.to_string(), title.to_string()))
    }
}

#[async_trait::async_trait]
impl SheetsApi for RecordingSheets {
    async fn find_sheet_id(&self, spreadsheet_id: &str, title: &str) -> Result<Option<i64>, SheetsError> {
        Ok(self.has_tab(spreadsheet_id, title).then_some(1))
    }

    async fn add_sheet(&self, spreadsheet_id: &str, title: &str) -> Result<i64, SheetsError> {
        let inserted = self
            .tabs
            .lock()
            .unwrap()
            .insert((spreadsheet_id.to_string(), title.to_string()));
        if inserted {
            Ok(1)
        } else {
            Err(SheetsError::AlreadyExists)
        }
    }

    async fn write_values(&self, spreadsheet_id: &str, range: &str, values: &[Vec<Value>]) -> Result<(), SheetsError> {
        if self.failing.contains(spreadsheet_id) {
            return Err(SheetsError::Http {
                status: 404,
                message: "Requested entity was not found.".to_string(),
            });
        }
        self.writes.lock().unwrap().push(Write {
            spreadsheet_id: spreadsheet_id.to_string(),
            range: range.to_string(),
            values: values.to_vec(),
        });
        Ok(())
    }

    async fn probe(&self) -> Result<(), SheetsError> {
        Ok(())
    }
}

/// Tariff source returning a fixed payload, optionally held until released
pub struct StaticProvider {
    response: BoxTariffResponse,
    gate: Option<Arc<Notify>>,
    requested: Mutex<Vec<Option<NaiveDate>>>,
}

impl StaticProvider {
    pub fn new(response: BoxTariffResponse) -> Self {
        Self {
            response,
            gate: None,
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Every fetch waits for `gate` to be notified
    pub fn gated(response: BoxTariffResponse, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(response)
        }
    }

    pub fn requested(&self) -> Vec<Option<NaiveDate>> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TariffProvider for StaticProvider {
    async fn get_box_tariffs(&self, date: Option<NaiveDate>) -> Result<BoxTariffResponse, TariffApiError> {
        self.requested.lock().unwrap().push(date);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self.response.clone())
    }
}

/// Tariff source that always fails with the given status
pub struct FailingProvider {
    pub status: u16,
}

#[async_trait::async_trait]
impl TariffProvider for FailingProvider {
    async fn get_box_tariffs(&self, _date: Option<NaiveDate>) -> Result<BoxTariffResponse, TariffApiError> {
        Err(TariffApiError::Api {
            status: self.status,
            problem: None,
        })
    }
}
