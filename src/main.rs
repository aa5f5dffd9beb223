//! Tariff sync service
//!
//! Pulls box tariffs on a schedule, stores them in SQLite and publishes the
//! current day to the registered Google spreadsheets.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tariff_sync::api::WbTariffsClient;
use tariff_sync::database::DatabaseManager;
use tariff_sync::models::Config;
use tariff_sync::orchestrator::Orchestrator;
use tariff_sync::scheduler::start_scheduler;
use tariff_sync::server::{self, AppState};
use tariff_sync::sheets::{GoogleSheetsClient, SheetsApi, SpreadsheetExporter};
use tariff_sync::tariff_storage::TariffStorage;

#[derive(Parser)]
#[command(name = "tariff-sync")]
#[command(about = "Box tariff fetcher with Google Sheets export")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and the HTTP trigger/health server (default)
    Serve,
    /// Run a single fetch, store and export cycle, then exit
    RunOnce {
        /// Day to fetch (YYYY-MM-DD), today when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Replace the spreadsheet registry with SEED_SPREADSHEET_IDS
    Seed,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tariff_sync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("❌ Configuration Error: {}", e);
            eprintln!("Make sure you have a .env file with WB_API_KEY set.");
            std::process::exit(1);
        }
    };

    let database = Arc::new(DatabaseManager::new(&config.database_path).await?);
    info!("💾 Database initialized at: {}", config.database_path);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Seed => {
            let seeded = database.seed_spreadsheets(&config.seed_spreadsheet_ids).await?;
            info!("Seeded {} spreadsheet ids", seeded);
            Ok(())
        }
        Commands::RunOnce { date } => {
            let orchestrator = build_orchestrator(&config, database.clone())?;
            let summary = orchestrator.run_cycle(date).await?;
            info!("Run finished: {:?}", summary);
            Ok(())
        }
        Commands::Serve => run_service(config, database).await,
    }
}

fn build_orchestrator(config: &Config, database: Arc<DatabaseManager>) -> Result<Orchestrator> {
    let provider = Arc::new(WbTariffsClient::new(config)?);
    let storage = TariffStorage::new(database.clone());

    let sheets: Option<Arc<dyn SheetsApi>> = match &config.google_credentials {
        Some(source) => Some(Arc::new(GoogleSheetsClient::new(source)?)),
        None => {
            warn!("Google service account credentials not provided, sheets export is disabled");
            None
        }
    };

    let exporter = Arc::new(SpreadsheetExporter::new(database, storage.clone(), sheets));
    Ok(Orchestrator::new(provider, storage, exporter))
}

async fn run_service(config: Config, database: Arc<DatabaseManager>) -> Result<()> {
    database.seed_spreadsheets(&config.seed_spreadsheet_ids).await?;

    let orchestrator = Arc::new(build_orchestrator(&config, database.clone())?);

    // One cycle at startup, without holding up the server
    let startup = orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = startup.run_cycle(None).await {
            error!("Startup tariff cycle failed: {}", e);
        }
    });

    let _scheduler = start_scheduler(&config.fetch_cron, orchestrator.clone()).await?;

    let state = Arc::new(AppState {
        database,
        orchestrator,
    });
    server::serve(state, config.app_port).await
}
