pub mod api;
pub mod database;
pub mod models;
pub mod orchestrator;
pub mod scheduler;
pub mod server;
pub mod sheets;
pub mod tariff_storage;
