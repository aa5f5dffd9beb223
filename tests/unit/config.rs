//! Configuration loading and the retry policy it produces

use pretty_assertions::assert_eq;
use std::time::Duration;
use tariff_sync::api::{RetryPolicy, WbTariffsClient};
use tariff_sync::models::{Config, GoogleCredentialsSource, DEFAULT_FETCH_CRON, DEFAULT_WB_BASE_URL};

// The only test in the binary that touches the process environment
#[test_log::test]
fn test_config_from_env_defaults_and_fallbacks() {
    std::env::set_var("WB_API_KEY", "test-key");
    std::env::set_var("WB_MAX_RETRIES", "not-a-number");
    std::env::set_var("WB_BACKOFF_BASE_MS", "250");
    std::env::set_var("SEED_SPREADSHEET_IDS", " sheet-a, ,sheet-b ");
    std::env::set_var("GOOGLE_SA_PATH", "/etc/sa.json");
    for name in [
        "WB_API_BASE_URL",
        "WB_BACKOFF_MAX_MS",
        "DATABASE_PATH",
        "APP_PORT",
        "FETCH_CRON",
        "GOOGLE_SA_CREDENTIALS",
    ] {
        std::env::remove_var(name);
    }

    let config = Config::from_env().unwrap();

    assert_eq!(config.wb_api_key, "test-key");
    assert_eq!(config.wb_base_url, DEFAULT_WB_BASE_URL);
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.backoff_base_ms, 250);
    assert_eq!(config.backoff_max_ms, 30_000);
    assert_eq!(config.database_path, "tariffs.db");
    assert_eq!(config.app_port, 5000);
    assert_eq!(config.fetch_cron, DEFAULT_FETCH_CRON);
    assert_eq!(config.seed_spreadsheet_ids, vec!["sheet-a".to_string(), "sheet-b".to_string()]);
    assert_eq!(
        config.google_credentials,
        Some(GoogleCredentialsSource::Path("/etc/sa.json".to_string()))
    );

    let client = WbTariffsClient::new(&config).unwrap();
    assert_eq!(client.retry_policy(), &RetryPolicy::new(3, 250, 30_000));

    std::env::set_var("WB_API_KEY", "  ");
    assert!(Config::from_env().is_err());
}

#[test]
fn test_rate_limit_delay_falls_back_for_zero_retry_after() {
    let policy = RetryPolicy::new(3, 500, 3_000);

    assert_eq!(policy.rate_limit_delay(1, Some(0)), Duration::from_millis(1_000));
    assert_eq!(policy.rate_limit_delay(2, Some(7)), Duration::from_secs(7));
    assert_eq!(policy.rate_limit_delay(4, None), Duration::from_millis(3_000));
}
