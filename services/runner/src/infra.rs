use account_health::config::{AppConfig, StorageConfig};
use account_health::error::AppError;
use account_health::health::adapters::{
    CsvFleet, CsvReportSink, CsvRunStore, CsvSignalSource, FileConfigSource, OutboxNotifier,
};
use account_health::health::run::RunServices;
use account_health::health::RunController;
use account_health::telemetry;
use std::fs;
use std::sync::Arc;
use tracing::info;

/// Loads configuration, installs tracing, and makes sure the data directories exist.
pub(crate) fn bootstrap() -> Result<AppConfig, AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment)?;

    fs::create_dir_all(&config.storage.data_dir)?;
    fs::create_dir_all(&config.storage.report_dir)?;
    info!(
        environment = ?config.environment,
        data_dir = %config.storage.data_dir.display(),
        "configuration loaded"
    );
    Ok(config)
}

pub(crate) fn config_source(storage: &StorageConfig) -> FileConfigSource {
    FileConfigSource::new(
        storage.signals_path(),
        storage.settings_path(),
        storage.lock_path(),
    )
}

/// File-backed collaborators rooted at the configured data directory.
pub(crate) fn file_services(storage: &StorageConfig) -> RunServices {
    RunServices {
        store: Arc::new(CsvRunStore::new(
            storage.runs_path(),
            storage.accounts_path(),
        )),
        config: Arc::new(config_source(storage)),
        fleet: Arc::new(CsvFleet::new(storage.fleet_path())),
        signals: Arc::new(CsvSignalSource::new(storage.metrics_path())),
        reports: Arc::new(CsvReportSink::new(storage.report_dir.clone())),
        notifier: Arc::new(OutboxNotifier::new(storage.outbox.clone())),
    }
}

pub(crate) fn controller(storage: &StorageConfig) -> RunController {
    RunController::new(file_services(storage))
}
