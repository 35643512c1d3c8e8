use std::env;
use std::fmt;
use std::path::PathBuf;

/// Distinguishes runtime behavior for different stages of the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub storage: StorageConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let data_dir = PathBuf::from(
            env::var("HEALTH_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
        );
        if data_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath("HEALTH_DATA_DIR"));
        }

        let report_dir = optional_path("HEALTH_REPORT_DIR")?
            .unwrap_or_else(|| data_dir.join("reports"));
        let outbox = optional_path("HEALTH_OUTBOX")?
            .unwrap_or_else(|| data_dir.join("outbox.jsonl"));

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            storage: StorageConfig {
                data_dir,
                report_dir,
                outbox,
            },
            telemetry: TelemetryConfig { log_level },
        })
    }
}

fn optional_path(key: &'static str) -> Result<Option<PathBuf>, ConfigError> {
    match env::var(key) {
        Ok(value) if value.trim().is_empty() => Err(ConfigError::EmptyPath(key)),
        Ok(value) => Ok(Some(PathBuf::from(value))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode(key)),
    }
}

/// Locations of the tabular files backing the run store, configuration, and reports.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub report_dir: PathBuf,
    pub outbox: PathBuf,
}

impl StorageConfig {
    pub fn runs_path(&self) -> PathBuf {
        self.data_dir.join("runs.csv")
    }

    pub fn accounts_path(&self) -> PathBuf {
        self.data_dir.join("accounts.csv")
    }

    pub fn signals_path(&self) -> PathBuf {
        self.data_dir.join("signals.csv")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.csv")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join("config.lock")
    }

    pub fn fleet_path(&self) -> PathBuf {
        self.data_dir.join("accounts_fleet.csv")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.data_dir.join("metrics.csv")
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    EmptyPath(&'static str),
    NotUnicode(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyPath(key) => write!(f, "{key} must not be empty"),
            ConfigError::NotUnicode(key) => write!(f, "{key} must be valid unicode"),
        }
    }
}

impl std::error::Error for ConfigError {}
