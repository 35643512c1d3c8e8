use std::collections::BTreeMap;

use super::domain::CustomerId;
use super::settings::{ReportingPeriod, SettingsMap};
use super::signals::{RawSignalValue, SignalDefinition};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("configuration is locked while a run is in progress")]
    Locked,
    #[error("malformed source data: {0}")]
    Malformed(String),
    #[error("no metrics for account {customer_id} in period {period}")]
    NoMetrics {
        customer_id: CustomerId,
        period: ReportingPeriod,
    },
}

/// Editable configuration: signal catalog, settings, and the run-scoped edit lock.
///
/// While locked, both loads return the snapshot taken by `lock`, whatever happens to the
/// live tables.
pub trait ConfigSource: Send + Sync {
    fn load_signal_definitions(&self) -> Result<Vec<SignalDefinition>, SourceError>;

    fn load_settings(&self) -> Result<SettingsMap, SourceError>;

    /// Snapshots catalog and settings and blocks edits until `unlock`. Locking an already
    /// locked source keeps the existing snapshot.
    fn lock(&self) -> Result<(), SourceError>;

    /// Discards the snapshot. Unlocking an unlocked source is a no-op.
    fn unlock(&self) -> Result<(), SourceError>;

    fn is_locked(&self) -> Result<bool, SourceError>;

    /// Fails with `SourceError::Locked` while a run holds the lock.
    fn update_setting(&self, key: &str, value: &str) -> Result<(), SourceError>;
}

/// Lists the managed accounts, optionally restricted to one label.
pub trait FleetEnumerator: Send + Sync {
    fn list_accounts(&self, label: Option<&str>) -> Result<Vec<CustomerId>, SourceError>;
}

/// Supplies raw per-account metrics. Missing names are simply absent from the map.
pub trait SignalSource: Send + Sync {
    fn fetch_signals(
        &self,
        customer_id: &CustomerId,
        names: &[String],
        period: ReportingPeriod,
    ) -> Result<BTreeMap<String, RawSignalValue>, SourceError>;
}
