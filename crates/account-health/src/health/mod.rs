//! Fleet health scoring: signal catalog, scoring engine, and the resumable run
//! controller that spreads a full fleet pass across many bounded invocations.

pub mod adapters;
pub mod domain;
pub mod notify;
pub mod report;
pub mod repository;
pub mod run;
pub mod scoring;
pub mod settings;
pub mod signals;
pub mod sources;

pub use domain::{AccountRecord, CustomerId, RunId, RunRecord};
pub use notify::{NotifyError, Notifier};
pub use report::{ColorLevel, ColorScale, ReportError, ReportHandle, ReportRow, ReportSink};
pub use repository::{RunStore, StoreError};
pub use run::{
    BatchProcessor, BatchSummary, InvocationOutcome, RunController, RunError, RunState,
};
pub use scoring::{normalize, ScoreResult, ScoringEngine, ScoringError, SignalScore};
pub use settings::{ReportingPeriod, Settings, SettingsError, SettingsMap};
pub use signals::{CatalogError, Direction, RawSignalValue, SignalCatalog, SignalDefinition, SignalType};
pub use sources::{ConfigSource, FleetEnumerator, SignalSource, SourceError};
