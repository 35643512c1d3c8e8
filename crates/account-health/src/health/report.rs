use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::CustomerId;
use super::scoring::ScoreResult;
use super::settings::SettingsMap;
use super::signals::{SignalCatalog, SignalType};

const LEVEL_COUNT: u8 = 5;

/// Location of a run's report as understood by the report sink (a path, a URL, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportHandle(pub String);

impl fmt::Display for ReportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One configured score tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorLevel {
    pub level: u8,
    pub min_value: f64,
    pub fg_color: Option<String>,
    pub bg_color: Option<String>,
}

/// Score tiers from the `Level{1..5}*` settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorScale {
    levels: Vec<ColorLevel>,
}

impl ColorScale {
    pub fn new(mut levels: Vec<ColorLevel>) -> Self {
        levels.sort_by(|a, b| a.min_value.total_cmp(&b.min_value));
        Self { levels }
    }

    /// Levels whose min value is missing are skipped; malformed ones are skipped with a
    /// warning because coloring never blocks a run.
    pub fn from_settings(map: &SettingsMap) -> Self {
        let mut levels = Vec::new();

        for level in 1..=LEVEL_COUNT {
            let key = format!("Level{level}MinValue");
            let min_value = match map.parse::<f64>(&key) {
                Some(Ok(value)) if value.is_finite() => value,
                Some(_) => {
                    warn!(setting = %key, "ignoring malformed color level threshold");
                    continue;
                }
                None => continue,
            };

            levels.push(ColorLevel {
                level,
                min_value,
                fg_color: map
                    .get(&format!("Level{level}FgColor"))
                    .map(str::to_string),
                bg_color: map
                    .get(&format!("Level{level}BgColor"))
                    .map(str::to_string),
            });
        }

        Self::new(levels)
    }

    /// Highest tier whose threshold the score reaches.
    pub fn tier_for(&self, score: f64) -> Option<&ColorLevel> {
        self.levels
            .iter()
            .rev()
            .find(|level| score >= level.min_value)
    }

    pub fn levels(&self) -> &[ColorLevel] {
        &self.levels
    }
}

/// Report line for one scored account, cells in catalog order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub customer_id: CustomerId,
    pub score: f64,
    pub tier: Option<ColorLevel>,
    pub cells: Vec<String>,
}

impl ReportRow {
    pub fn from_result(result: &ScoreResult, catalog: &SignalCatalog, scale: &ColorScale) -> Self {
        let cells = catalog
            .included()
            .map(|definition| match result.signal(&definition.name) {
                Some(signal) => match (definition.signal_type, signal.value) {
                    (SignalType::Number, Some(value)) => definition.format_number(value),
                    _ => signal.raw.to_string(),
                },
                None => String::new(),
            })
            .collect();

        Self {
            customer_id: result.customer_id.clone(),
            score: result.score,
            tier: scale.tier_for(result.score).cloned(),
            cells,
        }
    }
}

/// Orders rows by descending score; ties keep their arrival order.
pub fn sort_rows(rows: &mut [ReportRow]) {
    rows.sort_by(|a, b| b.score.total_cmp(&a.score));
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("report target unavailable: {0}")]
    Unavailable(String),
    #[error("report '{0}' does not exist")]
    Missing(ReportHandle),
}

/// Presentation layer receiving scored rows.
pub trait ReportSink: Send + Sync {
    /// Creates an empty report for a run starting at `started_at`.
    fn provision(
        &self,
        started_at: DateTime<Utc>,
        catalog: &SignalCatalog,
    ) -> Result<ReportHandle, ReportError>;

    fn append(&self, report: &ReportHandle, rows: &[ReportRow]) -> Result<(), ReportError>;

    /// Called once when the run completes, e.g. to re-sort the whole report.
    fn finalize(&self, report: &ReportHandle) -> Result<(), ReportError>;
}
