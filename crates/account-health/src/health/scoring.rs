use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::domain::CustomerId;
use super::signals::{Direction, RawSignalValue, SignalCatalog, SignalDefinition, SignalType};

/// Per-signal entry of a score, kept for the report and for audits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    pub name: String,
    pub raw: RawSignalValue,
    /// Resolved numeric value; `None` for String signals.
    pub value: Option<f64>,
    /// Normalized value; `None` for String signals.
    pub normalized: Option<f64>,
    pub contribution: f64,
}

/// Weighted health score for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub customer_id: CustomerId,
    pub signals: Vec<SignalScore>,
    pub score_sum: f64,
    pub score_weights: f64,
    pub score: f64,
}

impl ScoreResult {
    pub fn signal(&self, name: &str) -> Option<&SignalScore> {
        self.signals.iter().find(|signal| signal.name == name)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ScoringError {
    #[error("account {customer_id} has no value for number signal '{signal}'")]
    MissingValue {
        customer_id: CustomerId,
        signal: String,
    },
    #[error("account {customer_id} reported non-numeric '{raw}' for number signal '{signal}'")]
    NotNumeric {
        customer_id: CustomerId,
        signal: String,
        raw: String,
    },
}

/// Maps a resolved value into `[0, 1]` for directional signals; `None` passes through.
///
/// Callers guarantee `min < max` for directional signals; the catalog enforces it.
pub fn normalize(definition: &SignalDefinition, value: f64) -> f64 {
    let (min, max) = match (definition.min, definition.max) {
        (Some(min), Some(max)) => (min, max),
        _ => return value,
    };

    match definition.direction {
        Direction::High => ((value - min) / (max - min)).clamp(0.0, 1.0),
        Direction::Low => (1.0 - (value - min) / (max - min)).clamp(0.0, 1.0),
        Direction::None => value,
    }
}

/// Stateless scorer bound to one loaded catalog.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    catalog: Arc<SignalCatalog>,
}

impl ScoringEngine {
    pub fn new(catalog: Arc<SignalCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &SignalCatalog {
        &self.catalog
    }

    pub fn score(
        &self,
        customer_id: &CustomerId,
        raw_signals: &BTreeMap<String, RawSignalValue>,
    ) -> Result<ScoreResult, ScoringError> {
        let mut signals = Vec::new();
        let mut score_sum = 0.0;

        for definition in self.catalog.included() {
            let raw = raw_signals.get(&definition.name);

            if definition.signal_type == SignalType::String {
                signals.push(SignalScore {
                    name: definition.name.clone(),
                    raw: raw
                        .cloned()
                        .unwrap_or_else(|| RawSignalValue::Text(String::new())),
                    value: None,
                    normalized: None,
                    contribution: 0.0,
                });
                continue;
            }

            let raw = raw.ok_or_else(|| ScoringError::MissingValue {
                customer_id: customer_id.clone(),
                signal: definition.name.clone(),
            })?;
            let value = raw.as_number().ok_or_else(|| ScoringError::NotNumeric {
                customer_id: customer_id.clone(),
                signal: definition.name.clone(),
                raw: raw.to_string(),
            })?;

            let normalized = normalize(definition, value);
            let contribution = if definition.is_weighted() {
                normalized * definition.weight
            } else {
                0.0
            };
            score_sum += contribution;

            signals.push(SignalScore {
                name: definition.name.clone(),
                raw: raw.clone(),
                value: Some(value),
                normalized: Some(normalized),
                contribution,
            });
        }

        let score_weights = self.catalog.sum_weights();

        Ok(ScoreResult {
            customer_id: customer_id.clone(),
            signals,
            score_sum,
            score_weights,
            score: score_sum / score_weights,
        })
    }
}
