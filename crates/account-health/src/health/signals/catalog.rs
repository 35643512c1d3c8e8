use std::collections::HashSet;

use super::definition::{SignalDefinition, SignalType};

/// Errors that make a signal catalog unusable for scoring.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CatalogError {
    #[error("signal '{0}' is defined more than once")]
    DuplicateName(String),
    #[error("signal '{name}' has invalid weight {weight}; weights must be finite and non-negative")]
    InvalidWeight { name: String, weight: f64 },
    #[error("signal '{name}' needs both min and max to normalize")]
    MissingRange { name: String },
    #[error("signal '{name}' has min {min} not below max {max}")]
    InvalidRange { name: String, min: f64, max: f64 },
    #[error("included number signals carry zero total weight; no account can be scored")]
    ZeroWeight,
}

/// Ordered, validated signal definitions with the precomputed weight total.
#[derive(Debug, Clone)]
pub struct SignalCatalog {
    definitions: Vec<SignalDefinition>,
    sum_weights: f64,
}

impl SignalCatalog {
    /// Validates the raw catalog rows. Rows with a blank name are dropped silently.
    pub fn load(rows: Vec<SignalDefinition>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        let mut definitions = Vec::with_capacity(rows.len());

        for mut definition in rows {
            let name = definition.name.trim().to_string();
            if name.is_empty() {
                continue;
            }
            if !seen.insert(name.clone()) {
                return Err(CatalogError::DuplicateName(name));
            }
            definition.name = name;
            if definition.display_name.trim().is_empty() {
                definition.display_name = definition.name.clone();
            }

            if definition.include_in_report && definition.signal_type == SignalType::Number {
                validate_number(&definition)?;
            }
            definitions.push(definition);
        }

        let sum_weights: f64 = definitions
            .iter()
            .filter(|definition| definition.is_weighted())
            .map(|definition| definition.weight)
            .sum();

        if sum_weights <= 0.0 {
            return Err(CatalogError::ZeroWeight);
        }

        Ok(Self {
            definitions,
            sum_weights,
        })
    }

    pub fn definitions(&self) -> &[SignalDefinition] {
        &self.definitions
    }

    pub fn included(&self) -> impl Iterator<Item = &SignalDefinition> {
        self.definitions
            .iter()
            .filter(|definition| definition.include_in_report)
    }

    /// Names requested from the signal source for every account.
    pub fn fetch_names(&self) -> Vec<String> {
        self.included()
            .map(|definition| definition.name.clone())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&SignalDefinition> {
        self.definitions
            .iter()
            .find(|definition| definition.name == name)
    }

    /// Sum of weights over included, directional Number signals.
    pub fn sum_weights(&self) -> f64 {
        self.sum_weights
    }
}

fn validate_number(definition: &SignalDefinition) -> Result<(), CatalogError> {
    if !definition.weight.is_finite() || definition.weight < 0.0 {
        return Err(CatalogError::InvalidWeight {
            name: definition.name.clone(),
            weight: definition.weight,
        });
    }

    if !definition.direction.is_scored() {
        return Ok(());
    }

    match (definition.min, definition.max) {
        (Some(min), Some(max)) if min < max => Ok(()),
        (Some(min), Some(max)) => Err(CatalogError::InvalidRange {
            name: definition.name.clone(),
            min,
            max,
        }),
        _ => Err(CatalogError::MissingRange {
            name: definition.name.clone(),
        }),
    }
}
