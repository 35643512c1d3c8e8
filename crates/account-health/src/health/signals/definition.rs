use serde::{Deserialize, Serialize};

/// Whether a signal is scored numerically or only displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    Number,
    String,
}

impl SignalType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "number" | "numeric" => Some(Self::Number),
            "string" | "text" => Some(Self::String),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Number => "Number",
            Self::String => "String",
        }
    }
}

/// Which end of the `[min, max]` range counts as healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    High,
    Low,
    None,
}

impl Direction {
    /// A blank direction cell means the metric is informational only.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "low" => Some(Self::Low),
            "" | "none" => Some(Self::None),
            _ => None,
        }
    }

    pub fn is_scored(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Catalog row describing one performance signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDefinition {
    pub name: String,
    pub display_name: String,
    pub include_in_report: bool,
    pub signal_type: SignalType,
    pub direction: Direction,
    pub format: String,
    pub weight: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl SignalDefinition {
    pub fn number(name: &str, direction: Direction, weight: f64, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            display_name: name.to_string(),
            include_in_report: true,
            signal_type: SignalType::Number,
            direction,
            format: String::new(),
            weight,
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn text(name: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: name.to_string(),
            include_in_report: true,
            signal_type: SignalType::String,
            direction: Direction::None,
            format: String::new(),
            weight: 0.0,
            min: None,
            max: None,
        }
    }

    /// True when the signal contributes to `score_sum` and `score_weights`.
    pub fn is_weighted(&self) -> bool {
        self.include_in_report
            && self.signal_type == SignalType::Number
            && self.direction.is_scored()
    }

    pub fn is_percent_format(&self) -> bool {
        self.format.contains('%')
    }

    /// Renders a resolved numeric value using the spreadsheet-style display format,
    /// e.g. `0.00%` or `#,##0.0`.
    pub fn format_number(&self, value: f64) -> String {
        let decimals = self
            .format
            .split_once('.')
            .map(|(_, fraction)| fraction.chars().filter(|c| *c == '0' || *c == '#').count())
            .unwrap_or(0);

        if self.is_percent_format() {
            format!("{:.*}%", decimals, value * 100.0)
        } else if self.format.is_empty() {
            value.to_string()
        } else {
            format!("{:.*}", decimals, value)
        }
    }
}
