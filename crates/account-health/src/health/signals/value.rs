use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw metric value as delivered by the signal source, classified once at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawSignalValue {
    Numeric(f64),
    /// The number written before a `%` marker, e.g. `Percent(5.0)` for `"5%"`.
    Percent(f64),
    Text(String),
}

impl RawSignalValue {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let Some(number) = trimmed.strip_suffix('%') {
            if let Some(value) = parse_finite(number) {
                return Self::Percent(value);
            }
        } else if let Some(value) = parse_finite(trimmed) {
            return Self::Numeric(value);
        }

        Self::Text(trimmed.to_string())
    }

    /// Numeric form used for scoring; percentages resolve to their fraction.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Numeric(value) => Some(*value),
            Self::Percent(value) => Some(value / 100.0),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for RawSignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(value) => write!(f, "{value}"),
            Self::Percent(value) => write!(f, "{value}%"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<f64> for RawSignalValue {
    fn from(value: f64) -> Self {
        Self::Numeric(value)
    }
}

impl From<&str> for RawSignalValue {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

fn parse_finite(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_percent_numeric_and_text() {
        assert_eq!(RawSignalValue::parse("5%"), RawSignalValue::Percent(5.0));
        assert_eq!(RawSignalValue::parse(" 12.5 % "), RawSignalValue::Percent(12.5));
        assert_eq!(RawSignalValue::parse("1,234.5"), RawSignalValue::Numeric(1234.5));
        assert_eq!(
            RawSignalValue::parse("--"),
            RawSignalValue::Text("--".to_string())
        );
        assert_eq!(
            RawSignalValue::parse("NaN"),
            RawSignalValue::Text("NaN".to_string())
        );
    }

    #[test]
    fn percent_resolves_to_fraction() {
        let value = RawSignalValue::parse("5%").as_number().expect("numeric");
        assert!((value - 0.05).abs() < 1e-12);
        assert_eq!(RawSignalValue::Text("n/a".to_string()).as_number(), None);
    }
}
