use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::report::ColorScale;

pub const REPORT_FREQUENCY: &str = "ReportFrequency";
pub const NUM_ACCOUNTS_PROCESS: &str = "NumAccountsProcess";
pub const ACCOUNT_LABEL: &str = "AccountLabel";
pub const RECIPIENT_EMAIL: &str = "RecipientEmail";
pub const REPORT_PERIOD: &str = "ReportPeriod";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("mandatory setting '{0}' is not configured")]
    Missing(&'static str),
    #[error("setting '{key}' has invalid value '{value}': {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: &'static str,
    },
}

/// Raw key/value settings. A blank cell reads as "not set"; `"0"` is a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsMap {
    values: BTreeMap<String, String>,
}

impl SettingsMap {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn require(&self, key: &'static str) -> Result<&str, SettingsError> {
        self.get(key).ok_or(SettingsError::Missing(key))
    }

    pub fn parse<T: FromStr>(&self, key: &str) -> Option<Result<T, SettingsError>> {
        self.get(key).map(|value| {
            value.parse::<T>().map_err(|_| SettingsError::Invalid {
                key: key.to_string(),
                value: value.to_string(),
                reason: "expected a number",
            })
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.values.iter()
    }
}

impl FromIterator<(String, String)> for SettingsMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Reporting window requested from the signal source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportingPeriod {
    Today,
    Yesterday,
    Last7Days,
    Last14Days,
    #[default]
    Last30Days,
    ThisMonth,
    LastMonth,
    AllTime,
}

impl ReportingPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Today => "TODAY",
            Self::Yesterday => "YESTERDAY",
            Self::Last7Days => "LAST_7_DAYS",
            Self::Last14Days => "LAST_14_DAYS",
            Self::Last30Days => "LAST_30_DAYS",
            Self::ThisMonth => "THIS_MONTH",
            Self::LastMonth => "LAST_MONTH",
            Self::AllTime => "ALL_TIME",
        }
    }

    pub fn ordered() -> [Self; 8] {
        [
            Self::Today,
            Self::Yesterday,
            Self::Last7Days,
            Self::Last14Days,
            Self::Last30Days,
            Self::ThisMonth,
            Self::LastMonth,
            Self::AllTime,
        ]
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportingPeriod {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_uppercase();
        Self::ordered()
            .into_iter()
            .find(|period| period.as_str() == wanted)
            .ok_or(())
    }
}

/// Typed view of the settings a run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub report_frequency_days: u32,
    pub batch_size: usize,
    pub account_label: Option<String>,
    pub recipient_email: Option<String>,
    pub report_period: ReportingPeriod,
    pub color_scale: ColorScale,
}

impl Settings {
    pub fn from_map(map: &SettingsMap) -> Result<Self, SettingsError> {
        let report_frequency_days = map
            .parse::<u32>(REPORT_FREQUENCY)
            .ok_or(SettingsError::Missing(REPORT_FREQUENCY))??;

        let batch_size = map
            .parse::<usize>(NUM_ACCOUNTS_PROCESS)
            .ok_or(SettingsError::Missing(NUM_ACCOUNTS_PROCESS))??;
        if batch_size == 0 {
            return Err(SettingsError::Invalid {
                key: NUM_ACCOUNTS_PROCESS.to_string(),
                value: "0".to_string(),
                reason: "batch size must be at least 1 or the run never completes",
            });
        }

        let report_period = match map.get(REPORT_PERIOD) {
            Some(raw) => raw.parse().map_err(|_| SettingsError::Invalid {
                key: REPORT_PERIOD.to_string(),
                value: raw.to_string(),
                reason: "unknown reporting period",
            })?,
            None => ReportingPeriod::default(),
        };

        Ok(Self {
            report_frequency_days,
            batch_size,
            account_label: map.get(ACCOUNT_LABEL).map(str::to_string),
            recipient_email: map.get(RECIPIENT_EMAIL).map(str::to_string),
            report_period,
            color_scale: ColorScale::from_settings(map),
        })
    }
}
