use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::tabular::TabularError;
use crate::health::domain::CustomerId;
use crate::health::settings::ReportingPeriod;
use crate::health::signals::RawSignalValue;
use crate::health::sources::{SignalSource, SourceError};

const CUSTOMER_COLUMN: &str = "customer_id";
const PERIOD_COLUMN: &str = "period";

/// Metric cells keyed by account and period. `None` period rows apply to every period.
#[derive(Debug, Default)]
struct MetricsTable {
    rows: HashMap<(String, Option<ReportingPeriod>), BTreeMap<String, String>>,
}

impl MetricsTable {
    fn lookup(
        &self,
        customer_id: &CustomerId,
        period: ReportingPeriod,
    ) -> Option<&BTreeMap<String, String>> {
        let id = customer_id.as_str().to_string();
        self.rows
            .get(&(id.clone(), Some(period)))
            .or_else(|| self.rows.get(&(id, None)))
    }
}

/// Exported account metrics in `metrics.csv`: `customer_id`, `period`, then one column
/// per signal name. The file is read once per process.
pub struct CsvSignalSource {
    path: PathBuf,
    table: Mutex<Option<Arc<MetricsTable>>>,
}

impl CsvSignalSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: Mutex::new(None),
        }
    }

    fn table(&self) -> Result<Arc<MetricsTable>, SourceError> {
        let mut cached = self
            .table
            .lock()
            .map_err(|_| SourceError::Unavailable("metrics cache lock poisoned".to_string()))?;
        if let Some(table) = cached.as_ref() {
            return Ok(Arc::clone(table));
        }

        let table = Arc::new(self.load()?);
        *cached = Some(Arc::clone(&table));
        Ok(table)
    }

    fn load(&self) -> Result<MetricsTable, SourceError> {
        let path = self.path.as_path();
        if !path.exists() {
            return Err(TabularError::NotFound(path.to_path_buf()).into());
        }
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|source| TabularError::csv(path, source))?;
        let headers = reader
            .headers()
            .map_err(|source| TabularError::csv(path, source))?
            .clone();

        let position = |name: &str| {
            headers.iter().position(|header| header == name).ok_or_else(|| {
                SourceError::Malformed(format!("{}: missing column '{name}'", path.display()))
            })
        };
        let customer_idx = position(CUSTOMER_COLUMN)?;
        let period_idx = position(PERIOD_COLUMN)?;

        let mut table = MetricsTable::default();
        for record in reader.records() {
            let record = record.map_err(|source| TabularError::csv(path, source))?;
            let customer_id = record.get(customer_idx).unwrap_or_default().to_string();
            if customer_id.is_empty() {
                continue;
            }

            let period = match record.get(period_idx).unwrap_or_default() {
                "" => None,
                raw => Some(raw.parse::<ReportingPeriod>().map_err(|_| {
                    SourceError::Malformed(format!(
                        "{}: unknown period '{raw}' for {customer_id}",
                        path.display()
                    ))
                })?),
            };

            let cells = headers
                .iter()
                .zip(record.iter())
                .enumerate()
                .filter(|(idx, _)| *idx != customer_idx && *idx != period_idx)
                .filter(|(_, (_, value))| !value.is_empty())
                .map(|(_, (name, value))| (name.to_string(), value.to_string()))
                .collect();
            table.rows.insert((customer_id, period), cells);
        }

        debug!(path = %path.display(), rows = table.rows.len(), "loaded metrics export");
        Ok(table)
    }
}

impl SignalSource for CsvSignalSource {
    fn fetch_signals(
        &self,
        customer_id: &CustomerId,
        names: &[String],
        period: ReportingPeriod,
    ) -> Result<BTreeMap<String, RawSignalValue>, SourceError> {
        let table = self.table()?;
        let cells = table
            .lookup(customer_id, period)
            .ok_or_else(|| SourceError::NoMetrics {
                customer_id: customer_id.clone(),
                period,
            })?;

        Ok(names
            .iter()
            .filter_map(|name| {
                cells
                    .get(name)
                    .map(|raw| (name.clone(), RawSignalValue::parse(raw)))
            })
            .collect())
    }
}
