use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use super::tabular::{write_rows, TabularError};
use crate::health::report::{ReportError, ReportHandle, ReportRow, ReportSink};
use crate::health::signals::SignalCatalog;

const FIXED_COLUMNS: [&str; 5] = ["customer_id", "score", "tier", "fg_color", "bg_color"];
const SCORE_COLUMN: usize = 1;

/// One CSV report per run under the report directory, named after the run start.
/// Runs starting within the same second get a numeric suffix.
pub struct CsvReportSink {
    report_dir: PathBuf,
}

impl CsvReportSink {
    pub fn new(report_dir: impl Into<PathBuf>) -> Self {
        Self {
            report_dir: report_dir.into(),
        }
    }

    /// Claims `report-<stamp>.csv`, or `report-<stamp>-<n>.csv` when an earlier report
    /// already holds the name.
    fn reserve(&self, stamp: &str) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(&self.report_dir)
            .map_err(|source| TabularError::io(&self.report_dir, source))?;
        for attempt in 0u32.. {
            let name = match attempt {
                0 => format!("report-{stamp}.csv"),
                n => format!("report-{stamp}-{n}.csv"),
            };
            let path = self.report_dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(path),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(TabularError::io(&path, source).into()),
            }
        }
        Err(ReportError::Unavailable(format!("no free report name for {stamp}")))
    }

    fn existing(report: &ReportHandle) -> Result<&Path, ReportError> {
        let path = Path::new(&report.0);
        if path.exists() {
            Ok(path)
        } else {
            Err(ReportError::Missing(report.clone()))
        }
    }
}

fn row_record(row: &ReportRow) -> Vec<String> {
    let tier = row.tier.as_ref();
    let mut record = vec![
        row.customer_id.to_string(),
        format!("{:.4}", row.score),
        tier.map(|tier| tier.level.to_string()).unwrap_or_default(),
        tier.and_then(|tier| tier.fg_color.clone()).unwrap_or_default(),
        tier.and_then(|tier| tier.bg_color.clone()).unwrap_or_default(),
    ];
    record.extend(row.cells.iter().cloned());
    record
}

fn score_of(record: &[String]) -> f64 {
    record
        .get(SCORE_COLUMN)
        .and_then(|score| score.parse::<f64>().ok())
        .unwrap_or(f64::NEG_INFINITY)
}

impl ReportSink for CsvReportSink {
    fn provision(
        &self,
        started_at: DateTime<Utc>,
        catalog: &SignalCatalog,
    ) -> Result<ReportHandle, ReportError> {
        let path = self.reserve(&started_at.format("%Y%m%d-%H%M%S").to_string())?;

        let headers: Vec<&str> = FIXED_COLUMNS
            .iter()
            .copied()
            .chain(catalog.included().map(|definition| definition.display_name.as_str()))
            .collect();
        write_rows::<Vec<String>>(&path, &headers, &[])?;

        info!(path = %path.display(), "provisioned report");
        Ok(ReportHandle(path.to_string_lossy().into_owned()))
    }

    fn append(&self, report: &ReportHandle, rows: &[ReportRow]) -> Result<(), ReportError> {
        let path = Self::existing(report)?;
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|source| TabularError::io(path, source))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for row in rows {
            writer
                .write_record(row_record(row))
                .map_err(|source| TabularError::csv(path, source))?;
        }
        writer
            .flush()
            .map_err(|source| TabularError::io(path, source))?;
        Ok(())
    }

    /// Re-sorts the whole report by descending score; rows from earlier batches are
    /// interleaved with later ones.
    fn finalize(&self, report: &ReportHandle) -> Result<(), ReportError> {
        let path = Self::existing(report)?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|source| TabularError::csv(path, source))?;
        let headers: Vec<String> = reader
            .headers()
            .map_err(|source| TabularError::csv(path, source))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut records = reader
            .records()
            .map(|record| record.map(|record| record.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()
            .map_err(|source| TabularError::csv(path, source))?;
        records.sort_by(|a, b| score_of(b).total_cmp(&score_of(a)));

        let headers: Vec<&str> = headers.iter().map(String::as_str).collect();
        write_rows(path, &headers, &records)?;
        info!(path = %path.display(), rows = records.len(), "report finalized");
        Ok(())
    }
}
