use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::health::report::ReportError;
use crate::health::repository::StoreError;
use crate::health::sources::SourceError;

#[derive(Debug, thiserror::Error)]
pub enum TabularError {
    #[error("{path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("{path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("{0} does not exist")]
    NotFound(PathBuf),
}

impl TabularError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reads every row of a headed CSV file. A missing file yields no rows.
pub(crate) fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, TabularError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    read_existing_rows(path)
}

/// Like `read_rows`, but the file must exist.
pub(crate) fn read_existing_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, TabularError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| {
            let missing = matches!(
                source.kind(),
                csv::ErrorKind::Io(err) if err.kind() == io::ErrorKind::NotFound
            );
            if missing {
                TabularError::NotFound(path.to_path_buf())
            } else {
                TabularError::csv(path, source)
            }
        })?;

    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|source| TabularError::csv(path, source))
}

/// Replaces the file contents through a sibling temp file and a rename, so readers
/// never observe a half-written table. The temp file is synced before the rename.
pub(crate) fn write_rows<T: Serialize>(
    path: &Path,
    headers: &[&str],
    rows: &[T],
) -> Result<(), TabularError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| TabularError::io(parent, source))?;
    }

    let temp = temp_path(path);
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&temp)
            .map_err(|source| TabularError::csv(&temp, source))?;
        writer
            .write_record(headers)
            .map_err(|source| TabularError::csv(&temp, source))?;
        for row in rows {
            writer
                .serialize(row)
                .map_err(|source| TabularError::csv(&temp, source))?;
        }
        let file = writer
            .into_inner()
            .map_err(|err| TabularError::io(&temp, err.into_error()))?;
        file.sync_all()
            .map_err(|source| TabularError::io(&temp, source))?;
    }

    fs::rename(&temp, path).map_err(|source| TabularError::io(path, source))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl From<TabularError> for StoreError {
    fn from(err: TabularError) -> Self {
        match err {
            TabularError::Csv { .. } => StoreError::Corrupt(err.to_string()),
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

impl From<TabularError> for SourceError {
    fn from(err: TabularError) -> Self {
        match err {
            TabularError::Csv { .. } => SourceError::Malformed(err.to_string()),
            _ => SourceError::Unavailable(err.to_string()),
        }
    }
}

impl From<TabularError> for ReportError {
    fn from(err: TabularError) -> Self {
        ReportError::Unavailable(err.to_string())
    }
}
