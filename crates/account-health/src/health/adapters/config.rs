use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use super::tabular::{read_existing_rows, write_rows, TabularError};
use crate::health::settings::SettingsMap;
use crate::health::signals::{Direction, SignalDefinition, SignalType};
use crate::health::sources::{ConfigSource, SourceError};

const SETTING_HEADERS: [&str; 2] = ["key", "value"];

#[derive(Debug, Deserialize)]
struct SignalRow {
    name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    display_name: Option<String>,
    #[serde(default)]
    include: String,
    #[serde(rename = "type", default)]
    signal_type: String,
    #[serde(default)]
    direction: String,
    #[serde(default)]
    format: String,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
}

impl SignalRow {
    fn into_definition(self) -> Result<SignalDefinition, SourceError> {
        let name = self.name.trim().to_string();
        let blank = name.is_empty();

        let signal_type = match SignalType::parse(&self.signal_type) {
            Some(signal_type) => signal_type,
            None if blank => SignalType::String,
            None => {
                return Err(SourceError::Malformed(format!(
                    "signal '{name}' has unknown type '{}'",
                    self.signal_type
                )))
            }
        };
        let direction = match Direction::parse(&self.direction) {
            Some(direction) => direction,
            None if blank => Direction::None,
            None => {
                return Err(SourceError::Malformed(format!(
                    "signal '{name}' has unknown direction '{}'",
                    self.direction
                )))
            }
        };

        Ok(SignalDefinition {
            display_name: self.display_name.unwrap_or_else(|| name.clone()),
            name,
            include_in_report: parse_flag(&self.include),
            signal_type,
            direction,
            format: self.format,
            weight: self.weight.unwrap_or(0.0),
            min: self.min,
            max: self.max,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SettingRow {
    key: String,
    #[serde(default)]
    value: String,
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "y" | "1" | "x"
    )
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

/// Signal catalog (`signals.csv`), settings (`settings.csv`) and the edit lock marker
/// (`config.lock`) held for the lifetime of a run.
///
/// Locking copies both tables to `<name>.run` siblings; while the marker exists, loads
/// read those copies so the live tables can change without affecting the open run.
pub struct FileConfigSource {
    signals_path: PathBuf,
    settings_path: PathBuf,
    lock_path: PathBuf,
    signals_snapshot: PathBuf,
    settings_snapshot: PathBuf,
}

fn snapshot_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".run");
    path.with_file_name(name)
}

fn remove_if_present(path: &Path) -> Result<(), SourceError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(TabularError::io(path, err).into()),
    }
}

impl FileConfigSource {
    pub fn new(
        signals_path: impl Into<PathBuf>,
        settings_path: impl Into<PathBuf>,
        lock_path: impl Into<PathBuf>,
    ) -> Self {
        let signals_path = signals_path.into();
        let settings_path = settings_path.into();
        Self {
            signals_snapshot: snapshot_path(&signals_path),
            settings_snapshot: snapshot_path(&settings_path),
            signals_path,
            settings_path,
            lock_path: lock_path.into(),
        }
    }

    /// The snapshot while locked, the live table otherwise.
    fn active<'a>(&self, live: &'a Path, snapshot: &'a Path) -> &'a Path {
        if self.lock_path.exists() && snapshot.exists() {
            snapshot
        } else {
            live
        }
    }

    fn setting_rows(&self, path: &Path) -> Result<Vec<SettingRow>, SourceError> {
        Ok(read_existing_rows(path)?)
    }

    fn copy_to_snapshot(from: &Path, to: &Path) -> Result<(), SourceError> {
        if !from.exists() {
            return Err(TabularError::NotFound(from.to_path_buf()).into());
        }
        fs::copy(from, to).map_err(|source| TabularError::io(to, source))?;
        Ok(())
    }
}

impl ConfigSource for FileConfigSource {
    fn load_signal_definitions(&self) -> Result<Vec<SignalDefinition>, SourceError> {
        let path = self.active(&self.signals_path, &self.signals_snapshot);
        let rows: Vec<SignalRow> = read_existing_rows(path)?;
        rows.into_iter().map(SignalRow::into_definition).collect()
    }

    fn load_settings(&self) -> Result<SettingsMap, SourceError> {
        let path = self.active(&self.settings_path, &self.settings_snapshot);
        Ok(self
            .setting_rows(path)?
            .into_iter()
            .map(|row| (row.key.trim().to_string(), row.value))
            .collect())
    }

    /// Snapshots are written before the marker, so a present marker always has its
    /// copies next to it.
    fn lock(&self) -> Result<(), SourceError> {
        if self.lock_path.exists() {
            return Ok(());
        }
        Self::copy_to_snapshot(&self.signals_path, &self.signals_snapshot)?;
        Self::copy_to_snapshot(&self.settings_path, &self.settings_snapshot)?;
        fs::write(&self.lock_path, format!("{}\n", Utc::now().to_rfc3339()))
            .map_err(|source| TabularError::io(&self.lock_path, source))?;
        info!(path = %self.lock_path.display(), "configuration locked");
        Ok(())
    }

    fn unlock(&self) -> Result<(), SourceError> {
        let was_locked = self.lock_path.exists();
        remove_if_present(&self.lock_path)?;
        remove_if_present(&self.signals_snapshot)?;
        remove_if_present(&self.settings_snapshot)?;
        if was_locked {
            info!(path = %self.lock_path.display(), "configuration unlocked");
        }
        Ok(())
    }

    fn is_locked(&self) -> Result<bool, SourceError> {
        Ok(self.lock_path.exists())
    }

    fn update_setting(&self, key: &str, value: &str) -> Result<(), SourceError> {
        if self.is_locked()? {
            return Err(SourceError::Locked);
        }

        let mut rows = match self.setting_rows(&self.settings_path) {
            Ok(rows) => rows,
            Err(SourceError::Unavailable(_)) if !self.settings_path.exists() => Vec::new(),
            Err(err) => return Err(err),
        };

        match rows.iter_mut().find(|row| row.key.trim() == key) {
            Some(row) => row.value = value.to_string(),
            None => rows.push(SettingRow {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }

        write_rows(&self.settings_path, &SETTING_HEADERS, &rows)?;
        Ok(())
    }
}
