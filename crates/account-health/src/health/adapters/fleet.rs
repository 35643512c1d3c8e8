use std::path::PathBuf;

use serde::Deserialize;

use super::tabular::read_existing_rows;
use crate::health::domain::CustomerId;
use crate::health::sources::{FleetEnumerator, SourceError};

#[derive(Debug, Deserialize)]
struct FleetRow {
    customer_id: String,
    #[serde(default)]
    labels: String,
}

impl FleetRow {
    fn has_label(&self, label: &str) -> bool {
        self.labels
            .split(';')
            .map(str::trim)
            .any(|candidate| candidate == label)
    }
}

/// Managed accounts listed in `accounts_fleet.csv`, labels separated by `;`.
pub struct CsvFleet {
    path: PathBuf,
}

impl CsvFleet {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FleetEnumerator for CsvFleet {
    fn list_accounts(&self, label: Option<&str>) -> Result<Vec<CustomerId>, SourceError> {
        let rows: Vec<FleetRow> = read_existing_rows(&self.path)?;
        Ok(rows
            .into_iter()
            .filter(|row| !row.customer_id.is_empty())
            .filter(|row| label.map_or(true, |label| row.has_label(label)))
            .map(|row| CustomerId(row.customer_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn filters_by_exact_label() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("accounts_fleet.csv");
        fs::write(
            &path,
            "customer_id,name,labels\n\
             111-222-3333,Acme,Managed;Retail\n\
             222-333-4444,Globex,Managed-Trial\n\
             333-444-5555,Initech,\n\
             444-555-6666,Umbrella, Managed \n",
        )
        .expect("write fleet");
        let fleet = CsvFleet::new(&path);

        assert_eq!(fleet.list_accounts(None).expect("list").len(), 4);
        assert_eq!(
            fleet.list_accounts(Some("Managed")).expect("list"),
            vec![
                CustomerId::from("111-222-3333"),
                CustomerId::from("444-555-6666")
            ]
        );
        assert!(fleet
            .list_accounts(Some("Wholesale"))
            .expect("list")
            .is_empty());
    }

    #[test]
    fn missing_fleet_file_is_unavailable() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let fleet = CsvFleet::new(dir.path().join("accounts_fleet.csv"));
        assert!(matches!(
            fleet.list_accounts(None),
            Err(SourceError::Unavailable(_))
        ));
    }
}
