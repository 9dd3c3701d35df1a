use std::{collections::BTreeMap, fs, io, path::Path};

use serde::Deserialize;
use thiserror::Error;

/// A fixture record as written by the framework's dump command.
#[derive(Debug, Deserialize)]
struct FixtureRecord {
    model: String,
    #[serde(rename = "fields")]
    _fields: serde_json::Map<String, serde_json::Value>,
}

/// Record counts of a validated fixture file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub records: usize,
    pub models: BTreeMap<String, usize>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot {path} could not be read: {source}")]
    Read { path: String, source: io::Error },
    #[error("snapshot {path} is not a valid fixture: {source}")]
    Decode {
        path: String,
        source: serde_json::Error,
    },
    #[error("snapshot {path} record {index} has an invalid model label '{model}'")]
    InvalidModel {
        path: String,
        index: usize,
        model: String,
    },
}

/// Reads and validates a JSON fixture without touching the database.
///
/// Model labels must have the `app_label.model` form.
pub fn inspect(path: &Path) -> Result<SnapshotSummary, SnapshotError> {
    let display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| SnapshotError::Read {
        path: display.clone(),
        source,
    })?;
    let records: Vec<FixtureRecord> =
        serde_json::from_str(&raw).map_err(|source| SnapshotError::Decode {
            path: display.clone(),
            source,
        })?;

    let mut models = BTreeMap::new();
    for (index, record) in records.iter().enumerate() {
        let valid = record
            .model
            .split_once('.')
            .is_some_and(|(app, model)| !app.is_empty() && !model.is_empty() && !model.contains('.'));
        if !valid {
            return Err(SnapshotError::InvalidModel {
                path: display,
                index,
                model: record.model.clone(),
            });
        }
        *models.entry(record.model.to_ascii_lowercase()).or_insert(0) += 1;
    }

    Ok(SnapshotSummary {
        records: records.len(),
        models,
    })
}
