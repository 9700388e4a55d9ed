/// Aggregation state file so the running day survives restarts
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

use crate::aggregation::AggregationPeriod;
use crate::error::PersistenceError;
use crate::models::MetricReport;

/// Everything that has to survive a restart
///
/// Finalized days stay in `unpublished` until the reporting backend has
/// accepted them, so a failed publish or a crash after rollover does not
/// lose the day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedState {
    #[serde(flatten)]
    pub period: AggregationPeriod,
    #[serde(default)]
    pub unpublished: Vec<MetricReport>,
}

impl SavedState {
    pub fn new(period: AggregationPeriod) -> Self {
        Self {
            period,
            unpublished: Vec::new(),
        }
    }
}

/// Durable storage for the in-progress aggregation period
pub trait StateStore {
    /// Previously saved state, or None when nothing was saved yet
    fn load(&self) -> Result<Option<SavedState>, PersistenceError>;
    fn save(&self, state: &SavedState) -> Result<(), PersistenceError>;
}

/// JSON file store, replaced atomically on every save
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Option<SavedState>, PersistenceError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state: SavedState = serde_json::from_str(&content)?;
        Ok(Some(state))
    }

    fn save(&self, state: &SavedState) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(state)?;
        let temp = self.temp_path();
        fs::write(&temp, content)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

/// Load the saved state, or start an empty period at `now`
///
/// Unreadable files and files from an older format are treated as if no
/// state had been saved.
pub fn load_or_default(store: &dyn StateStore, now: OffsetDateTime) -> SavedState {
    match store.load() {
        Ok(Some(state)) => state,
        Ok(None) => {
            debug!("No saved aggregation state, starting a new period");
            SavedState::new(AggregationPeriod::new(now))
        }
        Err(e) => {
            warn!("Unable to load aggregation state, starting a new period: {}", e);
            SavedState::new(AggregationPeriod::new(now))
        }
    }
}
