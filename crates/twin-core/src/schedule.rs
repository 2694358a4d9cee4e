//! Durable schedule ledger: which training and prediction windows have run.
//!
//! The ledger is loaded once per run, mutated in memory and written back with
//! an atomic replace after every recorded action. Each `record_*` call reloads
//! the file first so a concurrent invocation's entries are merged rather than
//! overwritten, then re-checks membership before appending.

use crate::error::{Result, TwinError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

// ---------------------------------------------------------------------------
// ScheduleState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleState {
    #[serde(default = "default_version")]
    pub version: u32,
    pub model_trainings: Vec<i64>,
    pub predictions: Vec<i64>,
}

fn default_version() -> u32 {
    1
}

impl Default for ScheduleState {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleState {
    pub fn new() -> Self {
        Self {
            version: default_version(),
            model_trainings: Vec::new(),
            predictions: Vec::new(),
        }
    }

    /// Entries must be strictly increasing (which also makes them unique).
    fn check(&self) -> std::result::Result<(), String> {
        for (name, entries) in [
            ("model_trainings", &self.model_trainings),
            ("predictions", &self.predictions),
        ] {
            if let Some(w) = entries.windows(2).find(|w| w[0] >= w[1]) {
                return Err(format!(
                    "'{name}' must be strictly increasing, found {} before {}",
                    w[0], w[1]
                ));
            }
        }
        Ok(())
    }
}

/// Insert `value` keeping `entries` sorted. Returns false if already present.
fn insert_sorted(entries: &mut Vec<i64>, value: i64) -> bool {
    match entries.binary_search(&value) {
        Ok(_) => false,
        Err(pos) => {
            entries.insert(pos, value);
            true
        }
    }
}

// ---------------------------------------------------------------------------
// ScheduleLedger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Training,
    Prediction,
}

/// File-backed [`ScheduleState`].
#[derive(Debug)]
pub struct ScheduleLedger {
    path: PathBuf,
    state: ScheduleState,
}

impl ScheduleLedger {
    /// Load the ledger for a project root. A missing file is an empty ledger.
    pub fn open(root: &Path) -> Result<Self> {
        Self::open_at(paths::schedule_path(root))
    }

    pub fn open_at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = Self::read(&path)?;
        Ok(Self { path, state })
    }

    /// Write an empty ledger if none exists. Returns true if written.
    pub fn init(root: &Path) -> Result<bool> {
        let data = serde_json::to_string_pretty(&ScheduleState::new())?;
        crate::io::write_if_missing(&paths::schedule_path(root), data.as_bytes())
    }

    fn read(path: &Path) -> Result<ScheduleState> {
        if !path.exists() {
            return Ok(ScheduleState::new());
        }
        let data = std::fs::read_to_string(path)?;
        let corrupt = |reason: String| TwinError::ScheduleCorrupt {
            path: path.to_path_buf(),
            reason,
        };
        let state: ScheduleState =
            serde_json::from_str(&data).map_err(|e| corrupt(e.to_string()))?;
        state.check().map_err(corrupt)?;
        Ok(state)
    }

    fn save(&self) -> Result<()> {
        let data = serde_json::to_string_pretty(&self.state)?;
        crate::io::atomic_write(&self.path, data.as_bytes())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn has_training_entry(&self, window_end: i64) -> bool {
        self.state.model_trainings.binary_search(&window_end).is_ok()
    }

    pub fn has_prediction_entry(&self, window_end: i64) -> bool {
        self.state.predictions.binary_search(&window_end).is_ok()
    }

    /// Newest prediction window end, or 0 when none has run yet.
    pub fn last_prediction_entry(&self) -> i64 {
        self.state.predictions.last().copied().unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Record a completed training window. Returns false if it was already present.
    pub fn record_training(&mut self, window_end: i64) -> Result<bool> {
        self.record(Entry::Training, window_end)
    }

    /// Record a completed prediction window. Returns false if it was already present.
    pub fn record_prediction(&mut self, window_end: i64) -> Result<bool> {
        self.record(Entry::Prediction, window_end)
    }

    fn record(&mut self, entry: Entry, window_end: i64) -> Result<bool> {
        let mut fresh = Self::read(&self.path)?;
        let entries = match entry {
            Entry::Training => &mut fresh.model_trainings,
            Entry::Prediction => &mut fresh.predictions,
        };
        let added = insert_sorted(entries, window_end);
        self.state = fresh;
        if added {
            self.save()?;
            debug!(?entry, window_end, "schedule ledger updated");
        }
        Ok(added)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
