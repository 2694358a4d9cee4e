use crate::error::{Result, TwinError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// TableConfig
// ---------------------------------------------------------------------------

pub const SENSOR_COLUMNS: [&str; 4] = ["timestamp", "torque", "speed", "oil_temperature"];
pub const RECORD_COLUMNS: [&str; 3] = ["timestamp", "destruction", "accumulated_destruction"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    pub database: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table: String,
    pub columns: Vec<String>,
}

fn default_schema() -> String {
    "dbo".to_string()
}

impl TableConfig {
    fn with_columns(database: &str, table: &str, columns: &[&str]) -> Self {
        Self {
            database: database.to_string(),
            schema: default_schema(),
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// `<schema>_<table>`, the name used inside the SQLite file.
    pub fn qualified_name(&self) -> String {
        format!("{}_{}", self.schema, self.table)
    }

    fn check(&self, section: &str, expected_columns: usize, warnings: &mut Vec<ConfigWarning>) {
        let idents = [&self.database, &self.schema, &self.table]
            .into_iter()
            .chain(self.columns.iter());
        for ident in idents {
            if paths::validate_ident(ident).is_err() {
                warnings.push(error(format!(
                    "{section}: '{ident}' is not a valid identifier"
                )));
            }
        }
        if self.columns.len() != expected_columns {
            warnings.push(error(format!(
                "{section}: expected {expected_columns} columns, found {}",
                self.columns.len()
            )));
        }
    }
}

// ---------------------------------------------------------------------------
// BatchConfig
// ---------------------------------------------------------------------------

/// Durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub calculations_batch_size: i64,
    pub training_batch_size: i64,
    pub predictions_batch_size: i64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            calculations_batch_size: 60 * 60,
            training_batch_size: 24 * 60 * 60,
            predictions_batch_size: 60 * 60,
        }
    }
}

// ---------------------------------------------------------------------------
// ModelConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_dir")]
    pub dir: PathBuf,
    /// Training targets are rounded to this many decimal digits before fitting.
    #[serde(default = "default_target_decimals")]
    pub target_decimals: u32,
}

fn default_model_dir() -> PathBuf {
    PathBuf::from(paths::MODELS_DIR)
}

fn default_target_decimals() -> u32 {
    9
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: default_model_dir(),
            target_decimals: default_target_decimals(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Directory under `.twin/` holding the database files.
    pub server: String,
    pub sensors: TableConfig,
    pub results: TableConfig,
    pub predictions: TableConfig,
    pub data_batches: BatchConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

fn default_version() -> u32 {
    1
}

fn error(message: String) -> ConfigWarning {
    ConfigWarning {
        level: WarnLevel::Error,
        message,
    }
}

fn warning(message: String) -> ConfigWarning {
    ConfigWarning {
        level: WarnLevel::Warning,
        message,
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            server: "local".to_string(),
            sensors: TableConfig::with_columns("Sensor_readings", "sensor_readings", &SENSOR_COLUMNS),
            results: TableConfig::with_columns("Results", "results", &RECORD_COLUMNS),
            predictions: TableConfig::with_columns("Results", "predictions", &RECORD_COLUMNS),
            data_batches: BatchConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl Config {
    /// Load `.twin/config.yaml`, falling back to `.twin/config.json`, and
    /// reject it if validation reports any error.
    pub fn load(root: &Path) -> Result<Self> {
        let cfg = Self::read(root)?;
        let mut errors = Vec::new();
        for w in cfg.validate() {
            match w.level {
                WarnLevel::Warning => warn!("config: {}", w.message),
                WarnLevel::Error => errors.push(w.message),
            }
        }
        if !errors.is_empty() {
            return Err(TwinError::InvalidConfig(errors.join("; ")));
        }
        Ok(cfg)
    }

    /// Parse the config file without validating it.
    pub fn read(root: &Path) -> Result<Self> {
        let yaml = paths::config_path(root);
        let json = paths::config_json_path(root);
        if yaml.exists() {
            Ok(serde_yaml::from_str(&std::fs::read_to_string(&yaml)?)?)
        } else if json.exists() {
            Ok(serde_json::from_str(&std::fs::read_to_string(&json)?)?)
        } else {
            Err(TwinError::ConfigMissing(yaml))
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn model_dir(&self, root: &Path) -> PathBuf {
        paths::resolve(root, &self.model.dir)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if paths::validate_ident(&self.server).is_err() {
            warnings.push(error(format!(
                "server: '{}' is not a valid identifier",
                self.server
            )));
        }
        self.sensors.check("sensors", SENSOR_COLUMNS.len(), &mut warnings);
        self.results.check("results", RECORD_COLUMNS.len(), &mut warnings);
        self.predictions
            .check("predictions", RECORD_COLUMNS.len(), &mut warnings);

        if self.results.database == self.predictions.database
            && self.results.qualified_name() == self.predictions.qualified_name()
        {
            warnings.push(error(
                "results and predictions must not share a table".to_string(),
            ));
        }

        let b = &self.data_batches;
        for (name, size) in [
            ("calculations_batch_size", b.calculations_batch_size),
            ("training_batch_size", b.training_batch_size),
            ("predictions_batch_size", b.predictions_batch_size),
        ] {
            if size <= 0 {
                warnings.push(error(format!("data_batches.{name} must be positive, got {size}")));
            }
        }
        if b.training_batch_size > 0 && b.training_batch_size < b.calculations_batch_size {
            warnings.push(warning(format!(
                "training_batch_size ({}) is smaller than calculations_batch_size ({})",
                b.training_batch_size, b.calculations_batch_size
            )));
        }
        if b.predictions_batch_size > b.training_batch_size {
            warnings.push(warning(format!(
                "predictions_batch_size ({}) exceeds training_batch_size ({})",
                b.predictions_batch_size, b.training_batch_size
            )));
        }
        if self.model.target_decimals > 15 {
            warnings.push(error(format!(
                "model.target_decimals={} exceeds f64 precision (max 15)",
                self.model.target_decimals
            )));
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
