use crate::error::{Result, TwinError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const TWIN_DIR: &str = ".twin";
pub const MODELS_DIR: &str = ".twin/models";

pub const CONFIG_FILE: &str = ".twin/config.yaml";
pub const CONFIG_FILE_JSON: &str = ".twin/config.json";
pub const SCHEDULE_FILE: &str = ".twin/prediction_schedule.json";

pub const DATABASE_EXT: &str = "sqlite3";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn twin_dir(root: &Path) -> PathBuf {
    root.join(TWIN_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn config_json_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_JSON)
}

pub fn schedule_path(root: &Path) -> PathBuf {
    root.join(SCHEDULE_FILE)
}

/// Resolve a configured directory relative to the project root unless absolute.
pub fn resolve(root: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        root.join(configured)
    }
}

/// `.twin/<server>/<database>.sqlite3`
pub fn database_path(root: &Path, server: &str, database: &str) -> PathBuf {
    twin_dir(root)
        .join(server)
        .join(format!("{database}.{DATABASE_EXT}"))
}

// ---------------------------------------------------------------------------
// Identifier validation
// ---------------------------------------------------------------------------

static IDENT_RE: OnceLock<Regex> = OnceLock::new();

fn ident_re() -> &'static Regex {
    IDENT_RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

/// Table, schema, column and database names are interpolated into SQL and
/// file names, so they are restricted to plain identifiers.
pub fn validate_ident(ident: &str) -> Result<()> {
    if ident.is_empty() || ident.len() > 64 || !ident_re().is_match(ident) {
        return Err(TwinError::InvalidConfig(format!(
            "'{ident}' is not a valid identifier"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_idents() {
        for ident in ["results", "dbo", "oil_temperature", "_t1", "Sensor_readings"] {
            validate_ident(ident).unwrap_or_else(|_| panic!("expected valid: {ident}"));
        }
    }

    #[test]
    fn invalid_idents() {
        for ident in ["", "1table", "has space", "semi;colon", "dash-ed", "a.b"] {
            assert!(validate_ident(ident).is_err(), "expected invalid: {ident}");
        }
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/plant");
        assert_eq!(
            config_path(root),
            PathBuf::from("/tmp/plant/.twin/config.yaml")
        );
        assert_eq!(
            schedule_path(root),
            PathBuf::from("/tmp/plant/.twin/prediction_schedule.json")
        );
        assert_eq!(
            database_path(root, "local", "Results"),
            PathBuf::from("/tmp/plant/.twin/local/Results.sqlite3")
        );
        assert_eq!(
            resolve(root, Path::new("/abs/models")),
            PathBuf::from("/abs/models")
        );
    }
}
