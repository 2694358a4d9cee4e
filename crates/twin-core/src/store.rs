//! Tabular stores for sensor readings, results and predictions.
//!
//! The pipeline only talks to the [`SensorSource`] and [`RecordStore`] traits.
//! The SQLite tables below are the stock implementation: one file per
//! configured database, table name `<schema>_<table>`, column names taken from
//! the config. Range queries are inclusive on both ends and return rows in no
//! particular order.

use crate::config::{Config, TableConfig};
use crate::error::{Result, TwinError};
use crate::paths;
use crate::types::{DestructionRecord, SensorSample, TimestampBounds};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Read side of the raw sensor table.
pub trait SensorSource {
    fn bounds(&self) -> Result<TimestampBounds>;
    fn load_range(&self, start: i64, stop: i64) -> Result<Vec<SensorSample>>;
}

/// Append-only destruction table (results or predictions).
pub trait RecordStore {
    fn name(&self) -> &str;
    fn bounds(&self) -> Result<TimestampBounds>;
    fn load_range(&self, start: i64, stop: i64) -> Result<Vec<DestructionRecord>>;
    /// Accumulated destruction stored at exactly `timestamp`.
    fn accumulated_at(&self, timestamp: i64) -> Result<Option<f64>>;
    /// Insert all records or none. Returns the number of rows written.
    fn insert(&mut self, records: &[DestructionRecord]) -> Result<usize>;

    /// Accumulated destruction at the newest stored timestamp.
    fn latest_accumulated(&self) -> Result<Option<f64>> {
        match self.bounds()?.max {
            Some(ts) => self.accumulated_at(ts),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// SQLite helpers
// ---------------------------------------------------------------------------

fn open_connection(root: &Path, server: &str, table: &TableConfig) -> Result<Connection> {
    let path = paths::database_path(root, server, &table.database);
    crate::io::ensure_dir(path.parent().unwrap_or(root))?;
    let conn = Connection::open(path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(conn)
}

fn bounds_query(conn: &Connection, table: &str, ts: &str) -> Result<TimestampBounds> {
    let sql = format!("SELECT MIN({ts}), MAX({ts}) FROM {table}");
    let (min, max) = conn.query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(TimestampBounds { min, max })
}

fn is_constraint(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

// ---------------------------------------------------------------------------
// SqliteSensorTable
// ---------------------------------------------------------------------------

pub struct SqliteSensorTable {
    conn: Connection,
    table: String,
    columns: [String; 4],
}

impl SqliteSensorTable {
    pub fn open(root: &Path, config: &Config) -> Result<Self> {
        let conn = open_connection(root, &config.server, &config.sensors)?;
        Self::with_connection(conn, &config.sensors)
    }

    pub fn with_connection(conn: Connection, table: &TableConfig) -> Result<Self> {
        let columns: [String; 4] = table
            .columns
            .clone()
            .try_into()
            .map_err(|_| TwinError::InvalidConfig("sensors: expected 4 columns".into()))?;
        let this = Self {
            conn,
            table: table.qualified_name(),
            columns,
        };
        this.create_table()?;
        Ok(this)
    }

    fn create_table(&self) -> Result<()> {
        let [ts, torque, speed, oil] = &self.columns;
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {t} (
                {ts} INTEGER PRIMARY KEY,
                {torque} REAL NOT NULL,
                {speed} REAL NOT NULL,
                {oil} REAL NOT NULL
            );",
            t = self.table
        ))?;
        Ok(())
    }

    /// Bulk-load readings (used by the synthetic data generator and tests).
    pub fn insert(&mut self, samples: &[SensorSample]) -> Result<usize> {
        let [ts, torque, speed, oil] = &self.columns;
        let sql = format!(
            "INSERT INTO {} ({ts}, {torque}, {speed}, {oil}) VALUES (?1, ?2, ?3, ?4)",
            self.table
        );
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for s in samples {
                stmt.execute(params![s.timestamp, s.torque, s.speed, s.oil_temperature])
                    .map_err(|e| {
                        if is_constraint(&e) {
                            TwinError::DuplicateRecords {
                                table: self.table.clone(),
                                start: s.timestamp,
                            }
                        } else {
                            e.into()
                        }
                    })?;
            }
        }
        tx.commit()?;
        Ok(samples.len())
    }
}

impl SensorSource for SqliteSensorTable {
    fn bounds(&self) -> Result<TimestampBounds> {
        bounds_query(&self.conn, &self.table, &self.columns[0])
    }

    fn load_range(&self, start: i64, stop: i64) -> Result<Vec<SensorSample>> {
        let [ts, torque, speed, oil] = &self.columns;
        let sql = format!(
            "SELECT {ts}, {torque}, {speed}, {oil} FROM {} WHERE {ts} >= ?1 AND {ts} <= ?2",
            self.table
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![start, stop], |row| {
            Ok(SensorSample {
                timestamp: row.get(0)?,
                torque: row.get(1)?,
                speed: row.get(2)?,
                oil_temperature: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

// ---------------------------------------------------------------------------
// SqliteRecordTable
// ---------------------------------------------------------------------------

pub struct SqliteRecordTable {
    conn: Connection,
    table: String,
    columns: [String; 3],
}

impl SqliteRecordTable {
    pub fn open_results(root: &Path, config: &Config) -> Result<Self> {
        let conn = open_connection(root, &config.server, &config.results)?;
        Self::with_connection(conn, &config.results)
    }

    pub fn open_predictions(root: &Path, config: &Config) -> Result<Self> {
        let conn = open_connection(root, &config.server, &config.predictions)?;
        Self::with_connection(conn, &config.predictions)
    }

    pub fn with_connection(conn: Connection, table: &TableConfig) -> Result<Self> {
        let columns: [String; 3] = table.columns.clone().try_into().map_err(|_| {
            TwinError::InvalidConfig(format!("{}: expected 3 columns", table.table))
        })?;
        let this = Self {
            conn,
            table: table.qualified_name(),
            columns,
        };
        this.create_table()?;
        Ok(this)
    }

    fn create_table(&self) -> Result<()> {
        let [ts, d, acc] = &self.columns;
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {t} (
                {ts} INTEGER PRIMARY KEY,
                {d} REAL NOT NULL,
                {acc} REAL NOT NULL
            );",
            t = self.table
        ))?;
        Ok(())
    }
}

impl RecordStore for SqliteRecordTable {
    fn name(&self) -> &str {
        &self.table
    }

    fn bounds(&self) -> Result<TimestampBounds> {
        bounds_query(&self.conn, &self.table, &self.columns[0])
    }

    fn load_range(&self, start: i64, stop: i64) -> Result<Vec<DestructionRecord>> {
        let [ts, d, acc] = &self.columns;
        let sql = format!(
            "SELECT {ts}, {d}, {acc} FROM {} WHERE {ts} >= ?1 AND {ts} <= ?2",
            self.table
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![start, stop], |row| {
            Ok(DestructionRecord {
                timestamp: row.get(0)?,
                destruction: row.get(1)?,
                accumulated_destruction: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn accumulated_at(&self, timestamp: i64) -> Result<Option<f64>> {
        let [ts, _, acc] = &self.columns;
        let sql = format!("SELECT {acc} FROM {} WHERE {ts} = ?1", self.table);
        Ok(self
            .conn
            .query_row(&sql, params![timestamp], |row| row.get(0))
            .optional()?)
    }

    fn insert(&mut self, records: &[DestructionRecord]) -> Result<usize> {
        let [ts, d, acc] = &self.columns;
        let sql = format!(
            "INSERT INTO {} ({ts}, {d}, {acc}) VALUES (?1, ?2, ?3)",
            self.table
        );
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for r in records {
                stmt.execute(params![r.timestamp, r.destruction, r.accumulated_destruction])
                    .map_err(|e| {
                        if is_constraint(&e) {
                            TwinError::DuplicateRecords {
                                table: self.table.clone(),
                                start: r.timestamp,
                            }
                        } else {
                            e.into()
                        }
                    })?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
