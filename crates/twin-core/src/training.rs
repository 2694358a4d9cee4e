//! Retraining decisions and the model trainer.

use crate::error::{Result, TwinError};
use crate::model::{
    round_to_decimals, LinearRegressor, ModelArtifacts, Regressor, ACC_DESTRUCTION_MODEL,
    DESTRUCTION_MODEL,
};
use crate::schedule::ScheduleLedger;
use crate::store::{RecordStore, SensorSource};
use crate::types::{format_timestamp, BatchWindow, DestructionRecord, SensorSample};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

const SECONDS_PER_DAY: f64 = 24.0 * 60.0 * 60.0;

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum TrainingDecision {
    /// Less than one full training period of results exists.
    NotEnoughHistory { available_span: i64 },
    /// The newest full-period window was already trained on.
    AlreadyTrained { training_stop: i64 },
    Due { window: BatchWindow },
}

impl TrainingDecision {
    /// Prediction and validation only run once a full training period exists.
    pub fn threshold_met(&self) -> bool {
        !matches!(self, TrainingDecision::NotEnoughHistory { .. })
    }
}

/// Seconds of result history between the first and newest result, 0 when empty.
pub fn available_span(earliest: Option<i64>, latest: i64) -> i64 {
    earliest.map_or(0, |e| latest - e)
}

/// Decide whether a retrain is due.
///
/// Only whole multiples of `training_batch_size` are trained on; trailing
/// partial data waits until it completes a period.
pub fn plan_training(
    earliest: Option<i64>,
    latest: i64,
    training_batch_size: i64,
    ledger: &ScheduleLedger,
) -> TrainingDecision {
    let span = available_span(earliest, latest);
    let earliest = match earliest {
        Some(e) if span >= training_batch_size => e,
        _ => {
            return TrainingDecision::NotEnoughHistory {
                available_span: span,
            }
        }
    };
    let full_periods = span / training_batch_size;
    let training_stop = earliest + full_periods * training_batch_size;
    if ledger.has_training_entry(training_stop) {
        return TrainingDecision::AlreadyTrained { training_stop };
    }
    TrainingDecision::Due {
        window: BatchWindow::new(earliest, training_stop),
    }
}

// ---------------------------------------------------------------------------
// Trainer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub window: BatchWindow,
    pub samples: usize,
    pub days: i64,
    pub artifacts: Vec<PathBuf>,
}

/// Something that can fit the models for a window of history.
pub trait Trainer {
    fn train(&mut self, window: BatchWindow) -> Result<TrainingReport>;
}

/// Fits the destruction and accumulated-destruction regressors from the
/// sensor and results stores and writes them to the artifact directory.
pub struct ModelTrainer<'a, S: SensorSource, R: RecordStore> {
    pub sensors: &'a S,
    pub results: &'a R,
    pub artifacts: &'a ModelArtifacts,
    pub target_decimals: u32,
}

/// Pair sensor rows with result rows sharing a timestamp, ascending.
fn join_on_timestamp(
    mut sensors: Vec<SensorSample>,
    results: Vec<DestructionRecord>,
) -> Vec<(SensorSample, DestructionRecord)> {
    sensors.sort_by_key(|s| s.timestamp);
    let by_ts: HashMap<i64, DestructionRecord> =
        results.into_iter().map(|r| (r.timestamp, r)).collect();
    sensors
        .into_iter()
        .filter_map(|s| by_ts.get(&s.timestamp).map(|r| (s, *r)))
        .collect()
}

impl<S: SensorSource, R: RecordStore> Trainer for ModelTrainer<'_, S, R> {
    fn train(&mut self, window: BatchWindow) -> Result<TrainingReport> {
        let rows = join_on_timestamp(
            self.sensors.load_range(window.start, window.stop)?,
            self.results.load_range(window.start, window.stop)?,
        );
        let Some((first, _)) = rows.first() else {
            return Err(TwinError::InsufficientData {
                start: window.start,
            });
        };
        let origin = first.timestamp;
        debug!(rows = rows.len(), "training rows joined");

        let destruction_features: Vec<Vec<f64>> = rows.iter().map(|(s, _)| s.features()).collect();
        let destruction_targets: Vec<f64> = rows
            .iter()
            .map(|(_, r)| round_to_decimals(r.destruction, self.target_decimals))
            .collect();
        let elapsed_features: Vec<Vec<f64>> = rows
            .iter()
            .map(|(s, _)| vec![(s.timestamp - origin) as f64])
            .collect();
        let accumulated_targets: Vec<f64> = rows
            .iter()
            .map(|(_, r)| round_to_decimals(r.accumulated_destruction, self.target_decimals))
            .collect();

        let mut destruction_model = LinearRegressor::new();
        destruction_model.fit(&destruction_features, &destruction_targets)?;
        let mut accumulated_model = LinearRegressor::new();
        accumulated_model.fit(&elapsed_features, &accumulated_targets)?;

        let artifacts = vec![
            self.artifacts.save(DESTRUCTION_MODEL, &destruction_model)?,
            self.artifacts.save(ACC_DESTRUCTION_MODEL, &accumulated_model)?,
        ];
        let days = (window.span() as f64 / SECONDS_PER_DAY) as i64;
        info!(
            "models trained on {days} days of data ({} - {})",
            format_timestamp(window.start),
            format_timestamp(window.stop)
        );
        Ok(TrainingReport {
            window,
            samples: rows.len(),
            days,
            artifacts,
        })
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrainingOutcome {
    Skipped { decision: TrainingDecision },
    Trained { report: TrainingReport },
}

/// Plan, train if due, then record the window in the ledger.
///
/// The ledger entry is written only after the trainer succeeds, so a failed
/// or interrupted training is retried by the next invocation.
pub fn run_training<T: Trainer>(
    earliest: Option<i64>,
    latest: i64,
    training_batch_size: i64,
    ledger: &mut ScheduleLedger,
    trainer: &mut T,
) -> Result<(TrainingDecision, TrainingOutcome)> {
    let decision = plan_training(earliest, latest, training_batch_size, ledger);
    let TrainingDecision::Due { window } = decision else {
        return Ok((decision.clone(), TrainingOutcome::Skipped { decision }));
    };
    info!("training the model for the batch: {window}");
    let report = trainer.train(window)?;
    ledger.record_training(window.stop)?;
    Ok((decision, TrainingOutcome::Trained { report }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
