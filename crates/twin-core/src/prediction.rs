//! Prediction rounds: when one is due, how it is seeded, and the predictor.

use crate::accumulate::accumulate_increments;
use crate::error::{Result, TwinError};
use crate::model::{LinearRegressor, ModelArtifacts, Regressor, DESTRUCTION_MODEL};
use crate::schedule::ScheduleLedger;
use crate::store::{RecordStore, SensorSource};
use crate::types::{BatchWindow, SensorSample};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PredictionDecision {
    AlreadyPredicted { prediction_stop: i64 },
    /// The candidate window would overlap the last round or cover less than
    /// a full prediction period past it.
    TooSoon {
        prediction_stop: i64,
        last_performed: i64,
    },
    Due {
        window: BatchWindow,
        /// `Some` only for the very first round: the newest results total.
        /// `None` means continue from the last stored prediction total.
        seed: Option<f64>,
    },
}

/// Decide whether a new prediction round is due after the newest result.
pub fn plan_prediction(
    latest_result_timestamp: i64,
    latest_accumulated: f64,
    predictions_batch_size: i64,
    ledger: &ScheduleLedger,
) -> PredictionDecision {
    let start = latest_result_timestamp + 1;
    let stop = start + predictions_batch_size;
    let last_performed = ledger.last_prediction_entry();

    if ledger.has_prediction_entry(stop) {
        return PredictionDecision::AlreadyPredicted {
            prediction_stop: stop,
        };
    }
    if stop - last_performed <= predictions_batch_size {
        return PredictionDecision::TooSoon {
            prediction_stop: stop,
            last_performed,
        };
    }

    let seed = if ledger.state().predictions.is_empty() {
        Some(latest_accumulated)
    } else {
        None
    };
    PredictionDecision::Due {
        window: BatchWindow::new(start, stop),
        seed,
    }
}

// ---------------------------------------------------------------------------
// Predictor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionReport {
    pub window: BatchWindow,
    pub rows: usize,
    pub seed: f64,
    pub final_accumulated: Option<f64>,
}

pub trait Predictor {
    fn predict(&mut self, window: BatchWindow, seed: Option<f64>) -> Result<PredictionReport>;
}

/// Runs the stored destruction model over the window's sensor readings and
/// appends the predicted running total to the predictions store.
pub struct ModelPredictor<'a, S: SensorSource, P: RecordStore> {
    pub sensors: &'a S,
    pub predictions: &'a mut P,
    pub artifacts: &'a ModelArtifacts,
}

impl<S: SensorSource, P: RecordStore> ModelPredictor<'_, S, P> {
    fn steady_state_seed(&self) -> Result<f64> {
        match self.predictions.latest_accumulated()? {
            Some(total) => Ok(total),
            None => {
                warn!(
                    table = self.predictions.name(),
                    "ledger has prediction entries but the store is empty; seeding from 0"
                );
                Ok(0.0)
            }
        }
    }
}

impl<S: SensorSource, P: RecordStore> Predictor for ModelPredictor<'_, S, P> {
    fn predict(&mut self, window: BatchWindow, seed: Option<f64>) -> Result<PredictionReport> {
        let model: LinearRegressor = self.artifacts.load(DESTRUCTION_MODEL)?;

        let mut samples = self.sensors.load_range(window.start, window.stop)?;
        if samples.is_empty() {
            return Err(TwinError::InsufficientData {
                start: window.start,
            });
        }
        samples.sort_by_key(|s| s.timestamp);

        let features: Vec<Vec<f64>> = samples.iter().map(SensorSample::features).collect();
        let increments: Vec<(i64, f64)> = samples
            .iter()
            .map(|s| s.timestamp)
            .zip(model.predict(&features)?)
            .collect();

        let seed = match seed {
            Some(s) => s,
            None => self.steady_state_seed()?,
        };
        let records = accumulate_increments(&increments, seed);
        let rows = self.predictions.insert(&records)?;
        info!(
            rows,
            table = self.predictions.name(),
            "predictions inserted"
        );
        Ok(PredictionReport {
            window,
            rows,
            seed,
            final_accumulated: records.last().map(|r| r.accumulated_destruction),
        })
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PredictionOutcome {
    /// Training threshold not met this run.
    NotAttempted,
    Skipped { decision: PredictionDecision },
    Predicted { report: PredictionReport },
}

/// Plan, predict if due, then record the window end in the ledger.
pub fn run_prediction<P: Predictor>(
    latest_result_timestamp: i64,
    latest_accumulated: f64,
    predictions_batch_size: i64,
    ledger: &mut ScheduleLedger,
    predictor: &mut P,
) -> Result<PredictionOutcome> {
    let decision = plan_prediction(
        latest_result_timestamp,
        latest_accumulated,
        predictions_batch_size,
        ledger,
    );
    let PredictionDecision::Due { window, seed } = decision else {
        return Ok(PredictionOutcome::Skipped { decision });
    };
    info!("predicting the destruction for: {window}");
    let report = predictor.predict(window, seed)?;
    ledger.record_prediction(window.stop)?;
    Ok(PredictionOutcome::Predicted { report })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::{SqliteRecordTable, SqliteSensorTable};
    use crate::types::DestructionRecord;
    use rusqlite::Connection;
    use tempfile::TempDir;

    struct RecordingPredictor {
        calls: Vec<(BatchWindow, Option<f64>)>,
    }

    impl Predictor for RecordingPredictor {
        fn predict(&mut self, window: BatchWindow, seed: Option<f64>) -> Result<PredictionReport> {
            self.calls.push((window, seed));
            Ok(PredictionReport {
                window,
                rows: 0,
                seed: seed.unwrap_or_default(),
                final_accumulated: None,
            })
        }
    }

    fn ledger(dir: &TempDir) -> ScheduleLedger {
        ScheduleLedger::open(dir.path()).unwrap()
    }

    #[test]
    fn first_round_seeds_from_results() {
        let dir = TempDir::new().unwrap();
        let d = plan_prediction(1000, 0.42, 100, &ledger(&dir));
        assert_eq!(
            d,
            PredictionDecision::Due {
                window: BatchWindow::new(1001, 1101),
                seed: Some(0.42)
            }
        );
    }

    #[test]
    fn later_rounds_seed_from_predictions() {
        let dir = TempDir::new().unwrap();
        let mut l = ledger(&dir);
        l.record_prediction(1000).unwrap();
        let d = plan_prediction(1000, 0.42, 100, &l);
        assert_eq!(
            d,
            PredictionDecision::Due {
                window: BatchWindow::new(1001, 1101),
                seed: None
            }
        );
    }

    #[test]
    fn sub_period_rounds_are_gated() {
        let dir = TempDir::new().unwrap();
        let mut l = ledger(&dir);
        l.record_prediction(1000).unwrap();
        // stop = 951 + 100 = 1051, 1051 - 1000 <= 100
        assert_eq!(
            plan_prediction(950, 1.0, 100, &l),
            PredictionDecision::TooSoon {
                prediction_stop: 1051,
                last_performed: 1000
            }
        );
        // stop - last == batch exactly is still too soon
        assert!(matches!(
            plan_prediction(999, 1.0, 100, &l),
            PredictionDecision::TooSoon { prediction_stop: 1100, .. }
        ));
    }

    #[test]
    fn recorded_stop_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut l = ledger(&dir);
        l.record_prediction(1101).unwrap();
        l.record_prediction(1500).unwrap();
        assert_eq!(
            plan_prediction(1000, 1.0, 100, &l),
            PredictionDecision::AlreadyPredicted {
                prediction_stop: 1101
            }
        );
    }

    #[test]
    fn run_records_after_success_only_once() {
        let dir = TempDir::new().unwrap();
        let mut l = ledger(&dir);
        let mut p = RecordingPredictor { calls: Vec::new() };
        run_prediction(1000, 2.0, 100, &mut l, &mut p).unwrap();
        let again = run_prediction(1000, 2.0, 100, &mut l, &mut p).unwrap();
        assert!(matches!(
            again,
            PredictionOutcome::Skipped {
                decision: PredictionDecision::AlreadyPredicted { .. }
            }
        ));
        assert_eq!(p.calls, vec![(BatchWindow::new(1001, 1101), Some(2.0))]);
        assert_eq!(l.state().predictions, vec![1101]);
    }

    struct Fixture {
        _dir: TempDir,
        sensors: SqliteSensorTable,
        predictions: SqliteRecordTable,
        artifacts: ModelArtifacts,
    }

    fn fixture(with_model: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let mut sensors =
            SqliteSensorTable::with_connection(Connection::open_in_memory().unwrap(), &cfg.sensors)
                .unwrap();
        let samples: Vec<SensorSample> = (0..20)
            .map(|t| SensorSample {
                timestamp: t,
                torque: 0.0,
                speed: 0.0,
                oil_temperature: t as f64,
            })
            .collect();
        sensors.insert(&samples).unwrap();
        let predictions = SqliteRecordTable::with_connection(
            Connection::open_in_memory().unwrap(),
            &cfg.predictions,
        )
        .unwrap();
        let artifacts = ModelArtifacts::new(dir.path().join("models"));
        if with_model {
            // destruction = oil / 10
            let mut m = LinearRegressor::new();
            let features: Vec<Vec<f64>> =
                (0..10).map(|i| vec![(i * 7 % 5) as f64, (i % 3) as f64, i as f64]).collect();
            let targets: Vec<f64> = features.iter().map(|r| r[2] / 10.0).collect();
            m.fit(&features, &targets).unwrap();
            artifacts.save(DESTRUCTION_MODEL, &m).unwrap();
        }
        Fixture {
            _dir: dir,
            sensors,
            predictions,
            artifacts,
        }
    }

    #[test]
    fn predictor_seeds_explicitly_then_from_store() {
        let mut f = fixture(true);
        let mut p = ModelPredictor {
            sensors: &f.sensors,
            predictions: &mut f.predictions,
            artifacts: &f.artifacts,
        };
        let first = p.predict(BatchWindow::new(0, 4), Some(100.0)).unwrap();
        assert_eq!(first.rows, 5);
        // 100 + (0 + 1 + 2 + 3 + 4) / 10
        assert!((first.final_accumulated.unwrap() - 101.0).abs() < 1e-6);

        let second = p.predict(BatchWindow::new(5, 6), None).unwrap();
        assert!((second.seed - 101.0).abs() < 1e-6);
        assert!((second.final_accumulated.unwrap() - 102.1).abs() < 1e-6);

        let stored: Vec<DestructionRecord> = f.predictions.load_range(0, 6).unwrap();
        assert_eq!(stored.len(), 7);
    }

    #[test]
    fn missing_model_aborts_without_writes() {
        let mut f = fixture(false);
        let dir = TempDir::new().unwrap();
        let mut l = ledger(&dir);
        let mut p = ModelPredictor {
            sensors: &f.sensors,
            predictions: &mut f.predictions,
            artifacts: &f.artifacts,
        };
        let err = run_prediction(3, 1.0, 5, &mut l, &mut p).unwrap_err();
        assert!(matches!(err, TwinError::ModelNotFound(_)));
        assert!(l.state().predictions.is_empty());
        assert!(f.predictions.bounds().unwrap().is_empty());
    }

    #[test]
    fn empty_sensor_window_is_insufficient() {
        let mut f = fixture(true);
        let mut p = ModelPredictor {
            sensors: &f.sensors,
            predictions: &mut f.predictions,
            artifacts: &f.artifacts,
        };
        assert!(matches!(
            p.predict(BatchWindow::new(100, 200), Some(0.0)),
            Err(TwinError::InsufficientData { start: 100 })
        ));
    }
}
