//! One pass of the batch pipeline.
//!
//! ```text
//! RESOLVE_WINDOW → ACCUMULATE → PERSIST_RESULTS
//!     → (full training period of history?) → TRAIN → PREDICT → VALIDATE → DONE
//! ```
//!
//! A pass is terminal: any stage error ends it, and the next scheduled
//! invocation resumes from the stores and the ledger. Every write happens only
//! after the computation it records has succeeded, so a failed pass never
//! leaves a ledger entry without its data.

use crate::accumulate::accumulate;
use crate::config::{BatchConfig, Config};
use crate::error::{Result, TwinError};
use crate::model::ModelArtifacts;
use crate::prediction::{run_prediction, ModelPredictor, PredictionOutcome};
use crate::schedule::ScheduleLedger;
use crate::store::{RecordStore, SensorSource, SqliteRecordTable, SqliteSensorTable};
use crate::training::{available_span, run_training, ModelTrainer, TrainingOutcome};
use crate::types::{BatchWindow, DestructionRecord, TimestampBounds};
use crate::validation::{validate_window, validation_due, validation_window, ValidationOutcome};
use crate::window::resolve_window;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ResolveWindow,
    Accumulate,
    PersistResults,
    Train,
    Predict,
    Validate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ResolveWindow => "resolve_window",
            Stage::Accumulate => "accumulate",
            Stage::PersistResults => "persist_results",
            Stage::Train => "train",
            Stage::Predict => "predict",
            Stage::Validate => "validate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub window: BatchWindow,
    pub rows_written: usize,
    pub first_timestamp: i64,
    pub last_timestamp: i64,
    pub latest_destruction: f64,
    pub available_span: i64,
    pub training: TrainingOutcome,
    pub prediction: PredictionOutcome,
    pub validation: ValidationOutcome,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline<S: SensorSource, R: RecordStore, P: RecordStore> {
    pub sensors: S,
    pub results: R,
    pub predictions: P,
    pub ledger: ScheduleLedger,
    pub artifacts: ModelArtifacts,
    pub batches: BatchConfig,
    pub target_decimals: u32,
}

impl Pipeline<SqliteSensorTable, SqliteRecordTable, SqliteRecordTable> {
    /// Open the configured stores, ledger and model directory for `root`.
    pub fn open(root: &Path, config: &Config) -> Result<Self> {
        Ok(Self {
            sensors: SqliteSensorTable::open(root, config)?,
            results: SqliteRecordTable::open_results(root, config)?,
            predictions: SqliteRecordTable::open_predictions(root, config)?,
            ledger: ScheduleLedger::open(root)?,
            artifacts: ModelArtifacts::new(config.model_dir(root)),
            batches: config.data_batches,
            target_decimals: config.model.target_decimals,
        })
    }
}

impl<S: SensorSource, R: RecordStore, P: RecordStore> Pipeline<S, R, P> {
    pub fn run(&mut self) -> Result<RunReport> {
        info!("pipeline started");
        let b = self.batches;

        // RESOLVE_WINDOW
        let (results_bounds, window) = self
            .resolve()
            .map_err(|e| e.in_stage(Stage::ResolveWindow))?;

        // ACCUMULATE
        info!("calculating the destruction for the batch: {window}");
        let records = self
            .accumulate(window, results_bounds.max)
            .map_err(|e| e.in_stage(Stage::Accumulate))?;
        let (first, last) = match (records.first(), records.last()) {
            (Some(f), Some(l)) => (*f, *l),
            _ => {
                return Err(TwinError::InsufficientData {
                    start: window.start,
                }
                .in_stage(Stage::Accumulate))
            }
        };

        // PERSIST_RESULTS
        let rows_written = self
            .results
            .insert(&records)
            .map_err(|e| e.in_stage(Stage::PersistResults))?;
        // Totals need not be monotonic; the batch peak is what gets reported
        // and what the first prediction round starts from.
        let latest_destruction = records
            .iter()
            .map(|r| r.accumulated_destruction)
            .fold(f64::NEG_INFINITY, f64::max);
        info!(
            rows_written,
            table = self.results.name(),
            "actual destruction: {latest_destruction:.3}%"
        );

        let span = available_span(results_bounds.min, last.timestamp);

        // TRAIN
        let mut trainer = ModelTrainer {
            sensors: &self.sensors,
            results: &self.results,
            artifacts: &self.artifacts,
            target_decimals: self.target_decimals,
        };
        let (decision, training) = run_training(
            results_bounds.min,
            last.timestamp,
            b.training_batch_size,
            &mut self.ledger,
            &mut trainer,
        )
        .map_err(|e| e.in_stage(Stage::Train))?;

        let mut report = RunReport {
            window,
            rows_written,
            first_timestamp: first.timestamp,
            last_timestamp: last.timestamp,
            latest_destruction,
            available_span: span,
            training,
            prediction: PredictionOutcome::NotAttempted,
            validation: ValidationOutcome::NotDue,
        };
        if !decision.threshold_met() {
            info!("not enough data for predictions (span {span}s)");
            return Ok(report);
        }

        // PREDICT
        let mut predictor = ModelPredictor {
            sensors: &self.sensors,
            predictions: &mut self.predictions,
            artifacts: &self.artifacts,
        };
        report.prediction = run_prediction(
            last.timestamp,
            latest_destruction,
            b.predictions_batch_size,
            &mut self.ledger,
            &mut predictor,
        )
        .map_err(|e| e.in_stage(Stage::Predict))?;
        if let PredictionOutcome::Skipped { decision } = &report.prediction {
            info!(?decision, "predictions are made only for full periods of results");
        }

        // VALIDATE
        if validation_due(span, b.training_batch_size, b.calculations_batch_size) {
            let check = validation_window(first.timestamp, b.predictions_batch_size);
            info!("checking the destruction prediction for: {check}");
            report.validation = self
                .validate(check)
                .map_err(|e| e.in_stage(Stage::Validate))?;
        }

        info!("pipeline finished");
        Ok(report)
    }

    fn resolve(&self) -> Result<(TimestampBounds, BatchWindow)> {
        let results_bounds = self.results.bounds()?;
        let sensor_bounds = self.sensors.bounds()?;
        let window = resolve_window(
            results_bounds.max,
            sensor_bounds.min,
            self.batches.calculations_batch_size,
        )?;
        Ok((results_bounds, window))
    }

    /// Load the window's readings and continue the running total from the
    /// newest stored result.
    fn accumulate(
        &self,
        window: BatchWindow,
        last_result: Option<i64>,
    ) -> Result<Vec<DestructionRecord>> {
        let samples = self.sensors.load_range(window.start, window.stop)?;
        if samples.is_empty() {
            return Err(TwinError::InsufficientData {
                start: window.start,
            });
        }
        let seed = match last_result {
            Some(ts) => self.results.accumulated_at(ts)?.unwrap_or(0.0),
            None => 0.0,
        };
        Ok(accumulate(samples, seed))
    }

    /// A length mismatch abandons validation for this window only.
    fn validate(&self, window: BatchWindow) -> Result<ValidationOutcome> {
        match validate_window(&self.results, &self.predictions, window) {
            Ok(outcome) => {
                match &outcome {
                    ValidationOutcome::Checked { report, .. } => info!(
                        mse = report.mse,
                        rmse = report.rmse,
                        mae = report.mae,
                        r2 = report.r2,
                        "model performance check results"
                    ),
                    _ => info!("predictions were not performed, there's nothing to check"),
                }
                Ok(outcome)
            }
            Err(TwinError::LengthMismatch {
                start,
                stop,
                realized,
                predicted,
            }) => {
                warn!(realized, predicted, "prediction and results lengths do not match");
                Ok(ValidationOutcome::LengthMismatch {
                    window: BatchWindow::new(start, stop),
                    realized,
                    predicted,
                })
            }
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DESTRUCTION_MODEL;
    use crate::prediction::PredictionDecision;
    use crate::training::TrainingDecision;
    use crate::types::SensorSample;
    use rusqlite::Connection;
    use tempfile::TempDir;

    type TestPipeline = Pipeline<SqliteSensorTable, SqliteRecordTable, SqliteRecordTable>;

    fn pipeline(dir: &TempDir, batches: BatchConfig) -> TestPipeline {
        let cfg = Config::default();
        Pipeline {
            sensors: SqliteSensorTable::with_connection(
                Connection::open_in_memory().unwrap(),
                &cfg.sensors,
            )
            .unwrap(),
            results: SqliteRecordTable::with_connection(
                Connection::open_in_memory().unwrap(),
                &cfg.results,
            )
            .unwrap(),
            predictions: SqliteRecordTable::with_connection(
                Connection::open_in_memory().unwrap(),
                &cfg.predictions,
            )
            .unwrap(),
            ledger: ScheduleLedger::open(dir.path()).unwrap(),
            artifacts: ModelArtifacts::new(dir.path().join("models")),
            batches,
            target_decimals: 12,
        }
    }

    fn varied(range: std::ops::Range<i64>) -> Vec<SensorSample> {
        range
            .map(|t| {
                let x = t as f64;
                SensorSample {
                    timestamp: t,
                    torque: 1000.0 + 500.0 * (x / 10.0).sin(),
                    speed: 100.0 + 20.0 * (x / 7.0).cos(),
                    oil_temperature: 40.0 + 10.0 * (x / 13.0).sin(),
                }
            })
            .collect()
    }

    /// calc 60 (61 inclusive rows), train 120, predict 60.
    fn small_batches() -> BatchConfig {
        BatchConfig {
            calculations_batch_size: 60,
            training_batch_size: 120,
            predictions_batch_size: 60,
        }
    }

    #[test]
    fn empty_sensor_store_is_insufficient_and_side_effect_free() {
        let dir = TempDir::new().unwrap();
        let mut p = pipeline(&dir, small_batches());
        let err = p.run().unwrap_err();
        assert!(matches!(err.root_cause(), TwinError::InsufficientData { .. }));
        assert_eq!(err.stage(), Some(Stage::ResolveWindow));
        assert!(p.results.bounds().unwrap().is_empty());
        assert!(!p.ledger.path().exists());
    }

    #[test]
    fn empty_window_after_last_result_is_insufficient() {
        let dir = TempDir::new().unwrap();
        let mut p = pipeline(&dir, small_batches());
        p.sensors.insert(&varied(0..61)).unwrap();
        p.run().unwrap();
        let err = p.run().unwrap_err();
        assert!(matches!(
            err.root_cause(),
            TwinError::InsufficientData { start: 61 }
        ));
        assert_eq!(err.stage(), Some(Stage::Accumulate));
        assert_eq!(p.results.bounds().unwrap().max, Some(60));
    }

    #[test]
    fn constant_load_window() {
        let dir = TempDir::new().unwrap();
        let batches = BatchConfig {
            calculations_batch_size: 59,
            ..small_batches()
        };
        let mut p = pipeline(&dir, batches);
        let samples: Vec<SensorSample> = (0..100)
            .map(|t| SensorSample {
                timestamp: t,
                torque: 3_600_000.0,
                speed: 60.0,
                oil_temperature: 0.0,
            })
            .collect();
        p.sensors.insert(&samples).unwrap();

        let report = p.run().unwrap();
        assert_eq!(report.window, BatchWindow::new(0, 59));
        assert_eq!(report.rows_written, 60);
        assert_eq!(report.last_timestamp, 59);
        assert!((report.latest_destruction - 4.32e-5).abs() < 1e-15);
        assert!(matches!(
            report.training,
            TrainingOutcome::Skipped {
                decision: TrainingDecision::NotEnoughHistory { available_span: 0 }
            }
        ));
        assert_eq!(report.prediction, PredictionOutcome::NotAttempted);
    }

    #[test]
    fn second_batch_continues_running_total() {
        let dir = TempDir::new().unwrap();
        let mut p = pipeline(&dir, small_batches());
        p.sensors.insert(&varied(0..401)).unwrap();
        p.run().unwrap();
        p.run().unwrap();

        let mut stored = p.results.load_range(0, 121).unwrap();
        stored.sort_by_key(|r| r.timestamp);
        assert_eq!(stored, accumulate(varied(0..122), 0.0));
    }

    #[test]
    fn full_cycle_trains_predicts_and_validates() {
        let dir = TempDir::new().unwrap();
        let mut p = pipeline(&dir, small_batches());
        p.sensors.insert(&varied(0..401)).unwrap();

        // Run 1: [0, 60], no history before this batch.
        let r1 = p.run().unwrap();
        assert_eq!(r1.available_span, 0);
        assert_eq!(r1.prediction, PredictionOutcome::NotAttempted);

        // Run 2: [61, 121], span 121 >= 120: train [0, 120], first prediction.
        let r2 = p.run().unwrap();
        assert_eq!(r2.window, BatchWindow::new(61, 121));
        let TrainingOutcome::Trained { report } = &r2.training else {
            panic!("expected training, got {:?}", r2.training);
        };
        assert_eq!(report.window, BatchWindow::new(0, 120));
        let PredictionOutcome::Predicted { report } = &r2.prediction else {
            panic!("expected prediction, got {:?}", r2.prediction);
        };
        assert_eq!(report.window, BatchWindow::new(122, 182));
        assert_eq!(report.seed, r2.latest_destruction);
        assert_eq!(report.rows, 61);
        assert_eq!(r2.validation, ValidationOutcome::NotDue);
        assert_eq!(p.ledger.state().model_trainings, vec![120]);
        assert_eq!(p.ledger.state().predictions, vec![182]);

        // Run 3: [122, 182], already trained; next prediction seeded from the
        // prediction store; the batch just computed is validated.
        let predicted_total = p.predictions.latest_accumulated().unwrap().unwrap();
        let r3 = p.run().unwrap();
        assert!(matches!(
            r3.training,
            TrainingOutcome::Skipped {
                decision: TrainingDecision::AlreadyTrained { training_stop: 120 }
            }
        ));
        let PredictionOutcome::Predicted { report } = &r3.prediction else {
            panic!("expected prediction, got {:?}", r3.prediction);
        };
        assert_eq!(report.window, BatchWindow::new(183, 243));
        assert_eq!(report.seed, predicted_total);
        let ValidationOutcome::Checked { window, report } = &r3.validation else {
            panic!("expected validation, got {:?}", r3.validation);
        };
        assert_eq!(*window, BatchWindow::new(122, 182));
        assert_eq!(report.samples, 61);
        assert!(report.rmse.is_finite());

        // Run 4: [183, 243], span 243 covers two training periods.
        let r4 = p.run().unwrap();
        assert!(matches!(r4.training, TrainingOutcome::Trained { .. }));
        assert!(matches!(r4.validation, ValidationOutcome::Checked { .. }));
        assert_eq!(p.ledger.state().model_trainings, vec![120, 240]);
        assert_eq!(p.ledger.state().predictions, vec![182, 243, 304]);
    }

    #[test]
    fn first_prediction_starts_from_batch_peak() {
        let dir = TempDir::new().unwrap();
        let mut p = pipeline(&dir, small_batches());
        // Oil drops below zero late in the second batch, so its running
        // total peaks before the last row.
        let samples: Vec<SensorSample> = (0..401)
            .map(|t| SensorSample {
                timestamp: t,
                torque: 1000.0 + 10.0 * (t as f64 / 5.0).sin(),
                speed: 100.0,
                oil_temperature: if (90..122).contains(&t) { -30.0 } else { 30.0 },
            })
            .collect();
        p.sensors.insert(&samples).unwrap();
        p.run().unwrap();
        let r2 = p.run().unwrap();

        let stored = p.results.load_range(61, 121).unwrap();
        let peak = stored
            .iter()
            .map(|r| r.accumulated_destruction)
            .fold(f64::NEG_INFINITY, f64::max);
        let newest = p.results.accumulated_at(121).unwrap().unwrap();
        assert!(peak > newest);
        assert_eq!(r2.latest_destruction, peak);
        let PredictionOutcome::Predicted { report } = &r2.prediction else {
            panic!("expected prediction, got {:?}", r2.prediction);
        };
        assert_eq!(report.seed, peak);

        // The next results batch still continues from the newest row.
        p.run().unwrap();
        let next = p.results.load_range(122, 122).unwrap();
        assert_eq!(
            next[0].accumulated_destruction,
            newest + crate::accumulate::destruction(&samples[122])
        );
    }

    #[test]
    fn predict_stage_without_future_sensors_fails_after_persisting() {
        let dir = TempDir::new().unwrap();
        let mut p = pipeline(&dir, small_batches());
        p.sensors.insert(&varied(0..122)).unwrap();
        p.run().unwrap();

        let err = p.run().unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Predict));
        assert!(matches!(
            err.root_cause(),
            TwinError::InsufficientData { start: 122 }
        ));
        assert_eq!(p.results.bounds().unwrap().max, Some(121));
        assert_eq!(p.ledger.state().model_trainings, vec![120]);
        assert!(p.ledger.state().predictions.is_empty());
    }

    #[test]
    fn sub_period_prediction_is_skipped() {
        let dir = TempDir::new().unwrap();
        let batches = BatchConfig {
            calculations_batch_size: 30,
            training_batch_size: 60,
            predictions_batch_size: 60,
        };
        let mut p = pipeline(&dir, batches);
        p.sensors.insert(&varied(0..400)).unwrap();
        p.run().unwrap(); // [0, 30]
        let r2 = p.run().unwrap(); // [31, 61], span 61: train, predict [62, 122]
        assert!(matches!(r2.prediction, PredictionOutcome::Predicted { .. }));
        let r3 = p.run().unwrap(); // [62, 92], stop 153 - 122 <= 60
        assert_eq!(
            r3.prediction,
            PredictionOutcome::Skipped {
                decision: PredictionDecision::TooSoon {
                    prediction_stop: 153,
                    last_performed: 122
                }
            }
        );
        assert_eq!(p.ledger.state().predictions, vec![122]);
    }

    #[test]
    fn mismatched_validation_does_not_fail_the_run() {
        let dir = TempDir::new().unwrap();
        let batches = BatchConfig {
            calculations_batch_size: 30,
            training_batch_size: 60,
            predictions_batch_size: 60,
        };
        let mut p = pipeline(&dir, batches);
        p.sensors.insert(&varied(0..400)).unwrap();
        p.run().unwrap();
        p.run().unwrap();
        // [62, 92]: validate [62, 122] holds 61 predictions but 31 results.
        let r3 = p.run().unwrap();
        assert_eq!(
            r3.validation,
            ValidationOutcome::LengthMismatch {
                window: BatchWindow::new(62, 122),
                realized: 31,
                predicted: 61
            }
        );
    }

    #[test]
    fn missing_model_aborts_prediction_but_keeps_results() {
        let dir = TempDir::new().unwrap();
        let mut p = pipeline(&dir, small_batches());
        p.sensors.insert(&varied(0..401)).unwrap();
        p.run().unwrap();
        p.run().unwrap();
        std::fs::remove_file(p.artifacts.path_for(DESTRUCTION_MODEL)).unwrap();

        let err = p.run().unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Predict));
        assert!(matches!(err.root_cause(), TwinError::ModelNotFound(_)));
        assert_eq!(p.results.bounds().unwrap().max, Some(182));
        assert_eq!(p.ledger.state().predictions, vec![182]);
        assert_eq!(p.predictions.bounds().unwrap().max, Some(182));
    }

    #[test]
    fn corrupt_ledger_fails_at_open() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::default();
        let path = crate::paths::schedule_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"model_trainings": [3, 1], "predictions": []}"#).unwrap();
        assert!(matches!(
            Pipeline::open(dir.path(), &cfg),
            Err(TwinError::ScheduleCorrupt { .. })
        ));
    }

    #[test]
    fn stage_names_are_snake_case() {
        assert_eq!(Stage::PersistResults.to_string(), "persist_results");
        let err = TwinError::InsufficientData { start: 5 }.in_stage(Stage::Train);
        assert_eq!(
            err.to_string(),
            "train stage failed: no sensor data available for window starting at 5"
        );
    }
}
