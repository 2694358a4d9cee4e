use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use tracing::warn;
use twin_core::{
    config::Config,
    pipeline::{Pipeline, RunReport, Stage},
    prediction::PredictionOutcome,
    training::TrainingOutcome,
    types::format_timestamp,
    validation::ValidationOutcome,
    TwinError,
};

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let mut pipeline = Pipeline::open(root, &config).context("failed to open stores")?;

    let report = match pipeline.run() {
        Ok(report) => report,
        Err(e) => {
            // Only an empty input batch is idle; later stages have already
            // written results, so their failures must surface.
            let idle_start = match (e.stage(), e.root_cause()) {
                (
                    Some(Stage::ResolveWindow | Stage::Accumulate),
                    TwinError::InsufficientData { start },
                ) => Some(*start),
                _ => None,
            };
            if let Some(start) = idle_start {
                warn!(
                    start,
                    "no new sensor data after {}; nothing to do",
                    format_timestamp(start)
                );
                if json {
                    print_json(&serde_json::json!({ "status": "idle", "start": start }))?;
                }
                return Ok(());
            }
            return Err(e).context("pipeline run failed");
        }
    };

    if json {
        print_json(&report)
    } else {
        print_summary(&report);
        Ok(())
    }
}

fn print_summary(report: &RunReport) {
    println!("Batch:       {}", report.window);
    println!("Rows:        {}", report.rows_written);
    println!("Destruction: {:.6}%", report.latest_destruction);

    match &report.training {
        TrainingOutcome::Trained { report } => {
            println!(
                "Training:    trained on {} ({} samples)",
                report.window, report.samples
            )
        }
        TrainingOutcome::Skipped { decision } => println!("Training:    skipped ({decision:?})"),
    }

    match &report.prediction {
        PredictionOutcome::NotAttempted => println!("Prediction:  not enough history"),
        PredictionOutcome::Skipped { decision } => {
            println!("Prediction:  skipped ({decision:?})")
        }
        PredictionOutcome::Predicted { report } => println!(
            "Prediction:  {} rows for {}, seeded at {:.6}%",
            report.rows, report.window, report.seed
        ),
    }

    match &report.validation {
        ValidationOutcome::NotDue => {}
        ValidationOutcome::NothingToCheck { window } => {
            println!("Validation:  no predictions for {window}")
        }
        ValidationOutcome::Checked { window, report } => println!(
            "Validation:  {window}: rmse {:.3e}, mae {:.3e}, r2 {:.4}",
            report.rmse, report.mae, report.r2
        ),
        ValidationOutcome::LengthMismatch {
            window,
            realized,
            predicted,
        } => println!(
            "Validation:  {window}: skipped, {realized} results vs {predicted} predictions"
        ),
    }
}
