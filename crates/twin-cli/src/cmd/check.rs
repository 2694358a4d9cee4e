use crate::output::{print_json, print_table};
use anyhow::Context;
use std::path::Path;
use twin_core::{
    config::Config,
    store::SqliteRecordTable,
    types::BatchWindow,
    validation::{validate_window, ValidationOutcome},
};

pub fn run(root: &Path, start: i64, stop: i64, json: bool) -> anyhow::Result<()> {
    if stop < start {
        anyhow::bail!("--stop ({stop}) is before --start ({start})");
    }
    let config = Config::load(root).context("failed to load config")?;
    let results = SqliteRecordTable::open_results(root, &config).context("failed to open results")?;
    let predictions =
        SqliteRecordTable::open_predictions(root, &config).context("failed to open predictions")?;

    let window = BatchWindow::new(start, stop);
    let outcome = validate_window(&results, &predictions, window)
        .with_context(|| format!("cannot validate {window}"))?;

    if json {
        return print_json(&outcome);
    }
    match outcome {
        ValidationOutcome::Checked { report, .. } => {
            println!("Predictions for {window}:");
            print_table(
                &["SAMPLES", "MSE", "RMSE", "MAE", "R2"],
                &[vec![
                    report.samples.to_string(),
                    format!("{:.6e}", report.mse),
                    format!("{:.6e}", report.rmse),
                    format!("{:.6e}", report.mae),
                    format!("{:.6}", report.r2),
                ]],
            );
        }
        _ => println!("No predictions stored for {window}."),
    }
    Ok(())
}
