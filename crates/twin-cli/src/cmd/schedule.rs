use crate::output::{print_json, print_table};
use anyhow::Context;
use std::path::Path;
use twin_core::{schedule::ScheduleLedger, types::format_timestamp};

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let ledger = ScheduleLedger::open(root).context("failed to read schedule ledger")?;
    let state = ledger.state();

    if json {
        return print_json(state);
    }

    if state.model_trainings.is_empty() && state.predictions.is_empty() {
        println!("No trainings or predictions recorded.");
        return Ok(());
    }

    let mut entries: Vec<(i64, &str)> = state
        .model_trainings
        .iter()
        .map(|&ts| (ts, "training"))
        .chain(state.predictions.iter().map(|&ts| (ts, "prediction")))
        .collect();
    entries.sort();
    let rows: Vec<Vec<String>> = entries
        .into_iter()
        .map(|(ts, kind)| vec![kind.to_string(), ts.to_string(), format_timestamp(ts)])
        .collect();
    print_table(&["KIND", "WINDOW END", "UTC"], &rows);
    Ok(())
}
