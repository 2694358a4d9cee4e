use crate::output::print_json;
use anyhow::Context;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use tracing::info;
use twin_core::{
    config::Config,
    generator::{generate, Profile},
    store::{SensorSource, SqliteSensorTable},
    types::BatchWindow,
};

/// One year of readings per invocation.
const MAX_SECONDS: i64 = 366 * 24 * 60 * 60;

pub fn run(
    root: &Path,
    start: Option<i64>,
    seconds: i64,
    seed: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    if !(1..=MAX_SECONDS).contains(&seconds) {
        anyhow::bail!("--seconds must be between 1 and {MAX_SECONDS}, got {seconds}");
    }
    let config = Config::load(root).context("failed to load config")?;
    let mut sensors = SqliteSensorTable::open(root, &config).context("failed to open sensor store")?;

    let start = match start {
        Some(ts) => ts,
        None => match sensors.bounds()?.max {
            Some(last) => last + 1,
            None => chrono::Utc::now().timestamp(),
        },
    };

    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let stop = start
        .checked_add(seconds)
        .with_context(|| format!("--start {start} plus --seconds {seconds} overflows"))?;
    let samples = generate(start, stop, &Profile::default(), &mut rng);
    let inserted = sensors
        .insert(&samples)
        .with_context(|| format!("failed to insert readings starting at {start}"))?;

    let window = BatchWindow::new(start, stop - 1);
    info!(inserted, "generated sensor readings for {window}");

    if json {
        print_json(&serde_json::json!({
            "inserted": inserted,
            "start": window.start,
            "stop": window.stop,
        }))
    } else {
        println!("Inserted {inserted} readings: {window}");
        Ok(())
    }
}
