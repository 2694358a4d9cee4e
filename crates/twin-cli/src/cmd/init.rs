use anyhow::Context;
use std::path::Path;
use twin_core::{config::Config, io, paths, pipeline::Pipeline, schedule::ScheduleLedger};

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    if !json {
        println!("Initializing twin in: {}", root.display());
    }

    let dir = paths::twin_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let config_created = !paths::config_path(root).exists() && !paths::config_json_path(root).exists();
    if config_created {
        Config::default()
            .save(root)
            .context("failed to write config.yaml")?;
    }
    let config = Config::load(root).context("failed to load config")?;

    let ledger_created = ScheduleLedger::init(root).context("failed to write schedule ledger")?;

    let models = config.model_dir(root);
    io::ensure_dir(&models).with_context(|| format!("failed to create {}", models.display()))?;

    // Opening the stores creates the database files and tables.
    Pipeline::open(root, &config).context("failed to create stores")?;

    if json {
        return crate::output::print_json(&serde_json::json!({
            "root": root,
            "config_created": config_created,
            "ledger_created": ledger_created,
        }));
    }

    let status = |created: bool| if created { "created:" } else { "exists: " };
    println!("  {} {}", status(config_created), paths::CONFIG_FILE);
    println!("  {} {}", status(ledger_created), paths::SCHEDULE_FILE);
    println!("  ready:   {}", models.display());
    Ok(())
}
