use anyhow::Context;
use std::path::Path;
use tabledeck_core::config::DeckConfig;
use tabledeck_core::tracker::PipelineTracker;
use tabledeck_core::{io, paths};

pub fn run(root: &Path) -> anyhow::Result<()> {
    io::ensure_dir(&root.join(paths::TABLES_DIR))?;
    io::ensure_dir(&root.join(paths::RESULTS_DIR))?;

    let config = DeckConfig::load_or_default(root).context("failed to load config")?;
    if !paths::config_path(root).exists() {
        config.save(root)?;
    }

    if paths::pipeline_path(root).exists() {
        println!("already initialized");
        return Ok(());
    }

    let mut tracker = PipelineTracker::new();
    config.install(&mut tracker)?;
    tracker.save(root)?;

    println!(
        "initialized: {} slots, {} actions",
        config.slots.len(),
        config.actions.len()
    );
    Ok(())
}
