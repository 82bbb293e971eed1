use crate::output::print_json;
use anyhow::Context;
use serde_json::json;
use std::path::Path;
use tabledeck_core::model::quick_stats;
use tabledeck_core::paths;
use tabledeck_core::table::Table;
use tabledeck_core::tracker::PipelineTracker;

pub fn run(root: &Path, slot: &str, file: &Path, json: bool) -> anyhow::Result<()> {
    let mut tracker = PipelineTracker::load(root).context("failed to load pipeline state")?;
    // Reject unknown slots before touching any files.
    tracker.is_present(slot)?;

    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let table = Table::from_csv_str(&text)
        .with_context(|| format!("failed to parse {}", file.display()))?;

    table.save(&paths::table_path(root, slot))?;
    let generation = tracker.record_load(slot)?;
    tracker.save(root)?;

    let stats = quick_stats(&table);
    if json {
        return print_json(&json!({
            "slot": slot,
            "generation": generation,
            "rows": stats.rows,
            "cols": stats.cols,
            "numeric_cols": stats.numeric_cols,
            "missing_cells": stats.missing_cells,
        }));
    }
    println!(
        "loaded {slot} (generation {generation}): {} rows, {} cols, {} missing cells",
        stats.rows, stats.cols, stats.missing_cells
    );
    Ok(())
}
