use crate::output::print_json;
use anyhow::Context;
use serde_json::json;
use std::path::Path;
use tabledeck_core::config::DeckConfig;
use tabledeck_core::paths;
use tabledeck_core::runner::PendingRun;
use tabledeck_core::table::Table;
use tabledeck_core::tracker::{PipelineTracker, RunOutcome};

pub fn run(root: &Path, action: &str, json: bool) -> anyhow::Result<()> {
    let mut tracker = PipelineTracker::load(root).context("failed to load pipeline state")?;
    let config = DeckConfig::load(root).context("failed to load config")?;
    let registry = config.registry()?;
    let spec = registry.require(action)?;

    // Readiness is checked (and the dependency generations captured) before
    // any table is read.
    let pending = PendingRun::begin(&tracker, action)?;

    let input_slot = spec
        .primary_input()
        .context("action declares no dependencies, nothing to read")?;
    let raw = Table::load(&paths::table_path(root, input_slot))
        .with_context(|| format!("failed to load table for slot '{input_slot}'"))?;

    // A failed transform propagates here and never records a run.
    let result = spec.compute(&raw)?;

    match pending.complete(&mut tracker)? {
        RunOutcome::Recorded => {
            result.save(&paths::result_path(root, action))?;
            tracker.save(root)?;
            if json {
                return print_json(&json!({
                    "action": action,
                    "outcome": RunOutcome::Recorded,
                    "rows": result.len(),
                    "cols": result.columns.len(),
                }));
            }
            println!(
                "ran {action}: {} rows, {} cols",
                result.len(),
                result.columns.len()
            );
        }
        RunOutcome::Superseded => {
            if json {
                return print_json(&json!({
                    "action": action,
                    "outcome": RunOutcome::Superseded,
                }));
            }
            println!("run of {action} superseded by a newer load; result discarded");
        }
    }
    Ok(())
}
