use crate::output::{print_json, print_table};
use anyhow::Context;
use std::path::Path;
use tabledeck_core::tracker::PipelineTracker;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let tracker = PipelineTracker::load(root).context("failed to load pipeline state")?;
    let snap = tracker.status_snapshot();

    if json {
        return print_json(&snap);
    }

    println!("Slots:");
    let slot_rows: Vec<Vec<String>> = snap
        .slots
        .iter()
        .map(|(name, s)| {
            vec![
                name.clone(),
                if s.present { "yes" } else { "no" }.to_string(),
                s.generation.to_string(),
                s.loaded_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["SLOT", "PRESENT", "GEN", "LOADED AT"], slot_rows);

    println!("\nActions:");
    let action_rows: Vec<Vec<String>> = snap
        .actions
        .iter()
        .map(|(key, a)| {
            let freshness = if !a.has_result {
                "-"
            } else if a.stale {
                "stale"
            } else {
                "fresh"
            };
            vec![
                key.clone(),
                if a.ready { "yes" } else { "no" }.to_string(),
                if a.has_result { "yes" } else { "no" }.to_string(),
                freshness.to_string(),
            ]
        })
        .collect();
    print_table(&["ACTION", "READY", "RESULT", "FRESHNESS"], action_rows);
    Ok(())
}
