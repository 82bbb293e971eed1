use crate::output::{print_json, print_table};
use anyhow::Context;
use std::path::Path;
use tabledeck_core::config::DeckConfig;
use tabledeck_core::tracker::PipelineTracker;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let tracker = PipelineTracker::load(root).context("failed to load pipeline state")?;
    let config = DeckConfig::load(root).context("failed to load config")?;
    let registry = config.registry()?;
    let snap = tracker.status_snapshot();

    if json {
        #[derive(serde::Serialize)]
        struct ActionLine<'a> {
            key: &'a str,
            name: &'a str,
            depends_on: Vec<&'a str>,
            view: &'a str,
            ready: bool,
            has_result: bool,
            stale: bool,
        }

        let lines: Vec<ActionLine> = registry
            .iter()
            .map(|spec| {
                let status = snap.actions.get(&spec.key);
                ActionLine {
                    key: &spec.key,
                    name: &spec.name,
                    depends_on: spec.depends_on.iter().map(|s| s.as_str()).collect(),
                    view: spec.view.as_str(),
                    ready: status.map(|s| s.ready).unwrap_or(false),
                    has_result: status.map(|s| s.has_result).unwrap_or(false),
                    stale: status.map(|s| s.stale).unwrap_or(false),
                }
            })
            .collect();
        return print_json(&lines);
    }

    let rows: Vec<Vec<String>> = registry
        .iter()
        .map(|spec| {
            let status = snap.actions.get(&spec.key);
            let state = match status {
                None => "unregistered",
                Some(s) if !s.ready => "waiting",
                Some(s) if !s.has_result => "ready",
                Some(s) if s.stale => "stale",
                Some(_) => "fresh",
            };
            vec![
                spec.key.clone(),
                spec.name.clone(),
                spec.depends_on.iter().cloned().collect::<Vec<_>>().join(", "),
                spec.view.to_string(),
                state.to_string(),
            ]
        })
        .collect();
    print_table(&["KEY", "NAME", "DEPENDS ON", "VIEW", "STATE"], rows);
    Ok(())
}
