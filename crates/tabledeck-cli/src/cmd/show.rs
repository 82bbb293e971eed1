use crate::output::{print_data_table, print_json};
use anyhow::Context;
use std::path::Path;
use tabledeck_core::model::{apply_filters, FilterCriteria};
use tabledeck_core::paths;
use tabledeck_core::table::Table;
use tabledeck_core::tracker::PipelineTracker;

pub fn run(
    root: &Path,
    action: &str,
    search: Option<&str>,
    limit: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let path = paths::result_path(root, action);
    if !path.exists() {
        anyhow::bail!("no result for '{action}': run it first");
    }
    let table = Table::load(&path).with_context(|| format!("failed to read {}", path.display()))?;

    let table = match search {
        Some(q) => apply_filters(&table, &FilterCriteria::with_search(q)),
        None => table,
    };

    if let Ok(tracker) = PipelineTracker::load(root) {
        if tracker.is_stale(action).unwrap_or(false) {
            eprintln!("note: this result is stale; a dependency was reloaded since it ran");
        }
    }

    if json {
        let out = match limit {
            Some(n) => table.head(n),
            None => table,
        };
        return print_json(&out);
    }
    print_data_table(&table, limit.unwrap_or(50));
    Ok(())
}
