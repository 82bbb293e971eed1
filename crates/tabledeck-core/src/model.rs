use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// FilterCriteria
// ---------------------------------------------------------------------------

/// Predicate-based row filtering: per-column substring filters plus a
/// global search. An empty filter or the literal "All" disables a column
/// filter. Numeric columns are never filtered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterCriteria {
    #[serde(default)]
    pub col_filters: BTreeMap<String, String>,
    #[serde(default)]
    pub global_search: String,
}

impl FilterCriteria {
    pub fn with_search(search: impl Into<String>) -> Self {
        Self {
            col_filters: BTreeMap::new(),
            global_search: search.into().trim().to_string(),
        }
    }

    pub fn set_col_filter(&mut self, column: impl Into<String>, text: impl Into<String>) {
        self.col_filters.insert(column.into(), text.into());
    }

    fn is_active(filter: &str) -> bool {
        !filter.is_empty() && filter != "All"
    }
}

// ---------------------------------------------------------------------------
// apply_filters
// ---------------------------------------------------------------------------

/// Pure, side-effect-free filtering. Column filters are case-insensitive
/// substring matches against the displayed cell text; the global search
/// matches if any non-numeric cell in the row contains it.
pub fn apply_filters(table: &Table, criteria: &FilterCriteria) -> Table {
    let mut out = Table {
        columns: table.columns.clone(),
        rows: Vec::new(),
    };

    let mut active: Vec<(usize, String)> = Vec::new();
    for (column, filter) in &criteria.col_filters {
        if !FilterCriteria::is_active(filter) {
            continue;
        }
        if let Some(idx) = table.column_index(column) {
            if !table.is_numeric_column(idx) {
                active.push((idx, filter.to_lowercase()));
            }
        }
    }

    let searchable: Vec<usize> = (0..table.columns.len())
        .filter(|&i| !table.is_numeric_column(i))
        .collect();
    let query = criteria.global_search.trim().to_lowercase();

    for row in &table.rows {
        let col_match = active.iter().all(|(idx, needle)| {
            row.get(*idx)
                .map(|v| v.display().to_lowercase().contains(needle))
                .unwrap_or(false)
        });
        if !col_match {
            continue;
        }
        if !query.is_empty() {
            let hit = searchable.iter().any(|&idx| {
                row.get(idx)
                    .map(|v| v.display().to_lowercase().contains(&query))
                    .unwrap_or(false)
            });
            if !hit {
                continue;
            }
        }
        out.rows.push(row.clone());
    }
    out
}

// ---------------------------------------------------------------------------
// quick_stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub rows: usize,
    pub cols: usize,
    pub numeric_cols: usize,
    pub missing_cells: usize,
}

/// Lightweight aggregate summary of a table.
pub fn quick_stats(table: &Table) -> TableStats {
    let missing_cells = table
        .rows
        .iter()
        .flat_map(|r| r.iter())
        .filter(|v| v.is_null())
        .count();
    TableStats {
        rows: table.len(),
        cols: table.columns.len(),
        numeric_cols: table.numeric_column_indices().len(),
        missing_cells,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
