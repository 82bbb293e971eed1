use serde::Serialize;
use tabledeck_core::table::Table;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  "));

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  "));
    }
}

/// Render a data table, truncated to `limit` rows with a trailer line when
/// rows are cut off.
pub fn print_data_table(table: &Table, limit: usize) {
    let headers: Vec<&str> = table.columns.iter().map(|c| c.as_str()).collect();
    let rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .take(limit)
        .map(|r| r.iter().map(|v| v.display()).collect())
        .collect();
    print_table(&headers, rows);
    if table.len() > limit {
        println!("... {} of {} rows shown", limit, table.len());
    }
}
