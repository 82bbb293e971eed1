//! Built-in table transforms. Each is a pure function over the raw input
//! table; failures surface as `ActionFailed` through the registry.

use crate::error::{DeckError, Result};
use crate::table::{Table, Value};
use chrono::Utc;
use std::collections::BTreeMap;

const PREFERRED_VALUE_COLS: &[&str] = &[
    "volume_1d",
    "open_interest",
    "spread_bps",
    "iv_30d",
    "px_last",
];

const PREFERRED_DISPLAY_COLS: &[&str] = &[
    "scheme_id",
    "underlying_isin",
    "issuer",
    "product",
    "callput",
    "currency",
    "maturity",
    "strike",
    "leverage",
    "bid",
    "ask",
    "px_last",
    "open_interest",
    "volume_1d",
    "spread_bps",
    "iv_30d",
];

fn require_nonempty(table: &Table, name: &str) -> Result<()> {
    if table.columns.is_empty() || table.is_empty() {
        return Err(DeckError::EmptyInput(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Aggregation helpers
// ---------------------------------------------------------------------------

fn column_nums(table: &Table, idx: usize) -> Vec<f64> {
    table.column_values(idx).filter_map(|v| v.as_f64()).collect()
}

fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        None
    } else {
        Some(xs.iter().sum::<f64>() / xs.len() as f64)
    }
}

/// Linear-interpolation percentile over non-null values, `p` in 0..=100.
fn percentile(xs: &[f64], p: f64) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

fn opt_num(x: Option<f64>) -> Value {
    x.map(Value::Num).unwrap_or(Value::Null)
}

/// Group row indices by the displayed text of the key columns. BTreeMap
/// gives sorted group keys, matching how the summaries read best.
fn group_rows(table: &Table, key_idxs: &[usize]) -> BTreeMap<Vec<String>, Vec<usize>> {
    let mut groups: BTreeMap<Vec<String>, Vec<usize>> = BTreeMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        let key: Vec<String> = key_idxs
            .iter()
            .map(|&k| row.get(k).map(|v| v.display()).unwrap_or_default())
            .collect();
        groups.entry(key).or_default().push(i);
    }
    groups
}

fn group_nums(table: &Table, indices: &[usize], col: usize) -> Vec<f64> {
    indices
        .iter()
        .filter_map(|&i| table.rows[i].get(col).and_then(|v| v.as_f64()))
        .collect()
}

fn present_numeric(table: &Table, names: &[&str]) -> Vec<usize> {
    names
        .iter()
        .filter_map(|n| table.column_index(n))
        .filter(|&i| table.is_numeric_column(i))
        .collect()
}

// ---------------------------------------------------------------------------
// Transforms
// ---------------------------------------------------------------------------

/// Count/mean/sum of the headline numeric columns, grouped by whichever of
/// issuer/product/callput exist. Falls back to a per-column numeric
/// describe when none of the group columns are present.
pub fn issuer_product_summary(raptor: &Table) -> Result<Table> {
    require_nonempty(raptor, "raptor")?;

    let key_idxs: Vec<usize> = ["issuer", "product", "callput"]
        .iter()
        .filter_map(|n| raptor.column_index(n))
        .collect();
    if key_idxs.is_empty() {
        return Ok(numeric_describe(raptor));
    }

    let mut value_idxs = present_numeric(raptor, PREFERRED_VALUE_COLS);
    if value_idxs.is_empty() {
        value_idxs = raptor.numeric_column_indices().into_iter().take(6).collect();
    }

    let mut columns: Vec<String> = key_idxs.iter().map(|&i| raptor.columns[i].clone()).collect();
    for &v in &value_idxs {
        let name = &raptor.columns[v];
        columns.push(format!("{name}_count"));
        columns.push(format!("{name}_mean"));
        columns.push(format!("{name}_sum"));
    }

    let mut out = Table::new(columns);
    for (key, indices) in group_rows(raptor, &key_idxs) {
        let mut row: Vec<Value> = key.into_iter().map(Value::Str).collect();
        for &v in &value_idxs {
            let xs = group_nums(raptor, &indices, v);
            row.push(Value::Num(xs.len() as f64));
            row.push(opt_num(mean(&xs)));
            row.push(Value::Num(xs.iter().sum()));
        }
        out.push_row(row);
    }
    Ok(out)
}

fn numeric_describe(table: &Table) -> Table {
    let mut out = Table::new(["column", "count", "mean", "min", "max"]);
    for idx in table.numeric_column_indices() {
        let xs = column_nums(table, idx);
        out.push_row(vec![
            Value::Str(table.columns[idx].clone()),
            Value::Num(xs.len() as f64),
            opt_num(mean(&xs)),
            opt_num(xs.iter().cloned().reduce(f64::min)),
            opt_num(xs.iter().cloned().reduce(f64::max)),
        ]);
    }
    out
}

/// Top rows by open interest (or the first numeric column), trimmed to the
/// preferred display columns when enough of them exist.
pub fn top_open_interest(raptor: &Table) -> Result<Table> {
    require_nonempty(raptor, "raptor")?;

    let sort_idx = raptor
        .column_index("open_interest")
        .filter(|&i| raptor.is_numeric_column(i))
        .or_else(|| raptor.numeric_column_indices().into_iter().next());
    let Some(sort_idx) = sort_idx else {
        return Ok(raptor.head(200));
    };

    let out = raptor.sorted_desc_by(sort_idx).head(1000);
    let selected = out.select(PREFERRED_DISPLAY_COLS);
    if selected.columns.len() >= 8 {
        Ok(selected)
    } else {
        Ok(out)
    }
}

/// Per-column missingness report, worst first.
pub fn missingness_report(raptor: &Table) -> Result<Table> {
    require_nonempty(raptor, "raptor")?;

    let total = raptor.len() as f64;
    let mut entries: Vec<(f64, usize)> = (0..raptor.columns.len())
        .map(|idx| {
            let missing = raptor.column_values(idx).filter(|v| v.is_null()).count();
            (missing as f64 / total, idx)
        })
        .collect();
    entries.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut out = Table::new(["rows_total", "column", "dtype", "missing_pct", "missing_frac"]);
    for (frac, idx) in entries {
        out.push_row(vec![
            Value::Num(total),
            Value::Str(raptor.columns[idx].clone()),
            Value::Str(raptor.column_dtype(idx).to_string()),
            Value::Num((frac * 10_000.0).round() / 100.0),
            Value::Num(frac),
        ]);
    }
    Ok(out)
}

/// Spread statistics per issuer and currency: count, mean, p95.
pub fn issuer_currency_spread(raptor: &Table) -> Result<Table> {
    require_nonempty(raptor, "raptor")?;

    let (Some(issuer), Some(currency)) = (
        raptor.column_index("issuer"),
        raptor.column_index("currency"),
    ) else {
        return issuer_product_summary(raptor);
    };

    let spread = raptor
        .column_index("spread_bps")
        .filter(|&i| raptor.is_numeric_column(i));

    let mut out = match spread {
        Some(_) => Table::new(["issuer", "currency", "count", "mean", "p95"]),
        None => Table::new(["issuer", "currency", "count"]),
    };
    for (key, indices) in group_rows(raptor, &[issuer, currency]) {
        let mut row: Vec<Value> = key.into_iter().map(Value::Str).collect();
        match spread {
            Some(s) => {
                let xs = group_nums(raptor, &indices, s);
                row.push(Value::Num(xs.len() as f64));
                row.push(opt_num(mean(&xs)));
                row.push(opt_num(percentile(&xs, 95.0)));
            }
            None => row.push(Value::Num(indices.len() as f64)),
        }
        out.push_row(row);
    }
    Ok(out)
}

const BUCKET_LABELS: &[(i64, &str)] = &[
    (0, "expired"),
    (7, "0-7d"),
    (30, "7-30d"),
    (90, "1-3m"),
    (180, "3-6m"),
    (365, "6-12m"),
];

fn maturity_bucket(days: i64) -> &'static str {
    for &(limit, label) in BUCKET_LABELS {
        if days <= limit {
            return label;
        }
    }
    "1y+"
}

/// Count/mean of the headline numeric columns per issuer and time-to-
/// maturity bucket. Rows without a parseable maturity are dropped.
pub fn maturity_buckets(raptor: &Table) -> Result<Table> {
    require_nonempty(raptor, "raptor")?;

    let Some(maturity) = raptor.column_index("maturity") else {
        return issuer_product_summary(raptor);
    };

    // Augment with a bucket column, then group on it.
    let now = Utc::now();
    let mut augmented = Table::new(
        raptor
            .columns
            .iter()
            .cloned()
            .chain(std::iter::once("mat_bucket".to_string())),
    );
    for row in &raptor.rows {
        let Some(t) = row.get(maturity).and_then(|v| v.as_time()) else {
            continue;
        };
        let days = (t - now).num_days();
        let mut r = row.clone();
        r.push(Value::Str(maturity_bucket(days).to_string()));
        augmented.push_row(r);
    }

    let bucket_idx = augmented.columns.len() - 1;
    let mut key_idxs = Vec::new();
    if let Some(issuer) = augmented.column_index("issuer") {
        key_idxs.push(issuer);
    }
    key_idxs.push(bucket_idx);

    let mut value_idxs = present_numeric(&augmented, &["open_interest", "volume_1d", "spread_bps"]);
    if value_idxs.is_empty() {
        value_idxs = augmented
            .numeric_column_indices()
            .into_iter()
            .take(3)
            .collect();
    }

    let mut columns: Vec<String> = key_idxs
        .iter()
        .map(|&i| augmented.columns[i].clone())
        .collect();
    for &v in &value_idxs {
        let name = &augmented.columns[v];
        columns.push(format!("{name}_count"));
        columns.push(format!("{name}_mean"));
    }

    let mut out = Table::new(columns);
    for (key, indices) in group_rows(&augmented, &key_idxs) {
        let mut row: Vec<Value> = key.into_iter().map(Value::Str).collect();
        for &v in &value_idxs {
            let xs = group_nums(&augmented, &indices, v);
            row.push(Value::Num(xs.len() as f64));
            row.push(opt_num(mean(&xs)));
        }
        out.push_row(row);
    }
    Ok(out)
}

/// Identity passthrough: the matrix view pivots the raw table itself.
pub fn spread_matrix(raptor: &Table) -> Result<Table> {
    require_nonempty(raptor, "raptor")?;
    Ok(raptor.clone())
}

/// Per-issuer aggregate backing the issuer plot.
pub fn issuer_plot(raptor: &Table) -> Result<Table> {
    require_nonempty(raptor, "raptor")?;

    let Some(issuer) = raptor.column_index("issuer") else {
        let mut out = Table::new(["info"]);
        out.push_row(vec![Value::Str("Missing issuer column".to_string())]);
        return Ok(out);
    };

    let spread = raptor
        .column_index("spread_bps")
        .filter(|&i| raptor.is_numeric_column(i));
    let strike = raptor
        .column_index("strike")
        .filter(|&i| raptor.is_numeric_column(i));

    let mut columns = vec!["issuer".to_string(), "count".to_string()];
    if spread.is_some() {
        columns.push("avg_spread_bps".to_string());
    }
    if strike.is_some() {
        columns.push("avg_strike".to_string());
    }

    let mut out = Table::new(columns);
    for (key, indices) in group_rows(raptor, &[issuer]) {
        let mut row: Vec<Value> = key.into_iter().map(Value::Str).collect();
        row.push(Value::Num(indices.len() as f64));
        if let Some(s) = spread {
            row.push(opt_num(mean(&group_nums(raptor, &indices, s))));
        }
        if let Some(s) = strike {
            row.push(opt_num(mean(&group_nums(raptor, &indices, s))));
        }
        out.push_row(row);
    }
    Ok(out)
}

/// Rows ranked by absolute delta. Falls back to the open-interest ranking
/// when the table carries no delta column.
pub fn top_abs_delta(raptor: &Table) -> Result<Table> {
    require_nonempty(raptor, "raptor")?;

    let Some(delta) = raptor
        .column_index("delta")
        .filter(|&i| raptor.is_numeric_column(i))
    else {
        return top_open_interest(raptor);
    };

    let mut augmented = Table::new(
        raptor
            .columns
            .iter()
            .cloned()
            .chain(std::iter::once("abs_delta".to_string())),
    );
    for row in &raptor.rows {
        let mut r = row.clone();
        r.push(opt_num(row.get(delta).and_then(|v| v.as_f64()).map(f64::abs)));
        augmented.push_row(r);
    }

    let abs_idx = augmented.columns.len() - 1;
    let out = augmented.sorted_desc_by(abs_idx).head(800);
    Ok(out.select(&[
        "scheme_id",
        "issuer",
        "product",
        "callput",
        "underlying_isin",
        "strike",
        "bid",
        "ask",
        "delta",
        "abs_delta",
        "iv_30d",
    ]))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
