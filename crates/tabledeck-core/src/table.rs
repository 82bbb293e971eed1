use crate::error::{DeckError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// One table cell. Untagged so persisted tables read as plain JSON:
/// numbers, strings, RFC 3339 timestamps, and nulls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Num(f64),
    Time(DateTime<Utc>),
    Str(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// Human-readable cell text. Nulls render as the empty string, which is
    /// also what the filter layer matches against.
    pub fn display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Num(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n:.4}")
                }
            }
            Value::Time(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
            Value::Str(s) => s.clone(),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// A named-column table of rows. This is the boundary type the action
/// transforms and the filter layer work over.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().filter_map(move |r| r.get(idx))
    }

    /// A column is numeric when it holds at least one number and nothing
    /// but numbers and nulls. Mirrors the "no filters for numeric columns"
    /// split in the filter layer.
    pub fn is_numeric_column(&self, idx: usize) -> bool {
        let mut seen_num = false;
        for v in self.column_values(idx) {
            match v {
                Value::Num(_) => seen_num = true,
                Value::Null => {}
                _ => return false,
            }
        }
        seen_num
    }

    pub fn numeric_column_indices(&self) -> Vec<usize> {
        (0..self.columns.len())
            .filter(|&i| self.is_numeric_column(i))
            .collect()
    }

    /// Dominant type of a column, judged by its first non-null cell.
    pub fn column_dtype(&self, idx: usize) -> &'static str {
        for v in self.column_values(idx) {
            match v {
                Value::Num(_) => return "num",
                Value::Time(_) => return "time",
                Value::Str(_) => return "str",
                Value::Null => {}
            }
        }
        "null"
    }

    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Rows sorted descending by the given column, nulls last.
    pub fn sorted_desc_by(&self, idx: usize) -> Table {
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| cmp_cells_desc(a.get(idx), b.get(idx)));
        Table {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Keep only the listed columns, in the given order. Names that do not
    /// exist are skipped.
    pub fn select(&self, names: &[&str]) -> Table {
        let indices: Vec<usize> = names
            .iter()
            .filter_map(|n| self.column_index(n))
            .collect();
        let columns = indices.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|r| {
                indices
                    .iter()
                    .map(|&i| r.get(i).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Table { columns, rows }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let table: Table = serde_json::from_str(&data)?;
        Ok(table)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // CSV ingestion
    // -----------------------------------------------------------------------

    /// Parse CSV text with a header row. Per-column types are sniffed:
    /// a column where every non-empty cell parses as a number becomes
    /// numeric, likewise for timestamps; everything else stays text.
    /// Empty cells are nulls.
    pub fn from_csv_str(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .filter(|l| !l.is_empty());

        let header = lines
            .next()
            .ok_or_else(|| DeckError::MalformedCsv("missing header row".to_string()))?;
        let columns: Vec<String> = split_csv_line(header);
        let ncols = columns.len();

        let mut raw_rows: Vec<Vec<String>> = Vec::new();
        for (i, line) in lines.enumerate() {
            let cells = split_csv_line(line);
            if cells.len() != ncols {
                return Err(DeckError::MalformedCsv(format!(
                    "row {} has {} cells, expected {}",
                    i + 2,
                    cells.len(),
                    ncols
                )));
            }
            raw_rows.push(cells);
        }

        let mut table = Table {
            columns,
            rows: Vec::with_capacity(raw_rows.len()),
        };
        let kinds: Vec<ColumnKind> = (0..ncols)
            .map(|c| sniff_column(raw_rows.iter().map(|r| r[c].as_str())))
            .collect();
        for raw in raw_rows {
            let row = raw
                .into_iter()
                .zip(&kinds)
                .map(|(cell, kind)| kind.parse(&cell))
                .collect();
            table.rows.push(row);
        }
        Ok(table)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn cmp_cells_desc(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Null) | None, Some(Value::Null) | None) => Ordering::Equal,
        (Some(Value::Null) | None, _) => Ordering::Greater,
        (_, Some(Value::Null) | None) => Ordering::Less,
        (Some(x), Some(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(xn), Some(yn)) => yn.partial_cmp(&xn).unwrap_or(Ordering::Equal),
            _ => match (x.as_time(), y.as_time()) {
                (Some(xt), Some(yt)) => yt.cmp(&xt),
                _ => y.display().cmp(&x.display()),
            },
        },
    }
}

#[derive(Clone, Copy)]
enum ColumnKind {
    Num,
    Time,
    Str,
}

impl ColumnKind {
    fn parse(self, cell: &str) -> Value {
        if cell.is_empty() {
            return Value::Null;
        }
        match self {
            ColumnKind::Num => cell
                .parse::<f64>()
                .map(Value::Num)
                .unwrap_or(Value::Null),
            ColumnKind::Time => parse_time(cell).map(Value::Time).unwrap_or(Value::Null),
            ColumnKind::Str => Value::Str(cell.to_string()),
        }
    }
}

fn sniff_column<'a>(cells: impl Iterator<Item = &'a str>) -> ColumnKind {
    let mut any = false;
    let mut all_num = true;
    let mut all_time = true;
    for cell in cells.filter(|c| !c.is_empty()) {
        any = true;
        if cell.parse::<f64>().is_err() {
            all_num = false;
        }
        if parse_time(cell).is_none() {
            all_time = false;
        }
        if !all_num && !all_time {
            return ColumnKind::Str;
        }
    }
    match (any, all_num) {
        (false, _) => ColumnKind::Str,
        (true, true) => ColumnKind::Num,
        (true, false) => ColumnKind::Time,
    }
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(t.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
    }
    None
}

fn split_csv_line(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                // Doubled quote inside a quoted cell is a literal quote.
                if chars.peek() == Some(&'"') {
                    cur.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => out.push(std::mem::take(&mut cur)),
            _ => cur.push(c),
        }
    }
    out.push(cur);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
