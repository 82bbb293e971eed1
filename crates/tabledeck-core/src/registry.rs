use crate::actions;
use crate::error::{DeckError, Result};
use crate::table::Table;
use crate::tracker::PipelineTracker;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ---------------------------------------------------------------------------
// ViewKind
// ---------------------------------------------------------------------------

/// How the presentation layer renders an action's result. Carried through
/// as metadata only; the core never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Table,
    SpreadMatrix,
    TablePlot,
}

impl Default for ViewKind {
    fn default() -> Self {
        ViewKind::Table
    }
}

impl ViewKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewKind::Table => "table",
            ViewKind::SpreadMatrix => "spread_matrix",
            ViewKind::TablePlot => "table_plot",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ViewKind {
    type Err = DeckError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "table" => Ok(ViewKind::Table),
            "spread_matrix" => Ok(ViewKind::SpreadMatrix),
            "table_plot" => Ok(ViewKind::TablePlot),
            _ => Err(DeckError::InvalidName(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

/// The closed set of built-in computations. New actions are new variants,
/// not runtime function lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    IssuerProductSummary,
    TopOpenInterest,
    MissingnessReport,
    IssuerCurrencySpread,
    MaturityBuckets,
    SpreadMatrix,
    IssuerPlot,
    TopAbsDelta,
}

impl ActionKind {
    /// The capability interface: a pure transform from the raw input table
    /// to the result table.
    pub fn compute(self, raw: &Table) -> Result<Table> {
        match self {
            ActionKind::IssuerProductSummary => actions::issuer_product_summary(raw),
            ActionKind::TopOpenInterest => actions::top_open_interest(raw),
            ActionKind::MissingnessReport => actions::missingness_report(raw),
            ActionKind::IssuerCurrencySpread => actions::issuer_currency_spread(raw),
            ActionKind::MaturityBuckets => actions::maturity_buckets(raw),
            ActionKind::SpreadMatrix => actions::spread_matrix(raw),
            ActionKind::IssuerPlot => actions::issuer_plot(raw),
            ActionKind::TopAbsDelta => actions::top_abs_delta(raw),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionSpec
// ---------------------------------------------------------------------------

fn default_row_limit() -> Option<usize> {
    Some(2000)
}

/// One registered action: key, display metadata, declared dependencies, and
/// the computation it dispatches to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    pub kind: ActionKind,
    #[serde(default)]
    pub view: ViewKind,
    #[serde(default = "default_row_limit")]
    pub row_limit: Option<usize>,
}

impl ActionSpec {
    /// Run the transform and trim the result to the row limit. A transform
    /// failure becomes `ActionFailed` carrying this action's key.
    pub fn compute(&self, raw: &Table) -> Result<Table> {
        let out = self.kind.compute(raw).map_err(|e| DeckError::ActionFailed {
            action: self.key.clone(),
            cause: e.to_string(),
        })?;
        Ok(match self.row_limit {
            Some(limit) => out.head(limit),
            None => out,
        })
    }

    /// The slot whose table is handed to the transform. Built-in transforms
    /// read a single input.
    pub fn primary_input(&self) -> Option<&str> {
        self.depends_on.iter().next().map(|s| s.as_str())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered collection of action specs with unique keys.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    actions: Vec<ActionSpec>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ActionSpec) -> Result<()> {
        crate::paths::validate_name(&spec.key)?;
        if self.get(&spec.key).is_some() {
            return Err(DeckError::DuplicateAction(spec.key));
        }
        self.actions.push(spec);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&ActionSpec> {
        self.actions.iter().find(|a| a.key == key)
    }

    pub fn require(&self, key: &str) -> Result<&ActionSpec> {
        self.get(key)
            .ok_or_else(|| DeckError::UnknownAction(key.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionSpec> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Feed every action's declared dependency set into the tracker.
    /// Slots must already be registered.
    pub fn install(&self, tracker: &mut PipelineTracker) -> Result<()> {
        for spec in &self.actions {
            tracker.register_action(&spec.key, spec.depends_on.clone())?;
        }
        Ok(())
    }
}

/// The built-in action set over the `underlyings`/`raptor` slots. Every
/// built-in reads the raptor table.
pub fn default_registry() -> Registry {
    fn spec(key: &str, name: &str, kind: ActionKind, view: ViewKind) -> ActionSpec {
        ActionSpec {
            key: key.to_string(),
            name: name.to_string(),
            depends_on: std::iter::once("raptor".to_string()).collect(),
            kind,
            view,
            row_limit: default_row_limit(),
        }
    }

    let actions = vec![
        spec(
            "issuer-summary",
            "Issuer Summary",
            ActionKind::IssuerProductSummary,
            ViewKind::Table,
        ),
        spec(
            "top-open-interest",
            "Top Open Interest",
            ActionKind::TopOpenInterest,
            ViewKind::Table,
        ),
        spec(
            "missingness",
            "Missingness Report",
            ActionKind::MissingnessReport,
            ViewKind::Table,
        ),
        spec(
            "issuer-currency-spread",
            "Issuer/Currency Spread",
            ActionKind::IssuerCurrencySpread,
            ViewKind::Table,
        ),
        spec(
            "maturity-buckets",
            "Maturity Buckets",
            ActionKind::MaturityBuckets,
            ViewKind::Table,
        ),
        spec(
            "spread-matrix",
            "Spread Matrix",
            ActionKind::SpreadMatrix,
            ViewKind::SpreadMatrix,
        ),
        spec(
            "issuer-plot",
            "Issuer Plot",
            ActionKind::IssuerPlot,
            ViewKind::TablePlot,
        ),
        spec(
            "top-abs-delta",
            "Top Absolute Delta",
            ActionKind::TopAbsDelta,
            ViewKind::Table,
        ),
    ];
    Registry { actions }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    fn raw() -> Table {
        let mut t = Table::new(["issuer", "open_interest"]);
        t.push_row(vec!["acme".into(), Value::Num(10.0)]);
        t.push_row(vec!["bravo".into(), Value::Num(20.0)]);
        t
    }

    #[test]
    fn default_registry_has_eight_actions() {
        let r = default_registry();
        assert_eq!(r.len(), 8);
        for spec in r.iter() {
            assert!(spec.depends_on.contains("raptor"));
            assert_eq!(spec.primary_input(), Some("raptor"));
        }
        assert!(r.get("missingness").is_some());
        assert!(r.get("nope").is_none());
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut r = default_registry();
        let spec = r.get("missingness").unwrap().clone();
        assert!(matches!(
            r.register(spec),
            Err(DeckError::DuplicateAction(_))
        ));
    }

    #[test]
    fn require_fails_on_unknown_key() {
        let r = default_registry();
        assert!(matches!(
            r.require("nope"),
            Err(DeckError::UnknownAction(_))
        ));
    }

    #[test]
    fn compute_applies_row_limit() {
        let mut spec = default_registry().get("spread-matrix").unwrap().clone();
        spec.row_limit = Some(1);
        let out = spec.compute(&raw()).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn transform_failure_carries_the_action_key() {
        let spec = default_registry().get("issuer-summary").unwrap().clone();
        let empty = Table::new(["a"]);
        match spec.compute(&empty) {
            Err(DeckError::ActionFailed { action, cause }) => {
                assert_eq!(action, "issuer-summary");
                assert!(cause.contains("empty"));
            }
            other => panic!("expected ActionFailed, got {other:?}"),
        }
    }

    #[test]
    fn install_registers_dependencies() {
        let mut tracker = PipelineTracker::new();
        tracker.register_slot("underlyings").unwrap();
        tracker.register_slot("raptor").unwrap();
        default_registry().install(&mut tracker).unwrap();
        assert!(!tracker.is_ready("issuer-summary").unwrap());
        tracker.record_load("raptor").unwrap();
        assert!(tracker.is_ready("issuer-summary").unwrap());
    }

    #[test]
    fn install_fails_without_slots() {
        let mut tracker = PipelineTracker::new();
        assert!(matches!(
            default_registry().install(&mut tracker),
            Err(DeckError::UnknownSlot(_))
        ));
    }

    #[test]
    fn view_kind_roundtrip() {
        use std::str::FromStr;
        for v in [ViewKind::Table, ViewKind::SpreadMatrix, ViewKind::TablePlot] {
            assert_eq!(ViewKind::from_str(v.as_str()).unwrap(), v);
        }
        assert!(ViewKind::from_str("bogus").is_err());
    }
}
