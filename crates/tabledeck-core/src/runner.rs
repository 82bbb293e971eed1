//! Two-phase action execution. A computation may run off the event thread,
//! so it never touches the tracker directly: it captures the dependency
//! generations up front and hands the result back for an atomic completion
//! check. A reload that lands in between supersedes the result.

use crate::error::Result;
use crate::tracker::{PipelineTracker, RunOutcome};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// PendingRun
// ---------------------------------------------------------------------------

/// An in-flight action run: the key plus the generations it observed when
/// it started.
#[derive(Debug, Clone)]
pub struct PendingRun {
    key: String,
    observed: BTreeMap<String, u64>,
}

impl PendingRun {
    /// Start a run. Fails with `ActionNotReady` if any dependency is absent
    /// and `UnknownAction` on a bad key.
    pub fn begin(tracker: &PipelineTracker, key: &str) -> Result<Self> {
        let observed = tracker.observed_generations(key)?;
        Ok(Self {
            key: key.to_string(),
            observed,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn observed(&self) -> &BTreeMap<String, u64> {
        &self.observed
    }

    /// Hand the finished computation back to the tracker. Re-checks the
    /// dependency generations at completion time; a mismatch means the
    /// result was computed against superseded data and is not recorded.
    pub fn complete(self, tracker: &mut PipelineTracker) -> Result<RunOutcome> {
        tracker.record_run_observed(&self.key, &self.observed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeckError;
    use crate::registry::default_registry;
    use crate::table::{Table, Value};
    use std::collections::BTreeSet;

    fn tracker() -> PipelineTracker {
        let mut t = PipelineTracker::new();
        t.register_slot("underlyings").unwrap();
        t.register_slot("raptor").unwrap();
        default_registry().install(&mut t).unwrap();
        t
    }

    fn raw() -> Table {
        let mut t = Table::new(["issuer", "open_interest"]);
        t.push_row(vec!["acme".into(), Value::Num(10.0)]);
        t
    }

    #[test]
    fn begin_fails_before_load() {
        let t = tracker();
        assert!(matches!(
            PendingRun::begin(&t, "missingness"),
            Err(DeckError::ActionNotReady { .. })
        ));
        assert!(matches!(
            PendingRun::begin(&t, "nope"),
            Err(DeckError::UnknownAction(_))
        ));
    }

    #[test]
    fn begin_compute_complete_records_the_run() {
        let mut t = tracker();
        t.record_load("raptor").unwrap();

        let registry = default_registry();
        let spec = registry.get("missingness").unwrap();
        let pending = PendingRun::begin(&t, "missingness").unwrap();
        assert_eq!(pending.key(), "missingness");
        assert_eq!(pending.observed().get("raptor"), Some(&1));

        let result = spec.compute(&raw()).unwrap();
        assert!(!result.is_empty());
        assert_eq!(pending.complete(&mut t).unwrap(), RunOutcome::Recorded);
        assert!(t.has_result("missingness").unwrap());
        assert!(!t.is_stale("missingness").unwrap());
    }

    #[test]
    fn reload_between_begin_and_complete_discards_the_result() {
        let mut t = tracker();
        t.record_load("raptor").unwrap();

        let pending = PendingRun::begin(&t, "missingness").unwrap();
        // A reload lands while the computation is in flight.
        t.record_load("raptor").unwrap();

        let outcome = pending.complete(&mut t).unwrap();
        assert_eq!(outcome, RunOutcome::Superseded);
        assert!(!t.has_result("missingness").unwrap());
    }

    #[test]
    fn failed_transform_leaves_no_run_recorded() {
        let mut t = tracker();
        t.record_load("raptor").unwrap();

        let registry = default_registry();
        let spec = registry.get("issuer-summary").unwrap();
        let _pending = PendingRun::begin(&t, "issuer-summary").unwrap();
        let empty = Table::new(["a"]);
        assert!(matches!(
            spec.compute(&empty),
            Err(DeckError::ActionFailed { .. })
        ));
        // The pending run is dropped without completing.
        assert!(!t.has_result("issuer-summary").unwrap());
    }

    #[test]
    fn completion_after_rerun_of_unrelated_action_still_records() {
        let mut t = tracker();
        t.record_load("raptor").unwrap();
        t.register_slot("other").unwrap();
        t.register_action("unrelated", BTreeSet::from(["other".to_string()]))
            .unwrap();

        let pending = PendingRun::begin(&t, "missingness").unwrap();
        t.record_load("other").unwrap();
        t.record_run("unrelated").unwrap();

        assert_eq!(pending.complete(&mut t).unwrap(), RunOutcome::Recorded);
    }
}
