use crate::error::{DeckError, Result};
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// One named upstream dataset. Generations count successive loads; the
/// counter starts at 0 (absent) and bumps on every load, reload included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotState {
    pub present: bool,
    pub generation: u64,
    pub loaded_at: Option<DateTime<Utc>>,
}

impl SlotState {
    fn new() -> Self {
        Self {
            present: false,
            generation: 0,
            loaded_at: None,
        }
    }
}

/// One registered action. `last_run_generations` is the frontier of slot
/// generations observed when the action last produced a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub depends_on: BTreeSet<String>,
    pub has_result: bool,
    #[serde(default)]
    pub last_run_generations: BTreeMap<String, u64>,
    pub ran_at: Option<DateTime<Utc>>,
}

impl ActionRecord {
    fn new(depends_on: BTreeSet<String>) -> Self {
        Self {
            depends_on,
            has_result: false,
            last_run_generations: BTreeMap::new(),
            ran_at: None,
        }
    }
}

/// Outcome of recording a completed run against generations observed when
/// the computation started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The result was recorded; the action is fresh.
    Recorded,
    /// A dependency was reloaded while the computation was in flight; the
    /// result was discarded and the record left untouched.
    Superseded,
}

// ---------------------------------------------------------------------------
// Status snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotStatus {
    pub present: bool,
    pub generation: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionStatus {
    pub ready: bool,
    pub has_result: bool,
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ran_at: Option<DateTime<Utc>>,
}

/// Read-only composite view for rendering, computed fresh on each call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub slots: BTreeMap<String, SlotStatus>,
    pub actions: BTreeMap<String, ActionStatus>,
}

// ---------------------------------------------------------------------------
// PipelineTracker
// ---------------------------------------------------------------------------

/// Single source of truth for dataset presence/freshness and action
/// readiness/staleness. The UI layer holds no copy of generation numbers;
/// it polls `status_snapshot` after every state change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineTracker {
    slots: BTreeMap<String, SlotState>,
    actions: BTreeMap<String, ActionRecord>,
}

impl PipelineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::pipeline_path(root);
        if !path.exists() {
            return Err(DeckError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let tracker: PipelineTracker = serde_yaml::from_str(&data)?;
        Ok(tracker)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::pipeline_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Declare a dataset slot. Idempotent: re-registering an existing slot
    /// keeps its current generation.
    pub fn register_slot(&mut self, name: &str) -> Result<()> {
        paths::validate_name(name)?;
        self.slots
            .entry(name.to_string())
            .or_insert_with(SlotState::new);
        Ok(())
    }

    /// Declare an action and the slots it reads. All dependencies must be
    /// registered slots. Re-registering with the same dependency set is a
    /// no-op; changing the set after startup is a configuration bug.
    pub fn register_action(&mut self, key: &str, depends_on: BTreeSet<String>) -> Result<()> {
        paths::validate_name(key)?;
        for dep in &depends_on {
            if !self.slots.contains_key(dep) {
                return Err(DeckError::UnknownSlot(dep.clone()));
            }
        }
        if let Some(existing) = self.actions.get(key) {
            if existing.depends_on == depends_on {
                return Ok(());
            }
            return Err(DeckError::DuplicateAction(key.to_string()));
        }
        self.actions
            .insert(key.to_string(), ActionRecord::new(depends_on));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Slot events and queries
    // -----------------------------------------------------------------------

    /// Record one successful load (or reload) of a slot. Bumps the
    /// generation unconditionally; identical content still counts as a new
    /// generation.
    pub fn record_load(&mut self, name: &str) -> Result<u64> {
        let slot = self
            .slots
            .get_mut(name)
            .ok_or_else(|| DeckError::UnknownSlot(name.to_string()))?;
        slot.generation += 1;
        slot.present = true;
        slot.loaded_at = Some(Utc::now());
        tracing::debug!(slot = name, generation = slot.generation, "slot loaded");
        Ok(slot.generation)
    }

    pub fn is_present(&self, name: &str) -> Result<bool> {
        self.slot(name).map(|s| s.present)
    }

    pub fn generation_of(&self, name: &str) -> Result<u64> {
        self.slot(name).map(|s| s.generation)
    }

    fn slot(&self, name: &str) -> Result<&SlotState> {
        self.slots
            .get(name)
            .ok_or_else(|| DeckError::UnknownSlot(name.to_string()))
    }

    // -----------------------------------------------------------------------
    // Action events and queries
    // -----------------------------------------------------------------------

    /// True iff every dependency slot has been loaded at least once.
    pub fn is_ready(&self, key: &str) -> Result<bool> {
        let record = self.action(key)?;
        Ok(record
            .depends_on
            .iter()
            .all(|d| self.slots.get(d).map(|s| s.present).unwrap_or(false)))
    }

    /// Record a successful run: capture the current generation of every
    /// dependency as the action's new frontier.
    pub fn record_run(&mut self, key: &str) -> Result<()> {
        let observed = self.observed_generations(key)?;
        self.commit_run(key, observed);
        Ok(())
    }

    /// Completion handshake for computations that ran off the event thread.
    /// The result is recorded only if every dependency's generation still
    /// matches what the computation observed when it started; otherwise the
    /// result is superseded and the record is left untouched.
    pub fn record_run_observed(
        &mut self,
        key: &str,
        observed: &BTreeMap<String, u64>,
    ) -> Result<RunOutcome> {
        let current = self.observed_generations(key)?;
        if current != *observed {
            tracing::info!(action = key, "result superseded by a newer dataset load");
            return Ok(RunOutcome::Superseded);
        }
        self.commit_run(key, current);
        Ok(RunOutcome::Recorded)
    }

    /// The current generation of every dependency of `key`, checked for
    /// readiness. This is what an offloaded computation captures up front.
    pub fn observed_generations(&self, key: &str) -> Result<BTreeMap<String, u64>> {
        let record = self.action(key)?;
        let missing: Vec<String> = record
            .depends_on
            .iter()
            .filter(|d| !self.slots.get(*d).map(|s| s.present).unwrap_or(false))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(DeckError::ActionNotReady {
                action: key.to_string(),
                missing,
            });
        }
        Ok(record
            .depends_on
            .iter()
            .map(|d| (d.clone(), self.slots[d].generation))
            .collect())
    }

    fn commit_run(&mut self, key: &str, generations: BTreeMap<String, u64>) {
        let record = self.actions.get_mut(key).expect("checked by caller");
        record.last_run_generations = generations;
        record.has_result = true;
        record.ran_at = Some(Utc::now());
        tracing::debug!(action = key, "run recorded");
    }

    /// False until the action has a result; afterwards, true iff any
    /// dependency generation advanced past the one captured at the last run.
    pub fn is_stale(&self, key: &str) -> Result<bool> {
        let record = self.action(key)?;
        if !record.has_result {
            return Ok(false);
        }
        Ok(record.depends_on.iter().any(|d| {
            let current = self.slots.get(d).map(|s| s.generation).unwrap_or(0);
            let captured = record.last_run_generations.get(d).copied().unwrap_or(0);
            current > captured
        }))
    }

    pub fn has_result(&self, key: &str) -> Result<bool> {
        self.action(key).map(|r| r.has_result)
    }

    fn action(&self, key: &str) -> Result<&ActionRecord> {
        self.actions
            .get(key)
            .ok_or_else(|| DeckError::UnknownAction(key.to_string()))
    }

    // -----------------------------------------------------------------------
    // Snapshot
    // -----------------------------------------------------------------------

    pub fn status_snapshot(&self) -> StatusSnapshot {
        let slots = self
            .slots
            .iter()
            .map(|(name, s)| {
                (
                    name.clone(),
                    SlotStatus {
                        present: s.present,
                        generation: s.generation,
                        loaded_at: s.loaded_at,
                    },
                )
            })
            .collect();
        let actions = self
            .actions
            .keys()
            .map(|key| {
                // Keys come from the map itself, so these queries cannot fail.
                let status = ActionStatus {
                    ready: self.is_ready(key).unwrap_or(false),
                    has_result: self.actions[key].has_result,
                    stale: self.is_stale(key).unwrap_or(false),
                    ran_at: self.actions[key].ran_at,
                };
                (key.clone(), status)
            })
            .collect();
        StatusSnapshot { slots, actions }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn deps(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn tracker_with_slots() -> PipelineTracker {
        let mut t = PipelineTracker::new();
        t.register_slot("underlyings").unwrap();
        t.register_slot("raptor").unwrap();
        t
    }

    #[test]
    fn generations_increase_by_one_per_load() {
        let mut t = tracker_with_slots();
        assert_eq!(t.generation_of("raptor").unwrap(), 0);
        assert!(!t.is_present("raptor").unwrap());
        for expected in 1..=5 {
            assert_eq!(t.record_load("raptor").unwrap(), expected);
            assert_eq!(t.generation_of("raptor").unwrap(), expected);
        }
        assert!(t.is_present("raptor").unwrap());
        // The other slot is untouched.
        assert_eq!(t.generation_of("underlyings").unwrap(), 0);
    }

    #[test]
    fn register_slot_is_idempotent() {
        let mut t = tracker_with_slots();
        t.record_load("raptor").unwrap();
        t.register_slot("raptor").unwrap();
        assert_eq!(t.generation_of("raptor").unwrap(), 1);
        assert!(t.is_present("raptor").unwrap());
    }

    #[test]
    fn readiness_tracks_presence_of_every_dependency() {
        let mut t = tracker_with_slots();
        t.register_action("both", deps(&["underlyings", "raptor"]))
            .unwrap();
        assert!(!t.is_ready("both").unwrap());
        t.record_load("underlyings").unwrap();
        assert!(!t.is_ready("both").unwrap());
        t.record_load("raptor").unwrap();
        assert!(t.is_ready("both").unwrap());
    }

    #[test]
    fn action_with_no_dependencies_is_always_ready() {
        let mut t = tracker_with_slots();
        t.register_action("constant", deps(&[])).unwrap();
        assert!(t.is_ready("constant").unwrap());
        assert!(!t.is_stale("constant").unwrap());
    }

    #[test]
    fn fresh_after_run_stale_after_reload() {
        let mut t = tracker_with_slots();
        t.register_action("summary", deps(&["raptor"])).unwrap();
        t.record_load("underlyings").unwrap();
        t.record_load("raptor").unwrap();

        assert!(t.is_ready("summary").unwrap());
        t.record_run("summary").unwrap();
        assert!(!t.is_stale("summary").unwrap());

        t.record_load("raptor").unwrap();
        assert!(t.is_stale("summary").unwrap());
        assert!(t.is_ready("summary").unwrap());

        t.record_run("summary").unwrap();
        assert!(!t.is_stale("summary").unwrap());
    }

    #[test]
    fn reloading_an_unrelated_slot_does_not_stale() {
        let mut t = tracker_with_slots();
        t.register_action("summary", deps(&["raptor"])).unwrap();
        t.record_load("raptor").unwrap();
        t.record_run("summary").unwrap();

        t.record_load("underlyings").unwrap();
        assert!(!t.is_stale("summary").unwrap());
    }

    #[test]
    fn never_run_actions_are_never_stale() {
        let mut t = tracker_with_slots();
        t.register_action("summary", deps(&["raptor"])).unwrap();
        assert!(!t.is_stale("summary").unwrap());
        t.record_load("raptor").unwrap();
        t.record_load("raptor").unwrap();
        assert!(!t.is_stale("summary").unwrap());
        assert!(!t.has_result("summary").unwrap());
    }

    #[test]
    fn run_before_ready_fails_with_missing_slots() {
        let mut t = tracker_with_slots();
        t.register_action("both", deps(&["underlyings", "raptor"]))
            .unwrap();
        t.record_load("underlyings").unwrap();

        let err = t.record_run("both").unwrap_err();
        match err {
            DeckError::ActionNotReady { action, missing } => {
                assert_eq!(action, "both");
                assert_eq!(missing, vec!["raptor".to_string()]);
            }
            other => panic!("expected ActionNotReady, got {other:?}"),
        }
        assert!(!t.has_result("both").unwrap());
    }

    #[test]
    fn unknown_names_fail_everywhere() {
        let mut t = tracker_with_slots();
        t.register_action("summary", deps(&["raptor"])).unwrap();

        assert!(matches!(
            t.record_load("nope"),
            Err(DeckError::UnknownSlot(_))
        ));
        assert!(matches!(
            t.is_present("nope"),
            Err(DeckError::UnknownSlot(_))
        ));
        assert!(matches!(
            t.generation_of("nope"),
            Err(DeckError::UnknownSlot(_))
        ));
        assert!(matches!(
            t.is_ready("nope"),
            Err(DeckError::UnknownAction(_))
        ));
        assert!(matches!(
            t.is_stale("nope"),
            Err(DeckError::UnknownAction(_))
        ));
        assert!(matches!(
            t.record_run("nope"),
            Err(DeckError::UnknownAction(_))
        ));
        assert!(matches!(
            t.register_action("bad", deps(&["nope"])),
            Err(DeckError::UnknownSlot(_))
        ));
    }

    #[test]
    fn register_action_rejects_changed_dependencies() {
        let mut t = tracker_with_slots();
        t.register_action("summary", deps(&["raptor"])).unwrap();
        // Same set is a no-op.
        t.register_action("summary", deps(&["raptor"])).unwrap();
        assert!(matches!(
            t.register_action("summary", deps(&["underlyings"])),
            Err(DeckError::DuplicateAction(_))
        ));
    }

    #[test]
    fn observed_run_is_recorded_when_generations_match() {
        let mut t = tracker_with_slots();
        t.register_action("summary", deps(&["raptor"])).unwrap();
        t.record_load("raptor").unwrap();

        let observed = t.observed_generations("summary").unwrap();
        let outcome = t.record_run_observed("summary", &observed).unwrap();
        assert_eq!(outcome, RunOutcome::Recorded);
        assert!(!t.is_stale("summary").unwrap());
    }

    #[test]
    fn observed_run_is_superseded_by_a_reload() {
        let mut t = tracker_with_slots();
        t.register_action("summary", deps(&["raptor"])).unwrap();
        t.record_load("raptor").unwrap();

        let observed = t.observed_generations("summary").unwrap();
        t.record_load("raptor").unwrap();

        let outcome = t.record_run_observed("summary", &observed).unwrap();
        assert_eq!(outcome, RunOutcome::Superseded);
        // The record is untouched: still no result, still not stale.
        assert!(!t.has_result("summary").unwrap());
        assert!(!t.is_stale("summary").unwrap());
    }

    #[test]
    fn spec_scenario_single_dependency() {
        let mut t = tracker_with_slots();
        t.register_action("a", deps(&["raptor"])).unwrap();

        t.record_load("underlyings").unwrap();
        t.record_load("raptor").unwrap();
        assert_eq!(t.generation_of("underlyings").unwrap(), 1);
        assert_eq!(t.generation_of("raptor").unwrap(), 1);
        assert!(t.is_ready("a").unwrap());

        t.record_run("a").unwrap();
        assert!(!t.is_stale("a").unwrap());

        t.record_load("raptor").unwrap();
        assert_eq!(t.generation_of("raptor").unwrap(), 2);
        assert!(t.is_stale("a").unwrap());
        assert!(t.is_ready("a").unwrap());

        t.record_run("a").unwrap();
        assert!(!t.is_stale("a").unwrap());
    }

    #[test]
    fn snapshot_reflects_current_state() {
        let mut t = tracker_with_slots();
        t.register_action("summary", deps(&["raptor"])).unwrap();
        t.record_load("raptor").unwrap();
        t.record_run("summary").unwrap();
        t.record_load("raptor").unwrap();

        let snap = t.status_snapshot();
        assert_eq!(snap.slots.len(), 2);
        assert_eq!(snap.slots["raptor"].generation, 2);
        assert!(snap.slots["raptor"].present);
        assert!(!snap.slots["underlyings"].present);

        let a = &snap.actions["summary"];
        assert!(a.ready);
        assert!(a.has_result);
        assert!(a.stale);
        assert!(a.ran_at.is_some());
    }

    #[test]
    fn tracker_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut t = tracker_with_slots();
        t.register_action("summary", deps(&["raptor"])).unwrap();
        t.record_load("raptor").unwrap();
        t.record_run("summary").unwrap();
        t.record_load("raptor").unwrap();
        t.save(dir.path()).unwrap();

        let loaded = PipelineTracker::load(dir.path()).unwrap();
        assert_eq!(loaded.generation_of("raptor").unwrap(), 2);
        assert!(loaded.is_stale("summary").unwrap());
    }

    #[test]
    fn load_without_init_fails() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            PipelineTracker::load(dir.path()),
            Err(DeckError::NotInitialized)
        ));
    }
}
