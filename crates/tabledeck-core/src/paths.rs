use crate::error::{DeckError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const DECK_DIR: &str = ".tabledeck";
pub const TABLES_DIR: &str = ".tabledeck/tables";
pub const RESULTS_DIR: &str = ".tabledeck/results";

pub const CONFIG_FILE: &str = ".tabledeck/config.yaml";
pub const PIPELINE_FILE: &str = ".tabledeck/pipeline.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn pipeline_path(root: &Path) -> PathBuf {
    root.join(PIPELINE_FILE)
}

pub fn table_path(root: &Path, slot: &str) -> PathBuf {
    root.join(TABLES_DIR).join(format!("{slot}.json"))
}

pub fn result_path(root: &Path, key: &str) -> PathBuf {
    root.join(RESULTS_DIR).join(format!("{key}.json"))
}

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

/// Slot names and action keys double as file names, so they are restricted
/// to lowercase slugs.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 || !name_re().is_match(name) {
        return Err(DeckError::InvalidName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
