//! The options bag contract (spec §6 "Options bag contract (consumed, not
//! owned)"): an opaque configuration bag the engine reads from but never
//! owns outright. Defined as a trait (object-safe, so the parse phase can
//! hold a `Box<dyn OptionsBag>` per component without generics leaking into
//! every call site) with a concrete default implementation.

use std::path::{Path, PathBuf};

/// Sentinel meaning "no override" for `parallelism()`, matching spec §6's
/// `MaxInt32` convention.
pub const PARALLELISM_UNSET: usize = usize::MAX;

pub trait OptionsBag: Send + Sync {
    fn working_dir(&self) -> &Path;
    fn root_working_dir(&self) -> &Path;

    /// Worker count override, or [`PARALLELISM_UNSET`] if unset.
    fn parallelism(&self) -> usize {
        PARALLELISM_UNSET
    }

    fn experiment(&self, name: &str) -> bool {
        let _ = name;
        false
    }

    /// Per-component clone so the parse phase can override parse parameters
    /// without mutating the caller's bag (spec §6 "A `Clone()` method is
    /// required").
    fn box_clone(&self) -> Box<dyn OptionsBag>;
}

impl Clone for Box<dyn OptionsBag> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Recognized experiment flag names.
pub const EXPERIMENT_SYMLINKS: &str = "symlinks";

/// The crate's own concrete [`OptionsBag`] implementation, used when a
/// caller doesn't supply one of their own.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub working_dir: PathBuf,
    pub root_working_dir: PathBuf,
    pub parallelism: usize,
    pub experiments: Vec<String>,
}

impl DiscoveryOptions {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        Self {
            root_working_dir: working_dir.clone(),
            working_dir,
            parallelism: PARALLELISM_UNSET,
            experiments: Vec::new(),
        }
    }
}

impl OptionsBag for DiscoveryOptions {
    fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    fn root_working_dir(&self) -> &Path {
        &self.root_working_dir
    }

    fn parallelism(&self) -> usize {
        self.parallelism
    }

    fn experiment(&self, name: &str) -> bool {
        self.experiments.iter().any(|e| e == name)
    }

    fn box_clone(&self) -> Box<dyn OptionsBag> {
        Box::new(self.clone())
    }
}
