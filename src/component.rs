//! The discovered unit of work: a filesystem-anchored [`Component`] plus the
//! immutable [`DiscoveryContext`] describing how it was found.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::parser::ParsedConfig;

/// Distinguishes the two kinds of component, decided by which recognized
/// config filename is present in the component's directory. Once set at
/// creation it never changes (spec §3 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ComponentKind {
    Unit,
    Stack,
}

/// Names the phase or sub-discovery that created a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Origin {
    Filesystem,
    WorktreeDiscovery,
    GraphDiscovery,
    RelationshipDiscovery,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Origin::Filesystem => "filesystem",
            Origin::WorktreeDiscovery => "worktree-discovery",
            Origin::GraphDiscovery => "graph-discovery",
            Origin::RelationshipDiscovery => "relationship-discovery",
        };
        f.write_str(s)
    }
}

/// Immutable per-component record carrying the conditions a component was
/// discovered under (spec §3 "Discovery Context"). Copy-on-propagate: every
/// dependency inherits a *copy*, never a shared reference, so mutating a
/// child's context (e.g. extending args with `-destroy`) can never leak back
/// to its parent or siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryContext {
    pub working_dir: PathBuf,
    pub git_ref: Option<String>,
    pub command: Option<String>,
    pub command_args: Vec<String>,
    pub origin: Origin,
}

impl DiscoveryContext {
    pub fn new(working_dir: PathBuf, origin: Origin) -> Self {
        Self {
            working_dir,
            git_ref: None,
            command: None,
            command_args: Vec::new(),
            origin,
        }
    }

    /// Returns a copy with `origin` replaced, for propagating to a
    /// newly-discovered dependency.
    pub fn propagate(&self, origin: Origin) -> Self {
        let mut ctx = self.clone();
        ctx.origin = origin;
        ctx
    }
}

/// A dependency edge. The child is referenced by canonical path; the
/// registry is the source of truth for the actual `Component`, so edges
/// don't hold a strong reference themselves (avoiding reference cycles in a
/// structure that is explicitly allowed to contain cycles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub target: PathBuf,
    pub enabled: bool,
}

/// Mutable state gathered during discovery, guarded by a single lock per
/// component so concurrent phases can enrich a component (attach parsed
/// config, append dependency edges) without contending on the registry's
/// global map lock.
#[derive(Debug, Default)]
struct ComponentState {
    config: Option<ParsedConfig>,
    files_read: Vec<PathBuf>,
    dependencies: Vec<DependencyEdge>,
    external: bool,
}

/// A discovered filesystem-anchored object: a [`ComponentKind::Unit`] or
/// [`ComponentKind::Stack`]. Identity is its canonical absolute path (spec §3
/// "Canonical-path identity"); the registry guarantees at most one
/// `Component` exists per path.
#[derive(Debug)]
pub struct Component {
    pub path: PathBuf,
    pub kind: ComponentKind,
    pub context: DiscoveryContext,
    state: RwLock<ComponentState>,
}

impl Component {
    pub fn new(path: PathBuf, kind: ComponentKind, context: DiscoveryContext) -> Arc<Self> {
        Arc::new(Self {
            path,
            kind,
            context,
            state: RwLock::new(ComponentState::default()),
        })
    }

    pub fn parsed_config(&self) -> Option<ParsedConfig> {
        self.state.read().unwrap().config.clone()
    }

    pub fn has_parsed_config(&self) -> bool {
        self.state.read().unwrap().config.is_some()
    }

    pub fn set_parsed_config(&self, config: ParsedConfig, files_read: Vec<PathBuf>) {
        let mut state = self.state.write().unwrap();
        state.config = Some(config);
        state.files_read = files_read;
    }

    pub fn files_read(&self) -> Vec<PathBuf> {
        self.state.read().unwrap().files_read.clone()
    }

    /// Idempotent: de-duplicates by target path (spec §4.8 `AddDependency`).
    pub fn add_dependency(&self, target: PathBuf, enabled: bool) {
        let mut state = self.state.write().unwrap();
        if let Some(existing) = state.dependencies.iter_mut().find(|d| d.target == target) {
            existing.enabled = enabled;
        } else {
            state.dependencies.push(DependencyEdge { target, enabled });
        }
    }

    /// Dependencies, sorted by path for deterministic output (spec §8
    /// "dependency order within a component is also sorted").
    pub fn dependencies(&self) -> Vec<DependencyEdge> {
        let mut deps = self.state.read().unwrap().dependencies.clone();
        deps.sort_by(|a, b| a.target.cmp(&b.target));
        deps
    }

    pub fn has_dependencies(&self) -> bool {
        !self.state.read().unwrap().dependencies.is_empty()
    }

    pub fn is_external(&self) -> bool {
        self.state.read().unwrap().external
    }

    /// Monotonic: once set, stays set (spec §3 "External flag is monotonic").
    pub fn mark_external(&self) {
        self.state.write().unwrap().external = true;
    }

    /// Computes and applies the external flag relative to a working
    /// directory, honoring monotonicity (first-set sticks — spec §9 Open
    /// Questions).
    pub fn update_external(&self, working_dir: &Path) {
        if !self.path.starts_with(working_dir) {
            self.mark_external();
        }
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Component {}
