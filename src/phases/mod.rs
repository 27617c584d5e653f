//! The discovery pipeline's phases (spec §4.3-§4.7), each operating on the
//! shared [`Engine`] the coordinator assembles in [`crate::discovery`].

pub mod filesystem;
pub mod graph;
pub mod parse;
pub mod relationship;
pub mod worktree;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::component::ComponentKind;
use crate::discovery::DiscoveryConfig;
use crate::filters::Filters;
use crate::filters::classifier::Classifier;
use crate::git::GitWorktrees;
use crate::options::OptionsBag;
use crate::parser::ConfigParser;
use crate::registry::ComponentRegistry;

/// Everything a phase needs: the run's configuration, the shared registry
/// and classifier, the parsed filter set, and the collaborators (spec §6
/// "consumed, not owned"). Built once by the coordinator and threaded
/// through every phase by reference.
pub struct Engine {
    pub config: DiscoveryConfig,
    pub registry: ComponentRegistry,
    pub classifier: Classifier,
    pub filters: Filters,
    pub parser: Arc<dyn ConfigParser>,
    pub git: Arc<dyn GitWorktrees>,
    pub options: Box<dyn OptionsBag>,
}

impl Engine {
    /// Worker count clamped to `[DEFAULT_WORKERS, hardware parallelism]`
    /// (spec §4.1 "number of workers (clamped to `[defaultWorkers,
    /// maxWorkers]`)").
    pub fn worker_count(&self) -> usize {
        let max_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(crate::discovery::DEFAULT_WORKERS);
        let requested = if self.options.parallelism() != crate::options::PARALLELISM_UNSET {
            self.options.parallelism()
        } else {
            self.config.workers
        };
        requested.clamp(
            crate::discovery::DEFAULT_WORKERS,
            max_workers.max(crate::discovery::DEFAULT_WORKERS),
        )
    }

    /// Runs `f` inside a dedicated rayon pool sized to [`Self::worker_count`]
    /// (spec §5 "each phase launches a bounded group of worker tasks capped
    /// at the configured worker count").
    pub fn with_worker_pool<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_count())
            .build()
        {
            Ok(pool) => pool.install(f),
            Err(_) => f(),
        }
    }

    pub fn config_file_name(&self, kind: ComponentKind) -> &str {
        match kind {
            ComponentKind::Unit => &self.config.unit_filename,
            ComponentKind::Stack => &self.config.stack_filename,
        }
    }

    pub fn config_file_path(&self, component_dir: &Path, kind: ComponentKind) -> PathBuf {
        component_dir.join(self.config_file_name(kind))
    }
}

/// Relative-path rendering used for glob matching (spec §3 "Glob" matching
/// against a `./`-relative display path).
pub fn relative_display(path: &Path, working_dir: &Path) -> String {
    let relative = pathdiff::diff_paths(path, working_dir).unwrap_or_else(|| path.to_path_buf());
    format!("./{}", relative.display())
}

/// Resolves a `dependency` block's `config_path` against the component
/// directory that declared it, canonicalising where possible (spec §4.6
/// "resolves each to an absolute path").
pub fn resolve_dependency_path(from_dir: &Path, config_path: &str) -> PathBuf {
    let joined = from_dir.join(config_path);
    dunce::canonicalize(&joined).unwrap_or(joined)
}

/// Detects whether `dir` is a Stack (has the stack filename) or Unit
/// (otherwise), matching the filesystem phase's own rule (spec §4.6
/// "creates a new Unit (or Stack, if a stack filename is present in that
/// directory)").
pub fn detect_kind(dir: &Path, engine: &Engine) -> ComponentKind {
    if dir.join(&engine.config.stack_filename).is_file() {
        ComponentKind::Stack
    } else {
        ComponentKind::Unit
    }
}
