//! The discovery coordinator (spec §4.1): configures a run via
//! [`DiscoveryBuilder`], drives the phases in order, and finalizes the
//! result.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{DiscoveryError, Result};
use crate::filters::Filters;
use crate::git::{CliGitWorktrees, GitWorktrees};
use crate::options::{DiscoveryOptions, OptionsBag};
use crate::parser::{ConfigParser, HclConfigParser};
use crate::phases::{self, Engine};

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_UNIT_FILENAME: &str = "terragrunt.hcl";
pub const DEFAULT_STACK_FILENAME: &str = "terragrunt.stack.hcl";
pub const DEFAULT_MAX_DEPENDENCY_DEPTH: usize = 1000;

/// The run's configuration (spec §4.1 "Configuration knobs"), assembled by
/// [`DiscoveryBuilder`].
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub working_dir: PathBuf,
    pub unit_filename: String,
    pub stack_filename: String,
    pub workers: usize,
    pub max_dependency_depth: usize,
    pub suppress_parse_errors: bool,
    pub parse_exclude: bool,
    pub parse_includes: bool,
    pub read_files: bool,
    pub break_cycles: bool,
    pub relationships: bool,
    pub hide_hidden_directories: bool,
    pub filters: Vec<String>,
    pub graph_target: Option<PathBuf>,
    pub git_root: Option<PathBuf>,
    /// The downstream command (`plan`/`apply`/none) this run is discovering
    /// components for; constrains git-diff filter compatibility (spec
    /// §4.4).
    pub command: Option<String>,
}

impl DiscoveryConfig {
    fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            unit_filename: DEFAULT_UNIT_FILENAME.to_string(),
            stack_filename: DEFAULT_STACK_FILENAME.to_string(),
            workers: DEFAULT_WORKERS,
            max_dependency_depth: DEFAULT_MAX_DEPENDENCY_DEPTH,
            suppress_parse_errors: false,
            parse_exclude: false,
            parse_includes: false,
            read_files: false,
            break_cycles: false,
            relationships: false,
            hide_hidden_directories: false,
            filters: Vec::new(),
            graph_target: None,
            git_root: None,
            command: None,
        }
    }
}

/// Builder for a [`DiscoveryConfig`]: one pure setter per knob, applied
/// before [`DiscoveryBuilder::discover`] (spec §4.1).
#[derive(Debug, Clone)]
pub struct DiscoveryBuilder {
    config: DiscoveryConfig,
}

impl DiscoveryBuilder {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            config: DiscoveryConfig::new(working_dir.into()),
        }
    }

    pub fn unit_filename(mut self, name: impl Into<String>) -> Self {
        self.config.unit_filename = name.into();
        self
    }

    pub fn stack_filename(mut self, name: impl Into<String>) -> Self {
        self.config.stack_filename = name.into();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn max_dependency_depth(mut self, depth: usize) -> Self {
        self.config.max_dependency_depth = depth;
        self
    }

    pub fn suppress_parse_errors(mut self, value: bool) -> Self {
        self.config.suppress_parse_errors = value;
        self
    }

    pub fn parse_exclude(mut self, value: bool) -> Self {
        self.config.parse_exclude = value;
        self
    }

    pub fn parse_includes(mut self, value: bool) -> Self {
        self.config.parse_includes = value;
        self
    }

    pub fn read_files(mut self, value: bool) -> Self {
        self.config.read_files = value;
        self
    }

    pub fn break_cycles(mut self, value: bool) -> Self {
        self.config.break_cycles = value;
        self
    }

    pub fn relationships(mut self, value: bool) -> Self {
        self.config.relationships = value;
        self
    }

    pub fn hide_hidden_directories(mut self, value: bool) -> Self {
        self.config.hide_hidden_directories = value;
        self
    }

    pub fn filters(mut self, filters: Vec<String>) -> Self {
        self.config.filters = filters;
        self
    }

    /// Shortcut equivalent to `...<path>` (spec §4.1 "optional graph-target
    /// path").
    pub fn graph_target(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.graph_target = Some(path.into());
        self
    }

    pub fn git_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.git_root = Some(path.into());
        self
    }

    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.config.command = Some(command.into());
        self
    }

    pub fn build(self) -> DiscoveryConfig {
        self.config
    }

    /// Runs the pipeline with the default `hcl-edit`-backed parser and
    /// `git`-CLI-backed worktree collaborator, and a default options bag
    /// derived from the working directory.
    pub fn discover(self) -> Result<Vec<Arc<crate::component::Component>>> {
        let working_dir = self.config.working_dir.clone();
        Discovery::discover(
            self.config,
            Arc::new(HclConfigParser),
            Arc::new(CliGitWorktrees::new()),
            Box::new(DiscoveryOptions::new(working_dir)),
        )
    }
}

/// The discovery coordinator's single public operation (spec §4.1
/// `Discover(ctx, logger, opts) -> Components | error`).
pub struct Discovery;

impl Discovery {
    pub fn discover(
        mut config: DiscoveryConfig,
        parser: Arc<dyn ConfigParser>,
        git: Arc<dyn GitWorktrees>,
        options: Box<dyn OptionsBag>,
    ) -> Result<Vec<Arc<crate::component::Component>>> {
        if let Some(target) = config.graph_target.take() {
            config.filters.push(format!("...{}", target.display()));
        }

        let filters = Filters::parse(&config.filters).map_err(|e| DiscoveryError::UserQuery {
            phase: crate::error::Phase::Filesystem,
            reason: e.to_string(),
        })?;

        let engine = Engine {
            config,
            registry: crate::registry::ComponentRegistry::new(),
            classifier: crate::filters::classifier::Classifier::new(),
            filters,
            parser,
            git,
            options,
        };

        phases::filesystem::run(&engine)?;

        if engine.filters.has_graph_or_git() && !engine.filters.git_exprs.is_empty() {
            phases::worktree::run(&engine)?;
        }

        if engine.filters.requires_parse()
            || engine.config.parse_exclude
            || engine.config.parse_includes
            || engine.config.read_files
        {
            phases::parse::run(&engine)?;
        }

        if !engine.filters.graph_exprs.is_empty() {
            phases::graph::run(&engine)?;
        }

        if engine.config.relationships {
            phases::relationship::run(&engine)?;
        }

        finalize(&engine)
    }
}

fn finalize(engine: &Engine) -> Result<Vec<Arc<crate::component::Component>>> {
    for component in engine.registry.to_components() {
        component.update_external(&engine.config.working_dir);
    }

    if engine.config.break_cycles {
        engine.registry.break_cycles();
    } else if let Some(path) = engine.registry.cycle_check() {
        return Err(DiscoveryError::CycleDetected { path });
    }

    let components: Vec<_> = engine
        .registry
        .to_components()
        .into_iter()
        .filter(|c| engine.classifier.was_discovered(&c.path))
        .collect();

    Ok(components)
}
