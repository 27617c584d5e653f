//! Filesystem phase (spec §4.3): walks the working directory, creates a
//! component for every recognized config filename found, and routes each
//! through the classifier.

use std::path::PathBuf;
use std::sync::Mutex;

use ignore::{WalkBuilder, WalkState};

use crate::component::{Component, ComponentKind, DiscoveryContext, Origin};
use crate::error::{DiscoveryError, Phase, Result};
use crate::filters::EvalContext;
use crate::filters::classifier::{ClassificationReason, ClassificationStatus, ParseAvailability};
use crate::options::EXPERIMENT_SYMLINKS;

use super::{Engine, relative_display};

/// Directories pruned unconditionally: version-control and build-tool
/// caches (spec §4.3 "this list includes version-control and build-tool
/// caches").
const IGNORED_DIR_NAMES: &[&str] = &[".git", ".terraform", ".terragrunt-cache"];

/// The recognized "stack build output" directory, pruned only when hidden
/// directories are *shown* (spec §4.3 "only when hidden-directory
/// visibility is disabled").
const STACK_BUILD_OUTPUT_DIR: &str = ".terragrunt-stack";

pub(crate) fn run(engine: &Engine) -> Result<()> {
    let errors: Mutex<Vec<DiscoveryError>> = Mutex::new(Vec::new());

    engine.with_worker_pool(|| {
        let walker = WalkBuilder::new(&engine.config.working_dir)
            .hidden(false)
            .git_ignore(false)
            .git_exclude(false)
            .ignore(false)
            .follow_links(engine.options.experiment(EXPERIMENT_SYMLINKS))
            .threads(engine.worker_count())
            .build_parallel();

        walker.run(|| {
            Box::new(|result| {
                match result {
                    Ok(entry) => {
                        if entry.depth() == 0 {
                            return WalkState::Continue;
                        }
                        let Some(file_type) = entry.file_type() else {
                            return WalkState::Continue;
                        };
                        if file_type.is_dir() {
                            let name = entry.file_name().to_string_lossy().into_owned();
                            if IGNORED_DIR_NAMES.contains(&name.as_str()) {
                                return WalkState::Skip;
                            }
                            if engine.config.hide_hidden_directories
                                && name.starts_with('.')
                                && name != STACK_BUILD_OUTPUT_DIR
                            {
                                return WalkState::Skip;
                            }
                            return WalkState::Continue;
                        }

                        let name = entry.file_name().to_string_lossy();
                        let kind = if name.as_ref() == engine.config.stack_filename.as_str() {
                            ComponentKind::Stack
                        } else if name.as_ref() == engine.config.unit_filename.as_str() {
                            ComponentKind::Unit
                        } else {
                            return WalkState::Continue;
                        };

                        let Some(dir) = entry.path().parent() else {
                            return WalkState::Continue;
                        };
                        process_candidate(engine, dir.to_path_buf(), kind);
                    }
                    Err(err) => {
                        errors.lock().unwrap().push(DiscoveryError::Filesystem {
                            phase: Phase::Filesystem,
                            path: engine.config.working_dir.clone(),
                            source: std::io::Error::other(err.to_string()),
                        });
                    }
                }
                WalkState::Continue
            })
        });
    });

    let collected = errors.into_inner().unwrap();
    match DiscoveryError::join(Phase::Filesystem, collected) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Raw, unclassified walk used by the graph phase's reverse traversal to
/// enumerate candidate components under an ancestor directory (spec §4.6
/// "parsing candidate configurations").
pub(crate) fn discover_component_paths(
    root: &std::path::Path,
    engine: &Engine,
) -> Vec<(PathBuf, ComponentKind)> {
    let mut found = Vec::new();
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(false)
        .git_exclude(false)
        .ignore(false)
        .follow_links(engine.options.experiment(EXPERIMENT_SYMLINKS))
        .build();

    for entry in walker.flatten() {
        if entry.depth() == 0 {
            continue;
        }
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            let name = entry.file_name().to_string_lossy();
            if IGNORED_DIR_NAMES.contains(&name.as_ref()) {
                continue;
            }
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        let kind = if name.as_ref() == engine.config.stack_filename.as_str() {
            ComponentKind::Stack
        } else if name.as_ref() == engine.config.unit_filename.as_str() {
            ComponentKind::Unit
        } else {
            continue;
        };
        if let Some(dir) = entry.path().parent() {
            found.push((dir.to_path_buf(), kind));
        }
    }
    found
}

fn process_candidate(engine: &Engine, dir: PathBuf, kind: ComponentKind) {
    let canonical = dunce::canonicalize(&dir).unwrap_or(dir);
    let external = !canonical.starts_with(&engine.config.working_dir);
    let relative = relative_display(&canonical, &engine.config.working_dir);

    let ctx = EvalContext {
        path: &canonical,
        relative_path: relative,
        kind,
        external,
        files_read: None,
    };

    let (status, reason, graph_index) =
        engine
            .classifier
            .classify(&engine.filters, &ctx, ParseAvailability::Unavailable);

    if status == ClassificationStatus::Excluded {
        return;
    }

    let discovery_ctx =
        DiscoveryContext::new(engine.config.working_dir.clone(), Origin::Filesystem);
    let component = Component::new(canonical.clone(), kind, discovery_ctx);
    if external {
        component.mark_external();
    }
    let (component, _created) = engine.registry.ensure(component);

    if status == ClassificationStatus::Discovered {
        engine.classifier.mark_discovered(component.path.clone());
    }
    if reason == ClassificationReason::GraphTarget
        && let Some(idx) = graph_index
    {
        engine.classifier.claim_graph(idx, component.path.clone());
    }
}
