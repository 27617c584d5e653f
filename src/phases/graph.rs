//! Graph phase (spec §4.6): expands each graph expression's claimed set by
//! traversing the dependency graph forward, the inverse graph backward, or
//! both, honoring the max-dependency-depth bound and the `^` inversion.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashSet;
use rayon::prelude::*;

use crate::component::{Component, ComponentKind, DiscoveryContext, Origin};
use crate::error::{DiscoveryError, Phase, Result};
use crate::filters::GraphExprEntry;
use crate::parser::{ParseContext, ParsedConfig};

use super::{Engine, detect_kind, resolve_dependency_path};

pub(crate) fn run(engine: &Engine) -> Result<()> {
    if engine.filters.graph_exprs.is_empty() {
        return Ok(());
    }

    let errors: Mutex<Vec<DiscoveryError>> = Mutex::new(Vec::new());

    engine.with_worker_pool(|| {
        engine.filters.graph_exprs.par_iter().for_each(|expr| {
            if expr.forward {
                expand_forward(engine, expr, &errors);
            }
            if expr.reverse {
                expand_reverse(engine, expr, &errors);
            }
        });
    });

    let collected = errors.into_inner().unwrap();
    match DiscoveryError::join(Phase::Graph, collected) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Parses `component` if it hasn't been already, recording any error. Used
/// both here and by relationship phase's on-demand parsing.
fn parsed_config(
    engine: &Engine,
    component: &Arc<Component>,
    errors: &Mutex<Vec<DiscoveryError>>,
) -> Option<ParsedConfig> {
    if let Some(config) = component.parsed_config() {
        return Some(config);
    }
    let config_path = engine.config_file_path(&component.path, component.kind);
    let parse_ctx = ParseContext {
        suppress_errors: engine.config.suppress_parse_errors,
    };
    match engine.parser.parse(&config_path, &parse_ctx) {
        Ok((parsed, files_read)) => {
            component.set_parsed_config(parsed.clone(), files_read);
            Some(parsed)
        }
        Err(e) => {
            if engine.config.suppress_parse_errors {
                log::debug!(
                    "suppressing parse error in {}: {}",
                    config_path.display(),
                    e.message
                );
                None
            } else {
                errors.lock().unwrap().push(DiscoveryError::Parse {
                    path: component.path.clone(),
                    source: anyhow::anyhow!(e.message),
                });
                None
            }
        }
    }
}

fn ensure_component(
    engine: &Engine,
    path: &Path,
    kind: ComponentKind,
    parent_context: &DiscoveryContext,
) -> Arc<Component> {
    let ctx = parent_context.propagate(Origin::GraphDiscovery);
    let component = Component::new(path.to_path_buf(), kind, ctx);
    let (component, _created) = engine.registry.ensure(component);
    component.update_external(&engine.config.working_dir);
    component
}

/// Forward form `<inner>...`: traverse outgoing dependency edges, creating
/// dependencies on demand (spec §4.6).
fn expand_forward(engine: &Engine, expr: &GraphExprEntry, errors: &Mutex<Vec<DiscoveryError>>) {
    let visited: DashSet<PathBuf> = DashSet::new();
    let mut stack: Vec<(PathBuf, usize)> = engine
        .classifier
        .claimed_graph_paths(expr.index)
        .into_iter()
        .map(|p| (p, 0))
        .collect();

    while let Some((path, depth)) = stack.pop() {
        if !visited.insert(path.clone()) {
            continue;
        }

        if !(depth == 0 && expr.invert) {
            engine.classifier.claim_graph(expr.index, path.clone());
            engine.classifier.mark_discovered(path.clone());
        }

        if depth >= engine.config.max_dependency_depth {
            errors
                .lock()
                .unwrap()
                .push(DiscoveryError::MaxDepthReached {
                    phase: Phase::Graph,
                    path: path.clone(),
                });
            continue;
        }

        let Some(component) = engine.registry.find(&path) else {
            continue;
        };
        let Some(config) = parsed_config(engine, &component, errors) else {
            continue;
        };

        for dep_path in config.enabled_dependency_paths() {
            let resolved = resolve_dependency_path(&component.path, dep_path);
            let kind = detect_kind(&resolved, engine);
            let child = ensure_component(engine, &resolved, kind, &component.context);
            engine
                .registry
                .add_dependency(&component.path, &child.path, true);
            stack.push((child.path.clone(), depth + 1));
        }
    }
}

/// Reverse form `...<inner>`: since the inverse graph isn't materialised,
/// walks the configured git-root boundary (or the filesystem root) once,
/// parsing every candidate to build a reverse-adjacency map (dependency
/// path -> dependents), then BFS's that map outward from each claimed
/// target (spec §4.6). The map is built once — reparsing is unnecessary
/// since every candidate is visited exactly once — but the BFS itself must
/// re-consult the full map at every hop: a candidate can be a dependent of
/// more than one target along the chain (e.g. `app` depends on `db` which
/// depends on `vpc`), so it cannot be struck off after its first match.
fn expand_reverse(engine: &Engine, expr: &GraphExprEntry, errors: &Mutex<Vec<DiscoveryError>>) {
    let boundary = search_boundary(engine);
    let mut dependents: std::collections::HashMap<PathBuf, Vec<PathBuf>> =
        std::collections::HashMap::new();

    for (candidate_path, kind) in super::filesystem::discover_component_paths(&boundary, engine) {
        let parent_ctx =
            DiscoveryContext::new(engine.config.working_dir.clone(), Origin::Filesystem);
        let component = ensure_component(engine, &candidate_path, kind, &parent_ctx);
        let Some(config) = parsed_config(engine, &component, errors) else {
            continue;
        };

        for dep in config.dependencies.iter().filter(|d| d.enabled) {
            let resolved = resolve_dependency_path(&component.path, &dep.config_path);
            dependents
                .entry(resolved)
                .or_default()
                .push(component.path.clone());
        }
        for dep_path in &config.dependency_paths {
            let resolved = resolve_dependency_path(&component.path, dep_path);
            dependents
                .entry(resolved)
                .or_default()
                .push(component.path.clone());
        }
    }

    let visited: DashSet<PathBuf> = DashSet::new();
    let mut queue: VecDeque<(PathBuf, usize)> = engine
        .classifier
        .claimed_graph_paths(expr.index)
        .into_iter()
        .map(|p| (p, 0))
        .collect();

    while let Some((target, depth)) = queue.pop_front() {
        if !visited.insert(target.clone()) {
            continue;
        }

        if !(depth == 0 && expr.invert) {
            engine.classifier.claim_graph(expr.index, target.clone());
            engine.classifier.mark_discovered(target.clone());
        }

        if depth >= engine.config.max_dependency_depth {
            errors
                .lock()
                .unwrap()
                .push(DiscoveryError::MaxDepthReached {
                    phase: Phase::Graph,
                    path: target.clone(),
                });
            continue;
        }

        let Some(dependent_paths) = dependents.get(&target) else {
            continue;
        };
        for dependent in dependent_paths {
            engine.registry.add_dependency(dependent, &target, true);
            queue.push_back((dependent.clone(), depth + 1));
        }
    }
}

fn search_boundary(engine: &Engine) -> PathBuf {
    if let Some(git_root) = &engine.config.git_root {
        return git_root.clone();
    }
    let mut root = engine.config.working_dir.clone();
    while let Some(parent) = root.parent() {
        root = parent.to_path_buf();
    }
    root
}
