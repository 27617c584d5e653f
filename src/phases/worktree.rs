//! Worktree phase (spec §4.4): active iff the filter set includes at least
//! one git-diff expression. Checks out each unique `(fromRef, toRef)` pair
//! and runs a restricted sub-discovery plus a stack-diff comparison across
//! both sides.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rayon::prelude::*;

use crate::component::{Component, ComponentKind, DiscoveryContext, Origin};
use crate::error::{DiscoveryError, Phase, Result};
use crate::filters::{EvalContext, GitDiffExprEntry};
use crate::git::hash_stack_dir;

use super::{Engine, filesystem, relative_display};

pub(crate) fn run(engine: &Engine) -> Result<()> {
    if engine.filters.git_exprs.is_empty() {
        return Ok(());
    }

    let repo_root = engine
        .config
        .git_root
        .clone()
        .unwrap_or_else(|| engine.config.working_dir.clone());

    let mut pairs: Vec<(String, String)> = engine
        .filters
        .git_exprs
        .iter()
        .map(|e| (e.from_ref.clone(), e.to_ref.clone()))
        .collect();
    pairs.sort();
    pairs.dedup();

    let command = engine.config.command.clone();
    if let Some(cmd) = &command
        && cmd != "plan"
        && cmd != "apply"
    {
        return Err(DiscoveryError::GitFilterCommand {
            command: cmd.clone(),
        });
    }

    let errors: Mutex<Vec<DiscoveryError>> = Mutex::new(Vec::new());

    engine.with_worker_pool(|| {
        pairs.par_iter().for_each(|(from_ref, to_ref)| {
            // A ref pair can be named by more than one git-diff expression,
            // each with its own `inner` restriction (spec §4.4 "sub-Discovery
            // ... with the originating filter list restricted to that pair").
            let exprs: Vec<&GitDiffExprEntry> = engine
                .filters
                .git_exprs
                .iter()
                .filter(|e| &e.from_ref == from_ref && &e.to_ref == to_ref)
                .collect();
            if let Err(e) = run_pair(engine, &repo_root, from_ref, to_ref, &exprs) {
                errors.lock().unwrap().push(e);
            }
        });
    });

    engine.git.cleanup().map_err(DiscoveryError::Git)?;

    let collected = errors.into_inner().unwrap();
    match DiscoveryError::join(Phase::Worktree, collected) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn run_pair(
    engine: &Engine,
    repo_root: &Path,
    from_ref: &str,
    to_ref: &str,
    exprs: &[&GitDiffExprEntry],
) -> Result<()> {
    let pair = engine
        .git
        .checkout_pair(repo_root, from_ref, to_ref)
        .map_err(DiscoveryError::Git)?;

    insert_side(engine, &pair.from_path, from_ref, true, exprs);
    insert_side(engine, &pair.to_path, to_ref, false, exprs);

    let from_stacks: Vec<PathBuf> = filesystem::discover_component_paths(&pair.from_path, engine)
        .into_iter()
        .filter(|(_, kind)| *kind == ComponentKind::Stack)
        .map(|(p, _)| p)
        .collect();
    let to_stacks: Vec<PathBuf> = filesystem::discover_component_paths(&pair.to_path, engine)
        .into_iter()
        .filter(|(_, kind)| *kind == ComponentKind::Stack)
        .map(|(p, _)| p)
        .collect();

    let from_relative: HashSet<PathBuf> = from_stacks
        .iter()
        .filter_map(|p| p.strip_prefix(&pair.from_path).ok().map(Path::to_path_buf))
        .collect();
    let to_relative: HashSet<PathBuf> = to_stacks
        .iter()
        .filter_map(|p| p.strip_prefix(&pair.to_path).ok().map(Path::to_path_buf))
        .collect();

    for relative in to_relative.difference(&from_relative) {
        claim_stack(engine, &pair.to_path.join(relative), to_ref);
    }
    for relative in from_relative.difference(&to_relative) {
        claim_stack(engine, &pair.from_path.join(relative), from_ref);
    }
    for relative in from_relative.intersection(&to_relative) {
        let from_dir = pair.from_path.join(relative);
        let to_dir = pair.to_path.join(relative);
        let from_hash = hash_stack_dir(&from_dir, &engine.config.stack_filename).map_err(|e| {
            DiscoveryError::Filesystem {
                phase: Phase::Worktree,
                path: from_dir.clone(),
                source: e,
            }
        })?;
        let to_hash = hash_stack_dir(&to_dir, &engine.config.stack_filename).map_err(|e| {
            DiscoveryError::Filesystem {
                phase: Phase::Worktree,
                path: to_dir.clone(),
                source: e,
            }
        })?;
        if from_hash != to_hash {
            claim_stack(engine, &to_dir, to_ref);
        }
    }

    Ok(())
}

/// `is_from_side` gates the `-destroy` argument extension (spec §4.4: only
/// the *from* side's components, which must be torn down if absent from the
/// newer ref, get `-destroy` appended; the *to* side's args are untouched).
fn insert_side(
    engine: &Engine,
    root: &Path,
    git_ref: &str,
    is_from_side: bool,
    exprs: &[&GitDiffExprEntry],
) {
    for (path, kind) in filesystem::discover_component_paths(root, engine) {
        let canonical = dunce::canonicalize(&path).unwrap_or(path);
        let claimed_by = matching_exprs(engine, &canonical, kind, exprs);
        if claimed_by.is_empty() {
            continue;
        }

        let mut ctx =
            DiscoveryContext::new(engine.config.working_dir.clone(), Origin::WorktreeDiscovery);
        ctx.git_ref = Some(git_ref.to_string());
        if let Some(cmd) = &engine.config.command {
            ctx.command = Some(cmd.clone());
            if is_from_side && (cmd == "plan" || cmd == "apply") {
                ctx.command_args.push("-destroy".to_string());
            }
        }
        let component = Component::new(canonical.clone(), kind, ctx);
        let (component, _) = engine.registry.ensure(component);
        for index in claimed_by {
            engine.classifier.claim_git(index, component.path.clone());
        }
        engine.classifier.mark_discovered(component.path.clone());
    }
}

/// Indices of the ref pair's git-diff expressions whose `inner` atom matches
/// this candidate. An expression with no `inner` restricts to nothing in
/// particular, so it matches every candidate on the pair.
fn matching_exprs(
    engine: &Engine,
    path: &Path,
    kind: ComponentKind,
    exprs: &[&GitDiffExprEntry],
) -> Vec<usize> {
    let relative = relative_display(path, &engine.config.working_dir);
    let ctx = EvalContext {
        path,
        relative_path: relative,
        kind,
        external: !path.starts_with(&engine.config.working_dir),
        files_read: None,
    };
    exprs
        .iter()
        .filter(|e| match &e.inner {
            None => true,
            Some(inner) => engine.filters.inner_matches(inner, &ctx),
        })
        .map(|e| e.index)
        .collect()
}

fn claim_stack(engine: &Engine, dir: &Path, git_ref: &str) {
    let canonical = dunce::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    let ctx = {
        let mut c =
            DiscoveryContext::new(engine.config.working_dir.clone(), Origin::WorktreeDiscovery);
        c.git_ref = Some(git_ref.to_string());
        c
    };
    let component = Component::new(canonical.clone(), ComponentKind::Stack, ctx);
    let (component, _) = engine.registry.ensure(component);
    engine.classifier.mark_discovered(component.path.clone());
}
