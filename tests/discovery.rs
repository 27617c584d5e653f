//! End-to-end scenarios, one per spec acceptance case: fixtures are written
//! to a fresh [`tempfile::TempDir`] (the same isolation pattern the
//! worktrunk test harness uses for its git fixtures), then run through
//! [`DiscoveryBuilder`] directly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use iacdiscover::{
    Component, ComponentKind, Discovery, DiscoveryBuilder, DiscoveryError, DiscoveryOptions,
    GitWorktrees, HclConfigParser, WorktreePair,
};
use tempfile::TempDir;

fn unit(dir: &Path, name: &str, body: &str) {
    let component_dir = dir.join(name);
    std::fs::create_dir_all(&component_dir).unwrap();
    std::fs::write(component_dir.join("terragrunt.hcl"), body).unwrap();
}

fn dependency_block(label: &str, config_path: &str) -> String {
    format!("dependency \"{label}\" {{\n  config_path = \"{config_path}\"\n}}\n")
}

fn dependency_block_disabled(label: &str, config_path: &str) -> String {
    format!("dependency \"{label}\" {{\n  config_path = \"{config_path}\"\n  enabled = false\n}}\n")
}

fn by_name<'a>(
    components: &'a [std::sync::Arc<Component>],
    name: &str,
) -> Option<&'a std::sync::Arc<Component>> {
    components
        .iter()
        .find(|c| c.path.file_name().map(|n| n == name).unwrap_or(false))
}

#[test]
fn simple_path_filter_matches_exactly_the_named_units() {
    let root = TempDir::new().unwrap();
    unit(root.path(), "apps/app-0000", "");
    unit(root.path(), "apps/app-0001", "");
    unit(root.path(), "apps/app-0002", "");

    let components = DiscoveryBuilder::new(root.path())
        .filters(vec![
            "./apps/app-0000".to_string(),
            "./apps/app-0001".to_string(),
        ])
        .discover()
        .unwrap();

    assert_eq!(components.len(), 2);
    assert!(by_name(&components, "app-0000").is_some());
    assert!(by_name(&components, "app-0001").is_some());
    assert!(by_name(&components, "app-0002").is_none());
}

#[test]
fn forward_dependency_graph_walks_the_whole_chain() {
    let root = TempDir::new().unwrap();
    unit(root.path(), "a", &dependency_block("b", "../b"));
    unit(root.path(), "b", &dependency_block("c", "../c"));
    unit(root.path(), "c", &dependency_block("d", "../d"));
    unit(root.path(), "d", "");

    let components = DiscoveryBuilder::new(root.path())
        .filters(vec!["a...".to_string()])
        .max_dependency_depth(100)
        .discover()
        .unwrap();

    let names: Vec<_> = components
        .iter()
        .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(components.len(), 4, "got {names:?}");
    for expected in ["a", "b", "c", "d"] {
        assert!(
            names.contains(&expected.to_string()),
            "missing {expected} in {names:?}"
        );
    }
}

#[test]
fn reverse_dependency_walk_finds_every_dependent() {
    let root = TempDir::new().unwrap();
    unit(root.path(), "app", &dependency_block("db", "../db"));
    unit(root.path(), "db", &dependency_block("vpc", "../vpc"));
    unit(root.path(), "vpc", "");

    let components = DiscoveryBuilder::new(root.path())
        .filters(vec!["...vpc".to_string()])
        .discover()
        .unwrap();
    let names: Vec<_> = components
        .iter()
        .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(components.len(), 3, "got {names:?}");
    for expected in ["app", "db", "vpc"] {
        assert!(names.contains(&expected.to_string()));
    }

    let excluding_target = DiscoveryBuilder::new(root.path())
        .filters(vec!["...^vpc".to_string()])
        .discover()
        .unwrap();
    let names: Vec<_> = excluding_target
        .iter()
        .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(excluding_target.len(), 2, "got {names:?}");
    assert!(names.contains(&"app".to_string()));
    assert!(names.contains(&"db".to_string()));
    assert!(!names.contains(&"vpc".to_string()));
}

#[test]
fn cycle_is_reported_unless_break_cycles_is_set() {
    let root = TempDir::new().unwrap();
    unit(root.path(), "foo", &dependency_block("bar", "../bar"));
    unit(root.path(), "bar", &dependency_block("foo", "../foo"));

    let err = DiscoveryBuilder::new(root.path())
        .filters(vec!["{./**}...".to_string()])
        .discover()
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::CycleDetected { .. }));

    let components = DiscoveryBuilder::new(root.path())
        .filters(vec!["{./**}...".to_string()])
        .break_cycles(true)
        .discover()
        .unwrap();
    let names: Vec<_> = components
        .iter()
        .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names.len(),
        1,
        "break-cycles should leave exactly one survivor, got {names:?}"
    );
}

#[test]
fn disabled_dependency_defuses_the_cycle() {
    let root = TempDir::new().unwrap();
    unit(
        root.path(),
        "foo",
        &dependency_block_disabled("bar", "../bar"),
    );
    unit(root.path(), "bar", &dependency_block("foo", "../foo"));

    let components = DiscoveryBuilder::new(root.path())
        .filters(vec!["{./**}...".to_string()])
        .discover()
        .unwrap();

    let names: Vec<_> = components
        .iter()
        .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 2, "got {names:?}");
}

#[test]
fn external_flag_is_set_only_for_components_outside_the_working_directory() {
    let root = TempDir::new().unwrap();
    let internal = root.path().join("internal");
    std::fs::create_dir_all(&internal).unwrap();
    let external_root = root.path().join("external");
    std::fs::create_dir_all(&external_root).unwrap();

    unit(
        &internal,
        "app",
        &dependency_block("x", "../../external/app"),
    );
    unit(&external_root, "app", "");
    unit(&internal, "db", "");
    unit(&internal, "vpc", "");

    let components = DiscoveryBuilder::new(&internal)
        .filters(vec!["{./**}...".to_string()])
        .discover()
        .unwrap();

    let external_app = components
        .iter()
        .find(|c| c.path.starts_with(&external_root))
        .expect("external/app should be discovered via the dependency edge");
    assert!(external_app.is_external());

    for name in ["app", "db", "vpc"] {
        let c = components
            .iter()
            .find(|c| {
                c.path.starts_with(&internal)
                    && c.path.file_name().map(|n| n == name).unwrap_or(false)
            })
            .unwrap_or_else(|| panic!("{name} should be in result"));
        assert!(!c.is_external(), "{name} should not be marked external");
    }
}

#[test]
fn result_contains_no_duplicate_paths() {
    let root = TempDir::new().unwrap();
    unit(root.path(), "a", &dependency_block("b", "../b"));
    unit(root.path(), "b", "");

    let components = DiscoveryBuilder::new(root.path())
        .filters(vec!["{./**}...".to_string()])
        .discover()
        .unwrap();

    let mut paths: Vec<PathBuf> = components.iter().map(|c| c.path.clone()).collect();
    let before = paths.len();
    paths.sort();
    paths.dedup();
    assert_eq!(before, paths.len());
}

#[test]
fn stack_kind_is_detected_from_the_stack_filename() {
    let root = TempDir::new().unwrap();
    let stack_dir = root.path().join("stacks/prod");
    std::fs::create_dir_all(&stack_dir).unwrap();
    std::fs::write(stack_dir.join("terragrunt.stack.hcl"), "").unwrap();

    let components = DiscoveryBuilder::new(root.path()).discover().unwrap();

    assert_eq!(components.len(), 1);
    assert_eq!(components[0].kind, ComponentKind::Stack);
}

/// Hands back two pre-built directories as the "from"/"to" sides of every
/// pair, standing in for a real `git worktree add` checkout.
struct FakeGitWorktrees {
    from_path: PathBuf,
    to_path: PathBuf,
}

impl GitWorktrees for FakeGitWorktrees {
    fn checkout_pair(
        &self,
        _repo_root: &Path,
        from_ref: &str,
        to_ref: &str,
    ) -> anyhow::Result<WorktreePair> {
        Ok(WorktreePair {
            from_ref: from_ref.to_string(),
            to_ref: to_ref.to_string(),
            from_path: self.from_path.clone(),
            to_path: self.to_path.clone(),
        })
    }

    fn cleanup(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[test]
fn git_diff_filter_restricts_worktree_discovery_to_its_inner_atom() {
    let root = TempDir::new().unwrap();
    let from_dir = root.path().join("from");
    let to_dir = root.path().join("to");
    unit(&from_dir, "app", "");
    unit(&from_dir, "other", "");
    unit(&to_dir, "app", "");
    unit(&to_dir, "other", "");

    let config = DiscoveryBuilder::new(root.path())
        .filters(vec!["[main...feature]app".to_string()])
        .build();
    let options = DiscoveryOptions::new(root.path());
    let git = FakeGitWorktrees {
        from_path: from_dir,
        to_path: to_dir,
    };

    let components = Discovery::discover(
        config,
        Arc::new(HclConfigParser),
        Arc::new(git),
        Box::new(options),
    )
    .unwrap();

    let names: Vec<_> = components
        .iter()
        .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 2, "got {names:?}");
    assert!(names.iter().all(|n| n == "app"), "got {names:?}");
}
