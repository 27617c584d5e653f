//! Thread-safe component registry and graph operations (spec §4.8).
//!
//! A `dashmap` sharded map gives us the spec's "reader/writer lock for hot
//! reads with occasional writes" without a single contended global lock —
//! the same tool the pack reaches for whenever it needs a concurrent map
//! (`codegraph-graph`, `codegraph-concurrent`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::component::Component;

/// Canonical-path → component map. The only process-wide shared mutable
/// state in the engine (spec §9 "Shared mutable state").
#[derive(Default)]
pub struct ComponentRegistry {
    components: DashMap<PathBuf, Arc<Component>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic put-if-absent. Returns `(stored, created)`: every caller that
    /// raced to insert the same path converges on the same `Arc` — the
    /// first writer wins (spec §3 "Canonical-path identity").
    pub fn ensure(&self, component: Arc<Component>) -> (Arc<Component>, bool) {
        match self.components.entry(component.path.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                entry.insert(component.clone());
                (component, true)
            }
        }
    }

    /// Lock-free fast path by map read.
    pub fn find(&self, path: &Path) -> Option<Arc<Component>> {
        self.components.get(path).map(|r| r.clone())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.components.contains_key(path)
    }

    /// Idempotent; de-duplicates by identity (spec §4.8 `AddDependency`).
    pub fn add_dependency(&self, parent: &Path, child: &Path, enabled: bool) {
        if let Some(parent) = self.find(parent) {
            parent.add_dependency(child.to_path_buf(), enabled);
        }
    }

    /// Snapshot in sorted-by-path order (spec §4.8 `ToComponents`).
    pub fn to_components(&self) -> Vec<Arc<Component>> {
        let mut components: Vec<_> = self.components.iter().map(|r| r.value().clone()).collect();
        components.sort_by(|a, b| a.path.cmp(&b.path));
        components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn remove(&self, path: &Path) {
        self.components.remove(path);
    }

    fn all_paths(&self) -> Vec<PathBuf> {
        self.components.iter().map(|r| r.key().clone()).collect()
    }

    /// Three-colour DFS. Returns the first component participating in a
    /// cycle, or `None` if the graph is acyclic. Disabled dependencies are
    /// not followed (spec §4.8 `CycleCheck`).
    pub fn cycle_check(&self) -> Option<PathBuf> {
        self.find_cycle().map(|cycle| cycle[0].clone())
    }

    /// Like [`cycle_check`](Self::cycle_check) but returns every component
    /// that participates in the cycle, in DFS-stack order, so callers can
    /// apply a deterministic tie-break among them.
    fn find_cycle(&self) -> Option<Vec<PathBuf>> {
        let mut colors: HashMap<PathBuf, Color> = self
            .all_paths()
            .into_iter()
            .map(|p| (p, Color::White))
            .collect();
        let mut stack: Vec<PathBuf> = Vec::new();

        for start in colors.keys().cloned().collect::<Vec<_>>() {
            if colors.get(&start) == Some(&Color::White)
                && let Some(cycle) = self.visit(&start, &mut colors, &mut stack)
            {
                return Some(cycle);
            }
        }
        None
    }

    fn visit(
        &self,
        path: &Path,
        colors: &mut HashMap<PathBuf, Color>,
        stack: &mut Vec<PathBuf>,
    ) -> Option<Vec<PathBuf>> {
        colors.insert(path.to_path_buf(), Color::Gray);
        stack.push(path.to_path_buf());

        if let Some(component) = self.find(path) {
            for edge in component.dependencies() {
                if !edge.enabled {
                    continue;
                }
                match colors.get(&edge.target).copied() {
                    Some(Color::Gray) => {
                        let start = stack.iter().position(|p| p == &edge.target).unwrap_or(0);
                        return Some(stack[start..].to_vec());
                    }
                    Some(Color::White) | None => {
                        if colors.contains_key(&edge.target)
                            && let Some(cycle) = self.visit(&edge.target, colors, stack)
                        {
                            return Some(cycle);
                        }
                    }
                    Some(Color::Black) => {}
                }
            }
        }

        stack.pop();
        colors.insert(path.to_path_buf(), Color::Black);
        None
    }

    /// Iterates cycle detection, removing the lexicographically smallest
    /// participant of each reported cycle, until none remain (spec §4.8
    /// `BreakCycles`, tie-break fixed in spec §9 Open Questions).
    pub fn break_cycles(&self) {
        while let Some(cycle) = self.find_cycle() {
            let victim = cycle.into_iter().min().expect("cycle is non-empty");
            self.remove(&victim);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentKind, DiscoveryContext, Origin};

    fn make(registry: &ComponentRegistry, path: &str) -> Arc<Component> {
        let ctx = DiscoveryContext::new(PathBuf::from("/repo"), Origin::Filesystem);
        let c = Component::new(PathBuf::from(path), ComponentKind::Unit, ctx);
        registry.ensure(c).0
    }

    #[test]
    fn ensure_converges_on_one_identity() {
        let registry = ComponentRegistry::new();
        let ctx = DiscoveryContext::new(PathBuf::from("/repo"), Origin::Filesystem);
        let a = Component::new(PathBuf::from("/repo/a"), ComponentKind::Unit, ctx.clone());
        let b = Component::new(PathBuf::from("/repo/a"), ComponentKind::Unit, ctx);

        let (first, created1) = registry.ensure(a);
        let (second, created2) = registry.ensure(b);

        assert!(created1);
        assert!(!created2);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn cycle_check_detects_two_node_cycle() {
        let registry = ComponentRegistry::new();
        make(&registry, "/repo/foo");
        make(&registry, "/repo/bar");
        registry.add_dependency(Path::new("/repo/foo"), Path::new("/repo/bar"), true);
        registry.add_dependency(Path::new("/repo/bar"), Path::new("/repo/foo"), true);

        assert!(registry.cycle_check().is_some());
    }

    #[test]
    fn disabled_dependency_defuses_cycle() {
        let registry = ComponentRegistry::new();
        make(&registry, "/repo/foo");
        make(&registry, "/repo/bar");
        registry.add_dependency(Path::new("/repo/foo"), Path::new("/repo/bar"), false);
        registry.add_dependency(Path::new("/repo/bar"), Path::new("/repo/foo"), true);

        assert!(registry.cycle_check().is_none());
    }

    #[test]
    fn break_cycles_removes_lexicographically_smallest() {
        let registry = ComponentRegistry::new();
        make(&registry, "/repo/foo");
        make(&registry, "/repo/bar");
        registry.add_dependency(Path::new("/repo/foo"), Path::new("/repo/bar"), true);
        registry.add_dependency(Path::new("/repo/bar"), Path::new("/repo/foo"), true);

        registry.break_cycles();

        assert!(registry.cycle_check().is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.find(Path::new("/repo/foo")).is_some());
        assert!(registry.find(Path::new("/repo/bar")).is_none());
    }

    #[test]
    fn cycle_check_ignores_non_participating_components() {
        let registry = ComponentRegistry::new();
        make(&registry, "/repo/foo");
        make(&registry, "/repo/bar");
        make(&registry, "/repo/standalone");
        registry.add_dependency(Path::new("/repo/foo"), Path::new("/repo/bar"), true);
        registry.add_dependency(Path::new("/repo/bar"), Path::new("/repo/foo"), true);

        registry.break_cycles();
        assert!(registry.find(Path::new("/repo/standalone")).is_some());
    }

    #[test]
    fn to_components_is_sorted_by_path() {
        let registry = ComponentRegistry::new();
        make(&registry, "/repo/b");
        make(&registry, "/repo/a");
        make(&registry, "/repo/c");

        let paths: Vec<_> = registry
            .to_components()
            .iter()
            .map(|c| c.path.clone())
            .collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/repo/a"),
                PathBuf::from("/repo/b"),
                PathBuf::from("/repo/c"),
            ]
        );
    }
}
