//! The filter classifier (spec §4.2): the single decision procedure phases
//! use to route a component into *Discovered*, *Candidate*, or *Excluded*.

use dashmap::DashMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{Atom, AttrFilter, EvalContext, Filters};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationStatus {
    Discovered,
    Candidate,
    Excluded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationReason {
    None,
    GraphTarget,
    RequiresParse,
}

/// Whether parse-derived data (`files_read`, dependency blocks) is available
/// for the component being classified yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseAvailability {
    Available,
    Unavailable,
}

/// Holds the per-graph-expression and per-git-diff-expression "claimed sets"
/// populated by the graph and worktree phases as they traverse, plus the
/// classifier's decision procedure over a [`Filters`] set.
///
/// Claimed sets live here rather than inside [`Filters`] because they are
/// mutated concurrently during the graph/worktree phases while `Filters`
/// itself stays an immutable, shared parse result.
#[derive(Debug, Default)]
pub struct Classifier {
    graph_claims: DashMap<usize, HashSet<PathBuf>>,
    git_claims: DashMap<usize, HashSet<PathBuf>>,
    /// Paths that have been Discovered by an earlier phase and must never be
    /// demoted (spec §4.2 "once Discovered ... may only confirm").
    discovered: DashMap<PathBuf, ()>,
    /// Paths classified *requires-parse* by an earlier phase, so the parse
    /// phase knows which candidates to pick up without re-running the whole
    /// decision procedure (spec §4.5 "for each candidate with reason
    /// requires-parse").
    requires_parse: DashMap<PathBuf, ()>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `path` was claimed by graph expression `index` (its
    /// inner target, or something reached while traversing from it).
    pub fn claim_graph(&self, index: usize, path: PathBuf) {
        self.graph_claims.entry(index).or_default().insert(path);
    }

    pub fn is_claimed_by_graph(&self, index: usize, path: &Path) -> bool {
        self.graph_claims
            .get(&index)
            .map(|set| set.contains(path))
            .unwrap_or(false)
    }

    /// Snapshot of every path claimed so far by graph expression `index`,
    /// used as the graph phase's traversal seed set.
    pub fn claimed_graph_paths(&self, index: usize) -> Vec<PathBuf> {
        self.graph_claims
            .get(&index)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn mark_requires_parse(&self, path: PathBuf) {
        self.requires_parse.insert(path, ());
    }

    pub fn needs_parse(&self, path: &Path) -> bool {
        self.requires_parse.contains_key(path)
    }

    pub fn claim_git(&self, index: usize, path: PathBuf) {
        self.git_claims.entry(index).or_default().insert(path);
    }

    pub fn is_claimed_by_git(&self, index: usize, path: &Path) -> bool {
        self.git_claims
            .get(&index)
            .map(|set| set.contains(path))
            .unwrap_or(false)
    }

    pub fn mark_discovered(&self, path: PathBuf) {
        self.discovered.insert(path, ());
    }

    pub fn was_discovered(&self, path: &Path) -> bool {
        self.discovered.contains_key(path)
    }

    /// `Classify(component, ctx) -> (status, reason, graphExpressionIndex)`
    /// (spec §4.2).
    pub fn classify(
        &self,
        filters: &Filters,
        ctx: &EvalContext,
        parse_availability: ParseAvailability,
    ) -> (ClassificationStatus, ClassificationReason, Option<usize>) {
        if self.was_discovered(ctx.path) {
            return (
                ClassificationStatus::Discovered,
                ClassificationReason::None,
                None,
            );
        }

        // 1. Graph candidacy outranks everything.
        for expr in &filters.graph_exprs {
            if filters.inner_matches(&expr.inner, ctx)
                || self.is_claimed_by_graph(expr.index, ctx.path)
            {
                return (
                    ClassificationStatus::Candidate,
                    ClassificationReason::GraphTarget,
                    Some(expr.index),
                );
            }
        }
        for expr in &filters.git_exprs {
            if self.is_claimed_by_git(expr.index, ctx.path) {
                return (
                    ClassificationStatus::Candidate,
                    ClassificationReason::GraphTarget,
                    None,
                );
            }
        }

        // 2. Requires-parse candidacy, when a positive `reading=` filter
        // exists and parse data isn't in yet.
        if filters.requires_parse() && parse_availability == ParseAvailability::Unavailable {
            self.mark_requires_parse(ctx.path.to_path_buf());
            return (
                ClassificationStatus::Candidate,
                ClassificationReason::RequiresParse,
                None,
            );
        }

        // 3. Full filter-set evaluation: OR across queries, AND within a
        // query, negation flips.
        let has_positive = filters.has_positive_filter();
        if filters.is_empty() {
            return (
                ClassificationStatus::Discovered,
                ClassificationReason::None,
                None,
            );
        }

        let matched = filters.queries.iter().any(|q| {
            q.terms.iter().all(|t| {
                let direct = match &t.atom {
                    Atom::Graph(index) => filters
                        .graph_exprs
                        .iter()
                        .find(|g| g.index == *index)
                        .map(|g| {
                            filters.inner_matches(&g.inner, ctx)
                                || self.is_claimed_by_graph(*index, ctx.path)
                        })
                        .unwrap_or(false),
                    Atom::GitDiff(index) => self.is_claimed_by_git(*index, ctx.path),
                    Atom::Attr(AttrFilter::Reading(_)) if ctx.files_read.is_none() => false,
                    other => filters.inner_matches(other, ctx),
                };
                t.negated != direct
            })
        });

        if matched {
            (
                ClassificationStatus::Discovered,
                ClassificationReason::None,
                None,
            )
        } else if has_positive {
            (
                ClassificationStatus::Excluded,
                ClassificationReason::None,
                None,
            )
        } else {
            (
                ClassificationStatus::Discovered,
                ClassificationReason::None,
                None,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentKind;
    use std::path::PathBuf;

    fn ctx<'a>(path: &'a Path, relative: &str) -> EvalContext<'a> {
        EvalContext {
            path,
            relative_path: relative.to_string(),
            kind: ComponentKind::Unit,
            external: false,
            files_read: None,
        }
    }

    #[test]
    fn no_filters_means_everything_discovered() {
        let filters = Filters::default();
        let classifier = Classifier::new();
        let path = PathBuf::from("/repo/app");
        let (status, reason, idx) =
            classifier.classify(&filters, &ctx(&path, "./app"), ParseAvailability::Available);
        assert_eq!(status, ClassificationStatus::Discovered);
        assert_eq!(reason, ClassificationReason::None);
        assert!(idx.is_none());
    }

    #[test]
    fn positive_filter_excludes_non_matching() {
        let filters = Filters::parse(&["./vpc"]).unwrap();
        let classifier = Classifier::new();
        let path = PathBuf::from("/repo/app");
        let (status, ..) =
            classifier.classify(&filters, &ctx(&path, "./app"), ParseAvailability::Available);
        assert_eq!(status, ClassificationStatus::Excluded);
    }

    #[test]
    fn graph_target_candidacy_outranks_exclusion() {
        let filters = Filters::parse(&["./vpc..."]).unwrap();
        let classifier = Classifier::new();
        let path = PathBuf::from("/repo/vpc");
        let (status, reason, idx) =
            classifier.classify(&filters, &ctx(&path, "./vpc"), ParseAvailability::Available);
        assert_eq!(status, ClassificationStatus::Candidate);
        assert_eq!(reason, ClassificationReason::GraphTarget);
        assert_eq!(idx, Some(0));
    }

    #[test]
    fn requires_parse_candidacy_when_parse_unavailable() {
        let filters = Filters::parse(&["reading=**/secrets.tf"]).unwrap();
        let classifier = Classifier::new();
        let path = PathBuf::from("/repo/app");
        let (status, reason, _) = classifier.classify(
            &filters,
            &ctx(&path, "./app"),
            ParseAvailability::Unavailable,
        );
        assert_eq!(status, ClassificationStatus::Candidate);
        assert_eq!(reason, ClassificationReason::RequiresParse);
    }

    #[test]
    fn once_discovered_never_demoted() {
        let filters = Filters::parse(&["./vpc"]).unwrap();
        let classifier = Classifier::new();
        let path = PathBuf::from("/repo/app");
        classifier.mark_discovered(path.clone());
        let (status, ..) =
            classifier.classify(&filters, &ctx(&path, "./app"), ParseAvailability::Available);
        assert_eq!(status, ClassificationStatus::Discovered);
    }

    #[test]
    fn claimed_graph_path_is_candidate_even_without_direct_match() {
        let filters = Filters::parse(&["./vpc..."]).unwrap();
        let classifier = Classifier::new();
        let downstream = PathBuf::from("/repo/app");
        classifier.claim_graph(0, downstream.clone());
        let (status, reason, idx) = classifier.classify(
            &filters,
            &ctx(&downstream, "./app"),
            ParseAvailability::Available,
        );
        assert_eq!(status, ClassificationStatus::Candidate);
        assert_eq!(reason, ClassificationReason::GraphTarget);
        assert_eq!(idx, Some(0));
    }
}
