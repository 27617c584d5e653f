//! The filter query grammar and evaluation (spec §3 "Filters", §6 grammar).
//!
//! A [`Filters`] is the parsed, unioned set of user queries. Each query is an
//! intersection (`|`) of [`Term`]s; each term is an optionally-negated
//! [`Atom`]. Graph and git-diff atoms don't carry their own matching logic —
//! they reference an index into [`Filters::graph_exprs`] /
//! [`Filters::git_exprs`], whose claimed-sets are populated by the graph and
//! worktree phases as they run.

pub mod classifier;
pub mod glob;
mod parser;

use std::path::{Path, PathBuf};

use crate::component::ComponentKind;
use glob::GlobPattern;

pub use parser::ParseFilterError;

#[derive(Debug, Clone, PartialEq)]
pub enum AttrFilter {
    Name(String),
    Type(ComponentKind),
    External(bool),
    Reading(GlobPattern),
}

/// One `...inner...`-shaped expression, assigned a process-wide index at
/// parse time (spec §4.2 "the indices are needed so the graph phase can
/// attribute each discovered component to the expression that claimed it").
#[derive(Debug, Clone)]
pub struct GraphExprEntry {
    pub index: usize,
    pub forward: bool,
    pub reverse: bool,
    /// `^` prefix: exclude the inner target itself from the final set.
    pub invert: bool,
    pub inner: Box<Atom>,
}

#[derive(Debug, Clone)]
pub struct GitDiffExprEntry {
    pub index: usize,
    pub from_ref: String,
    pub to_ref: String,
    pub inner: Option<Box<Atom>>,
}

#[derive(Debug, Clone)]
pub enum Atom {
    Glob(GlobPattern),
    Attr(AttrFilter),
    Graph(usize),
    GitDiff(usize),
}

#[derive(Debug, Clone)]
pub struct Term {
    pub negated: bool,
    pub atom: Atom,
}

/// `Term ('|' Term)*` — AND of terms within one user-supplied query.
#[derive(Debug, Clone)]
pub struct Query {
    pub terms: Vec<Term>,
}

/// The full, unioned (`OR` across queries) filter set.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub queries: Vec<Query>,
    pub graph_exprs: Vec<GraphExprEntry>,
    pub git_exprs: Vec<GitDiffExprEntry>,
}

/// What a component needs evaluated against it, independent of the registry
/// or graph-phase state (those are threaded through [`classifier::Classifier`]
/// separately).
pub struct EvalContext<'a> {
    pub path: &'a Path,
    pub relative_path: String,
    pub kind: ComponentKind,
    pub external: bool,
    pub files_read: Option<&'a [PathBuf]>,
}

impl Filters {
    pub fn parse(queries: &[impl AsRef<str>]) -> Result<Self, ParseFilterError> {
        parser::parse_filters(queries)
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Any non-negated filter exists anywhere — the classifier's
    /// default-disposition switch (spec §4.2). Graph and git-diff atoms
    /// count too: specifying `...vpc` is itself a positive constraint, even
    /// though matching it is resolved through the claimed-set rather than a
    /// direct glob/attribute comparison.
    pub fn has_positive_filter(&self) -> bool {
        self.queries
            .iter()
            .any(|q| q.terms.iter().any(|t| !t.negated))
    }

    /// Whether any positive `reading=` attribute exists, meaning some
    /// components can only be classified once parse data is available
    /// (spec §4.2 "requires parse-time data").
    pub fn requires_parse(&self) -> bool {
        self.queries.iter().any(|q| {
            q.terms
                .iter()
                .any(|t| !t.negated && matches!(t.atom, Atom::Attr(AttrFilter::Reading(_))))
        })
    }

    /// Whether the filter set contains any graph or git-diff expression.
    pub fn has_graph_or_git(&self) -> bool {
        !self.graph_exprs.is_empty() || !self.git_exprs.is_empty()
    }

    fn atom_matches_directly(&self, atom: &Atom, ctx: &EvalContext) -> bool {
        match atom {
            Atom::Glob(pattern) => {
                pattern.matches(&ctx.relative_path) || pattern.matches(&ctx.path.to_string_lossy())
            }
            Atom::Attr(AttrFilter::Name(name)) => ctx
                .path
                .file_name()
                .map(|n| n.to_string_lossy() == *name)
                .unwrap_or(false),
            Atom::Attr(AttrFilter::Type(kind)) => ctx.kind == *kind,
            Atom::Attr(AttrFilter::External(expected)) => ctx.external == *expected,
            Atom::Attr(AttrFilter::Reading(pattern)) => ctx
                .files_read
                .map(|files| {
                    files.iter().any(|f| {
                        pattern.matches(&f.to_string_lossy())
                            || pattern.matches(
                                &dunce::canonicalize(f)
                                    .unwrap_or_else(|_| f.clone())
                                    .to_string_lossy(),
                            )
                    })
                })
                .unwrap_or(false),
            // Graph/GitDiff atoms are never matched "directly" — only via the
            // claimed-sets the graph/worktree phases populate. Callers use
            // `Classifier` for those.
            Atom::Graph(_) | Atom::GitDiff(_) => false,
        }
    }

    /// Direct (non-graph, non-git) match used to seed graph/git expression
    /// targets: does `ctx` match this expression's `Inner` atom?
    pub fn inner_matches(&self, inner: &Atom, ctx: &EvalContext) -> bool {
        self.atom_matches_directly(inner, ctx)
    }
}
