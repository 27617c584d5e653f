//! Hand-rolled recursive-descent parser for the filter query grammar (spec
//! §6):
//!
//! ```text
//! Query        := Term ('|' Term)*         (* intersection *)
//! Term         := '!'? Atom                 (* negation *)
//! Atom         := GraphExpr | GitDiffExpr | Attr | Glob | '{' Any '}'
//! GraphExpr    := '^'? '...'? Inner '...'?  (* at least one of the two ellipses present *)
//! Inner        := Glob | Attr | '{' Any '}'
//! GitDiffExpr  := '[' Ref '...' Ref ']' Inner?
//! Attr         := ('name' | 'type' | 'external' | 'reading') '=' Value
//! Glob         := a path with ? * [] supported
//! ```

use crate::component::ComponentKind;

use super::glob::GlobPattern;
use super::{Atom, AttrFilter, Filters, GitDiffExprEntry, GraphExprEntry, Query, Term};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFilterError(pub String);

impl std::fmt::Display for ParseFilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid filter: {}", self.0)
    }
}

impl std::error::Error for ParseFilterError {}

const ELLIPSIS: &str = "...";
const ATTR_KEYS: &[&str] = &["name", "type", "external", "reading"];

pub fn parse_filters(queries: &[impl AsRef<str>]) -> Result<Filters, ParseFilterError> {
    let mut filters = Filters::default();

    for raw in queries {
        let raw = raw.as_ref().trim();
        if raw.is_empty() {
            return Err(ParseFilterError("empty query".to_string()));
        }

        let mut terms = Vec::new();
        for term_src in split_top_level(raw, '|') {
            if term_src.is_empty() {
                return Err(ParseFilterError(format!("empty term in query `{raw}`")));
            }
            let (negated, rest) = strip_negation(term_src);
            if rest.is_empty() {
                return Err(ParseFilterError(format!("`{term_src}` negates nothing")));
            }
            let atom = parse_atom(rest, &mut filters)?;
            terms.push(Term { negated, atom });
        }
        filters.queries.push(Query { terms });
    }

    Ok(filters)
}

/// Splits on `sep` only outside of `{...}` and `[...]` groups, so
/// `[main...feature]{a|b}` isn't split on the `|` inside the brace.
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut brace_depth = 0i32;
    let mut bracket_depth = 0i32;
    let mut start = 0usize;

    for (i, c) in s.char_indices() {
        match c {
            '{' => brace_depth += 1,
            '}' => brace_depth -= 1,
            '[' => bracket_depth += 1,
            ']' => bracket_depth -= 1,
            c if c == sep && brace_depth <= 0 && bracket_depth <= 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Strips leading `!` characters, collapsing repeats by parity: `!!F` is
/// equivalent to `F` (spec §8 "Negation is idempotent").
fn strip_negation(s: &str) -> (bool, &str) {
    let mut negated = false;
    let mut rest = s;
    while let Some(stripped) = rest.strip_prefix('!') {
        negated = !negated;
        rest = stripped;
    }
    (negated, rest)
}

fn parse_atom(s: &str, filters: &mut Filters) -> Result<Atom, ParseFilterError> {
    if s.starts_with('[')
        && let Some(atom) = try_parse_git_diff(s, filters)?
    {
        return Ok(atom);
    }

    if let Some(atom) = try_parse_graph(s, filters)? {
        return Ok(atom);
    }

    parse_non_graph_atom(s, filters)
}

/// `Inner := Glob | Attr | '{' Any '}'` plus, for top-level atoms that
/// aren't graph/git expressions, the same three alternatives.
fn parse_non_graph_atom(s: &str, filters: &mut Filters) -> Result<Atom, ParseFilterError> {
    if s.starts_with('{') {
        let inner = strip_braces(s)?;
        if inner.is_empty() {
            return Err(ParseFilterError(format!("empty brace group in `{s}`")));
        }
        return parse_atom(inner, filters);
    }

    for key in ATTR_KEYS {
        if let Some(value) = s.strip_prefix(key).and_then(|r| r.strip_prefix('=')) {
            return parse_attr(key, value);
        }
    }

    if let Some(eq_pos) = s.find('=') {
        let key = &s[..eq_pos];
        if !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ParseFilterError(format!("unknown attribute key `{key}`")));
        }
    }

    Ok(Atom::Glob(
        GlobPattern::new(s).map_err(|e| ParseFilterError(e.to_string()))?,
    ))
}

fn strip_braces(s: &str) -> Result<&str, ParseFilterError> {
    if !s.starts_with('{') || !s.ends_with('}') || s.len() < 2 {
        return Err(ParseFilterError(format!("unbalanced braces in `{s}`")));
    }
    Ok(&s[1..s.len() - 1])
}

fn parse_attr(key: &str, value: &str) -> Result<Atom, ParseFilterError> {
    if value.is_empty() {
        return Err(ParseFilterError(format!("{key}= requires a value")));
    }
    let attr = match key {
        "name" => AttrFilter::Name(value.to_string()),
        "type" => AttrFilter::Type(match value {
            "unit" => ComponentKind::Unit,
            "stack" => ComponentKind::Stack,
            other => {
                return Err(ParseFilterError(format!(
                    "type= must be `unit` or `stack`, got `{other}`"
                )));
            }
        }),
        "external" => AttrFilter::External(match value {
            "true" => true,
            "false" => false,
            other => {
                return Err(ParseFilterError(format!(
                    "external= must be `true` or `false`, got `{other}`"
                )));
            }
        }),
        "reading" => AttrFilter::Reading(
            GlobPattern::new(value).map_err(|e| ParseFilterError(e.to_string()))?,
        ),
        other => return Err(ParseFilterError(format!("unknown attribute key `{other}`"))),
    };
    Ok(Atom::Attr(attr))
}

fn try_parse_git_diff(s: &str, filters: &mut Filters) -> Result<Option<Atom>, ParseFilterError> {
    let Some(close) = s.find(']') else {
        return Ok(None);
    };
    let refs_part = &s[1..close];
    let Some(ellipsis_pos) = refs_part.find(ELLIPSIS) else {
        return Ok(None);
    };

    let from_ref = refs_part[..ellipsis_pos].trim();
    let to_ref = refs_part[ellipsis_pos + ELLIPSIS.len()..].trim();
    if from_ref.is_empty() || to_ref.is_empty() {
        return Err(ParseFilterError(format!(
            "git-diff expression `{s}` requires both refs"
        )));
    }

    let remainder = &s[close + 1..];
    let inner = if remainder.is_empty() {
        None
    } else {
        Some(Box::new(parse_non_graph_atom(remainder, filters)?))
    };

    let index = filters.git_exprs.len();
    filters.git_exprs.push(GitDiffExprEntry {
        index,
        from_ref: from_ref.to_string(),
        to_ref: to_ref.to_string(),
        inner,
    });
    Ok(Some(Atom::GitDiff(index)))
}

fn try_parse_graph(s: &str, filters: &mut Filters) -> Result<Option<Atom>, ParseFilterError> {
    let mut rest = s;
    let mut invert = false;
    if let Some(stripped) = rest.strip_prefix('^') {
        rest = stripped;
        invert = true;
    }

    let forward_seed = rest.starts_with(ELLIPSIS);
    if forward_seed {
        rest = &rest[ELLIPSIS.len()..];
        if !invert && let Some(stripped) = rest.strip_prefix('^') {
            rest = stripped;
            invert = true;
        }
    }

    // `rest` (minus a possible trailing ellipsis) is `Inner`.
    let trailing = rest.ends_with(ELLIPSIS) && rest.len() > ELLIPSIS.len();
    let inner_src = if trailing {
        &rest[..rest.len() - ELLIPSIS.len()]
    } else {
        rest
    };

    if !forward_seed && !trailing {
        if invert {
            return Err(ParseFilterError(format!(
                "`^` prefix requires a graph expression in `{s}`"
            )));
        }
        return Ok(None);
    }

    if inner_src.is_empty() {
        return Err(ParseFilterError(format!(
            "graph expression `{s}` has no target"
        )));
    }

    let inner = parse_non_graph_atom(inner_src, filters)?;

    // `...inner`   => reverse (dependents)
    // `inner...`   => forward (dependencies)
    // `...inner...`=> both
    let index = filters.graph_exprs.len();
    filters.graph_exprs.push(GraphExprEntry {
        index,
        forward: trailing,
        reverse: forward_seed,
        invert,
        inner: Box::new(inner),
    });
    Ok(Some(Atom::Graph(index)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_dependency_expr() {
        let filters = parse_filters(&["a..."]).unwrap();
        assert_eq!(filters.graph_exprs.len(), 1);
        let g = &filters.graph_exprs[0];
        assert!(g.forward);
        assert!(!g.reverse);
        assert!(!g.invert);
    }

    #[test]
    fn reverse_dependent_expr() {
        let filters = parse_filters(&["...vpc"]).unwrap();
        let g = &filters.graph_exprs[0];
        assert!(!g.forward);
        assert!(g.reverse);
    }

    #[test]
    fn reverse_with_exclude_prefix() {
        let filters = parse_filters(&["...^vpc"]).unwrap();
        let g = &filters.graph_exprs[0];
        assert!(g.reverse);
        assert!(g.invert);
    }

    #[test]
    fn bidirectional_expr() {
        let filters = parse_filters(&["...a..."]).unwrap();
        let g = &filters.graph_exprs[0];
        assert!(g.forward);
        assert!(g.reverse);
    }

    #[test]
    fn brace_wrapped_glob_as_graph_target() {
        let filters = parse_filters(&["{./**}..."]).unwrap();
        assert_eq!(filters.graph_exprs.len(), 1);
        assert!(filters.graph_exprs[0].forward);
    }

    #[test]
    fn git_diff_expression() {
        let filters = parse_filters(&["[main...feature]./app"]).unwrap();
        assert_eq!(filters.git_exprs.len(), 1);
        let g = &filters.git_exprs[0];
        assert_eq!(g.from_ref, "main");
        assert_eq!(g.to_ref, "feature");
        assert!(g.inner.is_some());
    }

    #[test]
    fn intersection_split_respects_braces() {
        let filters = parse_filters(&["{name=a|name=b}"]).unwrap();
        assert_eq!(filters.queries[0].terms.len(), 1);
    }

    #[test]
    fn top_level_pipe_is_intersection() {
        let filters = parse_filters(&["type=unit|external=false"]).unwrap();
        assert_eq!(filters.queries[0].terms.len(), 2);
    }

    #[test]
    fn empty_query_rejected() {
        assert!(parse_filters(&[""]).is_err());
    }

    #[test]
    fn unknown_attribute_key_rejected() {
        assert!(parse_filters(&["bogus=1"]).is_err());
    }

    #[test]
    fn malformed_glob_rejected() {
        assert!(parse_filters(&["./app-[0-2"]).is_err());
    }
}
