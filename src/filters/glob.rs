//! Shell-style glob matching (`?`, `*`, `[...]`) for path and `reading=`
//! filters (spec §6 grammar `Glob`).

use regex::Regex;

#[derive(Debug, Clone)]
pub struct GlobPattern {
    raw: String,
    regex: Regex,
    has_separator: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobError(pub String);

impl std::fmt::Display for GlobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed glob: {}", self.0)
    }
}

impl std::error::Error for GlobError {}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self, GlobError> {
        if pattern.is_empty() {
            return Err(GlobError("empty pattern".to_string()));
        }
        let regex_src = translate(pattern)?;
        let regex = Regex::new(&regex_src).map_err(|e| GlobError(format!("{pattern}: {e}")))?;
        Ok(Self {
            raw: pattern.to_string(),
            regex,
            has_separator: pattern.contains('/'),
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// A pattern with no `/` also matches as a bare trailing path segment —
    /// `vpc` selects `.../vpc` the same way a shell basename match would
    /// (spec §8 scenario 3's literal `["...vpc"]`), while a pattern that
    /// names a directory (`./apps/*`) stays anchored to the full path.
    pub fn matches(&self, candidate: &str) -> bool {
        if self.regex.is_match(candidate) {
            return true;
        }
        if !self.has_separator
            && let Some(idx) = candidate.rfind('/')
        {
            return self.regex.is_match(&candidate[idx + 1..]);
        }
        false
    }
}

impl PartialEq for GlobPattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}
impl Eq for GlobPattern {}

/// Translates a shell glob into an anchored regex. `**` matches across path
/// separators (any number of directories), a single `*` stops at `/`.
fn translate(pattern: &str) -> Result<String, GlobError> {
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '[' => {
                out.push('[');
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == ']' {
                        closed = true;
                        out.push(']');
                        break;
                    }
                    out.push(next);
                }
                if !closed {
                    return Err(GlobError(format!("unterminated '[' in `{pattern}`")));
                }
            }
            other => {
                if is_regex_meta(other) {
                    out.push('\\');
                }
                out.push(other);
            }
        }
    }
    out.push('$');
    Ok(out)
}

fn is_regex_meta(c: char) -> bool {
    matches!(
        c,
        '.' | '+' | '(' | ')' | '|' | '^' | '$' | '{' | '}' | '\\'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_does_not_cross_separators() {
        let g = GlobPattern::new("./apps/*").unwrap();
        assert!(g.matches("./apps/app-0000"));
        assert!(!g.matches("./apps/app-0000/nested"));
    }

    #[test]
    fn double_star_crosses_separators() {
        let g = GlobPattern::new("./**").unwrap();
        assert!(g.matches("./apps/app-0000"));
        assert!(g.matches("./apps/app-0000/nested"));
        assert!(g.matches("./top-level"));
    }

    #[test]
    fn question_mark_matches_single_char() {
        let g = GlobPattern::new("./app-000?").unwrap();
        assert!(g.matches("./app-0000"));
        assert!(!g.matches("./app-00000"));
    }

    #[test]
    fn bracket_class() {
        let g = GlobPattern::new("./app-[0-2]").unwrap();
        assert!(g.matches("./app-0"));
        assert!(g.matches("./app-2"));
        assert!(!g.matches("./app-3"));
    }

    #[test]
    fn unterminated_bracket_is_rejected() {
        assert!(GlobPattern::new("./app-[0-2").is_err());
    }

    #[test]
    fn empty_pattern_is_rejected() {
        assert!(GlobPattern::new("").is_err());
    }

    #[test]
    fn bare_pattern_matches_trailing_segment() {
        let g = GlobPattern::new("vpc").unwrap();
        assert!(g.matches("vpc"));
        assert!(g.matches("./apps/vpc"));
        assert!(g.matches("/tmp/repo/vpc"));
        assert!(!g.matches("vpc-extra"));
    }

    #[test]
    fn pattern_with_separator_stays_full_path_anchored() {
        let g = GlobPattern::new("./apps/vpc").unwrap();
        assert!(g.matches("./apps/vpc"));
        assert!(!g.matches("vpc"));
    }
}
