//! The HCL parser collaborator (spec §6 "Parser collaborator contract").
//!
//! The parser itself is explicitly out of scope for this engine — only its
//! interface matters. [`ConfigParser`] is that interface; [`HclConfigParser`]
//! is a real default implementation so the crate is usable and testable
//! end-to-end without requiring callers to bring their own parser.

use std::fmt;
use std::path::{Path, PathBuf};

use hcl_edit::structure::Body;

/// A single `dependency` block, as exposed by the parser collaborator
/// contract (spec §6).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DependencyBlock {
    pub name: String,
    pub config_path: String,
    pub enabled: bool,
}

/// A parsed configuration tree, restricted to the decode list named in spec
/// §4.5: terraform block (source), dependencies/dependency blocks, feature
/// flags, exclude block, errors block, remote-state block, version
/// constraints. Outputs resolution is intentionally not implemented.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ParsedConfig {
    pub terraform_source: Option<String>,
    pub dependencies: Vec<DependencyBlock>,
    pub dependency_paths: Vec<String>,
    pub feature_flags: Vec<String>,
    pub exclude_if: Option<String>,
    pub has_errors_block: bool,
    pub has_remote_state: bool,
}

impl ParsedConfig {
    /// `dependency` blocks not marked `enabled = false` (spec §4.8 "Disabled
    /// dependencies are not followed").
    pub fn enabled_dependency_paths(&self) -> Vec<&str> {
        self.dependencies
            .iter()
            .filter(|d| d.enabled)
            .map(|d| d.config_path.as_str())
            .chain(self.dependency_paths.iter().map(|s| s.as_str()))
            .collect()
    }

    pub fn all_dependency_paths(&self) -> Vec<&str> {
        self.dependencies
            .iter()
            .map(|d| d.config_path.as_str())
            .chain(self.dependency_paths.iter().map(|s| s.as_str()))
            .collect()
    }
}

/// Conditions the parse phase runs under: which blocks the caller actually
/// needs (so a default parser can skip unnecessary work), and whether
/// diagnostics should be suppressed rather than returned as hard errors.
#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    pub suppress_errors: bool,
}

#[derive(Debug)]
pub struct ParseError {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

impl std::error::Error for ParseError {}

/// The parser collaborator contract (spec §6). Implementations are free to
/// use any HCL parser, or none at all (for tests that only care about the
/// dependency graph and fabricate `ParsedConfig` directly).
pub trait ConfigParser: Send + Sync {
    fn parse(
        &self,
        path: &Path,
        ctx: &ParseContext,
    ) -> Result<(ParsedConfig, Vec<PathBuf>), ParseError>;
}

/// Default [`ConfigParser`] backed by `hcl-edit`.
#[derive(Debug, Default)]
pub struct HclConfigParser;

impl ConfigParser for HclConfigParser {
    fn parse(
        &self,
        path: &Path,
        ctx: &ParseContext,
    ) -> Result<(ParsedConfig, Vec<PathBuf>), ParseError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let parsed = match raw
            .parse::<Body>()
            .map_err(|e| format!("HCL syntax error: {e}"))
            .and_then(|body| parse_body(&body))
        {
            Ok(p) => p,
            Err(message) => {
                if ctx.suppress_errors {
                    log::debug!("suppressing parse error in {}: {message}", path.display());
                    ParsedConfig::default()
                } else {
                    return Err(ParseError {
                        path: path.to_path_buf(),
                        message,
                    });
                }
            }
        };

        Ok((parsed, vec![path.to_path_buf()]))
    }
}

fn parse_body(body: &Body) -> Result<ParsedConfig, String> {
    let mut parsed = ParsedConfig::default();

    for block in body.blocks() {
        match block.ident.as_str() {
            "terraform" => {
                if let Some(attr) = block.body.get_attribute("source") {
                    parsed.terraform_source = attr.value.as_str().map(str::to_owned);
                }
            }
            "dependency" => {
                let name = block
                    .labels
                    .first()
                    .map(|l| l.as_str())
                    .unwrap_or_default()
                    .to_string();
                let config_path = block
                    .body
                    .get_attribute("config_path")
                    .and_then(|a| a.value.as_str())
                    .ok_or_else(|| format!("dependency \"{name}\" missing config_path"))?
                    .to_string();
                let enabled = block
                    .body
                    .get_attribute("enabled")
                    .and_then(|a| a.value.as_bool())
                    .unwrap_or(true);
                parsed.dependencies.push(DependencyBlock {
                    name,
                    config_path,
                    enabled,
                });
            }
            "dependencies" => {
                if let Some(attr) = block.body.get_attribute("paths")
                    && let Some(arr) = attr.value.as_array()
                {
                    for v in arr.iter() {
                        if let Some(s) = v.as_str() {
                            parsed.dependency_paths.push(s.to_string());
                        }
                    }
                }
            }
            "feature" => {
                if let Some(label) = block.labels.first().map(|l| l.as_str()) {
                    parsed.feature_flags.push(label.to_string());
                }
            }
            "exclude" => {
                parsed.exclude_if = block
                    .body
                    .get_attribute("if")
                    .and_then(|a| a.value.as_str())
                    .map(str::to_owned);
            }
            "errors" => {
                parsed.has_errors_block = true;
            }
            "remote_state" => {
                parsed.has_remote_state = true;
            }
            _ => {}
        }
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_dependency_blocks_with_enabled_flag() {
        let file = write_fixture(
            r#"
            dependency "vpc" {
              config_path = "../vpc"
            }
            dependency "db" {
              config_path = "../db"
              enabled     = false
            }
            "#,
        );
        let parser = HclConfigParser;
        let (config, files) = parser.parse(file.path(), &ParseContext::default()).unwrap();
        assert_eq!(files, vec![file.path().to_path_buf()]);
        assert_eq!(config.dependencies.len(), 2);
        assert_eq!(config.enabled_dependency_paths(), vec!["../vpc"]);
        assert_eq!(config.all_dependency_paths(), vec!["../vpc", "../db"]);
    }

    #[test]
    fn suppressed_errors_return_empty_config() {
        let file = write_fixture("dependency \"broken\" {\n");
        let parser = HclConfigParser;
        let ctx = ParseContext {
            suppress_errors: true,
        };
        let (config, _) = parser.parse(file.path(), &ctx).unwrap();
        assert_eq!(config, ParsedConfig::default());
    }

    #[test]
    fn unsuppressed_errors_propagate() {
        let file = write_fixture("dependency \"broken\" {\n  config_path = 1\n}\n");
        let parser = HclConfigParser;
        let err = parser
            .parse(file.path(), &ParseContext::default())
            .unwrap_err();
        assert!(err.message.contains("config_path"));
    }
}
