//! Structured errors surfaced by the discovery engine.
//!
//! Every error is tagged with the [`Phase`] that produced it, matching the
//! "each carries its phase" requirement: callers can tell a directory-walk
//! failure from a parse failure from a graph-depth exhaustion without string
//! matching.

use std::path::PathBuf;

/// The phase of the discovery pipeline an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Filesystem,
    Worktree,
    Parse,
    Graph,
    Relationship,
    Finalization,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Filesystem => "filesystem",
            Phase::Worktree => "worktree",
            Phase::Parse => "parse",
            Phase::Graph => "graph",
            Phase::Relationship => "relationship",
            Phase::Finalization => "finalization",
        };
        f.write_str(name)
    }
}

/// A single error produced while discovering components.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("[{phase}] max dependency depth exceeded at {path}")]
    MaxDepthReached { phase: Phase, path: PathBuf },

    /// Programming error: a component reached a phase without a discovery
    /// context. This should never happen; if you hit it, please file a bug.
    #[error("[{phase}] component at {path} has no discovery context, please file a bug")]
    MissingDiscoveryContext { phase: Phase, path: PathBuf },

    /// Programming error: a phase ran without a working directory configured.
    /// This should never happen; if you hit it, please file a bug.
    #[error("[{phase}] no working directory configured, please file a bug")]
    MissingWorkingDirectory { phase: Phase },

    #[error(
        "[worktree] git-diff filter cannot be combined with command `{command}` (only plan, apply, or no command are supported)"
    )]
    GitFilterCommand { command: String },

    #[error("[filters] malformed filter against component {path}: {reason}")]
    Classification { path: PathBuf, reason: String },

    #[error("[finalization] dependency cycle detected at {path}")]
    CycleDetected { path: PathBuf },

    #[error("[{phase}] filesystem error at {path}: {source}")]
    Filesystem {
        phase: Phase,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[parse] failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("[{phase}] user query error: {reason}")]
    UserQuery { phase: Phase, reason: String },

    #[error("[worktree] git collaborator failed: {0}")]
    Git(#[source] anyhow::Error),

    #[error("discovery cancelled")]
    Cancellation,

    #[error("[{phase}] {count} error(s) occurred")]
    Phase {
        phase: Phase,
        count: usize,
        #[source]
        first: Box<DiscoveryError>,
    },
}

impl DiscoveryError {
    pub fn phase(&self) -> Option<Phase> {
        match self {
            DiscoveryError::MaxDepthReached { phase, .. }
            | DiscoveryError::MissingDiscoveryContext { phase, .. }
            | DiscoveryError::MissingWorkingDirectory { phase }
            | DiscoveryError::Filesystem { phase, .. }
            | DiscoveryError::UserQuery { phase, .. }
            | DiscoveryError::Phase { phase, .. } => Some(*phase),
            DiscoveryError::Parse { .. } => Some(Phase::Parse),
            DiscoveryError::GitFilterCommand { .. } | DiscoveryError::Git(_) => {
                Some(Phase::Worktree)
            }
            DiscoveryError::Classification { .. } => None,
            DiscoveryError::CycleDetected { .. } => Some(Phase::Finalization),
            DiscoveryError::Cancellation => None,
        }
    }

    /// Join a batch of per-task errors collected during a phase into one
    /// error, per the "lossless-additive" collection policy (spec §5/§7):
    /// every error is collected, but the join surfaces only the first as the
    /// caller-visible cause while recording how many occurred.
    pub fn join(phase: Phase, mut errors: Vec<DiscoveryError>) -> Option<DiscoveryError> {
        if errors.is_empty() {
            return None;
        }
        if errors.len() == 1 {
            return Some(errors.pop().unwrap());
        }
        let count = errors.len();
        let first = Box::new(errors.remove(0));
        Some(DiscoveryError::Phase {
            phase,
            count,
            first,
        })
    }
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
