//! The git collaborator (spec §6 "Git collaborator contract").
//!
//! Exposes worktree pairs for pairs of refs and a structural stack diff
//! between them. The default implementation shells out to the `git` binary,
//! generalizing the `run_git_command` pattern worktrunk uses for its own
//! worktree listing.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

#[derive(Debug)]
pub enum GitError {
    CommandFailed(String),
    Io(std::io::Error),
}

impl std::fmt::Display for GitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitError::CommandFailed(msg) => write!(f, "git command failed: {msg}"),
            GitError::Io(e) => write!(f, "git io error: {e}"),
        }
    }
}

impl std::error::Error for GitError {}

fn run_git_command(args: &[&str], cwd: Option<&Path>) -> Result<String, GitError> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let output = cmd.output().map_err(GitError::Io)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitError::CommandFailed(stderr.trim().to_string()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Two checked-out directories representing the endpoints of a git-diff
/// expression (spec GLOSSARY "Worktree pair").
#[derive(Debug, Clone)]
pub struct WorktreePair {
    pub from_ref: String,
    pub to_ref: String,
    pub from_path: PathBuf,
    pub to_path: PathBuf,
}

/// A structural diff of stacks between the two sides of a pair (spec §4.4
/// "secondary walker compares changed stacks").
#[derive(Debug, Clone, Default)]
pub struct StackDiff {
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    /// Paths whose content hash differs between sides; `(from_path, to_path)`.
    pub changed: Vec<(PathBuf, PathBuf)>,
}

/// The git collaborator contract (spec §6).
pub trait GitWorktrees: Send + Sync {
    /// Checks out `from_ref` and `to_ref` into two fresh directories and
    /// returns the pair. Called once per unique `(from_ref, to_ref)` (spec
    /// §4.4).
    fn checkout_pair(
        &self,
        repo_root: &Path,
        from_ref: &str,
        to_ref: &str,
    ) -> anyhow::Result<WorktreePair>;

    /// Removes every worktree this collaborator created. Safe to call
    /// multiple times.
    fn cleanup(&self) -> anyhow::Result<()>;
}

/// Default [`GitWorktrees`] backed by the `git` CLI's `worktree add`/`worktree
/// remove`, tracking what it created so `cleanup` can tear it all down
/// (spec §6 "A `Cleanup` operation removes all worktrees").
#[derive(Default)]
pub struct CliGitWorktrees {
    created: Mutex<Vec<PathBuf>>,
}

impl CliGitWorktrees {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_worktree(&self, repo_root: &Path, git_ref: &str) -> anyhow::Result<PathBuf> {
        let dir = tempfile_dir(repo_root, git_ref)?;
        run_git_command(
            &[
                "worktree",
                "add",
                "--detach",
                dir.to_str().expect("non-utf8 worktree path"),
                git_ref,
            ],
            Some(repo_root),
        )
        .map_err(|e| anyhow::anyhow!(e))?;
        self.created.lock().unwrap().push(dir.clone());
        Ok(dir)
    }
}

fn tempfile_dir(repo_root: &Path, git_ref: &str) -> anyhow::Result<PathBuf> {
    let sanitized: String = git_ref
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let dir = std::env::temp_dir().join(format!(
        "iacdiscover-worktree-{}-{}-{}",
        repo_root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("repo"),
        sanitized,
        std::process::id()
    ));
    Ok(dir)
}

impl GitWorktrees for CliGitWorktrees {
    fn checkout_pair(
        &self,
        repo_root: &Path,
        from_ref: &str,
        to_ref: &str,
    ) -> anyhow::Result<WorktreePair> {
        let from_path = self.add_worktree(repo_root, from_ref)?;
        let to_path = self.add_worktree(repo_root, to_ref)?;
        Ok(WorktreePair {
            from_ref: from_ref.to_string(),
            to_ref: to_ref.to_string(),
            from_path,
            to_path,
        })
    }

    fn cleanup(&self) -> anyhow::Result<()> {
        let mut created = self.created.lock().unwrap();
        for path in created.drain(..) {
            let _ = run_git_command(
                &[
                    "worktree",
                    "remove",
                    "--force",
                    path.to_str().unwrap_or_default(),
                ],
                None,
            );
        }
        Ok(())
    }
}

impl Drop for CliGitWorktrees {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// SHA-256 over `(relative-path\0file-content)` for every file in `dir`
/// except `skip_file` (the stack manifest, whose absolute-path contents
/// would make the hash non-deterministic — spec §4.4).
pub fn hash_stack_dir(dir: &Path, skip_file: &str) -> std::io::Result<[u8; 32]> {
    use sha2::{Digest, Sha256};

    let mut entries = Vec::new();
    collect_files(dir, dir, skip_file, &mut entries)?;
    entries.sort();

    let mut hasher = Sha256::new();
    for (relative, content) in entries {
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update(&content);
    }
    Ok(hasher.finalize().into())
}

fn collect_files(
    root: &Path,
    dir: &Path,
    skip_file: &str,
    out: &mut Vec<(String, Vec<u8>)>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, skip_file, out)?;
        } else if path.file_name().and_then(|n| n.to_str()) != Some(skip_file) {
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            let content = std::fs::read(&path)?;
            out.push((relative, content));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_ignores_skip_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("stack.hcl"), b"irrelevant").unwrap();

        let h1 = hash_stack_dir(dir.path(), "stack.hcl").unwrap();

        std::fs::write(dir.path().join("stack.hcl"), b"different").unwrap();
        let h2 = hash_stack_dir(dir.path(), "stack.hcl").unwrap();

        assert_eq!(
            h1, h2,
            "changing only the skipped manifest must not change the hash"
        );

        std::fs::write(dir.path().join("a.txt"), b"changed").unwrap();
        let h3 = hash_stack_dir(dir.path(), "stack.hcl").unwrap();
        assert_ne!(h1, h3);
    }
}
