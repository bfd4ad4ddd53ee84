//! Error taxonomy for `git-rewrite`.

use std::io;
use thiserror::Error;

/// Everything that can stop an amend.
///
/// Variants before [`RewriteError::ReplayConflict`] are raised before any
/// commit is created, so the repository is untouched when they are returned.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("`git` not found. Make sure git is installed and on PATH.")]
    GitNotFound,

    #[error("not inside a git repository ({0})")]
    NotARepository(String),

    #[error("could not find commit '{0}'")]
    UnknownRevision(String),

    #[error("no staged changes to commit")]
    NoStagedChanges,

    #[error("unstaged changes in the working tree; stash or stage them first")]
    UnstagedChanges,

    #[error("commit {0} is not an ancestor of HEAD")]
    NotAnAncestor(String),

    /// The fixup commit exists; the rebase stopped and is left for the user.
    #[error("rebase onto {onto} stopped; resolve conflicts and run `git rebase --continue`")]
    ReplayConflict { onto: String },

    /// The rebase exited non-zero without stopping mid-way, e.g. a
    /// `pre-rebase` hook refused. The fixup commit is at the tip.
    #[error(
        "rebase onto {onto} exited with status {exit_code} without replaying; the fixup commit is at the tip"
    )]
    ReplayFailed { onto: String, exit_code: i32 },

    /// The replay finished but the result is not what was expected.
    #[error("replay finished but history does not look amended: {0}")]
    ReplayMismatch(String),

    /// History is amended; only the message substitution failed.
    #[error("commit was amended but its message could not be rewritten: {0}")]
    MessageRewrite(String),

    #[error("`git {command}` failed (exit code {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        stderr: String,
        exit_code: i32,
    },

    #[error("unexpected git output: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RewriteError {
    /// Process exit status for this failure. Stable across releases.
    pub fn exit_code(&self) -> i32 {
        match self {
            RewriteError::GitNotFound => 127,
            RewriteError::NotARepository(_) => 10,
            RewriteError::UnknownRevision(_) => 11,
            RewriteError::NoStagedChanges => 12,
            RewriteError::UnstagedChanges => 13,
            RewriteError::NotAnAncestor(_) => 14,
            RewriteError::ReplayConflict { .. } => 20,
            RewriteError::ReplayMismatch(_) => 21,
            RewriteError::ReplayFailed { .. } => 23,
            RewriteError::MessageRewrite(_) => 22,
            RewriteError::CommandFailed { .. } | RewriteError::Parse(_) | RewriteError::Io(_) => 1,
        }
    }

    /// Whether history may already differ from before the run.
    pub fn left_partial_state(&self) -> bool {
        matches!(
            self,
            RewriteError::ReplayConflict { .. }
                | RewriteError::ReplayFailed { .. }
                | RewriteError::ReplayMismatch(_)
                | RewriteError::MessageRewrite(_)
        )
    }
}
