//! The version-control seam of the amend.
//!
//! [`Vcs`] lists the repository operations the orchestrator sequences, and
//! the value types here are what those operations exchange. The real
//! implementation shells out to `git` ([`crate::git::GitCli`]); tests drive
//! the orchestrator with a scripted one.

use crate::error::RewriteError;

use std::fmt;
use std::path::PathBuf;

/// Full object id of a commit, as printed by `git rev-parse`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitId(String);

impl CommitId {
    /// Parses a full hex object id, tolerating surrounding whitespace.
    ///
    /// Accepts SHA-1 (40) and SHA-256 (64) ids; anything else is a
    /// [`RewriteError::Parse`].
    pub fn parse(raw: &str) -> Result<CommitId, RewriteError> {
        let id = raw.trim();
        let valid_len = id.len() == 40 || id.len() == 64;
        if valid_len && id.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(CommitId(id.to_ascii_lowercase()))
        } else {
            Err(RewriteError::Parse(format!("not a commit id: {:?}", id)))
        }
    }

    /// The full lowercase hex id.
    ///
    /// # Returns
    ///
    /// A borrowed view suitable for passing to `git` as an argument or
    /// exporting through an environment variable.
    ///
    /// # Examples
    ///
    /// ```
    /// use git_rewrite::vcs::CommitId;
    ///
    /// let id = CommitId::parse("ABCDEF0123456789ABCDEF0123456789ABCDEF01\r\n").unwrap();
    /// assert_eq!(id.as_str(), "abcdef0123456789abcdef0123456789abcdef01");
    /// ```
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for human-facing messages.
    pub fn short(&self) -> &str {
        &self.0[..7]
    }

    /// Whether `abbrev` (as written in a rebase todo) names this commit.
    pub fn matches_abbrev(&self, abbrev: &str) -> bool {
        abbrev.len() >= 4
            && abbrev.len() <= self.0.len()
            && self.0.starts_with(&abbrev.to_ascii_lowercase())
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Exclusive lower end of the replay range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LowerBound {
    /// First parent of the amended commit.
    Parent(CommitId),
    /// The amended commit is a root commit; replay the whole history.
    Root,
}

impl LowerBound {
    /// Revision range covering (lower bound, HEAD].
    pub fn range_spec(&self) -> String {
        match self {
            LowerBound::Parent(id) => format!("{}..HEAD", id),
            LowerBound::Root => String::from("HEAD"),
        }
    }
}

impl fmt::Display for LowerBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LowerBound::Parent(id) => f.write_str(id.short()),
            LowerBound::Root => f.write_str("root"),
        }
    }
}

/// One line of `git log --format='%H %s'`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: CommitId,
    pub subject: String,
}

/// Parses `%H %s` log lines, skipping blank lines and trimming `\r` and
/// trailing whitespace.
pub fn parse_log(output: &str) -> Result<Vec<LogEntry>, RewriteError> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let line = line.trim_start();
            let (id, subject) = match line.split_once(' ') {
                Some((id, subject)) => (id, subject.trim()),
                None => (line, ""),
            };
            Ok(LogEntry {
                id: CommitId::parse(id)?,
                subject: subject.to_string(),
            })
        })
        .collect()
}

/// The operations the orchestrator needs from version control.
///
/// Every method maps to one blocking `git` invocation in [`crate::git::GitCli`];
/// the trait exists so the sequencing can be exercised without a repository.
pub trait Vcs {
    /// Locates the repository's git directory.
    fn git_dir(&mut self) -> Result<PathBuf, RewriteError>;

    /// Resolves a user-supplied revision to a commit id.
    fn resolve_commit(&mut self, rev: &str) -> Result<CommitId, RewriteError>;

    /// Whether the index differs from `HEAD`.
    ///
    /// # Returns
    ///
    /// `true` when there is something to fold into the amended commit.
    fn has_staged_changes(&mut self) -> Result<bool, RewriteError>;

    /// Whether tracked files differ from the index. Untracked files don't count.
    fn has_unstaged_changes(&mut self) -> Result<bool, RewriteError>;

    /// Whether `commit` is reachable from `HEAD`.
    ///
    /// # Parameters
    ///
    /// * `commit` - the resolved commit to amend.
    ///
    /// # Returns
    ///
    /// `false` for commits on other branches, which the replay cannot reach.
    /// `HEAD` counts as its own ancestor.
    fn is_ancestor_of_head(&mut self, commit: &CommitId) -> Result<bool, RewriteError>;

    /// First parent of `commit`, or `None` for a root commit.
    fn first_parent(&mut self, commit: &CommitId) -> Result<Option<CommitId>, RewriteError>;

    /// Full raw message of `commit`.
    fn commit_message(&mut self, commit: &CommitId) -> Result<String, RewriteError>;

    /// Commits the index as `fixup! <target>` and returns the new commit.
    fn commit_fixup(&mut self, target: &CommitId) -> Result<CommitId, RewriteError>;

    /// Non-merge commits in (lower, HEAD], oldest first.
    fn list_range(&mut self, lower: &LowerBound) -> Result<Vec<LogEntry>, RewriteError>;

    /// Rebases (lower, HEAD] squashing `fixup` into `target`.
    fn replay(
        &mut self,
        lower: &LowerBound,
        target: &CommitId,
        fixup: &CommitId,
    ) -> Result<(), RewriteError>;

    /// Replaces the message of `target` within (lower, HEAD].
    fn rewrite_message(
        &mut self,
        lower: &LowerBound,
        target: &CommitId,
        message: &str,
    ) -> Result<(), RewriteError>;
}
