use crate::error::RewriteError;
use crate::vcs::{CommitId, LogEntry, LowerBound, Vcs, parse_log};

use std::ffi::OsStr;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Environment variable carrying the full id of the amended commit to helper modes.
pub const TARGET_ENV: &str = "GIT_REWRITE_TARGET";
/// Environment variable carrying the full id of the fixup commit to the sequence editor.
pub const FIXUP_ENV: &str = "GIT_REWRITE_FIXUP";
/// Environment variable carrying the path of the replacement message to the message filter.
pub const MESSAGE_FILE_ENV: &str = "GIT_REWRITE_MESSAGE_FILE";

/// Builds a shell command line that re-invokes this executable in a helper mode.
///
/// git evaluates `GIT_SEQUENCE_EDITOR` and `--msg-filter` through `sh`, so the
/// executable path is single-quoted whenever it holds anything beyond a
/// conservative set of characters.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(
///     build_helper_command("/usr/local/bin/git-rewrite", "--sequence-editor"),
///     "/usr/local/bin/git-rewrite --sequence-editor"
/// );
/// assert_eq!(
///     build_helper_command("/path/with space/git-rewrite", "--msg-filter"),
///     "'/path/with space/git-rewrite' --msg-filter"
/// );
/// ```
pub(crate) fn build_helper_command(exe_path: &str, mode: &str) -> String {
    let plain = !exe_path.is_empty()
        && exe_path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:,@%".contains(c));

    let quoted = if plain {
        exe_path.to_string()
    } else {
        format!("'{}'", exe_path.replace('\'', r"'\''"))
    };

    format!("{quoted} {mode}")
}

/// Maps a spawn failure, turning a missing executable into [`RewriteError::GitNotFound`].
fn spawn_error(e: io::Error) -> RewriteError {
    if e.kind() == io::ErrorKind::NotFound {
        RewriteError::GitNotFound
    } else {
        RewriteError::Io(e)
    }
}

fn failed(command: &str, stderr: &[u8], exit_code: Option<i32>) -> RewriteError {
    RewriteError::CommandFailed {
        command: command.to_string(),
        stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        exit_code: exit_code.unwrap_or(-1),
    }
}

/// Runs a command with inherited stdin and stderr and only checks its exit status.
///
/// The child's stdout is sent to our stderr so that standard output carries
/// nothing but the final confirmation line.
fn run_status(mut cmd: Command, label: &str) -> Result<(), RewriteError> {
    cmd.stdin(Stdio::inherit());
    cmd.stdout(Stdio::from(io::stderr()));
    cmd.stderr(Stdio::inherit());

    let status = cmd.status().map_err(spawn_error)?;
    if status.success() {
        Ok(())
    } else {
        Err(failed(label, b"see output above", status.code()))
    }
}

/// Runs a command and returns its standard output on success, or
/// [`RewriteError::CommandFailed`] carrying its trimmed standard error.
fn run_output(mut cmd: Command, label: &str) -> Result<String, RewriteError> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let out = cmd.output().map_err(spawn_error)?;
    if out.status.success() {
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    } else {
        Err(failed(label, &out.stderr, out.status.code()))
    }
}

/// Runs a yes/no query such as `git diff --quiet`: exit `0` is `true`,
/// exit `1` is `false`, anything else is an error.
fn run_probe(mut cmd: Command, label: &str) -> Result<bool, RewriteError> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::piped());

    let out = cmd.output().map_err(spawn_error)?;
    match out.status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        code => Err(failed(label, &out.stderr, code)),
    }
}

/// Detects if a git rebase is currently in progress.
///
/// Checks for the `rebase-merge` or `rebase-apply` directories that git
/// creates inside the git directory for the duration of a rebase.
pub fn rebase_in_progress(git_dir: &Path) -> bool {
    git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists()
}

/// Extracts the message from `git cat-file commit` output.
fn message_from_raw_commit(raw: &str) -> Result<String, RewriteError> {
    match raw.split_once("\n\n") {
        Some((_, message)) => Ok(message.to_string()),
        None => Err(RewriteError::Parse(String::from("commit object without message"))),
    }
}

/// Decides what a non-zero `git rebase` exit means.
///
/// A rebase that stopped part way leaves its state directory behind; that is
/// a conflict the user can continue. Anything else (a `pre-rebase` hook
/// refusing, the sequence editor failing) never started replaying.
///
/// # Parameters
///
/// * `git_dir` – The repository's git directory.
/// * `onto` – Where the rebase was replaying onto, for the diagnosis.
/// * `failure` – The error the rebase command returned.
///
/// # Returns
///
/// * [`RewriteError::ReplayConflict`] if a rebase is in progress.
/// * [`RewriteError::ReplayFailed`] for a plain non-zero exit otherwise.
/// * `failure` unchanged when git could not be run at all.
pub(crate) fn classify_replay_failure(
    git_dir: &Path,
    onto: &LowerBound,
    failure: RewriteError,
) -> RewriteError {
    match failure {
        RewriteError::CommandFailed { .. } if rebase_in_progress(git_dir) => {
            RewriteError::ReplayConflict {
                onto: onto.to_string(),
            }
        }
        RewriteError::CommandFailed { exit_code, .. } => RewriteError::ReplayFailed {
            onto: onto.to_string(),
            exit_code,
        },
        other => other,
    }
}

/// Where the repository lives, learned once by [`Vcs::git_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct Layout {
    git_dir: PathBuf,
    toplevel: PathBuf,
}

/// Reads `rev-parse --is-inside-work-tree --absolute-git-dir --show-toplevel`.
fn parse_layout(out: &str) -> Result<Layout, RewriteError> {
    let mut lines = out.lines().map(str::trim);
    match (lines.next(), lines.next(), lines.next()) {
        (Some("true"), Some(git_dir), Some(toplevel))
            if !git_dir.is_empty() && !toplevel.is_empty() =>
        {
            Ok(Layout {
                git_dir: PathBuf::from(git_dir),
                toplevel: PathBuf::from(toplevel),
            })
        }
        (Some("false"), _, _) => Err(RewriteError::NotARepository(String::from(
            "no working tree",
        ))),
        _ => Err(RewriteError::Parse(out.to_string())),
    }
}

/// [`Vcs`] backed by the `git` command-line tool.
///
/// Until the repository has been located every command runs in the current
/// directory; afterwards they run from the top of the working tree, which
/// `git filter-branch` insists on.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
    layout: Option<Layout>,
}

impl GitCli {
    /// Uses `program` when given, otherwise finds `git` on `PATH`.
    pub fn locate(program: Option<PathBuf>) -> Result<GitCli, RewriteError> {
        let program = match program {
            Some(p) => p,
            None => which::which("git").map_err(|_| RewriteError::GitNotFound)?,
        };
        debug!(git = %program.display(), "using git executable");
        Ok(GitCli {
            program,
            layout: None,
        })
    }

    /// Builds a `git` invocation with `args`, run from the working tree top
    /// once the repository is known.
    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        if let Some(layout) = &self.layout {
            cmd.current_dir(&layout.toplevel);
        }
        debug!(command = ?cmd, "running git");
        cmd
    }

    /// Shell command line that runs this executable in `mode`, for git to evaluate.
    fn helper_command(mode: &str) -> Result<String, RewriteError> {
        let exe = std::env::current_exe().map_err(|e| {
            RewriteError::Io(io::Error::new(
                e.kind(),
                format!("cannot locate current executable: {}", e),
            ))
        })?;
        Ok(build_helper_command(&exe.to_string_lossy(), mode))
    }

    /// The git directory, locating the repository first if needed.
    fn known_git_dir(&mut self) -> Result<PathBuf, RewriteError> {
        match &self.layout {
            Some(layout) => Ok(layout.git_dir.clone()),
            None => self.git_dir(),
        }
    }

    /// Full id of the current HEAD commit.
    fn head(&mut self) -> Result<CommitId, RewriteError> {
        let out = run_output(self.command(["rev-parse", "--verify", "HEAD"]), "rev-parse HEAD")?;
        CommitId::parse(&out)
    }
}

impl Vcs for GitCli {
    fn git_dir(&mut self) -> Result<PathBuf, RewriteError> {
        let cmd = self.command([
            "rev-parse",
            "--is-inside-work-tree",
            "--absolute-git-dir",
            "--show-toplevel",
        ]);
        let out = match run_output(cmd, "rev-parse --git-dir") {
            Ok(out) => out,
            Err(RewriteError::CommandFailed { stderr, .. }) => {
                return Err(RewriteError::NotARepository(stderr));
            }
            Err(e) => return Err(e),
        };

        let layout = parse_layout(&out)?;
        debug!(
            git_dir = %layout.git_dir.display(),
            toplevel = %layout.toplevel.display(),
            "located repository"
        );
        let git_dir = layout.git_dir.clone();
        self.layout = Some(layout);
        Ok(git_dir)
    }

    fn resolve_commit(&mut self, rev: &str) -> Result<CommitId, RewriteError> {
        // A leading dash would be read as an option.
        if rev.trim().is_empty() || rev.starts_with('-') {
            return Err(RewriteError::UnknownRevision(rev.to_string()));
        }
        let peeled = format!("{}^{{commit}}", rev);
        let cmd = self.command(["rev-parse", "--verify", "--quiet", &peeled]);
        match run_output(cmd, "rev-parse --verify") {
            Ok(out) => CommitId::parse(&out),
            Err(RewriteError::CommandFailed { .. }) => {
                Err(RewriteError::UnknownRevision(rev.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// `git diff --cached --quiet`: exit `1` means the index differs from HEAD.
    fn has_staged_changes(&mut self) -> Result<bool, RewriteError> {
        let clean = run_probe(self.command(["diff", "--cached", "--quiet"]), "diff --cached")?;
        Ok(!clean)
    }

    /// `git diff --quiet`: exit `1` means tracked files differ from the index.
    fn has_unstaged_changes(&mut self) -> Result<bool, RewriteError> {
        let clean = run_probe(self.command(["diff", "--quiet"]), "diff")?;
        Ok(!clean)
    }

    /// `git merge-base --is-ancestor <commit> HEAD`.
    fn is_ancestor_of_head(&mut self, commit: &CommitId) -> Result<bool, RewriteError> {
        let cmd = self.command(["merge-base", "--is-ancestor", commit.as_str(), "HEAD"]);
        run_probe(cmd, "merge-base --is-ancestor")
    }

    fn first_parent(&mut self, commit: &CommitId) -> Result<Option<CommitId>, RewriteError> {
        let cmd = self.command(["rev-list", "--parents", "-n", "1", commit.as_str()]);
        let out = run_output(cmd, "rev-list --parents")?;
        match out.split_whitespace().nth(1) {
            Some(parent) => Ok(Some(CommitId::parse(parent)?)),
            None => Ok(None),
        }
    }

    fn commit_message(&mut self, commit: &CommitId) -> Result<String, RewriteError> {
        let out = run_output(self.command(["cat-file", "commit", commit.as_str()]), "cat-file")?;
        message_from_raw_commit(&out)
    }

    fn commit_fixup(&mut self, target: &CommitId) -> Result<CommitId, RewriteError> {
        let message = format!("fixup! {}", target);
        let cmd = self.command(["commit", "--quiet", "-m", &message]);
        run_status(cmd, "commit")?;
        self.head()
    }

    fn list_range(&mut self, lower: &LowerBound) -> Result<Vec<LogEntry>, RewriteError> {
        let range = lower.range_spec();
        let cmd = self.command([
            "log",
            "--reverse",
            "--topo-order",
            "--no-merges",
            "--format=%H %s",
            &range,
            "--",
        ]);
        let out = run_output(cmd, "log")?;
        parse_log(&out)
    }

    fn replay(
        &mut self,
        lower: &LowerBound,
        target: &CommitId,
        fixup: &CommitId,
    ) -> Result<(), RewriteError> {
        let mut cmd = self.command(["rebase", "-i", "--autosquash"]);
        match lower {
            LowerBound::Parent(id) => cmd.arg(id.as_str()),
            LowerBound::Root => cmd.arg("--root"),
        };

        // No-op editor for anything git would otherwise open; the todo list
        // goes through our own sequence editor.
        cmd.env("GIT_EDITOR", "true");
        cmd.env("GIT_SEQUENCE_EDITOR", Self::helper_command("--sequence-editor")?);
        cmd.env(TARGET_ENV, target.as_str());
        cmd.env(FIXUP_ENV, fixup.as_str());

        match run_status(cmd, "rebase -i --autosquash") {
            Ok(()) => Ok(()),
            Err(e) => {
                let git_dir = self.known_git_dir()?;
                Err(classify_replay_failure(&git_dir, lower, e))
            }
        }
    }

    fn rewrite_message(
        &mut self,
        lower: &LowerBound,
        target: &CommitId,
        message: &str,
    ) -> Result<(), RewriteError> {
        let mut file = tempfile::Builder::new()
            .prefix("git-rewrite-msg")
            .tempfile()?;
        file.write_all(message.as_bytes())?;
        if !message.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        file.flush()?;

        let range = lower.range_spec();
        let filter = Self::helper_command("--msg-filter")?;
        let mut cmd = self.command(["filter-branch", "-f", "--msg-filter", &filter, "--", &range]);
        cmd.env("FILTER_BRANCH_SQUELCH_WARNING", "1");
        cmd.env(TARGET_ENV, target.as_str());
        cmd.env(MESSAGE_FILE_ENV, file.path());

        let status = run_status(cmd, "filter-branch --msg-filter");
        let cleanup = file.close();
        debug!(removed = cleanup.is_ok(), "message file cleanup");

        status.map_err(|e| RewriteError::MessageRewrite(e.to_string()))?;
        cleanup?;
        Ok(())
    }
}
