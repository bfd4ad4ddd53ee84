use crate::amend::{AmendRequest, amend};
use crate::banner::{ConflictReport, print_conflict_report};
use crate::error::RewriteError;
use crate::git::{self, GitCli};
use crate::vcs::Vcs;
use crate::{msg_filter, sequence_editor};

use clap::Parser;
use console::style;
use std::{env, path::PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Amend a specific commit with the currently staged changes.
///
/// Later commits are replayed on top of the amended one so history stays
/// linear. Every commit from COMMIT_ID to HEAD gets a new id.
#[derive(Debug, Parser)]
#[command(name = "git-rewrite", version)]
pub struct Cli {
    /// Commit hash (full or abbreviated) to amend
    #[arg(value_name = "COMMIT_ID")]
    pub commit_id: String,

    /// New commit message (if not provided, keeps original message)
    #[arg(short, long, value_name = "TEXT")]
    pub message: Option<String>,

    /// Log what is being run (-v for steps, -vv for every git command)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// git executable to use instead of the one on PATH
    #[arg(long, value_name = "PATH", env = "GIT_REWRITE_GIT")]
    pub git: Option<PathBuf>,
}

/// Installs the stderr logger. `GIT_REWRITE_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("GIT_REWRITE_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Prints the one-line diagnosis for `err` to stderr.
fn report_error(err: &RewriteError) {
    eprintln!("{}", style(format!("Error: {}", err)).red().bold());
}

/// Explains a replay that did not finish.
///
/// The advice depends on whether git left a rebase behind: a conflict keeps
/// one, a rebase refused before its first step (a `pre-rebase` hook, say)
/// does not.
fn report_conflict(vcs: &mut GitCli, cli: &Cli, onto: &str) {
    let rebase_active = match vcs.git_dir() {
        Ok(dir) => git::rebase_in_progress(&dir),
        Err(e) => {
            warn!(error = %e, "cannot inspect rebase state");
            true
        }
    };

    print_conflict_report(&ConflictReport {
        target: &cli.commit_id,
        onto,
        rebase_active,
        message_pending: cli.message.is_some(),
    });
}

/// Runs one of the helper modes git calls back into, if `args` asks for one.
///
/// Returns the helper's exit code, or `None` for a normal invocation.
fn helper_mode(args: &[String]) -> Option<i32> {
    let (mode, result) = match args.get(1).map(String::as_str) {
        Some("--sequence-editor") => (
            "Sequence editor",
            sequence_editor::run(args.get(2).map(String::as_str)),
        ),
        Some("--msg-filter") => ("Message filter", msg_filter::run()),
        _ => return None,
    };

    Some(match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{}", style(format!("{} error: {}", mode, e)).red().bold());
            1
        }
    })
}

/// Main CLI entry point for `git-rewrite`.
///
/// 1. Handles the `--sequence-editor` and `--msg-filter` invocations git
///    makes back into this binary.
/// 2. Parses arguments and sets up logging.
/// 3. Locates `git` and runs the amend.
/// 4. Prints the confirmation line on stdout, or the diagnosis on stderr.
///
/// # Exit Codes
///
/// * `0` on success.
/// * [`RewriteError::exit_code`] of the failure otherwise; `2` for usage errors.
pub fn entry() -> Result<i32, RewriteError> {
    let args: Vec<String> = env::args().collect();
    if let Some(code) = helper_mode(&args) {
        return Ok(code);
    }

    let cli = Cli::parse_from(&args);
    init_logging(cli.verbose);

    let mut vcs = match GitCli::locate(cli.git.clone()) {
        Ok(v) => v,
        Err(e) => {
            report_error(&e);
            return Err(e);
        }
    };

    let request = AmendRequest {
        commit: cli.commit_id.clone(),
        message: cli.message.clone(),
    };

    match amend(&mut vcs, &request) {
        Ok(outcome) => {
            info!(
                rewritten = %outcome.rewritten,
                replayed = outcome.replayed,
                "amend complete"
            );
            println!("Successfully amended commit {}", outcome.original);
            Ok(0)
        }
        Err(e) => {
            report_error(&e);
            match &e {
                RewriteError::ReplayConflict { onto } | RewriteError::ReplayFailed { onto, .. } => {
                    report_conflict(&mut vcs, &cli, onto)
                }
                e if e.left_partial_state() => {
                    eprintln!(
                        "{}",
                        style("History was changed before the failure; inspect `git log` before retrying.")
                            .yellow()
                    );
                }
                _ => {}
            }
            Err(e)
        }
    }
}
