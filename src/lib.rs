//! # git-rewrite
//!
//! A CLI tool to amend an earlier commit with the currently staged changes.
//!
//! This crate:
//! - Commits the staged changes as a `fixup!` commit for the target
//! - Replays the history after the target's parent with `git rebase -i --autosquash`
//! - Optionally replaces the amended commit's message via `git filter-branch`
//!
//! ## Usage
//!
//! ```bash
//! # Fold the staged changes into abc1234
//! git-rewrite abc1234
//!
//! # Same, and give the amended commit a new message
//! git-rewrite abc1234 -m "Parse config lazily"
//! ```
//!
//! ## Modules
//!
//! - [`cli`] - Command-line interface and main entry point
//! - [`amend`] - The amend procedure and its preconditions
//! - [`vcs`] - Operations the procedure needs from version control
//! - [`git`] - `git` command wrappers
//! - [`sequence_editor`] - Rebase todo fixup placement
//! - [`msg_filter`] - Commit message substitution for `filter-branch`
//! - [`banner`] - Report shown when the replay stops
//! - [`error`] - Failure kinds and exit codes

pub mod amend;
pub mod banner;
pub mod cli;
pub mod error;
pub mod git;
pub mod msg_filter;
pub mod sequence_editor;
pub mod vcs;
