//! Amend Orchestrator.
//!
//! Folds the staged changes into an earlier commit by committing them as a
//! `fixup!` commit, replaying the history after the commit's parent with
//! autosquash, and optionally substituting the amended commit's message.
//!
//! All checks that can refuse the operation run before the fixup commit is
//! created, so a refusal never changes the repository.

use crate::error::RewriteError;
use crate::vcs::{CommitId, LogEntry, LowerBound, Vcs};

use std::path::PathBuf;
use tracing::{debug, info};

/// What the user asked for.
#[derive(Debug, Clone)]
pub struct AmendRequest {
    /// Full or abbreviated id of the commit to amend.
    pub commit: String,
    /// Replacement message; `None` keeps the original one.
    pub message: Option<String>,
}

/// Result of a successful amend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmendOutcome {
    /// The commit as it was before the run.
    pub original: CommitId,
    /// The amended commit after replay (and message rewrite).
    pub rewritten: CommitId,
    /// Number of commits recreated, the amended one included.
    pub replayed: usize,
}

/// Everything established by the preconditions.
#[derive(Debug)]
struct Checked {
    git_dir: PathBuf,
    target: CommitId,
}

/// Finds the amended commit again once the replay has renumbered it.
///
/// The replay keeps the order of the non-fixup commits, so the amended commit
/// sits at the same index of the range it had before; its message is compared
/// too, so a history that reordered differently is caught instead of
/// rewriting the wrong commit.
#[derive(Debug, Clone)]
pub struct ReplayMap {
    original: CommitId,
    index: usize,
    message: String,
}

impl ReplayMap {
    /// Records where `target` sits in `before`, ignoring the `fixup` entry.
    pub fn capture(
        before: &[LogEntry],
        target: &CommitId,
        fixup: &CommitId,
        message: String,
    ) -> Result<ReplayMap, RewriteError> {
        let index = before
            .iter()
            .filter(|e| e.id != *fixup)
            .position(|e| e.id == *target)
            .ok_or_else(|| {
                RewriteError::ReplayMismatch(format!("{} is not in the replay range", target.short()))
            })?;

        Ok(ReplayMap {
            original: target.clone(),
            index,
            message,
        })
    }

    /// Returns the id the amended commit has in `after`.
    pub fn locate<V: Vcs>(&self, vcs: &mut V, after: &[LogEntry]) -> Result<CommitId, RewriteError> {
        let entry = after.get(self.index).ok_or_else(|| {
            RewriteError::ReplayMismatch(format!(
                "range has {} commits, expected {} at position {}",
                after.len(),
                self.original.short(),
                self.index + 1
            ))
        })?;

        let message = vcs.commit_message(&entry.id)?;
        if message != self.message {
            return Err(RewriteError::ReplayMismatch(format!(
                "commit {} at the position of {} has a different message",
                entry.id.short(),
                self.original.short()
            )));
        }
        Ok(entry.id.clone())
    }
}

/// Runs the preconditions in order; each one is a hard stop.
fn check<V: Vcs>(vcs: &mut V, request: &AmendRequest) -> Result<Checked, RewriteError> {
    let git_dir = vcs.git_dir()?;
    debug!(git_dir = %git_dir.display(), "inside repository");

    let target = vcs.resolve_commit(&request.commit)?;
    debug!(%target, "resolved commit");

    if !vcs.has_staged_changes()? {
        return Err(RewriteError::NoStagedChanges);
    }
    if vcs.has_unstaged_changes()? {
        return Err(RewriteError::UnstagedChanges);
    }
    if !vcs.is_ancestor_of_head(&target)? {
        return Err(RewriteError::NotAnAncestor(request.commit.clone()));
    }

    Ok(Checked { git_dir, target })
}

/// Amends `request.commit` with the staged changes.
///
/// # Errors
///
/// Precondition failures ([`RewriteError::NotARepository`],
/// [`RewriteError::UnknownRevision`], [`RewriteError::NoStagedChanges`],
/// [`RewriteError::UnstagedChanges`], [`RewriteError::NotAnAncestor`]) leave
/// the repository untouched. Later failures report partial state: see
/// [`RewriteError::left_partial_state`].
pub fn amend<V: Vcs>(vcs: &mut V, request: &AmendRequest) -> Result<AmendOutcome, RewriteError> {
    let Checked { git_dir, target } = check(vcs, request)?;

    let lower = match vcs.first_parent(&target)? {
        Some(parent) => LowerBound::Parent(parent),
        None => LowerBound::Root,
    };
    let original_message = vcs.commit_message(&target)?;

    let fixup = vcs.commit_fixup(&target)?;
    info!(%fixup, target = %target.short(), "created fixup commit");

    let before = vcs.list_range(&lower)?;
    let map = ReplayMap::capture(&before, &target, &fixup, original_message)?;
    info!(
        commits = before.len(),
        onto = %lower,
        git_dir = %git_dir.display(),
        "replaying with autosquash"
    );

    vcs.replay(&lower, &target, &fixup)?;

    let after = vcs.list_range(&lower)?;
    if after.len() + 1 != before.len() {
        return Err(RewriteError::ReplayMismatch(format!(
            "expected {} commits after squashing the fixup, found {}",
            before.len() - 1,
            after.len()
        )));
    }
    let mut rewritten = map.locate(vcs, &after)?;
    info!(%rewritten, "replay finished");

    if let Some(message) = &request.message {
        vcs.rewrite_message(&lower, &rewritten, message)?;
        let renamed = vcs.list_range(&lower)?;
        rewritten = renamed
            .get(map.index)
            .map(|e| e.id.clone())
            .ok_or_else(|| RewriteError::MessageRewrite(String::from("amended commit vanished")))?;
        info!(%rewritten, "message rewritten");
    }

    Ok(AmendOutcome {
        original: target,
        rewritten,
        replayed: after.len() - map.index,
    })
}

#[cfg(test)]
mod tests {
    use super::{AmendRequest, ReplayMap, amend};
    use crate::error::RewriteError;
    use crate::vcs::{CommitId, LogEntry, LowerBound, Vcs};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn id(c: char) -> CommitId {
        CommitId::parse(&c.to_string().repeat(40)).unwrap()
    }

    fn entry(c: char, subject: &str) -> LogEntry {
        LogEntry {
            id: id(c),
            subject: subject.to_string(),
        }
    }

    /// Scripted repository: A <- B <- C <- D, HEAD at D.
    ///
    /// Replaying squashes the fixup (`f`) and renames B, C, D to 2, 3, 4.
    struct MockVcs {
        in_repo: bool,
        staged: bool,
        unstaged: bool,
        conflict: bool,
        refused: bool,
        parents: HashMap<CommitId, Option<CommitId>>,
        messages: HashMap<CommitId, String>,
        history: Vec<LogEntry>,
        calls: Vec<&'static str>,
        rewritten_message: Option<(CommitId, String)>,
    }

    impl MockVcs {
        fn new() -> MockVcs {
            let mut parents = HashMap::new();
            parents.insert(id('a'), None);
            parents.insert(id('b'), Some(id('a')));
            parents.insert(id('c'), Some(id('b')));
            parents.insert(id('d'), Some(id('c')));

            let mut messages = HashMap::new();
            for (c, m) in [('a', "A\n"), ('b', "B\n"), ('c', "C\n"), ('d', "D\n")] {
                messages.insert(id(c), m.to_string());
            }

            MockVcs {
                in_repo: true,
                staged: true,
                unstaged: false,
                conflict: false,
                refused: false,
                parents,
                messages,
                history: vec![entry('a', "A"), entry('b', "B"), entry('c', "C"), entry('d', "D")],
                calls: Vec::new(),
                rewritten_message: None,
            }
        }

        fn mutated(&self) -> bool {
            self.calls
                .iter()
                .any(|c| matches!(*c, "commit_fixup" | "replay" | "rewrite_message"))
        }

        fn range(&self, lower: &LowerBound) -> Vec<LogEntry> {
            let start = match lower {
                LowerBound::Parent(p) => self.history.iter().position(|e| e.id == *p).unwrap() + 1,
                LowerBound::Root => 0,
            };
            self.history[start..].to_vec()
        }
    }

    impl Vcs for MockVcs {
        fn git_dir(&mut self) -> Result<PathBuf, RewriteError> {
            self.calls.push("git_dir");
            if self.in_repo {
                Ok(PathBuf::from("/repo/.git"))
            } else {
                Err(RewriteError::NotARepository(String::from("fatal")))
            }
        }

        fn resolve_commit(&mut self, rev: &str) -> Result<CommitId, RewriteError> {
            self.calls.push("resolve_commit");
            self.history
                .iter()
                .map(|e| e.id.clone())
                .chain(std::iter::once(id('e')))
                .find(|c| rev.len() >= 4 && c.matches_abbrev(rev))
                .ok_or_else(|| RewriteError::UnknownRevision(rev.to_string()))
        }

        fn has_staged_changes(&mut self) -> Result<bool, RewriteError> {
            self.calls.push("has_staged_changes");
            Ok(self.staged)
        }

        fn has_unstaged_changes(&mut self) -> Result<bool, RewriteError> {
            self.calls.push("has_unstaged_changes");
            Ok(self.unstaged)
        }

        fn is_ancestor_of_head(&mut self, commit: &CommitId) -> Result<bool, RewriteError> {
            self.calls.push("is_ancestor_of_head");
            Ok(self.history.iter().any(|e| e.id == *commit))
        }

        fn first_parent(&mut self, commit: &CommitId) -> Result<Option<CommitId>, RewriteError> {
            self.calls.push("first_parent");
            Ok(self.parents.get(commit).cloned().flatten())
        }

        fn commit_message(&mut self, commit: &CommitId) -> Result<String, RewriteError> {
            self.calls.push("commit_message");
            self.messages
                .get(commit)
                .cloned()
                .ok_or_else(|| RewriteError::UnknownRevision(commit.to_string()))
        }

        fn commit_fixup(&mut self, target: &CommitId) -> Result<CommitId, RewriteError> {
            self.calls.push("commit_fixup");
            self.history.push(entry('f', &format!("fixup! {}", target)));
            self.messages.insert(id('f'), format!("fixup! {}\n", target));
            Ok(id('f'))
        }

        fn list_range(&mut self, lower: &LowerBound) -> Result<Vec<LogEntry>, RewriteError> {
            self.calls.push("list_range");
            Ok(self.range(lower))
        }

        fn replay(
            &mut self,
            lower: &LowerBound,
            _target: &CommitId,
            fixup: &CommitId,
        ) -> Result<(), RewriteError> {
            self.calls.push("replay");
            if self.conflict {
                return Err(RewriteError::ReplayConflict {
                    onto: lower.to_string(),
                });
            }
            if self.refused {
                return Err(RewriteError::ReplayFailed {
                    onto: lower.to_string(),
                    exit_code: 1,
                });
            }
            let start = self.history.len() - self.range(lower).len();
            self.history.retain(|e| e.id != *fixup);
            for (n, e) in self.history.iter_mut().enumerate().skip(start) {
                let renamed = id(char::from_digit(n as u32 + 1, 10).unwrap());
                let message = self.messages[&e.id].clone();
                self.messages.insert(renamed.clone(), message);
                e.id = renamed;
            }
            Ok(())
        }

        fn rewrite_message(
            &mut self,
            _lower: &LowerBound,
            target: &CommitId,
            message: &str,
        ) -> Result<(), RewriteError> {
            self.calls.push("rewrite_message");
            self.rewritten_message = Some((target.clone(), message.to_string()));
            for e in self.history.iter_mut() {
                if e.id == *target {
                    e.id = id('9');
                }
            }
            self.messages.insert(id('9'), message.to_string());
            Ok(())
        }
    }

    fn request(commit: &str, message: Option<&str>) -> AmendRequest {
        AmendRequest {
            commit: commit.to_string(),
            message: message.map(str::to_string),
        }
    }

    #[test]
    fn amends_middle_commit_and_replays_descendants() {
        let mut vcs = MockVcs::new();
        let outcome = amend(&mut vcs, &request("bbbbbbb", None)).unwrap();

        assert_eq!(outcome.original, id('b'));
        assert_eq!(outcome.rewritten, id('2'));
        assert_eq!(outcome.replayed, 3);
        assert_eq!(
            vcs.history.iter().map(|e| e.id.clone()).collect::<Vec<_>>(),
            vec![id('a'), id('2'), id('3'), id('4')]
        );
        assert!(vcs.rewritten_message.is_none());
    }

    #[test]
    fn preconditions_run_in_order_before_any_mutation() {
        let mut vcs = MockVcs::new();
        amend(&mut vcs, &request("bbbbbbb", None)).unwrap();
        assert_eq!(
            &vcs.calls[..5],
            &[
                "git_dir",
                "resolve_commit",
                "has_staged_changes",
                "has_unstaged_changes",
                "is_ancestor_of_head"
            ]
        );
        let fixup_at = vcs.calls.iter().position(|c| *c == "commit_fixup").unwrap();
        let replay_at = vcs.calls.iter().position(|c| *c == "replay").unwrap();
        assert!(fixup_at < replay_at);
    }

    #[test]
    fn outside_repository_is_refused() {
        let mut vcs = MockVcs::new();
        vcs.in_repo = false;
        let err = amend(&mut vcs, &request("bbbbbbb", None)).unwrap_err();
        assert!(matches!(err, RewriteError::NotARepository(_)));
        assert_eq!(vcs.calls, vec!["git_dir"]);
    }

    #[test]
    fn unknown_revision_is_refused() {
        let mut vcs = MockVcs::new();
        let err = amend(&mut vcs, &request("0123456", None)).unwrap_err();
        assert!(matches!(err, RewriteError::UnknownRevision(ref r) if r == "0123456"));
        assert!(!vcs.mutated());
    }

    #[test]
    fn no_staged_changes_is_refused_without_mutation() {
        let mut vcs = MockVcs::new();
        vcs.staged = false;
        let err = amend(&mut vcs, &request("bbbbbbb", None)).unwrap_err();
        assert!(matches!(err, RewriteError::NoStagedChanges));
        assert!(!vcs.mutated());
        assert_eq!(vcs.history.len(), 4);
    }

    #[test]
    fn unstaged_changes_are_refused_without_mutation() {
        let mut vcs = MockVcs::new();
        vcs.unstaged = true;
        let err = amend(&mut vcs, &request("bbbbbbb", None)).unwrap_err();
        assert!(matches!(err, RewriteError::UnstagedChanges));
        assert!(!vcs.mutated());
    }

    #[test]
    fn non_ancestor_is_refused_without_mutation() {
        let mut vcs = MockVcs::new();
        let err = amend(&mut vcs, &request("eeeeeee", None)).unwrap_err();
        assert!(matches!(err, RewriteError::NotAnAncestor(ref c) if c == "eeeeeee"));
        assert!(!vcs.mutated());
    }

    #[test]
    fn conflict_leaves_only_the_fixup_commit() {
        let mut vcs = MockVcs::new();
        vcs.conflict = true;
        let err = amend(&mut vcs, &request("bbbbbbb", Some("New"))).unwrap_err();

        assert!(matches!(err, RewriteError::ReplayConflict { .. }));
        assert!(err.left_partial_state());
        assert_eq!(vcs.history.len(), 5);
        assert_eq!(vcs.history.last().unwrap().id, id('f'));
        assert!(!vcs.calls.contains(&"rewrite_message"));
    }

    #[test]
    fn refused_replay_stops_before_verification() {
        let mut vcs = MockVcs::new();
        vcs.refused = true;
        let err = amend(&mut vcs, &request("ccccccc", Some("New"))).unwrap_err();

        assert!(matches!(err, RewriteError::ReplayFailed { exit_code: 1, .. }));
        assert!(err.left_partial_state());
        assert_eq!(vcs.history.last().unwrap().id, id('f'));
        assert_eq!(vcs.calls.last(), Some(&"replay"));
    }

    #[test]
    fn message_rewrite_targets_the_renumbered_commit() {
        let mut vcs = MockVcs::new();
        let outcome = amend(&mut vcs, &request("ccccccc", Some("Better subject"))).unwrap();

        let (target, message) = vcs.rewritten_message.clone().unwrap();
        assert_eq!(target, id('3'));
        assert_eq!(message, "Better subject");
        assert_eq!(outcome.original, id('c'));
        assert_eq!(outcome.rewritten, id('9'));
        assert_eq!(outcome.replayed, 2);
    }

    #[test]
    fn root_commit_replays_from_root() {
        let mut vcs = MockVcs::new();
        let outcome = amend(&mut vcs, &request("aaaaaaa", None)).unwrap();
        assert_eq!(outcome.rewritten, id('1'));
        assert_eq!(outcome.replayed, 4);
    }

    #[test]
    fn replay_map_ignores_the_fixup_entry() {
        let before = vec![entry('b', "B"), entry('c', "C"), entry('f', "fixup! b")];
        let map = ReplayMap::capture(&before, &id('c'), &id('f'), String::from("C\n")).unwrap();
        assert_eq!(map.index, 1);
    }

    #[test]
    fn replay_map_rejects_a_different_commit_at_the_position() {
        let mut vcs = MockVcs::new();
        let before = vec![entry('b', "B"), entry('f', "fixup! b")];
        let map = ReplayMap::capture(&before, &id('b'), &id('f'), String::from("B\n")).unwrap();

        let after = vec![entry('c', "C")];
        let err = map.locate(&mut vcs, &after).unwrap_err();
        assert!(matches!(err, RewriteError::ReplayMismatch(_)));
    }

    #[test]
    fn replay_map_requires_target_in_range() {
        let before = vec![entry('c', "C"), entry('f', "fixup! b")];
        let err = ReplayMap::capture(&before, &id('b'), &id('f'), String::new()).unwrap_err();
        assert!(matches!(err, RewriteError::ReplayMismatch(_)));
    }
}
