use crate::git::{FIXUP_ENV, TARGET_ENV};

use std::{
    env,
    fs::{File, read_to_string},
    io::Write,
    path::Path,
};

/// Todo commands that take a commit as argument, in long and abbreviated form.
const COMMIT_COMMANDS: &[&str] = &[
    "pick", "p", "reword", "r", "edit", "e", "squash", "s", "fixup", "f", "drop", "d",
];

/// Entry point run by git as `GIT_SEQUENCE_EDITOR` during the replay.
///
/// Reads the amended commit and the fixup commit from the environment and
/// makes sure the todo file squashes the latter into the former.
///
/// # Returns
///
/// * `Ok(())` on success.
/// * `Err(String)` if the file path or an id is missing, either commit is
///   absent from the todo list, or an I/O operation fails. git aborts the
///   rebase when the editor exits non-zero.
pub fn run(todo_path: Option<&str>) -> Result<(), String> {
    let path = match todo_path {
        Some(p) => Path::new(p),
        None => return Err(String::from("missing todo file path")),
    };
    let target = env::var(TARGET_ENV).map_err(|_| format!("{} is not set", TARGET_ENV))?;
    let fixup = env::var(FIXUP_ENV).map_err(|_| format!("{} is not set", FIXUP_ENV))?;

    rewrite(path, &target, &fixup)
}

/// Reads the todo file at `path`, moves the fixup line under the target and
/// writes the result back.
pub fn rewrite(path: &Path, target: &str, fixup: &str) -> Result<(), String> {
    let body = match read_to_string(path) {
        Ok(content) => content,
        Err(e) => return Err(format!("read failed: {}", e)),
    };

    let transformed = arrange(&body, target, fixup)?;

    let mut file = match File::create(path) {
        Ok(f) => f,
        Err(e) => return Err(format!("create failed: {}", e)),
    };

    match file.write_all(transformed.as_bytes()) {
        Ok(_) => Ok(()),
        Err(e) => Err(format!("write failed: {}", e)),
    }
}

/// A todo line that names a commit.
struct Step<'a> {
    indent: &'a str,
    command: &'a str,
    /// Everything after the command word, e.g. `-C abc123 subject`.
    rest: &'a str,
    commit: &'a str,
}

/// Splits a todo line into its parts, or `None` for comments, blank lines
/// and commands without a commit argument (`exec`, `label`, `update-ref`...).
fn parse_step(line: &str) -> Option<Step<'_>> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return None;
    }

    let indent = &line[..line.len() - trimmed.len()];
    let (command, rest) = trimmed.split_once(char::is_whitespace)?;
    if !COMMIT_COMMANDS.contains(&command) {
        return None;
    }

    let rest = rest.trim_start();
    let commit = rest.split_whitespace().find(|w| !w.starts_with('-'))?;
    Some(Step {
        indent,
        command,
        rest,
        commit,
    })
}

fn is_squash(command: &str) -> bool {
    matches!(command, "fixup" | "f" | "squash" | "s")
}

fn names(full: &str, abbrev: &str) -> bool {
    abbrev.len() >= 4
        && abbrev.len() <= full.len()
        && full.to_ascii_lowercase().starts_with(&abbrev.to_ascii_lowercase())
}

fn find(lines: &[String], full: &str) -> Option<usize> {
    lines
        .iter()
        .position(|l| parse_step(l).is_some_and(|s| names(full, s.commit)))
}

/// Returns `body` rearranged so the `fixup` commit is a `fixup` step sitting
/// in the run of squash steps right after the `target` step.
///
/// Lines already in that shape, as produced by git's own autosquash, are
/// returned unchanged.
fn arrange(body: &str, target: &str, fixup: &str) -> Result<String, String> {
    let mut lines: Vec<String> = body.lines().map(str::to_string).collect();

    let target_idx = find(&lines, target)
        .ok_or_else(|| format!("commit {} not found in todo list", target))?;
    let fixup_idx = find(&lines, fixup)
        .ok_or_else(|| format!("fixup commit {} not found in todo list", fixup))?;

    let in_place = fixup_idx > target_idx
        && lines[target_idx + 1..=fixup_idx]
            .iter()
            .all(|l| parse_step(l).is_some_and(|s| is_squash(s.command)));

    if !in_place {
        let moved = lines.remove(fixup_idx);
        let step = parse_step(&moved).ok_or_else(|| String::from("malformed fixup line"))?;
        let replacement = format!("{}fixup {}", step.indent, strip_options(step.rest));

        let target_idx = find(&lines, target)
            .ok_or_else(|| format!("commit {} not found in todo list", target))?;
        let mut insert_at = target_idx + 1;
        while insert_at < lines.len()
            && parse_step(&lines[insert_at]).is_some_and(|s| is_squash(s.command))
        {
            insert_at += 1;
        }
        lines.insert(insert_at, replacement);
    }

    Ok(lines.join("\n") + "\n")
}

/// Drops leading `-C`/`-c` style flags so the moved step is a plain fixup.
fn strip_options(rest: &str) -> &str {
    let mut rest = rest;
    while let Some(stripped) = rest.strip_prefix('-') {
        rest = match stripped.split_once(char::is_whitespace) {
            Some((_, tail)) => tail.trim_start(),
            None => "",
        };
    }
    rest
}
