//! Message filter run by `git filter-branch --msg-filter`.
//!
//! filter-branch pipes every commit message in the range through the filter
//! with `GIT_COMMIT` naming the commit being rewritten. Exactly one commit,
//! named by [`TARGET_ENV`], gets the replacement message; the rest pass
//! through byte for byte.

use crate::git::{MESSAGE_FILE_ENV, TARGET_ENV};

use std::{
    env, fs,
    io::{self, Read, Write},
    path::Path,
};

/// Filters stdin to stdout for the commit named by `GIT_COMMIT`.
pub fn run() -> Result<(), String> {
    let current = env::var("GIT_COMMIT").map_err(|_| String::from("GIT_COMMIT is not set"))?;
    let target = env::var(TARGET_ENV).map_err(|_| format!("{} is not set", TARGET_ENV))?;
    let message_file =
        env::var_os(MESSAGE_FILE_ENV).ok_or_else(|| format!("{} is not set", MESSAGE_FILE_ENV))?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    filter(
        &current,
        &target,
        Path::new(&message_file),
        &mut stdin.lock(),
        &mut stdout.lock(),
    )
}

/// Writes the replacement message when `current` is `target`, otherwise
/// copies `input` unchanged.
///
/// The original message is always drained so the writing side of the pipe
/// never sees a closed reader.
pub fn filter<R: Read, W: Write>(
    current: &str,
    target: &str,
    message_file: &Path,
    input: &mut R,
    output: &mut W,
) -> Result<(), String> {
    if !current.trim().eq_ignore_ascii_case(target.trim()) {
        io::copy(input, output).map_err(|e| format!("copy failed: {}", e))?;
        return output.flush().map_err(|e| format!("flush failed: {}", e));
    }

    io::copy(input, &mut io::sink()).map_err(|e| format!("read failed: {}", e))?;
    let message = fs::read(message_file).map_err(|e| format!("read failed: {}", e))?;
    output
        .write_all(&message)
        .and_then(|_| output.flush())
        .map_err(|e| format!("write failed: {}", e))
}
