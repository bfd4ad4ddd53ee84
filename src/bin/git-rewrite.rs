/// Entry point for the `git-rewrite` binary.
///
/// Delegates to the CLI entry function and exits with the returned code, or
/// with the failure's stable exit code when the amend was refused or failed.
fn main() {
    match git_rewrite::cli::entry() {
        Ok(code) => std::process::exit(code),
        Err(e) => std::process::exit(e.exit_code()),
    }
}
