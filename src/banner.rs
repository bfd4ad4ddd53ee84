use console::{measure_text_width, style};
use std::iter;

/// What the conflict report needs to know about the stopped replay.
pub struct ConflictReport<'a> {
    /// The commit the user asked to amend.
    pub target: &'a str,
    /// Where the replay was rebasing onto (abbreviated id or `root`).
    pub onto: &'a str,
    /// Whether git still has a rebase in progress.
    pub rebase_active: bool,
    /// Whether a replacement message was requested and therefore not applied.
    pub message_pending: bool,
}

/// Writes the framed conflict report to stderr, surrounded by blank lines.
///
/// # Examples
///
/// ```no_run
/// use git_rewrite::banner::{ConflictReport, print_conflict_report};
///
/// print_conflict_report(&ConflictReport {
///     target: "1a2b3c4",
///     onto: "0f9e8d7",
///     rebase_active: true,
///     message_pending: false,
/// });
/// ```
pub fn print_conflict_report(report: &ConflictReport<'_>) {
    let framed = frame(&report_lines(report));
    eprintln!("\n{}\n", framed.join("\n"));
}

/// Wraps `lines` in a double-line box, one output row per input line plus
/// the top and bottom edges.
///
/// Width comes from the widest visible text, so ANSI sequences inside a line
/// do not throw the right edge off. Edges are styled on their own.
fn frame(lines: &[String]) -> Vec<String> {
    let inner = lines.iter().map(|l| measure_text_width(l)).max().unwrap_or(0);
    let edge = |s: String| style(s).red().bold().to_string();
    let rule = "═".repeat(inner + 2);

    let mut rows = Vec::with_capacity(lines.len() + 2);
    rows.push(edge(format!("╔{rule}╗")));
    rows.extend(lines.iter().map(|line| {
        let fill = " ".repeat(inner - measure_text_width(line));
        format!("{} {line}{fill} {}", edge("║".into()), edge("║".into()))
    }));
    rows.push(edge(format!("╚{rule}╝")));
    rows
}

/// Builds the report text, in display order: title, state, next steps.
///
/// Some lines carry ANSI styling; measure them with
/// `console::measure_text_width`, not `str::len()`.
fn report_lines(report: &ConflictReport<'_>) -> Vec<String> {
    let top = [
        style("Replay did not finish: a fixup commit was added")
            .yellow()
            .bold()
            .to_string(),
        String::new(),
        format!(
            "A fixup commit for {} was created before the replay onto {}.",
            report.target, report.onto
        ),
    ]
    .into_iter();

    let steps = if report.rebase_active {
        vec![
            String::from("git stopped with a rebase in progress. Either:"),
            String::from("  1) resolve the conflicts, `git add` them, then `git rebase --continue`"),
            String::from("  2) or run `git rebase --abort` (the fixup commit stays at the tip)"),
        ]
    } else {
        vec![
            String::from("No rebase is in progress; the fixup commit is at the tip."),
            String::from("Drop it with `git reset --soft HEAD~1` to get your staged changes back."),
        ]
    }
    .into_iter();

    let pending = report.message_pending.then(|| {
        style("The requested commit message was not applied.")
            .cyan()
            .to_string()
    });

    top.chain(steps)
        .chain(pending.into_iter().flat_map(|l| iter::once(String::new()).chain(iter::once(l))))
        .collect()
}
