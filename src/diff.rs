use std::path::Path;

use anyhow::Result;
use similar::{ChangeTag, TextDiff};

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy)]
pub struct DiffDisplayConfig {
    pub context: usize,
    pub colorize: bool,
}

pub fn display_diff(old: &str, new: &str, config: &DiffDisplayConfig) -> Result<()> {
    let diff = TextDiff::configure()
        .algorithm(similar::Algorithm::Myers)
        .diff_lines(old, new);

    for (idx, group) in diff.grouped_ops(config.context).iter().enumerate() {
        if idx > 0 {
            println!("{}", paint("...", DIM, config.colorize));
        }
        for op in group {
            for change in diff.iter_changes(op) {
                let (sign, color) = match change.tag() {
                    ChangeTag::Delete => ("- ", RED),
                    ChangeTag::Insert => ("+ ", GREEN),
                    ChangeTag::Equal => ("  ", DIM),
                };
                let line = format!("{sign}{}", change.value().trim_end_matches('\n'));
                println!("{}", paint(&line, color, config.colorize));
            }
        }
    }

    Ok(())
}

/// Short `+added -removed` line count for logs and summaries.
pub fn summarize_lines(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let (mut added, mut removed) = (0usize, 0usize);
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => added += 1,
            ChangeTag::Delete => removed += 1,
            ChangeTag::Equal => {}
        }
    }
    format!("+{added} -{removed}")
}

pub fn unified_diff(path: &Path, old: &str, new: &str, context: usize) -> String {
    let label = path.display().to_string();
    let diff = TextDiff::from_lines(old, new);
    diff.unified_diff()
        .context_radius(context)
        .header(&format!("a/{label}"), &format!("b/{label}"))
        .to_string()
}

fn paint(text: &str, color: &str, colorize: bool) -> String {
    if colorize {
        format!("{color}{text}{RESET}")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_added_and_removed_lines() {
        let old = ".a {}\n.center-action-area {\n}\n";
        let new = ".a {}\n.stand-up-btn-center {\n  top: 0;\n}\n";
        assert_eq!(summarize_lines(old, new), "+2 -1");
        assert_eq!(summarize_lines(old, old), "+0 -0");
    }

    #[test]
    fn unified_diff_names_the_file() {
        let patch = unified_diff(Path::new("src/App.css"), "a\n", "b\n", 3);
        assert!(patch.starts_with("--- a/src/App.css\n+++ b/src/App.css\n"));
        assert!(patch.contains("-a\n"));
        assert!(patch.contains("+b\n"));
    }

    #[test]
    fn paint_only_wraps_when_colorizing() {
        assert_eq!(paint("x", RED, false), "x");
        assert_eq!(paint("x", RED, true), "\x1b[31mx\x1b[0m");
    }
}
