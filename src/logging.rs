use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::rules::RuleReport;

const LOG_DIR: &str = ".chairpatch";
const LOG_FILE: &str = "change_log.jsonl";
const MAX_ENTRIES: usize = 500;

#[derive(Debug, Serialize)]
struct ChangeLogEntry<'a> {
    timestamp: &'a str,
    command: &'a str,
    recipe: &'a str,
    path: &'a Path,
    action: &'a str,
    line_summary: &'a str,
    rules: &'a [RuleReport],
}

#[derive(Debug, Deserialize)]
pub struct StoredEntry {
    pub timestamp: String,
    pub command: String,
    pub recipe: String,
    pub path: String,
    pub action: String,
    pub line_summary: String,
    #[serde(default)]
    pub rules: Vec<RuleReport>,
}

#[derive(Debug, Clone, Copy)]
pub struct Change<'a> {
    pub command: &'a str,
    pub recipe: &'a str,
    pub path: &'a Path,
    pub action: &'a str,
    pub line_summary: &'a str,
    pub rules: &'a [RuleReport],
}

impl<'a> Change<'a> {
    pub fn with_action(self, action: &'a str) -> Self {
        Self { action, ..self }
    }
}

pub fn record_change(change: &Change<'_>) -> Result<()> {
    let log_path = ensure_log_file()?;
    append_entry(&log_path, change)
}

pub fn read_recent(tail: usize) -> Result<Vec<StoredEntry>> {
    read_entries(&PathBuf::from(LOG_DIR).join(LOG_FILE), tail)
}

fn append_entry(log_path: &Path, change: &Change<'_>) -> Result<()> {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".into());
    let entry = ChangeLogEntry {
        timestamp: &timestamp,
        command: change.command,
        recipe: change.recipe,
        path: change.path,
        action: change.action,
        line_summary: change.line_summary,
        rules: change.rules,
    };
    let json = serde_json::to_string(&entry)?;
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(log_path)
        .with_context(|| format!("opening {log_path:?}"))?;
    writeln!(file, "{json}")?;
    truncate_log(log_path)?;
    Ok(())
}

fn read_entries(log_path: &Path, tail: usize) -> Result<Vec<StoredEntry>> {
    if !log_path.exists() {
        return Ok(Vec::new());
    }
    let lines = read_lines(log_path)?;
    let start = lines.len().saturating_sub(tail);
    lines[start..]
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).with_context(|| format!("parsing log entry: {line}"))
        })
        .collect()
}

fn ensure_log_file() -> Result<PathBuf> {
    let dir = PathBuf::from(LOG_DIR);
    if !dir.exists() {
        fs::create_dir_all(&dir).with_context(|| format!("creating {dir:?}"))?;
    }
    Ok(dir.join(LOG_FILE))
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .with_context(|| format!("reading {path:?}"))?;
    let lines = BufReader::new(file).lines().collect::<Result<_, _>>()?;
    Ok(lines)
}

fn truncate_log(path: &Path) -> Result<()> {
    let lines = read_lines(path)?;
    if lines.len() <= MAX_ENTRIES {
        return Ok(());
    }
    let keep = &lines[lines.len() - MAX_ENTRIES..];
    fs::write(path, keep.join("\n") + "\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn change<'a>(path: &'a Path, rules: &'a [RuleReport]) -> Change<'a> {
        Change {
            command: "run",
            recipe: "plain-chairs",
            path,
            action: "applied",
            line_summary: "+0 -3",
            rules,
        }
    }

    #[test]
    fn entries_round_trip_with_rule_reports() {
        let temp = tempdir().expect("temp dir");
        let log = temp.path().join(LOG_FILE);
        let rules = vec![RuleReport {
            rule: "pattern-delete /x/".into(),
            matches: 0,
            note: None,
            drift: true,
        }];
        append_entry(&log, &change(Path::new("src/App.css"), &rules)).expect("append");

        let entries = read_entries(&log, 10).expect("read");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].recipe, "plain-chairs");
        assert_eq!(entries[0].path, "src/App.css");
        assert_eq!(entries[0].rules, rules);
    }

    #[test]
    fn log_is_truncated_to_max_entries() {
        let temp = tempdir().expect("temp dir");
        let log = temp.path().join(LOG_FILE);
        for _ in 0..MAX_ENTRIES + 5 {
            append_entry(&log, &change(Path::new("src/App.css"), &[])).expect("append");
        }
        assert_eq!(read_lines(&log).expect("lines").len(), MAX_ENTRIES);
        assert_eq!(read_entries(&log, 3).expect("tail").len(), 3);
    }

    #[test]
    fn missing_log_reads_as_empty() {
        let temp = tempdir().expect("temp dir");
        let entries = read_entries(&temp.path().join("absent.jsonl"), 20).expect("read");
        assert!(entries.is_empty());
    }
}
