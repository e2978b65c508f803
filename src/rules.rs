//! Text rewrite rules applied to a whole file's content.
//!
//! Every rule reports how many times it matched so a caller can tell when a
//! rule no longer lines up with the file it is pointed at.

use anyhow::{Result, anyhow, bail};
use regex::{Captures, RegexBuilder};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
    /// Drops every line from one containing a marker through the next line
    /// containing `}`.
    BlockSkip { markers: Vec<String> },
    /// Deletes every non-overlapping match of `pattern`.
    PatternDelete {
        pattern: String,
        #[serde(default)]
        dot_all: bool,
    },
    /// Inserts `text` right after the first occurrence of `anchor`.
    InsertAfter { anchor: String, text: String },
    /// Appends `block` to the end of the content, every time.
    Append { block: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleReport {
    pub rule: String,
    pub matches: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub drift: bool,
}

impl RuleReport {
    fn new(rule: String, matches: usize) -> Self {
        Self {
            rule,
            matches,
            note: None,
            drift: matches == 0,
        }
    }

    fn with_note(mut self, note: String) -> Self {
        self.note = Some(note);
        self.drift = true;
        self
    }
}

#[derive(Debug)]
pub struct RuleOutcome {
    pub text: String,
    pub report: RuleReport,
}

impl Rule {
    pub fn label(&self) -> String {
        match self {
            Rule::BlockSkip { markers } => format!("block-skip [{}]", markers.join(", ")),
            Rule::PatternDelete { pattern, dot_all } => {
                let flag = if *dot_all { " (dot-all)" } else { "" };
                format!("pattern-delete /{}/{flag}", shorten(pattern, 60))
            }
            Rule::InsertAfter { anchor, text } => format!(
                "insert-after \"{}\" (+{} chars)",
                shorten(anchor, 40),
                text.chars().count()
            ),
            Rule::Append { block } => format!("append ({} chars)", block.chars().count()),
        }
    }

    /// Rejects rules that would match everywhere or never compile.
    pub fn validate(&self) -> Result<()> {
        match self {
            Rule::BlockSkip { markers } => {
                if markers.is_empty() {
                    bail!("block-skip rule needs at least one marker");
                }
                if markers.iter().any(|marker| marker.is_empty()) {
                    bail!("block-skip markers cannot be empty");
                }
            }
            Rule::PatternDelete { pattern, dot_all } => {
                build_regex(pattern, *dot_all)?;
            }
            Rule::InsertAfter { anchor, .. } => {
                if anchor.is_empty() {
                    bail!("insert-after anchor cannot be empty");
                }
            }
            Rule::Append { .. } => {}
        }
        Ok(())
    }

    pub fn apply(&self, text: &str) -> Result<RuleOutcome> {
        // delete_pattern compiles and checks its own regex.
        if !matches!(self, Rule::PatternDelete { .. }) {
            self.validate()?;
        }
        let label = self.label();
        let outcome = match self {
            Rule::BlockSkip { markers } => {
                let skipped = skip_blocks(text, markers);
                let mut report = RuleReport::new(label, skipped.regions);
                if let Some(dropped) = skipped.unterminated {
                    report = report.with_note(format!(
                        "unterminated block; dropped {dropped} trailing line(s)"
                    ));
                }
                RuleOutcome {
                    text: skipped.text,
                    report,
                }
            }
            Rule::PatternDelete { pattern, dot_all } => {
                let (text, matches) = delete_pattern(text, pattern, *dot_all)?;
                RuleOutcome {
                    text,
                    report: RuleReport::new(label, matches),
                }
            }
            Rule::InsertAfter {
                anchor,
                text: inserted,
            } => {
                let (text, matches) = insert_after(text, anchor, inserted);
                RuleOutcome {
                    text,
                    report: RuleReport::new(label, matches),
                }
            }
            Rule::Append { block } => {
                let already_present = !block.is_empty() && text.contains(block.as_str());
                let mut report = RuleReport::new(label, 1);
                if already_present {
                    report = report.with_note("block was already present; appended again".into());
                }
                RuleOutcome {
                    text: append(text, block),
                    report,
                }
            }
        };
        Ok(outcome)
    }
}

/// Runs `rules` in order, feeding each rule the previous rule's output.
pub fn apply_rules(text: &str, rules: &[Rule]) -> Result<(String, Vec<RuleReport>)> {
    let mut current = text.to_string();
    let mut reports = Vec::with_capacity(rules.len());
    for rule in rules {
        let outcome = rule.apply(&current)?;
        current = outcome.text;
        reports.push(outcome.report);
    }
    Ok((current, reports))
}

#[derive(Debug, PartialEq, Eq)]
pub struct SkipOutcome {
    pub text: String,
    pub regions: usize,
    /// Lines dropped after the last marker when no closing brace followed.
    pub unterminated: Option<usize>,
}

pub fn skip_blocks(text: &str, markers: &[String]) -> SkipOutcome {
    let mut kept = String::with_capacity(text.len());
    let mut skipping = false;
    let mut regions = 0usize;
    let mut dropped_in_region = 0usize;

    for line in text.split_inclusive('\n') {
        // The marker check runs first, so `.foo { }` on one line keeps
        // skipping until the next line with a brace.
        if markers.iter().any(|marker| line.contains(marker.as_str())) {
            if !skipping {
                regions += 1;
                dropped_in_region = 0;
            }
            skipping = true;
            dropped_in_region += 1;
            continue;
        }
        if skipping {
            dropped_in_region += 1;
            if line.contains('}') {
                skipping = false;
            }
            continue;
        }
        kept.push_str(line);
    }

    SkipOutcome {
        text: kept,
        regions,
        unterminated: skipping.then_some(dropped_in_region),
    }
}

pub fn delete_pattern(text: &str, pattern: &str, dot_all: bool) -> Result<(String, usize)> {
    let regex = build_regex(pattern, dot_all)?;
    let mut matches = 0usize;
    let out = regex
        .replace_all(text, |_: &Captures<'_>| {
            matches += 1;
            ""
        })
        .into_owned();
    Ok((out, matches))
}

pub fn insert_after(text: &str, anchor: &str, inserted: &str) -> (String, usize) {
    if anchor.is_empty() || !text.contains(anchor) {
        return (text.to_string(), 0);
    }
    (text.replacen(anchor, &format!("{anchor}{inserted}"), 1), 1)
}

pub fn append(text: &str, block: &str) -> String {
    let mut out = String::with_capacity(text.len() + block.len());
    out.push_str(text);
    out.push_str(block);
    out
}

fn build_regex(pattern: &str, dot_all: bool) -> Result<regex::Regex> {
    RegexBuilder::new(pattern)
        .dot_matches_new_line(dot_all)
        .build()
        .map_err(|err| anyhow!("invalid pattern '{pattern}': {err}"))
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}...")
}
