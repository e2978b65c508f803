use anyhow::Result;

use crate::encoding::EncodingStrategy;
use crate::files::{self, FileEntry, LoadedText};
use crate::rules::{Rule, RuleReport, apply_rules};

pub struct TransformContext<'a> {
    pub entry: &'a FileEntry,
    pub encoding: &'a EncodingStrategy,
}

pub struct TransformResult {
    pub loaded: LoadedText,
    pub new_text: String,
    pub reports: Vec<RuleReport>,
}

impl TransformResult {
    pub fn is_noop(&self) -> bool {
        self.loaded.text == self.new_text
    }

    pub fn has_drift(&self) -> bool {
        self.reports.iter().any(|report| report.drift)
    }
}

pub fn run_transform(ctx: &TransformContext<'_>, rules: &[Rule]) -> Result<TransformResult> {
    let loaded = files::load(ctx.entry, ctx.encoding)?;
    let (new_text, reports) = apply_rules(&loaded.text, rules)?;
    Ok(TransformResult {
        loaded,
        new_text,
        reports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    #[test]
    fn transform_reports_drift_without_touching_the_file() {
        let temp = tempdir().expect("temp dir");
        fs::write(temp.path().join("App.css"), ".chair {}\r\n").expect("write css");
        let entry = files::resolve_target(temp.path(), Path::new("App.css")).expect("resolve");
        let encoding = EncodingStrategy::new(None).expect("encoding");
        let ctx = TransformContext {
            entry: &entry,
            encoding: &encoding,
        };
        let rules = vec![Rule::PatternDelete {
            pattern: r"\.chair\.safe\s*\{[^}]*\}".into(),
            dot_all: false,
        }];

        let result = run_transform(&ctx, &rules).expect("transform");
        assert!(result.is_noop());
        assert!(result.has_drift());
        assert_eq!(result.loaded.text, ".chair {}\n");
        assert_eq!(
            fs::read_to_string(temp.path().join("App.css")).unwrap(),
            ".chair {}\r\n"
        );
    }
}
