use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::recipes::Recipe;

/// Loads a recipe from a YAML plan, or JSON when the extension says so.
pub fn load_plan(path: &Path) -> Result<Recipe> {
    let data = fs::read(path).with_context(|| format!("reading plan {}", path.display()))?;
    let recipe: Recipe = if is_json(path) {
        serde_json::from_slice(&data)
            .with_context(|| format!("parsing JSON plan {}", path.display()))?
    } else {
        serde_yaml::from_slice(&data)
            .with_context(|| format!("parsing YAML plan {}", path.display()))?
    };
    recipe
        .validate()
        .with_context(|| format!("validating plan {}", path.display()))?;
    Ok(recipe)
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rule;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn yaml_plan_parses_every_rule_kind() {
        let temp = tempdir().expect("temp dir");
        let plan_path = temp.path().join("plan.yaml");
        fs::write(
            &plan_path,
            r#"
name: tidy-board
description: custom cleanup
root: /srv/game
files:
  - path: src/App.css
    rules:
      - kind: block_skip
        markers: [".center-action-area"]
      - kind: pattern_delete
        pattern: '\.chair\.safe\s*\{[^}]*\}'
      - kind: append
        block: ".done {}\n"
  - path: src/App.jsx
    rules:
      - kind: insert_after
        anchor: "<main>"
        text: "<Banner />"
      - kind: pattern_delete
        pattern: "a.*b"
        dot_all: true
"#,
        )
        .expect("write plan");

        let recipe = load_plan(&plan_path).expect("plan loads");
        assert_eq!(recipe.name, "tidy-board");
        assert_eq!(recipe.root, Some(PathBuf::from("/srv/game")));
        assert_eq!(recipe.edits.len(), 2);
        assert_eq!(recipe.rule_count(), 5);
        assert_eq!(
            recipe.edits[0].rules[0],
            Rule::BlockSkip {
                markers: vec![".center-action-area".into()]
            }
        );
        assert_eq!(
            recipe.edits[1].rules[1],
            Rule::PatternDelete {
                pattern: "a.*b".into(),
                dot_all: true
            }
        );
    }

    #[test]
    fn json_plan_is_selected_by_extension() {
        let temp = tempdir().expect("temp dir");
        let plan_path = temp.path().join("plan.JSON");
        fs::write(
            &plan_path,
            r#"{"name":"j","files":[{"path":"a.css","rules":[{"kind":"append","block":"x"}]}]}"#,
        )
        .expect("write plan");

        let recipe = load_plan(&plan_path).expect("plan loads");
        assert_eq!(recipe.name, "j");
        assert!(recipe.description.is_empty());
        assert!(recipe.root.is_none());
    }

    #[test]
    fn invalid_rules_fail_validation() {
        let temp = tempdir().expect("temp dir");
        let plan_path = temp.path().join("plan.yml");
        fs::write(
            &plan_path,
            "name: broken\nfiles:\n  - path: a.css\n    rules:\n      - kind: pattern_delete\n        pattern: '(oops'\n",
        )
        .expect("write plan");

        let err = load_plan(&plan_path).unwrap_err();
        assert!(format!("{err:#}").contains("invalid pattern"));
    }

    #[test]
    fn unknown_rule_kind_is_a_parse_error() {
        let temp = tempdir().expect("temp dir");
        let plan_path = temp.path().join("plan.yaml");
        fs::write(
            &plan_path,
            "name: odd\nfiles:\n  - path: a.css\n    rules:\n      - kind: explode\n",
        )
        .expect("write plan");

        assert!(load_plan(&plan_path).is_err());
    }
}
