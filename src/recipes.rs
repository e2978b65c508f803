//! Built-in patch recipes for the electric chair game front-end.
//!
//! Each recipe assumes the ones before it have already landed, so they are
//! meant to be run in the order [`builtins`] lists them.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Result, bail};
use serde::Deserialize;

use crate::rules::Rule;

/// Project root the recipes were written against.
pub const DEFAULT_ROOT: &str = r"d:\電気椅子ゲーム";

const APP_JSX: &str = "src/App.jsx";
const APP_CSS: &str = "src/App.css";

const STANDING_BUTTON_PATTERN: &str = r"\{/\* Center Standing Button \*/\}.*?\{gameState\.currentPhase === 'FINALIZED' && isMyTurnAsSeating && \(.*?\)\}";

const CIRCLE_LAYOUT_ANCHOR: &str =
    r#"<div className="game-board circle-layout" onContextMenu={(e) => e.preventDefault()}>"#;

const STAND_UP_BUTTON: &str = r#"
            {gameState.currentPhase === 'FINALIZED' && isMyTurnAsSeating && (
              <button onClick={handleStandUp} className="heavy-btn stand-up-btn-center fade-in">
                椅子を立つ
              </button>
            )}"#;

const CENTERED_BUTTON_CSS: &str = r#"
.stand-up-btn-center {
  position: absolute;
  top: 0;
  left: 0;
  transform: translate(-50%, -50%) !important;
  z-index: 100;
  white-space: nowrap;
  background: linear-gradient(135deg, #004488, #0088ff) !important;
  box-shadow: 0 0 40px rgba(0, 136, 255, 0.4) !important;
  border-color: #3e8fff !important;
  border-width: 4px !important;
  font-size: 1.8rem !important;
  padding: 1.2rem 2.4rem !important;
  font-weight: 900 !important;
  letter-spacing: 3px !important;
  animation: pulse-blue 2s infinite !important;
  pointer-events: auto;
}

.stand-up-btn-center:hover {
  transform: translate(-50%, -50%) scale(1.1) rotate(-2deg) !important;
  box-shadow: 0 0 70px rgba(0, 136, 255, 0.7) !important;
}
"#;

const BOARD_CENTERING_CSS: &str = r#"
.game-board-container {
  display: flex;
  justify-content: center;
  align-items: center;
  padding: 4rem;
  margin: 2rem 0;
  min-height: 700px;
  position: relative; /* Base for centering */
}

.center-action-area {
  position: absolute;
  top: 50%;
  left: 50%;
  transform: translate(-50%, -50%);
  z-index: 100;
  pointer-events: none;
}

.stand-up-btn-center {
  pointer-events: auto;
  white-space: nowrap;
  background: linear-gradient(135deg, #004488, #0088ff) !important;
  box-shadow: 0 0 40px rgba(0, 136, 255, 0.4) !important;
  border-color: #3e8fff !important;
  border-width: 4px !important;
  font-size: 1.8rem !important;
  padding: 1.2rem 2.4rem !important;
  font-weight: 900 !important;
  letter-spacing: 3px !important;
  animation: pulse-blue 2s infinite !important;
}

.stand-up-btn-center:hover {
  transform: scale(1.1) rotate(-2deg) !important;
  box-shadow: 0 0 70px rgba(0, 136, 255, 0.7) !important;
}
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct Recipe {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Overrides the default project root when `--root` is not given.
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(rename = "files")]
    pub edits: Vec<FileEdit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileEdit {
    pub path: PathBuf,
    pub rules: Vec<Rule>,
}

impl Recipe {
    pub fn rule_count(&self) -> usize {
        self.edits.iter().map(|edit| edit.rules.len()).sum()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("recipe name cannot be empty");
        }
        if self.edits.is_empty() {
            bail!("recipe '{}' does not edit any files", self.name);
        }
        let mut seen = HashSet::new();
        for edit in &self.edits {
            if !seen.insert(&edit.path) {
                bail!(
                    "recipe '{}' lists {} more than once; merge its rules into one entry",
                    self.name,
                    edit.path.display()
                );
            }
            if edit.rules.is_empty() {
                bail!(
                    "recipe '{}' has no rules for {}",
                    self.name,
                    edit.path.display()
                );
            }
            for rule in &edit.rules {
                rule.validate()?;
            }
        }
        Ok(())
    }
}

pub fn builtins() -> Vec<Recipe> {
    vec![center_button(), board_centering(), plain_chairs()]
}

pub fn builtin(name: &str) -> Option<Recipe> {
    builtins().into_iter().find(|recipe| recipe.name == name)
}

fn center_button() -> Recipe {
    Recipe {
        name: "center-button".into(),
        description: "move the stand-up button inside the circle layout and restyle it".into(),
        root: None,
        edits: vec![
            FileEdit {
                path: PathBuf::from(APP_JSX),
                rules: vec![
                    Rule::PatternDelete {
                        pattern: STANDING_BUTTON_PATTERN.into(),
                        dot_all: true,
                    },
                    Rule::InsertAfter {
                        anchor: CIRCLE_LAYOUT_ANCHOR.into(),
                        text: STAND_UP_BUTTON.into(),
                    },
                ],
            },
            FileEdit {
                path: PathBuf::from(APP_CSS),
                rules: vec![
                    Rule::BlockSkip {
                        markers: vec![".center-action-area".into(), ".stand-up-btn-center".into()],
                    },
                    Rule::Append {
                        block: CENTERED_BUTTON_CSS.into(),
                    },
                ],
            },
        ],
    }
}

fn board_centering() -> Recipe {
    Recipe {
        name: "board-centering".into(),
        description: "center the action area over the game board container".into(),
        root: None,
        edits: vec![FileEdit {
            path: PathBuf::from(APP_CSS),
            rules: vec![
                Rule::BlockSkip {
                    markers: vec![
                        ".center-action-area".into(),
                        ".stand-up-btn-center".into(),
                        ".game-board-container".into(),
                    ],
                },
                Rule::Append {
                    block: BOARD_CENTERING_CSS.into(),
                },
            ],
        }],
    }
}

fn plain_chairs() -> Recipe {
    Recipe {
        name: "plain-chairs".into(),
        description: "drop the persistent shocked/safe chair styles".into(),
        root: None,
        edits: vec![FileEdit {
            path: PathBuf::from(APP_CSS),
            rules: vec![
                Rule::PatternDelete {
                    pattern: r"\.chair\.shocked\s*\{[^}]*\}".into(),
                    dot_all: false,
                },
                Rule::PatternDelete {
                    pattern: r"\.chair\.safe\s*\{[^}]*\}".into(),
                    dot_all: false,
                },
            ],
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::apply_rules;

    const APP_JSX_FIXTURE: &str = r#"      <div className="game-board-container">
        <div className="game-board circle-layout" onContextMenu={(e) => e.preventDefault()}>
          {chairs}
        </div>
        {/* Center Standing Button */}
        <div className="center-action-area">
          {gameState.currentPhase === 'FINALIZED' && isMyTurnAsSeating && (
            <button onClick={handleStandUp}>stand</button>
          )}
        </div>
      </div>
"#;

    const APP_CSS_FIXTURE: &str = ".game-board-container {
  padding: 2rem;
}

.center-action-area {
  margin-top: 1rem;
}

.stand-up-btn-center {
  color: white;
}

.chair {
  width: 40px;
}
";

    fn edit<'a>(recipe: &'a Recipe, path: &str) -> &'a FileEdit {
        recipe
            .edits
            .iter()
            .find(|edit| edit.path == PathBuf::from(path))
            .expect("edit for path")
    }

    #[test]
    fn builtins_are_valid_and_uniquely_named() {
        let all = builtins();
        assert_eq!(all.len(), 3);
        for recipe in &all {
            recipe.validate().expect("builtin recipe validates");
        }
        assert!(builtin("center-button").is_some());
        assert!(builtin("missing").is_none());
    }

    #[test]
    fn center_button_moves_button_into_circle_layout() {
        let recipe = builtin("center-button").expect("recipe");
        let jsx_rules = &edit(&recipe, APP_JSX).rules;
        let (jsx, reports) = apply_rules(APP_JSX_FIXTURE, jsx_rules).expect("apply");

        assert!(reports.iter().all(|report| report.matches == 1));
        assert!(!jsx.contains("Center Standing Button"));
        assert_eq!(jsx.matches("椅子を立つ").count(), 1);
        let anchor_end = jsx.find(CIRCLE_LAYOUT_ANCHOR).expect("anchor") + CIRCLE_LAYOUT_ANCHOR.len();
        assert!(jsx[anchor_end..].starts_with(STAND_UP_BUTTON));
    }

    #[test]
    fn center_button_replaces_css_blocks() {
        let recipe = builtin("center-button").expect("recipe");
        let css_rules = &edit(&recipe, APP_CSS).rules;
        let (css, reports) = apply_rules(APP_CSS_FIXTURE, css_rules).expect("apply");

        assert_eq!(reports[0].matches, 2);
        assert!(!css.contains("margin-top: 1rem"));
        assert!(!css.contains("color: white"));
        assert!(css.contains(".game-board-container {\n  padding: 2rem;\n}"));
        assert!(css.ends_with(CENTERED_BUTTON_CSS));
    }

    #[test]
    fn board_centering_replaces_container_block() {
        let recipe = builtin("board-centering").expect("recipe");
        let (css, reports) =
            apply_rules(APP_CSS_FIXTURE, &edit(&recipe, APP_CSS).rules).expect("apply");

        assert_eq!(reports[0].matches, 3);
        assert!(!css.contains("padding: 2rem"));
        assert_eq!(css, format!("\n\n\n.chair {{\n  width: 40px;\n}}\n{BOARD_CENTERING_CSS}"));
    }

    #[test]
    fn plain_chairs_removes_result_styles_only() {
        let css = ".chair.shocked {\n  background: #ff0;\n}\n.chair.safe{opacity:0}\n.chair.empty {\n  opacity: 0.3;\n}\n";
        let recipe = builtin("plain-chairs").expect("recipe");
        let (out, reports) = apply_rules(css, &edit(&recipe, APP_CSS).rules).expect("apply");

        assert_eq!(reports[0].matches, 1);
        assert_eq!(reports[1].matches, 1);
        assert_eq!(out, "\n\n.chair.empty {\n  opacity: 0.3;\n}\n");
    }

    #[test]
    fn rerunning_plain_chairs_reports_drift() {
        let recipe = builtin("plain-chairs").expect("recipe");
        let (_, reports) =
            apply_rules(".chair {}\n", &edit(&recipe, APP_CSS).rules).expect("apply");
        assert!(reports.iter().all(|report| report.drift));
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let css_edit = FileEdit {
            path: PathBuf::from(APP_CSS),
            rules: vec![Rule::Append {
                block: "x".into(),
            }],
        };
        let recipe = Recipe {
            name: "dup".into(),
            description: String::new(),
            root: None,
            edits: vec![css_edit.clone(), css_edit],
        };
        assert!(recipe.validate().is_err());
    }
}
