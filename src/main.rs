use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use is_terminal::IsTerminal;
use serde_json::{Map as JsonMap, Value as JsonValue, json};

mod diff;
mod encoding;
mod files;
mod logging;
mod plan;
mod recipes;
mod rules;
mod transform;
use encoding::EncodingStrategy;
use files::{FileEntry, SaveOptions};
use logging::{Change, record_change};
use recipes::{DEFAULT_ROOT, Recipe};
use rules::RuleReport;
use transform::{TransformContext, TransformResult, run_transform};

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq, Default)]
enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    fn should_color(self) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => io::stdout().is_terminal(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(cmd) => handle_run(cmd)?,
        Command::Plan(cmd) => handle_plan(cmd)?,
        Command::List => handle_list(),
        Command::Log(cmd) => handle_log(cmd)?,
    }

    Ok(())
}

fn handle_run(cmd: RunCommand) -> Result<()> {
    let recipe = recipes::builtin(&cmd.recipe).ok_or_else(|| {
        anyhow!(
            "unknown recipe '{}'; `chairpatch list` shows the built-in recipes",
            cmd.recipe
        )
    })?;
    execute_recipe("run", &cmd.common, &recipe)?;
    Ok(())
}

fn handle_plan(cmd: PlanCommand) -> Result<()> {
    let recipe = plan::load_plan(&cmd.plan)?;
    execute_recipe("plan", &cmd.common, &recipe)?;
    Ok(())
}

fn handle_list() {
    for recipe in recipes::builtins() {
        println!("{:<16} {}", recipe.name, recipe.description);
        for edit in &recipe.edits {
            println!("    {} ({} rules)", edit.path.display(), edit.rules.len());
        }
    }
}

fn handle_log(cmd: LogCommand) -> Result<()> {
    let entries = logging::read_recent(cmd.tail)?;
    if entries.is_empty() {
        println!("change log is empty.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "[{}] {:<5} {:<16} {:<8} {:<10} {}",
            entry.timestamp,
            entry.command,
            entry.recipe,
            entry.action,
            entry.line_summary,
            entry.path
        );
        let drifted: Vec<_> = entry.rules.iter().filter(|rule| rule.drift).collect();
        if !drifted.is_empty() {
            println!("    drift: {}", describe_drift(&drifted));
        }
    }
    Ok(())
}

fn execute_recipe(command: &str, common: &CommonArgs, recipe: &Recipe) -> Result<CommandStats> {
    execute_recipe_with(command, common, recipe, prompt_approval)
}

fn execute_recipe_with<F>(
    command: &str,
    common: &CommonArgs,
    recipe: &Recipe,
    mut approve: F,
) -> Result<CommandStats>
where
    F: FnMut(&Path) -> Result<ApprovalDecision>,
{
    let colorize = common.color.should_color();
    let diff_config = common.diff_display_config(colorize);
    let encoding = resolve_encoding_strategy(common)?;
    let root = resolve_root(common, recipe);
    let entries = recipe
        .edits
        .iter()
        .map(|edit| files::resolve_target(&root, &edit.path))
        .collect::<Result<Vec<_>>>()?;
    print_command_summary(command, common, &encoding, &root, recipe, &entries);

    let mut pending = Vec::with_capacity(entries.len());
    for (edit, entry) in recipe.edits.iter().zip(&entries) {
        let ctx = TransformContext {
            entry,
            encoding: &encoding,
        };
        pending.push((entry, run_transform(&ctx, &edit.rules)?));
    }

    if common.strict {
        ensure_no_drift(&pending)?;
    }

    let apply_mode = common.apply;
    let mut apply_all = common.auto_apply && apply_mode;
    let mut stats = CommandStats::default();
    for (idx, (entry, result)) in pending.iter().enumerate() {
        println!("--- {} ---", entry.path.display());
        print_rule_reports(&result.reports);
        let line_summary = diff::summarize_lines(&result.loaded.text, &result.new_text);
        let base = Change {
            command,
            recipe: &recipe.name,
            path: &entry.path,
            action: "pending",
            line_summary: &line_summary,
            rules: &result.reports,
        };

        if result.is_noop() {
            stats.no_op += 1;
            println!("no changes for {}", entry.path.display());
            if apply_mode {
                log_change(common, &base.with_action("no-op"), status_extra(false, false));
            } else {
                emit_json_event(common, &base.with_action("no-op"), status_extra(false, true));
            }
            continue;
        }

        diff::display_diff(&result.loaded.text, &result.new_text, &diff_config)?;

        if !apply_mode {
            stats.dry_run += 1;
            println!("dry-run: rerun with --apply to write this change.");
            log_change(common, &base.with_action("dry-run"), status_extra(false, true));
            continue;
        }

        let decision = if apply_all {
            ApprovalDecision::Apply
        } else {
            approve(&entry.path)?
        };

        match decision {
            ApprovalDecision::Apply | ApprovalDecision::ApplyAll => {
                if matches!(decision, ApprovalDecision::ApplyAll) {
                    apply_all = true;
                }
                write_result(entry, result, &encoding, common)?;
                stats.applied += 1;
                log_change(common, &base.with_action("applied"), status_extra(true, false));
            }
            ApprovalDecision::Skip => {
                println!("skipped {}", entry.path.display());
                stats.skipped += 1;
                log_change(common, &base.with_action("skipped"), status_extra(false, false));
            }
            ApprovalDecision::Quit => {
                println!("stopping after user request.");
                log_change(common, &base.with_action("skipped"), status_extra(false, false));
                let unreached = pending.len() - idx - 1;
                if unreached > 0 {
                    println!("{unreached} remaining file(s) left unapplied");
                }
                stats.skipped += 1 + unreached;
                break;
            }
        }
    }
    stats.print(command);
    Ok(stats)
}

fn write_result(
    entry: &FileEntry,
    result: &TransformResult,
    encoding: &EncodingStrategy,
    common: &CommonArgs,
) -> Result<()> {
    let options = SaveOptions {
        no_backup: common.no_backup,
        undo_dir: common.undo_log.as_deref(),
    };
    let backup = files::save(entry, &result.loaded, &result.new_text, encoding, &options)?;
    if let Some(bak) = backup {
        println!(
            "backup saved: {} -> {}",
            entry.path.display(),
            bak.display()
        );
    }
    println!("applied {}", entry.path.display());
    Ok(())
}

fn ensure_no_drift(pending: &[(&FileEntry, TransformResult)]) -> Result<()> {
    let mut problems = Vec::new();
    for (entry, result) in pending {
        for report in result.reports.iter().filter(|report| report.drift) {
            problems.push(format!(
                "  {}: {} ({})",
                entry.path.display(),
                report.rule,
                drift_reason(report)
            ));
        }
    }
    if problems.is_empty() {
        return Ok(());
    }
    bail!(
        "strict mode: {} rule(s) no longer match their targets; nothing was written\n{}",
        problems.len(),
        problems.join("\n")
    );
}

fn drift_reason(report: &RuleReport) -> String {
    report
        .note
        .clone()
        .unwrap_or_else(|| format!("{} matches", report.matches))
}

fn describe_drift(reports: &[&RuleReport]) -> String {
    reports
        .iter()
        .map(|report| format!("{} ({})", report.rule, drift_reason(report)))
        .collect::<Vec<_>>()
        .join("; ")
}

fn print_rule_reports(reports: &[RuleReport]) {
    for (idx, report) in reports.iter().enumerate() {
        let flag = if report.drift { " [drift]" } else { "" };
        println!(
            "  rule {}: {} -> {} match(es){flag}",
            idx + 1,
            report.rule,
            report.matches
        );
        if let Some(note) = &report.note {
            println!("    note: {note}");
        }
    }
}

fn resolve_root(common: &CommonArgs, recipe: &Recipe) -> PathBuf {
    common
        .root
        .clone()
        .or_else(|| recipe.root.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT))
}

fn log_change(common: &CommonArgs, change: &Change<'_>, extra: JsonMap<String, JsonValue>) {
    if !common.no_log {
        if let Err(err) = record_change(change) {
            println!("warning: could not write change log: {err:#}");
        }
    }
    emit_json_event(common, change, extra);
}

fn emit_json_event(common: &CommonArgs, change: &Change<'_>, extra: JsonMap<String, JsonValue>) {
    if !common.json {
        return;
    }
    let mut event = JsonMap::new();
    event.insert("command".into(), json!(change.command));
    event.insert("recipe".into(), json!(change.recipe));
    event.insert("path".into(), json!(change.path.display().to_string()));
    event.insert("action".into(), json!(change.action));
    event.insert("line_summary".into(), json!(change.line_summary));
    event.insert(
        "rules".into(),
        serde_json::to_value(change.rules).unwrap_or(JsonValue::Null),
    );
    for (key, value) in extra {
        event.insert(key, value);
    }
    println!("{}", JsonValue::Object(event));
}

fn status_extra(applied: bool, dry_run: bool) -> JsonMap<String, JsonValue> {
    let mut map = JsonMap::new();
    map.insert("applied".into(), JsonValue::Bool(applied));
    map.insert("dry_run".into(), JsonValue::Bool(dry_run));
    map
}

fn print_command_summary(
    command: &str,
    common: &CommonArgs,
    encoding: &EncodingStrategy,
    root: &Path,
    recipe: &Recipe,
    entries: &[FileEntry],
) {
    println!("command: {command}");
    println!("recipe: {} ({} rules)", recipe.name, recipe.rule_count());
    if !recipe.description.is_empty() {
        println!("  {}", recipe.description);
    }
    println!(
        "mode: {}{}{}",
        if common.apply { "apply" } else { "dry-run" },
        if common.auto_apply {
            " (auto-approve)"
        } else {
            ""
        },
        if common.strict { " (strict)" } else { "" }
    );
    println!("root: {}", root.display());
    println!("encoding: {}", encoding.describe());
    println!("context lines: {}", common.context);
    println!("json output: {}", common.json);
    if common.no_backup {
        println!("backups disabled");
    }
    if let Some(log) = &common.undo_log {
        println!("undo log dir: {}", log.display());
    }
    println!("targets ({}):", entries.len());
    for entry in entries {
        println!(
            "  - {} ({} bytes)",
            entry.path.display(),
            entry.metadata.len
        );
    }
    println!("---");
}

fn resolve_encoding_strategy(common: &CommonArgs) -> Result<EncodingStrategy> {
    EncodingStrategy::new(common.encoding.as_deref())
}

#[derive(Debug, Clone, Copy)]
enum ApprovalDecision {
    Apply,
    Skip,
    ApplyAll,
    Quit,
}

fn prompt_approval(path: &Path) -> Result<ApprovalDecision> {
    loop {
        print_prompt(&format!(
            "Apply change to {}? [y]es/[n]o/[a]ll/[q]uit: ",
            path.display()
        ))?;
        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(ApprovalDecision::Quit);
        }
        match input.trim().to_lowercase().as_str() {
            "y" | "yes" | "" => return Ok(ApprovalDecision::Apply),
            "n" | "no" => return Ok(ApprovalDecision::Skip),
            "a" | "all" => return Ok(ApprovalDecision::ApplyAll),
            "q" | "quit" => return Ok(ApprovalDecision::Quit),
            _ => {
                println!("Please enter y, n, a, or q.");
            }
        }
    }
}

fn print_prompt(message: &str) -> Result<()> {
    print!("{message}");
    io::stdout().flush()?;
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CommandStats {
    applied: usize,
    skipped: usize,
    dry_run: usize,
    no_op: usize,
}

impl CommandStats {
    fn print(&self, label: &str) {
        let total = self.applied + self.skipped + self.dry_run + self.no_op;
        if total == 0 {
            return;
        }
        println!(
            "{label} summary: applied={}, skipped={}, dry-run={}, no-op={}",
            self.applied, self.skipped, self.dry_run, self.no_op
        );
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "chairpatch",
    version,
    about = "Scripted text patches for the electric chair game front-end"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one of the built-in recipes.
    Run(RunCommand),
    /// Run a recipe described in a YAML or JSON plan file.
    Plan(PlanCommand),
    /// List the built-in recipes.
    List,
    /// Show recent entries from the change log.
    Log(LogCommand),
}

#[derive(Debug, Clone, Default, Args)]
struct CommonArgs {
    #[arg(long, value_name = "DIR", value_hint = ValueHint::DirPath)]
    root: Option<PathBuf>,
    #[arg(long, value_name = "ENCODING")]
    encoding: Option<String>,
    #[arg(long, action = ArgAction::SetTrue)]
    apply: bool,
    #[arg(long = "yes", action = ArgAction::SetTrue)]
    auto_apply: bool,
    #[arg(long, action = ArgAction::SetTrue)]
    no_backup: bool,
    /// Fail before writing anything if a rule matches nothing.
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,
    #[arg(long, default_value_t = 3)]
    context: usize,
    #[arg(long = "color", value_enum, default_value = "auto")]
    color: ColorChoice,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
    #[arg(long = "no-log", action = ArgAction::SetTrue)]
    no_log: bool,
    #[arg(long = "undo-log", value_name = "DIR", value_hint = ValueHint::DirPath)]
    undo_log: Option<PathBuf>,
}

impl CommonArgs {
    fn diff_display_config(&self, colorize: bool) -> diff::DiffDisplayConfig {
        diff::DiffDisplayConfig {
            context: self.context,
            colorize,
        }
    }
}

#[derive(Debug, Args)]
struct RunCommand {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(value_name = "RECIPE")]
    recipe: String,
}

#[derive(Debug, Args)]
struct PlanCommand {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(value_name = "PLAN", value_hint = ValueHint::FilePath)]
    plan: PathBuf,
}

#[derive(Debug, Args)]
struct LogCommand {
    #[arg(long = "tail", default_value_t = 20)]
    tail: usize,
}
