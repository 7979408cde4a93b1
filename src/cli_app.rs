//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use inventory_audit::core::config::Config;
use inventory_audit::core::errors::IvaError;
use inventory_audit::inventory::builder::{BuildOutcome, BuildStats, TreeBuilder};
use inventory_audit::inventory::digest::{forest_digest, hash_hex};
use inventory_audit::inventory::permissions;
use inventory_audit::inventory::rollup::{ReconcileReport, reconcile};
use inventory_audit::inventory::source::{Export, read_export};
use inventory_audit::inventory::tree::{Forest, NodeId};
use inventory_audit::logger::diagnostics::{Diagnostic, Severity};
use inventory_audit::logger::jsonl::{AuditSummary, DiagnosticWriter, JsonlConfig};

/// Rows between progress lines in verbose mode.
const PROGRESS_EVERY: usize = 10_000;

/// Inventory Audit: integrity checks for directory-tree inventory exports.
#[derive(Debug, Parser)]
#[command(
    name = "iva",
    author,
    version,
    about = "Inventory Audit - rebuild and reconcile directory-tree scan exports",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Rebuild an export's tree, reconcile folder sizes and report findings.
    Audit(AuditArgs),
    /// Print the reconstructed forest with reported and rolled-up sizes.
    Tree(TreeArgs),
    /// Validate one permissions field against the permission grammar.
    CheckPermissions(CheckPermissionsArgs),
    /// View configuration state.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct AuditArgs {
    /// Inventory export to audit.
    #[arg(value_name = "FILE")]
    file: PathBuf,
    /// Override the reconciliation tolerance fraction (0.01 = 1%).
    #[arg(long, value_name = "FRACTION")]
    tolerance: Option<f64>,
    /// Append diagnostics as JSONL to this file.
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct TreeArgs {
    /// Inventory export to load.
    #[arg(value_name = "FILE")]
    file: PathBuf,
    /// Maximum depth to print (0 = roots only).
    #[arg(long, value_name = "N")]
    depth: Option<usize>,
}

#[derive(Debug, Clone, Args)]
struct CheckPermissionsArgs {
    /// Permissions field, e.g. "Everyone: full | Admins: +r+x (This Container Only)".
    #[arg(value_name = "STRING")]
    value: String,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// The run completed but produced error-severity findings.
    #[error("{0}")]
    Findings(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
            Self::Findings(_) => 4,
        }
    }
}

impl From<IvaError> for CliError {
    fn from(err: IvaError) -> Self {
        match err {
            IvaError::InvalidConfig { .. }
            | IvaError::MissingConfig { .. }
            | IvaError::ConfigParse { .. } => Self::User(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Audit(args) => run_audit(cli, args),
        Command::Tree(args) => run_tree(cli, args),
        Command::CheckPermissions(args) => run_check_permissions(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// audit / tree
// ---------------------------------------------------------------------------

/// Everything one pass over an export produces.
struct Audit {
    config: Config,
    export: Export,
    outcome: BuildOutcome,
    report: ReconcileReport,
}

impl Audit {
    fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.outcome
            .diagnostics
            .iter()
            .chain(self.report.diagnostics.iter())
    }

    fn count(&self, severity: Severity) -> usize {
        self.outcome.diagnostics.count(severity) + self.report.diagnostics.count(severity)
    }

    fn summary(&self) -> Result<AuditSummary, CliError> {
        let stats = &self.outcome.stats;
        Ok(AuditSummary {
            export: Some(self.export.path.to_string_lossy().into_owned()),
            config_hash: self.config.stable_hash()?,
            rows_read: stats.rows_read,
            rows_skipped: stats.rows_skipped,
            total_files: self.report.total_files,
            total_directories: self.report.total_directories,
            total_size_bytes: self.report.total_size_bytes,
            total_allocated_bytes: self.report.total_allocated_bytes,
            unattached_roots: self.report.unattached_roots,
            deviations: self.report.deviations.len(),
            warnings: self.count(Severity::Warning),
            errors: self.count(Severity::Error),
            forest_digest: hash_hex(&forest_digest(&self.outcome.forest)),
        })
    }
}

fn load_audit(cli: &Cli, file: &Path, tolerance: Option<f64>) -> Result<Audit, CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(tolerance) = tolerance {
        if !tolerance.is_finite() || !(0.0..=1.0).contains(&tolerance) {
            return Err(CliError::User(format!(
                "--tolerance must be in [0, 1], got {tolerance}"
            )));
        }
        config.reconcile.tolerance = tolerance;
    }

    let export = read_export(file, &config.input)?;

    let verbose = cli.verbose;
    let mut builder = TreeBuilder::new(&config);
    if verbose {
        builder = builder.with_progress(PROGRESS_EVERY, |stats: &BuildStats| {
            eprintln!(
                "[iva] {} rows read, {} placed, {} skipped",
                stats.rows_read, stats.rows_placed, stats.rows_skipped
            );
        });
    }
    for row in &export.rows {
        builder.push_row(row);
    }
    let mut outcome = builder.finish();
    let report = reconcile(&mut outcome.forest, &config);

    Ok(Audit {
        config,
        export,
        outcome,
        report,
    })
}

fn run_audit(cli: &Cli, args: &AuditArgs) -> Result<(), CliError> {
    let mut audit = load_audit(cli, &args.file, args.tolerance)?;
    if let Some(log) = &args.log {
        audit.config.paths.jsonl_log = Some(log.clone());
    }
    let summary = audit.summary()?;

    if let Some(log_path) = &audit.config.paths.jsonl_log {
        let mut writer = DiagnosticWriter::open(JsonlConfig::for_path(log_path));
        writer.write_all(audit.diagnostics(), Some(audit.export.path.as_path()));
        writer.write_summary(&summary);
        writer.flush();
        if cli.verbose {
            eprintln!("[iva] diagnostics log: {}", writer.state());
        }
    }

    match output_mode(cli) {
        OutputMode::Human => print_audit_human(cli, &audit, &summary),
        OutputMode::Json => {
            let diagnostics: Vec<&Diagnostic> = audit.diagnostics().collect();
            let payload = json!({
                "command": "audit",
                "export": audit.export.path.to_string_lossy(),
                "config_hash": summary.config_hash,
                "build": audit.outcome.stats,
                "totals": {
                    "files": audit.report.total_files,
                    "directories": audit.report.total_directories,
                    "size_bytes": audit.report.total_size_bytes,
                    "allocated_bytes": audit.report.total_allocated_bytes,
                    "roots": audit.outcome.forest.root_count(),
                    "unattached_roots": audit.report.unattached_roots,
                    "files_without_size": audit.report.files_without_size,
                    "directories_checked": audit.report.directories_checked,
                },
                "deviations": audit.report.deviations,
                "diagnostics": diagnostics,
                "warnings": summary.warnings,
                "errors": summary.errors,
                "forest_digest": summary.forest_digest,
            });
            write_json_line(&payload)?;
        }
    }

    if summary.errors > 0 {
        return Err(CliError::Findings(format!(
            "audit found {} error-severity diagnostic(s)",
            summary.errors
        )));
    }
    Ok(())
}

fn print_audit_human(cli: &Cli, audit: &Audit, summary: &AuditSummary) {
    let stats = &audit.outcome.stats;
    if !cli.quiet {
        println!("{} {}", "Audit:".bold(), audit.export.path.display());
        println!(
            "  Rows:        {} read, {} placed, {} skipped",
            stats.rows_read, stats.rows_placed, stats.rows_skipped
        );
        if stats.duplicates > 0 {
            println!("  Duplicates:  {}", stats.duplicates);
        }
        println!();
    }

    for diagnostic in audit.diagnostics() {
        let shown = match diagnostic.severity {
            Severity::Error => true,
            Severity::Warning => !cli.quiet,
            Severity::Info => cli.verbose,
        };
        if shown {
            println!("{}", render_diagnostic(diagnostic));
        }
    }

    if cli.quiet {
        return;
    }
    let report = &audit.report;
    println!();
    println!("{}", "Totals:".bold());
    println!(
        "  Files:       {} ({})",
        report.total_files,
        format_bytes(report.total_size_bytes)
    );
    println!("  Allocated:   {}", format_bytes(report.total_allocated_bytes));
    println!("  Directories: {}", report.total_directories);
    println!(
        "  Roots:       {} ({} unattached)",
        audit.outcome.forest.root_count(),
        report.unattached_roots
    );
    println!(
        "  Deviations:  {} of {} checked directories",
        report.deviations.len(),
        report.directories_checked
    );
    println!("  Digest:      {}", summary.forest_digest);

    let verdict = if summary.errors > 0 {
        let text = format!("{} errors, {} warnings", summary.errors, summary.warnings);
        text.as_str().red().bold()
    } else if summary.warnings > 0 {
        let text = format!("{} warnings", summary.warnings);
        text.as_str().yellow().bold()
    } else {
        "clean".green().bold()
    };
    println!("  Result:      {verdict}");
}

fn render_diagnostic(diagnostic: &Diagnostic) -> String {
    let label = match diagnostic.severity {
        Severity::Error => "error".red().bold(),
        Severity::Warning => "warning".yellow().bold(),
        Severity::Info => "info".dimmed(),
    };
    let location = diagnostic
        .line
        .map_or_else(String::new, |line| format!(" line {line}"));
    format!(
        "{label} [{}]{location}: {}",
        diagnostic.kind.code(),
        diagnostic.message
    )
}

fn run_tree(cli: &Cli, args: &TreeArgs) -> Result<(), CliError> {
    let audit = load_audit(cli, &args.file, None)?;
    let forest = &audit.outcome.forest;
    let visible: Vec<NodeId> = forest
        .walk()
        .into_iter()
        .filter(|&id| args.depth.is_none_or(|max| forest.depth(id) <= max))
        .collect();

    match output_mode(cli) {
        OutputMode::Human => {
            for id in visible {
                println!("{}", render_tree_line(forest, id));
            }
        }
        OutputMode::Json => {
            let nodes: Vec<Value> = visible
                .into_iter()
                .map(|id| tree_node_json(forest, id))
                .collect();
            let payload = json!({
                "command": "tree",
                "export": audit.export.path.to_string_lossy(),
                "roots": forest.root_count(),
                "unattached_roots": forest.unattached_count(),
                "nodes": nodes,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn render_tree_line(forest: &Forest, id: NodeId) -> String {
    let node = forest.node(id);
    let indent = "  ".repeat(forest.depth(id));
    let reported = node
        .fields
        .size
        .map_or_else(|| "-".to_string(), format_bytes);
    match node.directory() {
        Some(dir) => {
            let label = if node.parent.is_none() {
                node.full_path.as_str()
            } else {
                node.name.as_str()
            };
            let rolled = dir
                .rolled_up_size
                .map_or_else(|| "-".to_string(), format_bytes);
            let unattached = if node.parent.is_none() && !node.parent_path.is_empty() {
                " (unattached)".yellow().to_string()
            } else {
                String::new()
            };
            format!(
                "{indent}{}{unattached}  reported {reported}, rolled up {rolled}",
                label.bold()
            )
        }
        None => {
            let label = if node.parent.is_none() {
                &node.full_path
            } else {
                &node.name
            };
            format!("{indent}{label}  {reported}")
        }
    }
}

fn tree_node_json(forest: &Forest, id: NodeId) -> Value {
    let node = forest.node(id);
    let dir = node.directory();
    json!({
        "path": node.full_path,
        "kind": node.kind_label(),
        "depth": forest.depth(id),
        "line": node.line,
        "reported_size": node.fields.size,
        "reported_allocated": node.fields.allocated,
        "rolled_up_size": dir.and_then(|d| d.rolled_up_size),
        "rolled_up_allocated": dir.and_then(|d| d.rolled_up_allocated),
        "children": dir.map(|d| d.child_count()),
        "unattached": node.parent.is_none() && !node.parent_path.is_empty(),
    })
}

// ---------------------------------------------------------------------------
// check-permissions / config
// ---------------------------------------------------------------------------

fn run_check_permissions(cli: &Cli, args: &CheckPermissionsArgs) -> Result<(), CliError> {
    let check = permissions::validate(&args.value);

    match output_mode(cli) {
        OutputMode::Human => {
            if check.is_valid() {
                println!(
                    "{} ({} entr{})",
                    "valid".green().bold(),
                    check.entries,
                    if check.entries == 1 { "y" } else { "ies" }
                );
            } else {
                println!("{}", "invalid".red().bold());
                for problem in &check.problems {
                    println!("  - {problem}");
                }
            }
            if check.unreadable {
                println!("  note: contains the scanner's access-denied placeholder");
            }
            if check.trust_failures > 0 {
                println!(
                    "  note: {} account(s) unresolved due to a failed trust relationship",
                    check.trust_failures
                );
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "check-permissions",
                "value": args.value,
                "valid": check.is_valid(),
                "entries": check.entries,
                "problems": check.problems,
                "unreadable": check.unreadable,
                "trust_failures": check.trust_failures,
            });
            write_json_line(&payload)?;
        }
    }

    match check.message() {
        Some(message) => Err(CliError::Findings(format!("invalid permissions: {message}"))),
        None => Ok(()),
    }
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", config.to_toml_string()?);
                }
                OutputMode::Json => {
                    let value = serde_json::to_value(&config)?;
                    let payload = json!({
                        "command": "config show",
                        "hash": config.stable_hash()?,
                        "config": value,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;
    const TIB: u64 = 1024 * GIB;

    if bytes >= TIB {
        format!("{:.1} TB", bytes as f64 / TIB as f64)
    } else if bytes >= GIB {
        format!("{:.1} GB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("IVA_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
