#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

use inventory_audit::core::config::Config;
use inventory_audit::inventory::source::RawRow;

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_iva") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "iva.exe" } else { "iva" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve iva binary path for integration test"),
    }
}

/// Run the CLI with a clean environment and keep a transcript for debugging.
pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    run_cli_case_with_env(case_name, args, &[])
}

pub fn run_cli_case_with_env(case_name: &str, args: &[&str], env: &[(&str, &str)]) -> CmdResult {
    let root = std::env::temp_dir().join("iva-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();
    // Point HOME at an empty directory so a developer's own config never leaks in.
    let home = tempfile::tempdir().expect("temp home");

    let mut command = Command::new(&bin_path);
    command
        .args(args)
        .env("HOME", home.path())
        .env("RUST_BACKTRACE", "1")
        .env_remove("IVA_OUTPUT_FORMAT");
    for (key, value) in env {
        command.env(key, value);
    }
    let output = command.output().expect("execute iva command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    let _ = writeln!(log_content, "case={case_name}");
    let _ = writeln!(log_content, "bin={}", bin_path.display());
    let _ = writeln!(log_content, "args={args:?}");
    let _ = writeln!(log_content, "status={}", output.status);
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Standard four-line scanner preamble.
pub const PREAMBLE: &str = "Inventory Report\nDrive: C:\\\nScanned: 2024-01-15 10:00:00\nGenerated by test fixture\n";

/// Write an export with the default preamble, a header and quoted data rows.
pub fn write_export(dir: &Path, name: &str, header: &[&str], rows: &[Vec<&str>]) -> PathBuf {
    let mut text = String::from(PREAMBLE);
    text.push_str(&csv_line(header));
    for row in rows {
        text.push_str(&csv_line(row));
    }
    let path = dir.join(name);
    fs::write(&path, text).expect("write export");
    path
}

fn csv_line(fields: &[&str]) -> String {
    let quoted: Vec<String> = fields
        .iter()
        .map(|f| format!("\"{}\"", f.replace('"', "\"\"")))
        .collect();
    let mut line = quoted.join(",");
    line.push_str("\r\n");
    line
}

/// Header row followed by data rows, as the record source would hand them over.
pub fn rows(header: &[&str], data: &[Vec<&str>]) -> Vec<RawRow> {
    let mut out = vec![RawRow::new(5, header.iter().copied())];
    out.extend(
        data.iter()
            .enumerate()
            .map(|(i, fields)| RawRow::new(i + 6, fields.iter().copied())),
    );
    out
}

/// Defaults without touching the environment or the user's config file.
pub fn default_config() -> Config {
    Config::default()
}
