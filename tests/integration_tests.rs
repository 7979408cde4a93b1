//! Integration tests: CLI smoke tests and end-to-end audits of export files.

mod common;

use std::fs;

use serde_json::Value;

const HEADER: [&str; 4] = ["Full Path", "Type", "Size", "Permissions"];

fn parse_json(stdout: &str) -> Value {
    let line = stdout.lines().last().unwrap_or_default();
    serde_json::from_str(line).unwrap_or_else(|e| panic!("invalid JSON output ({e}): {stdout}"))
}

#[test]
fn help_command_prints_usage() {
    let result = common::run_cli_case("help_command_prints_usage", &["--help"]);
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("Usage: iva [OPTIONS] <COMMAND>"),
        "missing help banner; log: {}",
        result.log_path.display()
    );
    for keyword in ["audit", "tree", "check-permissions", "config", "completions"] {
        assert!(
            result.stdout.contains(keyword),
            "help output missing command {keyword}; log: {}",
            result.log_path.display()
        );
    }
}

#[test]
fn version_command_prints_version() {
    let result = common::run_cli_case("version_command_prints_version", &["--version"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(
        result.stdout.contains(env!("CARGO_PKG_VERSION")),
        "log: {}",
        result.log_path.display()
    );
}

#[test]
fn clean_audit_exits_zero_with_json_report() {
    let dir = tempfile::tempdir().expect("tempdir");
    let export = common::write_export(
        dir.path(),
        "clean.csv",
        &HEADER,
        &[
            vec![r"C:\Share\", "Folder", "3 KB", "Everyone: +r+x"],
            vec![r"C:\Share\a.txt", "Text Document", "1 KB", "Everyone: +r"],
            vec![r"C:\Share\sub\", "Folder", "2 KB", "Admins: full"],
            vec![r"C:\Share\sub\b.bin", "bin", "2 KB", "Admins: full"],
        ],
    );
    let export = export.to_string_lossy().into_owned();

    let result = common::run_cli_case("clean_audit", &["--json", "audit", &export]);
    assert_eq!(
        result.status.code(),
        Some(0),
        "log: {}",
        result.log_path.display()
    );
    let report = parse_json(&result.stdout);
    assert_eq!(report["command"], "audit");
    assert_eq!(report["totals"]["files"], 2);
    assert_eq!(report["totals"]["directories"], 2);
    assert_eq!(report["totals"]["size_bytes"], 3072);
    assert_eq!(report["deviations"].as_array().map(Vec::len), Some(0));
    assert_eq!(report["errors"], 0);
    assert_eq!(report["forest_digest"].as_str().map(str::len), Some(64));
}

#[test]
fn deviation_is_reported_and_error_policy_sets_exit_code() {
    let dir = tempfile::tempdir().expect("tempdir");
    let export = common::write_export(
        dir.path(),
        "deviation.csv",
        &HEADER,
        &[
            vec![r"C:\A\", "Folder", "3072 Bytes", ""],
            vec![r"C:\A\f1.txt", "File", "1 KB", ""],
            vec![r"C:\A\f2.txt", "File", "1 KB", ""],
        ],
    );
    let export = export.to_string_lossy().into_owned();

    let warn = common::run_cli_case("deviation_warn", &["--json", "audit", &export]);
    assert_eq!(warn.status.code(), Some(0), "log: {}", warn.log_path.display());
    let report = parse_json(&warn.stdout);
    let deviation = &report["deviations"][0];
    assert_eq!(deviation["path"], r"C:\A\");
    assert_eq!(deviation["reported"], 3072);
    assert_eq!(deviation["computed"], 2048);
    assert_eq!(deviation["difference"], -1024);
    assert_eq!(deviation["direction"], "below_reported");

    let fail = common::run_cli_case_with_env(
        "deviation_error",
        &["--json", "audit", &export],
        &[("IVA_RECONCILE_UNDER_REPORTED", "error")],
    );
    assert_eq!(fail.status.code(), Some(4), "log: {}", fail.log_path.display());
    assert!(fail.stderr.contains("error-severity"), "log: {}", fail.log_path.display());

    let loose = common::run_cli_case(
        "deviation_tolerance",
        &["--json", "audit", &export, "--tolerance", "0.5"],
    );
    assert_eq!(loose.status.code(), Some(0), "log: {}", loose.log_path.display());
    assert_eq!(parse_json(&loose.stdout)["deviations"].as_array().map(Vec::len), Some(0));
}

#[test]
fn invalid_tolerance_is_a_user_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let export = common::write_export(
        dir.path(),
        "x.csv",
        &HEADER,
        &[vec![r"C:\A\", "Folder", "", ""]],
    );
    let export = export.to_string_lossy().into_owned();
    let result = common::run_cli_case("bad_tolerance", &["audit", &export, "--tolerance", "2"]);
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
}

#[test]
fn missing_export_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("nope.csv");
    let result = common::run_cli_case(
        "missing_export",
        &["audit", &missing.to_string_lossy()],
    );
    assert_eq!(result.status.code(), Some(2), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("IVA-2001"), "log: {}", result.log_path.display());
}

#[test]
fn missing_required_column_exits_with_findings() {
    let dir = tempfile::tempdir().expect("tempdir");
    let export = common::write_export(
        dir.path(),
        "nocols.csv",
        &["Size", "Owner"],
        &[vec!["1 KB", "alice"]],
    );
    let export = export.to_string_lossy().into_owned();
    let result = common::run_cli_case("missing_columns", &["--json", "audit", &export]);
    assert_eq!(result.status.code(), Some(4), "log: {}", result.log_path.display());
    let report = parse_json(&result.stdout);
    assert_eq!(report["build"]["undecodable_rows"], 1);
    let codes: Vec<&str> = report["diagnostics"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|d| d["kind"].as_str())
        .collect();
    assert!(codes.contains(&"missing_required_column"), "{codes:?}");
}

#[test]
fn audit_writes_jsonl_log_with_summary() {
    let dir = tempfile::tempdir().expect("tempdir");
    let export = common::write_export(
        dir.path(),
        "logged.csv",
        &HEADER,
        &[
            vec![r"C:\A\", "Folder", "1 KB", "Everyone: bogus"],
            vec![r"C:\A\f.txt", "txt", "1 KB", ""],
        ],
    );
    let log = dir.path().join("audit.jsonl");
    let result = common::run_cli_case(
        "jsonl_log",
        &[
            "--json",
            "audit",
            &export.to_string_lossy(),
            "--log",
            &log.to_string_lossy(),
        ],
    );
    assert_eq!(result.status.code(), Some(0), "log: {}", result.log_path.display());

    let content = fs::read_to_string(&log).expect("log written");
    let records: Vec<Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect();
    assert!(records.len() >= 2);
    assert!(records.iter().any(|r| r["kind"] == "invalid_permissions"));
    let summary = records.last().expect("summary");
    assert_eq!(summary["record"], "summary");
    assert_eq!(summary["total_files"], 1);
    assert_eq!(summary["warnings"], 1);
}

#[test]
fn human_audit_output_lists_totals() {
    let dir = tempfile::tempdir().expect("tempdir");
    let export = common::write_export(
        dir.path(),
        "human.csv",
        &HEADER,
        &[
            vec![r"C:\A\", "Folder", "1 KB", ""],
            vec![r"C:\A\f.txt", "txt", "1 KB", ""],
        ],
    );
    let result = common::run_cli_case_with_env(
        "human_audit",
        &["--no-color", "audit", &export.to_string_lossy()],
        &[("IVA_OUTPUT_FORMAT", "human")],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("Totals:"), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("Result:      clean"), "log: {}", result.log_path.display());
}

#[test]
fn tree_command_respects_depth() {
    let dir = tempfile::tempdir().expect("tempdir");
    let export = common::write_export(
        dir.path(),
        "tree.csv",
        &HEADER,
        &[
            vec![r"C:\A\B\deep.txt", "txt", "1 KB", ""],
            vec![r"C:\A\B\", "Folder", "", ""],
            vec![r"C:\A\", "Folder", "", ""],
        ],
    );
    let export = export.to_string_lossy().into_owned();

    let full = common::run_cli_case("tree_full", &["--json", "tree", &export]);
    assert!(full.status.success(), "log: {}", full.log_path.display());
    let payload = parse_json(&full.stdout);
    assert_eq!(payload["nodes"].as_array().map(Vec::len), Some(3));
    assert_eq!(payload["nodes"][0]["path"], r"C:\A\");
    assert_eq!(payload["nodes"][0]["rolled_up_size"], 1024);

    let shallow =
        common::run_cli_case("tree_shallow", &["--json", "tree", &export, "--depth", "1"]);
    let payload = parse_json(&shallow.stdout);
    assert_eq!(payload["nodes"].as_array().map(Vec::len), Some(2));
}

#[test]
fn check_permissions_reports_validity() {
    let ok = common::run_cli_case(
        "perm_ok",
        &["--json", "check-permissions", "Everyone: full | Admins: +r+w+x (This Container Only)"],
    );
    assert_eq!(ok.status.code(), Some(0), "log: {}", ok.log_path.display());
    assert_eq!(parse_json(&ok.stdout)["valid"], true);

    let bad = common::run_cli_case("perm_bad", &["--json", "check-permissions", "Everyone: bogus"]);
    assert_eq!(bad.status.code(), Some(4), "log: {}", bad.log_path.display());
    let payload = parse_json(&bad.stdout);
    assert_eq!(payload["valid"], false);
    assert!(payload["problems"][0].as_str().unwrap_or_default().contains("bogus"));
}

#[test]
fn config_show_and_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = dir.path().join("iva.toml");
    fs::write(&cfg, "[reconcile]\ntolerance = 0.05\n").expect("write config");
    let cfg = cfg.to_string_lossy().into_owned();

    let show = common::run_cli_case("config_show", &["--json", "--config", &cfg, "config", "show"]);
    assert!(show.status.success(), "log: {}", show.log_path.display());
    let payload = parse_json(&show.stdout);
    assert_eq!(payload["config"]["reconcile"]["tolerance"], 0.05);
    assert_eq!(payload["config"]["input"]["preamble_lines"], 4);

    let path = common::run_cli_case("config_path", &["--json", "--config", &cfg, "config", "path"]);
    let payload = parse_json(&path.stdout);
    assert_eq!(payload["path"], cfg.as_str());
    assert_eq!(payload["exists"], true);

    let missing = dir.path().join("absent.toml");
    let result = common::run_cli_case(
        "config_missing",
        &["--config", &missing.to_string_lossy(), "config", "show"],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
}

#[test]
fn completions_generate_for_bash() {
    let result = common::run_cli_case("completions_bash", &["completions", "bash"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("iva"), "log: {}", result.log_path.display());
}
