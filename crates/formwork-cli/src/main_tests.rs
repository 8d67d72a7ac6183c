// crates/formwork-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Tests
// Description: Unit tests for argument parsing and command handlers.
// Purpose: Exercise each command against temporary input files.
// Dependencies: formwork-cli main helpers, tempfile
// ============================================================================

//! ## Overview
//! Drives command handlers directly so output can be inspected as JSON
//! values rather than captured stdout.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use clap::Parser;
use serde_json::json;
use tempfile::TempDir;

use super::Cli;
use super::Commands;
use super::ConditionCommand;
use super::DataArgs;
use super::ExprCommand;
use super::Session;
use super::ValidateCommand;
use super::command_condition;
use super::command_config_check;
use super::command_expr;
use super::command_validate;
use super::read_bytes_with_limit;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Writes `contents` to `name` inside `dir`.
fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

/// Opens a session with diagnostics disabled and collection enabled.
fn session(dir: &TempDir) -> Session {
    let config = write(dir, "formwork.toml", "[diagnostics]\nsink = \"none\"\n");
    Session::open(Some(Path::new(&config)), true).unwrap()
}

/// Data arguments over an inline form value.
fn inline(data: &str, path: &str) -> DataArgs {
    DataArgs {
        data: Some(data.to_string()),
        data_file: None,
        path: path.to_string(),
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

#[test]
fn subcommands_parse() {
    let cli = Cli::try_parse_from(["formwork", "expr", "1 + 2", "--data", "{}"]).unwrap();
    assert!(matches!(cli.command, Commands::Expr(_)));
    let cli = Cli::try_parse_from(["formwork", "--diagnostics", "config", "check"]).unwrap();
    assert!(cli.diagnostics);
    assert!(matches!(cli.command, Commands::Config { .. }));
    let conflict = Cli::try_parse_from([
        "formwork",
        "expr",
        "1",
        "--data",
        "{}",
        "--data-file",
        "data.json",
    ]);
    assert!(conflict.is_err());
}

// ============================================================================
// SECTION: Commands
// ============================================================================

#[test]
fn expr_evaluates_against_inline_data() {
    let dir = tempfile::tempdir().unwrap();
    let session = session(&dir);
    let command = ExprCommand {
        expression: "formValue.qty * formValue.price".to_string(),
        data: inline(r#"{"qty": 3, "price": 4}"#, ""),
    };
    let output = session.finish(command_expr(&session, &command).unwrap());
    assert_eq!(output["value"], json!(12));
    assert!(output["diagnostics"].is_array());

    let missing = ExprCommand {
        expression: "formValue.missing".to_string(),
        data: inline("{}", ""),
    };
    assert_eq!(command_expr(&session, &missing).unwrap(), json!({"defined": false}));
}

#[tokio::test]
async fn condition_reads_condition_files() {
    let dir = tempfile::tempdir().unwrap();
    let session = session(&dir);
    let condition = write(
        &dir,
        "condition.json",
        r#"{"type": "fieldValue", "fieldPath": "accountType",
            "operator": "notEquals", "value": "business"}"#,
    );
    let command = ConditionCommand {
        condition: None,
        condition_file: Some(condition),
        data: inline(r#"{"accountType": "personal"}"#, "company"),
    };
    let output = command_condition(&session, &command).await.unwrap();
    assert_eq!(output, json!({"path": "company", "result": true}));
}

#[tokio::test]
async fn validate_reports_errors_and_derived_values() {
    let dir = tempfile::tempdir().unwrap();
    let session = session(&dir);
    let form = write(
        &dir,
        "form.json",
        r#"{"fields": [
            {"key": "email", "validators": [{"type": "required"}, {"type": "email"}]},
            {"key": "total", "derive": {"type": "expression", "code": "formValue.qty * 2"}}
        ]}"#,
    );
    let data = write(&dir, "data.json", r#"{"email": "not-an-address", "qty": 4}"#);
    let command = ValidateCommand {
        form,
        data,
        sync_only: false,
    };
    let (output, valid) = command_validate(&session, &command).await.unwrap();
    assert!(!valid);
    assert_eq!(output["errors"][0]["kind"], json!("email"));
    assert_eq!(output["derived"], json!({"total": 8}));
}

#[test]
fn config_check_rejects_invalid_files() {
    let dir = tempfile::tempdir().unwrap();
    let good = write(&dir, "good.toml", "[resolver]\ndefault_debounce_ms = 50\n");
    let output = command_config_check(Some(good.as_path())).unwrap();
    assert_eq!(output["status"], json!("ok"));
    assert_eq!(output["resolver"]["default_debounce_ms"], json!(50));
    let bad = write(&dir, "bad.toml", "[expressions]\nmax_nesting = 0\n");
    assert!(command_config_check(Some(bad.as_path())).is_err());
}

#[test]
fn read_bytes_with_limit_fails_closed() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "large.json", &"x".repeat(32));
    assert!(read_bytes_with_limit(&path, 16).is_err());
    assert_eq!(read_bytes_with_limit(&path, 32).unwrap().len(), 32);
}
