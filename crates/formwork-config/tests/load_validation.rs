// crates/formwork-config/tests/load_validation.rs
// ============================================================================
// Module: Config Load Validation Tests
// Description: Loading, defaults and fail-closed validation of formwork.toml.
// Purpose: Ensure limits are enforced and settings convert faithfully.
// ============================================================================

//! Load and validation tests for formwork-config.

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

use std::fs;

use formwork_config::ConfigError;
use formwork_config::DiagnosticsSinkKind;
use formwork_config::FormworkConfig;
use formwork_config::MAX_CONFIG_FILE_SIZE;
use formwork_core::RuntimeSettings;

type TestResult = Result<(), String>;

/// Assert that a result is an error containing a specific substring.
fn assert_invalid<T>(result: Result<T, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error '{message}' did not contain '{needle}'"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

#[test]
fn empty_config_uses_defaults() {
    let config = FormworkConfig::from_toml("").unwrap();
    assert_eq!(config, FormworkConfig::default());
    assert_eq!(config.runtime_settings(), RuntimeSettings::default());
    assert_eq!(config.diagnostics.sink, DiagnosticsSinkKind::Stderr);
    assert!(!config.transport.allow_http);
}

#[test]
fn sections_convert_into_runtime_settings() {
    let config = FormworkConfig::from_toml(
        r#"
        [resolver]
        default_debounce_ms = 150
        default_cache_duration_ms = 30000
        default_pending_value = true

        [expressions]
        max_expression_bytes = 2048
        max_nesting = 16
        ast_cache_capacity = 8

        [diagnostics]
        sink = "none"

        [transport]
        allow_http = true
        timeout_ms = 1500
        allowed_hosts = ["api.example.test"]
        "#,
    )
    .unwrap();
    let settings = config.runtime_settings();
    assert_eq!(settings.resolver.default_debounce_ms, 150);
    assert_eq!(settings.resolver.default_cache_duration_ms, 30_000);
    assert!(settings.resolver.default_pending_value);
    assert_eq!(settings.engine.limits.max_bytes, 2048);
    assert_eq!(settings.engine.limits.max_nesting, 16);
    assert_eq!(settings.engine.cache_capacity, 8);
    assert!(config.build_diagnostics().is_ok());
    assert!(config.build_transport().is_ok());
}

// ============================================================================
// SECTION: Limits
// ============================================================================

#[test]
fn out_of_range_values_fail_closed() -> TestResult {
    assert_invalid(
        FormworkConfig::from_toml("[resolver]\ndefault_debounce_ms = 60001"),
        "default_debounce_ms",
    )?;
    assert_invalid(
        FormworkConfig::from_toml("[expressions]\nmax_nesting = 0"),
        "max_nesting",
    )?;
    assert_invalid(
        FormworkConfig::from_toml("[transport]\ntimeout_ms = 0"),
        "timeout_ms",
    )?;
    assert_invalid(
        FormworkConfig::from_toml("[transport]\nuser_agent = \"  \""),
        "user_agent",
    )?;
    assert_invalid(
        FormworkConfig::from_toml("[transport]\nallowed_hosts = [\"\"]"),
        "allowed_hosts",
    )
}

#[test]
fn diagnostics_paths_belong_to_the_file_sink() -> TestResult {
    assert_invalid(FormworkConfig::from_toml("[diagnostics]\nsink = \"file\""), "required")?;
    assert_invalid(
        FormworkConfig::from_toml("[diagnostics]\nsink = \"stderr\"\npath = \"x.jsonl\""),
        "only valid",
    )
}

#[test]
fn unknown_keys_are_rejected() -> TestResult {
    assert_invalid(FormworkConfig::from_toml("[resolver]\ndebounce = 10"), "parse error")?;
    assert_invalid(FormworkConfig::from_toml("[metrics]\nenabled = true"), "parse error")
}

// ============================================================================
// SECTION: Loading
// ============================================================================

#[test]
fn load_reads_files_and_builds_file_sinks() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("diagnostics.jsonl");
    let path = dir.path().join("formwork.toml");
    let text = format!("[diagnostics]\nsink = \"file\"\npath = {:?}\n", log.to_string_lossy());
    fs::write(&path, text).unwrap();
    let config = FormworkConfig::load(Some(&path)).unwrap();
    assert_eq!(config.diagnostics.sink, DiagnosticsSinkKind::File);
    assert!(config.build_diagnostics().is_ok());
    assert!(log.exists());
}

#[test]
fn load_rejects_oversized_and_non_utf8_files() -> TestResult {
    let dir = tempfile::tempdir().unwrap();
    let large = dir.path().join("large.toml");
    fs::write(&large, "#".repeat(MAX_CONFIG_FILE_SIZE + 1)).unwrap();
    assert_invalid(FormworkConfig::load(Some(&large)), "size limit")?;

    let binary = dir.path().join("binary.toml");
    fs::write(&binary, [0xff, 0xfe, 0x00]).unwrap();
    assert_invalid(FormworkConfig::load(Some(&binary)), "utf-8")?;

    let missing = dir.path().join("missing.toml");
    assert_invalid(FormworkConfig::load(Some(&missing)), "io error")
}
