// crates/formwork-cli/src/main.rs
// ============================================================================
// Module: Formwork CLI Entry Point
// Description: Command dispatcher for offline form engine workflows.
// Purpose: Evaluate expressions and conditions, validate form data and check
//          configuration from the command line.
// Dependencies: clap, formwork-config, formwork-core, serde_jcs, serde_json,
//               thiserror, tokio.
// ============================================================================

//! ## Overview
//! The `formwork` binary drives the engine over JSON files. Results are
//! written to stdout as canonical JSON; errors go to stderr with a failure
//! exit code. Inputs are untrusted and read with size limits.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use formwork_config::CONFIG_ENV_VAR;
use formwork_config::DEFAULT_CONFIG_NAME;
use formwork_config::FormworkConfig;
use formwork_core::Condition;
use formwork_core::Diagnostics;
use formwork_core::EvaluationContext;
use formwork_core::FormDefinition;
use formwork_core::FormEngine;
use formwork_core::FormRuntime;
use formwork_core::MemoryDiagnosticSink;
use formwork_core::SnapshotField;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum size of any JSON input file.
const MAX_INPUT_BYTES: usize = 8 * 1024 * 1024;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "formwork", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file path (overrides `FORMWORK_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Include diagnostics emitted during the command in the output.
    #[arg(long, global = true)]
    diagnostics: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate an expression against a form value.
    Expr(ExprCommand),
    /// Evaluate a condition for one field of a form value.
    Condition(ConditionCommand),
    /// Validate form data against a form definition.
    Validate(ValidateCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Form value input shared by evaluation commands.
#[derive(Args, Debug, Clone)]
struct DataArgs {
    /// Inline form value as JSON.
    #[arg(long, value_name = "JSON", conflicts_with = "data_file")]
    data: Option<String>,
    /// File holding the form value as JSON.
    #[arg(long, value_name = "PATH")]
    data_file: Option<PathBuf>,
    /// Path of the field being evaluated.
    #[arg(long, value_name = "FIELD", default_value = "")]
    path: String,
}

/// Arguments for `expr`.
#[derive(Args, Debug, Clone)]
struct ExprCommand {
    /// Expression source.
    expression: String,
    /// Form value input.
    #[command(flatten)]
    data: DataArgs,
}

/// Arguments for `condition`.
#[derive(Args, Debug, Clone)]
struct ConditionCommand {
    /// Inline condition as JSON.
    #[arg(long, value_name = "JSON", conflicts_with = "condition_file")]
    condition: Option<String>,
    /// File holding the condition as JSON.
    #[arg(long, value_name = "PATH")]
    condition_file: Option<PathBuf>,
    /// Form value input.
    #[command(flatten)]
    data: DataArgs,
}

/// Arguments for `validate`.
#[derive(Args, Debug, Clone)]
struct ValidateCommand {
    /// Form definition file (JSON).
    #[arg(long, value_name = "PATH")]
    form: PathBuf,
    /// Form data file (JSON).
    #[arg(long, value_name = "PATH")]
    data: PathBuf,
    /// Skip async and HTTP validators.
    #[arg(long)]
    sync_only: bool,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the configuration.
    Check,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    let (value, valid) = match cli.command {
        Commands::Config {
            command: ConfigCommand::Check,
        } => (command_config_check(config)?, true),
        Commands::Expr(command) => {
            let session = Session::open(config, cli.diagnostics)?;
            (session.finish(command_expr(&session, &command)?), true)
        }
        Commands::Condition(command) => {
            let session = Session::open(config, cli.diagnostics)?;
            (session.finish(command_condition(&session, &command).await?), true)
        }
        Commands::Validate(command) => {
            let session = Session::open(config, cli.diagnostics)?;
            let (output, valid) = command_validate(&session, &command).await?;
            (session.finish(output), valid)
        }
    };
    write_json_value(&value)?;
    Ok(if valid { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Runtime and diagnostics for one command.
struct Session {
    /// Form runtime configured from the loaded config.
    runtime: FormRuntime,
    /// Collected diagnostics when `--diagnostics` is set.
    recorded: Option<Arc<MemoryDiagnosticSink>>,
}

impl Session {
    /// Loads configuration and builds the runtime.
    fn open(path: Option<&Path>, collect_diagnostics: bool) -> CliResult<Self> {
        let config = load_config(path)?;
        let recorded = collect_diagnostics.then(|| Arc::new(MemoryDiagnosticSink::new()));
        let diagnostics = match &recorded {
            Some(sink) => Diagnostics::new(sink.clone()),
            None => config
                .build_diagnostics()
                .map_err(|err| CliError::new(format!("diagnostics setup failed: {err}")))?,
        };
        let transport = config
            .build_transport()
            .map_err(|err| CliError::new(format!("transport setup failed: {err}")))?;
        let runtime = FormRuntime::builder()
            .settings(config.runtime_settings())
            .diagnostics(diagnostics)
            .transport(Arc::new(transport))
            .build();
        Ok(Self {
            runtime,
            recorded,
        })
    }

    /// Attaches recorded diagnostics to a command's output.
    fn finish(&self, mut output: Value) -> Value {
        if let (Some(sink), Value::Object(map)) = (&self.recorded, &mut output) {
            let records = serde_json::to_value(sink.records()).unwrap_or(Value::Null);
            map.insert("diagnostics".to_string(), records);
        }
        output
    }
}

/// Loads the explicit config, or the implicit one when present, else defaults.
fn load_config(path: Option<&Path>) -> CliResult<FormworkConfig> {
    let implicit =
        std::env::var_os(CONFIG_ENV_VAR).is_some() || Path::new(DEFAULT_CONFIG_NAME).exists();
    if path.is_none() && !implicit {
        return Ok(FormworkConfig::default());
    }
    FormworkConfig::load(path).map_err(|err| CliError::new(format!("config load failed: {err}")))
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes `config check`.
fn command_config_check(path: Option<&Path>) -> CliResult<Value> {
    let config = FormworkConfig::load(path)
        .map_err(|err| CliError::new(format!("config load failed: {err}")))?;
    let settings = config.runtime_settings();
    Ok(json!({
        "status": "ok",
        "resolver": {
            "default_debounce_ms": settings.resolver.default_debounce_ms,
            "default_cache_duration_ms": settings.resolver.default_cache_duration_ms,
            "default_pending_value": settings.resolver.default_pending_value,
        },
        "expressions": {
            "max_expression_bytes": settings.engine.limits.max_bytes,
            "max_nesting": settings.engine.limits.max_nesting,
            "ast_cache_capacity": settings.engine.cache_capacity,
        },
    }))
}

/// Executes `expr`.
fn command_expr(session: &Session, command: &ExprCommand) -> CliResult<Value> {
    let field = snapshot(&command.data)?;
    let context = EvaluationContext::untracked(session.runtime.services(), &field);
    let value = context
        .evaluate(&command.expression)
        .map_err(|err| CliError::new(format!("expression failed: {err}")))?;
    Ok(match value.to_json() {
        Some(value) => json!({"defined": true, "value": value}),
        None => json!({"defined": false}),
    })
}

/// Executes `condition`.
async fn command_condition(session: &Session, command: &ConditionCommand) -> CliResult<Value> {
    let condition: Condition = match (&command.condition, &command.condition_file) {
        (Some(text), _) => parse_json("condition", text)?,
        (None, Some(path)) => read_json("condition", path)?,
        (None, None) => {
            return Err(CliError::new("either --condition or --condition-file is required"));
        }
    };
    let field = snapshot(&command.data)?;
    let result = session
        .runtime
        .resolve_condition(&condition, &field)
        .await
        .map_err(|err| CliError::new(format!("invalid condition: {err}")))?;
    Ok(json!({"path": command.data.path, "result": result}))
}

/// Executes `validate`; the flag reports whether the data is valid.
async fn command_validate(
    session: &Session,
    command: &ValidateCommand,
) -> CliResult<(Value, bool)> {
    let definition: FormDefinition = read_json("form definition", &command.form)?;
    let data: Value = read_json("form data", &command.data)?;
    let engine = FormEngine::build(&definition, session.runtime.clone())
        .map_err(|err| CliError::new(format!("form setup failed: {err}")))?;
    let report = if command.sync_only {
        engine.validate(&data)
    } else {
        engine.validate_async(&data).await
    };
    let valid = report.is_valid();
    let output = json!({
        "valid": valid,
        "errors": to_value(&report.errors)?,
        "derived": to_value(&engine.derived_values(&data))?,
    });
    Ok((output, valid))
}

// ============================================================================
// SECTION: Input Helpers
// ============================================================================

/// Builds the field accessor described by data arguments.
fn snapshot(args: &DataArgs) -> CliResult<SnapshotField> {
    let root = match (&args.data, &args.data_file) {
        (Some(text), _) => parse_json("form data", text)?,
        (None, Some(path)) => read_json("form data", path)?,
        (None, None) => Value::Object(serde_json::Map::new()),
    };
    Ok(SnapshotField::new(root, args.path.clone()))
}

/// Parses inline JSON.
fn parse_json<T: DeserializeOwned>(label: &str, text: &str) -> CliResult<T> {
    if text.len() > MAX_INPUT_BYTES {
        return Err(CliError::new(format!("{label} exceeds {MAX_INPUT_BYTES} bytes")));
    }
    serde_json::from_str(text).map_err(|err| CliError::new(format!("invalid {label}: {err}")))
}

/// Reads and parses a JSON file with a size limit.
fn read_json<T: DeserializeOwned>(label: &str, path: &Path) -> CliResult<T> {
    let bytes = read_bytes_with_limit(path, MAX_INPUT_BYTES).map_err(|err| {
        CliError::new(format!("failed to read {label} {}: {err}", path.display()))
    })?;
    serde_json::from_slice(&bytes).map_err(|err| CliError::new(format!("invalid {label}: {err}")))
}

/// Reads a file, failing when it exceeds `max_bytes`.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if file.metadata()?.len() > limit {
        return Err(std::io::Error::other(format!("file exceeds {max_bytes} bytes")));
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
    if bytes.len() > max_bytes {
        return Err(std::io::Error::other(format!("file exceeds {max_bytes} bytes")));
    }
    Ok(bytes)
}

/// Serializes a value for output.
fn to_value<T: Serialize>(value: &T) -> CliResult<Value> {
    serde_json::to_value(value)
        .map_err(|err| CliError::new(format!("output encoding failed: {err}")))
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes canonical JSON to stdout with a trailing newline.
fn write_json_value(value: &Value) -> CliResult<()> {
    let mut bytes = serde_jcs::to_vec(value)
        .map_err(|err| CliError::new(format!("output encoding failed: {err}")))?;
    bytes.push(b'\n');
    let mut stdout = std::io::stdout();
    stdout
        .write_all(&bytes)
        .map_err(|err| CliError::new(format!("failed to write stdout: {err}")))
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
