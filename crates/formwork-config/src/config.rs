// crates/formwork-config/src/config.rs
// ============================================================================
// Module: Formwork Configuration
// Description: Configuration loading and validation for formwork hosts.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: formwork-core, formwork-expr, formwork-providers, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section has defaults, so an empty file is valid; unknown keys and
//! out-of-range values fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use formwork_core::DEFAULT_DEBOUNCE_MS;
use formwork_core::Diagnostics;
use formwork_core::FileDiagnosticSink;
use formwork_core::NoopDiagnosticSink;
use formwork_core::ResolverSettings;
use formwork_core::RuntimeSettings;
use formwork_core::StderrDiagnosticSink;
use formwork_expr::DEFAULT_AST_CACHE_CAPACITY;
use formwork_expr::DEFAULT_MAX_EXPRESSION_BYTES;
use formwork_expr::DEFAULT_MAX_NESTING;
use formwork_expr::EngineSettings;
use formwork_expr::ParseLimits;
use formwork_providers::HttpTransportConfig;
use formwork_providers::ReqwestTransport;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "formwork.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "FORMWORK_CONFIG";
/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum debounce window in milliseconds.
pub const MAX_DEBOUNCE_MS: u64 = 60_000;
/// Maximum remote result cache lifetime in milliseconds.
pub const MAX_CACHE_DURATION_MS: u64 = 24 * 60 * 60 * 1000;
/// Maximum accepted expression size in bytes.
pub const MAX_EXPRESSION_BYTES: usize = 1024 * 1024;
/// Maximum accepted expression nesting depth.
pub const MAX_NESTING: usize = 256;
/// Maximum memoized expression programs.
pub const MAX_AST_CACHE_CAPACITY: usize = 65_536;
/// Maximum transport timeout in milliseconds.
pub const MAX_TRANSPORT_TIMEOUT_MS: u64 = 120_000;
/// Maximum transport response size in bytes.
pub const MAX_TRANSPORT_RESPONSE_BYTES: usize = 64 * 1024 * 1024;
/// Maximum host allowlist entries.
const MAX_ALLOWED_HOSTS: usize = 256;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Formwork host configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FormworkConfig {
    /// Async and remote condition defaults.
    #[serde(default)]
    pub resolver: ResolverConfig,
    /// Expression engine limits.
    #[serde(default)]
    pub expressions: ExpressionsConfig,
    /// Diagnostic sink selection.
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    /// HTTP transport policy.
    #[serde(default)]
    pub transport: HttpTransportConfig,
}

impl FormworkConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// The path argument wins, then `FORMWORK_CONFIG`, then `formwork.toml`
    /// in the current directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resolver.validate()?;
        self.expressions.validate()?;
        self.diagnostics.validate()?;
        validate_transport(&self.transport)
    }

    /// Returns the expression engine settings.
    #[must_use]
    pub const fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            limits: ParseLimits {
                max_bytes: self.expressions.max_expression_bytes,
                max_nesting: self.expressions.max_nesting,
            },
            cache_capacity: self.expressions.ast_cache_capacity,
        }
    }

    /// Returns the resolver defaults.
    #[must_use]
    pub const fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            default_debounce_ms: self.resolver.default_debounce_ms,
            default_cache_duration_ms: self.resolver.default_cache_duration_ms,
            default_pending_value: self.resolver.default_pending_value,
        }
    }

    /// Returns the combined runtime settings.
    #[must_use]
    pub const fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            engine: self.engine_settings(),
            resolver: self.resolver_settings(),
        }
    }

    /// Builds the configured diagnostics hub.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the diagnostics file cannot be opened.
    pub fn build_diagnostics(&self) -> Result<Diagnostics, ConfigError> {
        self.diagnostics.build()
    }

    /// Builds the configured HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the client cannot be created.
    pub fn build_transport(&self) -> Result<ReqwestTransport, ConfigError> {
        ReqwestTransport::new(self.transport.clone())
            .map_err(|err| ConfigError::Invalid(format!("transport: {err}")))
    }
}

/// Defaults for async and remote conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Debounce window applied when a condition omits one.
    pub default_debounce_ms: u64,
    /// Remote result cache lifetime (`0` disables caching).
    pub default_cache_duration_ms: u64,
    /// Value published before resolution completes.
    pub default_pending_value: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            default_debounce_ms: DEFAULT_DEBOUNCE_MS,
            default_cache_duration_ms: 0,
            default_pending_value: false,
        }
    }
}

impl ResolverConfig {
    /// Validates resolver bounds.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::Invalid(format!(
                "resolver.default_debounce_ms must be at most {MAX_DEBOUNCE_MS}"
            )));
        }
        if self.default_cache_duration_ms > MAX_CACHE_DURATION_MS {
            return Err(ConfigError::Invalid(format!(
                "resolver.default_cache_duration_ms must be at most {MAX_CACHE_DURATION_MS}"
            )));
        }
        Ok(())
    }
}

/// Expression engine limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExpressionsConfig {
    /// Maximum expression size in bytes.
    pub max_expression_bytes: usize,
    /// Maximum nesting depth.
    pub max_nesting: usize,
    /// Maximum memoized programs.
    pub ast_cache_capacity: usize,
}

impl Default for ExpressionsConfig {
    fn default() -> Self {
        Self {
            max_expression_bytes: DEFAULT_MAX_EXPRESSION_BYTES,
            max_nesting: DEFAULT_MAX_NESTING,
            ast_cache_capacity: DEFAULT_AST_CACHE_CAPACITY,
        }
    }
}

impl ExpressionsConfig {
    /// Validates expression limits.
    fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "expressions.max_expression_bytes",
            self.max_expression_bytes,
            MAX_EXPRESSION_BYTES,
        )?;
        check_range("expressions.max_nesting", self.max_nesting, MAX_NESTING)?;
        check_range(
            "expressions.ast_cache_capacity",
            self.ast_cache_capacity,
            MAX_AST_CACHE_CAPACITY,
        )
    }
}

/// Diagnostic sink kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticsSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// Append-only JSON lines file.
    File,
    /// Discard diagnostics.
    None,
}

/// Diagnostic sink selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiagnosticsConfig {
    /// Sink kind.
    pub sink: DiagnosticsSinkKind,
    /// File path; required for the `file` sink.
    pub path: Option<String>,
}

impl DiagnosticsConfig {
    /// Validates the sink selection.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (DiagnosticsSinkKind::File, Some(path)) => {
                validate_path_string("diagnostics.path", path)
            }
            (DiagnosticsSinkKind::File, None) => Err(missing_file_path()),
            (_, Some(_)) => Err(ConfigError::Invalid(
                "diagnostics.path is only valid for the file sink".to_string(),
            )),
            (_, None) => Ok(()),
        }
    }

    /// Builds the diagnostics hub for this selection.
    fn build(&self) -> Result<Diagnostics, ConfigError> {
        match (self.sink, &self.path) {
            (DiagnosticsSinkKind::Stderr, _) => {
                Ok(Diagnostics::new(Arc::new(StderrDiagnosticSink)))
            }
            (DiagnosticsSinkKind::None, _) => Ok(Diagnostics::new(Arc::new(NoopDiagnosticSink))),
            (DiagnosticsSinkKind::File, Some(path)) => {
                let sink = FileDiagnosticSink::new(Path::new(path.trim()))
                    .map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Diagnostics::new(Arc::new(sink)))
            }
            (DiagnosticsSinkKind::File, None) => Err(missing_file_path()),
        }
    }
}

/// Validates transport policy bounds.
fn validate_transport(config: &HttpTransportConfig) -> Result<(), ConfigError> {
    if config.timeout_ms == 0 || config.timeout_ms > MAX_TRANSPORT_TIMEOUT_MS {
        return Err(ConfigError::Invalid("transport.timeout_ms out of range".to_string()));
    }
    check_range(
        "transport.max_response_bytes",
        config.max_response_bytes,
        MAX_TRANSPORT_RESPONSE_BYTES,
    )?;
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Invalid("transport.user_agent must be non-empty".to_string()));
    }
    if let Some(hosts) = &config.allowed_hosts {
        if hosts.len() > MAX_ALLOWED_HOSTS {
            return Err(ConfigError::Invalid(
                "too many transport.allowed_hosts entries".to_string(),
            ));
        }
        if hosts.iter().any(|host| host.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "transport.allowed_hosts entries must be non-empty".to_string(),
            ));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Error for a file sink without a path.
fn missing_file_path() -> ConfigError {
    ConfigError::Invalid("diagnostics.path is required for the file sink".to_string())
}

/// Checks `1 ..= max` for a size setting.
fn check_range(field: &str, value: usize, max: usize) -> Result<(), ConfigError> {
    if value == 0 || value > max {
        return Err(ConfigError::Invalid(format!("{field} must be between 1 and {max}")));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
