//! Subcommand implementations.

use crate::formatter::Formatter;
use ragshield_core::{EnforcementConfig, EnforcementError, Enforcer};
use ragshield_proto::RetrievalRequest;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// A file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Enforcement failed.
    #[error(transparent)]
    Enforcement(#[from] EnforcementError),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

fn load_config(path: Option<&Path>) -> CliResult<EnforcementConfig> {
    match path {
        Some(path) => {
            debug!(config = %path.display(), "loading enforcement configuration");
            Ok(EnforcementConfig::from_json_file(path)?)
        }
        None => Ok(EnforcementConfig::default()),
    }
}

/// List the backends the configuration accepts.
pub fn backends(config: Option<&Path>, formatter: &dyn Formatter) -> CliResult<String> {
    let enforcer = Enforcer::from_config(load_config(config)?)?;
    let backends: Vec<_> = enforcer.registry().backends().collect();
    Ok(formatter.format_backends(&backends))
}

/// Compile a request file into a backend's native filter.
pub fn compile(
    backend: &str,
    request: &Path,
    config: Option<&Path>,
    formatter: &dyn Formatter,
) -> CliResult<String> {
    let enforcer = Enforcer::from_config(load_config(config)?)?;
    let input = std::fs::read_to_string(request).map_err(|source| CliError::Io {
        path: request.to_path_buf(),
        source,
    })?;
    let request = RetrievalRequest::from_json(&input).map_err(EnforcementError::from)?;

    let compiled = enforcer.compile(
        backend,
        request.auth_context.as_ref(),
        request.semantic_context.as_ref(),
    )?;
    Ok(formatter.format_compiled(&compiled))
}
