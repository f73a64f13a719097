#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use lockpair_core::PipelineOptions;
use miette::Diagnostic;
use thiserror::Error;

pub const CONFIG_FILE: &str = "lockpair.toml";

#[derive(Debug, Error, Diagnostic)]
#[error("config error: {message}")]
#[diagnostic(code(lockpair::config))]
pub struct ConfigError {
    pub message: String,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    pipeline: PipelineOptions,
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedConfig {
    pub config_path: Option<PathBuf>,
    pub options: PipelineOptions,
}

/// An explicit path must exist; otherwise the nearest `lockpair.toml` in the
/// bundle's directory or one of its ancestors is used, and defaults apply
/// when there is none.
pub fn load_config(explicit: Option<&Path>, start: &Path) -> Result<ResolvedConfig, ConfigError> {
    let nearest = || {
        let dir = if start.is_file() { start.parent() } else { Some(start) };
        dir.into_iter()
            .flat_map(Path::ancestors)
            .map(|d| d.join(CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    };
    let Some(path) = explicit.map(Path::to_path_buf).or_else(nearest) else {
        return Ok(ResolvedConfig::default());
    };

    let raw = fs::read_to_string(&path).map_err(|e| ConfigError {
        message: format!("failed to read {}: {e}", path.display()),
    })?;
    let parsed = parse_config(&raw).map_err(|e| ConfigError {
        message: format!("failed to parse {}: {}", path.display(), e.message),
    })?;

    Ok(ResolvedConfig {
        config_path: Some(path),
        options: parsed,
    })
}

pub fn parse_config(raw: &str) -> Result<PipelineOptions, ConfigError> {
    let file: ConfigFile = toml::from_str(raw).map_err(|e| ConfigError {
        message: e.to_string(),
    })?;
    Ok(file.pipeline)
}
