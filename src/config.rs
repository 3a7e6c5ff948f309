use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::EvalError;
use crate::types::TargetKind;

/// Optional per-target overrides, read from TOML.
///
/// ```toml
/// [httpd]
/// requests = 50000
/// docroot = "/srv/httpd/htdocs"
///
/// [parsec]
/// manager = "/opt/parsec/bin/parsecmgmt"
/// ```
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub cherokee: TargetSettings,
    pub httpd: TargetSettings,
    pub parsec: TargetSettings,
}

/// Fields left unset keep the target's built-in default.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetSettings {
    pub runs: Option<u32>,
    pub requests: Option<u32>,
    pub concurrency: Option<u32>,
    pub load_generator: Option<String>,
    pub manager: Option<String>,
    pub server_start: Option<String>,
    pub server_stop: Option<String>,
    pub docroot: Option<PathBuf>,
    pub startup_delay_secs: Option<u64>,
}

impl Config {
    /// `$XDG_CONFIG_HOME/smv-eval/config.toml` (or the platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("smv-eval").join("config.toml"))
    }

    /// Loads `explicit` if given, otherwise the default path when it exists.
    /// A missing default file is not an error.
    pub fn load(explicit: Option<&Path>) -> Result<Config, EvalError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => Ok(Config::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Config, EvalError> {
        let text = std::fs::read_to_string(path).map_err(|source| EvalError::ConfigReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|detail| EvalError::ConfigParseError {
            path: path.to_path_buf(),
            detail,
        })
    }

    pub fn parse(text: &str) -> Result<Config, String> {
        toml::from_str(text).map_err(|e| e.message().to_string())
    }

    pub fn for_target(&self, kind: TargetKind) -> &TargetSettings {
        match kind {
            TargetKind::Cherokee => &self.cherokee,
            TargetKind::Httpd => &self.httpd,
            TargetKind::Parsec => &self.parsec,
        }
    }
}
