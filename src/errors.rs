use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum EvalError {
    #[error("Failed to read config file {path}: {source}")]
    ConfigReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {detail}")]
    ConfigParseError { path: PathBuf, detail: String },

    #[error("Failed to spawn '{command}': {source}")]
    SpawnError {
        command: String,
        source: std::io::Error,
    },

    #[error("Failed to create fixture {path}: {source}")]
    FixtureError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid size label '{label}'")]
    InvalidSize { label: String },

    #[error("Failed to set cpu{unit} {state}: {source}")]
    CpuToggleError {
        unit: usize,
        state: &'static str,
        source: std::io::Error,
    },

    #[error("Target '{target}' does not support the {action} action")]
    UnsupportedAction { target: String, action: String },
}
