use std::fs::{self, OpenOptions};
use std::path::Path;

use crate::errors::EvalError;

/// Parses a size label with `truncate(1)` suffix rules: `K`/`KiB`, `M`/`MiB`
/// and `G`/`GiB` are powers of 1024; `KB`, `MB` and `GB` are powers of 1000.
/// A bare number is bytes.
pub fn parse_size(label: &str) -> Result<u64, EvalError> {
    let invalid = || EvalError::InvalidSize {
        label: label.to_string(),
    };

    let split = label
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(label.len());
    let (digits, suffix) = label.split_at(split);
    if digits.is_empty() {
        return Err(invalid());
    }
    let value: u64 = digits.parse().map_err(|_| invalid())?;

    let multiplier: u64 = match suffix {
        "" => 1,
        "K" | "KiB" => 1 << 10,
        "KB" => 1_000,
        "M" | "MiB" => 1 << 20,
        "MB" => 1_000_000,
        "G" | "GiB" => 1 << 30,
        "GB" => 1_000_000_000,
        _ => return Err(invalid()),
    };

    value.checked_mul(multiplier).ok_or_else(invalid)
}

/// Ensures `path` exists and is exactly `bytes` long, creating parent
/// directories as needed. Existing content is kept up to the new length.
pub fn ensure_fixture(path: &Path, bytes: u64) -> Result<(), EvalError> {
    let wrap = |source| EvalError::FixtureError {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(wrap)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(wrap)?;
    file.set_len(bytes).map_err(wrap)?;
    Ok(())
}
