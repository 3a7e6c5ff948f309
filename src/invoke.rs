use std::collections::VecDeque;
use std::process::{Command, ExitStatus};

use tracing::debug;

use crate::errors::EvalError;

/// Runs one shell command to completion and reports its exit code.
pub trait ProcessInvoker {
    fn invoke(&mut self, command: &str) -> Result<i32, EvalError>;
}

/// Runs commands through `sh -c`, inheriting stdio.
#[derive(Debug, Default)]
pub struct ShellInvoker;

impl ProcessInvoker for ShellInvoker {
    fn invoke(&mut self, command: &str) -> Result<i32, EvalError> {
        debug!(command, "spawning");
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()
            .map_err(|source| EvalError::SpawnError {
                command: command.to_string(),
                source,
            })?;
        let code = exit_code(status);
        debug!(command, code, "exited");
        Ok(code)
    }
}

/// Maps a signal-terminated child to `128 + signal`, as shells do.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// Records every command without running it. Commands succeed unless a
/// script says otherwise; used for `--dry-run` and in tests.
#[derive(Debug, Default)]
pub struct RecordingInvoker {
    pub commands: Vec<String>,
    scripts: Vec<(String, VecDeque<i32>)>,
}

impl RecordingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `needle` return `codes` in order, then 0.
    pub fn script(mut self, needle: &str, codes: impl IntoIterator<Item = i32>) -> Self {
        self.scripts
            .push((needle.to_string(), codes.into_iter().collect()));
        self
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.commands.iter().filter(|c| c.contains(needle)).count()
    }
}

impl ProcessInvoker for RecordingInvoker {
    fn invoke(&mut self, command: &str) -> Result<i32, EvalError> {
        self.commands.push(command.to_string());
        let code = self
            .scripts
            .iter_mut()
            .find(|(needle, codes)| command.contains(needle.as_str()) && !codes.is_empty())
            .and_then(|(_, codes)| codes.pop_front())
            .unwrap_or(0);
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn shell_reports_exit_codes() {
        let mut shell = ShellInvoker;
        assert_eq!(shell.invoke("true").unwrap(), 0);
        assert_eq!(shell.invoke("false").unwrap(), 1);
        assert_eq!(shell.invoke("exit 7").unwrap(), 7);
    }

    #[cfg(unix)]
    #[test]
    fn shell_maps_signals() {
        let mut shell = ShellInvoker;
        assert_eq!(shell.invoke("kill -9 $$").unwrap(), 128 + 9);
    }

    #[test]
    fn recording_defaults_to_success() {
        let mut rec = RecordingInvoker::new();
        assert_eq!(rec.invoke("ab -k").unwrap(), 0);
        assert_eq!(rec.commands, vec!["ab -k".to_string()]);
    }

    #[test]
    fn scripted_codes_are_consumed_in_order() {
        let mut rec = RecordingInvoker::new().script("dedup", [1, 2]);
        assert_eq!(rec.invoke("parsecmgmt -p dedup").unwrap(), 1);
        assert_eq!(rec.invoke("parsecmgmt -p canneal").unwrap(), 0);
        assert_eq!(rec.invoke("parsecmgmt -p dedup").unwrap(), 2);
        assert_eq!(rec.invoke("parsecmgmt -p dedup").unwrap(), 0);
        assert_eq!(rec.count_matching("dedup"), 3);
    }
}
