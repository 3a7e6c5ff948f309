use std::fmt;

use clap::ValueEnum;

/// Built-in benchmark targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetKind {
    Cherokee,
    Httpd,
    Parsec,
}

impl TargetKind {
    pub fn name(self) -> &'static str {
        match self {
            TargetKind::Cherokee => "cherokee",
            TargetKind::Httpd => "httpd",
            TargetKind::Parsec => "parsec",
        }
    }
}

/// Top-level mode of a single harness invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Run,
    Build,
    Uninstall,
}

impl Action {
    pub fn verb(self) -> &'static str {
        match self {
            Action::Run => "run",
            Action::Build => "build",
            Action::Uninstall => "uninstall",
        }
    }

    pub fn from_verb(s: &str) -> Option<Action> {
        match s {
            "run" => Some(Action::Run),
            "build" => Some(Action::Build),
            "uninstall" => Some(Action::Uninstall),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Fully resolved parameters for one invocation.
///
/// Every field starts at the target's default and is only changed by a
/// recognized token (see [`crate::classify`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfiguration {
    pub repeat_count: u32,
    pub concurrency: u32,
    pub requests: u32,
    pub input_sizes: Vec<String>,
    pub action: Action,
    pub benchmarks: Vec<String>,
    pub core_counts: Vec<usize>,
    pub original_core_count: usize,
}

/// Outcome of a single attempt. Printed and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialResult {
    pub label: String,
    pub core_count: usize,
    pub attempt_index: u32,
    pub exit_status: i32,
}

impl TrialResult {
    pub fn succeeded(&self) -> bool {
        self.exit_status == 0
    }
}

/// What to do when a run trial exits non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// Re-attempt the same trial until it succeeds. Can stall forever on a
    /// persistently broken target.
    #[default]
    Unlimited,
    /// Give up on a trial after this many retries and move on.
    Bounded(u32),
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `retries` failed retries.
    pub fn allows_retry(self, retries: u32) -> bool {
        match self {
            RetryPolicy::Unlimited => true,
            RetryPolicy::Bounded(max) => retries < max,
        }
    }
}

/// Quotes `s` for `sh -c` only when it contains characters the shell would
/// interpret. Internal single quotes are escaped as `'\''`.
pub fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if safe {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}
