//! Command templates for each built-in target.
//!
//! The dispatcher is target-agnostic; everything that differs between the
//! web servers and the compute suite lives behind [`TargetProfile`].

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{Config, TargetSettings};
use crate::types::{Action, RunConfiguration, TargetKind, shell_quote};

pub const PAGE_SIZES: &[&str] = &["10KB", "100KB", "1MB", "2M", "4M", "8M", "50M", "100M"];

pub const PARSEC_BENCHMARKS: &[&str] = &[
    "blackscholes",
    "bodytrack",
    "canneal",
    "dedup",
    "facesim",
    "ferret",
    "fluidanimate",
    "raytrace",
    "streamcluster",
    "swaptions",
    "vips",
    "x264",
];

pub const PARSEC_INPUTS: &[&str] = &["simsmall", "simmedium", "simlarge", "native"];

pub const PARSEC_ACTIONS: &[Action] = &[Action::Build, Action::Uninstall, Action::Run];

/// How input-size tokens combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeMode {
    /// Each token adds a size; none given means every known size.
    Multi,
    /// A token replaces the single current input.
    Single,
}

/// One cell of the run matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialKey {
    pub benchmark: Option<String>,
    pub size: String,
    pub cores: usize,
}

impl TrialKey {
    pub fn label(&self) -> String {
        match &self.benchmark {
            Some(bench) => format!("{} {}", bench, self.size),
            None => self.size.clone(),
        }
    }
}

pub trait TargetProfile {
    fn kind(&self) -> TargetKind;

    fn benchmarks(&self) -> &[&'static str] {
        &[]
    }

    fn input_sizes(&self) -> &[&'static str];

    fn size_mode(&self) -> SizeMode;

    fn actions(&self) -> &[Action] {
        &[]
    }

    fn uses_core_counts(&self) -> bool {
        false
    }

    /// Configuration before any token is applied.
    fn defaults(&self, original_core_count: usize) -> RunConfiguration;

    /// One-line summary printed after the welcome banner.
    fn describe(&self, config: &RunConfiguration) -> String;

    /// Where the fixture for `size` lives, if this target needs one.
    fn fixture_path(&self, _size: &str) -> Option<PathBuf> {
        None
    }

    fn server_start(&self) -> Option<&str> {
        None
    }

    fn server_stop(&self) -> Option<&str> {
        None
    }

    fn startup_delay(&self) -> Duration {
        Duration::ZERO
    }

    fn trial_command(&self, config: &RunConfiguration, trial: &TrialKey) -> String;

    fn trial_banner(&self, index: u32, trial: &TrialKey) -> String;

    /// Suite-manager command for build/uninstall, or `None` when the target
    /// has no such action.
    fn action_command(&self, _action: Action, _benchmark: &str) -> Option<String> {
        None
    }
}

/// Builds the profile for `kind`, applying any overrides from `config`.
pub fn profile_for(kind: TargetKind, config: &Config) -> Box<dyn TargetProfile> {
    let settings = config.for_target(kind);
    match kind {
        TargetKind::Cherokee | TargetKind::Httpd => Box::new(HttpTarget::new(kind, settings)),
        TargetKind::Parsec => Box::new(ParsecTarget::new(settings)),
    }
}

/// A web server driven by ApacheBench.
#[derive(Debug, Clone)]
pub struct HttpTarget {
    kind: TargetKind,
    runs: u32,
    requests: u32,
    concurrency: u32,
    load_generator: String,
    server_start: String,
    server_stop: String,
    docroot: PathBuf,
    startup_delay: Duration,
}

impl HttpTarget {
    pub fn new(kind: TargetKind, settings: &TargetSettings) -> Self {
        let (requests, load_generator, start, stop, docroot) = match kind {
            TargetKind::Httpd => (
                10_000,
                "./build/bin/ab",
                "sudo ./build/bin/httpd -k start -X &",
                "sudo ./build/bin/httpd -k stop",
                "./build/htdocs",
            ),
            _ => (
                100_000,
                "ab",
                "sudo ./build/sbin/cherokee-worker &",
                "sudo pkill -9 cherokee-worker",
                "./build/var/www",
            ),
        };

        Self {
            kind,
            runs: settings.runs.unwrap_or(10),
            requests: settings.requests.unwrap_or(requests),
            concurrency: settings.concurrency.unwrap_or(4),
            load_generator: settings
                .load_generator
                .clone()
                .unwrap_or_else(|| load_generator.to_string()),
            server_start: settings
                .server_start
                .clone()
                .unwrap_or_else(|| start.to_string()),
            server_stop: settings
                .server_stop
                .clone()
                .unwrap_or_else(|| stop.to_string()),
            docroot: settings
                .docroot
                .clone()
                .unwrap_or_else(|| PathBuf::from(docroot)),
            startup_delay: Duration::from_secs(settings.startup_delay_secs.unwrap_or(3)),
        }
    }
}

impl TargetProfile for HttpTarget {
    fn kind(&self) -> TargetKind {
        self.kind
    }

    fn input_sizes(&self) -> &[&'static str] {
        PAGE_SIZES
    }

    fn size_mode(&self) -> SizeMode {
        SizeMode::Multi
    }

    fn defaults(&self, original_core_count: usize) -> RunConfiguration {
        RunConfiguration {
            repeat_count: self.runs,
            concurrency: self.concurrency,
            requests: self.requests,
            input_sizes: PAGE_SIZES.iter().map(|s| s.to_string()).collect(),
            action: Action::Run,
            benchmarks: Vec::new(),
            core_counts: Vec::new(),
            original_core_count,
        }
    }

    fn describe(&self, config: &RunConfiguration) -> String {
        format!(
            "Runs {}, concurrent level {}, requests {}",
            config.repeat_count, config.concurrency, config.requests
        )
    }

    fn fixture_path(&self, size: &str) -> Option<PathBuf> {
        Some(self.docroot.join(format!("htdoc_{size}.html")))
    }

    fn server_start(&self) -> Option<&str> {
        Some(&self.server_start)
    }

    fn server_stop(&self) -> Option<&str> {
        Some(&self.server_stop)
    }

    fn startup_delay(&self) -> Duration {
        self.startup_delay
    }

    fn trial_command(&self, config: &RunConfiguration, trial: &TrialKey) -> String {
        format!(
            "{} -k -n {} -c {} http://localhost/htdoc_{}.html",
            shell_quote(&self.load_generator),
            config.requests,
            config.concurrency,
            trial.size
        )
    }

    fn trial_banner(&self, index: u32, trial: &TrialKey) -> String {
        format!("Run {} ab for page sz {}", index, trial.size)
    }
}

/// The PARSEC suite, driven by `parsecmgmt`.
#[derive(Debug, Clone)]
pub struct ParsecTarget {
    runs: u32,
    manager: String,
}

impl ParsecTarget {
    pub fn new(settings: &TargetSettings) -> Self {
        Self {
            runs: settings.runs.unwrap_or(1),
            manager: settings
                .manager
                .clone()
                .unwrap_or_else(|| "parsecmgmt".to_string()),
        }
    }
}

impl TargetProfile for ParsecTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Parsec
    }

    fn benchmarks(&self) -> &[&'static str] {
        PARSEC_BENCHMARKS
    }

    fn input_sizes(&self) -> &[&'static str] {
        PARSEC_INPUTS
    }

    fn size_mode(&self) -> SizeMode {
        SizeMode::Single
    }

    fn actions(&self) -> &[Action] {
        PARSEC_ACTIONS
    }

    fn uses_core_counts(&self) -> bool {
        true
    }

    fn defaults(&self, original_core_count: usize) -> RunConfiguration {
        RunConfiguration {
            repeat_count: self.runs,
            // Not used by the suite manager.
            concurrency: 1,
            requests: 1,
            input_sizes: vec!["simlarge".to_string()],
            action: Action::Run,
            benchmarks: PARSEC_BENCHMARKS.iter().map(|s| s.to_string()).collect(),
            core_counts: Vec::new(),
            original_core_count,
        }
    }

    fn describe(&self, config: &RunConfiguration) -> String {
        let cores = if config.core_counts.is_empty() {
            format!("all ({})", config.original_core_count)
        } else {
            config
                .core_counts
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        format!(
            "Action {}, runs {}, input {}, cores {}, benchmarks {}",
            config.action,
            config.repeat_count,
            config.input_sizes.join(","),
            cores,
            config.benchmarks.join(",")
        )
    }

    fn trial_command(&self, _config: &RunConfiguration, trial: &TrialKey) -> String {
        format!(
            "{} -a run -p {} -i {} -n {}",
            shell_quote(&self.manager),
            trial.benchmark.as_deref().unwrap_or_default(),
            trial.size,
            trial.cores
        )
    }

    fn trial_banner(&self, index: u32, trial: &TrialKey) -> String {
        format!(
            "Run {}: {} {} on {} cores",
            index,
            trial.benchmark.as_deref().unwrap_or_default(),
            trial.size,
            trial.cores
        )
    }

    fn action_command(&self, action: Action, benchmark: &str) -> Option<String> {
        match action {
            Action::Build | Action::Uninstall => Some(format!(
                "{} -a {} -p {}",
                shell_quote(&self.manager),
                action.verb(),
                benchmark
            )),
            Action::Run => None,
        }
    }
}
