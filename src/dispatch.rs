//! Phase dispatch: build, uninstall, or the run matrix.

use std::time::Duration;

use tracing::{info, warn};

use crate::display::Console;
use crate::errors::EvalError;
use crate::fixture::{ensure_fixture, parse_size};
use crate::invoke::ProcessInvoker;
use crate::target::{TargetProfile, TrialKey};
use crate::topology::{CoreGuard, CpuTopology};
use crate::trial::{StopFlag, TrialExecutor, TrialOutcome, TrialPlan};
use crate::types::{Action, RetryPolicy, RunConfiguration};

/// Counts for the closing summary line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PhaseSummary {
    /// Successful trials (run) or successful build/uninstall steps.
    pub completed: u32,
    /// Every process started for a trial or step, failed ones included.
    pub attempts: u32,
    /// Skipped build/uninstall steps and abandoned trials.
    pub failed: u32,
    pub interrupted: bool,
}

pub struct Dispatcher<'a> {
    target: &'a dyn TargetProfile,
    invoker: &'a mut dyn ProcessInvoker,
    topology: &'a mut dyn CpuTopology,
    policy: RetryPolicy,
    stop: StopFlag,
    dry_run: bool,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        target: &'a dyn TargetProfile,
        invoker: &'a mut dyn ProcessInvoker,
        topology: &'a mut dyn CpuTopology,
        policy: RetryPolicy,
        stop: StopFlag,
    ) -> Self {
        Self {
            target,
            invoker,
            topology,
            policy,
            stop,
            dry_run: false,
        }
    }

    /// Skip fixture writes and the server startup delay.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn dispatch(
        &mut self,
        config: &RunConfiguration,
        console: &mut Console,
    ) -> Result<PhaseSummary, EvalError> {
        match config.action {
            Action::Run => Ok(self.run(config, console)),
            action => self.manage(action, config, console),
        }
    }

    /// Build or uninstall each benchmark once. Failures are reported and
    /// skipped.
    fn manage(
        &mut self,
        action: Action,
        config: &RunConfiguration,
        console: &mut Console,
    ) -> Result<PhaseSummary, EvalError> {
        let (doing, done) = match action {
            Action::Build => ("Building", "built"),
            _ => ("Uninstalling", "uninstalled"),
        };

        let mut summary = PhaseSummary::default();
        let mut executor = TrialExecutor::new(&mut *self.invoker, self.policy, self.stop.clone());
        for bench in &config.benchmarks {
            if executor.stopped() {
                summary.interrupted = true;
                break;
            }
            let command = self.target.action_command(action, bench).ok_or_else(|| {
                EvalError::UnsupportedAction {
                    target: self.target.kind().name().to_string(),
                    action: action.verb().to_string(),
                }
            })?;

            console.info(&format!("{} {}", doing, bench));
            console.command(&command);
            summary.attempts += 1;
            let status = executor.execute_once(&command);
            if status != 0 {
                warn!(benchmark = %bench, status, "{} failed", action);
                console.failure(&format!("error {} {}", doing.to_lowercase(), bench));
                summary.failed += 1;
                continue;
            }
            console.success(&format!("successfully {} {}", done, bench));
            summary.completed += 1;
        }
        Ok(summary)
    }

    fn run(&mut self, config: &RunConfiguration, console: &mut Console) -> PhaseSummary {
        self.prepare_fixtures(config, console);
        self.start_server(console);

        let summary = self.run_matrix(config, console);

        if let Some(stop) = self.target.server_stop() {
            console.command(stop);
            let status = TrialExecutor::new(&mut *self.invoker, self.policy, self.stop.clone())
                .execute_once(stop);
            if status != 0 {
                warn!(status, "server stop command failed");
            }
        }
        summary
    }

    fn prepare_fixtures(&mut self, config: &RunConfiguration, console: &mut Console) {
        for size in &config.input_sizes {
            let Some(path) = self.target.fixture_path(size) else {
                continue;
            };
            let bytes = match parse_size(size) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!("{err}");
                    console.failure(&err.to_string());
                    continue;
                }
            };
            if self.dry_run {
                console.info(&format!("Fixture {} ({} bytes)", path.display(), bytes));
                continue;
            }
            match ensure_fixture(&path, bytes) {
                Ok(()) => info!(path = %path.display(), bytes, "fixture ready"),
                Err(err) => {
                    warn!("{err}");
                    console.failure(&err.to_string());
                }
            }
        }
    }

    fn start_server(&mut self, console: &mut Console) {
        let Some(start) = self.target.server_start() else {
            return;
        };
        console.command(start);
        let status = TrialExecutor::new(&mut *self.invoker, self.policy, self.stop.clone())
            .execute_once(start);
        if status != 0 {
            warn!(status, "server start command failed");
        }

        let delay = self.target.startup_delay();
        if !self.dry_run && delay > Duration::ZERO {
            std::thread::sleep(delay);
        }
    }

    /// Every core count × benchmark × input size, `repeat_count` successful
    /// trials each. The original core count is restored once, at the end.
    fn run_matrix(&mut self, config: &RunConfiguration, console: &mut Console) -> PhaseSummary {
        let mut summary = PhaseSummary::default();
        let mut guard = CoreGuard::new(&mut *self.topology, config.original_core_count);
        let mut executor = TrialExecutor::new(&mut *self.invoker, self.policy, self.stop.clone());

        let plan: Vec<Option<usize>> = if config.core_counts.is_empty() {
            vec![None]
        } else {
            config.core_counts.iter().copied().map(Some).collect()
        };
        let benchmarks: Vec<Option<&str>> = if config.benchmarks.is_empty() {
            vec![None]
        } else {
            config.benchmarks.iter().map(|b| Some(b.as_str())).collect()
        };

        'matrix: for requested in plan {
            if executor.stopped() {
                summary.interrupted = true;
                break;
            }
            let online = guard.online();
            let cores = requested.unwrap_or(online);
            if cores != online {
                console.info(&format!("Setting online cores: {} -> {}", online, cores));
                guard.set_online_cores(cores);
            }

            for bench in &benchmarks {
                for size in &config.input_sizes {
                    let key = TrialKey {
                        benchmark: bench.map(|b| b.to_string()),
                        size: size.clone(),
                        cores,
                    };
                    let command = self.target.trial_command(config, &key);
                    let label = key.label();

                    let mut index = 1;
                    while index <= config.repeat_count {
                        let banner = self.target.trial_banner(index, &key);
                        let trial = TrialPlan {
                            label: &label,
                            banner: &banner,
                            core_count: cores,
                            command: &command,
                        };
                        let outcome = executor.run_trial(console, index, &trial);
                        summary.attempts += outcome.attempts();
                        match outcome {
                            TrialOutcome::Succeeded { .. } => summary.completed += 1,
                            TrialOutcome::Abandoned { .. } => summary.failed += 1,
                            TrialOutcome::Interrupted { .. } => {
                                summary.interrupted = true;
                                break 'matrix;
                            }
                        }
                        index += 1;
                    }
                }
            }
        }

        if guard.changed() {
            console.info(&format!(
                "Restoring online cores to {}",
                config.original_core_count
            ));
            guard.restore();
        }
        summary
    }
}
