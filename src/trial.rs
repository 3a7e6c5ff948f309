use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::display::Console;
use crate::invoke::ProcessInvoker;
use crate::types::{RetryPolicy, TrialResult};

/// Set by the Ctrl-C handler; checked between attempts.
pub type StopFlag = Arc<AtomicBool>;

/// Status reported when a command could not be started at all.
pub const SPAWN_FAILED: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialOutcome {
    Succeeded { attempts: u32 },
    /// The retry policy gave up.
    Abandoned { attempts: u32 },
    Interrupted { attempts: u32 },
}

impl TrialOutcome {
    pub fn attempts(self) -> u32 {
        match self {
            TrialOutcome::Succeeded { attempts }
            | TrialOutcome::Abandoned { attempts }
            | TrialOutcome::Interrupted { attempts } => attempts,
        }
    }
}

/// One logical trial: which cell of the matrix it is, how to announce it and
/// what to run.
pub struct TrialPlan<'s> {
    pub label: &'s str,
    pub banner: &'s str,
    pub core_count: usize,
    pub command: &'s str,
}

/// Runs trials one at a time, blocking on each process.
pub struct TrialExecutor<'a> {
    invoker: &'a mut dyn ProcessInvoker,
    policy: RetryPolicy,
    stop: StopFlag,
}

impl<'a> TrialExecutor<'a> {
    pub fn new(invoker: &'a mut dyn ProcessInvoker, policy: RetryPolicy, stop: StopFlag) -> Self {
        Self {
            invoker,
            policy,
            stop,
        }
    }

    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Runs `command` once. A spawn failure is logged and reported as
    /// [`SPAWN_FAILED`].
    pub fn execute_once(&mut self, command: &str) -> i32 {
        match self.invoker.invoke(command) {
            Ok(code) => code,
            Err(err) => {
                warn!("{err}");
                SPAWN_FAILED
            }
        }
    }

    /// Repeats `trial` until it exits 0, the retry policy gives up, or a stop
    /// is requested. Failed attempts do not count as trials.
    pub fn run_trial(&mut self, console: &mut Console, index: u32, trial: &TrialPlan) -> TrialOutcome {
        let mut attempts = 0;
        loop {
            if self.stopped() {
                return TrialOutcome::Interrupted { attempts };
            }
            attempts += 1;

            console.info(trial.banner);
            console.command(trial.command);
            let result = TrialResult {
                label: trial.label.to_string(),
                core_count: trial.core_count,
                attempt_index: attempts,
                exit_status: self.execute_once(trial.command),
            };

            if result.succeeded() {
                console.success(&format!("Run {} done.", index));
                console.rule();
                return TrialOutcome::Succeeded { attempts };
            }

            warn!(
                label = %result.label,
                cores = result.core_count,
                attempt = result.attempt_index,
                status = result.exit_status,
                "trial failed"
            );
            if self.stopped() {
                return TrialOutcome::Interrupted { attempts };
            }
            if !self.policy.allows_retry(attempts - 1) {
                console.failure(&format!(
                    "error (status {}), giving up on run {} after {} attempts",
                    result.exit_status, index, attempts
                ));
                console.rule();
                return TrialOutcome::Abandoned { attempts };
            }
            console.failure(&format!("error (status {}), rerun", result.exit_status));
            console.rule();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EvalError;
    use crate::invoke::RecordingInvoker;

    fn plan<'s>(command: &'s str) -> TrialPlan<'s> {
        TrialPlan {
            label: "dedup simsmall",
            banner: "Run 1: dedup simsmall on 4 cores",
            core_count: 4,
            command,
        }
    }

    fn no_stop() -> StopFlag {
        Arc::new(AtomicBool::new(false))
    }

    #[test]
    fn success_first_time() {
        let mut rec = RecordingInvoker::new();
        let mut buf = Vec::new();
        let mut console = Console::new(&mut buf);
        let mut exec = TrialExecutor::new(&mut rec, RetryPolicy::Unlimited, no_stop());
        let outcome = exec.run_trial(&mut console, 1, &plan("parsecmgmt -p dedup"));
        assert_eq!(outcome, TrialOutcome::Succeeded { attempts: 1 });
        drop(console);
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Run 1: dedup simsmall on 4 cores"));
        assert!(text.contains("Executing: parsecmgmt -p dedup"));
        assert!(text.contains("Run 1 done."));
    }

    #[test]
    fn two_failures_then_success() {
        let mut rec = RecordingInvoker::new().script("dedup", [1, 139]);
        let mut buf = Vec::new();
        let mut console = Console::new(&mut buf);
        let outcome = {
            let mut exec = TrialExecutor::new(&mut rec, RetryPolicy::Unlimited, no_stop());
            exec.run_trial(&mut console, 1, &plan("parsecmgmt -p dedup"))
        };
        assert_eq!(outcome, TrialOutcome::Succeeded { attempts: 3 });
        assert_eq!(rec.commands.len(), 3);
        drop(console);
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.matches("rerun").count(), 2);
        assert_eq!(text.matches("Run 1 done.").count(), 1);
    }

    #[test]
    fn bounded_policy_gives_up() {
        let mut rec = RecordingInvoker::new().script("dedup", [1, 1, 1, 1]);
        let mut buf = Vec::new();
        let mut console = Console::new(&mut buf);
        let outcome = {
            let mut exec = TrialExecutor::new(&mut rec, RetryPolicy::Bounded(2), no_stop());
            exec.run_trial(&mut console, 1, &plan("parsecmgmt -p dedup"))
        };
        assert_eq!(outcome, TrialOutcome::Abandoned { attempts: 3 });
        assert_eq!(rec.commands.len(), 3);
    }

    #[test]
    fn bounded_zero_means_single_attempt() {
        let mut rec = RecordingInvoker::new().script("ab", [2]);
        let mut buf = Vec::new();
        let mut console = Console::new(&mut buf);
        let mut exec = TrialExecutor::new(&mut rec, RetryPolicy::Bounded(0), no_stop());
        let outcome = exec.run_trial(&mut console, 1, &plan("ab -k"));
        assert_eq!(outcome, TrialOutcome::Abandoned { attempts: 1 });
    }

    #[test]
    fn stop_flag_prevents_attempts() {
        let mut rec = RecordingInvoker::new();
        let mut buf = Vec::new();
        let mut console = Console::new(&mut buf);
        let stop = Arc::new(AtomicBool::new(true));
        let outcome = {
            let mut exec = TrialExecutor::new(&mut rec, RetryPolicy::Unlimited, stop);
            exec.run_trial(&mut console, 1, &plan("ab -k"))
        };
        assert_eq!(outcome, TrialOutcome::Interrupted { attempts: 0 });
        assert!(rec.commands.is_empty());
    }

    /// Fails forever and raises the stop flag on the third call, the way a
    /// Ctrl-C lands while the child is running.
    struct InterruptedOnThird {
        calls: u32,
        stop: StopFlag,
    }

    impl ProcessInvoker for InterruptedOnThird {
        fn invoke(&mut self, _command: &str) -> Result<i32, EvalError> {
            self.calls += 1;
            if self.calls == 3 {
                self.stop.store(true, Ordering::SeqCst);
                return Ok(130);
            }
            Ok(1)
        }
    }

    #[test]
    fn stop_during_unlimited_retry_ends_loop() {
        let stop = no_stop();
        let mut inv = InterruptedOnThird {
            calls: 0,
            stop: stop.clone(),
        };
        let mut buf = Vec::new();
        let mut console = Console::new(&mut buf);
        let outcome = {
            let mut exec = TrialExecutor::new(&mut inv, RetryPolicy::Unlimited, stop);
            exec.run_trial(&mut console, 1, &plan("parsecmgmt -p dedup"))
        };
        assert_eq!(outcome, TrialOutcome::Interrupted { attempts: 3 });
        assert_eq!(inv.calls, 3);
    }

    struct Unspawnable;

    impl ProcessInvoker for Unspawnable {
        fn invoke(&mut self, command: &str) -> Result<i32, EvalError> {
            Err(EvalError::SpawnError {
                command: command.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "sh"),
            })
        }
    }

    #[test]
    fn spawn_failure_counts_as_failed_attempt() {
        let mut inv = Unspawnable;
        let mut exec = TrialExecutor::new(&mut inv, RetryPolicy::Bounded(1), no_stop());
        assert_eq!(exec.execute_once("ab"), SPAWN_FAILED);
        let mut buf = Vec::new();
        let mut console = Console::new(&mut buf);
        let outcome = exec.run_trial(&mut console, 1, &plan("ab"));
        assert_eq!(outcome, TrialOutcome::Abandoned { attempts: 2 });
    }
}
