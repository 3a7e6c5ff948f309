use std::ffi::OsString;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::Result;
use chrono::Local;
use clap::{ArgAction, Command, CommandFactory, Parser};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use smv_eval::classify::classify;
use smv_eval::config::Config;
use smv_eval::display::{self, Console};
use smv_eval::dispatch::Dispatcher;
use smv_eval::invoke::{ProcessInvoker, RecordingInvoker, ShellInvoker};
use smv_eval::target;
use smv_eval::topology::{CpuTopology, SYSFS_CPU_ROOT, SimulatedTopology, SysfsTopology};
use smv_eval::trial::StopFlag;
use smv_eval::types::{RetryPolicy, TargetKind};

#[derive(Parser)]
#[command(
    name = "smv-eval",
    version,
    about = "Drive load generators and benchmark suites across repeated trials and core counts"
)]
struct Cli {
    /// Benchmark target
    target: TargetKind,

    /// Run count, input size, benchmark name, action (build/run/uninstall) or <n>core, in any order
    tokens: Vec<String>,

    /// TOML file with per-target overrides
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print commands instead of running them; leaves CPUs and fixtures alone
    #[arg(long)]
    dry_run: bool,

    /// Give up on a failing trial after this many retries (default: retry forever)
    #[arg(long)]
    max_retries: Option<u32>,

    /// More diagnostics on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[arg(long, hide = true, default_value = SYSFS_CPU_ROOT)]
    sysfs_root: PathBuf,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("SMV_EVAL_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Whether clap defines `flag` (`--long`, `--long=value` or a cluster of
/// shorts such as `-vv`).
fn is_known_flag(cmd: &Command, flag: &str) -> bool {
    if let Some(long) = flag.strip_prefix("--") {
        let name = long.split_once('=').map_or(long, |(name, _)| name);
        return cmd.get_arguments().any(|a| a.get_long() == Some(name));
    }
    let shorts = &flag[1..];
    !shorts.is_empty()
        && shorts
            .chars()
            .all(|c| cmd.get_arguments().any(|a| a.get_short() == Some(c)))
}

/// Pulls hyphenated words clap has no definition for (`-foo`, `-3`) out of
/// `args` so they reach the classifier as ignored tokens instead of failing
/// the parse. Everything after `--` is left alone.
fn split_stray_flags(cmd: &Command, args: Vec<OsString>) -> (Vec<OsString>, Vec<String>) {
    let mut kept = Vec::with_capacity(args.len());
    let mut stray = Vec::new();
    let mut escaped = false;
    for (i, arg) in args.into_iter().enumerate() {
        let flag = arg
            .to_str()
            .filter(|t| t.len() > 1 && t.starts_with('-'))
            .map(str::to_string);
        match flag {
            Some(f) if i > 0 && !escaped && f == "--" => {
                escaped = true;
                kept.push(arg);
            }
            Some(f) if i > 0 && !escaped && !is_known_flag(cmd, &f) => stray.push(f),
            _ => kept.push(arg),
        }
    }
    (kept, stray)
}

fn run() -> Result<()> {
    let mut cmd = Cli::command();
    cmd.build();
    let (args, stray) = split_stray_flags(&cmd, std::env::args_os().collect());
    let program = args
        .first()
        .map(|a| a.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => return Err(err.into()),
    };
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;
    let target = target::profile_for(cli.target, &config);

    let stop: StopFlag = Arc::new(AtomicBool::new(false));
    let handler_flag = stop.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst)) {
        warn!("failed to set Ctrl-C handler: {err}");
    }

    let mut sysfs = SysfsTopology::new(&cli.sysfs_root);
    let mut simulated;
    let topology: &mut dyn CpuTopology = if cli.dry_run {
        simulated = SimulatedTopology::mirror(&sysfs);
        &mut simulated
    } else {
        &mut sysfs
    };
    let original_cores = topology.online_count();

    let mut tokens = vec![program];
    tokens.extend(cli.tokens.iter().cloned());
    tokens.extend(stray);
    let classified = classify(target.as_ref(), &tokens, original_cores);
    for c in &classified.classifications {
        debug!(token = %c.token, rule = c.rule.unwrap_or("ignored"), "classified");
    }
    let run_config = classified.config;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut console = Console::new(&mut out);
    console.raw(&display::format_started(Local::now()));
    console.raw(&display::format_welcome());
    if cli.dry_run {
        console.info("Dry run: commands are printed, not executed");
    }
    console.info(&target.describe(&run_config));

    let started = Instant::now();
    let mut shell = ShellInvoker;
    let mut recorder = RecordingInvoker::new();
    let invoker: &mut dyn ProcessInvoker = if cli.dry_run {
        &mut recorder
    } else {
        &mut shell
    };
    let policy = cli
        .max_retries
        .map(RetryPolicy::Bounded)
        .unwrap_or_default();

    let summary = Dispatcher::new(target.as_ref(), invoker, topology, policy, stop)
        .dry_run(cli.dry_run)
        .dispatch(&run_config, &mut console)?;

    if summary.interrupted {
        console.failure("Interrupted");
    }
    console.info(&format!(
        "Summary: {} completed, {} failed, {} processes started",
        summary.completed, summary.failed, summary.attempts
    ));
    console.raw(&display::format_elapsed(started.elapsed()));

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{}", err.to_string().trim_end());
        process::exit(1);
    }
}
