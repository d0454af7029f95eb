//! runwatch - wait for a CI run to finish
//!
//! ## Commands
//!
//! - `wait`: poll a run until it completes (live, or replayed with `-D`)
//! - `capture`: live wait that records every response into a capture file
//! - `inspect`: summarize a capture file
//!
//! The exit code reflects the run: 0 succeeded, 1 failed, 2 cancelled,
//! 3 timed out, 4 provider unreachable, 10 fatal error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use runwatch::config::DEFAULT_INTERVAL;
use runwatch::telemetry::Verbosity;
use runwatch::{
    cancel_pair, CancelHandle, CancelSignal, CaptureFile, CaptureRecorder, CaptureSummary,
    GithubTransport, ProviderConfig, ReplayDriver, ReplayPacing, StatusSource, WaitConfig, Waiter,
};
use runwatch_domain::{Outcome, RunId};
use tracing::{debug, info, warn};

/// Exit code for conditions that are not a CI result (bad fixture, misuse, configuration).
const FATAL_EXIT: u8 = 10;

/// Attempts and delay when resolving the run for the current commit.
const RESOLVE_ATTEMPTS: u32 = 30;
const RESOLVE_DELAY: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "runwatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Wait for a GitHub Actions run to finish, record it, replay it", long_about = None)]
struct Cli {
    /// Only report errors; no run summary
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// More output (-v debug, -vv trace including raw provider payloads)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll a run until it completes
    Wait {
        /// Numeric run id (default: newest run for HEAD, or the capture's run with -D)
        run_id: Option<u64>,

        /// Replay this capture file instead of contacting the provider
        #[arg(short = 'D', long)]
        debug_capture_file: Option<PathBuf>,

        /// Replay pacing: instant, realtime, or a speedup such as 10x
        #[arg(long, default_value = "instant")]
        pace: ReplayPacing,

        /// Record live responses into a capture file in this directory
        #[arg(long, conflicts_with = "debug_capture_file")]
        record_dir: Option<PathBuf>,

        #[command(flatten)]
        poll: PollArgs,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Wait for a run live and record every response
    Capture {
        /// Numeric run id to record (default: newest run for HEAD)
        run_id: Option<u64>,

        /// Directory for the capture file
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        #[command(flatten)]
        poll: PollArgs,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Summarize a capture file
    Inspect {
        /// Capture file to read
        file: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
struct PollArgs {
    /// Seconds between polls (default 2, or 0 when replaying)
    #[arg(long)]
    interval: Option<f64>,

    /// Consecutive failed fetches tolerated before giving up
    #[arg(long, default_value_t = runwatch::config::DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<f64>,
}

#[derive(Args, Debug, Clone)]
struct ProviderArgs {
    /// Repository as owner/repo (default: the origin remote)
    #[arg(long, env = "GITHUB_REPOSITORY")]
    repo: Option<String>,

    /// API token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// API base URL
    #[arg(long, env = "GITHUB_API_URL")]
    api_url: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    runwatch::telemetry::init_tracing(cli.json, Verbosity::from_flags(cli.quiet, cli.verbose));

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("runwatch: fatal: {e:#}");
            ExitCode::from(FATAL_EXIT)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let quiet = cli.quiet;
    match cli.command {
        Commands::Wait {
            run_id,
            debug_capture_file: Some(path),
            pace,
            poll,
            ..
        } => {
            let (handle, signal) = cancel_pair();
            forward_interrupt(handle)?;
            cmd_replay(&path, run_id, pace, &poll, signal, quiet).await
        }
        Commands::Wait {
            run_id,
            record_dir,
            poll,
            provider,
            ..
        } => {
            let (handle, signal) = cancel_pair();
            forward_interrupt(handle)?;
            cmd_live(run_id, &poll, &provider, record_dir, signal, quiet).await
        }
        Commands::Capture {
            run_id,
            dir,
            poll,
            provider,
        } => {
            let (handle, signal) = cancel_pair();
            forward_interrupt(handle)?;
            cmd_live(run_id, &poll, &provider, Some(dir), signal, quiet).await
        }
        Commands::Inspect { file } => cmd_inspect(&file),
    }
}

/// Cancel the wait on Ctrl-C, and on SIGTERM where the platform has one.
///
/// Handlers are installed before returning, so a signal arriving right after
/// this call is already routed to `handle` instead of killing the process.
fn forward_interrupt(handle: CancelHandle) -> Result<()> {
    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        #[cfg(unix)]
        let received = tokio::select! {
            interrupt = tokio::signal::ctrl_c() => interrupt.is_ok().then_some("interrupt"),
            _ = terminate.recv() => Some("terminate"),
        };
        #[cfg(not(unix))]
        let received = tokio::signal::ctrl_c().await.is_ok().then_some("interrupt");

        if let Some(signal) = received {
            warn!(signal, "signal received, cancelling wait");
            handle.cancel();
        }
    });
    Ok(())
}

async fn cmd_replay(
    path: &Path,
    run_id: Option<u64>,
    pace: ReplayPacing,
    poll: &PollArgs,
    cancel: CancelSignal,
    quiet: bool,
) -> Result<u8> {
    let driver = ReplayDriver::load(path, pace)
        .with_context(|| format!("failed to load capture {}", path.display()))?;
    let run_id = run_id.map(RunId::from).unwrap_or_else(|| driver.run_id().clone());
    let config = wait_config(run_id, poll, Duration::ZERO)?;
    info!(capture = %path.display(), %pace, "replaying capture");

    let mut waiter = Waiter::new(driver, config).with_cancel(cancel);
    run_waiter(&mut waiter, quiet).await
}

async fn cmd_live(
    run_id: Option<u64>,
    poll: &PollArgs,
    provider: &ProviderArgs,
    record_dir: Option<PathBuf>,
    cancel: CancelSignal,
    quiet: bool,
) -> Result<u8> {
    let transport = GithubTransport::new(provider_config(provider))
        .context("failed to set up GitHub transport")?;
    let run_id = match run_id {
        Some(id) => RunId::from(id),
        None => match resolve_head_run(&transport, &cancel).await? {
            Some(run_id) => run_id,
            None => {
                eprintln!("run lookup interrupted: {}", Outcome::Cancelled);
                return Ok(exit_code(&Outcome::Cancelled));
            }
        },
    };
    let config = wait_config(run_id.clone(), poll, DEFAULT_INTERVAL)?;

    match record_dir {
        Some(dir) => run_recorded(transport, config, dir, cancel, quiet).await,
        None => {
            let mut waiter = Waiter::new(transport, config).with_cancel(cancel);
            run_waiter(&mut waiter, quiet).await
        }
    }
}

/// `None` when the lookup was cancelled.
async fn resolve_head_run(
    transport: &GithubTransport,
    cancel: &CancelSignal,
) -> Result<Option<RunId>> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let sha = runwatch::git::capture_head_sha(&cwd).context("no run id given and HEAD is unknown")?;
    info!(head_sha = %sha, "resolving run for HEAD");
    let run_id = transport
        .resolve_run_for_commit(&sha, RESOLVE_ATTEMPTS, RESOLVE_DELAY, cancel)
        .await?;
    Ok(run_id)
}

/// Wait through a capture recorder; the capture is written however the wait ends.
async fn run_recorded<S: StatusSource>(
    source: S,
    config: WaitConfig,
    dir: PathBuf,
    cancel: CancelSignal,
    quiet: bool,
) -> Result<u8> {
    let recorder = CaptureRecorder::new(source, config.run_id.clone(), dir);
    let mut waiter = Waiter::new(recorder, config).with_cancel(cancel);
    let result = run_waiter(&mut waiter, quiet).await;
    let path = waiter
        .into_source()
        .close()
        .context("failed to write capture file")?;
    if !quiet {
        eprintln!("capture written to {}", path.display());
    }
    result
}

async fn run_waiter<S: StatusSource>(waiter: &mut Waiter<S>, quiet: bool) -> Result<u8> {
    let outcome = waiter.wait().await?;
    let run_id = waiter.config().run_id.clone();

    if !quiet {
        println!("{}", waiter.state().render_summary(0));
    }
    if outcome.is_success() {
        if !quiet {
            println!("Run {run_id}: {outcome}");
        }
    } else {
        eprintln!("Run {run_id}: {outcome}");
    }
    debug!(stats = ?waiter.stats(), "wait statistics");

    Ok(exit_code(&outcome))
}

fn exit_code(outcome: &Outcome) -> u8 {
    u8::try_from(outcome.exit_code()).unwrap_or(FATAL_EXIT)
}

fn cmd_inspect(file: &Path) -> Result<u8> {
    let capture = CaptureFile::load(file)
        .with_context(|| format!("failed to load capture {}", file.display()))?;
    let summary = CaptureSummary::from_capture(&capture)?;
    println!("{}", summary.render());
    Ok(0)
}

/// Environment first, then flags, then the origin remote for a missing repository.
fn provider_config(args: &ProviderArgs) -> ProviderConfig {
    let mut config = ProviderConfig::from_env();
    if let Some(url) = &args.api_url {
        config = config.with_api_url(url);
    }
    if let Some(repo) = &args.repo {
        config = config.with_repository(repo);
    }
    if let Some(token) = &args.token {
        config = config.with_token(token);
    }
    if config.repository.is_none() {
        let slug = std::env::current_dir()
            .map_err(runwatch::WatchError::from)
            .and_then(|cwd| runwatch::git::origin_repo_slug(&cwd));
        match slug {
            Ok(slug) => {
                debug!(repository = %slug, "repository taken from origin remote");
                config = config.with_repository(&slug);
            }
            Err(e) => debug!(error = %e, "no repository from origin remote"),
        }
    }
    config
}

fn wait_config(run_id: RunId, poll: &PollArgs, default_interval: Duration) -> Result<WaitConfig> {
    let interval = match poll.interval {
        Some(secs) => seconds("--interval", secs)?,
        None => default_interval,
    };
    let mut config = WaitConfig::new(run_id)
        .with_interval(interval)
        .with_max_retries(poll.max_retries);
    if let Some(secs) = poll.timeout {
        config = config.with_timeout(seconds("--timeout", secs)?);
    }
    Ok(config)
}

fn seconds(flag: &str, secs: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(d) => Ok(d),
        Err(_) => bail!("{flag} must be a non-negative number of seconds, got {secs}"),
    }
}
