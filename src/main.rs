//! warden - keeps a managed service installed, running, stopped or absent
//! using the host's native service manager.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use warden::audit::{AuditEntry, AuditLogger};
use warden::backends::{detect_backend, FallbackChain, Platform};
use warden::config::Settings;
use warden::error::WardenError;
use warden::executor::{CommandRunner, SystemRunner};
use warden::model::{DesiredState, ProbeSignal};
use warden::platform::{CancelToken, HostPrivileges, PrivilegeCheck};
use warden::probe::{HostProbe, ProcessProbe, ProcessTable, SysinfoProcessTable, TcpPortCheck};
use warden::reconcile::{Goal, Reconciler};
use warden::report::Reporter;
use warden::templates::TemplateEngine;

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit code of `status` when the service is not running.
const EXIT_NOT_RUNNING: u8 = 3;

#[derive(Parser)]
#[command(name = "warden", version, about = "Install, start, stop and remove a managed service")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, default_value = "warden.toml")]
    config: PathBuf,

    /// Override the service name from the configuration.
    #[arg(long, global = true)]
    name: Option<String>,

    /// Override the liveness port from the configuration.
    #[arg(long, global = true)]
    port: Option<u32>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register the service to start at boot or logon, and start it.
    Install(RunArgs),
    /// Stop the service and delete its registration.
    Uninstall(RunArgs),
    /// Start the installed service.
    Start(RunArgs),
    /// Stop the service, keeping its registration.
    Stop(RunArgs),
    /// Show the observed state (exit 0 running, 3 not running).
    Status,
}

#[derive(Args)]
struct RunArgs {
    /// Probe and print the planned actions without executing them.
    #[arg(long)]
    dry_run: bool,
}

impl Command {
    fn goal(&self) -> Option<(Goal, &RunArgs)> {
        match self {
            Command::Install(args) => Some((Goal::Install, args)),
            Command::Uninstall(args) => Some((Goal::Uninstall, args)),
            Command::Start(args) => Some((Goal::Start, args)),
            Command::Stop(args) => Some((Goal::Stop, args)),
            Command::Status => None,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut reporter = Reporter::new(io::stdout().lock(), cli.json);

    let settings = match load_settings(&cli) {
        Ok(s) => s,
        Err(e) => {
            let _ = reporter.error(&e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&settings) {
        eprintln!("Error initializing logging: {}", e);
        return ExitCode::FAILURE;
    }

    debug!("{} v{}", NAME, VERSION);
    debug!(config = %cli.config.display(), "Configuration loaded");

    match run(&cli, &settings, &mut reporter) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let _ = reporter.error(&e);
            ExitCode::from(e.kind().exit_code())
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, WardenError> {
    let mut settings = Settings::load(&cli.config)?;
    settings.override_service(cli.name.clone(), cli.port)?;
    Ok(settings)
}

/// Everything the commands need, wired for this host.
struct Host {
    platform: Platform,
    backend: Arc<FallbackChain>,
    processes: Arc<dyn ProcessTable>,
    probe: Arc<HostProbe>,
    runner: Arc<dyn CommandRunner>,
}

fn build_host(settings: &Settings) -> Result<Host, WardenError> {
    let runner: Arc<dyn CommandRunner> =
        Arc::new(SystemRunner::new(settings.reconcile.command_timeout()));

    let templates = match &settings.backends.templates_dir {
        Some(dir) => TemplateEngine::with_overrides(&settings.base_dir.join(dir))?,
        None => TemplateEngine::builtin()?,
    };

    let platform = Platform::current();
    let backend = Arc::new(detect_backend(
        platform,
        &settings.backends,
        runner.clone(),
        templates,
    )?);
    let processes: Arc<dyn ProcessTable> = Arc::new(SysinfoProcessTable);
    let probe = Arc::new(HostProbe::new(
        backend.clone(),
        processes.clone(),
        Arc::new(TcpPortCheck::new(settings.reconcile.port_probe_timeout())),
    ));

    Ok(Host {
        platform,
        backend,
        processes,
        probe,
        runner,
    })
}

fn run<W: Write>(
    cli: &Cli,
    settings: &Settings,
    reporter: &mut Reporter<W>,
) -> Result<u8, WardenError> {
    let host = build_host(settings)?;
    let privileges = Arc::new(HostPrivileges::new(host.runner.clone()));

    let Some((goal, args)) = cli.command.goal() else {
        let spec = settings.service_spec()?;
        let outcome = host.probe.probe(&spec);
        let owner = host.backend.owner_name(&spec.name).ok().flatten();
        reporter.status(&spec, &outcome, owner)?;

        let port_checked = spec.port.is_some() && !outcome.is_missing(ProbeSignal::Port);
        return Ok(if outcome.is_missing(ProbeSignal::Registry) {
            1
        } else if outcome.state.satisfies(DesiredState::Running, port_checked) {
            0
        } else {
            EXIT_NOT_RUNNING
        });
    };

    // Only an install writes the executable into a registration. Without
    // privileges the run fails before that, so report that failure instead.
    let spec = if goal == Goal::Install && privileges.is_elevated() {
        settings.resolved_service_spec()?
    } else {
        settings.service_spec()?
    };

    let cancel = CancelToken::new();
    let reconciler = Reconciler::new(
        host.backend.clone(),
        host.probe.clone(),
        host.processes.clone(),
        privileges,
    )
    .with_verify_delay(settings.reconcile.verify_delay())
    .with_cancel_token(cancel.clone());

    if args.dry_run {
        let (outcome, plan) = reconciler.dry_run(&spec, goal)?;
        reporter.plan(goal, &spec, &outcome, &plan)?;
        return Ok(0);
    }

    if goal == Goal::Install && spec.restart_after_resume && !host.platform.supports_resume_hook() {
        info!(
            service = %spec.name,
            "No resume hook on this platform; the service manager's restart policy applies"
        );
    }
    if let Err(e) = cancel.install_ctrlc_handler() {
        warn!(error = %e, "Continuing without interrupt handling");
    }

    let started = Instant::now();
    let result = reconciler.reconcile(&spec, goal);
    let duration_ms = started.elapsed().as_millis() as u64;

    if settings.audit.enabled {
        let path = settings.base_dir.join(&settings.audit.log_path);
        let entry = AuditEntry::from_result(goal, &spec, &result, duration_ms);
        if let Err(e) = AuditLogger::new(&path).and_then(|logger| logger.log(&entry)) {
            warn!(path = %path.display(), error = %e, "Failed to write audit entry");
        }
    }

    reporter.result(goal, &spec, &result)?;
    Ok(result.exit_code())
}

/// Initialize logging based on settings. Logs go to stderr so stdout
/// carries only the report.
fn init_logging(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.logging.level))?;

    match settings.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .try_init()?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}
