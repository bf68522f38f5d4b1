mod cli;
mod error;

use std::sync::Arc;

use archer_api::{KeystoneAuth, NeutronClient};
use archer_config::Config;
use archer_core::{
    AgentConfig, AgentContext, AgentRunner, Job, PgStore, Scheduler, SchedulerConfig,
    connect_devices, listener,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::error::AgentError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_json);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, json: bool) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(cli: Cli) -> Result<(), AgentError> {
    for path in cli.config_files.iter().filter(|p| !p.is_file()) {
        warn!(path = %path.display(), "config file not found, skipping");
    }
    let config = archer_config::load(&cli.config_files)?;

    if cli.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let agent = config.to_agent_config()?;
    let auth = config.keystone_auth()?;
    config.database_url()?;

    if cli.check_config {
        connect_devices(&agent).map_err(|source| AgentError::Devices { source })?;
        NeutronClient::new(auth, &agent.transport)
            .map_err(|source| AgentError::NetworkApi { source })?;
        println!(
            "configuration OK: host {}, {} device(s), {} chassis",
            agent.host,
            agent.devices.len(),
            agent.vcmps.len()
        );
        return Ok(());
    }

    serve(&config, agent, auth).await
}

/// Run the agent until a shutdown signal or a fatal listener error.
async fn serve(config: &Config, agent: AgentConfig, auth: KeystoneAuth) -> Result<(), AgentError> {
    let (bigips, vcmps) = connect_devices(&agent).map_err(|source| AgentError::Devices { source })?;
    let network = NeutronClient::new(auth, &agent.transport)
        .map_err(|source| AgentError::NetworkApi { source })?;
    let store = PgStore::connect(config.database_url()?, config.database.max_connections)
        .await
        .map_err(|source| AgentError::Database { source })?;
    let pool = store.pool().clone();

    let host = agent.host.clone();
    let listener_timeout = agent.listener_timeout;
    let shutdown_timeout = agent.shutdown_timeout;
    let scheduler_config = SchedulerConfig::from(&agent);

    let ctx = Arc::new(AgentContext::new(
        agent,
        Arc::new(store),
        Arc::new(network),
        bigips,
        vcmps,
    ));
    ctx.store()
        .register_agent(&ctx.registration())
        .await
        .map_err(|source| AgentError::Database { source })?;
    match ctx.refresh_active_device().await {
        Ok(device) => info!(device = %device.name(), "starting with active device"),
        Err(e) => warn!(error = %e, "no active device yet, reconciliation waits for failover state"),
    }

    let cancel = CancellationToken::new();
    let runner = Arc::new(AgentRunner::new(Arc::clone(&ctx)));
    let scheduler = Scheduler::start(runner, &scheduler_config, cancel.clone());
    scheduler
        .sender()
        .submit(Job::PendingSync)
        .await
        .map_err(|source| AgentError::Scheduler { source })?;

    let mut listener_task = tokio::spawn({
        let sender = scheduler.sender();
        let cancel = cancel.clone();
        async move { listener::run(&pool, sender, &host, listener_timeout, cancel).await }
    });
    info!(host = %ctx.host(), "agent running");

    let outcome = tokio::select! {
        signal = shutdown_signal() => match signal {
            Ok(()) => {
                info!("shutdown requested");
                Ok(())
            }
            Err(e) => Err(AgentError::Signal(e)),
        },
        joined = &mut listener_task => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(AgentError::Listener { source }),
            Err(e) => Err(AgentError::Internal(format!("listener task failed: {e}"))),
        },
    };

    cancel.cancel();
    listener_task.abort();
    let stopped = scheduler
        .shutdown(shutdown_timeout)
        .await
        .map_err(|source| AgentError::Scheduler { source });
    outcome.and(stopped)
}

/// Resolves on Ctrl-C or SIGTERM.
#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
