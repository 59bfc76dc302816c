//! CLI command implementations
//!
//! Each command loads and validates the configuration first. Commands that
//! touch the state record or external systems build a tokio runtime and
//! block on it; `check-config` never does.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tracing::{error, info};

use crate::adapters::{
    CommandHook, CommandProbe, CommandPromoter, CommandRouting, FileStateBackend, LogPublisher,
    TcpProbe,
};
use crate::config::OrchestratorConfig;
use crate::health::HealthProbe;
use crate::notify::NotificationSink;
use crate::observability::{init_tracing, Event, MetricsRegistry};
use crate::orchestrator::{resolve_failure, Adapters, Orchestrator};
use crate::region::RegionId;
use crate::state::FailoverStateStore;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Parse arguments, install logging and dispatch.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.log_format);
    run_command(cli.command)
}

/// Dispatch a parsed command
pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::CheckConfig { config } => check_config(&config),
        Command::Init { config } => init(&config),
        Command::Status { config } => status(&config),
        Command::Run { config, once } => run_loop(&config, once),
        Command::Resolve { config, primary } => resolve(&config, &primary),
        Command::ResumeCutover { config } => resume_cutover(&config),
    }
}

fn load_config(path: &Path) -> CliResult<OrchestratorConfig> {
    let config = OrchestratorConfig::load(path)?;
    info!(
        event = Event::ConfigLoaded.as_str(),
        path = %path.display(),
        regions = config.regions.len(),
        initial_primary = %config.initial_primary,
    );
    Ok(config)
}

fn runtime() -> CliResult<Runtime> {
    Runtime::new()
        .map_err(|e| CliError::runtime_failed(format!("Failed to create tokio runtime: {}", e)))
}

fn open_store(config: &OrchestratorConfig) -> FailoverStateStore {
    Orchestrator::open_store(config, Arc::new(FileStateBackend::new(&config.state.path)))
}

fn hook(argv: &Option<Vec<String>>, timeout: Duration) -> Option<CommandHook> {
    argv.as_deref()
        .and_then(|argv| CommandHook::from_argv(argv, timeout))
}

fn required_hook(
    name: &str,
    argv: &Option<Vec<String>>,
    timeout: Duration,
) -> CliResult<CommandHook> {
    hook(argv, timeout)
        .ok_or_else(|| CliError::config_error(format!("hooks.{} is required", name)))
}

/// Wire the configured hooks and file backend into adapters.
fn build_adapters(config: &OrchestratorConfig, sink: NotificationSink) -> CliResult<Adapters> {
    let hooks = &config.hooks;
    let promotion_timeout = Duration::from_millis(config.promotion.call_timeout_ms);
    let routing_timeout = Duration::from_millis(config.cutover.call_timeout_ms);

    let probe: Arc<dyn HealthProbe> = match hook(&hooks.probe_command, config.probe_timeout()) {
        Some(hook) => Arc::new(CommandProbe::new(hook)),
        None => Arc::new(TcpProbe::new(config.probe_timeout())),
    };

    let promoter = CommandPromoter::new(
        required_hook("promote_command", &hooks.promote_command, promotion_timeout)?,
        required_hook("status_command", &hooks.status_command, promotion_timeout)?,
    );
    let routing = CommandRouting::new(
        required_hook("set_weight_command", &hooks.set_weight_command, routing_timeout)?,
        required_hook("get_weight_command", &hooks.get_weight_command, routing_timeout)?,
    );

    Ok(Adapters {
        probe,
        state: Arc::new(FileStateBackend::new(&config.state.path)),
        promoter: Arc::new(promoter),
        routing: Arc::new(routing),
        sink,
    })
}

fn spawn_sink(
    config: &OrchestratorConfig,
    metrics: &Arc<MetricsRegistry>,
) -> (NotificationSink, tokio::task::JoinHandle<()>) {
    NotificationSink::spawn(
        Arc::new(LogPublisher::new()),
        config.notification_config(),
        metrics.clone(),
    )
}

/// Validate the configuration file.
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let run_ready = config.validate_for_run();

    let regions: Vec<&str> = config.regions.iter().map(|r| r.id.as_str()).collect();
    write_response(json!({
        "initial_primary": config.initial_primary,
        "regions": regions,
        "records": config.cutover.records,
        "weight_steps": config.cutover.weight_steps,
        "state_path": config.state.path,
        "run_ready": run_ready.is_ok(),
        "run_error": run_ready.err().map(|e| e.to_string()),
    }))
}

/// Create the state record.
pub fn init(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let rt = runtime()?;

    rt.block_on(async {
        let store = open_store(&config);
        if store.try_read().await?.is_some() {
            return Err(CliError::already_initialized(store.key()));
        }
        let state = store.initialize(config.initial_primary.clone()).await?;
        write_response(json!({ "key": store.key(), "state": state }))
    })
}

/// Print the state record.
pub fn status(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let rt = runtime()?;

    rt.block_on(async {
        let store = open_store(&config);
        let state = store.read().await?;
        write_response(json!({ "key": store.key(), "state": state }))
    })
}

/// Run the control loop, or one cycle with `once`.
pub fn run_loop(config_path: &Path, once: bool) -> CliResult<()> {
    let config = load_config(config_path)?;
    config.validate_for_run()?;
    let rt = runtime()?;

    rt.block_on(async {
        let metrics = Arc::new(MetricsRegistry::new());
        let (sink, worker) = spawn_sink(&config, &metrics);
        let mut orchestrator = Orchestrator::new(&config, build_adapters(&config, sink)?, metrics.clone());

        let result = if once {
            orchestrator.run_cycle().await.map(|outcome| Some(outcome.to_json()))
        } else {
            let (tx, rx) = watch::channel(false);
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Shutdown signal received");
                        let _ = tx.send(true);
                    }
                    Err(e) => {
                        error!("Failed to listen for ctrl-c: {}", e);
                        // keep the sender alive so the loop is not stopped
                        let _held = tx;
                        std::future::pending::<()>().await;
                    }
                }
            });
            orchestrator.run(rx).await.map(|()| None)
        };

        // the worker exits once the last sink clone is gone and the queue drained
        drop(orchestrator);
        let _ = worker.await;

        let cycle = result?;
        write_response(json!({ "cycle": cycle, "metrics": metrics.snapshot() }))
    })
}

/// Operator remediation of a failed failover.
pub fn resolve(config_path: &Path, primary: &str) -> CliResult<()> {
    let config = load_config(config_path)?;
    let rt = runtime()?;

    rt.block_on(async {
        let metrics = Arc::new(MetricsRegistry::new());
        let (sink, worker) = spawn_sink(&config, &metrics);
        let store = open_store(&config);

        let result = resolve_failure(&store, &config.regions, RegionId::new(primary), &sink).await;
        drop(sink);
        let _ = worker.await;

        let state = result?;
        write_response(json!({ "key": store.key(), "state": state }))
    })
}

/// Finish a degraded cutover.
pub fn resume_cutover(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    config.validate_for_run()?;
    let rt = runtime()?;

    rt.block_on(async {
        let metrics = Arc::new(MetricsRegistry::new());
        let (sink, worker) = spawn_sink(&config, &metrics);
        let orchestrator = Orchestrator::new(&config, build_adapters(&config, sink)?, metrics);

        let result = orchestrator.resume_cutover().await;
        drop(orchestrator);
        let _ = worker.await;

        let outcome = result?;
        write_response(json!({
            "state": outcome.state,
            "steps_applied": outcome.steps_applied,
        }))
    })
}
