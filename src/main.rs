use clap::Parser;
use engine_coordinator::application::positions::NewPosition;
use engine_coordinator::application::storage_manager::ThresholdUpdate;
use engine_coordinator::cli::commands::{Cli, Commands};
use engine_coordinator::cli::response::Response;
use engine_coordinator::domain::entities::connection::Connection;
use engine_coordinator::domain::entities::pseudo_position::PositionStatus;
use engine_coordinator::domain::ports::position_store::PositionFilter;
use engine_coordinator::domain::values::command::{EngineCommand, FleetCommand};
use engine_coordinator::domain::values::config_space::SpaceDefinition;
use engine_coordinator::domain::values::position_category::PositionCategory;
use engine_coordinator::domain::values::worker_kind::WorkerKind;
use engine_coordinator::infrastructure::config::CoordinatorConfig;
use engine_coordinator::infrastructure::logging::init_logging;
use engine_coordinator::EngineCoordinator;
use serde::Serialize;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    // Subscriber first, so malformed ENGINE_* values are reported.
    let log_format = std::env::var("ENGINE_LOG_FORMAT")
        .ok()
        .and_then(|f| f.parse().ok())
        .unwrap_or_default();
    init_logging(log_format, "info");
    let mut config = CoordinatorConfig::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    let coordinator = match EngineCoordinator::new(config) {
        Ok(c) => c,
        Err(e) => {
            println!("{}", Response::error(&e).to_json());
            std::process::exit(1);
        }
    };

    let response = run_command(&coordinator, cli.command).await;
    println!("{}", response.to_json());
    if !response.is_ok() {
        std::process::exit(1);
    }
}

async fn run_command(ec: &EngineCoordinator, cmd: Commands) -> Response {
    match cmd {
        Commands::ConnectionAdd {
            id,
            name,
            disabled,
            inactive,
            live_trading,
        } => {
            let mut connection = Connection::new(id, name);
            connection.enabled = !disabled;
            connection.active = !inactive;
            connection.live_trading = live_trading;
            ec.add_connection(connection).into()
        }
        Commands::Connections => ec.connections().into(),
        Commands::Status { id } => ec.status(&id).await.into(),
        Commands::Health { id } => ec.health(&id).await.into(),
        Commands::Start { id } => ec.command(&id, EngineCommand::Start).await.into(),
        Commands::Stop { id } => ec.command(&id, EngineCommand::Stop).await.into(),
        Commands::Pause { id } => ec.command(&id, EngineCommand::Pause).await.into(),
        Commands::Resume { id } => ec.command(&id, EngineCommand::Resume).await.into(),
        Commands::Reset { id } => ec.command(&id, EngineCommand::Reset).await.into(),
        Commands::Fleet { command } => ec.fleet(command.into()).await.into(),
        Commands::StatusAll => ec.status_all().await.into(),
        Commands::Stats => Response::ok(&ec.storage_stats()),
        Commands::Configure { json } => match parse_json::<ThresholdUpdate>(&json) {
            Ok(update) => ec.configure_thresholds(update).into(),
            Err(r) => r,
        },
        Commands::Cleanup => ec.cleanup_now().into(),
        Commands::Space {
            json,
            family,
            summary,
        } => {
            let result = match (json, family) {
                (Some(json), _) => match parse_json::<SpaceDefinition>(&json) {
                    Ok(definition) => ec.generate_space(&definition),
                    Err(r) => return r,
                },
                (None, Some(family)) => match family.parse::<WorkerKind>() {
                    Ok(family) => ec.default_space(family),
                    Err(e) => return Response::invalid(e),
                },
                (None, None) => return Response::invalid("provide a JSON definition or --family"),
            };
            match result {
                Ok(space) if summary => Response::ok(&SpaceSummary {
                    family: space.family,
                    cardinality: space.cardinality,
                    per_configuration_cap: space.per_configuration_cap,
                    capacity: space.capacity,
                }),
                other => other.into(),
            }
        }
        Commands::PositionAdd { json } => match parse_json::<NewPosition>(&json) {
            Ok(input) => ec.record_position(input).into(),
            Err(r) => r,
        },
        Commands::PositionPrice { id, price } => ec.update_position_price(&id, price).into(),
        Commands::PositionClose { id } => ec.close_position(&id).into(),
        Commands::Positions {
            category,
            connection,
            status,
            limit,
        } => {
            let category = match category.map(|c| c.parse::<PositionCategory>()).transpose() {
                Ok(c) => c,
                Err(e) => return Response::invalid(e),
            };
            let status = match status.map(|s| s.parse::<PositionStatus>()).transpose() {
                Ok(s) => s,
                Err(e) => return Response::invalid(e),
            };
            let filter = PositionFilter {
                category,
                connection_id: connection,
                status,
                limit: Some(limit),
            };
            ec.list_positions(&filter).into()
        }
        Commands::Run { monitor_interval } => run_forever(ec, monitor_interval).await,
    }
}

#[derive(Serialize)]
struct SpaceSummary {
    family: WorkerKind,
    cardinality: u64,
    per_configuration_cap: u64,
    capacity: u64,
}

#[derive(Serialize)]
struct RunSummary {
    started: engine_coordinator::domain::values::batch::BatchReport,
    stopped_by: &'static str,
}

fn parse_json<T: serde::de::DeserializeOwned>(json: &str) -> Result<T, Response> {
    serde_json::from_str(json).map_err(|e| Response::invalid(format!("invalid JSON payload: {e}")))
}

async fn run_forever(ec: &EngineCoordinator, monitor_interval: Option<u64>) -> Response {
    let started = match ec.fleet(FleetCommand::StartAll).await {
        Ok(report) => report,
        Err(e) => match e.batch_report() {
            // Keep running what did start; the failures are in the report.
            Some(report) if report.succeeded > 0 => {
                tracing::warn!(failed = report.failed, "Some engines failed to start");
                report.clone()
            }
            _ => return Response::error(&e),
        },
    };
    let monitoring = ec.start_monitoring(monitor_interval).await;
    tracing::info!(
        started = started.succeeded,
        skipped = started.skipped,
        monitor_interval_secs = ?monitoring.interval_secs,
        "Coordinator running; Ctrl-C to stop"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for Ctrl-C");
    }
    tracing::info!("Shutting down");
    ec.shutdown().await;

    Response::ok(&RunSummary {
        started,
        stopped_by: "ctrl_c",
    })
}
