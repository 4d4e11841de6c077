use clap::{Parser, Subcommand, ValueEnum};
use crate::domain::values::command::FleetCommand;

#[derive(Parser)]
#[command(
    name = "engine-coordinator",
    about = "Per-connection trading engine lifecycle, health and storage control"
)]
pub struct Cli {
    /// Database path (overrides ENGINE_DB)
    #[arg(long, global = true)]
    pub db: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register or update an exchange connection
    ConnectionAdd {
        id: String,
        name: String,
        #[arg(long)]
        disabled: bool,
        #[arg(long)]
        inactive: bool,
        #[arg(long)]
        live_trading: bool,
    },
    /// List configured connections
    Connections,
    /// Engine state for one connection
    Status { id: String },
    /// Component health for one connection
    Health { id: String },
    /// Start one connection's engine
    Start { id: String },
    /// Stop one connection's engine
    Stop { id: String },
    /// Pause one connection's workers
    Pause { id: String },
    /// Resume a paused engine
    Resume { id: String },
    /// Reset counters and delete the connection's pseudo positions
    Reset { id: String },
    /// Fleet-wide command
    Fleet {
        #[arg(value_enum)]
        command: FleetAction,
    },
    /// Aggregate status of every connection
    StatusAll,
    /// Pseudo-position table utilization per category
    Stats,
    /// Update thresholds from JSON: {"buffer_percent": 20, "limits": {"base": 250}}
    Configure { json: String },
    /// Prune every category back to its base limit
    Cleanup,
    /// Expand a configuration space from JSON, or the stock space with --family
    Space {
        json: Option<String>,
        #[arg(long, conflicts_with = "json")]
        family: Option<String>,
        /// Only print cardinality and capacity
        #[arg(long)]
        summary: bool,
    },
    /// Record a pseudo position from JSON
    PositionAdd { json: String },
    /// Update the current price of an active pseudo position
    PositionPrice { id: String, price: f64 },
    /// Close a pseudo position
    PositionClose { id: String },
    /// List pseudo positions
    Positions {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        connection: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Start every eligible engine and storage monitoring, then wait for Ctrl-C
    Run {
        /// Monitoring interval in seconds (overrides ENGINE_MONITOR_INTERVAL_SECS)
        #[arg(long)]
        monitor_interval: Option<u64>,
    },
}

/// Fleet commands as spelled on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FleetAction {
    StartAll,
    StopAll,
    PauseAll,
    ResumeAll,
    EmergencyStop,
}

impl From<FleetAction> for FleetCommand {
    fn from(action: FleetAction) -> Self {
        match action {
            FleetAction::StartAll => FleetCommand::StartAll,
            FleetAction::StopAll => FleetCommand::StopAll,
            FleetAction::PauseAll => FleetCommand::PauseAll,
            FleetAction::ResumeAll => FleetCommand::ResumeAll,
            FleetAction::EmergencyStop => FleetCommand::EmergencyStop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fleet_command_parses_kebab_case() {
        let cli = Cli::try_parse_from(["engine-coordinator", "fleet", "emergency-stop"]).unwrap();
        match cli.command {
            Commands::Fleet { command } => {
                assert_eq!(FleetCommand::from(command), FleetCommand::EmergencyStop)
            }
            _ => panic!("expected fleet subcommand"),
        }
        assert!(Cli::try_parse_from(["engine-coordinator", "fleet", "restart-all"]).is_err());
    }
}
