pub mod commands;
pub mod context;
pub mod output;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "foreman", version, about = "Agent control plane CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit machine-readable JSON instead of human-formatted output.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Organization (tenant) management.
    Org {
        #[command(subcommand)]
        command: commands::org::OrgCommands,
    },
    /// Agent lifecycle management.
    Agent {
        #[command(subcommand)]
        command: commands::agent::AgentCommands,
    },
    /// Permission profile management.
    Profile {
        #[command(subcommand)]
        command: commands::profile::ProfileCommands,
    },
    /// Permission evaluation.
    Permission {
        #[command(subcommand)]
        command: commands::profile::PermissionCommands,
    },
    /// Approval workflow management.
    Approval {
        #[command(subcommand)]
        command: commands::approval::ApprovalCommands,
    },
    /// Work schedule and clock-event management.
    Schedule {
        #[command(subcommand)]
        command: commands::workforce::ScheduleCommands,
    },
    /// Workforce scheduler status.
    Workforce {
        #[command(subcommand)]
        command: commands::workforce::WorkforceCommands,
    },
    /// Communication observer: replay tool calls into the message log.
    Message {
        #[command(subcommand)]
        command: commands::communication::MessageCommands,
    },
    /// Agent-to-agent communication topology.
    Topology {
        #[command(subcommand)]
        command: commands::communication::TopologyCommands,
    },
    /// Run the control-plane daemon: health loop + workforce scheduler tick.
    Daemon,
}
