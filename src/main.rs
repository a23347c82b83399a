use clap::Parser;
use foreman::cli::commands::{agent, approval, communication, org, profile, workforce};
use foreman::cli::context::{load_config, AppContext};
use foreman::cli::{Cli, Commands};
use foreman::infrastructure::logging::logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config()?;
    let _logger_guard = logger::init(&config.logging)?;

    let ctx = AppContext::bootstrap(config).await?;

    match cli.command {
        Commands::Org { command } => org::execute(&ctx, command, cli.json).await?,
        Commands::Agent { command } => agent::execute(&ctx, command, cli.json).await?,
        Commands::Profile { command } => profile::execute(&ctx, command, cli.json).await?,
        Commands::Permission { command } => profile::execute_permission(&ctx, command, cli.json).await?,
        Commands::Approval { command } => approval::execute(&ctx, command, cli.json).await?,
        Commands::Schedule { command } => workforce::execute(&ctx, command, cli.json).await?,
        Commands::Workforce { command } => workforce::execute_workforce(&ctx, command, cli.json).await?,
        Commands::Message { command } => communication::execute(&ctx, command, cli.json).await?,
        Commands::Topology { command } => communication::execute_topology(&ctx, command, cli.json).await?,
        Commands::Daemon => {
            ctx.spawn_background_tasks();
            tracing::info!("foreman daemon running");
            tokio::signal::ctrl_c().await?;
        }
    }

    Ok(())
}
