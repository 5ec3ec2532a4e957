use clap::{Parser, Subcommand};
use colored::Colorize;
use offboard365::config::ConfigManager;
use offboard365::{cmd, error, transcript};

#[derive(Parser, Debug)]
#[command(
    name = "offboard365",
    about = "Offboard Microsoft 365 users with Before/After evidence",
    version,
    long_about = "Snapshot, plan and apply Microsoft 365 user offboarding\n\n\
                  Converts mailboxes, hands access to supervisors, strips group memberships,\n\
                  delegations and licenses, blocks sign-in and writes ticket-ready work notes.\n\
                  Every run is a preview unless --apply is given."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Preview or apply the offboarding of one user
    Offboard(cmd::offboard::OffboardArgs),

    /// Copy one user's static memberships and held delegations to another
    Mirror(cmd::mirror::MirrorArgs),

    /// Cancel future meetings organized by a user
    CancelMeetings(cmd::calendar::CancelMeetingsArgs),

    /// Manage tenant configurations
    #[command(subcommand)]
    Tenant(TenantCommands),
}

#[derive(Subcommand, Debug)]
enum TenantCommands {
    /// Add a new tenant configuration
    Add(cmd::tenant::TenantAddArgs),

    /// List all configured tenants
    List(cmd::tenant::TenantListArgs),

    /// Switch the active tenant
    Switch(cmd::tenant::TenantSwitchArgs),

    /// Remove a tenant configuration
    Remove(cmd::tenant::TenantRemoveArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> error::Result<()> {
    let cli = Cli::parse();

    let log_level = ConfigManager::new()
        .and_then(|manager| manager.load_config())
        .map(|config| config.log_level)
        .unwrap_or_default();
    transcript::init_logging(cli.verbose, Some(log_level.as_str()));

    match cli.command {
        Commands::Offboard(args) => cmd::offboard::run(args).await?,
        Commands::Mirror(args) => cmd::mirror::run(args).await?,
        Commands::CancelMeetings(args) => cmd::calendar::run(args).await?,
        Commands::Tenant(tenant_cmd) => match tenant_cmd {
            TenantCommands::Add(args) => cmd::tenant::add(args).await?,
            TenantCommands::List(args) => cmd::tenant::list(args).await?,
            TenantCommands::Switch(args) => cmd::tenant::switch(args).await?,
            TenantCommands::Remove(args) => cmd::tenant::remove(args).await?,
        },
    }

    Ok(())
}
