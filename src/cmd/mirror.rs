use crate::access::mirror::{apply_mirror, prepare_mirror, MirrorOptions};
use crate::access::resolver::resolve;
use crate::cmd::offboard::{print_outcomes, print_plan};
use crate::cmd::progress::{create_spinner, finish_spinner_success};
use crate::cmd::session::Session;
use crate::config::ConfigManager;
use crate::error::Result;
use clap::Args;
use colored::Colorize;

#[derive(Args, Debug)]
pub struct MirrorArgs {
    /// User whose access is copied
    #[arg(long)]
    pub source: String,

    /// User who receives the access
    #[arg(long)]
    pub target: String,

    /// Add the missing access (default is preview only)
    #[arg(long)]
    pub apply: bool,

    /// Leave group and distribution list memberships alone
    #[arg(long)]
    pub skip_groups: bool,

    /// Leave mailbox delegations alone
    #[arg(long)]
    pub skip_delegations: bool,

    /// Tenant to use (defaults to the active tenant)
    #[arg(long)]
    pub tenant: Option<String>,
}

pub async fn run(args: MirrorArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let session = Session::connect(&config_manager, args.tenant.as_deref()).await?;
    let backends = session.backends();

    let source = resolve(backends.directory, &args.source).await?;
    let target = resolve(backends.directory, &args.target).await?;
    println!("{} Mirroring {} → {}", "→".cyan(), source, target);

    let options = MirrorOptions {
        groups: !args.skip_groups,
        delegations: !args.skip_delegations,
    };

    let spinner = create_spinner("Comparing access...");
    let plan = prepare_mirror(&source, &target, options, backends).await;
    finish_spinner_success(&spinner, "Access compared");

    for skip in &plan.skipped {
        println!("  {} {} not captured: {}", "!".yellow(), skip.section, skip.reason.dimmed());
    }

    print_plan(&plan.items());
    if plan.is_empty() {
        println!("{} Target already has everything the source has", "✓".green());
        return Ok(());
    }

    if !args.apply {
        println!("{} Re-run with {} to add the missing access", "→".cyan(), "--apply".bold());
        return Ok(());
    }

    let outcomes = apply_mirror(&plan, &target, backends).await;
    print_outcomes(&outcomes);
    Ok(())
}
