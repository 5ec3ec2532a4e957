use crate::access::apply::apply;
use crate::access::artifacts::{default_output_folder, ArtifactWriter, TRANSCRIPT_FILE};
use crate::access::model::{PrincipalRef, Snapshot};
use crate::access::outcome::{ActionOutcome, OutcomeStatus};
use crate::access::plan::{build_plan, PlanItem};
use crate::access::report::render_report;
use crate::access::resolver::resolve;
use crate::access::run_config::{OnPremActions, RunConfig, RunMode, SupervisorGrant};
use crate::access::snapshot::SnapshotCollector;
use crate::cmd::progress::{create_spinner, finish_spinner_error, finish_spinner_success};
use crate::cmd::session::Session;
use crate::config::{ConfigManager, OffboardingDefaults};
use crate::error::{Offboard365Error, Result};
use crate::services::Backends;
use crate::transcript::{self, echo};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct OffboardArgs {
    /// Leaver: user principal name, mail address or object id
    pub identity: String,

    /// Ticket reference recorded in the work notes and AD description
    #[arg(long)]
    pub ticket: String,

    /// Execute the plan (default is preview only)
    #[arg(long)]
    pub apply: bool,

    /// Tenant to use (defaults to the active tenant)
    #[arg(long)]
    pub tenant: Option<String>,

    /// Output folder (default: Documents/Offboarding/<identity>-<timestamp>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Convert the mailbox to Shared and stamp an expiry marker
    #[arg(long)]
    pub convert_to_shared: bool,

    /// Days until the shared mailbox expires
    #[arg(long)]
    pub expiry_days: Option<u32>,

    /// Custom attribute that receives the expiry marker
    #[arg(long)]
    pub expiry_attribute: Option<String>,

    /// Supervisor who receives mailbox access
    #[arg(long)]
    pub supervisor: Option<String>,

    /// Grant the supervisor FullAccess
    #[arg(long, requires = "supervisor")]
    pub supervisor_full_access: bool,

    /// Grant the supervisor SendAs
    #[arg(long, requires = "supervisor")]
    pub supervisor_send_as: bool,

    /// Remove static distribution list memberships
    #[arg(long)]
    pub remove_distribution_lists: bool,

    /// Remove static security and Microsoft 365 group memberships
    #[arg(long)]
    pub remove_groups: bool,

    /// Owner added to groups the leaver solely owns
    #[arg(long)]
    pub backup_owner: Option<String>,

    /// Remove FullAccess/SendAs/SendOnBehalf grants on the leaver's mailbox
    #[arg(long)]
    pub remove_delegations: bool,

    /// Remove all assigned licenses
    #[arg(long)]
    pub remove_licenses: bool,

    /// Block sign-in and revoke sessions
    #[arg(long)]
    pub block_sign_in: bool,

    /// Disable the on-premises AD account
    #[arg(long)]
    pub ad_disable: bool,

    /// Stamp the on-premises AD description with date and ticket
    #[arg(long)]
    pub ad_describe: bool,

    /// Move the on-premises AD account to the holding OU
    #[arg(long)]
    pub ad_move: bool,

    /// Holding OU distinguished name (overrides the configured default)
    #[arg(long)]
    pub holding_ou: Option<String>,
}

/// Combine command-line switches with configured defaults into a validated run config
pub fn build_run_config(args: &OffboardArgs, defaults: &OffboardingDefaults) -> Result<RunConfig> {
    let mode = if args.apply { RunMode::Apply } else { RunMode::Preview };

    let supervisor = args.supervisor.as_ref().map(|identity| {
        let explicit = args.supervisor_full_access || args.supervisor_send_as;
        SupervisorGrant {
            identity: identity.clone(),
            full_access: args.supervisor_full_access || !explicit,
            send_as: args.supervisor_send_as,
        }
    });

    let move_to_ou = if args.ad_move {
        let ou = args
            .holding_ou
            .clone()
            .or_else(|| defaults.holding_ou.clone())
            .ok_or_else(|| {
                Offboard365Error::InvalidConfig(
                    "--ad-move needs --holding-ou or offboarding.holding_ou in config.toml".into(),
                )
            })?;
        Some(ou)
    } else {
        None
    };

    let mut config = RunConfig::new(&args.identity, &args.ticket, Utc::now())
        .with_mode(mode)
        .with_tenant(args.tenant.clone())
        .with_output_folder(args.output.clone())
        .with_supervisor(supervisor)
        .with_backup_owner(args.backup_owner.clone())
        .with_removals(
            args.remove_distribution_lists,
            args.remove_groups,
            args.remove_delegations,
            args.remove_licenses,
        )
        .with_block_sign_in(args.block_sign_in)
        .with_on_prem(OnPremActions {
            disable: args.ad_disable,
            describe: args.ad_describe,
            move_to_ou,
        });

    let expiry_days = args.expiry_days.unwrap_or(defaults.shared_mailbox_expiry_days);
    let expiry_attribute = args
        .expiry_attribute
        .clone()
        .unwrap_or_else(|| defaults.expiry_attribute.clone());
    if args.convert_to_shared {
        config = config.with_shared_conversion(expiry_days, expiry_attribute);
    } else {
        config.expiry_days = expiry_days;
        config.expiry_attribute = expiry_attribute;
    }

    config.validate()
}

pub async fn run(args: OffboardArgs) -> Result<()> {
    let config_manager = ConfigManager::new()?;
    let defaults = config_manager.load_config()?.offboarding;
    let config = build_run_config(&args, &defaults)?;

    let folder = config
        .output_folder
        .clone()
        .unwrap_or_else(|| default_output_folder(&defaults.resolved_output_root(), &config));
    let writer = ArtifactWriter::create(folder)?;
    transcript::open(&writer.path(TRANSCRIPT_FILE))?;

    let result = connect_and_offboard(&config_manager, &config, &writer).await;
    if let Err(e) = &result {
        tracing::error!("Offboarding stopped: {}", e);
    }
    transcript::close();
    result
}

async fn connect_and_offboard(
    config_manager: &ConfigManager,
    config: &RunConfig,
    writer: &ArtifactWriter,
) -> Result<()> {
    let session = Session::connect(config_manager, config.tenant.as_deref()).await?;
    let backends = session.backends();

    let spinner = create_spinner(&format!("Resolving {}...", config.subject_identity));
    let subject = match resolve(backends.directory, &config.subject_identity).await {
        Ok(subject) => {
            finish_spinner_success(&spinner, &format!("Subject: {}", subject));
            subject
        }
        Err(e) => {
            finish_spinner_error(&spinner, "Subject could not be resolved");
            return Err(e);
        }
    };

    offboard(config, &subject, writer, backends).await
}

async fn capture(backends: Backends<'_>, subject: &PrincipalRef, config: &RunConfig, label: &str) -> Snapshot {
    let spinner = create_spinner(&format!("Capturing {} snapshot...", label));
    let snapshot = SnapshotCollector::new(backends)
        .capture(subject, &config.capture_options())
        .await;
    if snapshot.skipped.is_empty() {
        finish_spinner_success(&spinner, &format!("{} snapshot captured", label));
    } else {
        finish_spinner_error(
            &spinner,
            &format!("{} snapshot captured with {} skipped section(s)", label, snapshot.skipped.len()),
        );
    }
    snapshot
}

fn write_snapshot(writer: &ArtifactWriter, prefix: &str, snapshot: &Snapshot) {
    if let Err(e) = writer.write_snapshot(prefix, snapshot) {
        tracing::warn!("Could not write {} CSVs: {}", prefix, e);
    }
}

async fn offboard(
    config: &RunConfig,
    subject: &PrincipalRef,
    writer: &ArtifactWriter,
    backends: Backends<'_>,
) -> Result<()> {
    tracing::info!(
        run_id = %config.run_id,
        ticket = %config.ticket,
        mode = ?config.mode,
        "Offboarding {}",
        subject
    );

    let before = capture(backends, subject, config, "Before").await;
    write_snapshot(writer, "Before", &before);

    let plan = build_plan(&before, config);
    print_plan(&plan);
    if let Err(e) = writer.write_plan(&plan, config) {
        tracing::warn!("Could not write plan: {}", e);
    }

    let outcomes = if config.is_apply() {
        let spinner = create_spinner("Applying changes...");
        let outcomes = apply(&plan, &before, config, backends).await;
        finish_spinner_success(&spinner, &format!("{} action(s) attempted", outcomes.len()));
        outcomes
    } else {
        Vec::new()
    };

    let after = capture(backends, subject, config, "After").await;
    write_snapshot(writer, "After", &after);

    let report = render_report(&before, &after, config, &outcomes);
    if let Err(e) = writer.write_work_notes(&report) {
        tracing::warn!("Could not write work notes: {}", e);
    }

    print_outcomes(&outcomes);
    echo(format!("\n{}", report));
    echo(format!(
        "{} Artifacts written to {}",
        "→".cyan(),
        writer.folder().display().to_string().bold()
    ));
    if !config.is_apply() {
        echo(format!("{} Re-run with {} to execute the plan", "→".cyan(), "--apply".bold()));
    }

    Ok(())
}

pub fn print_plan(plan: &[PlanItem]) {
    echo(format!("\n{}", "What we will do:".bold()));
    echo("─".repeat(60));
    if plan.is_empty() {
        echo(format!("  {}", "Nothing requested or applicable".dimmed()));
    }
    for item in plan {
        echo(format!("  {} {}", format!("[{}]", item.area).cyan(), item.description));
    }
    echo("─".repeat(60));
}

pub fn print_outcomes(outcomes: &[ActionOutcome]) {
    if outcomes.is_empty() {
        return;
    }

    echo(format!("\n{}", "Results:".bold()));
    let (mut done, mut skipped, mut failed) = (0, 0, 0);
    for outcome in outcomes {
        let marker = match &outcome.status {
            OutcomeStatus::Done => {
                done += 1;
                "✓".green()
            }
            OutcomeStatus::Skipped(_) => {
                skipped += 1;
                "!".yellow()
            }
            OutcomeStatus::Failed(_) => {
                failed += 1;
                "✗".red()
            }
        };
        match &outcome.status {
            OutcomeStatus::Done => echo(format!("  {} [{}] {}", marker, outcome.area, outcome.action)),
            OutcomeStatus::Skipped(reason) | OutcomeStatus::Failed(reason) => echo(format!(
                "  {} [{}] {}: {}",
                marker,
                outcome.area,
                outcome.action,
                reason.dimmed()
            )),
        }
    }

    echo(format!(
        "\n{} {} done, {} skipped, {} failed",
        "→".cyan(),
        done.to_string().green(),
        skipped.to_string().yellow(),
        failed.to_string().red()
    ));
}
