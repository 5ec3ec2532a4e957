use crate::access::resolver::resolve;
use crate::cmd::progress::{create_spinner, finish_spinner_error, finish_spinner_success};
use crate::cmd::session::Session;
use crate::config::ConfigManager;
use crate::error::{Offboard365Error, Result};
use crate::graph::exchange::MAX_QUERY_WINDOW_DAYS;
use crate::services::MailboxService;
use clap::Args;
use colored::Colorize;

pub const DEFAULT_QUERY_WINDOW_DAYS: u32 = 365;

#[derive(Args, Debug)]
pub struct CancelMeetingsArgs {
    /// Leaver whose organized meetings are cancelled
    pub identity: String,

    /// How many days ahead to look for meetings (1-1825)
    #[arg(long, default_value_t = DEFAULT_QUERY_WINDOW_DAYS)]
    pub query_window_days: u32,

    /// Only report what would be cancelled
    #[arg(long)]
    pub preview_only: bool,

    /// Tenant to use (defaults to the active tenant)
    #[arg(long)]
    pub tenant: Option<String>,
}

pub fn validate_window(days: u32) -> Result<u32> {
    if (1..=MAX_QUERY_WINDOW_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(Offboard365Error::InvalidConfig(format!(
            "query window must be between 1 and {} days, got {}",
            MAX_QUERY_WINDOW_DAYS, days
        )))
    }
}

/// Cancel every future meeting the subject organizes within the window
pub async fn cancel_meetings(
    mailboxes: &dyn MailboxService,
    mailbox: &str,
    query_window_days: u32,
    preview_only: bool,
) -> Result<()> {
    let days = validate_window(query_window_days)?;
    if mailboxes.get_mailbox(mailbox).await?.is_none() {
        return Err(Offboard365Error::PreconditionUnmet(format!(
            "{} has no mailbox",
            mailbox
        )));
    }

    tracing::info!(
        mailbox,
        days,
        preview_only,
        "Cancelling organized meetings"
    );
    mailboxes
        .cancel_organized_meetings(mailbox, days, preview_only)
        .await
}

pub async fn run(args: CancelMeetingsArgs) -> Result<()> {
    validate_window(args.query_window_days)?;

    let config_manager = ConfigManager::new()?;
    let session = Session::connect(&config_manager, args.tenant.as_deref()).await?;
    let backends = session.backends();
    let subject = resolve(backends.directory, &args.identity).await?;

    let verb = if args.preview_only { "Previewing" } else { "Cancelling" };
    let spinner = create_spinner(&format!(
        "{} meetings organized by {} in the next {} day(s)...",
        verb, subject, args.query_window_days
    ));

    match cancel_meetings(
        backends.mailboxes,
        subject.mailbox_identity(),
        args.query_window_days,
        args.preview_only,
    )
    .await
    {
        Ok(()) => finish_spinner_success(&spinner, &format!("{} complete", verb)),
        Err(e) => {
            finish_spinner_error(&spinner, "Meeting cancellation failed");
            return Err(e);
        }
    }

    if args.preview_only {
        println!(
            "{} Preview only: Exchange reports the affected meetings, nothing was cancelled",
            "→".cyan()
        );
    }
    Ok(())
}
