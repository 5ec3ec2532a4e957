//! Ticket work notes.

use crate::access::artifacts::{CSV_SECTIONS, PLAN_FILE, TRANSCRIPT_FILE, WORK_NOTES_FILE};
use crate::access::model::Snapshot;
use crate::access::outcome::{ActionOutcome, OutcomeStatus};
use crate::access::run_config::RunConfig;
use std::fmt::Write;

fn count_line(out: &mut String, label: &str, before: usize, after: usize) {
    let _ = writeln!(out, "  {}: {} → {}", label, before, after);
}

fn mailbox_type(snapshot: &Snapshot) -> &str {
    snapshot
        .mailbox
        .as_ref()
        .map(|m| m.kind.as_str())
        .unwrap_or("none")
}

/// Render the fixed-shape work notes for a run
pub fn render_report(before: &Snapshot, after: &Snapshot, config: &RunConfig, outcomes: &[ActionOutcome]) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "M365 offboarding - {}", config.mode.banner());
    let _ = writeln!(out, "Subject: {}", before.subject);
    let _ = writeln!(out, "Ticket: {}", config.ticket);
    let _ = writeln!(out, "Run ID: {}", config.run_id);
    let _ = writeln!(out, "Started: {}", config.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out);

    let _ = writeln!(out, "Counts (before → after):");
    count_line(
        &mut out,
        "Group memberships",
        before.group_memberships.len(),
        after.group_memberships.len(),
    );
    count_line(
        &mut out,
        "Static distribution lists",
        before.static_distribution_lists().count(),
        after.static_distribution_lists().count(),
    );
    count_line(
        &mut out,
        "Static directory groups",
        before.static_directory_groups().count(),
        after.static_directory_groups().count(),
    );
    count_line(&mut out, "Owned groups", before.owned_groups.len(), after.owned_groups.len());
    count_line(
        &mut out,
        "Mailbox delegations",
        before.delegations.len(),
        after.delegations.len(),
    );
    count_line(&mut out, "Licenses", before.licenses.len(), after.licenses.len());
    let _ = writeln!(out, "  Mailbox type: {} → {}", mailbox_type(before), mailbox_type(after));
    if let Some(marker) = after.mailbox.as_ref().and_then(|m| m.expiry_marker.as_deref()) {
        let _ = writeln!(out, "  {}: {}", config.expiry_attribute, marker);
    }
    let _ = writeln!(out);

    if let Some(supervisor) = &config.supervisor {
        let rights: Vec<&str> = [(supervisor.full_access, "FullAccess"), (supervisor.send_as, "SendAs")]
            .into_iter()
            .filter_map(|(on, name)| on.then_some(name))
            .collect();
        let _ = writeln!(out, "Supervisor: {} ({})", supervisor.identity, rights.join(", "));
    }
    if let Some(owner) = &config.backup_owner {
        let _ = writeln!(out, "Backup owner: {}", owner);
    }
    if config.on_prem.any() {
        let state = match &after.directory_state {
            Some(account) => format!(
                "{} ({}, enabled: {})",
                account.sam_account_name, account.distinguished_name, account.enabled
            ),
            None if before.on_prem_available => "no account found".to_string(),
            None => "integration unavailable".to_string(),
        };
        let _ = writeln!(out, "On-premises AD: {}", state);
    }

    let done = outcomes.iter().filter(|o| o.is_done()).count();
    let _ = writeln!(out, "Actions completed: {} of {}", done, outcomes.len());

    let issues: Vec<String> = outcomes
        .iter()
        .filter_map(|o| match &o.status {
            OutcomeStatus::Done => None,
            OutcomeStatus::Skipped(reason) => Some(format!("[{}] {}: skipped ({})", o.area, o.action, reason)),
            OutcomeStatus::Failed(reason) => Some(format!("[{}] {}: FAILED ({})", o.area, o.action, reason)),
        })
        .chain(
            before
                .skipped
                .iter()
                .map(|s| format!("Before snapshot: {} not captured ({})", s.section, s.reason)),
        )
        .chain(
            after
                .skipped
                .iter()
                .map(|s| format!("After snapshot: {} not captured ({})", s.section, s.reason)),
        )
        .collect();

    if !issues.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Failures / skips:");
        for issue in issues {
            let _ = writeln!(out, "  - {}", issue);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Artifacts:");
    for section in CSV_SECTIONS {
        let _ = writeln!(out, "  - Before-{0}.csv / After-{0}.csv", section);
    }
    for file in [PLAN_FILE, WORK_NOTES_FILE, TRANSCRIPT_FILE] {
        let _ = writeln!(out, "  - {}", file);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::apply::apply;
    use crate::access::model::DelegationRight;
    use crate::access::plan::build_plan;
    use crate::access::resolver::resolve;
    use crate::access::run_config::RunMode;
    use crate::access::snapshot::SnapshotCollector;
    use crate::access::testing::{jane_tenant, security_group, FakeTenant};
    use crate::services::Backends;
    use chrono::Utc;

    async fn report_for(tenant: &FakeTenant, config: &RunConfig) -> String {
        let backends: Backends<'_> = tenant.backends();
        let subject = resolve(backends.directory, &config.subject_identity).await.unwrap();
        let collector = SnapshotCollector::new(backends);
        let before = collector.capture(&subject, &config.capture_options()).await;
        let plan = build_plan(&before, config);
        let outcomes = apply(&plan, &before, config, backends).await;
        let after = collector.capture(&subject, &config.capture_options()).await;
        render_report(&before, &after, config, &outcomes)
    }

    #[tokio::test]
    async fn test_report_shows_before_after_counts() {
        let tenant = FakeTenant::new();
        tenant.seed_user("u1", "sam@contoso.com", "Sam", Some("sam@contoso.com"));
        for n in 0..5 {
            let id = format!("g{}", n);
            tenant.seed_group(security_group(&id, &format!("Group {}", n)));
            tenant.seed_member(&id, "u1");
        }
        let config = RunConfig::new("sam@contoso.com", "INC42", Utc::now())
            .with_mode(RunMode::Apply)
            .with_removals(false, true, false, false);

        let report = report_for(&tenant, &config).await;

        assert!(report.contains("Group memberships: 5 → 0"), "{}", report);
        assert!(report.contains("Static directory groups: 5 → 0"));
        assert!(report.contains("APPLY"));
        assert!(report.contains("Ticket: INC42"));
        assert!(report.contains(&config.run_id.to_string()));
        assert!(!report.contains("Failures / skips"));
    }

    #[tokio::test]
    async fn test_report_shows_delegation_counts() {
        let tenant = FakeTenant::new();
        tenant.seed_user("u1", "sam@contoso.com", "Sam", Some("sam@contoso.com"));
        tenant.seed_mailbox("sam@contoso.com", "Sam", "UserMailbox");
        for trustee in ["a@contoso.com", "b@contoso.com", "c@contoso.com"] {
            tenant.seed_permission("sam@contoso.com", DelegationRight::FullAccess, trustee, false);
        }
        for trustee in ["a@contoso.com", "d@contoso.com"] {
            tenant.seed_permission("sam@contoso.com", DelegationRight::SendAs, trustee, false);
        }
        let config = RunConfig::new("sam@contoso.com", "INC43", Utc::now())
            .with_mode(RunMode::Apply)
            .with_removals(false, false, true, false);

        let report = report_for(&tenant, &config).await;

        assert!(report.contains("Mailbox delegations: 5 → 0"), "{}", report);
        assert!(report.contains("Actions completed: 5 of 5"));
    }

    #[tokio::test]
    async fn test_preview_report_lists_skips_and_artifacts() {
        let tenant = jane_tenant();
        tenant.fail_on("license_details");
        let config = RunConfig::new("jane@contoso.com", "INC1", Utc::now());

        let report = report_for(&tenant, &config).await;

        assert!(report.starts_with("M365 offboarding - PREVIEW"));
        assert!(report.contains("Group memberships: 4 → 4"));
        assert!(report.contains("Mailbox type: UserMailbox → UserMailbox"));
        assert!(report.contains("Before snapshot: Licenses not captured"));
        assert!(report.contains("Before-Delegations.csv / After-Delegations.csv"));
        assert!(report.contains("ServiceNow-WorkNotes.txt"));
    }
}
