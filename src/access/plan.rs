//! Pure plan builder: Before-snapshot + run configuration in, ordered plan out.

use crate::access::model::{DelegationRight, MailboxKind, Snapshot};
use crate::access::run_config::RunConfig;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Area {
    Mailbox,
    DistributionLists,
    Groups,
    Delegations,
    Licensing,
    Entra,
    ActiveDirectory,
}

/// Execution and reporting order of the plan categories
pub const AREA_ORDER: [Area; 7] = [
    Area::Mailbox,
    Area::DistributionLists,
    Area::Groups,
    Area::Delegations,
    Area::Licensing,
    Area::Entra,
    Area::ActiveDirectory,
];

impl Area {
    pub fn tag(&self) -> &'static str {
        match self {
            Area::Mailbox => "Mailbox",
            Area::DistributionLists => "EXO/DLs",
            Area::Groups => "Graph/Groups",
            Area::Delegations => "Mailbox-delegations",
            Area::Licensing => "Licensing",
            Area::Entra => "Entra",
            Area::ActiveDirectory => "AD",
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanItem {
    pub area: Area,
    pub description: String,
}

impl PlanItem {
    fn new(area: Area, description: impl Into<String>) -> Self {
        Self {
            area,
            description: description.into(),
        }
    }
}

/// Build the ordered plan. Deterministic: the same snapshot and config
/// always produce the same items.
pub fn build_plan(before: &Snapshot, config: &RunConfig) -> Vec<PlanItem> {
    let mut plan = Vec::new();
    for area in AREA_ORDER {
        match area {
            Area::Mailbox => plan_mailbox(before, config, &mut plan),
            Area::DistributionLists => plan_distribution_lists(before, config, &mut plan),
            Area::Groups => plan_groups(before, config, &mut plan),
            Area::Delegations => plan_delegations(before, config, &mut plan),
            Area::Licensing => plan_licensing(before, config, &mut plan),
            Area::Entra => plan_entra(config, &mut plan),
            Area::ActiveDirectory => plan_active_directory(before, config, &mut plan),
        }
    }
    plan
}

fn plan_mailbox(before: &Snapshot, config: &RunConfig, plan: &mut Vec<PlanItem>) {
    if let Some(mailbox) = &before.mailbox {
        if config.convert_to_shared && mailbox.kind != MailboxKind::Shared {
            plan.push(PlanItem::new(
                Area::Mailbox,
                format!(
                    "Convert mailbox {} to Shared; stamp {} = '{}'",
                    mailbox.primary_smtp_address,
                    config.expiry_attribute,
                    config.expiry_marker()
                ),
            ));
        }
    }

    // Listed even without a mailbox so the operator sees the request; apply skips it
    if let Some(supervisor) = &config.supervisor {
        let target = before
            .mailbox
            .as_ref()
            .map(|m| m.primary_smtp_address.as_str())
            .unwrap_or_else(|| before.subject.mailbox_identity());
        let rights = [
            (supervisor.full_access, DelegationRight::FullAccess),
            (supervisor.send_as, DelegationRight::SendAs),
        ];
        for (_, right) in rights.iter().filter(|(requested, _)| *requested) {
            plan.push(PlanItem::new(
                Area::Mailbox,
                format!("Grant {} on {} to supervisor {}", right, target, supervisor.identity),
            ));
        }
    }
}

fn plan_distribution_lists(before: &Snapshot, config: &RunConfig, plan: &mut Vec<PlanItem>) {
    if !config.remove_distribution_lists {
        return;
    }
    let count = before.static_distribution_lists().count();
    if count > 0 {
        plan.push(PlanItem::new(
            Area::DistributionLists,
            format!("Remove from {} static distribution list(s)", count),
        ));
    }
}

fn plan_groups(before: &Snapshot, config: &RunConfig, plan: &mut Vec<PlanItem>) {
    if let Some(backup_owner) = &config.backup_owner {
        let sole_owned = before.sole_owned_groups().count();
        if sole_owned > 0 {
            plan.push(PlanItem::new(
                Area::Groups,
                format!(
                    "Add {} as owner of {} group(s) the subject solely owns",
                    backup_owner, sole_owned
                ),
            ));
        }
    }

    if config.remove_groups {
        let count = before.static_directory_groups().count();
        if count > 0 {
            plan.push(PlanItem::new(
                Area::Groups,
                format!("Remove from {} static directory group(s)", count),
            ));
        }
    }
}

fn plan_delegations(before: &Snapshot, config: &RunConfig, plan: &mut Vec<PlanItem>) {
    if config.remove_delegations && !before.delegations.is_empty() {
        plan.push(PlanItem::new(
            Area::Delegations,
            format!(
                "Remove {} mailbox delegation(s) (FullAccess/SendAs/SendOnBehalf)",
                before.delegations.len()
            ),
        ));
    }
}

fn plan_licensing(before: &Snapshot, config: &RunConfig, plan: &mut Vec<PlanItem>) {
    if config.remove_licenses && !before.licenses.is_empty() {
        let names: Vec<&str> = before.licenses.iter().map(|l| l.sku_name.as_str()).collect();
        plan.push(PlanItem::new(
            Area::Licensing,
            format!("Remove {} license(s): {}", names.len(), names.join(", ")),
        ));
    }
}

fn plan_entra(config: &RunConfig, plan: &mut Vec<PlanItem>) {
    if config.block_sign_in {
        plan.push(PlanItem::new(Area::Entra, "Block sign-in and revoke all sessions"));
    }
}

fn plan_active_directory(before: &Snapshot, config: &RunConfig, plan: &mut Vec<PlanItem>) {
    if config.on_prem.any() && before.on_prem_available {
        plan.push(PlanItem::new(
            Area::ActiveDirectory,
            format!("On-premises account: {}", config.on_prem.labels().join(", ")),
        ));
    }
}
