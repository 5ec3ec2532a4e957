//! Copy a source user's static memberships and held delegations onto a target user.

use crate::access::model::{CaptureSkip, DelegationGrant, GroupRef, PrincipalRef, Snapshot};
use crate::access::outcome::{ActionOutcome, OutcomeLog};
use crate::access::plan::{Area, PlanItem};
use crate::access::snapshot::{CaptureOptions, SnapshotCollector};
use crate::services::Backends;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorOptions {
    pub groups: bool,
    pub delegations: bool,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            groups: true,
            delegations: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorPlan {
    pub directory_groups: Vec<GroupRef>,
    pub distribution_lists: Vec<GroupRef>,
    /// Grants to issue, already rewritten with the target as grantee
    pub delegations: Vec<DelegationGrant>,
    pub skipped: Vec<CaptureSkip>,
}

impl MirrorPlan {
    pub fn is_empty(&self) -> bool {
        self.directory_groups.is_empty() && self.distribution_lists.is_empty() && self.delegations.is_empty()
    }

    pub fn items(&self) -> Vec<PlanItem> {
        let lists = self.distribution_lists.iter().map(|g| PlanItem {
            area: Area::DistributionLists,
            description: format!("Add to distribution list {}", g.display_name),
        });
        let groups = self.directory_groups.iter().map(|g| PlanItem {
            area: Area::Groups,
            description: format!("Add to {} group {}", g.kind_label(), g.display_name),
        });
        let grants = self.delegations.iter().map(|d| PlanItem {
            area: Area::Delegations,
            description: format!("Grant {} on {}", d.right, d.mailbox_address),
        });
        lists.chain(groups).chain(grants).collect()
    }
}

fn missing_groups<'s>(
    source: impl Iterator<Item = &'s GroupRef>,
    target: &Snapshot,
) -> Vec<GroupRef> {
    source
        .filter(|g| !target.group_memberships.iter().any(|t| t.group_id == g.group_id))
        .cloned()
        .collect()
}

/// Pure difference between source and target. Dynamic memberships are never mirrored.
pub fn plan_mirror(
    source: &Snapshot,
    target: &Snapshot,
    source_held: &[DelegationGrant],
    target_held: &[DelegationGrant],
    options: MirrorOptions,
) -> MirrorPlan {
    let mut plan = MirrorPlan::default();

    if options.groups {
        plan.directory_groups = missing_groups(source.static_directory_groups(), target);
        plan.distribution_lists = missing_groups(source.static_distribution_lists(), target);
    }

    if options.delegations {
        let target_mailbox = target.subject.mailbox_identity();
        let mut grants: Vec<DelegationGrant> = source_held
            .iter()
            .filter(|g| !g.mailbox_address.eq_ignore_ascii_case(target_mailbox))
            .filter(|g| {
                !target_held
                    .iter()
                    .any(|t| t.right == g.right && t.mailbox_address.eq_ignore_ascii_case(&g.mailbox_address))
            })
            .map(|g| DelegationGrant::new(g.mailbox_address.clone(), g.right, target_mailbox))
            .collect();
        grants.sort_by_key(DelegationGrant::sort_key);
        grants.dedup_by(|a, b| a.sort_key() == b.sort_key());
        plan.delegations = grants;
    }

    plan
}

/// Capture both users and compute what the target is missing
pub async fn prepare_mirror(
    source: &PrincipalRef,
    target: &PrincipalRef,
    options: MirrorOptions,
    backends: Backends<'_>,
) -> MirrorPlan {
    let collector = SnapshotCollector::new(backends);
    let capture_options = CaptureOptions::default();
    let source_snapshot = collector.capture(source, &capture_options).await;
    let target_snapshot = collector.capture(target, &capture_options).await;

    let mut skipped: Vec<CaptureSkip> = source_snapshot
        .skipped
        .iter()
        .chain(target_snapshot.skipped.iter())
        .cloned()
        .collect();

    let mut held = |principal: &PrincipalRef, result: crate::error::Result<Vec<DelegationGrant>>| {
        result.unwrap_or_else(|e| {
            tracing::warn!("Could not list delegations held by {}: {}", principal, e);
            skipped.push(CaptureSkip {
                section: format!("Delegations held by {}", principal.principal_name),
                reason: e.to_string(),
            });
            Vec::new()
        })
    };

    let (source_held, target_held) = if options.delegations {
        let source_result = backends.mailboxes.permissions_held_by(source).await;
        let source_held = held(source, source_result);
        let target_result = backends.mailboxes.permissions_held_by(target).await;
        let target_held = held(target, target_result);
        (source_held, target_held)
    } else {
        (Vec::new(), Vec::new())
    };

    let mut plan = plan_mirror(&source_snapshot, &target_snapshot, &source_held, &target_held, options);
    plan.skipped = skipped;
    plan
}

pub async fn apply_mirror(plan: &MirrorPlan, target: &PrincipalRef, backends: Backends<'_>) -> Vec<ActionOutcome> {
    let mut log = OutcomeLog::new();

    for list in &plan.distribution_lists {
        let result = backends
            .mailboxes
            .add_distribution_group_member(list.mail_identity(), &target.principal_name)
            .await;
        log.record(
            Area::DistributionLists,
            format!("Add {} to distribution list {}", target.principal_name, list.display_name),
            result,
        );
    }

    for group in &plan.directory_groups {
        let result = backends.directory.add_member(&group.group_id, &target.directory_id).await;
        log.record(
            Area::Groups,
            format!("Add {} to group {}", target.principal_name, group.display_name),
            result,
        );
    }

    for grant in &plan.delegations {
        let result = backends.mailboxes.grant(&grant.change()).await;
        log.record(
            Area::Delegations,
            format!("Grant {} on {} to {}", grant.right, grant.mailbox_address, grant.grantee),
            result,
        );
    }

    log.into_outcomes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::model::DelegationRight;
    use crate::access::resolver::resolve;
    use crate::access::testing::{jane_tenant, FakeTenant};

    fn mirror_tenant() -> FakeTenant {
        let tenant = jane_tenant();
        tenant.seed_user("new-id", "newhire@contoso.com", "New Hire", Some("newhire@contoso.com"));
        tenant.seed_mailbox("newhire@contoso.com", "New Hire", "UserMailbox");
        tenant.seed_member("g-vpn", "new-id");
        tenant.seed_permission("boss@contoso.com", DelegationRight::SendAs, "jane@contoso.com", false);
        tenant.seed_permission("boss@contoso.com", DelegationRight::FullAccess, "jane@contoso.com", false);
        tenant.seed_permission("boss@contoso.com", DelegationRight::FullAccess, "newhire@contoso.com", false);
        tenant
    }

    async fn principals(tenant: &FakeTenant) -> (PrincipalRef, PrincipalRef) {
        (
            resolve(tenant, "jane@contoso.com").await.unwrap(),
            resolve(tenant, "newhire@contoso.com").await.unwrap(),
        )
    }

    #[tokio::test]
    async fn test_plan_skips_dynamic_and_existing() {
        let tenant = mirror_tenant();
        let (source, target) = principals(&tenant).await;

        let plan = prepare_mirror(&source, &target, MirrorOptions::default(), tenant.backends()).await;

        let lists: Vec<_> = plan.distribution_lists.iter().map(|g| g.display_name.as_str()).collect();
        let groups: Vec<_> = plan.directory_groups.iter().map(|g| g.display_name.as_str()).collect();
        assert_eq!(lists, vec!["Finance-DL"]);
        assert_eq!(groups, vec!["Project Phoenix"]);
        assert_eq!(
            plan.delegations,
            vec![DelegationGrant::new(
                "boss@contoso.com",
                DelegationRight::SendAs,
                "newhire@contoso.com"
            )]
        );
        assert!(plan.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_apply_mirror_adds_access() {
        let tenant = mirror_tenant();
        let (source, target) = principals(&tenant).await;

        let plan = prepare_mirror(&source, &target, MirrorOptions::default(), tenant.backends()).await;
        let outcomes = apply_mirror(&plan, &target, tenant.backends()).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(ActionOutcome::is_done));
        assert!(tenant.is_member("g-fin", "new-id"));
        assert!(tenant.is_member("g-team", "new-id"));
        assert!(!tenant.is_member("g-eng", "new-id"));

        let again = prepare_mirror(&source, &target, MirrorOptions::default(), tenant.backends()).await;
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_options_limit_scope() {
        let tenant = mirror_tenant();
        let (source, target) = principals(&tenant).await;

        let options = MirrorOptions {
            groups: false,
            delegations: true,
        };
        let plan = prepare_mirror(&source, &target, options, tenant.backends()).await;
        assert!(plan.directory_groups.is_empty());
        assert!(plan.distribution_lists.is_empty());
        assert_eq!(plan.delegations.len(), 1);
        assert_eq!(plan.items()[0].area, Area::Delegations);
    }
}
