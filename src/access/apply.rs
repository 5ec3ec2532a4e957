//! Apply executor.
//!
//! Walks the categories in [`AREA_ORDER`], working only from the
//! Before-snapshot and the run configuration. Every unit of work is isolated
//! and lands in the outcome log; nothing here aborts the run.

use crate::access::model::{DelegationGrant, DelegationRight, MailboxKind, PrincipalRef, Snapshot};
use crate::access::outcome::{ActionOutcome, OutcomeLog};
use crate::access::plan::{Area, PlanItem, AREA_ORDER};
use crate::access::resolver::resolve;
use crate::access::run_config::RunConfig;
use crate::error::{Offboard365Error, Result};
use crate::services::Backends;

/// A grant issued during this run, with every name the grantee may appear under
struct IssuedGrant {
    grant: DelegationGrant,
    grantee: PrincipalRef,
}

impl IssuedGrant {
    fn covers(&self, other: &DelegationGrant) -> bool {
        self.grant.right == other.right
            && self.grant.mailbox_address.eq_ignore_ascii_case(&other.mailbox_address)
            && [
                self.grantee.mailbox_identity(),
                self.grantee.principal_name.as_str(),
                self.grantee.display_name.as_str(),
            ]
            .iter()
            .any(|name| name.eq_ignore_ascii_case(&other.grantee))
    }
}

struct Executor<'a> {
    before: &'a Snapshot,
    config: &'a RunConfig,
    backends: Backends<'a>,
    log: OutcomeLog,
    issued: Vec<IssuedGrant>,
}

pub async fn apply(
    plan: &[PlanItem],
    before: &Snapshot,
    config: &RunConfig,
    backends: Backends<'_>,
) -> Vec<ActionOutcome> {
    if !config.is_apply() {
        tracing::debug!("Preview mode: nothing to apply");
        return Vec::new();
    }

    tracing::info!(
        "Applying {} planned item(s) for {}",
        plan.len(),
        before.subject
    );

    let mut executor = Executor {
        before,
        config,
        backends,
        log: OutcomeLog::new(),
        issued: Vec::new(),
    };

    for area in AREA_ORDER {
        match area {
            Area::Mailbox => executor.mailbox().await,
            Area::DistributionLists => executor.distribution_lists().await,
            Area::Groups => executor.groups().await,
            Area::Delegations => executor.delegations().await,
            Area::Licensing => executor.licensing().await,
            Area::Entra => executor.entra().await,
            Area::ActiveDirectory => executor.active_directory().await,
        }
    }

    executor.log.into_outcomes()
}

impl<'a> Executor<'a> {
    fn subject(&self) -> &'a PrincipalRef {
        &self.before.subject
    }

    async fn mailbox(&mut self) {
        let wants_supervisor = self.config.supervisor.is_some();
        let Some(mailbox) = &self.before.mailbox else {
            if self.config.convert_to_shared || wants_supervisor {
                self.log.skip(Area::Mailbox, "Mailbox actions", "subject has no mailbox");
            }
            return;
        };
        let address = mailbox.primary_smtp_address.as_str();
        let mailboxes = self.backends.mailboxes;

        if self.config.convert_to_shared {
            if mailbox.kind != MailboxKind::Shared {
                let result = mailboxes.convert_to_shared(address).await;
                self.log
                    .record(Area::Mailbox, format!("Convert {} to Shared", address), result);
            }

            let marker = self.config.expiry_marker();
            let result = mailboxes
                .set_custom_attribute(address, &self.config.expiry_attribute, &marker)
                .await;
            self.log.record(
                Area::Mailbox,
                format!("Stamp {} = '{}'", self.config.expiry_attribute, marker),
                result,
            );
        }

        let Some(supervisor) = &self.config.supervisor else {
            return;
        };
        let rights: Vec<DelegationRight> = [
            (supervisor.full_access, DelegationRight::FullAccess),
            (supervisor.send_as, DelegationRight::SendAs),
        ]
        .into_iter()
        .filter_map(|(requested, right)| requested.then_some(right))
        .collect();

        let principal = match resolve(self.backends.directory, &supervisor.identity).await {
            Ok(principal) => principal,
            Err(e) => {
                for right in rights {
                    self.log.record(
                        Area::Mailbox,
                        format!("Grant {} to supervisor {}", right, supervisor.identity),
                        Err(Offboard365Error::PreconditionUnmet(format!(
                            "supervisor could not be resolved: {}",
                            e
                        ))),
                    );
                }
                return;
            }
        };

        for right in rights {
            let grant = DelegationGrant::new(address, right, principal.mailbox_identity());
            let result = mailboxes.grant(&grant.change()).await;
            if self.log.record(
                Area::Mailbox,
                format!("Grant {} on {} to supervisor {}", right, address, principal.mailbox_identity()),
                result,
            ) {
                self.issued.push(IssuedGrant {
                    grant,
                    grantee: principal.clone(),
                });
            }
        }
    }

    async fn distribution_lists(&mut self) {
        if !self.config.remove_distribution_lists {
            return;
        }
        let member = self.subject().principal_name.as_str();
        for list in self.before.static_distribution_lists() {
            let result = self
                .backends
                .mailboxes
                .remove_distribution_group_member(list.mail_identity(), member)
                .await;
            self.log.record(
                Area::DistributionLists,
                format!("Remove from distribution list {}", list.display_name),
                result,
            );
        }
    }

    async fn groups(&mut self) {
        let directory = self.backends.directory;

        if let Some(backup_owner) = &self.config.backup_owner {
            let sole_owned: Vec<_> = self.before.sole_owned_groups().collect();
            if !sole_owned.is_empty() {
                let resolved = resolve(directory, backup_owner).await;
                for group in sole_owned {
                    let action = format!("Add backup owner {} to {}", backup_owner, group.display_name);
                    let result = match &resolved {
                        Ok(owner) => directory.add_owner(&group.group_id, &owner.directory_id).await,
                        Err(e) => Err(Offboard365Error::PreconditionUnmet(format!(
                            "backup owner could not be resolved: {}",
                            e
                        ))),
                    };
                    self.log.record(Area::Groups, action, result);
                }
            }
        }

        if self.config.remove_groups {
            let user_id = self.subject().directory_id.as_str();
            for group in self.before.static_directory_groups() {
                let result = directory.remove_member(&group.group_id, user_id).await;
                self.log.record(
                    Area::Groups,
                    format!("Remove from {} group {}", group.kind_label(), group.display_name),
                    result,
                );
            }
        }
    }

    async fn delegations(&mut self) {
        if !self.config.remove_delegations {
            return;
        }
        for grant in &self.before.delegations {
            let action = match grant.right {
                DelegationRight::FullAccess => {
                    format!("Remove FullAccess for {} on {}", grant.grantee, grant.mailbox_address)
                }
                DelegationRight::SendAs => {
                    format!("Remove SendAs for {} on {}", grant.grantee, grant.mailbox_address)
                }
                DelegationRight::SendOnBehalf => format!(
                    "Remove {} from SendOnBehalf of {}",
                    grant.grantee, grant.mailbox_address
                ),
            };

            if self.issued.iter().any(|issued| issued.covers(grant)) {
                self.log
                    .skip(Area::Delegations, action, "kept: granted to the supervisor in this run");
                continue;
            }

            let result = self.backends.mailboxes.revoke(&grant.change()).await;
            self.log.record(Area::Delegations, action, result);
        }
    }

    async fn licensing(&mut self) {
        if !self.config.remove_licenses || self.before.licenses.is_empty() {
            return;
        }
        let sku_ids: Vec<String> = self.before.licenses.iter().map(|l| l.sku_id.clone()).collect();
        let names: Vec<&str> = self.before.licenses.iter().map(|l| l.sku_name.as_str()).collect();

        let result = self
            .backends
            .directory
            .remove_licenses(&self.subject().directory_id, &sku_ids)
            .await;
        self.log
            .record(Area::Licensing, format!("Remove licenses {}", names.join(", ")), result);
    }

    async fn entra(&mut self) {
        if !self.config.block_sign_in {
            return;
        }
        let directory = self.backends.directory;
        let user_id = self.subject().directory_id.as_str();

        let result = directory.set_account_enabled(user_id, false).await;
        self.log.record(Area::Entra, "Block sign-in", result);

        let result = directory.revoke_sign_in_sessions(user_id).await;
        self.log.record(Area::Entra, "Revoke sign-in sessions", result);
    }

    async fn active_directory(&mut self) {
        let actions = &self.config.on_prem;
        if !actions.any() {
            return;
        }
        if !self.before.on_prem_available {
            self.log
                .skip(Area::ActiveDirectory, "On-premises actions", "AD integration unavailable");
            return;
        }
        let Some(account) = &self.before.directory_state else {
            self.log.skip(
                Area::ActiveDirectory,
                "On-premises actions",
                "no on-premises account found for the subject",
            );
            return;
        };
        let on_prem = self.backends.on_prem;

        if actions.disable {
            let result = on_prem.disable_account(account).await;
            self.log.record(
                Area::ActiveDirectory,
                format!("Disable {}", account.sam_account_name),
                result,
            );
        }
        if actions.describe {
            let description = self.config.on_prem_description();
            let result = on_prem.set_description(account, &description).await;
            self.log.record(
                Area::ActiveDirectory,
                format!("Set description '{}'", description),
                result,
            );
        }
        if let Some(ou) = &actions.move_to_ou {
            let result: Result<()> = on_prem.move_account(account, ou).await;
            self.log
                .record(Area::ActiveDirectory, format!("Move to {}", ou), result);
        }
    }
}
