//! Point-in-time capture of a subject's access.
//!
//! Every section is queried on its own. A failing section degrades to
//! empty/absent and leaves a [`CaptureSkip`] behind; it never aborts the
//! capture.

use crate::access::model::{
    CaptureSkip, DelegationGrant, DelegationRight, ExternalDirectoryRef, GroupRef, LicenseRef, MailboxKind,
    MailboxState, OwnedGroupRef, PrincipalRef, Snapshot,
};
use crate::error::{Offboard365Error, Result};
use crate::graph::exchange::explicit_grants;
use crate::services::{Backends, MailboxInfo};
use chrono::Utc;

pub const SECTION_MAILBOX: &str = "Mailbox";
pub const SECTION_GROUPS: &str = "Groups";
pub const SECTION_OWNED_GROUPS: &str = "OwnedGroups";
pub const SECTION_DELEGATIONS: &str = "Delegations";
pub const SECTION_LICENSES: &str = "Licenses";
pub const SECTION_DYNAMIC_LISTS: &str = "DynamicDLs";
pub const SECTION_ON_PREM: &str = "OnPrem";

const PROVISIONED: &str = "Success";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    pub include_on_prem: bool,
    /// Custom attribute holding the shared-mailbox expiry marker
    pub expiry_attribute: String,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            include_on_prem: false,
            expiry_attribute: crate::access::run_config::DEFAULT_EXPIRY_ATTRIBUTE.to_string(),
        }
    }
}

enum MailboxLookup {
    Found(MailboxInfo),
    Absent,
    Failed,
}

/// Collects skips while the sections are being captured
#[derive(Default)]
struct Skips(Vec<CaptureSkip>);

impl Skips {
    fn record(&mut self, section: &str, reason: impl std::fmt::Display) {
        let reason = reason.to_string();
        tracing::warn!("Snapshot section {} skipped: {}", section, reason);
        self.0.push(CaptureSkip {
            section: section.to_string(),
            reason,
        });
    }

    fn or_empty<T: Default>(&mut self, section: &str, result: Result<T>) -> T {
        result.unwrap_or_else(|e| {
            self.record(section, e);
            T::default()
        })
    }
}

pub struct SnapshotCollector<'a> {
    backends: Backends<'a>,
}

impl<'a> SnapshotCollector<'a> {
    pub fn new(backends: Backends<'a>) -> Self {
        Self { backends }
    }

    pub async fn capture(&self, subject: &PrincipalRef, options: &CaptureOptions) -> Snapshot {
        tracing::info!("Capturing access snapshot for {}", subject);
        let mut skips = Skips::default();

        let lookup = match self.backends.mailboxes.get_mailbox(subject.mailbox_identity()).await {
            Ok(Some(info)) => MailboxLookup::Found(info),
            Ok(None) => MailboxLookup::Absent,
            Err(e) => {
                skips.record(SECTION_MAILBOX, e);
                MailboxLookup::Failed
            }
        };

        let mailbox = match &lookup {
            MailboxLookup::Found(info) => Some(mailbox_state(info, options)),
            _ => None,
        };

        let group_memberships = match self.group_memberships(subject, &mut skips).await {
            Ok(groups) => groups,
            Err(e) => {
                skips.record(SECTION_GROUPS, e);
                Vec::new()
            }
        };

        let owned_groups = match self.owned_groups(subject, &mut skips).await {
            Ok(groups) => groups,
            Err(e) => {
                skips.record(SECTION_OWNED_GROUPS, e);
                Vec::new()
            }
        };

        // With no mailbox there is nothing to delegate; a failed lookup still tries
        let delegations = match &lookup {
            MailboxLookup::Found(info) => {
                let result = self
                    .delegations(&info.primary_smtp_address, &info.grant_send_on_behalf_to)
                    .await;
                skips.or_empty(SECTION_DELEGATIONS, result)
            }
            MailboxLookup::Failed => {
                let result = self.delegations(subject.mailbox_identity(), &[]).await;
                skips.or_empty(SECTION_DELEGATIONS, result)
            }
            MailboxLookup::Absent => Vec::new(),
        };

        let licenses = {
            let result = self.licenses(subject).await;
            skips.or_empty(SECTION_LICENSES, result)
        };

        let dynamic_distribution_lists = {
            let result = self.dynamic_lists().await;
            skips.or_empty(SECTION_DYNAMIC_LISTS, result)
        };

        let (on_prem_available, directory_state) = if options.include_on_prem {
            self.on_prem(subject, &mut skips).await
        } else {
            (false, None)
        };

        Snapshot {
            subject: subject.clone(),
            captured_at: Utc::now(),
            mailbox,
            group_memberships,
            owned_groups,
            delegations,
            licenses,
            dynamic_distribution_lists,
            directory_state,
            on_prem_available,
            skipped: skips.0,
        }
    }

    async fn group_memberships(&self, subject: &PrincipalRef, skips: &mut Skips) -> Result<Vec<GroupRef>> {
        let summaries = self.backends.directory.member_of(&subject.directory_id).await?;

        let mut groups = Vec::with_capacity(summaries.len());
        for summary in summaries {
            match self.backends.directory.get_group(&summary.id).await {
                Ok(group) => groups.push(GroupRef {
                    is_dynamic_membership: group.is_dynamic(),
                    is_unified_group: group.is_unified(),
                    display_name: group
                        .display_name
                        .or(summary.display_name)
                        .unwrap_or_else(|| summary.id.clone()),
                    group_id: group.id,
                    mail_address: group.mail,
                    is_mail_enabled: group.mail_enabled,
                    is_security_group: group.security_enabled,
                }),
                Err(e) => skips.record(SECTION_GROUPS, format!("group {}: {}", summary.id, e)),
            }
        }

        groups.sort_by(|a, b| {
            a.display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase())
                .then_with(|| a.group_id.cmp(&b.group_id))
        });
        groups.dedup_by(|a, b| a.group_id == b.group_id);
        Ok(groups)
    }

    async fn owned_groups(&self, subject: &PrincipalRef, skips: &mut Skips) -> Result<Vec<OwnedGroupRef>> {
        let summaries = self.backends.directory.owned_groups(&subject.directory_id).await?;

        let mut owned = Vec::with_capacity(summaries.len());
        for summary in summaries {
            match self.backends.directory.owner_count(&summary.id).await {
                Ok(count) => owned.push(OwnedGroupRef {
                    display_name: summary.display_name.unwrap_or_else(|| summary.id.clone()),
                    group_id: summary.id,
                    current_owner_count: count,
                }),
                Err(e) => skips.record(SECTION_OWNED_GROUPS, format!("owners of {}: {}", summary.id, e)),
            }
        }

        owned.sort_by(|a, b| {
            a.display_name
                .to_lowercase()
                .cmp(&b.display_name.to_lowercase())
                .then_with(|| a.group_id.cmp(&b.group_id))
        });
        Ok(owned)
    }

    async fn delegations(&self, mailbox: &str, send_on_behalf: &[String]) -> Result<Vec<DelegationGrant>> {
        let full_access = self.backends.mailboxes.mailbox_permissions(mailbox).await?;
        let send_as = self.backends.mailboxes.recipient_permissions(mailbox).await?;

        let mut grants = explicit_grants(mailbox, &full_access, DelegationRight::FullAccess);
        grants.extend(explicit_grants(mailbox, &send_as, DelegationRight::SendAs));
        grants.extend(
            send_on_behalf
                .iter()
                .map(|delegate| DelegationGrant::new(mailbox, DelegationRight::SendOnBehalf, delegate.clone())),
        );

        grants.sort_by_key(DelegationGrant::sort_key);
        grants.dedup_by(|a, b| a.sort_key() == b.sort_key());
        Ok(grants)
    }

    async fn licenses(&self, subject: &PrincipalRef) -> Result<Vec<LicenseRef>> {
        let details = self.backends.directory.license_details(&subject.directory_id).await?;

        let mut licenses: Vec<LicenseRef> = details
            .into_iter()
            .map(|detail| LicenseRef {
                sku_name: detail.sku_part_number.unwrap_or_else(|| detail.sku_id.clone()),
                provisioned_service_plans: detail
                    .service_plans
                    .into_iter()
                    .filter(|p| p.provisioning_status.as_deref() == Some(PROVISIONED))
                    .map(|p| p.service_plan_name)
                    .collect(),
                sku_id: detail.sku_id,
            })
            .collect();

        licenses.sort_by(|a, b| a.sku_name.to_lowercase().cmp(&b.sku_name.to_lowercase()));
        Ok(licenses)
    }

    async fn dynamic_lists(&self) -> Result<Vec<String>> {
        let mut names = self.backends.mailboxes.dynamic_distribution_groups().await?;
        names.sort_by_key(|name| name.to_lowercase());
        names.dedup();
        Ok(names)
    }

    async fn on_prem(&self, subject: &PrincipalRef, skips: &mut Skips) -> (bool, Option<ExternalDirectoryRef>) {
        if !self.backends.on_prem.is_available().await {
            skips.record(
                SECTION_ON_PREM,
                Offboard365Error::MissingCapability("ActiveDirectory module not available".into()),
            );
            return (false, None);
        }

        match self.backends.on_prem.find_account(subject).await {
            Ok(account) => (true, account),
            Err(e) => {
                skips.record(SECTION_ON_PREM, e);
                (true, None)
            }
        }
    }
}

fn mailbox_state(info: &MailboxInfo, options: &CaptureOptions) -> MailboxState {
    MailboxState {
        primary_smtp_address: info.primary_smtp_address.clone(),
        display_name: info.display_name.clone(),
        kind: MailboxKind::from_recipient_type(&info.recipient_type_details),
        expiry_marker: info.custom_attributes.get(&options.expiry_attribute).cloned(),
    }
}
