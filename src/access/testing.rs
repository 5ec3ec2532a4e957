//! In-memory tenant implementing all three backend traits, with failure injection.

use crate::access::model::{DelegationChange, DelegationGrant, DelegationRight, ExternalDirectoryRef, PrincipalRef};
use crate::error::{Offboard365Error, Result};
use crate::graph::exchange::explicit_grants;
use crate::services::{
    Backends, DirectoryGroup, DirectoryService, DirectoryUser, GroupSummary, LicenseDetail, MailboxInfo,
    MailboxService, OnPremDirectory, PermissionEntry, ServicePlanStatus,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default, Clone)]
pub struct TenantState {
    pub users: Vec<DirectoryUser>,
    pub groups: BTreeMap<String, DirectoryGroup>,
    pub members: BTreeMap<String, BTreeSet<String>>,
    pub owners: BTreeMap<String, BTreeSet<String>>,
    pub licenses: BTreeMap<String, Vec<LicenseDetail>>,
    pub disabled: BTreeSet<String>,
    pub revoked_sessions: BTreeSet<String>,
    pub mailboxes: BTreeMap<String, MailboxInfo>,
    pub full_access: BTreeMap<String, Vec<PermissionEntry>>,
    pub send_as: BTreeMap<String, Vec<PermissionEntry>>,
    pub dynamic_lists: Vec<String>,
    pub cancelled_meetings: Vec<(String, u32, bool)>,
    pub on_prem_available: bool,
    pub ad_accounts: BTreeMap<String, ExternalDirectoryRef>,
    /// Operation names that fail with a Graph error
    pub failing: BTreeSet<String>,
    /// Every mutating call, in order
    pub writes: Vec<String>,
}

#[derive(Debug, Default)]
pub struct FakeTenant {
    state: Mutex<TenantState>,
}

pub fn security_group(id: &str, name: &str) -> DirectoryGroup {
    DirectoryGroup {
        id: id.to_string(),
        display_name: Some(name.to_string()),
        mail: None,
        mail_enabled: false,
        security_enabled: true,
        group_types: Vec::new(),
        membership_rule: None,
    }
}

pub fn distribution_list(id: &str, name: &str) -> DirectoryGroup {
    DirectoryGroup {
        mail: Some(format!("{}@contoso.com", name.to_lowercase())),
        mail_enabled: true,
        security_enabled: false,
        ..security_group(id, name)
    }
}

pub fn unified_group(id: &str, name: &str) -> DirectoryGroup {
    DirectoryGroup {
        group_types: vec!["Unified".to_string()],
        ..distribution_list(id, name)
    }
}

pub fn dynamic_group(id: &str, name: &str) -> DirectoryGroup {
    DirectoryGroup {
        group_types: vec!["DynamicMembership".to_string()],
        membership_rule: Some("user.department -eq \"Engineering\"".to_string()),
        ..distribution_list(id, name)
    }
}

fn injected(op: &str) -> Offboard365Error {
    Offboard365Error::GraphApiError(format!("injected failure in {}", op))
}

fn key(value: &str) -> String {
    value.to_lowercase()
}

impl FakeTenant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backends(&self) -> Backends<'_> {
        Backends {
            directory: self,
            mailboxes: self,
            on_prem: self,
        }
    }

    pub fn state(&self) -> MutexGuard<'_, TenantState> {
        self.state.lock().unwrap()
    }

    pub fn fail_on(&self, op: &str) {
        self.state().failing.insert(op.to_string());
    }

    pub fn seed_user(&self, id: &str, upn: &str, display_name: &str, mail: Option<&str>) {
        self.state().users.push(DirectoryUser {
            id: id.to_string(),
            user_principal_name: upn.to_string(),
            display_name: Some(display_name.to_string()),
            mail: mail.map(str::to_string),
        });
    }

    pub fn seed_mailbox(&self, address: &str, display_name: &str, recipient_type: &str) {
        self.state().mailboxes.insert(
            key(address),
            MailboxInfo {
                primary_smtp_address: address.to_string(),
                display_name: display_name.to_string(),
                recipient_type_details: recipient_type.to_string(),
                grant_send_on_behalf_to: Vec::new(),
                custom_attributes: BTreeMap::new(),
            },
        );
    }

    pub fn seed_group(&self, group: DirectoryGroup) {
        self.state().groups.insert(group.id.clone(), group);
    }

    pub fn seed_member(&self, group_id: &str, user_id: &str) {
        self.state()
            .members
            .entry(group_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    pub fn seed_owner(&self, group_id: &str, user_id: &str) {
        self.state()
            .owners
            .entry(group_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    pub fn seed_license(&self, user_id: &str, sku_id: &str, sku_name: &str, plans: &[(&str, &str)]) {
        self.state()
            .licenses
            .entry(user_id.to_string())
            .or_default()
            .push(LicenseDetail {
                sku_id: sku_id.to_string(),
                sku_part_number: Some(sku_name.to_string()),
                service_plans: plans
                    .iter()
                    .map(|(name, status)| ServicePlanStatus {
                        service_plan_name: name.to_string(),
                        provisioning_status: Some(status.to_string()),
                    })
                    .collect(),
            });
    }

    pub fn seed_permission(&self, mailbox: &str, right: DelegationRight, trustee: &str, inherited: bool) {
        let entry = PermissionEntry {
            trustee: trustee.to_string(),
            access_rights: vec![right.as_str().to_string()],
            is_inherited: inherited,
            deny: false,
        };
        let mut state = self.state();
        match right {
            DelegationRight::FullAccess => state.full_access.entry(key(mailbox)).or_default().push(entry),
            DelegationRight::SendAs => state.send_as.entry(key(mailbox)).or_default().push(entry),
            DelegationRight::SendOnBehalf => {
                if let Some(mbx) = state.mailboxes.get_mut(&key(mailbox)) {
                    mbx.grant_send_on_behalf_to.push(trustee.to_string());
                }
            }
        }
    }

    pub fn seed_dynamic_list(&self, name: &str) {
        self.state().dynamic_lists.push(name.to_string());
    }

    pub fn seed_ad_account(&self, upn: &str, sam: &str, dn: &str) {
        let mut state = self.state();
        state.on_prem_available = true;
        state.ad_accounts.insert(
            key(upn),
            ExternalDirectoryRef {
                sam_account_name: sam.to_string(),
                distinguished_name: dn.to_string(),
                enabled: true,
                description: None,
            },
        );
    }

    pub fn is_member(&self, group_id: &str, user_id: &str) -> bool {
        self.state()
            .members
            .get(group_id)
            .is_some_and(|m| m.contains(user_id))
    }

    fn check(&self, op: &str) -> Result<()> {
        if self.state().failing.contains(op) {
            return Err(injected(op));
        }
        Ok(())
    }

    fn write(&self, op: &str, detail: String) -> Result<()> {
        self.check(op)?;
        self.state().writes.push(format!("{} {}", op, detail));
        Ok(())
    }

    fn user_id_for(state: &TenantState, identity: &str) -> Option<String> {
        state
            .users
            .iter()
            .find(|u| {
                u.id == identity
                    || u.user_principal_name.eq_ignore_ascii_case(identity)
                    || u.mail.as_deref().is_some_and(|m| m.eq_ignore_ascii_case(identity))
            })
            .map(|u| u.id.clone())
    }

    fn group_id_for(state: &TenantState, identity: &str) -> Option<String> {
        state
            .groups
            .values()
            .find(|g| {
                g.mail.as_deref().is_some_and(|m| m.eq_ignore_ascii_case(identity))
                    || g.display_name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(identity))
            })
            .map(|g| g.id.clone())
    }

    fn summaries(state: &TenantState, ids: impl Iterator<Item = String>) -> Vec<GroupSummary> {
        ids.map(|id| GroupSummary {
            display_name: state.groups.get(&id).and_then(|g| g.display_name.clone()),
            id,
        })
        .collect()
    }
}

#[async_trait]
impl DirectoryService for FakeTenant {
    async fn get_user(&self, identity: &str) -> Result<Option<DirectoryUser>> {
        self.check("get_user")?;
        Ok(self
            .state()
            .users
            .iter()
            .find(|u| u.id == identity || u.user_principal_name.eq_ignore_ascii_case(identity))
            .cloned())
    }

    async fn find_users(&self, address: &str) -> Result<Vec<DirectoryUser>> {
        self.check("find_users")?;
        Ok(self
            .state()
            .users
            .iter()
            .filter(|u| {
                u.user_principal_name.eq_ignore_ascii_case(address)
                    || u.mail.as_deref().is_some_and(|m| m.eq_ignore_ascii_case(address))
            })
            .cloned()
            .collect())
    }

    async fn member_of(&self, user_id: &str) -> Result<Vec<GroupSummary>> {
        self.check("member_of")?;
        let state = self.state();
        let ids = state
            .members
            .iter()
            .filter(|(_, members)| members.contains(user_id))
            .map(|(group, _)| group.clone())
            .collect::<Vec<_>>();
        Ok(Self::summaries(&state, ids.into_iter()))
    }

    async fn get_group(&self, group_id: &str) -> Result<DirectoryGroup> {
        self.check("get_group")?;
        self.check(&format!("get_group:{}", group_id))?;
        self.state()
            .groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| Offboard365Error::ResourceNotFound(group_id.to_string()))
    }

    async fn owned_groups(&self, user_id: &str) -> Result<Vec<GroupSummary>> {
        self.check("owned_groups")?;
        let state = self.state();
        let ids = state
            .owners
            .iter()
            .filter(|(_, owners)| owners.contains(user_id))
            .map(|(group, _)| group.clone())
            .collect::<Vec<_>>();
        Ok(Self::summaries(&state, ids.into_iter()))
    }

    async fn owner_count(&self, group_id: &str) -> Result<usize> {
        self.check("owner_count")?;
        Ok(self.state().owners.get(group_id).map_or(0, BTreeSet::len))
    }

    async fn license_details(&self, user_id: &str) -> Result<Vec<LicenseDetail>> {
        self.check("license_details")?;
        Ok(self.state().licenses.get(user_id).cloned().unwrap_or_default())
    }

    async fn add_member(&self, group_id: &str, user_id: &str) -> Result<()> {
        self.write("add_member", format!("{} {}", group_id, user_id))?;
        self.seed_member(group_id, user_id);
        Ok(())
    }

    async fn remove_member(&self, group_id: &str, user_id: &str) -> Result<()> {
        self.write("remove_member", format!("{} {}", group_id, user_id))?;
        if let Some(members) = self.state().members.get_mut(group_id) {
            members.remove(user_id);
        }
        Ok(())
    }

    async fn add_owner(&self, group_id: &str, user_id: &str) -> Result<()> {
        self.write("add_owner", format!("{} {}", group_id, user_id))?;
        self.seed_owner(group_id, user_id);
        Ok(())
    }

    async fn remove_licenses(&self, user_id: &str, sku_ids: &[String]) -> Result<()> {
        self.write("remove_licenses", format!("{} {}", user_id, sku_ids.join(",")))?;
        if let Some(licenses) = self.state().licenses.get_mut(user_id) {
            licenses.retain(|l| !sku_ids.contains(&l.sku_id));
        }
        Ok(())
    }

    async fn set_account_enabled(&self, user_id: &str, enabled: bool) -> Result<()> {
        self.write("set_account_enabled", format!("{} {}", user_id, enabled))?;
        let mut state = self.state();
        if enabled {
            state.disabled.remove(user_id);
        } else {
            state.disabled.insert(user_id.to_string());
        }
        Ok(())
    }

    async fn revoke_sign_in_sessions(&self, user_id: &str) -> Result<()> {
        self.write("revoke_sign_in_sessions", user_id.to_string())?;
        self.state().revoked_sessions.insert(user_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl MailboxService for FakeTenant {
    async fn get_mailbox(&self, identity: &str) -> Result<Option<MailboxInfo>> {
        self.check("get_mailbox")?;
        Ok(self.state().mailboxes.get(&key(identity)).cloned())
    }

    async fn mailbox_permissions(&self, mailbox: &str) -> Result<Vec<PermissionEntry>> {
        self.check("mailbox_permissions")?;
        Ok(self.state().full_access.get(&key(mailbox)).cloned().unwrap_or_default())
    }

    async fn recipient_permissions(&self, mailbox: &str) -> Result<Vec<PermissionEntry>> {
        self.check("recipient_permissions")?;
        Ok(self.state().send_as.get(&key(mailbox)).cloned().unwrap_or_default())
    }

    async fn permissions_held_by(&self, trustee: &PrincipalRef) -> Result<Vec<DelegationGrant>> {
        self.check("permissions_held_by")?;
        let state = self.state();
        let holds = |name: &str| {
            name.eq_ignore_ascii_case(trustee.mailbox_identity())
                || name.eq_ignore_ascii_case(&trustee.principal_name)
        };

        let mut grants = Vec::new();
        for (mailbox, entries) in &state.full_access {
            let held: Vec<_> = entries.iter().filter(|e| holds(&e.trustee)).cloned().collect();
            grants.extend(explicit_grants(mailbox, &held, DelegationRight::FullAccess));
        }
        for (mailbox, entries) in &state.send_as {
            let held: Vec<_> = entries.iter().filter(|e| holds(&e.trustee)).cloned().collect();
            grants.extend(explicit_grants(mailbox, &held, DelegationRight::SendAs));
        }
        for mbx in state.mailboxes.values() {
            for delegate in mbx.grant_send_on_behalf_to.iter().filter(|d| holds(d)) {
                grants.push(DelegationGrant::new(
                    mbx.primary_smtp_address.to_lowercase(),
                    DelegationRight::SendOnBehalf,
                    delegate.clone(),
                ));
            }
        }
        Ok(grants)
    }

    async fn dynamic_distribution_groups(&self) -> Result<Vec<String>> {
        self.check("dynamic_distribution_groups")?;
        Ok(self.state().dynamic_lists.clone())
    }

    async fn convert_to_shared(&self, mailbox: &str) -> Result<()> {
        self.write("convert_to_shared", mailbox.to_string())?;
        if let Some(mbx) = self.state().mailboxes.get_mut(&key(mailbox)) {
            mbx.recipient_type_details = "SharedMailbox".to_string();
        }
        Ok(())
    }

    async fn set_custom_attribute(&self, mailbox: &str, attribute: &str, value: &str) -> Result<()> {
        self.write("set_custom_attribute", format!("{} {}={}", mailbox, attribute, value))?;
        if let Some(mbx) = self.state().mailboxes.get_mut(&key(mailbox)) {
            mbx.custom_attributes.insert(attribute.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn grant(&self, change: &DelegationChange) -> Result<()> {
        self.write("grant", format!("{:?}", change))?;
        match change {
            DelegationChange::FullAccess(c) => {
                self.seed_permission(&c.identity, DelegationRight::FullAccess, &c.user, false)
            }
            DelegationChange::SendAs(c) => {
                self.seed_permission(&c.identity, DelegationRight::SendAs, &c.trustee, false)
            }
            DelegationChange::SendOnBehalf(c) => {
                self.seed_permission(&c.identity, DelegationRight::SendOnBehalf, &c.delegate, false)
            }
        }
        Ok(())
    }

    async fn revoke(&self, change: &DelegationChange) -> Result<()> {
        self.write("revoke", format!("{:?}", change))?;
        let mut state = self.state();
        match change {
            DelegationChange::FullAccess(c) => {
                if let Some(entries) = state.full_access.get_mut(&key(&c.identity)) {
                    entries.retain(|e| !e.trustee.eq_ignore_ascii_case(&c.user));
                }
            }
            DelegationChange::SendAs(c) => {
                if let Some(entries) = state.send_as.get_mut(&key(&c.identity)) {
                    entries.retain(|e| !e.trustee.eq_ignore_ascii_case(&c.trustee));
                }
            }
            DelegationChange::SendOnBehalf(c) => {
                if let Some(mbx) = state.mailboxes.get_mut(&key(&c.identity)) {
                    mbx.grant_send_on_behalf_to
                        .retain(|d| !d.eq_ignore_ascii_case(&c.delegate));
                }
            }
        }
        Ok(())
    }

    async fn add_distribution_group_member(&self, group: &str, member: &str) -> Result<()> {
        self.write("add_distribution_group_member", format!("{} {}", group, member))?;
        let mut state = self.state();
        let ids = (Self::group_id_for(&state, group), Self::user_id_for(&state, member));
        match ids {
            (Some(group_id), Some(user_id)) => {
                state.members.entry(group_id).or_default().insert(user_id);
                Ok(())
            }
            _ => Err(Offboard365Error::ResourceNotFound(group.to_string())),
        }
    }

    async fn remove_distribution_group_member(&self, group: &str, member: &str) -> Result<()> {
        self.write("remove_distribution_group_member", format!("{} {}", group, member))?;
        let mut state = self.state();
        let ids = (Self::group_id_for(&state, group), Self::user_id_for(&state, member));
        match ids {
            (Some(group_id), Some(user_id)) => {
                if let Some(members) = state.members.get_mut(&group_id) {
                    members.remove(&user_id);
                }
                Ok(())
            }
            _ => Err(Offboard365Error::ResourceNotFound(group.to_string())),
        }
    }

    async fn cancel_organized_meetings(&self, mailbox: &str, query_window_days: u32, preview_only: bool) -> Result<()> {
        self.write("cancel_organized_meetings", mailbox.to_string())?;
        self.state()
            .cancelled_meetings
            .push((mailbox.to_string(), query_window_days, preview_only));
        Ok(())
    }
}

#[async_trait]
impl OnPremDirectory for FakeTenant {
    async fn is_available(&self) -> bool {
        self.state().on_prem_available
    }

    async fn find_account(&self, subject: &PrincipalRef) -> Result<Option<ExternalDirectoryRef>> {
        self.check("find_account")?;
        Ok(self.state().ad_accounts.get(&key(&subject.principal_name)).cloned())
    }

    async fn disable_account(&self, account: &ExternalDirectoryRef) -> Result<()> {
        self.write("disable_account", account.sam_account_name.clone())?;
        for acct in self.state().ad_accounts.values_mut() {
            if acct.sam_account_name == account.sam_account_name {
                acct.enabled = false;
            }
        }
        Ok(())
    }

    async fn set_description(&self, account: &ExternalDirectoryRef, description: &str) -> Result<()> {
        self.write("set_description", account.sam_account_name.clone())?;
        for acct in self.state().ad_accounts.values_mut() {
            if acct.sam_account_name == account.sam_account_name {
                acct.description = Some(description.to_string());
            }
        }
        Ok(())
    }

    async fn move_account(&self, account: &ExternalDirectoryRef, target_ou: &str) -> Result<()> {
        self.write("move_account", account.sam_account_name.clone())?;
        for acct in self.state().ad_accounts.values_mut() {
            if acct.sam_account_name == account.sam_account_name {
                let rdn = acct
                    .distinguished_name
                    .split(',')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                acct.distinguished_name = format!("{},{}", rdn, target_ou);
            }
        }
        Ok(())
    }
}

/// Jane Doe with a user mailbox, one static DL (Finance-DL), one dynamic
/// group (All-Engineers), a security group, a sole-owned team, two
/// delegations and one license.
pub fn jane_tenant() -> FakeTenant {
    let tenant = FakeTenant::new();
    tenant.seed_user("jane-id", "jane@contoso.com", "Jane Doe", Some("jane@contoso.com"));
    tenant.seed_user("boss-id", "boss@contoso.com", "The Boss", Some("boss@contoso.com"));
    tenant.seed_user("bob-id", "bob@contoso.com", "Bob Builder", Some("bob@contoso.com"));
    tenant.seed_mailbox("jane@contoso.com", "Jane Doe", "UserMailbox");
    tenant.seed_mailbox("boss@contoso.com", "The Boss", "UserMailbox");

    tenant.seed_group(distribution_list("g-fin", "Finance-DL"));
    tenant.seed_group(dynamic_group("g-eng", "All-Engineers"));
    tenant.seed_group(security_group("g-vpn", "VPN Users"));
    tenant.seed_group(unified_group("g-team", "Project Phoenix"));
    for group in ["g-fin", "g-eng", "g-vpn", "g-team"] {
        tenant.seed_member(group, "jane-id");
    }
    tenant.seed_owner("g-team", "jane-id");

    tenant.seed_permission("jane@contoso.com", DelegationRight::FullAccess, "bob@contoso.com", false);
    tenant.seed_permission("jane@contoso.com", DelegationRight::FullAccess, "NT AUTHORITY\\SELF", false);
    tenant.seed_permission("jane@contoso.com", DelegationRight::SendAs, "bob@contoso.com", false);
    tenant.seed_permission("jane@contoso.com", DelegationRight::FullAccess, "Organization Management", true);

    tenant.seed_license(
        "jane-id",
        "sku-e3",
        "ENTERPRISEPACK",
        &[("EXCHANGE_S_ENTERPRISE", "Success"), ("SWAY", "Disabled")],
    );
    tenant.seed_dynamic_list("All Staff (dynamic)");
    tenant
}
