//! Backend surfaces the engines talk to.
//!
//! - [`DirectoryService`]: users, groups, owners, licenses, sign-in state (Microsoft Graph)
//! - [`MailboxService`]: mailboxes, delegations, distribution lists, calendars (Exchange Online)
//! - [`OnPremDirectory`]: optional local Active Directory
//!
//! Every call is a single request/response; callers await them one at a time.

use crate::access::model::{DelegationChange, DelegationGrant, ExternalDirectoryRef, PrincipalRef};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    pub id: String,
    #[serde(default)]
    pub user_principal_name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
}

impl DirectoryUser {
    pub fn into_principal(self) -> PrincipalRef {
        PrincipalRef {
            display_name: self
                .display_name
                .unwrap_or_else(|| self.user_principal_name.clone()),
            directory_id: self.id,
            principal_name: self.user_principal_name,
            mail_address: self.mail,
        }
    }
}

/// Minimal group reference as returned by membership/ownership listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryGroup {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
    #[serde(default)]
    pub mail_enabled: bool,
    #[serde(default)]
    pub security_enabled: bool,
    #[serde(default)]
    pub group_types: Vec<String>,
    #[serde(default)]
    pub membership_rule: Option<String>,
}

impl DirectoryGroup {
    /// Dynamic if a membership rule is present or the group type says so
    pub fn is_dynamic(&self) -> bool {
        self.membership_rule
            .as_deref()
            .is_some_and(|rule| !rule.trim().is_empty())
            || self
                .group_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case("DynamicMembership"))
    }

    pub fn is_unified(&self) -> bool {
        self.group_types.iter().any(|t| t.eq_ignore_ascii_case("Unified"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePlanStatus {
    pub service_plan_name: String,
    #[serde(default)]
    pub provisioning_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseDetail {
    pub sku_id: String,
    #[serde(default)]
    pub sku_part_number: Option<String>,
    #[serde(default)]
    pub service_plans: Vec<ServicePlanStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxInfo {
    pub primary_smtp_address: String,
    pub display_name: String,
    pub recipient_type_details: String,
    pub grant_send_on_behalf_to: Vec<String>,
    /// Non-empty custom attributes keyed by name (`CustomAttribute1`..)
    pub custom_attributes: BTreeMap<String, String>,
}

/// One raw permission entry on a mailbox, before filtering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionEntry {
    pub trustee: String,
    pub access_rights: Vec<String>,
    pub is_inherited: bool,
    pub deny: bool,
}

#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Exact lookup by object id or user principal name
    async fn get_user(&self, identity: &str) -> Result<Option<DirectoryUser>>;

    /// Equality filter against mail and user principal name
    async fn find_users(&self, address: &str) -> Result<Vec<DirectoryUser>>;

    /// Groups the user is a direct member of
    async fn member_of(&self, user_id: &str) -> Result<Vec<GroupSummary>>;

    async fn get_group(&self, group_id: &str) -> Result<DirectoryGroup>;

    async fn owned_groups(&self, user_id: &str) -> Result<Vec<GroupSummary>>;

    async fn owner_count(&self, group_id: &str) -> Result<usize>;

    async fn license_details(&self, user_id: &str) -> Result<Vec<LicenseDetail>>;

    async fn add_member(&self, group_id: &str, user_id: &str) -> Result<()>;

    async fn remove_member(&self, group_id: &str, user_id: &str) -> Result<()>;

    async fn add_owner(&self, group_id: &str, user_id: &str) -> Result<()>;

    /// Remove every listed SKU in one call
    async fn remove_licenses(&self, user_id: &str, sku_ids: &[String]) -> Result<()>;

    async fn set_account_enabled(&self, user_id: &str, enabled: bool) -> Result<()>;

    async fn revoke_sign_in_sessions(&self, user_id: &str) -> Result<()>;
}

#[async_trait]
pub trait MailboxService: Send + Sync {
    async fn get_mailbox(&self, identity: &str) -> Result<Option<MailboxInfo>>;

    /// Full-access entries on a mailbox
    async fn mailbox_permissions(&self, mailbox: &str) -> Result<Vec<PermissionEntry>>;

    /// Send-as entries on a mailbox
    async fn recipient_permissions(&self, mailbox: &str) -> Result<Vec<PermissionEntry>>;

    /// Explicit grants the trustee holds on other mailboxes
    async fn permissions_held_by(&self, trustee: &PrincipalRef) -> Result<Vec<DelegationGrant>>;

    async fn dynamic_distribution_groups(&self) -> Result<Vec<String>>;

    async fn convert_to_shared(&self, mailbox: &str) -> Result<()>;

    async fn set_custom_attribute(&self, mailbox: &str, attribute: &str, value: &str) -> Result<()>;

    async fn grant(&self, change: &DelegationChange) -> Result<()>;

    async fn revoke(&self, change: &DelegationChange) -> Result<()>;

    async fn add_distribution_group_member(&self, group: &str, member: &str) -> Result<()>;

    async fn remove_distribution_group_member(&self, group: &str, member: &str) -> Result<()>;

    async fn cancel_organized_meetings(
        &self,
        mailbox: &str,
        query_window_days: u32,
        preview_only: bool,
    ) -> Result<()>;
}

#[async_trait]
pub trait OnPremDirectory: Send + Sync {
    /// Whether the local integration can be used at all
    async fn is_available(&self) -> bool;

    async fn find_account(&self, subject: &PrincipalRef) -> Result<Option<ExternalDirectoryRef>>;

    async fn disable_account(&self, account: &ExternalDirectoryRef) -> Result<()>;

    async fn set_description(&self, account: &ExternalDirectoryRef, description: &str) -> Result<()>;

    async fn move_account(&self, account: &ExternalDirectoryRef, target_ou: &str) -> Result<()>;
}

/// The three backends for one run
#[derive(Clone, Copy)]
pub struct Backends<'a> {
    pub directory: &'a dyn DirectoryService,
    pub mailboxes: &'a dyn MailboxService,
    pub on_prem: &'a dyn OnPremDirectory,
}
