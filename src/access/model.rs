//! Point-in-time access records shared by the offboarding and mirror engines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A resolved directory user. Immutable once produced by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalRef {
    pub directory_id: String,
    pub principal_name: String,
    pub display_name: String,
    pub mail_address: Option<String>,
}

impl PrincipalRef {
    /// Address used against the mailbox service: mail, else the principal name
    pub fn mailbox_identity(&self) -> &str {
        self.mail_address.as_deref().unwrap_or(&self.principal_name)
    }
}

impl fmt::Display for PrincipalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.display_name, self.principal_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MailboxKind {
    User,
    Shared,
    Other(String),
}

impl MailboxKind {
    pub fn from_recipient_type(value: &str) -> Self {
        match value {
            "UserMailbox" => MailboxKind::User,
            "SharedMailbox" => MailboxKind::Shared,
            other => MailboxKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MailboxKind::User => "UserMailbox",
            MailboxKind::Shared => "SharedMailbox",
            MailboxKind::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxState {
    pub primary_smtp_address: String,
    pub display_name: String,
    pub kind: MailboxKind,
    pub expiry_marker: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    pub group_id: String,
    pub display_name: String,
    pub mail_address: Option<String>,
    pub is_mail_enabled: bool,
    pub is_security_group: bool,
    pub is_unified_group: bool,
    pub is_dynamic_membership: bool,
}

impl GroupRef {
    /// Mail-enabled, non-unified groups are managed through the mailbox service
    pub fn is_distribution_list(&self) -> bool {
        self.is_mail_enabled && !self.is_unified_group
    }

    pub fn is_directory_group(&self) -> bool {
        !self.is_distribution_list()
    }

    /// Only static memberships are ever planned or changed
    pub fn is_static(&self) -> bool {
        !self.is_dynamic_membership
    }

    /// Identity accepted by the mailbox service for this group
    pub fn mail_identity(&self) -> &str {
        self.mail_address.as_deref().unwrap_or(&self.display_name)
    }

    pub fn kind_label(&self) -> &'static str {
        match (self.is_unified_group, self.is_mail_enabled, self.is_security_group) {
            (true, _, _) => "Microsoft 365",
            (false, true, true) => "Mail-enabled security",
            (false, true, false) => "Distribution",
            (false, false, _) => "Security",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedGroupRef {
    pub group_id: String,
    pub display_name: String,
    pub current_owner_count: usize,
}

impl OwnedGroupRef {
    /// The subject is the last owner standing (count recorded at capture time)
    pub fn is_sole_owner(&self) -> bool {
        self.current_owner_count <= 1
    }
}

/// Mailbox delegation rights. Declaration order is the snapshot sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DelegationRight {
    FullAccess,
    SendAs,
    SendOnBehalf,
}

impl DelegationRight {
    pub fn as_str(&self) -> &'static str {
        match self {
            DelegationRight::FullAccess => "FullAccess",
            DelegationRight::SendAs => "SendAs",
            DelegationRight::SendOnBehalf => "SendOnBehalf",
        }
    }
}

impl fmt::Display for DelegationRight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DelegationGrant {
    pub mailbox_address: String,
    pub right: DelegationRight,
    pub grantee: String,
}

impl DelegationGrant {
    pub fn new(mailbox: impl Into<String>, right: DelegationRight, grantee: impl Into<String>) -> Self {
        Self {
            mailbox_address: mailbox.into(),
            right,
            grantee: grantee.into(),
        }
    }

    /// Ordering key: mailbox, then right, then grantee (addresses case-insensitive)
    pub fn sort_key(&self) -> (String, DelegationRight, String) {
        (
            self.mailbox_address.to_lowercase(),
            self.right,
            self.grantee.to_lowercase(),
        )
    }

    /// Typed change request for the mailbox service
    pub fn change(&self) -> DelegationChange {
        match self.right {
            DelegationRight::FullAccess => DelegationChange::FullAccess(MailboxPermissionChange {
                identity: self.mailbox_address.clone(),
                user: self.grantee.clone(),
            }),
            DelegationRight::SendAs => DelegationChange::SendAs(RecipientPermissionChange {
                identity: self.mailbox_address.clone(),
                trustee: self.grantee.clone(),
            }),
            DelegationRight::SendOnBehalf => DelegationChange::SendOnBehalf(SendOnBehalfChange {
                identity: self.mailbox_address.clone(),
                delegate: self.grantee.clone(),
            }),
        }
    }
}

/// Full-access permission entry (`*-MailboxPermission`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxPermissionChange {
    pub identity: String,
    pub user: String,
}

/// Send-as permission entry (`*-RecipientPermission`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientPermissionChange {
    pub identity: String,
    pub trustee: String,
}

/// Entry of the mailbox's `GrantSendOnBehalfTo` list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOnBehalfChange {
    pub identity: String,
    pub delegate: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegationChange {
    FullAccess(MailboxPermissionChange),
    SendAs(RecipientPermissionChange),
    SendOnBehalf(SendOnBehalfChange),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRef {
    pub sku_id: String,
    pub sku_name: String,
    pub provisioned_service_plans: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDirectoryRef {
    pub sam_account_name: String,
    pub distinguished_name: String,
    pub enabled: bool,
    pub description: Option<String>,
}

/// A snapshot section that could not be collected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSkip {
    pub section: String,
    pub reason: String,
}

/// Immutable capture of a subject's access across backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub subject: PrincipalRef,
    pub captured_at: DateTime<Utc>,
    pub mailbox: Option<MailboxState>,
    pub group_memberships: Vec<GroupRef>,
    pub owned_groups: Vec<OwnedGroupRef>,
    pub delegations: Vec<DelegationGrant>,
    pub licenses: Vec<LicenseRef>,
    /// Names of dynamic distribution groups; membership is never checked
    pub dynamic_distribution_lists: Vec<String>,
    pub directory_state: Option<ExternalDirectoryRef>,
    pub on_prem_available: bool,
    pub skipped: Vec<CaptureSkip>,
}

impl Snapshot {
    pub fn static_distribution_lists(&self) -> impl Iterator<Item = &GroupRef> {
        self.group_memberships
            .iter()
            .filter(|g| g.is_static() && g.is_distribution_list())
    }

    pub fn static_directory_groups(&self) -> impl Iterator<Item = &GroupRef> {
        self.group_memberships
            .iter()
            .filter(|g| g.is_static() && g.is_directory_group())
    }

    pub fn dynamic_groups(&self) -> impl Iterator<Item = &GroupRef> {
        self.group_memberships.iter().filter(|g| g.is_dynamic_membership)
    }

    pub fn sole_owned_groups(&self) -> impl Iterator<Item = &OwnedGroupRef> {
        self.owned_groups.iter().filter(|g| g.is_sole_owner())
    }

    pub fn lists_group(&self, display_name: &str) -> bool {
        self.group_memberships
            .iter()
            .any(|g| g.display_name.eq_ignore_ascii_case(display_name))
    }
}
