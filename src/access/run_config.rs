//! The immutable description of one offboarding invocation.

use crate::access::snapshot::CaptureOptions;
use crate::error::{Offboard365Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::path::PathBuf;
use uuid::Uuid;

pub const DEFAULT_EXPIRY_DAYS: u32 = 180;
pub const DEFAULT_EXPIRY_ATTRIBUTE: &str = "CustomAttribute1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Preview,
    Apply,
}

impl RunMode {
    pub fn banner(&self) -> &'static str {
        match self {
            RunMode::Preview => "PREVIEW - no changes were made",
            RunMode::Apply => "APPLY - changes were executed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorGrant {
    pub identity: String,
    pub full_access: bool,
    pub send_as: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnPremActions {
    pub disable: bool,
    pub describe: bool,
    pub move_to_ou: Option<String>,
}

impl OnPremActions {
    pub fn any(&self) -> bool {
        self.disable || self.describe || self.move_to_ou.is_some()
    }

    pub fn labels(&self) -> Vec<String> {
        let mut labels = Vec::new();
        if self.disable {
            labels.push("disable account".to_string());
        }
        if self.describe {
            labels.push("set offboarding description".to_string());
        }
        if let Some(ou) = &self.move_to_ou {
            labels.push(format!("move to {}", ou));
        }
        labels
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub subject_identity: String,
    pub ticket: String,
    pub mode: RunMode,
    pub tenant: Option<String>,
    pub output_folder: Option<PathBuf>,

    pub convert_to_shared: bool,
    pub expiry_days: u32,
    pub expiry_attribute: String,
    pub supervisor: Option<SupervisorGrant>,

    pub remove_distribution_lists: bool,
    pub remove_groups: bool,
    pub backup_owner: Option<String>,
    pub remove_delegations: bool,
    pub remove_licenses: bool,
    pub block_sign_in: bool,
    pub on_prem: OnPremActions,
}

impl RunConfig {
    /// Preview-mode config with every action switched off
    pub fn new(subject_identity: impl Into<String>, ticket: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            subject_identity: subject_identity.into(),
            ticket: ticket.into(),
            mode: RunMode::Preview,
            tenant: None,
            output_folder: None,
            convert_to_shared: false,
            expiry_days: DEFAULT_EXPIRY_DAYS,
            expiry_attribute: DEFAULT_EXPIRY_ATTRIBUTE.to_string(),
            supervisor: None,
            remove_distribution_lists: false,
            remove_groups: false,
            backup_owner: None,
            remove_delegations: false,
            remove_licenses: false,
            block_sign_in: false,
            on_prem: OnPremActions::default(),
        }
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_tenant(mut self, tenant: Option<String>) -> Self {
        self.tenant = tenant;
        self
    }

    pub fn with_output_folder(mut self, folder: Option<PathBuf>) -> Self {
        self.output_folder = folder;
        self
    }

    pub fn with_shared_conversion(mut self, expiry_days: u32, attribute: impl Into<String>) -> Self {
        self.convert_to_shared = true;
        self.expiry_days = expiry_days;
        self.expiry_attribute = attribute.into();
        self
    }

    pub fn with_supervisor(mut self, supervisor: Option<SupervisorGrant>) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn with_backup_owner(mut self, backup_owner: Option<String>) -> Self {
        self.backup_owner = backup_owner;
        self
    }

    pub fn with_removals(mut self, distribution_lists: bool, groups: bool, delegations: bool, licenses: bool) -> Self {
        self.remove_distribution_lists = distribution_lists;
        self.remove_groups = groups;
        self.remove_delegations = delegations;
        self.remove_licenses = licenses;
        self
    }

    pub fn with_block_sign_in(mut self, block: bool) -> Self {
        self.block_sign_in = block;
        self
    }

    pub fn with_on_prem(mut self, actions: OnPremActions) -> Self {
        self.on_prem = actions;
        self
    }

    /// Reject inputs no run can proceed with
    pub fn validate(self) -> Result<Self> {
        if self.subject_identity.trim().is_empty() {
            return Err(Offboard365Error::InvalidConfig("subject identity is required".into()));
        }
        if self.ticket.trim().is_empty() {
            return Err(Offboard365Error::InvalidConfig("ticket reference is required".into()));
        }
        if self.convert_to_shared && self.expiry_days == 0 {
            return Err(Offboard365Error::InvalidConfig(
                "shared mailbox expiry must be at least one day".into(),
            ));
        }
        if !self.expiry_attribute.starts_with("CustomAttribute") {
            return Err(Offboard365Error::InvalidConfig(format!(
                "'{}' is not a mailbox custom attribute",
                self.expiry_attribute
            )));
        }
        if self
            .supervisor
            .as_ref()
            .is_some_and(|s| s.identity.trim().is_empty() || !(s.full_access || s.send_as))
        {
            return Err(Offboard365Error::InvalidConfig(
                "supervisor needs an identity and at least one right".into(),
            ));
        }
        if self
            .on_prem
            .move_to_ou
            .as_deref()
            .is_some_and(|ou| ou.trim().is_empty())
        {
            return Err(Offboard365Error::InvalidConfig("holding OU is empty".into()));
        }
        Ok(self)
    }

    pub fn is_apply(&self) -> bool {
        self.mode == RunMode::Apply
    }

    pub fn expiry_date(&self) -> NaiveDate {
        (self.started_at + chrono::Duration::days(i64::from(self.expiry_days))).date_naive()
    }

    /// `Expires: YYYY-MM-DD (Nd)`
    pub fn expiry_marker(&self) -> String {
        format!(
            "Expires: {} ({}d)",
            self.expiry_date().format("%Y-%m-%d"),
            self.expiry_days
        )
    }

    pub fn on_prem_description(&self) -> String {
        format!(
            "Offboarded {} - {}",
            self.started_at.format("%Y-%m-%d"),
            self.ticket
        )
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            include_on_prem: self.on_prem.any(),
            expiry_attribute: self.expiry_attribute.clone(),
        }
    }
}
