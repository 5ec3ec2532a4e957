//! Run artifacts: per-category CSVs, the plan, work notes.

use crate::access::model::Snapshot;
use crate::access::plan::PlanItem;
use crate::access::run_config::RunConfig;
use crate::error::Result;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CSV_SECTIONS: [&str; 7] = [
    "Mailbox",
    "Groups",
    "OwnedGroups",
    "Delegations",
    "Licenses",
    "DynamicDLs",
    "OnPrem",
];
pub const PLAN_FILE: &str = "Plan-WhatWeWillDo.md";
pub const WORK_NOTES_FILE: &str = "ServiceNow-WorkNotes.txt";
pub const TRANSCRIPT_FILE: &str = "Transcript.log";

trait CsvRow: Serialize {
    const HEADERS: &'static [&'static str];
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct MailboxRow<'a> {
    primary_smtp_address: &'a str,
    display_name: &'a str,
    mailbox_type: &'a str,
    expiry_marker: &'a str,
}

impl CsvRow for MailboxRow<'_> {
    const HEADERS: &'static [&'static str] = &["PrimarySmtpAddress", "DisplayName", "MailboxType", "ExpiryMarker"];
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GroupRow<'a> {
    group_id: &'a str,
    display_name: &'a str,
    mail_address: &'a str,
    kind: &'a str,
    mail_enabled: bool,
    security_enabled: bool,
    unified: bool,
    dynamic: bool,
}

impl CsvRow for GroupRow<'_> {
    const HEADERS: &'static [&'static str] = &[
        "GroupId",
        "DisplayName",
        "MailAddress",
        "Kind",
        "MailEnabled",
        "SecurityEnabled",
        "Unified",
        "Dynamic",
    ];
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct OwnedGroupRow<'a> {
    group_id: &'a str,
    display_name: &'a str,
    owner_count: usize,
}

impl CsvRow for OwnedGroupRow<'_> {
    const HEADERS: &'static [&'static str] = &["GroupId", "DisplayName", "OwnerCount"];
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DelegationRow<'a> {
    mailbox: &'a str,
    right: &'a str,
    grantee: &'a str,
}

impl CsvRow for DelegationRow<'_> {
    const HEADERS: &'static [&'static str] = &["Mailbox", "Right", "Grantee"];
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct LicenseRow<'a> {
    sku_id: &'a str,
    sku_name: &'a str,
    provisioned_service_plans: String,
}

impl CsvRow for LicenseRow<'_> {
    const HEADERS: &'static [&'static str] = &["SkuId", "SkuName", "ProvisionedServicePlans"];
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DynamicListRow<'a> {
    name: &'a str,
}

impl CsvRow for DynamicListRow<'_> {
    const HEADERS: &'static [&'static str] = &["Name"];
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct OnPremRow<'a> {
    sam_account_name: &'a str,
    distinguished_name: &'a str,
    enabled: bool,
    description: &'a str,
}

impl CsvRow for OnPremRow<'_> {
    const HEADERS: &'static [&'static str] = &["SamAccountName", "DistinguishedName", "Enabled", "Description"];
}

/// Header row is always written, even when there are no rows
fn write_csv<R: CsvRow>(path: &Path, rows: &[R]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(R::HEADERS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn folder_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `<root>/<subject>-<YYYYmmdd-HHMMSS>`
pub fn default_output_folder(root: &Path, config: &RunConfig) -> PathBuf {
    root.join(format!(
        "{}-{}",
        folder_safe(&config.subject_identity),
        config.started_at.format("%Y%m%d-%H%M%S")
    ))
}

pub fn render_plan(plan: &[PlanItem], config: &RunConfig) -> String {
    let mut out = String::new();
    out.push_str("# What we will do\n\n");
    out.push_str(&format!("- Subject: {}\n", config.subject_identity));
    out.push_str(&format!("- Ticket: {}\n", config.ticket));
    out.push_str(&format!("- Mode: {}\n\n", config.mode.banner()));

    if plan.is_empty() {
        out.push_str("_No actions requested or applicable._\n");
    }
    for item in plan {
        out.push_str(&format!("- **[{}]** {}\n", item.area, item.description));
    }
    out
}

pub struct ArtifactWriter {
    folder: PathBuf,
}

impl ArtifactWriter {
    pub fn create(folder: impl Into<PathBuf>) -> Result<Self> {
        let folder = folder.into();
        fs::create_dir_all(&folder)?;
        Ok(Self { folder })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.folder.join(file_name)
    }

    /// Write `<prefix>-<Section>.csv` for every section of the snapshot
    pub fn write_snapshot(&self, prefix: &str, snapshot: &Snapshot) -> Result<()> {
        let file = |section: &str| self.path(&format!("{}-{}.csv", prefix, section));

        let mailbox: Vec<MailboxRow> = snapshot
            .mailbox
            .iter()
            .map(|m| MailboxRow {
                primary_smtp_address: &m.primary_smtp_address,
                display_name: &m.display_name,
                mailbox_type: m.kind.as_str(),
                expiry_marker: m.expiry_marker.as_deref().unwrap_or_default(),
            })
            .collect();
        write_csv(&file("Mailbox"), &mailbox)?;

        let groups: Vec<GroupRow> = snapshot
            .group_memberships
            .iter()
            .map(|g| GroupRow {
                group_id: &g.group_id,
                display_name: &g.display_name,
                mail_address: g.mail_address.as_deref().unwrap_or_default(),
                kind: g.kind_label(),
                mail_enabled: g.is_mail_enabled,
                security_enabled: g.is_security_group,
                unified: g.is_unified_group,
                dynamic: g.is_dynamic_membership,
            })
            .collect();
        write_csv(&file("Groups"), &groups)?;

        let owned: Vec<OwnedGroupRow> = snapshot
            .owned_groups
            .iter()
            .map(|g| OwnedGroupRow {
                group_id: &g.group_id,
                display_name: &g.display_name,
                owner_count: g.current_owner_count,
            })
            .collect();
        write_csv(&file("OwnedGroups"), &owned)?;

        let delegations: Vec<DelegationRow> = snapshot
            .delegations
            .iter()
            .map(|d| DelegationRow {
                mailbox: &d.mailbox_address,
                right: d.right.as_str(),
                grantee: &d.grantee,
            })
            .collect();
        write_csv(&file("Delegations"), &delegations)?;

        let licenses: Vec<LicenseRow> = snapshot
            .licenses
            .iter()
            .map(|l| LicenseRow {
                sku_id: &l.sku_id,
                sku_name: &l.sku_name,
                provisioned_service_plans: l
                    .provisioned_service_plans
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(";"),
            })
            .collect();
        write_csv(&file("Licenses"), &licenses)?;

        let dynamic: Vec<DynamicListRow> = snapshot
            .dynamic_distribution_lists
            .iter()
            .map(|name| DynamicListRow { name })
            .collect();
        write_csv(&file("DynamicDLs"), &dynamic)?;

        let on_prem: Vec<OnPremRow> = snapshot
            .directory_state
            .iter()
            .map(|a| OnPremRow {
                sam_account_name: &a.sam_account_name,
                distinguished_name: &a.distinguished_name,
                enabled: a.enabled,
                description: a.description.as_deref().unwrap_or_default(),
            })
            .collect();
        write_csv(&file("OnPrem"), &on_prem)?;

        tracing::debug!("Wrote {} snapshot CSVs to {}", prefix, self.folder.display());
        Ok(())
    }

    pub fn write_plan(&self, plan: &[PlanItem], config: &RunConfig) -> Result<PathBuf> {
        let path = self.path(PLAN_FILE);
        fs::write(&path, render_plan(plan, config))?;
        Ok(path)
    }

    pub fn write_work_notes(&self, report: &str) -> Result<PathBuf> {
        let path = self.path(WORK_NOTES_FILE);
        fs::write(&path, report)?;
        Ok(path)
    }
}
