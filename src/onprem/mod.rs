//! On-premises Active Directory through the local ActiveDirectory PowerShell module
//!
//! Only used when an operator asks for on-prem actions. Availability means
//! `pwsh` starts and `Get-Module -ListAvailable ActiveDirectory` finds the module.

use crate::access::model::{ExternalDirectoryRef, PrincipalRef};
use crate::error::{Offboard365Error, Result};
use crate::services::OnPremDirectory;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

const POWERSHELL: &str = "pwsh";

/// Characters PowerShell accepts as single-quote delimiters
const SINGLE_QUOTES: [char; 5] = ['\'', '\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}'];

/// Quote a value as a PowerShell single-quoted literal
fn ps_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if SINGLE_QUOTES.contains(&c) {
            quoted.push(c);
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AdUserRow {
    sam_account_name: String,
    distinguished_name: String,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    description: Option<String>,
}

impl From<AdUserRow> for ExternalDirectoryRef {
    fn from(row: AdUserRow) -> Self {
        ExternalDirectoryRef {
            sam_account_name: row.sam_account_name,
            distinguished_name: row.distinguished_name,
            enabled: row.enabled,
            description: row.description.filter(|d| !d.trim().is_empty()),
        }
    }
}

/// `ConvertTo-Json` emits a bare object for one result and an array for many
fn parse_ad_users(stdout: &str) -> Result<Vec<ExternalDirectoryRef>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value = serde_json::from_str(trimmed)?;
    let rows: Vec<AdUserRow> = match value {
        serde_json::Value::Array(_) => serde_json::from_value(value)?,
        other => vec![serde_json::from_value(other)?],
    };
    Ok(rows.into_iter().map(Into::into).collect())
}

pub struct PowerShellActiveDirectory {
    executable: String,
}

impl Default for PowerShellActiveDirectory {
    fn default() -> Self {
        Self {
            executable: POWERSHELL.to_string(),
        }
    }
}

impl PowerShellActiveDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    async fn run(&self, script: &str) -> Result<String> {
        let full_script = format!(
            "$ErrorActionPreference = 'Stop'; Import-Module ActiveDirectory; {}",
            script
        );

        let output = Command::new(&self.executable)
            .args(["-NoProfile", "-NonInteractive", "-Command", &full_script])
            .output()
            .await
            .map_err(|e| Offboard365Error::MissingCapability(format!("{} not available: {}", self.executable, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Offboard365Error::OnPremError(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl OnPremDirectory for PowerShellActiveDirectory {
    async fn is_available(&self) -> bool {
        let check = Command::new(&self.executable)
            .args([
                "-NoProfile",
                "-NonInteractive",
                "-Command",
                "if (Get-Module -ListAvailable ActiveDirectory) { 'available' }",
            ])
            .output()
            .await;

        match check {
            Ok(output) => String::from_utf8_lossy(&output.stdout).contains("available"),
            Err(e) => {
                tracing::debug!("{} not available: {}", self.executable, e);
                false
            }
        }
    }

    async fn find_account(&self, subject: &PrincipalRef) -> Result<Option<ExternalDirectoryRef>> {
        let script = format!(
            "$upn = {}; Get-ADUser -Filter {{ UserPrincipalName -eq $upn }} -Properties Description | \
             Select-Object SamAccountName,DistinguishedName,Enabled,Description | ConvertTo-Json -Compress",
            ps_quote(&subject.principal_name)
        );
        let stdout = self.run(&script).await?;
        Ok(parse_ad_users(&stdout)?.into_iter().next())
    }

    async fn disable_account(&self, account: &ExternalDirectoryRef) -> Result<()> {
        self.run(&format!(
            "Disable-ADAccount -Identity {}",
            ps_quote(&account.distinguished_name)
        ))
        .await?;
        Ok(())
    }

    async fn set_description(&self, account: &ExternalDirectoryRef, description: &str) -> Result<()> {
        self.run(&format!(
            "Set-ADUser -Identity {} -Description {}",
            ps_quote(&account.distinguished_name),
            ps_quote(description)
        ))
        .await?;
        Ok(())
    }

    async fn move_account(&self, account: &ExternalDirectoryRef, target_ou: &str) -> Result<()> {
        self.run(&format!(
            "Move-ADObject -Identity {} -TargetPath {}",
            ps_quote(&account.distinguished_name),
            ps_quote(target_ou)
        ))
        .await?;
        Ok(())
    }
}
