//! Exchange Online Management
//!
//! Mailbox administration through the Exchange Online admin REST endpoint
//! (`adminapi/beta/{tenant}/InvokeCommand`), which accepts cmdlet-shaped
//! requests and answers with OData pages of PowerShell objects.
//!
//! Covers:
//! - Mailbox lookup, shared conversion, custom attribute stamping
//! - Full-access / send-as / send-on-behalf delegation
//! - Distribution list membership
//! - Calendar cleanup for departing organizers

use crate::access::model::{DelegationChange, DelegationGrant, DelegationRight, PrincipalRef};
use crate::error::{Offboard365Error, Result};
use crate::graph::{send_with_retry, RetryPolicy};
use crate::services::{MailboxInfo, MailboxService, PermissionEntry};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub const EXCHANGE_ADMIN_BASE: &str = "https://outlook.office365.com/adminapi/beta";

/// Well-known principal Exchange uses for the owner's own rights
const SELF_PRINCIPAL: &str = "NT AUTHORITY\\SELF";

/// Largest window `Remove-CalendarEvents` accepts
pub const MAX_QUERY_WINDOW_DAYS: u32 = 1825;

/// A cmdlet invocation: name plus named parameters
#[derive(Debug, Clone)]
pub struct Cmdlet {
    name: &'static str,
    parameters: Map<String, Value>,
}

impl Cmdlet {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            parameters: Map::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    /// Switch parameter (`-PreviewOnly`)
    pub fn switch(self, key: &str) -> Self {
        self.param(key, true)
    }

    /// Suppress the interactive confirmation prompt
    pub fn no_confirm(self) -> Self {
        self.param("Confirm", false)
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// `Get-*` cmdlets change nothing and may be retried freely
    pub fn is_read_only(&self) -> bool {
        self.name.starts_with("Get-")
    }

    fn retry_policy(&self) -> RetryPolicy {
        if self.is_read_only() {
            RetryPolicy::Transient
        } else {
            RetryPolicy::ThrottleOnly
        }
    }

    fn body(&self) -> Value {
        json!({
            "CmdletInput": {
                "CmdletName": self.name,
                "Parameters": self.parameters,
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct InvokeResponse {
    #[serde(default)]
    value: Vec<Value>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

/// Exchange Online admin API client with retry support
pub struct ExchangeClient {
    client: Client,
    access_token: String,
    endpoint: String,
    anchor_mailbox: Option<String>,
}

impl ExchangeClient {
    pub fn new(access_token: String, tenant_id: &str, organization: Option<&str>) -> Self {
        let mut client = Self::with_endpoint(
            access_token,
            format!("{}/{}/InvokeCommand", EXCHANGE_ADMIN_BASE, tenant_id),
        );
        client.anchor_mailbox = organization.map(|org| {
            format!(
                "UPN:SystemMailbox{{bb558c35-97f1-4cb9-8ff7-d53741dc928c}}@{}",
                org
            )
        });
        client
    }

    /// Explicit InvokeCommand URL (mock servers)
    pub fn with_endpoint(access_token: String, endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            access_token,
            endpoint: endpoint.into(),
            anchor_mailbox: None,
        }
    }

    /// Run a cmdlet and collect every returned object across pages
    pub async fn invoke(&self, cmdlet: &Cmdlet) -> Result<Vec<Value>> {
        let body = cmdlet.body();
        let mut url = self.endpoint.clone();
        let mut rows = Vec::new();

        loop {
            let label = format!("{} ({})", cmdlet.name, url);
            let resp = send_with_retry(
                || {
                    let mut builder = self
                        .client
                        .post(&url)
                        .bearer_auth(&self.access_token)
                        .header("Prefer", "odata.maxpagesize=1000")
                        .json(&body);
                    if let Some(anchor) = &self.anchor_mailbox {
                        builder = builder.header("X-AnchorMailbox", anchor);
                    }
                    builder
                },
                &label,
                cmdlet.retry_policy(),
            )
            .await?;

            let status = resp.status();
            if !status.is_success() {
                let error_text = resp.text().await.unwrap_or_default();
                return Err(map_exchange_error(cmdlet.name, status, &error_text));
            }

            let page: InvokeResponse = resp.json().await?;
            rows.extend(page.value);

            match page.next_link {
                Some(next) => url = next,
                None => break,
            }
        }

        tracing::debug!(cmdlet = cmdlet.name, rows = rows.len(), "cmdlet completed");
        Ok(rows)
    }

    async fn invoke_optional(&self, cmdlet: &Cmdlet) -> Result<Option<Vec<Value>>> {
        match self.invoke(cmdlet).await {
            Ok(rows) => Ok(Some(rows)),
            Err(Offboard365Error::ResourceNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn map_exchange_error(cmdlet: &str, status: StatusCode, error_text: &str) -> Offboard365Error {
    let message = crate::error::enhance_graph_error(error_text);
    let not_found = status == StatusCode::NOT_FOUND
        || message.contains("ManagementObjectNotFoundException")
        || message.contains("couldn't be found");

    if not_found {
        Offboard365Error::ResourceNotFound(format!("{}: {}", cmdlet, message))
    } else {
        Offboard365Error::ExchangeApiError(format!("{} returned HTTP {}: {}", cmdlet, status, message))
    }
}

fn str_field(row: &Value, key: &str) -> Option<String> {
    row.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn bool_field(row: &Value, key: &str) -> bool {
    match row.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Multi-valued properties arrive either as arrays or comma-joined strings
fn string_list(row: &Value, key: &str) -> Vec<String> {
    match row.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_mailbox(row: &Value) -> Option<MailboxInfo> {
    let primary_smtp_address = str_field(row, "PrimarySmtpAddress")?;

    let custom_attributes = (1..=15)
        .filter_map(|n| {
            let key = format!("CustomAttribute{}", n);
            str_field(row, &key).map(|value| (key, value))
        })
        .collect::<BTreeMap<_, _>>();

    Some(MailboxInfo {
        display_name: str_field(row, "DisplayName").unwrap_or_else(|| primary_smtp_address.clone()),
        primary_smtp_address,
        recipient_type_details: str_field(row, "RecipientTypeDetails").unwrap_or_default(),
        grant_send_on_behalf_to: string_list(row, "GrantSendOnBehalfTo"),
        custom_attributes,
    })
}

fn parse_permission(row: &Value, trustee_key: &str) -> Option<PermissionEntry> {
    let trustee = str_field(row, trustee_key)?;
    let deny = bool_field(row, "Deny")
        || str_field(row, "AccessControlType").is_some_and(|t| t.eq_ignore_ascii_case("Deny"));

    Some(PermissionEntry {
        trustee,
        access_rights: string_list(row, "AccessRights"),
        is_inherited: bool_field(row, "IsInherited"),
        deny,
    })
}

/// Explicit, allowed entries that carry `right` and are not the owner's own SELF entry
pub fn explicit_grants(
    mailbox: &str,
    entries: &[PermissionEntry],
    right: DelegationRight,
) -> Vec<DelegationGrant> {
    entries
        .iter()
        .filter(|e| !e.is_inherited && !e.deny)
        .filter(|e| !e.trustee.eq_ignore_ascii_case(SELF_PRINCIPAL))
        .filter(|e| {
            e.access_rights
                .iter()
                .any(|r| r.eq_ignore_ascii_case(right.as_str()))
        })
        .map(|e| DelegationGrant::new(mailbox, right, e.trustee.clone()))
        .collect()
}

/// `-GrantSendOnBehalfTo @{Add=..}` / `@{Remove=..}` as a generic hashtable
fn send_on_behalf_update(identity: &str, verb: &str, delegate: &str) -> Cmdlet {
    let mut table = Map::new();
    table.insert("@odata.type".to_string(), json!("#Exchange.GenericHashTable"));
    table.insert(verb.to_string(), json!(delegate));

    Cmdlet::new("Set-Mailbox")
        .param("Identity", identity)
        .param("GrantSendOnBehalfTo", Value::Object(table))
}

#[async_trait]
impl MailboxService for ExchangeClient {
    async fn get_mailbox(&self, identity: &str) -> Result<Option<MailboxInfo>> {
        let cmdlet = Cmdlet::new("Get-Mailbox").param("Identity", identity);
        Ok(self
            .invoke_optional(&cmdlet)
            .await?
            .and_then(|rows| rows.first().and_then(parse_mailbox)))
    }

    async fn mailbox_permissions(&self, mailbox: &str) -> Result<Vec<PermissionEntry>> {
        let rows = self
            .invoke(&Cmdlet::new("Get-MailboxPermission").param("Identity", mailbox))
            .await?;
        Ok(rows.iter().filter_map(|r| parse_permission(r, "User")).collect())
    }

    async fn recipient_permissions(&self, mailbox: &str) -> Result<Vec<PermissionEntry>> {
        let rows = self
            .invoke(&Cmdlet::new("Get-RecipientPermission").param("Identity", mailbox))
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| parse_permission(r, "Trustee"))
            .collect())
    }

    async fn permissions_held_by(&self, trustee: &PrincipalRef) -> Result<Vec<DelegationGrant>> {
        let mut grants = Vec::new();

        let send_as = self
            .invoke(&Cmdlet::new("Get-RecipientPermission").param("Trustee", trustee.principal_name.as_str()))
            .await?;
        for row in &send_as {
            if let (Some(identity), Some(entry)) =
                (str_field(row, "Identity"), parse_permission(row, "Trustee"))
            {
                grants.extend(explicit_grants(&identity, &[entry], DelegationRight::SendAs));
            }
        }

        let mailboxes = self
            .invoke(&Cmdlet::new("Get-Mailbox").param("ResultSize", "Unlimited"))
            .await?;
        let names = [
            trustee.principal_name.as_str(),
            trustee.display_name.as_str(),
            trustee.mailbox_identity(),
        ];

        for mailbox in mailboxes.iter().filter_map(parse_mailbox) {
            if mailbox
                .primary_smtp_address
                .eq_ignore_ascii_case(trustee.mailbox_identity())
            {
                continue;
            }

            if mailbox
                .grant_send_on_behalf_to
                .iter()
                .any(|d| names.iter().any(|n| d.eq_ignore_ascii_case(n)))
            {
                grants.push(DelegationGrant::new(
                    mailbox.primary_smtp_address.clone(),
                    DelegationRight::SendOnBehalf,
                    trustee.principal_name.clone(),
                ));
            }

            let rows = self
                .invoke(
                    &Cmdlet::new("Get-MailboxPermission")
                        .param("Identity", mailbox.primary_smtp_address.as_str())
                        .param("User", trustee.principal_name.as_str()),
                )
                .await?;
            let entries: Vec<PermissionEntry> =
                rows.iter().filter_map(|r| parse_permission(r, "User")).collect();
            grants.extend(explicit_grants(
                &mailbox.primary_smtp_address,
                &entries,
                DelegationRight::FullAccess,
            ));
        }

        Ok(grants)
    }

    async fn dynamic_distribution_groups(&self) -> Result<Vec<String>> {
        let rows = self
            .invoke(&Cmdlet::new("Get-DynamicDistributionGroup").param("ResultSize", "Unlimited"))
            .await?;
        Ok(rows
            .iter()
            .filter_map(|r| str_field(r, "DisplayName").or_else(|| str_field(r, "Name")))
            .collect())
    }

    async fn convert_to_shared(&self, mailbox: &str) -> Result<()> {
        self.invoke(
            &Cmdlet::new("Set-Mailbox")
                .param("Identity", mailbox)
                .param("Type", "Shared"),
        )
        .await?;
        Ok(())
    }

    async fn set_custom_attribute(&self, mailbox: &str, attribute: &str, value: &str) -> Result<()> {
        self.invoke(
            &Cmdlet::new("Set-Mailbox")
                .param("Identity", mailbox)
                .param(attribute, value),
        )
        .await?;
        Ok(())
    }

    async fn grant(&self, change: &DelegationChange) -> Result<()> {
        let cmdlet = match change {
            DelegationChange::FullAccess(c) => Cmdlet::new("Add-MailboxPermission")
                .param("Identity", c.identity.as_str())
                .param("User", c.user.as_str())
                .param("AccessRights", json!(["FullAccess"]))
                .param("InheritanceType", "All")
                .param("AutoMapping", false),
            DelegationChange::SendAs(c) => Cmdlet::new("Add-RecipientPermission")
                .param("Identity", c.identity.as_str())
                .param("Trustee", c.trustee.as_str())
                .param("AccessRights", json!(["SendAs"]))
                .no_confirm(),
            DelegationChange::SendOnBehalf(c) => {
                send_on_behalf_update(&c.identity, "Add", &c.delegate)
            }
        };
        self.invoke(&cmdlet).await?;
        Ok(())
    }

    async fn revoke(&self, change: &DelegationChange) -> Result<()> {
        let cmdlet = match change {
            DelegationChange::FullAccess(c) => Cmdlet::new("Remove-MailboxPermission")
                .param("Identity", c.identity.as_str())
                .param("User", c.user.as_str())
                .param("AccessRights", json!(["FullAccess"]))
                .param("InheritanceType", "All")
                .no_confirm(),
            DelegationChange::SendAs(c) => Cmdlet::new("Remove-RecipientPermission")
                .param("Identity", c.identity.as_str())
                .param("Trustee", c.trustee.as_str())
                .param("AccessRights", json!(["SendAs"]))
                .no_confirm(),
            DelegationChange::SendOnBehalf(c) => {
                send_on_behalf_update(&c.identity, "Remove", &c.delegate)
            }
        };
        self.invoke(&cmdlet).await?;
        Ok(())
    }

    async fn add_distribution_group_member(&self, group: &str, member: &str) -> Result<()> {
        self.invoke(
            &Cmdlet::new("Add-DistributionGroupMember")
                .param("Identity", group)
                .param("Member", member)
                .switch("BypassSecurityGroupManagerCheck"),
        )
        .await?;
        Ok(())
    }

    async fn remove_distribution_group_member(&self, group: &str, member: &str) -> Result<()> {
        self.invoke(
            &Cmdlet::new("Remove-DistributionGroupMember")
                .param("Identity", group)
                .param("Member", member)
                .switch("BypassSecurityGroupManagerCheck")
                .no_confirm(),
        )
        .await?;
        Ok(())
    }

    async fn cancel_organized_meetings(
        &self,
        mailbox: &str,
        query_window_days: u32,
        preview_only: bool,
    ) -> Result<()> {
        let mut cmdlet = Cmdlet::new("Remove-CalendarEvents")
            .param("Identity", mailbox)
            .switch("CancelOrganizedMeetings")
            .param("QueryWindowInDays", query_window_days)
            .no_confirm();
        if preview_only {
            cmdlet = cmdlet.switch("PreviewOnly");
        }
        self.invoke(&cmdlet).await?;
        Ok(())
    }
}
