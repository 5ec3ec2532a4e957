//! Entra ID directory operations over Microsoft Graph
//!
//! Required application permissions:
//! - User.ReadWrite.All - lookups, sign-in blocking, session revocation, licenses
//! - Group.ReadWrite.All - membership and owner changes
//! - Directory.Read.All - memberOf / ownedObjects traversal

use crate::error::Result;
use crate::graph::{odata_quote, GraphClient, GRAPH_API_BASE};
use crate::services::{DirectoryGroup, DirectoryService, DirectoryUser, GroupSummary, LicenseDetail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

const USER_SELECT: &str = "id,userPrincipalName,displayName,mail";
const GROUP_SELECT: &str = "id,displayName,mail,mailEnabled,securityEnabled,groupTypes,membershipRule";
const GROUP_ODATA_TYPE: &str = "#microsoft.graph.group";

/// Directory object as returned by memberOf / ownedObjects
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryObject {
    id: String,
    #[serde(rename = "@odata.type", default)]
    odata_type: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
}

impl DirectoryObject {
    fn into_group(self) -> Option<GroupSummary> {
        (self.odata_type.as_deref() == Some(GROUP_ODATA_TYPE)).then_some(GroupSummary {
            id: self.id,
            display_name: self.display_name,
        })
    }
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    #[allow(dead_code)]
    id: String,
}

/// Escape characters that would otherwise end a URL path segment
fn path_segment(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('#', "%23")
        .replace('?', "%3F")
        .replace('/', "%2F")
}

pub struct GraphDirectory {
    client: GraphClient,
    /// Base used for `@odata.id` references in $ref bodies
    reference_base: String,
}

impl GraphDirectory {
    pub fn new(client: GraphClient) -> Self {
        Self {
            client,
            reference_base: GRAPH_API_BASE.to_string(),
        }
    }

    fn directory_object_ref(&self, id: &str) -> serde_json::Value {
        json!({ "@odata.id": format!("{}/directoryObjects/{}", self.reference_base, id) })
    }

    async fn groups_from(&self, endpoint: &str) -> Result<Vec<GroupSummary>> {
        let objects: Vec<DirectoryObject> = self.client.get_all_pages(endpoint).await?;
        Ok(objects.into_iter().filter_map(DirectoryObject::into_group).collect())
    }
}

#[async_trait]
impl DirectoryService for GraphDirectory {
    async fn get_user(&self, identity: &str) -> Result<Option<DirectoryUser>> {
        self.client
            .get_optional(&format!("users/{}?$select={}", path_segment(identity), USER_SELECT))
            .await
    }

    async fn find_users(&self, address: &str) -> Result<Vec<DirectoryUser>> {
        let quoted = odata_quote(address);
        let filter = format!("mail eq '{q}' or userPrincipalName eq '{q}'", q = quoted);
        self.client
            .get_all_pages_with_query("users", &[("$filter", filter.as_str()), ("$select", USER_SELECT)])
            .await
    }

    async fn member_of(&self, user_id: &str) -> Result<Vec<GroupSummary>> {
        self.groups_from(&format!(
            "users/{}/memberOf?$select=id,displayName",
            path_segment(user_id)
        ))
        .await
    }

    async fn get_group(&self, group_id: &str) -> Result<DirectoryGroup> {
        self.client
            .get(&format!("groups/{}?$select={}", path_segment(group_id), GROUP_SELECT))
            .await
    }

    async fn owned_groups(&self, user_id: &str) -> Result<Vec<GroupSummary>> {
        self.groups_from(&format!(
            "users/{}/ownedObjects?$select=id,displayName",
            path_segment(user_id)
        ))
        .await
    }

    async fn owner_count(&self, group_id: &str) -> Result<usize> {
        let owners: Vec<IdOnly> = self
            .client
            .get_all_pages(&format!("groups/{}/owners?$select=id", path_segment(group_id)))
            .await?;
        Ok(owners.len())
    }

    async fn license_details(&self, user_id: &str) -> Result<Vec<LicenseDetail>> {
        self.client
            .get_all_pages(&format!("users/{}/licenseDetails", path_segment(user_id)))
            .await
    }

    async fn add_member(&self, group_id: &str, user_id: &str) -> Result<()> {
        self.client
            .post_no_content(
                &format!("groups/{}/members/$ref", path_segment(group_id)),
                &self.directory_object_ref(user_id),
            )
            .await
    }

    async fn remove_member(&self, group_id: &str, user_id: &str) -> Result<()> {
        self.client
            .delete(&format!(
                "groups/{}/members/{}/$ref",
                path_segment(group_id),
                path_segment(user_id)
            ))
            .await
    }

    async fn add_owner(&self, group_id: &str, user_id: &str) -> Result<()> {
        self.client
            .post_no_content(
                &format!("groups/{}/owners/$ref", path_segment(group_id)),
                &self.directory_object_ref(user_id),
            )
            .await
    }

    async fn remove_licenses(&self, user_id: &str, sku_ids: &[String]) -> Result<()> {
        let body = json!({
            "addLicenses": [],
            "removeLicenses": sku_ids,
        });
        self.client
            .post_no_content(&format!("users/{}/assignLicense", path_segment(user_id)), &body)
            .await
    }

    async fn set_account_enabled(&self, user_id: &str, enabled: bool) -> Result<()> {
        self.client
            .patch(
                &format!("users/{}", path_segment(user_id)),
                &json!({ "accountEnabled": enabled }),
            )
            .await
    }

    async fn revoke_sign_in_sessions(&self, user_id: &str) -> Result<()> {
        self.client
            .post_no_content(
                &format!("users/{}/revokeSignInSessions", path_segment(user_id)),
                &json!({}),
            )
            .await
    }
}
