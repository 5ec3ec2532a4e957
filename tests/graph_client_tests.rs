//! Integration tests for the Graph client and the directory service built on it
//!
//! Uses wiremock to simulate Graph responses and verify request shapes,
//! retry behavior, pagination and error mapping.

use offboard365::access::resolver::resolve;
use offboard365::graph::directory::GraphDirectory;
use offboard365::graph::GraphClient;
use offboard365::services::DirectoryService;
use offboard365::Offboard365Error;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn directory(server: &MockServer) -> GraphDirectory {
    GraphDirectory::new(GraphClient::with_base_url(
        "test-token".to_string(),
        format!("{}/v1.0", server.uri()),
    ))
}

fn jane() -> serde_json::Value {
    json!({
        "id": "jane-id",
        "userPrincipalName": "jane@contoso.com",
        "displayName": "Jane Doe",
        "mail": "jane@contoso.com"
    })
}

#[tokio::test]
async fn test_get_user_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/jane@contoso.com"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jane()))
        .expect(1)
        .mount(&server)
        .await;

    let user = directory(&server)
        .await
        .get_user("jane@contoso.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.id, "jane-id");
    assert_eq!(user.display_name.as_deref(), Some("Jane Doe"));
}

#[tokio::test]
async fn test_get_user_not_found_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/ghost@contoso.com"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "code": "Request_ResourceNotFound", "message": "Resource does not exist" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let user = directory(&server).await.get_user("ghost@contoso.com").await.unwrap();
    assert!(user.is_none());
}

#[tokio::test]
async fn test_resolver_falls_back_to_filter() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/o'neil@contoso.com"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param(
            "$filter",
            "mail eq 'o''neil@contoso.com' or userPrincipalName eq 'o''neil@contoso.com'",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{
                "id": "oneil-id",
                "userPrincipalName": "oneil@contoso.onmicrosoft.com",
                "displayName": "Pat O'Neil",
                "mail": "o'neil@contoso.com"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = directory(&server).await;
    let principal = resolve(&dir, "o'neil@contoso.com").await.unwrap();
    assert_eq!(principal.directory_id, "oneil-id");
    assert_eq!(principal.mailbox_identity(), "o'neil@contoso.com");
}

#[tokio::test]
async fn test_filter_value_is_percent_encoded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param(
            "$filter",
            "mail eq 'jane+ops@contoso.com' or userPrincipalName eq 'jane+ops@contoso.com'",
        ))
        .and(query_param("$select", "id,userPrincipalName,displayName,mail"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{
                "id": "ops-id",
                "userPrincipalName": "jane.ops@contoso.onmicrosoft.com",
                "displayName": "Jane (Ops)",
                "mail": "jane+ops@contoso.com"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = directory(&server).await;
    let principal = resolve(&dir, "jane+ops@contoso.com").await.unwrap();
    assert_eq!(principal.directory_id, "ops-id");
}

#[tokio::test]
async fn test_resolver_falls_back_after_bad_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/jdoe"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": "Request_BadRequest", "message": "Invalid object identifier 'jdoe'." }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param("$filter", "mail eq 'jdoe' or userPrincipalName eq 'jdoe'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{ "id": "u1", "userPrincipalName": "jdoe@contoso.com", "displayName": "J Doe" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = directory(&server).await;
    let principal = resolve(&dir, "jdoe").await.unwrap();
    assert_eq!(principal.directory_id, "u1");
}

#[tokio::test]
async fn test_member_of_follows_next_link_and_keeps_groups_only() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/jane-id/memberOf"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "@odata.type": "#microsoft.graph.group", "id": "g1", "displayName": "Finance-DL" },
                { "@odata.type": "#microsoft.graph.directoryRole", "id": "r1", "displayName": "Helpdesk" }
            ],
            "@odata.nextLink": format!("{}/v1.0/users/jane-id/memberOf/page2", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/jane-id/memberOf/page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [
                { "@odata.type": "#microsoft.graph.group", "id": "g2", "displayName": "All-Engineers" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let groups = directory(&server).await.member_of("jane-id").await.unwrap();
    let ids: Vec<_> = groups.iter().map(|g| g.id.as_str()).collect();
    assert_eq!(ids, vec!["g1", "g2"]);
}

#[tokio::test]
async fn test_rate_limit_then_success() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/groups/g1"))
        .respond_with(
            ResponseTemplate::new(429)
                .append_header("Retry-After", "0")
                .set_body_string("Rate limited"),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/groups/g1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "g1",
            "displayName": "All-Engineers",
            "mailEnabled": true,
            "securityEnabled": false,
            "groupTypes": ["DynamicMembership"],
            "membershipRule": "user.department -eq \"Engineering\""
        })))
        .expect(1)
        .mount(&server)
        .await;

    let group = directory(&server).await.get_group("g1").await.unwrap();
    assert!(group.is_dynamic());
}

#[tokio::test]
async fn test_server_error_gives_up_after_max_retries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/jane-id/licenseDetails"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .expect(3)
        .mount(&server)
        .await;

    let result = directory(&server).await.license_details("jane-id").await;
    assert!(matches!(result, Err(Offboard365Error::GraphApiError(_))));
}

#[tokio::test]
async fn test_write_is_not_retried_on_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1.0/groups/g-team/owners/$ref"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .expect(1)
        .mount(&server)
        .await;

    let result = directory(&server).await.add_owner("g-team", "admin-id").await;
    assert!(matches!(result, Err(Offboard365Error::GraphApiError(_))));
}

#[tokio::test]
async fn test_write_is_retried_when_throttled() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1.0/users/jane-id/revokeSignInSessions"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1.0/users/jane-id/revokeSignInSessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": true })))
        .expect(1)
        .mount(&server)
        .await;

    directory(&server).await.revoke_sign_in_sessions("jane-id").await.unwrap();
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/v1.0/users/jane-id"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": "Authorization_RequestDenied", "message": "Insufficient privileges to complete the operation." }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = directory(&server).await.set_account_enabled("jane-id", false).await;
    assert!(matches!(result, Err(Offboard365Error::GraphApiError(_))));
}

#[tokio::test]
async fn test_remove_licenses_sends_one_batch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1.0/users/jane-id/assignLicense"))
        .and(body_json(json!({
            "addLicenses": [],
            "removeLicenses": ["sku-e3", "sku-visio"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(jane()))
        .expect(1)
        .mount(&server)
        .await;

    directory(&server)
        .await
        .remove_licenses("jane-id", &["sku-e3".to_string(), "sku-visio".to_string()])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_add_owner_posts_directory_object_ref() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1.0/groups/g-team/owners/$ref"))
        .and(body_json(json!({
            "@odata.id": "https://graph.microsoft.com/v1.0/directoryObjects/admin-id"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    directory(&server).await.add_owner("g-team", "admin-id").await.unwrap();
}
