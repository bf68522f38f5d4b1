#![allow(clippy::unwrap_used)]
// Integration tests for `F5OsClient` using wiremock.

use std::collections::BTreeSet;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use archer_api::as3::{As3, Tenant};
use archer_api::{
    Credentials, Device, Error, F5OsClient, F5OsOptions, RetryPolicy, TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, F5OsClient) {
    let server = MockServer::start().await;
    let url = Url::parse(&server.uri()).unwrap();
    let client = F5OsClient::with_credentials(
        &url,
        Credentials::new("admin", SecretString::from("secret")),
        &TransportConfig::default(),
        RetryPolicy::none(),
        F5OsOptions {
            interface: Some("lag1".into()),
            tenant: Some("tenant1".into()),
        },
    )
    .unwrap();
    (server, client)
}

fn jwt(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#));
    format!("{header}.{payload}.sig")
}

fn fresh_jwt() -> String {
    jwt(chrono::Utc::now().timestamp() + 3600)
}

const TENANT_VLANS: &str = "/api/data/f5-tenants:tenants/tenant=tenant1/config/vlans";

// ── Token handling ──────────────────────────────────────────────────

#[tokio::test]
async fn test_token_from_basic_auth_is_reused() {
    let (server, client) = setup().await;
    let token = fresh_jwt();

    Mock::given(method("PATCH"))
        .and(path("/api/data/openconfig-vlan:vlans"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(204).insert_header("X-Auth-Token", token.as_str()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(TENANT_VLANS))
        .and(header("X-Auth-Token", token.as_str()))
        .and(body_json(json!({ "f5-tenants:vlans": [42] })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client.ensure_vlan(42, 1500).await.unwrap();
    client.ensure_guest_vlan(42).await.unwrap();
}

#[tokio::test]
async fn test_expired_token_is_not_sent() {
    let (server, client) = setup().await;
    let stale = jwt(chrono::Utc::now().timestamp() - 10);

    Mock::given(method("PATCH"))
        .and(path("/api/data/openconfig-vlan:vlans"))
        .respond_with(ResponseTemplate::new(204).insert_header("X-Auth-Token", stale.as_str()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/data/openconfig-vlan:vlans"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client.ensure_vlan(42, 1500).await.unwrap();
    client.ensure_vlan(43, 1500).await.unwrap();
}

#[tokio::test]
async fn test_rejected_token_reauthenticates() {
    let (server, client) = setup().await;
    let token = fresh_jwt();

    Mock::given(method("PATCH"))
        .and(path("/api/data/openconfig-vlan:vlans"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(204).insert_header("X-Auth-Token", token.as_str()))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/data/openconfig-vlan:vlans/vlan=42"))
        .and(header("X-Auth-Token", token.as_str()))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/data/openconfig-vlan:vlans/vlan=42"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client.ensure_vlan(42, 1500).await.unwrap();
    client.delete_vlan(42).await.unwrap();
    // token was dropped; the next call bootstraps again with basic auth
    client.ensure_vlan(42, 1500).await.unwrap();
}

// ── Operations ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_trunk_vlan_membership() {
    let (server, client) = setup().await;

    Mock::given(method("PATCH"))
        .and(path(
            "/api/data/openconfig-interfaces:interfaces/interface=lag1/openconfig-if-aggregate:aggregation/openconfig-vlan:switched-vlan/config",
        ))
        .and(body_json(json!({ "openconfig-vlan:config": { "trunk-vlans": [42] } })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client.ensure_interface_vlan(42).await.unwrap();
}

#[tokio::test]
async fn test_sync_tenant_vlans() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/data/openconfig-vlan:vlans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "openconfig-vlan:vlans": { "vlan": [
                { "vlan-id": 1, "config": { "vlan-id": 1, "name": "mgmt" } },
                { "vlan-id": 100, "config": { "vlan-id": 100, "name": "vlan-100" } },
                { "vlan-id": 101, "config": { "vlan-id": 101, "name": "vlan-101" } }
            ]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(TENANT_VLANS))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "f5-tenants:vlans": [1, 100] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{TENANT_VLANS}=100")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(TENANT_VLANS))
        .and(body_json(json!({ "f5-tenants:vlans": [101] })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client
        .sync_guest_vlans(&BTreeSet::from([101]))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_sync_tenant_vlans_skips_segments_without_chassis_vlan() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/data/openconfig-vlan:vlans"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "openconfig-vlan:vlans": { "vlan": [
                { "vlan-id": 101, "config": { "vlan-id": 101, "name": "vlan-101" } }
            ]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(TENANT_VLANS))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "f5-tenants:vlans": [] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(TENANT_VLANS))
        .and(body_json(json!({ "f5-tenants:vlans": [101] })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client
        .sync_guest_vlans(&BTreeSet::from([101, 300]))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_declarative_operations_are_unsupported() {
    let (_server, client) = setup().await;

    let result = client
        .post_declaration(&As3::single("Common", Tenant::default()))
        .await;
    assert!(matches!(result, Err(Error::UnsupportedOperation(_))));
    assert!(matches!(
        client.ensure_route_domain(1, None).await,
        Err(Error::UnsupportedOperation(_))
    ));
    assert!(matches!(
        client.ensure_self_ip("selfip-x", "10.0.0.1/24", 1).await,
        Err(Error::UnsupportedOperation(_))
    ));
}
