//! OTT service calls against a mocked Kaltura API.

mod common;

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use common::*;
use yeti_session::session::{
    AnonymousSession, AuthBackend, AuthError, DeviceIdentity, Error, ErrorKind, ServiceSession,
};

fn session() -> ServiceSession {
    ServiceSession {
        ks_token: "user-ks".into(),
        refresh_token: "user-rt".into(),
        expires_at: 1_700_086_400,
    }
}

async fn body_of(yeti: &Yeti, service: &str, action: &str) -> Value {
    let requests = yeti.requests_to(&ott_path(service, action)).await;
    serde_json::from_slice(&requests[0].body).unwrap()
}

#[tokio::test]
async fn test_anonymous_login() {
    let yeti = Yeti::start().await;
    Mock::given(method("POST"))
        .and(path(ott_path("ottuser", "anonymousLogin")))
        .and(query_param("format", "1"))
        .and(query_param("clientTag", "1.23.0-PC"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": login_session("anon-ks", "", 1_700_000_600)
        })))
        .expect(1)
        .mount(&yeti.server)
        .await;

    let anonymous = yeti.client().anonymous_login().await.unwrap();
    assert_eq!(anonymous.ks_token, "anon-ks");
    assert_eq!(anonymous.expires_at, 1_700_000_600);

    let body = body_of(&yeti, "ottuser", "anonymousLogin").await;
    assert_eq!(body["language"], "*");
    assert_eq!(body["partnerId"], 3204);
    assert_eq!(body["apiVersion"], "5.4.0");
    assert!(body.get("ks").is_none());
}

#[tokio::test]
async fn test_anonymous_login_fault_is_protocol_error() {
    let yeti = Yeti::start().await;
    yeti.mount_ott(
        "ottuser",
        "anonymousLogin",
        ott_error("500000", "Partner is not valid"),
        1,
    )
    .await;

    let err = yeti.client().anonymous_login().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(err.to_string().contains("Partner is not valid"));
}

#[tokio::test]
async fn test_escalate_sends_access_token() {
    let yeti = Yeti::start().await;
    yeti.mount_ott(
        "ottuser",
        "login",
        json!({
            "objectType": "KalturaLoginResponse",
            "loginSession": login_session("user-ks", "user-rt", 1_700_086_400),
            "user": { "id": "777" }
        }),
        1,
    )
    .await;

    let anonymous = AnonymousSession {
        ks_token: "anon-ks".into(),
        refresh_token: String::new(),
        expires_at: 1_700_000_600,
    };
    let escalated = yeti
        .client()
        .escalate(&anonymous, "oauth-access", &DeviceIdentity::new(DEVICE))
        .await
        .unwrap();
    assert_eq!(escalated, session());

    let body = body_of(&yeti, "ottuser", "login").await;
    assert_eq!(body["ks"], "anon-ks");
    assert_eq!(body["udid"], DEVICE);
    assert_eq!(body["username"], "11111");
    assert_eq!(body["password"], "11111");
    assert_eq!(body["language"], "hun");
    assert_eq!(body["extraParams"]["accessToken"]["value"], "oauth-access");
    assert_eq!(body["extraParams"]["loginType"]["value"], "accessToken");
    assert!(body["extraParams"]["accessToken"]["objectType"]
        .as_str()
        .unwrap()
        .ends_with("StringValue"));
}

#[tokio::test]
async fn test_escalate_fault_is_login_failed() {
    let yeti = Yeti::start().await;
    yeti.mount_ott("ottuser", "login", ott_error("1026", "Invalid token"), 1)
        .await;

    let anonymous = AnonymousSession {
        ks_token: "anon-ks".into(),
        refresh_token: String::new(),
        expires_at: 0,
    };
    let err = yeti
        .client()
        .escalate(&anonymous, "expired", &DeviceIdentity::new(DEVICE))
        .await
        .unwrap_err();
    assert!(err.is_login_failure());
    assert_eq!(err.server_message(), Some(("Invalid token", 1026)));
}

#[tokio::test]
async fn test_refresh_session() {
    let yeti = Yeti::start().await;
    yeti.mount_ott(
        "ottuser",
        "refreshSession",
        login_session("new-ks", "new-rt", 1_700_172_800),
        1,
    )
    .await;

    let fresh = yeti
        .client()
        .refresh_session(&session(), &DeviceIdentity::new(DEVICE))
        .await
        .unwrap();
    assert_eq!(fresh.ks_token, "new-ks");
    assert_eq!(fresh.refresh_token, "new-rt");

    let body = body_of(&yeti, "ottuser", "refreshSession").await;
    assert_eq!(body["ks"], "user-ks");
    assert_eq!(body["refreshToken"], "user-rt");
    assert_eq!(body["udid"], DEVICE);
}

#[tokio::test]
async fn test_refresh_fault_is_refresh_failed() {
    let yeti = Yeti::start().await;
    yeti.mount_ott(
        "ottuser",
        "refreshSession",
        ott_error("500016", "KS expired"),
        1,
    )
    .await;

    let err = yeti
        .client()
        .refresh_session(&session(), &DeviceIdentity::new(DEVICE))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Auth(AuthError::RefreshSessionFailed { ref message, code: 500016 }) if message == "KS expired"
    ));
    assert!(err.is_login_failure());
}

#[tokio::test]
async fn test_unknown_device_is_not_registered() {
    let yeti = Yeti::start().await;
    yeti.mount_ott(
        "householddevice",
        "get",
        ott_error("1019", "DeviceNotExists"),
        1,
    )
    .await;

    let err = yeti
        .client()
        .get_registered_device_id(&session())
        .await
        .unwrap_err();
    assert!(err.is_device_not_registered());
}

#[tokio::test]
async fn test_other_device_lookup_faults_are_protocol_errors() {
    let yeti = Yeti::start().await;
    yeti.mount_ott(
        "householddevice",
        "get",
        ott_error("500", "Internal error"),
        1,
    )
    .await;

    let err = yeti
        .client()
        .get_registered_device_id(&session())
        .await
        .unwrap_err();
    assert!(!err.is_device_not_registered());
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[tokio::test]
async fn test_register_device() {
    let yeti = Yeti::start().await;
    yeti.mount_ott(
        "householddevice",
        "add",
        json!({ "udid": DEVICE, "state": "activated", "brandId": 22 }),
        1,
    )
    .await;

    let udid = yeti
        .client()
        .register_device(&session(), &DeviceIdentity::new(DEVICE))
        .await
        .unwrap();
    assert_eq!(udid, DEVICE);

    let body = body_of(&yeti, "householddevice", "add").await;
    assert_eq!(body["device"]["udid"], DEVICE);
    assert_eq!(body["device"]["brandId"], 22);
    assert!(body["device"]["objectType"]
        .as_str()
        .unwrap()
        .ends_with("HouseholdDevice"));
}

#[tokio::test]
async fn test_register_device_not_activated() {
    let yeti = Yeti::start().await;
    yeti.mount_ott(
        "householddevice",
        "add",
        json!({ "udid": DEVICE, "state": "pending" }),
        1,
    )
    .await;

    let err = yeti
        .client()
        .register_device(&session(), &DeviceIdentity::new(DEVICE))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Auth(AuthError::AddHouseholdDevice { ref message }) if message.contains("pending")
    ));
}

#[tokio::test]
async fn test_register_device_limit_reached() {
    let yeti = Yeti::start().await;
    yeti.mount_ott(
        "householddevice",
        "add",
        ott_error("1014", "Exceeded limit"),
        1,
    )
    .await;

    let err = yeti
        .client()
        .register_device(&session(), &DeviceIdentity::new(DEVICE))
        .await
        .unwrap_err();
    assert_eq!(err.server_message(), Some(("Exceeded limit", 0)));
}

#[tokio::test]
async fn test_delete_device() {
    let yeti = Yeti::start().await;
    yeti.mount_ott("householddevice", "delete", json!(true), 1)
        .await;

    yeti.client()
        .delete_device(&session(), "OTHERDEVICE00001")
        .await
        .unwrap();
    let body = body_of(&yeti, "householddevice", "delete").await;
    assert_eq!(body["udid"], "OTHERDEVICE00001");
}

#[tokio::test]
async fn test_delete_device_failures() {
    let yeti = Yeti::start().await;
    yeti.mount_ott("householddevice", "delete", json!(false), 1)
        .await;
    let err = yeti
        .client()
        .delete_device(&session(), "X")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Auth(AuthError::DeviceDeletionFailed { code: 0, .. })
    ));

    let yeti = Yeti::start().await;
    yeti.mount_ott(
        "householddevice",
        "delete",
        ott_error("1020", "Device not in household"),
        1,
    )
    .await;
    let err = yeti
        .client()
        .delete_device(&session(), "X")
        .await
        .unwrap_err();
    assert_eq!(err.server_message(), Some(("Device not in household", 1020)));
}

#[tokio::test]
async fn test_household_with_numeric_user_id() {
    let yeti = Yeti::start().await;
    yeti.mount_ott(
        "household",
        "get",
        json!({ "id": 42, "users": [{ "id": 777 }, { "id": "778" }] }),
        1,
    )
    .await;

    let binding = yeti.client().household(&session()).await.unwrap();
    assert_eq!(binding.household_id, 42);
    assert_eq!(binding.user_id, "777");
}

#[tokio::test]
async fn test_household_defaults() {
    let yeti = Yeti::start().await;
    yeti.mount_ott("household", "get", json!({}), 1).await;

    let binding = yeti.client().household(&session()).await.unwrap();
    assert_eq!(binding.household_id, -1);
    assert_eq!(binding.user_id, "-1");
}

#[tokio::test]
async fn test_list_devices() {
    let yeti = Yeti::start().await;
    yeti.mount_ott(
        "householddevice",
        "list",
        json!({
            "objectType": "KalturaHouseholdDeviceListResponse",
            "totalCount": 2,
            "objects": [
                { "udid": DEVICE, "name": "Laptop", "brandId": 22, "state": "activated", "activatedOn": 1_690_000_000 },
                { "udid": "TVSTICK000000001", "name": "TV", "state": "activated" }
            ]
        }),
        1,
    )
    .await;

    let devices = yeti.client().list_devices(&session()).await.unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].udid, DEVICE);
    assert_eq!(devices[0].brand_id, Some(22));
    assert_eq!(devices[0].activated_on, Some(1_690_000_000));
    assert_eq!(devices[1].activated_on, None);
}

#[tokio::test]
async fn test_empty_lists() {
    let yeti = Yeti::start().await;
    yeti.mount_ott(
        "streamingdevice",
        "list",
        json!({ "objectType": "KalturaStreamingDeviceListResponse", "totalCount": 0 }),
        1,
    )
    .await;
    yeti.mount_ott(
        "devicebrand",
        "list",
        json!({ "totalCount": 1, "objects": [{ "id": 22, "name": "PC", "deviceFamilyId": 5 }] }),
        1,
    )
    .await;

    let client = yeti.client();
    assert!(client.streaming_devices(&session()).await.unwrap().is_empty());
    let brands = client.device_brands(&session()).await.unwrap();
    assert_eq!(brands[0].id, 22);
    assert_eq!(brands[0].device_family_id, Some(5));
}

#[tokio::test]
async fn test_http_errors_are_protocol_errors() {
    let yeti = Yeti::start().await;
    Mock::given(method("POST"))
        .and(path(ott_path("household", "get")))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(1)
        .mount(&yeti.server)
        .await;

    let err = yeti.client().household(&session()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(!err.is_recoverable());
}
