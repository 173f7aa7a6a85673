//! Full session lifecycle over HTTP: fresh install, reuse, refresh and
//! recovery, with every remote call counted.

mod common;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string, body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

use common::*;
use yeti_session::session::{
    Credentials, DeviceIdentity, ErrorKind, FileSettingsStore, HouseholdBinding, MemorySettingsStore,
    Outcome, SessionOrchestrator, SettingsStore,
};

const NOW: i64 = 1_700_000_000;

async fn installed_store() -> MemorySettingsStore {
    let store = MemorySettingsStore::new();
    store.set("username", USERNAME).await.unwrap();
    store.set("password", PASSWORD).await.unwrap();
    store.set("devicekey", DEVICE).await.unwrap();
    store
}

async fn mount_escalation(yeti: &Yeti, expect: u64) {
    yeti.mount_ott(
        "ottuser",
        "anonymousLogin",
        login_session("anon-ks", "", NOW + 600),
        expect,
    )
    .await;
    yeti.mount_ott(
        "ottuser",
        "login",
        json!({ "loginSession": login_session("user-ks", "user-rt", NOW + 86_400) }),
        expect,
    )
    .await;
}

#[tokio::test]
async fn test_fresh_install_signs_in_and_registers() {
    let yeti = Yeti::start().await;
    yeti.mount_oauth(1).await;
    mount_escalation(&yeti, 1).await;
    yeti.mount_ott(
        "householddevice",
        "get",
        ott_error("1019", "DeviceNotExists"),
        1,
    )
    .await;
    yeti.mount_ott(
        "householddevice",
        "add",
        json!({ "udid": DEVICE, "state": "activated" }),
        1,
    )
    .await;
    yeti.mount_ott(
        "household",
        "get",
        json!({ "id": 4242, "users": [{ "id": "9001" }] }),
        1,
    )
    .await;

    let store = installed_store().await;
    let orchestrator = SessionOrchestrator::new(yeti.client(), store.clone());

    let outcome = orchestrator.ensure_authenticated_at(NOW).await.unwrap();
    assert_eq!(outcome, Outcome::Escalated);

    let snapshot = store.snapshot().await;
    assert_eq!(snapshot["oauthaccesstoken"], "oauth-access");
    assert_eq!(snapshot["oauthexpires"], (NOW + 3599).to_string());
    assert_eq!(snapshot["kstoken"], "user-ks");
    assert_eq!(snapshot["ksrefreshtoken"], "user-rt");
    assert_eq!(snapshot["ksexpiry"], (NOW + 86_400).to_string());
    assert_eq!(snapshot["householdid"], "4242");
    assert_eq!(snapshot["userid"], "9001");
    assert_eq!(snapshot["devicekey"], DEVICE);

    // Second run with a valid session touches nothing; the `.expect(1)`
    // counts above are verified when the server drops.
    let outcome = orchestrator.ensure_authenticated_at(NOW + 60).await.unwrap();
    assert_eq!(outcome, Outcome::AlreadyValid);
}

#[tokio::test]
async fn test_wrong_password_persists_no_tokens() {
    let yeti = Yeti::start().await;
    yeti.mount_discovery(1).await;
    Mock::given(method("POST"))
        .and(path(AUTHENTICATE))
        .and(body_string(""))
        .respond_with(ResponseTemplate::new(200).set_body_json(login_form()))
        .expect(1)
        .mount(&yeti.server)
        .await;
    Mock::given(method("POST"))
        .and(path(AUTHENTICATE))
        .and(body_string_contains("callbacks"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": 400,
            "reason": "Unauthorized",
            "message": "Invalid credentials"
        })))
        .expect(1)
        .mount(&yeti.server)
        .await;
    yeti.mount_authorize(0).await;
    yeti.mount_token(0).await;
    mount_escalation(&yeti, 0).await;

    let store = MemorySettingsStore::with_entries([
        ("username", USERNAME),
        ("password", "wrong"),
        ("devicekey", DEVICE),
    ]);
    let orchestrator = SessionOrchestrator::new(yeti.client(), store.clone());

    let err = orchestrator.ensure_authenticated_at(NOW).await.unwrap_err();
    assert!(err.is_login_failure());
    assert_eq!(err.server_message(), Some(("Invalid credentials", 400)));

    let snapshot = store.snapshot().await;
    assert_eq!(snapshot.len(), 3);
    assert!(!snapshot.contains_key("oauthaccesstoken"));
    assert!(!snapshot.contains_key("kstoken"));
}

#[tokio::test]
async fn test_expired_session_is_refreshed_without_login() {
    let yeti = Yeti::start().await;
    yeti.mount_oauth(0).await;
    mount_escalation(&yeti, 0).await;
    yeti.mount_ott(
        "ottuser",
        "refreshSession",
        login_session("refreshed-ks", "refreshed-rt", NOW + 86_400),
        1,
    )
    .await;

    let store = installed_store().await;
    let orchestrator = SessionOrchestrator::new(yeti.client(), store.clone());
    orchestrator
        .state()
        .save_escalation(
            &yeti_session::session::ServiceSession {
                ks_token: "stale-ks".into(),
                refresh_token: "stale-rt".into(),
                expires_at: NOW - 1,
            },
            Some(&HouseholdBinding {
                household_id: 4242,
                user_id: "9001".into(),
            }),
        )
        .await
        .unwrap();
    store.set("oauthaccesstoken", "old-oauth").await.unwrap();
    store.set("oauthrefreshtoken", "old-oauth-rt").await.unwrap();
    store.set("oauthexpires", &(NOW - 10).to_string()).await.unwrap();

    let outcome = orchestrator.ensure_authenticated_at(NOW).await.unwrap();
    assert_eq!(outcome, Outcome::Refreshed);
    assert_eq!(
        orchestrator.current_ks_token().await.unwrap().as_deref(),
        Some("refreshed-ks")
    );
    // The expired OAuth token is left alone while refresh works.
    assert_eq!(store.get_sync("oauthaccesstoken").as_deref(), Some("old-oauth"));
}

#[tokio::test]
async fn test_rejected_refresh_recovers_through_escalation() {
    let yeti = Yeti::start().await;
    yeti.mount_oauth(0).await;
    yeti.mount_ott(
        "ottuser",
        "refreshSession",
        ott_error("500016", "KS expired"),
        1,
    )
    .await;
    mount_escalation(&yeti, 1).await;
    yeti.mount_ott("householddevice", "get", json!({ "udid": DEVICE }), 1)
        .await;
    yeti.mount_ott("householddevice", "add", json!({}), 0).await;
    yeti.mount_ott("household", "get", json!({ "id": 1 }), 0).await;

    let store = MemorySettingsStore::with_entries([
        ("username", USERNAME),
        ("password", PASSWORD),
        ("devicekey", DEVICE),
        ("oauthaccesstoken", "oauth-access"),
        ("oauthrefreshtoken", "oauth-refresh"),
        ("oauthexpires", "1700003599"),
        ("kstoken", "stale-ks"),
        ("ksrefreshtoken", "stale-rt"),
        ("ksexpiry", "1699990000"),
        ("householdid", "4242"),
        ("userid", "9001"),
    ]);
    let orchestrator = SessionOrchestrator::new(yeti.client(), store.clone());

    let outcome = orchestrator.ensure_authenticated_at(NOW).await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Recovered {
            refresh: ErrorKind::Rejected
        }
    );
    assert_eq!(store.get_sync("kstoken").as_deref(), Some("user-ks"));
    assert_eq!(store.get_sync("householdid").as_deref(), Some("4242"));
}

#[tokio::test]
async fn test_foreign_device_id_is_fatal() {
    let yeti = Yeti::start().await;
    yeti.mount_oauth(1).await;
    mount_escalation(&yeti, 1).await;
    yeti.mount_ott(
        "householddevice",
        "get",
        json!({ "udid": "SOMEONEELSE00000" }),
        1,
    )
    .await;
    yeti.mount_ott("household", "get", json!({ "id": 1 }), 0).await;

    let store = installed_store().await;
    let orchestrator = SessionOrchestrator::new(yeti.client(), store.clone());

    let err = orchestrator.ensure_authenticated_at(NOW).await.unwrap_err();
    assert!(matches!(
        err,
        yeti_session::session::Error::DeviceIdMismatch { ref actual, .. } if actual == "SOMEONEELSE00000"
    ));
    assert!(store.get_sync("kstoken").is_none());
}

#[tokio::test]
async fn test_state_survives_restart_with_file_store() {
    let yeti = Yeti::start().await;
    yeti.mount_oauth(1).await;
    mount_escalation(&yeti, 1).await;
    yeti.mount_ott("householddevice", "get", json!({ "udid": DEVICE }), 1)
        .await;
    yeti.mount_ott("household", "get", json!({ "id": 7, "users": [] }), 1)
        .await;

    let dir = TempDir::new().unwrap();
    let settings = dir.path().join("settings.json");

    {
        let store = FileSettingsStore::new(&settings).unwrap();
        let orchestrator = SessionOrchestrator::new(yeti.client(), store);
        orchestrator
            .state()
            .save_credentials(&Credentials::new(USERNAME, PASSWORD))
            .await
            .unwrap();
        orchestrator
            .state()
            .save_device_identity(&DeviceIdentity::new(DEVICE))
            .await
            .unwrap();
        assert_eq!(
            orchestrator.ensure_authenticated_at(NOW).await.unwrap(),
            Outcome::Escalated
        );
    }

    // A new process with a new HTTP client sees the persisted session.
    let store = FileSettingsStore::new(&settings).unwrap();
    let orchestrator = SessionOrchestrator::new(yeti.client(), store);
    assert_eq!(
        orchestrator.ensure_authenticated_at(NOW + 10).await.unwrap(),
        Outcome::AlreadyValid
    );
    assert_eq!(
        orchestrator.household().await.unwrap(),
        Some(HouseholdBinding {
            household_id: 7,
            user_id: "-1".into()
        })
    );
}

#[tokio::test]
async fn test_escalation_without_refresh_token_persists_nothing() {
    let yeti = Yeti::start().await;
    yeti.mount_oauth(1).await;
    yeti.mount_ott(
        "ottuser",
        "anonymousLogin",
        login_session("anon-ks", "", NOW + 600),
        1,
    )
    .await;
    yeti.mount_ott(
        "ottuser",
        "login",
        json!({ "loginSession": { "ks": "user-ks", "expiry": NOW + 86_400 } }),
        1,
    )
    .await;
    yeti.mount_ott("householddevice", "get", json!({ "udid": DEVICE }), 0)
        .await;

    let store = installed_store().await;
    let orchestrator = SessionOrchestrator::new(yeti.client(), store.clone());

    let err = orchestrator.ensure_authenticated_at(NOW).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(store.get_sync("kstoken").is_none());
    assert!(orchestrator.current_ks_token().await.unwrap().is_none());
    // The OAuth token from the successful login is kept for the next run.
    assert_eq!(store.get_sync("oauthaccesstoken").as_deref(), Some("oauth-access"));
}
