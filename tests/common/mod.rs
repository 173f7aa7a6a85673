//! Mock Yeti services for integration tests.
//!
//! [`Yeti`] wraps a wiremock server laid out like the production hosts
//! under [`Endpoints::with_base`].

#![allow(dead_code)]

use serde_json::{json, Value};
use wiremock::matchers::{body_string, body_string_contains, header_regex, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use yeti_session::session::http::{HttpSession, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
use yeti_session::session::{Endpoints, PlatformProfile, YetiClient};

pub const DEVICE: &str = "ABCDEFGHJK123456";
pub const USERNAME: &str = "viewer@example.com";
pub const PASSWORD: &str = "correct horse";
pub const TOKEN_ID: &str = "AQIC5wM2LY4Sfcz-session";
pub const AUTH_CODE: &str = "auth-code-123";

pub const AUTHENTICATE: &str = "/openam/json/realms/root/realms/sc-acc-prod/authenticate";
pub const AUTHORIZE: &str = "/openam/oauth2/authorize";
pub const ACCESS_TOKEN: &str = "/openam/oauth2/access_token";

pub fn ott_path(service: &str, action: &str) -> String {
    format!("/ott/api_v3/service/{service}/action/{action}")
}

pub struct Yeti {
    pub server: MockServer,
}

impl Yeti {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::with_base(&self.server.uri()).unwrap()
    }

    pub fn client(&self) -> YetiClient {
        YetiClient::new(
            self.endpoints(),
            PlatformProfile::default(),
            HttpSession::new(DEFAULT_USER_AGENT, DEFAULT_TIMEOUT).unwrap(),
        )
    }

    pub async fn requests_to(&self, route: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == route)
            .collect()
    }

    /// Discovery answering with S256 client parameters.
    pub async fn mount_discovery(&self, expect: u64) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/sdk/evalx/users/.+"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "AUTH_PARAMS": {
                    "value": {
                        "oauthBaseUrl": format!("{}/openam", self.server.uri()),
                        "oAuthResponseType": "code",
                        "oAuthClientId": "yettel-web",
                        "oAuthCodeChallengeMethod": "S256",
                        "oAuthScope": "openid profile"
                    }
                },
                "OTHER_FLAG": { "value": true }
            })))
            .expect(expect)
            .mount(&self.server)
            .await;
    }

    /// Login form plus a credentials check that accepts [`USERNAME`]/[`PASSWORD`].
    pub async fn mount_authenticate(&self, expect_each: u64) {
        Mock::given(method("POST"))
            .and(path(AUTHENTICATE))
            .and(body_string(""))
            .respond_with(ResponseTemplate::new(200).set_body_json(login_form()))
            .expect(expect_each)
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path(AUTHENTICATE))
            .and(body_string_contains(USERNAME))
            .and(body_string_contains(PASSWORD))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tokenId": TOKEN_ID,
                "successUrl": "/openam/console",
                "realm": "/sc-acc-prod"
            })))
            .expect(expect_each)
            .mount(&self.server)
            .await;
    }

    /// Authorize redirecting to the web client with [`AUTH_CODE`].
    pub async fn mount_authorize(&self, expect: u64) {
        let location = format!("{}/auth/?code={AUTH_CODE}&iss=openam", self.server.uri());
        Mock::given(method("GET"))
            .and(path(AUTHORIZE))
            .and(header_regex("cookie", &format!("iPlanetDirectoryPro={TOKEN_ID}")))
            .respond_with(ResponseTemplate::new(302).insert_header("location", location.as_str()))
            .expect(expect)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_token(&self, expect: u64) {
        Mock::given(method("POST"))
            .and(path(ACCESS_TOKEN))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains(&format!("code={AUTH_CODE}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "oauth-access",
                "refresh_token": "oauth-refresh",
                "scope": "openid profile",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .expect(expect)
            .mount(&self.server)
            .await;
    }

    /// Every step of a successful OAuth login, each expected `expect` times.
    pub async fn mount_oauth(&self, expect: u64) {
        self.mount_discovery(expect).await;
        self.mount_authenticate(expect).await;
        self.mount_authorize(expect).await;
        self.mount_token(expect).await;
    }

    pub async fn mount_ott(&self, service: &str, action: &str, result: Value, expect: u64) {
        Mock::given(method("POST"))
            .and(path(ott_path(service, action)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "executionTime": 0.01,
                "result": result
            })))
            .expect(expect)
            .mount(&self.server)
            .await;
    }
}

pub fn login_form() -> Value {
    json!({
        "authId": "eyJ0eXAiOiJKV1QiLCJhbGciOiJIUzI1NiJ9",
        "template": "",
        "stage": "DataStore1",
        "callbacks": [
            {
                "type": "NameCallback",
                "output": [{ "name": "prompt", "value": "User Name:" }],
                "input": [{ "name": "IDToken1", "value": "" }]
            },
            {
                "type": "PasswordCallback",
                "output": [{ "name": "prompt", "value": "Password:" }],
                "input": [{ "name": "IDToken2", "value": "" }]
            }
        ]
    })
}

pub fn login_session(ks: &str, refresh: &str, expiry: i64) -> Value {
    json!({
        "objectType": "KalturaLoginSession",
        "ks": ks,
        "refreshToken": refresh,
        "expiry": expiry
    })
}

pub fn ott_error(code: &str, message: &str) -> Value {
    json!({
        "error": {
            "objectType": "KalturaAPIException",
            "code": code,
            "message": message
        }
    })
}
