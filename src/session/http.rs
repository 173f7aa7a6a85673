//! Shared HTTP session.
//!
//! One `reqwest` client per session with its own cookie jar, redirects
//! disabled and a fixed browser user agent. The OAuth and OTT clients
//! share it so the OAuth session cookie set during login is sent on the
//! authorize call.

use rand::seq::SliceRandom;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{redirect, Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::error::{Error, Result};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent used when none has been persisted yet.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const DESKTOP_USER_AGENTS: &[&str] = &[
    DEFAULT_USER_AGENT,
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36 Edg/91.0.864.59",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.114 Safari/537.36",
];

/// Pick a desktop browser user agent at random.
pub fn random_desktop_user_agent() -> &'static str {
    DESKTOP_USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(DEFAULT_USER_AGENT)
}

/// HTTP client plus the cookie jar it writes to.
#[derive(Debug, Clone)]
pub struct HttpSession {
    client: Client,
    jar: Arc<Jar>,
    user_agent: String,
}

impl HttpSession {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Result<Self> {
        let user_agent = user_agent.into();
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent(user_agent.clone())
            .cookie_provider(Arc::clone(&jar))
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(Error::Network)?;
        Ok(Self {
            client,
            jar,
            user_agent,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Install a host-only cookie for `url`.
    pub fn set_cookie(&self, name: &str, value: &str, url: &Url) {
        self.jar
            .add_cookie_str(&format!("{name}={value}; Path=/"), url);
    }

    /// `Cookie` header value that would be sent to `url`.
    pub fn cookies_for(&self, url: &Url) -> Option<String> {
        self.jar
            .cookies(url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }
}

/// Status and body text of a response.
pub(crate) async fn read_body(response: Response) -> Result<(StatusCode, String)> {
    let status = response.status();
    let body = response.text().await?;
    Ok((status, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_user_agent_is_desktop() {
        for _ in 0..20 {
            let ua = random_desktop_user_agent();
            assert!(ua.starts_with("Mozilla/5.0"));
            assert!(!ua.contains("Mobile"));
        }
    }

    #[test]
    fn test_cookie_scoped_to_host() {
        let http = HttpSession::new(DEFAULT_USER_AGENT, DEFAULT_TIMEOUT).unwrap();
        let oauth = Url::parse("https://oauth.yettel.hu/").unwrap();
        http.set_cookie("iPlanetDirectoryPro", "token-id", &oauth);

        let authorize =
            Url::parse("https://oauth.yettel.hu/openam/oauth2/sc-acc-prod/authorize").unwrap();
        assert_eq!(
            http.cookies_for(&authorize).as_deref(),
            Some("iPlanetDirectoryPro=token-id")
        );

        let other = Url::parse("https://www.yetteltv.hu/").unwrap();
        assert!(http.cookies_for(&other).is_none());
    }

    #[test]
    fn test_user_agent_kept() {
        let http = HttpSession::new("Test/1.0", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(http.user_agent(), "Test/1.0");
    }
}
