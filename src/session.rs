//! Browser session against LinkedIn.
//!
//! Wraps a chromiumoxide browser: cookie-based authentication, navigation,
//! in-page evaluation, and subscription to the feed's API responses via CDP
//! network events.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EnableParams, EventResponseReceived, GetResponseBodyParams,
};
use chromiumoxide::Page;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::feed::GrowthSurface;

/// LinkedIn session cookies captured from an interactive login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCookies {
    /// The long-lived auth cookie.
    pub li_at: String,
    /// The CSRF session cookie, when captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jsessionid: Option<String>,
    /// When the cookies were captured.
    pub created_at: DateTime<Utc>,
}

impl SessionCookies {
    /// New cookie record for the given auth cookie.
    #[must_use]
    pub fn new(li_at: String, jsessionid: Option<String>) -> Self {
        Self {
            li_at,
            jsessionid,
            created_at: Utc::now(),
        }
    }

    /// Default per-user location (`~/.lisync/session.json`).
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        Ok(home.join(".lisync").join("session.json"))
    }

    /// Load cookies from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read session file {}", path.display()))?;
        let cookies: Self = serde_json::from_str(&content)?;
        Ok(cookies)
    }

    /// Save cookies to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load cookies from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(
            std::env::var("LISYNC_LI_AT").ok(),
            std::env::var("LISYNC_JSESSIONID").ok(),
        )
    }

    fn from_vars(li_at: Option<String>, jsessionid: Option<String>) -> Result<Self> {
        let li_at = li_at.ok_or_else(|| anyhow::anyhow!("LISYNC_LI_AT not set"))?;
        Ok(Self::new(li_at, jsessionid))
    }

    /// Session file if present, otherwise environment variables.
    pub fn load_or_env(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Self::from_env().context(
                "no session found; run `lisync login` or set LISYNC_LI_AT",
            )
        }
    }
}

/// A live browser session.
pub struct Session {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

/// Receives parsed feed API payloads for the lifetime of one run.
pub struct FeedTap {
    /// Parsed JSON payloads of intercepted feed responses.
    pub payloads: mpsc::Receiver<Value>,
    task: JoinHandle<()>,
}

impl Drop for FeedTap {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl Session {
    /// Launch a browser and open a blank page.
    pub async fn launch(headless: bool) -> Result<Self> {
        tracing::info!(headless, "Launching browser");

        let builder = BrowserConfig::builder()
            .arg("--no-sandbox") // Required for containerized environments
            .arg("--disable-dev-shm-usage"); // Avoid /dev/shm size issues in containers
        let builder = if headless { builder } else { builder.with_head() };
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config).await?;

        // Drive the CDP connection until it errors or the browser closes.
        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;

        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    /// Apply saved session cookies against the LinkedIn domain.
    pub async fn apply_cookies(&self, cookies: &SessionCookies) -> Result<()> {
        // Establish domain context first so the cookies attach correctly.
        self.page.goto("https://www.linkedin.com").await?;
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;

        let auth_cookie = CookieParam::builder()
            .name("li_at")
            .value(&cookies.li_at)
            .domain(".linkedin.com")
            .path("/")
            .secure(true)
            .http_only(true)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build auth cookie: {e}"))?;
        self.page.set_cookie(auth_cookie).await?;

        if let Some(jsessionid) = &cookies.jsessionid {
            let csrf_cookie = CookieParam::builder()
                .name("JSESSIONID")
                .value(jsessionid)
                .domain(".linkedin.com")
                .path("/")
                .secure(true)
                .build()
                .map_err(|e| anyhow::anyhow!("Failed to build csrf cookie: {e}"))?;
            self.page.set_cookie(csrf_cookie).await?;
        }

        Ok(())
    }

    /// Navigate the session's page.
    pub async fn goto(&self, url: &str) -> Result<()> {
        tracing::debug!(url, "Navigating");
        self.page.goto(url).await?;
        Ok(())
    }

    /// Navigate to a member's activity listing.
    pub async fn goto_activity(&self, profile: &str) -> Result<()> {
        self.goto(&format!(
            "https://www.linkedin.com/in/{profile}/recent-activity/all/"
        ))
        .await
    }

    /// Resolve the logged-in member's public profile id from the feed page.
    pub async fn resolve_current_user(&self) -> Result<String> {
        self.goto("https://www.linkedin.com/feed/").await?;
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;

        let url = self.page.url().await?.unwrap_or_default();
        if url.contains("login") || url.contains("checkpoint") {
            bail!("could not resolve identity: redirected to login, session cookies are invalid or expired");
        }

        let resolved: Option<String> = self
            .page
            .evaluate(
                r#"(() => {
                    const link = document.querySelector('a[href*="/in/"]');
                    if (!link) return null;
                    const m = link.getAttribute('href').match(/\/in\/([^/?]+)/);
                    return m ? m[1] : null;
                })()"#,
            )
            .await?
            .into_value()?;

        resolved.ok_or_else(|| anyhow::anyhow!("could not resolve identity from the feed page"))
    }

    /// Subscribe to feed API responses. Every observed response matching the
    /// voyager API path with a JSON content type is body-fetched, parsed, and
    /// forwarded; malformed payloads are logged and skipped, never fatal.
    pub async fn subscribe_feed_payloads(&self) -> Result<FeedTap> {
        self.page.execute(EnableParams::default()).await?;
        let mut events = self
            .page
            .event_listener::<EventResponseReceived>()
            .await?;

        let page = self.page.clone();
        let (tx, rx) = mpsc::channel(64);

        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if !is_feed_api_response(&event.response.url, &event.response.mime_type) {
                    continue;
                }

                let body = match page
                    .execute(GetResponseBodyParams::new(event.request_id.clone()))
                    .await
                {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::debug!(error = %e, "Response body unavailable, skipping");
                        continue;
                    }
                };
                if body.base64_encoded {
                    tracing::debug!("Skipping base64-encoded response body");
                    continue;
                }

                let payload: Value = match serde_json::from_str(&body.body) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(error = %e, "Malformed feed payload, skipping");
                        continue;
                    }
                };

                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });

        Ok(FeedTap { payloads: rx, task })
    }

    /// Interactive login: open the login page headed, let the human sign in,
    /// then capture the session cookies.
    pub async fn interactive_login() -> Result<SessionCookies> {
        let session = Self::launch(false).await?;
        let result = session.capture_login_cookies().await;
        session.close().await?;
        result
    }

    async fn capture_login_cookies(&self) -> Result<SessionCookies> {
        self.goto("https://www.linkedin.com/login").await?;

        println!("\n🔐 Please log in to LinkedIn in the browser window.");
        println!("   Press Enter when you're done...\n");
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        // Let cookies settle after the post-login redirect.
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;

        let mut li_at = None;
        let mut jsessionid = None;
        for cookie in self.page.get_cookies().await? {
            match cookie.name.as_str() {
                "li_at" => li_at = Some(cookie.value.clone()),
                "JSESSIONID" => jsessionid = Some(cookie.value.clone()),
                _ => {}
            }
        }

        let li_at = li_at.ok_or_else(|| {
            anyhow::anyhow!("failed to extract li_at cookie - login may have failed")
        })?;
        tracing::info!("Captured session cookies");
        Ok(SessionCookies::new(li_at, jsessionid))
    }

    /// Close the browser and stop the connection handler.
    pub async fn close(mut self) -> Result<()> {
        self.browser.close().await?;
        self.handler.await?;
        Ok(())
    }
}

#[async_trait]
impl GrowthSurface for Session {
    async fn measure(&self) -> Result<u64> {
        let height: u64 = self
            .page
            .evaluate("document.body.scrollHeight")
            .await?
            .into_value()?;
        Ok(height)
    }

    async fn load_more(&self) -> Result<()> {
        self.page
            .evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await?;
        Ok(())
    }
}

/// Whether a response belongs to the feed's JSON API.
fn is_feed_api_response(url: &str, mime_type: &str) -> bool {
    url.contains("/voyager/api/") && mime_type.contains("json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_api_response_filter() {
        assert!(is_feed_api_response(
            "https://www.linkedin.com/voyager/api/graphql?queryId=x",
            "application/json"
        ));
        assert!(!is_feed_api_response(
            "https://www.linkedin.com/voyager/api/graphql",
            "text/html"
        ));
        assert!(!is_feed_api_response(
            "https://static.licdn.com/sc/h/abc.js",
            "application/json"
        ));
    }

    #[test]
    fn test_cookies_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let cookies = SessionCookies::new("tok".to_string(), Some("ajax:123".to_string()));
        cookies.save(&path).unwrap();
        let loaded = SessionCookies::load(&path).unwrap();
        assert_eq!(loaded.li_at, "tok");
        assert_eq!(loaded.jsessionid.as_deref(), Some("ajax:123"));
    }

    #[test]
    fn test_env_fallback_requires_auth_cookie() {
        assert!(SessionCookies::from_vars(None, Some("ajax:1".to_string())).is_err());

        let cookies =
            SessionCookies::from_vars(Some("tok".to_string()), None).unwrap();
        assert_eq!(cookies.li_at, "tok");
        assert!(cookies.jsessionid.is_none());
    }

    #[test]
    fn test_load_or_env_prefers_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        SessionCookies::new("from-file".to_string(), None)
            .save(&path)
            .unwrap();

        let loaded = SessionCookies::load_or_env(&path).unwrap();
        assert_eq!(loaded.li_at, "from-file");
    }
}
