//! Token acquisition and refresh.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use serde::Deserialize;

use super::callback::{CallbackServer, CALLBACK_PORT, REDIRECT_URI};
use super::credentials::{CredentialStore, Credentials};

/// Proactive refresh window: refresh when less than a day of validity is
/// left. A wide margin against clock skew and token-exchange latency.
const REFRESH_WINDOW_SECS: i64 = 86_400;

/// Scopes requested during authorization.
const SCOPES: &str = "openid profile email w_member_social";

/// OAuth and userinfo endpoints. Defaults target LinkedIn; tests point the
/// bases at a mock server.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Authorization endpoint (browser redirect).
    pub auth_url: String,
    /// Token endpoint (code and refresh grants, form-encoded).
    pub token_url: String,
    /// Userinfo endpoint (bearer-authorized GET).
    pub userinfo_url: String,
    /// Redirect target registered with the developer app.
    pub redirect_uri: String,
    /// Loopback port the callback listener binds.
    pub callback_port: u16,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://www.linkedin.com/oauth/v2/authorization".to_string(),
            token_url: "https://www.linkedin.com/oauth/v2/accessToken".to_string(),
            userinfo_url: "https://api.linkedin.com/v2/userinfo".to_string(),
            redirect_uri: REDIRECT_URI.to_string(),
            callback_port: CALLBACK_PORT,
        }
    }
}

/// Wire shape of a token-endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: Option<String>,
}

/// Obtains, refreshes, and persists OAuth credentials.
///
/// The sole producer of credential values in memory; the store is the single
/// writer of their durable form.
pub struct TokenAuthority {
    endpoints: Endpoints,
    client: Option<(String, String)>,
    store: CredentialStore,
    http: reqwest::Client,
}

impl TokenAuthority {
    /// Authority over the given store, for refresh and get-valid. Client
    /// id/secret come from the stored record.
    #[must_use]
    pub fn new(store: CredentialStore) -> Self {
        Self {
            endpoints: Endpoints::default(),
            client: None,
            store,
            http: reqwest::Client::new(),
        }
    }

    /// Attach developer-app client credentials, required for `authorize`.
    #[must_use]
    pub fn with_client(mut self, client_id: String, client_secret: String) -> Self {
        self.client = Some((client_id, client_secret));
        self
    }

    /// Override the endpoints (tests).
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// The URL a human must visit to grant consent.
    pub fn authorization_url(&self) -> Result<String> {
        let (client_id, _) = self.client()?;
        let query = [
            ("response_type", "code"),
            ("client_id", client_id),
            ("redirect_uri", &self.endpoints.redirect_uri),
            ("scope", SCOPES),
        ]
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
        Ok(format!("{}?{}", self.endpoints.auth_url, query))
    }

    /// Run the full authorization-code flow: start the loopback listener,
    /// hand the consent URL to `present_url`, await the redirect, exchange
    /// the code, fetch the member id, persist and return the credential set.
    pub async fn authorize(&self, present_url: impl FnOnce(&str)) -> Result<Credentials> {
        let (client_id, client_secret) = self.client()?;
        let url = self.authorization_url()?;

        let server = CallbackServer::start_on(self.endpoints.callback_port).await?;
        present_url(&url);
        tracing::info!("Waiting for authorization redirect");
        let code = server.recv_code().await?;

        let token = self
            .exchange(&[
                ("grant_type", "authorization_code"),
                ("code", &code),
                ("redirect_uri", &self.endpoints.redirect_uri),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .await?;

        let member_id = self.fetch_member_id(&token.access_token).await?;
        tracing::info!(member_id, "Authorized");

        let creds = Credentials {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            member_id,
            expires_at: Utc::now().timestamp() + token.expires_in,
        };
        self.store.save(&creds)?;
        Ok(creds)
    }

    /// Exchange the refresh token for a new access token, persist, return
    /// the updated record. Fatal without a refresh token.
    pub async fn refresh(&self, creds: &Credentials) -> Result<Credentials> {
        let refresh_token = creds
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                anyhow!("no refresh token stored; run `lisync authorize` to re-authenticate")
            })?;

        let token = self
            .exchange(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &creds.client_id),
                ("client_secret", &creds.client_secret),
            ])
            .await?;

        let updated = Credentials {
            access_token: token.access_token,
            // Keep the old refresh token if the provider did not rotate it.
            refresh_token: token.refresh_token.or_else(|| creds.refresh_token.clone()),
            expires_at: Utc::now().timestamp() + token.expires_in,
            ..creds.clone()
        };
        self.store.save(&updated)?;
        tracing::info!(expires_at = updated.expires_at, "Refreshed access token");
        Ok(updated)
    }

    /// Load the stored credentials, refreshing proactively when less than a
    /// day of validity remains. Fatal if nothing is stored.
    pub async fn get_valid(&self) -> Result<Credentials> {
        let creds = self.store.load().ok_or_else(|| {
            anyhow!("no stored credentials; run `lisync authorize` first")
        })?;

        if creds.expires_within(REFRESH_WINDOW_SECS) {
            tracing::debug!("Access token near expiry, refreshing");
            self.refresh(&creds).await
        } else {
            Ok(creds)
        }
    }

    fn client(&self) -> Result<(&str, &str)> {
        self.client
            .as_ref()
            .map(|(id, secret)| (id.as_str(), secret.as_str()))
            .context("client id/secret not configured")
    }

    /// POST a form-encoded grant to the token endpoint.
    async fn exchange(&self, form: &[(&str, &str)]) -> Result<ExchangedToken> {
        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(form)
            .send()
            .await
            .context("token endpoint unreachable")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("token exchange failed with status {status}: {body}");
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("token endpoint returned unparseable body")?;
        let access_token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow!("token exchange response lacks an access token"))?;

        Ok(ExchangedToken {
            access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in.unwrap_or(0),
        })
    }

    /// Resolve the authenticated member id via the userinfo endpoint.
    async fn fetch_member_id(&self, access_token: &str) -> Result<String> {
        let response = self
            .http
            .get(&self.endpoints.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("userinfo endpoint unreachable")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("userinfo request failed with status {status}: {body}");
        }

        let info: UserInfo = response
            .json()
            .await
            .context("userinfo endpoint returned unparseable body")?;
        info.sub
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("userinfo response lacks a member identifier"))
    }
}

/// A validated token-endpoint response.
struct ExchangedToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}
