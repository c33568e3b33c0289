//! Post create/edit/delete against the REST API.
//!
//! Each operation supplies its own request builder and success interpreter
//! to the shared executor; the refresh-on-401 policy is defined once there.

use reqwest::Response;
use serde_json::json;

use super::executor::{ApiError, ApiExecutor};
use crate::auth::{Credentials, TokenAuthority};

/// Monthly API version header value.
const LINKEDIN_VERSION: &str = "202506";
/// Rest.li protocol version header value.
const RESTLI_VERSION: &str = "2.0.0";

/// Client for the posts resource.
pub struct PostsClient {
    executor: ApiExecutor,
    http: reqwest::Client,
    base_url: String,
}

impl PostsClient {
    /// Client against the production API.
    #[must_use]
    pub fn new(authority: TokenAuthority) -> Self {
        Self::with_base_url(authority, "https://api.linkedin.com".to_string())
    }

    /// Client against an arbitrary base URL (tests).
    #[must_use]
    pub fn with_base_url(authority: TokenAuthority, base_url: String) -> Self {
        Self {
            executor: ApiExecutor::new(authority),
            http: reqwest::Client::new(),
            base_url,
        }
    }

    /// Create a post with the given text. Returns the generated activity id
    /// from the `x-restli-id` response header.
    pub async fn create(&self, text: &str, visibility: &str) -> Result<String, ApiError> {
        let url = format!("{}/rest/posts", self.base_url);
        let id = self
            .executor
            .execute(
                |creds| {
                    self.authorized(self.http.post(&url), creds).json(&json!({
                        "author": format!("urn:li:person:{}", creds.member_id),
                        "commentary": text,
                        "visibility": visibility,
                        "distribution": {
                            "feedDistribution": "MAIN_FEED",
                            "targetEntities": [],
                            "thirdPartyDistributionChannels": [],
                        },
                        "lifecycleState": "PUBLISHED",
                        "isReshareDisabledByAuthor": false,
                    }))
                },
                created_post_id,
            )
            .await?;
        tracing::info!(id, "Created post");
        Ok(id)
    }

    /// Edit a post's commentary via a partial-update envelope.
    pub async fn edit(&self, post_id: &str, text: &str) -> Result<(), ApiError> {
        let url = self.post_url(post_id);
        self.executor
            .execute(
                |creds| {
                    self.authorized(self.http.post(&url), creds)
                        .header("X-RestLi-Method", "PARTIAL_UPDATE")
                        .json(&json!({
                            "patch": { "$set": { "commentary": text } },
                        }))
                },
                |_| Ok(()),
            )
            .await?;
        tracing::info!(post_id, "Edited post");
        Ok(())
    }

    /// Delete a post. No request body.
    pub async fn delete(&self, post_id: &str) -> Result<(), ApiError> {
        let url = self.post_url(post_id);
        self.executor
            .execute(
                |creds| self.authorized(self.http.delete(&url), creds),
                |_| Ok(()),
            )
            .await?;
        tracing::info!(post_id, "Deleted post");
        Ok(())
    }

    fn post_url(&self, post_id: &str) -> String {
        format!(
            "{}/rest/posts/{}",
            self.base_url,
            urlencoding::encode(post_id)
        )
    }

    fn authorized(
        &self,
        builder: reqwest::RequestBuilder,
        creds: &Credentials,
    ) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&creds.access_token)
            .header("LinkedIn-Version", LINKEDIN_VERSION)
            .header("X-Restli-Protocol-Version", RESTLI_VERSION)
    }
}

/// Pull the generated post id out of a create response.
fn created_post_id(response: &Response) -> Result<String, ApiError> {
    response
        .headers()
        .get("x-restli-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Response("create response missing x-restli-id header".to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::auth::{CredentialStore, Endpoints};

    fn client(mock: &MockServer, dir: &tempfile::TempDir, expires_in_secs: i64) -> PostsClient {
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        store
            .save(&Credentials {
                client_id: "cid".to_string(),
                client_secret: "csecret".to_string(),
                access_token: "token-1".to_string(),
                refresh_token: Some("refresh-1".to_string()),
                member_id: "mem1".to_string(),
                expires_at: Utc::now().timestamp() + expires_in_secs,
            })
            .unwrap();
        let authority = TokenAuthority::new(store).with_endpoints(Endpoints {
            token_url: format!("{}/oauth/v2/accessToken", mock.uri()),
            ..Endpoints::default()
        });
        PostsClient::with_base_url(authority, mock.uri())
    }

    #[tokio::test]
    async fn test_create_returns_id_from_response_header() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/posts"))
            .and(header("Authorization", "Bearer token-1"))
            .and(header("LinkedIn-Version", LINKEDIN_VERSION))
            .and(header("X-Restli-Protocol-Version", RESTLI_VERSION))
            .and(body_string_contains("urn:li:person:mem1"))
            .and(body_string_contains("hello"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("x-restli-id", "urn:li:share:999"),
            )
            .expect(1)
            .mount(&mock)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = client(&mock, &dir, 30 * 86_400);

        let id = client.create("hello", "PUBLIC").await.unwrap();
        assert_eq!(id, "urn:li:share:999");
    }

    #[tokio::test]
    async fn test_create_without_id_header_is_an_error() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/posts"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&mock)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = client(&mock, &dir, 30 * 86_400);

        let err = client.create("hello", "PUBLIC").await.unwrap_err();
        assert!(matches!(err, ApiError::Response(_)));
    }

    #[tokio::test]
    async fn test_edit_retries_after_expired_authorization() {
        let mock = MockServer::start().await;

        // First attempt with the stale token is rejected.
        Mock::given(method("POST"))
            .and(path("/rest/posts/urn%3Ali%3Ashare%3A999"))
            .and(header("Authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&mock)
            .await;
        // Retry with the refreshed token succeeds.
        Mock::given(method("POST"))
            .and(path("/rest/posts/urn%3Ali%3Ashare%3A999"))
            .and(header("Authorization", "Bearer token-2"))
            .and(header("X-RestLi-Method", "PARTIAL_UPDATE"))
            .and(body_string_contains("$set"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth/v2/accessToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "token-2",
                "expires_in": 5_184_000,
            })))
            .expect(1)
            .mount(&mock)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = client(&mock, &dir, 30 * 86_400);

        client.edit("urn:li:share:999", "updated text").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_sends_no_body() {
        let mock = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/posts/urn%3Ali%3Ashare%3A999"))
            .and(header("Authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = client(&mock, &dir, 30 * 86_400);

        client.delete("urn:li:share:999").await.unwrap();
    }

    #[tokio::test]
    async fn test_non_2xx_carries_status_and_body() {
        let mock = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/posts/urn%3Ali%3Ashare%3A999"))
            .respond_with(ResponseTemplate::new(422).set_body_string("ucg validation failed"))
            .mount(&mock)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = client(&mock, &dir, 30 * 86_400);

        let err = client.delete("urn:li:share:999").await.unwrap_err();
        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, 422);
                assert_eq!(body, "ucg validation failed");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }
}
