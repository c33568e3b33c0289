//! Refresh-and-retry execution of authorized calls.
//!
//! Every mutating operation goes through [`ApiExecutor::execute`], which owns
//! the one shared policy: obtain a valid credential, make the call, and on a
//! 401 force exactly one refresh and retry once. There is no retry loop - at
//! most two underlying calls are ever made per logical operation.

use reqwest::{RequestBuilder, Response, StatusCode};
use thiserror::Error;

use crate::auth::{Credentials, TokenAuthority};

/// Errors from the mutation path.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never completed.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Credentials could not be obtained or refreshed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The API answered outside the success range. Status and body are
    /// carried verbatim for caller inspection; never retried automatically.
    #[error("api returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// A successful response was missing something the caller needed.
    #[error("{0}")]
    Response(String),
}

/// Executes one authorized call with the refresh-once policy.
pub struct ApiExecutor {
    authority: TokenAuthority,
}

impl ApiExecutor {
    /// Executor backed by the given token authority.
    #[must_use]
    pub fn new(authority: TokenAuthority) -> Self {
        Self { authority }
    }

    /// Perform one authorized call.
    ///
    /// `build` constructs the request for a given credential (it runs again
    /// with the refreshed credential after a 401); `interpret` turns a
    /// success-range response into the caller's result.
    pub async fn execute<T, B, I>(&self, build: B, interpret: I) -> Result<T, ApiError>
    where
        B: Fn(&Credentials) -> RequestBuilder,
        I: FnOnce(&Response) -> Result<T, ApiError>,
    {
        let creds = self
            .authority
            .get_valid()
            .await
            .map_err(|e| ApiError::Auth(e.to_string()))?;

        let mut response = build(&creds).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::info!("Call rejected as unauthorized, refreshing once and retrying");
            let refreshed = self
                .authority
                .refresh(&creds)
                .await
                .map_err(|e| ApiError::Auth(e.to_string()))?;
            response = build(&refreshed).send().await?;
        }

        if response.status().is_success() {
            interpret(&response)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::Status { status, body })
        }
    }
}
