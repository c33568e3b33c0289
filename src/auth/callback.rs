//! Loopback HTTP listener for the OAuth redirect.
//!
//! Single-use and self-terminating: the listener is shut down before the
//! authorization flow returns or fails, on every exit path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Fixed, well-known callback port.
pub const CALLBACK_PORT: u16 = 8765;

/// Redirect target registered with the developer app.
pub const REDIRECT_URI: &str = "http://localhost:8765/callback";

/// What the provider sent back to the redirect endpoint.
#[derive(Debug, Clone)]
enum CallbackResult {
    Code(String),
    Error(String),
}

/// One-shot loopback server awaiting the authorization redirect.
pub struct CallbackServer {
    result_rx: mpsc::Receiver<CallbackResult>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Bind the given loopback port. Fatal if the port is taken.
    pub async fn start_on(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("failed to bind callback listener on port {port}"))?;

        let (result_tx, result_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let result_tx = Arc::new(Mutex::new(Some(result_tx)));
        let app = Router::new()
            .route(
                "/callback",
                get(move |query: Query<HashMap<String, String>>| {
                    handle_callback(query, result_tx.clone())
                }),
            )
            .fallback(not_found);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                tracing::error!(error = %e, "Callback listener failed");
            }
        });

        Ok(Self {
            result_rx,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Block until the redirect arrives, then tear the listener down and
    /// return the authorization code. An OAuth error parameter is an error
    /// here; the wait itself is unbounded.
    pub async fn recv_code(mut self) -> Result<String> {
        let received = self.result_rx.recv().await;
        self.shutdown().await;
        match received {
            Some(CallbackResult::Code(code)) => Ok(code),
            Some(CallbackResult::Error(e)) => Err(anyhow!("authorization denied: {e}")),
            None => Err(anyhow!("callback listener closed without a redirect")),
        }
    }

    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.await.is_err() {
                tracing::warn!("Callback listener task ended abnormally");
            }
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}

async fn handle_callback(
    Query(params): Query<HashMap<String, String>>,
    result_tx: Arc<Mutex<Option<mpsc::Sender<CallbackResult>>>>,
) -> Html<&'static str> {
    let result = if let Some(code) = params.get("code") {
        CallbackResult::Code(code.clone())
    } else if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .map(String::as_str)
            .unwrap_or("no description");
        CallbackResult::Error(format!("{error}: {description}"))
    } else {
        return Html(
            r"<!DOCTYPE html>
<html>
<head><title>Authorization Failed</title></head>
<body><h1>Authorization Failed</h1><p>Missing callback parameters.</p></body>
</html>",
        );
    };

    // Only the first redirect counts; the sender is consumed with it.
    let tx = result_tx.lock().expect("callback sender poisoned").take();
    let page = match (&result, tx) {
        (CallbackResult::Code(_), Some(tx)) => {
            let _ = tx.send(result).await;
            r"<!DOCTYPE html>
<html>
<head><title>Authorization Complete</title></head>
<body><h1>Authorization Successful</h1><p>You can close this window.</p></body>
</html>"
        }
        (CallbackResult::Error(_), Some(tx)) => {
            let _ = tx.send(result).await;
            r"<!DOCTYPE html>
<html>
<head><title>Authorization Failed</title></head>
<body><h1>Authorization Failed</h1><p>You can close this window.</p></body>
</html>"
        }
        (_, None) => {
            r"<!DOCTYPE html>
<html>
<head><title>Already Handled</title></head>
<body><h1>Authorization already completed</h1></body>
</html>"
        }
    };
    Html(page)
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}
