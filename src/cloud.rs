//! Cloud mirror for Sama Wi-Fi POS.
//!
//! The shop's data lives locally; the cloud copy is a single whole-state
//! document overwritten last-writer-wins, with no merge and no per-field
//! conflict resolution. Both directions are best-effort: a failed or slow
//! network call must never block or fail a local operation. The mirror is
//! injected into the store at construction — `NoopMirror` when cloud sync
//! is disabled.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::store::{AppState, Store};

/// Default timeout for mirror requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote path of the whole-state document.
const STATE_DOC_PATH: &str = "/api/pos/state";

pub type MirrorFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Whole-document remote mirror. `pull` returns the current remote state
/// document (or `None` when none exists yet); `push` overwrites it.
pub trait CloudMirror: Send + Sync {
    fn pull(&self) -> MirrorFuture<'_, Result<Option<Value>, String>>;
    fn push<'a>(&'a self, doc: &'a Value) -> MirrorFuture<'a, Result<(), String>>;
}

/// Mirror used when cloud sync is disabled: pulls nothing, pushes nowhere.
pub struct NoopMirror;

impl CloudMirror for NoopMirror {
    fn pull(&self) -> MirrorFuture<'_, Result<Option<Value>, String>> {
        Box::pin(async { Ok(None) })
    }

    fn push<'a>(&'a self, _doc: &'a Value) -> MirrorFuture<'a, Result<(), String>> {
        Box::pin(async { Ok(()) })
    }
}

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the mirror endpoint URL:
/// - strip trailing slashes
/// - ensure a scheme is present (https, or http for localhost)
pub fn normalize_endpoint_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if url.is_empty() {
        return url;
    }

    // Ensure scheme
    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    // Strip trailing slashes
    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach cloud mirror at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid cloud mirror URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Mirror API key is invalid or expired".to_string(),
        403 => "Device not authorized for cloud sync".to_string(),
        404 => "Cloud mirror endpoint not found".to_string(),
        s if s >= 500 => format!("Cloud mirror server error (HTTP {s})"),
        s => format!("Unexpected response from cloud mirror (HTTP {s})"),
    }
}

// ---------------------------------------------------------------------------
// HTTP mirror
// ---------------------------------------------------------------------------

/// Mirror backed by a plain HTTPS document endpoint.
pub struct HttpMirror {
    base_url: String,
    api_key: String,
    client: Client,
}

impl HttpMirror {
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self, String> {
        let base_url = normalize_endpoint_url(endpoint);
        if base_url.is_empty() {
            return Err("Cloud mirror endpoint is not configured".to_string());
        }

        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            base_url,
            api_key: api_key.trim().to_string(),
            client,
        })
    }

    fn doc_url(&self) -> String {
        format!("{}{STATE_DOC_PATH}", self.base_url)
    }

    async fn pull_inner(&self) -> Result<Option<Value>, String> {
        let url = self.doc_url();
        let resp = self
            .client
            .get(&url)
            .header("X-POS-API-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            // No remote document yet — a fresh cloud store, not an error.
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(status));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| format!("Invalid JSON from cloud mirror: {e}"))
    }

    async fn push_inner(&self, doc: &Value) -> Result<(), String> {
        let url = self.doc_url();
        let resp = self
            .client
            .put(&url)
            .header("X-POS-API-Key", &self.api_key)
            .json(doc)
            .send()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(status));
        }
        Ok(())
    }
}

impl CloudMirror for HttpMirror {
    fn pull(&self) -> MirrorFuture<'_, Result<Option<Value>, String>> {
        Box::pin(self.pull_inner())
    }

    fn push<'a>(&'a self, doc: &'a Value) -> MirrorFuture<'a, Result<(), String>> {
        Box::pin(self.push_inner(doc))
    }
}

// ---------------------------------------------------------------------------
// Background pull loop
// ---------------------------------------------------------------------------

/// Start the periodic cloud pull loop.
///
/// Each cycle pulls the remote state document and applies it over local
/// state (last writer wins). Failures are logged and the cycle skipped;
/// the shop keeps running offline.
pub fn start_mirror_loop(
    state: Arc<Mutex<AppState>>,
    store: Arc<Store>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("Cloud mirror loop started (interval: {interval_secs}s)");
        // First pull runs immediately so a freshly started device hydrates
        // from the cloud copy before the operator starts typing.
        loop {
            if !store.cloud_enabled() {
                tokio::time::sleep(Duration::from_secs(interval_secs)).await;
                continue;
            }

            let mirror = store.mirror();
            match mirror.pull().await {
                Ok(Some(doc)) => match state.lock() {
                    Ok(mut guard) => match store.apply_cloud_document(&mut guard, &doc) {
                        Ok(true) => info!("Cloud pull applied"),
                        Ok(false) => debug!("Cloud pull: no changes"),
                        Err(e) => warn!(error = %e, "failed to apply cloud document"),
                    },
                    Err(_) => warn!("state lock poisoned; skipping cloud apply"),
                },
                Ok(None) => debug!("Cloud pull: no remote document"),
                Err(e) => warn!(error = %e, "cloud pull failed"),
            }

            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
        }
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_endpoint_adds_scheme_and_strips_slashes() {
        assert_eq!(
            normalize_endpoint_url("mirror.samawifi.app/"),
            "https://mirror.samawifi.app"
        );
        assert_eq!(
            normalize_endpoint_url("localhost:8787///"),
            "http://localhost:8787"
        );
        assert_eq!(
            normalize_endpoint_url("  https://mirror.samawifi.app  "),
            "https://mirror.samawifi.app"
        );
        assert_eq!(normalize_endpoint_url(""), "");
    }

    #[test]
    fn status_errors_are_friendly() {
        assert!(status_error(StatusCode::UNAUTHORIZED).contains("API key"));
        assert!(status_error(StatusCode::INTERNAL_SERVER_ERROR).contains("HTTP 500"));
    }

    #[test]
    fn http_mirror_requires_an_endpoint() {
        assert!(HttpMirror::new("", "key").is_err());
        let mirror = HttpMirror::new("mirror.samawifi.app", "key").expect("mirror builds");
        assert_eq!(mirror.doc_url(), "https://mirror.samawifi.app/api/pos/state");
    }

    #[tokio::test]
    async fn noop_mirror_is_silent() {
        let mirror = NoopMirror;
        assert_eq!(mirror.pull().await.expect("pull"), None);
        mirror
            .push(&serde_json::json!({ "clients": [] }))
            .await
            .expect("push");
    }
}
