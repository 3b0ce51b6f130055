// Local CORS proxy in front of the spreadsheet-to-JSON bridge. Browsers on
// the office network hit this instead of the upstream directly; every
// response (success or failure) carries the CORS headers so the caller can
// read the error body too.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::ProxyConfig;

struct ProxyState {
    client: reqwest::Client,
    upstream_url: String,
    allowed_origins: Vec<String>,
}

/// Pick the `Access-Control-Allow-Origin` value for a request. An empty
/// allowlist (or a `*` entry) opens the proxy to any origin; otherwise the
/// request's origin is reflected when listed, and unlisted callers get the
/// first allowed origin so the browser refuses them the read.
fn resolve_origin(allowed: &[String], request_origin: Option<&str>) -> String {
    if allowed.is_empty() || allowed.iter().any(|o| o == "*") {
        return "*".to_string();
    }
    match request_origin {
        Some(origin) if allowed.iter().any(|o| o == origin) => origin.to_string(),
        _ => allowed[0].clone(),
    }
}

fn cors_headers(state: &ProxyState, request_headers: &HeaderMap) -> [(header::HeaderName, String); 4] {
    let request_origin = request_headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    let origin = resolve_origin(&state.allowed_origins, request_origin);
    [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, origin),
        (
            header::ACCESS_CONTROL_ALLOW_METHODS,
            "GET, OPTIONS".to_string(),
        ),
        (
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            "authorization, x-client-info, apikey, content-type".to_string(),
        ),
        (header::VARY, "Origin".to_string()),
    ]
}

async fn fetch_data(
    State(state): State<Arc<ProxyState>>,
    request_headers: HeaderMap,
) -> impl IntoResponse {
    let cors = cors_headers(&state, &request_headers);

    let upstream = async {
        let response = state
            .client
            .get(&state.upstream_url)
            .send()
            .await
            .context("upstream request failed")?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("upstream responded {status}");
        }
        response
            .json::<serde_json::Value>()
            .await
            .context("upstream returned invalid JSON")
    }
    .await;

    match upstream {
        Ok(body) => (StatusCode::OK, cors, Json(body)),
        Err(e) => {
            warn!("proxy fetch failed: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                cors,
                Json(json!({ "error": format!("{e:#}") })),
            )
        }
    }
}

async fn preflight(
    State(state): State<Arc<ProxyState>>,
    request_headers: HeaderMap,
) -> impl IntoResponse {
    (StatusCode::NO_CONTENT, cors_headers(&state, &request_headers))
}

pub fn router(config: &ProxyConfig) -> Router {
    let state = Arc::new(ProxyState {
        client: reqwest::Client::new(),
        upstream_url: config.upstream_url.clone(),
        allowed_origins: config.allowed_origins.clone(),
    });
    Router::new()
        .route("/", get(fetch_data).options(preflight))
        .with_state(state)
}

/// Serve the proxy until the shutdown flag flips.
pub async fn run(config: ProxyConfig, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = router(&config);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind proxy on {addr}"))?;
    info!(%addr, upstream = %config.upstream_url, "proxy listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .context("proxy server failed")?;

    info!("proxy stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origins(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_allowlist_opens_to_any_origin() {
        assert_eq!(resolve_origin(&[], Some("http://a.test")), "*");
        assert_eq!(resolve_origin(&[], None), "*");
    }

    #[test]
    fn wildcard_entry_opens_to_any_origin() {
        let allowed = origins(&["http://a.test", "*"]);
        assert_eq!(resolve_origin(&allowed, Some("http://b.test")), "*");
    }

    #[test]
    fn listed_origin_is_reflected() {
        let allowed = origins(&["http://a.test", "http://b.test"]);
        assert_eq!(
            resolve_origin(&allowed, Some("http://b.test")),
            "http://b.test"
        );
    }

    #[test]
    fn unlisted_origin_gets_first_allowed() {
        let allowed = origins(&["http://a.test", "http://b.test"]);
        assert_eq!(
            resolve_origin(&allowed, Some("http://evil.test")),
            "http://a.test"
        );
        assert_eq!(resolve_origin(&allowed, None), "http://a.test");
    }
}
