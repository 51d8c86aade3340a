//! HTTP serving for `bundle-free serve`.
//!
//! Everything under the mount path goes through one handler:
//!
//! ```text
//! <mount>node_modules/bundle-free/@overlay.js   → overlay client
//! <mount>node_modules/bundle-free/<pkg>[/...]   → redirect / cached module (ResolutionContext::route)
//! <mount>*.html, <mount>                        → patched HTML from the app directory
//! <mount>node_modules/...                       → static files from node_modules
//! <mount>...                                    → static files from the app directory
//! anything else (spa)                           → patched default document
//! ```

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, request::Parts, Method, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Router,
};
use bundle_free_core::html::OVERLAY_SCRIPT;
use bundle_free_core::importmap::MODULES_NAMESPACE;
use bundle_free_core::paths::NODE_MODULES;
use bundle_free_core::{ResolutionContext, RouteDecision};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::debug;

/// Overlay client script.
pub const OVERLAY_JS: &str = include_str!("../assets/overlay.js");

/// Shared server state.
#[derive(Debug)]
pub struct ServerState {
    /// Resolution state for the configured modules.
    pub context: ResolutionContext,
    /// Application directory.
    pub app_dir: PathBuf,
    /// Default document, relative to the application directory.
    pub default_document: String,
    /// Serve the default document for unmatched GET requests.
    pub spa: bool,
}

/// Build the axum router.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .fallback(handle)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until the listener fails.
pub async fn serve(listener: tokio::net::TcpListener, state: Arc<ServerState>) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}

async fn handle(State(state): State<Arc<ServerState>>, req: Request) -> Response {
    let (req, _body) = req.into_parts();
    let mount = state.context.mount().to_string();
    let path = req.uri.path().to_string();

    if mount != "/" && path == mount.trim_end_matches('/') {
        return Redirect::to(&mount).into_response();
    }
    let Some(rel) = path.strip_prefix(&mount) else {
        return not_found();
    };
    let rel = format!("/{rel}");

    if rel == format!("/{MODULES_NAMESPACE}/{OVERLAY_SCRIPT}") {
        return ([(header::CONTENT_TYPE, "application/javascript")], OVERLAY_JS).into_response();
    }

    match state.context.route(&mount, &rel).await {
        RouteDecision::Redirect(url) => {
            debug!(from = %path, to = %url, "module redirect");
            return Redirect::to(&url).into_response();
        }
        RouteDecision::Rewrite(url) => {
            debug!(from = %path, to = %url, "module rewrite");
            let cached = url
                .strip_prefix(&mount)
                .and_then(|u| u.strip_prefix(NODE_MODULES));
            if let Some(rest) = cached {
                if let Some(response) = serve_dir(state.context.root(), rest, &req).await {
                    return response;
                }
            }
            return not_found();
        }
        RouteDecision::PassThrough => {}
    }

    let document = if rel == "/" {
        format!("/{}", state.default_document)
    } else {
        rel.clone()
    };
    if is_html(&document) {
        if let Some(response) = serve_html(&state, &mount, &document).await {
            return response;
        }
    }

    if let Some(rest) = rel.strip_prefix(&format!("/{NODE_MODULES}")) {
        if rest.starts_with('/') {
            if let Some(response) = serve_dir(state.context.root(), rest, &req).await {
                return response;
            }
        }
    }

    if let Some(response) = serve_dir(&state.app_dir, &rel, &req).await {
        return response;
    }

    if state.spa && req.method == Method::GET {
        let fallback = format!("/{}", state.default_document);
        if let Some(response) = serve_html(&state, &mount, &fallback).await {
            return response;
        }
    }

    not_found()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

fn is_html(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".html") || lower.ends_with(".htm")
}

/// Read and patch an HTML document; `None` when it cannot be read.
async fn serve_html(state: &ServerState, mount: &str, document: &str) -> Option<Response> {
    let relative = document.trim_start_matches('/');
    if relative.split('/').any(|segment| segment == "..") {
        return None;
    }
    let path = state.app_dir.join(relative);
    let text = bundle_free_util::fs::read_to_string_lossy(&path).await.ok()?;

    let body = if state.context.patcher().is_active() {
        state.context.patch_html(mount, &text)
    } else {
        text
    };
    Some(Html(body).into_response())
}

/// Serve `path` from `dir`; `None` when `ServeDir` rejects the request
/// (missing file, unsupported method).
async fn serve_dir(dir: &Path, path: &str, original: &Parts) -> Option<Response> {
    let mut builder = axum::http::Request::builder()
        .method(original.method.clone())
        .uri(path);
    for (name, value) in &original.headers {
        builder = builder.header(name, value);
    }
    let req = builder.body(Body::empty()).ok()?;

    let mut service = ServeDir::new(dir).append_index_html_on_directories(false);
    let response = service.try_call(req).await.ok()?;
    if response.status().is_client_error() {
        return None;
    }
    Some(response.map(Body::new).into_response())
}
