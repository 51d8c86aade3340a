//! HTTP tests for the serving collaborator.
//!
//! Each test builds a small project on disk, serves it on an ephemeral
//! local port and talks to it with reqwest.

use bundle_free_cli::{serve, ServerState, OVERLAY_JS};
use bundle_free_core::config::ModuleSpec;
use bundle_free_core::{BundleFreeConfig, ResolutionContext};
use reqwest::{redirect, StatusCode};
use serde_json::json;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(
        root,
        "node_modules/kit/package.json",
        &json!({
            "name": "kit", "version": "1.0.0",
            "exports": {
                ".": { "import": "./esm/index.js" },
                "./legacy": { "require": "./cjs/legacy.js" }
            }
        })
        .to_string(),
    );
    write(root, "node_modules/kit/esm/index.js", "export const kit = 1;\n");
    write(root, "node_modules/kit/cjs/legacy.js", "exports.legacy = 1;\n");
    write(
        root,
        "app/index.html",
        "<!doctype html>\n<html><head><title>t</title></head>\n<body><script type=\"module\" src=\"./main.js\"></script></body></html>\n",
    );
    write(root, "app/main.js", "import { kit } from \"kit\";\n");
    dir
}

fn config(spa: bool) -> BundleFreeConfig {
    BundleFreeConfig {
        base: "/app/".to_string(),
        modules: vec![ModuleSpec::from("kit")],
        overlay: true,
        spa,
        ..BundleFreeConfig::default()
    }
}

async fn start(dir: &TempDir, mut config: BundleFreeConfig) -> SocketAddr {
    config.bundler.command = ["cp", "{entry}", "{output}"]
        .iter()
        .map(ToString::to_string)
        .collect();
    let context = ResolutionContext::from_config(dir.path(), &config)
        .await
        .unwrap();
    let state = Arc::new(ServerState {
        context,
        app_dir: dir.path().join("app"),
        default_document: config.default.clone(),
        spa: config.spa,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, state));
    addr
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(redirect::Policy::none())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_index_is_patched_with_import_map() {
    let dir = project();
    let addr = start(&dir, config(false)).await;

    let res = client()
        .get(format!("http://{addr}/app/"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.text().await.unwrap();
    assert!(body.contains("<script type=\"importmap\">"));
    assert!(body.contains("\"kit\": \"/app/node_modules/bundle-free/kit\""));
    assert!(body.contains("/app/node_modules/bundle-free/@overlay.js"));
    assert!(body.contains("<title>t</title>"));
}

#[tokio::test]
async fn test_mount_without_slash_redirects() {
    let dir = project();
    let addr = start(&dir, config(false)).await;

    let res = client()
        .get(format!("http://{addr}/app"))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_redirection());
    assert_eq!(res.headers()["location"], "/app/");
}

#[tokio::test]
async fn test_module_request_redirects_to_es_entry() {
    let dir = project();
    let addr = start(&dir, config(false)).await;
    let client = client();

    let res = client
        .get(format!("http://{addr}/app/node_modules/bundle-free/kit"))
        .send()
        .await
        .unwrap();
    assert!(res.status().is_redirection());
    let location = res.headers()["location"].to_str().unwrap().to_string();
    assert_eq!(location, "/app/node_modules/kit/esm/index.js");

    let res = client
        .get(format!("http://{addr}{location}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "export const kit = 1;\n");
}

#[cfg(unix)]
#[tokio::test]
async fn test_legacy_subpath_served_from_cache() {
    let dir = project();
    let addr = start(&dir, config(false)).await;

    let res = client()
        .get(format!("http://{addr}/app/node_modules/bundle-free/kit/legacy"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.text().await.unwrap();
    assert!(body.contains("legacy"));

    let cache = dir.path().join("node_modules/@bundle-free/bundle-free/cache");
    let cached: Vec<_> = fs::read_dir(cache)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| !e.file_name().to_string_lossy().starts_with("exports-"))
        .collect();
    assert_eq!(cached.len(), 1);
}

#[tokio::test]
async fn test_overlay_script() {
    let dir = project();
    let addr = start(&dir, config(false)).await;

    let res = client()
        .get(format!("http://{addr}/app/node_modules/bundle-free/@overlay.js"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/javascript");
    assert_eq!(res.text().await.unwrap(), OVERLAY_JS);
}

#[tokio::test]
async fn test_static_files_and_not_found() {
    let dir = project();
    let addr = start(&dir, config(false)).await;
    let client = client();

    let res = client
        .get(format!("http://{addr}/app/main.js"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.text().await.unwrap().contains("from \"kit\""));

    for path in ["/app/missing.js", "/other/", "/app/node_modules/bundle-free/nope"] {
        let res = client
            .get(format!("http://{addr}{path}"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{path}");
    }
}

#[tokio::test]
async fn test_spa_fallback() {
    let dir = project();
    let addr = start(&dir, config(true)).await;

    let res = client()
        .get(format!("http://{addr}/app/some/client/route"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.text().await.unwrap();
    assert!(body.contains("<script type=\"importmap\">"));
}

#[tokio::test]
async fn test_non_get_request_is_not_found() {
    let dir = project();
    let addr = start(&dir, config(true)).await;
    let client = client();

    for path in ["/app/main.js", "/app/some/client/route"] {
        let res = client
            .post(format!("http://{addr}{path}"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{path}");
    }
}
