//! `bundle-free serve` command implementation.
//!
//! Serves the application directory with its HTML patched to carry the
//! import map, and answers `node_modules/bundle-free/...` module requests
//! from `node_modules` or the transcode cache.

use super::{config_dir, load_config};
use bundle_free_cli::{serve, ServerState};
use bundle_free_core::config::LiveReload;
use bundle_free_core::ResolutionContext;
use miette::{IntoDiagnostic, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Serve action.
#[derive(Debug, Clone)]
pub struct ServeAction {
    /// Working directory.
    pub cwd: PathBuf,
    /// Port to listen on.
    pub port: u16,
    /// Host to bind to.
    pub host: String,
    /// Mount path override.
    pub base: Option<String>,
    /// Application directory override.
    pub path: Option<PathBuf>,
    /// Module list override.
    pub modules: Vec<String>,
    pub spa: bool,
    pub overlay: bool,
    /// Live-reload port.
    pub livereload: Option<u16>,
    /// Open browser automatically.
    pub open: bool,
    /// Explicit config file path (overrides auto-discovery).
    pub config: Option<PathBuf>,
}

pub async fn run(action: ServeAction) -> Result<()> {
    let mut config = load_config(
        &action.cwd,
        action.config.as_deref(),
        &action.modules,
        action.base.as_deref(),
    )?;
    let project_dir = config_dir(&action.cwd, action.config.as_deref());

    if let Some(path) = action.path {
        config.path = path;
    }
    config.spa |= action.spa;
    config.overlay |= action.overlay;
    if let Some(port) = action.livereload {
        config.livereload = LiveReload::Port(port);
    }

    let context = ResolutionContext::from_config(&project_dir, &config)
        .await
        .into_diagnostic()?;
    let mount = context.mount().to_string();

    let app_dir = if config.path.is_absolute() {
        config.path.clone()
    } else {
        project_dir.join(&config.path)
    };
    let app_dir = dunce::canonicalize(&app_dir).unwrap_or(app_dir);

    let state = Arc::new(ServerState {
        context,
        app_dir: app_dir.clone(),
        default_document: config.default.clone(),
        spa: config.spa,
    });

    let host_ip = if action.host == "localhost" {
        "127.0.0.1".to_string()
    } else {
        action.host.clone()
    };
    let addr: SocketAddr = format!("{}:{}", host_ip, action.port)
        .parse()
        .into_diagnostic()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;

    info!(app_dir = %app_dir.display(), mount = %mount, "serving");

    let url = format!("http://{}:{}{}", action.host, action.port, mount);
    println!();
    println!("  bundle-free serving at {url}");
    println!("  Modules: {}", module_list(&config.modules));
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    if action.open {
        let _ = open_browser(&url);
    }

    serve(listener, state).await.into_diagnostic()?;
    Ok(())
}

fn module_list(modules: &[bundle_free_core::config::ModuleSpec]) -> String {
    if modules.is_empty() {
        return "(none)".to_string();
    }
    modules
        .iter()
        .map(bundle_free_core::config::ModuleSpec::name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Open a URL in the default browser.
fn open_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", url])
            .spawn()?;
    }
    Ok(())
}
