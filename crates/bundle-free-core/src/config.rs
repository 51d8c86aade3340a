use crate::error::{Error, Result};
use crate::transcode::{CommandBundler, DEFAULT_VENDOR};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Runtime configuration for the bundle-free CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }
}

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = "bundle-free.json";

/// Default live-reload server port.
pub const DEFAULT_LIVERELOAD_PORT: u16 = 35729;

/// Project configuration (`bundle-free.json`).
///
/// ```json
/// {
///   "base": "/app/",
///   "path": "./client",
///   "modules": ["@codeonlyjs/core", { "module": "lit", "url": "https://cdn/lit.js" }],
///   "livereload": true,
///   "spa": true,
///   "replace": [{ "from": "./Main.js", "to": "/app/Main.js" }]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BundleFreeConfig {
    /// Mount path of the application.
    pub base: String,
    /// Application directory (relative to the config file's directory).
    pub path: PathBuf,
    /// Packages exposed through the import map.
    pub modules: Vec<ModuleSpec>,
    /// Inject the error overlay script.
    pub overlay: bool,
    /// Inject the live-reload client.
    pub livereload: LiveReload,
    /// Serve the default document for unmatched requests.
    pub spa: bool,
    /// Default document.
    pub default: String,
    /// Text replacements applied to served HTML.
    pub replace: Vec<Replacement>,
    /// Name every scanned export in whole-package prebundles.
    pub prebundle_shim: bool,
    /// External bundler.
    pub bundler: BundlerConfig,
    /// Directory under `node_modules` owning the transcode cache.
    pub vendor: String,
}

impl Default for BundleFreeConfig {
    fn default() -> Self {
        Self {
            base: "/".to_string(),
            path: PathBuf::from("."),
            modules: Vec::new(),
            overlay: false,
            livereload: LiveReload::default(),
            spa: false,
            default: "index.html".to_string(),
            replace: Vec::new(),
            prebundle_shim: false,
            bundler: BundlerConfig::default(),
            vendor: DEFAULT_VENDOR.to_string(),
        }
    }
}

/// A requested package, optionally mapped to an explicit URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleSpec {
    Name(String),
    Entry {
        module: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
}

impl ModuleSpec {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Entry { module: name, .. } => name,
        }
    }

    /// Explicit URL overriding the served module.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Name(_) => None,
            Self::Entry { url, .. } => url.as_deref(),
        }
    }
}

impl From<&str> for ModuleSpec {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// Live-reload setting: `false`, `true`, or a port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiveReload {
    Enabled(bool),
    Port(u16),
}

impl Default for LiveReload {
    fn default() -> Self {
        Self::Enabled(false)
    }
}

impl LiveReload {
    /// Port of the live-reload server, or `None` when disabled.
    #[must_use]
    pub fn port(self) -> Option<u16> {
        match self {
            Self::Enabled(false) => None,
            Self::Enabled(true) => Some(DEFAULT_LIVERELOAD_PORT),
            Self::Port(port) => Some(port),
        }
    }
}

/// One text replacement for served HTML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub from: String,
    pub to: String,
    /// Treat `from` as a regular expression (`to` may use `$1`).
    #[serde(default)]
    pub regex: bool,
}

/// External bundler command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundlerConfig {
    /// Command line; `{entry}` and `{output}` are substituted.
    pub command: Vec<String>,
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            command: CommandBundler::DEFAULT_COMMAND
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl BundleFreeConfig {
    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if given, else `bundle-free.json` in `dir` if present,
    /// else the defaults.
    pub fn discover(dir: &Path, path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.is_absolute() => Self::load(p),
            Some(p) => Self::load(&dir.join(p)),
            None => {
                let candidate = dir.join(CONFIG_FILE);
                if candidate.is_file() {
                    Self::load(&candidate)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// The mount path, beginning and ending with `/`.
    #[must_use]
    pub fn mount_path(&self) -> String {
        normalize_base(&self.base)
    }

    /// Log a warning when running with `NODE_ENV=production`.
    ///
    /// Returns true when the warning was issued.
    pub fn warn_if_production(&self) -> bool {
        let production = std::env::var("NODE_ENV").is_ok_and(|v| v == "production");
        if production && !self.modules.is_empty() {
            tracing::warn!(
                "bundle-free module mapping is not intended to be used in production environments"
            );
            return true;
        }
        false
    }
}

/// Normalize a mount path so it begins and ends with `/`.
#[must_use]
pub fn normalize_base(base: &str) -> String {
    let trimmed = base.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}
