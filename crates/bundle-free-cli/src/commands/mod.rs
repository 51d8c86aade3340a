pub mod importmap;
pub mod resolve;
pub mod serve;

use bundle_free_core::config::ModuleSpec;
use bundle_free_core::BundleFreeConfig;
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};

/// Load `bundle-free.json` (or `--config`) and apply the `--module`/`--base`
/// overrides shared by several commands.
pub fn load_config(
    cwd: &Path,
    config: Option<&Path>,
    modules: &[String],
    base: Option<&str>,
) -> Result<BundleFreeConfig> {
    let mut loaded = BundleFreeConfig::discover(cwd, config).into_diagnostic()?;
    if !modules.is_empty() {
        loaded.modules = modules.iter().map(|m| ModuleSpec::from(m.as_str())).collect();
    }
    if let Some(base) = base {
        loaded.base = base.to_string();
    }
    Ok(loaded)
}

/// Directory the config file's relative paths are anchored to.
pub fn config_dir(cwd: &Path, config: Option<&Path>) -> PathBuf {
    config
        .map(|p| if p.is_absolute() { p.to_path_buf() } else { cwd.join(p) })
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| cwd.to_path_buf())
}
