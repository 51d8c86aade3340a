//! `bundle-free importmap` command implementation.

use super::{config_dir, load_config};
use bundle_free_core::paths::find_node_modules_root;
use bundle_free_core::{importmap, DescriptorStore};
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};

/// Print the import map for the configured modules, resolved against the
/// mount path.
pub async fn run(
    cwd: &Path,
    modules: &[String],
    base: Option<&str>,
    config: Option<PathBuf>,
) -> Result<()> {
    let loaded = load_config(cwd, config.as_deref(), modules, base)?;
    let project_dir = config_dir(cwd, config.as_deref());

    let root = find_node_modules_root(&project_dir).into_diagnostic()?;
    let store = DescriptorStore::new(root);
    let build = importmap::build(&loaded.modules, &store)
        .await
        .into_diagnostic()?;

    println!(
        "{}",
        build.import_map.resolve(&loaded.mount_path()).to_json_pretty()
    );
    Ok(())
}
