use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Name of the directory holding installed packages.
pub const NODE_MODULES: &str = "node_modules";

/// Name of the per-package metadata file.
pub const PACKAGE_JSON: &str = "package.json";

/// Find the `node_modules` directory by walking up from `start`.
///
/// Returns the first `node_modules` directory found in `start` or one of its
/// ancestors.
pub fn find_node_modules_root(start: &Path) -> Result<PathBuf> {
    let start = dunce::canonicalize(start).unwrap_or_else(|_| start.to_path_buf());
    let mut current = start.clone();

    loop {
        let candidate = current.join(NODE_MODULES);
        if candidate.is_dir() {
            return Ok(candidate);
        }

        if !current.pop() {
            return Err(Error::ResolutionRootNotFound { start });
        }
    }
}

/// Directory of package `name` inside `root` (handles `@scope/pkg`).
#[must_use]
pub fn package_dir(root: &Path, name: &str) -> PathBuf {
    name.split('/').fold(root.to_path_buf(), |dir, part| dir.join(part))
}

/// Check that `name` is a plausible package name that stays inside the tree.
#[must_use]
pub fn is_valid_package_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('/').collect();
    let shape_ok = match parts.as_slice() {
        [pkg] => !pkg.starts_with('@'),
        [scope, _] => scope.starts_with('@') && scope.len() > 1,
        _ => false,
    };
    shape_ok
        && parts
            .iter()
            .all(|p| !p.is_empty() && *p != "." && *p != ".." && !p.contains('\\'))
}
