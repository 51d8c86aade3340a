//! Memoizing loader for package descriptors.

use super::Descriptor;
use crate::error::{Error, Result};
use crate::paths::{is_valid_package_name, package_dir, PACKAGE_JSON};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::debug;

/// Transitive dependencies of a package, in discovery order.
pub type Closure = Arc<[Arc<Descriptor>]>;

type Slot<T> = Arc<OnceCell<T>>;

/// Loads `package.json` files from a `node_modules` tree.
///
/// Every package is read at most once; concurrent first requests for the
/// same name wait on a shared initialization guard. Failed loads are not
/// cached.
#[derive(Debug)]
pub struct DescriptorStore {
    /// The `node_modules` directory.
    root: PathBuf,
    descriptors: Mutex<HashMap<String, Slot<Arc<Descriptor>>>>,
    closures: Mutex<HashMap<String, Slot<Closure>>>,
}

impl DescriptorStore {
    /// Create a store reading from the given `node_modules` directory.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            descriptors: Mutex::new(HashMap::new()),
            closures: Mutex::new(HashMap::new()),
        }
    }

    /// The `node_modules` directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of an installed package.
    #[must_use]
    pub fn package_dir(&self, name: &str) -> PathBuf {
        package_dir(&self.root, name)
    }

    /// Get the descriptor of a package, loading it on first use.
    pub async fn get(&self, name: &str) -> Result<Arc<Descriptor>> {
        let slot = slot_for(&self.descriptors, name);
        slot.get_or_try_init(|| self.load(name)).await.cloned()
    }

    /// Get the transitive dependency closure of a package.
    ///
    /// Dependencies are listed depth-first in declaration order, each package
    /// once, never including `name` itself (dependency cycles are tolerated).
    pub async fn closure(&self, name: &str) -> Result<Closure> {
        let slot = slot_for(&self.closures, name);
        slot.get_or_try_init(|| self.compute_closure(name))
            .await
            .cloned()
    }

    async fn load(&self, name: &str) -> Result<Arc<Descriptor>> {
        if !is_valid_package_name(name) {
            return Err(Error::InvalidDescriptor {
                name: name.to_string(),
                message: "not a valid package name".to_string(),
            });
        }

        let path = self.package_dir(name).join(PACKAGE_JSON);
        debug!(package = name, path = %path.display(), "loading package.json");

        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| Error::DescriptorLoad {
                name: name.to_string(),
                path: path.clone(),
                source,
            })?;

        let descriptor =
            Descriptor::from_json_str(name, &text).map_err(|source| Error::DescriptorParse {
                name: name.to_string(),
                path,
                source,
            })?;

        Ok(Arc::new(descriptor))
    }

    async fn compute_closure(&self, name: &str) -> Result<Closure> {
        let root = self.get(name).await?;

        let mut seen: HashSet<String> = HashSet::from([name.to_string()]);
        let mut out = Vec::new();
        let mut stack: Vec<String> = root.dependencies.iter().rev().cloned().collect();

        while let Some(dep) = stack.pop() {
            if !seen.insert(dep.clone()) {
                continue;
            }
            let descriptor = self.get(&dep).await?;
            stack.extend(
                descriptor
                    .dependencies
                    .iter()
                    .rev()
                    .filter(|d| !seen.contains(*d))
                    .cloned(),
            );
            out.push(descriptor);
        }

        debug!(package = name, count = out.len(), "computed dependency closure");
        Ok(out.into())
    }
}

fn slot_for<T>(map: &Mutex<HashMap<String, Slot<T>>>, name: &str) -> Slot<T> {
    let mut map = map.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    map.entry(name.to_string()).or_default().clone()
}
