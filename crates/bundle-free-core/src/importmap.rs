//! Browser import maps for the requested packages.
//!
//! The map is built once per configuration with a `{{base}}` placeholder
//! and resolved against the mount path of each request.

use crate::config::{normalize_base, ModuleSpec};
use crate::descriptor::{Descriptor, DescriptorStore};
use crate::error::Result;
use crate::resolver::{classify, BundleKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Placeholder for the mount path in URL templates.
pub const BASE_PLACEHOLDER: &str = "{{base}}";

/// URL namespace (relative to the mount path) of resolved modules.
pub const MODULES_NAMESPACE: &str = "node_modules/bundle-free";

/// A browser import map (`{ "imports": { ... } }`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportMap {
    #[serde(default)]
    pub imports: Map<String, Value>,
    /// Kept as-is when merging into an existing map.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub scopes: Map<String, Value>,
}

impl ImportMap {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
    }

    /// Map `specifier` to `url`, replacing any previous mapping.
    pub fn insert(&mut self, specifier: impl Into<String>, url: impl Into<String>) {
        self.imports
            .insert(specifier.into(), Value::String(url.into()));
    }

    /// URL mapped to `specifier`.
    #[must_use]
    pub fn get(&self, specifier: &str) -> Option<&str> {
        self.imports.get(specifier).and_then(Value::as_str)
    }

    /// Copy entries of `other` into this map; `other` wins on conflicts.
    pub fn merge(&mut self, other: &ImportMap) {
        for (key, value) in &other.imports {
            self.imports.insert(key.clone(), value.clone());
        }
    }

    /// Substitute a concrete mount path for the placeholder.
    #[must_use]
    pub fn resolve(&self, mount: &str) -> ImportMap {
        let base = normalize_base(mount);
        let imports = self
            .imports
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    Value::String(url) => Value::String(url.replace(BASE_PLACEHOLDER, &base)),
                    other => other.clone(),
                };
                (key.clone(), value)
            })
            .collect();
        ImportMap {
            imports,
            scopes: self.scopes.clone(),
        }
    }

    /// Pretty JSON text of the map.
    #[must_use]
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A package reachable through the resolved-modules namespace.
#[derive(Debug, Clone)]
pub struct ExportedPackage {
    pub descriptor: Arc<Descriptor>,
    /// Set for requested packages exposing only their root
    /// ([`BundleKind::NativeBare`] or [`BundleKind::NeedsPrebundle`]).
    pub prebundle: Option<BundleKind>,
}

/// Result of [`build`].
#[derive(Debug, Clone, Default)]
pub struct ImportMapBuild {
    /// Import map with `{{base}}` placeholders.
    pub import_map: ImportMap,
    /// Packages served under the resolved-modules namespace, by name.
    pub exported: HashMap<String, ExportedPackage>,
    /// Requested package names without an explicit URL.
    pub module_names: Vec<String>,
}

/// URL template of a package in the resolved-modules namespace.
#[must_use]
pub fn module_url_template(name: &str) -> String {
    format!("{BASE_PLACEHOLDER}{MODULES_NAMESPACE}/{name}")
}

/// Build the import map for the requested packages.
///
/// Each requested package is recorded with its transitive closure, except
/// [`BundleKind::NeedsPrebundle`] packages: their legacy dependencies are
/// bundled into them and stay out of the map. When
/// two requests share a dependency, the first one wins. A package that
/// cannot be loaded aborts the build.
pub async fn build(modules: &[ModuleSpec], store: &DescriptorStore) -> Result<ImportMapBuild> {
    let mut order: Vec<String> = Vec::new();
    let mut exported: HashMap<String, ExportedPackage> = HashMap::new();
    let mut overrides: Vec<(&str, &str)> = Vec::new();
    let mut module_names = Vec::new();

    let mut record = |descriptor: Arc<Descriptor>, prebundle: Option<BundleKind>| {
        let name = descriptor.name.clone();
        if !exported.contains_key(&name) {
            order.push(name.clone());
            exported.insert(name, ExportedPackage { descriptor, prebundle });
        }
    };

    for spec in modules {
        if let Some(url) = spec.url() {
            overrides.push((spec.name(), url));
            continue;
        }

        let name = spec.name();
        let descriptor = store.get(name).await?;
        let closure = store.closure(name).await?;
        let kind = classify(&descriptor, &closure[..]);
        debug!(package = name, kind = %kind, deps = closure.len(), "import map entry");

        module_names.push(name.to_string());

        let marker = kind.is_prebundle_marked().then_some(kind);
        record(descriptor, marker);
        // Legacy dependencies of a prebundled package live inside its bundle
        if kind == BundleKind::NeedsPrebundle {
            continue;
        }
        for dep in closure.iter() {
            record(Arc::clone(dep), None);
        }
    }

    let mut import_map = ImportMap::default();
    for name in &order {
        import_map.insert(name.as_str(), module_url_template(name));
        import_map.insert(format!("{name}/"), format!("{}/", module_url_template(name)));
    }
    for (name, url) in overrides {
        import_map.insert(name, url);
    }

    Ok(ImportMapBuild {
        import_map,
        exported,
        module_names,
    })
}
