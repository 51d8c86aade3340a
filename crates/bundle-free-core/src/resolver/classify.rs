//! Decide how a package is served to the browser.

use super::exports::{resolve_export, IMPORT, ROOT};
use crate::descriptor::{Descriptor, ExportsMap};

/// How a package reaches the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleKind {
    /// ES package exposing only its root, with an all-ES closure: served as-is.
    NativeBare,
    /// ES package exposing only its root, but some dependency is legacy:
    /// the whole package is bundled into one module.
    NeedsPrebundle,
    /// ES package with real sub-paths: each sub-path is served as-is.
    Native,
    /// Legacy package: each requested sub-path is transcoded on demand.
    NeedsSubpathTranscode,
}

impl BundleKind {
    /// True for the kinds that expose only their root.
    #[must_use]
    pub fn is_prebundle_marked(self) -> bool {
        matches!(self, Self::NativeBare | Self::NeedsPrebundle)
    }
}

impl std::fmt::Display for BundleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NativeBare => "native-bare",
            Self::NeedsPrebundle => "needs-prebundle",
            Self::Native => "native",
            Self::NeedsSubpathTranscode => "needs-subpath-transcode",
        };
        f.write_str(s)
    }
}

/// True when the exports map exposes nothing but the root.
///
/// Packages without an `exports` field are never bare.
#[must_use]
pub fn is_bare(descriptor: &Descriptor) -> bool {
    descriptor.exports.as_ref().is_some_and(exposes_only_root)
}

fn exposes_only_root(node: &ExportsMap) -> bool {
    match node {
        ExportsMap::Target(_) | ExportsMap::Excluded => true,
        ExportsMap::Alternatives(items) => items.iter().all(exposes_only_root),
        ExportsMap::Map(entries) => entries.iter().all(|(key, child)| {
            (!key.starts_with('.') || key == ROOT) && exposes_only_root(child)
        }),
    }
}

/// True when the package root resolves under the "import" condition.
#[must_use]
pub fn is_module(descriptor: &Descriptor) -> bool {
    resolve_export(descriptor, None, &[IMPORT]).is_some()
}

/// Classify a package given its transitive closure.
#[must_use]
pub fn classify<D: AsRef<Descriptor>>(descriptor: &Descriptor, closure: &[D]) -> BundleKind {
    if !is_module(descriptor) {
        return BundleKind::NeedsSubpathTranscode;
    }
    if !is_bare(descriptor) {
        return BundleKind::Native;
    }
    if closure.iter().all(|dep| is_module(dep.as_ref())) {
        BundleKind::NativeBare
    } else {
        BundleKind::NeedsPrebundle
    }
}
