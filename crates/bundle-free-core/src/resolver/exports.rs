//! Package entry point resolution.
//!
//! Implements the package.json `exports` walk used to pick the file that
//! backs a bare specifier:
//! - Sub-path patterns (keys starting with `.`, optional `*` wildcard)
//! - Conditional exports in caller-supplied order (`import`, `require`, ...)
//! - `default` fallback
//! - Alternatives arrays and `null` exclusions
//!
//! Packages without an `exports` field fall back to the legacy `module` /
//! `main` fields.

use crate::descriptor::{Descriptor, ExportsMap};

/// ES import condition.
pub const IMPORT: &str = "import";
/// CommonJS require condition.
pub const REQUIRE: &str = "require";
/// Fallback key tried after every requested condition.
pub const DEFAULT: &str = "default";

/// The root sub-path.
pub const ROOT: &str = ".";

/// File name assumed for CommonJS packages with no usable `main`.
const DEFAULT_MAIN: &str = "index.js";

/// Which module system a lookup is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    /// ESM import (the "import" condition)
    Import,
    /// CJS require (the "require" condition)
    Require,
    /// Any loadable source: "import", then "require"
    Source,
}

impl ResolutionKind {
    /// Condition list for this kind, in preference order.
    #[must_use]
    pub fn conditions(self) -> &'static [&'static str] {
        match self {
            Self::Import => &[IMPORT],
            Self::Require => &[REQUIRE],
            Self::Source => &[IMPORT, REQUIRE],
        }
    }
}

impl std::fmt::Display for ResolutionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Import => write!(f, "import"),
            Self::Require => write!(f, "require"),
            Self::Source => write!(f, "source"),
        }
    }
}

/// Normalize a requested sub-path: absent, empty and `/` mean the root.
#[must_use]
pub fn normalize_subpath(subpath: Option<&str>) -> &str {
    match subpath {
        None | Some("" | "/") => ROOT,
        Some(sub) => sub,
    }
}

/// Resolve the file backing `subpath` of a package under `conditions`.
///
/// Returns the target path exactly as declared by the package (usually
/// starting with `./`), or `None` when nothing satisfies the conditions.
/// `None` is an ordinary outcome: the caller tries its next strategy.
#[must_use]
pub fn resolve_export(
    descriptor: &Descriptor,
    subpath: Option<&str>,
    conditions: &[&str],
) -> Option<String> {
    let subpath = normalize_subpath(subpath);

    match &descriptor.exports {
        Some(exports) => match_exports(exports, subpath, conditions, None),
        None => resolve_legacy(descriptor, subpath, conditions),
    }
}

/// A sub-path pattern that matched, with its `*` capture.
#[derive(Debug, Clone, Copy)]
struct PatternMatch<'a> {
    capture: Option<&'a str>,
}

impl PatternMatch<'_> {
    /// Substitute the capture for the first `*` of `target`.
    fn apply(self, target: &str) -> String {
        match self.capture {
            Some(capture) => target.replacen('*', capture, 1),
            None => target.to_string(),
        }
    }
}

/// Walk one node of the exports tree.
///
/// `bound` is the pattern match made by an ancestor key, if any. It stays
/// bound while descending through condition objects.
fn match_exports<'a>(
    node: &ExportsMap,
    subpath: &'a str,
    conditions: &[&str],
    bound: Option<PatternMatch<'a>>,
) -> Option<String> {
    match node {
        ExportsMap::Target(target) => match bound {
            Some(pattern) => Some(pattern.apply(target)),
            None if subpath == ROOT => Some(target.clone()),
            None => None,
        },
        ExportsMap::Excluded => None,
        ExportsMap::Alternatives(items) => items
            .iter()
            .find_map(|item| match_exports(item, subpath, conditions, bound)),
        ExportsMap::Map(entries) => {
            // Sub-path keys first: the first key that matches wins outright
            for (key, child) in entries {
                if !key.starts_with('.') {
                    continue;
                }
                if let Some(pattern) = match_pattern(key, subpath) {
                    return match_exports(child, subpath, conditions, Some(pattern));
                }
            }

            // Then conditions, in caller order
            for condition in conditions {
                if let Some(child) = node.get(condition) {
                    if let Some(found) = match_exports(child, subpath, conditions, bound) {
                        return Some(found);
                    }
                }
            }

            node.get(DEFAULT)
                .and_then(|child| match_exports(child, subpath, conditions, bound))
        }
    }
}

/// Match a sub-path key against the requested sub-path.
///
/// The key is turned into an anchored regex: everything is escaped except
/// `*`, which becomes a capture group. The first capture is returned.
fn match_pattern<'a>(pattern: &str, subpath: &'a str) -> Option<PatternMatch<'a>> {
    let source = pattern
        .split('*')
        .map(regex_lite::escape)
        .collect::<Vec<_>>()
        .join("(.*)");
    let regex = regex_lite::Regex::new(&format!("^{source}$")).ok()?;

    let captures = regex.captures(subpath)?;
    Some(PatternMatch {
        capture: captures.get(1).map(|m| m.as_str()),
    })
}

/// Resolve using `module` / `main` for packages without `exports`.
fn resolve_legacy(descriptor: &Descriptor, subpath: &str, conditions: &[&str]) -> Option<String> {
    let wants = |condition: &str| conditions.contains(&condition);
    let esm = descriptor.module_type.is_esm();

    // Deep imports are served as-is when their format fits the condition
    if subpath != ROOT {
        let fits_import = wants(IMPORT) && (subpath.ends_with(".mjs") || esm);
        let fits_require = wants(REQUIRE) && (subpath.ends_with(".cjs") || !esm);
        let unconstrained = !wants(IMPORT) && !wants(REQUIRE);
        return (fits_import || fits_require || unconstrained).then(|| subpath.to_string());
    }

    if wants(IMPORT) {
        if let Some(module) = &descriptor.module {
            return Some(module.clone());
        }
        if let Some(main) = &descriptor.main {
            if main.ends_with(".mjs") || esm {
                return Some(main.clone());
            }
        }
    }

    if wants(REQUIRE) {
        if let Some(main) = &descriptor.main {
            if main.ends_with(".cjs") || !esm {
                return Some(main.clone());
            }
        }
        if !esm {
            return Some(DEFAULT_MAIN.to_string());
        }
    }

    None
}
