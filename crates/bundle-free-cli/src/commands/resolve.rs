//! `bundle-free resolve` command implementation.
//!
//! Explains how one package is seen by the server: the file a sub-path
//! resolves to, the package's classification and its dependency closure.

use bundle_free_core::paths::find_node_modules_root;
use bundle_free_core::resolver::{classify, is_bare, is_module, normalize_subpath};
use bundle_free_core::{resolve_export, DescriptorStore, ResolutionKind};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::Path;

/// Resolution report for one package.
#[derive(Debug, Serialize)]
pub struct ResolveOutput {
    pub name: String,
    pub version: String,
    pub subpath: String,
    pub conditions: Vec<String>,
    /// Resolved file relative to the package directory, or null.
    pub resolved: Option<String>,
    pub kind: String,
    pub module_type: String,
    pub bare: bool,
    pub module: bool,
    pub closure: Vec<String>,
}

pub async fn run(
    cwd: &Path,
    name: &str,
    subpath: Option<&str>,
    conditions: &[String],
    json: bool,
) -> Result<()> {
    let output = explain(cwd, name, subpath, conditions).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).into_diagnostic()?
        );
        return Ok(());
    }

    println!("{}@{}", output.name, output.version);
    println!(
        "  {} [{}] -> {}",
        output.subpath,
        output.conditions.join(", "),
        output.resolved.as_deref().unwrap_or("(not exported)")
    );
    println!("  kind:    {}", output.kind);
    println!("  type:    {}", output.module_type);
    println!("  bare:    {}", output.bare);
    println!("  module:  {}", output.module);
    if output.closure.is_empty() {
        println!("  closure: (none)");
    } else {
        println!("  closure: {}", output.closure.join(", "));
    }
    Ok(())
}

/// Build the report for `name` using the `node_modules` found from `cwd`.
pub async fn explain(
    cwd: &Path,
    name: &str,
    subpath: Option<&str>,
    conditions: &[String],
) -> Result<ResolveOutput> {
    let root = find_node_modules_root(cwd).into_diagnostic()?;
    let store = DescriptorStore::new(root);
    let descriptor = store.get(name).await.into_diagnostic()?;
    let closure = store.closure(name).await.into_diagnostic()?;

    let conditions: Vec<String> = if conditions.is_empty() {
        ResolutionKind::Import
            .conditions()
            .iter()
            .map(ToString::to_string)
            .collect()
    } else {
        conditions.to_vec()
    };
    let condition_refs: Vec<&str> = conditions.iter().map(String::as_str).collect();
    let subpath = match normalize_subpath(subpath) {
        sub if sub.starts_with('.') => sub.to_string(),
        sub => format!("./{}", sub.trim_start_matches('/')),
    };

    Ok(ResolveOutput {
        name: descriptor.name.clone(),
        version: descriptor.version.clone(),
        resolved: resolve_export(&descriptor, Some(&subpath), &condition_refs),
        subpath,
        conditions,
        kind: classify(&descriptor, &closure[..]).to_string(),
        module_type: descriptor.module_type.to_string(),
        bare: is_bare(&descriptor),
        module: is_module(&descriptor),
        closure: closure.iter().map(|d| d.name.clone()).collect(),
    })
}
