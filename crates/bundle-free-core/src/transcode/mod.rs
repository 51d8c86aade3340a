//! On-demand conversion of legacy modules to ES modules.
//!
//! The [`TranscodeCache`] decides what to hand to a [`Bundler`] and keeps
//! the results on disk, keyed by package identity and source file.

mod bundler;
mod cache;
mod shim;

pub use bundler::{Bundler, CommandBundler, ENTRY_PLACEHOLDER, OUTPUT_PLACEHOLDER};
pub use cache::{TranscodeCache, DEFAULT_VENDOR};
pub use shim::{scan_exports, ExportScan};
