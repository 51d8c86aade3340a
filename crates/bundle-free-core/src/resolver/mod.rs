//! Entry point resolution and package classification.
//!
//! Both are pure functions over [`Descriptor`](crate::descriptor::Descriptor)
//! data; nothing here touches the filesystem.

mod classify;
mod exports;

pub use classify::{classify, is_bare, is_module, BundleKind};
pub use exports::{
    normalize_subpath, resolve_export, ResolutionKind, DEFAULT, IMPORT, REQUIRE, ROOT,
};
