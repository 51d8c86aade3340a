#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod descriptor;
pub mod error;
pub mod html;
pub mod importmap;
pub mod paths;
pub mod resolver;
pub mod router;
pub mod transcode;

pub use config::{BundleFreeConfig, Config};
pub use descriptor::{Descriptor, DescriptorStore, ExportsMap, ModuleType};
pub use error::{Error, TranscodeError};
pub use html::{HtmlPatcher, PatchOptions};
pub use importmap::{ImportMap, ImportMapBuild};
pub use resolver::{classify, resolve_export, BundleKind, ResolutionKind};
pub use router::{ResolutionContext, RouteDecision};
pub use transcode::{Bundler, CommandBundler, TranscodeCache};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
