//! Serving collaborator for the `bundle-free` binary.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod server;

pub use server::{router, serve, ServerState, OVERLAY_JS};
