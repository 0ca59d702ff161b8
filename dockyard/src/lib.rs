//! Assembles service images from an image descriptor and launches their single foreground
//! process.
//!
//! An image is built in two strictly ordered stages that never run concurrently:
//!
//! 1. [`build`]: the [`BuildSequencer`](build::BuildSequencer) establishes a base environment,
//!    applies environment variables, sets the working directory, installs the declared
//!    dependencies and copies the application source.
//! 2. [`launch`]: the [`LaunchComposer`](launch::LaunchComposer) validates the launch settings,
//!    binds the listener, loads the entry point and serves until the process ends.

// Enable rustc and Clippy lints that are disabled by default.
// https://doc.rust-lang.org/rustc/lints/listing/allowed-by-default.html#unused-crate-dependencies
#![warn(unused_crate_dependencies)]
// https://rust-lang.github.io/rust-clippy/stable/index.html
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
// This lint is too noisy and enforces a style that reduces readability in many cases.
#![allow(clippy::module_name_repetitions)]

pub mod build;
pub mod exit_code;
pub mod launch;
pub mod lifecycle;
pub mod store;

mod digest;
mod download;
mod env;
mod error;
mod tar;
mod util;

#[doc(inline)]
pub use dockyard_data as data;

pub use download::DownloadError;
pub use env::*;
pub use error::*;
