//! Low-level representations for the file formats read and written by dockyard.
//!
//! - [`descriptor`]: the image descriptor (`dockyard.toml`) of a build context.
//! - [`base`]: the descriptor (`base.toml`) of a base environment in a base store.
//! - [`manifest`]: the dependency manifest (`requirements.txt`).
//! - [`index`]: the package index (`index.toml`) dependencies are resolved against.
//! - [`image_config`]: the configuration (`image.toml`) of a finished image.
//! - [`launch`]: the launch descriptor of an image's foreground process.

// Enable rustc and Clippy lints that are disabled by default.
// https://doc.rust-lang.org/rustc/lints/listing/allowed-by-default.html#unused-crate-dependencies
#![warn(unused_crate_dependencies)]
// https://rust-lang.github.io/rust-clippy/stable/index.html
#![warn(clippy::pedantic)]
// This lint is too noisy and enforces a style that reduces readability in many cases.
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod base;
pub mod descriptor;
pub mod env;
pub mod image;
pub mod image_config;
pub mod index;
pub mod launch;
pub mod manifest;
pub mod version;

mod newtypes;
