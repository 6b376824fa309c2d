#![doc = "eagle-autosend: forwards generated images and their prompt metadata into an Eagle asset library."]
//! The pipeline is split into leaf components and one orchestrator:
//! - [`tag_filter`] maps prompt tokens through a tag/alias CSV table
//! - [`metadata`] reads embedded text metadata and renders annotations and tags
//! - [`library`] talks to the library REST API
//! - [`send`] composes the above for one request
//!
//! [`server`] and [`cli`] are thin surfaces over [`send`] and [`settings`].
pub mod cli;
pub mod library;
pub mod load_config;
pub mod metadata;
pub mod send;
pub mod server;
pub mod settings;
pub mod tag_filter;

pub use cli::{run, Cli, Commands};
