//! spectree - browse cloud resources as a lazily expanded tree
//!
//! - [`catalog`] compiles API description documents into resource types
//! - [`apiset`] expands and deletes resources against a live backend
//! - [`expanders`] dispatches a tree node to every applicable strategy
//! - [`tree`] is the node model shared with the UI

pub mod apiset;
pub mod catalog;
pub mod config;
pub mod context;
pub mod expanders;
pub mod http;
pub mod tree;

/// Version injected at compile time via SPECTREE_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("SPECTREE_VERSION") {
    Some(v) => v,
    None => "dev",
};
