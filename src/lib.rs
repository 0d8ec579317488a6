//! Encore infrastructure needs as typed, read-only data sources.
//!
//! Shapes describe the platform's GraphQL payloads ([`shape`]). From a shape
//! the [`schema`] builder derives an attribute tree and the [`extract`]or
//! reads values into the same tree. The [`needs`] cache fetches every need of
//! an environment once, and [`datasource`] ties the pieces together per kind
//! of resource.

pub mod config;
pub mod datasource;
pub mod error;
pub mod extract;
pub mod needs;
pub mod platform;
pub mod schema;
pub mod shape;

/// Version injected at compile time via ENCORE_NEEDS_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("ENCORE_NEEDS_VERSION") {
    Some(v) => v,
    None => "dev",
};
