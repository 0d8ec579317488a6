//! Encore platform API interaction module
//!
//! This module provides the remote side of the needs cache: authentication,
//! the HTTP client and the GraphQL needs query.
//!
//! # Module Structure
//!
//! - [`auth`] - OAuth token handling and Encore CLI credentials
//! - [`client`] - Main platform client, implements [`NeedsClient`](crate::needs::NeedsClient)
//! - [`http`] - HTTP utilities for envelope and GraphQL calls
//! - [`query`] - GraphQL documents rendered from shapes
//!
//! # Example
//!
//! ```ignore
//! use encore_needs::config::Config;
//! use encore_needs::platform::client::PlatformClient;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let client = PlatformClient::connect(&Config::load(), "dev").await?;
//!     println!("{}", client.app_slug());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod query;
