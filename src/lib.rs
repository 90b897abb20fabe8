//! # gitsift
//!
//! Per-tenant search over a code-hosting provider's repositories and commits,
//! usable both as a standalone server and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! gitsift = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gitsift::backend::ElasticBackend;
//! use gitsift::config::ServerConfig;
//! use gitsift::server::{AppState, create_router};
//! use gitsift::store::IndexStore;
//! use gitsift::tenant::{SqliteTenantRegistry, TenantRegistry};
//! use gitsift::upstream::GithubClient;
//!
//! let config = ServerConfig::default();
//! let registry = SqliteTenantRegistry::new(config.db_path()).unwrap();
//! registry.initialize().unwrap();
//!
//! let index = IndexStore::new(
//!     Arc::new(ElasticBackend::new(&config.search.url, config.search.timeout()).unwrap()),
//!     Arc::new(GithubClient::new(&config.upstream).unwrap()),
//!     Arc::new(registry),
//! );
//! let router = create_router(Arc::new(AppState::new(Arc::new(index))));
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `gitsift` binary. Disable with `default-features = false`.

pub mod backend;
pub mod config;
pub mod error;
pub mod schema;
pub mod server;
pub mod store;
pub mod tenant;
pub mod types;
pub mod upstream;
