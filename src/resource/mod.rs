//! Table abstraction layer
//!
//! This module provides a data-driven approach to exposing ARM resources as
//! tables. Table definitions are loaded from JSON files at compile time, so
//! a new resource type is a new JSON entry rather than new code.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and caches table definitions from embedded JSON
//! - [`engine`] - Runs list / get / hydrate calls and streams rows
//! - [`endpoint`] - Renders path templates and dispatches REST calls
//! - [`transform`] - Path lookup, ARM id parsing and column transforms
//!
//! # Table Definitions
//!
//! Tables are defined in JSON files under `src/resources/`:
//! - `common.json` - Shared column sets plus subscription-level tables
//! - `keyvault.json` - Key vaults, keys and secrets
//! - `network.json` - Virtual networks, load balancers and friends
//! - `compute.json`, `containers.json`, `iam.json`, `storage.json`
//!
//! # Example
//!
//! ```ignore
//! use armtables::resource::{query, EngineOptions};
//! use armtables::plugin::QueryContext;
//!
//! async fn list_vaults(client: &ArmClient) -> anyhow::Result<Vec<Row>> {
//!     let ctx = QueryContext::new().with_qual("resource_group", "prod");
//!     query(client, "azure_key_vault", &ctx, &EngineOptions::default()).await
//! }
//! ```

pub mod endpoint;
mod engine;
mod registry;
pub mod transform;

pub use engine::{execute, extract_items, query, validate_context, EngineOptions};
pub use registry::*;
