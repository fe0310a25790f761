//! Azure Resource Manager interaction module
//!
//! This module provides the core functionality for talking to ARM:
//! authentication, HTTP transport with retries, error classification and
//! subscription discovery.
//!
//! # Module Structure
//!
//! - [`auth`] - Token acquisition (client secret, managed identity, Azure CLI)
//! - [`client`] - Main ARM client for making API requests
//! - [`environment`] - Public and sovereign cloud endpoints
//! - [`error`] - `ArmError` and the "not found" predicates
//! - [`http`] - HTTP utilities and the fixed retry policy
//! - [`subscriptions`] - Subscription, resource group and location listing
//!
//! # Example
//!
//! ```ignore
//! use armtables::azure::client::ArmClient;
//! use armtables::config::Config;
//!
//! async fn list_groups() -> anyhow::Result<()> {
//!     let client = ArmClient::new(&Config::load()).await?;
//!     let groups = client.get_path(&format!("{}/resourcegroups", client.subscription_path()), "2022-09-01").await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod environment;
pub mod error;
pub mod http;
pub mod subscriptions;
