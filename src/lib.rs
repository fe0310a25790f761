//! armtables - Azure Resource Manager resources as queryable tables
//!
//! Tables are declared in embedded JSON (see [`resource`]) and served through
//! the host contract in [`plugin`]: quals, a row limit and a column projection
//! go in, rows stream out.

pub mod azure;
pub mod config;
pub mod output;
pub mod plugin;
pub mod resource;
