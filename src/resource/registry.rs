//! Table Registry - Load table definitions from JSON
//!
//! This module loads all ARM table definitions from embedded JSON files
//! and provides lookup functions for the rest of the crate.

use super::transform::Transform;
use crate::plugin::ColumnType;
use anyhow::{bail, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Embedded table JSON files (compiled into the binary)
const TABLE_FILES: &[&str] = &[
    include_str!("../resources/common.json"),
    include_str!("../resources/compute.json"),
    include_str!("../resources/containers.json"),
    include_str!("../resources/iam.json"),
    include_str!("../resources/keyvault.json"),
    include_str!("../resources/network.json"),
    include_str!("../resources/storage.json"),
];

fn default_response_path() -> String {
    "value".to_string()
}

fn default_parent_column() -> String {
    "name".to_string()
}

/// Column definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub description: String,
    /// Dot path into the source object; `None` means the whole object
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub transform: Option<Transform>,
    /// Hydrate whose result is the source object instead of the listed item
    #[serde(default)]
    pub hydrate: Option<String>,
}

/// List call for a table
#[derive(Debug, Clone, Deserialize)]
pub struct ListDef {
    pub path: String,
    pub api_version: String,
    /// Narrower path used when the query constrains `resource_group`
    #[serde(default)]
    pub resource_group_path: Option<String>,
    #[serde(default)]
    pub query: HashMap<String, String>,
    #[serde(default = "default_response_path")]
    pub response_path: String,
}

/// Single-resource lookup
#[derive(Debug, Clone, Deserialize)]
pub struct GetDef {
    pub path: String,
    pub api_version: String,
    pub key_columns: Vec<String>,
}

/// Parent table whose rows own this table's rows
#[derive(Debug, Clone, Deserialize)]
pub struct ParentDef {
    pub table: String,
    /// Column of this table that names the parent
    #[serde(default)]
    pub key_column: Option<String>,
    /// Field of the parent item compared against `key_column`
    #[serde(default = "default_parent_column")]
    pub parent_column: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// Supplemental call made per row
#[derive(Debug, Clone, Deserialize)]
pub struct HydrateDef {
    pub name: String,
    #[serde(default)]
    pub method: HttpMethod,
    pub path: String,
    pub api_version: String,
    /// Dot path of the interesting part of the response; `None` keeps it all
    #[serde(default)]
    pub response_path: Option<String>,
    /// Follow `nextLink` and concatenate `value` arrays
    #[serde(default)]
    pub paginate: bool,
    /// Treat a missing sub-resource as `null`
    #[serde(default)]
    pub ignore_not_found: bool,
    /// ARM codes meaning "this resource has no such sub-object"; they yield `null`
    #[serde(default)]
    pub ignore_error_codes: Vec<String>,
}

/// Table definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct TableDef {
    #[serde(default)]
    pub name: String,
    pub description: String,
    pub list: ListDef,
    #[serde(default)]
    pub get: Option<GetDef>,
    #[serde(default)]
    pub parent: Option<ParentDef>,
    #[serde(default)]
    pub hydrate: Vec<HydrateDef>,
    #[serde(default)]
    pub column_sets: Vec<String>,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn hydrate_def(&self, name: &str) -> Option<&HydrateDef> {
        self.hydrate.iter().find(|h| h.name == name)
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TableConfig {
    #[serde(default)]
    pub column_sets: HashMap<String, Vec<ColumnDef>>,
    #[serde(default)]
    pub tables: HashMap<String, TableDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<TableConfig> = OnceLock::new();

/// Get the table registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static TableConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = TableConfig::default();

        for content in TABLE_FILES {
            let partial: TableConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded table JSON: {}", e));
            final_config.column_sets.extend(partial.column_sets);
            final_config
                .tables
                .extend(partial.tables.into_iter().map(|(name, mut table)| {
                    table.name = name.clone();
                    (name, table)
                }));
        }

        final_config
    })
}

/// Get a table definition by name
pub fn get_table(name: &str) -> Option<&'static TableDef> {
    get_registry().tables.get(name)
}

/// Get all table names, sorted
pub fn get_all_table_names() -> Vec<&'static str> {
    let mut names: Vec<&str> = get_registry()
        .tables
        .keys()
        .map(|s| s.as_str())
        .collect();
    names.sort_unstable();
    names
}

/// Table columns followed by the columns of its column sets
pub fn columns_for(table: &TableDef) -> Vec<&ColumnDef> {
    let registry = get_registry();
    let mut columns: Vec<&ColumnDef> = table.columns.iter().collect();
    for set in &table.column_sets {
        if let Some(shared) = registry.column_sets.get(set) {
            columns.extend(shared.iter());
        }
    }
    columns
}

/// Check the cross references inside a table definition
pub fn validate_table(table: &TableDef) -> Result<()> {
    let registry = get_registry();

    for set in &table.column_sets {
        if !registry.column_sets.contains_key(set) {
            bail!("{}: unknown column set '{}'", table.name, set);
        }
    }

    let columns = columns_for(table);
    let mut seen = HashSet::new();
    for column in &columns {
        if !seen.insert(column.name.as_str()) {
            bail!("{}: duplicate column '{}'", table.name, column.name);
        }
        if let Some(hydrate) = &column.hydrate {
            if table.hydrate_def(hydrate).is_none() {
                bail!(
                    "{}: column '{}' uses unknown hydrate '{}'",
                    table.name,
                    column.name,
                    hydrate
                );
            }
        }
    }

    if let Some(get) = &table.get {
        for key in &get.key_columns {
            if !seen.contains(key.as_str()) {
                bail!("{}: get key column '{}' is not a column", table.name, key);
            }
        }
    }

    if let Some(parent) = &table.parent {
        match get_table(&parent.table) {
            Some(p) if p.name != table.name && p.parent.is_none() => {}
            _ => bail!("{}: invalid parent table '{}'", table.name, parent.table),
        }
        if !table.list.path.contains("{parent_id}") {
            bail!("{}: child list path must contain {{parent_id}}", table.name);
        }
        if let Some(key) = &parent.key_column {
            if !seen.contains(key.as_str()) {
                bail!("{}: parent key column '{}' is not a column", table.name, key);
            }
        }
    }

    Ok(())
}
