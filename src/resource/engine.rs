//! Table execution
//!
//! Runs the list / get / hydrate functions of a table definition and streams
//! the resulting rows to a [`RowSender`].

use super::endpoint::{invoke, next_link, render_path};
use super::registry::{columns_for, get_table, ColumnDef, GetDef, HttpMethod, HydrateDef, TableDef};
use super::transform::{lookup_path, RowContext};
use crate::azure::client::ArmClient;
use crate::azure::error::{has_error_code, is_not_found};
use crate::config::{Config, DEFAULT_MAX_CONCURRENCY};
use crate::plugin::{collect_rows, QueryContext, Row, RowSender};
use anyhow::{anyhow, bail, Context, Result};
use futures::{future, StreamExt};
use serde_json::Value;
use std::collections::HashMap;

/// Columns whose values are ARM names and compare case-insensitively
const CASE_INSENSITIVE_COLUMNS: &[&str] = &["name", "resource_group", "region", "subscription_id"];

/// Knobs taken from the connection config
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Rows hydrated concurrently within one page
    pub max_concurrency: usize,
    /// ARM error codes treated as "no rows"
    pub ignore_error_codes: Vec<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            ignore_error_codes: Vec::new(),
        }
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_concurrency: config.effective_max_concurrency(),
            ignore_error_codes: config.ignore_error_codes.clone(),
        }
    }
}

/// Columns and hydrates a query actually needs
struct RowPlan<'t> {
    columns: Vec<&'t ColumnDef>,
    hydrates: Vec<&'t HydrateDef>,
    case_insensitive: Vec<&'t str>,
}

impl<'t> RowPlan<'t> {
    fn new(table: &'t TableDef, ctx: &QueryContext) -> Self {
        let columns: Vec<&ColumnDef> = columns_for(table)
            .into_iter()
            .filter(|c| ctx.wants(&c.name))
            .collect();

        let hydrates = table
            .hydrate
            .iter()
            .filter(|h| {
                columns
                    .iter()
                    .any(|c| c.hydrate.as_deref() == Some(h.name.as_str()))
            })
            .collect();

        let mut case_insensitive: Vec<&str> = CASE_INSENSITIVE_COLUMNS.to_vec();
        if let Some(key) = table.parent.as_ref().and_then(|p| p.key_column.as_deref()) {
            case_insensitive.push(key);
        }

        Self {
            columns,
            hydrates,
            case_insensitive,
        }
    }
}

/// Reject quals and projections on columns the table does not have
pub fn validate_context(table: &TableDef, ctx: &QueryContext) -> Result<()> {
    let columns = columns_for(table);
    let known = |name: &str| columns.iter().any(|c| c.name == name);

    for qual in &ctx.quals {
        if !known(&qual.column) {
            bail!("Table {} has no column '{}'", table.name, qual.column);
        }
    }
    for column in ctx.columns.iter().flatten() {
        if !known(column) {
            bail!("Table {} has no column '{}'", table.name, column);
        }
    }
    Ok(())
}

/// Run a table query, streaming rows into `sender`
pub async fn execute(
    client: &ArmClient,
    table: &TableDef,
    ctx: &QueryContext,
    opts: &EngineOptions,
    sender: &RowSender,
) -> Result<()> {
    validate_context(table, ctx)?;
    tracing::info!(
        "query table={} quals={:?} limit={:?}",
        table.name,
        ctx.quals,
        ctx.limit
    );

    if sender.is_done() {
        return Ok(());
    }

    let plan = RowPlan::new(table, ctx);

    if let Some(get) = table.get.as_ref().filter(|g| has_all_keys(g, ctx)) {
        return get_row(client, table, get, ctx, &plan, opts, sender).await;
    }

    match &table.parent {
        Some(_) => list_children(client, table, ctx, &plan, opts, sender).await,
        None => {
            let url = first_list_url(client, table, ctx, None)?;
            stream_pages(client, table, url, ctx, &plan, opts, sender).await?;
            Ok(())
        }
    }
}

/// Run a query by table name and collect the rows
pub async fn query(
    client: &ArmClient,
    table_name: &str,
    ctx: &QueryContext,
    opts: &EngineOptions,
) -> Result<Vec<Row>> {
    let table = get_table(table_name).ok_or_else(|| anyhow!("Unknown table: {}", table_name))?;
    let (sender, rx) = RowSender::for_context(ctx);

    let rows = collect_rows(
        async move { execute(client, table, ctx, opts, &sender).await },
        rx,
    )
    .await?;

    tracing::info!("query table={} returned {} rows", table_name, rows.len());
    Ok(rows)
}

fn has_all_keys(get: &GetDef, ctx: &QueryContext) -> bool {
    get.key_columns.iter().all(|k| ctx.qual(k).is_some())
}

fn base_vars(client: &ArmClient) -> HashMap<&'static str, String> {
    HashMap::from([("subscription_id", client.subscription_id.clone())])
}

async fn get_row(
    client: &ArmClient,
    table: &TableDef,
    get: &GetDef,
    ctx: &QueryContext,
    plan: &RowPlan<'_>,
    opts: &EngineOptions,
    sender: &RowSender,
) -> Result<()> {
    let mut vars: HashMap<&str, String> = base_vars(client);
    for key in &get.key_columns {
        if let Some(value) = ctx.qual(key) {
            vars.insert(key.as_str(), value.to_string());
        }
    }
    let path = render_path(&get.path, &vars)?;

    let item = match invoke(client, HttpMethod::Get, &path, &get.api_version, &[]).await {
        Ok(item) => item,
        Err(e) if is_not_found(&e) => {
            tracing::debug!("{}: get {} not found, returning no rows", table.name, path);
            return Ok(());
        }
        Err(e) if has_error_code(&e, &opts.ignore_error_codes) => {
            tracing::warn!("{}: ignoring error on get: {:#}", table.name, e);
            return Ok(());
        }
        Err(e) => return Err(e.context(format!("Failed to get {}", table.name))),
    };

    emit_items(client, table, vec![item], ctx, plan, opts, sender).await?;
    Ok(())
}

/// URL of the first list page, scoped to a resource group or parent when possible
fn first_list_url(
    client: &ArmClient,
    table: &TableDef,
    ctx: &QueryContext,
    parent_id: Option<&str>,
) -> Result<String> {
    let mut vars = base_vars(client);
    if let Some(parent_id) = parent_id {
        vars.insert("parent_id", parent_id.to_string());
    }

    let template = match (&table.list.resource_group_path, ctx.qual("resource_group")) {
        (Some(path), Some(rg)) => {
            vars.insert("resource_group", rg.to_string());
            path
        }
        _ => &table.list.path,
    };

    let path = render_path(template, &vars)?;
    let mut query: Vec<(String, String)> = table
        .list
        .query
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    query.sort();

    Ok(client
        .url(&path, &table.list.api_version, &query)?
        .to_string())
}

/// Errors on a list call that mean "no rows here" rather than a failed query
fn tolerate_list_error(table: &TableDef, err: &anyhow::Error, opts: &EngineOptions) -> bool {
    if is_not_found(err) {
        tracing::debug!("{}: list scope not found: {:#}", table.name, err);
        return true;
    }
    if has_error_code(err, &opts.ignore_error_codes) {
        tracing::warn!("{}: ignoring error on list: {:#}", table.name, err);
        return true;
    }
    false
}

/// Page through a collection. Returns `false` once the sender wants no more rows.
async fn stream_pages(
    client: &ArmClient,
    table: &TableDef,
    url: String,
    ctx: &QueryContext,
    plan: &RowPlan<'_>,
    opts: &EngineOptions,
    sender: &RowSender,
) -> Result<bool> {
    let mut next = Some(url);
    let mut page_count = 0;

    while let Some(url) = next {
        if sender.is_done() {
            return Ok(false);
        }

        let page = match client.get(&url).await {
            Ok(page) => page,
            Err(e) if tolerate_list_error(table, &e, opts) => return Ok(true),
            Err(e) => return Err(e.context(format!("Failed to list {}", table.name))),
        };
        page_count += 1;

        let items = extract_items(&page, &table.list.response_path);
        tracing::debug!("{}: page {} has {} items", table.name, page_count, items.len());

        if !emit_items(client, table, items, ctx, plan, opts, sender).await? {
            return Ok(false);
        }
        next = next_link(&page);
    }

    Ok(true)
}

/// List the parent table, then page each parent's child collection
async fn list_children(
    client: &ArmClient,
    table: &TableDef,
    ctx: &QueryContext,
    plan: &RowPlan<'_>,
    opts: &EngineOptions,
    sender: &RowSender,
) -> Result<()> {
    let Some(parent) = &table.parent else {
        return Ok(());
    };
    let parent_table = get_table(&parent.table)
        .with_context(|| format!("{}: unknown parent table {}", table.name, parent.table))?;
    let parent_filter = parent.key_column.as_deref().and_then(|k| ctx.qual(k));

    let mut next = Some(first_list_url(client, parent_table, ctx, None)?);
    while let Some(url) = next {
        if sender.is_done() {
            return Ok(());
        }

        let page = match client.get(&url).await {
            Ok(page) => page,
            Err(e) if tolerate_list_error(parent_table, &e, opts) => return Ok(()),
            Err(e) => return Err(e.context(format!("Failed to list {}", parent_table.name))),
        };

        for parent_item in extract_items(&page, &parent_table.list.response_path) {
            if let Some(filter) = parent_filter {
                let matches = lookup_path(&parent_item, &parent.parent_column)
                    .and_then(Value::as_str)
                    .map(|v| v.eq_ignore_ascii_case(filter))
                    .unwrap_or(false);
                if !matches {
                    continue;
                }
            }

            let Some(parent_id) = parent_item.get("id").and_then(Value::as_str) else {
                continue;
            };

            let url = first_list_url(client, table, ctx, Some(parent_id))?;
            if !stream_pages(client, table, url, ctx, plan, opts, sender).await? {
                return Ok(());
            }
        }

        next = next_link(&page);
    }

    Ok(())
}

/// Items of a list response. An empty path means the response is the item.
pub fn extract_items(page: &Value, response_path: &str) -> Vec<Value> {
    if response_path.is_empty() {
        return match page {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            other => vec![other.clone()],
        };
    }

    lookup_path(page, response_path)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Hydrate and send rows, `max_concurrency` at a time, in listing order
async fn emit_items(
    client: &ArmClient,
    table: &TableDef,
    items: Vec<Value>,
    ctx: &QueryContext,
    plan: &RowPlan<'_>,
    opts: &EngineOptions,
    sender: &RowSender,
) -> Result<bool> {
    // Never hydrate more rows ahead than the limit still allows
    let width = match sender.rows_remaining() {
        Some(remaining) => opts.max_concurrency.min(remaining),
        None => opts.max_concurrency,
    };
    let rows = futures::stream::iter(items)
        .map(|item| build_row(client, table, item, ctx, plan, opts))
        .buffered(width.max(1));
    futures::pin_mut!(rows);

    // Dropping the stream on early exit cancels hydrates still in flight
    while let Some(row) = rows.next().await {
        let Some(row) = row? else {
            continue;
        };
        if !sender.send(row).await {
            tracing::debug!("{}: stopping after {} rows", table.name, sender.rows_sent());
            return Ok(false);
        }
    }

    Ok(true)
}

/// Build one row; `None` when it fails a qual
async fn build_row(
    client: &ArmClient,
    table: &TableDef,
    item: Value,
    ctx: &QueryContext,
    plan: &RowPlan<'_>,
    opts: &EngineOptions,
) -> Result<Option<Row>> {
    let id = item.get("id").and_then(Value::as_str).unwrap_or_default();

    let hydrated: HashMap<&str, Value> = if id.is_empty() || plan.hydrates.is_empty() {
        HashMap::new()
    } else {
        let values = future::try_join_all(
            plan.hydrates
                .iter()
                .map(|h| run_hydrate(client, table, h, id, opts)),
        )
        .await?;
        plan.hydrates
            .iter()
            .map(|h| h.name.as_str())
            .zip(values)
            .collect()
    };

    let row_ctx = RowContext {
        subscription_id: &client.subscription_id,
        cloud_environment: &client.environment.name,
    };

    let mut row = Row::new();
    for column in &plan.columns {
        let source = match &column.hydrate {
            Some(name) => hydrated.get(name.as_str()).unwrap_or(&Value::Null),
            None => &item,
        };
        let raw = match (&column.transform, &column.path) {
            (Some(t), _) if !t.uses_input() => Value::Null,
            (_, Some(path)) => lookup_path(source, path).cloned().unwrap_or(Value::Null),
            (_, None) => source.clone(),
        };
        let value = match &column.transform {
            Some(t) => t.apply(raw, &row_ctx),
            None => raw,
        };
        row.insert(column.name.clone(), column.column_type.coerce(value));
    }

    for qual in &ctx.quals {
        let value = row.get(&qual.column).unwrap_or(&Value::Null);
        let case_insensitive = plan
            .case_insensitive
            .iter()
            .any(|c| *c == qual.column.as_str());
        if !qual.matches(value, case_insensitive) {
            return Ok(None);
        }
    }

    if let Some(columns) = &ctx.columns {
        row.retain(|name, _| columns.iter().any(|c| c == name));
    }

    Ok(Some(row))
}

/// Fetch one supplemental object for a row
async fn run_hydrate(
    client: &ArmClient,
    table: &TableDef,
    hydrate: &HydrateDef,
    id: &str,
    opts: &EngineOptions,
) -> Result<Value> {
    let mut vars = base_vars(client);
    vars.insert("id", id.to_string());
    let path = render_path(&hydrate.path, &vars)?;

    let result = if hydrate.paginate {
        hydrate_pages(client, hydrate, &path).await
    } else {
        invoke(client, hydrate.method, &path, &hydrate.api_version, &[])
            .await
            .map(|value| match &hydrate.response_path {
                Some(p) => lookup_path(&value, p).cloned().unwrap_or(Value::Null),
                None => value,
            })
    };

    match result {
        Ok(value) => Ok(value),
        Err(e) if hydrate.ignore_not_found && is_not_found(&e) => Ok(Value::Null),
        Err(e) if has_error_code(&e, &hydrate.ignore_error_codes) => {
            tracing::debug!("{}: hydrate {} unavailable for {}: {:#}", table.name, hydrate.name, id, e);
            Ok(Value::Null)
        }
        Err(e) if has_error_code(&e, &opts.ignore_error_codes) => {
            tracing::warn!("{}: ignoring error in hydrate {}: {:#}", table.name, hydrate.name, e);
            Ok(Value::Null)
        }
        Err(e) => Err(e.context(format!(
            "{}: hydrate {} failed for {}",
            table.name, hydrate.name, id
        ))),
    }
}

/// Follow `nextLink` and concatenate the item arrays
async fn hydrate_pages(client: &ArmClient, hydrate: &HydrateDef, path: &str) -> Result<Value> {
    let response_path = hydrate.response_path.as_deref().unwrap_or("value");
    let mut items = Vec::new();
    let mut next = Some(client.url(path, &hydrate.api_version, &[])?.to_string());

    while let Some(url) = next {
        let page = client.get(&url).await?;
        items.extend(extract_items(&page, response_path));
        next = next_link(&page);
    }

    Ok(Value::Array(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_items() {
        let page = json!({"value": [{"id": "a"}, {"id": "b"}]});
        assert_eq!(extract_items(&page, "value").len(), 2);
        assert_eq!(extract_items(&page, "missing").len(), 0);

        let single = json!({"id": "/subscriptions/s"});
        assert_eq!(extract_items(&single, ""), vec![single.clone()]);
        assert!(extract_items(&Value::Null, "").is_empty());
    }

    #[test]
    fn test_plan_only_runs_needed_hydrates() {
        let table = get_table("azure_key_vault").unwrap();

        let plan = RowPlan::new(table, &QueryContext::new().with_columns(&["name"]));
        assert!(plan.hydrates.is_empty());
        assert_eq!(plan.columns.len(), 1);

        let plan = RowPlan::new(
            table,
            &QueryContext::new().with_columns(&["name", "diagnostic_settings"]),
        );
        assert_eq!(plan.hydrates.len(), 1);
    }

    #[test]
    fn test_validate_context_rejects_unknown_columns() {
        let table = get_table("azure_key_vault").unwrap();
        assert!(validate_context(table, &QueryContext::new().with_qual("nope", "x")).is_err());
        assert!(validate_context(table, &QueryContext::new().with_columns(&["nope"])).is_err());
        assert!(validate_context(table, &QueryContext::new().with_qual("name", "kv")).is_ok());
    }

    #[test]
    fn test_child_plan_adds_parent_key_as_case_insensitive() {
        let table = get_table("azure_key_vault_key").unwrap();
        let plan = RowPlan::new(table, &QueryContext::new());
        assert!(plan.case_insensitive.contains(&"vault_name"));
    }
}
