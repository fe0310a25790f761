//! Endpoint Dispatch
//!
//! Maps templated ARM paths from table definitions to concrete REST calls.

use super::registry::HttpMethod;
use crate::azure::client::ArmClient;
use anyhow::{bail, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Variables that hold ARM ids and are inserted without encoding
const PATH_VARS: &[&str] = &["id", "parent_id"];

/// Substitute `{var}` placeholders in a path template
pub fn render_path(template: &str, vars: &HashMap<&str, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let Some(len) = rest[start..].find('}') else {
            bail!("Unterminated placeholder in path template '{}'", template);
        };
        let name = &rest[start + 1..start + len];
        let Some(value) = vars.get(name) else {
            bail!("No value for '{{{}}}' in path template '{}'", name, template);
        };

        if PATH_VARS.contains(&name) {
            out.push_str(value.trim_end_matches('/'));
        } else {
            out.push_str(&urlencoding::encode(value));
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

/// Invoke a templated call against the resource manager
pub async fn invoke(
    client: &ArmClient,
    method: HttpMethod,
    path: &str,
    api_version: &str,
    query: &[(String, String)],
) -> Result<Value> {
    let url = client.url(path, api_version, query)?;
    tracing::debug!("invoke: method={:?}, path={}", method, path);

    match method {
        HttpMethod::Get => client.get(url.as_str()).await,
        HttpMethod::Post => client.post(url.as_str(), None).await,
    }
}

/// `nextLink` of a list page, if there is another page
pub fn next_link(page: &Value) -> Option<String> {
    page.get("nextLink")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
