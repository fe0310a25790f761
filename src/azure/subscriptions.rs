//! Azure Subscriptions
//!
//! Functions for listing subscriptions, resource groups and locations.

use super::client::ArmClient;
use anyhow::Result;
use serde_json::Value;

const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";
const RESOURCE_GROUPS_API_VERSION: &str = "2022-09-01";

/// Subscription information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub subscription_id: String,
    pub display_name: String,
    pub state: String,
    pub tenant_id: String,
}

impl From<&Value> for Subscription {
    fn from(value: &Value) -> Self {
        let field = |name: &str, default: &str| {
            value
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or(default)
                .to_string()
        };
        Self {
            subscription_id: field("subscriptionId", "-"),
            display_name: field("displayName", "-"),
            state: field("state", "Unknown"),
            tenant_id: field("tenantId", "-"),
        }
    }
}

/// Follow `nextLink` until the collection is exhausted
pub async fn list_all(client: &ArmClient, path: &str, api_version: &str) -> Result<Vec<Value>> {
    let mut items = Vec::new();
    let mut next = Some(client.url(path, api_version, &[])?.to_string());

    while let Some(url) = next {
        let page = client.get(&url).await?;
        if let Some(values) = page.get("value").and_then(|v| v.as_array()) {
            items.extend(values.iter().cloned());
        }
        next = page
            .get("nextLink")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }

    Ok(items)
}

/// List all subscriptions visible to the credentials
pub async fn list_subscriptions(client: &ArmClient) -> Result<Vec<Subscription>> {
    let values = list_all(client, "/subscriptions", SUBSCRIPTIONS_API_VERSION).await?;
    Ok(values.iter().map(Subscription::from).collect())
}

/// List resource group names in the client's subscription
pub async fn list_resource_groups(client: &ArmClient) -> Result<Vec<String>> {
    let path = format!("{}/resourcegroups", client.subscription_path());
    let values = list_all(client, &path, RESOURCE_GROUPS_API_VERSION).await?;
    Ok(values
        .iter()
        .filter_map(|v| v.get("name").and_then(|n| n.as_str()).map(str::to_string))
        .collect())
}

/// List location names available to the client's subscription
pub async fn list_locations(client: &ArmClient) -> Result<Vec<String>> {
    let path = format!("{}/locations", client.subscription_path());
    let values = list_all(client, &path, SUBSCRIPTIONS_API_VERSION).await?;
    Ok(values
        .iter()
        .filter_map(|v| v.get("name").and_then(|n| n.as_str()).map(str::to_string))
        .collect())
}
