//! Column transforms
//!
//! Turn a value found in an ARM response into the value stored in a column.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Per-row values that do not come from the response body
#[derive(Debug, Clone)]
pub struct RowContext<'a> {
    pub subscription_id: &'a str,
    pub cloud_environment: &'a str,
}

/// Named transform applied after the path lookup
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    Lower,
    Upper,
    ResourceGroupFromId,
    SubscriptionFromId,
    LastSegment,
    /// `["azure://<id>", "azure://<lowercased id>"]`
    Akas,
    Count,
    TagsOrEmpty,
    ToBool,
    SubscriptionId,
    CloudEnvironment,
    /// Id segment following the named one, e.g. `vaults`
    IdSegment(String),
}

impl Transform {
    /// Context transforms ignore the looked-up value
    pub fn uses_input(&self) -> bool {
        !matches!(self, Transform::SubscriptionId | Transform::CloudEnvironment)
    }

    pub fn apply(&self, value: Value, ctx: &RowContext<'_>) -> Value {
        match self {
            Transform::Lower => map_str(value, |s| s.to_lowercase()),
            Transform::Upper => map_str(value, |s| s.to_uppercase()),
            Transform::ResourceGroupFromId => id_value(&value, |id| {
                id.resource_group.map(|rg| rg.to_lowercase())
            }),
            Transform::SubscriptionFromId => id_value(&value, |id| id.subscription_id),
            Transform::LastSegment => match value.as_str() {
                Some(s) => s
                    .trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .map(|s| Value::String(s.to_string()))
                    .unwrap_or(Value::Null),
                None => Value::Null,
            },
            Transform::Akas => match value.as_str() {
                Some(id) => {
                    let mut akas = vec![Value::String(format!("azure://{}", id))];
                    let lower = format!("azure://{}", id.to_lowercase());
                    if lower != format!("azure://{}", id) {
                        akas.push(Value::String(lower));
                    }
                    Value::Array(akas)
                }
                None => Value::Null,
            },
            Transform::Count => match &value {
                Value::Array(a) => Value::from(a.len()),
                Value::Object(o) => Value::from(o.len()),
                Value::Null => Value::from(0),
                _ => Value::Null,
            },
            Transform::TagsOrEmpty => match value {
                Value::Null => Value::Object(Map::new()),
                other => other,
            },
            Transform::ToBool => match &value {
                Value::Null => Value::Bool(false),
                Value::Bool(_) => value,
                Value::String(s) => Value::Bool(!s.is_empty()),
                Value::Array(a) => Value::Bool(!a.is_empty()),
                _ => Value::Bool(true),
            },
            Transform::SubscriptionId => Value::String(ctx.subscription_id.to_string()),
            Transform::CloudEnvironment => Value::String(ctx.cloud_environment.to_string()),
            Transform::IdSegment(segment) => id_value(&value, |id| {
                id.segment_after(segment).map(str::to_string)
            }),
        }
    }
}

fn map_str(value: Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(&s)),
        other => other,
    }
}

fn id_value(value: &Value, f: impl Fn(ResourceId) -> Option<String>) -> Value {
    value
        .as_str()
        .and_then(ResourceId::parse)
        .and_then(f)
        .map(Value::String)
        .unwrap_or(Value::Null)
}

/// Parsed ARM resource id
/// `/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}/...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    pub subscription_id: Option<String>,
    pub resource_group: Option<String>,
    pub provider: Option<String>,
    /// Remaining `(type, name)` pairs after the provider namespace
    pub segments: Vec<(String, String)>,
    raw: Vec<String>,
}

impl ResourceId {
    pub fn parse(id: &str) -> Option<Self> {
        if !id.starts_with('/') {
            return None;
        }
        let raw: Vec<String> = id
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if raw.is_empty() {
            return None;
        }

        let after = |key: &str| -> Option<String> {
            raw.iter()
                .position(|s| s.eq_ignore_ascii_case(key))
                .and_then(|i| raw.get(i + 1))
                .cloned()
        };

        let provider_idx = raw.iter().position(|s| s.eq_ignore_ascii_case("providers"));
        let provider = provider_idx.and_then(|i| raw.get(i + 1)).cloned();
        let segments = match provider_idx {
            Some(i) => raw[(i + 2).min(raw.len())..]
                .chunks(2)
                .filter(|c| c.len() == 2)
                .map(|c| (c[0].clone(), c[1].clone()))
                .collect(),
            None => Vec::new(),
        };

        let subscription_id = after("subscriptions");
        let resource_group = after("resourceGroups");

        Some(Self {
            subscription_id,
            resource_group,
            provider,
            segments,
            raw,
        })
    }

    /// Value following `name` in the id, compared case-insensitively
    pub fn segment_after(&self, name: &str) -> Option<&str> {
        self.raw
            .iter()
            .position(|s| s.eq_ignore_ascii_case(name))
            .and_then(|i| self.raw.get(i + 1))
            .map(|s| s.as_str())
    }
}

/// Look up a dot path (`properties.subnets.0.name`) in a JSON value.
/// An empty path returns the value itself.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }

    let mut current = value;
    for part in path.split('.') {
        current = match current {
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            Value::Object(map) => map.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const KEY_ID: &str = "/subscriptions/sub-1/resourceGroups/RG-Demo/providers/Microsoft.KeyVault/vaults/kv1/keys/key1";

    fn ctx() -> RowContext<'static> {
        RowContext {
            subscription_id: "sub-1",
            cloud_environment: "AzurePublicCloud",
        }
    }

    #[test]
    fn test_parse_resource_id() {
        let id = ResourceId::parse(KEY_ID).unwrap();
        assert_eq!(id.subscription_id.as_deref(), Some("sub-1"));
        assert_eq!(id.resource_group.as_deref(), Some("RG-Demo"));
        assert_eq!(id.provider.as_deref(), Some("Microsoft.KeyVault"));
        assert_eq!(
            id.segments,
            vec![
                ("vaults".to_string(), "kv1".to_string()),
                ("keys".to_string(), "key1".to_string())
            ]
        );
        assert!(ResourceId::parse("not-an-id").is_none());
    }

    #[test]
    fn test_resource_group_is_case_insensitive_and_lowered() {
        let id = "/subscriptions/s/resourcegroups/MyRG/providers/Microsoft.Network/loadBalancers/lb";
        assert_eq!(
            Transform::ResourceGroupFromId.apply(json!(id), &ctx()),
            json!("myrg")
        );
    }

    #[test]
    fn test_id_segment() {
        assert_eq!(
            Transform::IdSegment("VAULTS".to_string()).apply(json!(KEY_ID), &ctx()),
            json!("kv1")
        );
        assert_eq!(
            Transform::IdSegment("secrets".to_string()).apply(json!(KEY_ID), &ctx()),
            Value::Null
        );
    }

    #[test]
    fn test_akas_adds_lowercase_variant() {
        assert_eq!(
            Transform::Akas.apply(json!("/subscriptions/S/x"), &ctx()),
            json!(["azure:///subscriptions/S/x", "azure:///subscriptions/s/x"])
        );
        assert_eq!(
            Transform::Akas.apply(json!("/subscriptions/s/x"), &ctx()),
            json!(["azure:///subscriptions/s/x"])
        );
    }

    #[test]
    fn test_context_transforms() {
        assert_eq!(Transform::SubscriptionId.apply(Value::Null, &ctx()), json!("sub-1"));
        assert_eq!(
            Transform::CloudEnvironment.apply(Value::Null, &ctx()),
            json!("AzurePublicCloud")
        );
    }

    #[test]
    fn test_count_and_tags() {
        assert_eq!(Transform::Count.apply(json!([1, 2, 3]), &ctx()), json!(3));
        assert_eq!(Transform::Count.apply(Value::Null, &ctx()), json!(0));
        assert_eq!(Transform::TagsOrEmpty.apply(Value::Null, &ctx()), json!({}));
        assert_eq!(Transform::ToBool.apply(json!([]), &ctx()), json!(false));
    }

    #[test]
    fn test_last_segment() {
        assert_eq!(
            Transform::LastSegment.apply(json!("/a/b/Standard_D2s_v3/"), &ctx()),
            json!("Standard_D2s_v3")
        );
    }

    #[test]
    fn test_transform_deserializes_unit_and_data_variants() {
        let t: Transform = serde_json::from_value(json!("resource_group_from_id")).unwrap();
        assert_eq!(t, Transform::ResourceGroupFromId);
        let t: Transform = serde_json::from_value(json!({"id_segment": "vaults"})).unwrap();
        assert_eq!(t, Transform::IdSegment("vaults".to_string()));
    }

    #[test]
    fn test_lookup_path() {
        let value = json!({"properties": {"subnets": [{"name": "a"}, {"name": "b"}]}});
        assert_eq!(
            lookup_path(&value, "properties.subnets.1.name"),
            Some(&json!("b"))
        );
        assert_eq!(lookup_path(&value, ""), Some(&value));
        assert_eq!(lookup_path(&value, "properties.subnets.9.name"), None);
        assert_eq!(lookup_path(&value, "properties.subnets.x"), None);
    }
}
