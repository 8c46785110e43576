//! Helpers shared by the typed projections.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::core::DynamicObject;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use watch_engine::transform::describe;
use watch_engine::TransformSkip;

/// Parses a raw store object into its `k8s-openapi` type.
///
/// List responses omit `apiVersion`/`kind` on their items, so the type's own
/// values are filled in when missing.
pub fn parse<K>(obj: &DynamicObject) -> Result<K, TransformSkip>
where
    K: k8s_openapi::Resource + DeserializeOwned,
{
    let mut value = serde_json::to_value(obj).map_err(|e| TransformSkip::new(describe(obj), e))?;
    if let Value::Object(fields) = &mut value {
        fields
            .entry("apiVersion")
            .or_insert_with(|| Value::String(K::API_VERSION.to_string()));
        fields
            .entry("kind")
            .or_insert_with(|| Value::String(K::KIND.to_string()));
    }
    serde_json::from_value(value).map_err(|e| TransformSkip::new(describe(obj), e))
}

/// RFC 3339 rendering of a timestamp, empty when absent.
#[must_use]
pub fn timestamp(time: Option<&Time>) -> String {
    time.and_then(|t| serde_json::to_value(t).ok())
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// `"3"` or `"25%"`, empty when absent.
#[must_use]
pub fn int_or_string(value: Option<&IntOrString>) -> String {
    match value {
        Some(IntOrString::Int(n)) => n.to_string(),
        Some(IntOrString::String(s)) => s.clone(),
        None => String::new(),
    }
}

/// Labels as a JSON object, `{}` when absent.
#[must_use]
pub fn labels(labels: Option<&BTreeMap<String, String>>) -> Value {
    labels.map_or_else(|| json!({}), |l| json!(l))
}

/// Name, namespace, uid and creation time of an object.
#[must_use]
pub fn meta_fields(meta: &ObjectMeta) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("name".into(), json!(meta.name.clone().unwrap_or_default()));
    fields.insert(
        "namespace".into(),
        json!(meta.namespace.clone().unwrap_or_default()),
    );
    fields.insert("uid".into(), json!(meta.uid.clone().unwrap_or_default()));
    fields.insert(
        "creationTimestamp".into(),
        json!(timestamp(meta.creation_timestamp.as_ref())),
    );
    fields
}

/// Merges extra fields into the meta fields of an object.
#[must_use]
pub fn row(meta: &ObjectMeta, extra: Value) -> Value {
    let mut fields = meta_fields(meta);
    if let Value::Object(extra) = extra {
        fields.extend(extra);
    }
    Value::Object(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Pod;
    use watch_engine::mock::dynamic_object;

    #[test]
    fn test_parse_fills_type_meta() {
        let mut obj = dynamic_object("v1", "Pod", Some("default"), "api-0", json!({ "spec": { "containers": [] } }));
        obj.types = None;
        let pod: Pod = parse(&obj).unwrap();
        assert_eq!(pod.metadata.name.as_deref(), Some("api-0"));
    }

    #[test]
    fn test_parse_rejects_malformed_object() {
        let obj = dynamic_object("v1", "Pod", Some("default"), "bad", json!({ "spec": { "containers": "nope" } }));
        let err = parse::<Pod>(&obj).unwrap_err();
        assert_eq!(err.object, "default/bad");
    }

    #[test]
    fn test_int_or_string() {
        assert_eq!(int_or_string(Some(&IntOrString::Int(2))), "2");
        assert_eq!(int_or_string(Some(&IntOrString::String("25%".into()))), "25%");
        assert_eq!(int_or_string(None), "");
    }

    #[test]
    fn test_meta_fields_defaults() {
        let fields = meta_fields(&ObjectMeta::default());
        assert_eq!(fields["name"], "");
        assert_eq!(fields["creationTimestamp"], "");
    }
}
