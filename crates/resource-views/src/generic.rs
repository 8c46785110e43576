//! Schema-less projection for custom resources found through discovery.

use crate::common::{labels, meta_fields};
use kube::core::DynamicObject;
use serde_json::{json, Value};
use watch_engine::{ObjectView, TransformSkip};

/// Projects any object from its metadata; the detail view adds `spec` and `status` verbatim.
#[derive(Debug, Clone)]
pub struct GenericView {
    kind: String,
}

impl GenericView {
    /// View for objects of `kind`.
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

impl ObjectView for GenericView {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn project(&self, obj: &DynamicObject) -> Result<Value, TransformSkip> {
        let mut fields = meta_fields(&obj.metadata);
        fields.insert("kind".into(), json!(self.kind));
        Ok(Value::Object(fields))
    }

    fn detail(&self, obj: &DynamicObject) -> Result<Value, TransformSkip> {
        let mut fields = meta_fields(&obj.metadata);
        fields.insert("kind".into(), json!(self.kind));
        fields.insert("labels".into(), labels(obj.metadata.labels.as_ref()));
        for key in ["spec", "status"] {
            let value = obj.data.get(key).cloned().unwrap_or_else(|| json!({}));
            fields.insert(key.into(), value);
        }
        Ok(Value::Object(fields))
    }
}
