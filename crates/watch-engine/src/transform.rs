//! Snapshot transformer contract.
//!
//! A view projects raw store objects into the minimal JSON the dashboard
//! consumes. [`transform`] applies a view to a whole collection and orders the
//! result by a natural (numeric-aware) comparison of `name-namespace`, so that
//! `pod-2` sorts before `pod-10` and the output never depends on store order.

use crate::error::TransformSkip;
use crate::tenant::StreamScope;
use kube::core::DynamicObject;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::warn;

/// Projection of a raw object into a view model.
///
/// Implementations must not panic on missing optional fields: absent values
/// project to explicit empty values (empty string, zero, empty list).
pub trait ObjectView: Send + Sync {
    /// Resource kind this view renders.
    fn kind(&self) -> &str;

    /// List-row projection.
    fn project(&self, obj: &DynamicObject) -> Result<Value, TransformSkip>;

    /// Detail projection for item-scoped streams.
    fn detail(&self, obj: &DynamicObject) -> Result<Value, TransformSkip> {
        self.project(obj)
    }
}

/// `namespace/name` label used in logs.
#[must_use]
pub fn describe(obj: &DynamicObject) -> String {
    match (&obj.metadata.namespace, &obj.metadata.name) {
        (Some(namespace), Some(name)) => format!("{namespace}/{name}"),
        (None, Some(name)) => name.clone(),
        (_, None) => "<unnamed>".to_string(),
    }
}

fn sort_key(obj: &DynamicObject) -> String {
    format!(
        "{}-{}",
        obj.metadata.name.as_deref().unwrap_or_default(),
        obj.metadata.namespace.as_deref().unwrap_or_default()
    )
}

/// Numeric-aware string comparison.
///
/// Runs of ASCII digits compare by value; everything else compares by
/// character. Equal values with different zero padding order shorter first,
/// so the ordering stays total.
#[must_use]
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut left, mut right) = (a, b);
    loop {
        match (left.chars().next(), right.chars().next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let (l_run, l_rest) = split_digits(left);
                let (r_run, r_rest) = split_digits(right);
                let ordering = compare_digit_runs(l_run, r_run);
                if ordering != Ordering::Equal {
                    return ordering;
                }
                left = l_rest;
                right = r_rest;
            }
            (Some(l), Some(r)) => {
                if l != r {
                    return l.cmp(&r);
                }
                left = &left[l.len_utf8()..];
                right = &right[r.len_utf8()..];
            }
        }
    }
}

fn split_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn compare_digit_runs(l: &str, r: &str) -> Ordering {
    let l_trimmed = l.trim_start_matches('0');
    let r_trimmed = r.trim_start_matches('0');
    l_trimmed
        .len()
        .cmp(&r_trimmed.len())
        .then_with(|| l_trimmed.cmp(r_trimmed))
        .then_with(|| l.len().cmp(&r.len()))
}

impl StreamScope {
    /// True if the object belongs to this scope.
    #[must_use]
    pub fn matches(&self, obj: &DynamicObject) -> bool {
        match self {
            Self::All => true,
            Self::Namespace { namespace } => obj.metadata.namespace.as_ref() == Some(namespace),
            Self::Item { namespace, name } => {
                obj.metadata.name.as_ref() == Some(name) && obj.metadata.namespace == *namespace
            }
            Self::RelatedEvents { namespace, name } => {
                let involved = &obj.data["involvedObject"];
                involved["name"].as_str() == Some(name.as_str())
                    && involved["namespace"].as_str() == namespace.as_deref()
            }
        }
    }
}

/// Projects and orders a collection, skipping objects the view rejects.
pub fn transform(view: &dyn ObjectView, items: &[Arc<DynamicObject>]) -> Vec<Value> {
    ordered(view, items, |view, obj| view.project(obj))
}

/// Renders the payload body of a stream: an array for collection scopes, the
/// object (or `null` once it is gone) for item scopes.
pub fn render(view: &dyn ObjectView, scope: &StreamScope, items: &[Arc<DynamicObject>]) -> Value {
    let in_scope: Vec<Arc<DynamicObject>> = items
        .iter()
        .filter(|obj| scope.matches(obj))
        .cloned()
        .collect();

    match scope {
        StreamScope::Item { .. } => ordered(view, &in_scope, |view, obj| view.detail(obj))
            .into_iter()
            .next()
            .unwrap_or(Value::Null),
        StreamScope::All | StreamScope::Namespace { .. } | StreamScope::RelatedEvents { .. } => {
            Value::Array(transform(view, &in_scope))
        }
    }
}

fn ordered<F>(view: &dyn ObjectView, items: &[Arc<DynamicObject>], project: F) -> Vec<Value>
where
    F: Fn(&dyn ObjectView, &DynamicObject) -> Result<Value, TransformSkip>,
{
    let mut rows: Vec<(String, String, Value)> = items
        .iter()
        .filter_map(|obj| match project(view, obj) {
            Ok(value) => Some((
                sort_key(obj),
                obj.metadata.uid.clone().unwrap_or_default(),
                value,
            )),
            Err(skip) => {
                warn!("{} transform: {}", view.kind(), skip);
                None
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        natural_cmp(&a.0, &b.0)
            .then_with(|| a.0.cmp(&b.0))
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.to_string().cmp(&b.2.to_string()))
    });
    rows.into_iter().map(|(_, _, value)| value).collect()
}
