//! State mapping between API snapshots and declarative state objects.
//!
//! Unique responsibility: project a remote snapshot into the host's JSON state
//! representation, attribute by attribute, from a declarative field list.
//!
//! Rules:
//! - every declared attribute is written exactly once per projection,
//! - absent nested structures are written as their empty equivalents,
//! - tag-like collections become sets (sorted, deduplicated), positional ones
//!   stay ordered lists,
//! - the target is never mutated field by field: the next state is built in a
//!   fresh value and swapped in as a whole.

use std::collections::{BTreeSet, HashSet};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

/// A state, plan or configuration payload: attribute name to JSON value.
pub type StateObject = Map<String, Value>;

/// Getter projecting one attribute out of a snapshot.
pub type Getter<S> = fn(&S) -> Value;

/// Errors raised by state mapping.
#[derive(Debug, Error)]
pub enum StateError {
    /// Two projections target the same attribute.
    #[error("attribute `{0}` is projected more than once")]
    DuplicateAttribute(&'static str),
    /// A payload could not be decoded into its typed model.
    #[error("invalid {what}: {source}")]
    Decode {
        /// What was being decoded.
        what: &'static str,
        /// The underlying serde error.
        source: serde_json::Error,
    },
}

struct Field<S> {
    name: &'static str,
    get: Getter<S>,
}

/// Declarative list of attribute projections for snapshots of type `S`.
pub struct Projection<S> {
    fields: Vec<Field<S>>,
}

impl<S> Projection<S> {
    /// Start declaring a projection.
    #[must_use]
    pub const fn builder() -> ProjectionBuilder<S> {
        ProjectionBuilder { fields: Vec::new() }
    }

    /// Attribute names written by this projection, in declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    /// Project `source` into a fresh state object holding only the declared attributes.
    #[must_use]
    pub fn project(&self, source: &S) -> StateObject {
        let mut out = StateObject::new();
        for field in &self.fields {
            out.insert(field.name.to_string(), (field.get)(source));
        }
        out
    }

    /// Overlay the projection of `source` onto `target`.
    ///
    /// Attributes not covered by the projection keep their current value.
    /// The merged state is built aside and replaces `target` in one move.
    pub fn apply(&self, source: &S, target: &mut StateObject) {
        let mut next = target.clone();
        next.extend(self.project(source));
        *target = next;
    }
}

/// Collects `(attribute, getter)` pairs of a `Projection`.
pub struct ProjectionBuilder<S> {
    fields: Vec<Field<S>>,
}

impl<S> ProjectionBuilder<S> {
    /// Declare one attribute.
    #[must_use]
    pub fn field(mut self, name: &'static str, get: Getter<S>) -> Self {
        self.fields.push(Field { name, get });
        self
    }

    /// Finish the declaration.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateAttribute` if an attribute was declared twice.
    pub fn build(self) -> Result<Projection<S>, StateError> {
        let mut seen = HashSet::with_capacity(self.fields.len());
        for field in &self.fields {
            if !seen.insert(field.name) {
                return Err(StateError::DuplicateAttribute(field.name));
            }
        }
        Ok(Projection {
            fields: self.fields,
        })
    }
}

impl<S> std::fmt::Debug for Projection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.attributes()).finish()
    }
}

/// Decode a payload into its typed model.
///
/// # Errors
///
/// Returns `StateError::Decode` when the payload does not match the model.
pub fn decode<T: DeserializeOwned>(what: &'static str, obj: &StateObject) -> Result<T, StateError> {
    serde_json::from_value(Value::Object(obj.clone())).map_err(|source| StateError::Decode { what, source })
}

// ============================================================================
// Value helpers
// ============================================================================

/// String attribute.
#[must_use]
pub fn string_value(s: &str) -> Value {
    Value::String(s.to_string())
}

/// Ordered list of strings.
#[must_use]
pub fn list_value<I, T>(items: I) -> Value
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    Value::Array(items.into_iter().map(|s| string_value(s.as_ref())).collect())
}

/// Set of strings: sorted and deduplicated so that equal sets compare equal.
#[must_use]
pub fn set_value<I, T>(items: I) -> Value
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let set: BTreeSet<String> = items.into_iter().map(|s| s.as_ref().to_string()).collect();
    Value::Array(set.into_iter().map(Value::String).collect())
}

/// Read a string attribute; `None` when absent, null or not a string.
#[must_use]
pub fn get_str<'a>(obj: &'a StateObject, name: &str) -> Option<&'a str> {
    obj.get(name).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Snapshot {
        id: String,
        tags: Vec<String>,
        endpoints: Vec<String>,
    }

    fn projection() -> Projection<Snapshot> {
        Projection::builder()
            .field("id", |s: &Snapshot| string_value(&s.id))
            .field("tags", |s: &Snapshot| set_value(&s.tags))
            .field("endpoints", |s: &Snapshot| list_value(&s.endpoints))
            .build()
            .unwrap_or_else(|_| Projection { fields: Vec::new() })
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            id: "c-1".into(),
            tags: vec!["prod".into(), "eu".into(), "prod".into()],
            endpoints: vec!["z:9090".into(), "a:9090".into()],
        }
    }

    #[test]
    fn duplicate_attributes_are_rejected() {
        let res = Projection::builder()
            .field("id", |s: &Snapshot| string_value(&s.id))
            .field("id", |s: &Snapshot| string_value(&s.id))
            .build();
        assert!(matches!(res, Err(StateError::DuplicateAttribute("id"))));
    }

    #[test]
    fn sets_are_sorted_and_lists_keep_order() {
        let state = projection().project(&snapshot());
        assert_eq!(state["tags"], json!(["eu", "prod"]));
        assert_eq!(state["endpoints"], json!(["z:9090", "a:9090"]));
    }

    #[test]
    fn projecting_twice_is_idempotent() {
        let p = projection();
        let snap = snapshot();
        assert_eq!(p.project(&snap), p.project(&snap));

        let mut target = StateObject::new();
        target.insert("network_policy_ids".into(), json!(["np-1"]));
        p.apply(&snap, &mut target);
        let once = target.clone();
        p.apply(&snap, &mut target);
        assert_eq!(once, target);
    }

    #[test]
    fn apply_keeps_unprojected_attributes() {
        let mut target = StateObject::new();
        target.insert("id".into(), json!("old"));
        target.insert("dedicated".into(), json!(true));

        projection().apply(&snapshot(), &mut target);

        assert_eq!(target["id"], json!("c-1"));
        assert_eq!(target["dedicated"], json!(true));
    }

    #[test]
    fn decode_reports_what_failed() {
        #[derive(serde::Deserialize)]
        #[allow(dead_code)]
        struct Plan {
            name: String,
        }
        let obj = StateObject::new();
        let err = decode::<Plan>("cluster plan", &obj).err().map(|e| e.to_string());
        assert!(err.is_some_and(|e| e.starts_with("invalid cluster plan")));
    }
}
