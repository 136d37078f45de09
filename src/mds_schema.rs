//! Attribute schemas of resources and data sources.
//!
//! A schema declares which attributes exist, which of them the user sets and
//! which the provider computes. It validates configuration payloads, fills
//! static defaults and tells which attribute changes force a replacement.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::mds_diagnostics::Diagnostics;
use crate::mds_state::StateObject;

/// Type of an attribute value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "attributes", rename_all = "snake_case")]
pub enum AttributeKind {
    /// A string.
    String,
    /// A boolean.
    Bool,
    /// An unordered set of strings.
    StringSet,
    /// An ordered list of strings.
    StringList,
    /// A single nested object.
    Object(BTreeMap<&'static str, Attribute>),
    /// An ordered list of nested objects.
    ListNested(BTreeMap<&'static str, Attribute>),
}

/// One attribute declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    /// Value type.
    pub kind: AttributeKind,
    /// Must be set in configuration.
    pub required: bool,
    /// May be set in configuration.
    pub optional: bool,
    /// Filled by the provider.
    pub computed: bool,
    /// Human-readable description (markdown).
    pub description: &'static str,
    /// Static default applied when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Keep the prior state value while the new one is unknown.
    pub use_state_for_unknown: bool,
    /// Changing the value forces the resource to be replaced.
    pub requires_replace: bool,
}

impl Attribute {
    const fn with_flags(kind: AttributeKind, required: bool, optional: bool, computed: bool) -> Self {
        Self {
            kind,
            required,
            optional,
            computed,
            description: "",
            default: None,
            use_state_for_unknown: false,
            requires_replace: false,
        }
    }

    /// Attribute the user must set.
    #[must_use]
    pub const fn required(kind: AttributeKind) -> Self {
        Self::with_flags(kind, true, false, false)
    }

    /// Attribute the user may set.
    #[must_use]
    pub const fn optional(kind: AttributeKind) -> Self {
        Self::with_flags(kind, false, true, false)
    }

    /// Attribute only the provider sets.
    #[must_use]
    pub const fn computed(kind: AttributeKind) -> Self {
        Self::with_flags(kind, false, false, true)
    }

    /// Attribute the user may set, otherwise filled by the provider.
    #[must_use]
    pub const fn optional_computed(kind: AttributeKind) -> Self {
        Self::with_flags(kind, false, true, true)
    }

    /// Attach a description.
    #[must_use]
    pub const fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Attach a static default.
    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Keep the prior state value while unknown.
    #[must_use]
    pub const fn use_state_for_unknown(mut self) -> Self {
        self.use_state_for_unknown = true;
        self
    }

    /// Force replacement on change.
    #[must_use]
    pub const fn requires_replace(mut self) -> Self {
        self.requires_replace = true;
        self
    }
}

/// Schema of a resource or data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Schema {
    /// Human-readable description (markdown).
    pub description: String,
    /// Attributes by name.
    pub attributes: BTreeMap<&'static str, Attribute>,
}

impl Schema {
    /// Create an empty schema.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Declare an attribute.
    #[must_use]
    pub fn attribute(mut self, name: &'static str, attr: Attribute) -> Self {
        self.attributes.insert(name, attr);
        self
    }

    /// Validate a configuration payload.
    ///
    /// Reports unknown attributes, missing required attributes and values of
    /// the wrong type as errors. Null values count as unset. A value set on a
    /// provider-only attribute is a warning; the provider overwrites it.
    #[must_use]
    pub fn validate_config(&self, config: &StateObject) -> Diagnostics {
        let mut diags = Diagnostics::new();
        validate_object(&self.attributes, config, "", &mut diags);

        for (name, attr) in &self.attributes {
            let read_only = attr.computed && !attr.optional && !attr.required;
            if read_only && config.get(*name).is_some_and(|v| !v.is_null()) {
                diags.add_warning(
                    "Value for computed attribute",
                    format!("\"{name}\" is set by the provider; the configured value is ignored."),
                );
            }
        }
        diags
    }

    /// Copy prior values into `plan` for attributes marked
    /// `use_state_for_unknown` that the plan leaves unset.
    pub fn carry_unknown_from_state(&self, prior: &StateObject, plan: &mut StateObject) {
        for (name, attr) in &self.attributes {
            if !attr.use_state_for_unknown || plan.get(*name).is_some_and(|v| !v.is_null()) {
                continue;
            }
            if let Some(value) = prior.get(*name).filter(|v| !v.is_null()) {
                plan.insert((*name).to_string(), value.clone());
            }
        }
    }

    /// Fill static defaults of unset attributes.
    pub fn apply_defaults(&self, config: &mut StateObject) {
        for (name, attr) in &self.attributes {
            let Some(default) = &attr.default else {
                continue;
            };
            let unset = config.get(*name).is_none_or(Value::is_null);
            if unset {
                config.insert((*name).to_string(), default.clone());
            }
        }
    }

    /// Names of replace-forcing attributes whose value differs between `prior` and `plan`.
    #[must_use]
    pub fn requires_replace(&self, prior: &StateObject, plan: &StateObject) -> Vec<&'static str> {
        self.attributes
            .iter()
            .filter(|(_, attr)| attr.requires_replace)
            .filter(|(name, _)| prior.get(**name) != plan.get(**name))
            .map(|(name, _)| *name)
            .collect()
    }
}

fn validate_object(
    attributes: &BTreeMap<&'static str, Attribute>,
    config: &StateObject,
    prefix: &str,
    diags: &mut Diagnostics,
) {
    for key in config.keys() {
        if !attributes.contains_key(key.as_str()) {
            diags.add_error(
                "Unsupported argument",
                format!("An argument named \"{prefix}{key}\" is not expected here."),
            );
        }
    }

    for (name, attr) in attributes {
        let path = format!("{prefix}{name}");
        match config.get(*name) {
            None | Some(Value::Null) => {
                if attr.required {
                    diags.add_error(
                        "Missing required argument",
                        format!("The argument \"{path}\" is required, but no definition was found."),
                    );
                }
            }
            Some(value) => validate_value(&attr.kind, value, &path, diags),
        }
    }
}

fn validate_value(kind: &AttributeKind, value: &Value, path: &str, diags: &mut Diagnostics) {
    let ok = match (kind, value) {
        (AttributeKind::String, Value::String(_)) | (AttributeKind::Bool, Value::Bool(_)) => true,
        (AttributeKind::StringSet | AttributeKind::StringList, Value::Array(items)) => {
            items.iter().all(Value::is_string)
        }
        (AttributeKind::Object(nested), Value::Object(obj)) => {
            validate_object(nested, obj, &format!("{path}."), diags);
            true
        }
        (AttributeKind::ListNested(nested), Value::Array(items)) => {
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Object(obj) => validate_object(nested, obj, &format!("{path}[{i}]."), diags),
                    _ => diags.add_error(
                        "Incorrect attribute value type",
                        format!("Inappropriate value for \"{path}[{i}]\": object required."),
                    ),
                }
            }
            true
        }
        _ => false,
    };

    if !ok {
        diags.add_error(
            "Incorrect attribute value type",
            format!("Inappropriate value for \"{path}\": {} required.", kind_name(kind)),
        );
    }
}

const fn kind_name(kind: &AttributeKind) -> &'static str {
    match kind {
        AttributeKind::String => "string",
        AttributeKind::Bool => "bool",
        AttributeKind::StringSet => "set of string",
        AttributeKind::StringList => "list of string",
        AttributeKind::Object(_) => "object",
        AttributeKind::ListNested(_) => "list of object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new("test")
            .attribute("name", Attribute::required(AttributeKind::String))
            .attribute(
                "service_type",
                Attribute::optional_computed(AttributeKind::String).with_default(json!("RABBITMQ")),
            )
            .attribute("tags", Attribute::optional(AttributeKind::StringSet))
            .attribute(
                "region",
                Attribute::required(AttributeKind::String).requires_replace(),
            )
            .attribute(
                "id",
                Attribute::computed(AttributeKind::String)
                    .describe("ID.")
                    .use_state_for_unknown(),
            )
            .attribute("status", Attribute::computed(AttributeKind::String))
    }

    fn obj(value: Value) -> StateObject {
        match value {
            Value::Object(obj) => obj,
            _ => StateObject::new(),
        }
    }

    #[test]
    fn valid_config_has_no_diagnostics() {
        let config = obj(json!({"name": "orders", "region": "eu-west-2", "tags": ["a"]}));
        assert!(schema().validate_config(&config).is_empty());
    }

    #[test]
    fn missing_required_and_unknown_attributes_are_errors() {
        let config = obj(json!({"name": null, "region": "eu-west-2", "colour": "blue"}));
        let diags = schema().validate_config(&config);
        let summaries: Vec<_> = diags.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(summaries, vec!["Unsupported argument", "Missing required argument"]);
    }

    #[test]
    fn wrong_types_are_reported_with_path() {
        let config = obj(json!({"name": "orders", "region": "eu", "tags": [1, 2]}));
        let diags = schema().validate_config(&config);
        assert!(diags.has_error());
        assert!(diags.to_string().contains("\"tags\": set of string required"));
    }

    #[test]
    fn defaults_fill_only_unset_values() {
        let mut config = obj(json!({"name": "orders", "service_type": null}));
        schema().apply_defaults(&mut config);
        assert_eq!(config["service_type"], json!("RABBITMQ"));

        let mut explicit = obj(json!({"service_type": "POSTGRES"}));
        schema().apply_defaults(&mut explicit);
        assert_eq!(explicit["service_type"], json!("POSTGRES"));
    }

    #[test]
    fn computed_values_in_config_only_warn() {
        let config = obj(json!({"name": "orders", "region": "eu", "status": "READY"}));
        let diags = schema().validate_config(&config);
        assert!(!diags.is_empty());
        assert!(!diags.has_error());
        assert!(diags.to_string().starts_with("warning: Value for computed attribute"));
    }

    #[test]
    fn unknown_values_are_carried_from_prior_state() {
        let prior = obj(json!({"id": "c-1", "status": "READY", "name": "orders"}));
        let mut plan = obj(json!({"id": null, "name": "orders", "tags": ["a"]}));
        schema().carry_unknown_from_state(&prior, &mut plan);
        assert_eq!(plan["id"], json!("c-1"));
        assert!(!plan.contains_key("status"));

        let mut explicit = obj(json!({"id": "c-2"}));
        schema().carry_unknown_from_state(&prior, &mut explicit);
        assert_eq!(explicit["id"], json!("c-2"));
    }

    #[test]
    fn schema_serializes_descriptions_and_kinds() {
        let value = serde_json::to_value(schema()).unwrap_or_default();
        assert_eq!(value["attributes"]["id"]["description"], json!("ID."));
        assert_eq!(value["attributes"]["tags"]["kind"]["type"], json!("string_set"));
        assert!(value["attributes"]["name"].get("default").is_none());
    }

    #[test]
    fn region_change_requires_replace() {
        let prior = obj(json!({"name": "orders", "region": "eu-west-2"}));
        let plan = obj(json!({"name": "orders", "region": "us-east-2"}));
        assert_eq!(schema().requires_replace(&prior, &plan), vec!["region"]);
        assert!(schema().requires_replace(&prior, &prior).is_empty());
    }
}
