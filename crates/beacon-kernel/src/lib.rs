use beacon_contracts::{CollectRequest, Event, UserId, UserPropertyValue};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("event schema load failed: {0}")]
    SchemaLoad(String),
    #[error("invalid event descriptor: {0}")]
    Descriptor(String),
    #[error("event descriptor at index {index} is malformed: {reason}")]
    Malformed { index: usize, reason: String },
}

/// Structural shape every event descriptor must have: an object whose keys
/// come from `name`/`params` and whose values are objects or strings.
pub fn event_descriptor_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "propertyNames": { "enum": ["name", "params"] },
            "additionalProperties": { "type": ["object", "string"] }
        }
    })
}

/// Gate for raw event descriptors. Nothing is sent unless every descriptor
/// passes, and the accepted events keep their input order.
pub fn validate_events(descriptors: &[Value]) -> Result<Vec<Event>, ValidationError> {
    let schema = event_descriptor_schema();
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| ValidationError::SchemaLoad(e.to_string()))?;
    let instance = Value::Array(descriptors.to_vec());
    if let Err(first) = validator.validate(&instance) {
        return Err(ValidationError::Descriptor(first.to_string()));
    }

    descriptors
        .iter()
        .enumerate()
        .map(|(index, descriptor)| {
            serde_json::from_value(descriptor.clone()).map_err(|e| ValidationError::Malformed {
                index,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// String form of a raw user property value. Strings pass through verbatim,
/// everything else is rendered as compact JSON.
pub fn property_string(value: &Value) -> String {
    match value {
        Value::String(v) => v.clone(),
        other => other.to_string(),
    }
}

pub fn encode_user_properties(
    properties: &Map<String, Value>,
) -> BTreeMap<String, UserPropertyValue> {
    properties
        .iter()
        .map(|(name, value)| {
            (
                name.clone(),
                UserPropertyValue {
                    value: property_string(value),
                },
            )
        })
        .collect()
}

/// Shallow merge: incoming keys overwrite, untouched keys are retained.
pub fn merge_user_properties(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (name, value) in incoming {
        target.insert(name, value);
    }
}

pub fn build_collect_request(
    client_id: &str,
    events: Vec<Event>,
    user_id: Option<&UserId>,
    user_properties: &Map<String, Value>,
) -> CollectRequest {
    CollectRequest {
        client_id: client_id.to_string(),
        events,
        user_id: user_id.map(|v| v.to_string()),
        user_properties: if user_properties.is_empty() {
            None
        } else {
            Some(encode_user_properties(user_properties))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn accepts_name_and_params_descriptors_in_order() {
        let events =
            validate_events(&[json!({"name": "a"}), json!({"name": "b", "params": {"x": 1}})])
                .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Event::new("a"));
        assert_eq!(events[1].name, "b");
        assert_eq!(events[1].params, Some(props(json!({"x": 1}))));
    }

    #[test]
    fn rejects_unknown_descriptor_keys() {
        let err = validate_events(&[json!({"foo": "bad"})]).unwrap_err();
        assert!(matches!(err, ValidationError::Descriptor(_)));
    }

    #[test]
    fn rejects_non_object_or_string_values() {
        let err = validate_events(&[json!({"name": "a", "params": 5})]).unwrap_err();
        assert!(matches!(err, ValidationError::Descriptor(_)));
        let err = validate_events(&[json!("login")]).unwrap_err();
        assert!(matches!(err, ValidationError::Descriptor(_)));
    }

    #[test]
    fn one_bad_descriptor_rejects_the_whole_list() {
        let err = validate_events(&[json!({"name": "ok"}), json!({"nam": "typo"})]).unwrap_err();
        assert!(matches!(err, ValidationError::Descriptor(_)));
    }

    #[test]
    fn structurally_valid_but_undecodable_descriptors_are_rejected() {
        let err = validate_events(&[json!({"params": {"x": 1}})]).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed { index: 0, .. }));
        let err =
            validate_events(&[json!({"name": "a"}), json!({"name": {"nested": "x"}})]).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed { index: 1, .. }));
    }

    #[test]
    fn empty_list_is_accepted() {
        assert!(validate_events(&[]).unwrap().is_empty());
    }

    #[test]
    fn property_values_are_stringified() {
        assert_eq!(property_string(&json!("en")), "en");
        assert_eq!(property_string(&json!(42)), "42");
        assert_eq!(property_string(&json!(true)), "true");
        assert_eq!(property_string(&Value::Null), "null");
        assert_eq!(property_string(&json!([1, 2])), "[1,2]");
    }

    #[test]
    fn merge_overwrites_colliding_keys_and_keeps_others() {
        let mut acc = Map::new();
        merge_user_properties(&mut acc, props(json!({"language": "en", "plan": "free"})));
        merge_user_properties(&mut acc, props(json!({"language": "de", "tier": 2})));
        assert_eq!(
            Value::Object(acc.clone()),
            json!({"language": "de", "plan": "free", "tier": 2})
        );
        merge_user_properties(&mut acc, props(json!({"language": "de", "tier": 2})));
        assert_eq!(
            Value::Object(acc),
            json!({"language": "de", "plan": "free", "tier": 2})
        );
    }

    #[test]
    fn body_includes_identity_only_when_set() {
        let bare = build_collect_request("cid", vec![Event::new("a")], None, &Map::new());
        assert_eq!(
            serde_json::to_value(&bare).unwrap(),
            json!({"client_id": "cid", "events": [{"name": "a"}]})
        );

        let uid = UserId::Number(77);
        let full = build_collect_request(
            "cid",
            vec![Event::new("a")],
            Some(&uid),
            &props(json!({"language": "en", "age": 30})),
        );
        assert_eq!(
            serde_json::to_value(&full).unwrap(),
            json!({
                "client_id": "cid",
                "events": [{"name": "a"}],
                "user_id": "77",
                "user_properties": {
                    "age": {"value": "30"},
                    "language": {"value": "en"}
                }
            })
        );
    }
}
