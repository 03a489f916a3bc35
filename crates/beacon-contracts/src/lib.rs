use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_COLLECT_BASE_URL: &str = "https://www.google-analytics.com";

/// Identifier of a known actor. Bots usually hand out numeric ids, other
/// sources use opaque strings; both serialize as a string on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Number(v) => write!(f, "{v}"),
            UserId::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        UserId::Number(value)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        UserId::Text(value)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Event {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = Some(params);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserPropertyValue {
    pub value: String,
}

/// Body of a Measurement Protocol collect request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectRequest {
    pub client_id: String,
    pub events: Vec<Event>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_properties: Option<BTreeMap<String, UserPropertyValue>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationMessage {
    #[serde(default)]
    pub field_path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub validation_code: Option<String>,
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.validation_code.as_deref().unwrap_or("UNKNOWN"),
            self.description.as_deref().unwrap_or("")
        )?;
        if let Some(path) = &self.field_path {
            write!(f, " ({path})")?;
        }
        Ok(())
    }
}

/// Only `validationMessages` is read from a debug-mode response.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DebugResponse {
    #[serde(rename = "validationMessages", default)]
    pub validation_messages: Vec<ValidationMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sender {
    pub id: UserId,
    #[serde(default)]
    pub language_code: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// The slice of an inbound bot message the analytics middleware reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InboundMessage {
    #[serde(default)]
    pub from: Option<Sender>,
    #[serde(default)]
    pub text: Option<String>,
}

impl InboundMessage {
    pub fn sender_id(&self) -> Option<&UserId> {
        self.from.as_ref().map(|s| &s.id)
    }

    pub fn locale(&self) -> Option<&str> {
        self.from.as_ref().and_then(|s| s.language_code.as_deref())
    }
}
