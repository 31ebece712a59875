//! Wire models for the messaging platform API
//!
//! Every endpoint answers with the same envelope:
//! `{"status": "success" | "error", "message"?: string, "data"?: any}`.

use crate::domain::{ApiError, FieldMap, RemoteId};
use serde::Deserialize;
use serde_json::Value;

/// Response envelope shared by all endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// One entry of `data.custom_fields`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CustomField {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }

    /// Error envelope whose message reports throttling
    pub fn is_rate_limited(&self) -> bool {
        if !self.status.eq_ignore_ascii_case("error") {
            return false;
        }
        self.message.as_deref().is_some_and(|message| {
            let message = message.to_ascii_lowercase();
            message.contains("rate limit") || message.contains("too many requests")
        })
    }

    /// The subscriber payload, if the envelope carries a non-empty one
    ///
    /// An array payload resolves to its first element.
    fn subscriber(&self) -> Option<&Value> {
        if !self.is_success() {
            return None;
        }
        match self.data.as_ref()? {
            Value::Null => None,
            Value::Object(map) if map.is_empty() => None,
            Value::Array(items) => items.first().filter(|item| !item.is_null()),
            other => Some(other),
        }
    }

    /// Remote identity from a lookup response
    ///
    /// `Ok(None)` means no subscriber matched.
    ///
    /// # Errors
    ///
    /// `MalformedResponse` when the payload is not an object
    pub fn identity(&self) -> Result<Option<RemoteId>, ApiError> {
        let Some(subscriber) = self.subscriber() else {
            return Ok(None);
        };
        let Some(object) = subscriber.as_object() else {
            return Err(ApiError::MalformedResponse(format!(
                "expected subscriber object, got {}",
                json_type(subscriber)
            )));
        };
        Ok(object.get("id").and_then(RemoteId::from_json))
    }

    /// Custom fields from a subscriber info response
    ///
    /// `Ok(None)` means the subscriber has no data; a missing `custom_fields`
    /// entry is an empty list.
    ///
    /// # Errors
    ///
    /// `MalformedResponse` when the payload or `custom_fields` has the wrong shape
    pub fn custom_fields(&self) -> Result<Option<Vec<CustomField>>, ApiError> {
        let Some(subscriber) = self.subscriber() else {
            return Ok(None);
        };
        let Some(raw) = subscriber.get("custom_fields") else {
            return if subscriber.is_object() {
                Ok(Some(Vec::new()))
            } else {
                Err(ApiError::MalformedResponse(format!(
                    "expected subscriber object, got {}",
                    json_type(subscriber)
                )))
            };
        };
        if raw.is_null() {
            return Ok(Some(Vec::new()));
        }
        serde_json::from_value(raw.clone())
            .map(Some)
            .map_err(|e| ApiError::MalformedResponse(format!("custom_fields: {e}")))
    }
}

/// Pick the selected, non-null fields
///
/// An empty selection keeps every field. When a name repeats, the first
/// occurrence wins.
pub fn select_fields(fields: Vec<CustomField>, selection: &[String]) -> FieldMap {
    let mut selected = FieldMap::new();
    for field in fields {
        if field.value.is_null() {
            continue;
        }
        if !selection.is_empty() && !selection.iter().any(|name| name == &field.name) {
            continue;
        }
        selected.entry(field.name).or_insert(field.value);
    }
    selected
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
