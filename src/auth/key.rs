//! API key model and JSON validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{FAR_FUTURE_TIMESTAMP, KEY_PREFIX_LEN};
use crate::error::{Error, Result};

/// An API key with its action and collection grants.
///
/// Keys are never mutated in place; `id` is assigned from the persistent
/// counter on create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    #[serde(default)]
    pub id: u32,
    pub value: String,
    pub description: String,
    pub actions: Vec<String>,
    pub collections: Vec<String>,
    #[serde(default = "far_future")]
    pub expires_at: u64,
}

fn far_future() -> u64 {
    FAR_FUTURE_TIMESTAMP
}

impl ApiKey {
    pub fn new(
        value: impl Into<String>,
        description: impl Into<String>,
        actions: &[&str],
        collections: &[&str],
    ) -> Self {
        Self {
            id: 0,
            value: value.into(),
            description: description.into(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            collections: collections.iter().map(|c| c.to_string()).collect(),
            expires_at: FAR_FUTURE_TIMESTAMP,
        }
    }

    pub fn with_expiry(mut self, expires_at: u64) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// First [`KEY_PREFIX_LEN`] bytes of the value, used for scoped-key lookup
    /// and for log lines that must not leak the full value.
    pub fn value_prefix(&self) -> &str {
        let end = self
            .value
            .char_indices()
            .nth(KEY_PREFIX_LEN)
            .map(|(i, _)| i)
            .unwrap_or(self.value.len());
        &self.value[..end]
    }

    /// Validates the JSON shape of a key definition before creation.
    pub fn validate(json: &Value) -> Result<()> {
        for required in ["description", "actions", "collections"] {
            if json.get(required).is_none() {
                return Err(Error::invalid(format!(
                    "Could not find a `{required}` key."
                )));
            }
        }

        if let Some(value) = json.get("value") {
            if !value.is_string() {
                return Err(Error::invalid("Key value must be a string."));
            }
        }

        if !json["description"].is_string() {
            return Err(Error::invalid("Key description must be a string."));
        }

        for (field, label) in [("actions", "actions"), ("collections", "collections")] {
            let ok = json[field]
                .as_array()
                .map(|arr| !arr.is_empty() && arr.iter().all(Value::is_string))
                .unwrap_or(false);
            if !ok {
                return Err(Error::invalid(format!(
                    "Wrong format for `{label}`. It should be an array of string."
                )));
            }
        }

        if let Some(expires_at) = json.get("expires_at") {
            if !expires_at.is_u64() {
                return Err(Error::invalid(
                    "Wrong format for `expires_at`. It should be an unsigned integer.",
                ));
            }
        }

        Ok(())
    }

    /// Parses the persisted JSON form.
    pub fn load(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::internal(format!("Error while parsing stored API key: {e}")))
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "value": self.value,
            "description": self.description,
            "actions": self.actions,
            "collections": self.collections,
            "expires_at": self.expires_at,
        })
    }

    /// Listing form: the full value is replaced by its short prefix.
    pub fn to_view_json(&self) -> Value {
        serde_json::json!({
            "id": self.id,
            "value_prefix": self.value_prefix(),
            "description": self.description,
            "actions": self.actions,
            "collections": self.collections,
            "expires_at": self.expires_at,
        })
    }
}
