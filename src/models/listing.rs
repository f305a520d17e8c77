//! Request/response bodies of the remote object-storage REST API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST object/list/{bucket}`.
#[derive(Serialize, Debug)]
pub struct ListRequest<'a> {
    pub prefix: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<&'a str>,
}

/// Body of `DELETE object/{bucket}`.
#[derive(Serialize, Debug)]
pub struct BatchDeleteRequest<'a> {
    pub prefixes: &'a [String],
}

/// One entry of a bucket listing. Folder placeholders come back without
/// metadata.
#[derive(Deserialize, Debug, Clone)]
pub struct ListEntry {
    pub name: String,
    #[serde(default)]
    pub metadata: Option<EntryMetadata>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct EntryMetadata {
    #[serde(default)]
    pub size: u64,
}

impl ListEntry {
    pub fn size(&self) -> u64 {
        self.metadata.as_ref().map_or(0, |m| m.size)
    }
}

/// The `error`/`message` pair a provider embeds in an otherwise successful
/// HTTP response. Returns `None` when `body` carries no (truthy) error.
pub fn provider_failure(body: &Value) -> Option<(String, String)> {
    let error = match body.get("error")? {
        Value::Null | Value::Bool(false) => return None,
        Value::String(s) if s.is_empty() => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some((error, message))
}
