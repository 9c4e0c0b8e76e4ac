//! Operation descriptors: one planned remote call, before it is grouped into an envelope.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for one coalescer or fan-out invocation, used to correlate log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        RunId(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for RunId {
    fn from(uuid: Uuid) -> Self {
        RunId(uuid)
    }
}

impl std::ops::Deref for RunId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// One logical remote operation (e.g. "get record 42").
///
/// Immutable once built: the builder methods consume `self`. The positional id a
/// descriptor gets inside an envelope is assigned by the coalescer, not stored here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationDescriptor {
    target: String,
    verb: String,
    headers: BTreeMap<String, String>,
    payload: Option<serde_json::Value>,
}

impl OperationDescriptor {
    /// Create a descriptor for `verb` against `target` (a provider-relative URL).
    pub fn new(verb: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            verb: verb.into().to_uppercase(),
            headers: BTreeMap::new(),
            payload: None,
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new("GET", target)
    }

    pub fn post(target: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::new("POST", target).with_payload(payload)
    }

    /// PATCH with a JSON-patch document, the shape record updates take.
    pub fn patch(target: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::new("PATCH", target)
            .with_header("Content-Type", "application/json-patch+json")
            .with_payload(payload)
    }

    pub fn delete(target: impl Into<String>) -> Self {
        Self::new("DELETE", target)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.payload.as_ref()
    }
}
