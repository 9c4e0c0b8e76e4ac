//! Per-operation results: decoded sub-responses and fan-out item outcomes.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Body of one sub-response inside a batch envelope.
///
/// Decoding never fails the envelope: a body that is not valid JSON is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResponseBody {
    Decoded(serde_json::Value),
    Raw(String),
}

impl ResponseBody {
    /// Decode a sub-response body as it appears on the wire.
    ///
    /// The provider sends bodies as JSON-encoded strings; those are parsed, falling back
    /// to the raw string. A body that is already structured is taken as decoded. A
    /// missing body becomes an empty raw value.
    pub fn decode(wire: Option<serde_json::Value>) -> Self {
        match wire {
            Some(serde_json::Value::String(text)) => match serde_json::from_str(&text) {
                Ok(value) => ResponseBody::Decoded(value),
                Err(e) => {
                    tracing::debug!(error = %e, body_len = text.len(), "Sub-response body is not JSON, keeping raw");
                    ResponseBody::Raw(text)
                }
            },
            Some(serde_json::Value::Null) | None => ResponseBody::Raw(String::new()),
            Some(value) => ResponseBody::Decoded(value),
        }
    }

    pub fn is_decoded(&self) -> bool {
        matches!(self, ResponseBody::Decoded(_))
    }

    pub fn as_decoded(&self) -> Option<&serde_json::Value> {
        match self {
            ResponseBody::Decoded(value) => Some(value),
            ResponseBody::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&str> {
        match self {
            ResponseBody::Decoded(_) => None,
            ResponseBody::Raw(text) => Some(text),
        }
    }

    /// Deserialize a decoded body into `T`. Raw bodies and shape mismatches yield `None`.
    pub fn parse<T: DeserializeOwned>(&self) -> Option<T> {
        self.as_decoded()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

/// One sub-response, positionally aligned to the descriptor that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubResponse {
    /// Status code of the sub-request, when the provider reports one
    pub status: Option<u16>,
    pub body: ResponseBody,
}

impl SubResponse {
    /// A sub-response with no status is treated as successful; the provider omits it on some paths.
    pub fn is_success(&self) -> bool {
        self.status.is_none_or(|s| (200..300).contains(&s))
    }
}

/// Terminal state of one fan-out item: `pending → succeeded | failed | timed-out`.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome<R> {
    Succeeded(R),
    /// Processor returned an error; carries its rendered message
    Failed(String),
    /// Processor did not settle within the item timeout
    TimedOut(Duration),
}

impl<R> ItemOutcome<R> {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Succeeded(_))
    }

    pub fn succeeded(&self) -> Option<&R> {
        match self {
            ItemOutcome::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    /// Collapse to the caller-facing shape: a value, or `None` for skipped/failed.
    pub fn into_option(self) -> Option<R> {
        match self {
            ItemOutcome::Succeeded(value) => Some(value),
            ItemOutcome::Failed(_) | ItemOutcome::TimedOut(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ItemOutcome::Succeeded(_) => "succeeded",
            ItemOutcome::Failed(_) => "failed",
            ItemOutcome::TimedOut(_) => "timed_out",
        }
    }
}

/// Counts over a finished fan-out run, for callers that report rather than crash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl OutcomeSummary {
    pub fn from_outcomes<R>(outcomes: &[ItemOutcome<R>]) -> Self {
        outcomes
            .iter()
            .fold(OutcomeSummary::default(), |mut acc, outcome| {
                match outcome {
                    ItemOutcome::Succeeded(_) => acc.succeeded += 1,
                    ItemOutcome::Failed(_) => acc.failed += 1,
                    ItemOutcome::TimedOut(_) => acc.timed_out += 1,
                }
                acc
            })
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_string_body() {
        let body = ResponseBody::decode(Some(json!(r#"{"id": 5}"#)));
        assert_eq!(body, ResponseBody::Decoded(json!({"id": 5})));
        assert_eq!(body.parse::<serde_json::Map<String, serde_json::Value>>().unwrap()["id"], 5);
    }

    #[test]
    fn test_decode_falls_back_to_raw() {
        let body = ResponseBody::decode(Some(json!("<html>gateway error</html>")));
        assert_eq!(body.as_raw(), Some("<html>gateway error</html>"));
        assert!(body.parse::<serde_json::Value>().is_none());
    }

    #[test]
    fn test_decode_structured_and_missing() {
        assert!(ResponseBody::decode(Some(json!({"a": 1}))).is_decoded());
        assert_eq!(ResponseBody::decode(None), ResponseBody::Raw(String::new()));
        assert_eq!(
            ResponseBody::decode(Some(serde_json::Value::Null)),
            ResponseBody::Raw(String::new())
        );
    }

    #[test]
    fn test_summary_counts() {
        let outcomes = vec![
            ItemOutcome::Succeeded(1),
            ItemOutcome::Failed("x".into()),
            ItemOutcome::TimedOut(Duration::from_millis(1)),
            ItemOutcome::Succeeded(4),
        ];
        let summary = OutcomeSummary::from_outcomes(&outcomes);
        assert_eq!(
            summary,
            OutcomeSummary {
                succeeded: 2,
                failed: 1,
                timed_out: 1
            }
        );
        assert_eq!(summary.total(), 4);

        let values: Vec<_> = outcomes.into_iter().map(ItemOutcome::into_option).collect();
        assert_eq!(values, vec![Some(1), None, None, Some(4)]);
    }
}
