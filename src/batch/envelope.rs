//! Wire format of the provider's batch endpoint.
//!
//! Request: `{"requests": [{"id", "method", "url", "headers", "body"}, ...]}`.
//! Response: `{"responses": [{"id"?, "code"?, "body", ...}, ...]}`, aligned to the requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::operation::OperationDescriptor;
use crate::domain::outcome::{ResponseBody, SubResponse};
use crate::error::{Result, SyncError};

/// One physical request carrying at most `max_batch_size` descriptors.
#[derive(Debug, Clone, Copy)]
pub struct BatchEnvelope<'a> {
    /// Position of this envelope in the run, starting at 0
    pub index: usize,
    pub operations: &'a [OperationDescriptor],
}

#[derive(Debug, Serialize)]
struct WireBatchRequest<'a> {
    requests: Vec<WireSubRequest<'a>>,
}

#[derive(Debug, Serialize)]
struct WireSubRequest<'a> {
    id: String,
    method: &'a str,
    url: &'a str,
    headers: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WireBatchResponse {
    #[serde(default)]
    responses: Vec<WireSubResponse>,
}

#[derive(Debug, Deserialize)]
struct WireSubResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    body: Option<serde_json::Value>,
}

impl<'a> BatchEnvelope<'a> {
    pub fn new(index: usize, operations: &'a [OperationDescriptor]) -> Self {
        Self { index, operations }
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Serialize the envelope, giving each descriptor its position as id.
    pub fn to_request_body(&self) -> Result<String> {
        let requests = self
            .operations
            .iter()
            .enumerate()
            .map(|(position, op)| WireSubRequest {
                id: position.to_string(),
                method: op.verb(),
                url: op.target(),
                headers: op.headers(),
                body: op.payload(),
            })
            .collect();
        Ok(serde_json::to_string(&WireBatchRequest { requests })?)
    }

    /// Split a combined response back into one `SubResponse` per descriptor, in envelope order.
    ///
    /// Sub-responses are placed by their echoed id when every one of them carries a distinct
    /// in-range id, and by position otherwise.
    pub fn demultiplex(&self, response_body: &str) -> Result<Vec<SubResponse>> {
        let wire: WireBatchResponse = serde_json::from_str(response_body)?;
        let expected = self.len();
        if wire.responses.len() != expected {
            return Err(SyncError::EnvelopeMismatch {
                expected,
                actual: wire.responses.len(),
            });
        }

        let order = echoed_order(&wire.responses, expected);
        let mut slots: Vec<Option<SubResponse>> = vec![None; expected];
        for (position, sub) in wire.responses.into_iter().enumerate() {
            let slot = order.as_ref().map_or(position, |o| o[position]);
            slots[slot] = Some(SubResponse {
                status: sub.code,
                body: ResponseBody::decode(sub.body),
            });
        }

        // Every slot is filled: either positions 0..n or a permutation of them.
        Ok(slots.into_iter().flatten().collect())
    }
}

fn echoed_order(responses: &[WireSubResponse], expected: usize) -> Option<Vec<usize>> {
    let mut seen = vec![false; expected];
    let mut order = Vec::with_capacity(responses.len());
    for sub in responses {
        let index: usize = sub.id.as_deref()?.parse().ok()?;
        if index >= expected || std::mem::replace(&mut seen[index], true) {
            return None;
        }
        order.push(index);
    }
    Some(order)
}
