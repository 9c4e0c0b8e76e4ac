//! Counters emitted through the `metrics` facade.
//!
//! The library never installs a recorder; without one these calls are no-ops. Labels are
//! kept low-cardinality:
//! - `broadside_envelopes_total{outcome}`: one per batch round trip (`ok`, or an error kind)
//! - `broadside_subresponses_total{body}`: one per sub-response (`decoded` or `raw`)
//! - `broadside_fanout_items_total{outcome}`: one per finished fan-out item

use ::metrics::counter;

use crate::domain::outcome::ResponseBody;

pub const ENVELOPES_TOTAL: &str = "broadside_envelopes_total";
pub const SUBRESPONSES_TOTAL: &str = "broadside_subresponses_total";
pub const FANOUT_ITEMS_TOTAL: &str = "broadside_fanout_items_total";

pub(crate) fn record_envelope(outcome: &'static str) {
    counter!(ENVELOPES_TOTAL, "outcome" => outcome).increment(1);
}

pub(crate) fn record_subresponse(body: &ResponseBody) {
    let kind = if body.is_decoded() { "decoded" } else { "raw" };
    counter!(SUBRESPONSES_TOTAL, "body" => kind).increment(1);
}

pub(crate) fn record_item(outcome: &'static str) {
    counter!(FANOUT_ITEMS_TOTAL, "outcome" => outcome).increment(1);
}
