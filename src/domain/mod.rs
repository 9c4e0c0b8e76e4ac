//! Value types shared by the coalescer, the executor and the sync helpers.
//!
//! Nothing here performs I/O:
//! - Operation descriptors and run ids
//! - Provider identity and credentials
//! - Sub-response bodies and fan-out item outcomes

pub mod operation;
pub mod outcome;
pub mod provider;
