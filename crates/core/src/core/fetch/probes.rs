//! Probe hooks on the fetch stage.
//!
//! Observers can watch instructions leaving fetch and requests entering
//! the memory system without the stage knowing who is listening.

use crate::core::inst::DynInst;
use crate::mem::packet::Request;

/// Notification hooks invoked by the fetch stage.
pub trait FetchProbes {
    /// A dynamic instruction was fetched and queued toward decode.
    fn on_inst_fetched(&mut self, _inst: &DynInst) {}

    /// A demand fetch request was sent (or adopted) toward the cache.
    fn on_fetch_request_sent(&mut self, _req: &Request) {}
}

/// Probe sink that ignores every notification.
pub struct NullProbes;

impl FetchProbes for NullProbes {}
