//! Timing port capability traits.
//!
//! The original expressed the cache connection as a port class hierarchy.
//! Here the same contract is a pair of small capability traits held by
//! composition: a sender that may refuse a packet, and a client that is
//! handed responses and retry notifications.

use crate::mem::packet::Packet;

/// Non-blocking sender side of a timing port.
pub trait TimingPort {
    /// Attempts to send a packet without blocking.
    ///
    /// Returns `Ok(())` when the packet was accepted. When the receiver has
    /// no buffer space the packet is handed back via `Err` and the receiver
    /// promises a later retry notification.
    fn send_timing(&mut self, pkt: Packet) -> Result<(), Packet>;
}

/// Receiver side of a timing port.
///
/// Implemented by whoever owns the fetch stage; the callbacks forward into
/// the stage together with the collaborators it needs.
pub trait TimingClient {
    /// Delivers a response packet.
    fn on_timing_resp(&mut self, pkt: Packet);

    /// Signals that a previously refused packet may be retried.
    fn on_req_retry(&mut self);
}
