//! Request and packet value types.
//!
//! A `Request` describes one instruction-fetch access: the virtual block
//! address, the fetching PC, and (once translated) the physical address.
//! Requests carry a stage-unique identity so that late completions can be
//! matched against the access the stage is actually waiting for — a
//! response whose request no longer matches is stale and must be discarded.
//! A `Packet` pairs a request with a command and, for responses, the block
//! bytes.

use crate::common::{PhysAddr, ThreadId, VirtAddr};

/// Identity of one in-flight request.
///
/// Allocated by the fetch stage and never reused within a run. Equality of
/// ids is the sole notion of "the same access" across squashes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReqId(pub u64);

/// One instruction-fetch access.
#[derive(Clone, Debug)]
pub struct Request {
    id: ReqId,
    tid: ThreadId,
    vaddr: VirtAddr,
    size: usize,
    /// PC of the instruction that triggered the access.
    pc: u64,
    paddr: Option<PhysAddr>,
}

impl Request {
    /// Creates a new untranslated fetch request.
    pub fn new(id: ReqId, tid: ThreadId, vaddr: VirtAddr, size: usize, pc: u64) -> Self {
        Self {
            id,
            tid,
            vaddr,
            size,
            pc,
            paddr: None,
        }
    }

    /// Returns the request identity.
    pub fn id(&self) -> ReqId {
        self.id
    }

    /// Returns the owning thread.
    pub fn tid(&self) -> ThreadId {
        self.tid
    }

    /// Returns the virtual address of the accessed block.
    pub fn vaddr(&self) -> VirtAddr {
        self.vaddr
    }

    /// Returns the access size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the PC that triggered the access.
    pub fn pc(&self) -> u64 {
        self.pc
    }

    /// Returns the translated physical address, if translation completed.
    pub fn paddr(&self) -> Option<PhysAddr> {
        self.paddr
    }

    /// Whether the request already carries a valid physical address.
    pub fn has_paddr(&self) -> bool {
        self.paddr.is_some()
    }

    /// Records the translated physical address.
    pub fn set_paddr(&mut self, paddr: PhysAddr) {
        self.paddr = Some(paddr);
    }
}

/// Packet command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemCmd {
    /// Read request toward the cache.
    ReadReq,
    /// Read response from the cache.
    ReadResp,
}

/// One packet on the instruction port.
#[derive(Clone, Debug)]
pub struct Packet {
    /// The request this packet belongs to.
    pub req: Request,
    /// Packet command.
    pub cmd: MemCmd,
    /// Block bytes; empty for requests, `req.size()` bytes for responses.
    pub data: Vec<u8>,
}

impl Packet {
    /// Builds a read-request packet for a translated request.
    pub fn read_req(req: Request) -> Self {
        Self {
            req,
            cmd: MemCmd::ReadReq,
            data: Vec::new(),
        }
    }

    /// Turns a request packet into its response, attaching the block bytes.
    pub fn into_response(mut self, data: Vec<u8>) -> Self {
        debug_assert_eq!(self.cmd, MemCmd::ReadReq);
        debug_assert_eq!(data.len(), self.req.size());
        self.cmd = MemCmd::ReadResp;
        self.data = data;
        self
    }
}
