use fdip_core::mem::packet::{Packet, ReqId};
use fdip_core::mem::port::TimingPort;

/// Controllable instruction-cache port.
///
/// Accepted packets are recorded in `sent`; the test decides when (and
/// whether) each one becomes a response. Setting `accept` to false makes
/// the port refuse packets, modeling exhausted MSHRs.
pub struct MockIcache {
    mem: Vec<u8>,
    base: u64,
    /// Whether `send_timing` accepts packets.
    pub accept: bool,
    /// Accepted request packets, oldest first.
    pub sent: Vec<Packet>,
}

impl MockIcache {
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            mem: vec![0; size],
            base,
            accept: true,
            sent: Vec::new(),
        }
    }

    /// Writes `data` into the backing store at physical address `paddr`.
    pub fn load(&mut self, paddr: u64, data: &[u8]) {
        let off = (paddr - self.base) as usize;
        self.mem[off..off + data.len()].copy_from_slice(data);
    }

    /// Removes the oldest accepted packet and turns it into a response
    /// with bytes from the backing store.
    pub fn make_response(&mut self) -> Packet {
        let pkt = self.sent.remove(0);
        self.response_for(pkt)
    }

    /// Removes the accepted packet with the given request id and turns
    /// it into a response.
    pub fn make_response_for(&mut self, id: ReqId) -> Packet {
        let idx = self
            .sent
            .iter()
            .position(|p| p.req.id() == id)
            .expect("no accepted packet with that request id");
        let pkt = self.sent.remove(idx);
        self.response_for(pkt)
    }

    fn response_for(&self, pkt: Packet) -> Packet {
        let paddr = pkt.req.paddr().expect("accepted packet has a paddr").val();
        let off = (paddr - self.base) as usize;
        let size = pkt.req.size();
        let data = self.mem[off..off + size].to_vec();
        pkt.into_response(data)
    }
}

impl TimingPort for MockIcache {
    fn send_timing(&mut self, pkt: Packet) -> Result<(), Packet> {
        if !self.accept {
            return Err(pkt);
        }
        self.sent.push(pkt);
        Ok(())
    }
}
