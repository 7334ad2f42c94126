//! SMT fetch arbitration.
//!
//! Selects which hardware thread fetches in the current cycle. A thread is
//! eligible when it is Running, has just completed a cache access, or is
//! Idle; everything else is waiting on some event and cannot make
//! progress this cycle.

use std::collections::VecDeque;

use crate::common::ThreadId;
use crate::config::SmtFetchPolicy;
use crate::core::fetch::signals::IewComm;
use crate::core::fetch::ThreadStatus;

/// Whether a thread in `status` may be handed the fetch slot.
pub fn is_eligible(status: ThreadStatus) -> bool {
    matches!(
        status,
        ThreadStatus::Running | ThreadStatus::IcacheAccessComplete | ThreadStatus::Idle
    )
}

/// Thread selection state for the fetch stage.
pub struct SmtArbiter {
    /// Round-robin priority order; the front has highest priority.
    priority_list: VecDeque<ThreadId>,
}

impl SmtArbiter {
    /// Creates an arbiter over `num_threads` threads in id order.
    pub fn new(num_threads: usize) -> Self {
        Self {
            priority_list: (0..num_threads).collect(),
        }
    }

    /// Rebuilds the priority list in id order.
    pub fn reset(&mut self, num_threads: usize) {
        self.priority_list = (0..num_threads).collect();
    }

    /// Removes a deactivated thread from the priority list.
    pub fn deactivate(&mut self, tid: ThreadId) {
        self.priority_list.retain(|&t| t != tid);
    }

    /// Chooses the thread to fetch from this cycle.
    ///
    /// With one active thread the policy is bypassed and only eligibility
    /// matters. Ties between equal occupancy counts break toward the lower
    /// thread id.
    ///
    /// # Panics
    ///
    /// Selecting the unimplemented `Branch` policy is fatal.
    pub fn choose(
        &mut self,
        policy: SmtFetchPolicy,
        statuses: &[ThreadStatus],
        active: &[ThreadId],
        iew: &[IewComm],
    ) -> Option<ThreadId> {
        if statuses.len() > 1 {
            match policy {
                SmtFetchPolicy::RoundRobin => self.round_robin(statuses),
                SmtFetchPolicy::IqCount => {
                    Self::least_count(statuses, active, |tid| iew[tid].iq_count)
                }
                SmtFetchPolicy::LsqCount => {
                    Self::least_count(statuses, active, |tid| iew[tid].ldstq_count)
                }
                SmtFetchPolicy::Branch => panic!("Branch fetch policy unimplemented"),
            }
        } else {
            let tid = *active.first()?;
            is_eligible(statuses[tid]).then_some(tid)
        }
    }

    fn round_robin(&mut self, statuses: &[ThreadStatus]) -> Option<ThreadId> {
        let pos = self
            .priority_list
            .iter()
            .position(|&tid| is_eligible(statuses[tid]))?;
        let tid = self.priority_list.remove(pos)?;
        self.priority_list.push_back(tid);
        Some(tid)
    }

    fn least_count(
        statuses: &[ThreadStatus],
        active: &[ThreadId],
        count: impl Fn(ThreadId) -> usize,
    ) -> Option<ThreadId> {
        let mut ranked: Vec<(usize, ThreadId)> =
            active.iter().map(|&tid| (count(tid), tid)).collect();
        ranked.sort();
        ranked
            .into_iter()
            .map(|(_, tid)| tid)
            .find(|&tid| is_eligible(statuses[tid]))
    }
}
