use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::ids::{HandoffSeq, OrderId};
use crate::DeviceId;

/// Per-machine record of the order currently assigned.
///
/// Invariant (checked by `MachineState`, never by this bare struct):
/// `units_produced + units_pending <= unit_amount` at all times, and
/// `units_produced` is monotonically non-decreasing until the assignment
/// completes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAssignment {
    pub order_id: OrderId,
    pub unit_amount: u32,
    pub total_pages: u32,
    /// `None` marks a terminal stage (null sink) — no handoff is ever made.
    pub next_machine: Option<DeviceId>,
    pub units_pending: u32,
    pub units_produced: u32,
}

impl OrderAssignment {
    /// Whether every unit has been produced.
    pub fn is_complete(&self) -> bool {
        self.units_produced >= self.unit_amount
    }
}

/// Transient record of a single in-flight handoff, held only while the
/// machine is in `await_ack`. At most one per machine at a time.
#[derive(Clone, Debug)]
pub struct PendingHandoff {
    pub order_id: OrderId,
    pub handoff_seq: HandoffSeq,
    pub target_device_id: DeviceId,
    pub emitted_at: Instant,
    pub ack_deadline: Instant,
}
