use std::sync::Mutex;

use loomwright_common::types::{Identity, MachineStatus, OrderAssignment, PendingHandoff};
use loomwright_common::{DeviceId, OrderId};

/// Thread-safe holder for a machine's mutable state (C3): current
/// status, current order assignment, and any in-flight handoff. Owns no
/// behavior beyond narrow, atomic mutations — C6 and C7 are the only
/// callers. Guarded by `std::sync::Mutex`
/// rather than a `tokio::sync::Mutex`: every critical section here is a
/// plain field read/write, never held across an `.await`.
pub struct MachineState {
    identity: Identity,
    inner: Mutex<Inner>,
}

struct Inner {
    status: MachineStatus,
    assignment: Option<OrderAssignment>,
    pending_handoff: Option<PendingHandoff>,
    next_handoff_seq: loomwright_common::HandoffSeq,
}

/// Atomic snapshot of status + assignment.
#[derive(Clone, Debug)]
pub struct StateSnapshot {
    pub status: MachineStatus,
    pub assignment: Option<OrderAssignment>,
}

impl MachineState {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            inner: Mutex::new(Inner {
                status: MachineStatus::Idle,
                assignment: None,
                pending_handoff: None,
                next_handoff_seq: loomwright_common::HandoffSeq::default(),
            }),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Atomic read of `(status, order_assignment_snapshot)`.
    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.inner.lock().unwrap();
        StateSnapshot {
            status: inner.status,
            assignment: inner.assignment.clone(),
        }
    }

    pub fn status(&self) -> MachineStatus {
        self.inner.lock().unwrap().status
    }

    pub fn set_status(&self, status: MachineStatus) {
        let mut inner = self.inner.lock().unwrap();
        tracing::debug!(device_id = %self.identity.device_id, from = %inner.status, to = %status, "status transition");
        inner.status = status;
    }

    /// Replace the current assignment wholesale, zeroing nothing the
    /// caller didn't already zero — callers pass a freshly-built
    /// `OrderAssignment` from the work message as-is.
    pub fn accept_assignment(&self, assignment: OrderAssignment) {
        let mut inner = self.inner.lock().unwrap();
        inner.assignment = Some(assignment);
        inner.pending_handoff = None;
    }

    /// Whether the machine already holds a non-finished assignment —
    /// used by C6 to apply the reject-busy-work policy.
    pub fn has_active_assignment(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.assignment.is_some() && inner.status != MachineStatus::Finish
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.inner.lock().unwrap().assignment.as_ref().map(|a| a.order_id)
    }

    /// Increment `units_produced` / decrement `units_pending` by one.
    pub fn increment_produced(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(a) = inner.assignment.as_mut() {
            a.units_produced += 1;
            a.units_pending = a.units_pending.saturating_sub(1);
        }
    }

    /// Increment `units_pending` by one — a unit has arrived from an
    /// upstream peer's handoff.
    pub fn add_pending_unit(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(a) = inner.assignment.as_mut() {
            a.units_pending += 1;
        }
    }

    pub fn set_next_machine(&self, next_machine: Option<DeviceId>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(a) = inner.assignment.as_mut() {
            a.next_machine = next_machine;
        }
    }

    /// Allocate the next handoff sequence number for this machine.
    pub fn next_handoff_seq(&self) -> loomwright_common::HandoffSeq {
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_handoff_seq;
        inner.next_handoff_seq = seq.next();
        seq
    }

    pub fn set_pending_handoff(&self, handoff: Option<PendingHandoff>) {
        self.inner.lock().unwrap().pending_handoff = handoff;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomwright_common::types::MachineType;

    fn test_state() -> MachineState {
        MachineState::new(Identity {
            device_id: DeviceId::new("A-test"),
            machine_type: MachineType::A,
        })
    }

    fn assignment(order_id: u64, unit_amount: u32, next_machine: Option<&str>) -> OrderAssignment {
        OrderAssignment {
            order_id: OrderId(order_id),
            unit_amount,
            total_pages: unit_amount,
            next_machine: next_machine.map(DeviceId::new),
            units_pending: unit_amount,
            units_produced: 0,
        }
    }

    #[test]
    fn fresh_machine_is_idle_with_no_assignment() {
        let s = test_state();
        assert_eq!(s.status(), MachineStatus::Idle);
        assert!(!s.has_active_assignment());
    }

    #[test]
    fn accept_assignment_clears_any_pending_handoff() {
        let s = test_state();
        s.set_pending_handoff(Some(PendingHandoff {
            order_id: OrderId(1),
            handoff_seq: s.next_handoff_seq(),
            target_device_id: DeviceId::new("B-bbb"),
            emitted_at: std::time::Instant::now(),
            ack_deadline: std::time::Instant::now(),
        }));

        s.accept_assignment(assignment(1, 3, Some("B-bbb")));
        assert!(s.has_active_assignment());

        let snapshot = s.snapshot();
        assert_eq!(snapshot.assignment.unwrap().units_pending, 3);
    }

    #[test]
    fn increment_produced_moves_one_unit_from_pending_to_produced() {
        let s = test_state();
        s.accept_assignment(assignment(1, 3, Some("B-bbb")));
        s.increment_produced();

        let a = s.snapshot().assignment.unwrap();
        assert_eq!(a.units_produced, 1);
        assert_eq!(a.units_pending, 2);
    }

    #[test]
    fn finished_assignment_is_not_active() {
        let s = test_state();
        s.accept_assignment(assignment(1, 1, None));
        s.increment_produced();
        s.set_status(MachineStatus::Finish);
        assert!(!s.has_active_assignment());
    }

    #[test]
    fn handoff_sequence_numbers_are_monotonic() {
        let s = test_state();
        let a = s.next_handoff_seq();
        let b = s.next_handoff_seq();
        let c = s.next_handoff_seq();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn add_pending_unit_increments_only_when_an_assignment_exists() {
        let s = test_state();
        s.add_pending_unit();
        assert!(s.snapshot().assignment.is_none());

        s.accept_assignment(assignment(1, 3, Some("B-bbb")));
        s.add_pending_unit();
        assert_eq!(s.snapshot().assignment.unwrap().units_pending, 4);
    }
}
