use std::sync::Arc;

use chrono::Utc;
use rumqttc::QoS;

use loomwright_common::types::{Ack, AckEvent, MachineStatus, OrderAssignment, Progress, WorkMessage};

use crate::bus::{Bus, Topic};
use crate::codec;
use crate::state::MachineState;

/// Handle a work assignment directed at this device (C6).
///
/// A work message arriving while the machine already holds a
/// non-finished assignment is REJECTED with a negative ack rather than
/// overwriting the in-flight one.
pub async fn handle<B: Bus>(bus: &Arc<B>, state: &Arc<MachineState>, work: WorkMessage) {
    if state.has_active_assignment() {
        tracing::warn!(
            device_id = %work.device_id,
            order_id = %work.order_id,
            "rejecting work assignment, machine already busy"
        );
        send_ack(bus, &work, AckEvent::Rejected).await;
        return;
    }

    let assignment = OrderAssignment {
        order_id: work.order_id,
        unit_amount: work.unit_amount,
        total_pages: work.total_pages,
        next_machine: work.next_machine.clone(),
        units_pending: work.units_pending,
        units_produced: work.units_produced,
    };

    state.accept_assignment(assignment);

    if state.status() == MachineStatus::Idle {
        state.set_status(MachineStatus::Running);
    }

    tracing::info!(
        device_id = %work.device_id,
        order_id = %work.order_id,
        unit_amount = work.unit_amount,
        "accepted work assignment"
    );

    send_ack(bus, &work, AckEvent::Accepted).await;
}

/// Handle an incoming progress/handoff message from an upstream peer.
///
/// A progress message is simultaneously the upstream's own production
/// tick and a single-unit handoff request to us: it
/// increments our `units_pending` by one rather than replacing our
/// assignment, which the scheduler already set up independently. We
/// then ACK back to the sender, echoing the `handoff_seq` so the
/// sender's ACK-wait can match it.
pub async fn handle_progress<B: Bus>(bus: &Arc<B>, state: &Arc<MachineState>, progress: Progress) {
    let Some(order_id) = state.order_id() else {
        tracing::warn!(
            from = %progress.from,
            order_id = %progress.order_id,
            "received handoff with no active assignment, dropping"
        );
        return;
    };

    if order_id != progress.order_id {
        tracing::warn!(
            from = %progress.from,
            expected_order_id = %order_id,
            got_order_id = %progress.order_id,
            "received handoff for a different order, dropping"
        );
        return;
    }

    state.add_pending_unit();

    if state.status() == MachineStatus::Idle {
        state.set_status(MachineStatus::Running);
    }

    let ack = Ack {
        device_id: progress.from.clone(),
        from: state.identity().device_id.clone(),
        event: AckEvent::Accepted,
        timestamp: Utc::now(),
        handoff_seq: Some(progress.handoff_seq),
    };

    metrics::counter!("loomwright.handoffs_acked").increment(1);
    let payload = codec::encode(&ack);
    if let Err(e) = bus.publish(&Topic::Ack, QoS::AtLeastOnce, payload).await {
        tracing::warn!(error = %e, "failed to publish handoff ack");
    }
}

async fn send_ack<B: Bus>(bus: &B, work: &WorkMessage, event: AckEvent) {
    let ack = Ack {
        device_id: work.from.clone(),
        from: work.device_id.clone(),
        event,
        timestamp: Utc::now(),
        handoff_seq: None,
    };

    let payload = codec::encode(&ack);
    if let Err(e) = bus.publish(&Topic::Ack, QoS::AtLeastOnce, payload).await {
        tracing::warn!(error = %e, "failed to publish work ack");
    }
}
