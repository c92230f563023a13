use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use rumqttc::QoS;
use tokio::sync::{mpsc, watch};

use loomwright_common::config::TimingConfig;
use loomwright_common::types::{Ack, Alert, MachineStatus, PendingHandoff, Progress, Reassign};
use loomwright_common::{DeviceId, HandoffSeq};

use crate::bus::{Bus, Topic};
use crate::codec;
use crate::state::MachineState;

/// Core state machine (C7): per-unit production, downstream handoff,
/// ACK wait, peer-failure escalation, and reroute. Runs as a single
/// cooperative loop for the lifetime of the process; exits when status
/// reaches `off` or the shutdown signal fires.
pub async fn run<B: Bus + 'static>(
    bus: Arc<B>,
    state: Arc<MachineState>,
    timing: TimingConfig,
    mut ack_rx: mpsc::Receiver<Ack>,
    mut reassign_rx: mpsc::Receiver<Reassign>,
    mut shutdown: watch::Receiver<bool>,
) {
    let device_id = state.identity().device_id.clone();
    tracing::info!(device_id = %device_id, "production worker started");

    loop {
        if *shutdown.borrow() || state.status() == MachineStatus::Off {
            break;
        }

        match state.status() {
            MachineStatus::Running => {
                let snapshot = state.snapshot();
                let ready = snapshot
                    .assignment
                    .as_ref()
                    .is_some_and(|a| !a.is_complete() && a.units_pending > 0);

                if !ready {
                    if snapshot
                        .assignment
                        .as_ref()
                        .is_some_and(|a| a.is_complete())
                    {
                        tracing::info!(device_id = %device_id, "assignment complete");
                        state.set_status(MachineStatus::Finish);
                    } else if !idle_wait(&mut shutdown).await {
                        break;
                    }
                    continue;
                }

                if !produce_and_handoff(
                    &bus,
                    &state,
                    &timing,
                    &mut ack_rx,
                    &mut reassign_rx,
                    &mut shutdown,
                )
                .await
                {
                    break;
                }
            }
            MachineStatus::Finish => {
                if !idle_wait(&mut shutdown).await {
                    break;
                }
            }
            _ => {
                // idle / await_ack / stalled: yield without losing in-flight
                // counters.
                if !idle_wait(&mut shutdown).await {
                    break;
                }
            }
        }
    }

    tracing::info!(device_id = %device_id, "production worker exiting");
}

/// Sleep briefly, waking early on a shutdown signal. Returns `false` if
/// the caller should stop the worker loop entirely.
async fn idle_wait(shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(50)) => true,
        changed = shutdown.changed() => {
            changed.is_ok() && !*shutdown.borrow()
        }
    }
}

/// One production tick plus, if there is a downstream peer, the full
/// handoff-with-ACK cycle (including peer-failure escalation and
/// reroute). Returns `false` if the worker should stop.
async fn produce_and_handoff<B: Bus>(
    bus: &Arc<B>,
    state: &Arc<MachineState>,
    timing: &TimingConfig,
    ack_rx: &mut mpsc::Receiver<Ack>,
    reassign_rx: &mut mpsc::Receiver<Reassign>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let tick = {
        let mut rng = rand::rng();
        Duration::from_millis(rng.random_range(timing.tick_min_ms..=timing.tick_max_ms))
    };

    tokio::select! {
        _ = tokio::time::sleep(tick) => {}
        changed = shutdown.changed() => {
            return changed.is_ok() && !*shutdown.borrow();
        }
    }

    if *shutdown.borrow() {
        return false;
    }

    state.increment_produced();
    metrics::counter!("loomwright.units_produced").increment(1);
    let snapshot = state.snapshot();
    let Some(assignment) = snapshot.assignment else {
        return true;
    };

    let device_id = state.identity().device_id.clone();

    let Some(mut next_machine) = assignment.next_machine.clone() else {
        // Terminal stage: no handoff, informational progress only.
        let handoff_seq = state.next_handoff_seq();
        publish_progress(bus, None, &device_id, &assignment, handoff_seq).await;
        if assignment.is_complete() {
            state.set_status(MachineStatus::Finish);
        }
        return true;
    };

    let mut handoff_seq = state.next_handoff_seq();
    publish_progress(
        bus,
        Some(next_machine.clone()),
        &device_id,
        &assignment,
        handoff_seq,
    )
    .await;

    state.set_status(MachineStatus::AwaitAck);
    state.set_pending_handoff(Some(PendingHandoff {
        order_id: assignment.order_id,
        handoff_seq,
        target_device_id: next_machine.clone(),
        emitted_at: Instant::now(),
        ack_deadline: Instant::now() + Duration::from_millis(timing.ack_wait_ms),
    }));

    loop {
        let deadline = Duration::from_millis(timing.ack_wait_ms);
        let acked = wait_for_ack(handoff_seq, deadline, state, ack_rx, shutdown).await;

        match acked {
            AckOutcome::Acked => {
                metrics::counter!("loomwright.handoffs_acked").increment(1);
                state.set_pending_handoff(None);
                state.set_status(MachineStatus::Running);
                return true;
            }
            AckOutcome::ShouldStop => return false,
            AckOutcome::TimedOut => {
                tracing::warn!(
                    device_id = %device_id,
                    peer = %next_machine,
                    order_id = %assignment.order_id,
                    handoff_seq = %handoff_seq,
                    "ack timeout, alerting scheduler"
                );

                metrics::counter!("loomwright.alerts_raised").increment(1);
                publish_alert(bus, &device_id, &next_machine, assignment.order_id, handoff_seq)
                    .await;
                state.set_next_machine(None);
                state.set_status(MachineStatus::Stalled);

                let Some(replacement) = wait_for_reassign(state, reassign_rx, shutdown).await
                else {
                    return false;
                };

                if state.status() == MachineStatus::Off {
                    // Commanded off while parked waiting on a reassign: a
                    // machine in `off` never emits progress, so the
                    // reassign that just arrived is dropped on the floor.
                    return false;
                }

                metrics::counter!("loomwright.reassigns_received").increment(1);
                next_machine = match replacement {
                    Some(d) => d,
                    None => {
                        // Scheduler reassigned to a null sink: drop the handoff.
                        state.set_pending_handoff(None);
                        state.set_status(MachineStatus::Running);
                        return true;
                    }
                };

                state.set_next_machine(Some(next_machine.clone()));
                handoff_seq = state.next_handoff_seq();
                publish_progress(
                    bus,
                    Some(next_machine.clone()),
                    &device_id,
                    &assignment,
                    handoff_seq,
                )
                .await;
                state.set_pending_handoff(Some(PendingHandoff {
                    order_id: assignment.order_id,
                    handoff_seq,
                    target_device_id: next_machine.clone(),
                    emitted_at: Instant::now(),
                    ack_deadline: Instant::now() + Duration::from_millis(timing.ack_wait_ms),
                }));
                state.set_status(MachineStatus::AwaitAck);
            }
        }
    }
}

enum AckOutcome {
    Acked,
    TimedOut,
    ShouldStop,
}

/// How often the ack/reassign waits re-check `MachineState::status()` for
/// a commanded `off` — neither wait otherwise has any way to observe a
/// status change, since C5 mutates `MachineState` directly rather than
/// over a channel either of these waits already watches.
const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Wait up to `deadline` for an ACK that echoes `handoff_seq` (the
/// redesign where ACKs are matched by sequence number, not by peer
/// identity. Unrelated ACKs are ignored and the wait
/// continues — an ACK arriving exactly at the deadline is accepted, so
/// the timeout wraps the whole polling loop rather than a single recv.
/// Also bails as soon as a command transitions the machine to `off`:
/// a machine in `off` never emits progress, and that holds even while
/// parked mid-handoff.
async fn wait_for_ack(
    handoff_seq: HandoffSeq,
    deadline: Duration,
    state: &MachineState,
    ack_rx: &mut mpsc::Receiver<Ack>,
    shutdown: &mut watch::Receiver<bool>,
) -> AckOutcome {
    let deadline_at = tokio::time::Instant::now() + deadline;

    loop {
        if state.status() == MachineStatus::Off {
            return AckOutcome::ShouldStop;
        }

        tokio::select! {
            _ = tokio::time::sleep_until(deadline_at) => {
                return AckOutcome::TimedOut;
            }
            ack = ack_rx.recv() => {
                match ack {
                    Some(ack) if ack.handoff_seq == Some(handoff_seq) => {
                        return AckOutcome::Acked;
                    }
                    Some(_) => continue,
                    None => return AckOutcome::ShouldStop,
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return AckOutcome::ShouldStop;
                }
            }
            _ = tokio::time::sleep(STATUS_POLL_INTERVAL) => {}
        }
    }
}

/// Park unboundedly for a reassign: the wait is
/// intentionally unbounded (the scheduler is authoritative) but must
/// still unblock on the global shutdown signal, or on a command that
/// transitions the machine to `off` while it sits parked.
/// Returns `None` if the worker should stop, `Some(next_machine)`
/// otherwise.
async fn wait_for_reassign(
    state: &MachineState,
    reassign_rx: &mut mpsc::Receiver<Reassign>,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<Option<DeviceId>> {
    loop {
        if state.status() == MachineStatus::Off {
            return None;
        }

        tokio::select! {
            reassign = reassign_rx.recv() => {
                return reassign.map(|r| r.next_machine);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return None;
                }
            }
            _ = tokio::time::sleep(STATUS_POLL_INTERVAL) => {}
        }
    }
}

async fn publish_progress<B: Bus>(
    bus: &B,
    next_machine: Option<DeviceId>,
    from: &DeviceId,
    assignment: &loomwright_common::types::OrderAssignment,
    handoff_seq: HandoffSeq,
) {
    let progress = Progress {
        device_id: next_machine,
        from: from.clone(),
        order_id: assignment.order_id,
        handoff_seq,
        units_pending: assignment.units_pending,
        current_produced: assignment.units_produced,
        unit_amount: assignment.unit_amount,
    };

    let payload = codec::encode(&progress);
    if let Err(e) = bus.publish(&Topic::Progress, QoS::AtLeastOnce, payload).await {
        tracing::warn!(error = %e, "failed to publish progress");
    }
}

async fn publish_alert<B: Bus>(
    bus: &B,
    from: &DeviceId,
    failed_peer: &DeviceId,
    order_id: loomwright_common::OrderId,
    handoff_seq: HandoffSeq,
) {
    let alert = Alert {
        next_machine: failed_peer.clone(),
        from: from.clone(),
        order_id,
        handoff_seq,
    };

    let payload = codec::encode(&alert);
    if let Err(e) = bus.publish(&Topic::Alert, QoS::AtLeastOnce, payload).await {
        tracing::warn!(error = %e, "failed to publish alert");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ack(handoff_seq: Option<HandoffSeq>) -> Ack {
        Ack {
            device_id: DeviceId::new("A-001"),
            from: DeviceId::new("B-002"),
            event: loomwright_common::types::AckEvent::Accepted,
            timestamp: Utc::now(),
            handoff_seq,
        }
    }

    fn test_state() -> MachineState {
        MachineState::new(loomwright_common::types::Identity {
            device_id: DeviceId::new("A-001"),
            machine_type: loomwright_common::types::MachineType::A,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_ack_accepts_a_matching_handoff_seq() {
        let (ack_tx, mut ack_rx) = mpsc::channel(4);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        ack_tx.send(ack(Some(HandoffSeq(7)))).await.unwrap();

        let outcome = wait_for_ack(
            HandoffSeq(7),
            Duration::from_millis(500),
            &test_state(),
            &mut ack_rx,
            &mut shutdown_rx,
        )
        .await;

        assert!(matches!(outcome, AckOutcome::Acked));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_ack_ignores_unrelated_acks_and_keeps_waiting() {
        let (ack_tx, mut ack_rx) = mpsc::channel(4);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        ack_tx.send(ack(Some(HandoffSeq(1)))).await.unwrap();
        ack_tx.send(ack(None)).await.unwrap();
        ack_tx.send(ack(Some(HandoffSeq(3)))).await.unwrap();

        let outcome = wait_for_ack(
            HandoffSeq(3),
            Duration::from_millis(500),
            &test_state(),
            &mut ack_rx,
            &mut shutdown_rx,
        )
        .await;

        assert!(matches!(outcome, AckOutcome::Acked));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_ack_times_out_when_nothing_arrives() {
        let (_ack_tx, mut ack_rx) = mpsc::channel(4);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let outcome = wait_for_ack(
            HandoffSeq(1),
            Duration::from_millis(100),
            &test_state(),
            &mut ack_rx,
            &mut shutdown_rx,
        )
        .await;

        assert!(matches!(outcome, AckOutcome::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_ack_stops_on_shutdown() {
        let (_ack_tx, mut ack_rx) = mpsc::channel(4);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        shutdown_tx.send(true).unwrap();

        let outcome = wait_for_ack(
            HandoffSeq(1),
            Duration::from_millis(500),
            &test_state(),
            &mut ack_rx,
            &mut shutdown_rx,
        )
        .await;

        assert!(matches!(outcome, AckOutcome::ShouldStop));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_ack_stops_when_commanded_off() {
        let (_ack_tx, mut ack_rx) = mpsc::channel(4);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let state = test_state();
        state.set_status(MachineStatus::Off);

        let outcome = wait_for_ack(
            HandoffSeq(1),
            Duration::from_millis(500),
            &state,
            &mut ack_rx,
            &mut shutdown_rx,
        )
        .await;

        assert!(matches!(outcome, AckOutcome::ShouldStop));
    }

    #[tokio::test]
    async fn wait_for_reassign_returns_the_replacement() {
        let (reassign_tx, mut reassign_rx) = mpsc::channel(4);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        reassign_tx
            .send(Reassign {
                device_id: DeviceId::new("A-001"),
                next_machine: Some(DeviceId::new("C-003")),
            })
            .await
            .unwrap();

        let result = wait_for_reassign(&test_state(), &mut reassign_rx, &mut shutdown_rx).await;
        assert_eq!(result, Some(Some(DeviceId::new("C-003"))));
    }

    #[tokio::test]
    async fn wait_for_reassign_returns_null_sink() {
        let (reassign_tx, mut reassign_rx) = mpsc::channel(4);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        reassign_tx
            .send(Reassign {
                device_id: DeviceId::new("A-001"),
                next_machine: None,
            })
            .await
            .unwrap();

        let result = wait_for_reassign(&test_state(), &mut reassign_rx, &mut shutdown_rx).await;
        assert_eq!(result, Some(None));
    }

    #[tokio::test]
    async fn wait_for_reassign_stops_on_shutdown() {
        let (_reassign_tx, mut reassign_rx) = mpsc::channel(4);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        shutdown_tx.send(true).unwrap();

        let result = wait_for_reassign(&test_state(), &mut reassign_rx, &mut shutdown_rx).await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn wait_for_reassign_stops_when_commanded_off() {
        let (_reassign_tx, mut reassign_rx) = mpsc::channel(4);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let state = test_state();
        state.set_status(MachineStatus::Off);

        let result = wait_for_reassign(&state, &mut reassign_rx, &mut shutdown_rx).await;
        assert_eq!(result, None);
    }
}
