use std::sync::Arc;
use std::time::Duration;

use rumqttc::QoS;
use tokio::sync::watch;

use loomwright_common::types::{Heartbeat, MachineStatus};

use crate::bus::{Bus, Topic};
use crate::codec;
use crate::state::MachineState;

/// Periodic liveness publisher (C4). Never blocks on production logic —
/// runs as its own task, selecting between its sleep and the shared
/// shutdown signal so it can emit one final `status=off` heartbeat
/// before returning.
pub async fn run<B: Bus + 'static>(
    bus: Arc<B>,
    state: Arc<MachineState>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let identity = state.identity().clone();
    tracing::info!(device_id = %identity.device_id, period_ms = period.as_millis() as u64, "heartbeat emitter started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(period) => {
                publish_one(&bus, &state).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    state.set_status(MachineStatus::Off);
    publish_one(&bus, &state).await;
    tracing::info!(device_id = %identity.device_id, "emitted terminal heartbeat");
}

async fn publish_one<B: Bus>(bus: &B, state: &MachineState) {
    let identity = state.identity();
    let heartbeat = Heartbeat {
        device_id: identity.device_id.clone(),
        machine_type: identity.machine_type,
        status: state.status(),
        timestamp: chrono::Utc::now(),
    };

    let payload = codec::encode(&heartbeat);
    if let Err(e) = bus.publish(&Topic::Heartbeat, QoS::AtLeastOnce, payload).await {
        tracing::warn!(error = %e, "failed to publish heartbeat");
    }
}
