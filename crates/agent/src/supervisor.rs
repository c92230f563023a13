use std::sync::Arc;

use rumqttc::QoS;
use tokio::sync::{mpsc, watch};

use loomwright_common::types::{Ack, Command, Identity, Progress, Reassign, WorkMessage};
use loomwright_common::Result;

use crate::bus::{BrokerAddr, BusClient, InboundFrame, Topic};
use crate::codec;
use crate::command;
use crate::config::AgentConfig;
use crate::failure_injector;
use crate::heartbeat;
use crate::intake;
use crate::state::MachineState;
use crate::worker;

/// Composes C1–C8 and coordinates shutdown (C9): starts the heartbeat
/// and worker tasks, dispatches inbound frames by topic, and on SIGINT
/// drains to a clean stop — final heartbeat, then disconnect.
pub async fn run(config: AgentConfig) -> Result<()> {
    let identity = Identity {
        device_id: config.device_id.clone(),
        machine_type: config.machine_type,
    };
    let state = Arc::new(MachineState::new(identity));

    let broker = BrokerAddr {
        host: config.broker.host.clone(),
        port: config.broker.port,
        user: config.broker.user.clone(),
        pass: config.broker.pass.clone(),
    };

    let subscriptions = [
        (Topic::Command, QoS::AtLeastOnce),
        (Topic::Work, QoS::AtLeastOnce),
        (Topic::Ack, QoS::AtLeastOnce),
        (Topic::Progress, QoS::AtLeastOnce),
        (Topic::Reassign, QoS::AtLeastOnce),
    ];

    let (bus, mut inbound_rx) = BusClient::connect(
        &broker,
        config.device_id.as_str(),
        &config.system.safety,
        &subscriptions,
    )
    .await?;
    let bus = Arc::new(bus);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (ack_tx, ack_rx) = mpsc::channel::<Ack>(32);
    let (reassign_tx, reassign_rx) = mpsc::channel::<Reassign>(8);

    let heartbeat_period = std::time::Duration::from_millis(config.system.timing.heartbeat_period_ms);
    let heartbeat_handle = tokio::spawn(heartbeat::run(
        Arc::clone(&bus),
        Arc::clone(&state),
        heartbeat_period,
        shutdown_rx.clone(),
    ));

    let worker_handle = tokio::spawn(worker::run(
        Arc::clone(&bus),
        Arc::clone(&state),
        config.system.timing.clone(),
        ack_rx,
        reassign_rx,
        shutdown_rx.clone(),
    ));

    failure_injector::spawn(config.system.failure_injection.clone());

    tracing::info!(device_id = %config.device_id, machine_type = %config.machine_type, "agent supervisor running");

    loop {
        tokio::select! {
            frame = inbound_rx.recv() => {
                match frame {
                    Some(frame) => {
                        dispatch(&bus, &state, &ack_tx, &reassign_tx, frame).await;
                    }
                    None => {
                        tracing::warn!("inbound bus channel closed, shutting down");
                        break;
                    }
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    tracing::info!("received shutdown signal");
                }
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;
    let _ = heartbeat_handle.await;

    bus.disconnect().await?;

    Ok(())
}

/// Decode an inbound frame by its topic and route it to the component
/// that owns that concern. Misaddressed directed messages are silently
/// ignored here rather than in each handler.
async fn dispatch(
    bus: &Arc<BusClient>,
    state: &Arc<MachineState>,
    ack_tx: &mpsc::Sender<Ack>,
    reassign_tx: &mpsc::Sender<Reassign>,
    frame: InboundFrame,
) {
    let self_id = &state.identity().device_id;

    if frame.topic == Topic::Command.as_str() {
        let Some(msg) = codec::decode::<Command>(&frame.topic, &frame.payload) else {
            return;
        };
        if codec::is_for_me(&msg.device_id, self_id) {
            command::apply(state, &msg);
        }
    } else if frame.topic == Topic::Work.as_str() {
        let Some(msg) = codec::decode::<WorkMessage>(&frame.topic, &frame.payload) else {
            return;
        };
        if codec::is_for_me(&msg.device_id, self_id) {
            intake::handle(bus, state, msg).await;
        }
    } else if frame.topic == Topic::Progress.as_str() {
        let Some(msg) = codec::decode::<Progress>(&frame.topic, &frame.payload) else {
            return;
        };
        if msg.device_id.as_ref().is_some_and(|d| d == self_id) {
            intake::handle_progress(bus, state, msg).await;
        }
    } else if frame.topic == Topic::Ack.as_str() {
        let Some(msg) = codec::decode::<Ack>(&frame.topic, &frame.payload) else {
            return;
        };
        if codec::is_for_me(&msg.device_id, self_id) {
            let _ = ack_tx.send(msg).await;
        }
    } else if frame.topic == Topic::Reassign.as_str() {
        let Some(msg) = codec::decode::<Reassign>(&frame.topic, &frame.payload) else {
            return;
        };
        if codec::is_for_me(&msg.device_id, self_id) {
            let _ = reassign_tx.send(msg).await;
        }
    }
}
