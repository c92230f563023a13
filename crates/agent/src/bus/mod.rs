mod topics;

pub use topics::Topic;

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;

use loomwright_common::config::SafetyLimits;
use loomwright_common::{LoomError, Result};

/// Inbound frame handed to the dispatcher: the topic it arrived on and
/// the raw bytes, still encoded — decoding is C2's job, not the bus's.
#[derive(Clone, Debug)]
pub struct InboundFrame {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Broker connection parameters.
#[derive(Clone, Debug)]
pub struct BrokerAddr {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
}

/// The one operation C7/C4/C6 actually need from the bus: publish. Kept
/// as a trait (rather than a bare function taking `&BusClient`) so the
/// production worker, heartbeat emitter, and intake handler can run
/// against an in-process fake in tests without a live broker — the same
/// reason the teacher's own `CircuitBreaker` is driven through a narrow
/// interface rather than reaching into its caller's retry loop directly.
pub trait Bus: Send + Sync {
    fn publish(
        &self,
        topic: &Topic,
        qos: QoS,
        payload: Vec<u8>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Pub/sub bus client (C1). Wraps a `rumqttc` async client and its
/// event loop. The event loop runs on its own task; `inbound` streams
/// decoded-topic/raw-payload frames to whoever dispatches them, mirroring
/// the connect/health_check/enqueue-dequeue shape of a queue client, with
/// the subscribe/publish vocabulary a pub/sub broker actually uses.
pub struct BusClient {
    client: AsyncClient,
    client_id: String,
}

impl BusClient {
    /// Connect to the broker and subscribe to every inbound topic this
    /// device cares about. Returns the client plus a receiver of inbound
    /// frames — the event loop driving that receiver is already spawned.
    pub async fn connect(
        addr: &BrokerAddr,
        client_id: &str,
        safety: &SafetyLimits,
        subscribe_topics: &[(Topic, QoS)],
    ) -> Result<(Self, mpsc::Receiver<InboundFrame>)> {
        tracing::info!(host = %addr.host, port = addr.port, client_id, "connecting to bus");

        let mut options = MqttOptions::new(client_id.to_string(), addr.host.clone(), addr.port);
        options.set_keep_alive(Duration::from_secs(safety.broker_keepalive_secs));
        if let (Some(user), Some(pass)) = (&addr.user, &addr.pass) {
            options.set_credentials(user.clone(), pass.clone());
        }

        let (client, event_loop) = AsyncClient::new(options, 64);

        for (topic, qos) in subscribe_topics {
            client
                .subscribe(topic.as_str(), *qos)
                .await
                .map_err(|e| LoomError::BusConnect(e.to_string()))?;
        }

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(drive_event_loop(
            event_loop,
            tx,
            client_id.to_string(),
            safety.clone(),
        ));

        Ok((
            Self {
                client,
                client_id: client_id.to_string(),
            },
            rx,
        ))
    }

    /// Publish a payload to `topic` at the given QoS.
    pub async fn publish(&self, topic: &Topic, qos: QoS, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(topic.as_str(), qos, false, payload)
            .await
            .map_err(|e| LoomError::BusPublish(e.to_string()))
    }

    /// Disconnect cleanly from the broker.
    pub async fn disconnect(&self) -> Result<()> {
        tracing::info!(client_id = %self.client_id, "disconnecting from bus");
        self.client
            .disconnect()
            .await
            .map_err(|e| LoomError::BusConnect(e.to_string()))
    }
}

impl Bus for BusClient {
    async fn publish(&self, topic: &Topic, qos: QoS, payload: Vec<u8>) -> Result<()> {
        BusClient::publish(self, topic, qos, payload).await
    }
}

/// Drives the `rumqttc` event loop, forwarding `Publish` packets to
/// `tx` and reconnecting with bounded backoff on disconnect. The event
/// loop itself transparently reconnects the TCP/MQTT session; the
/// backoff here only throttles how fast we retry polling after an error.
async fn drive_event_loop(
    mut event_loop: EventLoop,
    tx: mpsc::Sender<InboundFrame>,
    client_id: String,
    safety: SafetyLimits,
) {
    let mut backoff = Duration::from_millis(safety.reconnect_initial_backoff_ms);
    let max_backoff = Duration::from_millis(safety.reconnect_max_backoff_ms);

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                backoff = Duration::from_millis(safety.reconnect_initial_backoff_ms);
                let frame = InboundFrame {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                };
                if tx.send(frame).await.is_err() {
                    tracing::info!(client_id = %client_id, "inbound dispatcher gone, stopping bus loop");
                    return;
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                backoff = Duration::from_millis(safety.reconnect_initial_backoff_ms);
                tracing::info!(client_id = %client_id, "bus connected");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(client_id = %client_id, error = %e, backoff_ms = backoff.as_millis() as u64, "bus event loop error, backing off");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(max_backoff);
            }
        }
    }
}
