use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{HandoffSeq, OrderId};
use crate::DeviceId;

use super::identity::MachineType;
use super::status::MachineStatus;

/// Heartbeat payload, published by an agent on every tick of C4.
/// Never persisted; the scheduler's own liveness window is external.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Heartbeat {
    pub device_id: DeviceId,
    pub machine_type: MachineType,
    pub status: MachineStatus,
    pub timestamp: DateTime<Utc>,
}

/// Control message from the scheduler (`command` topic), directed by
/// `device_id`. `value` is kept as a raw string rather than a closed enum
/// so that an unrecognized value can be logged and ignored rather than
/// failing to deserialize the whole frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Command {
    pub device_id: DeviceId,
    pub value: String,
}

/// The three transitions a `Command.value` may request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandValue {
    Idle,
    Running,
    Off,
}

impl CommandValue {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "off" => Some(Self::Off),
            _ => None,
        }
    }
}

/// Work assignment from the scheduler (`work` topic), directed by
/// `device_id`. `from` names the scheduler (or whoever issued the
/// assignment) so the ACK can be addressed back to them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkMessage {
    pub device_id: DeviceId,
    pub order_id: OrderId,
    pub unit_amount: u32,
    pub total_pages: u32,
    pub next_machine: Option<DeviceId>,
    pub units_pending: u32,
    pub units_produced: u32,
    pub from: DeviceId,
}

/// Outcome carried by an `Ack` — `Accepted` for both work-assignment and
/// handoff acks, `Rejected` when C6 declines a work assignment because
/// the machine already holds a non-finished one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckEvent {
    Accepted,
    Rejected,
}

/// Acknowledgement (`ack` topic), flowing agent → agent or agent →
/// scheduler depending on what is being acknowledged. `handoff_seq` is
/// present only when acknowledging a handoff (a `Progress` message); it
/// is absent for a work-assignment ack, which has no sequence to echo.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ack {
    pub device_id: DeviceId,
    pub from: DeviceId,
    pub event: AckEvent,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_seq: Option<HandoffSeq>,
}

/// Progress / handoff message (`progress` topic). One message is
/// simultaneously a production-progress tick and a single-unit handoff
/// request to `device_id` (the downstream peer). `device_id` is `None`
/// for a terminal stage's informational tick: there is no downstream
/// peer to hand off to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Progress {
    pub device_id: Option<DeviceId>,
    pub from: DeviceId,
    pub order_id: OrderId,
    pub handoff_seq: HandoffSeq,
    pub units_pending: u32,
    pub current_produced: u32,
    pub unit_amount: u32,
}

/// Upward notification that the expected downstream peer failed to ACK
/// within the deadline (`alert` topic).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Alert {
    pub next_machine: DeviceId,
    pub from: DeviceId,
    pub order_id: OrderId,
    pub handoff_seq: HandoffSeq,
}

/// Scheduler's replacement for a failed downstream peer (`reassign`
/// topic), directed by `device_id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reassign {
    pub device_id: DeviceId,
    pub next_machine: Option<DeviceId>,
}
