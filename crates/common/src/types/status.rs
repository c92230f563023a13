use serde::{Deserialize, Serialize};

/// Machine lifecycle status.
///
/// `Stalled` is emitted on heartbeats while the worker is parked after
/// an alert, distinct from `running`, so the scheduler can tell
/// "producing" from "stuck waiting on a reroute" from heartbeats alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    Idle,
    Running,
    AwaitAck,
    Stalled,
    Finish,
    Off,
}

impl MachineStatus {
    /// `finish` and `off` are sticky for the lifetime of the process.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finish | Self::Off)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::AwaitAck => "await_ack",
            Self::Stalled => "stalled",
            Self::Finish => "finish",
            Self::Off => "off",
        }
    }
}

impl std::fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
