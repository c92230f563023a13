/// The seven topics the bus carries. `Command`/`Work`/`Reassign` are
/// directed at a specific device but published on a shared topic name —
/// every agent subscribes to all of them and filters by `device_id` in
/// the payload (C2's job), rather than one topic per device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topic {
    Heartbeat,
    Command,
    Work,
    Ack,
    Progress,
    Alert,
    Reassign,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heartbeat => "loomwright/heartbeat",
            Self::Command => "loomwright/command",
            Self::Work => "loomwright/work",
            Self::Ack => "loomwright/ack",
            Self::Progress => "loomwright/progress",
            Self::Alert => "loomwright/alert",
            Self::Reassign => "loomwright/reassign",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
