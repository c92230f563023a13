use loomwright_common::types::{Command, CommandValue, MachineStatus};

use crate::state::MachineState;

/// Apply a directed control command (C5). A pure function over state:
/// misaddressed messages were already filtered out by the dispatcher
/// before this is called, so every command reaching here is
/// addressed to us.
///
/// Valid transitions:
/// - `running` from any non-terminal status → running
/// - `idle` from any non-terminal status → idle (pauses production)
/// - `off` → off (final for this process instance)
///
/// Unknown values are logged and ignored.
pub fn apply(state: &MachineState, command: &Command) {
    let Some(value) = CommandValue::parse(&command.value) else {
        tracing::warn!(device_id = %command.device_id, value = %command.value, "unknown command value, ignoring");
        return;
    };

    if state.status() == MachineStatus::Off {
        tracing::debug!(device_id = %command.device_id, "machine is off, ignoring command");
        return;
    }

    let next = match value {
        CommandValue::Running => MachineStatus::Running,
        CommandValue::Idle => MachineStatus::Idle,
        CommandValue::Off => MachineStatus::Off,
    };

    tracing::info!(device_id = %command.device_id, command = %command.value, "applying command");
    state.set_status(next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomwright_common::types::Identity;
    use loomwright_common::DeviceId;

    fn state() -> MachineState {
        MachineState::new(Identity {
            device_id: DeviceId::new("A-test"),
            machine_type: loomwright_common::types::MachineType::A,
        })
    }

    fn command(value: &str) -> Command {
        Command {
            device_id: DeviceId::new("A-test"),
            value: value.to_string(),
        }
    }

    #[test]
    fn running_command_transitions_from_idle() {
        let s = state();
        apply(&s, &command("running"));
        assert_eq!(s.status(), MachineStatus::Running);
    }

    #[test]
    fn idle_command_pauses_a_running_machine() {
        let s = state();
        s.set_status(MachineStatus::Running);
        apply(&s, &command("idle"));
        assert_eq!(s.status(), MachineStatus::Idle);
    }

    #[test]
    fn unknown_value_is_ignored() {
        let s = state();
        s.set_status(MachineStatus::Running);
        apply(&s, &command("sleep"));
        assert_eq!(s.status(), MachineStatus::Running);
    }

    #[test]
    fn off_is_final_and_blocks_further_commands() {
        let s = state();
        apply(&s, &command("off"));
        assert_eq!(s.status(), MachineStatus::Off);
        apply(&s, &command("running"));
        assert_eq!(s.status(), MachineStatus::Off);
    }
}
