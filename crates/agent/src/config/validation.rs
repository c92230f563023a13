use super::loader::{AgentConfig, ConfigError};

/// Validate the complete agent configuration.
///
/// Checks sane ranges on the timing/safety knobs and on the broker
/// connection. The agent refuses to start on validation failure.
pub fn validate(config: &AgentConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_broker(config, &mut errors);
    validate_timing(config, &mut errors);
    validate_safety(config, &mut errors);
    validate_failure_injection(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(errors.join("; ")))
    }
}

fn validate_broker(config: &AgentConfig, errors: &mut Vec<String>) {
    if config.broker.host.is_empty() {
        errors.push("broker.host must not be empty".into());
    }
    if config.broker.port == 0 {
        errors.push("broker.port must be > 0".into());
    }
}

fn validate_timing(config: &AgentConfig, errors: &mut Vec<String>) {
    let t = &config.system.timing;

    if t.heartbeat_period_ms == 0 {
        errors.push("timing.heartbeat_period_ms must be > 0".into());
    }
    if t.tick_min_ms == 0 {
        errors.push("timing.tick_min_ms must be > 0".into());
    }
    if t.tick_max_ms < t.tick_min_ms {
        errors.push("timing.tick_max_ms must be >= timing.tick_min_ms".into());
    }
    if t.ack_wait_ms == 0 {
        errors.push("timing.ack_wait_ms must be > 0".into());
    }
}

fn validate_safety(config: &AgentConfig, errors: &mut Vec<String>) {
    let s = &config.system.safety;

    if s.reconnect_initial_backoff_ms == 0 {
        errors.push("safety.reconnect_initial_backoff_ms must be > 0".into());
    }
    if s.reconnect_max_backoff_ms < s.reconnect_initial_backoff_ms {
        errors.push(
            "safety.reconnect_max_backoff_ms must be >= safety.reconnect_initial_backoff_ms"
                .into(),
        );
    }
    if s.broker_keepalive_secs == 0 {
        errors.push("safety.broker_keepalive_secs must be > 0".into());
    }
}

fn validate_failure_injection(config: &AgentConfig, errors: &mut Vec<String>) {
    let f = &config.system.failure_injection;

    if f.enabled && f.max_delay_secs < f.min_delay_secs {
        errors.push(
            "failure_injection.max_delay_secs must be >= failure_injection.min_delay_secs".into(),
        );
    }
}
