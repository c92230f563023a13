use serde::{Deserialize, Serialize};

/// Top-level agent configuration, deserialized from `agent.toml` and
/// layered with environment overrides in `loomwright-agent::config`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemConfig {
    pub timing: TimingConfig,
    pub safety: SafetyLimits,
    pub failure_injection: FailureInjectionConfig,
}

/// Timing parameters for heartbeats, per-unit ticks, and ACK waits.
///
/// The reference cadence is 10 polls at 100ms (1s total) for the ACK
/// wait; `ack_wait_ms` is kept as a single duration rather than
/// poll-count × cadence since the wait only needs the total.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Heartbeat publish period in milliseconds (default: 1000).
    pub heartbeat_period_ms: u64,
    /// Lower bound of the per-unit production tick, in milliseconds.
    pub tick_min_ms: u64,
    /// Upper bound of the per-unit production tick, in milliseconds.
    pub tick_max_ms: u64,
    /// Total ACK wait deadline in milliseconds (default: 1000).
    pub ack_wait_ms: u64,
}

/// Safety limits on the reassign wait and bus reconnection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SafetyLimits {
    /// Initial backoff for bus reconnection, in milliseconds.
    pub reconnect_initial_backoff_ms: u64,
    /// Max backoff for bus reconnection, in milliseconds.
    pub reconnect_max_backoff_ms: u64,
    /// Keepalive interval advertised to the broker, in seconds.
    pub broker_keepalive_secs: u64,
}

/// Failure-injection (C8) configuration — a test affordance, toggleable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailureInjectionConfig {
    /// When false, C8 never schedules a crash.
    pub enabled: bool,
    /// Lower bound of the randomized crash delay, in seconds.
    pub min_delay_secs: u64,
    /// Upper bound of the randomized crash delay, in seconds.
    pub max_delay_secs: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig {
                heartbeat_period_ms: 1_000,
                tick_min_ms: 250,
                tick_max_ms: 750,
                ack_wait_ms: 1_000,
            },
            safety: SafetyLimits {
                reconnect_initial_backoff_ms: 250,
                reconnect_max_backoff_ms: 10_000,
                broker_keepalive_secs: 30,
            },
            failure_injection: FailureInjectionConfig {
                enabled: false,
                min_delay_secs: 60,
                max_delay_secs: 180,
            },
        }
    }
}
