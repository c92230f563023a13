use std::time::Duration;

use rand::Rng;

use loomwright_common::config::FailureInjectionConfig;

/// Schedule a hard process exit after a randomized delay (C8), to
/// exercise the scheduler's crash-recovery path. Bypasses graceful
/// shutdown entirely — no terminal heartbeat, no disconnect — since the
/// point is to simulate a real crash. A test affordance, toggleable via
/// `failure_injection.enabled`; does nothing when disabled.
pub fn spawn(config: FailureInjectionConfig) {
    if !config.enabled {
        return;
    }

    let delay = {
        let mut rng = rand::rng();
        Duration::from_secs(rng.random_range(config.min_delay_secs..=config.max_delay_secs))
    };

    tracing::warn!(delay_secs = delay.as_secs(), "failure injector armed");

    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        tracing::error!("failure injector firing, hard exit");
        std::process::exit(1);
    });
}
