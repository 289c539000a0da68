use std::time::Duration;

use rand::Rng;

use dough_settings::ReconnectSettings;

/// Exponential backoff with a ceiling and jitter for reconnect attempts.
#[derive(Clone, Debug)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.2,
        }
    }
}

impl From<&ReconnectSettings> for ReconnectPolicy {
    fn from(settings: &ReconnectSettings) -> Self {
        Self {
            base_delay: settings.base_delay(),
            max_delay: settings.max_delay(),
            jitter_factor: settings.jitter_factor,
        }
    }
}

impl ReconnectPolicy {
    /// `base * 2^attempt`, capped at `max_delay`. Non-decreasing in `attempt`.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exp_delay = self.base_delay.as_millis() as f64 * 2.0_f64.powi(attempt.min(32) as i32);
        let capped = exp_delay.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Nominal delay shortened by up to `jitter_factor` (at most one half),
    /// never lengthened. Halving at most keeps each delay at or above the
    /// previous attempt's nominal, and a capped attempt waits the full
    /// `max_delay`, so the sequence never decreases.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if nominal >= self.max_delay {
            return self.max_delay;
        }
        let nominal_ms = nominal.as_millis() as f64;
        let spread = nominal_ms * self.jitter_factor.clamp(0.0, MAX_JITTER);
        if spread <= 0.0 {
            return nominal;
        }
        let jittered = rand::thread_rng().gen_range(nominal_ms - spread..=nominal_ms);
        Duration::from_millis(jittered as u64)
    }
}

const MAX_JITTER: f64 = 0.5;
