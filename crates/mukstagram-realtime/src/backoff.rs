use std::time::Duration;

pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_millis(1000);
pub const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_millis(30_000);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// `min(base * 2^attempt, max_delay)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_RECONNECT_BASE,
            max_delay: DEFAULT_RECONNECT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// A reconnect the connection manager should perform after `delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledReconnect {
    pub attempt: u32,
    pub delay: Duration,
}

/// Reconnect bookkeeping for one channel.
///
/// The attempt counter resets when a connection opens. `suppress` is the
/// logout path: no close event afterwards may schedule a reconnect until
/// `resume` is called for a fresh connect.
#[derive(Debug, Clone)]
pub struct Reconnector {
    policy: ReconnectPolicy,
    attempts: u32,
    suppressed: bool,
}

impl Reconnector {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            suppressed: false,
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }

    pub fn on_open(&mut self) {
        self.attempts = 0;
    }

    pub fn on_close(&mut self, authenticated: bool) -> Option<ScheduledReconnect> {
        if self.suppressed || !authenticated || self.is_exhausted() {
            return None;
        }
        self.attempts += 1;
        Some(ScheduledReconnect {
            attempt: self.attempts,
            delay: self.policy.delay_for(self.attempts),
        })
    }

    pub fn suppress(&mut self) {
        self.suppressed = true;
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// Start over for an explicit connect or a new sign-in.
    pub fn resume(&mut self) {
        self.suppressed = false;
        self.attempts = 0;
    }
}

impl Default for Reconnector {
    fn default() -> Self {
        Self::new(ReconnectPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_sequence_is_capped() {
        let mut reconnector = Reconnector::default();
        let delays: Vec<u128> = std::iter::from_fn(|| reconnector.on_close(true))
            .map(|r| r.delay.as_millis())
            .collect();
        assert_eq!(delays, vec![2000, 4000, 8000, 16000, 30000]);
        assert!(reconnector.is_exhausted());
        assert_eq!(reconnector.on_close(true), None);
    }

    #[test]
    fn attempts_are_numbered_from_one() {
        let mut reconnector = Reconnector::default();
        let first = reconnector.on_close(true).unwrap();
        assert_eq!(first.attempt, 1);
        assert_eq!(reconnector.attempts(), 1);
    }

    #[test]
    fn open_resets_attempts() {
        let mut reconnector = Reconnector::default();
        reconnector.on_close(true);
        reconnector.on_close(true);
        reconnector.on_open();
        assert_eq!(reconnector.attempts(), 0);
        assert_eq!(reconnector.on_close(true).unwrap().delay.as_millis(), 2000);
    }

    #[test]
    fn signed_out_close_does_not_reconnect() {
        let mut reconnector = Reconnector::default();
        assert_eq!(reconnector.on_close(false), None);
        assert_eq!(reconnector.attempts(), 0);
    }

    #[test]
    fn suppressed_close_does_not_reconnect() {
        let mut reconnector = Reconnector::default();
        reconnector.suppress();
        assert_eq!(reconnector.on_close(true), None);
        reconnector.resume();
        assert!(reconnector.on_close(true).is_some());
    }

    #[test]
    fn resume_clears_exhaustion() {
        let mut reconnector = Reconnector::default();
        while reconnector.on_close(true).is_some() {}
        reconnector.resume();
        assert!(!reconnector.is_exhausted());
    }

    #[test]
    fn huge_attempts_saturate_at_max_delay() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(40), DEFAULT_RECONNECT_MAX_DELAY);
        assert_eq!(policy.delay_for(0), DEFAULT_RECONNECT_BASE);
    }
}
