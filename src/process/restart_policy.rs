//! Backoff bookkeeping for collector process restarts.
//!
//! A direct port of the on-host supervisor's restart policy: three backoff
//! shapes sharing one `tries`/`last_retry` counter, with a ceiling on both
//! the delay (`last_retry_interval`) and the attempt count (`max_retries`,
//! `0` meaning unlimited).

use std::time::{Duration, Instant};

const LAST_RETRY_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    Exponential,
}

#[derive(Debug, Clone)]
pub struct RestartPolicy {
    strategy: BackoffStrategy,
    backoff: Backoff,
}

impl RestartPolicy {
    pub fn new(strategy: BackoffStrategy, initial_delay: Duration, max_retries: u32) -> Self {
        Self {
            strategy,
            backoff: Backoff::new(initial_delay, max_retries),
        }
    }

    /// Whether another restart attempt is permitted under `max_retries`.
    pub fn should_backoff(&self) -> bool {
        self.backoff.should_backoff()
    }

    /// Records an attempt and returns how long to wait before the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = match self.strategy {
            BackoffStrategy::Fixed => fixed(&self.backoff),
            BackoffStrategy::Linear => linear(&self.backoff),
            BackoffStrategy::Exponential => exponential(&self.backoff),
        };
        self.backoff.record_attempt();
        delay
    }

    pub fn tries(&self) -> u32 {
        self.backoff.tries
    }

    /// Resets the attempt counter, e.g. after the process has stayed up
    /// past a stability threshold.
    pub fn reset(&mut self) {
        self.backoff.tries = 0;
        self.backoff.last_retry = None;
    }
}

#[derive(Debug, Clone)]
struct Backoff {
    last_retry: Option<Instant>,
    tries: u32,
    initial_delay: Duration,
    max_retries: u32,
    last_retry_interval: Duration,
}

impl Backoff {
    fn new(initial_delay: Duration, max_retries: u32) -> Self {
        Self {
            last_retry: None,
            tries: 0,
            initial_delay,
            max_retries,
            last_retry_interval: LAST_RETRY_INTERVAL,
        }
    }

    fn should_backoff(&self) -> bool {
        self.max_retries == 0 || self.tries < self.max_retries
    }

    fn record_attempt(&mut self) {
        self.tries += 1;
        self.last_retry = Some(Instant::now());
    }
}

fn fixed(backoff: &Backoff) -> Duration {
    backoff.initial_delay.min(backoff.last_retry_interval)
}

fn linear(backoff: &Backoff) -> Duration {
    let attempt = backoff.tries.max(1);
    (backoff.initial_delay * attempt).min(backoff.last_retry_interval)
}

fn exponential(backoff: &Backoff) -> Duration {
    let attempt = backoff.tries.max(1);
    let factor = 2u32.saturating_pow(attempt - 1);
    (backoff.initial_delay * factor).min(backoff.last_retry_interval)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_backoff_never_changes() {
        let mut policy = RestartPolicy::new(BackoffStrategy::Fixed, Duration::from_secs(1), 0);
        assert_eq!(policy.next_delay(), Duration::from_secs(1));
        assert_eq!(policy.next_delay(), Duration::from_secs(1));
        assert_eq!(policy.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn linear_backoff_grows_with_tries() {
        let mut policy = RestartPolicy::new(BackoffStrategy::Linear, Duration::from_secs(1), 0);
        assert_eq!(policy.next_delay(), Duration::from_secs(1));
        assert_eq!(policy.next_delay(), Duration::from_secs(2));
        assert_eq!(policy.next_delay(), Duration::from_secs(3));
    }

    #[test]
    fn exponential_backoff_doubles() {
        let mut policy = RestartPolicy::new(BackoffStrategy::Exponential, Duration::from_secs(1), 0);
        assert_eq!(policy.next_delay(), Duration::from_secs(1));
        assert_eq!(policy.next_delay(), Duration::from_secs(2));
        assert_eq!(policy.next_delay(), Duration::from_secs(4));
    }

    #[test]
    fn delay_is_capped_at_last_retry_interval() {
        let mut policy = RestartPolicy::new(BackoffStrategy::Exponential, Duration::from_secs(10), 0);
        for _ in 0..10 {
            policy.next_delay();
        }
        assert_eq!(policy.next_delay(), LAST_RETRY_INTERVAL);
    }

    #[test]
    fn should_backoff_respects_max_retries() {
        let mut policy = RestartPolicy::new(BackoffStrategy::Fixed, Duration::from_millis(1), 2);
        assert!(policy.should_backoff());
        policy.next_delay();
        assert!(policy.should_backoff());
        policy.next_delay();
        assert!(!policy.should_backoff());
    }

    #[test]
    fn unlimited_retries_when_max_retries_is_zero() {
        let mut policy = RestartPolicy::new(BackoffStrategy::Fixed, Duration::from_millis(1), 0);
        for _ in 0..1000 {
            policy.next_delay();
        }
        assert!(policy.should_backoff());
    }

    #[test]
    fn reset_clears_tries() {
        let mut policy = RestartPolicy::new(BackoffStrategy::Linear, Duration::from_secs(1), 3);
        policy.next_delay();
        policy.next_delay();
        assert_eq!(policy.tries(), 2);
        policy.reset();
        assert_eq!(policy.tries(), 0);
        assert!(policy.should_backoff());
    }
}
