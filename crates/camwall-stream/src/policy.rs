//! Retry decisions for a camera worker. Pure logic: no I/O, no sleeping.
//!
//! Two failure classes are kept apart:
//! - connect failures (resolve or open) back off exponentially and eventually give up;
//! - empty reads on an open stream retry quickly and only force a reconnect
//!   after `consecutiveReadFailureLimit` in a row.
//!
//! A lost stream is reopened after at least the read-retry delay. Streams that
//! die within [`SHORT_LIVED_STREAM_FRAMES`] frames back off like connect
//! failures, so a camera that accepts and then drops every session is not
//! redialed in a tight loop.

use std::time::{Duration, Instant};

use crate::config::EngineConfig;

/// Streams that end before delivering this many frames count as short-lived.
pub const SHORT_LIVED_STREAM_FRAMES: u32 = 25;

/// What to do after a failed connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectDecision {
    Wait(Duration),
    GiveUp,
}

/// What to do after a read that produced no frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadDecision {
    /// Keep the stream open and read again after the delay.
    ShortWait(Duration),
    /// Close the stream and start a fresh connect cycle.
    MarkDisconnected,
}

/// Failure counters owned by one worker's control loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    pub consecutive_failures: u32,
    pub consecutive_empty_reads: u32,
    /// Frames delivered by the stream currently open.
    pub stream_frames: u32,
    /// Consecutive streams that ended while short-lived.
    pub short_lived_streams: u32,
    pub last_attempt: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_retries: u32,
    backoff_base: u32,
    max_wait_units: u32,
    read_failure_limit: u32,
    read_retry_delay: Duration,
    unit: Duration,
    state: RetryState,
}

impl ReconnectPolicy {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: config.retry_backoff_base_sec,
            max_wait_units: config.max_retry_wait_sec,
            read_failure_limit: config.consecutive_read_failure_limit,
            read_retry_delay: config.read_retry_delay(),
            unit: Duration::from_secs(1),
            state: RetryState::default(),
        }
    }

    /// Length of one backoff unit. The configured base and ceiling are counted
    /// in these units; one second unless overridden.
    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    pub fn state(&self) -> &RetryState {
        &self.state
    }

    /// Record the start of a connect attempt.
    pub fn on_attempt(&mut self) {
        self.state.last_attempt = Some(Instant::now());
    }

    /// `min(base^n, maxWait)` units for the n-th consecutive failure.
    pub fn backoff(&self, failures: u32) -> Duration {
        let units = (self.backoff_base as u64)
            .checked_pow(failures)
            .unwrap_or(u64::MAX)
            .min(self.max_wait_units as u64);
        self.unit.saturating_mul(units as u32)
    }

    pub fn on_connect_failure(&mut self) -> ConnectDecision {
        self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
        let n = self.state.consecutive_failures;
        if n >= self.max_retries {
            ConnectDecision::GiveUp
        } else {
            ConnectDecision::Wait(self.backoff(n))
        }
    }

    pub fn on_read_failure(&mut self) -> ReadDecision {
        self.state.consecutive_empty_reads = self.state.consecutive_empty_reads.saturating_add(1);
        if self.state.consecutive_empty_reads >= self.read_failure_limit {
            self.state.consecutive_empty_reads = 0;
            ReadDecision::MarkDisconnected
        } else {
            ReadDecision::ShortWait(self.read_retry_delay)
        }
    }

    /// The stream ended outright; there is nothing left to re-read.
    pub fn on_stream_terminated(&mut self) -> ReadDecision {
        self.state.consecutive_empty_reads = 0;
        ReadDecision::MarkDisconnected
    }

    pub fn on_frame(&mut self) {
        self.state.consecutive_failures = 0;
        self.state.consecutive_empty_reads = 0;
        self.state.stream_frames = self.state.stream_frames.saturating_add(1);
    }

    pub fn on_stream_opened(&mut self) {
        self.state.stream_frames = 0;
    }

    /// The open stream was closed for reconnection. Returns the wait before
    /// the next connect attempt.
    pub fn on_stream_lost(&mut self) -> Duration {
        if self.state.stream_frames < SHORT_LIVED_STREAM_FRAMES {
            self.state.short_lived_streams = self.state.short_lived_streams.saturating_add(1);
            self.read_retry_delay.max(self.backoff(self.state.short_lived_streams))
        } else {
            self.state.short_lived_streams = 0;
            self.read_retry_delay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_retries: u32, base: u32, max_wait: u32) -> ReconnectPolicy {
        ReconnectPolicy::new(&EngineConfig {
            max_retries,
            retry_backoff_base_sec: base,
            max_retry_wait_sec: max_wait,
            ..Default::default()
        })
    }

    #[test]
    fn test_three_failures_with_three_retries() {
        let mut p = policy(3, 2, 60);
        assert_eq!(p.on_connect_failure(), ConnectDecision::Wait(Duration::from_secs(2)));
        assert_eq!(p.on_connect_failure(), ConnectDecision::Wait(Duration::from_secs(4)));
        assert_eq!(p.on_connect_failure(), ConnectDecision::GiveUp);
    }

    #[test]
    fn test_backoff_growth_is_capped_and_non_decreasing() {
        let max_retries = 12;
        let mut p = policy(max_retries, 2, 60);
        let mut previous = Duration::ZERO;
        for k in 1..max_retries {
            match p.on_connect_failure() {
                ConnectDecision::Wait(d) => {
                    let expected = Duration::from_secs(2u64.pow(k).min(60));
                    assert_eq!(d, expected, "wait after failure {k}");
                    assert!(d >= previous);
                    previous = d;
                }
                ConnectDecision::GiveUp => panic!("gave up early at failure {k}"),
            }
        }
        assert_eq!(p.on_connect_failure(), ConnectDecision::GiveUp);
    }

    #[test]
    fn test_backoff_does_not_overflow() {
        let p = policy(100, 60, 60);
        assert_eq!(p.backoff(90), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_unit() {
        let p = policy(5, 2, 60).with_unit(Duration::from_millis(1));
        assert_eq!(p.backoff(3), Duration::from_millis(8));
    }

    #[test]
    fn test_read_failures_until_disconnect() {
        let mut p = policy(5, 2, 60);
        for _ in 0..9 {
            assert_eq!(p.on_read_failure(), ReadDecision::ShortWait(Duration::from_millis(500)));
        }
        assert_eq!(p.state().consecutive_empty_reads, 9);
        assert_eq!(p.on_read_failure(), ReadDecision::MarkDisconnected);
        assert_eq!(p.state().consecutive_empty_reads, 0);
    }

    #[test]
    fn test_frame_resets_counters() {
        let mut p = policy(5, 2, 60);
        p.on_connect_failure();
        p.on_connect_failure();
        for _ in 0..7 {
            p.on_read_failure();
        }
        p.on_frame();
        assert_eq!(p.state().consecutive_failures, 0);
        assert_eq!(p.state().consecutive_empty_reads, 0);
        assert_eq!(p.on_connect_failure(), ConnectDecision::Wait(Duration::from_secs(2)));
    }

    #[test]
    fn test_terminated_stream_disconnects_immediately() {
        let mut p = policy(5, 2, 60);
        p.on_read_failure();
        assert_eq!(p.on_stream_terminated(), ReadDecision::MarkDisconnected);
        assert_eq!(p.state().consecutive_empty_reads, 0);
    }

    #[test]
    fn test_short_lived_streams_back_off() {
        let mut p = policy(5, 2, 60);
        let mut waits = Vec::new();
        for _ in 0..7 {
            p.on_stream_opened();
            p.on_frame();
            p.on_stream_terminated();
            waits.push(p.on_stream_lost());
        }
        let secs: Vec<u64> = waits.iter().map(Duration::as_secs).collect();
        assert_eq!(secs, vec![2, 4, 8, 16, 32, 60, 60]);
        assert_eq!(p.state().consecutive_failures, 0);
    }

    #[test]
    fn test_healthy_stream_resets_churn() {
        let mut p = policy(5, 2, 60);
        p.on_stream_opened();
        p.on_stream_lost();
        p.on_stream_opened();
        p.on_stream_lost();
        assert_eq!(p.state().short_lived_streams, 2);

        p.on_stream_opened();
        for _ in 0..SHORT_LIVED_STREAM_FRAMES {
            p.on_frame();
        }
        assert_eq!(p.on_stream_lost(), Duration::from_millis(500));
        assert_eq!(p.state().short_lived_streams, 0);
    }

    #[test]
    fn test_lost_stream_waits_at_least_read_retry_delay() {
        let mut p = policy(5, 2, 60).with_unit(Duration::from_millis(1));
        p.on_stream_opened();
        assert_eq!(p.on_stream_lost(), Duration::from_millis(500));
    }

    #[test]
    fn test_attempt_timestamp() {
        let mut p = policy(5, 2, 60);
        assert!(p.state().last_attempt.is_none());
        p.on_attempt();
        assert!(p.state().last_attempt.is_some());
    }
}
