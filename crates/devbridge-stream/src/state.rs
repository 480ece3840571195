//! Connection state machine
//!
//! [`Machine`] is pure: every input goes through [`Machine::transition`],
//! which updates the state and returns the side effects the driver must
//! perform, in order. Timers and I/O results carry the attempt or timer id
//! they were started for; stale ones are ignored, so a manual reconnect
//! can never race a scheduled one.
//!
//! Edges:
//!
//! ```text
//! disconnected → connecting
//! connecting   → connected | reconnecting | failed | connecting | disconnected
//! connected    → reconnecting | failed | connecting | disconnected
//! reconnecting → connected | reconnecting | failed | connecting | disconnected
//! failed       → reconnecting (cooldown) | connecting (manual) | disconnected
//! ```

use devbridge_proto::ErrorKind;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::backoff::Backoff;
use crate::config::SseConfig;
use crate::error::{ConnectionFailure, FailureReason, SurfacedError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        }
    }

    /// Whether an attempt may be in flight
    fn is_attempting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    pub retry_count: u32,
    pub consecutive_failures: u32,
    pub last_failure_time: Option<Instant>,
}

/// Everything that can happen to a connection
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Connect { url: Url },
    Reconnect,
    Disconnect,
    ClearError,
    HealthChecked {
        attempt: u64,
        result: Result<(), ConnectionFailure>,
    },
    Opened { attempt: u64 },
    StreamFailed {
        attempt: u64,
        failure: ConnectionFailure,
    },
    HeartbeatMissed { attempt: u64 },
    RetryTimerFired { timer: u64 },
    CooldownExpired { timer: u64 },
}

/// Work for the driver
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CheckHealth { attempt: u64, url: Url },
    OpenStream { attempt: u64, url: Url },
    CloseStream,
    StartHeartbeat { attempt: u64 },
    StopHeartbeat,
    CancelTimers,
    ScheduleRetry { timer: u64, delay: Duration },
    ScheduleCooldown { timer: u64, delay: Duration },
    Surface(SurfacedError),
}

#[derive(Debug, Clone)]
struct Policy {
    backoff: Backoff,
    max_retries: u32,
    max_consecutive_failures: u32,
    doom_loop_window: Duration,
    cooldown: Duration,
    health_check: bool,
    silent: bool,
}

pub struct Machine {
    policy: Policy,
    rng: StdRng,
    state: ConnectionState,
    retry: RetryState,
    /// Start of the current failure streak
    streak_started: Option<Instant>,
    url: Option<Url>,
    attempt: u64,
    user_initiated: bool,
    next_timer: u64,
    pending_timer: Option<u64>,
}

impl Machine {
    pub fn new(config: &SseConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic jitter for tests
    pub fn with_rng(config: &SseConfig, rng: StdRng) -> Self {
        Self {
            policy: Policy {
                backoff: Backoff::from_config(config),
                max_retries: config.max_retries,
                max_consecutive_failures: config.max_consecutive_failures.max(1),
                doom_loop_window: config.doom_loop_window,
                cooldown: config.cooldown,
                health_check: config.health_check,
                silent: config.silent,
            },
            rng,
            state: ConnectionState::Disconnected,
            retry: RetryState::default(),
            streak_started: None,
            url: None,
            attempt: 0,
            user_initiated: false,
            next_timer: 0,
            pending_timer: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn retry(&self) -> RetryState {
        self.retry
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Id of the current attempt
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn transition(&mut self, input: Input, now: Instant) -> Vec<Effect> {
        let before = self.state;
        let effects = self.apply(input, now);
        if self.state != before {
            info!("SSE connection {} → {}", before, self.state);
        }
        effects
    }

    fn apply(&mut self, input: Input, now: Instant) -> Vec<Effect> {
        match input {
            Input::Connect { url } => {
                self.url = Some(url);
                self.restart()
            }
            Input::Reconnect => {
                if self.url.is_none() {
                    warn!("Reconnect requested before any connect");
                    return Vec::new();
                }
                self.restart()
            }
            Input::Disconnect => {
                let mut effects = self.teardown();
                effects.push(Effect::CancelTimers);
                self.pending_timer = None;
                self.attempt += 1;
                self.reset_retry();
                self.state = ConnectionState::Disconnected;
                effects
            }
            Input::ClearError => {
                if self.state != ConnectionState::Failed {
                    debug!("clear_error ignored in state {}", self.state);
                    return Vec::new();
                }
                self.pending_timer = None;
                self.retry.retry_count = 0;
                self.state = ConnectionState::Disconnected;
                vec![Effect::CancelTimers]
            }
            Input::HealthChecked { attempt, result } => {
                if !self.is_current(attempt) {
                    return Vec::new();
                }
                match result {
                    Ok(()) => match self.url.clone() {
                        Some(url) => vec![Effect::OpenStream { attempt, url }],
                        None => Vec::new(),
                    },
                    Err(failure) if self.user_initiated => {
                        self.state = ConnectionState::Failed;
                        self.surface(FailureReason::HealthCheck, failure)
                    }
                    Err(failure) => self.on_failure(failure, now),
                }
            }
            Input::Opened { attempt } => {
                if !self.is_current(attempt) {
                    return Vec::new();
                }
                self.state = ConnectionState::Connected;
                self.reset_retry();
                vec![Effect::StartHeartbeat { attempt }]
            }
            Input::StreamFailed { attempt, failure } => {
                if attempt != self.attempt || !self.is_live() {
                    return Vec::new();
                }
                self.on_failure(failure, now)
            }
            Input::HeartbeatMissed { attempt } => {
                if attempt != self.attempt || self.state != ConnectionState::Connected {
                    return Vec::new();
                }
                let failure =
                    ConnectionFailure::new(ErrorKind::Timeout, "Heartbeat not acknowledged");
                self.on_failure(failure, now)
            }
            Input::RetryTimerFired { timer } => {
                if self.pending_timer != Some(timer) || self.state != ConnectionState::Reconnecting
                {
                    return Vec::new();
                }
                self.pending_timer = None;
                self.begin_attempt(false)
            }
            Input::CooldownExpired { timer } => {
                if self.pending_timer != Some(timer) || self.state != ConnectionState::Failed {
                    return Vec::new();
                }
                self.pending_timer = None;
                self.retry.consecutive_failures = 0;
                self.streak_started = None;
                self.begin_attempt(false)
            }
        }
    }

    fn is_current(&self, attempt: u64) -> bool {
        attempt == self.attempt && self.state.is_attempting()
    }

    fn is_live(&self) -> bool {
        self.state.is_attempting() || self.state == ConnectionState::Connected
    }

    fn reset_retry(&mut self) {
        self.retry = RetryState::default();
        self.streak_started = None;
    }

    /// Effects that stop whatever the current attempt is doing
    fn teardown(&self) -> Vec<Effect> {
        if self.is_live() {
            vec![Effect::StopHeartbeat, Effect::CloseStream]
        } else {
            Vec::new()
        }
    }

    /// User-initiated (re)connect: drop everything and start over
    fn restart(&mut self) -> Vec<Effect> {
        let mut effects = self.teardown();
        effects.push(Effect::CancelTimers);
        self.pending_timer = None;
        self.reset_retry();
        effects.extend(self.begin_attempt(true));
        effects
    }

    fn begin_attempt(&mut self, user_initiated: bool) -> Vec<Effect> {
        let Some(url) = self.url.clone() else {
            return Vec::new();
        };
        self.attempt += 1;
        self.user_initiated = user_initiated;
        self.state = if user_initiated {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting
        };

        let attempt = self.attempt;
        if self.policy.health_check {
            vec![Effect::CheckHealth { attempt, url }]
        } else {
            vec![Effect::OpenStream { attempt, url }]
        }
    }

    fn on_failure(&mut self, failure: ConnectionFailure, now: Instant) -> Vec<Effect> {
        let mut effects = self.teardown();
        warn!("SSE connection failed: {}", failure);

        if let Some(last) = self.retry.last_failure_time {
            if now.saturating_duration_since(last) >= self.policy.cooldown {
                self.retry.consecutive_failures = 0;
                self.streak_started = None;
            }
        }
        self.retry.consecutive_failures += 1;
        self.retry.last_failure_time = Some(now);
        let streak_started = *self.streak_started.get_or_insert(now);

        let doom_loop = self.retry.consecutive_failures >= self.policy.max_consecutive_failures
            && now.saturating_duration_since(streak_started) <= self.policy.doom_loop_window;

        if doom_loop {
            self.state = ConnectionState::Failed;
            let timer = self.arm_timer();
            warn!(
                "{} failures in a row, waiting {:?} before retrying",
                self.retry.consecutive_failures, self.policy.cooldown
            );
            effects.push(Effect::ScheduleCooldown {
                timer,
                delay: self.policy.cooldown,
            });
            effects.extend(self.surface(FailureReason::DoomLoop, failure));
        } else if self.retry.retry_count < self.policy.max_retries {
            let delay = self
                .policy
                .backoff
                .delay(self.retry.retry_count, &mut self.rng);
            self.retry.retry_count += 1;
            self.state = ConnectionState::Reconnecting;
            let timer = self.arm_timer();
            debug!(
                "Retry {}/{} in {:?}",
                self.retry.retry_count, self.policy.max_retries, delay
            );
            effects.push(Effect::ScheduleRetry { timer, delay });
        } else {
            self.state = ConnectionState::Failed;
            effects.extend(self.surface(FailureReason::RetriesExhausted, failure));
        }
        effects
    }

    fn arm_timer(&mut self) -> u64 {
        self.next_timer += 1;
        self.pending_timer = Some(self.next_timer);
        self.next_timer
    }

    fn surface(&self, reason: FailureReason, last: ConnectionFailure) -> Vec<Effect> {
        if self.policy.silent {
            debug!("Silent mode, not surfacing: {}", last);
            return Vec::new();
        }
        vec![Effect::Surface(SurfacedError { reason, last })]
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("state", &self.state)
            .field("retry", &self.retry)
            .field("attempt", &self.attempt)
            .field("pending_timer", &self.pending_timer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SseConfig {
        SseConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            max_retries: 4,
            max_consecutive_failures: 5,
            doom_loop_window: Duration::from_secs(30),
            cooldown: Duration::from_secs(60),
            health_check: false,
            ..Default::default()
        }
    }

    fn machine(config: &SseConfig) -> Machine {
        Machine::with_rng(config, StdRng::seed_from_u64(42))
    }

    fn url() -> Url {
        Url::parse("http://127.0.0.1:4098/global/event").unwrap()
    }

    fn failure() -> ConnectionFailure {
        ConnectionFailure::new(ErrorKind::NetworkUnreachable, "refused")
    }

    fn scheduled_retry(effects: &[Effect]) -> Option<(u64, Duration)> {
        effects.iter().find_map(|e| match e {
            Effect::ScheduleRetry { timer, delay } => Some((*timer, *delay)),
            _ => None,
        })
    }

    fn cooldowns(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::ScheduleCooldown { .. }))
            .count()
    }

    #[test]
    fn test_connect_open_connected() {
        let mut m = machine(&config());
        let now = Instant::now();

        let effects = m.transition(Input::Connect { url: url() }, now);
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert!(matches!(effects.last(), Some(Effect::OpenStream { .. })));

        let effects = m.transition(Input::Opened { attempt: m.attempt() }, now);
        assert_eq!(m.state(), ConnectionState::Connected);
        assert_eq!(effects, vec![Effect::StartHeartbeat { attempt: m.attempt() }]);
    }

    #[test]
    fn test_health_check_runs_first() {
        let cfg = SseConfig {
            health_check: true,
            ..config()
        };
        let mut m = machine(&cfg);
        let now = Instant::now();

        let effects = m.transition(Input::Connect { url: url() }, now);
        assert!(matches!(effects.last(), Some(Effect::CheckHealth { .. })));

        let effects = m.transition(
            Input::HealthChecked {
                attempt: m.attempt(),
                result: Ok(()),
            },
            now,
        );
        assert!(matches!(effects[..], [Effect::OpenStream { .. }]));
    }

    #[test]
    fn test_user_connect_health_failure_fails_without_stream() {
        let cfg = SseConfig {
            health_check: true,
            ..config()
        };
        let mut m = machine(&cfg);
        let now = Instant::now();
        m.transition(Input::Connect { url: url() }, now);

        let effects = m.transition(
            Input::HealthChecked {
                attempt: m.attempt(),
                result: Err(failure()),
            },
            now,
        );

        assert_eq!(m.state(), ConnectionState::Failed);
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::OpenStream { .. } | Effect::ScheduleRetry { .. })));
        assert!(matches!(
            effects[..],
            [Effect::Surface(SurfacedError {
                reason: FailureReason::HealthCheck,
                ..
            })]
        ));
    }

    #[test]
    fn test_retry_health_failure_counts_as_stream_error() {
        let cfg = SseConfig {
            health_check: true,
            ..config()
        };
        let mut m = machine(&cfg);
        let now = Instant::now();
        m.transition(Input::Connect { url: url() }, now);
        m.transition(
            Input::HealthChecked {
                attempt: m.attempt(),
                result: Ok(()),
            },
            now,
        );
        let effects = m.transition(
            Input::StreamFailed {
                attempt: m.attempt(),
                failure: failure(),
            },
            now,
        );
        let (timer, _) = scheduled_retry(&effects).unwrap();
        m.transition(Input::RetryTimerFired { timer }, now);

        let effects = m.transition(
            Input::HealthChecked {
                attempt: m.attempt(),
                result: Err(failure()),
            },
            now,
        );

        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert!(scheduled_retry(&effects).is_some());
        assert_eq!(m.retry().retry_count, 2);
    }

    #[test]
    fn test_backoff_schedule_and_exhaustion() {
        let cfg = SseConfig {
            jitter_factor: 0.0,
            max_consecutive_failures: 100,
            ..config()
        };
        let mut m = machine(&cfg);
        let mut now = Instant::now();
        m.transition(Input::Connect { url: url() }, now);

        let mut delays = Vec::new();
        for _ in 0..cfg.max_retries {
            let effects = m.transition(
                Input::StreamFailed {
                    attempt: m.attempt(),
                    failure: failure(),
                },
                now,
            );
            let (timer, delay) = scheduled_retry(&effects).unwrap();
            delays.push(delay);
            now += delay;
            m.transition(Input::RetryTimerFired { timer }, now);
            assert_eq!(m.state(), ConnectionState::Reconnecting);
        }

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800)
            ]
        );

        let effects = m.transition(
            Input::StreamFailed {
                attempt: m.attempt(),
                failure: failure(),
            },
            now,
        );
        assert_eq!(m.state(), ConnectionState::Failed);
        assert!(matches!(
            effects.last(),
            Some(Effect::Surface(SurfacedError {
                reason: FailureReason::RetriesExhausted,
                ..
            }))
        ));
    }

    #[test]
    fn test_retry_count_monotonic_and_delay_bounded() {
        let cfg = SseConfig {
            max_retries: 50,
            max_consecutive_failures: 1000,
            ..config()
        };
        let backoff = Backoff::from_config(&cfg);
        let mut m = machine(&cfg);
        let mut now = Instant::now();
        m.transition(Input::Connect { url: url() }, now);

        let mut last_count = 0;
        for _ in 0..40 {
            let effects = m.transition(
                Input::StreamFailed {
                    attempt: m.attempt(),
                    failure: failure(),
                },
                now,
            );
            assert!(m.retry().retry_count >= last_count);
            last_count = m.retry().retry_count;

            let (timer, delay) = scheduled_retry(&effects).unwrap();
            assert!(delay <= backoff.ceiling() + Duration::from_micros(1));
            now += delay;
            m.transition(Input::RetryTimerFired { timer }, now);
        }
    }

    #[test]
    fn test_doom_loop_schedules_exactly_one_cooldown_retry() {
        let cfg = config();
        let mut m = machine(&cfg);
        let mut now = Instant::now();
        m.transition(Input::Connect { url: url() }, now);

        let mut all = Vec::new();
        for i in 0..cfg.max_consecutive_failures {
            let effects = m.transition(
                Input::StreamFailed {
                    attempt: m.attempt(),
                    failure: failure(),
                },
                now,
            );
            all.extend(effects.clone());
            if i + 1 < cfg.max_consecutive_failures {
                let (timer, _) = scheduled_retry(&effects).unwrap();
                now += Duration::from_millis(10);
                m.transition(Input::RetryTimerFired { timer }, now);
            }
        }

        assert_eq!(m.state(), ConnectionState::Failed);
        assert_eq!(cooldowns(&all), 1);
        assert!(all.iter().any(|e| matches!(
            e,
            Effect::Surface(SurfacedError {
                reason: FailureReason::DoomLoop,
                ..
            })
        )));
        let timer = all
            .iter()
            .find_map(|e| match e {
                Effect::ScheduleCooldown { timer, delay } => {
                    assert_eq!(*delay, cfg.cooldown);
                    Some(*timer)
                }
                _ => None,
            })
            .unwrap();

        // Nothing but the cooldown timer revives the connection.
        for stale in 0..timer {
            assert!(m
                .transition(Input::RetryTimerFired { timer: stale }, now)
                .is_empty());
        }
        assert_eq!(m.state(), ConnectionState::Failed);

        now += cfg.cooldown;
        let effects = m.transition(Input::CooldownExpired { timer }, now);
        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert!(matches!(effects[..], [Effect::OpenStream { .. }]));
        assert_eq!(m.retry().consecutive_failures, 0);
    }

    #[test]
    fn test_slow_failures_are_not_a_doom_loop() {
        let cfg = SseConfig {
            max_retries: 20,
            ..config()
        };
        let mut m = machine(&cfg);
        let mut now = Instant::now();
        m.transition(Input::Connect { url: url() }, now);

        for _ in 0..8 {
            let effects = m.transition(
                Input::StreamFailed {
                    attempt: m.attempt(),
                    failure: failure(),
                },
                now,
            );
            assert_eq!(cooldowns(&effects), 0);
            let (timer, _) = scheduled_retry(&effects).unwrap();
            now += Duration::from_secs(20);
            m.transition(Input::RetryTimerFired { timer }, now);
        }
        assert_eq!(m.state(), ConnectionState::Reconnecting);
    }

    #[test]
    fn test_silent_mode_surfaces_nothing() {
        let cfg = SseConfig {
            max_retries: 0,
            silent: true,
            ..config()
        };
        let mut m = machine(&cfg);
        let now = Instant::now();
        m.transition(Input::Connect { url: url() }, now);

        let effects = m.transition(
            Input::StreamFailed {
                attempt: m.attempt(),
                failure: failure(),
            },
            now,
        );

        assert_eq!(m.state(), ConnectionState::Failed);
        assert!(!effects.iter().any(|e| matches!(e, Effect::Surface(_))));
    }

    #[test]
    fn test_heartbeat_miss_reconnects() {
        let mut m = machine(&config());
        let now = Instant::now();
        m.transition(Input::Connect { url: url() }, now);
        m.transition(Input::Opened { attempt: m.attempt() }, now);

        let effects = m.transition(Input::HeartbeatMissed { attempt: m.attempt() }, now);

        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert!(effects.contains(&Effect::StopHeartbeat));
        assert!(effects.contains(&Effect::CloseStream));
        assert!(scheduled_retry(&effects).is_some());
    }

    #[test]
    fn test_manual_reconnect_beats_scheduled_retry() {
        let mut m = machine(&config());
        let now = Instant::now();
        m.transition(Input::Connect { url: url() }, now);
        let effects = m.transition(
            Input::StreamFailed {
                attempt: m.attempt(),
                failure: failure(),
            },
            now,
        );
        let (timer, _) = scheduled_retry(&effects).unwrap();

        let effects = m.transition(Input::Reconnect, now);
        assert!(effects.contains(&Effect::CancelTimers));
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert_eq!(m.retry(), RetryState::default());
        let attempt = m.attempt();

        // The old timer firing late is ignored.
        assert!(m.transition(Input::RetryTimerFired { timer }, now).is_empty());
        assert_eq!(m.attempt(), attempt);
    }

    #[test]
    fn test_stale_attempt_results_are_ignored() {
        let mut m = machine(&config());
        let now = Instant::now();
        m.transition(Input::Connect { url: url() }, now);
        let old = m.attempt();
        m.transition(Input::Reconnect, now);

        assert!(m.transition(Input::Opened { attempt: old }, now).is_empty());
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert!(m
            .transition(
                Input::StreamFailed {
                    attempt: old,
                    failure: failure()
                },
                now
            )
            .is_empty());
    }

    #[test]
    fn test_disconnect_resets_everything() {
        let mut m = machine(&config());
        let now = Instant::now();
        m.transition(Input::Connect { url: url() }, now);
        let effects = m.transition(
            Input::StreamFailed {
                attempt: m.attempt(),
                failure: failure(),
            },
            now,
        );
        let (timer, _) = scheduled_retry(&effects).unwrap();

        let effects = m.transition(Input::Disconnect, now);

        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(m.retry(), RetryState::default());
        assert!(effects.contains(&Effect::CancelTimers));
        assert!(m.transition(Input::RetryTimerFired { timer }, now).is_empty());
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_failed_never_goes_straight_to_connected() {
        let cfg = SseConfig {
            max_retries: 0,
            ..config()
        };
        let mut m = machine(&cfg);
        let now = Instant::now();
        m.transition(Input::Connect { url: url() }, now);
        let attempt = m.attempt();
        m.transition(
            Input::StreamFailed {
                attempt,
                failure: failure(),
            },
            now,
        );
        assert_eq!(m.state(), ConnectionState::Failed);

        assert!(m.transition(Input::Opened { attempt }, now).is_empty());
        assert_eq!(m.state(), ConnectionState::Failed);
    }

    #[test]
    fn test_clear_error_only_from_failed() {
        let cfg = SseConfig {
            max_retries: 0,
            ..config()
        };
        let mut m = machine(&cfg);
        let now = Instant::now();

        assert!(m.transition(Input::ClearError, now).is_empty());
        assert_eq!(m.state(), ConnectionState::Disconnected);

        m.transition(Input::Connect { url: url() }, now);
        m.transition(
            Input::StreamFailed {
                attempt: m.attempt(),
                failure: failure(),
            },
            now,
        );
        assert_eq!(m.state(), ConnectionState::Failed);

        m.transition(Input::ClearError, now);
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(m.retry().retry_count, 0);

        m.transition(Input::Connect { url: url() }, now);
        assert_eq!(m.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_reconnect_without_url_is_noop() {
        let mut m = machine(&config());
        assert!(m.transition(Input::Reconnect, Instant::now()).is_empty());
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }
}
