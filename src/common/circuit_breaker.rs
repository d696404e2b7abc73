//! Circuit breaker for exchange requests
//!
//! After `failure_threshold` consecutive failed requests the breaker opens and
//! rejects calls without touching the network. Once `cooldown` has passed it
//! lets trial requests through (half-open); `success_threshold` successful
//! trials close it again, a single failed trial re-opens it.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            cooldown: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold.max(1);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32 },
}

#[derive(Debug)]
pub struct CircuitBreaker {
    phase: Phase,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            phase: Phase::Closed { failures: 0 },
            config,
        }
    }

    pub fn state(&self) -> CircuitState {
        match self.phase {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Whether a request may go out now. Moves Open -> HalfOpen after the cooldown.
    pub fn admit(&mut self) -> bool {
        match self.phase {
            Phase::Closed { .. } | Phase::HalfOpen { .. } => true,
            Phase::Open { since } if since.elapsed() >= self.config.cooldown => {
                tracing::info!("Circuit breaker half-open, probing exchange");
                self.phase = Phase::HalfOpen { successes: 0 };
                true
            }
            Phase::Open { .. } => false,
        }
    }

    pub fn on_success(&mut self) {
        self.phase = match self.phase {
            Phase::HalfOpen { successes } if successes + 1 < self.config.success_threshold => {
                Phase::HalfOpen {
                    successes: successes + 1,
                }
            }
            Phase::HalfOpen { .. } => {
                tracing::info!("Circuit breaker closed, exchange recovered");
                Phase::Closed { failures: 0 }
            }
            Phase::Closed { .. } => Phase::Closed { failures: 0 },
            open @ Phase::Open { .. } => open,
        };
    }

    pub fn on_failure(&mut self) {
        self.phase = match self.phase {
            Phase::Closed { failures } if failures + 1 < self.config.failure_threshold => {
                Phase::Closed {
                    failures: failures + 1,
                }
            }
            Phase::Closed { failures } => {
                tracing::warn!("Circuit breaker opened after {} failures", failures + 1);
                Phase::Open {
                    since: Instant::now(),
                }
            }
            Phase::HalfOpen { .. } => {
                tracing::warn!("Circuit breaker re-opened, trial request failed");
                Phase::Open {
                    since: Instant::now(),
                }
            }
            Phase::Open { .. } => Phase::Open {
                since: Instant::now(),
            },
        };
    }

    pub fn reset(&mut self) {
        self.phase = Phase::Closed { failures: 0 };
    }
}
