/*!
 * # Circuit Breaker
 *
 * Guards calls to the SAP Service Layer so an unreachable ERP fails requests
 * fast instead of tying up handlers until every call times out.
 *
 * Only outages are recorded as failures (transport errors and 5xx answers);
 * a rejected document is SAP working as intended.
 */

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Externally visible breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    /// Probing: calls go through until enough succeed or one fails
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Breaker tuning, read from the `circuit_breaker_*` settings
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive outages that open the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing
    pub timeout: Duration,
    /// Successful probes that close it again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

impl From<&crate::config::AppConfig> for CircuitBreakerConfig {
    fn from(cfg: &crate::config::AppConfig) -> Self {
        Self {
            failure_threshold: cfg.circuit_breaker_failure_threshold.max(1),
            timeout: Duration::from_secs(cfg.circuit_breaker_timeout_secs),
            success_threshold: cfg.circuit_breaker_success_threshold.max(1),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CircuitBreakerError {
    #[error("circuit open, next probe in {retry_in:?}")]
    Open { retry_in: Duration },
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32 },
}

impl Phase {
    fn visible(self) -> CircuitState {
        match self {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

/// Shared breaker; clones observe the same state.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    phase: Arc<Mutex<Phase>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout: Duration, success_threshold: u32) -> Self {
        Self::with_config(CircuitBreakerConfig {
            failure_threshold,
            timeout,
            success_threshold,
        })
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            phase: Arc::new(Mutex::new(Phase::Closed { failures: 0 })),
        }
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        // A panic while holding the lock leaves a valid phase behind.
        self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Lets a call through, or says how long until the next probe.
    ///
    /// An open circuit whose timeout has elapsed moves to half-open here.
    pub fn admit(&self) -> Result<(), CircuitBreakerError> {
        let mut phase = self.phase();
        if let Phase::Open { since } = *phase {
            let elapsed = since.elapsed();
            if elapsed < self.config.timeout {
                return Err(CircuitBreakerError::Open {
                    retry_in: self.config.timeout - elapsed,
                });
            }
            info!("SAP circuit half-open, probing");
            *phase = Phase::HalfOpen { successes: 0 };
        }
        Ok(())
    }

    pub fn record_success(&self) {
        let mut phase = self.phase();
        *phase = match *phase {
            Phase::HalfOpen { successes } if successes + 1 < self.config.success_threshold => {
                Phase::HalfOpen {
                    successes: successes + 1,
                }
            }
            Phase::HalfOpen { .. } => {
                info!("SAP circuit closed");
                Phase::Closed { failures: 0 }
            }
            Phase::Closed { .. } | Phase::Open { .. } => Phase::Closed { failures: 0 },
        };
    }

    pub fn record_failure(&self) {
        let mut phase = self.phase();
        let now = Instant::now();
        *phase = match *phase {
            Phase::Closed { failures } if failures + 1 < self.config.failure_threshold => {
                Phase::Closed {
                    failures: failures + 1,
                }
            }
            Phase::Closed { failures } => {
                warn!(failures = failures + 1, "SAP circuit opened");
                Phase::Open { since: now }
            }
            Phase::HalfOpen { .. } => {
                warn!("SAP probe failed, circuit reopened");
                Phase::Open { since: now }
            }
            Phase::Open { .. } => Phase::Open { since: now },
        };
    }

    pub fn state(&self) -> CircuitState {
        self.phase().visible()
    }
}
