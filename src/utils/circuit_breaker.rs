use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Guards the broker connection so a dead broker fails publishes fast instead
// of stalling the outbox relay on every row.
//
//   Closed ──(failure_threshold)──► Open ──(timeout)──► HalfOpen
//      ▲                                                   │
//      └──────────────(success_threshold)──────────────────┘
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
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

    /// 0 = closed, 1 = half-open, 2 = open
    pub fn gauge_value(&self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        }
    }
}

pub type StateObserver = Arc<dyn Fn(CircuitState) + Send + Sync>;

#[derive(Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    /// Time spent open before a trial call is let through
    pub timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 3,
        }
    }
}

struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_time: None,
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    state: Arc<Mutex<BreakerState>>,
    config: CircuitBreakerConfig,
    observer: Option<StateObserver>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(BreakerState::closed())),
            config,
            observer: None,
        }
    }

    /// Called with the new state on every transition.
    pub fn with_observer(mut self, observer: StateObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState) {
        if state.state == to {
            return;
        }
        tracing::info!(
            breaker = %self.name,
            from = state.state.as_str(),
            to = to.as_str(),
            "Circuit breaker state change"
        );
        state.state = to;
        if let Some(observer) = &self.observer {
            observer(to);
        }
    }

    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        {
            let mut state = self.state.lock().await;
            if state.state == CircuitState::Open {
                let cooled_down = state
                    .last_failure_time
                    .map_or(true, |at| at.elapsed() >= self.config.timeout);
                if !cooled_down {
                    return Err(CircuitBreakerError::CircuitOpen);
                }
                state.success_count = 0;
                self.transition(&mut state, CircuitState::HalfOpen);
            }
        }

        match operation.await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(err) => {
                self.record_failure().await;
                Err(CircuitBreakerError::OperationFailed(err))
            }
        }
    }

    async fn record_success(&self) {
        let mut state = self.state.lock().await;
        match state.state {
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    *state = BreakerState {
                        state: CircuitState::HalfOpen,
                        ..BreakerState::closed()
                    };
                    self.transition(&mut state, CircuitState::Closed);
                }
            }
            CircuitState::Closed => state.failure_count = 0,
            CircuitState::Open => {}
        }
    }

    async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());

        match state.state {
            CircuitState::Closed if state.failure_count >= self.config.failure_threshold => {
                tracing::warn!(
                    breaker = %self.name,
                    failures = state.failure_count,
                    "Circuit breaker opening"
                );
                self.transition(&mut state, CircuitState::Open);
            }
            CircuitState::HalfOpen => {
                state.success_count = 0;
                self.transition(&mut state, CircuitState::Open);
            }
            _ => {}
        }
    }

    pub async fn get_state(&self) -> CircuitState {
        self.state.lock().await.state
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        let previous = state.state;
        *state = BreakerState {
            state: previous,
            ..BreakerState::closed()
        };
        self.transition(&mut state, CircuitState::Closed);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker is open")]
    CircuitOpen,
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn breaker(failures: u32, timeout_ms: u64, successes: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: failures,
                timeout: Duration::from_millis(timeout_ms),
                success_threshold: successes,
            },
        )
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let cb = breaker(3, 1_000, 2);

        for _ in 0..3 {
            assert!(cb.call(async { Err::<(), _>("refused") }).await.is_err());
        }
        assert_eq!(cb.get_state().await, CircuitState::Open);

        let result = cb.call(async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen)));
    }

    #[tokio::test]
    async fn test_half_open_success_closes_and_failure_reopens() {
        let cb = breaker(1, 20, 1);

        let _ = cb.call(async { Err::<(), _>("refused") }).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cb.call(async { Ok::<_, &str>(()) }).await.is_ok());
        assert_eq!(cb.get_state().await, CircuitState::Closed);

        let _ = cb.call(async { Err::<(), _>("refused") }).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = cb.call(async { Err::<(), _>("still refused") }).await;
        assert_eq!(cb.get_state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_observer_sees_every_transition() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let cb = breaker(1, 1_000, 1).with_observer(Arc::new(move |state| {
            sink.lock().unwrap().push(state);
        }));

        let _ = cb.call(async { Err::<(), _>("refused") }).await;
        cb.reset().await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![CircuitState::Open, CircuitState::Closed]
        );
        assert_eq!(CircuitState::Open.gauge_value(), 2);
    }
}
