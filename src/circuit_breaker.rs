use failsafe::backoff::{self, Exponential};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::futures::CircuitBreaker;
use failsafe::{Config, StateMachine};
use std::future::Future;
use std::time::Duration;

use crate::errors::AdapterError;

/// Circuit breaker guarding one upstream adapter.
pub type AdapterBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

/// Creates a circuit breaker for one upstream adapter to prevent cascading failures.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// # States
///
/// - **CLOSED**: Normal operation, requests pass through.
/// - **OPEN**: Too many failures, requests fail fast with [`AdapterError::CircuitOpen`].
/// - **HALF_OPEN**: Testing if the upstream recovered.
pub fn create_adapter_circuit_breaker() -> AdapterBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}

/// Runs `call` through `breaker`.
///
/// Only errors that reflect upstream health are counted; see
/// [`AdapterError::counts_against_breaker`].
pub async fn guarded<T, F>(breaker: &AdapterBreaker, call: F) -> Result<T, AdapterError>
where
    F: Future<Output = Result<T, AdapterError>>,
{
    match breaker
        .call_with(AdapterError::counts_against_breaker, call)
        .await
    {
        Ok(value) => Ok(value),
        Err(failsafe::Error::Inner(e)) => Err(e),
        Err(failsafe::Error::Rejected) => Err(AdapterError::CircuitOpen),
    }
}

/// Runs `call` only while `breaker` permits calls, without recording the
/// outcome.
///
/// Used when the request supplied its own credential: a bad caller key says
/// nothing about the upstream and must not open the breaker for everyone.
pub async fn permitted<T, F>(breaker: &AdapterBreaker, call: F) -> Result<T, AdapterError>
where
    F: Future<Output = Result<T, AdapterError>>,
{
    if !breaker.is_call_permitted() {
        return Err(AdapterError::CircuitOpen);
    }
    call.await
}
