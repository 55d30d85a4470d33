use failsafe::{backoff, failure_policy, Config};
use std::time::Duration;

/// Consecutive failed batches before the storage breaker opens.
pub const STORAGE_FAILURE_THRESHOLD: u32 = 3;

/// Creates the breaker guarding lead storage within one pipeline run.
///
/// # Configuration
///
/// - **Failure threshold**: 3 consecutive failed batches open the circuit.
/// - **Backoff**: exponential from 5s to 60s before a batch is tried again.
///
/// While open, remaining batches are not attempted and are counted as
/// storage errors.
pub fn create_storage_circuit_breaker() -> impl failsafe::CircuitBreaker {
    let backoff_strategy = backoff::exponential(Duration::from_secs(5), Duration::from_secs(60));

    let failure_policy =
        failure_policy::consecutive_failures(STORAGE_FAILURE_THRESHOLD, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use failsafe::{CircuitBreaker, Error};

    #[test]
    fn opens_after_consecutive_failed_batches() {
        let cb = create_storage_circuit_breaker();

        for _ in 0..STORAGE_FAILURE_THRESHOLD {
            let result: Result<(), Error<&str>> = cb.call(|| Err::<(), &str>("store down"));
            assert!(matches!(result, Err(Error::Inner("store down"))));
        }

        assert!(!cb.is_call_permitted());
        let result: Result<(), Error<&str>> = cb.call(|| Ok::<(), &str>(()));
        assert!(matches!(result, Err(Error::Rejected)));
    }

    #[test]
    fn success_resets_the_failure_count() {
        let cb = create_storage_circuit_breaker();

        for _ in 0..STORAGE_FAILURE_THRESHOLD - 1 {
            let _ = cb.call(|| Err::<(), &str>("blip"));
        }
        assert_eq!(cb.call(|| Ok::<usize, &str>(25)).unwrap(), 25);
        let _ = cb.call(|| Err::<(), &str>("blip"));

        assert!(cb.is_call_permitted());
    }
}
