use log::warn;
use std::fmt::Display;
use std::thread;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

const MAX_DELAY: Duration = Duration::from_secs(600);

/// Runs `operation` up to `max_attempts` times. The delay between attempts
/// starts at `base_delay`, doubles each time, is capped at ten minutes, and
/// carries +/-25% jitter. The last error is returned once the budget runs
/// out.
pub fn retry_with_backoff<F, T, E>(
    context: &str,
    max_attempts: u32,
    base_delay: Duration,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: Display,
{
    let mut attempt = 1u32;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => return Err(err),
            Err(err) => {
                let delay = backoff_delay(base_delay, attempt);
                warn!(
                    "Attempt {}/{} for {} failed: {}. Retrying in {:.1}s.",
                    attempt,
                    max_attempts,
                    context,
                    err,
                    delay.as_secs_f64()
                );
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let doubled = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
    let capped = doubled.min(MAX_DELAY);
    let millis = capped.as_millis() as u64;
    let jitter_range = millis / 4;
    if jitter_range == 0 {
        return capped;
    }
    let jitter = fastrand::u64(0..=jitter_range * 2);
    Duration::from_millis(millis - jitter_range + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_first_success() {
        let mut calls = 0u32;
        let result: Result<u32, String> =
            retry_with_backoff("test op", 5, Duration::ZERO, || {
                calls += 1;
                if calls < 3 {
                    Err("transient".to_string())
                } else {
                    Ok(calls)
                }
            });
        assert_eq!(result, Ok(3));
        assert_eq!(calls, 3);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut calls = 0u32;
        let result: Result<(), String> = retry_with_backoff("test op", 4, Duration::ZERO, || {
            calls += 1;
            Err(format!("failure {}", calls))
        });
        assert_eq!(result, Err("failure 4".to_string()));
        assert_eq!(calls, 4);
    }

    #[test]
    fn backoff_doubles_and_stays_within_jitter_band() {
        let base = Duration::from_secs(60);
        for attempt in 1..=4 {
            let nominal = 60u64 * 2u64.pow(attempt - 1) * 1000;
            let delay = backoff_delay(base, attempt).as_millis() as u64;
            assert!(delay >= nominal - nominal / 4);
            assert!(delay <= nominal + nominal / 4);
        }
    }
}
