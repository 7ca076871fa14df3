use std::thread::sleep;
use std::time::Duration;
use tracing::debug;

/// Executes `f` up to `max_attempts` times, waiting `interval` between attempts.
/// Only errors accepted by `should_retry` trigger a new attempt, any other error is returned right away.
/// Returns the result of the first successful execution of `f` or the latest error.
pub fn retry_if<F, T, E, R>(
    max_attempts: usize,
    interval: Duration,
    should_retry: R,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    R: Fn(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match f() {
            Ok(result) => return Ok(result),
            Err(err) if attempt < max_attempts && should_retry(&err) => {
                debug!(attempt, max_attempts, "Attempt failed, retrying in {interval:?}");
                sleep(interval);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(5);

    #[test]
    fn test_retry_success() {
        let result: Result<&str, &str> = retry_if(3, INTERVAL, |_| true, || Ok("success"));
        assert_eq!(result, Ok("success"));
    }

    #[test]
    fn test_retry_failure() {
        let mut attempts = 0;
        let result: Result<&str, &str> = retry_if(3, INTERVAL, |_| true, || {
            attempts += 1;
            Err("failure")
        });
        assert_eq!(result, Err("failure"));
        assert_eq!(attempts, 3);
    }

    #[test]
    fn test_retry_with_multiple_attempts() {
        let mut attempts = 0;
        let result = retry_if(3, INTERVAL, |_| true, || {
            attempts += 1;
            if attempts < 3 {
                Err("try again")
            } else {
                Ok("finally succeeded")
            }
        });
        assert_eq!(result, Ok("finally succeeded"));
    }

    #[test]
    fn test_non_retryable_error_stops() {
        let mut attempts = 0;
        let result: Result<(), &str> = retry_if(5, INTERVAL, |err| *err == "transient", || {
            attempts += 1;
            if attempts == 1 {
                Err("transient")
            } else {
                Err("fatal")
            }
        });
        assert_eq!(result, Err("fatal"));
        assert_eq!(attempts, 2);
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let mut attempts = 0;
        let _: Result<(), &str> = retry_if(0, INTERVAL, |_| true, || {
            attempts += 1;
            Err("failure")
        });
        assert_eq!(attempts, 1);
    }
}
