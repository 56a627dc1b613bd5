use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::error::LabError;

/// Error type for polling operations
#[derive(Debug)]
pub enum PollError<E> {
    Timeout(Duration),
    Cancelled,
    /// Error returned by the polled condition
    ConditionError(E),
}

impl<E> std::fmt::Display for PollError<E>
where
    E: std::fmt::Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollError::Timeout(after) => write!(f, "Operation timed out after {:?}", after),
            PollError::Cancelled => write!(f, "Operation cancelled"),
            PollError::ConditionError(e) => write!(f, "Condition error: {}", e),
        }
    }
}

impl<E> std::error::Error for PollError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PollError::ConditionError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PollError<LabError>> for LabError {
    fn from(e: PollError<LabError>) -> Self {
        match e {
            PollError::ConditionError(inner) => inner,
            PollError::Cancelled => LabError::Cancelled,
            timeout @ PollError::Timeout(_) => LabError::Timeout(timeout.to_string()),
        }
    }
}

/// Poll a condition until it returns `Ok(true)`, the timeout expires or the
/// token is cancelled.
///
/// The wait between checks is a sleep on `token`, so cancellation is noticed
/// immediately rather than at the next poll.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use lab_bench::cancel::CancellationToken;
/// use lab_bench::utils::poll_until;
///
/// let mut attempts = 0;
/// poll_until(
///     || {
///         attempts += 1;
///         Ok::<bool, std::io::Error>(attempts >= 3)
///     },
///     Duration::from_secs(1),
///     Duration::from_millis(1),
///     &CancellationToken::new(),
/// )
/// .unwrap();
/// assert_eq!(attempts, 3);
/// ```
pub fn poll_until<F, E>(
    mut condition: F,
    timeout: Duration,
    poll_interval: Duration,
    token: &CancellationToken,
) -> Result<(), PollError<E>>
where
    F: FnMut() -> Result<bool, E>,
{
    let start = Instant::now();

    loop {
        if token.is_cancelled() {
            return Err(PollError::Cancelled);
        }

        match condition() {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => return Err(PollError::ConditionError(e)),
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(PollError::Timeout(elapsed));
        }
        if token.sleep(poll_interval.min(timeout - elapsed)) {
            return Err(PollError::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_until_times_out() {
        let result = poll_until(
            || Ok::<bool, LabError>(false),
            Duration::from_millis(30),
            Duration::from_millis(5),
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(PollError::Timeout(_))));

        let err: LabError = result.unwrap_err().into();
        assert!(matches!(err, LabError::Timeout(_)));
    }

    #[test]
    fn test_poll_until_propagates_condition_error() {
        let result = poll_until(
            || Err::<bool, _>(LabError::Instrument("driver fault".to_string())),
            Duration::from_secs(1),
            Duration::from_millis(5),
            &CancellationToken::new(),
        );
        let err: LabError = result.unwrap_err().into();
        assert!(matches!(err, LabError::Instrument(_)));
    }

    #[test]
    fn test_poll_until_stops_on_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        let result = poll_until(
            || Ok::<bool, LabError>(false),
            Duration::from_secs(10),
            Duration::from_millis(5),
            &token,
        );
        assert!(matches!(result, Err(PollError::Cancelled)));

        let err: LabError = result.unwrap_err().into();
        assert!(matches!(err, LabError::Cancelled));
    }
}
