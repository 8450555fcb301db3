//! Timed polling with an overall deadline

use std::future::Future;
use std::time::Duration;

/// Interval between attempts and the overall deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSchedule {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    #[error("not done within {timeout:?}")]
    TimedOut { timeout: Duration },

    #[error("{0}")]
    Failed(E),
}

/// Call `f` once per interval until it yields a value, fails, or the
/// deadline passes.
///
/// The first attempt happens after one interval. `f` receives the 1-based
/// attempt number. Dropping the returned future stops polling.
pub async fn poll_until<T, E, F, Fut>(schedule: PollSchedule, mut f: F) -> Result<T, PollError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let polling = async {
        let mut attempt = 0u32;
        loop {
            tokio::time::sleep(schedule.interval).await;
            attempt += 1;

            match f(attempt).await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => continue,
                Err(e) => return Err(PollError::Failed(e)),
            }
        }
    };

    match tokio::time::timeout(schedule.timeout, polling).await {
        Ok(result) => result,
        Err(_) => Err(PollError::TimedOut {
            timeout: schedule.timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn schedule(interval_ms: u64, timeout_ms: u64) -> PollSchedule {
        PollSchedule::new(Duration::from_millis(interval_ms), Duration::from_millis(timeout_ms))
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_one_interval_apart() {
        let start = Instant::now();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let recorder = seen.clone();
        let value = poll_until(schedule(1000, 60_000), move |attempt| {
            let recorder = recorder.clone();
            async move {
                recorder.lock().unwrap().push(Instant::now() - start);
                Ok::<_, ()>(if attempt == 3 { Some("done") } else { None })
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "done");
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(3)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_ends_polling() {
        let attempts = Arc::new(Mutex::new(0u32));

        let counter = attempts.clone();
        let result: Result<(), PollError<()>> = poll_until(schedule(1000, 5000), move |_| {
            let counter = counter.clone();
            async move {
                *counter.lock().unwrap() += 1;
                Ok(None)
            }
        })
        .await;

        assert!(matches!(result, Err(PollError::TimedOut { timeout }) if timeout == Duration::from_secs(5)));
        let attempts = *attempts.lock().unwrap();
        assert!((4..=5).contains(&attempts), "unexpected attempt count {}", attempts);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_stops_polling() {
        let result: Result<u8, PollError<&str>> = poll_until(schedule(10, 1000), |attempt| async move {
            if attempt == 2 {
                Err("boom")
            } else {
                Ok(None)
            }
        })
        .await;

        assert!(matches!(result, Err(PollError::Failed("boom"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_attempt_before_first_interval() {
        let attempts = Arc::new(Mutex::new(0u32));
        let counter = attempts.clone();

        let result: Result<(), PollError<()>> = poll_until(schedule(1000, 500), move |_| {
            let counter = counter.clone();
            async move {
                *counter.lock().unwrap() += 1;
                Ok(Some(()))
            }
        })
        .await;

        assert!(matches!(result, Err(PollError::TimedOut { .. })));
        assert_eq!(*attempts.lock().unwrap(), 0);
    }
}
