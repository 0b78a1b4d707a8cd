//! Fixed-interval polling of long-running remote operations

use std::future::Future;
use std::time::Duration;

/// Interval between status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Status values that know whether they are final.
pub trait PollStatus {
    fn is_terminal(&self) -> bool;
}

/// Repeats a status check until it reports a terminal state.
///
/// A check error ends polling immediately; transport failures are never
/// retried here. There is no attempt limit: callers that need a deadline run
/// the poller inside [`crate::run_interruptible`].
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll until `is_terminal` accepts the status returned by `check`.
    pub async fn poll_until<S, E, F, Fut, P>(&self, mut check: F, is_terminal: P) -> Result<S, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<S, E>>,
        P: Fn(&S) -> bool,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let status = check().await?;
            if is_terminal(&status) {
                tracing::debug!("operation reached a terminal state after {} check(s)", attempt);
                return Ok(status);
            }
            tracing::debug!(
                "operation still in progress (check {}), next check in {:?}",
                attempt,
                self.interval
            );
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Poll a status type that knows its own terminal states.
    pub async fn poll<S, E, F, Fut>(&self, check: F) -> Result<S, E>
    where
        S: PollStatus,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<S, E>>,
    {
        self.poll_until(check, S::is_terminal).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Status {
        Working,
        Succeeded,
    }

    impl PollStatus for Status {
        fn is_terminal(&self) -> bool {
            matches!(self, Status::Succeeded)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_stops_on_terminal_state() {
        let sequence = [Status::Working, Status::Working, Status::Succeeded];
        let calls = Arc::new(AtomicU32::new(0));
        let poller = Poller::default();
        let start = Instant::now();

        let check_calls = calls.clone();
        let result: Result<Status, String> = poller
            .poll(move || {
                let n = check_calls.fetch_add(1, Ordering::SeqCst) as usize;
                async move { Ok(sequence[n]) }
            })
            .await;

        assert_eq!(result, Ok(Status::Succeeded));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // two sleeps of the fixed interval, no backoff
        assert_eq!(start.elapsed(), DEFAULT_POLL_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_returns_check_error_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let poller = Poller::default();
        let start = Instant::now();

        let check_calls = calls.clone();
        let result: Result<Status, String> = poller
            .poll(move || {
                check_calls.fetch_add(1, Ordering::SeqCst);
                async { Err("connection reset".to_string()) }
            })
            .await;

        assert_eq!(result, Err("connection reset".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_custom_predicate() {
        let calls = Arc::new(AtomicU32::new(0));
        let poller = Poller::new(Duration::from_secs(1));

        let check_calls = calls.clone();
        let result: Result<u32, ()> = poller
            .poll_until(
                move || {
                    let n = check_calls.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(n) }
                },
                |n| *n >= 4,
            )
            .await;

        assert_eq!(result, Ok(4));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
