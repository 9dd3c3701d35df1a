//! Bounded polling of an asynchronous readiness check.
//!
//! [`poll_until_ready`] drives any predicate until it reports ready, the
//! attempt budget runs out, an optional overall deadline passes, or a
//! [`CancelSignal`] fires. The sleep between attempts is the only place the
//! loop waits on its own; the predicate is expected to bound its own work.

use std::{future::Future, num::NonZeroU32, time::Duration};

use thiserror::Error;
use tokio::{
    sync::watch,
    time::{sleep_until, Instant},
};

/// Retry parameters for [`poll_until_ready`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: NonZeroU32,
    pub interval: Duration,
    pub deadline: Option<Duration>,
}

impl PollPolicy {
    pub fn new(max_attempts: NonZeroU32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            deadline: None,
        }
    }

    /// Caps the total time spent polling, independent of the attempt budget.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Progress notifications emitted while polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    /// A check returned not ready. `retrying` is false for the final attempt.
    NotReady {
        attempt: u32,
        max_attempts: u32,
        retrying: bool,
    },
    Ready { attempt: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("not ready after {attempts} attempts")]
    Exhausted { attempts: u32 },
    #[error("deadline of {deadline:?} elapsed after {attempts} attempts")]
    DeadlineElapsed { attempts: u32, deadline: Duration },
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

/// Receiving half of a cancellation pair.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

/// Sending half of a cancellation pair.
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl CancelSignal {
    /// Creates a linked canceller and signal.
    pub fn pair() -> (Canceller, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (Canceller { tx }, CancelSignal { rx: Some(rx) })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancellation is requested. Never resolves if the
    /// canceller was dropped without cancelling.
    pub async fn cancelled(&mut self) {
        if let Some(rx) = self.rx.as_mut() {
            if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}

impl Canceller {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Sleep used when the interval does not fit on the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Runs `check` until it returns `true`.
///
/// Attempts are numbered from 1. After a failed attempt the loop sleeps for
/// `policy.interval` unless that attempt was the last one allowed. Returns the
/// number of the successful attempt.
pub async fn poll_until_ready<C, Fut, O>(
    policy: PollPolicy,
    cancel: &mut CancelSignal,
    mut check: C,
    mut observer: O,
) -> Result<u32, PollError>
where
    C: FnMut(u32) -> Fut,
    Fut: Future<Output = bool>,
    O: FnMut(PollEvent),
{
    let max_attempts = policy.max_attempts.get();
    // A deadline past the clock's range never elapses.
    let deadline_at = policy
        .deadline
        .and_then(|deadline| Instant::now().checked_add(deadline));
    let mut attempt = 1u32;

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled {
                attempts: attempt - 1,
            });
        }

        if check(attempt).await {
            observer(PollEvent::Ready { attempt });
            return Ok(attempt);
        }

        let retrying = attempt < max_attempts;
        observer(PollEvent::NotReady {
            attempt,
            max_attempts,
            retrying,
        });
        if !retrying {
            return Err(PollError::Exhausted { attempts: attempt });
        }

        let now = Instant::now();
        let wake_at = match (now.checked_add(policy.interval), deadline_at) {
            (Some(wake_at), Some(deadline_at)) => wake_at.min(deadline_at),
            (Some(wake_at), None) => wake_at,
            (None, Some(deadline_at)) => deadline_at,
            (None, None) => now + FAR_FUTURE,
        };

        tokio::select! {
            _ = sleep_until(wake_at) => {}
            _ = cancel.cancelled() => {
                return Err(PollError::Cancelled { attempts: attempt });
            }
        }

        if let (Some(deadline_at), Some(deadline)) = (deadline_at, policy.deadline) {
            if Instant::now() >= deadline_at {
                return Err(PollError::DeadlineElapsed {
                    attempts: attempt,
                    deadline,
                });
            }
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    fn policy(max_attempts: u32, interval_secs: u64) -> PollPolicy {
        PollPolicy::new(
            NonZeroU32::new(max_attempts).expect("non-zero"),
            Duration::from_secs(interval_secs),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn never_ready_runs_exactly_the_budget() {
        let started = Instant::now();
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut events = Vec::new();

        let result = poll_until_ready(
            policy(30, 1),
            &mut CancelSignal::never(),
            |attempt| {
                let calls = Rc::clone(&calls);
                async move {
                    calls.borrow_mut().push((attempt, started.elapsed()));
                    false
                }
            },
            |event| events.push(event),
        )
        .await;

        assert_eq!(result, Err(PollError::Exhausted { attempts: 30 }));
        let calls = calls.borrow();
        assert_eq!(calls.len(), 30);
        for (index, (attempt, at)) in calls.iter().enumerate() {
            assert_eq!(*attempt, index as u32 + 1);
            assert_eq!(*at, Duration::from_secs(index as u64));
        }
        assert_eq!(started.elapsed(), Duration::from_secs(29));
        assert_eq!(events.len(), 30);
        assert_eq!(
            events.last(),
            Some(&PollEvent::NotReady {
                attempt: 30,
                max_attempts: 30,
                retrying: false
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_first_success_without_sleeping() {
        let started = Instant::now();
        let mut events = Vec::new();

        let result = poll_until_ready(
            policy(30, 1),
            &mut CancelSignal::never(),
            |attempt| async move { attempt == 6 },
            |event| events.push(event),
        )
        .await;

        assert_eq!(result, Ok(6));
        assert_eq!(started.elapsed(), Duration::from_secs(5));
        let not_ready = events
            .iter()
            .filter(|event| matches!(event, PollEvent::NotReady { .. }))
            .count();
        assert_eq!(not_ready, 5);
        assert_eq!(events.last(), Some(&PollEvent::Ready { attempt: 6 }));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_on_first_attempt_returns_immediately() {
        let started = Instant::now();
        let result = poll_until_ready(
            policy(1, 10),
            &mut CancelSignal::never(),
            |_| async { true },
            |_| {},
        )
        .await;

        assert_eq!(result, Ok(1));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cuts_the_budget_short() {
        let started = Instant::now();
        let result = poll_until_ready(
            policy(30, 1).with_deadline(Some(Duration::from_millis(2500))),
            &mut CancelSignal::never(),
            |_| async { false },
            |_| {},
        )
        .await;

        assert_eq!(
            result,
            Err(PollError::DeadlineElapsed {
                attempts: 3,
                deadline: Duration::from_millis(2500)
            })
        );
        assert_eq!(started.elapsed(), Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_sleep() {
        let (canceller, mut signal) = CancelSignal::pair();
        let started = Instant::now();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            canceller.cancel();
        });

        let result = poll_until_ready(policy(30, 1), &mut signal, |_| async { false }, |_| {}).await;

        assert_eq!(result, Err(PollError::Cancelled { attempts: 2 }));
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_deadline_is_ignored() {
        let policy = policy(3, 1).with_deadline(Some(Duration::MAX));
        let started = Instant::now();

        let result =
            poll_until_ready(policy, &mut CancelSignal::never(), |_| async { false }, |_| {}).await;

        assert_eq!(result, Err(PollError::Exhausted { attempts: 3 }));
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_interval_waits_until_cancelled() {
        let (canceller, mut signal) = CancelSignal::pair();
        let policy = PollPolicy::new(NonZeroU32::new(5).expect("non-zero"), Duration::MAX);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            canceller.cancel();
        });

        let result = poll_until_ready(policy, &mut signal, |_| async { false }, |_| {}).await;

        assert_eq!(result, Err(PollError::Cancelled { attempts: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_interval_still_honours_deadline() {
        let policy = PollPolicy::new(NonZeroU32::new(5).expect("non-zero"), Duration::MAX)
            .with_deadline(Some(Duration::from_secs(10)));
        let started = Instant::now();

        let result =
            poll_until_ready(policy, &mut CancelSignal::never(), |_| async { false }, |_| {}).await;

        assert_eq!(
            result,
            Err(PollError::DeadlineElapsed {
                attempts: 1,
                deadline: Duration::from_secs(10),
            })
        );
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn already_cancelled_signal_skips_checks() {
        let (canceller, mut signal) = CancelSignal::pair();
        canceller.cancel();

        let mut checks = 0;
        let result = poll_until_ready(
            policy(3, 1),
            &mut signal,
            |_| {
                checks += 1;
                async { true }
            },
            |_| {},
        )
        .await;

        assert_eq!(result, Err(PollError::Cancelled { attempts: 0 }));
        assert_eq!(checks, 0);
    }
}
