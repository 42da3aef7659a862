use serde::{Deserialize, Serialize};
use std::{fmt, future, str::FromStr};
use tokio::{
    sync::watch::{self, Receiver},
    task::JoinHandle,
    time::Instant,
};

/// How the coordinator learns that admission must stop.
///
/// Both policies check the deadline on every admission attempt without
/// blocking. They differ in cost and in what happens while the coordinator is
/// suspended on an exhausted budget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeadlinePolicy {
    /// Compare the clock against the deadline on every attempt.
    ///
    /// A coordinator waiting for budget only notices the deadline after the next
    /// release.
    #[default]
    Poll,
    /// A timer task raises a flag at the deadline and every attempt reads it.
    ///
    /// Reading the flag is cheaper than reading the clock, and a coordinator
    /// waiting for budget is woken by the deadline itself.
    Timer,
}

impl DeadlinePolicy {
    pub(crate) fn arm(self, at: Instant) -> Deadline {
        match self {
            DeadlinePolicy::Poll => Deadline::Poll { at },
            DeadlinePolicy::Timer => {
                // A deadline that already passed must never admit anything, even
                // before the timer task gets to run.
                let (tx, expired) = watch::channel(Instant::now() >= at);
                let timer = tokio::spawn(async move {
                    tokio::time::sleep_until(at).await;
                    let _ = tx.send(true);
                });
                Deadline::Timer { expired, timer }
            }
        }
    }
}

impl fmt::Display for DeadlinePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeadlinePolicy::Poll => f.write_str("poll"),
            DeadlinePolicy::Timer => f.write_str("timer"),
        }
    }
}

impl FromStr for DeadlinePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poll" => Ok(DeadlinePolicy::Poll),
            "timer" => Ok(DeadlinePolicy::Timer),
            other => Err(format!("unknown deadline policy {other:?} (expected poll or timer)")),
        }
    }
}

/// An armed deadline for one run.
pub(crate) enum Deadline {
    Poll {
        at: Instant,
    },
    Timer {
        expired: Receiver<bool>,
        timer: JoinHandle<()>,
    },
}

impl Deadline {
    /// Non-blocking check.
    pub(crate) fn is_expired(&self) -> bool {
        match self {
            Deadline::Poll { at } => Instant::now() >= *at,
            Deadline::Timer { expired, .. } => *expired.borrow(),
        }
    }

    /// Resolves when the deadline passes, if this policy can signal it.
    /// Never resolves for [`DeadlinePolicy::Poll`].
    pub(crate) async fn expired(&mut self) {
        match self {
            Deadline::Poll { .. } => future::pending().await,
            Deadline::Timer { expired, .. } => {
                // The sender lives in the timer task and only goes away after
                // raising the flag or being aborted with this deadline.
                let _ = expired.wait_for(|e| *e).await;
            }
        }
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        if let Deadline::Timer { timer, .. } = self {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn poll_expires_at_the_deadline() {
        let deadline = DeadlinePolicy::Poll.arm(Instant::now() + Duration::from_millis(50));
        assert!(!deadline.is_expired());

        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(deadline.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn timer_raises_the_flag() {
        let start = Instant::now();
        let mut deadline = DeadlinePolicy::Timer.arm(start + Duration::from_millis(50));
        assert!(!deadline.is_expired());

        deadline.expired().await;
        assert!(deadline.is_expired());
        assert_eq!(start.elapsed(), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn past_deadlines_are_expired_immediately() {
        let now = Instant::now();
        assert!(DeadlinePolicy::Poll.arm(now).is_expired());
        assert!(DeadlinePolicy::Timer.arm(now).is_expired());
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("poll".parse::<DeadlinePolicy>(), Ok(DeadlinePolicy::Poll));
        assert_eq!("timer".parse::<DeadlinePolicy>(), Ok(DeadlinePolicy::Timer));
        assert!("ticker".parse::<DeadlinePolicy>().is_err());
    }
}
