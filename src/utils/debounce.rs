use std::time::Duration;
use tokio::time::Instant;

/// A resettable one-shot deadline owned by a single task.
///
/// The owner polls [`Debounce::deadline`] and waits on it with
/// [`sleep_until_deadline`]; nothing fires on its own.
#[derive(Debug, Clone)]
pub struct Debounce {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl Debounce {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    pub fn reset(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// Completes at `deadline`, or never when there is none.
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_pushes_deadline_forward() {
        let start = Instant::now();
        let mut debounce = Debounce::new(Duration::from_secs(2));
        assert!(!debounce.is_armed());

        debounce.reset(start);
        assert!(!debounce.is_due(start + Duration::from_secs(1)));

        debounce.reset(start + Duration::from_secs(1));
        assert!(!debounce.is_due(start + Duration::from_secs(2)));
        assert!(debounce.is_due(start + Duration::from_secs(3)));

        debounce.cancel();
        assert!(!debounce.is_due(start + Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_until_armed_deadline() {
        let deadline = Instant::now() + Duration::from_secs(2);
        sleep_until_deadline(Some(deadline)).await;
        assert!(Instant::now() >= deadline);
    }
}
