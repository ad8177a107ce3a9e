use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a [`CancellationController`] fired. The first cause wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The wall-clock deadline the controller was armed with elapsed.
    DeadlineElapsed,
    /// Someone called [`CancellationController::cancel`].
    Requested,
}

/// A cancellation signal that fires on its own once a deadline passes.
///
/// Clones share the same signal. The deadline timer runs as a small tokio
/// task that exits as soon as the controller fires or is disarmed, so
/// constructing one requires a running tokio runtime.
#[derive(Clone, Debug)]
pub struct CancellationController {
    token: CancellationToken,
    disarm: CancellationToken,
    deadline: Instant,
    reason: Arc<OnceLock<CancelReason>>,
}

impl CancellationController {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        let controller = Self {
            token: CancellationToken::new(),
            disarm: CancellationToken::new(),
            deadline,
            reason: Arc::new(OnceLock::new()),
        };

        let timer = controller.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.token.cancelled() => {}
                _ = timer.disarm.cancelled() => {}
                _ = tokio::time::sleep_until(timer.deadline) => {
                    timer.fire(CancelReason::DeadlineElapsed);
                }
            }
        });

        controller
    }

    /// Cancel now. A no-op if the controller already fired.
    pub fn cancel(&self) {
        self.fire(CancelReason::Requested);
    }

    /// Stop the deadline timer without firing. Used once the guarded
    /// operation has finished on its own.
    pub fn disarm(&self) {
        self.disarm.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.get().copied()
    }

    pub fn deadline_elapsed(&self) -> bool {
        self.reason() == Some(CancelReason::DeadlineElapsed)
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Resolves once the controller fires, yielding the winning cause.
    pub async fn cancelled(&self) -> CancelReason {
        self.token.cancelled().await;
        self.reason().unwrap_or(CancelReason::Requested)
    }

    fn fire(&self, reason: CancelReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn fires_once_deadline_elapses() {
        let controller = CancellationController::with_timeout(Duration::from_millis(100));
        assert!(!controller.is_cancelled());

        sleep(Duration::from_millis(99)).await;
        assert!(!controller.is_cancelled());

        let reason = controller.cancelled().await;

        assert_eq!(CancelReason::DeadlineElapsed, reason);
        assert!(controller.deadline_elapsed());
        assert!(Instant::now() >= controller.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_cancel_wins_over_later_deadline() {
        let controller = CancellationController::with_timeout(Duration::from_millis(100));
        controller.cancel();

        sleep(Duration::from_millis(500)).await;

        assert_eq!(Some(CancelReason::Requested), controller.reason());
        assert!(!controller.deadline_elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_controller_never_fires() {
        let controller = CancellationController::with_timeout(Duration::from_millis(100));
        controller.disarm();

        sleep(Duration::from_millis(500)).await;

        assert!(!controller.is_cancelled());
        assert_eq!(None, controller.reason());
    }

    #[tokio::test(start_paused = true)]
    async fn clones_share_the_signal() {
        let controller = CancellationController::with_timeout(Duration::from_secs(60));
        let observer = controller.clone();

        controller.cancel();

        assert!(observer.is_cancelled());
        assert_eq!(CancelReason::Requested, observer.cancelled().await);
    }
}
