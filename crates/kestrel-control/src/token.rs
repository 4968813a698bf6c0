//! `ControlToken` — five-state cooperative pause/cancel token.
//!
//! Built on `tokio_util`'s `CancellationToken` as the cancellation backbone,
//! with a pause layer on a `tokio::sync::watch` channel. State transitions:
//!
//! ```text
//! Running ⇄ Paused
//! Running | Paused → Draining → Cancelled
//! any → Disposed
//! ```
//!
//! Once cancelled or disposed, every state-changing call is a no-op.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::CancellationError;

/// Token lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlState {
    /// Normal operation.
    Running,
    /// Suspended; pause-aware waits block.
    Paused,
    /// Graceful cancellation in progress; cleanup is running.
    Draining,
    /// Terminally cancelled.
    Cancelled,
    /// Disposed; all state-changing calls are no-ops.
    Disposed,
}

type CleanupFn = Box<dyn FnOnce() + Send>;

struct Shared {
    state: Mutex<ControlState>,
    /// Mirrors `state == Paused`; the channel doubles as the waiter wakeup.
    paused: watch::Sender<bool>,
    cancel: CancellationToken,
    cleanups: Mutex<Vec<CleanupFn>>,
    forced: AtomicBool,
}

/// Cloneable cooperative pause/cancel handle.
///
/// Clones share state: pausing or cancelling through one clone is observed
/// by all of them.
#[derive(Clone)]
pub struct ControlToken {
    shared: Arc<Shared>,
}

impl ControlToken {
    /// Create a new token in the running state.
    #[must_use]
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ControlState::Running),
                paused,
                cancel: CancellationToken::new(),
                cleanups: Mutex::new(Vec::new()),
                forced: AtomicBool::new(false),
            }),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ControlState {
        *self.shared.state.lock()
    }

    /// Whether the token is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state() == ControlState::Paused
    }

    /// Whether the token has been cancelled (including via dispose-after-cancel).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Whether cancellation was forced (graceful cleanup timed out or failed).
    #[must_use]
    pub fn was_forced(&self) -> bool {
        self.shared.forced.load(Ordering::Relaxed)
    }

    /// Pause the token. Idempotent; a no-op once draining, cancelled, or disposed.
    pub fn pause(&self) {
        let mut state = self.shared.state.lock();
        if *state == ControlState::Running {
            *state = ControlState::Paused;
            let _ = self.shared.paused.send_replace(true);
            debug!("control token paused");
        }
    }

    /// Resume from pause. Idempotent; a no-op unless currently paused.
    pub fn resume(&self) {
        let mut state = self.shared.state.lock();
        if *state == ControlState::Paused {
            *state = ControlState::Running;
            let _ = self.shared.paused.send_replace(false);
            debug!("control token resumed");
        }
    }

    /// Cancel the token. Terminal and idempotent: repeated calls are no-ops,
    /// and pause/resume become no-ops afterwards.
    pub fn cancel(&self) {
        {
            let mut state = self.shared.state.lock();
            match *state {
                ControlState::Cancelled | ControlState::Disposed => return,
                _ => *state = ControlState::Cancelled,
            }
            // Wake pause waiters so they can observe cancellation
            let _ = self.shared.paused.send_replace(false);
        }
        self.shared.cancel.cancel();
        debug!("control token cancelled");
    }

    /// Wait until the token is unpaused.
    ///
    /// Resolves immediately when running. Fails with [`CancellationError`]
    /// if the token is already cancelled or becomes cancelled while waiting.
    pub async fn wait_if_paused(&self) -> Result<(), CancellationError> {
        loop {
            if self.shared.cancel.is_cancelled() {
                return Err(CancellationError);
            }
            // Subscribe before re-checking so a flip between check and await
            // still wakes us.
            let mut rx = self.shared.paused.subscribe();
            if !self.is_paused() {
                return Ok(());
            }
            tokio::select! {
                biased;
                () = self.shared.cancel.cancelled() => return Err(CancellationError),
                _ = rx.changed() => {}
            }
        }
    }

    /// Graceful cancellation: enter the draining state, run `cleanup` under
    /// `timeout`, then cancel.
    ///
    /// Returns `true` when cleanup completed in time, `false` when it timed
    /// out or returned an error (the cancel is then recorded as forced).
    /// A no-op returning `false` once the token is already cancelled or
    /// disposed.
    pub async fn graceful_cancel<F, T, E>(&self, timeout: Duration, cleanup: F) -> bool
    where
        F: Future<Output = Result<T, E>>,
    {
        {
            let mut state = self.shared.state.lock();
            match *state {
                ControlState::Cancelled | ControlState::Disposed => return false,
                _ => *state = ControlState::Draining,
            }
            // Draining is not paused; release any pause waiters
            let _ = self.shared.paused.send_replace(false);
        }
        debug!(
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "graceful cancel draining"
        );

        let clean = match tokio::time::timeout(timeout, cleanup).await {
            Ok(Ok(_)) => true,
            Ok(Err(_)) => {
                warn!("graceful cancel cleanup failed; forcing");
                false
            }
            Err(_) => {
                warn!("graceful cancel timed out; forcing");
                false
            }
        };

        if !clean {
            self.shared.forced.store(true, Ordering::Relaxed);
        }

        {
            let mut state = self.shared.state.lock();
            if *state == ControlState::Draining {
                *state = ControlState::Cancelled;
            }
        }
        self.shared.cancel.cancel();
        clean
    }

    /// Queue a callback to run at dispose time.
    ///
    /// Ignored once the token is disposed. Callbacks run independently: one
    /// panicking callback does not prevent the others from running.
    pub fn register_cleanup(&self, f: impl FnOnce() + Send + 'static) {
        if self.state() == ControlState::Disposed {
            return;
        }
        self.shared.cleanups.lock().push(Box::new(f));
    }

    /// Dispose the token: run queued cleanups once, then make every
    /// state-changing call a no-op.
    pub fn dispose(&self) {
        {
            let mut state = self.shared.state.lock();
            if *state == ControlState::Disposed {
                return;
            }
            *state = ControlState::Disposed;
            let _ = self.shared.paused.send_replace(false);
        }
        let cleanups: Vec<CleanupFn> = std::mem::take(&mut *self.shared.cleanups.lock());
        for cleanup in cleanups {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(cleanup)).is_err() {
                warn!("cleanup callback panicked during dispose");
            }
        }
    }

    /// Composite token cancelled as soon as any source cancels.
    #[must_use]
    pub fn combine(tokens: &[ControlToken]) -> ControlToken {
        let combined = ControlToken::new();
        if tokens.iter().any(ControlToken::is_cancelled) {
            combined.cancel();
            return combined;
        }
        let sources: Vec<CancellationToken> =
            tokens.iter().map(|t| t.shared.cancel.clone()).collect();
        let downstream = combined.clone();
        let _ = tokio::spawn(async move {
            let waits = sources
                .into_iter()
                .map(|t| Box::pin(t.cancelled_owned()))
                .collect::<Vec<_>>();
            if !waits.is_empty() {
                let _ = futures::future::select_all(waits).await;
                downstream.cancel();
            }
        });
        combined
    }

    /// Inner cancellation token, for `select!` integration with work that
    /// only needs the cancelled signal.
    #[must_use]
    pub fn cancelled_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }
}

impl Default for ControlToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ControlToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlToken")
            .field("state", &self.state())
            .field("forced", &self.was_forced())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn starts_running() {
        let token = ControlToken::new();
        assert_eq!(token.state(), ControlState::Running);
        assert!(!token.is_paused());
        assert!(!token.is_cancelled());
        assert!(!token.was_forced());
    }

    #[test]
    fn pause_is_idempotent() {
        let token = ControlToken::new();
        token.pause();
        assert_eq!(token.state(), ControlState::Paused);
        token.pause();
        assert_eq!(token.state(), ControlState::Paused);
        token.resume();
        assert_eq!(token.state(), ControlState::Running);
        token.resume();
        assert_eq!(token.state(), ControlState::Running);
    }

    #[test]
    fn cancel_is_terminal_and_idempotent() {
        let token = ControlToken::new();
        token.cancel();
        assert_eq!(token.state(), ControlState::Cancelled);
        token.cancel();
        assert_eq!(token.state(), ControlState::Cancelled);

        // pause/resume after cancel are no-ops
        token.pause();
        assert_eq!(token.state(), ControlState::Cancelled);
        token.resume();
        assert_eq!(token.state(), ControlState::Cancelled);
    }

    #[test]
    fn pause_after_cancel_does_not_pause() {
        let token = ControlToken::new();
        token.cancel();
        token.pause();
        assert!(!token.is_paused());
    }

    #[test]
    fn clones_share_state() {
        let token = ControlToken::new();
        let clone = token.clone();
        token.pause();
        assert!(clone.is_paused());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn wait_if_paused_immediate_when_running() {
        let token = ControlToken::new();
        assert_matches!(token.wait_if_paused().await, Ok(()));
    }

    #[tokio::test]
    async fn wait_if_paused_blocks_until_resume() {
        let token = ControlToken::new();
        token.pause();

        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.wait_if_paused().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished(), "waiter must be blocked while paused");

        token.resume();
        let result = handle.await.unwrap();
        assert_matches!(result, Ok(()));
    }

    #[tokio::test]
    async fn wait_if_paused_fails_on_cancel_while_waiting() {
        let token = ControlToken::new();
        token.pause();

        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.wait_if_paused().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        let result = handle.await.unwrap();
        assert_matches!(result, Err(CancellationError));
    }

    #[tokio::test]
    async fn wait_if_paused_fails_when_already_cancelled() {
        let token = ControlToken::new();
        token.cancel();
        assert_matches!(token.wait_if_paused().await, Err(CancellationError));
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_cancel_fast_cleanup_returns_true() {
        let token = ControlToken::new();
        let ok = token
            .graceful_cancel(Duration::from_millis(100), async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<(), ()>(())
            })
            .await;
        assert!(ok);
        assert_eq!(token.state(), ControlState::Cancelled);
        assert!(!token.was_forced());
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_cancel_slow_cleanup_forces() {
        let token = ControlToken::new();
        let ok = token
            .graceful_cancel(Duration::from_millis(100), async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<(), ()>(())
            })
            .await;
        assert!(!ok);
        assert_eq!(token.state(), ControlState::Cancelled);
        assert!(token.was_forced());
    }

    #[tokio::test]
    async fn graceful_cancel_cleanup_error_forces() {
        let token = ControlToken::new();
        let ok = token
            .graceful_cancel(Duration::from_millis(100), async {
                Err::<(), &str>("cleanup failed")
            })
            .await;
        assert!(!ok);
        assert!(token.is_cancelled());
        assert!(token.was_forced());
    }

    #[tokio::test]
    async fn graceful_cancel_noop_when_already_cancelled() {
        let token = ControlToken::new();
        token.cancel();
        let ok = token
            .graceful_cancel(Duration::from_millis(10), async { Ok::<(), ()>(()) })
            .await;
        assert!(!ok);
    }

    #[test]
    fn cleanups_run_on_dispose() {
        use std::sync::atomic::AtomicU32;

        let token = ControlToken::new();
        let count = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let count = count.clone();
            token.register_cleanup(move || {
                let _ = count.fetch_add(1, Ordering::SeqCst);
            });
        }
        token.dispose();
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(token.state(), ControlState::Disposed);
    }

    #[test]
    fn panicking_cleanup_does_not_block_others() {
        use std::sync::atomic::AtomicU32;

        let token = ControlToken::new();
        let count = Arc::new(AtomicU32::new(0));

        token.register_cleanup(|| panic!("first cleanup panics"));
        let count_clone = count.clone();
        token.register_cleanup(move || {
            let _ = count_clone.fetch_add(1, Ordering::SeqCst);
        });

        token.dispose();
        assert_eq!(count.load(Ordering::SeqCst), 1, "second cleanup must still run");
    }

    #[test]
    fn dispose_makes_state_changes_noop() {
        let token = ControlToken::new();
        token.dispose();
        token.pause();
        assert_eq!(token.state(), ControlState::Disposed);
        token.cancel();
        assert_eq!(token.state(), ControlState::Disposed);
        // double dispose is a no-op
        token.dispose();
        assert_eq!(token.state(), ControlState::Disposed);
    }

    #[test]
    fn register_cleanup_after_dispose_ignored() {
        use std::sync::atomic::AtomicU32;

        let token = ControlToken::new();
        token.dispose();
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        token.register_cleanup(move || {
            let _ = count_clone.fetch_add(1, Ordering::SeqCst);
        });
        token.dispose();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn combine_cancels_when_any_source_cancels() {
        let a = ControlToken::new();
        let b = ControlToken::new();
        let combined = ControlToken::combine(&[a.clone(), b.clone()]);
        assert!(!combined.is_cancelled());

        b.cancel();
        combined.cancelled_token().cancelled().await;
        assert!(combined.is_cancelled());
        assert!(!a.is_cancelled(), "other sources are untouched");
    }

    #[tokio::test]
    async fn combine_with_already_cancelled_source() {
        let a = ControlToken::new();
        a.cancel();
        let combined = ControlToken::combine(&[a, ControlToken::new()]);
        assert!(combined.is_cancelled());
    }

    #[tokio::test]
    async fn combine_empty_never_cancels() {
        let combined = ControlToken::combine(&[]);
        assert!(!combined.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_token_integrates_with_select() {
        let token = ControlToken::new();
        let cancel = token.cancelled_token();

        let handle = tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => "cancelled",
                () = tokio::time::sleep(Duration::from_secs(5)) => "timeout",
            }
        });

        token.cancel();
        assert_eq!(handle.await.unwrap(), "cancelled");
    }

    #[test]
    fn debug_shows_state() {
        let token = ControlToken::new();
        let s = format!("{token:?}");
        assert!(s.contains("Running"));
    }
}
