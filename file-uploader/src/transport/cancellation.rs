//! Cooperative cancellation for in-flight transfers

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Cancellation flag shared by a transfer task, its handle and the host
///
/// Clones observe the same flag. Only the first [`cancel`](Self::cancel)
/// has an effect.
///
/// # Examples
///
/// ```rust
/// use file_uploader::transport::CancellationToken;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let token = CancellationToken::new();
///     let upload = token.clone();
///     let task = tokio::spawn(async move {
///         upload
///             .run_until_cancelled(tokio::time::sleep(Duration::from_secs(60)))
///             .await
///     });
///
///     assert!(token.cancel());
///     assert!(!token.cancel());
///     assert_eq!(task.await.ok().flatten(), None);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    /// Fresh, uncancelled token
    #[must_use]
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
        }
    }

    /// Whether [`cancel`](Self::cancel) has been called on any clone
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    /// Flips the flag and wakes every waiter
    ///
    /// Returns `true` only for the call that changed the flag.
    #[must_use]
    pub fn cancel(&self) -> bool {
        let flipped = self.flag.send_if_modified(|cancelled| {
            let was = *cancelled;
            *cancelled = true;
            !was
        });
        if flipped {
            debug!("Transfer cancellation requested");
        }
        flipped
    }

    /// Resolves once the token is cancelled (immediately if it already is)
    pub async fn cancelled(&self) {
        let mut watcher = self.flag.subscribe();
        // the sender lives as long as `self`, so this cannot fail
        let _ = watcher.wait_for(|cancelled| *cancelled).await;
    }

    /// Polls `future` until it completes or the token is cancelled
    ///
    /// Cancellation wins ties. On cancellation the future is dropped, which
    /// for an HTTP request closes the connection, and `None` is returned.
    pub async fn run_until_cancelled<F>(&self, future: F) -> Option<F::Output>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            () = self.cancelled() => None,
            output = future => Some(output),
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
