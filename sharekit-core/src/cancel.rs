//! Session-level cancellation.
//!
//! A [`CancelToken`] is raced against every outbound network call; once
//! its handle fires, in-flight and future calls resolve to
//! [`Error::OperationCanceled`]. Cancellation only interrupts suspension
//! points — synchronous crypto always runs to completion — so no partial
//! record is ever left behind that would block a retry.

use std::future::Future;

use tokio::sync::watch;

use crate::{Error, Result};

/// Fires the matching [`CancelToken`]s. One-way: once fired, the session
/// stays canceled.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancels every operation racing a token from this pair.
    pub fn cancel(&self) {
        // Receivers may be gone if the session already dropped; nothing
        // to cancel then.
        let _ = self.sender.send(true);
    }
}

/// The cancellation signal raced against suspending operations.
#[derive(Debug, Clone)]
pub struct CancelToken {
    receiver: watch::Receiver<bool>,
}

impl CancelToken {
    /// Whether the handle has fired.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Runs `future` unless the token fires first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationCanceled`] when canceled; otherwise the
    /// future's own result.
    pub async fn run<T>(&self, future: impl Future<Output = Result<T>>) -> Result<T> {
        if self.is_canceled() {
            return Err(Error::OperationCanceled);
        }
        let mut receiver = self.receiver.clone();
        tokio::select! {
            result = future => result,
            () = async {
                loop {
                    // A closed channel means the handle dropped without
                    // firing; such a session can never be canceled.
                    if receiver.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                    if *receiver.borrow() {
                        return;
                    }
                }
            } => Err(Error::OperationCanceled),
        }
    }
}

/// Creates a connected handle/token pair.
#[must_use]
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (sender, receiver) = watch::channel(false);
    (CancelHandle { sender }, CancelToken { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completed_future_wins() {
        let (_handle, token) = cancel_pair();
        assert_eq!(token.run(async { Ok(7) }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_future() {
        let (handle, token) = cancel_pair();
        let pending = token.run(async {
            std::future::pending::<()>().await;
            Ok(())
        });
        handle.cancel();
        assert!(matches!(pending.await, Err(Error::OperationCanceled)));
    }

    #[tokio::test]
    async fn test_canceled_token_rejects_immediately() {
        let (handle, token) = cancel_pair();
        handle.cancel();
        assert!(token.is_canceled());
        assert!(matches!(
            token.run(async { Ok(()) }).await,
            Err(Error::OperationCanceled)
        ));
    }

    #[tokio::test]
    async fn test_dropped_handle_never_cancels() {
        let (handle, token) = cancel_pair();
        drop(handle);
        assert_eq!(token.run(async { Ok(1) }).await.unwrap(), 1);
    }
}
