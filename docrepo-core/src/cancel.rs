//! Cancellation signals for in-flight repository operations.
//!
//! A [`CancelSignal`] is a cloneable future that resolves once cancellation is requested.
//! Attach it to a repository with
//! [`Repository::with_cancel`](crate::repository::Repository::with_cancel); every store call
//! made through that handle races against the signal and fails with
//! [`StoreError::Cancelled`](crate::error::StoreError::Cancelled) once it fires.
//!
//! ```ignore
//! let (handle, signal) = CancelSignal::pair();
//! let products = products.with_cancel(signal);
//!
//! handle.cancel();
//! assert!(products.get_all().await.is_err());
//! ```

use futures::{
    FutureExt,
    channel::oneshot,
    future::{BoxFuture, Shared, pending},
};
use std::{fmt, future::Future};

/// A cloneable signal that resolves when cancellation is requested.
#[derive(Clone)]
pub struct CancelSignal {
    inner: Shared<BoxFuture<'static, ()>>,
}

impl CancelSignal {
    /// Creates a signal that fires when `trigger` completes.
    pub fn new(trigger: impl Future<Output = ()> + Send + 'static) -> Self {
        Self { inner: trigger.boxed().shared() }
    }

    /// Creates a handle/signal pair. Dropping the handle without calling
    /// [`CancelHandle::cancel`] never fires the signal.
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (sender, receiver) = oneshot::channel::<()>();

        let signal = CancelSignal::new(async move {
            if receiver.await.is_err() {
                pending::<()>().await;
            }
        });

        (CancelHandle { sender }, signal)
    }

    /// Returns `true` if the signal has already fired.
    pub fn is_cancelled(&self) -> bool {
        self.inner.peek().is_some() || self.inner.clone().now_or_never().is_some()
    }

    pub(crate) fn fired(&self) -> Shared<BoxFuture<'static, ()>> {
        self.inner.clone()
    }
}

impl fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Requests cancellation of a [`CancelSignal`] created by [`CancelSignal::pair`].
#[derive(Debug)]
pub struct CancelHandle {
    sender: oneshot::Sender<()>,
}

impl CancelHandle {
    /// Fires the paired signal.
    pub fn cancel(self) {
        let _ = self.sender.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::{FutureExt, select, Either};
    use std::time::Duration;

    #[tokio::test]
    async fn pair_fires_on_cancel() {
        let (handle, signal) = CancelSignal::pair();
        handle.cancel();

        signal.fired().await;
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn dropped_handle_never_fires() {
        let (handle, signal) = CancelSignal::pair();
        drop(handle);

        let sleep = tokio::time::sleep(Duration::from_millis(20)).boxed();
        match select(signal.fired(), sleep).await {
            Either::Left(_) => panic!("signal fired without cancel"),
            Either::Right(_) => assert!(!signal.is_cancelled()),
        }
    }
}
