use async_std::task::sleep;
use futures::channel::oneshot;
use futures::future::{self, Either, FutureExt, Shared};
use std::fmt;
use std::time::Duration;

/// Cloneable cancellation token. Long waits sleep through it so a shutdown signal can
/// interrupt them.
#[derive(Clone)]
pub struct Shutdown {
    signal: Option<Shared<oneshot::Receiver<()>>>,
}

#[derive(Debug)]
pub struct ShutdownTrigger(oneshot::Sender<()>);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancelled;

impl Shutdown {
    pub fn new() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = oneshot::channel();
        (ShutdownTrigger(tx), Shutdown { signal: Some(rx.shared()) })
    }

    /// A token that is never triggered.
    pub fn never() -> Self {
        Shutdown { signal: None }
    }

    pub fn is_triggered(&self) -> bool {
        matches!(self.signal.as_ref().and_then(|s| s.peek()), Some(Ok(())))
    }

    /// Resolves once the trigger fires. Dropping the trigger without firing does not count.
    pub async fn triggered(&self) {
        match &self.signal {
            Some(signal) => {
                if signal.clone().await.is_err() {
                    future::pending::<()>().await
                }
            }
            None => future::pending::<()>().await,
        }
    }

    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        let wait = Box::pin(sleep(duration));
        let triggered = Box::pin(self.triggered());
        match future::select(wait, triggered).await {
            Either::Left(_) => Ok(()),
            Either::Right(_) => Err(Cancelled),
        }
    }
}

impl fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shutdown").field("triggered", &self.is_triggered()).finish()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::never()
    }
}

impl ShutdownTrigger {
    pub fn fire(self) {
        // the receiving side may already be gone
        let _ = self.0.send(());
    }
}
