//! Cooperative cancellation for the blocking pipeline.
//!
//! The Ctrl-C handler is installed before any work starts and only raises a
//! flag. The worker checks the flag between phases and unwinds with
//! [`Interrupted`], dropping whatever it staged on the way out.

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Returned by a checkpoint once cancellation was requested.
#[derive(Debug, Error)]
#[error("interrupted")]
pub struct Interrupted;

/// Shared cancel flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Checkpoint: `Err(Interrupted)` once cancelled.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_cancelled() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Install the Ctrl-C handler now and return a future that resolves on the
/// first interrupt. From here on SIGINT no longer terminates the process.
#[cfg(unix)]
pub fn listen_for_interrupt() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).context("Failed to listen for Ctrl-C")?;
    Ok(async move {
        sigint.recv().await;
    })
}

/// Install the Ctrl-C handler now and return a future that resolves on the
/// first interrupt.
#[cfg(windows)]
pub fn listen_for_interrupt() -> Result<impl Future<Output = ()>> {
    let mut ctrl_c = tokio::signal::windows::ctrl_c().context("Failed to listen for Ctrl-C")?;
    Ok(async move {
        ctrl_c.recv().await;
    })
}

/// Raise `cancel` when `interrupted` resolves.
pub fn cancel_on<F>(interrupted: F, cancel: CancelFlag) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        interrupted.await;
        tracing::warn!("Interrupt received, stopping");
        cancel.cancel();
    })
}

/// True if `err` is (or wraps) [`Interrupted`].
pub fn is_interrupted(err: &anyhow::Error) -> bool {
    err.downcast_ref::<Interrupted>().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_after_cancel() {
        let flag = CancelFlag::default();
        assert!(flag.check().is_ok());

        let shared = flag.clone();
        shared.cancel();
        assert!(flag.is_cancelled());
        assert!(flag.check().is_err());
    }

    #[test]
    fn test_is_interrupted_through_context() {
        let err = anyhow::Error::from(Interrupted).context("while saving calls");
        assert!(is_interrupted(&err));
        assert!(!is_interrupted(&anyhow::anyhow!("disk full")));
    }

    #[tokio::test]
    async fn test_cancel_on_raises_flag() {
        let flag = CancelFlag::default();
        cancel_on(std::future::ready(()), flag.clone()).await.unwrap();
        assert!(flag.is_cancelled());
    }
}
