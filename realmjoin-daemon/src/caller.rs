//! Handle to the originating caller of a privileged operation.
//!
//! Carries the per-invocation diagnostics stream and the cancellation
//! signal tied to the caller's connection lifetime.

use realmjoin_core::DiagnosticEvent;
use tokio::sync::{mpsc, watch};

/// Cloneable handle threaded through an in-flight operation.
#[derive(Debug, Clone)]
pub struct CallerHandle {
    diag: mpsc::UnboundedSender<DiagnosticEvent>,
    cancel: watch::Receiver<bool>,
    // Keeps the cancellation sender alive for detached handles.
    _cancel_guard: Option<std::sync::Arc<watch::Sender<bool>>>,
}

impl CallerHandle {
    /// Create a handle plus the receiving side of its diagnostics stream
    /// and the sender used to signal cancellation.
    pub fn new() -> (
        Self,
        mpsc::UnboundedReceiver<DiagnosticEvent>,
        watch::Sender<bool>,
    ) {
        let (diag_tx, diag_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (
            Self {
                diag: diag_tx,
                cancel: cancel_rx,
                _cancel_guard: None,
            },
            diag_rx,
            cancel_tx,
        )
    }

    /// A handle with nobody listening, for operations without a caller.
    pub fn detached() -> Self {
        let (mut handle, _diag_rx, cancel_tx) = Self::new();
        handle._cancel_guard = Some(std::sync::Arc::new(cancel_tx));
        handle
    }

    /// Emit an informational diagnostic.
    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(diag = %message);
        let _ = self.diag.send(DiagnosticEvent::info(message));
    }

    /// Emit an error diagnostic.
    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(diag = %message);
        let _ = self.diag.send(DiagnosticEvent::error(message));
    }

    /// Whether the caller has gone away.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolve when the caller cancels. Never resolves if the caller
    /// cannot cancel any more (sender dropped without signalling).
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
