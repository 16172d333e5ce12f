use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

use crate::{Error, RequestId, Result};

/// State of a [`CompletionSignal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalState {
    Pending,
    Succeeded,
    Failed(Error),
}

impl SignalState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SignalState::Pending)
    }
}

/// A single-assignment completion future.
///
/// Starts `Pending` and transitions exactly once to `Succeeded` or
/// `Failed`; later calls to [`resolve`](CompletionSignal::resolve) or
/// [`reject`](CompletionSignal::reject) are ignored (and logged), so the
/// first resolution wins.
///
/// Observers are never invoked synchronously from within the resolving
/// call: [`finished`](CompletionSignal::finished) waiters are woken through
/// a watch channel on a later poll of their own task, and
/// [`on_finished`](CompletionSignal::on_finished) callbacks run in a
/// spawned task. A caller can therefore resolve a signal and synchronously
/// observe its state without racing its own observers.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    tx: Arc<watch::Sender<SignalState>>,
    id: RequestId,
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SignalState::Pending);
        Self {
            tx: Arc::new(tx),
            id: Uuid::new_v4().as_u128(),
        }
    }

    /// Identifier used to correlate log lines about this signal.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Record success. A no-op if the signal is already terminal.
    pub fn resolve(&self) {
        self.finish(SignalState::Succeeded);
    }

    /// Record failure. A no-op if the signal is already terminal.
    pub fn reject(&self, error: Error) {
        self.finish(SignalState::Failed(error));
    }

    fn finish(&self, next: SignalState) {
        let mut first = false;
        self.tx.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = next.clone();
            first = true;
            true
        });
        if !first {
            tracing::warn!(
                id = self.id,
                ignored = ?next,
                current = ?self.state(),
                "completion signal already resolved, ignoring"
            );
        }
    }

    pub fn is_finished(&self) -> bool {
        self.tx.borrow().is_terminal()
    }

    pub fn is_error(&self) -> bool {
        matches!(&*self.tx.borrow(), SignalState::Failed(_))
    }

    pub fn error(&self) -> Option<Error> {
        match &*self.tx.borrow() {
            SignalState::Failed(e) => Some(e.clone()),
            _ => None,
        }
    }

    pub fn state(&self) -> SignalState {
        self.tx.borrow().clone()
    }

    /// Wait until the signal is terminal.
    ///
    /// May be awaited by any number of tasks, before or after resolution.
    pub async fn finished(&self) -> Result {
        let mut rx = self.tx.subscribe();
        let state = rx
            .wait_for(SignalState::is_terminal)
            .await
            .map_err(|_| Error::EngineGone)?
            .clone();
        match state {
            SignalState::Failed(e) => Err(e),
            _ => Ok(()),
        }
    }

    /// Run `observer` once the signal is terminal.
    ///
    /// The observer runs in a spawned task, so it is deferred even when the
    /// signal is already resolved at registration time. Requires a Tokio
    /// runtime.
    pub fn on_finished<F>(&self, observer: F)
    where
        F: FnOnce(Result) + Send + 'static,
    {
        let signal = self.clone();
        tokio::spawn(async move {
            let result = signal.finished().await;
            observer(result);
        });
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}
