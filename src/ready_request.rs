use crate::{CompletionSignal, Error, FeatureSet, RequestId, Result};

/// Handle for one [`become_ready`](crate::ReadinessHelper::become_ready)
/// call.
///
/// Resolves once every requested feature has reached a terminal state.
/// Success does not imply every feature is actually usable: features the
/// remote object simply doesn't support end up `Missing` and the request
/// still succeeds. Callers that care must follow up with
/// [`crate::ReadinessHelper::actual_features`] /
/// [`crate::ReadinessHelper::missing_features`]. A request only fails when
/// the whole helper is poisoned by a critical failure or owner
/// invalidation.
#[derive(Debug, Clone)]
pub struct ReadyRequest {
    requested: FeatureSet,
    signal: CompletionSignal,
}

impl ReadyRequest {
    pub(crate) fn new(requested: FeatureSet) -> Self {
        Self {
            requested,
            signal: CompletionSignal::new(),
        }
    }

    pub(crate) fn signal(&self) -> &CompletionSignal {
        &self.signal
    }

    pub fn id(&self) -> RequestId {
        self.signal.id()
    }

    pub fn requested_features(&self) -> &FeatureSet {
        &self.requested
    }

    /// Wait until the request is resolved.
    pub async fn finished(&self) -> Result {
        self.signal.finished().await
    }

    pub fn is_finished(&self) -> bool {
        self.signal.is_finished()
    }

    pub fn is_error(&self) -> bool {
        self.signal.is_error()
    }

    pub fn error(&self) -> Option<Error> {
        self.signal.error()
    }

    /// Run `observer` once the request resolves; always deferred, even when
    /// the request is already finished. Requires a Tokio runtime.
    pub fn on_finished<F>(&self, observer: F)
    where
        F: FnOnce(Result) + Send + 'static,
    {
        self.signal.on_finished(observer);
    }
}
