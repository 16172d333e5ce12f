use std::sync::Arc;

/// Errors surfaced by the readiness engine.
///
/// The enum is cheaply cloneable on purpose: a single fatal error fans out
/// to every pending and every future ready request on the same helper.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("feature '{0}' is already registered")]
    AlreadyRegistered(Arc<str>),

    #[error("critical feature '{feature}' failed: {message}")]
    CriticalFailure { feature: Arc<str>, message: Arc<str> },

    #[error("owner invalidated: {0}")]
    Invalidated(Arc<str>),

    #[error("readiness engine stopped before the request completed")]
    EngineGone,
}
