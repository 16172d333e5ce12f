use std::sync::Arc;

use crate::{Error, FeatureSet, Status};

/// Read view published by the driver after every completed turn.
///
/// Backs the synchronous queries on [`crate::ReadinessHelper`]. The
/// snapshot reflects the state as of the last driving event the driver has
/// fully processed; events still queued are not visible yet.
#[derive(Debug, Clone, Default)]
pub(crate) struct Snapshot {
    pub(crate) status: Status,
    pub(crate) interfaces: Option<Vec<Arc<str>>>,
    pub(crate) registered: FeatureSet,
    pub(crate) ready: FeatureSet,
    pub(crate) missing: FeatureSet,
    pub(crate) requested: FeatureSet,
    pub(crate) fatal: Option<Error>,
}

impl Snapshot {
    /// Whether every feature in `features` is terminal with an acceptable
    /// outcome: a critical feature must be `Ready`; a non-critical feature
    /// may also be `Missing` (including the never-registered case). Always
    /// false once the helper is fatally failed.
    pub(crate) fn is_ready(&self, features: &FeatureSet) -> bool {
        if self.fatal.is_some() {
            return false;
        }
        features.iter().all(|feature| {
            if self.ready.contains(feature) {
                return true;
            }
            if feature.is_critical() {
                return false;
            }
            self.missing.contains(feature) || !self.registered.contains(feature)
        })
    }
}
