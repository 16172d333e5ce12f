use std::{collections::BTreeSet, fmt, sync::Arc};

use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::{
    Feature, FeatureSet, Status,
    internal::{Command, IntrospectOutcome},
};

pub(crate) type IntrospectFn = Box<dyn FnOnce(IntrospectContext) + Send + 'static>;

/// Registration record describing how one feature becomes ready.
///
/// Declares when introspection makes sense (statuses), what must already be
/// ready (feature dependencies), which remote interfaces must be present,
/// and the callback that performs the actual introspection.
///
/// The callback is invoked at most once per helper lifetime, and only after
/// every declared gate holds. It typically kicks off async I/O and returns
/// immediately; the continuation reports the outcome through the
/// [`IntrospectContext`] it received.
///
/// ```rust,ignore
/// let core = Introspectable::new(|cx| {
///     tokio::spawn(async move {
///         match fetch_core_properties().await {
///             Ok(_) => cx.report_ready(),
///             Err(e) => cx.report_failed(e.to_string()),
///         }
///     });
/// });
/// ```
pub struct Introspectable {
    pub(crate) statuses: Option<BTreeSet<Status>>,
    pub(crate) depends_on: FeatureSet,
    pub(crate) interfaces: Vec<Arc<str>>,
    pub(crate) introspect: IntrospectFn,
}

impl Introspectable {
    /// Create a descriptor around an introspection callback.
    ///
    /// By default the feature is applicable in every status, has no feature
    /// dependencies and requires no interfaces.
    pub fn new<F>(introspect: F) -> Self
    where
        F: FnOnce(IntrospectContext) + Send + 'static,
    {
        Self {
            statuses: None,
            depends_on: FeatureSet::new(),
            interfaces: Vec::new(),
            introspect: Box::new(introspect),
        }
    }

    /// Restrict the feature to the given statuses. Without this the feature
    /// is applicable in any status, including [`Status::UNKNOWN`].
    pub fn applicable_in<I>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = Status>,
    {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    /// Declare features that must be `Ready` before this one may start.
    pub fn depends_on<S>(mut self, features: S) -> Self
    where
        S: Into<FeatureSet>,
    {
        self.depends_on = self.depends_on.union(&features.into());
        self
    }

    /// Declare a remote interface that must be present for this feature to
    /// apply. May be called multiple times; all named interfaces must be
    /// present.
    pub fn requires_interface<N>(mut self, name: N) -> Self
    where
        N: Into<Arc<str>>,
    {
        self.interfaces.push(name.into());
        self
    }
}

impl fmt::Debug for Introspectable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Introspectable")
            .field("statuses", &self.statuses)
            .field("depends_on", &self.depends_on)
            .field("interfaces", &self.interfaces)
            .finish_non_exhaustive()
    }
}

/// Reporting handle passed to an introspection callback.
///
/// Exactly one of [`report_ready`](IntrospectContext::report_ready),
/// [`report_missing`](IntrospectContext::report_missing) or
/// [`report_failed`](IntrospectContext::report_failed) must eventually be
/// called. The methods consume the context, so reporting twice is
/// impossible by construction; dropping the context without reporting is a
/// contract violation in the collaborator and is logged.
pub struct IntrospectContext {
    feature: Feature,
    commands: UnboundedSender<Command>,
    reported: bool,
}

impl IntrospectContext {
    pub(crate) fn new(feature: Feature, commands: UnboundedSender<Command>) -> Self {
        Self {
            feature,
            commands,
            reported: false,
        }
    }

    /// The feature this context reports for.
    pub fn feature(&self) -> &Feature {
        &self.feature
    }

    /// The feature's introspection completed successfully.
    pub fn report_ready(self) {
        self.report(IntrospectOutcome::Ready);
    }

    /// The feature turned out not to apply to this remote object.
    pub fn report_missing(self) {
        self.report(IntrospectOutcome::Missing);
    }

    /// The feature's introspection failed. For a critical feature this
    /// poisons the whole helper; otherwise it is absorbed as `Missing`.
    pub fn report_failed<M>(self, message: M)
    where
        M: Into<Arc<str>>,
    {
        self.report(IntrospectOutcome::Failed {
            message: message.into(),
        });
    }

    fn report(mut self, outcome: IntrospectOutcome) {
        self.reported = true;
        // The driver may already be gone during teardown.
        let _ = self.commands.send(Command::IntrospectDone {
            feature: self.feature.clone(),
            outcome,
        });
    }
}

impl Drop for IntrospectContext {
    fn drop(&mut self) {
        if !self.reported {
            warn!(
                feature = %self.feature,
                "introspection context dropped without reporting; feature will never settle"
            );
        }
    }
}

impl fmt::Debug for IntrospectContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("IntrospectContext")
            .field("feature", &self.feature)
            .field("reported", &self.reported)
            .finish_non_exhaustive()
    }
}
