use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::{
    Error, Feature, FeatureSet, Introspectable, ReadyRequest, Result, Status,
    internal::{Command, Driver, Snapshot},
};

/// Feature-graph readiness engine for one remote object.
///
/// A remote object's usable state is a set of named [`Feature`]s, each
/// standing for one chunk of introspection. Features depend on each other,
/// on remote interfaces that may or may not be present, and on a coarse
/// status value that changes out of band. The helper owns the registered
/// descriptors, advances each feature through
/// `NotStarted -> InProgress -> {Ready | Missing | CriticallyFailed}`,
/// and resolves [`become_ready`](ReadinessHelper::become_ready) requests as
/// their features settle.
///
/// All state lives in a driver task spawned by
/// [`ReadinessBuilder::spawn`]; the handle is a cheap clone that pushes
/// driving events into the task and reads published state for the
/// synchronous queries. Queries therefore observe the state as of the last
/// driving event the driver has fully processed.
///
/// When the last handle is dropped the driver stops and any outstanding
/// requests are rejected with [`Error::EngineGone`].
///
/// ```rust,ignore
/// let core = Feature::critical("core");
/// let helper = ReadinessHelper::builder()
///     .register(core.clone(), Introspectable::new(introspect_core))
///     .spawn()?;
/// helper.set_status(Status::new(CONNECTED));
/// helper.become_ready([core]).finished().await?;
/// ```
#[derive(Debug, Clone)]
pub struct ReadinessHelper {
    commands: mpsc::UnboundedSender<Command>,
    view: watch::Receiver<Snapshot>,
    _guard: Arc<DropGuard>,
}

impl ReadinessHelper {
    pub fn builder() -> ReadinessBuilder {
        ReadinessBuilder::default()
    }

    /// Push a status change. Features only applicable in the new status
    /// become startable; features already terminal are unaffected.
    pub fn set_status(&self, status: Status) {
        self.send(Command::SetStatus(status));
    }

    /// Report the remote object's supported interfaces.
    ///
    /// May be called again as more is learned, but an interface absence
    /// already acted upon is permanent: a feature marked `Missing` because
    /// of an absent interface is never revisited, even if a later list
    /// contains the interface.
    pub fn set_interfaces<I, N>(&self, names: I)
    where
        I: IntoIterator<Item = N>,
        N: Into<Arc<str>>,
    {
        self.send(Command::SetInterfaces(
            names.into_iter().map(Into::into).collect(),
        ));
    }

    /// Request that every feature in `features` reaches a terminal state.
    ///
    /// The returned request succeeds once all requested features are
    /// settled, even if some are `Missing` (including features that were
    /// never registered); it fails only when the helper is poisoned by a
    /// critical failure or owner invalidation. The request is never
    /// resolved synchronously: immediately after this call it reports
    /// unfinished.
    pub fn become_ready<S>(&self, features: S) -> ReadyRequest
    where
        S: Into<FeatureSet>,
    {
        let request = ReadyRequest::new(features.into());
        if self
            .commands
            .send(Command::BecomeReady {
                request: request.clone(),
            })
            .is_err()
        {
            request.signal().reject(Error::EngineGone);
        }
        request
    }

    /// The owning proxy became permanently unusable. Fails every unsettled
    /// feature, rejects all pending requests with the given error, and
    /// poisons all future ones.
    pub fn invalidate<M>(&self, message: M)
    where
        M: Into<Arc<str>>,
    {
        self.send(Command::Invalidate {
            message: message.into(),
        });
    }

    fn send(&self, cmd: Command) {
        if self.commands.send(cmd).is_err() {
            debug!("readiness driver is gone, dropping command");
        }
    }

    /// Whether every feature in `features` has settled acceptably: critical
    /// features must be `Ready`, non-critical ones may also be `Missing`.
    /// Always false once the helper is poisoned.
    pub fn is_ready(&self, features: &FeatureSet) -> bool {
        self.view.borrow().is_ready(features)
    }

    /// Features that completed introspection successfully.
    pub fn actual_features(&self) -> FeatureSet {
        self.view.borrow().ready.clone()
    }

    /// Features that settled as not applicable, including requested
    /// features that were never registered.
    pub fn missing_features(&self) -> FeatureSet {
        self.view.borrow().missing.clone()
    }

    /// Union of everything ever asked for via
    /// [`become_ready`](ReadinessHelper::become_ready).
    pub fn requested_features(&self) -> FeatureSet {
        self.view.borrow().requested.clone()
    }

    pub fn current_status(&self) -> Status {
        self.view.borrow().status
    }

    /// `None` until the owner has reported an interface list.
    pub fn interfaces(&self) -> Option<Vec<Arc<str>>> {
        self.view.borrow().interfaces.clone()
    }

    /// The error that poisoned this helper, if any.
    pub fn fatal_error(&self) -> Option<Error> {
        self.view.borrow().fatal.clone()
    }
}

/// Collects feature registrations and spawns the driver task.
///
/// Registration is only possible here, before the helper exists; this is
/// how "no registration after the first status is set" is enforced.
#[derive(Default)]
pub struct ReadinessBuilder {
    introspectables: Vec<(Feature, Introspectable)>,
    initial_status: Status,
}

impl ReadinessBuilder {
    /// Register the descriptor for one feature. Duplicate ids are rejected
    /// at [`spawn`](ReadinessBuilder::spawn).
    pub fn register(mut self, feature: Feature, introspectable: Introspectable) -> Self {
        self.introspectables.push((feature, introspectable));
        self
    }

    /// Status the helper starts in; defaults to [`Status::UNKNOWN`].
    pub fn initial_status(mut self, status: Status) -> Self {
        self.initial_status = status;
        self
    }

    /// Spawn the driver task and return the handle. Requires a Tokio
    /// runtime.
    pub fn spawn(self) -> Result<ReadinessHelper> {
        let mut seen = FeatureSet::new();
        for (feature, _) in &self.introspectables {
            if !seen.insert(feature.clone()) {
                return Err(Error::AlreadyRegistered(feature.clone_id()));
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(Snapshot {
            status: self.initial_status,
            registered: seen,
            ..Snapshot::default()
        });
        let cancel = CancellationToken::new();
        let driver = Driver::new(
            rx,
            tx.clone(),
            view_tx,
            cancel.clone(),
            self.initial_status,
            self.introspectables,
        );
        tokio::spawn(driver.run());

        Ok(ReadinessHelper {
            commands: tx,
            view: view_rx,
            _guard: Arc::new(cancel.drop_guard()),
        })
    }
}
