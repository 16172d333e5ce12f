use std::{collections::BTreeSet, sync::Arc};

use tokio::{
    select,
    sync::{
        mpsc::{UnboundedReceiver, UnboundedSender},
        watch,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Snapshot;
use crate::{
    Error, Feature, FeatureSet, IntrospectContext, Introspectable, ReadyRequest, Status,
    introspectable::IntrospectFn,
};

/// Driving events pushed into the driver task, one per boundary operation.
pub(crate) enum Command {
    SetStatus(Status),
    SetInterfaces(Vec<Arc<str>>),
    BecomeReady { request: ReadyRequest },
    IntrospectDone { feature: Feature, outcome: IntrospectOutcome },
    Invalidate { message: Arc<str> },
}

/// Result reported by an introspection callback's continuation.
pub(crate) enum IntrospectOutcome {
    Ready,
    Missing,
    Failed { message: Arc<str> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeatureState {
    NotStarted,
    InProgress,
    Ready,
    Missing,
    CriticallyFailed,
}

impl FeatureState {
    fn is_terminal(self) -> bool {
        matches!(
            self,
            FeatureState::Ready | FeatureState::Missing | FeatureState::CriticallyFailed
        )
    }
}

struct Slot {
    feature: Feature,
    statuses: Option<BTreeSet<Status>>,
    depends_on: FeatureSet,
    interfaces: Vec<Arc<str>>,
    introspect: Option<IntrospectFn>,
    state: FeatureState,
}

impl Slot {
    fn applicable_in(&self, status: Status) -> bool {
        match &self.statuses {
            Some(statuses) => statuses.contains(&status),
            None => true,
        }
    }
}

/// What one fixpoint step decided for a `NotStarted` feature.
enum Decision {
    Skip,
    Start,
    MarkMissing,
    MarkCriticallyFailed,
}

/// Owns all readiness state and is its sole mutator.
///
/// Runs as one spawned task per helper: receives a command, applies it,
/// iterates the fixpoint to quiescence, resolves any satisfiable ready
/// requests and publishes a fresh [`Snapshot`]. Commands are processed
/// strictly one at a time, so the effects of an earlier driving event are
/// always fully settled before a later one is looked at.
pub(crate) struct Driver {
    rx: UnboundedReceiver<Command>,
    /// Loopback sender minted into [`IntrospectContext`]s.
    commands: UnboundedSender<Command>,
    view: watch::Sender<Snapshot>,
    cancel: CancellationToken,
    /// Registration order; fixpoint passes iterate in this order.
    slots: Vec<Slot>,
    registered: FeatureSet,
    status: Status,
    interfaces: Option<BTreeSet<Arc<str>>>,
    /// Union of everything ever asked for via become_ready.
    requested: FeatureSet,
    /// Requested features that were never registered; terminal `Missing`.
    unregistered: FeatureSet,
    pending: Vec<ReadyRequest>,
    fatal: Option<Error>,
}

impl Driver {
    pub(crate) fn new(
        rx: UnboundedReceiver<Command>,
        commands: UnboundedSender<Command>,
        view: watch::Sender<Snapshot>,
        cancel: CancellationToken,
        status: Status,
        introspectables: Vec<(Feature, Introspectable)>,
    ) -> Self {
        let registered = introspectables.iter().map(|(f, _)| f.clone()).collect();
        let slots = introspectables
            .into_iter()
            .map(|(feature, descriptor)| Slot {
                feature,
                statuses: descriptor.statuses,
                depends_on: descriptor.depends_on,
                interfaces: descriptor.interfaces,
                introspect: Some(descriptor.introspect),
                state: FeatureState::NotStarted,
            })
            .collect();
        Self {
            rx,
            commands,
            view,
            cancel,
            slots,
            registered,
            status,
            interfaces: None,
            requested: FeatureSet::new(),
            unregistered: FeatureSet::new(),
            pending: Vec::new(),
            fatal: None,
        }
    }

    pub(crate) async fn run(mut self) {
        self.iterate();
        self.publish();
        loop {
            select! {
                _ = self.cancel.cancelled() => break,
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => {
                        self.apply(cmd);
                        self.iterate();
                        self.publish();
                    }
                    None => break,
                },
            }
        }
        self.shutdown();
    }

    /// Abort outstanding requests; the owning handles are gone.
    fn shutdown(&mut self) {
        for request in self.pending.drain(..) {
            request.signal().reject(Error::EngineGone);
        }
    }

    fn apply(&mut self, cmd: Command) {
        match cmd {
            Command::SetStatus(status) => {
                if self.fatal.is_some() {
                    debug!(%status, "ignoring status change on a poisoned helper");
                    return;
                }
                if self.status == status {
                    return;
                }
                debug!(old = %self.status, new = %status, "status changed");
                self.status = status;
            }
            Command::SetInterfaces(names) => {
                if self.fatal.is_some() {
                    return;
                }
                debug!(?names, "interfaces reported");
                self.interfaces = Some(names.into_iter().collect());
            }
            Command::BecomeReady { request } => self.become_ready(request),
            Command::IntrospectDone { feature, outcome } => {
                self.introspect_done(feature, outcome);
            }
            Command::Invalidate { message } => {
                // First fatal error wins; a second invalidation is a no-op.
                if self.fatal.is_some() {
                    return;
                }
                warn!(%message, "owner invalidated, failing all unsettled features");
                self.poison(Error::Invalidated(message));
            }
        }
    }

    fn become_ready(&mut self, request: ReadyRequest) {
        if let Some(err) = &self.fatal {
            debug!(id = request.id(), "rejecting ready request on a poisoned helper");
            request.signal().reject(err.clone());
            return;
        }
        self.requested
            .extend(request.requested_features().iter().cloned());
        for feature in request.requested_features() {
            if !self.registered.contains(feature) && self.unregistered.insert(feature.clone()) {
                debug!(
                    %feature,
                    "requested feature was never registered, treating as missing"
                );
            }
        }
        self.pending.push(request);
    }

    fn introspect_done(&mut self, feature: Feature, outcome: IntrospectOutcome) {
        let Some(idx) = self.slots.iter().position(|s| s.feature == feature) else {
            warn!(%feature, "introspection report for an unknown feature, ignoring");
            return;
        };
        if self.slots[idx].state != FeatureState::InProgress {
            // Late report after poisoning, or an out-of-contract double
            // report; terminal states never regress.
            debug!(
                %feature,
                state = ?self.slots[idx].state,
                "introspection report for a settled feature, ignoring"
            );
            return;
        }
        match outcome {
            IntrospectOutcome::Ready => {
                debug!(%feature, "feature ready");
                self.slots[idx].state = FeatureState::Ready;
            }
            IntrospectOutcome::Missing => {
                debug!(%feature, "feature reported missing");
                self.slots[idx].state = FeatureState::Missing;
            }
            IntrospectOutcome::Failed { message } => {
                if self.slots[idx].feature.is_critical() {
                    warn!(%feature, %message, "critical feature failed, poisoning helper");
                    self.slots[idx].state = FeatureState::CriticallyFailed;
                    self.poison(Error::CriticalFailure {
                        feature: self.slots[idx].feature.clone_id(),
                        message,
                    });
                } else {
                    // A non-critical failure is a soft outcome.
                    debug!(%feature, %message, "feature introspection failed, marking missing");
                    self.slots[idx].state = FeatureState::Missing;
                }
            }
        }
    }

    /// Record the fatal error and force every unsettled feature to
    /// `CriticallyFailed`. The helper never recovers from this.
    fn poison(&mut self, error: Error) {
        self.fatal = Some(error);
        for slot in &mut self.slots {
            if !slot.state.is_terminal() {
                slot.state = FeatureState::CriticallyFailed;
                slot.introspect = None;
            }
        }
    }

    /// One fixpoint iteration: sweep all features in registration order,
    /// advancing whichever can advance, until a full pass changes nothing.
    /// Then resolve every ready request whose features are all terminal.
    fn iterate(&mut self) {
        loop {
            let mut changed = false;
            for idx in 0..self.slots.len() {
                if self.slots[idx].state != FeatureState::NotStarted {
                    continue;
                }
                match self.decide(idx) {
                    Decision::Skip => {}
                    Decision::MarkMissing => {
                        debug!(feature = %self.slots[idx].feature, "feature cannot be satisfied, marking missing");
                        self.slots[idx].state = FeatureState::Missing;
                        changed = true;
                    }
                    Decision::MarkCriticallyFailed => {
                        self.slots[idx].state = FeatureState::CriticallyFailed;
                        changed = true;
                    }
                    Decision::Start => {
                        debug!(feature = %self.slots[idx].feature, "starting introspection");
                        self.slots[idx].state = FeatureState::InProgress;
                        changed = true;
                        if let Some(introspect) = self.slots[idx].introspect.take() {
                            let cx = IntrospectContext::new(
                                self.slots[idx].feature.clone(),
                                self.commands.clone(),
                            );
                            // May report synchronously; the report lands in
                            // the command queue and is processed as its own
                            // turn after this one settles.
                            introspect(cx);
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }
        self.resolve_pending();
    }

    fn decide(&self, idx: usize) -> Decision {
        let slot = &self.slots[idx];
        if self.fatal.is_some() {
            return Decision::MarkCriticallyFailed;
        }
        match &self.interfaces {
            Some(present) => {
                if let Some(absent) = slot.interfaces.iter().find(|n| !present.contains(*n)) {
                    debug!(
                        feature = %slot.feature,
                        interface = %absent,
                        "required interface is absent"
                    );
                    return Decision::MarkMissing;
                }
            }
            None => {
                // Interface list not reported yet; cannot decide.
                if !slot.interfaces.is_empty() {
                    return Decision::Skip;
                }
            }
        }
        if !slot.applicable_in(self.status) {
            // The status may still change later; not a failure.
            return Decision::Skip;
        }
        let mut decision = Decision::Start;
        for dep in &slot.depends_on {
            match self.state_of(dep) {
                Some(FeatureState::Ready) => {}
                // A dependency that cannot become ready drags this
                // feature down with it, unregistered ones included.
                Some(FeatureState::Missing) | Some(FeatureState::CriticallyFailed) | None => {
                    return Decision::MarkMissing;
                }
                Some(_) => decision = Decision::Skip,
            }
        }
        decision
    }

    fn state_of(&self, feature: &Feature) -> Option<FeatureState> {
        self.slots
            .iter()
            .find(|s| s.feature == *feature)
            .map(|s| s.state)
    }

    fn all_terminal(&self, features: &FeatureSet) -> bool {
        features.iter().all(|f| match self.state_of(f) {
            Some(state) => state.is_terminal(),
            // Never registered: terminal `Missing` by policy.
            None => true,
        })
    }

    fn resolve_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        for request in pending {
            if !self.all_terminal(request.requested_features()) {
                self.pending.push(request);
                continue;
            }
            match &self.fatal {
                Some(err) => {
                    debug!(id = request.id(), error = %err, "rejecting ready request");
                    request.signal().reject(err.clone());
                }
                None => {
                    debug!(id = request.id(), requested = %request.requested_features(), "ready request resolved");
                    request.signal().resolve();
                }
            }
        }
    }

    fn publish(&self) {
        let mut ready = FeatureSet::new();
        let mut missing = self.unregistered.clone();
        for slot in &self.slots {
            match slot.state {
                FeatureState::Ready => {
                    ready.insert(slot.feature.clone());
                }
                FeatureState::Missing => {
                    missing.insert(slot.feature.clone());
                }
                _ => {}
            }
        }
        self.view.send_replace(Snapshot {
            status: self.status,
            interfaces: self
                .interfaces
                .as_ref()
                .map(|names| names.iter().cloned().collect()),
            registered: self.registered.clone(),
            ready,
            missing,
            requested: self.requested.clone(),
            fatal: self.fatal.clone(),
        });
    }
}
