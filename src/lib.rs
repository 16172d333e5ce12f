//! Soroi - feature-graph readiness engine
//!
//! A small Tokio building block for remote-object proxies that "become
//! ready" piecewise: usable state is described as a set of named
//! [`Feature`]s forming a dependency graph, gated by the interfaces the
//! remote object supports and by an out-of-band status value. The
//! [`ReadinessHelper`] drives every feature through its introspection
//! exactly once and resolves overlapping [`become_ready`]
//! requests deterministically, propagating permanent failure to all of
//! them.
//!
//! [`become_ready`]: ReadinessHelper::become_ready

mod error;
mod feature;
mod helper;
mod introspectable;
mod ready_request;
mod signal;
mod status;

mod internal;

pub use error::Error;
pub use feature::{Feature, FeatureSet};
pub use helper::{ReadinessBuilder, ReadinessHelper};
pub use introspectable::{IntrospectContext, Introspectable};
pub use ready_request::ReadyRequest;
pub use signal::{CompletionSignal, SignalState};
pub use status::Status;

pub type Result<T = ()> = std::result::Result<T, Error>;
pub type RequestId = u128;
