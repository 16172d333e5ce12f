mod driver;
mod snapshot;

pub(crate) use driver::{Command, Driver, IntrospectOutcome};
pub(crate) use snapshot::Snapshot;
