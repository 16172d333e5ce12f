use std::fmt;

/// Coarse connectivity/status value of the owning proxy object.
///
/// The engine treats the value as opaque; owners map their own domain
/// statuses (disconnected, connecting, connected, ...) onto it. A helper
/// starts in [`Status::UNKNOWN`] until the owner pushes a real value via
/// [`crate::ReadinessHelper::set_status`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Status(pub u32);

impl Status {
    /// Sentinel used before the owner has reported any status.
    pub const UNKNOWN: Status = Status(0);

    pub fn new(value: u32) -> Self {
        Status(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for Status {
    fn from(value: u32) -> Self {
        Status(value)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
