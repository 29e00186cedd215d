//! Lock lifecycle events.

/// Fire-and-forget events dispatched by [`Lock`](super::Lock) handles.
///
/// [`LockEvent::name`] yields the stable wire identifier for listeners that
/// route on event names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEvent {
    Acquired { key: String, owner: String },
    Released { key: String, owner: String },
    FailedRelease { key: String, owner: String },
    FailedRefresh { key: String, owner: String },
    Unavailable { key: String, owner: String },
    ForceReleased { key: String },
    Refreshed { key: String, owner: String },
    UnexpectedError { key: String, message: String },
}

impl LockEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LockEvent::Acquired { .. } => "ACQUIRED",
            LockEvent::Released { .. } => "RELEASED",
            LockEvent::FailedRelease { .. } => "FAILED_RELEASE",
            LockEvent::FailedRefresh { .. } => "FAILED_REFRESH",
            LockEvent::Unavailable { .. } => "UNAVAILABLE",
            LockEvent::ForceReleased { .. } => "FORCE_RELEASED",
            LockEvent::Refreshed { .. } => "REFRESHED",
            LockEvent::UnexpectedError { .. } => "UNEXPECTED_ERROR",
        }
    }

    pub fn key(&self) -> &str {
        match self {
            LockEvent::Acquired { key, .. }
            | LockEvent::Released { key, .. }
            | LockEvent::FailedRelease { key, .. }
            | LockEvent::FailedRefresh { key, .. }
            | LockEvent::Unavailable { key, .. }
            | LockEvent::ForceReleased { key }
            | LockEvent::Refreshed { key, .. }
            | LockEvent::UnexpectedError { key, .. } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable_identifiers() {
        let event = LockEvent::Acquired { key: "k".into(), owner: "o".into() };
        assert_eq!(event.name(), "ACQUIRED");
        assert_eq!(event.key(), "k");

        let event = LockEvent::ForceReleased { key: "k".into() };
        assert_eq!(event.name(), "FORCE_RELEASED");
    }
}
