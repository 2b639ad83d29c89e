//! Micro-architectural events the model reports to the HPM multiplexer.
//!
//! Each event occupies one kind slot; its platform id is what software writes
//! into `mhpmeventN` to count it.

use driver_core::{EventKind, EventMultiplexer, HpmError, PlatformEvent};

/// Countable model event. The discriminant is the platform event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ModelEvent {
    /// Retired load.
    Load = 1,
    /// Retired store.
    Store = 2,
    /// Retired conditional branch.
    Branch = 3,
    /// Conditional branch that was taken.
    BranchTaken = 4,
    /// `jal` or `jalr`.
    Jump = 5,
    /// `ecall`.
    EnvironmentCall = 6,
    /// Any synchronous exception.
    Exception = 7,
    /// Zicsr instruction.
    CsrAccess = 8,
}

impl ModelEvent {
    /// Every event, in kind order.
    pub const ALL: [Self; 8] = [
        Self::Load,
        Self::Store,
        Self::Branch,
        Self::BranchTaken,
        Self::Jump,
        Self::EnvironmentCall,
        Self::Exception,
        Self::CsrAccess,
    ];

    /// Value software writes into a selector to count this event.
    #[must_use]
    pub const fn platform_event_id(self) -> u64 {
        self as u64
    }

    /// Multiplexer slot the event is raised on.
    #[must_use]
    pub const fn kind(self) -> EventKind {
        match EventKind::new(self as usize - 1) {
            Some(kind) => kind,
            None => unreachable!(),
        }
    }
}

/// Platform table registering every [`ModelEvent`].
#[must_use]
pub fn platform_events() -> Vec<PlatformEvent> {
    ModelEvent::ALL
        .iter()
        .map(|event| PlatformEvent {
            kind: event.kind(),
            platform_event_id: event.platform_event_id(),
        })
        .collect()
}

/// Builds a multiplexer that tracks every model event.
///
/// # Errors
///
/// Propagates table validation failures.
pub fn event_multiplexer() -> Result<EventMultiplexer, HpmError> {
    EventMultiplexer::new(&platform_events())
}
