//! Hardware performance-monitor event multiplexing.
//!
//! The model raises internal event kinds with [`EventMultiplexer::signal`]; once
//! per tick the scheduler drains them into the `mhpmcounter` registers whose
//! `mhpmevent` selectors currently name the event's platform id.
//!
//! When every tracked kind is selected by at most one counter the drain uses a
//! direct lookup of the recorded counter index. Otherwise it scans the whole
//! selector table so that aliased counters all observe the event.

use thiserror::Error;

use crate::TraceCategory;

/// Upper bound on internal event kinds (one pending bit each).
pub const MAX_EVENT_KINDS: usize = 64;
/// Number of programmable counter/selector pairs (`mhpmcounter3..31`).
pub const HPM_COUNTER_COUNT: usize = 29;
/// Bit of `mcountinhibit` corresponding to counter index 0.
pub const INHIBIT_BIT_BASE: usize = 3;

const PLATFORM: &str = TraceCategory::Platform.target();

/// HPM bookkeeping failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HpmError {
    /// Platform event table is larger than the pending bitmask.
    #[error("platform event table has {0} entries, at most {MAX_EVENT_KINDS} are supported")]
    TooManyEvents(usize),
    /// Platform id `0` is reserved for unused slots.
    #[error("event kind {kind} uses reserved platform event id 0")]
    ZeroPlatformEventId {
        /// Offending kind index.
        kind: u8,
    },
    /// A selector left an event that no counter was recorded as selecting.
    #[error("selector count underflow for event kind {kind} (platform id {platform_event_id:#x})")]
    SelectorUnderflow {
        /// Kind whose count would go negative.
        kind: u8,
        /// Platform id being deselected.
        platform_event_id: u64,
    },
    /// Counter index outside `0..HPM_COUNTER_COUNT`.
    #[error("hpm counter index {0} out of range")]
    CounterIndexOutOfRange(usize),
}

/// Internal event kind, `0..MAX_EVENT_KINDS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKind(u8);

impl EventKind {
    /// Creates a kind from its index.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(index: usize) -> Option<Self> {
        if index < MAX_EVENT_KINDS {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    /// Kind index, also its bit position in [`PendingEventSet`].
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Static mapping of an internal kind to the id software writes into a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformEvent {
    /// Internal kind.
    pub kind: EventKind,
    /// Selector value naming this event; never `0`.
    pub platform_event_id: u64,
}

/// Per-kind selector bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventDescriptor {
    /// Selector value naming this kind; `0` marks an untracked slot.
    pub platform_event_id: u64,
    /// Counter most recently assigned to this kind.
    pub counter_index: usize,
    /// Number of selectors currently holding `platform_event_id`.
    pub selector_count: u32,
}

impl EventDescriptor {
    /// `true` when this slot belongs to a platform event.
    #[must_use]
    pub const fn is_tracked(&self) -> bool {
        self.platform_event_id != 0
    }
}

/// Kinds raised since the last drain. Multiplicity within a tick is collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingEventSet(u64);

impl PendingEventSet {
    /// Marks `kind` as raised.
    pub const fn insert(&mut self, kind: EventKind) {
        self.0 |= 1 << kind.index();
    }

    /// `true` when `kind` was raised.
    #[must_use]
    pub const fn contains(self, kind: EventKind) -> bool {
        self.0 & (1 << kind.index()) != 0
    }

    /// `true` when nothing is pending.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Raw bitmask.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Clears every bit.
    pub const fn clear(&mut self) {
        self.0 = 0;
    }

    /// Pending kinds in increasing index order.
    pub fn iter(self) -> impl Iterator<Item = EventKind> {
        let mut remaining = self.0;
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            let index = remaining.trailing_zeros() as usize;
            remaining &= remaining - 1;
            EventKind::new(index)
        })
    }
}

/// Drain strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPath {
    /// Increment the recorded counter of each event.
    Fast,
    /// Scan every selector for each event.
    Slow,
}

/// Counter and selector registers plus `mcountinhibit`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct HpmRegisterFile {
    selectors: [u64; HPM_COUNTER_COUNT],
    counters: [u64; HPM_COUNTER_COUNT],
    inhibit: u32,
}

impl HpmRegisterFile {
    /// Current selector value of counter `index`.
    #[must_use]
    pub fn selector(&self, index: usize) -> Option<u64> {
        self.selectors.get(index).copied()
    }

    /// Full selector table.
    #[must_use]
    pub const fn selectors(&self) -> &[u64; HPM_COUNTER_COUNT] {
        &self.selectors
    }

    /// Current value of counter `index`.
    #[must_use]
    pub fn counter(&self, index: usize) -> Option<u64> {
        self.counters.get(index).copied()
    }

    /// Full counter table.
    #[must_use]
    pub const fn counters(&self) -> &[u64; HPM_COUNTER_COUNT] {
        &self.counters
    }

    /// Software write to a counter.
    ///
    /// # Errors
    ///
    /// Returns [`HpmError::CounterIndexOutOfRange`] for an invalid index.
    pub fn set_counter(&mut self, index: usize, value: u64) -> Result<(), HpmError> {
        let slot = self
            .counters
            .get_mut(index)
            .ok_or(HpmError::CounterIndexOutOfRange(index))?;
        *slot = value;
        Ok(())
    }

    /// `mcountinhibit` value.
    #[must_use]
    pub const fn inhibit(&self) -> u32 {
        self.inhibit
    }

    /// Replaces `mcountinhibit`.
    pub const fn set_inhibit(&mut self, value: u32) {
        self.inhibit = value;
    }

    /// `true` when counter `index` is frozen by `mcountinhibit`.
    #[must_use]
    pub const fn is_inhibited(&self, index: usize) -> bool {
        index < HPM_COUNTER_COUNT && (self.inhibit >> (index + INHIBIT_BIT_BASE)) & 1 == 1
    }

    /// Software write to selector `index`, keeping `events` bookkeeping in step.
    ///
    /// # Errors
    ///
    /// Propagates range and underflow errors from
    /// [`EventMultiplexer::on_selector_write`]; the selector is left unchanged.
    pub fn write_selector(
        &mut self,
        index: usize,
        value: u64,
        events: &mut EventMultiplexer,
    ) -> Result<(), HpmError> {
        let old = self
            .selector(index)
            .ok_or(HpmError::CounterIndexOutOfRange(index))?;
        events.on_selector_write(index, value, old)?;
        self.selectors[index] = value;
        if old != value {
            events.resync_counter_index(old, &self.selectors);
        }
        Ok(())
    }

    /// Adds one to counter `index` unless inhibited; returns whether it changed.
    pub fn increment(&mut self, index: usize) -> bool {
        if index >= HPM_COUNTER_COUNT || self.is_inhibited(index) {
            return false;
        }
        self.counters[index] = self.counters[index].wrapping_add(1);
        true
    }
}

/// Event-to-counter multiplexer for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMultiplexer {
    descriptors: [EventDescriptor; MAX_EVENT_KINDS],
    pending: PendingEventSet,
    fast_path_usable: bool,
}

impl Default for EventMultiplexer {
    fn default() -> Self {
        Self {
            descriptors: [EventDescriptor::default(); MAX_EVENT_KINDS],
            pending: PendingEventSet::default(),
            fast_path_usable: true,
        }
    }
}

impl EventMultiplexer {
    /// Builds the multiplexer from the platform's event table.
    ///
    /// # Errors
    ///
    /// Returns [`HpmError::TooManyEvents`] for tables over [`MAX_EVENT_KINDS`]
    /// entries and [`HpmError::ZeroPlatformEventId`] for entries using the
    /// reserved id.
    pub fn new(table: &[PlatformEvent]) -> Result<Self, HpmError> {
        if table.len() > MAX_EVENT_KINDS {
            return Err(HpmError::TooManyEvents(table.len()));
        }
        let mut mux = Self::default();
        for event in table {
            if event.platform_event_id == 0 {
                return Err(HpmError::ZeroPlatformEventId {
                    kind: event.kind.0,
                });
            }
            mux.descriptors[event.kind.index()].platform_event_id = event.platform_event_id;
        }
        Ok(mux)
    }

    /// Forgets selector assignments and pending events; platform ids are kept.
    pub fn reset(&mut self) {
        for descriptor in &mut self.descriptors {
            descriptor.counter_index = 0;
            descriptor.selector_count = 0;
        }
        self.pending.clear();
        self.fast_path_usable = true;
    }

    /// Bookkeeping entry of `kind`.
    #[must_use]
    pub const fn descriptor(&self, kind: EventKind) -> &EventDescriptor {
        &self.descriptors[kind.index()]
    }

    /// Kinds raised since the last drain.
    #[must_use]
    pub const fn pending(&self) -> PendingEventSet {
        self.pending
    }

    /// `true` while no tracked kind is selected by more than one counter.
    #[must_use]
    pub const fn fast_path_usable(&self) -> bool {
        self.fast_path_usable
    }

    /// Strategy the next drain will use.
    #[must_use]
    pub const fn dispatch_path(&self) -> DispatchPath {
        if self.fast_path_usable {
            DispatchPath::Fast
        } else {
            DispatchPath::Slow
        }
    }

    /// Records that `kind` occurred.
    pub fn signal(&mut self, kind: EventKind) {
        tracing::trace!(target: PLATFORM, kind = kind.index(), "hpm event raised");
        self.pending.insert(kind);
    }

    /// Updates selector counts after counter `counter_index` switched from
    /// `old_event_id` to `new_event_id`.
    ///
    /// # Errors
    ///
    /// Returns [`HpmError::CounterIndexOutOfRange`] for an invalid index and
    /// [`HpmError::SelectorUnderflow`] when a kind leaving the selector had no
    /// recorded selector. No bookkeeping changes on error.
    #[allow(clippy::cast_possible_truncation)]
    pub fn on_selector_write(
        &mut self,
        counter_index: usize,
        new_event_id: u64,
        old_event_id: u64,
    ) -> Result<(), HpmError> {
        if counter_index >= HPM_COUNTER_COUNT {
            return Err(HpmError::CounterIndexOutOfRange(counter_index));
        }
        if new_event_id == old_event_id {
            return Ok(());
        }
        if let Some((kind, descriptor)) = self.descriptors.iter().enumerate().find(|(_, d)| {
            d.is_tracked() && d.platform_event_id == old_event_id && d.selector_count == 0
        }) {
            return Err(HpmError::SelectorUnderflow {
                kind: kind as u8,
                platform_event_id: descriptor.platform_event_id,
            });
        }

        for descriptor in self.descriptors.iter_mut().filter(|d| d.is_tracked()) {
            if descriptor.platform_event_id == new_event_id {
                descriptor.counter_index = counter_index;
                descriptor.selector_count += 1;
            }
            if descriptor.platform_event_id == old_event_id {
                descriptor.selector_count -= 1;
            }
        }
        self.fast_path_usable = self.descriptors.iter().all(|d| d.selector_count <= 1);
        tracing::trace!(
            target: PLATFORM,
            counter_index,
            new_event_id,
            old_event_id,
            fast_path = self.fast_path_usable,
            "hpm selector updated"
        );
        Ok(())
    }

    /// Points kinds of `event_id` that are left with one selector at the
    /// counter still holding it.
    fn resync_counter_index(&mut self, event_id: u64, selectors: &[u64; HPM_COUNTER_COUNT]) {
        let Some(remaining) = selectors.iter().position(|&s| s == event_id) else {
            return;
        };
        for descriptor in &mut self.descriptors {
            if descriptor.is_tracked()
                && descriptor.platform_event_id == event_id
                && descriptor.selector_count == 1
            {
                descriptor.counter_index = remaining;
            }
        }
    }

    /// Drains pending events into `registers` using the current dispatch path.
    /// Returns the number of counter increments applied.
    pub fn process_pending(&mut self, registers: &mut HpmRegisterFile) -> u32 {
        self.drain_with(self.dispatch_path(), registers)
    }

    /// Drains pending events with an explicit strategy.
    ///
    /// [`DispatchPath::Fast`] is only exact while [`Self::fast_path_usable`]
    /// holds.
    pub fn drain_with(&mut self, path: DispatchPath, registers: &mut HpmRegisterFile) -> u32 {
        let mut applied = 0;
        for kind in self.pending.iter() {
            let descriptor = self.descriptors[kind.index()];
            if !descriptor.is_tracked() {
                continue;
            }
            match path {
                DispatchPath::Fast => {
                    if descriptor.selector_count > 0
                        && registers.increment(descriptor.counter_index)
                    {
                        applied += 1;
                    }
                }
                DispatchPath::Slow => {
                    for index in 0..HPM_COUNTER_COUNT {
                        if registers.selectors[index] == descriptor.platform_event_id
                            && registers.increment(index)
                        {
                            applied += 1;
                        }
                    }
                }
            }
        }
        if !self.pending.is_empty() {
            tracing::trace!(
                target: PLATFORM,
                pending = self.pending.bits(),
                ?path,
                applied,
                "hpm events drained"
            );
        }
        self.pending.clear();
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DispatchPath, EventKind, EventMultiplexer, HpmError, HpmRegisterFile, PlatformEvent,
        HPM_COUNTER_COUNT, MAX_EVENT_KINDS,
    };

    const LOAD: u64 = 0x10;
    const STORE: u64 = 0x11;

    fn kind(index: usize) -> EventKind {
        EventKind::new(index).expect("kind index in range")
    }

    fn mux() -> EventMultiplexer {
        EventMultiplexer::new(&[
            PlatformEvent {
                kind: kind(0),
                platform_event_id: LOAD,
            },
            PlatformEvent {
                kind: kind(1),
                platform_event_id: STORE,
            },
        ])
        .expect("valid table")
    }

    #[test]
    fn table_validation() {
        let zero = EventMultiplexer::new(&[PlatformEvent {
            kind: kind(4),
            platform_event_id: 0,
        }]);
        assert_eq!(zero, Err(HpmError::ZeroPlatformEventId { kind: 4 }));

        let oversized = vec![
            PlatformEvent {
                kind: kind(0),
                platform_event_id: 1,
            };
            MAX_EVENT_KINDS + 1
        ];
        assert_eq!(
            EventMultiplexer::new(&oversized),
            Err(HpmError::TooManyEvents(MAX_EVENT_KINDS + 1))
        );
        assert_eq!(EventKind::new(MAX_EVENT_KINDS), None);
    }

    #[test]
    fn aliased_selectors_both_count_once() {
        let mut events = mux();
        let mut regs = HpmRegisterFile::default();
        regs.write_selector(5, LOAD, &mut events).expect("select");
        regs.write_selector(7, LOAD, &mut events).expect("select");
        assert_eq!(events.dispatch_path(), DispatchPath::Slow);

        events.signal(kind(0));
        events.signal(kind(0));
        assert_eq!(events.process_pending(&mut regs), 2);

        for index in 0..HPM_COUNTER_COUNT {
            let expected = u64::from(index == 5 || index == 7);
            assert_eq!(regs.counter(index), Some(expected), "counter {index}");
        }
        assert!(events.pending().is_empty());
    }

    #[test]
    fn fast_path_targets_recorded_counter() {
        let mut events = mux();
        let mut regs = HpmRegisterFile::default();
        regs.write_selector(2, STORE, &mut events).expect("select");
        assert!(events.fast_path_usable());

        events.signal(kind(1));
        events.signal(kind(0));
        assert_eq!(events.process_pending(&mut regs), 1);
        assert_eq!(regs.counter(2), Some(1));
    }

    #[test]
    fn dealiasing_restores_fast_path_at_surviving_counter() {
        let mut events = mux();
        let mut regs = HpmRegisterFile::default();
        regs.write_selector(3, LOAD, &mut events).expect("select");
        regs.write_selector(9, LOAD, &mut events).expect("select");
        regs.write_selector(9, 0, &mut events).expect("deselect");
        assert!(events.fast_path_usable());
        assert_eq!(events.descriptor(kind(0)).counter_index, 3);

        events.signal(kind(0));
        events.process_pending(&mut regs);
        assert_eq!(regs.counter(3), Some(1));
        assert_eq!(regs.counter(9), Some(0));
    }

    #[test]
    fn inhibited_counter_is_frozen() {
        let mut events = mux();
        let mut regs = HpmRegisterFile::default();
        regs.write_selector(0, LOAD, &mut events).expect("select");
        regs.set_inhibit(1 << 3);
        assert!(regs.is_inhibited(0));

        events.signal(kind(0));
        assert_eq!(events.process_pending(&mut regs), 0);
        assert_eq!(regs.counter(0), Some(0));
    }

    #[test]
    fn untracked_kinds_and_unselected_events_are_ignored() {
        let mut events = mux();
        let mut regs = HpmRegisterFile::default();
        events.signal(kind(40));
        events.signal(kind(0));
        assert_eq!(events.process_pending(&mut regs), 0);
        assert!(regs.counters().iter().all(|&c| c == 0));
    }

    #[test]
    fn underflow_is_reported_without_side_effects() {
        let mut events = mux();
        let before = events.clone();
        assert_eq!(
            events.on_selector_write(0, 0, LOAD),
            Err(HpmError::SelectorUnderflow {
                kind: 0,
                platform_event_id: LOAD,
            })
        );
        assert_eq!(events, before);
        assert_eq!(
            events.on_selector_write(HPM_COUNTER_COUNT, LOAD, 0),
            Err(HpmError::CounterIndexOutOfRange(HPM_COUNTER_COUNT))
        );
    }

    #[test]
    fn reset_clears_bookkeeping_but_keeps_table() {
        let mut events = mux();
        let mut regs = HpmRegisterFile::default();
        regs.write_selector(1, LOAD, &mut events).expect("select");
        regs.write_selector(2, LOAD, &mut events).expect("select");
        events.signal(kind(0));
        events.reset();

        assert!(events.fast_path_usable());
        assert!(events.pending().is_empty());
        assert_eq!(events.descriptor(kind(0)).selector_count, 0);
        assert_eq!(events.descriptor(kind(0)).platform_event_id, LOAD);
    }
}
