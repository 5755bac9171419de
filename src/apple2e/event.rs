//! Memory events and the listener index.
//!
//! A listener is plain data (scope, type filter, value filter, owner tag)
//! plus a `Handler`.  Handlers for the machine's own soft switches and for
//! card windows are small `Copy` values that `Memory` interprets itself; only
//! user observers carry a boxed closure.
//!
//! The index keeps one bucket per address page and, for the $C0xx I/O hole,
//! one bucket per register.  It is rebuilt in full on every add/remove.

use std::fmt;

use super::switches::Switch;

// ── Events ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Read,
    /// Opcode fetch.
    Execute,
    Write,
}

/// One memory access as seen by listeners.  `value` is what the access will
/// return (reads) or store (writes); any listener may replace it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryEvent {
    address: u16,
    kind: EventType,
    value: u8,
    old: u8,
}

impl MemoryEvent {
    pub fn new(address: u16, kind: EventType, value: u8, old: u8) -> Self {
        Self {
            address,
            kind,
            value,
            old,
        }
    }

    pub fn read(address: u16, value: u8) -> Self {
        Self::new(address, EventType::Read, value, value)
    }

    pub fn write(address: u16, value: u8, old: u8) -> Self {
        Self::new(address, EventType::Write, value, old)
    }

    #[inline]
    pub fn address(&self) -> u16 {
        self.address
    }

    #[inline]
    pub fn kind(&self) -> EventType {
        self.kind
    }

    #[inline]
    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn set_value(&mut self, value: u8) {
        self.value = value;
    }

    /// Byte currently in memory at the address.
    pub fn old_value(&self) -> u8 {
        self.old
    }

    pub fn is_write(&self) -> bool {
        self.kind == EventType::Write
    }
}

// ── Listener configuration ────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFilter {
    /// Data reads and opcode fetches.
    Read,
    Execute,
    Write,
    Any,
}

impl TypeFilter {
    pub fn matches(self, kind: EventType) -> bool {
        match self {
            TypeFilter::Any => true,
            TypeFilter::Read => kind != EventType::Write,
            TypeFilter::Execute => kind == EventType::Execute,
            TypeFilter::Write => kind == EventType::Write,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Address(u16),
    /// Inclusive.
    Range(u16, u16),
    Any,
}

impl Scope {
    pub fn contains(self, addr: u16) -> bool {
        match self {
            Scope::Address(a) => a == addr,
            Scope::Range(lo, hi) => (lo..=hi).contains(&addr),
            Scope::Any => true,
        }
    }

    fn bounds(self) -> (u16, u16) {
        match self {
            Scope::Address(a) => (a, a),
            Scope::Range(lo, hi) => (lo, hi),
            Scope::Any => (0x0000, 0xFFFF),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFilter {
    Any,
    Equals(u8),
    NotEquals(u8),
    /// Inclusive.
    Range(u8, u8),
    /// Writes that change the stored byte.
    Change,
}

impl ValueFilter {
    pub fn matches(self, event: &MemoryEvent) -> bool {
        let v = event.value();
        match self {
            ValueFilter::Any => true,
            ValueFilter::Equals(x) => v == x,
            ValueFilter::NotEquals(x) => v != x,
            ValueFilter::Range(lo, hi) => (lo..=hi).contains(&v),
            ValueFilter::Change => event.is_write() && v != event.old_value(),
        }
    }
}

/// Who registered a listener.  Device detach removes by tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerTag {
    System,
    Slot(u8),
    Device(u32),
}

// ── Handlers ───────────────────────────────────────────────────

/// Built-in soft switch behaviour behind the I/O hole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchHook {
    /// Force `switch` to `on`.
    Latch { switch: Switch, on: bool },
    /// Bit 7 reports the switch (inverted if `invert`).
    Status { switch: Switch, invert: bool },
    /// $C080–$C08F.
    LanguageCard,
    /// $C300–$C3FF while SLOTC3ROM is off.
    SlotC3Access,
    /// $CFFF.
    ReleaseExpansion,
}

/// Which of a card's three windows was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardHook {
    Io,
    Firmware,
    Expansion,
}

pub type Callback = Box<dyn FnMut(&mut MemoryEvent) + Send>;

pub enum Handler {
    Callback(Callback),
    Switch(SwitchHook),
    Card { slot: u8, hook: CardHook },
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Callback(_) => f.write_str("Callback"),
            Handler::Switch(h) => write!(f, "Switch({h:?})"),
            Handler::Card { slot, hook } => write!(f, "Card({slot}, {hook:?})"),
        }
    }
}

/// What `Memory` should do for a matched listener, detached from the
/// registry borrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    Callback(usize),
    Switch(SwitchHook),
    Card { slot: u8, hook: CardHook },
}

#[derive(Debug)]
pub struct Listener {
    pub scope: Scope,
    pub filter: TypeFilter,
    pub value: ValueFilter,
    pub tag: ListenerTag,
    pub handler: Handler,
}

impl Listener {
    pub fn new(scope: Scope, filter: TypeFilter, tag: ListenerTag, handler: Handler) -> Self {
        Self {
            scope,
            filter,
            value: ValueFilter::Any,
            tag,
            handler,
        }
    }

    /// Plain closure observer.
    pub fn callback<F>(scope: Scope, filter: TypeFilter, tag: ListenerTag, f: F) -> Self
    where
        F: FnMut(&mut MemoryEvent) + Send + 'static,
    {
        Self::new(scope, filter, tag, Handler::Callback(Box::new(f)))
    }

    pub fn with_value(mut self, value: ValueFilter) -> Self {
        self.value = value;
        self
    }

    pub fn matches(&self, event: &MemoryEvent) -> bool {
        self.scope.contains(event.address())
            && self.filter.matches(event.kind())
            && self.value.matches(event)
    }

    fn same_registration(&self, other: &Listener) -> bool {
        self.tag == other.tag
            && self.scope == other.scope
            && self.filter == other.filter
            && self.value == other.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

// ── Listener table ─────────────────────────────────────────────

const IO_PAGE: u16 = 0xC0;

/// Registered listeners in insertion order plus the per-page / per-register
/// index into them.
pub struct ListenerTable {
    entries: Vec<(ListenerId, Listener)>,
    next_id: u64,
    pages: Vec<Vec<usize>>,
    io: Vec<Vec<usize>>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
            pages: vec![Vec::new(); 0x100],
            io: vec![Vec::new(); 0x100],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register `listener`.  An equal registration (same tag, scope and
    /// filters) already present is kept and its id returned instead; the
    /// new handler is dropped.  Devices that need two handlers on the same
    /// window register them under different tags.
    pub fn add(&mut self, listener: Listener) -> ListenerId {
        if let Some((id, _)) = self
            .entries
            .iter()
            .find(|(_, l)| l.same_registration(&listener))
        {
            log::debug!(
                "{:?} listener on {:?} already registered as {id:?}; new handler dropped",
                listener.tag,
                listener.scope
            );
            return *id;
        }
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        self.rebuild();
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> Option<Listener> {
        let pos = self.entries.iter().position(|(i, _)| *i == id)?;
        let (_, listener) = self.entries.remove(pos);
        self.rebuild();
        Some(listener)
    }

    /// Drop every listener carrying `tag`; returns how many were removed.
    pub fn remove_tagged(&mut self, tag: ListenerTag) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(_, l)| l.tag != tag);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.rebuild();
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (ListenerId, &Listener)> {
        self.entries.iter().map(|(id, l)| (*id, l))
    }

    /// Any listener filed under the (non I/O) page?
    #[inline]
    pub fn page_has_listeners(&self, page: usize) -> bool {
        !self.pages[page].is_empty()
    }

    #[inline]
    fn bucket(&self, addr: u16) -> &[usize] {
        if addr >> 8 == IO_PAGE {
            &self.io[(addr & 0xFF) as usize]
        } else {
            &self.pages[(addr >> 8) as usize]
        }
    }

    /// The `n`th listener filed for `addr` that matches `event`, resolved to
    /// the action to perform.  Positions are re-read on every call, so a
    /// handler that changes the table cannot invalidate the walk.
    pub(crate) fn action_at(&self, n: usize, event: &MemoryEvent) -> Option<Option<Action>> {
        let pos = *self.bucket(event.address()).get(n)?;
        let listener = &self.entries.get(pos)?.1;
        if !listener.matches(event) {
            return Some(None);
        }
        Some(Some(match listener.handler {
            Handler::Callback(_) => Action::Callback(pos),
            Handler::Switch(h) => Action::Switch(h),
            Handler::Card { slot, hook } => Action::Card { slot, hook },
        }))
    }

    pub(crate) fn run_callback(&mut self, pos: usize, event: &mut MemoryEvent) {
        if let Some((_, Listener { handler: Handler::Callback(f), .. })) = self.entries.get_mut(pos) {
            f(event);
        }
    }

    fn rebuild(&mut self) {
        for b in self.pages.iter_mut().chain(self.io.iter_mut()) {
            b.clear();
        }
        for (pos, (_, listener)) in self.entries.iter().enumerate() {
            let (lo, hi) = listener.scope.bounds();
            for page in (lo >> 8)..=(hi >> 8) {
                if page == IO_PAGE {
                    let first = if page == lo >> 8 { lo & 0xFF } else { 0 };
                    let last = if page == hi >> 8 { hi & 0xFF } else { 0xFF };
                    for reg in first..=last {
                        self.io[reg as usize].push(pos);
                    }
                } else {
                    self.pages[page as usize].push(pos);
                }
            }
        }
    }
}

impl Default for ListenerTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn noop(scope: Scope, tag: ListenerTag) -> Listener {
        Listener::callback(scope, TypeFilter::Any, tag, |_| {})
    }

    fn matching(table: &ListenerTable, event: &MemoryEvent) -> Vec<Action> {
        let mut out = Vec::new();
        let mut n = 0;
        while let Some(a) = table.action_at(n, event) {
            out.extend(a);
            n += 1;
        }
        out
    }

    #[test]
    fn single_address_is_filed_only_under_its_page() {
        let mut t = ListenerTable::new();
        t.add(noop(Scope::Address(0x0400), ListenerTag::Device(1)));
        assert!(t.page_has_listeners(0x04));
        assert!(!t.page_has_listeners(0x05));
        // same page, different address: bucket hit but scope rejects it
        assert!(matching(&t, &MemoryEvent::read(0x0401, 0)).is_empty());
        assert_eq!(matching(&t, &MemoryEvent::read(0x0400, 0)).len(), 1);
    }

    #[test]
    fn io_hole_is_indexed_per_register() {
        let mut t = ListenerTable::new();
        t.add(noop(Scope::Range(0xC0B0, 0xC0BF), ListenerTag::Slot(3)));
        assert_eq!(matching(&t, &MemoryEvent::read(0xC0B4, 0)).len(), 1);
        assert!(t.bucket(0xC0AF).is_empty());
        assert!(t.bucket(0xC0C0).is_empty());
        assert!(!t.page_has_listeners(0xC0));
    }

    #[test]
    fn whole_space_scope_covers_every_bucket() {
        let mut t = ListenerTable::new();
        t.add(noop(Scope::Any, ListenerTag::Device(9)));
        assert!((0..0x100).filter(|&p| p != 0xC0).all(|p| t.page_has_listeners(p)));
        assert_eq!(matching(&t, &MemoryEvent::read(0xC0FF, 0)).len(), 1);
    }

    #[test]
    fn equal_registration_is_not_duplicated() {
        let mut t = ListenerTable::new();
        let a = t.add(noop(Scope::Address(0x300), ListenerTag::Device(1)));
        let b = t.add(noop(Scope::Address(0x300), ListenerTag::Device(1)));
        let c = t.add(noop(Scope::Address(0x300), ListenerTag::Device(2)));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn duplicate_keeps_the_first_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut t = ListenerTable::new();
        let mut ids = Vec::new();
        for n in 1..=2u8 {
            let seen = seen.clone();
            ids.push(t.add(Listener::callback(
                Scope::Address(0x0800),
                TypeFilter::Write,
                ListenerTag::Device(4),
                move |_| seen.lock().unwrap().push(n),
            )));
        }
        assert_eq!(ids[0], ids[1]);

        let mut event = MemoryEvent::write(0x0800, 1, 0);
        for action in matching(&t, &event) {
            if let Action::Callback(pos) = action {
                t.run_callback(pos, &mut event);
            }
        }
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn removal_rebuilds_index() {
        let mut t = ListenerTable::new();
        let a = t.add(noop(Scope::Address(0x300), ListenerTag::Device(1)));
        t.add(noop(Scope::Range(0x2000, 0x3FFF), ListenerTag::Slot(2)));
        t.add(noop(Scope::Address(0xC0A0), ListenerTag::Slot(2)));
        assert!(t.remove(a).is_some());
        assert!(t.remove(a).is_none());
        assert!(!t.page_has_listeners(0x03));
        assert_eq!(t.remove_tagged(ListenerTag::Slot(2)), 2);
        assert!(!t.page_has_listeners(0x20));
        assert!(t.bucket(0xC0A0).is_empty());
        assert!(t.is_empty());
    }

    #[test]
    fn callbacks_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut t = ListenerTable::new();
        for id in 1..=2u32 {
            let seen = seen.clone();
            t.add(Listener::callback(
                Scope::Address(0x1234),
                TypeFilter::Write,
                ListenerTag::Device(id),
                move |e| {
                    seen.lock().unwrap().push((id, e.value()));
                    e.set_value(e.value() + 1);
                },
            ));
        }
        let mut event = MemoryEvent::write(0x1234, 10, 0);
        for action in matching(&t, &event) {
            if let Action::Callback(pos) = action {
                t.run_callback(pos, &mut event);
            }
        }
        assert_eq!(*seen.lock().unwrap(), vec![(1, 10), (2, 11)]);
        assert_eq!(event.value(), 12);
    }

    #[test]
    fn type_and_value_filters() {
        assert!(TypeFilter::Read.matches(EventType::Execute));
        assert!(!TypeFilter::Execute.matches(EventType::Read));
        assert!(!TypeFilter::Write.matches(EventType::Read));

        let w = MemoryEvent::write(0, 5, 5);
        assert!(!ValueFilter::Change.matches(&w));
        assert!(ValueFilter::Change.matches(&MemoryEvent::write(0, 6, 5)));
        assert!(ValueFilter::Range(4, 6).matches(&w));
        assert!(!ValueFilter::NotEquals(5).matches(&w));
        assert!(ValueFilter::Equals(5).matches(&w));
    }
}
