//! Event dispatch for entity lifecycle changes — §6 "Subscription events".
//!
//! Delivery is best-effort at the end of a mutating operation: publishing
//! to a bus with no subscribers (or a lagging one) never blocks the
//! mutation and never panics. `New`/`Remove` go out immediately; `Change`
//! events are coalesced per entity until [`SubscriptionBus::flush`] runs,
//! so e.g. three volume changes applied to the same sink-input inside one
//! mix tick reach subscribers as a single `Change` — grounded in
//! `pulsecore/hook-list.h`'s hook-slot model (§3 SPEC_FULL).

use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashSet;
use tokio::sync::broadcast;

use crate::registry::EntityType;

/// Depth of the broadcast channel; a slow/absent subscriber can lag this
/// many events behind before it starts missing them (`RecvError::Lagged`),
/// which is an acceptable "best-effort" outcome per §6.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    New,
    Change,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionEvent {
    pub kind: EntityType,
    pub op: EventKind,
    pub index: u32,
}

/// Best-effort entity-lifecycle event bus, one per core instance.
pub struct SubscriptionBus {
    tx: broadcast::Sender<SubscriptionEvent>,
    pending_changes: DashSet<(EntityType, u32)>,
    next_index: AtomicU32,
}

impl SubscriptionBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx, pending_changes: DashSet::new(), next_index: AtomicU32::new(0) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SubscriptionEvent> {
        self.tx.subscribe()
    }

    /// Allocate the next entity index. A single counter shared across all
    /// entity kinds, the way PulseAudio's `pa_idxset` index space is one
    /// flat space rather than one counter per type.
    pub fn alloc_index(&self) -> u32 {
        self.next_index.fetch_add(1, Ordering::Relaxed)
    }

    fn emit(&self, kind: EntityType, op: EventKind, index: u32) {
        // `send` errors only when there are zero subscribers, which is the
        // normal state when no control-protocol client is attached.
        let _ = self.tx.send(SubscriptionEvent { kind, op, index });
    }

    pub fn publish_new(&self, kind: EntityType, index: u32) {
        self.emit(kind, EventKind::New, index);
    }

    pub fn publish_remove(&self, kind: EntityType, index: u32) {
        self.pending_changes.remove(&(kind, index));
        self.emit(kind, EventKind::Remove, index);
    }

    /// Mark `(kind, index)` changed without emitting yet. Call this from
    /// any setter (volume, mute, move...); call [`Self::flush`] once at
    /// the end of the mutating operation or mix tick.
    pub fn mark_changed(&self, kind: EntityType, index: u32) {
        self.pending_changes.insert((kind, index));
    }

    /// Emit one coalesced `Change` per entity touched since the last
    /// flush.
    pub fn flush(&self) {
        if self.pending_changes.is_empty() {
            return;
        }
        let touched: Vec<(EntityType, u32)> = self.pending_changes.iter().map(|e| *e).collect();
        self.pending_changes.clear();
        for (kind, index) in touched {
            self.emit(kind, EventKind::Change, index);
        }
    }
}

impl Default for SubscriptionBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_and_remove_emit_immediately() {
        let bus = SubscriptionBus::new();
        let mut rx = bus.subscribe();
        bus.publish_new(EntityType::Sink, 0);
        let evt = rx.recv().await.unwrap();
        assert_eq!(evt.op, EventKind::New);
        assert_eq!(evt.kind, EntityType::Sink);
    }

    #[tokio::test]
    async fn repeated_changes_coalesce_into_one_event() {
        let bus = SubscriptionBus::new();
        let mut rx = bus.subscribe();
        bus.mark_changed(EntityType::SinkInput, 3);
        bus.mark_changed(EntityType::SinkInput, 3);
        bus.mark_changed(EntityType::SinkInput, 3);
        bus.flush();
        let evt = rx.recv().await.unwrap();
        assert_eq!(evt.op, EventKind::Change);
        assert_eq!(evt.index, 3);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn remove_clears_any_pending_change_for_the_same_entity() {
        let bus = SubscriptionBus::new();
        let mut rx = bus.subscribe();
        bus.mark_changed(EntityType::Sink, 1);
        bus.publish_remove(EntityType::Sink, 1);
        bus.flush();
        let evt = rx.recv().await.unwrap();
        assert_eq!(evt.op, EventKind::Remove);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = SubscriptionBus::new();
        bus.publish_new(EntityType::Sink, 0);
        bus.publish_remove(EntityType::Sink, 0);
    }

    #[test]
    fn alloc_index_is_monotonic() {
        let bus = SubscriptionBus::new();
        let a = bus.alloc_index();
        let b = bus.alloc_index();
        assert_eq!(b, a + 1);
    }
}
