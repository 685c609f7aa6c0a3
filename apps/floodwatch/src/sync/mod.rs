//! Snapshot/delta reconciliation for view-owned collections.
//!
//! Every surface (sensor map, alerts panel, chat, risk view) follows the
//! same shape: fetch one REST snapshot, then fold realtime deltas into it.
//! The fold itself is a pair of pure functions; [`SyncedList`] wraps them
//! together with load state and an out-of-order guard so each view does not
//! re-implement the plumbing.

use tracing::debug;

/// Merge `incoming` into `items`, keyed by `key_fn`.
///
/// A key match replaces the entity in place, preserving its position.
/// Otherwise the entity is prepended (most-recent-first) and the collection
/// is truncated from the tail to `max_size`. Key uniqueness holds after
/// every call provided it held before.
pub fn reconcile_upsert<T, K: PartialEq>(
    items: &mut Vec<T>,
    incoming: T,
    key_fn: impl Fn(&T) -> K,
    max_size: Option<usize>,
) {
    let key = key_fn(&incoming);
    match items.iter().position(|item| key_fn(item) == key) {
        Some(index) => items[index] = incoming,
        None => {
            items.insert(0, incoming);
            if let Some(max) = max_size {
                items.truncate(max);
            }
        }
    }
}

/// Drop the entity whose key matches, if present. Returns whether anything
/// was removed; the collection is untouched otherwise.
pub fn reconcile_remove<T, K: PartialEq>(
    items: &mut Vec<T>,
    key: &K,
    key_fn: impl Fn(&T) -> K,
) -> bool {
    match items.iter().position(|item| &key_fn(item) == key) {
        Some(index) => {
            items.remove(index);
            true
        }
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// No fetch issued yet.
    Idle,
    /// Initial snapshot outstanding.
    Loading,
    /// Snapshot fetch failed; the message is surfaced as a view banner.
    Failed(String),
    Ready,
}

/// Token tying a snapshot response back to the fetch that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

/// A view-owned collection kept in sync from one REST snapshot plus
/// realtime deltas.
///
/// Deltas bump an internal generation counter. A snapshot is only applied
/// when no delta arrived after its fetch was issued; a stale snapshot would
/// otherwise overwrite newer pushed state. Tickets also make responses that
/// arrive after the owning view was torn down and remounted harmless.
#[derive(Debug)]
pub struct SyncedList<T> {
    items: Vec<T>,
    state: LoadState,
    cap: Option<usize>,
    delta_gen: u64,
}

impl<T> SyncedList<T> {
    pub fn new(cap: Option<usize>) -> Self {
        Self {
            items: Vec::new(),
            state: LoadState::Idle,
            cap,
            delta_gen: 0,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Mark a snapshot fetch as outstanding and hand back the ticket the
    /// response must present.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.state = LoadState::Loading;
        FetchTicket(self.delta_gen)
    }

    /// Install a snapshot, unless deltas arrived after the fetch was issued;
    /// a stale snapshot is discarded and the delta-built contents kept.
    pub fn apply_snapshot(&mut self, ticket: FetchTicket, mut snapshot: Vec<T>) -> bool {
        if ticket.0 != self.delta_gen {
            debug!(
                issued_gen = ticket.0,
                current_gen = self.delta_gen,
                "discarding stale snapshot"
            );
            self.state = LoadState::Ready;
            return false;
        }
        if let Some(cap) = self.cap {
            snapshot.truncate(cap);
        }
        self.items = snapshot;
        self.state = LoadState::Ready;
        true
    }

    /// Record a failed snapshot fetch. If deltas already populated the list
    /// the view stays usable instead of flipping to the error state.
    pub fn fail(&mut self, ticket: FetchTicket, message: String) {
        if ticket.0 == self.delta_gen && self.items.is_empty() {
            self.state = LoadState::Failed(message);
        } else {
            debug!(error = %message, "snapshot fetch failed after deltas; keeping list");
            self.state = LoadState::Ready;
        }
    }

    pub fn upsert<K: PartialEq>(&mut self, incoming: T, key_fn: impl Fn(&T) -> K) {
        self.delta_gen += 1;
        reconcile_upsert(&mut self.items, incoming, key_fn, self.cap);
    }

    pub fn remove<K: PartialEq>(&mut self, key: &K, key_fn: impl Fn(&T) -> K) -> bool {
        self.delta_gen += 1;
        reconcile_remove(&mut self.items, key, key_fn)
    }

    /// Unconditional append, used by chat where messages are never revised.
    pub fn append(&mut self, item: T) {
        self.delta_gen += 1;
        self.items.push(item);
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.state = LoadState::Idle;
        self.delta_gen += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        id: i64,
        payload: &'static str,
    }

    fn entry(id: i64, payload: &'static str) -> Entry {
        Entry { id, payload }
    }

    #[test]
    fn upsert_replaces_in_place_preserving_position() {
        let mut items = vec![entry(3, "c"), entry(2, "b"), entry(1, "a")];
        reconcile_upsert(&mut items, entry(2, "b2"), |e| e.id, Some(10));
        assert_eq!(
            items,
            vec![entry(3, "c"), entry(2, "b2"), entry(1, "a")]
        );
    }

    #[test]
    fn upsert_prepends_new_keys_and_truncates_tail() {
        let mut items = vec![entry(2, "b"), entry(1, "a")];
        reconcile_upsert(&mut items, entry(3, "c"), |e| e.id, Some(2));
        assert_eq!(items, vec![entry(3, "c"), entry(2, "b")]);
    }

    #[test]
    fn upsert_never_introduces_duplicate_keys() {
        let mut items: Vec<Entry> = Vec::new();
        for id in [1, 2, 1, 3, 2, 1, 4, 4] {
            reconcile_upsert(&mut items, entry(id, "x"), |e| e.id, Some(100));
            let mut keys: Vec<i64> = items.iter().map(|e| e.id).collect();
            keys.sort_unstable();
            keys.dedup();
            assert_eq!(keys.len(), items.len());
        }
    }

    #[test]
    fn remove_missing_key_is_a_noop() {
        let mut items = vec![entry(2, "b"), entry(1, "a")];
        let before = items.clone();
        assert!(!reconcile_remove(&mut items, &99, |e| e.id));
        assert_eq!(items, before);
        assert!(reconcile_remove(&mut items, &2, |e| e.id));
        assert_eq!(items, vec![entry(1, "a")]);
    }

    #[test]
    fn snapshot_applies_when_no_deltas_intervened() {
        let mut list: SyncedList<Entry> = SyncedList::new(Some(100));
        let ticket = list.begin_fetch();
        assert_eq!(*list.state(), LoadState::Loading);
        assert!(list.apply_snapshot(ticket, vec![entry(1, "a")]));
        assert_eq!(*list.state(), LoadState::Ready);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn stale_snapshot_is_discarded_after_deltas() {
        let mut list: SyncedList<Entry> = SyncedList::new(Some(100));
        let ticket = list.begin_fetch();
        list.upsert(entry(5, "pushed"), |e| e.id);
        assert!(!list.apply_snapshot(ticket, vec![entry(1, "old")]));
        assert_eq!(list.items(), &[entry(5, "pushed")]);
        assert_eq!(*list.state(), LoadState::Ready);
    }

    #[test]
    fn failed_fetch_keeps_delta_built_contents() {
        let mut list: SyncedList<Entry> = SyncedList::new(None);
        let ticket = list.begin_fetch();
        list.upsert(entry(5, "pushed"), |e| e.id);
        list.fail(ticket, "boom".into());
        assert_eq!(*list.state(), LoadState::Ready);

        let mut empty: SyncedList<Entry> = SyncedList::new(None);
        let ticket = empty.begin_fetch();
        empty.fail(ticket, "boom".into());
        assert_eq!(*empty.state(), LoadState::Failed("boom".into()));
    }

    #[test]
    fn ticket_from_before_clear_cannot_resurrect_data() {
        let mut list: SyncedList<Entry> = SyncedList::new(None);
        let ticket = list.begin_fetch();
        list.clear();
        assert!(!list.apply_snapshot(ticket, vec![entry(1, "late")]));
        assert!(list.is_empty());
    }

    #[test]
    fn upsert_caps_at_max_size() {
        let mut list: SyncedList<Entry> = SyncedList::new(Some(2));
        for id in 1..=4 {
            list.upsert(entry(id, "x"), |e| e.id);
        }
        let ids: Vec<i64> = list.items().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![4, 3]);
    }
}
