use std::{ cmp::Reverse, collections::{ BTreeSet, BinaryHeap, HashMap } };

use crate::{ ObjectId, QueuedEvent };

/// Handle to an event inside an [`EventQueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

/// Min-heap of events with an index from each object to the events depending
/// on it.
///
/// Invalidated events are dropped from the index and their heap entries are
/// skipped when they reach the top. Events with equal keys pop in insertion
/// order.
#[derive(Debug, Clone)]
pub struct EventQueue<E: QueuedEvent> {
    heap: BinaryHeap<Reverse<(E::Key, EventId)>>,
    live: HashMap<EventId, E>,
    by_subject: HashMap<ObjectId, BTreeSet<EventId>>,
    next_id: u64,
}

impl<E: QueuedEvent> Default for EventQueue<E> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
            by_subject: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<E: QueuedEvent> EventQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live events
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn insert(&mut self, event: E) -> EventId {
        let key = event.key();
        let id = EventId(self.next_id);
        self.next_id += 1;
        for subject in event.subjects() {
            self.by_subject.entry(subject).or_default().insert(id);
        }
        self.heap.push(Reverse((key, id)));
        self.live.insert(id, event);
        id
    }

    /// Drops heap entries of invalidated events sitting at the top
    fn skip_dead(&mut self) {
        while let Some(Reverse((_, id))) = self.heap.peek() {
            if self.live.contains_key(id) {
                break;
            }
            self.heap.pop();
        }
    }

    pub fn peek_key(&mut self) -> Option<E::Key> {
        self.skip_dead();
        self.heap.peek().map(|Reverse((key, _))| *key)
    }

    pub fn pop_earliest(&mut self) -> Option<E> {
        self.skip_dead();
        let Reverse((_, id)) = self.heap.pop()?;
        let event = self.live.remove(&id)?;
        self.unindex(id, &event);
        Some(event)
    }

    /// Removes every event depending on `object` and returns them in
    /// insertion order
    pub fn invalidate_all_for(&mut self, object: ObjectId) -> Vec<E> {
        let Some(ids) = self.by_subject.remove(&object) else { return Vec::new() };

        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(event) = self.live.remove(&id) else { continue };
            self.unindex(id, &event);
            removed.push(event);
        }
        self.compact();
        removed
    }

    /// Live events depending on `object`, in insertion order
    pub fn events_for(&self, object: ObjectId) -> impl Iterator<Item = &E> + '_ {
        self.by_subject.get(&object)
            .into_iter()
            .flatten()
            .filter_map(|id| self.live.get(id))
    }

    fn unindex(&mut self, id: EventId, event: &E) {
        for subject in event.subjects() {
            if let Some(ids) = self.by_subject.get_mut(&subject) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_subject.remove(&subject);
                }
            }
        }
    }

    /// Rebuilds the heap once dead entries outnumber live ones
    fn compact(&mut self) {
        if self.heap.len() <= 2 * self.live.len() + 32 {
            return;
        }
        let live = &self.live;
        self.heap.retain(|Reverse((_, id))| live.contains_key(id));
    }
}
