//! Deterministic event scheduler.
//!
//! Pending events live in a `BTreeMap` keyed by `(scheduled_at, event_id)`,
//! so iteration order is the dispatch order. A side index from `EventId`
//! to its time makes cancellation a pair of map removals. Because event
//! IDs are strictly increasing, two runs with the same inputs always
//! produce the same dispatch order.

use std::collections::{BTreeMap, HashMap};

use crate::event::{Event, EventId, EventIdGen, EventKey, EventType};
use crate::time::SimTime;

/// The core deterministic scheduler.
///
/// Owns the event queue and the ID generator. All scheduling goes through
/// this struct to ensure monotonic IDs and deterministic ordering.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    /// Pending events in dispatch order.
    queue: BTreeMap<EventKey, EventType>,

    /// Scheduled time of every pending event, for cancellation.
    index: HashMap<EventId, SimTime>,

    /// Monotonic event-ID generator.
    id_gen: EventIdGen,
}

impl Scheduler {
    /// Create a new, empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a new event at the given simulated time.
    ///
    /// Causality is checked by the caller ([`Simulation`] and
    /// [`SimulationContext`]), which knows the current time.
    ///
    /// [`Simulation`]: crate::simulation::Simulation
    /// [`SimulationContext`]: crate::simulation::SimulationContext
    pub fn schedule(&mut self, at: SimTime, payload: EventType) -> EventId {
        let id = self.id_gen.next_id();
        self.queue.insert(EventKey { time: at, id }, payload);
        self.index.insert(id, at);
        id
    }

    /// Remove a pending event.
    ///
    /// Returns `false` if the event was already dispatched, already
    /// cancelled, or never existed.
    pub fn cancel(&mut self, id: EventId) -> bool {
        match self.index.remove(&id) {
            Some(time) => self.queue.remove(&EventKey { time, id }).is_some(),
            None => false,
        }
    }

    /// Whether `id` is still waiting to be dispatched.
    pub fn is_pending(&self, id: EventId) -> bool {
        self.index.contains_key(&id)
    }

    /// Pop the next event (earliest time, lowest ID).
    ///
    /// Returns `None` when the queue is empty.
    pub fn pop_next(&mut self) -> Option<Event> {
        let (key, payload) = self.queue.pop_first()?;
        self.index.remove(&key.id);
        Some(Event::new(key.id, key.time, payload))
    }

    /// Time of the next event without removing it.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.queue.keys().next().map(|k| k.time)
    }

    /// Returns `true` if the event queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the number of pending events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Drain all events in deterministic order into a `Vec`.
    pub fn drain_ordered(&mut self) -> Vec<Event> {
        let mut events = Vec::with_capacity(self.queue.len());
        while let Some(e) = self.pop_next() {
            events.push(e);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_at_same_time() {
        let mut sched = Scheduler::new();

        sched.schedule(SimTime::from_nanos(5), EventType::Log("A".into()));
        sched.schedule(SimTime::from_nanos(5), EventType::Log("B".into()));
        sched.schedule(SimTime::from_nanos(5), EventType::Log("C".into()));

        let order: Vec<EventType> = sched.drain_ordered().into_iter().map(|e| e.payload).collect();
        assert_eq!(
            order,
            vec![
                EventType::Log("A".into()),
                EventType::Log("B".into()),
                EventType::Log("C".into()),
            ]
        );
    }

    #[test]
    fn test_time_ordering() {
        let mut sched = Scheduler::new();

        sched.schedule(SimTime::from_nanos(30), EventType::Log("late".into()));
        sched.schedule(SimTime::from_nanos(10), EventType::Log("early".into()));
        sched.schedule(SimTime::from_nanos(20), EventType::Log("mid".into()));

        assert_eq!(sched.peek_time(), Some(SimTime::from_nanos(10)));
        let times: Vec<u64> = sched
            .drain_ordered()
            .iter()
            .map(|e| e.scheduled_at.as_nanos())
            .collect();
        assert_eq!(times, vec![10, 20, 30]);
    }

    #[test]
    fn test_cancel_pending_event() {
        let mut sched = Scheduler::new();
        let keep = sched.schedule(SimTime::from_nanos(1), EventType::Noop);
        let drop = sched.schedule(SimTime::from_nanos(2), EventType::Log("x".into()));

        assert!(sched.is_pending(drop));
        assert!(sched.cancel(drop));
        assert!(!sched.is_pending(drop));
        assert_eq!(sched.len(), 1);

        let events = sched.drain_ordered();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, keep);
    }

    #[test]
    fn test_cancel_after_dispatch_is_noop() {
        let mut sched = Scheduler::new();
        let id = sched.schedule(SimTime::from_nanos(1), EventType::Noop);
        let fired = sched.pop_next().unwrap();
        assert_eq!(fired.id, id);

        assert!(!sched.cancel(id));
        assert!(!sched.cancel(EventId::new(999)));
        assert!(sched.is_empty());
    }

    #[test]
    fn test_empty_scheduler() {
        let mut sched = Scheduler::new();
        assert!(sched.is_empty());
        assert_eq!(sched.len(), 0);
        assert!(sched.pop_next().is_none());
        assert!(sched.peek_time().is_none());
    }

    #[test]
    fn test_determinism_across_runs() {
        fn build_schedule() -> Vec<Event> {
            let mut sched = Scheduler::new();
            sched.schedule(SimTime::from_nanos(5), EventType::Log("a".into()));
            sched.schedule(SimTime::from_nanos(3), EventType::Log("b".into()));
            let c = sched.schedule(SimTime::from_nanos(5), EventType::Log("c".into()));
            sched.schedule(SimTime::from_nanos(1), EventType::Log("d".into()));
            sched.schedule(SimTime::from_nanos(3), EventType::Log("e".into()));
            sched.cancel(c);
            sched.drain_ordered()
        }

        let run1 = build_schedule();
        let run2 = build_schedule();
        assert_eq!(run1, run2);
        assert_eq!(run1.len(), 4);
    }
}
