//! Time-ordered event queue with deterministic tie-breaking.
//!
//! Events are keyed by `(time, nice, sequence)`. The sequence number is a
//! monotonically increasing insertion counter, so two events with equal time
//! and niceness always leave the queue in the order they entered it.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{KernelError, KernelResult};
use crate::event::Event;
use crate::types::SimTime;

/// Key for ordering events in the queue.
///
/// Events are ordered by:
/// 1. Time (earlier first)
/// 2. Niceness (lower first)
/// 3. Sequence number (FIFO for same time and niceness)
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EventKey {
    pub time: SimTime,
    pub nice: i64,
    pub sequence: u64,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.cmp(&other.time) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match self.nice.cmp(&other.nice) {
            Ordering::Equal => {}
            ord => return ord,
        }

        self.sequence.cmp(&other.sequence)
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Single-threaded priority queue of pending events.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: BTreeMap<EventKey, Event>,
    next_sequence: u64,
    /// Lower bound for inserted event times.
    current_time: SimTime,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an event and returns its sequence number.
    ///
    /// Events before the current time are rejected and the queue is left
    /// untouched.
    pub fn insert(&mut self, event: Event) -> KernelResult<u64> {
        if event.time < self.current_time {
            return Err(KernelError::EventInPast {
                event_time: event.time,
                current_time: self.current_time,
            });
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let key = EventKey {
            time: event.time,
            nice: event.nice,
            sequence,
        };
        self.events.insert(key, event);
        Ok(sequence)
    }

    /// Moves the insertion lower bound forward. Never moves it backwards.
    pub fn advance_to(&mut self, time: SimTime) {
        self.current_time = self.current_time.max(time);
    }

    pub fn current_time(&self) -> SimTime {
        self.current_time
    }

    /// Removes and returns the first event if it is due at `time`.
    pub fn pop_next_due(&mut self, time: SimTime) -> Option<Event> {
        let (key, _) = self.events.first_key_value()?;
        if key.time > time {
            return None;
        }
        self.events.pop_first().map(|(_, event)| event)
    }

    /// Removes and returns every event due at `time`, in queue order.
    pub fn pop_due_events(&mut self, time: SimTime) -> Vec<Event> {
        let mut due = Vec::new();
        while let Some(event) = self.pop_next_due(time) {
            due.push(event);
        }
        due
    }

    /// Removes and returns the next group of due events that share both time
    /// and niceness, in sequence order.
    pub fn pop_due_batch(&mut self, time: SimTime) -> Vec<Event> {
        let head = match self.events.first_key_value() {
            Some((key, _)) if key.time <= time => *key,
            _ => return Vec::new(),
        };

        let mut batch = Vec::new();
        while let Some((key, _)) = self.events.first_key_value() {
            if key.time != head.time || key.nice != head.nice {
                break;
            }
            if let Some((_, event)) = self.events.pop_first() {
                batch.push(event);
            }
        }
        batch
    }

    /// Time of the earliest pending event.
    pub fn peek_next_time(&self) -> Option<SimTime> {
        self.events.first_key_value().map(|(key, _)| key.time)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
