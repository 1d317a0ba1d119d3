//! Translation between unit ids and the integer node ids of the network federate.

use std::collections::{HashMap, VecDeque};

use crate::types::UnitId;

/// Bidirectional map from unit ids to compact external ids.
///
/// External ids are assigned from a monotonically increasing counter on first
/// use and are never handed out again, not even after [`reset`](Self::reset).
/// The most recent removed mappings are remembered so late references can
/// still be named in logs; older ones are forgotten once more than
/// [`RETIRED_CAPACITY`] have accumulated.
#[derive(Debug)]
pub struct IdTransformer {
    to_external: HashMap<UnitId, u32>,
    from_external: HashMap<u32, UnitId>,
    retired: HashMap<u32, UnitId>,
    retired_order: VecDeque<u32>,
    retired_capacity: usize,
    next_id: u32,
}

/// Removed mappings kept for naming late references.
pub const RETIRED_CAPACITY: usize = 4096;

impl Default for IdTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl IdTransformer {
    pub fn new() -> Self {
        Self::with_retired_capacity(RETIRED_CAPACITY)
    }

    pub fn with_retired_capacity(retired_capacity: usize) -> Self {
        Self {
            to_external: HashMap::new(),
            from_external: HashMap::new(),
            retired: HashMap::new(),
            retired_order: VecDeque::new(),
            retired_capacity,
            next_id: 0,
        }
    }

    /// Returns the external id of `internal`, assigning a fresh one if needed.
    pub fn to_external_id(&mut self, internal: &str) -> u32 {
        if let Some(&id) = self.to_external.get(internal) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.to_external.insert(internal.to_string(), id);
        self.from_external.insert(id, internal.to_string());
        id
    }

    /// External id of `internal` without assigning one.
    pub fn external_id(&self, internal: &str) -> Option<u32> {
        self.to_external.get(internal).copied()
    }

    pub fn from_external_id(&self, external: u32) -> Option<&str> {
        self.from_external.get(&external).map(String::as_str)
    }

    /// Unit id a removed external id belonged to.
    pub fn retired_id(&self, external: u32) -> Option<&str> {
        self.retired.get(&external).map(String::as_str)
    }

    pub fn contains_internal_id(&self, internal: &str) -> bool {
        self.to_external.contains_key(internal)
    }

    /// Drops the mapping of `internal` and returns its external id.
    pub fn remove_using_internal_id(&mut self, internal: &str) -> Option<u32> {
        let id = self.to_external.remove(internal)?;
        if let Some(name) = self.from_external.remove(&id) {
            self.retire(id, name);
        }
        Some(id)
    }

    fn retire(&mut self, id: u32, name: UnitId) {
        if self.retired_capacity == 0 {
            return;
        }
        while self.retired_order.len() >= self.retired_capacity {
            if let Some(oldest) = self.retired_order.pop_front() {
                self.retired.remove(&oldest);
            }
        }
        self.retired.insert(id, name);
        self.retired_order.push_back(id);
    }

    /// Number of removed mappings currently remembered.
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    pub fn len(&self) -> usize {
        self.to_external.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_external.is_empty()
    }

    /// Forgets all mappings. The counter keeps counting.
    pub fn reset(&mut self) {
        self.to_external.clear();
        self.from_external.clear();
        self.retired.clear();
        self.retired_order.clear();
    }
}
