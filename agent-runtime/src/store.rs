//! In-memory reference implementation of memory persistence (§3 invariant 7: append-only;
//! §6 `create_memory`). Concrete storage backends are out of scope (§1 Non-goals); this
//! store exists so the message pipeline and tests have something to write through.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::memory::Memory;
use crate::primitives::Uuid;

/// Append-only per-table memory log, keyed by `room_id` for ordered retrieval.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Memory>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `memory` to `table`, assigning an id if it doesn't already have one.
    /// Returns the id assigned.
    pub fn create(&self, mut memory: Memory, table: &str) -> Uuid {
        let id = memory.id.unwrap_or_else(Uuid::new_v4);
        memory.id = Some(id);
        self.tables
            .write()
            .expect("memory store lock poisoned")
            .entry(table.to_string())
            .or_default()
            .push(memory);
        id
    }

    /// Returns every memory in `table` for `room_id`, in append (chronological) order.
    pub fn by_room(&self, table: &str, room_id: Uuid) -> Vec<Memory> {
        self.tables
            .read()
            .expect("memory store lock poisoned")
            .get(table)
            .map(|rows| rows.iter().filter(|m| m.room_id == room_id).cloned().collect())
            .unwrap_or_default()
    }

    pub fn all(&self, table: &str) -> Vec<Memory> {
        self.tables
            .read()
            .expect("memory store lock poisoned")
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}
