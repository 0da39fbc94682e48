//! Fixed-capacity connection slots.
//!
//! Insertion takes the first free slot in order; a full table rejects the
//! newcomer instead of evicting anyone. All access goes through one mutex.

use crate::error::{ProtocolError, Result};
use crate::transport::connection::{Connection, ConnectionId};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct SlotRegistry {
    slots: Mutex<Slots>,
    capacity: usize,
}

struct Slots {
    entries: Vec<Option<Arc<Connection>>>,
    occupied: usize,
}

impl SlotRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(Slots {
                entries: vec![None; capacity],
                occupied: 0,
            }),
            capacity,
        }
    }

    /// Place `connection` in the first free slot and return its index.
    pub fn insert(&self, connection: Arc<Connection>) -> Result<usize> {
        let mut slots = self.slots.lock();
        let index = slots
            .entries
            .iter()
            .position(Option::is_none)
            .ok_or(ProtocolError::CapacityExceeded(self.capacity))?;
        slots.entries[index] = Some(connection);
        slots.occupied += 1;
        Ok(index)
    }

    /// Clear the slot holding `id`. Returns whether one was found.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let mut slots = self.slots.lock();
        let found = slots
            .entries
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|c| c.id() == id));
        match found {
            Some(index) => {
                slots.entries[index] = None;
                slots.occupied -= 1;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.slots
            .lock()
            .entries
            .iter()
            .flatten()
            .find(|c| c.id() == id)
            .cloned()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.get(id).is_some()
    }

    /// Occupied slots in slot order.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        let slots = self.slots.lock();
        let mut out = Vec::with_capacity(slots.occupied);
        out.extend(slots.entries.iter().flatten().cloned());
        out
    }

    pub fn len(&self) -> usize {
        self.slots.lock().occupied
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Arc<Connection> {
        Connection::loopback("127.0.0.1:1".parse().unwrap()).0
    }

    #[test]
    fn fills_first_free_slot() {
        let reg = SlotRegistry::new(3);
        let a = conn();
        let b = conn();
        assert_eq!(reg.insert(a.clone()).unwrap(), 0);
        assert_eq!(reg.insert(b.clone()).unwrap(), 1);
        assert!(reg.remove(a.id()));
        assert_eq!(reg.insert(conn()).unwrap(), 0);
        assert_eq!(reg.snapshot()[1].id(), b.id());
    }

    #[test]
    fn rejects_when_full() {
        let reg = SlotRegistry::new(1);
        let first = conn();
        reg.insert(first.clone()).unwrap();
        assert!(matches!(
            reg.insert(conn()),
            Err(ProtocolError::CapacityExceeded(1))
        ));
        assert!(reg.contains(first.id()));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remove_absent_is_noop() {
        let reg = SlotRegistry::new(2);
        assert!(!reg.remove(conn().id()));
        assert!(reg.is_empty());
    }
}
