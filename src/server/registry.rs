//! Dense registry of watched sockets
//!
//! Slot 0 always holds the listener. Connections occupy slots `1..len()`
//! with no holes: removing one moves the last live connection into its
//! slot. Callers scanning by index must re-inspect the slot they just
//! removed from, since it now holds a different connection.

use tracing::debug;

/// One registry slot.
#[derive(Debug)]
pub enum Slot<L, C> {
    Listener(L),
    Connection(C),
}

#[derive(Debug)]
pub struct Registry<L, C> {
    slots: Vec<Slot<L, C>>,
    capacity: usize,
}

impl<L, C> Registry<L, C> {
    /// Creates a registry holding only the listener.
    pub fn new(listener: L, initial_capacity: usize) -> Self {
        let capacity = initial_capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.push(Slot::Listener(listener));

        Self { slots, capacity }
    }

    /// Number of live slots, listener included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn connections(&self) -> usize {
        self.slots.len() - 1
    }

    /// Slots the registry can hold before it has to grow.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn listener(&self) -> &L {
        match &self.slots[0] {
            Slot::Listener(listener) => listener,
            Slot::Connection(_) => unreachable!("slot 0 always holds the listener"),
        }
    }

    pub fn get(&self, index: usize) -> Option<&Slot<L, C>> {
        self.slots.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Slot<L, C>> {
        self.slots.get_mut(index)
    }

    /// Appends a connection, doubling the capacity if the registry is full.
    pub fn push(&mut self, connection: C) -> usize {
        if self.slots.len() == self.capacity {
            self.capacity *= 2;
            self.slots.reserve_exact(self.capacity - self.slots.len());
            debug!(capacity = self.capacity, "Registry grown");
        }

        self.slots.push(Slot::Connection(connection));
        self.slots.len() - 1
    }

    /// Removes the connection at `index` by swapping in the last slot.
    ///
    /// Returns `None` for the listener slot or an index past the end.
    pub fn swap_remove(&mut self, index: usize) -> Option<C> {
        if index == 0 || index >= self.slots.len() {
            return None;
        }

        match self.slots.swap_remove(index) {
            Slot::Connection(connection) => Some(connection),
            Slot::Listener(_) => unreachable!("the listener never leaves slot 0"),
        }
    }

    pub fn iter_connections(&self) -> impl Iterator<Item = &C> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Connection(connection) => Some(connection),
            Slot::Listener(_) => None,
        })
    }
}
