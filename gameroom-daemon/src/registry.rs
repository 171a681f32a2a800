//! In-memory map of active rooms.

use std::collections::HashMap;

use gameroom_core::{Room, RoomId};

/// Active rooms keyed by id. Listing follows insertion order.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
    order: Vec<RoomId>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced room keeps its original listing position.
    pub fn insert(&mut self, room: Room) -> Option<Room> {
        let id = room.id.clone();
        let previous = self.rooms.insert(id.clone(), room);
        if previous.is_none() {
            self.order.push(id);
        }
        previous
    }

    pub fn get(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.get(id)
    }

    /// Remove and hand back the entry so the caller can release its resources.
    pub fn remove(&mut self, id: &RoomId) -> Option<Room> {
        let removed = self.rooms.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(removed)
    }

    pub fn list_all(&self) -> Vec<Room> {
        self.order
            .iter()
            .filter_map(|id| self.rooms.get(id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Drop every entry, returning them in listing order.
    pub fn drain(&mut self) -> Vec<Room> {
        let order = std::mem::take(&mut self.order);
        order
            .into_iter()
            .filter_map(|id| self.rooms.remove(&id))
            .collect()
    }
}
