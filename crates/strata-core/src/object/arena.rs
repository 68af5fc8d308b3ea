use crate::{
    object::{ObjectData, ObjectHandle},
    value::PrimaryKey,
};
use strata_schema::types::ClassId;

///
/// Slot
///
/// `released` remembers the identity of the last object released from the
/// slot, for the generation that object held.
///

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    data: Option<ObjectData>,
    released: Option<Released>,
}

#[derive(Debug)]
struct Released {
    generation: u32,
    class: ClassId,
    key: PrimaryKey,
}

///
/// ObjectArena
///
/// Slot storage with generation counters. Removing an object bumps its
/// slot's generation, so every handle to it stops resolving.
///

#[derive(Debug, Default)]
pub(crate) struct ObjectArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl ObjectArena {
    pub fn insert(&mut self, data: ObjectData) -> ObjectHandle {
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.data = Some(data);
            return ObjectHandle::new(index, slot.generation);
        }

        let index = slot_index(self.slots.len());
        self.slots.push(Slot {
            generation: 0,
            data: Some(data),
            released: None,
        });

        ObjectHandle::new(index, 0)
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&ObjectData> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.data.as_ref())
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut ObjectData> {
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.data.as_mut())
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn remove(&mut self, handle: ObjectHandle) -> Option<ObjectData> {
        let slot = self
            .slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation())?;
        let data = slot.data.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.live -= 1;

        self.free.push(slot_index(handle.index()));

        Some(data)
    }

    /// Remove a clean object, remembering its identity so the stale handle
    /// can be rehydrated until the slot releases another object.
    pub fn release(&mut self, handle: ObjectHandle, class: ClassId, key: PrimaryKey) -> bool {
        if self.remove(handle).is_none() {
            return false;
        }
        self.slots[handle.index()].released = Some(Released {
            generation: handle.generation(),
            class,
            key,
        });

        true
    }

    /// Identity of the released object `handle` pointed at, if still known.
    pub fn released(&self, handle: ObjectHandle) -> Option<(ClassId, PrimaryKey)> {
        self.slots
            .get(handle.index())
            .and_then(|slot| slot.released.as_ref())
            .filter(|released| released.generation == handle.generation())
            .map(|released| (released.class, released.key.clone()))
    }

    #[cfg(test)]
    pub fn released_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.released.is_some()).count()
    }

    pub const fn len(&self) -> usize {
        self.live
    }

    /// Live handles in slot order.
    pub fn handles(&self) -> Vec<ObjectHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.data.is_some())
            .map(|(index, slot)| ObjectHandle::new(slot_index(index), slot.generation))
            .collect()
    }

    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            slot.released = None;
            if slot.data.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(slot_index(index));
            }
        }
        self.live = 0;
    }
}

// arena size is bounded by memory long before u32::MAX slots
#[allow(clippy::cast_possible_truncation)]
const fn slot_index(index: usize) -> u32 {
    index as u32
}
