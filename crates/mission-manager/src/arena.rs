//! Generational slot arena used for records, missions and lists.
//!
//! Keys carry the slot generation, so a key held after its value was removed
//! resolves to `None` even when the slot has been reused.

use std::marker::PhantomData;

use mission_core::AbilityToken;

/// Key type addressable in an [`Arena`].
pub trait ArenaKey: Copy {
    fn from_parts(index: u32, generation: u32) -> Self;
    fn slot_index(self) -> u32;
    fn slot_generation(self) -> u32;
}

impl ArenaKey for AbilityToken {
    fn from_parts(index: u32, generation: u32) -> Self {
        AbilityToken::new(index, generation)
    }

    fn slot_index(self) -> u32 {
        self.index()
    }

    fn slot_generation(self) -> u32 {
        self.generation()
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug)]
pub struct Arena<K, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    _key: PhantomData<fn() -> K>,
}

impl<K: ArenaKey, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ArenaKey, T> Arena<K, T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            _key: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, value: T) -> K {
        self.insert_with(|_| value)
    }

    /// Insert a value that needs to know its own key.
    pub fn insert_with(&mut self, build: impl FnOnce(K) -> T) -> K {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            let key = K::from_parts(index, slot.generation);
            slot.value = Some(build(key));
            return key;
        }
        let index = self.slots.len() as u32;
        let key = K::from_parts(index, 0);
        self.slots.push(Slot {
            generation: 0,
            value: Some(build(key)),
        });
        key
    }

    pub fn get(&self, key: K) -> Option<&T> {
        self.slots
            .get(key.slot_index() as usize)
            .filter(|slot| slot.generation == key.slot_generation())
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.slots
            .get_mut(key.slot_index() as usize)
            .filter(|slot| slot.generation == key.slot_generation())
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: K) -> Option<T> {
        let slot = self.slots.get_mut(key.slot_index() as usize)?;
        if slot.generation != key.slot_generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.slot_index());
        self.len -= 1;
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (K::from_parts(index as u32, slot.generation), value))
        })
    }

    pub fn keys(&self) -> Vec<K> {
        self.iter().map(|(key, _)| key).collect()
    }
}
