use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

pub trait ArenaId: Copy + Eq {
    fn from_index(index: usize) -> Self;

    fn index(self) -> usize;
}

/// Slot storage with stable ids and a separate, editable order.
///
/// Removed entities leave an empty slot behind; ids are never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize, I: Serialize",
    deserialize = "T: Deserialize<'de>, I: Deserialize<'de>"
))]
pub struct Arena<I, T> {
    slots: Vec<Option<T>>,
    order: Vec<I>,
    #[serde(skip)]
    _id: PhantomData<I>,
}

impl<I, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            order: Vec::new(),
            _id: PhantomData,
        }
    }
}

impl<I: ArenaId, T> Arena<I, T> {
    pub fn push(&mut self, value: T) -> I {
        let id = self.alloc(value);
        self.order.push(id);
        id
    }

    /// Adds the value right before `anchor` in the order; appends it if
    /// `anchor` is not in the arena.
    pub fn insert_before(&mut self, anchor: I, value: T) -> I {
        let id = self.alloc(value);
        match self.order.iter().position(|i| *i == anchor) {
            Some(pos) => self.order.insert(pos, id),
            None => self.order.push(id),
        }
        id
    }

    fn alloc(&mut self, value: T) -> I {
        self.slots.push(Some(value));
        I::from_index(self.slots.len() - 1)
    }

    pub fn remove(&mut self, id: I) -> Option<T> {
        let value = self.slots.get_mut(id.index())?.take();
        if value.is_some() {
            self.order.retain(|i| *i != id);
        }
        value
    }

    pub fn get(&self, id: I) -> Option<&T> {
        self.slots.get(id.index())?.as_ref()
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.slots.get_mut(id.index())?.as_mut()
    }

    pub fn contains(&self, id: I) -> bool {
        self.get(id).is_some()
    }

    /// A snapshot of the ids in order, safe to hold while mutating the arena.
    pub fn ids(&self) -> Vec<I> {
        self.order.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.get(*id).map(|value| (*id, value)))
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
