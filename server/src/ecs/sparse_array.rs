/// Per-component storage indexed directly by entity index
///
/// Each slot either holds a component or is empty. The backing vector only
/// grows: [`SparseArray::len`] is a high-water mark of the largest index ever
/// touched, not the number of live components.
#[derive(Debug, Clone)]
pub struct SparseArray<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for SparseArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SparseArray<T> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Places `value` at `index`, overwriting any previous component and
    /// growing the storage with empty slots when needed.
    pub fn insert(&mut self, index: usize, value: T) {
        *self.slot_mut(index) = Some(value);
    }

    /// Clears the slot at `index`. Out-of-range indices are ignored.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    /// Component at `index`, `None` when absent or past the end.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Mutable access to the slot itself, growing the storage on demand so
    /// callers can fill or clear it in place.
    pub fn slot_mut(&mut self, index: usize) -> &mut Option<T> {
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        &mut self.slots[index]
    }

    pub fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Number of slots, occupied or not
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Occupied slots in ascending index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|value| (index, value)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_mut().map(|value| (index, value)))
    }
}
