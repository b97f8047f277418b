use std::fmt;

/// Opaque handle to an entity
///
/// A dense index handed out by [`Registry::create_entity`](super::Registry::create_entity).
/// Indices are never recycled, so a stale handle can never alias a newer
/// entity within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(usize);

impl Entity {
    pub(crate) fn new(index: usize) -> Self {
        Entity(index)
    }

    /// Slot index of this entity in every component store
    pub fn index(self) -> usize {
        self.0
    }

    /// Identifier used on the wire, `None` if the index no longer fits in 32 bits.
    pub fn wire_id(self) -> Option<u32> {
        u32::try_from(self.0).ok()
    }
}

impl From<Entity> for usize {
    fn from(entity: Entity) -> Self {
        entity.0
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
