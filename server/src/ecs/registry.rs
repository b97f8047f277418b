//! Entity allocation, type-erased component stores and multi-component views

use super::{Entity, SparseArray};
use log::debug;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EcsError {
    #[error("Component type {0} was never registered")]
    NotRegistered(&'static str),
}

/// Type-erased handle over one `SparseArray<T>`
///
/// Lets the registry clear an entity from every store on destruction without
/// knowing the concrete component types.
trait ComponentStore {
    fn remove_entity(&mut self, index: usize);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: 'static> ComponentStore for SparseArray<T> {
    fn remove_entity(&mut self, index: usize) {
        self.remove(index);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn downcast_store<T: 'static>(store: &dyn ComponentStore) -> &SparseArray<T> {
    match store.as_any().downcast_ref::<SparseArray<T>>() {
        Some(array) => array,
        None => unreachable!("store for {} keyed under a foreign TypeId", type_name::<T>()),
    }
}

fn downcast_store_mut<T: 'static>(store: &mut dyn ComponentStore) -> &mut SparseArray<T> {
    match store.as_any_mut().downcast_mut::<SparseArray<T>>() {
        Some(array) => array,
        None => unreachable!("store for {} keyed under a foreign TypeId", type_name::<T>()),
    }
}

type TakenStores = Vec<(TypeId, Box<dyn ComponentStore>)>;

/// Generates a `viewN` method visiting every entity that owns all listed
/// component types.
///
/// The participating stores are moved out of the map for the duration of the
/// walk so each can be borrowed mutably at once, then put back.
macro_rules! define_view {
    ($(#[$meta:meta])* $name:ident, $($T:ident => $store:ident),+) => {
        $(#[$meta])*
        pub fn $name<$($T: 'static,)+ F>(&mut self, mut f: F)
        where
            F: FnMut(Entity, $(&mut $T),+),
        {
            let Some(mut taken) = self.take_stores(&[$(TypeId::of::<$T>()),+]) else {
                return;
            };

            if let [$((_, $store)),+] = taken.as_mut_slice() {
                $(let $store = downcast_store_mut::<$T>(&mut **$store);)+
                let len = [$($store.len()),+].into_iter().min().unwrap_or(0);

                for index in 0..len {
                    if let ($(Some($store),)+) = ($($store.get_mut(index),)+) {
                        f(Entity::new(index), $($store),+);
                    }
                }
            }

            self.restore_stores(taken);
        }
    };
}

/// Owner of every entity and component in the simulation
///
/// Component stores are created lazily the first time a type is written.
/// Reads through [`Registry::get_components`] never register: asking for a
/// type that was never registered is a setup mistake and is reported as
/// [`EcsError::NotRegistered`].
#[derive(Default)]
pub struct Registry {
    entity_counter: usize,
    stores: HashMap<TypeId, Box<dyn ComponentStore>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next entity index. Indices are never reused.
    pub fn create_entity(&mut self) -> Entity {
        let entity = Entity::new(self.entity_counter);
        self.entity_counter += 1;
        entity
    }

    /// Removes `entity` from every component store.
    ///
    /// Safe to call for entities that own nothing or were already destroyed.
    pub fn destroy_entity(&mut self, entity: Entity) {
        for store in self.stores.values_mut() {
            store.remove_entity(entity.index());
        }
    }

    /// Number of entities allocated so far
    pub fn entity_count(&self) -> usize {
        self.entity_counter
    }

    /// Whether `entity` was handed out by this registry
    pub fn is_allocated(&self, entity: Entity) -> bool {
        entity.index() < self.entity_counter
    }

    /// Resolves an identifier received on the wire to an allocated entity.
    pub fn entity_from_wire(&self, id: u32) -> Option<Entity> {
        let entity = Entity::new(usize::try_from(id).ok()?);
        self.is_allocated(entity).then_some(entity)
    }

    /// Returns the store for `T`, creating it on first use.
    pub fn register_component<T: 'static>(&mut self) -> &mut SparseArray<T> {
        let store = self.stores.entry(TypeId::of::<T>()).or_insert_with(|| {
            debug!("Registered component store for {}", type_name::<T>());
            Box::new(SparseArray::<T>::new())
        });
        downcast_store_mut::<T>(&mut **store)
    }

    pub fn is_registered<T: 'static>(&self) -> bool {
        self.stores.contains_key(&TypeId::of::<T>())
    }

    pub fn get_components<T: 'static>(&self) -> Result<&SparseArray<T>, EcsError> {
        self.stores
            .get(&TypeId::of::<T>())
            .map(|store| downcast_store::<T>(&**store))
            .ok_or(EcsError::NotRegistered(type_name::<T>()))
    }

    pub fn get_components_mut<T: 'static>(&mut self) -> Result<&mut SparseArray<T>, EcsError> {
        self.stores
            .get_mut(&TypeId::of::<T>())
            .map(|store| downcast_store_mut::<T>(&mut **store))
            .ok_or(EcsError::NotRegistered(type_name::<T>()))
    }

    /// Attaches `component` to `entity`, replacing any previous value.
    pub fn emplace_component<T: 'static>(&mut self, entity: Entity, component: T) {
        self.register_component::<T>().insert(entity.index(), component);
    }

    pub fn remove_component<T: 'static>(&mut self, entity: Entity) -> Option<T> {
        self.get_components_mut::<T>()
            .ok()
            .and_then(|store| store.remove(entity.index()))
    }

    /// False when the store is unregistered or the slot is empty.
    pub fn has_component<T: 'static>(&self, entity: Entity) -> bool {
        self.get::<T>(entity).is_some()
    }

    pub fn get<T: 'static>(&self, entity: Entity) -> Option<&T> {
        self.get_components::<T>()
            .ok()
            .and_then(|store| store.get(entity.index()))
    }

    pub fn get_mut<T: 'static>(&mut self, entity: Entity) -> Option<&mut T> {
        self.get_components_mut::<T>()
            .ok()
            .and_then(|store| store.get_mut(entity.index()))
    }

    fn take_stores(&mut self, ids: &[TypeId]) -> Option<TakenStores> {
        let mut taken = Vec::with_capacity(ids.len());
        for id in ids {
            match self.stores.remove(id) {
                Some(store) => taken.push((*id, store)),
                None => {
                    // Unregistered, or listed twice in the same view
                    self.restore_stores(taken);
                    return None;
                }
            }
        }
        Some(taken)
    }

    fn restore_stores(&mut self, taken: TakenStores) {
        for (id, store) in taken {
            self.stores.insert(id, store);
        }
    }

    define_view!(
        /// Visits every entity owning an `A`, in ascending index order.
        ///
        /// The callback receives mutable references into the stores, so
        /// changes are visible as soon as it returns. The registry stays
        /// mutably borrowed for the whole walk, which rules out creating or
        /// destroying entities from inside the callback.
        view1, A => a
    );

    define_view!(
        /// Visits every entity owning both an `A` and a `B`, in ascending
        /// index order. See [`Registry::view1`].
        view2, A => a, B => b
    );

    define_view!(
        /// Three-component variant of [`Registry::view2`].
        view3, A => a, B => b, C => c
    );

    define_view!(
        /// Four-component variant of [`Registry::view2`].
        view4, A => a, B => b, C => c, D => d
    );
}
