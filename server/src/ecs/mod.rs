//! Entity-Component-System storage
//!
//! Entities are bare indices, components are plain structs stored per type in
//! a [`SparseArray`], and the [`Registry`] ties them together: it allocates
//! entities, owns one store per component type and answers multi-component
//! queries through its `view` family.

pub mod components;
mod entity;
mod registry;
mod sparse_array;

pub use entity::Entity;
pub use registry::{EcsError, Registry};
pub use sparse_array::SparseArray;
