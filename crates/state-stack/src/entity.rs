//! Normalized entity collections
//!
//! An [`EntityState`] keeps entities in a map keyed by id plus an ordered list
//! of ids. [`EntityAdapter`] provides copy-on-write operations over it: every
//! operation takes the current `Arc` and returns either a fresh collection or,
//! when nothing changes, the very same `Arc`.
//!
//! Two policies worth knowing:
//! - `add_one` on an existing id replaces the entity and keeps its position.
//! - `remove_one` and `update_one` on a missing id are silent no-ops.

use crate::error::{Result, StoreError};
use crate::selector::{create_entities_selector, Selector};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Requirements on entity ids.
pub trait EntityId: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> EntityId for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// `{ ids, entities }` with `ids` and the keys of `entities` in 1:1
/// correspondence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "E: Serialize, Id: Serialize + Eq + Hash",
    deserialize = "E: Deserialize<'de>, Id: Deserialize<'de> + Eq + Hash"
))]
pub struct EntityState<E, Id = String> {
    pub ids: Vec<Id>,
    pub entities: HashMap<Id, E>,
}

impl<E: PartialEq, Id: Eq + Hash> PartialEq for EntityState<E, Id> {
    fn eq(&self, other: &Self) -> bool {
        self.ids == other.ids && self.entities == other.entities
    }
}

impl<E, Id> Default for EntityState<E, Id> {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            entities: HashMap::new(),
        }
    }
}

impl<E, Id> EntityState<E, Id>
where
    Id: Eq + Hash,
{
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get(&self, id: &Id) -> Option<&E> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.entities.contains_key(id)
    }

    /// Entities in `ids` order.
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.ids.iter().filter_map(|id| self.entities.get(id))
    }

    /// Owned copies of the entities in `ids` order.
    pub fn all(&self) -> Vec<E>
    where
        E: Clone,
    {
        self.iter().cloned().collect()
    }
}

/// Patch addressed to one entity, as carried by `{ id, changes }` payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update<Id = String> {
    pub id: Id,
    pub changes: Value,
}

type SelectId<E, Id> = Arc<dyn Fn(&E) -> Id + Send + Sync>;
type SortComparer<E> = Arc<dyn Fn(&E, &E) -> Ordering + Send + Sync>;

/// Copy-on-write operations over an [`EntityState`].
pub struct EntityAdapter<E, Id = String> {
    select_id: SelectId<E, Id>,
    sort_comparer: Option<SortComparer<E>>,
}

impl<E, Id> Clone for EntityAdapter<E, Id> {
    fn clone(&self) -> Self {
        Self {
            select_id: Arc::clone(&self.select_id),
            sort_comparer: self.sort_comparer.clone(),
        }
    }
}

impl<E, Id> EntityAdapter<E, Id>
where
    E: Clone + Send + Sync + 'static,
    Id: EntityId,
{
    pub fn new<F>(select_id: F) -> Self
    where
        F: Fn(&E) -> Id + Send + Sync + 'static,
    {
        Self {
            select_id: Arc::new(select_id),
            sort_comparer: None,
        }
    }

    /// Keep `ids` sorted by this comparator after every insert.
    pub fn sorted_by<F>(mut self, compare: F) -> Self
    where
        F: Fn(&E, &E) -> Ordering + Send + Sync + 'static,
    {
        self.sort_comparer = Some(Arc::new(compare));
        self
    }

    pub fn select_id(&self, entity: &E) -> Id {
        (self.select_id)(entity)
    }

    pub fn get_initial_state(&self) -> Arc<EntityState<E, Id>> {
        Arc::new(EntityState::default())
    }

    /// Insert an entity, replacing any entity with the same id in place.
    pub fn add_one(&self, state: &Arc<EntityState<E, Id>>, entity: E) -> Arc<EntityState<E, Id>> {
        self.add_many(state, [entity])
    }

    pub fn add_many(
        &self,
        state: &Arc<EntityState<E, Id>>,
        entities: impl IntoIterator<Item = E>,
    ) -> Arc<EntityState<E, Id>> {
        let mut entities = entities.into_iter().peekable();
        if entities.peek().is_none() {
            return Arc::clone(state);
        }

        let mut next = (**state).clone();
        for entity in entities {
            self.insert(&mut next, entity);
        }
        self.sort(&mut next);
        Arc::new(next)
    }

    /// Same as [`add_many`](Self::add_many); named for call sites that mean
    /// "insert or replace".
    pub fn upsert_many(
        &self,
        state: &Arc<EntityState<E, Id>>,
        entities: impl IntoIterator<Item = E>,
    ) -> Arc<EntityState<E, Id>> {
        self.add_many(state, entities)
    }

    /// Replace the whole collection.
    pub fn set_all(
        &self,
        _state: &Arc<EntityState<E, Id>>,
        entities: impl IntoIterator<Item = E>,
    ) -> Arc<EntityState<E, Id>> {
        let mut next = EntityState::default();
        for entity in entities {
            self.insert(&mut next, entity);
        }
        self.sort(&mut next);
        Arc::new(next)
    }

    pub fn remove_one(&self, state: &Arc<EntityState<E, Id>>, id: &Id) -> Arc<EntityState<E, Id>> {
        self.remove_many(state, std::slice::from_ref(id))
    }

    pub fn remove_many(&self, state: &Arc<EntityState<E, Id>>, ids: &[Id]) -> Arc<EntityState<E, Id>> {
        if !ids.iter().any(|id| state.contains(id)) {
            return Arc::clone(state);
        }

        let mut next = (**state).clone();
        for id in ids {
            next.entities.remove(id);
        }
        next.ids.retain(|id| next.entities.contains_key(id));
        Arc::new(next)
    }

    pub fn remove_all(&self, state: &Arc<EntityState<E, Id>>) -> Arc<EntityState<E, Id>> {
        if state.is_empty() {
            return Arc::clone(state);
        }
        Arc::new(EntityState::default())
    }

    /// Patch one entity.
    ///
    /// When the patch changes the entity's id, the id is renamed in place; if
    /// the new id is already taken the update is dropped.
    pub fn update_one<F>(&self, state: &Arc<EntityState<E, Id>>, id: &Id, patch: F) -> Arc<EntityState<E, Id>>
    where
        F: FnOnce(&E) -> E,
    {
        let Some(current) = state.get(id) else {
            return Arc::clone(state);
        };
        let updated = patch(current);
        let new_id = self.select_id(&updated);

        if &new_id != id && state.contains(&new_id) {
            log::warn!("Update of {:?} would collide with existing id {:?}, ignoring", id, new_id);
            return Arc::clone(state);
        }

        let mut next = (**state).clone();
        if &new_id != id {
            next.entities.remove(id);
            if let Some(slot) = next.ids.iter_mut().find(|existing| *existing == id) {
                *slot = new_id.clone();
            }
        }
        next.entities.insert(new_id, updated);
        self.sort(&mut next);
        Arc::new(next)
    }

    /// Apply the same patch to several entities; missing ids are skipped.
    pub fn update_many<F>(&self, state: &Arc<EntityState<E, Id>>, ids: &[Id], patch: F) -> Arc<EntityState<E, Id>>
    where
        F: Fn(&E) -> E,
    {
        ids.iter()
            .fold(Arc::clone(state), |acc, id| self.update_one(&acc, id, &patch))
    }

    fn insert(&self, state: &mut EntityState<E, Id>, entity: E) {
        let id = self.select_id(&entity);
        if state.entities.insert(id.clone(), entity).is_none() {
            state.ids.push(id);
        }
    }

    fn sort(&self, state: &mut EntityState<E, Id>) {
        if let Some(compare) = &self.sort_comparer {
            let entities = &state.entities;
            state.ids.sort_by(|a, b| match (entities.get(a), entities.get(b)) {
                (Some(a), Some(b)) => compare(a, b),
                _ => Ordering::Equal,
            });
        }
    }

    /// Selectors over a bare collection.
    pub fn get_selectors(&self) -> EntitySelectors<Arc<EntityState<E, Id>>, E, Id> {
        self.get_selectors_for(|state: &Arc<EntityState<E, Id>>| Arc::clone(state))
    }

    /// Selectors over a collection nested somewhere in a larger state.
    pub fn get_selectors_for<R, F>(&self, select_slice: F) -> EntitySelectors<R, E, Id>
    where
        R: 'static,
        F: Fn(&R) -> Arc<EntityState<E, Id>> + Send + Sync + 'static,
    {
        let select_slice: Arc<dyn Fn(&R) -> Arc<EntityState<E, Id>> + Send + Sync> = Arc::new(select_slice);
        let for_all = Arc::clone(&select_slice);
        EntitySelectors {
            select_slice,
            all: Box::new(create_entities_selector(move |root: &R, _: &()| for_all(root))),
        }
    }
}

impl<E, Id> EntityAdapter<E, Id>
where
    E: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    Id: EntityId,
{
    /// Merge a JSON `changes` record into one entity.
    ///
    /// Top-level fields of `changes` overwrite the entity's fields. A missing
    /// id is a no-op; changes that do not fit the entity type are an error.
    pub fn update_one_json(
        &self,
        state: &Arc<EntityState<E, Id>>,
        update: &Update<Id>,
    ) -> Result<Arc<EntityState<E, Id>>> {
        let Some(current) = state.get(&update.id) else {
            return Ok(Arc::clone(state));
        };
        let Value::Object(changes) = &update.changes else {
            return Err(StoreError::InvalidAction(format!(
                "changes for {:?} must be a record",
                update.id
            )));
        };

        let mut merged = serde_json::to_value(current)
            .map_err(|e| StoreError::InvalidAction(e.to_string()))?;
        if let Value::Object(fields) = &mut merged {
            for (key, value) in changes {
                fields.insert(key.clone(), value.clone());
            }
        }
        let updated: E = serde_json::from_value(merged).map_err(|e| {
            StoreError::InvalidAction(format!("changes for {:?}: {}", update.id, e))
        })?;

        Ok(self.update_one(state, &update.id, move |_| updated))
    }
}

/// Selectors produced by [`EntityAdapter::get_selectors`].
pub struct EntitySelectors<R, E, Id> {
    select_slice: Arc<dyn Fn(&R) -> Arc<EntityState<E, Id>> + Send + Sync>,
    all: Box<dyn Selector<R, (), Output = Arc<Vec<E>>>>,
}

impl<R, E, Id> EntitySelectors<R, E, Id>
where
    E: Clone,
    Id: EntityId,
{
    pub fn select_state(&self, root: &R) -> Arc<EntityState<E, Id>> {
        (self.select_slice)(root)
    }

    pub fn select_ids(&self, root: &R) -> Vec<Id> {
        self.select_state(root).ids.clone()
    }

    pub fn select_entities(&self, root: &R) -> HashMap<Id, E> {
        self.select_state(root).entities.clone()
    }

    /// Memoized on the identity of the collection.
    pub fn select_all(&self, root: &R) -> Arc<Vec<E>> {
        self.all.select(root, &())
    }

    pub fn select_total(&self, root: &R) -> usize {
        self.select_state(root).len()
    }

    pub fn select_by_id(&self, root: &R, id: &Id) -> Option<E> {
        self.select_state(root).get(id).cloned()
    }
}
