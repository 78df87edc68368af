use std::collections::HashMap;
use std::fmt;

use crate::tag::TagId;
use crate::{TagError, Validator};

/// A stable id for an object taking part in tracking through per-key tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Side table of `(entity, key) -> tag`.
#[derive(Debug, Default)]
pub(crate) struct PropertyTags {
    labels: Vec<String>,
    tags: HashMap<EntityId, HashMap<String, TagId>>,
}

impl PropertyTags {
    pub(crate) fn new_entity(&mut self, label: String) -> EntityId {
        let id = EntityId(self.labels.len() as u32);
        self.labels.push(label);
        id
    }

    pub(crate) fn label(&self, entity: EntityId) -> Option<&str> {
        self.labels.get(entity.0 as usize).map(String::as_str)
    }

    pub(crate) fn get(&self, entity: EntityId, key: &str) -> Option<TagId> {
        self.tags.get(&entity)?.get(key).copied()
    }

    pub(crate) fn insert(&mut self, entity: EntityId, key: &str, tag: TagId) {
        self.tags
            .entry(entity)
            .or_default()
            .insert(key.to_string(), tag);
    }

    pub(crate) fn tags_of(&self, entity: EntityId) -> Vec<(String, TagId)> {
        let mut out: Vec<(String, TagId)> = self
            .tags
            .get(&entity)
            .map(|tags| tags.iter().map(|(k, t)| (k.clone(), *t)).collect())
            .unwrap_or_default();
        out.sort();
        out
    }
}

/// A tracked field: one value per entity, read through its property tag.
pub struct TrackedData<T> {
    key: String,
    values: HashMap<EntityId, T>,
    initializer: Option<Box<dyn Fn() -> T>>,
}

impl<T> TrackedData<T> {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            values: HashMap::new(),
            initializer: None,
        }
    }

    pub fn with_initializer(key: impl Into<String>, initializer: impl Fn() -> T + 'static) -> Self {
        Self {
            key: key.into(),
            values: HashMap::new(),
            initializer: Some(Box::new(initializer)),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Consumes the field's tag and returns the value, initializing it on first read.
    pub fn get(&mut self, validator: &mut Validator, entity: EntityId) -> Option<&T> {
        let tag = validator.tag_for(entity, &self.key);
        validator.consume(tag);
        if let Some(initializer) = &self.initializer {
            self.values.entry(entity).or_insert_with(|| initializer());
        }
        self.values.get(&entity)
    }

    /// Writes the field. A write after a read in the same transaction is always a
    /// hard error here, even while mutations are being deprecated.
    pub fn set(&mut self, validator: &mut Validator, entity: EntityId, value: T) -> Result<(), TagError> {
        let tag = validator.tag_for(entity, &self.key);
        let label = validator.entity_label(entity).map(str::to_string);
        validator.assert_tag_not_consumed(tag, label.as_deref(), Some(&self.key), true)?;
        validator.dirty_tag_for(entity, &self.key)?;
        self.values.insert(entity, value);
        Ok(())
    }
}
