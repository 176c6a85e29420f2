//! # EAV Index
//!
//! An ordered three-level trie over `(entity, attribute, value)`.
//!
//! Every level is an `IndexMap`/`IndexSet`, so iteration order is the order
//! keys were first inserted. Diagnostic tooling relies on "the first key" of
//! a level as a stable default, which makes this ordering part of the
//! contract, not an accident of the container.
//!
//! Removal uses `shift_remove` so the relative order of surviving keys is
//! never disturbed, and prunes levels that become empty.

use crate::{EntityId, Triple, Value};
use indexmap::{IndexMap, IndexSet};

/// Leaf level: the values stored under one `(entity, attribute)` pair.
pub type ValueSet = IndexSet<Value>;

/// Middle level: attribute → values for one entity.
pub type AttributeMap = IndexMap<Value, ValueSet>;

/// Root level: entity → attributes.
pub type EntityMap = IndexMap<EntityId, AttributeMap>;

// =============================================================================
// LOOKUP LEVEL
// =============================================================================

/// The result of a prefix lookup: one level of the trie.
///
/// A miss is `Level::Empty`, never an error.
#[derive(Debug, Clone, Copy)]
pub enum Level<'a> {
    /// No key supplied: every entity.
    Entities(&'a EntityMap),
    /// Entity supplied: its attributes.
    Attributes(&'a AttributeMap),
    /// Entity and attribute supplied: their values.
    Values(&'a ValueSet),
    /// All three keys supplied and the triple is stored.
    Present,
    /// Nothing matched.
    Empty,
}

impl<'a> Level<'a> {
    /// Keys at this level, in insertion order.
    ///
    /// Entity keys are returned as `Value::Id`.
    #[must_use]
    pub fn keys(&self) -> Vec<Value> {
        match self {
            Self::Entities(map) => map.keys().map(|e| Value::Id(*e)).collect(),
            Self::Attributes(map) => map.keys().cloned().collect(),
            Self::Values(set) => set.iter().cloned().collect(),
            Self::Present | Self::Empty => Vec::new(),
        }
    }

    /// The first-inserted key at this level.
    #[must_use]
    pub fn first_key(&self) -> Option<Value> {
        match self {
            Self::Entities(map) => map.keys().next().map(|e| Value::Id(*e)),
            Self::Attributes(map) => map.keys().next().cloned(),
            Self::Values(set) => set.first().cloned(),
            Self::Present | Self::Empty => None,
        }
    }

    /// Step one level down through `key`.
    #[must_use]
    pub fn descend(&self, key: &Value) -> Level<'a> {
        match *self {
            Self::Entities(map) => key
                .as_entity()
                .and_then(|e| map.get(&e))
                .map_or(Self::Empty, Self::Attributes),
            Self::Attributes(map) => map.get(key).map_or(Self::Empty, Self::Values),
            Self::Values(set) => {
                if set.contains(key) {
                    Self::Present
                } else {
                    Self::Empty
                }
            }
            Self::Present | Self::Empty => Self::Empty,
        }
    }

    /// Whether nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Entities(map) => map.is_empty(),
            Self::Attributes(map) => map.is_empty(),
            Self::Values(set) => set.is_empty(),
            Self::Present => false,
            Self::Empty => true,
        }
    }
}

// =============================================================================
// INDEX
// =============================================================================

/// The trie itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Index {
    entities: EntityMap,
    len: usize,
}

impl Index {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a triple. Returns `true` if it was not already stored.
    pub fn insert(&mut self, entity: EntityId, attribute: Value, value: Value) -> bool {
        let inserted = self
            .entities
            .entry(entity)
            .or_default()
            .entry(attribute)
            .or_default()
            .insert(value);
        if inserted {
            self.len += 1;
        }
        inserted
    }

    /// Remove a triple. Returns `true` if it was stored.
    pub fn remove(&mut self, entity: EntityId, attribute: &Value, value: &Value) -> bool {
        let Some(attributes) = self.entities.get_mut(&entity) else {
            return false;
        };
        let Some(values) = attributes.get_mut(attribute) else {
            return false;
        };
        if !values.shift_remove(value) {
            return false;
        }
        if values.is_empty() {
            attributes.shift_remove(attribute);
        }
        if attributes.is_empty() {
            self.entities.shift_remove(&entity);
        }
        self.len -= 1;
        true
    }

    /// Look up the level addressed by a key prefix.
    ///
    /// Keys are positional: `attribute` is only consulted when `entity` is
    /// given, and `value` only when `attribute` is given. Non-prefix
    /// subsets are answered by [`Index::select`].
    #[must_use]
    pub fn lookup(
        &self,
        entity: Option<EntityId>,
        attribute: Option<&Value>,
        value: Option<&Value>,
    ) -> Level<'_> {
        let root = Level::Entities(&self.entities);
        let Some(entity) = entity else {
            return root;
        };
        let level = root.descend(&Value::Id(entity));
        let Some(attribute) = attribute else {
            return level;
        };
        let level = level.descend(attribute);
        match value {
            Some(value) => level.descend(value),
            None => level,
        }
    }

    /// Whether the exact triple is stored.
    #[must_use]
    pub fn contains(&self, entity: EntityId, attribute: &Value, value: &Value) -> bool {
        self.entities
            .get(&entity)
            .and_then(|attributes| attributes.get(attribute))
            .is_some_and(|values| values.contains(value))
    }

    /// All triples matching any subset of keys, in index order.
    #[must_use]
    pub fn select(
        &self,
        entity: Option<EntityId>,
        attribute: Option<&Value>,
        value: Option<&Value>,
    ) -> Vec<Triple> {
        let mut out = Vec::new();
        let entities: Vec<(&EntityId, &AttributeMap)> = match entity {
            Some(e) => self.entities.get_key_value(&e).into_iter().collect(),
            None => self.entities.iter().collect(),
        };
        for (e, attributes) in entities {
            let pairs: Vec<(&Value, &ValueSet)> = match attribute {
                Some(a) => attributes.get_key_value(a).into_iter().collect(),
                None => attributes.iter().collect(),
            };
            for (a, values) in pairs {
                match value {
                    Some(v) => {
                        if values.contains(v) {
                            out.push(Triple::new(*e, a.clone(), v.clone()));
                        }
                    }
                    None => out.extend(
                        values
                            .iter()
                            .map(|v| Triple::new(*e, a.clone(), v.clone())),
                    ),
                }
            }
        }
        out
    }

    /// Iterate every stored triple in index order.
    pub fn triples(&self) -> impl Iterator<Item = Triple> + '_ {
        self.entities.iter().flat_map(|(e, attributes)| {
            attributes.iter().flat_map(move |(a, values)| {
                values.iter().map(move |v| Triple::new(*e, a.clone(), v.clone()))
            })
        })
    }

    /// Number of stored triples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the index stores nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of distinct entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Value {
        Value::text("x")
    }

    #[test]
    fn insert_is_idempotent() {
        let mut index = Index::new();
        assert!(index.insert(EntityId(1), x(), Value::Number(2)));
        assert!(!index.insert(EntityId(1), x(), Value::Number(2)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut index = Index::new();
        index.insert(EntityId(1), x(), Value::Number(2));
        assert!(index.remove(EntityId(1), &x(), &Value::Number(2)));
        assert!(!index.remove(EntityId(1), &x(), &Value::Number(2)));
        assert!(index.is_empty());
    }

    #[test]
    fn remove_prunes_empty_levels() {
        let mut index = Index::new();
        index.insert(EntityId(1), x(), Value::Number(2));
        index.remove(EntityId(1), &x(), &Value::Number(2));

        assert!(index.lookup(Some(EntityId(1)), None, None).is_empty());
        assert_eq!(index.entity_count(), 0);
    }

    #[test]
    fn lookup_miss_is_empty() {
        let index = Index::new();
        let level = index.lookup(Some(EntityId(9)), Some(&x()), None);
        assert!(matches!(level, Level::Empty));
        assert!(level.keys().is_empty());
        assert_eq!(level.first_key(), None);
    }

    #[test]
    fn keys_follow_insertion_order() {
        let mut index = Index::new();
        index.insert(EntityId(1), Value::text("b"), Value::Number(1));
        index.insert(EntityId(1), Value::text("a"), Value::Number(1));
        index.insert(EntityId(1), Value::text("c"), Value::Number(1));

        let level = index.lookup(Some(EntityId(1)), None, None);
        assert_eq!(
            level.keys(),
            vec![Value::text("b"), Value::text("a"), Value::text("c")]
        );
        assert_eq!(level.first_key(), Some(Value::text("b")));
    }

    #[test]
    fn removal_keeps_order_of_survivors() {
        let mut index = Index::new();
        for n in [5, 3, 9, 1] {
            index.insert(EntityId(1), x(), Value::Number(n));
        }
        index.remove(EntityId(1), &x(), &Value::Number(3));

        let level = index.lookup(Some(EntityId(1)), Some(&x()), None);
        assert_eq!(
            level.keys(),
            vec![Value::Number(5), Value::Number(9), Value::Number(1)]
        );
    }

    #[test]
    fn full_key_lookup_reports_presence() {
        let mut index = Index::new();
        index.insert(EntityId(1), x(), Value::Number(2));

        let hit = index.lookup(Some(EntityId(1)), Some(&x()), Some(&Value::Number(2)));
        let miss = index.lookup(Some(EntityId(1)), Some(&x()), Some(&Value::Number(3)));
        assert!(matches!(hit, Level::Present));
        assert!(matches!(miss, Level::Empty));
    }

    #[test]
    fn descend_walks_first_keys() {
        let mut index = Index::new();
        index.insert(EntityId(4), Value::text("tag"), Value::text("div"));
        index.insert(EntityId(4), Value::text("tag"), Value::text("span"));

        let root = index.lookup(None, None, None);
        let entity = root.first_key().expect("entity");
        assert_eq!(entity, Value::Id(EntityId(4)));

        let attributes = root.descend(&entity);
        let attribute = attributes.first_key().expect("attribute");
        let values = attributes.descend(&attribute);
        assert_eq!(values.keys(), vec![Value::text("div"), Value::text("span")]);
    }

    #[test]
    fn select_matches_non_prefix_subsets() {
        let mut index = Index::new();
        index.insert(EntityId(1), Value::text("count"), Value::Number(10));
        index.insert(EntityId(2), Value::text("name"), Value::text("b"));
        index.insert(EntityId(3), Value::text("count"), Value::Number(4));

        let counts = index.select(None, Some(&Value::text("count")), None);
        assert_eq!(
            counts,
            vec![
                Triple::new(EntityId(1), "count", 10),
                Triple::new(EntityId(3), "count", 4),
            ]
        );

        let tens = index.select(None, None, Some(&Value::Number(10)));
        assert_eq!(tens.len(), 1);
    }

    #[test]
    fn triples_iterates_in_index_order() {
        let mut index = Index::new();
        index.insert(EntityId(2), x(), Value::Number(1));
        index.insert(EntityId(1), x(), Value::Number(1));

        let entities: Vec<EntityId> = index.triples().map(|t| t.entity).collect();
        assert_eq!(entities, vec![EntityId(2), EntityId(1)]);
    }
}
