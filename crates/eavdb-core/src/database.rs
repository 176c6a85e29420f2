//! # Databases
//!
//! A `Database` is a named fact collection: one [`Index`] plus, for the
//! session database, the list of compiled [`Block`]s.
//!
//! A `Registry` maps names to databases in registration order. It is owned
//! by exactly one `Evaluation`; moving a database out of the registry
//! transfers ownership, so no two live handles can disagree on content.

use crate::block::Block;
use crate::index::{Index, Level};
use crate::{EavError, EntityId, Triple, Value};
use indexmap::IndexMap;

// =============================================================================
// DATABASE
// =============================================================================

/// A named collection of triples, optionally carrying rule state.
#[derive(Debug, Clone, Default)]
pub struct Database {
    name: String,
    index: Index,
    blocks: Vec<Block>,
}

impl Database {
    /// Create an empty database.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: Index::new(),
            blocks: Vec::new(),
        }
    }

    /// Create a database carrying the given Blocks.
    #[must_use]
    pub fn with_blocks(name: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self {
            name: name.into(),
            index: Index::new(),
            blocks,
        }
    }

    /// The registry key of this database.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        name.clone_into(&mut self.name);
    }

    /// Read access to the underlying index.
    #[must_use]
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Insert a triple directly. Returns `true` if it was new.
    ///
    /// Registered databases should be mutated through committed `Changes`.
    /// Direct inserts produce no diff; through `Evaluation::get_database_mut`
    /// they make the next fixpoint re-run every Block.
    pub fn insert(&mut self, entity: EntityId, attribute: Value, value: Value) -> bool {
        self.index.insert(entity, attribute, value)
    }

    /// Remove a triple directly. Returns `true` if it was stored.
    pub fn remove(&mut self, entity: EntityId, attribute: &Value, value: &Value) -> bool {
        self.index.remove(entity, attribute, value)
    }

    pub(crate) fn apply_add(&mut self, triple: &Triple) -> bool {
        self.index
            .insert(triple.entity, triple.attribute.clone(), triple.value.clone())
    }

    pub(crate) fn apply_remove(&mut self, triple: &Triple) -> bool {
        self.index
            .remove(triple.entity, &triple.attribute, &triple.value)
    }

    /// Prefix lookup; see [`Index::lookup`].
    #[must_use]
    pub fn lookup(
        &self,
        entity: Option<EntityId>,
        attribute: Option<&Value>,
        value: Option<&Value>,
    ) -> Level<'_> {
        self.index.lookup(entity, attribute, value)
    }

    /// Number of stored triples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no triples are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// The Blocks this database carries.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Mutable access to the Blocks, e.g. to refresh their bindings.
    pub fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }

    /// Replace the whole Block list, returning the previous one.
    ///
    /// This is the only way dormant Blocks leave scheduling.
    pub fn replace_blocks(&mut self, blocks: Vec<Block>) -> Vec<Block> {
        std::mem::replace(&mut self.blocks, blocks)
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// A database released by a closed evaluation.
///
/// Read-only: nothing can mutate it again.
#[derive(Debug, Clone)]
pub struct Snapshot(Database);

impl Snapshot {
    pub(crate) fn freeze(db: Database) -> Self {
        Self(db)
    }

    /// Name the database was registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// The frozen index.
    #[must_use]
    pub fn index(&self) -> &Index {
        self.0.index()
    }

    /// Prefix lookup against the frozen index.
    #[must_use]
    pub fn lookup(
        &self,
        entity: Option<EntityId>,
        attribute: Option<&Value>,
        value: Option<&Value>,
    ) -> Level<'_> {
        self.0.lookup(entity, attribute, value)
    }

    /// The Blocks the database carried when frozen.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        self.0.blocks()
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Name → database map, iterated in registration order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    databases: IndexMap<String, Database>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `db` under `name`. Never replaces an existing entry.
    pub fn register(&mut self, name: &str, mut db: Database) -> Result<(), EavError> {
        if self.databases.contains_key(name) {
            return Err(EavError::DuplicateDatabase(name.to_string()));
        }
        db.set_name(name);
        self.databases.insert(name.to_string(), db);
        Ok(())
    }

    /// Remove and return the database registered under `name`.
    pub fn unregister(&mut self, name: &str) -> Result<Database, EavError> {
        self.databases
            .shift_remove(name)
            .ok_or_else(|| EavError::DatabaseNotFound(name.to_string()))
    }

    /// Read access by name.
    pub fn get(&self, name: &str) -> Result<&Database, EavError> {
        self.databases
            .get(name)
            .ok_or_else(|| EavError::DatabaseNotFound(name.to_string()))
    }

    /// Write access by name.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut Database, EavError> {
        self.databases
            .get_mut(name)
            .ok_or_else(|| EavError::DatabaseNotFound(name.to_string()))
    }

    pub(crate) fn get_index_mut(&mut self, position: usize) -> Option<&mut Database> {
        self.databases.get_index_mut(position).map(|(_, db)| db)
    }

    /// Whether a database is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.databases.contains_key(name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }

    /// Registered databases, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Database> {
        self.databases.values()
    }

    /// Number of registered databases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.databases.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }

    pub(crate) fn drain(&mut self) -> Vec<Database> {
        self.databases.drain(..).map(|(_, db)| db).collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
