//! # Changes
//!
//! A staged, ordered batch of triple additions and removals.
//!
//! Staged operations are invisible until [`Changes::commit`], which checks
//! every target database first and only then applies the batch in staged
//! order. Commit is the sole path by which registered indexes change.

use crate::database::Registry;
use crate::{EavError, EntityId, Triple, Value};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

// =============================================================================
// CHANGE
// =============================================================================

/// Whether a change adds or removes its triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Remove,
}

/// One staged operation with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Change {
    pub kind: ChangeKind,
    /// Target database.
    pub database: String,
    pub triple: Triple,
    /// Where the change came from (an action tag or a Block name).
    pub scope: String,
    /// Evaluation round the change was staged in.
    pub round: u64,
}

impl Change {
    /// Create an addition.
    #[must_use]
    pub fn add(database: impl Into<String>, triple: Triple, scope: impl Into<String>, round: u64) -> Self {
        Self {
            kind: ChangeKind::Add,
            database: database.into(),
            triple,
            scope: scope.into(),
            round,
        }
    }

    /// Create a removal.
    #[must_use]
    pub fn remove(
        database: impl Into<String>,
        triple: Triple,
        scope: impl Into<String>,
        round: u64,
    ) -> Self {
        Self {
            kind: ChangeKind::Remove,
            database: database.into(),
            triple,
            scope: scope.into(),
            round,
        }
    }
}

// =============================================================================
// CHANGES
// =============================================================================

/// A batch of staged operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    round: u64,
    staged: Vec<Change>,
}

impl Changes {
    /// Create an empty batch for `round`.
    #[must_use]
    pub fn new(round: u64) -> Self {
        Self {
            round,
            staged: Vec::new(),
        }
    }

    /// Round this batch belongs to.
    #[must_use]
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Append one operation.
    pub fn stage(&mut self, change: Change) {
        self.staged.push(change);
    }

    /// Stage an addition of `(entity, attribute, value)` into `database`.
    pub fn add(
        &mut self,
        database: &str,
        entity: EntityId,
        attribute: impl Into<Value>,
        value: impl Into<Value>,
        scope: &str,
    ) {
        let triple = Triple::new(entity, attribute, value);
        self.stage(Change::add(database, triple, scope, self.round));
    }

    /// Stage a removal of `(entity, attribute, value)` from `database`.
    pub fn remove(
        &mut self,
        database: &str,
        entity: EntityId,
        attribute: impl Into<Value>,
        value: impl Into<Value>,
        scope: &str,
    ) {
        let triple = Triple::new(entity, attribute, value);
        self.stage(Change::remove(database, triple, scope, self.round));
    }

    /// Staged operations, in order.
    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.staged.iter()
    }

    /// Number of staged operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// Whether nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Apply every staged operation to `registry`, then clear the stage.
    ///
    /// All target databases are checked before anything is applied: if one
    /// is missing the batch is left staged and nothing lands. Committing an
    /// empty batch is a no-op that returns an empty diff.
    pub fn commit(&mut self, registry: &mut Registry) -> Result<Diff, EavError> {
        let targets: IndexSet<&str> = self.staged.iter().map(|c| c.database.as_str()).collect();
        if let Some(missing) = targets.iter().find(|name| !registry.contains(name)) {
            return Err(EavError::DatabaseNotFound((*missing).to_string()));
        }

        let mut diff = Diff::default();
        for change in self.staged.drain(..) {
            let db = registry.get_mut(&change.database)?;
            let effective = match change.kind {
                ChangeKind::Add => db.apply_add(&change.triple),
                ChangeKind::Remove => db.apply_remove(&change.triple),
            };
            if effective {
                diff.changes.push(change);
            }
        }
        Ok(diff)
    }
}

// =============================================================================
// DIFF
// =============================================================================

/// The operations of a commit that actually changed an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    changes: Vec<Change>,
}

impl Diff {
    /// Effective changes, in commit order.
    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    /// Effective changes that targeted `database`.
    pub fn for_database<'a>(&'a self, database: &'a str) -> impl Iterator<Item = &'a Change> {
        self.changes.iter().filter(move |c| c.database == database)
    }

    /// Number of effective additions.
    #[must_use]
    pub fn added(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Add)
            .count()
    }

    /// Number of effective removals.
    #[must_use]
    pub fn removed(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Remove)
            .count()
    }

    /// Number of effective changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether the commit changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Append another diff.
    pub fn extend(&mut self, other: Diff) {
        self.changes.extend(other.changes);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    fn registry(names: &[&str]) -> Registry {
        let mut registry = Registry::new();
        for name in names {
            registry.register(name, Database::default()).expect("register");
        }
        registry
    }

    #[test]
    fn staged_changes_are_invisible_until_commit() {
        let mut registry = registry(&["d1"]);
        let mut changes = Changes::new(0);
        changes.add("d1", EntityId(1), "x", 2, "test");

        assert!(registry.get("d1").expect("get").is_empty());
        changes.commit(&mut registry).expect("commit");
        assert_eq!(registry.get("d1").expect("get").len(), 1);
    }

    #[test]
    fn commit_clears_the_stage() {
        let mut registry = registry(&["d1"]);
        let mut changes = Changes::new(0);
        changes.add("d1", EntityId(1), "x", 2, "test");

        let first = changes.commit(&mut registry).expect("commit");
        let second = changes.commit(&mut registry).expect("commit");
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert!(changes.is_empty());
    }

    #[test]
    fn commit_applies_in_staged_order() {
        let mut registry = registry(&["d1"]);
        let mut changes = Changes::new(0);
        changes.add("d1", EntityId(1), "x", 2, "test");
        changes.remove("d1", EntityId(1), "x", 2, "test");

        let diff = changes.commit(&mut registry).expect("commit");
        assert_eq!(diff.added(), 1);
        assert_eq!(diff.removed(), 1);
        assert!(registry.get("d1").expect("get").is_empty());
    }

    #[test]
    fn diff_skips_no_op_operations() {
        let mut registry = registry(&["d1"]);
        let mut changes = Changes::new(0);
        changes.add("d1", EntityId(1), "x", 2, "test");
        changes.add("d1", EntityId(1), "x", 2, "test");
        changes.remove("d1", EntityId(5), "y", 1, "test");

        let diff = changes.commit(&mut registry).expect("commit");
        assert_eq!(diff.len(), 1);
    }

    #[test]
    fn missing_target_applies_nothing() {
        let mut registry = registry(&["d1"]);
        let mut changes = Changes::new(0);
        changes.add("d1", EntityId(1), "x", 2, "test");
        changes.add("ghost", EntityId(1), "x", 2, "test");

        let result = changes.commit(&mut registry);
        assert!(matches!(result, Err(EavError::DatabaseNotFound(name)) if name == "ghost"));
        assert!(registry.get("d1").expect("get").is_empty());
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn diff_filters_by_database() {
        let mut registry = registry(&["a", "b"]);
        let mut changes = Changes::new(3);
        changes.add("a", EntityId(1), "x", 1, "test");
        changes.add("b", EntityId(1), "x", 1, "test");

        let diff = changes.commit(&mut registry).expect("commit");
        let for_b: Vec<&Change> = diff.for_database("b").collect();
        assert_eq!(for_b.len(), 1);
        assert_eq!(for_b[0].round, 3);
    }
}
