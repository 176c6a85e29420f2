//! # Blocks
//!
//! A `Block` is a compiled rule: a conjunction of watch [`Pattern`]s and the
//! actions its matches drive.
//!
//! - **Bind actions** are maintained. Every run recomputes the facts the
//!   current matches imply and reports which it gained and which it lost.
//!   The evaluation turns those into adds and removes through its support
//!   table, since other Blocks may bind the same fact.
//! - **Commit actions** fire once for each match row not seen in the
//!   Block's previous run.
//!
//! Running a Block does not change it. [`Block::run`] returns a [`BlockRun`]
//! carrying the Block's next state, and [`Block::settle`] installs it once
//! the pass has committed; a pass that fails to commit leaves every Block as
//! it was.
//!
//! A Block is eligible for a pass if it is not dormant and either has never
//! run or one of its patterns matches a change committed by the previous
//! pass. A single-run Block turns dormant as soon as its run settles, and
//! stays dormant until its database's Block list is replaced.

use crate::action::{Action, ActionError, Bindings, Term, Verb, check_scopes};
use crate::changes::{Change, Changes, Diff};
use crate::database::Registry;
use crate::support::Fact;
use crate::{BlockId, EavError, Triple, Value};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// PATTERN
// =============================================================================

/// A triple pattern over one database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pattern {
    pub database: String,
    pub entity: Term,
    pub attribute: Term,
    pub value: Term,
}

impl Pattern {
    /// Create a pattern.
    #[must_use]
    pub fn new(database: &str, entity: Term, attribute: Term, value: Term) -> Self {
        Self {
            database: database.to_string(),
            entity,
            attribute,
            value,
        }
    }

    /// Extend `bindings` so that this pattern matches `triple`.
    ///
    /// Returns `None` if a constant differs or a variable is already bound
    /// to something else.
    #[must_use]
    pub fn unify(&self, triple: &Triple, bindings: &Bindings) -> Option<Bindings> {
        let mut row = bindings.clone();
        let entity = Value::Id(triple.entity);
        let positions = [
            (&self.entity, &entity),
            (&self.attribute, &triple.attribute),
            (&self.value, &triple.value),
        ];
        for (term, actual) in positions {
            match term {
                Term::Any => {}
                Term::Const(expected) => {
                    if expected != actual {
                        return None;
                    }
                }
                Term::Var(name) => match row.get(name) {
                    Some(bound) if bound != actual => return None,
                    Some(_) => {}
                    None => {
                        row.insert(name.clone(), actual.clone());
                    }
                },
            }
        }
        Some(row)
    }

    /// Whether a committed change touches data this pattern watches.
    #[must_use]
    pub fn matches_change(&self, change: &Change) -> bool {
        change.database == self.database && self.unify(&change.triple, &Bindings::new()).is_some()
    }

    /// Every extension of `bindings` matching stored triples, in index order.
    ///
    /// A missing database matches nothing.
    #[must_use]
    pub fn solve(&self, registry: &Registry, bindings: &Bindings) -> Vec<Bindings> {
        let Ok(db) = registry.get(&self.database) else {
            return Vec::new();
        };
        let entity = match self.entity.bound_value(bindings) {
            Some(Value::Id(id)) => Some(id),
            Some(_) => return Vec::new(),
            None => None,
        };
        let attribute = self.attribute.bound_value(bindings);
        let value = self.value.bound_value(bindings);
        db.index()
            .select(entity, attribute.as_ref(), value.as_ref())
            .iter()
            .filter_map(|triple| self.unify(triple, bindings))
            .collect()
    }
}

// =============================================================================
// BIND CONTEXT
// =============================================================================

/// Bookkeeping collected while Blocks retract their bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindContext {
    /// Position in the Changes batch where each Block's retractions start.
    pub positions: BTreeMap<BlockId, usize>,
    /// Human-readable notes, one per refreshed Block.
    pub info: Vec<String>,
    /// Facts to leave in place: still bound elsewhere, found rather than
    /// added, or in a database that is gone.
    pub retained: IndexSet<Fact>,
}

// =============================================================================
// BLOCK
// =============================================================================

/// What a single Block run staged, and the state it leaves behind.
#[derive(Debug, Default)]
pub struct BlockRun {
    /// Operations staged directly: commit actions and bind removes.
    pub staged: usize,
    pub errors: Vec<ActionError>,
    /// Provenance tag for bind changes.
    pub tag: String,
    /// Every bind fact the current matches imply.
    pub bound: IndexSet<Fact>,
    /// Facts in `bound` the Block did not bind before.
    pub gained: IndexSet<Fact>,
    /// Facts the Block bound before and no longer implies.
    pub lost: Vec<Fact>,
    pub(crate) seen: IndexSet<Bindings>,
}

/// A compiled rule unit.
#[derive(Debug, Clone)]
pub struct Block {
    id: BlockId,
    name: String,
    watches: Vec<Pattern>,
    bind_actions: Vec<Action>,
    commit_actions: Vec<Action>,
    single_run: bool,
    dormant: bool,
    has_run: bool,
    bound: IndexSet<Fact>,
    seen: IndexSet<Bindings>,
}

impl Block {
    /// Create an empty Block.
    #[must_use]
    pub fn new(id: BlockId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            watches: Vec::new(),
            bind_actions: Vec::new(),
            commit_actions: Vec::new(),
            single_run: false,
            dormant: false,
            has_run: false,
            bound: IndexSet::new(),
            seen: IndexSet::new(),
        }
    }

    /// Add a watch pattern.
    #[must_use]
    pub fn with_watch(mut self, pattern: Pattern) -> Self {
        self.watches.push(pattern);
        self
    }

    /// Add a maintained bind action.
    #[must_use]
    pub fn with_bind(mut self, action: Action) -> Self {
        self.bind_actions.push(action);
        self
    }

    /// Add a fire-once-per-match commit action.
    #[must_use]
    pub fn with_commit(mut self, action: Action) -> Self {
        self.commit_actions.push(action);
        self
    }

    /// Make this Block run at most once per database lifetime.
    #[must_use]
    pub fn single_run(mut self) -> Self {
        self.single_run = true;
        self
    }

    #[must_use]
    pub fn id(&self) -> BlockId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn watches(&self) -> &[Pattern] {
        &self.watches
    }

    #[must_use]
    pub fn bind_actions(&self) -> &[Action] {
        &self.bind_actions
    }

    #[must_use]
    pub fn commit_actions(&self) -> &[Action] {
        &self.commit_actions
    }

    #[must_use]
    pub fn is_single_run(&self) -> bool {
        self.single_run
    }

    #[must_use]
    pub fn is_dormant(&self) -> bool {
        self.dormant
    }

    /// Whether the Block has run since it was created or refreshed.
    #[must_use]
    pub fn has_run(&self) -> bool {
        self.has_run
    }

    /// Facts this Block currently supports, as `(database, triple)`.
    pub fn bound_facts(&self) -> impl Iterator<Item = &Fact> {
        self.bound.iter()
    }

    /// Mark the Block dormant. Only single-run Blocks can be dormant.
    pub fn mark_dormant(&mut self) -> Result<(), EavError> {
        if !self.single_run {
            return Err(EavError::InvalidState(format!(
                "{} is not single-run and cannot be made dormant",
                self.id
            )));
        }
        self.dormant = true;
        Ok(())
    }

    /// Whether the Block should run in a pass following `touched`.
    #[must_use]
    pub fn is_eligible(&self, touched: &Diff) -> bool {
        if self.dormant {
            return false;
        }
        if !self.has_run {
            return true;
        }
        self.watches
            .iter()
            .any(|pattern| touched.iter().any(|change| pattern.matches_change(change)))
    }

    /// Solve the watch conjunction. A Block with no watches has one empty row.
    #[must_use]
    pub fn solve(&self, registry: &Registry) -> Vec<Bindings> {
        let mut rows: IndexSet<Bindings> = IndexSet::new();
        rows.insert(Bindings::new());
        for pattern in &self.watches {
            rows = rows
                .iter()
                .flat_map(|row| pattern.solve(registry, row))
                .collect();
            if rows.is_empty() {
                break;
            }
        }
        rows.into_iter().collect()
    }

    /// Run the Block against `registry`.
    ///
    /// Commit actions and remove-binds are staged into `changes`; insert-binds
    /// are reported in the returned run for the support table to stage. The
    /// Block itself is untouched until [`Block::settle`].
    #[must_use]
    pub fn run(&self, registry: &Registry, changes: &mut Changes) -> BlockRun {
        let rows = self.solve(registry);
        let mut run = BlockRun {
            tag: self.bind_tag().to_string(),
            ..BlockRun::default()
        };

        for row in &rows {
            for (index, action) in self.bind_actions.iter().enumerate() {
                let outcome = check_scopes(action, registry).and_then(|()| match action.verb {
                    Verb::Insert => action.resolve(row).map(|triple| {
                        for scope in &action.scopes {
                            run.bound.insert((scope.clone(), triple.clone()));
                        }
                        0
                    }),
                    Verb::Remove => action.stage(row, changes),
                });
                match outcome {
                    Ok(staged) => run.staged += staged,
                    Err(error) => run.errors.push(ActionError { index, error }),
                }
            }
        }

        for fact in &self.bound {
            if run.bound.contains(fact) {
                continue;
            }
            let (database, _) = fact;
            if !registry.contains(database) {
                run.errors.push(ActionError {
                    index: self.bind_index(database),
                    error: EavError::DatabaseNotFound(database.clone()),
                });
            }
            run.lost.push(fact.clone());
        }
        run.gained = run
            .bound
            .iter()
            .filter(|fact| !self.bound.contains(*fact))
            .cloned()
            .collect();

        let offset = self.bind_actions.len();
        for row in &rows {
            if self.seen.contains(row) {
                continue;
            }
            for (index, action) in self.commit_actions.iter().enumerate() {
                match check_scopes(action, registry).and_then(|()| action.stage(row, changes)) {
                    Ok(staged) => run.staged += staged,
                    Err(error) => run.errors.push(ActionError {
                        index: offset + index,
                        error,
                    }),
                }
            }
        }
        run.seen = rows.into_iter().collect();
        run
    }

    /// Install the state a committed run leaves behind.
    pub fn settle(&mut self, run: &mut BlockRun) {
        self.bound = std::mem::take(&mut run.bound);
        self.seen = std::mem::take(&mut run.seen);
        self.has_run = true;
        if self.single_run {
            self.dormant = true;
        }
    }

    /// Retract every bound fact into `changes` and forget past matches.
    ///
    /// Facts listed in `context.retained` are released without a retraction.
    /// Used when session state is carried across a rebuild: the retractions
    /// land in the same batch as the rebuilt Blocks' first run.
    pub fn update_binds(&mut self, context: &mut BindContext, changes: &mut Changes) -> usize {
        let position = changes.len();
        let mut retracted = 0;
        for (database, triple) in self.bound.drain(..) {
            if context.retained.contains(&(database.clone(), triple.clone())) {
                continue;
            }
            changes.stage(Change::remove(
                database,
                triple,
                &self.name,
                changes.round(),
            ));
            retracted += 1;
        }
        self.seen.clear();
        self.has_run = false;
        context.positions.insert(self.id, position);
        context
            .info
            .push(format!("{} '{}': retracted {} bound facts", self.id, self.name, retracted));
        retracted
    }

    /// First bind action writing to `database`.
    fn bind_index(&self, database: &str) -> usize {
        self.bind_actions
            .iter()
            .position(|action| action.scopes.iter().any(|scope| scope == database))
            .unwrap_or(0)
    }

    fn bind_tag(&self) -> &str {
        self.bind_actions
            .first()
            .map_or(self.name.as_str(), |action| action.tag.as_str())
    }
}

// =============================================================================
// TESTS
// =============================================================================
