//! # Bind Support
//!
//! Several Blocks may bind the same fact, and a fact may already be stored
//! before any Block binds it. The support table records, per
//! `(database, triple)`, how many Blocks currently bind the fact and whether
//! binding is what put it in place.
//!
//! A bound fact is retracted only when its last supporter lets go, and only
//! if binding added it.
//!
//! Planning a pass is separate from applying it: [`SupportTable::plan`]
//! stages the adds and removes a set of Block runs imply, and the returned
//! [`SupportUpdate`] is applied once the batch has committed.

use crate::block::BlockRun;
use crate::changes::{Change, Changes};
use crate::database::Registry;
use crate::Triple;
use indexmap::IndexMap;

/// A fact in a named database.
pub type Fact = (String, Triple);

/// Supporters of one fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Support {
    pub(crate) count: usize,
    /// Whether a bind put the fact in place (as opposed to finding it there).
    pub(crate) added: bool,
}

/// Support entries to install after a commit.
#[derive(Debug, Default)]
pub(crate) struct SupportUpdate {
    entries: Vec<(Fact, Support)>,
}

/// Per-fact supporter counts for every bound fact of an evaluation.
#[derive(Debug, Clone, Default)]
pub(crate) struct SupportTable {
    entries: IndexMap<Fact, Support>,
}

#[derive(Debug)]
struct Pending<'a> {
    gained: usize,
    lost: usize,
    tag: &'a str,
}

fn is_stored(registry: &Registry, (database, triple): &Fact) -> bool {
    registry
        .get(database)
        .is_ok_and(|db| db.index().contains(triple.entity, &triple.attribute, &triple.value))
}

impl SupportTable {
    pub(crate) fn get(&self, fact: &Fact) -> Option<Support> {
        self.entries.get(fact).copied()
    }

    /// Stage the bind adds and removes implied by `runs` into `changes`.
    ///
    /// Runs are read in order; a fact gained and lost within the same pass
    /// nets out. Removes against unregistered databases are never staged.
    pub(crate) fn plan<'a>(
        &self,
        runs: impl IntoIterator<Item = &'a BlockRun>,
        registry: &Registry,
        changes: &mut Changes,
    ) -> SupportUpdate {
        let mut pending: IndexMap<&Fact, Pending<'a>> = IndexMap::new();
        for run in runs {
            for fact in &run.bound {
                let entry = pending.entry(fact).or_insert(Pending {
                    gained: 0,
                    lost: 0,
                    tag: &run.tag,
                });
                if run.gained.contains(fact) {
                    entry.gained += 1;
                }
            }
            for fact in &run.lost {
                let entry = pending.entry(fact).or_insert(Pending {
                    gained: 0,
                    lost: 0,
                    tag: &run.tag,
                });
                entry.lost += 1;
                entry.tag = &run.tag;
            }
        }

        let mut update = SupportUpdate::default();
        for (fact, step) in pending {
            let (database, triple) = fact;
            let before = self.get(fact).unwrap_or(Support {
                count: 0,
                added: false,
            });
            let count = (before.count + step.gained).saturating_sub(step.lost);
            let stored = is_stored(registry, fact);

            let mut added = before.added;
            if count > 0 && !stored && registry.contains(database) {
                changes.stage(Change::add(database, triple.clone(), step.tag, changes.round()));
                added = true;
            } else if before.count == 0 && count > 0 {
                added = false;
            } else if count == 0 && before.count > 0 && before.added && stored {
                changes.stage(Change::remove(database, triple.clone(), step.tag, changes.round()));
            }
            if count != before.count || added != before.added {
                update.entries.push((fact.clone(), Support { count, added }));
            }
        }
        update
    }

    /// Install the entries of a committed plan.
    pub(crate) fn apply(&mut self, update: SupportUpdate) {
        for (fact, support) in update.entries {
            self.set(fact, support);
        }
    }

    /// Replace the entry for `fact`; a zero count drops it.
    pub(crate) fn set(&mut self, fact: Fact, support: Support) {
        if support.count == 0 {
            self.entries.shift_remove(&fact);
        } else {
            self.entries.insert(fact, support);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
