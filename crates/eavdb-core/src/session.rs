//! # Session Persistence
//!
//! Re-evaluating rule source while keeping the facts of a running
//! evaluation. The session database is taken out of the registry, given a
//! freshly built Block list, and registered again with its Index intact.
//!
//! The steps, in order:
//! 1. the session database is unregistered;
//! 2. the id counter is reset and the builder compiles the new Blocks; new
//!    single-run Blocks are marked dormant, so initialisation rules do not
//!    fire a second time over persisted state;
//! 3. every old session Block with bind actions releases its support and
//!    retracts the facts only it kept in place into a fresh `Changes` batch;
//! 4. the new Block list replaces the old one and the database is
//!    registered again, which places it last in evaluation order;
//! 5. a fixpoint commits the retractions and lets the new Blocks rebind.
//!
//! If the session database is missing nothing is touched. If the rebuild
//! fails the database goes back with its old Blocks.

use crate::block::BindContext;
use crate::builder::{BlockBuilder, BuildOutput, CompileError};
use crate::evaluation::{Evaluation, FixpointReport};
use crate::support::{Fact, Support};
use crate::EavError;
use indexmap::IndexMap;

/// Outcome of a persisting re-evaluation.
#[derive(Debug)]
pub struct SessionReload {
    /// Compile diagnostics; the affected Blocks were left out.
    pub errors: Vec<CompileError>,
    /// Where each old Block's retractions landed in the batch, and which
    /// bound facts were left in place.
    pub context: BindContext,
    pub report: FixpointReport,
}

impl Evaluation {
    /// Rebuild the Blocks of database `session` from `doc`, keeping its facts.
    pub fn persist_session<B: BlockBuilder>(
        &mut self,
        builder: &B,
        doc: &B::Doc,
        session: &str,
    ) -> Result<SessionReload, EavError> {
        self.ensure_open()?;
        let mut changes = self.create_changes()?;
        let mut db = self.unregister_database(session)?;

        let BuildOutput { blocks, errors } = match self.rebuild(builder, doc) {
            Ok(output) => output,
            Err(error) => {
                self.register_database(session, db)?;
                return Err(error);
            }
        };
        let installed = blocks.len();

        let mut owned: IndexMap<Fact, usize> = IndexMap::new();
        for block in db.blocks() {
            for fact in block.bound_facts() {
                *owned.entry(fact.clone()).or_default() += 1;
            }
        }
        let mut context = BindContext::default();
        for (fact, own) in owned {
            let before = self.support_mut().get(&fact).unwrap_or(Support {
                count: own,
                added: false,
            });
            let remaining = before.count.saturating_sub(own);
            let (database, _) = &fact;
            let reachable = database == session || self.databases().contains(database);
            if remaining > 0 || !before.added || !reachable {
                context.retained.insert(fact.clone());
            }
            self.support_mut().set(
                fact,
                Support {
                    count: remaining,
                    added: before.added,
                },
            );
        }

        let mut retracted = 0;
        for block in db
            .blocks_mut()
            .iter_mut()
            .filter(|block| !block.bind_actions().is_empty())
        {
            retracted += block.update_binds(&mut context, &mut changes);
        }

        let previous = db.replace_blocks(blocks);
        self.register_database(session, db)?;
        tracing::info!(
            database = session,
            replaced = previous.len(),
            installed,
            retracted,
            retained = context.retained.len(),
            compile_errors = errors.len(),
            "session blocks replaced"
        );

        let report = self.fixpoint(Some(changes))?;
        Ok(SessionReload {
            errors,
            context,
            report,
        })
    }

    /// Reset the id counter and build a Block list with its single-run
    /// Blocks already dormant.
    fn rebuild<B: BlockBuilder>(&self, builder: &B, doc: &B::Doc) -> Result<BuildOutput, EavError> {
        self.reset_ids(self.config().id_seed)?;
        let mut output = builder.build(doc, self.ids());
        for block in output.blocks.iter_mut().filter(|block| block.is_single_run()) {
            block.mark_dormant()?;
        }
        Ok(output)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, Term};
    use crate::block::{Block, Pattern};
    use crate::database::Database;
    use crate::ids::IdGenerator;
    use crate::{BlockId, EntityId, Value};

    /// Builds one maintained rule copying `count` facts from "event" to
    /// "session", plus one single-run init Block.
    struct CopyRules {
        attribute: &'static str,
    }

    impl BlockBuilder for CopyRules {
        type Doc = ();

        fn build(&self, _doc: &(), ids: &IdGenerator) -> BuildOutput {
            let copy = Block::new(ids.next_block(), "copy")
                .with_watch(Pattern::new(
                    "event",
                    Term::var("e"),
                    Term::constant("count"),
                    Term::var("v"),
                ))
                .with_bind(Action::insert(
                    Term::var("e"),
                    Term::constant(self.attribute),
                    Term::var("v"),
                    "copy",
                    &["session"],
                ));
            let init = Block::new(ids.next_block(), "init").single_run().with_commit(Action::insert(
                Term::constant(ids.next_entity()),
                Term::constant("booted"),
                Term::constant(1),
                "init",
                &["session"],
            ));
            BuildOutput {
                blocks: vec![copy, init],
                errors: vec![CompileError::new("unused rule", None)],
            }
        }
    }

    fn running(builder: &CopyRules) -> Evaluation {
        let mut evaluation = Evaluation::new();
        let built = builder.build(&(), evaluation.ids());
        evaluation
            .register_database("event", Database::default())
            .expect("register");
        evaluation
            .register_database("session", Database::with_blocks("session", built.blocks))
            .expect("register");

        let mut changes = evaluation.create_changes().expect("changes");
        changes.add("event", EntityId(100), "count", 3, "event");
        evaluation.fixpoint(Some(changes)).expect("fixpoint");
        evaluation
    }

    fn has(evaluation: &Evaluation, e: EntityId, a: &str, v: Value) -> bool {
        evaluation
            .get_database("session")
            .expect("session")
            .index()
            .contains(e, &Value::text(a), &v)
    }

    #[test]
    fn rebinding_replaces_derived_facts() {
        let mut evaluation = running(&CopyRules { attribute: "total" });
        assert!(has(&evaluation, EntityId(100), "total", Value::Number(3)));

        let reload = evaluation
            .persist_session(&CopyRules { attribute: "sum" }, &(), "session")
            .expect("persist");

        assert_eq!(reload.errors.len(), 1);
        assert_eq!(reload.context.info.len(), 1);
        assert!(!has(&evaluation, EntityId(100), "total", Value::Number(3)));
        assert!(has(&evaluation, EntityId(100), "sum", Value::Number(3)));
    }

    #[test]
    fn single_run_blocks_stay_dormant_after_persist() {
        let builder = CopyRules { attribute: "total" };
        let mut evaluation = running(&builder);
        let before = evaluation.get_database("session").expect("session").len();

        evaluation
            .persist_session(&builder, &(), "session")
            .expect("persist");

        let session = evaluation.get_database("session").expect("session");
        assert_eq!(session.len(), before);
        assert!(session
            .blocks()
            .iter()
            .filter(|b| b.is_single_run())
            .all(|b| b.is_dormant()));
    }

    #[test]
    fn persisting_identical_source_reuses_ids() {
        let builder = CopyRules { attribute: "total" };
        let mut evaluation = running(&builder);
        let first: Vec<_> = evaluation
            .get_database("session")
            .expect("session")
            .blocks()
            .iter()
            .map(|b| b.id())
            .collect();

        evaluation
            .persist_session(&builder, &(), "session")
            .expect("persist");
        let second: Vec<_> = evaluation
            .get_database("session")
            .expect("session")
            .blocks()
            .iter()
            .map(|b| b.id())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn session_is_registered_again_last() {
        let builder = CopyRules { attribute: "total" };
        let mut evaluation = running(&builder);
        evaluation
            .register_database("browser", Database::default())
            .expect("register");

        evaluation
            .persist_session(&builder, &(), "session")
            .expect("persist");

        let names: Vec<&str> = evaluation.databases().names().collect();
        assert_eq!(names, vec!["event", "browser", "session"]);
        assert!(has(&evaluation, EntityId(100), "total", Value::Number(3)));
    }

    #[test]
    fn facts_bound_from_elsewhere_survive_a_reload() {
        let mut evaluation = running(&CopyRules { attribute: "total" });
        let mirror = Block::new(BlockId(99), "mirror")
            .with_watch(Pattern::new(
                "event",
                Term::var("e"),
                Term::constant("count"),
                Term::var("v"),
            ))
            .with_bind(Action::insert(
                Term::var("e"),
                Term::constant("total"),
                Term::var("v"),
                "mirror",
                &["session"],
            ));
        evaluation
            .register_database("mirror", Database::with_blocks("mirror", vec![mirror]))
            .expect("register");
        evaluation.fixpoint(None).expect("fixpoint");

        let reload = evaluation
            .persist_session(&CopyRules { attribute: "sum" }, &(), "session")
            .expect("persist");

        assert_eq!(reload.context.retained.len(), 1);
        assert!(has(&evaluation, EntityId(100), "total", Value::Number(3)));
        assert!(has(&evaluation, EntityId(100), "sum", Value::Number(3)));
    }

    #[test]
    fn missing_session_changes_nothing() {
        let builder = CopyRules { attribute: "total" };
        let mut evaluation = running(&builder);
        let next = evaluation.ids().peek();

        let result = evaluation.persist_session(&builder, &(), "elsewhere");
        assert!(matches!(result, Err(EavError::DatabaseNotFound(_))));
        assert_eq!(evaluation.ids().peek(), next);
    }
}
