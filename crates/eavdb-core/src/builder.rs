//! # Builder Seam
//!
//! Parsing source text and compiling it into Blocks happens outside the
//! engine. A builder hands the engine a list of [`Block`]s plus compile
//! diagnostics; the engine keeps only the Blocks.
//!
//! Builders draw Block and entity ids from the [`IdGenerator`] they are
//! given, which the caller resets before every build cycle.

use crate::block::Block;
use crate::ids::IdGenerator;
use serde::{Deserialize, Serialize};

/// A byte range in the source a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A non-fatal compile diagnostic.
///
/// The Blocks it affects are left out of the build; everything else still
/// builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileError {
    pub message: String,
    pub span: Option<Span>,
}

impl CompileError {
    #[must_use]
    pub fn new(message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

/// The result of one build.
#[derive(Debug, Default)]
pub struct BuildOutput {
    pub blocks: Vec<Block>,
    pub errors: Vec<CompileError>,
}

/// Compiles a parsed document into Blocks.
pub trait BlockBuilder {
    /// The parsed document; opaque to the engine.
    type Doc;

    /// Build every Block `doc` describes, drawing ids from `ids`.
    fn build(&self, doc: &Self::Doc, ids: &IdGenerator) -> BuildOutput;
}
