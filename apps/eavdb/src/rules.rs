//! # Rule Documents
//!
//! The JSON source format compiled into Blocks, and the [`RuleBuilder`] that
//! compiles it.
//!
//! ```json
//! {"blocks": [{
//!     "name": "derive",
//!     "watch":  [{"db": "a", "e": "?e", "a": "count", "v": "?v"}],
//!     "bind":   [{"op": "insert", "e": "?e", "a": "derived", "v": "?v", "scopes": ["b"]}],
//!     "commit": []
//! }]}
//! ```
//!
//! A term is `"?name"` (variable), `"_"` (wildcard, watches only), any other
//! string (text), an integer, or `{"id": n}` (entity reference).
//!
//! Syntax errors stop the parse and carry the offending source position.
//! Semantic errors drop only the Block they occur in.

use eavdb_core::{
    Action, Block, BlockBuilder, BuildOutput, CompileError, IdGenerator, Pattern, Span, Term,
    Value, Verb,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// DOCUMENT
// =============================================================================

/// A parsed rule document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDoc {
    #[serde(default)]
    pub blocks: Vec<RuleBlock>,
}

/// One rule as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RuleBlock {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub single_run: bool,
    #[serde(default)]
    pub watch: Vec<PatternSpec>,
    #[serde(default)]
    pub bind: Vec<ActionSpec>,
    #[serde(default)]
    pub commit: Vec<ActionSpec>,
}

/// A watch pattern as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternSpec {
    pub db: String,
    pub e: serde_json::Value,
    pub a: serde_json::Value,
    pub v: serde_json::Value,
}

/// An action as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionSpec {
    #[serde(default = "default_verb")]
    pub op: Verb,
    pub e: serde_json::Value,
    pub a: serde_json::Value,
    pub v: serde_json::Value,
    pub scopes: Vec<String>,
    /// Provenance tag; defaults to the Block name.
    #[serde(default)]
    pub tag: Option<String>,
}

fn default_verb() -> Verb {
    Verb::Insert
}

/// Source text, the document read from it, and syntax errors.
#[derive(Debug, Clone, Default)]
pub struct ParsedRules {
    pub text: String,
    pub doc: RuleDoc,
    pub errors: Vec<CompileError>,
}

/// Parse `code`. Empty source is an empty document.
#[must_use]
pub fn parse_rules(code: &str) -> ParsedRules {
    let mut parsed = ParsedRules {
        text: code.to_string(),
        ..ParsedRules::default()
    };
    if code.trim().is_empty() {
        return parsed;
    }
    match serde_json::from_str::<RuleDoc>(code) {
        Ok(doc) => parsed.doc = doc,
        Err(e) => {
            let start = byte_offset(code, e.line(), e.column());
            let end = code[start..]
                .char_indices()
                .nth(1)
                .map_or(code.len(), |(i, _)| start + i);
            parsed
                .errors
                .push(CompileError::new(e.to_string(), Some(Span::new(start, end))));
        }
    }
    parsed
}

/// Byte offset of a 1-based line/column position, clamped to the text.
fn byte_offset(text: &str, line: usize, column: usize) -> usize {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    let line_text = text[line_start..].split('\n').next().unwrap_or("");
    let within = line_text
        .char_indices()
        .nth(column.saturating_sub(1))
        .map_or(line_text.len(), |(i, _)| i);
    line_start + within
}

// =============================================================================
// BUILDER
// =============================================================================

/// Compiles [`RuleDoc`]s into Blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBuilder;

impl BlockBuilder for RuleBuilder {
    type Doc = RuleDoc;

    fn build(&self, doc: &RuleDoc, ids: &IdGenerator) -> BuildOutput {
        let mut output = BuildOutput::default();
        for rule in &doc.blocks {
            // Ids are drawn even for rejected Blocks so a fix in one rule
            // does not renumber the others.
            let id = ids.next_block();
            let name = if rule.name.is_empty() {
                format!("block-{}", id.0)
            } else {
                rule.name.clone()
            };
            match compile_block(rule, &name, id) {
                Ok(block) => output.blocks.push(block),
                Err(message) => {
                    tracing::debug!(block = %name, %message, "rule rejected");
                    output
                        .errors
                        .push(CompileError::new(format!("block '{}': {}", name, message), None));
                }
            }
        }
        output
    }
}

fn compile_block(rule: &RuleBlock, name: &str, id: eavdb_core::BlockId) -> Result<Block, String> {
    let mut block = Block::new(id, name);
    if rule.single_run {
        block = block.single_run();
    }

    let mut bound: BTreeSet<String> = BTreeSet::new();
    for (index, spec) in rule.watch.iter().enumerate() {
        let pattern = compile_pattern(spec).map_err(|e| format!("watch {}: {}", index, e))?;
        for term in [&pattern.entity, &pattern.attribute, &pattern.value] {
            if let Term::Var(var) = term {
                bound.insert(var.clone());
            }
        }
        block = block.with_watch(pattern);
    }

    for (index, spec) in rule.bind.iter().enumerate() {
        let action = compile_action(spec, name, &bound).map_err(|e| format!("bind {}: {}", index, e))?;
        block = block.with_bind(action);
    }
    for (index, spec) in rule.commit.iter().enumerate() {
        let action =
            compile_action(spec, name, &bound).map_err(|e| format!("commit {}: {}", index, e))?;
        block = block.with_commit(action);
    }
    Ok(block)
}

fn compile_pattern(spec: &PatternSpec) -> Result<Pattern, String> {
    if spec.db.is_empty() {
        return Err("missing database".to_string());
    }
    let entity = term(&spec.e)?;
    if let Term::Const(value) = &entity {
        if value.as_entity().is_none() {
            return Err(format!("entity must be an id, got {}", value));
        }
    }
    let attribute = term(&spec.a)?;
    check_attribute(&attribute)?;
    Ok(Pattern {
        database: spec.db.clone(),
        entity,
        attribute,
        value: term(&spec.v)?,
    })
}

fn compile_action(spec: &ActionSpec, block: &str, bound: &BTreeSet<String>) -> Result<Action, String> {
    if spec.scopes.is_empty() {
        return Err("no target scopes".to_string());
    }
    let terms = [term(&spec.e)?, term(&spec.a)?, term(&spec.v)?];
    for t in &terms {
        match t {
            Term::Any => return Err("wildcard cannot be written".to_string()),
            Term::Var(var) if !bound.contains(var) => {
                return Err(format!("variable ?{} is not bound by any watch", var));
            }
            _ => {}
        }
    }
    check_attribute(&terms[1])?;
    let [entity, attribute, value] = terms;
    let tag = spec.tag.clone().unwrap_or_else(|| block.to_string());
    let scopes: Vec<&str> = spec.scopes.iter().map(String::as_str).collect();
    Ok(match spec.op {
        Verb::Insert => Action::insert(entity, attribute, value, &tag, &scopes),
        Verb::Remove => Action::remove(entity, attribute, value, &tag, &scopes),
    })
}

fn check_attribute(attribute: &Term) -> Result<(), String> {
    match attribute {
        Term::Const(value) if !value.is_attribute() => {
            Err(format!("attribute must be text or an id, got {}", value))
        }
        _ => Ok(()),
    }
}

/// Read one term of a rule.
fn term(json: &serde_json::Value) -> Result<Term, String> {
    match json {
        serde_json::Value::String(s) if s == "_" => Ok(Term::Any),
        serde_json::Value::String(s) => match s.strip_prefix('?') {
            Some("") => Err("empty variable name".to_string()),
            Some(var) => Ok(Term::var(var)),
            None => Ok(Term::constant(s.as_str())),
        },
        other => serde_json::from_value::<Value>(other.clone())
            .map(Term::Const)
            .map_err(|_| format!("unsupported term {}", other)),
    }
}

// =============================================================================
// TESTS
// =============================================================================
