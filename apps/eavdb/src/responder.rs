//! # Responder
//!
//! Turns inbound protocol messages into Evaluation calls and Evaluation
//! results into outbound replies.
//!
//! Messages are a closed tagged enum; dispatch is an exhaustive match. The
//! responder owns at most one running [`Evaluation`] and the last parsed
//! rule document, which `eval` compiles.
//!
//! | message     | core operation                                   | replies            |
//! |-------------|--------------------------------------------------|--------------------|
//! | `event`     | `execute_actions` + `fixpoint`                   | `diff`             |
//! | `close`     | `close`                                          | none               |
//! | `parse`     | id reset + parse + build (diagnostics only)      | `parse`            |
//! | `eval`      | fresh evaluation, or `persist_session`           | `comments`, `diff` |
//! | `tokenInfo` | entity lookup across every database              | `comments`         |
//! | `findNode`  | prefix lookup in the browser database            | `findNode`         |

use crate::config::Config;
use crate::rules::{ParsedRules, RuleBuilder, parse_rules};
use eavdb_core::primitives::{EVENT_DATABASE, EVENT_TAG};
use eavdb_core::{
    BlockBuilder, Change, CompileError, Database, EavError, EntityId, Evaluation,
    FixpointReport, IdGenerator, Value, insert_fact,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// PROTOCOL
// =============================================================================

/// An inbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Message {
    /// Inject external facts into the event database.
    ///
    /// Entity ids are taken as given and share one numeric space with the
    /// ids the evaluation generates, which count up from
    /// `evaluation.id_seed`. Clients keep to ids below the seed; raise the
    /// seed in `eavdb.toml` to make room.
    Event { insert: Vec<(EntityId, Value, Value)> },
    /// Tear down the running evaluation.
    Close,
    /// Parse rule source and report diagnostics.
    Parse {
        #[serde(default)]
        code: String,
        #[serde(default)]
        generation: Option<u64>,
    },
    /// Compile the last parse and run it.
    Eval {
        #[serde(default)]
        persist: bool,
    },
    /// Every fact stored about one entity.
    TokenInfo { token_id: u64 },
    /// Keys below an entity in the browser database.
    FindNode {
        record: u64,
        #[serde(default)]
        attribute: Option<Value>,
        #[serde(default)]
        value: Option<Value>,
    },
}

/// A source range with a kind, as shown by an editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanInfo {
    pub id: String,
    pub kind: String,
    pub start: usize,
    pub end: usize,
}

/// Extra information keyed by span or token id.
pub type ExtraInfo = BTreeMap<String, serde_json::Value>;

/// An outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Reply {
    Parse {
        generation: Option<u64>,
        text: String,
        spans: Vec<SpanInfo>,
        extra_info: ExtraInfo,
    },
    Comments {
        spans: Vec<SpanInfo>,
        extra_info: ExtraInfo,
    },
    FindNode {
        record: u64,
        attribute: Option<Value>,
        value: Option<Value>,
        nodes: Vec<Value>,
    },
    /// Effective changes to the browser database.
    Diff {
        database: String,
        changes: Vec<Change>,
    },
    Error {
        message: String,
    },
}

impl Reply {
    fn error(error: &EavError) -> Self {
        Self::Error {
            message: error.to_string(),
        }
    }
}

/// Turn compile errors into error spans plus their messages.
fn inject_errors(errors: &[CompileError], spans: &mut Vec<SpanInfo>, extra: &mut ExtraInfo) {
    for (index, error) in errors.iter().enumerate() {
        let id = format!("error-{}", index);
        let (start, end) = error.span.map_or((0, 0), |s| (s.start, s.end));
        spans.push(SpanInfo {
            id: id.clone(),
            kind: "error".to_string(),
            start,
            end,
        });
        extra.insert(id, serde_json::json!({ "message": error.message }));
    }
}

// =============================================================================
// RESPONDER
// =============================================================================

/// Message dispatcher owning the running evaluation.
#[derive(Debug)]
pub struct Responder {
    config: Config,
    builder: RuleBuilder,
    ids: IdGenerator,
    evaluation: Option<Evaluation>,
    last_parse: Option<ParsedRules>,
}

impl Responder {
    /// Create a responder with no evaluation and nothing parsed.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let ids = IdGenerator::new(config.evaluation.id_seed);
        Self {
            config,
            builder: RuleBuilder,
            ids,
            evaluation: None,
            last_parse: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The running evaluation, if any.
    #[must_use]
    pub fn evaluation(&self) -> Option<&Evaluation> {
        self.evaluation.as_ref()
    }

    /// Decode and handle one JSON message.
    pub fn handle_json(&mut self, json: &str) -> Vec<Reply> {
        match serde_json::from_str::<Message>(json) {
            Ok(message) => self.handle(message),
            Err(e) => vec![Reply::Error {
                message: format!("Invalid message: {}", e),
            }],
        }
    }

    /// Handle one message. Failures become a trailing `error` reply.
    pub fn handle(&mut self, message: Message) -> Vec<Reply> {
        let mut replies = Vec::new();
        if let Err(error) = self.dispatch(message, &mut replies) {
            tracing::warn!(%error, "message failed");
            replies.push(Reply::error(&error));
        }
        replies
    }

    fn dispatch(&mut self, message: Message, replies: &mut Vec<Reply>) -> Result<(), EavError> {
        match message {
            Message::Event { insert } => self.on_event(insert, replies),
            Message::Close => self.on_close(),
            Message::Parse { code, generation } => self.on_parse(&code, generation, replies),
            Message::Eval { persist } => self.on_eval(persist, replies),
            Message::TokenInfo { token_id } => self.on_token_info(token_id, replies),
            Message::FindNode {
                record,
                attribute,
                value,
            } => self.on_find_node(record, attribute, value, replies),
        }
    }

    fn on_event(
        &mut self,
        insert: Vec<(EntityId, Value, Value)>,
        replies: &mut Vec<Reply>,
    ) -> Result<(), EavError> {
        let Some(evaluation) = self.evaluation.as_mut() else {
            tracing::debug!("event ignored: no evaluation running");
            return Ok(());
        };
        tracing::info!(facts = insert.len(), "event");

        let actions: Vec<_> = insert
            .into_iter()
            .map(|(e, a, v)| insert_fact(e, a, v, EVENT_TAG, &[EVENT_DATABASE]))
            .collect();
        let execution = evaluation.execute_actions(&actions)?;
        for rejected in &execution.errors {
            replies.push(Reply::Error {
                message: format!("event fact {}: {}", rejected.index, rejected.error),
            });
        }
        let report = evaluation.fixpoint(Some(execution.changes))?;
        self.push_diff(&report, replies);
        Ok(())
    }

    fn on_close(&mut self) -> Result<(), EavError> {
        if let Some(mut evaluation) = self.evaluation.take() {
            let snapshots = evaluation.close()?;
            tracing::info!(databases = snapshots.len(), "evaluation dropped");
        }
        Ok(())
    }

    fn on_parse(
        &mut self,
        code: &str,
        generation: Option<u64>,
        replies: &mut Vec<Reply>,
    ) -> Result<(), EavError> {
        self.ids.reset(self.config.evaluation.id_seed)?;
        let parsed = parse_rules(code);
        let built = self.builder.build(&parsed.doc, &self.ids);

        let mut spans = Vec::new();
        let mut extra_info = ExtraInfo::new();
        let mut errors = parsed.errors.clone();
        errors.extend(built.errors);
        inject_errors(&errors, &mut spans, &mut extra_info);
        for block in &built.blocks {
            extra_info.insert(
                block.id().to_string(),
                serde_json::json!({
                    "name": block.name(),
                    "watches": block.watches().len(),
                    "bind": block.bind_actions().len(),
                    "commit": block.commit_actions().len(),
                    "singleRun": block.is_single_run(),
                }),
            );
        }

        replies.push(Reply::Parse {
            generation,
            text: parsed.text.clone(),
            spans,
            extra_info,
        });
        self.last_parse = Some(parsed);
        Ok(())
    }

    fn on_eval(&mut self, persist: bool, replies: &mut Vec<Reply>) -> Result<(), EavError> {
        let Some(doc) = self.last_parse.as_ref().map(|parsed| parsed.doc.clone()) else {
            return Err(EavError::InvalidState("nothing has been parsed".to_string()));
        };

        if persist {
            if let Some(evaluation) = self.evaluation.as_mut() {
                let reload =
                    evaluation.persist_session(&self.builder, &doc, &self.config.session)?;
                push_comments(&reload.errors, replies);
                self.push_diff(&reload.report, replies);
                return Ok(());
            }
        }

        self.on_close()?;
        self.ids.reset(self.config.evaluation.id_seed)?;
        let built = self.builder.build(&doc, &self.ids);
        push_comments(&built.errors, replies);

        let mut evaluation = Evaluation::with_config(self.config.evaluation.clone(), self.ids.clone());
        let mut blocks = Some(built.blocks);
        for name in &self.config.databases {
            let db = if *name == self.config.session {
                Database::with_blocks(name.as_str(), blocks.take().unwrap_or_default())
            } else {
                Database::new(name.as_str())
            };
            evaluation.register_database(name, db)?;
        }
        let report = evaluation.fixpoint(None);
        self.evaluation = Some(evaluation);
        self.push_diff(&report?, replies);
        Ok(())
    }

    fn on_token_info(&self, token_id: u64, replies: &mut Vec<Reply>) -> Result<(), EavError> {
        let evaluation = self.running()?;
        let entity = EntityId(token_id);

        let mut facts = Vec::new();
        for db in evaluation.databases().iter() {
            let level = db.lookup(Some(entity), None, None);
            for attribute in level.keys() {
                facts.push(serde_json::json!({
                    "database": db.name(),
                    "attribute": attribute,
                    "values": level.descend(&attribute).keys(),
                }));
            }
        }

        let mut extra_info = ExtraInfo::new();
        extra_info.insert(token_id.to_string(), serde_json::json!({ "facts": facts }));
        replies.push(Reply::Comments {
            spans: Vec::new(),
            extra_info,
        });
        Ok(())
    }

    /// Keys of the first (or given) attribute of `record`; with a value
    /// given, that value if it is stored.
    fn on_find_node(
        &self,
        record: u64,
        attribute: Option<Value>,
        value: Option<Value>,
        replies: &mut Vec<Reply>,
    ) -> Result<(), EavError> {
        let db = self.running()?.get_database(&self.config.browser)?;
        let mut level = db.lookup(Some(EntityId(record)), attribute.as_ref(), None);
        if attribute.is_none() {
            if let Some(first) = level.first_key() {
                level = level.descend(&first);
            }
        }
        let nodes = match &value {
            Some(v) if !level.descend(v).is_empty() => vec![v.clone()],
            Some(_) => Vec::new(),
            None => level.keys(),
        };
        replies.push(Reply::FindNode {
            record,
            attribute,
            value,
            nodes,
        });
        Ok(())
    }

    fn running(&self) -> Result<&Evaluation, EavError> {
        self.evaluation
            .as_ref()
            .ok_or_else(|| EavError::InvalidState("no evaluation running".to_string()))
    }

    fn push_diff(&self, report: &FixpointReport, replies: &mut Vec<Reply>) {
        let changes: Vec<Change> = report
            .diff
            .for_database(&self.config.browser)
            .cloned()
            .collect();
        if !changes.is_empty() {
            replies.push(Reply::Diff {
                database: self.config.browser.clone(),
                changes,
            });
        }
    }
}

fn push_comments(errors: &[CompileError], replies: &mut Vec<Reply>) {
    if errors.is_empty() {
        return;
    }
    let mut spans = Vec::new();
    let mut extra_info = ExtraInfo::new();
    inject_errors(errors, &mut spans, &mut extra_info);
    replies.push(Reply::Comments { spans, extra_info });
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_tagged() {
        let message: Message =
            serde_json::from_str(r#"{"type": "tokenInfo", "tokenId": 7}"#).expect("parse");
        assert_eq!(message, Message::TokenInfo { token_id: 7 });

        let message: Message = serde_json::from_str(
            r#"{"type": "event", "insert": [[1, "clicked", 1], [2, "name", {"id": 1}]]}"#,
        )
        .expect("parse");
        assert!(matches!(
            &message,
            Message::Event { insert } if insert[1].2 == Value::Id(EntityId(1))
        ));
    }

    #[test]
    fn unknown_type_is_an_error_reply() {
        let mut responder = Responder::new(Config::default());
        let replies = responder.handle_json(r#"{"type": "dance"}"#);
        assert!(matches!(replies.as_slice(), [Reply::Error { .. }]));
    }

    #[test]
    fn replies_serialize_with_type() {
        let reply = Reply::Comments {
            spans: Vec::new(),
            extra_info: ExtraInfo::new(),
        };
        let json = serde_json::to_value(&reply).expect("serialize");
        assert_eq!(json["type"], "comments");
        assert!(json.get("extraInfo").is_some());
    }
}
