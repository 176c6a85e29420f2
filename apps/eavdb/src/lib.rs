//! # eavdb
//!
//! The application side of eavdb: the message responder in front of an
//! [`eavdb_core::Evaluation`], the JSON rule format, configuration, the
//! HTTP API and the CLI.

pub mod api;
pub mod cli;
pub mod config;
pub mod responder;
pub mod rules;
