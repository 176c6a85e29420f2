//! # CLI Command Implementations

use crate::api;
use crate::config::Config;
use crate::responder::{Message, Reply, Responder};
use crate::rules::{RuleBuilder, parse_rules};
use eavdb_core::{
    BlockBuilder, CompileError, EavError, IdGenerator, canonical_checksum, canonical_crypto_hash,
    export_canonical,
};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a rule document (10 MB).
const MAX_RULES_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum size of a message script (100 MB).
const MAX_SCRIPT_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), EavError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| EavError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(EavError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize `path` and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, EavError> {
    let canonical = path.canonicalize().map_err(|e| {
        EavError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(EavError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent of an output path, which must be a directory.
fn validate_output_path(path: &Path) -> Result<PathBuf, EavError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        EavError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(EavError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| EavError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Validate and read a text file.
pub fn read_input(path: &Path, max_size: u64) -> Result<String, EavError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, max_size)?;
    std::fs::read_to_string(&validated)
        .map_err(|e| EavError::IoError(format!("Read '{}': {}", path.display(), e)))
}

// =============================================================================
// SCRIPTED EVALUATION
// =============================================================================

/// Feed every non-blank line of `script` to `responder`, collecting replies.
pub fn run_script(responder: &mut Responder, script: &str) -> Vec<Reply> {
    script
        .lines()
        .filter(|line| !line.trim().is_empty())
        .flat_map(|line| responder.handle_json(line))
        .collect()
}

/// Parse and evaluate `rules`, then feed the optional script.
///
/// Error replies are logged; the responder is returned either way so the
/// caller can inspect whatever state was reached.
pub fn evaluate(
    config: Config,
    rules: &Path,
    script: Option<&Path>,
) -> Result<Responder, EavError> {
    let code = read_input(rules, MAX_RULES_FILE_SIZE)?;
    let mut responder = Responder::new(config);

    let mut replies = responder.handle(Message::Parse {
        code,
        generation: None,
    });
    replies.extend(responder.handle(Message::Eval { persist: false }));
    if let Some(script) = script {
        let text = read_input(script, MAX_SCRIPT_FILE_SIZE)?;
        replies.extend(run_script(&mut responder, &text));
    }

    for reply in &replies {
        if let Reply::Error { message } = reply {
            tracing::warn!("{}", message);
        }
    }
    if responder.evaluation().is_none() {
        return Err(EavError::InvalidState(
            "evaluation did not start".to_string(),
        ));
    }
    Ok(responder)
}

// =============================================================================
// SERVE COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_serve(config: Config) -> Result<(), EavError> {
    let addr = config.address();

    println!("eavdb server starting...");
    println!();
    println!("Configuration:");
    println!("  Address:    {}", addr);
    println!("  Databases:  {}", config.databases.join(", "));
    println!("  Max passes: {}", config.evaluation.max_passes);
    println!();
    println!("Endpoints:");
    println!("  POST /message          - Send a protocol message");
    println!("  GET  /status           - Evaluation status");
    println!("  GET  /databases/{{name}} - Dump one database");
    println!("  GET  /health           - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(&addr, Responder::new(config)).await
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Run a message script and print every reply as one JSON line.
pub fn cmd_run(config: Config, script: &Path) -> Result<(), EavError> {
    let text = read_input(script, MAX_SCRIPT_FILE_SIZE)?;
    let mut responder = Responder::new(config);

    let mut failures = 0usize;
    for reply in run_script(&mut responder, &text) {
        if matches!(reply, Reply::Error { .. }) {
            failures += 1;
        }
        let line = serde_json::to_string(&reply)
            .map_err(|e| EavError::SerializationError(e.to_string()))?;
        println!("{}", line);
    }

    tracing::info!(failures, "script finished");
    Ok(())
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

/// Parse and compile a rule document. Any diagnostic fails the command.
pub fn cmd_check(config: &Config, rules: &Path, json_mode: bool) -> Result<(), EavError> {
    let code = read_input(rules, MAX_RULES_FILE_SIZE)?;
    let parsed = parse_rules(&code);
    let ids = IdGenerator::new(config.evaluation.id_seed);
    let built = RuleBuilder.build(&parsed.doc, &ids);

    let errors: Vec<CompileError> = parsed.errors.into_iter().chain(built.errors).collect();

    if json_mode {
        let output = serde_json::json!({
            "blocks": built.blocks.iter().map(|b| b.name()).collect::<Vec<_>>(),
            "errors": errors,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
    } else {
        println!("Blocks: {}", built.blocks.len());
        for block in &built.blocks {
            println!("  {} {}", block.id(), block.name());
        }
        for error in &errors {
            match error.span {
                Some(span) => println!("error [{}..{}]: {}", span.start, span.end, error.message),
                None => println!("error: {}", error.message),
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(EavError::InvalidState(format!(
            "{} error(s) in {}",
            errors.len(),
            rules.display()
        )))
    }
}

// =============================================================================
// HASH COMMAND
// =============================================================================

/// Print the checksum and BLAKE3 hash of every database.
pub fn cmd_hash(
    config: Config,
    rules: &Path,
    script: Option<&Path>,
    json_mode: bool,
) -> Result<(), EavError> {
    let responder = evaluate(config, rules, script)?;
    let Some(evaluation) = responder.evaluation() else {
        return Err(EavError::InvalidState("no evaluation running".to_string()));
    };

    let mut rows = Vec::new();
    for db in evaluation.databases().iter() {
        rows.push((
            db.name().to_string(),
            db.len(),
            canonical_checksum(db),
            canonical_crypto_hash(db)?,
        ));
    }

    if json_mode {
        let output: Vec<_> = rows
            .iter()
            .map(|(name, triples, checksum, hash)| {
                serde_json::json!({
                    "database": name,
                    "triples": triples,
                    "checksum": checksum,
                    "blake3": hash,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Round: {}", evaluation.round());
    for (name, triples, checksum, hash) in &rows {
        println!("{:<12} {:>6} triples  checksum {:016x}  blake3 {}", name, triples, checksum, hash);
    }
    Ok(())
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Write one database of the evaluated rules in canonical form.
pub fn cmd_export(
    config: Config,
    rules: &Path,
    script: Option<&Path>,
    database: &str,
    output: &Path,
) -> Result<(), EavError> {
    let validated_output = validate_output_path(output)?;
    let responder = evaluate(config, rules, script)?;
    let Some(evaluation) = responder.evaluation() else {
        return Err(EavError::InvalidState("no evaluation running".to_string()));
    };

    let db = evaluation.get_database(database)?;
    let data = export_canonical(db)?;
    println!("Checksum: {}", canonical_checksum(db));

    std::fs::write(&validated_output, &data)
        .map_err(|e| EavError::IoError(format!("Write file: {}", e)))?;

    println!("Exported {} bytes to {:?}", data.len(), validated_output);
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
