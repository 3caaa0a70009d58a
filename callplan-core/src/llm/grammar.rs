// callplan-core/src/llm/grammar.rs

//! JSON Schema → GBNF grammar conversion with a content-addressed cache.
//!
//! The conversion itself is delegated to an external command (by default the
//! `json_schema_to_grammar.py` script shipped with llama.cpp) that reads the
//! schema on stdin and writes the grammar on stdout. Results are cached by
//! the SHA-256 of the canonicalized schema, so reordered-but-equal schemas
//! hit the same entry.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{PoisonError, RwLock};

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::utils::canonical_json;

/// The llama.cpp schema converter invocation; `-` reads from stdin.
pub const DEFAULT_COMMAND: &[&str] = &["python3", "json_schema_to_grammar.py", "-"];

pub struct GrammarConverter {
    command: Vec<String>,
    cache: RwLock<HashMap<String, String>>,
}

impl GrammarConverter {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Converts a JSON Schema into a grammar, reusing a cached result when
    /// an equivalent schema was converted before.
    pub async fn convert(&self, json_schema: &str) -> Result<String> {
        let hash = schema_fingerprint(json_schema)?;

        let cached = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&hash)
            .cloned();
        if let Some(grammar) = cached {
            debug!("grammar found in cache");
            return Ok(grammar);
        }

        debug!("generating grammar from JSON schema");
        let grammar = self.run_converter(json_schema).await?;

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hash, grammar.clone());

        Ok(grammar)
    }

    async fn run_converter(&self, json_schema: &str) -> Result<String> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("grammar converter command is empty"))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to spawn grammar converter '{}'", program))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(json_schema.as_bytes())
                .await
                .context("failed to write schema to grammar converter")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("failed to run grammar converter")?;

        if !output.status.success() {
            return Err(anyhow!(
                "grammar converter exited with status {}",
                output.status
            ));
        }

        String::from_utf8(output.stdout).context("grammar converter produced invalid UTF-8")
    }
}

/// SHA-256 hex of the canonical (sorted-key) form of the schema, so key
/// order and whitespace do not fragment the cache.
fn schema_fingerprint(json_schema: &str) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_str(json_schema).context("schema for grammar conversion is not valid JSON")?;
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(&value).as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
