// callplan-core/src/llm/mod.rs

//! The LLM transport seam.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod grammar;
pub mod llamacpp;

/// One chat message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Submits a conversation and receives the completion text.
///
/// When `json_schema` is given and the backend supports constrained
/// decoding, the implementation is responsible for translating the schema
/// into whatever the backend needs (e.g. a GBNF grammar).
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, messages: &[Message], json_schema: Option<&str>) -> Result<String>;
}
