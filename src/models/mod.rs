pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ModelError;
use crate::quality::must_extract_json_obj;
use crate::terminology::TermUpdate;

/// Decoded reply of one translation call.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct ModelReply {
    #[serde(default, alias = "translatedText", alias = "translation")]
    pub translated_text: String,
    #[serde(default, alias = "newDictionaryEntries", alias = "new_terms")]
    pub new_dictionary_entries: Vec<TermUpdate>,
}

impl ModelReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            translated_text: text.into(),
            new_dictionary_entries: Vec::new(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        let value =
            must_extract_json_obj(raw).map_err(|e| ModelError::OutputFormat(format!("{e:#}")))?;
        let reply: ModelReply = serde_json::from_value(value)
            .map_err(|e| ModelError::OutputFormat(format!("schema_mismatch: {e}")))?;
        if reply.translated_text.trim().is_empty() {
            return Err(ModelError::OutputFormat("empty translated_text".to_string()));
        }
        Ok(reply)
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    /// One request, no internal retries.
    async fn invoke(&self, prompt: &str, temperature: f32) -> Result<ModelReply, ModelError>;
}

/// Builds one model client per credential.
pub trait ChatModelFactory: Send + Sync {
    fn create(&self, credential: &str) -> anyhow::Result<Arc<dyn ChatModel>>;
}
