#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use asset_localizer::error::{ModelError, RequestErrorKind};
use asset_localizer::formats::Document;
use asset_localizer::models::{ChatModel, ModelReply};
use asset_localizer::pipeline::{PipelineSettings, PromptSet, TranslationPipeline};
use asset_localizer::terminology::Dictionary;

pub fn doc(value: serde_json::Value) -> Document {
    value.as_object().cloned().expect("object literal")
}

pub fn reply_json(text: &str) -> String {
    json!({"translated_text": text, "new_dictionary_entries": []}).to_string()
}

pub fn pipeline_with(dictionary: Arc<Dictionary>, settings: PipelineSettings) -> TranslationPipeline {
    TranslationPipeline::new(settings, PromptSet::default(), dictionary).unwrap()
}

#[derive(Clone, Debug)]
pub enum Step {
    Raw(String),
    Fail(RequestErrorKind),
}

/// Plays back canned replies in order; the last one repeats.
pub struct ScriptedModel {
    steps: Mutex<VecDeque<Step>>,
    pub calls: Mutex<Vec<(String, f32)>>,
}

impl ScriptedModel {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Step::Raw(reply_json(t))).collect())
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn temperatures(&self) -> Vec<f32> {
        self.calls.lock().iter().map(|(_, t)| *t).collect()
    }

    pub fn prompt(&self, i: usize) -> String {
        self.calls.lock()[i].0.clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, prompt: &str, temperature: f32) -> Result<ModelReply, ModelError> {
        self.calls.lock().push((prompt.to_string(), temperature));
        let step = {
            let mut steps = self.steps.lock();
            if steps.len() > 1 {
                steps.pop_front()
            } else {
                steps.front().cloned()
            }
        };
        match step {
            Some(Step::Raw(raw)) => ModelReply::parse(&raw),
            Some(Step::Fail(kind)) => Err(ModelError::request(kind, "scripted failure")),
            None => Err(ModelError::OutputFormat("script is empty".to_string())),
        }
    }
}

pub fn source_of(prompt: &str) -> &str {
    prompt.rsplit("SOURCE:\n").next().unwrap_or_default()
}

/// Returns the source segment of the prompt prefixed with its tag, so every
/// placeholder survives. Sources containing "BOOM" fail with a rate limit.
pub struct EchoModel {
    tag: String,
    pub calls: AtomicUsize,
}

impl EchoModel {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ChatModel for EchoModel {
    fn name(&self) -> &str {
        &self.tag
    }

    async fn invoke(&self, prompt: &str, _temperature: f32) -> Result<ModelReply, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let source = source_of(prompt);
        if source.contains("BOOM") {
            return Err(ModelError::request(RequestErrorKind::RateLimited, "429 Too Many Requests"));
        }
        Ok(ModelReply::new(format!("{}:{source}", self.tag)))
    }
}
