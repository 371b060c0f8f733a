use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ItemError, ModelError};
use crate::freezer::{freeze_text, FreezeResult, PlaceholderMap};
use crate::models::ChatModel;
use crate::pipeline::config::{ExhaustionPolicy, PipelineSettings};
use crate::pipeline::prompts::{render_template, PromptSet};
use crate::pipeline::trace::TraceWriter;
use crate::quality::{validate_placeholders, PlaceholderReport};
use crate::retriever::context_lines;
use crate::terminology::{Dictionary, DictionarySnapshot, TermApplyEvent, TermUpdate};
use crate::textutil::{is_trivial_placeholder_text, TargetScript};

pub const TEMPERATURE_STEP: f32 = 0.1;
pub const MAX_TEMPERATURE: f32 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Tokenized,
    Retrieved,
    AwaitingModel,
    NeedsRetry,
    Validated,
    Restored,
    RestoredWithWarnings,
}

/// Why an attempt did not validate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptFailure {
    OutputFormat(String),
    Placeholders(PlaceholderReport),
}

impl AttemptFailure {
    pub fn correction_note(&self) -> String {
        match self {
            AttemptFailure::OutputFormat(detail) => format!(
                "Your previous reply broke the output format ({detail}). \
                 Reply with exactly one JSON object matching the schema and nothing else."
            ),
            AttemptFailure::Placeholders(report) => format!(
                "Your previous translation broke the token rules ({}). \
                 Every listed token must appear exactly once and no other [P<n>] token may appear.",
                report.summary()
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetryState {
    /// Attempts made so far.
    pub attempt: u32,
    pub temperature: f32,
    pub notes: String,
}

impl RetryState {
    pub fn initial(temperature: f32) -> Self {
        Self {
            attempt: 0,
            temperature,
            notes: String::new(),
        }
    }

    #[must_use]
    pub fn advance(&self, failure: &AttemptFailure) -> Self {
        Self {
            attempt: self.attempt + 1,
            temperature: (self.temperature + TEMPERATURE_STEP).min(MAX_TEMPERATURE),
            notes: failure.correction_note(),
        }
    }

    pub fn exhausted(&self, max_attempts: u32) -> bool {
        self.attempt >= max_attempts
    }
}

/// One string on its way through the pipeline.
#[derive(Clone, Debug)]
pub struct TranslationUnit {
    pub source_text: String,
    pub frozen: FreezeResult,
    pub context: Vec<String>,
    pub retry: RetryState,
    pub stage: Stage,
    pub translated_text: Option<String>,
    pub report: PlaceholderReport,
    pub restored_text: Option<String>,
}

impl TranslationUnit {
    pub fn tokenize(source: &str) -> Self {
        Self {
            source_text: source.to_string(),
            frozen: freeze_text(source),
            context: Vec::new(),
            retry: RetryState::initial(0.0),
            stage: Stage::Tokenized,
            translated_text: None,
            report: PlaceholderReport::default(),
            restored_text: None,
        }
    }

    pub fn normalized_text(&self) -> &str {
        &self.frozen.text
    }

    pub fn placeholders(&self) -> &PlaceholderMap {
        &self.frozen.placeholders
    }

    #[must_use]
    pub fn retrieve(mut self, dictionary: &DictionarySnapshot) -> Self {
        self.context = context_lines(&self.frozen.text, dictionary);
        self.stage = Stage::Retrieved;
        self
    }

    #[must_use]
    pub fn restore(mut self) -> Self {
        let Some(translated) = self.translated_text.as_deref() else {
            return self;
        };
        self.restored_text = Some(self.frozen.restore(translated));
        self.stage = if self.stage == Stage::Validated {
            Stage::Restored
        } else {
            Stage::RestoredWithWarnings
        };
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnitStatus {
    Restored,
    RestoredWithWarnings(PlaceholderReport),
    /// Nothing to translate; source returned as-is.
    Passthrough,
}

#[derive(Clone, Debug)]
pub struct UnitOutcome {
    pub text: String,
    pub status: UnitStatus,
    pub attempts: u32,
}

pub struct TranslationPipeline {
    settings: PipelineSettings,
    prompts: PromptSet,
    dictionary: Arc<Dictionary>,
    script: TargetScript,
    trace: TraceWriter,
}

impl TranslationPipeline {
    pub fn new(
        settings: PipelineSettings,
        prompts: PromptSet,
        dictionary: Arc<Dictionary>,
    ) -> anyhow::Result<Self> {
        let trace = TraceWriter::new(settings.trace_dir.clone())?;
        let script = TargetScript::for_language(&settings.target_lang);
        Ok(Self {
            settings,
            prompts,
            dictionary,
            script,
            trace,
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dictionary
    }

    pub fn build_prompt(&self, unit: &TranslationUnit) -> String {
        let template = if unit.placeholders().is_empty() {
            &self.prompts.translate_reduced
        } else {
            &self.prompts.translate
        };
        let tokens = unit.placeholders().tokens().collect::<Vec<_>>().join(" ");
        let dictionary = if unit.context.is_empty() {
            "(none)".to_string()
        } else {
            unit.context
                .iter()
                .map(|l| format!("- {l}"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let corrections = if unit.retry.notes.is_empty() {
            "(none)"
        } else {
            unit.retry.notes.as_str()
        };
        render_template(
            template,
            &[
                ("source_lang", self.settings.source_lang.as_str()),
                ("target_lang", self.settings.target_lang.as_str()),
                ("placeholders", tokens.as_str()),
                ("dictionary", dictionary.as_str()),
                ("corrections", corrections),
                ("source", unit.normalized_text()),
            ],
        )
    }

    /// Runs one string to completion. `unit_key` names it in logs and traces.
    pub async fn translate(
        &self,
        unit_key: &str,
        source: &str,
        model: &dyn ChatModel,
    ) -> Result<UnitOutcome, ItemError> {
        let unit = TranslationUnit::tokenize(source);
        if is_trivial_placeholder_text(unit.normalized_text()) {
            return Ok(UnitOutcome {
                text: source.to_string(),
                status: UnitStatus::Passthrough,
                attempts: 0,
            });
        }

        let mut unit = unit.retrieve(&self.dictionary.snapshot());
        unit.retry = RetryState::initial(self.settings.temperature);
        let max_attempts = self.settings.max_attempts.max(1);
        let mut last_format_error = None;

        while !unit.retry.exhausted(max_attempts) {
            unit.stage = Stage::AwaitingModel;
            let attempt = unit.retry.attempt + 1;
            let prompt = self.build_prompt(&unit);
            self.trace_attempt(unit_key, attempt, "prompt", &prompt).await;

            let failure = match model.invoke(&prompt, unit.retry.temperature).await {
                Err(ModelError::OutputFormat(detail)) => {
                    last_format_error = Some(detail.clone());
                    AttemptFailure::OutputFormat(detail)
                }
                Err(err) => return Err(err.into()),
                Ok(reply) => {
                    self.trace_attempt(unit_key, attempt, "reply", &reply.translated_text).await;
                    self.commit_terms(unit_key, reply.new_dictionary_entries);
                    unit.report = if unit.placeholders().is_empty() {
                        PlaceholderReport::default()
                    } else {
                        validate_placeholders(unit.placeholders(), &reply.translated_text)
                    };
                    unit.translated_text = Some(reply.translated_text);
                    if unit.report.is_clean() {
                        unit.stage = Stage::Validated;
                        unit.retry.attempt = attempt;
                        break;
                    }
                    AttemptFailure::Placeholders(unit.report.clone())
                }
            };
            debug!(unit = unit_key, attempt, ?failure, "attempt rejected");
            unit.stage = Stage::NeedsRetry;
            unit.retry = unit.retry.advance(&failure);
        }

        let attempts = unit.retry.attempt;
        if unit.stage != Stage::Validated {
            if unit.translated_text.is_none() {
                let detail = last_format_error.unwrap_or_else(|| "no usable reply".to_string());
                return Err(ModelError::OutputFormat(detail).into());
            }
            let detail = unit.report.summary();
            if self.settings.on_exhaustion == ExhaustionPolicy::Fail {
                return Err(ItemError::PlaceholderIntegrity { attempts, detail });
            }
            warn!(unit = unit_key, attempts, "{detail}; emitting best effort");
        }

        let unit = unit.restore();
        let status = match unit.stage {
            Stage::Restored => UnitStatus::Restored,
            _ => UnitStatus::RestoredWithWarnings(unit.report.clone()),
        };
        Ok(UnitOutcome {
            text: unit.restored_text.unwrap_or_default(),
            status,
            attempts,
        })
    }

    fn commit_terms(&self, unit_key: &str, updates: Vec<TermUpdate>) {
        if updates.is_empty() {
            return;
        }
        for event in self.dictionary.apply_updates(updates, self.script) {
            match event {
                TermApplyEvent::Added { term, value } => {
                    debug!(unit = unit_key, "dictionary + {term} -> {value}")
                }
                TermApplyEvent::Kept { term, existing } => {
                    debug!(unit = unit_key, "dictionary keeps {term} -> {existing}")
                }
                TermApplyEvent::Rejected { error, .. } => {
                    warn!(unit = unit_key, "dictionary entry rejected: {error}")
                }
            }
        }
    }

    async fn trace_attempt(&self, unit_key: &str, attempt: u32, kind: &str, text: &str) {
        if let Err(err) = self.trace.write_attempt(unit_key, attempt, kind, text).await {
            warn!("{err:#}");
        }
    }
}
