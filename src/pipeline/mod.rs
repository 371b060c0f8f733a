mod config;
mod prompts;
mod trace;
mod translator;

pub use config::{
    init_default_config, ExhaustionPolicy, Overrides, PipelineSettings, RunConfig,
    DEFAULT_MAX_ATTEMPTS,
};
pub use prompts::{render_template, PromptSet};
pub use translator::{
    AttemptFailure, RetryState, Stage, TranslationPipeline, TranslationUnit, UnitOutcome,
    UnitStatus, MAX_TEMPERATURE, TEMPERATURE_STEP,
};
