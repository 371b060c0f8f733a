use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context};

use crate::config::{
    find_default_config, load_config, resolve_relative, AppConfig, CONFIG_ENV_VAR,
    CONFIG_FILENAME,
};
use crate::job::pacing::PacingSettings;
use crate::job::JobSettings;
use crate::models::openai::{OpenAiSettings, DEFAULT_API_BASE, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
use crate::pipeline::prompts::{default_prompt_files, PromptSet, DEFAULT_PROMPTS_DIR};
use crate::terminology::DictionarySources;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// What to do when every attempt still breaks the placeholder rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExhaustionPolicy {
    /// Restore whatever the last reply had and log a warning.
    #[default]
    Emit,
    /// Fail the work item.
    Fail,
}

impl ExhaustionPolicy {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "emit" | "warn" => Ok(Self::Emit),
            "fail" => Ok(Self::Fail),
            other => Err(anyhow!("unknown on_exhaustion policy: {other} (expected emit|fail)")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub source_lang: String,
    pub target_lang: String,
    pub max_attempts: u32,
    pub temperature: f32,
    pub on_exhaustion: ExhaustionPolicy,
    pub trace_dir: Option<PathBuf>,
}

impl PipelineSettings {
    pub fn new(source_lang: &str, target_lang: &str) -> Self {
        Self {
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            temperature: DEFAULT_TEMPERATURE,
            on_exhaustion: ExhaustionPolicy::Emit,
            trace_dir: None,
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub config_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub model: Option<String>,
    pub max_attempts: Option<u32>,
    pub on_exhaustion: Option<String>,
    pub concurrency: Option<usize>,
    pub per_file_split: Option<usize>,
    pub shuffle_items: bool,
    pub requests_per_minute: Option<u32>,
    pub request_delay_secs: Option<f64>,
    pub dictionary: Option<PathBuf>,
    pub failure_log: Option<PathBuf>,
    pub trace_dir: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct RunConfig {
    pub config_path: PathBuf,
    pub provider: OpenAiSettings,
    pub credentials: Vec<String>,
    pub pipeline: PipelineSettings,
    pub job: JobSettings,
    pub pacing: PacingSettings,
    pub dictionary: DictionarySources,
    pub output_dir: PathBuf,
    pub failure_log: PathBuf,
    pub prompts: PromptSet,
}

impl RunConfig {
    pub fn from_file_and_args(workdir: &Path, args: Overrides) -> anyhow::Result<Self> {
        let cfg_file = args
            .config_path
            .clone()
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
            .or_else(|| find_default_config(workdir, CONFIG_FILENAME));

        let mut file_cfg = AppConfig::default();
        if let Some(p) = cfg_file.as_ref() {
            if p.exists() {
                file_cfg = load_config(p)?;
            } else if args.config_path.is_some() {
                bail!("config file not found: {}", p.display());
            }
        }
        let cfg_path = cfg_file.unwrap_or_else(|| workdir.join(CONFIG_FILENAME));
        Self::resolve(cfg_path, &file_cfg, args)
    }

    pub fn resolve(cfg_path: PathBuf, file_cfg: &AppConfig, args: Overrides) -> anyhow::Result<Self> {
        let rel = |p: &str| resolve_relative(&cfg_path, p);

        let provider_kind = file_cfg.provider.kind.as_deref().unwrap_or("openai");
        if !provider_kind.eq_ignore_ascii_case("openai") {
            bail!("unsupported provider kind: {provider_kind}");
        }
        let provider = OpenAiSettings {
            api_base: file_cfg
                .provider
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: args
                .model
                .clone()
                .or_else(|| file_cfg.provider.model.clone())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(
                file_cfg.provider.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        };
        let credentials = resolve_credentials(file_cfg)?;

        let t = &file_cfg.translation;
        let target_lang = args
            .target_lang
            .clone()
            .or_else(|| t.target_lang.clone())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .context("target language not configured (set translation.target_lang or --target-lang)")?;
        let source_lang = args
            .source_lang
            .clone()
            .or_else(|| t.source_lang.clone())
            .unwrap_or_else(|| "en".to_string());
        let on_exhaustion = match args.on_exhaustion.as_deref().or(t.on_exhaustion.as_deref()) {
            Some(s) => ExhaustionPolicy::parse(s)?,
            None => ExhaustionPolicy::default(),
        };
        let pipeline = PipelineSettings {
            max_attempts: args
                .max_attempts
                .or(t.max_attempts)
                .unwrap_or(DEFAULT_MAX_ATTEMPTS)
                .max(1),
            temperature: file_cfg.provider.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            on_exhaustion,
            trace_dir: args
                .trace_dir
                .clone()
                .or_else(|| t.trace_dir.as_deref().map(rel)),
            ..PipelineSettings::new(&source_lang, &target_lang)
        };

        let j = &file_cfg.job;
        let dictionary_path = args
            .dictionary
            .clone()
            .or_else(|| file_cfg.dictionary.path.as_deref().map(rel));
        let defaults = JobSettings::default();
        let job = JobSettings {
            concurrency: args.concurrency.or(j.concurrency).unwrap_or(defaults.concurrency).max(1),
            per_file_split: args
                .per_file_split
                .or(j.per_file_split)
                .unwrap_or(defaults.per_file_split)
                .max(1),
            shuffle_items: args.shuffle_items || j.shuffle_items.unwrap_or(false),
            checkpoint_interval: j
                .checkpoint_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.checkpoint_interval),
            dictionary_path: dictionary_path.clone(),
        };
        let delay_secs = args.request_delay_secs.or(j.request_delay_secs);
        if delay_secs.is_some_and(|d| !d.is_finite() || d < 0.0) {
            bail!("request_delay_secs must be a non-negative number");
        }
        let pacing = PacingSettings {
            requests_per_minute: args.requests_per_minute.or(j.requests_per_minute).filter(|n| *n > 0),
            request_delay: delay_secs.filter(|d| *d > 0.0).map(Duration::from_secs_f64),
        };

        let dictionary = DictionarySources {
            path: dictionary_path,
            seeds: file_cfg.dictionary.seed.iter().map(|s| rel(s)).collect(),
            parallel: file_cfg
                .dictionary
                .parallel
                .iter()
                .map(|p| (rel(&p.source), rel(&p.target)))
                .collect(),
            overrides: file_cfg.dictionary.overrides.as_deref().map(rel),
        };

        let output_dir = args
            .output_dir
            .clone()
            .or_else(|| j.output_dir.as_deref().map(rel))
            .unwrap_or_else(|| PathBuf::from("localized"));
        let failure_log = args
            .failure_log
            .clone()
            .or_else(|| j.failure_log.as_deref().map(rel))
            .unwrap_or_else(|| output_dir.join("failures.json"));

        let prompts = PromptSet::load(&cfg_path, file_cfg).context("load prompts")?;

        Ok(Self {
            config_path: cfg_path,
            provider,
            credentials,
            pipeline,
            job,
            pacing,
            dictionary,
            output_dir,
            failure_log,
            prompts,
        })
    }
}

fn resolve_credentials(cfg: &AppConfig) -> anyhow::Result<Vec<String>> {
    let mut keys: Vec<String> = cfg
        .provider
        .api_keys
        .iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    if keys.is_empty() {
        let var = cfg
            .provider
            .api_key_env
            .as_deref()
            .unwrap_or(DEFAULT_API_KEY_ENV);
        if let Ok(v) = std::env::var(var) {
            keys = v
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
        }
        if keys.is_empty() {
            bail!("no API credentials: set provider.api_keys or the {var} environment variable");
        }
    }
    Ok(keys)
}

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILENAME);

    let prompts_dir = dir.join(DEFAULT_PROMPTS_DIR);
    std::fs::create_dir_all(&prompts_dir)
        .with_context(|| format!("create prompts dir: {}", prompts_dir.display()))?;
    for (fname, body) in default_prompt_files() {
        let p = prompts_dir.join(fname);
        if p.exists() && !force {
            continue;
        }
        std::fs::write(&p, body).with_context(|| format!("write prompt: {}", p.display()))?;
    }

    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

const DEFAULT_CONFIG_TOML: &str = r#"[provider]
kind = "openai"
model = "gpt-4o-mini"
api_base = "https://api.openai.com/v1"
# Keys are rotated one per request. Leave empty to read OPENAI_API_KEY (comma-separated).
api_keys = []
# api_key_env = "OPENAI_API_KEY"
temperature = 0.2
timeout_secs = 120

[translation]
source_lang = "en"
target_lang = "ko"
max_attempts = 10
# "emit": keep a best-effort translation when tokens stay broken; "fail": fail the file.
on_exhaustion = "emit"
# trace_dir = "_trace"

[job]
concurrency = 4
per_file_split = 1
shuffle_items = false
# requests_per_minute = 60
# request_delay_secs = 1.0
checkpoint_interval_secs = 300
output_dir = "localized"
failure_log = "localized/failures.json"

[dictionary]
path = "dictionary.json"
seed = []
# overrides = "overrides.json"

# [[dictionary.parallel]]
# source = "assets/en_us.json"
# target = "assets/ko_kr.json"

[prompts]
translate = "prompts/translate.txt"
translate_reduced = "prompts/translate_reduced.txt"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    fn overrides() -> Overrides {
        Overrides {
            target_lang: Some("ja".to_string()),
            ..Overrides::default()
        }
    }

    #[test]
    fn cli_values_win_over_file_values() {
        let cfg = parse_config(
            r#"
[provider]
api_keys = ["a", " ", "b"]
[translation]
target_lang = "ko"
max_attempts = 3
[job]
concurrency = 2
request_delay_secs = 1.0
output_dir = "out"
[dictionary]
path = "dict.json"
"#,
        )
        .unwrap();
        let dir = Path::new("/work/project");
        let args = Overrides {
            concurrency: Some(8),
            ..overrides()
        };
        let run = RunConfig::resolve(dir.join(CONFIG_FILENAME), &cfg, args).unwrap();
        assert_eq!(run.credentials, vec!["a", "b"]);
        assert_eq!(run.pipeline.target_lang, "ja");
        assert_eq!(run.pipeline.max_attempts, 3);
        assert_eq!(run.job.concurrency, 8);
        assert_eq!(run.pacing.request_delay, Some(Duration::from_secs(1)));
        assert_eq!(run.pacing.requests_per_minute, None);
        assert_eq!(run.output_dir, dir.join("out"));
        assert_eq!(run.failure_log, dir.join("out").join("failures.json"));
        assert_eq!(run.job.dictionary_path, Some(dir.join("dict.json")));
        assert_eq!(run.pipeline.on_exhaustion, ExhaustionPolicy::Emit);
    }

    #[test]
    fn rejects_bad_policy_and_missing_target() {
        let cfg = parse_config("[provider]\napi_keys = [\"k\"]\n[translation]\non_exhaustion = \"maybe\"").unwrap();
        let path = PathBuf::from(CONFIG_FILENAME);
        assert!(RunConfig::resolve(path.clone(), &cfg, overrides()).is_err());
        let cfg = parse_config("[provider]\napi_keys = [\"k\"]").unwrap();
        assert!(RunConfig::resolve(path, &cfg, Overrides::default()).is_err());
        assert_eq!(ExhaustionPolicy::parse("FAIL").unwrap(), ExhaustionPolicy::Fail);
    }

    #[test]
    fn init_writes_config_and_prompts() {
        let dir = tempfile::tempdir().unwrap();
        let path = init_default_config(dir.path(), false).unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.translation.target_lang.as_deref(), Some("ko"));
        assert!(dir.path().join("prompts/translate.txt").exists());
        let prompts = PromptSet::load(&path, &cfg).unwrap();
        assert!(prompts.translate.contains("{{placeholders}}"));

        std::fs::write(&path, "# edited").unwrap();
        init_default_config(dir.path(), false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# edited");
    }
}
