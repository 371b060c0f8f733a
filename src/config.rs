use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const CONFIG_FILENAME: &str = "asset-localizer.toml";
pub const CONFIG_ENV_VAR: &str = "ASSET_LOCALIZER_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default)]
    pub translation: TranslationSection,
    #[serde(default)]
    pub job: JobSection,
    #[serde(default)]
    pub dictionary: DictionarySection,
    #[serde(default)]
    pub prompts: PromptsSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ProviderSection {
    /// Only "openai" (any OpenAI-compatible endpoint) is supported.
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
    /// Rotated round-robin, one per request.
    #[serde(default)]
    pub api_keys: Vec<String>,
    /// Env var holding comma-separated keys when `api_keys` is empty.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TranslationSection {
    #[serde(default)]
    pub source_lang: Option<String>,
    #[serde(default)]
    pub target_lang: Option<String>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// "emit" or "fail".
    #[serde(default)]
    pub on_exhaustion: Option<String>,
    #[serde(default)]
    pub trace_dir: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct JobSection {
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub per_file_split: Option<usize>,
    #[serde(default)]
    pub shuffle_items: Option<bool>,
    #[serde(default)]
    pub requests_per_minute: Option<u32>,
    #[serde(default)]
    pub request_delay_secs: Option<f64>,
    #[serde(default)]
    pub checkpoint_interval_secs: Option<u64>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub failure_log: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct DictionarySection {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub seed: Vec<String>,
    #[serde(default)]
    pub overrides: Option<String>,
    #[serde(default)]
    pub parallel: Vec<ParallelPair>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ParallelPair {
    pub source: String,
    pub target: String,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    #[serde(default)]
    pub translate: Option<String>,
    #[serde(default)]
    pub translate_reduced: Option<String>,
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    let exe = std::env::current_exe().ok()?;
    find_file_upwards(exe.parent()?, filename, 10)
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    parse_config(&text).with_context(|| format!("parse config: {}", path.display()))
}

pub fn parse_config(text: &str) -> anyhow::Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(text).context("parse config toml")?;
    Ok(cfg)
}

/// Resolves `p` against the config file's directory when relative.
pub fn resolve_relative(config_path: &Path, p: &str) -> PathBuf {
    let path = PathBuf::from(p.trim());
    if path.is_relative() {
        config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(path)
    } else {
        path
    }
}
