use std::path::Path;

use anyhow::{anyhow, Context};

use crate::config::{resolve_relative, AppConfig};

pub const DEFAULT_PROMPTS_DIR: &str = "prompts";

pub const DEFAULT_TRANSLATE: &str = "translate.txt";
pub const DEFAULT_TRANSLATE_REDUCED: &str = "translate_reduced.txt";

#[derive(Clone, Debug)]
pub struct PromptSet {
    /// Used when the string carries placeholders.
    pub translate: String,
    pub translate_reduced: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            translate: DEFAULT_TRANSLATE_TEXT.to_string(),
            translate_reduced: DEFAULT_TRANSLATE_REDUCED_TEXT.to_string(),
        }
    }
}

impl PromptSet {
    /// Configured template files override the built-in text.
    pub fn load(config_path: &Path, cfg: &AppConfig) -> anyhow::Result<Self> {
        let mut set = Self::default();
        if let Some(p) = cfg.prompts.translate.as_deref() {
            set.translate = read_prompt(config_path, "translate", p)?;
        }
        if let Some(p) = cfg.prompts.translate_reduced.as_deref() {
            set.translate_reduced = read_prompt(config_path, "translate_reduced", p)?;
        }
        Ok(set)
    }
}

fn read_prompt(config_path: &Path, key: &str, rel: &str) -> anyhow::Result<String> {
    let p = resolve_relative(config_path, rel);
    if !p.exists() {
        return Err(anyhow!(
            "prompt file not found for {key}: {} (run: asset-localizer --init-config)",
            p.display()
        ));
    }
    std::fs::read_to_string(&p).with_context(|| format!("read prompt: {}", p.display()))
}

pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (k, v) in vars {
        let pat = format!("{{{{{k}}}}}");
        out = out.replace(&pat, v);
    }
    out
}

pub fn default_prompt_files() -> Vec<(&'static str, &'static str)> {
    vec![
        (DEFAULT_TRANSLATE, DEFAULT_TRANSLATE_TEXT),
        (DEFAULT_TRANSLATE_REDUCED, DEFAULT_TRANSLATE_REDUCED_TEXT),
    ]
}

pub const DEFAULT_TRANSLATE_TEXT: &str = r#"Translate this game text from {{source_lang}} to {{target_lang}}.

Rules:
- Translate only the natural-language parts. Do NOT add explanations.
- Tokens like [P1], [P2] stand for game codes. Copy each token EXACTLY once, unchanged.
- Do NOT invent new [P<n>] tokens. Keep each token next to the words it belongs to.
- Keep line breaks where they are.
- Follow the GLOSSARY for every term it lists.
- Report proper nouns or game terms you translated that are missing from the GLOSSARY in new_dictionary_entries.

Tokens (each exactly once): {{placeholders}}

GLOSSARY:
{{dictionary}}

CORRECTIONS:
{{corrections}}

Return STRICT JSON only (one JSON object):
{"translated_text":"...","new_dictionary_entries":[{"source":"...","target":"..."}]}

SOURCE:
{{source}}"#;

pub const DEFAULT_TRANSLATE_REDUCED_TEXT: &str = r#"Translate this game text from {{source_lang}} to {{target_lang}}.

Rules:
- Translate naturally. Do NOT add explanations.
- Keep line breaks where they are.
- Follow the GLOSSARY for every term it lists.
- Report proper nouns or game terms you translated that are missing from the GLOSSARY in new_dictionary_entries.

GLOSSARY:
{{dictionary}}

CORRECTIONS:
{{corrections}}

Return STRICT JSON only (one JSON object):
{"translated_text":"...","new_dictionary_entries":[{"source":"...","target":"..."}]}

SOURCE:
{{source}}"#;
