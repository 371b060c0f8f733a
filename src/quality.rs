use std::collections::HashMap;

use anyhow::Context;
use serde::Deserialize;

use crate::freezer::PlaceholderMap;
use crate::sentinels::placeholder_tokens_in;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaceholderReport {
    pub missing: Vec<String>,
    pub extra: Vec<String>,
    pub duplicated: Vec<String>,
}

impl PlaceholderReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty() && self.duplicated.is_empty()
    }

    #[must_use]
    pub fn summary(&self) -> String {
        let list = |v: &[String]| {
            if v.is_empty() {
                "none".to_string()
            } else {
                v.join(", ")
            }
        };
        format!(
            "missing: {}; unexpected: {}; repeated: {}",
            list(&self.missing),
            list(&self.extra),
            list(&self.duplicated)
        )
    }
}

/// Every key must occur exactly once and nothing token-shaped may appear
/// that is not a key.
pub fn validate_placeholders(placeholders: &PlaceholderMap, translated: &str) -> PlaceholderReport {
    let found = placeholder_tokens_in(translated);
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut report = PlaceholderReport::default();
    for tok in &found {
        let tok = tok.as_str();
        *counts.entry(tok).or_default() += 1;
        if !placeholders.contains(tok) && !report.extra.iter().any(|e| e == tok) {
            report.extra.push(tok.to_string());
        }
    }
    for tok in placeholders.tokens() {
        match counts.get(tok).copied().unwrap_or(0) {
            0 => report.missing.push(tok.to_string()),
            1 => {}
            _ => report.duplicated.push(tok.to_string()),
        }
    }
    report
}

pub fn cleanup_model_text(text: &str) -> String {
    let mut out = text.trim().to_string();
    if out.starts_with("```") {
        if let Some(pos) = out.find('\n') {
            out = out[pos + 1..].to_string();
        }
        if let Some(end) = out.rfind("```") {
            out.truncate(end);
        }
    }
    out.trim().to_string()
}

/// First JSON object in `text`; prose before it and anything after it is ignored.
pub fn must_extract_json_obj(text: &str) -> anyhow::Result<serde_json::Value> {
    let cleaned = cleanup_model_text(text);
    let start = cleaned.find('{').context("no_json_object_start")?;
    let mut de = serde_json::Deserializer::from_str(&cleaned[start..]);
    let v = serde_json::Value::deserialize(&mut de).context("json_parse_failed")?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> PlaceholderMap {
        pairs
            .iter()
            .map(|(t, o)| (t.to_string(), o.to_string()))
            .collect()
    }

    #[test]
    fn reports_missing_token() {
        let m = map(&[("[P1]", "§a"), ("[P2]", "%s")]);
        let report = validate_placeholders(&m, "Hello [P1] world");
        assert_eq!(report.missing, vec!["[P2]"]);
        assert!(report.extra.is_empty());
        assert!(report.duplicated.is_empty());
        assert!(!report.is_clean());
    }

    #[test]
    fn reports_extra_and_duplicated_tokens() {
        let m = map(&[("[P1]", "§a")]);
        let report = validate_placeholders(&m, "[P1][P1] [P3] [P3]");
        assert_eq!(report.duplicated, vec!["[P1]"]);
        assert_eq!(report.extra, vec!["[P3]"]);
        assert!(report.missing.is_empty());
        assert_eq!(report.summary(), "missing: none; unexpected: [P3]; repeated: [P1]");
    }

    #[test]
    fn clean_translation_passes() {
        let m = map(&[("[P1]", "§a"), ("[P2]", "§r"), ("[P3]", "%s")]);
        assert!(validate_placeholders(&m, "[P3] 피해를 [P1]적[P2]에게").is_clean());
    }

    #[test]
    fn json_is_extracted_from_fenced_and_chatty_replies() {
        let v = must_extract_json_obj("```json\n{\"translated_text\":\"x\"}\n```").unwrap();
        assert_eq!(v["translated_text"], "x");
        let v = must_extract_json_obj("Sure! {\"a\": 1} hope this helps").unwrap();
        assert_eq!(v["a"], 1);
        assert!(must_extract_json_obj("no json here").is_err());
    }
}
