use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DictionaryError;
use crate::formats::{self, Document};
use crate::freezer::freeze_text;
use crate::sentinels::contains_placeholder;
use crate::textutil::TargetScript;

const MAX_MINED_TERM_CHARS: usize = 64;
const MAX_MINED_TERM_WORDS: usize = 6;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TermValue {
    One(String),
    Many(Vec<String>),
}

impl TermValue {
    pub fn values(&self) -> &[String] {
        match self {
            TermValue::One(v) => std::slice::from_ref(v),
            TermValue::Many(vs) => vs,
        }
    }

    fn contains(&self, value: &str) -> bool {
        self.values().iter().any(|v| v == value)
    }

    fn push(&mut self, value: String) {
        match self {
            TermValue::One(first) => *self = TermValue::Many(vec![std::mem::take(first), value]),
            TermValue::Many(vs) => vs.push(value),
        }
    }

    /// Moves `value` to the front, adding it if absent. Returns true if the
    /// stored sequence changed.
    fn promote(&mut self, value: String) -> bool {
        let mut vs = self.values().to_vec();
        match vs.iter().position(|v| *v == value) {
            Some(0) => return false,
            Some(i) => {
                let v = vs.remove(i);
                vs.insert(0, v);
            }
            None => vs.insert(0, value),
        }
        *self = TermValue::Many(vs);
        true
    }

    pub fn render(&self) -> String {
        self.values().join(", ")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermEntry {
    pub term: String,
    pub value: TermValue,
}

/// Suggested entry from a model reply.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct TermUpdate {
    #[serde(default, alias = "src", alias = "term")]
    pub source: String,
    #[serde(default, alias = "tgt", alias = "translation")]
    pub target: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TermApplyEvent {
    Added { term: String, value: String },
    Kept { term: String, existing: String },
    Rejected { term: String, error: DictionaryError },
}

#[derive(Clone, Debug, Default)]
struct Store {
    entries: Vec<TermEntry>,
    index: HashMap<String, usize>,
}

impl Store {
    fn find(&self, term: &str) -> Option<&TermEntry> {
        self.index
            .get(&term.to_lowercase())
            .map(|&i| &self.entries[i])
    }

    fn add(&mut self, term: &str, value: &str) -> Result<bool, DictionaryError> {
        let (term, value) = validate_pair(term, value)?;
        match self.index.get(&term.to_lowercase()) {
            Some(&i) => {
                let entry = &mut self.entries[i];
                if entry.value.contains(value) {
                    return Ok(false);
                }
                entry.value.push(value.to_string());
                Ok(true)
            }
            None => {
                self.index.insert(term.to_lowercase(), self.entries.len());
                self.entries.push(TermEntry {
                    term: term.to_string(),
                    value: TermValue::One(value.to_string()),
                });
                Ok(true)
            }
        }
    }
}

fn validate_pair<'a>(term: &'a str, value: &'a str) -> Result<(&'a str, &'a str), DictionaryError> {
    let t = term.trim();
    let v = value.trim();
    if t.is_empty() {
        return Err(DictionaryError::invalid(term, "empty term"));
    }
    if v.is_empty() {
        return Err(DictionaryError::invalid(term, "empty value"));
    }
    if contains_placeholder(t) || contains_placeholder(v) {
        return Err(DictionaryError::invalid(term, "contains placeholder token"));
    }
    Ok((t, v))
}

/// Point-in-time copy of the dictionary, safe to read without locking.
#[derive(Clone, Debug, Default)]
pub struct DictionarySnapshot {
    store: Store,
}

impl DictionarySnapshot {
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TermEntry> {
        self.store.entries.iter()
    }

    pub fn lookup(&self, term: &str) -> Option<&TermEntry> {
        self.store.find(term)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut out = serde_json::Map::new();
        for e in &self.store.entries {
            let v = serde_json::to_value(&e.value).unwrap_or(serde_json::Value::Null);
            out.insert(e.term.clone(), v);
        }
        serde_json::Value::Object(out)
    }
}

#[derive(Clone, Debug, Default)]
pub struct DictionaryLoad {
    pub added: usize,
    pub rejected: usize,
}

/// Term store shared by every worker of a job.
#[derive(Debug, Default)]
pub struct Dictionary {
    store: RwLock<Store>,
}

impl Dictionary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.store.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.read().entries.is_empty()
    }

    /// Adds `value` under `term` (case-insensitive). Returns whether anything changed.
    pub fn add(&self, term: &str, value: &str) -> Result<bool, DictionaryError> {
        self.store.write().add(term, value)
    }

    pub fn add_json(&self, term: &str, value: &serde_json::Value) -> Result<bool, DictionaryError> {
        match value {
            serde_json::Value::String(s) => self.add(term, s),
            serde_json::Value::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let s = item
                        .as_str()
                        .ok_or_else(|| DictionaryError::invalid(term, "non-string value in list"))?;
                    validate_pair(term, s)?;
                    values.push(s);
                }
                if values.is_empty() {
                    return Err(DictionaryError::invalid(term, "empty value list"));
                }
                let mut store = self.store.write();
                let mut changed = false;
                for s in values {
                    changed |= store.add(term, s)?;
                }
                Ok(changed)
            }
            _ => Err(DictionaryError::invalid(term, "value must be a string or list of strings")),
        }
    }

    /// Makes `value` the preferred translation of `term` without dropping others.
    pub fn prefer(&self, term: &str, value: &str) -> Result<bool, DictionaryError> {
        let mut store = self.store.write();
        let changed = store.add(term, value)?;
        let (t, v) = validate_pair(term, value)?;
        let Some(&i) = store.index.get(&t.to_lowercase()) else {
            return Ok(changed);
        };
        Ok(store.entries[i].value.promote(v.to_string()) || changed)
    }

    pub fn lookup(&self, term: &str) -> Option<TermValue> {
        self.store.read().find(term).map(|e| e.value.clone())
    }

    pub fn snapshot(&self) -> DictionarySnapshot {
        DictionarySnapshot {
            store: self.store.read().clone(),
        }
    }

    /// Commits model-suggested entries. An entry is taken only if the term is
    /// new or none of its current values is written in the target script.
    pub fn apply_updates(
        &self,
        updates: impl IntoIterator<Item = TermUpdate>,
        script: TargetScript,
    ) -> Vec<TermApplyEvent> {
        let mut events = Vec::new();
        let mut store = self.store.write();
        for up in updates {
            let term = up.source.trim().to_string();
            if let Some(existing) = store.find(&term) {
                if existing.value.values().iter().any(|v| script.appears_in(v)) {
                    events.push(TermApplyEvent::Kept {
                        existing: existing.value.render(),
                        term,
                    });
                    continue;
                }
            }
            match store.add(&term, &up.target) {
                Ok(true) => events.push(TermApplyEvent::Added {
                    term,
                    value: up.target.trim().to_string(),
                }),
                Ok(false) => {}
                Err(error) => events.push(TermApplyEvent::Rejected { term, error }),
            }
        }
        events
    }

    /// Mines short string pairs stored under the same key path in parallel
    /// source and target documents.
    pub fn merge_parallel(&self, source: &Document, target: &Document) -> usize {
        let mut pairs = Vec::new();
        collect_parallel_pairs(source, target, &mut pairs);
        let mut store = self.store.write();
        let mut added = 0usize;
        for (src, tgt) in pairs {
            match store.add(&src, &tgt) {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(err) => debug!("parallel pair skipped: {err}"),
            }
        }
        added
    }

    pub fn load_json(&self, path: &Path) -> anyhow::Result<DictionaryLoad> {
        let bytes = fs::read(path).with_context(|| format!("read dictionary {}", path.display()))?;
        let text = formats::decode_text(&bytes);
        let doc: Document = serde_json::from_str(&text)
            .with_context(|| format!("parse dictionary {}", path.display()))?;
        Ok(self.merge_document(&doc))
    }

    pub fn merge_document(&self, doc: &Document) -> DictionaryLoad {
        let mut load = DictionaryLoad::default();
        for (term, value) in doc {
            match self.add_json(term, value) {
                Ok(true) => load.added += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!("dictionary entry rejected: {err}");
                    load.rejected += 1;
                }
            }
        }
        load
    }

    /// Writes the dictionary as pretty JSON via a temp file and rename.
    pub fn save_json(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot().to_json())?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        let tmp = tmp_path(path);
        fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("rename to {}", path.display()))?;
        Ok(())
    }

    pub fn from_sources(sources: &DictionarySources) -> anyhow::Result<Self> {
        let dict = Dictionary::new();
        for seed in &sources.seeds {
            let load = dict.load_json(seed)?;
            debug!("seed {}: +{} ({} rejected)", seed.display(), load.added, load.rejected);
        }
        if let Some(path) = sources.path.as_deref().filter(|p| p.exists()) {
            let load = dict.load_json(path)?;
            debug!("checkpoint {}: +{}", path.display(), load.added);
        }
        for (src, tgt) in &sources.parallel {
            let source = formats::load_document(src)?;
            let target = formats::load_document(tgt)?;
            let added = dict.merge_parallel(&source, &target);
            debug!("parallel {} / {}: +{added}", src.display(), tgt.display());
        }
        if let Some(path) = sources.overrides.as_deref() {
            let bytes = fs::read(path).with_context(|| format!("read overrides {}", path.display()))?;
            let doc: Document = serde_json::from_str(&formats::decode_text(&bytes))
                .with_context(|| format!("parse overrides {}", path.display()))?;
            for (term, value) in &doc {
                let preferred = match value {
                    serde_json::Value::Array(items) => items.first().and_then(|v| v.as_str()),
                    other => other.as_str(),
                };
                let result = match preferred {
                    Some(v) => dict.add_json(term, value).and_then(|_| dict.prefer(term, v)),
                    None => Err(DictionaryError::invalid(term, "override must be a string or list of strings")),
                };
                if let Err(err) = result {
                    warn!("override rejected: {err}");
                }
            }
        }
        Ok(dict)
    }
}

/// Where a job's dictionary comes from at startup.
#[derive(Clone, Debug, Default)]
pub struct DictionarySources {
    /// Checkpoint file: loaded if present, saved periodically.
    pub path: Option<PathBuf>,
    pub seeds: Vec<PathBuf>,
    pub parallel: Vec<(PathBuf, PathBuf)>,
    pub overrides: Option<PathBuf>,
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn looks_like_term(text: &str) -> bool {
    let t = text.trim();
    !t.is_empty()
        && t.chars().count() <= MAX_MINED_TERM_CHARS
        && t.split_whitespace().count() <= MAX_MINED_TERM_WORDS
        && freeze_text(t).placeholders.is_empty()
}

fn collect_parallel_pairs(source: &Document, target: &Document, out: &mut Vec<(String, String)>) {
    for (key, sv) in source {
        if let Some(tv) = target.get(key) {
            collect_value_pairs(sv, tv, out);
        }
    }
}

fn collect_value_pairs(sv: &serde_json::Value, tv: &serde_json::Value, out: &mut Vec<(String, String)>) {
    use serde_json::Value;
    match (sv, tv) {
        (Value::String(s), Value::String(t)) => {
            if s.trim() != t.trim() && looks_like_term(s) && looks_like_term(t) {
                out.push((s.trim().to_string(), t.trim().to_string()));
            }
        }
        (Value::Array(ss), Value::Array(ts)) => {
            for (s, t) in ss.iter().zip(ts) {
                collect_value_pairs(s, t, out);
            }
        }
        (Value::Object(s), Value::Object(t)) => collect_parallel_pairs(s, t, out),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: serde_json::Value) -> Document {
        match v {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn matching_is_case_insensitive_and_first_casing_wins() {
        let dict = Dictionary::new();
        assert!(dict.add("Iron Sword", "철 검").unwrap());
        assert!(dict.add("iron sword", "철검").unwrap());
        let snap = dict.snapshot();
        assert_eq!(snap.len(), 1);
        let entry = snap.lookup("IRON SWORD").unwrap();
        assert_eq!(entry.term, "Iron Sword");
        assert_eq!(entry.value, TermValue::Many(vec!["철 검".into(), "철검".into()]));
    }

    #[test]
    fn add_is_idempotent() {
        let dict = Dictionary::new();
        dict.add("Creeper", "크리퍼").unwrap();
        let before = dict.snapshot().to_json();
        assert!(!dict.add("creeper", "크리퍼").unwrap());
        assert_eq!(dict.snapshot().to_json(), before);
        assert_eq!(before, json!({"Creeper": "크리퍼"}));
    }

    #[test]
    fn invalid_entries_leave_state_untouched() {
        let dict = Dictionary::new();
        dict.add("Stone", "돌").unwrap();
        for (t, v) in [("  ", "x"), ("Stone", ""), ("[P1] Stone", "돌"), ("Stone", "[P2]")] {
            assert!(matches!(dict.add(t, v), Err(DictionaryError::InvalidEntry { .. })));
        }
        assert!(dict.add_json("Stone", &json!(3)).is_err());
        assert!(dict.add_json("Stone", &json!(["a", 1])).is_err());
        assert_eq!(dict.snapshot().to_json(), json!({"Stone": "돌"}));
    }

    #[test]
    fn prefer_reorders_without_removing() {
        let dict = Dictionary::new();
        dict.add("Ender Pearl", "엔더 구슬").unwrap();
        dict.add("Ender Pearl", "엔더 진주").unwrap();
        assert!(dict.prefer("ender pearl", "엔더 진주").unwrap());
        assert_eq!(
            dict.lookup("Ender Pearl").unwrap().values(),
            ["엔더 진주".to_string(), "엔더 구슬".to_string()]
        );
        assert!(!dict.prefer("Ender Pearl", "엔더 진주").unwrap());
    }

    #[test]
    fn model_updates_respect_target_script() {
        let dict = Dictionary::new();
        dict.add("Nether", "Nether").unwrap();
        dict.add("Redstone", "레드스톤").unwrap();
        let events = dict.apply_updates(
            vec![
                TermUpdate { source: "Nether".into(), target: "네더".into() },
                TermUpdate { source: "redstone".into(), target: "붉은돌".into() },
                TermUpdate { source: "Blaze".into(), target: "블레이즈".into() },
                TermUpdate { source: "".into(), target: "x".into() },
            ],
            TargetScript::Hangul,
        );
        assert!(matches!(&events[0], TermApplyEvent::Added { term, .. } if term == "Nether"));
        assert!(matches!(&events[1], TermApplyEvent::Kept { .. }));
        assert!(matches!(&events[2], TermApplyEvent::Added { .. }));
        assert!(matches!(&events[3], TermApplyEvent::Rejected { .. }));
        assert_eq!(dict.lookup("redstone").unwrap().values(), ["레드스톤".to_string()]);
        assert_eq!(dict.lookup("nether").unwrap().values().len(), 2);
    }

    #[test]
    fn parallel_documents_yield_short_pairs() {
        let src = doc(json!({
            "item.sword": "Iron Sword",
            "item.desc": "A very long description that clearly is not a glossary term at all",
            "item.same": "OK",
            "nested": {"a": "Gold Ingot", "fmt": "%s Ingot"},
            "list": ["Diamond"]
        }));
        let tgt = doc(json!({
            "item.sword": "철 검",
            "item.desc": "용어가 아닌 긴 설명",
            "item.same": "OK",
            "nested": {"a": "금 주괴", "fmt": "%s 주괴"},
            "list": ["다이아몬드"]
        }));
        let dict = Dictionary::new();
        assert_eq!(dict.merge_parallel(&src, &tgt), 3);
        assert_eq!(
            dict.snapshot().to_json(),
            json!({"Iron Sword": "철 검", "Gold Ingot": "금 주괴", "Diamond": "다이아몬드"})
        );
    }

    #[test]
    fn sources_merge_in_order_and_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, v: serde_json::Value| {
            let path = dir.path().join(name);
            fs::write(&path, serde_json::to_string(&v).unwrap()).unwrap();
            path
        };
        let seed = write("seed.json", json!({"Iron Sword": "철검", "Stone": "돌"}));
        let checkpoint = write("terms.json", json!({"Stone": ["돌", "석재"], "Torch": "횃불"}));
        let en = write("en_us.json", json!({"block.dirt": "Dirt", "item.x": "Iron Sword"}));
        let ko = write("ko_kr.json", json!({"block.dirt": "흙", "item.x": "철 검"}));
        let overrides = write(
            "overrides.json",
            json!({"Iron Sword": "강철 검", "Broken": 5, "Creeper": ["크리퍼", "폭탄"]}),
        );

        let dict = Dictionary::from_sources(&DictionarySources {
            path: Some(checkpoint),
            seeds: vec![seed],
            parallel: vec![(en, ko)],
            overrides: Some(overrides),
        })
        .unwrap();

        let snap = dict.snapshot();
        let terms: Vec<&str> = snap.iter().map(|e| e.term.as_str()).collect();
        assert_eq!(terms, vec!["Iron Sword", "Stone", "Torch", "Dirt", "Creeper"]);
        assert_eq!(
            snap.to_json(),
            json!({
                "Iron Sword": ["강철 검", "철검", "철 검"],
                "Stone": ["돌", "석재"],
                "Torch": "횃불",
                "Dirt": "흙",
                "Creeper": ["크리퍼", "폭탄"]
            })
        );
        assert!(snap.lookup("broken").is_none());
    }

    #[test]
    fn missing_checkpoint_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let dict = Dictionary::from_sources(&DictionarySources {
            path: Some(dir.path().join("absent.json")),
            ..DictionarySources::default()
        })
        .unwrap();
        assert!(dict.is_empty());
    }

    #[test]
    fn save_and_load_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dict").join("terms.json");
        let dict = Dictionary::new();
        dict.add("Zombie", "좀비").unwrap();
        dict.add("Apple", "사과").unwrap();
        dict.add("apple", "능금").unwrap();
        dict.save_json(&path).unwrap();
        assert!(!tmp_path(&path).exists());

        let loaded = Dictionary::new();
        let load = loaded.load_json(&path).unwrap();
        assert_eq!(load.added, 2);
        assert_eq!(loaded.snapshot().to_json(), dict.snapshot().to_json());
        let terms: Vec<String> = loaded.snapshot().iter().map(|e| e.term.clone()).collect();
        assert_eq!(terms, vec!["Zombie", "Apple"]);
    }
}
