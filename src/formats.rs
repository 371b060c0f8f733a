use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{ItemError, ParserError};
use crate::job::report::FailureRecord;
use crate::job::{OutputSink, WorkItem};

/// Ordered string-keyed tree loaded from an asset file.
pub type Document = serde_json::Map<String, Value>;

pub trait Parser: Send + Sync {
    fn name(&self) -> &'static str;
    fn load(&self, content: &str) -> Result<Document, ParserError>;
    fn save(&self, doc: &Document) -> Result<String, ParserError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormatKind {
    Json,
    Lang,
}

struct FormatRule {
    kind: FormatKind,
    extensions: &'static [&'static str],
}

/// Checked in order; the first rule listing the extension wins.
const FORMAT_RULES: &[FormatRule] = &[
    FormatRule {
        kind: FormatKind::Json,
        extensions: &["json", "jsonc", "json5", "mcmeta"],
    },
    FormatRule {
        kind: FormatKind::Lang,
        extensions: &["lang", "properties"],
    },
];

static JSON_PARSER: JsonParser = JsonParser;
static LANG_PARSER: LangParser = LangParser;

impl FormatKind {
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        FORMAT_RULES
            .iter()
            .find(|r| r.extensions.contains(&ext.as_str()))
            .map(|r| r.kind)
    }

    pub fn parser(self) -> &'static dyn Parser {
        match self {
            FormatKind::Json => &JSON_PARSER,
            FormatKind::Lang => &LANG_PARSER,
        }
    }
}

/// Decodes file bytes, honouring a UTF-8/UTF-16 byte order mark.
pub fn decode_text(bytes: &[u8]) -> String {
    match encoding_rs::Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) => encoding
            .decode_without_bom_handling(&bytes[bom_len..])
            .0
            .into_owned(),
        None => encoding_rs::UTF_8
            .decode_without_bom_handling(bytes)
            .0
            .into_owned(),
    }
}

pub struct JsonParser;

impl Parser for JsonParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn load(&self, content: &str) -> Result<Document, ParserError> {
        let stripped = strip_json_comments(content);
        let value: Value = serde_json::from_str(&stripped).map_err(|e| ParserError::Syntax {
            format: "json",
            message: e.to_string(),
        })?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(ParserError::Syntax {
                format: "json",
                message: "top-level value must be an object".to_string(),
            }),
        }
    }

    fn save(&self, doc: &Document) -> Result<String, ParserError> {
        let mut out = serde_json::to_string_pretty(doc).map_err(|e| ParserError::Syntax {
            format: "json",
            message: e.to_string(),
        })?;
        out.push('\n');
        Ok(out)
    }
}

fn strip_json_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;
    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        let next = chars.peek().copied();
        match (ch, next) {
            ('"', _) => {
                in_string = true;
                out.push(ch);
            }
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

/// `key=value` language files; `#` comments and blank lines are skipped.
pub struct LangParser;

impl Parser for LangParser {
    fn name(&self) -> &'static str {
        "lang"
    }

    fn load(&self, content: &str) -> Result<Document, ParserError> {
        let mut doc = Document::new();
        for (n, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (key, value) = trimmed.split_once('=').ok_or_else(|| ParserError::Syntax {
                format: "lang",
                message: format!("line {}: expected key=value", n + 1),
            })?;
            doc.insert(key.trim().to_string(), Value::String(value.to_string()));
        }
        Ok(doc)
    }

    fn save(&self, doc: &Document) -> Result<String, ParserError> {
        let mut out = String::new();
        for (key, value) in doc {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(ParserError::Unrepresentable {
                        format: "lang",
                        key: key.clone(),
                    })
                }
            };
            out.push_str(key);
            out.push('=');
            out.push_str(&text);
            out.push('\n');
        }
        Ok(out)
    }
}

pub fn load_document(path: &Path) -> anyhow::Result<Document> {
    let kind = FormatKind::detect(path)
        .ok_or_else(|| ParserError::Unsupported(path.display().to_string()))?;
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let doc = kind
        .parser()
        .load(&decode_text(&bytes))
        .with_context(|| format!("parse {}", path.display()))?;
    Ok(doc)
}

fn collect_inputs(root: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if root.is_file() {
        out.push(root.to_path_buf());
        return Ok(());
    }
    let mut entries: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_inputs(&path, out)?;
        } else if FormatKind::detect(&path).is_some() {
            out.push(path);
        }
    }
    Ok(())
}

/// Builds work items from files and directories. Unreadable or unparsable
/// files become failure records instead of aborting the batch.
pub fn load_work_items(inputs: &[PathBuf], output_dir: &Path) -> (Vec<WorkItem>, Vec<FailureRecord>) {
    let mut items = Vec::new();
    let mut failures = Vec::new();
    for root in inputs {
        let mut files = Vec::new();
        if let Err(err) = collect_inputs(root, &mut files) {
            failures.push(FailureRecord::from_error(root, &ItemError::io(root, err)));
            continue;
        }
        for file in files {
            let rel = if root.is_dir() {
                file.strip_prefix(root).unwrap_or(&file).to_path_buf()
            } else {
                file.file_name().map(PathBuf::from).unwrap_or_else(|| file.clone())
            };
            match read_work_item(&file, output_dir.join(rel)) {
                Ok(item) => items.push(item),
                Err(err) => failures.push(FailureRecord::from_error(&file, &err)),
            }
        }
    }
    debug!("loaded {} work items ({} unreadable)", items.len(), failures.len());
    (items, failures)
}

pub fn read_work_item(input: &Path, output: PathBuf) -> Result<WorkItem, ItemError> {
    let kind = FormatKind::detect(input)
        .ok_or_else(|| ParserError::Unsupported(input.display().to_string()))?;
    let bytes = std::fs::read(input).map_err(|e| ItemError::io(input, e))?;
    let source_data = kind.parser().load(&decode_text(&bytes))?;
    Ok(WorkItem {
        input_location: input.to_path_buf(),
        output_location: output,
        format: kind,
        source_data,
    })
}

/// Serializes each translated document with its own parser and writes it.
pub struct FileSink;

#[async_trait]
impl OutputSink for FileSink {
    async fn persist(&self, item: &WorkItem, data: &Document) -> Result<(), ItemError> {
        let text = item.format.parser().save(data)?;
        let path = &item.output_location;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ItemError::io(parent, e))?;
        }
        tokio::fs::write(path, text)
            .await
            .map_err(|e| ItemError::io(path, e))?;
        debug!(format = item.format.parser().name(), path = %path.display(), "output written");
        Ok(())
    }
}
