use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, ItemError};
use crate::formats::Document;
use crate::terminology::DictionarySnapshot;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureRecord {
    pub path: String,
    pub error_kind: ErrorKind,
    pub message: String,
}

impl FailureRecord {
    pub fn from_error(path: &Path, err: &ItemError) -> Self {
        Self {
            path: path.display().to_string(),
            error_kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ItemOutput {
    pub input_location: PathBuf,
    pub output_location: PathBuf,
    pub data: Document,
    pub strings: usize,
    /// Strings emitted with unresolved placeholder problems.
    pub warnings: usize,
}

#[derive(Clone, Debug)]
pub struct JobReport {
    pub outputs: Vec<ItemOutput>,
    pub failures: Vec<FailureRecord>,
    pub dictionary: DictionarySnapshot,
}

impl JobReport {
    pub fn summary(&self) -> String {
        let strings: usize = self.outputs.iter().map(|o| o.strings).sum();
        let warnings: usize = self.outputs.iter().map(|o| o.warnings).sum();
        format!(
            "{} files translated ({strings} strings, {warnings} with warnings), {} failed, {} dictionary terms",
            self.outputs.len(),
            self.failures.len(),
            self.dictionary.len()
        )
    }
}

/// Writes the failure log. Nothing is written when there were no failures.
pub fn write_failure_log(path: &Path, failures: &[FailureRecord]) -> anyhow::Result<bool> {
    if failures.is_empty() {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dir {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(failures)?;
    std::fs::write(path, json).with_context(|| format!("write failure log {}", path.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ModelError, RequestErrorKind};

    #[test]
    fn failure_log_is_written_only_when_needed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("failures.json");
        assert!(!write_failure_log(&path, &[]).unwrap());
        assert!(!path.exists());

        let err = ItemError::from(ModelError::request(RequestErrorKind::Auth, "401: bad key"));
        let rec = FailureRecord::from_error(Path::new("a/en_us.json"), &err);
        assert!(write_failure_log(&path, &[rec.clone()]).unwrap());

        let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v[0]["error_kind"], "model_auth");
        assert_eq!(v[0]["path"], "a/en_us.json");
        let back: Vec<FailureRecord> = serde_json::from_value(v).unwrap();
        assert_eq!(back, vec![rec]);
    }
}
