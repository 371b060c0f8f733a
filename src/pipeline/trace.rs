use std::path::{Path, PathBuf};

use anyhow::Context;
use sha2::{Digest, Sha256};

/// Dumps prompts and replies, one file per attempt.
pub struct TraceWriter {
    dir: PathBuf,
    enabled: bool,
}

impl TraceWriter {
    pub fn new(dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let Some(dir) = dir else {
            return Ok(Self::disabled());
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create trace dir: {}", dir.display()))?;
        Ok(Self { dir, enabled: true })
    }

    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn write_attempt(&self, unit_key: &str, attempt: u32, kind: &str, text: &str) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let name = format!("{}.a{attempt:02}.{kind}.txt", unit_hash(unit_key));
        let path = self.dir.join(sanitize_filename(&name));
        tokio::fs::write(&path, text)
            .await
            .with_context(|| format!("write trace: {}", path.display()))?;
        Ok(())
    }
}

fn unit_hash(unit_key: &str) -> String {
    let digest = Sha256::digest(unit_key.as_bytes());
    hex::encode(&digest[..8])
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => ch,
        })
        .collect()
}
