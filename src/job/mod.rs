pub mod credentials;
pub mod pacing;
pub mod report;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::ItemError;
use crate::formats::{Document, FormatKind};
use crate::pipeline::{TranslationPipeline, UnitOutcome, UnitStatus};
use crate::terminology::Dictionary;

use self::pacing::PacedModel;
use self::report::{FailureRecord, ItemOutput, JobReport};

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Clone, Debug, PartialEq)]
pub struct JobSettings {
    pub concurrency: usize,
    /// Concurrent sub-workers per file.
    pub per_file_split: usize,
    pub shuffle_items: bool,
    pub checkpoint_interval: Duration,
    /// Dictionary checkpoint target; no checkpoints when unset.
    pub dictionary_path: Option<PathBuf>,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            per_file_split: 1,
            shuffle_items: false,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            dictionary_path: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct WorkItem {
    pub input_location: PathBuf,
    pub output_location: PathBuf,
    pub format: FormatKind,
    pub source_data: Document,
}

impl WorkItem {
    pub fn in_memory(name: &str, source_data: Document) -> Self {
        Self {
            input_location: PathBuf::from(name),
            output_location: PathBuf::from(name),
            format: FormatKind::Json,
            source_data,
        }
    }
}

#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn persist(&self, item: &WorkItem, data: &Document) -> Result<(), ItemError>;
}

/// Keeps results in the job report only.
pub struct DiscardSink;

#[async_trait]
impl OutputSink for DiscardSink {
    async fn persist(&self, _item: &WorkItem, _data: &Document) -> Result<(), ItemError> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum PathSegment {
    Key(String),
    Index(usize),
}

type LeafPath = Vec<PathSegment>;

fn collect_leaves(doc: &Document) -> Vec<(LeafPath, String)> {
    let mut out = Vec::new();
    for (k, v) in doc {
        walk_value(v, vec![PathSegment::Key(k.clone())], &mut out);
    }
    out
}

fn walk_value(value: &Value, path: LeafPath, out: &mut Vec<(LeafPath, String)>) {
    match value {
        Value::String(s) => out.push((path, s.clone())),
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                let mut p = path.clone();
                p.push(PathSegment::Index(i));
                walk_value(v, p, out);
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                let mut p = path.clone();
                p.push(PathSegment::Key(k.clone()));
                walk_value(v, p, out);
            }
        }
        _ => {}
    }
}

fn render_path(path: &[PathSegment]) -> String {
    let mut out = String::new();
    for seg in path {
        match seg {
            PathSegment::Key(k) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(k);
            }
            PathSegment::Index(i) => out.push_str(&format!("[{i}]")),
        }
    }
    out
}

fn set_leaf(doc: &mut Document, path: &[PathSegment], text: String) {
    let Some((PathSegment::Key(first), rest)) = path.split_first() else {
        return;
    };
    let Some(mut node) = doc.get_mut(first) else {
        return;
    };
    for seg in rest {
        node = match (seg, node) {
            (PathSegment::Key(k), Value::Object(m)) => match m.get_mut(k) {
                Some(n) => n,
                None => return,
            },
            (PathSegment::Index(i), Value::Array(a)) => match a.get_mut(*i) {
                Some(n) => n,
                None => return,
            },
            _ => return,
        };
    }
    *node = Value::String(text);
}

struct Shared {
    settings: JobSettings,
    pipeline: TranslationPipeline,
    model: PacedModel,
    sink: Arc<dyn OutputSink>,
}

#[derive(Default)]
struct WorkerResult {
    outputs: Vec<ItemOutput>,
    failures: Vec<FailureRecord>,
}

impl Shared {
    async fn process(&self, item: &WorkItem) -> Result<ItemOutput, ItemError> {
        let leaves = collect_leaves(&item.source_data);
        let split = self.settings.per_file_split.clamp(1, leaves.len().max(1));
        let mut chunks: Vec<Vec<(LeafPath, String)>> = (0..split).map(|_| Vec::new()).collect();
        for (i, leaf) in leaves.into_iter().enumerate() {
            chunks[i % split].push(leaf);
        }
        if self.settings.shuffle_items {
            let mut rng = rand::thread_rng();
            for chunk in &mut chunks {
                chunk.shuffle(&mut rng);
            }
        }

        let file = item.input_location.display().to_string();
        // Every chunk settles before the first error surfaces; in-flight calls are not dropped.
        let settled = join_all(chunks.into_iter().map(|c| self.translate_chunk(&file, c))).await;
        let done = settled.into_iter().collect::<Result<Vec<_>, _>>()?;

        let mut data = item.source_data.clone();
        let mut strings = 0usize;
        let mut warnings = 0usize;
        for (path, outcome) in done.into_iter().flatten() {
            strings += 1;
            if matches!(outcome.status, UnitStatus::RestoredWithWarnings(_)) {
                warnings += 1;
            }
            set_leaf(&mut data, &path, outcome.text);
        }
        self.sink.persist(item, &data).await?;

        Ok(ItemOutput {
            input_location: item.input_location.clone(),
            output_location: item.output_location.clone(),
            data,
            strings,
            warnings,
        })
    }

    async fn translate_chunk(
        &self,
        file: &str,
        chunk: Vec<(LeafPath, String)>,
    ) -> Result<Vec<(LeafPath, UnitOutcome)>, ItemError> {
        let mut out = Vec::with_capacity(chunk.len());
        for (path, text) in chunk {
            let key = format!("{file}#{}", render_path(&path));
            let outcome = self.pipeline.translate(&key, &text, &self.model).await?;
            out.push((path, outcome));
        }
        Ok(out)
    }
}

async fn worker_loop(
    id: usize,
    shared: Arc<Shared>,
    queue: Arc<Mutex<VecDeque<WorkItem>>>,
) -> WorkerResult {
    let mut result = WorkerResult::default();
    loop {
        let next = queue.lock().pop_front();
        let Some(item) = next else {
            break;
        };
        let path = item.input_location.clone();
        match shared.process(&item).await {
            Ok(out) => {
                info!(
                    worker = id,
                    path = %path.display(),
                    strings = out.strings,
                    warnings = out.warnings,
                    "item done"
                );
                result.outputs.push(out);
            }
            Err(err) => {
                warn!(worker = id, path = %path.display(), "item failed: {err}");
                result.failures.push(FailureRecord::from_error(&path, &err));
            }
        }
    }
    debug!(worker = id, "queue drained");
    result
}

async fn save_checkpoint(dictionary: Arc<Dictionary>, path: PathBuf) {
    let saved = tokio::task::spawn_blocking(move || {
        let saved = dictionary.save_json(&path);
        (saved, path, dictionary.len())
    })
    .await;
    match saved {
        Ok((Ok(()), path, terms)) => debug!(path = %path.display(), terms, "dictionary checkpoint"),
        Ok((Err(err), _, _)) => warn!("dictionary checkpoint failed: {err:#}"),
        Err(err) => error!("checkpoint task stopped abnormally: {err}"),
    }
}

async fn checkpoint_loop(
    dictionary: Arc<Dictionary>,
    path: PathBuf,
    every: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let every = every.max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => save_checkpoint(dictionary.clone(), path.clone()).await,
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }
}

/// A batch of work items sharing one dictionary, one paced model and one sink.
pub struct Job {
    shared: Arc<Shared>,
}

impl Job {
    pub fn new(
        settings: JobSettings,
        pipeline: TranslationPipeline,
        model: PacedModel,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                pipeline,
                model,
                sink,
            }),
        }
    }

    pub fn dictionary(&self) -> &Arc<Dictionary> {
        self.shared.pipeline.dictionary()
    }

    /// Drains `items` with the worker pool. Item failures are collected, never
    /// propagated.
    pub async fn run(&self, items: Vec<WorkItem>) -> JobReport {
        let settings = &self.shared.settings;
        let workers = settings.concurrency.max(1).min(items.len().max(1));
        info!(items = items.len(), workers, split = settings.per_file_split, "job started");

        let queue = Arc::new(Mutex::new(VecDeque::from(items)));
        let (stop_tx, stop_rx) = watch::channel(false);
        let checkpoint = settings.dictionary_path.clone().map(|path| {
            tokio::spawn(checkpoint_loop(
                self.dictionary().clone(),
                path,
                settings.checkpoint_interval,
                stop_rx,
            ))
        });

        let mut pool = JoinSet::new();
        for id in 0..workers {
            pool.spawn(worker_loop(id, self.shared.clone(), queue.clone()));
        }
        let mut outputs = Vec::new();
        let mut failures = Vec::new();
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(done) => {
                    outputs.extend(done.outputs);
                    failures.extend(done.failures);
                }
                Err(err) => error!("worker stopped abnormally: {err}"),
            }
        }

        let _ = stop_tx.send(true);
        if let Some(handle) = checkpoint {
            if let Err(err) = handle.await {
                error!("checkpoint task stopped abnormally: {err}");
            }
        }
        if let Some(path) = settings.dictionary_path.clone() {
            save_checkpoint(self.dictionary().clone(), path).await;
        }

        outputs.sort_by(|a: &ItemOutput, b: &ItemOutput| a.input_location.cmp(&b.input_location));
        failures.sort_by(|a: &FailureRecord, b: &FailureRecord| a.path.cmp(&b.path));
        let report = JobReport {
            outputs,
            failures,
            dictionary: self.dictionary().snapshot(),
        };
        info!("{}", report.summary());
        report
    }
}
