use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::bail;

use crate::models::{ChatModel, ChatModelFactory};

/// Round-robin over a fixed, non-empty set. Shared by all workers.
pub struct CredentialCycle<T> {
    items: Vec<T>,
    next: AtomicUsize,
}

impl<T: Clone> CredentialCycle<T> {
    pub fn new(items: Vec<T>) -> anyhow::Result<Self> {
        if items.is_empty() {
            bail!("credential cycle needs at least one entry");
        }
        Ok(Self {
            items,
            next: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn next(&self) -> T {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.items.len();
        self.items[i].clone()
    }
}

/// One model client per credential, in configuration order.
pub fn model_cycle(
    factory: &dyn ChatModelFactory,
    credentials: &[String],
) -> anyhow::Result<CredentialCycle<Arc<dyn ChatModel>>> {
    let models = credentials
        .iter()
        .map(|c| factory.create(c))
        .collect::<anyhow::Result<Vec<_>>>()?;
    CredentialCycle::new(models)
}
