// src/fetchers/mod.rs
pub mod rss;

use std::collections::HashMap;
use std::sync::Arc;

use crate::items::ContentFetcher;
use crate::source::SourceKind;

/// Maps a source kind to the fetcher that serves it. Kinds with no entry are
/// logged and skipped by the scheduler, not treated as fatal.
#[derive(Default)]
pub struct FetcherRegistry {
    inner: HashMap<SourceKind, Arc<dyn ContentFetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: SourceKind, fetcher: Arc<dyn ContentFetcher>) {
        self.inner.insert(kind, fetcher);
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn ContentFetcher>> {
        self.inner.get(&kind).cloned()
    }

    pub fn supports(&self, kind: SourceKind) -> bool {
        self.inner.contains_key(&kind)
    }
}
