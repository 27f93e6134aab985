use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::resources::{ResourceListQuery, ResourcePage, ResourceStatusSnapshot};

use super::TerminalStateHook;

/// Resource list pages keyed by the query that produced them.
///
/// Every invalidation bumps `generation`. A page loaded under an older
/// generation is not stored, so a fetch that raced an invalidation cannot
/// bring stale data back.
#[derive(Default)]
pub struct ResourceListCache {
    pages: DashMap<ResourceListQuery, ResourcePage>,
    generation: AtomicU64,
}

impl ResourceListCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn get(&self, query: &ResourceListQuery) -> Option<ResourcePage> {
        self.pages.get(query).map(|page| page.value().clone())
    }

    /// Store `page` if no invalidation happened since `generation` was read.
    pub fn insert(&self, generation: u64, query: ResourceListQuery, page: ResourcePage) -> bool {
        if generation != self.generation() {
            return false;
        }
        self.pages.insert(query, page);
        true
    }

    pub async fn get_or_load<F, Fut, E>(
        &self,
        query: &ResourceListQuery,
        load: F,
    ) -> Result<ResourcePage, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ResourcePage, E>>,
    {
        if let Some(page) = self.get(query) {
            return Ok(page);
        }
        let generation = self.generation();
        let page = load().await?;
        self.insert(generation, query.clone(), page.clone());
        Ok(page)
    }

    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.pages.clear();
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl TerminalStateHook for ResourceListCache {
    fn on_terminal(&self, snapshot: &ResourceStatusSnapshot) {
        tracing::debug!(
            resource_id = %snapshot.id,
            status = %snapshot.ingestion_status,
            "invalidating cached resource lists"
        );
        self.invalidate();
    }
}
