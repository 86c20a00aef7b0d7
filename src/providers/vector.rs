//! Vector-store search provider seam.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::ProviderError;

/// One retrieval hit.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Search across named vector stores.
#[async_trait]
pub trait VectorStoreProvider: Send + Sync + fmt::Debug {
    async fn search(
        &self,
        store_id: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ProviderError>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Named vector-store providers with a default slot.
#[derive(Debug, Default)]
pub struct VectorStoreRegistry {
    providers: FxHashMap<String, Arc<dyn VectorStoreProvider>>,
    default: Option<String>,
}

impl VectorStoreRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn VectorStoreProvider>) {
        let name = name.into();
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.providers.insert(name, provider);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn VectorStoreProvider>> {
        self.providers.get(name).cloned()
    }

    #[must_use]
    pub fn default_provider(&self) -> Option<Arc<dyn VectorStoreProvider>> {
        self.default.as_deref().and_then(|name| self.get(name))
    }
}

/// In-memory store backed by seeded documents.
///
/// Scoring is a token-overlap ratio, good enough to exercise ranking and
/// truncation deterministically. Stores listed in `fail_stores` error on
/// search, to exercise the soft-failure path.
#[derive(Debug, Default)]
pub struct MockVectorStore {
    stores: FxHashMap<String, Vec<SearchHit>>,
    fail_stores: HashSet<String>,
}

impl MockVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with `(id, content)` documents.
    pub fn seed<I, S>(&mut self, store_id: impl Into<String>, docs: I)
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let store_id = store_id.into();
        let hits = docs
            .into_iter()
            .map(|(id, content)| SearchHit {
                id: id.into(),
                content: content.into(),
                score: 0.0,
                metadata: None,
                source: Some(store_id.clone()),
            })
            .collect();
        self.stores.insert(store_id, hits);
    }

    /// Mark a store as failing, to exercise per-store error handling.
    pub fn fail_store(&mut self, store_id: impl Into<String>) {
        self.fail_stores.insert(store_id.into());
    }
}

#[async_trait]
impl VectorStoreProvider for MockVectorStore {
    async fn search(
        &self,
        store_id: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, ProviderError> {
        if self.fail_stores.contains(store_id) {
            return Err(ProviderError::request(
                "mock-vector",
                format!("store '{store_id}' errored"),
            ));
        }
        let docs = self
            .stores
            .get(store_id)
            .ok_or_else(|| ProviderError::request("mock-vector", format!("unknown store '{store_id}'")))?;
        let query_tokens: Vec<String> = tokenize(query);
        let mut hits: Vec<SearchHit> = docs
            .iter()
            .map(|doc| {
                let doc_tokens = tokenize(&doc.content);
                let overlap = query_tokens
                    .iter()
                    .filter(|t| doc_tokens.contains(t))
                    .count();
                let score = if query_tokens.is_empty() {
                    0.0
                } else {
                    overlap as f64 / query_tokens.len() as f64
                };
                SearchHit {
                    score,
                    ..doc.clone()
                }
            })
            .filter(|hit| hit.score > 0.0)
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(max_results);
        Ok(hits)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
