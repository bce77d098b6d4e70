//! Content-addressed embedding cache.
//!
//! Keys are SHA-256 digests of the model name and input text, so identical
//! inputs are embedded once per process.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::Embedder;
use crate::error::Result;

pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    entries: RwLock<HashMap<String, Vec<f32>>>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>) -> Self {
        Self {
            inner,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(&self, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.inner.model_name().as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = self.key(text);

        if let Some(hit) = self.entries.read().ok().and_then(|e| e.get(&key).cloned()) {
            return Ok(hit);
        }

        let vector = self.inner.embed(text).await?;
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key, vector.clone());
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32])
        }
    }

    #[tokio::test]
    async fn test_identical_inputs_hit_cache() {
        let inner = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedEmbedder::new(inner.clone());

        assert_eq!(cached.embed("hello").await.unwrap(), vec![5.0]);
        assert_eq!(cached.embed("hello").await.unwrap(), vec![5.0]);
        assert_eq!(cached.embed("hi").await.unwrap(), vec![2.0]);

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cached.len(), 2);
    }
}
