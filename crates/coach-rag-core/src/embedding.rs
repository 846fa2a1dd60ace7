//! Embedding provider trait, failure-isolated fan-out, and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, plus [`embed_chunks`], which embeds a batch of chunk texts
//! concurrently while isolating each call's failure.
//!
//! Concrete provider implementations (OpenAI, Ollama) live in the
//! `coach-rag` app crate.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::models::ChunkFailure;

/// Trait for embedding providers.
///
/// One call embeds one text. Implementations may fail per call; callers
/// are expected to isolate those failures.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Successful and failed embeddings of one chunk batch, each sorted by
/// chunk index.
#[derive(Debug, Default)]
pub struct EmbeddedBatch {
    pub embedded: Vec<(usize, Vec<f32>)>,
    pub failures: Vec<ChunkFailure>,
}

/// Embed every text in `texts` with at most `max_concurrency` calls in
/// flight.
///
/// Each call is tagged with its index. Results are reassembled by index,
/// never by completion order, and a failing call is recorded as a
/// [`ChunkFailure`] without affecting the others.
pub async fn embed_chunks(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    max_concurrency: usize,
) -> EmbeddedBatch {
    let calls: Vec<_> = texts
        .iter()
        .enumerate()
        .map(|(index, text)| async move { (index, provider.embed(text).await) })
        .collect();
    let mut results: Vec<(usize, Result<Vec<f32>>)> = stream::iter(calls)
        .buffer_unordered(max_concurrency.max(1))
        .collect()
        .await;
    results.sort_by_key(|(index, _)| *index);

    let mut batch = EmbeddedBatch::default();
    for (chunk_index, result) in results {
        match result {
            Ok(vector) => batch.embedded.push((chunk_index, vector)),
            Err(e) => batch.failures.push(ChunkFailure {
                chunk_index,
                error: format!("{:#}", e),
            }),
        }
    }
    batch
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing
/// a BLOB of `vec.len() × 4` bytes.
///
/// # Example
///
/// ```rust
/// use coach_rag_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]. Trailing bytes that do not form a whole
/// `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Fails on texts containing "boom"; sleeps longer for earlier indices
    /// so completion order is the reverse of submission order.
    struct SlowReverse;

    #[async_trait]
    impl EmbeddingProvider for SlowReverse {
        fn model_name(&self) -> &str {
            "slow-reverse"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let n: u64 = text.trim_start_matches("boom").parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(50 - n * 10)).await;
            if text.starts_with("boom") {
                anyhow::bail!("embedding service returned 500");
            }
            Ok(vec![n as f32])
        }
    }

    #[tokio::test]
    async fn test_results_are_in_index_order() {
        let texts: Vec<String> = (0..5).map(|i| i.to_string()).collect();
        let batch = embed_chunks(&SlowReverse, &texts, 5).await;
        let indices: Vec<usize> = batch.embedded.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        for (i, v) in &batch.embedded {
            assert_eq!(v[0], *i as f32);
        }
        assert!(batch.failures.is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let texts: Vec<String> = vec!["0".into(), "boom1".into(), "2".into(), "3".into()];
        let batch = embed_chunks(&SlowReverse, &texts, 2).await;
        assert_eq!(batch.embedded.len(), 3);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].chunk_index, 1);
        assert!(batch.failures[0].error.contains("500"));
    }

    #[tokio::test]
    async fn test_fan_out_runs_on_a_spawned_task() {
        // Spawning requires the borrowing future to be `Send`.
        let provider: std::sync::Arc<dyn EmbeddingProvider> = std::sync::Arc::new(SlowReverse);
        let texts: Vec<String> = (0..3).map(|i| i.to_string()).collect();
        let batch = tokio::spawn(async move { embed_chunks(provider.as_ref(), &texts, 2).await })
            .await
            .unwrap();
        assert_eq!(batch.embedded.len(), 3);
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }
}
