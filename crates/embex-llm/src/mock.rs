//! Test-only deterministic provider.
//!
//! Embeddings are a hashed bag of words, so texts sharing vocabulary score
//! higher than unrelated ones and identical texts always embed identically.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::LlmError;
use crate::provider::{AnswerGenerator, ContextChunk, Embedder};

#[derive(Debug, Clone)]
pub struct MockProvider {
    pub dimensions: usize,
    pub answer: String,
    /// Milliseconds to sleep before answering an embed call.
    pub delay_ms: u64,
    pinned: Arc<Mutex<Vec<(String, Vec<f32>)>>>,
    fail_embed: Arc<AtomicBool>,
    embed_calls: Arc<AtomicUsize>,
    generate_calls: Arc<AtomicUsize>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            dimensions: 64,
            answer: "mock answer".into(),
            delay_ms: 0,
            pinned: Arc::new(Mutex::new(Vec::new())),
            fail_embed: Arc::new(AtomicBool::new(false)),
            embed_calls: Arc::new(AtomicUsize::new(0)),
            generate_calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn failing() -> Self {
        let provider = Self::default();
        provider.set_fail_embed(true);
        provider
    }

    #[must_use]
    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = answer.into();
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Any text containing `marker` embeds to `vector` (first match wins).
    #[must_use]
    pub fn with_pinned(self, marker: impl Into<String>, vector: Vec<f32>) -> Self {
        self.pinned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((marker.into(), vector));
        self
    }

    pub fn set_fail_embed(&self, fail: bool) {
        self.fail_embed.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.embed_calls.store(0, Ordering::SeqCst);
        self.generate_calls.store(0, Ordering::SeqCst);
    }

    fn hashed_bag_of_words(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions.max(1)];
        let len = vector.len();
        for token in text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
        {
            let digest = blake3::hash(token.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest.as_bytes()[..8]);
            #[allow(clippy::cast_possible_truncation)]
            let idx = (u64::from_le_bytes(bucket) % len as u64) as usize;
            vector[idx] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Embedder for MockProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_embed.load(Ordering::SeqCst) {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        let pinned = self
            .pinned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(marker, _)| text.contains(marker.as_str()))
            .map(|(_, v)| v.clone());
        Ok(pinned.unwrap_or_else(|| self.hashed_bag_of_words(text)))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

impl AnswerGenerator for MockProvider {
    async fn generate(&self, _question: &str, context: &[ContextChunk]) -> Result<String, LlmError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        let cited: Vec<&str> = context.iter().map(|c| c.path.as_str()).collect();
        Ok(format!("{} [{}]", self.answer, cited.join(", ")))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}
