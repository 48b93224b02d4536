#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nutri_rag::document::{build_document, Document, Row};
use nutri_rag::error::{EmbeddingError, GenerationError};
use nutri_rag::index::{IndexArtifact, IndexBuilder, PROBE_TEXT};
use nutri_rag::providers::{ChunkStream, Embedder, Generator};

pub const DIM: usize = 8;

/// Deterministic bag-of-words embedder that counts document/query calls.
/// The dimension probe is not counted.
#[derive(Default)]
pub struct CountingEmbedder {
    calls: AtomicUsize,
    probes: AtomicUsize,
    failing: AtomicBool,
    dimension_override: Option<usize>,
}

impl CountingEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let e = Self::default();
        e.failing.store(true, Ordering::SeqCst);
        e
    }

    pub fn with_dimension(dim: usize) -> Self {
        Self {
            dimension_override: Some(dim),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

pub fn bag_of_words(text: &str, dim: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let hash = word
            .to_lowercase()
            .bytes()
            .fold(0xcbf29ce484222325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3));
        v[(hash % dim as u64) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text == PROBE_TEXT {
            self.probes.fetch_add(1, Ordering::SeqCst);
        } else {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Provider("connection refused".into()));
        }
        Ok(bag_of_words(text, self.dimension_override.unwrap_or(DIM)))
    }

    fn model_name(&self) -> &str {
        "counting"
    }
}

/// Generator that replays a fixed script and records every prompt.
pub struct ScriptedGenerator {
    chunks: Vec<String>,
    fail_after: Option<usize>,
    chunk_delay: Duration,
    prompts: Mutex<Vec<String>>,
    pulled: Arc<AtomicUsize>,
}

impl ScriptedGenerator {
    pub fn answering(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            fail_after: None,
            chunk_delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
            pulled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Emits `n` chunks, then fails. `n == 0` fails the whole request.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Chunks consumed so far from streams this generator produced.
    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail_after.is_some() {
            return Err(GenerationError::Provider("model not found".into()));
        }
        tokio::time::sleep(self.chunk_delay).await;
        Ok(self.chunks.concat())
    }

    async fn generate_stream(&self, prompt: &str) -> Result<ChunkStream, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail_after == Some(0) {
            return Err(GenerationError::Provider("model not found".into()));
        }

        let mut items: Vec<Result<String, GenerationError>> =
            self.chunks.iter().cloned().map(Ok).collect();
        if let Some(n) = self.fail_after {
            items.truncate(n);
            items.push(Err(GenerationError::Provider("connection reset".into())));
        }

        let delay = self.chunk_delay;
        let pulled = Arc::clone(&self.pulled);
        Ok(stream::iter(items)
            .then(move |item| {
                let pulled = Arc::clone(&pulled);
                async move {
                    tokio::time::sleep(delay).await;
                    pulled.fetch_add(1, Ordering::SeqCst);
                    item
                }
            })
            .boxed())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub const FOODS: [(&str, &str, &str); 4] = [
    ("Banana", "89", "fruit rich in potassium"),
    ("Kiwi", "61", "fruit rich in vitamin C"),
    ("Salmon", "208", "oily fish rich in omega 3"),
    ("Oats", "389", "whole grain rich in fiber"),
];

pub fn food_documents() -> Vec<Document> {
    FOODS
        .iter()
        .enumerate()
        .map(|(i, (food, kcal, notes))| {
            let row = Row::from_pairs(i, &[("food", food), ("calories", kcal), ("notes", notes)]);
            build_document(&row, "data/foods.csv").expect("fixture row is not empty")
        })
        .collect()
}

pub async fn food_artifact(embedder: &CountingEmbedder) -> IndexArtifact {
    IndexBuilder::new(embedder)
        .build(food_documents())
        .await
        .expect("fixture builds")
}
