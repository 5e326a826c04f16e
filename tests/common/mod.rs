//! Deterministic capabilities for driving the pipeline without a model server.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use founder_rag::llm::{Embedder, Generator, InputKind, Prompt};
use founder_rag::store::RecordInput;

fn fnv1a(token: &str) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in token.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

/// Bag-of-words feature hashing that counts every call and text it sees.
pub struct CountingEmbedder {
    dim: usize,
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
    document_delay: Duration,
}

impl CountingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
            document_delay: Duration::ZERO,
        }
    }

    /// Sleep before every document batch. Query embedding stays instant.
    pub fn with_document_delay(mut self, delay: Duration) -> Self {
        self.document_delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts_embedded(&self) -> usize {
        self.texts.lock().len()
    }

    pub fn embedded_texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        let mut any = false;
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = (fnv1a(&token.to_lowercase()) % self.dim as u64) as usize;
            v[bucket] += 1.0;
            any = true;
        }
        if !any {
            v[self.dim - 1] = 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    async fn embed(&self, texts: &[String], kind: InputKind) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if kind == InputKind::Document {
            if !self.document_delay.is_zero() {
                tokio::time::sleep(self.document_delay).await;
            }
            self.texts.lock().extend(texts.iter().cloned());
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }
}

/// Returns a fixed reply and keeps every prompt.
pub struct RecordingGenerator {
    reply: String,
    prompts: Mutex<Vec<Prompt>>,
}

impl RecordingGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn last_prompt(&self) -> Option<Prompt> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        self.prompts.lock().push(prompt.clone());
        Ok(self.reply.clone())
    }
}

pub fn founder(id: &str, name: &str, company: &str, about: &str) -> RecordInput {
    RecordInput::new(id)
        .text("founder_name", name)
        .text("company", company)
        .text("about", about)
}

/// The three-founder fixture: two London fintechs and a Berlin biotech.
pub fn fixture() -> Vec<RecordInput> {
    vec![
        founder("A1", "Ada Park", "PayCo", "fintech, Series B, London"),
        founder("A2", "Ben Osei", "GeneLab", "biotech, seed, Berlin"),
        founder("A3", "Cleo Ruiz", "Ledgerly", "fintech, seed, London"),
    ]
}
