use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{ChunkStream, Embedder, Generator};
use crate::error::{EmbeddingError, GenerationError};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const INCOMPLETE_STREAM: &str = "stream ended before completion";
pub const DEFAULT_LLM_MODEL: &str = "qwen2.5:7b-instruct-q5_k_m";

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub embed_model: String,
    pub llm_model: String,
    pub num_ctx: u32,
    pub request_timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            num_ctx: 8192,
            request_timeout: Duration::from_secs(600),
        }
    }
}

impl OllamaConfig {
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn client(&self) -> Result<Client, reqwest::Error> {
        Client::builder().timeout(self.request_timeout).build()
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_ctx: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

/// One frame of `/api/generate` output. Streaming responses are a sequence
/// of these, one JSON object per line.
#[derive(Debug, Deserialize, PartialEq)]
pub struct GenerateFrame {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

pub struct OllamaEmbedder {
    client: Client,
    config: OllamaConfig,
}

impl OllamaEmbedder {
    pub fn new(config: OllamaConfig) -> Result<Self, EmbeddingError> {
        Ok(Self {
            client: config.client()?,
            config,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let response = self
            .client
            .post(self.config.endpoint("api/embeddings"))
            .json(&EmbeddingRequest {
                model: &self.config.embed_model,
                prompt: text,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(EmbeddingError::Provider(format!("status {}: {}", status, error_body)));
        }

        let body = response.json::<EmbeddingResponse>().await?;
        if body.embedding.is_empty() {
            return Err(EmbeddingError::EmptyVector);
        }
        Ok(body.embedding)
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}

pub struct OllamaGenerator {
    client: Client,
    config: OllamaConfig,
}

impl OllamaGenerator {
    pub fn new(config: OllamaConfig) -> Result<Self, GenerationError> {
        Ok(Self {
            client: config.client()?,
            config,
        })
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response, GenerationError> {
        let response = self
            .client
            .post(self.config.endpoint("api/generate"))
            .json(&GenerateRequest {
                model: &self.config.llm_model,
                prompt,
                stream,
                options: GenerateOptions {
                    num_ctx: self.config.num_ctx,
                },
            })
            .send()
            .await
            .map_err(map_request_error)?;

        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            Err(GenerationError::Provider(format!("status {}: {}", status, error_body)))
        }
    }
}

fn map_request_error(err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Http(err)
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let response = self.send(prompt, false).await?;
        let frame = response
            .json::<GenerateFrame>()
            .await
            .map_err(map_request_error)?;
        match frame.error {
            Some(message) => Err(GenerationError::Provider(message)),
            None => Ok(frame.response),
        }
    }

    async fn generate_stream(&self, prompt: &str) -> Result<ChunkStream, GenerationError> {
        let response = self.send(prompt, true).await?;
        debug!(model = %self.config.llm_model, "streaming generation started");

        let frames = response
            .bytes_stream()
            .map(Some)
            .chain(stream::once(futures::future::ready(None)))
            .scan(LineBuffer::default(), |lines, chunk| {
                let parsed: Vec<Result<GenerateFrame, GenerationError>> = match chunk {
                    Some(Ok(bytes)) => {
                        lines.push(&bytes).iter().map(|line| parse_frame(line)).collect()
                    }
                    Some(Err(e)) => vec![Err(map_request_error(e))],
                    None => lines.finish().iter().map(|line| parse_frame(line)).collect(),
                };
                futures::future::ready(Some(parsed))
            })
            .flat_map(stream::iter);

        Ok(frames_to_chunks(frames).boxed())
    }

    fn model_name(&self) -> &str {
        &self.config.llm_model
    }
}

/// Turns provider frames into text chunks, ending after the `done` frame or
/// after the first error. Empty chunks are skipped. Frames that run out
/// before `done` end with [`INCOMPLETE_STREAM`] as a provider error.
pub fn frames_to_chunks<S>(
    frames: S,
) -> impl futures::Stream<Item = Result<String, GenerationError>>
where
    S: futures::Stream<Item = Result<GenerateFrame, GenerationError>>,
{
    frames
        .map(Some)
        .chain(stream::once(futures::future::ready(None)))
        .scan(false, |finished, frame| {
            if *finished {
                return futures::future::ready(None);
            }
            let item = match frame {
                None => {
                    *finished = true;
                    Err(GenerationError::Provider(INCOMPLETE_STREAM.to_string()))
                }
                Some(Ok(GenerateFrame { error: Some(message), .. })) => {
                    *finished = true;
                    Err(GenerationError::Provider(message))
                }
                Some(Ok(frame)) => {
                    *finished = frame.done;
                    Ok(frame.response)
                }
                Some(Err(e)) => {
                    *finished = true;
                    Err(e)
                }
            };
            futures::future::ready(Some(item))
        })
        .filter(|item| futures::future::ready(!matches!(item, Ok(text) if text.is_empty())))
}

fn parse_frame(line: &[u8]) -> Result<GenerateFrame, GenerationError> {
    serde_json::from_slice(line)
        .map_err(|e| GenerationError::Provider(format!("malformed stream frame: {}", e)))
}

/// Splits a byte stream into newline-terminated lines, holding partial lines
/// until the rest arrives. Blank lines are dropped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if !line.iter().all(u8::is_ascii_whitespace) {
                lines.push(line);
            }
        }
        lines
    }

    /// Drains an unterminated trailing line once the byte stream has ended.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let line = std::mem::take(&mut self.pending);
        (!line.iter().all(u8::is_ascii_whitespace)).then_some(line)
    }
}
