//! Ollama-backed implementations of the embedding and summarizer seams.
//!
//! One shared [`OllamaClient`] wraps the HTTP connection pool; thin adapter
//! types plug it into [`EmbeddingProvider`] and [`Summarizer`]. Everything
//! here is plain request/response JSON; streaming is explicitly disabled on
//! the generate endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::embeddings::EmbeddingProvider;
use crate::summarize::Summarizer;
use crate::types::{ChunkError, Result};

const EMBED_TIMEOUT: Duration = Duration::from_secs(30);
const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);
/// Requests above this size get truncated before hitting the embedding
/// endpoint; chunking keeps inputs well below it in practice.
const MAX_EMBED_INPUT: usize = 12_000;

/// Shared connection to an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: Url,
}

impl OllamaClient {
    /// Connects to `base_url` (e.g. `http://localhost:11434`).
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ChunkError::InvalidArgument(format!("bad ollama url: {e}")))?;
        let http = Client::builder()
            .timeout(GENERATE_TIMEOUT)
            .build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ChunkError::InvalidArgument(format!("bad ollama path '{path}': {e}")))
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

/// [`EmbeddingProvider`] over Ollama's `/api/embeddings`.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    /// `dimensions` must match the configured model's output width; it is
    /// also the width of the zero vectors stored for blank inputs.
    pub fn new(client: OllamaClient, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            client,
            model: model.into(),
            dimensions,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let prompt = if text.len() > MAX_EMBED_INPUT {
            let mut end = MAX_EMBED_INPUT;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            &text[..end]
        } else {
            text
        };
        let url = self.client.endpoint("/api/embeddings")?;
        let response = self
            .client
            .http
            .post(url)
            .timeout(EMBED_TIMEOUT)
            .json(&EmbeddingsRequest {
                model: &self.model,
                prompt,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ChunkError::ExternalService(format!(
                "embeddings request failed: status={}",
                response.status()
            )));
        }
        let body: EmbeddingsResponse = response.json().await?;
        if body.embedding.is_empty() {
            return Err(ChunkError::ExternalService(
                "embeddings response was empty".into(),
            ));
        }
        if body.embedding.len() != self.dimensions {
            return Err(ChunkError::ExternalService(format!(
                "model returned {} dimensions, expected {}",
                body.embedding.len(),
                self.dimensions
            )));
        }
        Ok(body.embedding)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// [`Summarizer`] over Ollama's `/api/generate`.
#[derive(Debug, Clone)]
pub struct OllamaSummarizer {
    client: OllamaClient,
    model: String,
}

impl OllamaSummarizer {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Identifies the endpoint for cache scoping.
    pub fn endpoint_id(&self) -> String {
        format!("ollama:{}", self.client.base_url)
    }

    pub fn model_id(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    async fn summarize(&self, prompt: &str) -> Result<String> {
        let url = self.client.endpoint("/api/generate")?;
        let response = self
            .client
            .http
            .post(url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ChunkError::ExternalService(format!(
                "generate request failed: status={}",
                response.status()
            )));
        }
        let body: GenerateResponse = response.json().await?;
        let text = body.response.trim();
        if text.is_empty() {
            return Err(ChunkError::ExternalService(
                "generate response was empty".into(),
            ));
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn embedder_round_trip() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/embeddings")
                    .json_body(json!({"model": "nomic-embed-text", "prompt": "hello"}));
                then.status(200)
                    .json_body(json!({"embedding": [0.1, 0.2, 0.3]}));
            })
            .await;

        let client = OllamaClient::new(&server.base_url()).unwrap();
        let embedder = OllamaEmbedder::new(client, "nomic-embed-text", 3);
        let vector = embedder.embed("hello").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn embedder_rejects_dimension_mismatch() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embeddings");
                then.status(200).json_body(json!({"embedding": [1.0, 2.0]}));
            })
            .await;

        let client = OllamaClient::new(&server.base_url()).unwrap();
        let embedder = OllamaEmbedder::new(client, "m", 3);
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, ChunkError::ExternalService(_)));
    }

    #[tokio::test]
    async fn embedder_surfaces_http_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embeddings");
                then.status(500).body("boom");
            })
            .await;

        let client = OllamaClient::new(&server.base_url()).unwrap();
        let embedder = OllamaEmbedder::new(client, "m", 3);
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, ChunkError::ExternalService(_)));
    }

    #[tokio::test]
    async fn summarizer_trims_generated_text() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_partial(r#"{"stream": false}"#);
                then.status(200)
                    .json_body(json!({"response": "  a short summary \n"}));
            })
            .await;

        let client = OllamaClient::new(&server.base_url()).unwrap();
        let summarizer = OllamaSummarizer::new(client, "llama3.2");
        let summary = summarizer.summarize("condense this").await.unwrap();
        assert_eq!(summary, "a short summary");
    }

    #[tokio::test]
    async fn summarizer_rejects_blank_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({"response": "   "}));
            })
            .await;

        let client = OllamaClient::new(&server.base_url()).unwrap();
        let summarizer = OllamaSummarizer::new(client, "llama3.2");
        assert!(summarizer.summarize("condense this").await.is_err());
    }

    #[test]
    fn bad_url_is_invalid_argument() {
        let err = OllamaClient::new("not a url").unwrap_err();
        assert!(matches!(err, ChunkError::InvalidArgument(_)));
    }
}
