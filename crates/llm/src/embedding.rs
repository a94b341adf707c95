//! Embedding providers: turn text into fixed-size vectors for similarity search.

use crate::http::check_error;
use crate::provider::LlmError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Trait for embedding backends.
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;

    fn embed(
        &self,
        text: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, LlmError>> + Send + '_>>;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` client.
#[derive(Debug)]
pub struct HttpEmbedder {
    model: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(model: String, api_key: String, base_url: String, dimension: usize) -> Self {
        Self {
            model,
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
            dimension,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }

    async fn embed_remote(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&EmbedRequest { model: &self.model, input: text })
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(check_error(status, body));
        }

        let api: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
        let vector = api
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LlmError::RequestFailed("embedding response had no data".into()))?;

        if vector.len() != self.dimension {
            return Err(LlmError::RequestFailed(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(vector)
    }
}

impl EmbeddingProvider for HttpEmbedder {
    fn name(&self) -> &str {
        "openai-compatible-embeddings"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(
        &self,
        text: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, LlmError>> + Send + '_>> {
        let text = text.to_owned();
        Box::pin(async move { self.embed_remote(&text).await })
    }
}

/// Build an HttpEmbedder from environment variables.
/// Reads `SUPPORTER_EMBED_MODEL`; the base URL comes from
/// `SUPPORTER_EMBED_BASE_URL`, falling back to `SUPPORTER_LLM_BASE_URL`.
/// Returns `None` when no embedding model is configured.
pub fn from_env(dimension: usize) -> Option<HttpEmbedder> {
    let model = std::env::var("SUPPORTER_EMBED_MODEL").ok()?;
    let base_url = std::env::var("SUPPORTER_EMBED_BASE_URL")
        .or_else(|_| std::env::var("SUPPORTER_LLM_BASE_URL"))
        .ok()?;
    let api_key = std::env::var("SUPPORTER_LLM_API_KEY").unwrap_or_else(|_| "EMPTY".to_owned());
    Some(HttpEmbedder::new(model, api_key, base_url, dimension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_endpoint() {
        let e = HttpEmbedder::new("bge-m3".into(), "EMPTY".into(), "http://tei:8080/v1/".into(), 1024);
        assert_eq!(e.endpoint(), "http://tei:8080/v1/embeddings");
        assert_eq!(e.dimension(), 1024);
    }

    #[test]
    fn request_body_shape() {
        let body = serde_json::to_value(EmbedRequest { model: "bge-m3", input: "hello" }).unwrap();
        assert_eq!(body["model"], "bge-m3");
        assert_eq!(body["input"], "hello");
    }
}
