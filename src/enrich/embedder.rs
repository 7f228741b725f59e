use crate::config::EmbedderConfig;
use crate::record::{MenuItem, Restaurant};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while computing embeddings
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("embedding endpoint returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },

    #[error("environment variable {0} holding the embedder API key is not set")]
    MissingApiKey(String),
}

/// Text → vector service
///
/// Returns one vector per input text, in input order.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Whether this embedder does nothing, letting callers skip the stage entirely
    fn is_noop(&self) -> bool {
        false
    }
}

/// The default embedder: enrichment is off
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmbedder;

#[async_trait]
impl TextEmbedder for NoopEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(vec![Vec::new(); texts.len()])
    }

    fn is_noop(&self) -> bool {
        true
    }
}

/// Embeddings client for OpenAI-compatible `/embeddings` endpoints
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn new(
        base_url: &str,
        model: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, EmbedError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            api_key,
        })
    }

    /// Builds the client described by the `[embedder]` config section
    pub fn from_config(config: &EmbedderConfig, timeout: Duration) -> Result<Self, EmbedError> {
        let api_key = match &config.api_key_env {
            Some(var) => Some(
                std::env::var(var).map_err(|_| EmbedError::MissingApiKey(var.clone()))?,
            ),
            None => None,
        };
        Self::new(&config.endpoint, config.model.clone(), api_key, timeout)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl TextEmbedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut parsed: EmbeddingResponse = response.json().await?;
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                expected: texts.len(),
                got: parsed.data.len(),
            });
        }

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

/// Text submitted for one menu item: the title, optionally followed by the
/// description, cut to `word_budget` words
pub fn item_text(item: &MenuItem, word_budget: usize, include_description: bool) -> String {
    let description = if include_description {
        item.description.as_deref().unwrap_or_default()
    } else {
        ""
    };

    item.title
        .split_whitespace()
        .chain(description.split_whitespace())
        .take(word_budget)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Scales `vector` to unit length; the zero vector is left untouched
pub fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
    vector
}

/// Attaches embeddings to a store's menu items
#[derive(Clone)]
pub struct MenuEnricher {
    embedder: Arc<dyn TextEmbedder>,
    batch_size: usize,
    word_budget: usize,
    include_description: bool,
}

impl MenuEnricher {
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        batch_size: usize,
        word_budget: usize,
        include_description: bool,
    ) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
            word_budget: word_budget.max(1),
            include_description,
        }
    }

    /// An enricher that leaves records untouched
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopEmbedder), 1, 1, false)
    }

    pub fn from_config(config: &EmbedderConfig, embedder: Arc<dyn TextEmbedder>) -> Self {
        Self::new(
            embedder,
            config.batch_size,
            config.word_budget,
            config.include_description,
        )
    }

    pub fn is_enabled(&self) -> bool {
        !self.embedder.is_noop()
    }

    /// Embeds every distinct menu item and attaches the vectors by item id
    ///
    /// Either every item gets its vector or, on error, none do.
    ///
    /// # Returns
    ///
    /// The number of distinct items embedded
    pub async fn enrich(&self, restaurant: &mut Restaurant) -> Result<usize, EmbedError> {
        if !self.is_enabled() {
            return Ok(0);
        }

        let mut ids = Vec::new();
        let mut texts = Vec::new();
        let mut queued = std::collections::HashSet::new();
        for item in restaurant.menu_items() {
            if queued.insert(item.id.clone()) {
                ids.push(item.id.clone());
                texts.push(item_text(item, self.word_budget, self.include_description));
            }
        }

        let mut vectors: HashMap<String, Vec<f32>> = HashMap::with_capacity(ids.len());
        for (id_batch, text_batch) in ids.chunks(self.batch_size).zip(texts.chunks(self.batch_size)) {
            let embedded = self.embedder.embed(text_batch).await?;
            if embedded.len() != text_batch.len() {
                return Err(EmbedError::CountMismatch {
                    expected: text_batch.len(),
                    got: embedded.len(),
                });
            }
            for (id, vector) in id_batch.iter().zip(embedded) {
                vectors.insert(id.clone(), l2_normalize(vector));
            }
        }

        for item in restaurant.menu_items_mut() {
            if let Some(vector) = vectors.get(&item.id) {
                item.embedding = Some(vector.clone());
            }
        }

        Ok(vectors.len())
    }
}
