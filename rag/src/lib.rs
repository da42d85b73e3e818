mod build_prompt;
mod config;
mod embed_texts;
mod ensure_indexed;
mod error;
mod generate;
mod http;
mod load_catalog;
mod retrieve_documents;
mod store_qdrant;
mod vector_index;

pub use build_prompt::{compose, Message, PromptPayload, SYSTEM_TEMPLATE};
pub use config::{Config, IndexBackend, Provider, DEFAULT_QUERY};
pub use embed_texts::{Embedder, HttpEmbedder};
pub use ensure_indexed::{ensure_indexed, IndexReport};
pub use error::{Error, Result};
pub use generate::{answer, Answer, ChatClient, LanguageModel};
pub use http::{HttpClient, HttpError};
pub use load_catalog::{derive_id, load_catalog, CatalogRecord};
pub use retrieve_documents::{retrieve, RetrievalResult, DEFAULT_TOP_K};
pub use store_qdrant::{point_id, QdrantIndex};
pub use vector_index::{content_hash, Distance, Hit, IndexedDocument, MemoryIndex, VectorIndex};

use tracing::info;

/// Outcome of one question: what was retrieved and what the model said.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryOutcome {
    pub retrieval: RetrievalResult,
    pub answer: Answer,
}

/// The pipeline with its external services passed in, so tests can swap
/// any of them for doubles.
pub struct MovieInsights {
    embedder: Box<dyn Embedder>,
    index: Box<dyn VectorIndex>,
    model: Box<dyn LanguageModel>,
    top_k: usize,
}

impl MovieInsights {
    pub fn new(
        embedder: Box<dyn Embedder>,
        index: Box<dyn VectorIndex>,
        model: Box<dyn LanguageModel>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            model,
            top_k,
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let (base_url, bearer) = match cfg.provider {
            Provider::Ollama => (cfg.ollama_url.clone(), None),
            Provider::OpenAi => {
                let key = cfg.api_key.clone().ok_or_else(|| {
                    Error::Config("OPENAI_API_KEY is required for the openai provider".to_string())
                })?;
                (cfg.openai_url.clone(), Some(key))
            }
        };
        let provider_http = HttpClient::new(cfg.request_timeout, bearer)
            .map_err(|e| Error::Config(e.to_string()))?;

        let index: Box<dyn VectorIndex> = match cfg.index_backend {
            IndexBackend::Memory => Box::new(MemoryIndex::new(cfg.distance)),
            IndexBackend::Qdrant => {
                let qdrant_http = HttpClient::new(cfg.request_timeout, None)
                    .map_err(|e| Error::Config(e.to_string()))?;
                Box::new(QdrantIndex::new(
                    qdrant_http,
                    cfg.qdrant_url.clone(),
                    cfg.collection.clone(),
                    cfg.distance,
                ))
            }
        };

        let embedder = HttpEmbedder::new(
            provider_http.clone(),
            cfg.provider,
            base_url.clone(),
            cfg.embed_model.clone(),
        );
        let model = ChatClient::new(provider_http, cfg.provider, base_url, cfg.chat_model.clone());

        Ok(Self::new(Box::new(embedder), index, Box::new(model), cfg.top_k))
    }

    pub fn ensure_indexed(&mut self, records: &[CatalogRecord]) -> Result<IndexReport> {
        ensure_indexed(&*self.embedder, &mut *self.index, records)
    }

    pub fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        retrieve(&*self.embedder, &*self.index, query, self.top_k)
    }

    pub fn ask(&self, query: &str) -> Result<QueryOutcome> {
        let retrieval = self.retrieve(query)?;
        let payload = compose(query, &retrieval.texts());
        let answer = answer(&*self.model, &payload)?;
        Ok(QueryOutcome { retrieval, answer })
    }
}

/// Load, index, retrieve, compose and answer, in that order.
pub fn run(cfg: &Config, query: &str) -> Result<QueryOutcome> {
    let records = load_catalog(&cfg.catalog_path)?;
    let mut pipeline = MovieInsights::from_config(cfg)?;
    pipeline.ensure_indexed(&records)?;
    let outcome = pipeline.ask(query)?;
    info!(
        retrieved = outcome.retrieval.len(),
        answer_chars = outcome.answer.text.len(),
        "query answered"
    );
    Ok(outcome)
}
