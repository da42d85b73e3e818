use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::retrieve_documents::DEFAULT_TOP_K;
use crate::vector_index::Distance;

pub const DEFAULT_QUERY: &str = "movies directed by christopher nolan";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenAi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexBackend {
    Memory,
    Qdrant,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub catalog_path: PathBuf,
    pub provider: Provider,
    pub ollama_url: String,
    pub openai_url: String,
    pub api_key: Option<String>,
    pub embed_model: String,
    pub chat_model: String,
    pub index_backend: IndexBackend,
    pub qdrant_url: String,
    pub collection: String,
    pub distance: Distance,
    pub top_k: usize,
    pub request_timeout: Duration,
    pub default_query: String,
}

impl Config {
    pub fn from_env() -> Self {
        // Load .env if present so keys and model names work without manual `source .env`.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        let provider = match lookup("RAG_PROVIDER") {
            Some(raw) => parse_provider(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "unknown RAG_PROVIDER, falling back to ollama");
                Provider::Ollama
            }),
            None if api_key.is_some() => Provider::OpenAi,
            None => Provider::Ollama,
        };
        let (default_embed, default_chat) = match provider {
            Provider::Ollama => ("nomic-embed-text", "llama3.1"),
            Provider::OpenAi => ("text-embedding-3-small", "gpt-4o-mini"),
        };
        let index_backend = match lookup("RAG_INDEX") {
            Some(raw) => parse_backend(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "unknown RAG_INDEX, falling back to memory");
                IndexBackend::Memory
            }),
            None => IndexBackend::Memory,
        };
        let distance = match lookup("RAG_DISTANCE") {
            Some(raw) => Distance::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "unknown RAG_DISTANCE, falling back to Cosine");
                Distance::Cosine
            }),
            None => Distance::Cosine,
        };

        Self {
            catalog_path: lookup("RAG_CATALOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/movies.json")),
            provider,
            ollama_url: lookup("OLLAMA_URL")
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            openai_url: lookup("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            embed_model: lookup("RAG_EMBED_MODEL").unwrap_or_else(|| default_embed.to_string()),
            chat_model: lookup("RAG_CHAT_MODEL").unwrap_or_else(|| default_chat.to_string()),
            index_backend,
            qdrant_url: lookup("QDRANT_URL")
                .unwrap_or_else(|| "http://localhost:6333".to_string()),
            collection: lookup("QDRANT_COLLECTION")
                .unwrap_or_else(|| "movie_catalog".to_string()),
            distance,
            top_k: lookup("RAG_TOP_K")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_TOP_K),
            request_timeout: Duration::from_secs(
                lookup("RAG_HTTP_TIMEOUT_SECS")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(120),
            ),
            default_query: lookup("RAG_QUERY")
                .filter(|q| !q.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_QUERY.to_string()),
        }
    }
}

fn parse_provider(raw: &str) -> Option<Provider> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "ollama" => Some(Provider::Ollama),
        "openai" => Some(Provider::OpenAi),
        _ => None,
    }
}

fn parse_backend(raw: &str) -> Option<IndexBackend> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "memory" => Some(IndexBackend::Memory),
        "qdrant" => Some(IndexBackend::Qdrant),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_local_ollama_and_memory_index() {
        let cfg = config(&[]);
        assert_eq!(cfg.provider, Provider::Ollama);
        assert_eq!(cfg.index_backend, IndexBackend::Memory);
        assert_eq!(cfg.distance, Distance::Cosine);
        assert_eq!(cfg.top_k, DEFAULT_TOP_K);
        assert_eq!(cfg.embed_model, "nomic-embed-text");
        assert_eq!(cfg.default_query, DEFAULT_QUERY);
        assert_eq!(cfg.request_timeout, Duration::from_secs(120));
    }

    #[test]
    fn api_key_switches_default_provider_to_openai() {
        let cfg = config(&[("OPENAI_API_KEY", "sk-test")]);
        assert_eq!(cfg.provider, Provider::OpenAi);
        assert_eq!(cfg.embed_model, "text-embedding-3-small");
        assert_eq!(cfg.chat_model, "gpt-4o-mini");

        let forced = config(&[("OPENAI_API_KEY", "sk-test"), ("RAG_PROVIDER", "ollama")]);
        assert_eq!(forced.provider, Provider::Ollama);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let cfg = config(&[
            ("RAG_PROVIDER", "bard"),
            ("RAG_INDEX", "chroma"),
            ("RAG_DISTANCE", "manhattan"),
            ("RAG_TOP_K", "many"),
        ]);
        assert_eq!(cfg.provider, Provider::Ollama);
        assert_eq!(cfg.index_backend, IndexBackend::Memory);
        assert_eq!(cfg.distance, Distance::Cosine);
        assert_eq!(cfg.top_k, DEFAULT_TOP_K);
    }

    #[test]
    fn explicit_values_are_respected() {
        let cfg = config(&[
            ("RAG_INDEX", "Qdrant"),
            ("RAG_DISTANCE", "dot"),
            ("RAG_TOP_K", " 5 "),
            ("QDRANT_COLLECTION", "films"),
            ("RAG_CATALOG_PATH", "/srv/catalog"),
        ]);
        assert_eq!(cfg.index_backend, IndexBackend::Qdrant);
        assert_eq!(cfg.distance, Distance::Dot);
        assert_eq!(cfg.top_k, 5);
        assert_eq!(cfg.collection, "films");
        assert_eq!(cfg.catalog_path, PathBuf::from("/srv/catalog"));
    }
}
