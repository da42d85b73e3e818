use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Provider;
use crate::error::{Error, Result};
use crate::http::HttpClient;

/// Maps text to fixed-length vectors, one per input, in input order.
pub trait Embedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("provider returned no vector".to_string()))
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Serialize)]
struct EmbedLegacyRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

pub struct HttpEmbedder {
    http: HttpClient,
    provider: Provider,
    base_url: String,
    model: String,
}

impl HttpEmbedder {
    pub fn new(
        http: HttpClient,
        provider: Provider,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http,
            provider,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    fn embed_ollama(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);
        let req = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        match self.http.post_json::<Value, _>(&url, &req) {
            Ok(res) => parse_embeddings(res),
            Err(e) => {
                // Older Ollama servers only expose the single-prompt endpoint.
                warn!(error = %e, "/api/embed failed, retrying with /api/embeddings");
                let url = format!("{}/api/embeddings", self.base_url);
                let mut out = Vec::with_capacity(texts.len());
                for text in texts {
                    let req = EmbedLegacyRequest {
                        model: &self.model,
                        prompt: text,
                    };
                    let res = self
                        .http
                        .post_json::<Value, _>(&url, &req)
                        .map_err(|e| Error::Embedding(e.to_string()))?;
                    out.extend(parse_embeddings(res)?);
                }
                Ok(out)
            }
        }
    }

    fn embed_openai(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let req = EmbedRequest {
            model: &self.model,
            input: texts,
        };
        let res = self
            .http
            .post_json::<Value, _>(&url, &req)
            .map_err(|e| Error::Embedding(e.to_string()))?;
        parse_openai_embeddings(res)
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        debug!(model = %self.model, count = texts.len(), "embedding texts");
        let vectors = match self.provider {
            Provider::Ollama => self.embed_ollama(texts)?,
            Provider::OpenAi => self.embed_openai(texts)?,
        };
        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, provider returned {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

fn parse_embeddings(value: Value) -> Result<Vec<Vec<f32>>> {
    if let Some(embeddings) = value.get("embeddings") {
        return parse_embeddings_value(embeddings);
    }
    if let Some(embedding) = value.get("embedding") {
        return parse_embeddings_value(embedding);
    }
    Err(Error::Embedding("no embeddings in response".to_string()))
}

fn parse_openai_embeddings(value: Value) -> Result<Vec<Vec<f32>>> {
    let data = value
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Embedding("no `data` array in response".to_string()))?;
    let mut rows = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| Error::Embedding("item without `embedding`".to_string()))?;
        rows.push((index, parse_vec(embedding)?));
    }
    rows.sort_by_key(|(index, _)| *index);
    Ok(rows.into_iter().map(|(_, v)| v).collect())
}

fn parse_embeddings_value(value: &Value) -> Result<Vec<Vec<f32>>> {
    let arr = value
        .as_array()
        .ok_or_else(|| Error::Embedding("invalid embeddings format".to_string()))?;
    if arr.is_empty() {
        return Ok(vec![]);
    }
    if arr[0].is_array() {
        return arr.iter().map(parse_vec).collect();
    }
    Ok(vec![parse_vec(value)?])
}

fn parse_vec(value: &Value) -> Result<Vec<f32>> {
    let arr = value
        .as_array()
        .ok_or_else(|| Error::Embedding("embedding is not an array".to_string()))?;
    arr.iter()
        .map(|v| {
            v.as_f64()
                .map(|n| n as f32)
                .ok_or_else(|| Error::Embedding("embedding value is not a number".to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_batched_and_single_ollama_shapes() {
        let batched = parse_embeddings(json!({"embeddings": [[0.1, 0.2], [0.3, 0.4]]}))
            .expect("batched embeddings should parse");
        assert_eq!(batched, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);

        let legacy = parse_embeddings(json!({"embedding": [1.0, 2.0, 3.0]}))
            .expect("legacy embedding should parse");
        assert_eq!(legacy, vec![vec![1.0, 2.0, 3.0]]);
    }

    #[test]
    fn rejects_responses_without_vectors() {
        let err = parse_embeddings(json!({"error": "model not found"})).expect_err("no vectors");
        assert!(matches!(err, Error::Embedding(_)));

        let err = parse_embeddings(json!({"embeddings": [["x"]]})).expect_err("non-numeric");
        assert!(err.to_string().contains("not a number"));
    }

    #[test]
    fn orders_openai_rows_by_index() {
        let res = json!({
            "object": "list",
            "data": [
                {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
                {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
            ],
            "model": "text-embedding-3-small"
        });
        let rows = parse_openai_embeddings(res).expect("openai embeddings should parse");
        assert_eq!(rows, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }
}
