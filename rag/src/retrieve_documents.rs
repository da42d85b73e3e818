use tracing::debug;

use crate::embed_texts::Embedder;
use crate::error::{Error, Result};
use crate::vector_index::{Hit, VectorIndex};

pub const DEFAULT_TOP_K: usize = 3;

/// Documents ranked by similarity to the query, best first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RetrievalResult {
    pub hits: Vec<Hit>,
}

impl RetrievalResult {
    pub fn texts(&self) -> Vec<String> {
        self.hits.iter().map(|h| h.text.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Returns up to `k` documents nearest to `query`. Asking for more than the
/// index holds returns everything it holds.
pub fn retrieve(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    query: &str,
    k: usize,
) -> Result<RetrievalResult> {
    if k == 0 || index.is_empty().map_err(retrieval_error)? {
        debug!(k, "nothing to retrieve");
        return Ok(RetrievalResult::default());
    }

    let vector = embedder.embed_one(query).map_err(retrieval_error)?;
    let hits = index.query(&vector, k).map_err(retrieval_error)?;
    debug!(
        k,
        hits = hits.len(),
        top = hits.first().map(|h| h.id.as_str()).unwrap_or("-"),
        "retrieved documents"
    );
    Ok(RetrievalResult { hits })
}

fn retrieval_error(e: Error) -> Error {
    match e {
        Error::Retrieval(_) => e,
        other => Error::Retrieval(other.to_string()),
    }
}
