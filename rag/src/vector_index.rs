use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Similarity metric. Serialized with Qdrant's names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    Cosine,
    Euclid,
    Dot,
}

impl Distance {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cosine" => Some(Distance::Cosine),
            "euclid" | "euclidean" | "l2" => Some(Distance::Euclid),
            "dot" => Some(Distance::Dot),
            _ => None,
        }
    }

    /// Higher is more similar for every metric.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Distance::Cosine => cosine_similarity(a, b),
            Distance::Euclid => -a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>(),
            Distance::Dot => dot(a, b),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

/// Hex blake3 digest of a document's text, stored next to it so changed
/// records can be detected without re-embedding.
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

#[derive(Clone, Debug, PartialEq)]
pub struct IndexedDocument {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Hit {
    pub id: String,
    pub text: String,
    pub score: f32,
}

/// Embedding-backed document store answering nearest-neighbour queries.
pub trait VectorIndex {
    /// Every stored id mapped to the [`content_hash`] of its text.
    fn fingerprints(&self) -> Result<HashMap<String, String>>;

    /// Inserts documents, replacing any stored document with the same id.
    fn upsert(&mut self, docs: Vec<IndexedDocument>) -> Result<()>;

    /// Removes documents by id. Unknown ids are ignored.
    fn delete(&mut self, ids: &[String]) -> Result<()>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Up to `k` documents ranked best first.
    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Hit>>;
}

#[derive(Debug)]
struct StoredDocument {
    text: String,
    hash: String,
    embedding: Vec<f32>,
}

/// In-process index with exact scoring over every stored document.
#[derive(Debug)]
pub struct MemoryIndex {
    distance: Distance,
    dim: Option<usize>,
    docs: BTreeMap<String, StoredDocument>,
}

impl MemoryIndex {
    pub fn new(distance: Distance) -> Self {
        Self {
            distance,
            dim: None,
            docs: BTreeMap::new(),
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new(Distance::Cosine)
    }
}

impl VectorIndex for MemoryIndex {
    fn fingerprints(&self) -> Result<HashMap<String, String>> {
        Ok(self
            .docs
            .iter()
            .map(|(id, doc)| (id.clone(), doc.hash.clone()))
            .collect())
    }

    fn upsert(&mut self, docs: Vec<IndexedDocument>) -> Result<()> {
        let mut dim = self.dim;
        for doc in &docs {
            let expected = *dim.get_or_insert(doc.embedding.len());
            if doc.embedding.len() != expected {
                return Err(Error::Index(format!(
                    "document `{}` has dimension {}, index expects {}",
                    doc.id,
                    doc.embedding.len(),
                    expected
                )));
            }
        }
        self.dim = dim;
        for doc in docs {
            let stored = StoredDocument {
                hash: content_hash(&doc.text),
                text: doc.text,
                embedding: doc.embedding,
            };
            self.docs.insert(doc.id, stored);
        }
        Ok(())
    }

    fn delete(&mut self, ids: &[String]) -> Result<()> {
        for id in ids {
            self.docs.remove(id);
        }
        if self.docs.is_empty() {
            self.dim = None;
        }
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.docs.len())
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Hit>> {
        if k == 0 || self.docs.is_empty() {
            return Ok(vec![]);
        }
        if let Some(dim) = self.dim {
            if vector.len() != dim {
                return Err(Error::Index(format!(
                    "query has dimension {}, index expects {}",
                    vector.len(),
                    dim
                )));
            }
        }

        // BTreeMap iteration is id-ordered and the sort is stable, so equal
        // scores stay in ascending id order.
        let mut hits: Vec<Hit> = self
            .docs
            .iter()
            .map(|(id, doc)| Hit {
                id: id.clone(),
                text: doc.text.clone(),
                score: self.distance.score(vector, &doc.embedding),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, embedding: &[f32]) -> IndexedDocument {
        IndexedDocument {
            id: id.to_string(),
            text: format!("text of {id}"),
            embedding: embedding.to_vec(),
        }
    }

    #[test]
    fn upsert_replaces_documents_with_same_id() {
        let mut index = MemoryIndex::default();
        index.upsert(vec![doc("a", &[1.0, 0.0])]).expect("first upsert");
        index
            .upsert(vec![IndexedDocument {
                text: "replaced".to_string(),
                ..doc("a", &[0.0, 1.0])
            }])
            .expect("second upsert");

        assert_eq!(index.len().expect("len"), 1);
        let hits = index.query(&[0.0, 1.0], 5).expect("query");
        assert_eq!(hits[0].text, "replaced");
    }

    #[test]
    fn ranks_by_cosine_and_breaks_ties_by_id() {
        let mut index = MemoryIndex::new(Distance::Cosine);
        index
            .upsert(vec![
                doc("c", &[0.0, 1.0]),
                doc("b", &[2.0, 0.0]),
                doc("a", &[1.0, 0.0]),
            ])
            .expect("upsert");

        let hits = index.query(&[1.0, 0.0], 3).expect("query");
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn euclid_prefers_nearest_point() {
        let mut index = MemoryIndex::new(Distance::Euclid);
        index
            .upsert(vec![doc("far", &[10.0, 10.0]), doc("near", &[1.0, 1.0])])
            .expect("upsert");
        let hits = index.query(&[0.0, 0.0], 1).expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "near");
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let mut index = MemoryIndex::default();
        index.upsert(vec![doc("a", &[1.0, 0.0])]).expect("upsert");

        let err = index.upsert(vec![doc("b", &[1.0, 0.0, 0.0])]).expect_err("bad dim");
        assert!(matches!(err, Error::Index(_)));
        assert_eq!(index.len().expect("len"), 1);

        let err = index.query(&[1.0], 1).expect_err("bad query dim");
        assert!(matches!(err, Error::Index(_)));
    }

    #[test]
    fn fingerprints_track_current_text() {
        let mut index = MemoryIndex::default();
        index.upsert(vec![doc("a", &[1.0])]).expect("upsert");
        let found = index.fingerprints().expect("fingerprints");
        assert_eq!(
            found,
            HashMap::from([("a".to_string(), content_hash("text of a"))])
        );

        index
            .upsert(vec![IndexedDocument {
                text: "edited".to_string(),
                ..doc("a", &[1.0])
            }])
            .expect("re-upsert");
        assert_eq!(index.fingerprints().expect("fingerprints")["a"], content_hash("edited"));
    }

    #[test]
    fn delete_removes_documents_and_resets_dimension() {
        let mut index = MemoryIndex::default();
        index
            .upsert(vec![doc("a", &[1.0, 0.0]), doc("b", &[0.0, 1.0])])
            .expect("upsert");

        index
            .delete(&["a".to_string(), "missing".to_string()])
            .expect("delete");
        assert_eq!(index.len().expect("len"), 1);
        assert_eq!(index.query(&[1.0, 0.0], 5).expect("query")[0].id, "b");

        index.delete(&["b".to_string()]).expect("delete last");
        index
            .upsert(vec![doc("c", &[1.0, 0.0, 0.0])])
            .expect("empty index accepts a new dimension");
    }

    #[test]
    fn parses_distance_names() {
        assert_eq!(Distance::parse("COSINE"), Some(Distance::Cosine));
        assert_eq!(Distance::parse("l2"), Some(Distance::Euclid));
        assert_eq!(Distance::parse("dot"), Some(Distance::Dot));
        assert_eq!(Distance::parse("hamming"), None);
    }
}
