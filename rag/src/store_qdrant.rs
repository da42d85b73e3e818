use std::cell::Cell;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpError};
use crate::vector_index::{content_hash, Distance, Hit, IndexedDocument, VectorIndex};

#[derive(Serialize)]
struct CreateCollection {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct VectorParams {
    size: usize,
    distance: Distance,
}

const SCROLL_PAGE: usize = 256;

#[derive(Serialize)]
struct PointPayload {
    record_id: String,
    text: String,
    text_hash: String,
}

#[derive(Serialize)]
struct Point {
    id: u64,
    vector: Vec<f32>,
    payload: PointPayload,
}

#[derive(Serialize)]
struct UpsertPoints<'a> {
    points: &'a [Point],
}

#[derive(Serialize)]
struct ScrollRequest {
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<Value>,
    with_payload: Value,
    with_vector: bool,
}

#[derive(Serialize)]
struct DeletePoints<'a> {
    points: &'a [u64],
}

#[derive(Serialize)]
struct CountPoints {
    exact: bool,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    query: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Deserialize)]
struct QdrantResponse<T> {
    result: Option<T>,
}

#[derive(Deserialize)]
struct ScrollResult {
    points: Vec<StoredPoint>,
    next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
struct StoredPoint {
    payload: Option<StoredPayload>,
}

#[derive(Deserialize)]
struct StoredPayload {
    record_id: Option<String>,
    text_hash: Option<String>,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

#[derive(Deserialize)]
struct QueryResult {
    points: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    payload: Option<HitPayload>,
}

#[derive(Deserialize)]
struct HitPayload {
    record_id: String,
    text: String,
}

/// Qdrant point ids must be unsigned integers or UUIDs, so record ids are
/// hashed to a stable u64.
pub fn point_id(record_id: &str) -> u64 {
    let hash = blake3::hash(record_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Collection in a Qdrant server, spoken to over its REST API.
pub struct QdrantIndex {
    http: HttpClient,
    base_url: String,
    collection: String,
    distance: Distance,
    ready: Cell<bool>,
}

impl QdrantIndex {
    pub fn new(
        http: HttpClient,
        base_url: impl Into<String>,
        collection: impl Into<String>,
        distance: Distance,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            distance,
            ready: Cell::new(false),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    fn collection_exists(&self) -> Result<bool> {
        if self.ready.get() {
            return Ok(true);
        }
        match self.http.get_json::<Value>(&self.collection_url()) {
            Ok(_) => {
                self.ready.set(true);
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(index_error(e)),
        }
    }

    fn ensure_collection(&self, vector_size: usize) -> Result<()> {
        if self.collection_exists()? {
            return Ok(());
        }
        let body = CreateCollection {
            vectors: VectorParams {
                size: vector_size,
                distance: self.distance,
            },
        };
        self.http
            .put_json::<Value, _>(&self.collection_url(), &body)
            .map_err(index_error)?;
        info!(collection = %self.collection, vector_size, "created qdrant collection");
        self.ready.set(true);
        Ok(())
    }
}

impl VectorIndex for QdrantIndex {
    fn fingerprints(&self) -> Result<HashMap<String, String>> {
        let mut out = HashMap::new();
        if !self.collection_exists()? {
            return Ok(out);
        }
        let url = format!("{}/points/scroll", self.collection_url());
        let mut offset = None;
        loop {
            let body = ScrollRequest {
                limit: SCROLL_PAGE,
                offset: offset.take(),
                with_payload: json!(["record_id", "text_hash"]),
                with_vector: false,
            };
            let page = self
                .http
                .post_json::<QdrantResponse<ScrollResult>, _>(&url, &body)
                .map_err(index_error)?
                .result
                .ok_or_else(|| Error::Index("scroll response has no result".to_string()))?;
            for payload in page.points.into_iter().filter_map(|p| p.payload) {
                if let Some(id) = payload.record_id {
                    // Points written without a hash always count as changed.
                    out.insert(id, payload.text_hash.unwrap_or_default());
                }
            }
            match page.next_page_offset {
                Some(next) if !next.is_null() => offset = Some(next),
                _ => break,
            }
        }
        Ok(out)
    }

    fn upsert(&mut self, docs: Vec<IndexedDocument>) -> Result<()> {
        let Some(first) = docs.first() else {
            return Ok(());
        };
        self.ensure_collection(first.embedding.len())?;

        let points: Vec<Point> = docs
            .into_iter()
            .map(|doc| Point {
                id: point_id(&doc.id),
                vector: doc.embedding,
                payload: PointPayload {
                    text_hash: content_hash(&doc.text),
                    record_id: doc.id,
                    text: doc.text,
                },
            })
            .collect();
        let url = format!("{}/points?wait=true", self.collection_url());
        self.http
            .put_json::<Value, _>(&url, &UpsertPoints { points: &points })
            .map_err(index_error)?;
        debug!(collection = %self.collection, points = points.len(), "upserted points");
        Ok(())
    }

    fn delete(&mut self, ids: &[String]) -> Result<()> {
        if ids.is_empty() || !self.collection_exists()? {
            return Ok(());
        }
        let points: Vec<u64> = ids.iter().map(|id| point_id(id)).collect();
        let url = format!("{}/points/delete?wait=true", self.collection_url());
        self.http
            .post_json::<Value, _>(&url, &DeletePoints { points: &points })
            .map_err(index_error)?;
        debug!(collection = %self.collection, points = points.len(), "deleted points");
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        if !self.collection_exists()? {
            return Ok(0);
        }
        let url = format!("{}/points/count", self.collection_url());
        let res = self
            .http
            .post_json::<QdrantResponse<CountResult>, _>(&url, &CountPoints { exact: true })
            .map_err(index_error)?;
        Ok(res.result.map(|r| r.count).unwrap_or(0))
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Hit>> {
        if k == 0 || vector.is_empty() || !self.collection_exists()? {
            return Ok(vec![]);
        }
        let url = format!("{}/points/query", self.collection_url());
        let req = QueryRequest {
            query: vector,
            limit: k,
            with_payload: true,
        };
        let res = self
            .http
            .post_json::<QdrantResponse<QueryResult>, _>(&url, &req)
            .map_err(index_error)?;
        Ok(res
            .result
            .map(|r| r.points)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| {
                p.payload.map(|payload| Hit {
                    id: payload.record_id,
                    text: payload.text,
                    score: p.score,
                })
            })
            .collect())
    }
}

fn index_error(e: HttpError) -> Error {
    Error::Index(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_stable_and_distinct() {
        assert_eq!(point_id("inception-2010"), point_id("inception-2010"));
        assert_ne!(point_id("inception-2010"), point_id("titanic-1997"));
    }

    #[test]
    fn collection_body_uses_qdrant_distance_names() {
        let body = CreateCollection {
            vectors: VectorParams {
                size: 768,
                distance: Distance::Euclid,
            },
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["vectors"]["distance"], "Euclid");
        assert_eq!(json["vectors"]["size"], 768);
    }

    #[test]
    fn decodes_query_response_points() {
        let raw = r#"{"result":{"points":[
            {"id":1,"score":0.92,"payload":{"record_id":"inception-2010","text":"{}"}},
            {"id":2,"score":0.40}
        ]},"status":"ok","time":0.001}"#;
        let res: QdrantResponse<QueryResult> = serde_json::from_str(raw).expect("decode");
        let points = res.result.expect("result").points;
        assert_eq!(points.len(), 2);
        assert_eq!(
            points[0].payload.as_ref().map(|p| p.record_id.as_str()),
            Some("inception-2010")
        );
        assert!(points[1].payload.is_none());
    }
}
