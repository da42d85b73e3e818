use std::collections::HashSet;

use tracing::{info, warn};

use crate::embed_texts::Embedder;
use crate::error::{Error, Result};
use crate::load_catalog::CatalogRecord;
use crate::vector_index::{content_hash, IndexedDocument, VectorIndex};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Records whose id was not in the index.
    pub inserted: usize,
    /// Records re-embedded because their text changed.
    pub updated: usize,
    /// Stored documents dropped because their id left the catalog.
    pub removed: usize,
    /// Records already indexed with identical text.
    pub skipped: usize,
    /// Documents in the index afterwards.
    pub total: usize,
}

/// Brings the index in line with `records`: new and edited records are
/// embedded and upserted, ids missing from `records` are deleted. Running it
/// again over the same records writes nothing.
///
/// When `records` repeats an id, the first occurrence wins.
pub fn ensure_indexed(
    embedder: &dyn Embedder,
    index: &mut dyn VectorIndex,
    records: &[CatalogRecord],
) -> Result<IndexReport> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(records.len());
    let records: Vec<&CatalogRecord> = records
        .iter()
        .filter(|r| {
            let first = seen.insert(r.id.as_str());
            if !first {
                warn!(id = %r.id, "duplicate record id ignored");
            }
            first
        })
        .collect();

    let stored = index.fingerprints()?;
    let stale: Vec<String> = stored
        .keys()
        .filter(|id| !seen.contains(id.as_str()))
        .cloned()
        .collect();

    let mut pending = Vec::new();
    let mut updated = 0;
    let mut skipped = 0;
    for record in records {
        let text = record.to_document();
        match stored.get(&record.id) {
            Some(hash) if *hash == content_hash(&text) => skipped += 1,
            Some(_) => {
                updated += 1;
                pending.push((record, text));
            }
            None => pending.push((record, text)),
        }
    }
    let inserted = pending.len() - updated;

    // Embed before touching the index so a provider failure leaves it as it was.
    let docs = if pending.is_empty() {
        Vec::new()
    } else {
        let texts: Vec<String> = pending.iter().map(|(_, text)| text.clone()).collect();
        let vectors = embedder.embed(&texts)?;
        if vectors.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        pending
            .into_iter()
            .zip(vectors)
            .map(|((record, text), embedding)| IndexedDocument {
                id: record.id.clone(),
                text,
                embedding,
            })
            .collect()
    };

    if !stale.is_empty() {
        index.delete(&stale)?;
    }
    if !docs.is_empty() {
        index.upsert(docs)?;
    }

    let report = IndexReport {
        inserted,
        updated,
        removed: stale.len(),
        skipped,
        total: index.len()?,
    };
    info!(
        inserted = report.inserted,
        updated = report.updated,
        removed = report.removed,
        skipped = report.skipped,
        total = report.total,
        "catalog indexed"
    );
    Ok(report)
}
