use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// One movie from the catalog. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CatalogRecord {
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub year: i32,
    pub genre: String,
    #[serde(alias = "imdb_rating")]
    pub rating: f64,
    #[serde(alias = "brief_introduction", alias = "overview")]
    pub summary: String,
}

/// Key order here is the key order of the document text.
#[derive(Serialize)]
struct DocumentFields<'a> {
    title: &'a str,
    year: i32,
    genre: &'a str,
    rating: f64,
    summary: &'a str,
}

impl CatalogRecord {
    /// Serializes the record as compact JSON, the format the system
    /// instruction describes to the model.
    pub fn to_document(&self) -> String {
        let fields = DocumentFields {
            title: &self.title,
            year: self.year,
            genre: &self.genre,
            rating: self.rating,
            summary: &self.summary,
        };
        serde_json::to_string(&fields).unwrap_or_default()
    }
}

pub fn derive_id(title: &str, year: i32) -> String {
    let mut slug = String::new();
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        format!("untitled-{year}")
    } else {
        format!("{slug}-{year}")
    }
}

/// Loads every record from a JSON file, or from all `*.json` files under a
/// directory in path order.
pub fn load_catalog(path: &Path) -> Result<Vec<CatalogRecord>> {
    if !path.exists() {
        return Err(Error::load(path, "no such file or directory"));
    }

    let files = if path.is_dir() {
        json_files(path)?
    } else {
        vec![path.to_path_buf()]
    };

    let mut records = Vec::new();
    for file in &files {
        let mut batch = read_records(file)?;
        debug!(file = %file.display(), count = batch.len(), "read catalog file");
        records.append(&mut batch);
    }

    let mut seen = HashSet::new();
    for record in &records {
        if !seen.insert(record.id.as_str()) {
            return Err(Error::load(
                path,
                format!("duplicate record id `{}`", record.id),
            ));
        }
    }

    info!(path = %path.display(), records = records.len(), "catalog loaded");
    Ok(records)
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::load(dir, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_json = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn read_records(file: &Path) -> Result<Vec<CatalogRecord>> {
    let text = fs::read_to_string(file).map_err(|e| Error::load(file, e))?;
    let mut records: Vec<CatalogRecord> =
        serde_json::from_str(&text).map_err(|e| Error::load(file, e))?;
    for record in &mut records {
        if record.id.trim().is_empty() {
            record.id = derive_id(&record.title, record.year);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_slug_ids_from_title_and_year() {
        assert_eq!(derive_id("The Dark Knight", 2008), "the-dark-knight-2008");
        assert_eq!(derive_id("  Léon: The Professional ", 1994), "l-on-the-professional-1994");
        assert_eq!(derive_id("???", 2001), "untitled-2001");
    }

    #[test]
    fn document_text_has_fixed_field_order() {
        let record = CatalogRecord {
            id: "inception-2010".to_string(),
            title: "Inception".to_string(),
            year: 2010,
            genre: "Sci-Fi".to_string(),
            rating: 8.8,
            summary: "A thief steals secrets through dreams.".to_string(),
        };
        assert_eq!(
            record.to_document(),
            r#"{"title":"Inception","year":2010,"genre":"Sci-Fi","rating":8.8,"summary":"A thief steals secrets through dreams."}"#
        );
        assert_eq!(record.to_document(), record.clone().to_document());
    }
}
