use crate::corpus::{BuildReport, Corpus, RawDocument, SkippedDocument};
use crate::persist::CorpusCache;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A scraped vacancy record. `id` wins over an id derived from `url`.
#[derive(Debug, Deserialize)]
struct InputDoc {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(alias = "body", alias = "text")]
    description: String,
}

impl InputDoc {
    fn into_raw(self) -> RawDocument {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .or_else(|| self.url.as_deref().and_then(document_id_from_url))
            .unwrap_or_default();
        RawDocument::new(id, self.description)
    }
}

/// Last non-empty path segment of a URL, ignoring query and fragment. The
/// host is never a candidate, so `https://jobs.example.org/` has no id.
pub fn document_id_from_url(url: &str) -> Option<String> {
    let url = url.split(['?', '#']).next().unwrap_or(url);
    let path = match url.find("://") {
        Some(i) => {
            let after_scheme = &url[i + 3..];
            &after_scheme[after_scheme.find('/')?..]
        }
        None => url,
    };
    path.rsplit('/').find(|seg| !seg.is_empty()).map(str::to_string)
}

/// Everything a source produced: decodable records and the ones it had to
/// drop, each keyed by where it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceBatch {
    pub documents: Vec<RawDocument>,
    pub skipped: Vec<SkippedDocument>,
}

/// Something that yields `(document id, raw text)` pairs.
///
/// A record that cannot be parsed is reported in [`SourceBatch::skipped`];
/// only failures that affect the whole source (a missing path, an unreadable
/// file) are errors.
pub trait DocumentSource {
    fn read(&self) -> Result<SourceBatch>;
}

impl DocumentSource for Vec<RawDocument> {
    fn read(&self) -> Result<SourceBatch> {
        Ok(SourceBatch { documents: self.clone(), skipped: Vec::new() })
    }
}

/// JSON, JSONL or `.txt` files under a file or directory.
///
/// JSON files hold one record or an array of records; JSONL one record per
/// line. A `.txt` file is one document whose id is the file name up to
/// `___` (or the whole stem).
pub struct PathSource {
    pub path: PathBuf,
}

impl PathSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl DocumentSource for PathSource {
    fn read(&self) -> Result<SourceBatch> {
        let mut files: Vec<PathBuf> = Vec::new();
        if self.path.is_dir() {
            for entry in WalkDir::new(&self.path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
                let p = entry.path();
                if p.is_file() && matches!(extension(p), Some("json" | "jsonl" | "txt")) {
                    files.push(p.to_path_buf());
                }
            }
        } else if self.path.is_file() {
            files.push(self.path.clone());
        } else {
            anyhow::bail!("input path {} does not exist", self.path.display());
        }

        let mut batch = SourceBatch::default();
        for file in files {
            match extension(&file) {
                Some("jsonl") => read_jsonl(&file, &mut batch)?,
                Some("txt") => batch.documents.push(read_txt(&file)?),
                _ => read_json(&file, &mut batch)?,
            }
        }
        tracing::info!(
            path = %self.path.display(),
            documents = batch.documents.len(),
            skipped = batch.skipped.len(),
            "read input documents"
        );
        Ok(batch)
    }
}

fn extension(path: &Path) -> Option<&str> { path.extension().and_then(|s| s.to_str()) }

/// One record per line. Lines are parsed from raw bytes so that a line with
/// broken UTF-8 or broken JSON costs only that record.
fn read_jsonl(file: &Path, batch: &mut SourceBatch) -> Result<()> {
    let f = File::open(file).with_context(|| format!("open {}", file.display()))?;
    let reader = BufReader::new(f);
    for (n, line) in reader.split(b'\n').enumerate() {
        let line = line.with_context(|| format!("read {}", file.display()))?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let location = format!("{}:{}", file.display(), n + 1);
        match serde_json::from_slice::<InputDoc>(&line) {
            Ok(doc) => batch.documents.push(doc.into_raw()),
            Err(e) => skip(batch, location, e),
        }
    }
    Ok(())
}

/// One record or an array of records. A file that is not JSON at all is
/// skipped as a single entry; a bad element skips only that element.
fn read_json(file: &Path, batch: &mut SourceBatch) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("read {}", file.display()))?;
    let json: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(json) => json,
        Err(e) => {
            skip(batch, file.display().to_string(), e);
            return Ok(());
        }
    };
    match json {
        serde_json::Value::Array(arr) => {
            for (i, v) in arr.into_iter().enumerate() {
                match serde_json::from_value::<InputDoc>(v) {
                    Ok(doc) => batch.documents.push(doc.into_raw()),
                    Err(e) => skip(batch, format!("{}[{i}]", file.display()), e),
                }
            }
        }
        serde_json::Value::Object(_) => match serde_json::from_value::<InputDoc>(json) {
            Ok(doc) => batch.documents.push(doc.into_raw()),
            Err(e) => skip(batch, file.display().to_string(), e),
        },
        _ => tracing::warn!(file = %file.display(), "ignoring json that is neither object nor array"),
    }
    Ok(())
}

fn skip(batch: &mut SourceBatch, location: String, err: serde_json::Error) {
    tracing::debug!(%location, error = %err, "skipping unparseable record");
    batch.skipped.push(SkippedDocument { document_id: location, reason: format!("unparseable record: {err}") });
}

fn read_txt(file: &Path) -> Result<RawDocument> {
    let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let id = stem.split("___").next().unwrap_or(stem);
    let bytes = fs::read(file).with_context(|| format!("read {}", file.display()))?;
    Ok(RawDocument::new(id, bytes))
}

pub struct Loaded {
    pub corpus: Corpus,
    /// Present when the corpus was rebuilt rather than read from the cache.
    pub report: Option<BuildReport>,
}

/// Ingestion with an injected cache: serve a cached corpus when one exists,
/// otherwise build from the source and store the result.
///
/// Cache failures never fail the load; they are logged and the corpus is
/// rebuilt from source.
pub struct CorpusLoader {
    cache: Box<dyn CorpusCache>,
}

impl CorpusLoader {
    pub fn new(cache: Box<dyn CorpusCache>) -> Self {
        Self { cache }
    }

    pub fn load_or_build(&self, corpus_id: &str, source: &dyn DocumentSource) -> Result<Loaded> {
        match self.cache.load(corpus_id) {
            Ok(Some(corpus)) => {
                tracing::debug!(corpus_id, documents = corpus.documents().len(), "corpus cache hit");
                return Ok(Loaded { corpus, report: None });
            }
            Ok(None) => tracing::debug!(corpus_id, "corpus cache miss"),
            Err(e) => tracing::warn!(corpus_id, error = %e, "corpus cache unreadable, rebuilding"),
        }
        self.rebuild(corpus_id, source)
    }

    /// Build from source regardless of the cache, then replace the cached copy.
    pub fn rebuild(&self, corpus_id: &str, source: &dyn DocumentSource) -> Result<Loaded> {
        let batch = source.read()?;
        if !batch.skipped.is_empty() {
            tracing::warn!(corpus_id, skipped = batch.skipped.len(), "unparseable input records skipped");
        }
        let (corpus, mut report) = Corpus::build(batch.documents).with_context(|| format!("build corpus {corpus_id}"))?;
        let mut skipped = batch.skipped;
        skipped.append(&mut report.skipped);
        report.skipped = skipped;
        if let Err(e) = self.cache.store(corpus_id, &corpus) {
            tracing::warn!(corpus_id, error = %e, "could not store corpus in cache");
        }
        Ok(Loaded { corpus, report: Some(report) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_from_url_suffix() {
        assert_eq!(document_id_from_url("https://jobs.example.org/vacancy/915892388").as_deref(), Some("915892388"));
        assert_eq!(document_id_from_url("https://jobs.example.org/v/42/?src=feed#top").as_deref(), Some("42"));
        assert_eq!(document_id_from_url("https://"), None);
    }

    #[test]
    fn host_is_never_an_id() {
        assert_eq!(document_id_from_url("https://jobs.example.org"), None);
        assert_eq!(document_id_from_url("https://jobs.example.org/"), None);
        assert_eq!(document_id_from_url("https://jobs.example.org?page=2"), None);
        assert_eq!(document_id_from_url("/vacancy/77/").as_deref(), Some("77"));
    }

    #[test]
    fn explicit_id_beats_url() {
        let doc: InputDoc = serde_json::from_str(r#"{"id": "x1", "url": "https://a/b/99", "body": "text"}"#).unwrap();
        assert_eq!(doc.into_raw(), RawDocument::new("x1", "text"));
        let doc: InputDoc = serde_json::from_str(r#"{"url": "https://a/b/99", "description": "text"}"#).unwrap();
        assert_eq!(doc.into_raw().id, "99");
    }
}
