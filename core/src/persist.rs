use crate::corpus::{Corpus, Document};
use crate::error::{CorpusError, Result};
use crate::lexicon::Lexicon;
use crate::matrix::{TermFrequencyMatrix, Triplet};
use crate::tfidf::TfIdfMatrix;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Bumped whenever the snapshot layout or the analysis pipeline changes;
/// older snapshots are treated as cache misses.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything needed to restore a [`Corpus`] without re-ingesting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusSnapshot {
    pub version: u32,
    pub documents: Vec<Document>,
    pub lexicon_documents: Vec<String>,
    pub lexicon_tokens: Vec<String>,
    pub term_frequency: Vec<Triplet<u32>>,
    pub idf: Vec<f64>,
    pub tfidf: Vec<Triplet<f64>>,
}

impl From<&Corpus> for CorpusSnapshot {
    fn from(corpus: &Corpus) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            documents: corpus.documents().to_vec(),
            lexicon_documents: corpus.lexicon().documents().to_vec(),
            lexicon_tokens: corpus.lexicon().tokens().to_vec(),
            term_frequency: corpus.term_frequency().triplets(),
            idf: corpus.tfidf().idf().to_vec(),
            tfidf: corpus.tfidf().triplets(),
        }
    }
}

impl TryFrom<CorpusSnapshot> for Corpus {
    type Error = CorpusError;

    fn try_from(snapshot: CorpusSnapshot) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CorpusError::Cache(format!(
                "snapshot version {} (expected {SNAPSHOT_VERSION})",
                snapshot.version
            )));
        }
        let lexicon = Lexicon::from_sorted(snapshot.lexicon_documents, snapshot.lexicon_tokens)?;
        let shape = (lexicon.document_count(), lexicon.token_count());
        let tf = TermFrequencyMatrix::from_triplets(shape, &snapshot.term_frequency)?;
        let tfidf = TfIdfMatrix::from_parts(&tf, snapshot.idf, &snapshot.tfidf)?;
        Corpus::from_parts(snapshot.documents, lexicon, tf, tfidf)
    }
}

pub fn encode(corpus: &Corpus) -> Result<Vec<u8>> {
    Ok(bincode::serialize(&CorpusSnapshot::from(corpus))?)
}

pub fn decode(bytes: &[u8]) -> Result<Corpus> {
    let snapshot: CorpusSnapshot = bincode::deserialize(bytes)?;
    Corpus::try_from(snapshot)
}

/// Storage for computed corpora keyed by corpus id. `Ok(None)` is a miss.
pub trait CorpusCache: Send + Sync {
    fn load(&self, corpus_id: &str) -> Result<Option<Corpus>>;
    fn store(&self, corpus_id: &str, corpus: &Corpus) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub created_at: String,
    pub version: u32,
}

/// One directory per corpus id holding `snapshot.bin` and `meta.json`.
pub struct FsCache {
    pub root: PathBuf,
}

impl FsCache {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    fn dir(&self, corpus_id: &str) -> Result<PathBuf> {
        check_corpus_id(corpus_id)?;
        Ok(self.root.join(corpus_id))
    }
    fn snapshot(&self, corpus_id: &str) -> Result<PathBuf> { Ok(self.dir(corpus_id)?.join("snapshot.bin")) }
    fn meta(&self, corpus_id: &str) -> Result<PathBuf> { Ok(self.dir(corpus_id)?.join("meta.json")) }

    pub fn load_meta(&self, corpus_id: &str) -> Result<Option<MetaFile>> {
        let path = self.meta(corpus_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let mut f = File::open(path)?;
        let mut buf = String::new();
        f.read_to_string(&mut buf)?;
        Ok(Some(serde_json::from_str(&buf)?))
    }
}

impl CorpusCache for FsCache {
    fn load(&self, corpus_id: &str) -> Result<Option<Corpus>> {
        match self.load_meta(corpus_id)? {
            Some(meta) if meta.version == SNAPSHOT_VERSION => {}
            Some(meta) => {
                tracing::debug!(corpus_id, version = meta.version, "stale snapshot version");
                return Ok(None);
            }
            None => return Ok(None),
        }
        let path = self.snapshot(corpus_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let mut f = File::open(path)?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        decode(&buf).map(Some)
    }

    fn store(&self, corpus_id: &str, corpus: &Corpus) -> Result<()> {
        create_dir_all(self.dir(corpus_id)?)?;
        let mut f = File::create(self.snapshot(corpus_id)?)?;
        f.write_all(&encode(corpus)?)?;

        let meta = MetaFile {
            num_docs: corpus.documents().len() as u32,
            created_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
            version: SNAPSHOT_VERSION,
        };
        let mut f = File::create(self.meta(corpus_id)?)?;
        f.write_all(serde_json::to_string_pretty(&meta)?.as_bytes())?;
        Ok(())
    }
}

/// Snapshots in a sled tree, keyed by corpus id.
pub struct SledCache {
    db: sled::Db,
}

impl SledCache {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self { db: sled::open(path)? })
    }
}

impl CorpusCache for SledCache {
    fn load(&self, corpus_id: &str) -> Result<Option<Corpus>> {
        match self.db.get(corpus_id.as_bytes())? {
            Some(bytes) => match decode(&bytes) {
                Ok(corpus) => Ok(Some(corpus)),
                Err(CorpusError::Cache(reason)) => {
                    tracing::debug!(corpus_id, %reason, "unreadable snapshot treated as miss");
                    Ok(None)
                }
                Err(other) => Err(other),
            },
            None => Ok(None),
        }
    }

    fn store(&self, corpus_id: &str, corpus: &Corpus) -> Result<()> {
        self.db.insert(corpus_id.as_bytes(), encode(corpus)?)?;
        self.db.flush()?;
        Ok(())
    }
}

/// Process-local cache holding encoded snapshots.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryCache {
    pub fn new() -> Self { Self::default() }
}

impl CorpusCache for MemoryCache {
    fn load(&self, corpus_id: &str) -> Result<Option<Corpus>> {
        let entries = self.entries.lock();
        entries.get(corpus_id).map(|bytes| decode(bytes)).transpose()
    }

    fn store(&self, corpus_id: &str, corpus: &Corpus) -> Result<()> {
        let bytes = encode(corpus)?;
        self.entries.lock().insert(corpus_id.to_string(), bytes);
        Ok(())
    }
}

/// Which persistent cache a binary stores corpora in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackend {
    #[default]
    Fs,
    Sled,
}

impl CacheBackend {
    /// Open the backend under `dir`. The sled database lives in
    /// `dir/corpus.sled`.
    pub fn open<P: AsRef<Path>>(self, dir: P) -> Result<Box<dyn CorpusCache>> {
        let dir = dir.as_ref();
        let cache: Box<dyn CorpusCache> = match self {
            CacheBackend::Fs => Box::new(FsCache::new(dir)),
            CacheBackend::Sled => {
                create_dir_all(dir)?;
                Box::new(SledCache::open(dir.join("corpus.sled"))?)
            }
        };
        Ok(cache)
    }
}

impl std::str::FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fs" => Ok(CacheBackend::Fs),
            "sled" => Ok(CacheBackend::Sled),
            other => Err(format!("unknown cache backend {other:?} (expected fs or sled)")),
        }
    }
}

impl fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheBackend::Fs => "fs",
            CacheBackend::Sled => "sled",
        })
    }
}

fn check_corpus_id(corpus_id: &str) -> Result<()> {
    let ok = !corpus_id.is_empty()
        && corpus_id != "."
        && corpus_id != ".."
        && corpus_id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(CorpusError::Cache(format!("invalid corpus id {corpus_id:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::RawDocument;

    fn corpus() -> Corpus {
        Corpus::build(vec![RawDocument::new("a", "ward nurse"), RawDocument::new("b", "ward sister")])
            .unwrap()
            .0
    }

    #[test]
    fn snapshot_round_trip() {
        let c = corpus();
        assert_eq!(decode(&encode(&c).unwrap()).unwrap(), c);
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut snapshot = CorpusSnapshot::from(&corpus());
        snapshot.version = SNAPSHOT_VERSION + 1;
        assert!(matches!(Corpus::try_from(snapshot), Err(CorpusError::Cache(_))));
    }

    #[test]
    fn memory_cache_misses_then_hits() {
        let cache = MemoryCache::new();
        assert!(cache.load("uk").unwrap().is_none());
        cache.store("uk", &corpus()).unwrap();
        assert_eq!(cache.load("uk").unwrap(), Some(corpus()));
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("fs".parse::<CacheBackend>().unwrap(), CacheBackend::Fs);
        assert_eq!("SLED".parse::<CacheBackend>().unwrap(), CacheBackend::Sled);
        assert!("redis".parse::<CacheBackend>().is_err());
        assert_eq!(CacheBackend::Sled.to_string(), "sled");
    }

    #[test]
    fn path_like_ids_are_refused() {
        let cache = FsCache::new("/tmp/unused");
        assert!(cache.load("../etc").is_err());
        assert!(cache.load("").is_err());
    }
}
