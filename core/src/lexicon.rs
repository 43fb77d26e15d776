use crate::error::{CorpusError, Result};
use std::collections::{BTreeSet, HashMap};

pub type DocId = u32;
pub type TermId = u32;

/// Dense, sorted index over the documents and tokens of one corpus.
///
/// Both sides are assigned by ascending key order exactly once, in
/// [`Lexicon::build`]; every matrix derived from the corpus uses these ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lexicon {
    documents: Vec<String>,
    tokens: Vec<String>,
    document_index: HashMap<String, DocId>,
    token_index: HashMap<String, TermId>,
}

impl Lexicon {
    /// Build from `(document id, filtered tokens)` pairs.
    ///
    /// An empty input yields an empty lexicon. Repeated document ids are an
    /// index violation: ingestion is expected to have rejected them already.
    pub fn build<'a, I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a [String])>,
    {
        let mut documents: BTreeSet<&str> = BTreeSet::new();
        let mut lexicon: BTreeSet<&str> = BTreeSet::new();
        for (document_id, tokens) in entries {
            if !documents.insert(document_id) {
                return Err(CorpusError::InconsistentIndex(format!("document {document_id} listed twice")));
            }
            lexicon.extend(tokens.iter().map(String::as_str));
        }
        Self::from_sorted(
            documents.into_iter().map(str::to_string).collect(),
            lexicon.into_iter().map(str::to_string).collect(),
        )
    }

    /// Rebuild from id-ordered key lists, e.g. when restoring a snapshot.
    /// Keys must be strictly ascending, which also makes them unique.
    pub fn from_sorted(documents: Vec<String>, tokens: Vec<String>) -> Result<Self> {
        check_ascending("document", &documents)?;
        check_ascending("token", &tokens)?;
        if documents.len() > DocId::MAX as usize || tokens.len() > TermId::MAX as usize {
            return Err(CorpusError::InconsistentIndex("lexicon exceeds id range".into()));
        }
        let document_index = documents.iter().enumerate().map(|(i, d)| (d.clone(), i as DocId)).collect();
        let token_index = tokens.iter().enumerate().map(|(j, t)| (t.clone(), j as TermId)).collect();
        Ok(Self { documents, tokens, document_index, token_index })
    }

    pub fn document_count(&self) -> usize { self.documents.len() }

    pub fn token_count(&self) -> usize { self.tokens.len() }

    pub fn is_empty(&self) -> bool { self.documents.is_empty() }

    pub fn document_index(&self, document_id: &str) -> Option<DocId> {
        self.document_index.get(document_id).copied()
    }

    pub fn token_index(&self, token: &str) -> Option<TermId> {
        self.token_index.get(token).copied()
    }

    /// Panics if `doc` is out of range; ids only come from this lexicon.
    pub fn document_id(&self, doc: DocId) -> &str { &self.documents[doc as usize] }

    pub fn token(&self, term: TermId) -> &str { &self.tokens[term as usize] }

    pub fn documents(&self) -> &[String] { &self.documents }

    pub fn tokens(&self) -> &[String] { &self.tokens }
}

fn check_ascending(kind: &str, keys: &[String]) -> Result<()> {
    match keys.windows(2).find(|w| w[0] >= w[1]) {
        Some(w) => Err(CorpusError::InconsistentIndex(format!(
            "{kind} keys not strictly ascending at {:?} / {:?}",
            w[0], w[1]
        ))),
        None => Ok(()),
    }
}
