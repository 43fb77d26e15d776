use crate::error::{CorpusError, Result};
use crate::lexicon::{DocId, Lexicon};
use crate::matrix::{AsDocumentTokens, TermFrequencyMatrix};
use crate::query::QueryEngine;
use crate::tfidf::TfIdfMatrix;
use crate::tokenizer::{filter_tokens, tokenize};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A `(document id, raw text)` pair as handed over by ingestion. The text is
/// kept as bytes so that undecodable input is reported per document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub id: String,
    pub text: Vec<u8>,
}

impl RawDocument {
    pub fn new(id: impl Into<String>, text: impl Into<Vec<u8>>) -> Self {
        Self { id: id.into(), text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub raw_tokens: Vec<String>,
    pub filtered_tokens: Vec<String>,
}

impl Document {
    pub fn analyze(id: impl Into<String>, text: &str) -> Self {
        let raw_tokens = tokenize(text);
        let filtered_tokens = filter_tokens(&raw_tokens);
        Self { id: id.into(), raw_tokens, filtered_tokens }
    }
}

impl AsDocumentTokens for Document {
    fn document_id(&self) -> &str { &self.id }
    fn filtered_tokens(&self) -> &[String] { &self.filtered_tokens }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub document_id: String,
    pub reason: String,
}

/// Outcome of a corpus build: how many documents made it in and which were
/// dropped on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub documents: usize,
    pub skipped: Vec<SkippedDocument>,
}

/// A fully loaded corpus: documents, lexicon and both matrices, mutually
/// consistent. There is no partially built state; queries go through
/// [`Corpus::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct Corpus {
    documents: Vec<Document>,
    lexicon: Lexicon,
    term_frequency: TermFrequencyMatrix,
    tfidf: TfIdfMatrix,
}

impl Corpus {
    /// Clean, tokenize and index a batch of raw documents.
    ///
    /// Documents that cannot be decoded, lack an id, or repeat an earlier id
    /// are skipped and listed in the report. If nothing survives the build
    /// fails with `EmptyCorpus`.
    pub fn build<I>(raw: I) -> Result<(Self, BuildReport)>
    where
        I: IntoIterator<Item = RawDocument>,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut accepted: Vec<(String, String)> = Vec::new();
        let mut skipped: Vec<SkippedDocument> = Vec::new();

        for doc in raw {
            match validate(doc, &seen) {
                Ok((id, text)) => {
                    seen.insert(id.clone());
                    accepted.push((id, text));
                }
                Err(CorpusError::MalformedInput { document_id, reason }) => {
                    tracing::debug!(%document_id, %reason, "skipping document");
                    skipped.push(SkippedDocument { document_id, reason });
                }
                Err(other) => return Err(other),
            }
        }
        if !skipped.is_empty() {
            tracing::warn!(skipped = skipped.len(), "documents skipped during corpus build");
        }

        let documents: Vec<Document> = accepted.par_iter().map(|(id, text)| Document::analyze(id.as_str(), text)).collect();
        let corpus = Self::from_documents(documents)?;
        let report = BuildReport { documents: corpus.documents.len(), skipped };
        tracing::info!(
            documents = report.documents,
            tokens = corpus.lexicon.token_count(),
            entries = corpus.term_frequency.nnz(),
            "corpus built"
        );
        Ok((corpus, report))
    }

    /// Index already analyzed documents. Document order is irrelevant: the
    /// result is stored in lexicon order.
    pub fn from_documents(mut documents: Vec<Document>) -> Result<Self> {
        if documents.is_empty() {
            return Err(CorpusError::EmptyCorpus);
        }
        documents.sort_by(|a, b| a.id.cmp(&b.id));
        let lexicon = Lexicon::build(documents.iter().map(|d| (d.id.as_str(), d.filtered_tokens.as_slice())))?;
        let term_frequency = TermFrequencyMatrix::build(&lexicon, &documents)?;
        let tfidf = TfIdfMatrix::build(&term_frequency)?;
        Self::from_parts(documents, lexicon, term_frequency, tfidf)
    }

    /// Assemble from separately restored pieces, checking that they agree:
    /// documents in lexicon order, matching shapes, and every row summing to
    /// its document's filtered token count.
    pub fn from_parts(
        documents: Vec<Document>,
        lexicon: Lexicon,
        term_frequency: TermFrequencyMatrix,
        tfidf: TfIdfMatrix,
    ) -> Result<Self> {
        if documents.is_empty() {
            return Err(CorpusError::EmptyCorpus);
        }
        let shape = (lexicon.document_count(), lexicon.token_count());
        if term_frequency.shape() != shape || tfidf.shape() != shape {
            return Err(CorpusError::InconsistentIndex(format!(
                "matrix shapes {:?}/{:?} do not match lexicon {:?}",
                term_frequency.shape(),
                tfidf.shape(),
                shape
            )));
        }
        if documents.len() != lexicon.document_count() {
            return Err(CorpusError::InconsistentIndex("document list and lexicon differ in length".into()));
        }
        for (i, doc) in documents.iter().enumerate() {
            if lexicon.document_id(i as DocId) != doc.id {
                return Err(CorpusError::InconsistentIndex(format!("document {} is not at lexicon position {i}", doc.id)));
            }
            if term_frequency.row_sum(i as DocId) != doc.filtered_tokens.len() as u64 {
                return Err(CorpusError::InconsistentIndex(format!("row {i} does not sum to the token count of {}", doc.id)));
            }
        }
        Ok(Self { documents, lexicon, term_frequency, tfidf })
    }

    pub fn documents(&self) -> &[Document] { &self.documents }

    pub fn document(&self, document_id: &str) -> Result<&Document> {
        self.lexicon
            .document_index(document_id)
            .map(|i| &self.documents[i as usize])
            .ok_or_else(|| CorpusError::document_not_found(document_id))
    }

    pub fn lexicon(&self) -> &Lexicon { &self.lexicon }

    pub fn term_frequency(&self) -> &TermFrequencyMatrix { &self.term_frequency }

    pub fn tfidf(&self) -> &TfIdfMatrix { &self.tfidf }

    pub fn query(&self) -> QueryEngine<'_> {
        QueryEngine::new(&self.lexicon, &self.term_frequency, &self.tfidf)
    }
}

fn validate(doc: RawDocument, seen: &HashSet<String>) -> Result<(String, String)> {
    let id = doc.id.trim().to_string();
    let problem = if id.is_empty() {
        Some("empty document id".to_string())
    } else if seen.contains(&id) {
        Some("duplicate document id".to_string())
    } else {
        None
    };
    if let Some(reason) = problem {
        return Err(CorpusError::MalformedInput { document_id: id, reason });
    }
    match String::from_utf8(doc.text) {
        Ok(text) => Ok((id, text)),
        Err(e) => Err(CorpusError::MalformedInput { document_id: id, reason: format!("invalid utf-8: {e}") }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_documents_are_reported_not_fatal() {
        let raw = vec![
            RawDocument::new("b", "ward manager"),
            RawDocument::new("a", vec![0xff, 0xfe, b'x']),
            RawDocument::new("  ", "no id"),
            RawDocument::new("b", "duplicate"),
            RawDocument::new("c", "staff nurse"),
        ];
        let (corpus, report) = Corpus::build(raw).unwrap();
        assert_eq!(report.documents, 2);
        let ids: Vec<&str> = report.skipped.iter().map(|s| s.document_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "", "b"]);
        assert_eq!(corpus.lexicon().documents(), &["b", "c"]);
        assert_eq!(corpus.document("b").unwrap().filtered_tokens, vec!["ward", "manager"]);
    }

    #[test]
    fn nothing_left_is_an_empty_corpus() {
        let err = Corpus::build(vec![RawDocument::new("", "text")]).unwrap_err();
        assert!(matches!(err, CorpusError::EmptyCorpus));
        assert!(matches!(Corpus::build(Vec::new()), Err(CorpusError::EmptyCorpus)));
    }

    #[test]
    fn filtering_never_adds_tokens() {
        let (corpus, _) = Corpus::build(vec![
            RawDocument::new("x", "The <b>Band 5</b> nurse, and the... ward!"),
            RawDocument::new("y", "&amp; -- \u{2022}"),
        ])
        .unwrap();
        for doc in corpus.documents() {
            assert!(doc.filtered_tokens.len() <= doc.raw_tokens.len());
        }
        assert!(corpus.document("y").unwrap().filtered_tokens.is_empty());
    }

    #[test]
    fn mismatched_parts_are_rejected() {
        let (a, _) = Corpus::build(vec![RawDocument::new("a", "ward nurse")]).unwrap();
        let (b, _) = Corpus::build(vec![RawDocument::new("a", "ward"), RawDocument::new("b", "nurse")]).unwrap();
        let err = Corpus::from_parts(
            a.documents().to_vec(),
            a.lexicon().clone(),
            b.term_frequency().clone(),
            b.tfidf().clone(),
        )
        .unwrap_err();
        assert!(matches!(err, CorpusError::InconsistentIndex(_)));
    }
}
