use crate::error::{CorpusError, Result};
use crate::lexicon::{DocId, Lexicon, TermId};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sprs::CsMat;
use std::collections::HashMap;

/// One stored matrix entry: `(row, column, value)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triplet<N> {
    pub doc: DocId,
    pub term: TermId,
    pub value: N,
}

/// Sparse documents × tokens occurrence counts, rows in lexicon order.
#[derive(Debug, Clone, PartialEq)]
pub struct TermFrequencyMatrix {
    counts: CsMat<u32>,
}

impl TermFrequencyMatrix {
    /// Count every token of every document. Documents may arrive in any
    /// order; rows are placed by lexicon id.
    ///
    /// Counting runs per document in parallel. Entries for a row are sorted
    /// by term id before assembly, so the result does not depend on thread
    /// scheduling or hash iteration order.
    pub fn build<D>(lexicon: &Lexicon, documents: &[D]) -> Result<Self>
    where
        D: AsDocumentTokens + Sync,
    {
        let counted: Vec<(DocId, Vec<(TermId, u32)>)> = documents
            .par_iter()
            .map(|doc| count_document(lexicon, doc.document_id(), doc.filtered_tokens()))
            .collect::<Result<_>>()?;

        let mut rows: Vec<Option<Vec<(TermId, u32)>>> = vec![None; lexicon.document_count()];
        for (doc, entries) in counted {
            let slot = &mut rows[doc as usize];
            if slot.is_some() {
                return Err(CorpusError::InconsistentIndex(format!(
                    "document {} counted twice",
                    lexicon.document_id(doc)
                )));
            }
            *slot = Some(entries);
        }
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                row.ok_or_else(|| {
                    CorpusError::InconsistentIndex(format!(
                        "document {} has no token row",
                        lexicon.document_id(i as DocId)
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let counts = assemble_csr((lexicon.document_count(), lexicon.token_count()), rows);
        tracing::debug!(rows = counts.rows(), cols = counts.cols(), nnz = counts.nnz(), "term frequency matrix built");
        Ok(Self { counts })
    }

    /// Restore from stored entries, checking shape and ordering.
    pub fn from_triplets(shape: (usize, usize), triplets: &[Triplet<u32>]) -> Result<Self> {
        if triplets.iter().any(|t| t.value == 0) {
            return Err(CorpusError::InconsistentIndex("stored zero count".into()));
        }
        let rows = rows_from_triplets(shape, triplets)?;
        Ok(Self { counts: assemble_csr(shape, rows) })
    }

    pub fn shape(&self) -> (usize, usize) { (self.counts.rows(), self.counts.cols()) }

    pub fn nnz(&self) -> usize { self.counts.nnz() }

    /// `(term, count)` pairs of one document, ascending by term.
    pub fn row(&self, doc: DocId) -> impl Iterator<Item = (TermId, u32)> + '_ {
        self.counts
            .outer_view(doc as usize)
            .into_iter()
            .flat_map(|view| view.iter().map(|(j, &c)| (j as TermId, c)).collect::<Vec<_>>())
    }

    /// Sorted column ids with a nonzero count: the document's type set.
    pub fn types(&self, doc: DocId) -> Vec<TermId> { self.row(doc).map(|(j, _)| j).collect() }

    pub fn row_sum(&self, doc: DocId) -> u64 { self.row(doc).map(|(_, c)| c as u64).sum() }

    /// Number of documents with a nonzero entry in each column.
    pub fn document_frequencies(&self) -> Vec<u32> {
        let mut df = vec![0u32; self.counts.cols()];
        for &j in self.counts.indices() {
            df[j] += 1;
        }
        df
    }

    pub fn triplets(&self) -> Vec<Triplet<u32>> { collect_triplets(&self.counts) }

    pub(crate) fn as_csr(&self) -> &CsMat<u32> { &self.counts }
}

/// Access to the pieces of a document the matrix builder needs.
pub trait AsDocumentTokens {
    fn document_id(&self) -> &str;
    fn filtered_tokens(&self) -> &[String];
}

fn count_document(lexicon: &Lexicon, document_id: &str, tokens: &[String]) -> Result<(DocId, Vec<(TermId, u32)>)> {
    let doc = lexicon
        .document_index(document_id)
        .ok_or_else(|| CorpusError::InconsistentIndex(format!("document {document_id} missing from lexicon")))?;

    let mut freq: HashMap<&str, u32> = HashMap::new();
    for token in tokens {
        *freq.entry(token.as_str()).or_insert(0) += 1;
    }

    let mut entries = Vec::with_capacity(freq.len());
    for (token, count) in freq {
        let term = lexicon.token_index(token).ok_or_else(|| {
            CorpusError::InconsistentIndex(format!("token {token:?} of {document_id} missing from lexicon"))
        })?;
        entries.push((term, count));
    }
    entries.sort_unstable_by_key(|&(term, _)| term);
    Ok((doc, entries))
}

/// Build a CSR matrix from per-row entries already sorted by column.
pub(crate) fn assemble_csr<N: Copy>(shape: (usize, usize), rows: Vec<Vec<(TermId, N)>>) -> CsMat<N> {
    let nnz = rows.iter().map(Vec::len).sum();
    let mut indptr = Vec::with_capacity(shape.0 + 1);
    let mut indices = Vec::with_capacity(nnz);
    let mut data = Vec::with_capacity(nnz);
    indptr.push(0);
    for row in rows {
        for (term, value) in row {
            indices.push(term as usize);
            data.push(value);
        }
        indptr.push(indices.len());
    }
    CsMat::new(shape, indptr, indices, data)
}

/// Group stored triplets into rows, rejecting anything `assemble_csr` would
/// refuse: out-of-range ids, unsorted or repeated entries.
pub(crate) fn rows_from_triplets<N: Copy>(shape: (usize, usize), triplets: &[Triplet<N>]) -> Result<Vec<Vec<(TermId, N)>>> {
    let mut rows: Vec<Vec<(TermId, N)>> = vec![Vec::new(); shape.0];
    let mut last: Option<(DocId, TermId)> = None;
    for t in triplets {
        if t.doc as usize >= shape.0 || t.term as usize >= shape.1 {
            return Err(CorpusError::InconsistentIndex(format!(
                "entry ({}, {}) outside {}x{} matrix",
                t.doc, t.term, shape.0, shape.1
            )));
        }
        if let Some(prev) = last {
            if prev >= (t.doc, t.term) {
                return Err(CorpusError::InconsistentIndex(format!("entry ({}, {}) out of order", t.doc, t.term)));
            }
        }
        last = Some((t.doc, t.term));
        rows[t.doc as usize].push((t.term, t.value));
    }
    Ok(rows)
}

pub(crate) fn collect_triplets<N: Copy>(mat: &CsMat<N>) -> Vec<Triplet<N>> {
    let mut out = Vec::with_capacity(mat.nnz());
    for (i, row) in mat.outer_iterator().enumerate() {
        for (j, &value) in row.iter() {
            out.push(Triplet { doc: i as DocId, term: j as TermId, value });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doc(&'static str, Vec<String>);

    impl AsDocumentTokens for Doc {
        fn document_id(&self) -> &str { self.0 }
        fn filtered_tokens(&self) -> &[String] { &self.1 }
    }

    fn doc(id: &'static str, text: &str) -> Doc {
        Doc(id, text.split_whitespace().map(str::to_string).collect())
    }

    fn lexicon_for(docs: &[Doc]) -> Lexicon {
        Lexicon::build(docs.iter().map(|d| (d.0, d.1.as_slice()))).unwrap()
    }

    #[test]
    fn counts_occurrences_not_presence() {
        let docs = vec![doc("b", "nurse nurse ward"), doc("a", "ward")];
        let lex = lexicon_for(&docs);
        let tf = TermFrequencyMatrix::build(&lex, &docs).unwrap();
        assert_eq!(tf.shape(), (2, 2));
        let b = lex.document_index("b").unwrap();
        let nurse = lex.token_index("nurse").unwrap();
        assert_eq!(tf.row(b).collect::<Vec<_>>(), vec![(nurse, 2), (lex.token_index("ward").unwrap(), 1)]);
        assert_eq!(tf.row_sum(b), 3);
        assert_eq!(tf.document_frequencies(), vec![1, 2]);
    }

    #[test]
    fn empty_document_has_empty_row() {
        let docs = vec![doc("a", "ward"), doc("z", "")];
        let lex = lexicon_for(&docs);
        let tf = TermFrequencyMatrix::build(&lex, &docs).unwrap();
        assert_eq!(tf.row(1).count(), 0);
        assert!(tf.types(1).is_empty());
        assert_eq!(tf.nnz(), 1);
    }

    #[test]
    fn token_outside_lexicon_is_inconsistent() {
        let docs = vec![doc("a", "ward")];
        let lex = lexicon_for(&docs);
        let stray = vec![doc("a", "ward theatre")];
        let err = TermFrequencyMatrix::build(&lex, &stray).unwrap_err();
        assert!(matches!(err, CorpusError::InconsistentIndex(_)));
    }

    #[test]
    fn triplets_restore_the_same_matrix() {
        let docs = vec![doc("a", "ward nurse"), doc("b", "nurse")];
        let lex = lexicon_for(&docs);
        let tf = TermFrequencyMatrix::build(&lex, &docs).unwrap();
        let restored = TermFrequencyMatrix::from_triplets(tf.shape(), &tf.triplets()).unwrap();
        assert_eq!(restored, tf);
    }

    #[test]
    fn out_of_order_triplets_are_rejected() {
        let triplets = [Triplet { doc: 1, term: 0, value: 1 }, Triplet { doc: 0, term: 0, value: 1 }];
        assert!(TermFrequencyMatrix::from_triplets((2, 1), &triplets).is_err());
    }
}
