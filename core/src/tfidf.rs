use crate::error::{CorpusError, Result};
use crate::lexicon::{DocId, TermId};
use crate::matrix::{assemble_csr, collect_triplets, TermFrequencyMatrix, Triplet};
use sprs::CsMat;

/// `idf[j] = ln(N) - ln(df[j])` for every lexicon column.
///
/// Fails with `EmptyCorpus` for `N == 0`, before any logarithm is taken. A
/// column nobody uses means the lexicon and matrix disagree.
pub fn inverse_document_frequency(tf: &TermFrequencyMatrix) -> Result<Vec<f64>> {
    let (n_docs, _) = tf.shape();
    if n_docs == 0 {
        return Err(CorpusError::EmptyCorpus);
    }
    let ln_n = (n_docs as f64).ln();
    tf.document_frequencies()
        .into_iter()
        .enumerate()
        .map(|(j, df)| {
            if df == 0 {
                Err(CorpusError::InconsistentIndex(format!("token column {j} occurs in no document")))
            } else {
                Ok(ln_n - (df as f64).ln())
            }
        })
        .collect()
}

/// Equal up to float noise; NaN never matches.
fn same_weight(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

/// TF-IDF weights, stored only where the term frequency is nonzero.
#[derive(Debug, Clone, PartialEq)]
pub struct TfIdfMatrix {
    weights: CsMat<f64>,
    idf: Vec<f64>,
}

impl TfIdfMatrix {
    pub fn build(tf: &TermFrequencyMatrix) -> Result<Self> {
        let idf = inverse_document_frequency(tf)?;
        let (n_docs, n_terms) = tf.shape();
        let rows: Vec<Vec<(TermId, f64)>> = (0..n_docs as DocId)
            .map(|i| tf.row(i).map(|(j, count)| (j, count as f64 * idf[j as usize])).collect())
            .collect();
        let weights = assemble_csr((n_docs, n_terms), rows);
        Ok(Self { weights, idf })
    }

    /// Restore from stored entries. The stored idf and weights are checked
    /// against a recomputation from `tf`; any disagreement is an
    /// `InconsistentIndex`, since queries would otherwise mix two indexes.
    pub fn from_parts(tf: &TermFrequencyMatrix, idf: Vec<f64>, triplets: &[Triplet<f64>]) -> Result<Self> {
        let expected = Self::build(tf)?;
        if idf.len() != expected.idf.len() {
            return Err(CorpusError::InconsistentIndex(format!(
                "idf has {} entries for {} tokens",
                idf.len(),
                expected.idf.len()
            )));
        }
        if let Some(j) = (0..idf.len()).find(|&j| !same_weight(idf[j], expected.idf[j])) {
            return Err(CorpusError::InconsistentIndex(format!(
                "stored idf for token column {j} is {}, document frequencies give {}",
                idf[j], expected.idf[j]
            )));
        }
        let recomputed = expected.triplets();
        if triplets.len() != recomputed.len()
            || recomputed.iter().zip(triplets).any(|(a, b)| (a.doc, a.term) != (b.doc, b.term))
        {
            return Err(CorpusError::InconsistentIndex("tf-idf sparsity differs from term frequency".into()));
        }
        if let Some((a, b)) = recomputed.iter().zip(triplets).find(|(a, b)| !same_weight(a.value, b.value)) {
            return Err(CorpusError::InconsistentIndex(format!(
                "stored weight at ({}, {}) is {}, tf x idf gives {}",
                b.doc, b.term, b.value, a.value
            )));
        }
        Ok(expected)
    }

    pub fn shape(&self) -> (usize, usize) { (self.weights.rows(), self.weights.cols()) }

    pub fn idf(&self) -> &[f64] { &self.idf }

    /// Weight at `(doc, term)`; absent entries are exactly zero.
    pub fn get(&self, doc: DocId, term: TermId) -> f64 {
        self.weights.get(doc as usize, term as usize).copied().unwrap_or(0.0)
    }

    /// `(term, weight)` pairs of one document, ascending by term.
    pub fn row(&self, doc: DocId) -> impl Iterator<Item = (TermId, f64)> + '_ {
        self.weights
            .outer_view(doc as usize)
            .into_iter()
            .flat_map(|view| view.iter().map(|(j, &w)| (j as TermId, w)).collect::<Vec<_>>())
    }

    /// Documents whose weight in `term` is nonzero.
    pub fn documents_with(&self, term: TermId) -> Vec<DocId> {
        (0..self.weights.rows() as DocId).filter(|&i| self.get(i, term) != 0.0).collect()
    }

    pub fn triplets(&self) -> Vec<Triplet<f64>> { collect_triplets(&self.weights) }

    pub(crate) fn as_csr(&self) -> &CsMat<f64> { &self.weights }
}
