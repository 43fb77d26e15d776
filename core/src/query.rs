use crate::error::{CorpusError, Result};
use crate::lexicon::{DocId, Lexicon, TermId};
use crate::matrix::TermFrequencyMatrix;
use crate::svd::{l2_normalize_rows, truncated_svd, ProjectionOptions};
use crate::tfidf::TfIdfMatrix;
use crate::tokenizer::normalize_keyword;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarWord {
    pub token: String,
    /// Mean TF-IDF over the documents that contain the keyword.
    pub score: f64,
    pub pct_of_keyword_docs: f64,
    pub docs_with_token: u32,
    pub pct_of_all_docs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSimilarity {
    pub document_id: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedToken {
    pub token: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedDocument {
    pub document_id: String,
    pub x: f64,
    pub y: f64,
}

/// Read-only view over one loaded corpus. Every query is a pure function of
/// the lexicon and the two matrices.
#[derive(Debug, Clone, Copy)]
pub struct QueryEngine<'c> {
    lexicon: &'c Lexicon,
    tf: &'c TermFrequencyMatrix,
    tfidf: &'c TfIdfMatrix,
}

impl<'c> QueryEngine<'c> {
    pub(crate) fn new(lexicon: &'c Lexicon, tf: &'c TermFrequencyMatrix, tfidf: &'c TfIdfMatrix) -> Self {
        Self { lexicon, tf, tfidf }
    }

    fn document_count(&self) -> Result<usize> {
        match self.lexicon.document_count() {
            0 => Err(CorpusError::EmptyCorpus),
            n => Ok(n),
        }
    }

    /// Tokens that carry the most TF-IDF weight in the documents where
    /// `keyword` has nonzero weight.
    ///
    /// The keyword is cleaned the way descriptions are, so `" Nurse "` finds
    /// `nurse`. A keyword outside the lexicon is `NotFound`. A keyword that occurs in
    /// every document has zero weight everywhere, so no document qualifies
    /// and the result is empty.
    pub fn similar_words(&self, keyword: &str, top_n: usize) -> Result<Vec<SimilarWord>> {
        let n_docs = self.document_count()?;
        let keyword = normalize_keyword(keyword);
        let term = self.lexicon.token_index(&keyword).ok_or_else(|| CorpusError::keyword_not_found(&keyword))?;
        let subset = self.tfidf.documents_with(term);
        if subset.is_empty() {
            return Ok(Vec::new());
        }

        let n_terms = self.lexicon.token_count();
        let mut sums = vec![0.0f64; n_terms];
        let mut present = vec![0u32; n_terms];
        for &doc in &subset {
            for (j, w) in self.tfidf.row(doc) {
                sums[j as usize] += w;
            }
            for (j, _) in self.tf.row(doc) {
                present[j as usize] += 1;
            }
        }
        let df = self.tf.document_frequencies();
        let subset_len = subset.len() as f64;

        let mut ranked: Vec<(TermId, f64)> = sums.iter().enumerate().map(|(j, s)| (j as TermId, s / subset_len)).collect();
        // Term ids follow token order, so the id is the lexicographic tie-break.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        Ok(ranked
            .into_iter()
            .take(top_n)
            .map(|(j, score)| SimilarWord {
                token: self.lexicon.token(j).to_string(),
                score,
                pct_of_keyword_docs: 100.0 * present[j as usize] as f64 / subset_len,
                docs_with_token: df[j as usize],
                pct_of_all_docs: 100.0 * df[j as usize] as f64 / n_docs as f64,
            })
            .collect())
    }

    /// Jaccard index of `document_id`'s type set against every document,
    /// itself included, most similar first (ties in lexicon order).
    ///
    /// Two documents without any tokens score 0.0 against each other.
    pub fn jaccard_similarity(&self, document_id: &str) -> Result<Vec<DocumentSimilarity>> {
        self.document_count()?;
        let doc = self.document(document_id)?;
        let types: Vec<usize> = self.tf.types(doc).into_iter().map(|j| j as usize).collect();

        let mut scores: Vec<(DocId, f64)> = self
            .tf
            .as_csr()
            .outer_iterator()
            .enumerate()
            .map(|(i, row)| (i as DocId, jaccard(&types, row.indices())))
            .collect();
        scores.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        Ok(scores
            .into_iter()
            .map(|(i, similarity)| DocumentSimilarity { document_id: self.lexicon.document_id(i).to_string(), similarity })
            .collect())
    }

    /// Same as [`jaccard_similarity`](Self::jaccard_similarity) without the
    /// queried document's own entry.
    pub fn jaccard_similarity_to_others(&self, document_id: &str) -> Result<Vec<DocumentSimilarity>> {
        let mut scores = self.jaccard_similarity(document_id)?;
        scores.retain(|s| s.document_id != document_id);
        Ok(scores)
    }

    /// Jaccard index of one document pair.
    pub fn jaccard_between(&self, a: &str, b: &str) -> Result<f64> {
        let a = self.tf.types(self.document(a)?);
        let b = self.tf.types(self.document(b)?);
        let a: Vec<usize> = a.into_iter().map(|j| j as usize).collect();
        let b: Vec<usize> = b.into_iter().map(|j| j as usize).collect();
        Ok(jaccard(&a, &b))
    }

    /// 2-D embedding of every document for plotting, in lexicon order.
    pub fn project_2d(&self) -> Result<Vec<ProjectedDocument>> {
        self.project_2d_with(&ProjectionOptions::default())
    }

    pub fn project_2d_with(&self, options: &ProjectionOptions) -> Result<Vec<ProjectedDocument>> {
        self.document_count()?;
        let normalized = l2_normalize_rows(self.tfidf.as_csr());
        let embedding = truncated_svd(&normalized, 2, options);
        tracing::debug!(singular_values = ?embedding.singular_values, "documents projected");
        Ok(embedding
            .coordinates
            .into_iter()
            .enumerate()
            .map(|(i, point)| ProjectedDocument {
                document_id: self.lexicon.document_id(i as DocId).to_string(),
                x: point[0],
                y: point[1],
            })
            .collect())
    }

    /// Highest-weighted tokens of one document, ties by token.
    pub fn top_tokens(&self, document_id: &str, n: usize) -> Result<Vec<WeightedToken>> {
        let doc = self.document(document_id)?;
        let mut weights: Vec<(TermId, f64)> = self.tfidf.row(doc).collect();
        weights.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(weights
            .into_iter()
            .take(n)
            .map(|(j, weight)| WeightedToken { token: self.lexicon.token(j).to_string(), weight })
            .collect())
    }

    fn document(&self, document_id: &str) -> Result<DocId> {
        self.lexicon.document_index(document_id).ok_or_else(|| CorpusError::document_not_found(document_id))
    }
}

/// `|a ∩ b| / |a ∪ b|` over two ascending id lists; 0.0 when both are empty.
fn jaccard(a: &[usize], b: &[usize]) -> f64 {
    let (mut i, mut j, mut shared) = (0, 0, 0usize);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                shared += 1;
                i += 1;
                j += 1;
            }
        }
    }
    let union = a.len() + b.len() - shared;
    if union == 0 {
        0.0
    } else {
        shared as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jaccard_of_sorted_sets() {
        assert_eq!(jaccard(&[0, 2], &[1, 2]), 1.0 / 3.0);
        assert_eq!(jaccard(&[1, 2, 3], &[1, 2, 3]), 1.0);
        assert_eq!(jaccard(&[], &[4]), 0.0);
        assert_eq!(jaccard(&[], &[]), 0.0);
    }
}
