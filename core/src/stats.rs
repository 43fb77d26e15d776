use crate::corpus::Corpus;
use crate::error::Result;
use crate::query::WeightedToken;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Number of distinguishing tokens shown in a document summary.
pub const SUMMARY_TOP_TOKENS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub document_count: usize,
    /// Tokens before stopword/punctuation filtering.
    pub total_token_count: u64,
    pub filtered_token_count: u64,
    /// Lexicon size (filtered tokens).
    pub distinct_token_count: usize,
    pub distinct_raw_token_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_id: String,
    pub raw_token_count: usize,
    pub filtered_token_count: usize,
    pub filtered_tokens: Vec<String>,
    pub top_tokens: Vec<WeightedToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCount {
    pub token: String,
    pub count: u64,
    /// Share of all filtered tokens covered by this token and every token
    /// ranked above it.
    pub cumulative_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CdfPoint {
    pub length: usize,
    pub cumulative_fraction: f64,
}

impl Corpus {
    pub fn corpus_stats(&self) -> CorpusStats {
        let documents = self.documents();
        let distinct_raw: HashSet<&str> = documents.iter().flat_map(|d| d.raw_tokens.iter().map(String::as_str)).collect();
        CorpusStats {
            document_count: documents.len(),
            total_token_count: documents.iter().map(|d| d.raw_tokens.len() as u64).sum(),
            filtered_token_count: documents.iter().map(|d| d.filtered_tokens.len() as u64).sum(),
            distinct_token_count: self.lexicon().token_count(),
            distinct_raw_token_count: distinct_raw.len(),
        }
    }

    pub fn document_summary(&self, document_id: &str) -> Result<DocumentSummary> {
        let doc = self.document(document_id)?;
        Ok(DocumentSummary {
            document_id: doc.id.clone(),
            raw_token_count: doc.raw_tokens.len(),
            filtered_token_count: doc.filtered_tokens.len(),
            filtered_tokens: doc.filtered_tokens.clone(),
            top_tokens: self.query().top_tokens(document_id, SUMMARY_TOP_TOKENS)?,
        })
    }

    /// Empirical CDF of filtered document lengths: one point per distinct
    /// length, ascending.
    pub fn document_length_cdf(&self) -> Vec<CdfPoint> {
        let mut lengths: BTreeMap<usize, usize> = BTreeMap::new();
        for doc in self.documents() {
            *lengths.entry(doc.filtered_tokens.len()).or_default() += 1;
        }
        let total = self.documents().len() as f64;
        let mut seen = 0usize;
        lengths
            .into_iter()
            .map(|(length, count)| {
                seen += count;
                CdfPoint { length, cumulative_fraction: seen as f64 / total }
            })
            .collect()
    }

    /// Filtered token occurrences bucketed by character length.
    pub fn token_length_distribution(&self) -> BTreeMap<usize, u64> {
        let mut buckets = BTreeMap::new();
        for token in self.documents().iter().flat_map(|d| d.filtered_tokens.iter()) {
            *buckets.entry(token.chars().count()).or_insert(0u64) += 1;
        }
        buckets
    }

    /// The `n` most frequent filtered tokens, ties by token.
    pub fn most_common_tokens(&self, n: usize) -> Vec<TokenCount> {
        let lexicon = self.lexicon();
        let mut totals = vec![0u64; lexicon.token_count()];
        for t in self.term_frequency().triplets() {
            totals[t.term as usize] += t.value as u64;
        }
        let corpus_total: u64 = totals.iter().sum();
        let mut ranked: Vec<(usize, u64)> = totals.into_iter().enumerate().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut covered = 0u64;
        ranked
            .into_iter()
            .take(n)
            .map(|(j, count)| {
                covered += count;
                TokenCount {
                    token: lexicon.tokens()[j].clone(),
                    count,
                    cumulative_pct: if corpus_total == 0 { 0.0 } else { 100.0 * covered as f64 / corpus_total as f64 },
                }
            })
            .collect()
    }
}
