//! Sparse TF-IDF vector space over chunk texts.
//!
//! The vocabulary is fit once over the full corpus and frozen afterwards:
//! query text is mapped into the same feature space and unknown tokens are
//! dropped. Weights use raw term counts, smoothed idf
//! (`ln((1 + n) / (1 + df)) + 1`) and L2 normalisation.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::record::ChunkRecord;
use crate::error::{Error, Result};

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("valid token regex"));

/// Vocabulary pruning thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorizerConfig {
    /// Drop terms found in more than this fraction of chunks
    pub max_df: f64,
    /// Drop terms found in fewer than this many chunks
    pub min_df: usize,
}

/// No pruning: every term seen in the corpus becomes a feature.
impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            max_df: 1.0,
            min_df: 1,
        }
    }
}

impl VectorizerConfig {
    /// Thresholds used when building an index for a whole manual.
    pub fn pruned() -> Self {
        Self {
            max_df: 0.85,
            min_df: 2,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.max_df > 0.0 && self.max_df <= 1.0) {
            return Err(Error::InvalidArgument(format!(
                "max_df must be in (0, 1], got {}",
                self.max_df
            )));
        }
        if self.min_df == 0 {
            return Err(Error::InvalidArgument(
                "min_df must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lowercase and split text into word tokens of two or more characters.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Per-term statistics recorded at fit time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TermStats {
    pub feature: u32,
    pub document_frequency: u32,
    pub idf: f32,
}

/// Frozen term -> feature mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    terms: BTreeMap<String, TermStats>,
    idf: Vec<f32>,
    document_count: usize,
}

impl Vocabulary {
    fn fit(texts: &[&str], config: &VectorizerConfig) -> Result<Self> {
        let n = texts.len();
        let mut document_frequency: BTreeMap<String, u32> = BTreeMap::new();

        for text in texts {
            let mut distinct = tokenize(text);
            distinct.sort_unstable();
            distinct.dedup();
            for term in distinct {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        let max_doc_count = config.max_df * n as f64;
        let min_doc_count = config.min_df as u32;
        let seen = document_frequency.len();

        let mut terms = BTreeMap::new();
        let mut idf = Vec::new();
        for (term, df) in document_frequency {
            if (df as f64) > max_doc_count || df < min_doc_count {
                continue;
            }
            let weight = (((1 + n) as f64 / (1 + df) as f64).ln() + 1.0) as f32;
            terms.insert(
                term,
                TermStats {
                    feature: idf.len() as u32,
                    document_frequency: df,
                    idf: weight,
                },
            );
            idf.push(weight);
        }

        debug!(
            "Vocabulary pruning kept {} of {} terms (max_df={}, min_df={})",
            terms.len(),
            seen,
            config.max_df,
            config.min_df
        );

        if terms.is_empty() {
            return Err(Error::InvalidCorpus(format!(
                "no terms remain after pruning {} candidate terms (max_df={}, min_df={})",
                seen, config.max_df, config.min_df
            )));
        }

        Ok(Self {
            terms,
            idf,
            document_count: n,
        })
    }

    /// Features must be `0..len` in term order, each with a finite idf.
    fn check(&self) -> Result<()> {
        if self.idf.len() != self.terms.len() {
            return Err(Error::SerializationError(format!(
                "vocabulary has {} terms but {} idf weights",
                self.terms.len(),
                self.idf.len()
            )));
        }
        for (expected, (term, stats)) in self.terms.iter().enumerate() {
            if stats.feature as usize != expected {
                return Err(Error::SerializationError(format!(
                    "term '{}' has feature {} (expected {})",
                    term, stats.feature, expected
                )));
            }
            if !stats.idf.is_finite() || self.idf[expected] != stats.idf {
                return Err(Error::SerializationError(format!(
                    "term '{}' has inconsistent idf",
                    term
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn get(&self, term: &str) -> Option<&TermStats> {
        self.terms.get(term)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms.contains_key(term)
    }

    /// Number of chunks the vocabulary was fit on.
    pub fn document_count(&self) -> usize {
        self.document_count
    }

    /// Terms in feature order.
    pub fn terms(&self) -> impl Iterator<Item = (&str, &TermStats)> {
        self.terms.iter().map(|(term, stats)| (term.as_str(), stats))
    }

    /// Term for a feature index.
    pub fn term(&self, feature: u32) -> Option<&str> {
        // BTreeMap order is feature order, so nth() is exact.
        self.terms.keys().nth(feature as usize).map(String::as_str)
    }

    /// Weighted, L2-normalised vector for `text`; unknown tokens are ignored.
    pub fn transform(&self, text: &str) -> ChunkVector {
        let mut counts: BTreeMap<u32, u32> = BTreeMap::new();
        for token in tokenize(text) {
            if let Some(stats) = self.terms.get(&token) {
                *counts.entry(stats.feature).or_insert(0) += 1;
            }
        }

        let weighted: Vec<(u32, f64)> = counts
            .into_iter()
            .map(|(feature, tf)| (feature, tf as f64 * self.idf[feature as usize] as f64))
            .collect();
        let norm = weighted.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm == 0.0 {
            return ChunkVector::default();
        }

        ChunkVector {
            entries: weighted
                .into_iter()
                .map(|(feature, w)| (feature, (w / norm) as f32))
                .collect(),
        }
    }
}

/// Sparse vector: (feature, weight) pairs sorted by feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkVector {
    entries: Vec<(u32, f32)>,
}

impl ChunkVector {
    pub fn entries(&self) -> &[(u32, f32)] {
        &self.entries
    }

    pub fn features(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|(feature, _)| *feature)
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn is_zero(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn norm(&self) -> f32 {
        self.entries.iter().map(|(_, w)| w * w).sum::<f32>().sqrt()
    }

    /// Dot product by merging the two sorted feature lists.
    pub fn dot(&self, other: &ChunkVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0f32;
        while i < self.entries.len() && j < other.entries.len() {
            let (fa, wa) = self.entries[i];
            let (fb, wb) = other.entries[j];
            match fa.cmp(&fb) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += wa * wb;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }

    pub fn cosine(&self, other: &ChunkVector) -> f32 {
        if self.is_zero() || other.is_zero() {
            return 0.0;
        }
        let norms = self.norm() * other.norm();
        if norms == 0.0 {
            return 0.0;
        }
        (self.dot(other) / norms).clamp(0.0, 1.0)
    }
}

/// Fitted vocabulary plus one vector per chunk, in corpus order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    config: VectorizerConfig,
    vocabulary: Vocabulary,
    chunk_ids: Vec<String>,
    vectors: Vec<ChunkVector>,
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl VectorIndex {
    /// Fit the vocabulary and compute all chunk vectors.
    pub fn build(corpus: &[ChunkRecord], config: VectorizerConfig) -> Result<Self> {
        config.validate()?;
        if corpus.is_empty() {
            return Err(Error::InvalidCorpus("corpus is empty".to_string()));
        }

        let texts: Vec<&str> = corpus.iter().map(|c| c.text.as_str()).collect();
        let vocabulary = Vocabulary::fit(&texts, &config)?;
        let vectors: Vec<ChunkVector> = texts.iter().map(|t| vocabulary.transform(t)).collect();
        let chunk_ids: Vec<String> = corpus.iter().map(|c| c.chunk_id.clone()).collect();

        info!(
            "Vector index built: {} chunks, {} features",
            chunk_ids.len(),
            vocabulary.len()
        );

        Ok(Self::from_parts(config, vocabulary, chunk_ids, vectors))
    }

    fn from_parts(
        config: VectorizerConfig,
        vocabulary: Vocabulary,
        chunk_ids: Vec<String>,
        vectors: Vec<ChunkVector>,
    ) -> Self {
        let positions = chunk_ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect();
        Self {
            config,
            vocabulary,
            chunk_ids,
            vectors,
            positions,
        }
    }

    /// Check a deserialized index and rebuild the lookup tables skipped by
    /// serialization.
    pub(crate) fn reindex(self) -> Result<Self> {
        self.config
            .validate()
            .map_err(|e| Error::SerializationError(e.to_string()))?;
        self.vocabulary.check()?;

        if self.chunk_ids.len() != self.vectors.len() {
            return Err(Error::SerializationError(format!(
                "index has {} chunk ids but {} vectors",
                self.chunk_ids.len(),
                self.vectors.len()
            )));
        }

        let features = self.vocabulary.len();
        for (chunk_id, vector) in self.chunk_ids.iter().zip(&self.vectors) {
            let sorted = vector.entries.windows(2).all(|pair| pair[0].0 < pair[1].0);
            let in_range = vector
                .entries
                .iter()
                .all(|(feature, weight)| (*feature as usize) < features && weight.is_finite());
            if !sorted || !in_range {
                return Err(Error::SerializationError(format!(
                    "vector of chunk {} does not fit the vocabulary ({} features)",
                    chunk_id, features
                )));
            }
        }

        let index = Self::from_parts(self.config, self.vocabulary, self.chunk_ids, self.vectors);
        if index.positions.len() != index.chunk_ids.len() {
            return Err(Error::SerializationError(
                "index contains duplicate chunk ids".to_string(),
            ));
        }
        Ok(index)
    }

    /// Map text into the frozen feature space.
    pub fn vectorize(&self, text: &str) -> ChunkVector {
        self.vocabulary.transform(text)
    }

    /// Cosine similarity of `query` against every chunk, in corpus order.
    pub fn similarity(&self, query: &ChunkVector) -> Vec<f32> {
        if query.is_zero() {
            return vec![0.0; self.vectors.len()];
        }
        // Query and chunk vectors are both unit length.
        self.vectors
            .iter()
            .map(|v| query.dot(v).clamp(0.0, 1.0))
            .collect()
    }

    pub fn config(&self) -> &VectorizerConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn chunk_ids(&self) -> &[String] {
        &self.chunk_ids
    }

    pub fn vectors(&self) -> &[ChunkVector] {
        &self.vectors
    }

    pub fn vector(&self, chunk_id: &str) -> Option<&ChunkVector> {
        self.position(chunk_id).map(|idx| &self.vectors[idx])
    }

    /// Corpus position of a chunk.
    pub fn position(&self, chunk_id: &str) -> Option<usize> {
        self.positions.get(chunk_id).copied()
    }

    pub fn len(&self) -> usize {
        self.chunk_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn corpus() -> Vec<ChunkRecord> {
        vec![
            ChunkRecord::new("ch1", "oil change reminder service", "12.1"),
            ChunkRecord::new("ch2", "ignition timing retarded cold start", "64.5"),
            ChunkRecord::new("ch3", "oil change reset tool clears flag", "12.2"),
        ]
    }

    fn keep_all() -> VectorizerConfig {
        VectorizerConfig {
            max_df: 1.0,
            min_df: 1,
        }
    }

    #[test]
    fn tokenize_lowercases_and_drops_single_chars() {
        assert_eq!(
            tokenize("Oil-Change: a B reset_tool 10 x"),
            vec!["oil", "change", "reset_tool", "10"]
        );
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn default_config_keeps_every_term() {
        let index = VectorIndex::build(&corpus(), VectorizerConfig::default()).unwrap();
        assert_eq!(index.vocabulary().len(), 13);
        assert!(index.vocabulary().contains("reset"));
    }

    #[test]
    fn similarity_stays_within_unit_range() {
        let index = VectorIndex::build(&corpus(), keep_all()).unwrap();
        let scores = index.similarity(&index.vectorize("oil change reminder service"));
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
        assert!((scores[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn reindex_rejects_inconsistent_parts() {
        let index = VectorIndex::build(&corpus(), keep_all()).unwrap();
        assert!(index.clone().reindex().is_ok());

        let mut truncated = index.clone();
        truncated.chunk_ids.pop();
        assert!(matches!(
            truncated.reindex(),
            Err(Error::SerializationError(_))
        ));

        let mut out_of_range = index.clone();
        out_of_range.vectors[0].entries.push((999, 0.1));
        assert!(matches!(
            out_of_range.reindex(),
            Err(Error::SerializationError(_))
        ));

        let mut short_idf = index.clone();
        short_idf.vocabulary.idf.pop();
        assert!(matches!(
            short_idf.reindex(),
            Err(Error::SerializationError(_))
        ));

        let mut shifted = index.clone();
        if let Some(stats) = shifted.vocabulary.terms.get_mut("oil") {
            stats.feature += 1;
        }
        assert!(matches!(
            shifted.reindex(),
            Err(Error::SerializationError(_))
        ));

        let mut duplicated = index;
        duplicated.chunk_ids[1] = "ch1".to_string();
        assert!(matches!(
            duplicated.reindex(),
            Err(Error::SerializationError(_))
        ));
    }

    #[test]
    fn pruning_respects_thresholds() {
        let index = VectorIndex::build(&corpus(), VectorizerConfig::pruned()).unwrap();
        let vocab = index.vocabulary();

        // min_df = 2 keeps only the terms shared by ch1 and ch3
        assert_eq!(vocab.len(), 2);
        assert!(vocab.contains("oil"));
        assert!(vocab.contains("change"));
        assert!(!vocab.contains("reset"));

        let strict = VectorizerConfig {
            max_df: 0.5,
            min_df: 1,
        };
        let index = VectorIndex::build(&corpus(), strict).unwrap();
        assert!(!index.vocabulary().contains("oil"));
        assert!(index.vocabulary().contains("ignition"));
    }

    #[test]
    fn feature_indices_follow_term_order() {
        let index = VectorIndex::build(&corpus(), keep_all()).unwrap();
        let terms: Vec<&str> = index.vocabulary().terms().map(|(t, _)| t).collect();
        let mut sorted = terms.clone();
        sorted.sort_unstable();
        assert_eq!(terms, sorted);

        for (expected, (term, stats)) in index.vocabulary().terms().enumerate() {
            assert_eq!(stats.feature as usize, expected);
            assert_eq!(index.vocabulary().term(stats.feature), Some(term));
        }
    }

    #[test]
    fn smoothed_idf_matches_formula() {
        let index = VectorIndex::build(&corpus(), keep_all()).unwrap();
        let oil = index.vocabulary().get("oil").unwrap();
        let expected = ((4.0f64 / 3.0).ln() + 1.0) as f32;
        assert_eq!(oil.document_frequency, 2);
        assert!((oil.idf - expected).abs() < 1e-6);
    }

    #[test]
    fn empty_corpus_is_invalid() {
        let err = VectorIndex::build(&[], VectorizerConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidCorpus(_)));
    }

    #[test]
    fn fully_pruned_vocabulary_is_invalid() {
        let corpus = vec![
            ChunkRecord::new("a", "alpha beta", "1.1"),
            ChunkRecord::new("b", "gamma delta", "1.2"),
        ];
        let err = VectorIndex::build(&corpus, VectorizerConfig::pruned()).unwrap_err();
        assert!(matches!(err, Error::InvalidCorpus(_)));

        let blank = vec![ChunkRecord::new("a", "- ! ?", "1.1")];
        assert!(matches!(
            VectorIndex::build(&blank, keep_all()).unwrap_err(),
            Error::InvalidCorpus(_)
        ));
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        for config in [
            VectorizerConfig {
                max_df: 0.0,
                min_df: 1,
            },
            VectorizerConfig {
                max_df: 1.5,
                min_df: 1,
            },
            VectorizerConfig {
                max_df: 0.5,
                min_df: 0,
            },
        ] {
            assert!(matches!(
                VectorIndex::build(&corpus(), config).unwrap_err(),
                Error::InvalidArgument(_)
            ));
        }
    }

    #[test]
    fn vectors_are_normalized_and_cover_present_terms() {
        let corpus = corpus();
        let index = VectorIndex::build(&corpus, keep_all()).unwrap();

        for (record, vector) in corpus.iter().zip(index.vectors()) {
            assert!((vector.norm() - 1.0).abs() < 1e-5);

            let features: BTreeSet<u32> = vector.features().collect();
            let expected: BTreeSet<u32> = tokenize(&record.text)
                .iter()
                .filter_map(|t| index.vocabulary().get(t).map(|s| s.feature))
                .collect();
            assert_eq!(features, expected);
        }
    }

    #[test]
    fn rebuild_is_deterministic() {
        let a = VectorIndex::build(&corpus(), keep_all()).unwrap();
        let b = VectorIndex::build(&corpus(), keep_all()).unwrap();
        assert_eq!(a.vocabulary(), b.vocabulary());
        assert_eq!(a.vectors(), b.vectors());
    }

    #[test]
    fn out_of_vocabulary_query_is_zero_vector() {
        let index = VectorIndex::build(&corpus(), keep_all()).unwrap();
        let query = index.vectorize("turbocharger wastegate");
        assert!(query.is_zero());
        assert!(index.similarity(&query).iter().all(|&s| s == 0.0));
        assert_eq!(index.vocabulary().len(), 13);
    }

    #[test]
    fn similarity_prefers_chunk_with_more_shared_terms() {
        let index = VectorIndex::build(&corpus(), keep_all()).unwrap();
        let scores = index.similarity(&index.vectorize("oil change reset"));

        assert_eq!(scores.len(), 3);
        assert!(scores[2] > scores[0]);
        assert!(scores[0] > 0.0);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn cosine_handles_edge_cases() {
        let zero = ChunkVector::default();
        let v = ChunkVector {
            entries: vec![(0, 0.6), (3, 0.8)],
        };
        let w = ChunkVector {
            entries: vec![(1, 1.0)],
        };

        assert_eq!(zero.cosine(&v), 0.0);
        assert!((v.cosine(&v) - 1.0).abs() < 1e-6);
        assert_eq!(v.cosine(&w), 0.0);
        assert!((v.dot(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn positions_follow_corpus_order() {
        let index = VectorIndex::build(&corpus(), keep_all()).unwrap();
        assert_eq!(index.position("ch3"), Some(2));
        assert_eq!(index.position("missing"), None);
        assert!(index.vector("ch1").is_some());
    }
}
