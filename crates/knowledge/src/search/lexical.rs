//! BM25 keyword index.

use crate::chunk::Chunk;
use std::collections::HashMap;
use std::sync::Arc;
use unicode_segmentation::UnicodeSegmentation;

/// Term-frequency saturation
pub const DEFAULT_K1: f32 = 1.5;

/// Length normalization
pub const DEFAULT_B: f32 = 0.75;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "at", "but", "by", "for", "in", "is", "of", "on", "or", "the", "to", "with",
];

/// Whether `word` (already lowercased) is ignored for keyword matching.
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Lowercased Unicode words, minus stop words and single characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= 2 && !is_stop_word(w))
        .collect()
}

#[derive(Debug, Clone)]
struct IndexedDoc {
    id: String,
    len: usize,
    term_freqs: HashMap<String, u32>,
}

/// Immutable BM25 index over a chunk corpus.
///
/// Heading titles are indexed together with the chunk body. The index is
/// rebuilt from scratch whenever the corpus changes.
#[derive(Debug, Clone)]
pub struct LexicalIndex {
    k1: f32,
    b: f32,
    docs: Vec<IndexedDoc>,
    idf: HashMap<String, f32>,
    avg_len: f32,
}

impl Default for LexicalIndex {
    fn default() -> Self {
        Self::build(&[], DEFAULT_K1, DEFAULT_B)
    }
}

impl LexicalIndex {
    /// Build an index over `chunks`.
    pub fn build(chunks: &[Arc<Chunk>], k1: f32, b: f32) -> Self {
        let docs: Vec<IndexedDoc> = chunks
            .iter()
            .map(|chunk| {
                let tokens = tokenize(&chunk.search_text());
                let mut term_freqs = HashMap::new();
                for token in &tokens {
                    *term_freqs.entry(token.clone()).or_insert(0) += 1;
                }
                IndexedDoc {
                    id: chunk.id.clone(),
                    len: tokens.len(),
                    term_freqs,
                }
            })
            .collect();

        let mut doc_freqs: HashMap<&str, usize> = HashMap::new();
        for doc in &docs {
            for term in doc.term_freqs.keys() {
                *doc_freqs.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let total = docs.len() as f32;
        let idf = doc_freqs
            .into_iter()
            .map(|(term, df)| {
                let df = df as f32;
                (term.to_string(), ((total - df + 0.5) / (df + 0.5) + 1.0).ln())
            })
            .collect();

        let avg_len = if docs.is_empty() {
            0.0
        } else {
            docs.iter().map(|d| d.len).sum::<usize>() as f32 / total
        };

        Self {
            k1,
            b,
            docs,
            idf,
            avg_len,
        }
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// BM25 score per chunk id, for chunks with a non-zero score.
    pub fn score(&self, query: &str) -> HashMap<String, f32> {
        let query_terms = tokenize(query);
        let mut scores = HashMap::new();

        if query_terms.is_empty() || self.docs.is_empty() {
            return scores;
        }

        let avg_len = self.avg_len.max(1.0);

        for doc in &self.docs {
            let length_norm = 1.0 - self.b + self.b * doc.len as f32 / avg_len;
            let mut score = 0.0;

            for term in &query_terms {
                let (Some(&tf), Some(&idf)) = (doc.term_freqs.get(term), self.idf.get(term))
                else {
                    continue;
                };
                let tf = tf as f32;
                score += idf * tf * (self.k1 + 1.0) / (tf + self.k1 * length_norm);
            }

            if score > 0.0 {
                scores.insert(doc.id.clone(), score);
            }
        }

        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, ContentKind};

    fn chunk(source: &str, text: &str) -> Arc<Chunk> {
        Arc::new(Chunk::new(
            source,
            0,
            text.to_string(),
            vec![],
            (1, 1),
            ContentKind::Prose,
        ))
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("The quick, brown fox's den! A x"),
            vec!["quick", "brown", "fox's", "den"]
        );
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_matching_chunk_scores_higher() {
        let chunks = vec![
            chunk("a.md", "Rust ownership and borrowing rules"),
            chunk("b.md", "Python list comprehension syntax"),
            chunk("c.md", "Borrowing in Rust prevents data races"),
        ];
        let index = LexicalIndex::build(&chunks, DEFAULT_K1, DEFAULT_B);

        let scores = index.score("rust borrowing");
        assert_eq!(scores.len(), 2);
        assert!(scores.contains_key("a.md#0"));
        assert!(scores.contains_key("c.md#0"));
        assert!(!scores.contains_key("b.md#0"));
    }

    #[test]
    fn test_rarer_terms_weigh_more() {
        let chunks = vec![
            chunk("a.md", "cache cache layer"),
            chunk("b.md", "cache eviction policy"),
            chunk("c.md", "cache warmup"),
        ];
        let index = LexicalIndex::build(&chunks, DEFAULT_K1, DEFAULT_B);

        let scores = index.score("cache eviction");
        assert!(scores["b.md#0"] > scores["a.md#0"]);
    }

    #[test]
    fn test_headings_are_indexed() {
        let chunk = Arc::new(Chunk::new(
            "guide.md",
            0,
            "Run the installer.".to_string(),
            vec!["Installation".to_string()],
            (1, 2),
            ContentKind::Prose,
        ));
        let index = LexicalIndex::build(&[chunk], DEFAULT_K1, DEFAULT_B);

        assert!(index.score("installation").contains_key("guide.md#0"));
    }

    #[test]
    fn test_empty_index_and_query() {
        let index = LexicalIndex::default();
        assert!(index.is_empty());
        assert!(index.score("anything").is_empty());

        let index = LexicalIndex::build(&[chunk("a.md", "text here")], DEFAULT_K1, DEFAULT_B);
        assert!(index.score("the and").is_empty());
    }

    #[test]
    fn test_deterministic() {
        let chunks = vec![
            chunk("a.md", "alpha beta gamma"),
            chunk("b.md", "beta gamma delta"),
        ];
        let first = LexicalIndex::build(&chunks, DEFAULT_K1, DEFAULT_B).score("beta delta");
        let second = LexicalIndex::build(&chunks, DEFAULT_K1, DEFAULT_B).score("beta delta");
        assert_eq!(first, second);
    }
}
