use std::collections::HashMap;
use std::collections::HashSet;

/// Three consecutive lowercase characters.
pub type Trigram = [char; 3];

/// Weight of trigrams from the rightmost path segment.
pub const MAX_WEIGHT_GRAM: f64 = 3.0;

/// Each segment further left weighs this many times less.
pub const WEIGHT_DECAY: f64 = 1.5;

/// Distinct trigrams of `text`, lowercased.
///
/// `"Dekel"` gives `dek`, `eke`, `kel`.
pub fn trigrams(text: &str) -> HashSet<Trigram> {
    let chars: Vec<char> = text.chars().flat_map(char::to_lowercase).collect();
    chars
        .windows(3)
        .map(|window| [window[0], window[1], window[2]])
        .collect()
}

/// Union of the trigrams of every receiver part.
pub fn receiver_grams<S: AsRef<str>>(parts: &[S]) -> HashSet<Trigram> {
    parts
        .iter()
        .flat_map(|part| trigrams(part.as_ref()))
        .collect()
}

/// Trigram weights of a path, highest for segments nearest the file name.
#[derive(Debug, Clone, Default)]
pub struct PathGramWeights {
    weights: HashMap<Trigram, f64>,
}

impl PathGramWeights {
    pub fn new<S: AsRef<str>>(segments: &[S]) -> Self {
        let mut weights = HashMap::new();
        let mut weight = MAX_WEIGHT_GRAM;
        for segment in segments.iter().rev() {
            for gram in trigrams(segment.as_ref()) {
                // A gram shared with a segment further right keeps that weight.
                weights.entry(gram).or_insert(weight);
            }
            weight /= WEIGHT_DECAY;
        }
        Self { weights }
    }

    pub fn weight(&self, gram: &Trigram) -> f64 {
        self.weights.get(gram).copied().unwrap_or(0.0)
    }

    /// Sum of the weights of `grams`.
    pub fn score(&self, grams: &HashSet<Trigram>) -> f64 {
        grams.iter().map(|gram| self.weight(gram)).sum()
    }
}
