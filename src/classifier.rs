//! Offline-trained text classifier for the statistical tier.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::normalize::canonical_key;

const MODEL_VERSION: u32 = 1;
const DEFAULT_MIN_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub account: String,
    /// Posterior probability of `account`, in `[0, 1]`.
    pub confidence: f64,
}

pub trait TextClassifier: Send + Sync {
    /// `None` when the model has nothing confident to say.
    fn predict(&self, memo: &str) -> Option<Prediction>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ClassStats {
    documents: u64,
    total_tokens: u64,
    tokens: BTreeMap<String, u64>,
}

/// Multinomial naive Bayes over canonical-key words, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NaiveBayesModel {
    version: u32,
    #[serde(default = "default_min_confidence")]
    min_confidence: f64,
    classes: BTreeMap<String, ClassStats>,
    vocabulary: u64,
}

fn default_min_confidence() -> f64 {
    DEFAULT_MIN_CONFIDENCE
}

fn tokens(memo: &str) -> Vec<String> {
    canonical_key(memo)
        .split_whitespace()
        .filter(|t| t.len() > 1)
        .map(str::to_string)
        .collect()
}

impl NaiveBayesModel {
    /// Train from `(memo, account)` examples.
    pub fn fit<'a>(examples: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut classes: BTreeMap<String, ClassStats> = BTreeMap::new();
        let mut vocabulary = std::collections::BTreeSet::new();
        for (memo, account) in examples {
            let toks = tokens(memo);
            if toks.is_empty() {
                continue;
            }
            let stats = classes.entry(account.to_string()).or_default();
            stats.documents += 1;
            for t in toks {
                stats.total_tokens += 1;
                *stats.tokens.entry(t.clone()).or_default() += 1;
                vocabulary.insert(t);
            }
        }
        Self {
            version: MODEL_VERSION,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            classes,
            vocabulary: vocabulary.len() as u64,
        }
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn known(&self, token: &str) -> bool {
        self.classes.values().any(|c| c.tokens.contains_key(token))
    }
}

impl TextClassifier for NaiveBayesModel {
    fn predict(&self, memo: &str) -> Option<Prediction> {
        let toks: Vec<String> = tokens(memo).into_iter().filter(|t| self.known(t)).collect();
        if toks.is_empty() || self.classes.is_empty() {
            return None;
        }
        let total_docs: u64 = self.classes.values().map(|c| c.documents).sum();
        let vocab = self.vocabulary.max(1) as f64;

        let scores: Vec<(&String, f64)> = self
            .classes
            .iter()
            .map(|(account, stats)| {
                let prior = (stats.documents as f64 / total_docs as f64).ln();
                let denom = stats.total_tokens as f64 + vocab;
                let likelihood: f64 = toks
                    .iter()
                    .map(|t| ((*stats.tokens.get(t).unwrap_or(&0) as f64 + 1.0) / denom).ln())
                    .sum();
                (account, prior + likelihood)
            })
            .collect();

        // softmax over log scores
        let max = scores.iter().map(|(_, s)| *s).fold(f64::NEG_INFINITY, f64::max);
        let norm: f64 = scores.iter().map(|(_, s)| (s - max).exp()).sum();
        let (account, best) = scores.iter().max_by(|a, b| a.1.total_cmp(&b.1))?;
        let confidence = (best - max).exp() / norm;
        if confidence < self.min_confidence {
            return None;
        }
        Some(Prediction {
            account: account.to_string(),
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> NaiveBayesModel {
        NaiveBayesModel::fit([
            ("STARBUCKS STORE 123", "6100 - Meals"),
            ("BLUE BOTTLE COFFEE", "6100 - Meals"),
            ("PEETS COFFEE", "6100 - Meals"),
            ("GITHUB INC", "5800 - Software & Subscriptions"),
            ("ADOBE CREATIVE CLOUD", "5800 - Software & Subscriptions"),
            ("DIGITALOCEAN CLOUD", "5810 - Hosting & Infrastructure"),
        ])
    }

    #[test]
    fn test_predicts_majority_class_for_shared_token() {
        let p = model().predict("PHILZ COFFEE").unwrap();
        assert_eq!(p.account, "6100 - Meals");
        assert!(p.confidence >= DEFAULT_MIN_CONFIDENCE);
    }

    #[test]
    fn test_unknown_tokens_yield_nothing() {
        assert!(model().predict("ZZZ QQQ").is_none());
        assert!(model().predict("1234").is_none());
    }

    #[test]
    fn test_threshold_suppresses_weak_predictions() {
        let mut m = model();
        m.min_confidence = 0.99;
        assert!(m.predict("CLOUD").is_none());
    }

    #[test]
    fn test_empty_model() {
        let m = NaiveBayesModel::fit(std::iter::empty());
        assert_eq!(m.class_count(), 0);
        assert!(m.predict("COFFEE").is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        model().save(&path).unwrap();
        let loaded = NaiveBayesModel::load(&path).unwrap();
        assert_eq!(loaded.class_count(), 3);
        assert_eq!(loaded.predict("PHILZ COFFEE").unwrap().account, "6100 - Meals");
    }
}
