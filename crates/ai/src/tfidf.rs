use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use kbase_core::{Entry, EntryId};

use crate::capability::{LoadedModel, ModelCapability};
use crate::context::TrainingContext;
use crate::result::{ModelArtifact, ModelError, RankedDoc, TrainOutcome};

const MODEL_NAME: &str = "tfidf";
const FORMAT_VERSION: u32 = 1;

/// Deterministic retrieval model: TF-IDF weighted bag of words over entry
/// questions, ranked by cosine similarity.
///
/// Model:
/// - Tokens are lowercase alphanumeric runs (Unicode aware).
/// - Term weight is `(1 + ln tf) * idf` with smoothed `idf = ln((1 + N) / (1 + df)) + 1`.
/// - Query terms unseen at training time still count toward the query norm
///   (with the maximum idf), so unrelated words lower confidence.
/// - Stop words of the query language are dropped from queries only.
/// - An empty corpus trains an index that matches nothing.
#[derive(Debug, Clone, Default)]
pub struct TfIdfModel;

impl TfIdfModel {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TfIdfIndex {
    /// Number of documents the idf table was computed over.
    documents: usize,
    idf: BTreeMap<String, f64>,
    docs: Vec<IndexedDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexedDoc {
    entry_id: EntryId,
    question: String,
    answer: String,
    weights: BTreeMap<String, f64>,
    norm: f64,
}

impl ModelCapability for TfIdfModel {
    fn name(&self) -> &str {
        MODEL_NAME
    }

    fn train(&self, corpus: &[Entry], ctx: &TrainingContext) -> Result<TrainOutcome, ModelError> {
        let total = corpus.len() as u64;
        // Two passes over the corpus: term statistics, then weighting.
        let units = total * 2;
        ctx.report_progress(0, units);

        let mut term_counts: Vec<HashMap<String, u32>> = Vec::with_capacity(corpus.len());
        let mut df: HashMap<String, u32> = HashMap::new();

        for (i, entry) in corpus.iter().enumerate() {
            if ctx.is_cancelled() {
                return Ok(TrainOutcome::Cancelled);
            }
            let counts = count_terms(&entry.question);
            for term in counts.keys() {
                *df.entry(term.clone()).or_insert(0) += 1;
            }
            term_counts.push(counts);
            ctx.report_progress(i as u64 + 1, units);
        }

        let n = corpus.len() as f64;
        let idf: BTreeMap<String, f64> = df
            .into_iter()
            .map(|(term, df)| (term, smoothed_idf(n, df as f64)))
            .collect();

        let mut docs = Vec::with_capacity(corpus.len());
        for (i, (entry, counts)) in corpus.iter().zip(term_counts).enumerate() {
            if ctx.is_cancelled() {
                return Ok(TrainOutcome::Cancelled);
            }
            let weights: BTreeMap<String, f64> = counts
                .into_iter()
                .map(|(term, tf)| {
                    let w = sublinear_tf(tf) * idf.get(&term).copied().unwrap_or(0.0);
                    (term, w)
                })
                .collect();
            let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
            docs.push(IndexedDoc {
                entry_id: entry.id.clone(),
                question: entry.question.clone(),
                answer: entry.answer.clone(),
                weights,
                norm,
            });
            ctx.report_progress(total + i as u64 + 1, units);
        }

        let index = TfIdfIndex {
            documents: corpus.len(),
            idf,
            docs,
        };
        let payload = serde_json::to_value(&index)
            .map_err(|e| ModelError::TrainingFailed(format!("could not encode index: {e}")))?;

        Ok(TrainOutcome::Trained(ModelArtifact::new(
            MODEL_NAME,
            FORMAT_VERSION,
            corpus.len(),
            payload,
        )))
    }

    fn load(&self, artifact: &ModelArtifact) -> Result<Arc<dyn LoadedModel>, ModelError> {
        Ok(Arc::new(decode_index(artifact)?))
    }
}

impl LoadedModel for TfIdfIndex {
    fn predict(&self, query: &str, language: &str, limit: usize) -> Result<Vec<RankedDoc>, ModelError> {
        let stop = stop_words(language);
        let mut query_counts = count_terms(query);
        query_counts.retain(|term, _| !stop.contains(&term.as_str()));
        if query_counts.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let unseen_idf = smoothed_idf(self.documents as f64, 0.0);
        let query_weights: Vec<(String, f64)> = query_counts
            .into_iter()
            .map(|(term, tf)| {
                let idf = self.idf.get(&term).copied().unwrap_or(unseen_idf);
                let w = sublinear_tf(tf) * idf;
                (term, w)
            })
            .collect();
        let query_norm = query_weights.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if query_norm <= f64::EPSILON {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f64)> = self
            .docs
            .iter()
            .enumerate()
            .filter_map(|(pos, doc)| {
                if doc.norm <= f64::EPSILON {
                    return None;
                }
                let dot: f64 = query_weights
                    .iter()
                    .filter_map(|(term, qw)| doc.weights.get(term).map(|dw| qw * dw))
                    .sum();
                let score = (dot / (query_norm * doc.norm)).clamp(0.0, 1.0);
                (score > 0.0).then_some((pos, score))
            })
            .collect();

        // Highest score first; earlier corpus position wins ties.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(pos, confidence)| {
                let doc = &self.docs[pos];
                RankedDoc {
                    entry_id: doc.entry_id.clone(),
                    question: doc.question.clone(),
                    content: doc.answer.clone(),
                    confidence,
                }
            })
            .collect())
    }
}

fn decode_index(artifact: &ModelArtifact) -> Result<TfIdfIndex, ModelError> {
    let incompatible = |reason: String| ModelError::IncompatibleArtifact {
        model: MODEL_NAME.to_string(),
        reason,
    };

    if artifact.model != MODEL_NAME {
        return Err(incompatible(format!("produced by {}", artifact.model)));
    }
    if artifact.format_version != FORMAT_VERSION {
        return Err(incompatible(format!(
            "format version {} (expected {FORMAT_VERSION})",
            artifact.format_version
        )));
    }
    serde_json::from_value(artifact.payload.clone()).map_err(|e| incompatible(e.to_string()))
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn count_terms(text: &str) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

fn smoothed_idf(documents: f64, df: f64) -> f64 {
    ((1.0 + documents) / (1.0 + df)).ln() + 1.0
}

fn sublinear_tf(tf: u32) -> f64 {
    if tf == 0 { 0.0 } else { 1.0 + (tf as f64).ln() }
}

fn stop_words(language: &str) -> &'static [&'static str] {
    let lang = language.trim().to_ascii_lowercase();
    match lang.split(['-', '_']).next().unwrap_or_default() {
        "en" => &[
            "a", "an", "and", "are", "do", "does", "for", "i", "in", "is", "it", "of", "on", "or",
            "the", "to", "what", "you", "your",
        ],
        "fr" => &[
            "au", "aux", "de", "des", "du", "en", "est", "et", "la", "le", "les", "un", "une",
            "vous", "votre", "quel", "quelle", "quels", "quelles",
        ],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, question: &str, answer: &str) -> Entry {
        Entry {
            id: EntryId::parse(id).unwrap(),
            kind: String::new(),
            source: String::new(),
            question: question.to_string(),
            answer: answer.to_string(),
        }
    }

    fn corpus() -> Vec<Entry> {
        vec![
            entry("hours", "What are your opening hours?", "9-5"),
            entry("refund", "How do I get a refund for my order?", "Contact support"),
            entry("shipping", "How long does shipping take?", "3 days"),
        ]
    }

    fn train(model: &TfIdfModel, corpus: &[Entry]) -> ModelArtifact {
        match model.train(corpus, &TrainingContext::new()).unwrap() {
            TrainOutcome::Trained(a) => a,
            TrainOutcome::Cancelled => panic!("unexpected cancellation"),
        }
    }

    #[test]
    fn exact_question_ranks_first_with_full_confidence() {
        let model = TfIdfModel::new();
        let artifact = train(&model, &[entry("h", "hours?", "9-5")]);

        let ranked = model.predict(&artifact, "hours?", "en", 10).unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].content, "9-5");
        assert!((ranked[0].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ranks_most_similar_question_first() {
        let model = TfIdfModel::new();
        let artifact = train(&model, &corpus());

        let ranked = model.predict(&artifact, "refund my order", "en", 10).unwrap();
        assert_eq!(ranked[0].entry_id.as_str(), "refund");
        assert!(ranked.windows(2).all(|w| w[0].confidence >= w[1].confidence));
    }

    #[test]
    fn unrelated_query_returns_nothing() {
        let model = TfIdfModel::new();
        let artifact = train(&model, &corpus());
        assert!(model.predict(&artifact, "zebra", "en", 10).unwrap().is_empty());
        assert!(model.predict(&artifact, "   ", "en", 10).unwrap().is_empty());
    }

    #[test]
    fn prediction_is_deterministic() {
        let model = TfIdfModel::new();
        let artifact = train(&model, &corpus());
        let a = model.predict(&artifact, "how long", "en", 10).unwrap();
        let b = model.predict(&artifact, "how long", "en", 10).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn limit_truncates_results() {
        let model = TfIdfModel::new();
        let artifact = train(&model, &corpus());
        let ranked = model.predict(&artifact, "how", "en", 1).unwrap();
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn empty_corpus_trains_an_index_that_matches_nothing() {
        let model = TfIdfModel::new();
        let artifact = train(&model, &[]);
        assert_eq!(artifact.document_count, 0);
        assert!(model.predict(&artifact, "hours?", "en", 10).unwrap().is_empty());
    }

    #[test]
    fn loaded_index_answers_repeatedly() {
        let model = TfIdfModel::new();
        let loaded = model.load(&train(&model, &corpus())).unwrap();
        let first = loaded.predict("shipping", "en", 10).unwrap();
        assert_eq!(first[0].entry_id.as_str(), "shipping");
        assert_eq!(loaded.predict("shipping", "en", 10).unwrap(), first);
    }

    #[test]
    fn cancelled_context_stops_training() {
        let model = TfIdfModel::new();
        let ctx = TrainingContext::new();
        ctx.cancel();
        let outcome = model.train(&corpus(), &ctx).unwrap();
        assert_eq!(outcome, TrainOutcome::Cancelled);
    }

    #[test]
    fn training_reports_full_progress() {
        let model = TfIdfModel::new();
        let ctx = TrainingContext::new();
        train_with(&model, &ctx);
        let (done, total) = ctx.progress();
        assert_eq!(done, total);
        assert_eq!(total, 6);
    }

    fn train_with(model: &TfIdfModel, ctx: &TrainingContext) {
        let outcome = model.train(&corpus(), ctx).unwrap();
        assert!(matches!(outcome, TrainOutcome::Trained(_)));
    }

    #[test]
    fn foreign_artifact_is_incompatible() {
        let model = TfIdfModel::new();
        let artifact = ModelArtifact::new("other", 1, 0, serde_json::Value::Null);
        let err = model.predict(&artifact, "hours", "en", 10).unwrap_err();
        assert!(matches!(err, ModelError::IncompatibleArtifact { .. }));
    }
}
