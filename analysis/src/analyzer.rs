use crate::classifier::Classifier;
use crate::errors::Result;
use crate::store::FeedbackStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Closed sentiment vocabulary.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }

    fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Sentiment::Positive),
            "negative" => Some(Sentiment::Negative),
            "neutral" => Some(Sentiment::Neutral),
            _ => None,
        }
    }
}

/// The normalized analysis returned to the caller.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct FeedbackAnalysis {
    pub original_text: String,
    pub sentiment: Sentiment,
    pub summary: String,
}

/// Structured shape the collaborator is asked for. Extra fields such as
/// `suggestions` are tolerated and ignored.
#[derive(Deserialize)]
struct StructuredAnalysis {
    sentiment: String,
    #[serde(default)]
    summary: Option<String>,
}

const POSITIVE_LEXICON: &[&str] = &["positive", "good", "great", "excellent", "love", "like"];
const NEGATIVE_LEXICON: &[&str] = &["negative", "bad", "poor", "terrible", "hate", "dislike"];

/// Deterministic keyword fallback for collaborator output that does not
/// parse as the requested structure. Intentionally simple: presence of a
/// positive-lexicon word wins, then negative, then neutral.
pub fn fallback_sentiment(raw: &str) -> Sentiment {
    let lowered = raw.to_lowercase();

    if POSITIVE_LEXICON.iter().any(|word| lowered.contains(word)) {
        Sentiment::Positive
    } else if NEGATIVE_LEXICON.iter().any(|word| lowered.contains(word)) {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

/// Parses the collaborator's raw output: the structured shape passes
/// through, anything else falls back to the keyword scan with the raw
/// text as the summary.
fn interpret(raw: &str) -> (Sentiment, String) {
    if let Ok(structured) = serde_json::from_str::<StructuredAnalysis>(raw)
        && let Some(sentiment) = Sentiment::parse(&structured.sentiment)
    {
        let summary = structured.summary.unwrap_or_else(|| raw.to_string());
        return (sentiment, summary);
    }

    (fallback_sentiment(raw), raw.to_string())
}

/// Orchestrates one analysis: classify, interpret, best-effort persist.
pub struct FeedbackAnalyzer {
    classifier: Arc<dyn Classifier>,
    store: Option<Arc<FeedbackStore>>,
}

impl FeedbackAnalyzer {
    pub fn new(classifier: Arc<dyn Classifier>, store: Option<Arc<FeedbackStore>>) -> Self {
        FeedbackAnalyzer { classifier, store }
    }

    /// Analyzes one piece of feedback.
    ///
    /// A history-write failure is logged and swallowed; the analysis is
    /// returned to the caller regardless.
    pub async fn analyze(&self, text: &str) -> Result<FeedbackAnalysis> {
        let raw = self.classifier.classify(text).await?;
        let (sentiment, summary) = interpret(&raw);

        if let Some(store) = &self.store {
            if let Err(e) = store.record(text, sentiment, &summary).await {
                tracing::warn!(error = %e, "failed to persist feedback analysis");
            }
        }

        Ok(FeedbackAnalysis {
            original_text: text.to_string(),
            sentiment,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AnalysisError;
    use async_trait::async_trait;
    use warehouse::SessionProvider;
    use warehouse::testutils::{MockReply, MockWarehouse, count_reply, mock_config, token_file};

    struct CannedClassifier {
        raw: String,
    }

    #[async_trait]
    impl Classifier for CannedClassifier {
        async fn classify(&self, _text: &str) -> Result<String> {
            Ok(self.raw.clone())
        }
    }

    fn analyzer_with_output(raw: &str) -> FeedbackAnalyzer {
        FeedbackAnalyzer::new(
            Arc::new(CannedClassifier {
                raw: raw.to_string(),
            }),
            None,
        )
    }

    #[test]
    fn fallback_finds_positive_words() {
        assert_eq!(
            fallback_sentiment("this product is great and I love it"),
            Sentiment::Positive
        );
    }

    #[test]
    fn fallback_finds_negative_words() {
        assert_eq!(fallback_sentiment("terrible, I hate this"), Sentiment::Negative);
    }

    #[test]
    fn fallback_defaults_to_neutral() {
        assert_eq!(fallback_sentiment("it arrived on Tuesday"), Sentiment::Neutral);
    }

    #[tokio::test]
    async fn structured_output_passes_through() {
        let analyzer = analyzer_with_output(r#"{"sentiment":"negative","summary":"X"}"#);
        let analysis = analyzer.analyze("some feedback").await.unwrap();

        assert_eq!(analysis.sentiment, Sentiment::Negative);
        assert_eq!(analysis.summary, "X");
        assert_eq!(analysis.original_text, "some feedback");
    }

    #[tokio::test]
    async fn extra_structured_fields_are_ignored() {
        let analyzer = analyzer_with_output(
            r#"{"sentiment":"positive","summary":"Y","suggestions":["a","b"]}"#,
        );
        let analysis = analyzer.analyze("text").await.unwrap();
        assert_eq!(analysis.sentiment, Sentiment::Positive);
        assert_eq!(analysis.summary, "Y");
    }

    #[tokio::test]
    async fn unstructured_output_takes_the_fallback_path() {
        let analyzer = analyzer_with_output("this product is great and I love it");
        let analysis = analyzer.analyze("text").await.unwrap();

        assert_eq!(analysis.sentiment, Sentiment::Positive);
        // The raw text becomes the summary when no structure is present.
        assert_eq!(analysis.summary, "this product is great and I love it");
    }

    #[tokio::test]
    async fn unknown_sentiment_label_falls_back_too() {
        let analyzer = analyzer_with_output(r#"{"sentiment":"elated","summary":"Z"}"#);
        let analysis = analyzer.analyze("text").await.unwrap();
        // "elated" is not in the vocabulary and the raw text has no
        // lexicon words either.
        assert_eq!(analysis.sentiment, Sentiment::Neutral);
    }

    #[tokio::test]
    async fn persistence_failure_does_not_change_the_analysis() {
        let token = token_file("t");
        let mock = MockWarehouse::start(|_| MockReply::Error {
            status: 422,
            message: "table dropped".to_string(),
        })
        .await;
        let provider = Arc::new(SessionProvider::new(mock_config(&mock, &token)));
        let store = Arc::new(FeedbackStore::new(provider, "FEEDBACK_HISTORY".to_string()));

        let analyzer = FeedbackAnalyzer::new(
            Arc::new(CannedClassifier {
                raw: r#"{"sentiment":"positive","summary":"ok"}"#.to_string(),
            }),
            Some(store),
        );

        let analysis = analyzer.analyze("nice").await.unwrap();
        assert_eq!(analysis.sentiment, Sentiment::Positive);
        assert_eq!(analysis.summary, "ok");

        // The write was attempted and rejected.
        assert_eq!(mock.received().len(), 1);
    }

    #[tokio::test]
    async fn successful_persistence_records_one_insert() {
        let token = token_file("t");
        let mock = MockWarehouse::start(|_| count_reply(1)).await;
        let provider = Arc::new(SessionProvider::new(mock_config(&mock, &token)));
        let store = Arc::new(FeedbackStore::new(provider, "FEEDBACK_HISTORY".to_string()));

        let analyzer = FeedbackAnalyzer::new(
            Arc::new(CannedClassifier {
                raw: r#"{"sentiment":"negative","summary":"broken"}"#.to_string(),
            }),
            Some(store),
        );

        analyzer.analyze("it broke").await.unwrap();

        let statements = mock.received();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with("INSERT INTO FEEDBACK_HISTORY"));
        assert!(statements[0].contains("'negative'"));
    }

    #[tokio::test]
    async fn classifier_errors_surface() {
        struct FailingClassifier;

        #[async_trait]
        impl Classifier for FailingClassifier {
            async fn classify(&self, _text: &str) -> Result<String> {
                Err(AnalysisError::EmptyResponse)
            }
        }

        let analyzer = FeedbackAnalyzer::new(Arc::new(FailingClassifier), None);
        assert!(matches!(
            analyzer.analyze("text").await,
            Err(AnalysisError::EmptyResponse)
        ));
    }
}
