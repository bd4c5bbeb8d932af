//! End-to-end tests of the answering pipeline with in-process collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use medrag_rag::{
    ArticleSet, Document, EmbeddingProvider, EntryOutcome, FaithfulnessScorer,
    HashingEmbeddingProvider, LabeledQuestion, MockGenerator, RagConfig, RagError, RagPipeline,
    RelevanceScorer, Result, RetrievalMode, RetryPolicy, TemplateKind, Verdict,
};

struct ConstantRelevance(f32);

#[async_trait]
impl RelevanceScorer for ConstantRelevance {
    fn name(&self) -> &str {
        "constant"
    }

    async fn score(&self, _questions: &[&str], contexts: &[&str]) -> Result<Vec<f32>> {
        Ok(vec![self.0; contexts.len()])
    }
}

struct ConstantFaithfulness(f32);

#[async_trait]
impl FaithfulnessScorer for ConstantFaithfulness {
    fn name(&self) -> &str {
        "constant"
    }

    async fn score(&self, _question: &str, _answer: &str, _contexts: &[&str]) -> Result<f32> {
        Ok(self.0)
    }
}

/// Embeds like [`HashingEmbeddingProvider`] until switched off.
struct SwitchableEmbedder {
    inner: HashingEmbeddingProvider,
    failing: AtomicBool,
}

#[async_trait]
impl EmbeddingProvider for SwitchableEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RagError::Embedding { provider: "switch".into(), message: "down".into() });
        }
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

/// Takes its time over any text mentioning "old".
struct SlowEmbedder(HashingEmbeddingProvider);

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains("old") {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        self.0.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.0.dimensions()
    }
}

fn lexical_config(top_k: usize) -> RagConfig {
    RagConfig::builder().top_k(top_k).retrieval_mode(RetrievalMode::Lexical).build().unwrap()
}

fn corpus_a() -> Vec<Document> {
    vec![
        Document::new("a1", "statin therapy and cardiovascular mortality in older adults"),
        Document::new("a2", "statin adherence after myocardial infarction"),
    ]
}

fn corpus_b() -> Vec<Document> {
    vec![
        Document::new("b1", "vitamin d supplementation and fracture risk"),
        Document::new("b2", "statin use and fracture risk in postmenopausal women"),
    ]
}

#[tokio::test]
async fn answer_before_setup_is_not_ready() {
    let generator = Arc::new(MockGenerator::new("yes"));
    let pipeline =
        RagPipeline::builder().config(lexical_config(3)).generator(generator.clone()).build().unwrap();

    assert!(!pipeline.is_ready().await);
    let err = pipeline.answer("Do statins help?", TemplateKind::Open).await.unwrap_err();
    assert!(matches!(err, RagError::NotReady));
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn single_article_round_trips_into_the_prompt() {
    let articles = ArticleSet::from_json_str(r#"{"42": {"title": "Y", "abstract": "X"}}"#).unwrap();
    let generator = Arc::new(MockGenerator::new("Yes\nBecause of Document 42."));
    let pipeline =
        RagPipeline::builder().config(lexical_config(1)).generator(generator.clone()).build().unwrap();

    pipeline.setup(articles.to_documents()).await.unwrap();
    let answer = pipeline.answer("Is X true?", TemplateKind::ForcedChoice).await.unwrap();

    assert_eq!(answer.used_document_ids, ["42"]);
    assert_eq!(answer.verdict, Some(Verdict::Yes));
    let prompt = &generator.prompts()[0];
    assert!(prompt.contains("Document ID: 42"));
    assert!(prompt.contains("Title: Y"));
    assert!(prompt.contains("Content:\nX"));
}

#[tokio::test]
async fn second_setup_replaces_the_first_without_mixing() {
    let generator = Arc::new(MockGenerator::new("maybe"));
    let pipeline =
        RagPipeline::builder().config(lexical_config(5)).generator(generator.clone()).build().unwrap();

    pipeline.setup(corpus_a()).await.unwrap();
    pipeline.setup(corpus_b()).await.unwrap();
    let answer = pipeline.answer("statin fracture", TemplateKind::Open).await.unwrap();

    assert_eq!(answer.verdict, None);
    assert_eq!(answer.used_document_ids, ["b2", "b1"]);
    let prompt = &generator.prompts()[0];
    assert!(!prompt.contains("a1") && !prompt.contains("a2"));
}

#[tokio::test]
async fn failed_setup_keeps_previous_generation() {
    let embedder = Arc::new(SwitchableEmbedder {
        inner: HashingEmbeddingProvider::new(64),
        failing: AtomicBool::new(false),
    });
    let pipeline = RagPipeline::builder()
        .config(RagConfig::builder().top_k(2).build().unwrap())
        .embedding_provider(embedder.clone())
        .retry_policy(RetryPolicy::none())
        .generator(Arc::new(MockGenerator::new("no")))
        .build()
        .unwrap();

    let first = pipeline.setup(corpus_a()).await.unwrap();
    embedder.failing.store(true, Ordering::SeqCst);
    let err = pipeline.setup(corpus_b()).await.unwrap_err();
    assert!(matches!(err, RagError::Embedding { .. }));

    let current = pipeline.store().snapshot().await.unwrap();
    assert_eq!(current.id(), first.id());
    let ids: Vec<_> = pipeline.store().all().await.into_iter().map(|d| d.id).collect();
    assert_eq!(ids, ["a1", "a2"]);
}

#[tokio::test(start_paused = true)]
async fn overlapping_setups_publish_in_call_order() {
    let pipeline = RagPipeline::builder()
        .config(RagConfig::builder().top_k(5).build().unwrap())
        .embedding_provider(Arc::new(SlowEmbedder(HashingEmbeddingProvider::new(32))))
        .generator(Arc::new(MockGenerator::new("maybe")))
        .build()
        .unwrap();

    let (first, second) = tokio::join!(
        pipeline.setup(vec![Document::new("old", "old corpus")]),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            pipeline.setup(vec![Document::new("new", "new corpus")]).await
        }
    );

    assert!(second.unwrap().id() > first.unwrap().id());
    let ids: Vec<_> = pipeline.store().all().await.into_iter().map(|d| d.id).collect();
    assert_eq!(ids, ["new"]);
}

#[tokio::test]
async fn concurrent_answers_share_one_generation() {
    let generator = Arc::new(MockGenerator::new("yes"));
    let pipeline =
        RagPipeline::builder().config(lexical_config(1)).generator(generator.clone()).build().unwrap();
    pipeline.setup(corpus_b()).await.unwrap();

    let (vitamin, statin) = tokio::join!(
        pipeline.answer("vitamin d supplementation", TemplateKind::ForcedChoice),
        pipeline.answer("statin use in postmenopausal women", TemplateKind::ForcedChoice),
    );

    assert_eq!(vitamin.unwrap().used_document_ids, ["b1"]);
    assert_eq!(statin.unwrap().used_document_ids, ["b2"]);
    assert_eq!(generator.prompts().len(), 2);
}

#[tokio::test]
async fn blank_question_is_invalid_and_never_reaches_the_model() {
    let generator = Arc::new(MockGenerator::new("yes"));
    let pipeline =
        RagPipeline::builder().config(lexical_config(2)).generator(generator.clone()).build().unwrap();
    pipeline.setup(corpus_a()).await.unwrap();

    let err = pipeline.answer("  ", TemplateKind::Open).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidQuery(_)));
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn generation_failure_propagates_without_retry() {
    let generator = Arc::new(MockGenerator::new("yes").with_failure("timeout"));
    let pipeline =
        RagPipeline::builder().config(lexical_config(2)).generator(generator.clone()).build().unwrap();
    pipeline.setup(corpus_a()).await.unwrap();

    let err = pipeline.answer("statin", TemplateKind::Open).await.unwrap_err();
    assert!(matches!(err, RagError::Generation { .. }));
    assert_eq!(generator.prompts().len(), 1);
}

#[tokio::test]
async fn empty_corpus_still_answers_with_no_documents() {
    let generator = Arc::new(MockGenerator::new("maybe"));
    let pipeline =
        RagPipeline::builder().config(lexical_config(3)).generator(generator.clone()).build().unwrap();
    pipeline.setup(Vec::new()).await.unwrap();

    let answer = pipeline.answer("anything?", TemplateKind::ForcedChoice).await.unwrap();
    assert!(answer.used_document_ids.is_empty());
    assert_eq!(answer.verdict, Some(Verdict::Maybe));
    assert!(generator.prompts()[0].contains("(no documents were retrieved)"));
}

#[tokio::test]
async fn evaluate_requires_scorers() {
    let pipeline = RagPipeline::builder()
        .config(lexical_config(2))
        .generator(Arc::new(MockGenerator::new("yes")))
        .build()
        .unwrap();
    pipeline.setup(corpus_a()).await.unwrap();

    let err = pipeline.evaluate("statin", TemplateKind::ForcedChoice, None).await.unwrap_err();
    assert!(matches!(err, RagError::Config(_)));
}

#[tokio::test]
async fn evaluate_fills_in_verdict_and_label() {
    let pipeline = RagPipeline::builder()
        .config(lexical_config(2))
        .generator(Arc::new(MockGenerator::new("No.\nThe abstracts disagree.")))
        .scorers(Arc::new(ConstantRelevance(0.5)), Arc::new(ConstantFaithfulness(1.0)))
        .build()
        .unwrap();
    pipeline.setup(corpus_a()).await.unwrap();

    let result = pipeline
        .evaluate("statin mortality", TemplateKind::ForcedChoice, Some(Verdict::No))
        .await
        .unwrap();
    assert_eq!(result.verdict, Some(Verdict::No));
    assert_eq!(result.correct_answer, Some(Verdict::No));
    assert_eq!(result.is_correct(), Some(true));
    assert_eq!(result.context_relevance.per_document, [0.5, 0.5]);
    assert_eq!(result.faithfulness, 1.0);
}

#[tokio::test]
async fn batch_counts_failures_as_incorrect() {
    let generator = MockGenerator::new("maybe").with_replies(["yes", "no"]).with_failure("quota");
    let pipeline = RagPipeline::builder()
        .config(lexical_config(2))
        .generator(Arc::new(generator))
        .scorers(Arc::new(ConstantRelevance(1.0)), Arc::new(ConstantFaithfulness(1.0)))
        .build()
        .unwrap();
    pipeline.setup(corpus_a()).await.unwrap();

    let labeled = |id: &str, expected| LabeledQuestion {
        id: id.to_string(),
        question: "statin mortality".to_string(),
        expected,
    };
    let questions = [
        labeled("1", Verdict::Yes),
        labeled("2", Verdict::Yes),
        labeled("3", Verdict::Maybe),
        labeled("4", Verdict::Maybe),
    ];

    let report = pipeline.evaluate_batch(&questions, TemplateKind::ForcedChoice).await.unwrap();
    assert_eq!(report.accuracy.total, 4);
    assert_eq!(report.accuracy.correct, 2);
    assert_eq!(report.accuracy_ratio().unwrap(), 0.5);
    assert_eq!(report.failed_count(), 1);
    assert!(matches!(report.entries[2].outcome, EntryOutcome::Failed { .. }));
}

#[tokio::test]
async fn empty_batch_is_an_error() {
    let pipeline = RagPipeline::builder()
        .config(lexical_config(2))
        .generator(Arc::new(MockGenerator::new("yes")))
        .build()
        .unwrap();
    let err = pipeline.evaluate_batch(&[], TemplateKind::ForcedChoice).await.unwrap_err();
    assert!(matches!(err, RagError::EmptyEvaluationSet));
}

#[test]
fn builder_rejects_missing_collaborators() {
    assert!(matches!(RagPipeline::builder().build(), Err(RagError::Config(_))));
    let embedding_without_provider =
        RagPipeline::builder().generator(Arc::new(MockGenerator::new("yes"))).build();
    assert!(matches!(embedding_without_provider, Err(RagError::Config(_))));
}
