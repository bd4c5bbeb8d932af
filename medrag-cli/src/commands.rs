use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use medrag_pubmed::{Acquisition, merged_articles, question_articles, split_questions};
use medrag_rag::{
    ArticleSet, BatchReport, EntryOutcome, EvaluationResult, LabeledDataset, QuestionArticles,
    RagPipeline, TemplateKind, load_question_articles, save_question_articles,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{error, info, warn};

use crate::args::GlobalArgs;
use crate::runtime;

/// Typing this ends an interactive session.
const END_COMMAND: &str = "end";

pub async fn acquire(
    global: &GlobalArgs,
    question: Option<String>,
    questions_file: Option<&Path>,
    output: &Path,
    per_question_output: &Path,
    max_results: usize,
    rewrite: bool,
) -> Result<()> {
    let questions = match (question, questions_file) {
        (Some(question), _) => vec![question],
        (None, Some(path)) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            split_questions(&content)
        }
        (None, None) => bail!("give a question or --questions-file"),
    };
    println!("Found {} question(s) to process", questions.len());

    let collector = runtime::collector(global, max_results, rewrite)?;
    let acquisitions = collector.collect_all(&questions).await;
    for acquisition in &acquisitions {
        print_acquisition(acquisition);
    }

    if questions_file.is_some() {
        save_question_articles(per_question_output, &question_articles(&acquisitions))?;
        println!("Articles by question saved to {}", per_question_output.display());
    }
    let merged = merged_articles(&acquisitions);
    merged.save(output)?;
    println!("{} article(s) saved to {}", merged.len(), output.display());
    Ok(())
}

fn print_acquisition(acquisition: &Acquisition) {
    println!("\nQuestion: {}", acquisition.question);
    match &acquisition.query {
        Some(query) => println!("Searchable Query: {query}"),
        None => println!("Searchable Query: (rewriting failed)"),
    }
    println!("Retrieved {} article(s)", acquisition.articles.len());
    if !acquisition.failed_ids.is_empty() {
        println!("Could not fetch: {}", acquisition.failed_ids.join(", "));
    }
}

pub async fn ask(
    global: &GlobalArgs,
    articles: &Path,
    format: TemplateKind,
    evaluate: bool,
    question: Option<String>,
) -> Result<()> {
    let articles = ArticleSet::load(articles)
        .with_context(|| format!("failed to load articles from {}", articles.display()))?;
    let pipeline = runtime::pipeline(global, evaluate)?;
    pipeline.setup(articles.to_documents()).await?;

    match question {
        Some(question) => respond(&pipeline, &question, format, evaluate).await,
        None => interactive(&pipeline, format, evaluate).await,
    }
}

pub async fn chat(
    global: &GlobalArgs,
    question: Option<String>,
    format: TemplateKind,
    max_results: usize,
) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    let question = match question {
        Some(question) => question,
        None => editor.readline("Please enter your medical question: ")?,
    };
    let question = question.trim().to_string();
    if question.is_empty() {
        bail!("Invalid Input: Please enter a question.");
    }

    println!("Generating medical article dataset from PubMed...");
    let acquisition = runtime::collector(global, max_results, true)?.collect(&question).await;
    print_acquisition(&acquisition);
    if acquisition.articles.is_empty() {
        warn!("no articles acquired, answers will have no supporting documents");
    }

    let pipeline = runtime::pipeline(global, false)?;
    pipeline.setup(acquisition.articles.to_documents()).await?;
    respond(&pipeline, &question, format, false).await?;
    interactive(&pipeline, format, false).await
}

async fn respond(
    pipeline: &RagPipeline,
    question: &str,
    format: TemplateKind,
    evaluate: bool,
) -> Result<()> {
    if evaluate {
        let result = pipeline.evaluate(question, format, None).await?;
        println!("\n{result}\n");
        return Ok(());
    }

    let answer = pipeline.answer(question, format).await?;
    if let Some(verdict) = answer.verdict {
        println!("\nYes/No Answer: {verdict}");
    }
    println!("\nAnswer: {}\n", answer.raw_text);
    println!("Documents Used: {:?}\n", answer.used_document_ids);
    Ok(())
}

async fn interactive(pipeline: &RagPipeline, format: TemplateKind, evaluate: bool) -> Result<()> {
    println!("\nRAG model ready. Ask medical questions or type '{END_COMMAND}' to exit.");
    let mut editor = DefaultEditor::new()?;
    loop {
        let line = match editor.readline("Question: ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let question = line.trim();
        if question.eq_ignore_ascii_case(END_COMMAND) {
            break;
        }
        if question.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(question);

        if let Err(e) = respond(pipeline, question, format, evaluate).await {
            error!(error = %e, "failed to answer");
            println!("Error: {e:#}\n");
        }
    }
    Ok(())
}

pub async fn eval(
    global: &GlobalArgs,
    dataset: &Path,
    articles: Option<&Path>,
    limit: Option<usize>,
    log: &Path,
) -> Result<()> {
    let dataset = LabeledDataset::load(dataset)
        .with_context(|| format!("failed to load dataset from {}", dataset.display()))?;
    let mut questions = dataset.questions()?;
    if let Some(limit) = limit {
        questions.truncate(limit);
    }

    let documents = match articles {
        Some(path) => ArticleSet::load(path)?.to_documents(),
        None => dataset.documents(),
    };

    let pipeline = runtime::pipeline(global, true)?;
    pipeline.setup(documents).await?;

    let report = pipeline.evaluate_batch(&questions, TemplateKind::ForcedChoice).await?;
    print_report(&report);
    write_log(log, &report)?;
    info!(path = %log.display(), "wrote evaluation log");

    println!("Accuracy: {}", report.accuracy_ratio()?);
    Ok(())
}

/// Evaluate every question of a `{question: articles}` file against its own
/// articles, re-running setup per question.
pub async fn score(global: &GlobalArgs, articles: &Path, format: TemplateKind) -> Result<()> {
    let sets = load_question_articles(articles)
        .with_context(|| format!("failed to load question articles from {}", articles.display()))?;
    if sets.is_empty() {
        bail!("{} holds no questions", articles.display());
    }

    let pipeline = runtime::pipeline(global, true)?;
    let outcomes = score_each(&pipeline, sets, format).await;
    for (question, outcome) in &outcomes {
        println!();
        match outcome {
            EntryOutcome::Evaluated(result) => println!("{result}"),
            EntryOutcome::Failed { error } => {
                println!("Question: {question}");
                println!("Failed: {error}");
            }
        }
    }

    let failed = outcomes.iter().filter(|(_, o)| matches!(o, EntryOutcome::Failed { .. })).count();
    println!("\nScored {} of {} question(s)", outcomes.len() - failed, outcomes.len());
    Ok(())
}

/// Per-question outcomes in file order. A failing question is recorded and
/// the rest still run.
async fn score_each(
    pipeline: &RagPipeline,
    sets: QuestionArticles,
    format: TemplateKind,
) -> Vec<(String, EntryOutcome)> {
    let mut outcomes = Vec::with_capacity(sets.len());
    for (question, articles) in sets {
        let outcome = match score_one(pipeline, &question, &articles, format).await {
            Ok(result) => EntryOutcome::Evaluated(result),
            Err(e) => {
                error!(question = %question, error = %e, "failed to score question");
                EntryOutcome::Failed { error: e.to_string() }
            }
        };
        outcomes.push((question, outcome));
    }
    outcomes
}

async fn score_one(
    pipeline: &RagPipeline,
    question: &str,
    articles: &ArticleSet,
    format: TemplateKind,
) -> medrag_rag::Result<EvaluationResult> {
    pipeline.setup(articles.to_documents()).await?;
    pipeline.evaluate(question, format, None).await
}

fn print_report(report: &BatchReport) {
    for entry in &report.entries {
        println!();
        match &entry.outcome {
            EntryOutcome::Evaluated(result) => println!("{result}"),
            EntryOutcome::Failed { error } => {
                println!("Question: {}", entry.question);
                println!("Correct Answer: {}", entry.expected);
                println!("Failed: {error}");
            }
        }
    }
    println!();
}

/// One JSON object per evaluated question, in question order.
fn write_log(path: &Path, report: &BatchReport) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for entry in &report.entries {
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
