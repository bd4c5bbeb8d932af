use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use medrag_rag::{RetrievalMode, TemplateKind};

#[derive(Parser)]
#[command(name = "medrag")]
#[command(about = "Answer medical questions grounded in PubMed abstracts", version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone)]
pub struct GlobalArgs {
    /// JSON file with retrieval settings (top_k, retrieval_mode, bm25, embedding_batch_size)
    #[arg(long, global = true, env = "MEDRAG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the retrieval strategy
    #[arg(long, global = true, value_enum)]
    pub mode: Option<Mode>,

    /// Override the number of documents retrieved per question
    #[arg(long, global = true)]
    pub top_k: Option<usize>,

    /// Chat model used for answers, query rewriting and judging
    #[arg(long, global = true, env = "MEDRAG_CHAT_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,

    /// OpenAI-compatible API base URL
    #[arg(long, global = true, env = "OPENAI_BASE_URL")]
    pub base_url: Option<String>,

    /// Embed locally with a hashed bag of words instead of the embeddings API
    #[arg(long, global = true)]
    pub offline_embeddings: bool,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Mode {
    Lexical,
    Embedding,
}

impl From<Mode> for RetrievalMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Lexical => RetrievalMode::Lexical,
            Mode::Embedding => RetrievalMode::Embedding,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search PubMed for one question or a question file and save the articles
    Acquire {
        /// The question to search for
        #[arg(conflicts_with = "questions_file", required_unless_present = "questions_file")]
        question: Option<String>,

        /// File of questions separated by '?'
        #[arg(long)]
        questions_file: Option<PathBuf>,

        /// Where to write the merged {id: {title, abstract}} articles
        #[arg(short, long, default_value = "articles.json")]
        output: PathBuf,

        /// Where to write articles keyed by question (question-file mode)
        #[arg(long, default_value = "retrieved_articles.json")]
        per_question_output: PathBuf,

        /// Identifiers requested per search
        #[arg(long, default_value_t = 20)]
        max_results: usize,

        /// Search with the question as written instead of rewriting it
        #[arg(long)]
        no_rewrite: bool,
    },

    /// Index an articles file and answer questions about it
    Ask {
        /// Articles file produced by `acquire`
        #[arg(short, long, default_value = "articles.json")]
        articles: PathBuf,

        /// Answer format: open or forced-choice (yes/no/maybe)
        #[arg(short, long, default_value = "open")]
        format: TemplateKind,

        /// Score each answer for context relevance and faithfulness
        #[arg(long)]
        evaluate: bool,

        /// Answer this question and exit instead of starting a session
        question: Option<String>,
    },

    /// Evaluate forced-choice accuracy over a labeled PubMedQA-style dataset
    Eval {
        /// Labeled dataset {id: {QUESTION, final_decision, CONTEXTS, ...}}
        dataset: PathBuf,

        /// Index this articles file instead of the dataset's own contexts
        #[arg(short, long)]
        articles: Option<PathBuf>,

        /// Evaluate only the first N questions
        #[arg(short, long)]
        limit: Option<usize>,

        /// JSON-lines log of every evaluated question
        #[arg(long, default_value = "last_test.jsonl")]
        log: PathBuf,
    },

    /// Answer and score each question against its own acquired articles
    Score {
        /// Articles by question, as written by `acquire --questions-file`
        #[arg(short, long, default_value = "retrieved_articles.json")]
        articles: PathBuf,

        /// Answer format: open or forced-choice (yes/no/maybe)
        #[arg(short, long, default_value = "forced-choice")]
        format: TemplateKind,
    },

    /// Acquire articles for a question, then answer it and follow-ups
    Chat {
        /// Opening question; prompted for when absent
        question: Option<String>,

        /// Answer format: open or forced-choice (yes/no/maybe)
        #[arg(short, long, default_value = "open")]
        format: TemplateKind,

        /// Identifiers requested per search
        #[arg(long, default_value_t = 20)]
        max_results: usize,
    },
}
