//! PubMed acquisition for medrag.
//!
//! This crate provides:
//! - Query rewriting through any [`TextGenerator`](medrag_rag::TextGenerator)
//! - An NCBI E-utilities client for search (`esearch`) and fetch (`efetch`)
//! - A [`Collector`] that turns questions into article sets, skipping
//!   articles that fail to fetch
//!
//! Its output is the `{id: {title, abstract}}` interchange format that
//! `medrag-rag` indexes.

mod collector;
mod config;
mod pubmed;
mod rewriter;
mod source;

pub use collector::{Acquisition, Collector, merged_articles, question_articles, split_questions};
pub use config::{DEFAULT_EUTILS_URL, PubMedConfig};
pub use pubmed::{PubMedClient, parse_article_xml, parse_search_response};
pub use rewriter::LlmQueryRewriter;
pub use source::{ArticleFetcher, LiteratureSearch, QueryRewriter, VerbatimRewriter};
