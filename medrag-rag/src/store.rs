//! In-memory document store holding one replaceable generation.
//!
//! A [`Generation`] is an immutable snapshot of the document set plus
//! everything derived from it (lexical statistics, cached embeddings).
//! [`DocumentStore`] publishes generations by swapping an `Arc` under a
//! `tokio::sync::RwLock`, so a reader holding a snapshot never observes a
//! mixture of two corpora.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::document::Document;
use crate::error::{RagError, Result};
use crate::lexical::Bm25Index;

/// One immutable snapshot of the indexed collection.
#[derive(Debug)]
pub struct Generation {
    id: u64,
    documents: Vec<Document>,
    lexical: Bm25Index,
    embeddings: Option<Vec<Vec<f32>>>,
}

impl Generation {
    /// Build a generation from raw documents.
    ///
    /// Duplicate ids are tolerated: the last write wins, keeping the
    /// position of the id's first occurrence.
    pub fn new(id: u64, documents: Vec<Document>) -> Self {
        let incoming = documents.len();
        let mut by_id: IndexMap<String, Document> = IndexMap::with_capacity(incoming);
        for document in documents {
            by_id.insert(document.id.clone(), document);
        }
        let documents: Vec<Document> = by_id.into_values().collect();
        if documents.len() < incoming {
            warn!(
                generation = id,
                duplicates = incoming - documents.len(),
                "duplicate document ids replaced (last write wins)"
            );
        }
        let lexical = Bm25Index::build(&documents);
        Self { id, documents, lexical, embeddings: None }
    }

    /// Attach one embedding per document, in document order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Pipeline`] if the count does not match the
    /// document count or the vectors disagree on dimensionality.
    pub fn with_embeddings(mut self, embeddings: Vec<Vec<f32>>) -> Result<Self> {
        if embeddings.len() != self.documents.len() {
            return Err(RagError::Pipeline(format!(
                "expected {} embeddings, got {}",
                self.documents.len(),
                embeddings.len()
            )));
        }
        if let Some(first) = embeddings.first() {
            let dims = first.len();
            if dims == 0 || embeddings.iter().any(|e| e.len() != dims) {
                return Err(RagError::Pipeline(
                    "embeddings must share one non-zero dimensionality".to_string(),
                ));
            }
        }
        self.embeddings = Some(embeddings);
        Ok(self)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Documents in insertion order.
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn lexical(&self) -> &Bm25Index {
        &self.lexical
    }

    /// Cached document embeddings, present once an embedding retriever indexed this generation.
    pub fn embeddings(&self) -> Option<&[Vec<f32>]> {
        self.embeddings.as_deref()
    }
}

/// Holds the currently published [`Generation`], if any.
#[derive(Debug, Default)]
pub struct DocumentStore {
    current: RwLock<Option<Arc<Generation>>>,
    next_id: AtomicU64,
}

impl DocumentStore {
    /// Create a new empty store with no published generation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an unpublished generation with a fresh id.
    pub fn prepare(&self, documents: Vec<Document>) -> Generation {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Generation::new(id, documents)
    }

    /// Replace the published generation wholesale.
    pub async fn publish(&self, generation: Generation) -> Arc<Generation> {
        let generation = Arc::new(generation);
        let mut current = self.current.write().await;
        *current = Some(Arc::clone(&generation));
        info!(generation = generation.id(), document_count = generation.len(), "published generation");
        generation
    }

    /// Build and publish a generation in one step.
    pub async fn write(&self, documents: Vec<Document>) -> Arc<Generation> {
        let generation = self.prepare(documents);
        self.publish(generation).await
    }

    /// The published generation, or `None` before the first write.
    pub async fn snapshot(&self) -> Option<Arc<Generation>> {
        self.current.read().await.clone()
    }

    /// All documents of the published generation (empty before the first write).
    pub async fn all(&self) -> Vec<Document> {
        self.snapshot().await.map(|g| g.documents().to_vec()).unwrap_or_default()
    }
}
