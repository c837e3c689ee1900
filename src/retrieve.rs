//! Retrieval and prompt assembly.
//!
//! Embeds a free-text question, pulls the nearest chunks from the vector
//! index, and assembles a bounded context block plus the question into a
//! single prompt for the language model (which is outside this system).

use tracing::debug;

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::models::Chunk;
use crate::store::VectorStore;

/// Marker inserted when the index returns nothing for a question.
pub const NO_CONTEXT_MARKER: &str = "[no context found]";

/// One retrieved chunk with its relevance score.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f64,
}

/// The retrieval result: ranked chunks and the assembled prompt.
#[derive(Debug, Clone)]
pub struct AnswerContext {
    pub chunks: Vec<RetrievedChunk>,
    pub assembled_prompt: String,
}

/// Retrieve the `k` nearest chunks for `question` and assemble the prompt.
///
/// Chunks are ordered by descending relevance score; ties break on
/// ascending chunk id so results are deterministic. Chunks that would
/// overflow `max_context_chars` are dropped whole from the tail, never
/// truncated mid-chunk.
pub async fn answer_context(
    question: &str,
    retrieval: &RetrievalConfig,
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
) -> Result<AnswerContext> {
    let vectors = embedder.embed(&[question.to_string()]).await?;
    let query_vector = vectors
        .into_iter()
        .next()
        .ok_or_else(|| Error::EmbeddingProvider("empty embedding response".into()))?;

    let hits = store.query(&query_vector, retrieval.top_k).await?;
    debug!(hits = hits.len(), k = retrieval.top_k, "index query complete");

    let mut chunks: Vec<RetrievedChunk> = hits
        .into_iter()
        .map(|hit| RetrievedChunk {
            chunk: Chunk {
                chunk_id: hit.entry.chunk_id,
                text: hit.entry.text,
                content_hash: hit.entry.content_hash,
                metadata: hit.entry.metadata,
            },
            score: hit.score,
        })
        .collect();
    chunks.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
    });

    let assembled_prompt = assemble_prompt(question, &chunks, retrieval.max_context_chars);
    Ok(AnswerContext {
        chunks,
        assembled_prompt,
    })
}

fn assemble_prompt(question: &str, chunks: &[RetrievedChunk], max_context_chars: usize) -> String {
    let mut context = String::new();
    let mut used = 0usize;

    for (i, retrieved) in chunks.iter().enumerate() {
        let block = context_block(i, retrieved);
        let block_len = block.chars().count();
        if used + block_len > max_context_chars {
            break;
        }
        if !context.is_empty() {
            context.push_str("\n\n");
        }
        context.push_str(&block);
        used += block_len;
    }

    if context.is_empty() {
        context.push_str(NO_CONTEXT_MARKER);
    }

    format!(
        "You are an AI assistant for a company. Your task is to answer questions \
         based on the provided company knowledge base. Use only the information \
         from the documents provided below to answer the question. If the answer \
         cannot be found in the documents, state that you don't have enough \
         information. Do not make up any information.\n\n\
         Company Knowledge Base:\n{}\n\n\
         User Query: {}\n\n\
         Answer:",
        context, question
    )
}

fn context_block(index: usize, retrieved: &RetrievedChunk) -> String {
    let metadata = &retrieved.chunk.metadata;
    let get = |key: &str| metadata.get(key).map(String::as_str).unwrap_or("unknown");
    format!(
        "--- Document {} (Source: {}, Title: {}, URL: {}) ---\n{}",
        index + 1,
        get("source"),
        get("title"),
        get("url"),
        retrieved.chunk.text
    )
}
