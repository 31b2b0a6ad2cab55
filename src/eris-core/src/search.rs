//! Evidence search.
//!
//! Documents are split into overlapping chunks at ingestion. Queries go to a
//! hosted vector store when one is configured; otherwise, or when it fails,
//! keyword candidates from the store are ranked with trigram similarity in
//! the manner of Postgres `pg_trgm`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::SearchConfig;
use crate::error::DebateError;
use crate::retry::RetryPolicy;
use crate::session::NewDocument;
use crate::store::{ChunkCandidate, DebateStore};

/// Added to the trigram score, scaled by the share of query terms that
/// appear as whole words in the chunk.
const EXACT_TERM_BONUS: f32 = 0.5;

const MAX_RESULTS: usize = 50;
const SNIPPET_CHARS: usize = 300;

// ─── Results ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchBackend {
    Vector,
    Keyword,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub source: Option<String>,
    /// Set for hits from the local document store.
    pub document_id: Option<Uuid>,
    pub ordinal: Option<usize>,
    pub snippet: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub backend: SearchBackend,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Error)]
pub enum SearchError<E> {
    #[error(transparent)]
    Debate(#[from] DebateError),

    #[error("store error: {0}")]
    Store(E),
}

// ─── Chunking ────────────────────────────────────────────────────────────────

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a paragraph after `.`, `!` or `?` followed by whitespace.
fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = paragraph.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') && chars.peek().is_some_and(|c| c.is_whitespace()) {
            sentences.push(current.trim().to_string());
            current.clear();
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current.trim().to_string());
    }
    sentences
}

/// Pack words into pieces of at most `max_chars`; a single word longer than
/// that is cut.
fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while char_len(&word) > max_chars {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(max_chars).collect();
            word = word.chars().skip(max_chars).collect();
            pieces.push(head);
        }
        if word.is_empty() {
            continue;
        }
        let needed = if current.is_empty() { 0 } else { 1 } + char_len(&word);
        if char_len(&current) + needed > max_chars {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// The last `overlap` characters of a chunk, starting on a word boundary.
fn overlap_tail(chunk: &str, overlap: usize) -> String {
    let total = char_len(chunk);
    if overlap == 0 || total <= overlap {
        return String::new();
    }
    let tail: String = chunk.chars().skip(total - overlap).collect();
    match tail.find(char::is_whitespace) {
        Some(i) => tail[i..].trim_start().to_string(),
        None => String::new(),
    }
}

/// Split text into chunks of at most `max_chars` characters, preferring
/// paragraph then sentence boundaries. Each chunk after the first starts
/// with up to `overlap` characters from the end of the previous one.
pub fn chunk_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let overlap = overlap.min(max_chars / 2);

    let mut pieces = Vec::new();
    let normalized = text.replace("\r\n", "\n");
    for paragraph in normalized.split("\n\n") {
        let paragraph = normalize_whitespace(paragraph);
        if paragraph.is_empty() {
            continue;
        }
        if char_len(&paragraph) <= max_chars {
            pieces.push(paragraph);
            continue;
        }
        for sentence in split_sentences(&paragraph) {
            if char_len(&sentence) <= max_chars {
                pieces.push(sentence);
            } else {
                pieces.extend(hard_split(&sentence, max_chars));
            }
        }
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for piece in pieces {
        let separator = usize::from(!current.is_empty());
        if char_len(&current) + separator + char_len(&piece) <= max_chars {
            if separator == 1 {
                current.push(' ');
            }
            current.push_str(&piece);
            continue;
        }

        let tail = overlap_tail(&current, overlap);
        chunks.push(std::mem::take(&mut current));
        if !tail.is_empty() && char_len(&tail) + 1 + char_len(&piece) <= max_chars {
            current = tail;
            current.push(' ');
        }
        current.push_str(&piece);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

// ─── Trigram scoring ─────────────────────────────────────────────────────────

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Distinct lower-cased words of at least two characters.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    words(query)
        .filter(|w| w.chars().count() >= 2)
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Trigram set of `text`: each word is padded with two leading spaces and
/// one trailing space.
pub fn trigrams(text: &str) -> HashSet<String> {
    let mut set = HashSet::new();
    for word in words(text) {
        let padded: Vec<char> = format!("  {word} ").chars().collect();
        for window in padded.windows(3) {
            set.insert(window.iter().collect());
        }
    }
    set
}

/// Jaccard index of the trigram sets of `a` and `b`.
pub fn similarity(a: &str, b: &str) -> f32 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count();
    shared as f32 / (ta.len() + tb.len() - shared) as f32
}

/// Share of the query's trigrams that occur in `text`.
pub fn word_similarity(query: &str, text: &str) -> f32 {
    let tq = trigrams(query);
    if tq.is_empty() {
        return 0.0;
    }
    let tt = trigrams(text);
    tq.iter().filter(|t| tt.contains(*t)).count() as f32 / tq.len() as f32
}

fn snippet(content: &str) -> String {
    if char_len(content) <= SNIPPET_CHARS {
        return content.to_string();
    }
    let mut cut: String = content.chars().take(SNIPPET_CHARS).collect();
    cut.push('…');
    cut
}

/// Score candidates against the query, drop non-matches and return the
/// best `limit`, ordered by score, then title, then chunk ordinal.
pub fn rank_chunks(query: &str, candidates: Vec<ChunkCandidate>, limit: usize) -> Vec<SearchHit> {
    let terms = query_terms(query);

    let mut scored: Vec<(f32, ChunkCandidate)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let mut score = word_similarity(query, &candidate.content);
            if !terms.is_empty() {
                let chunk_words: HashSet<String> = words(&candidate.content).collect();
                let matched = terms.iter().filter(|t| chunk_words.contains(*t)).count();
                score += EXACT_TERM_BONUS * matched as f32 / terms.len() as f32;
            }
            (score > 0.0).then_some((score, candidate))
        })
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| {
        sb.total_cmp(sa)
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.ordinal.cmp(&b.ordinal))
    });

    scored
        .into_iter()
        .take(limit)
        .map(|(score, c)| SearchHit {
            snippet: snippet(&c.content),
            title: c.title,
            source: c.source,
            document_id: Some(c.document_id),
            ordinal: Some(c.ordinal),
            score,
        })
        .collect()
}

// ─── Vector store ────────────────────────────────────────────────────────────

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, DebateError>;
}

/// OpenAI hosted vector store search.
#[derive(Clone)]
pub struct OpenAiVectorStore {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    vector_store_id: String,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct VectorSearchBody<'a> {
    query: &'a str,
    max_num_results: usize,
}

#[derive(Deserialize)]
struct VectorSearchPage {
    data: Vec<VectorSearchResult>,
}

#[derive(Deserialize)]
struct VectorSearchResult {
    file_id: String,
    filename: String,
    score: f32,
    #[serde(default)]
    content: Vec<VectorSearchContent>,
}

#[derive(Deserialize)]
struct VectorSearchContent {
    #[serde(default)]
    text: String,
}

impl OpenAiVectorStore {
    pub fn new(
        api_base: &str,
        api_key: impl Into<String>,
        vector_store_id: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, DebateError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DebateError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            vector_store_id: vector_store_id.into(),
            retry,
        })
    }

    async fn search_once(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, DebateError> {
        let response = self
            .http
            .post(format!(
                "{}/vector_stores/{}/search",
                self.api_base, self.vector_store_id
            ))
            .bearer_auth(&self.api_key)
            .json(&VectorSearchBody {
                query,
                max_num_results: limit,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DebateError::Upstream {
                service: "OpenAI vector store",
                status: status.as_u16(),
                message,
            });
        }

        let page: VectorSearchPage = response.json().await?;
        Ok(page
            .data
            .into_iter()
            .map(|result| {
                let text = result
                    .content
                    .iter()
                    .map(|c| c.text.trim())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                SearchHit {
                    title: result.filename,
                    source: Some(result.file_id),
                    document_id: None,
                    ordinal: None,
                    snippet: snippet(&text),
                    score: result.score,
                }
            })
            .collect())
    }
}

#[async_trait]
impl VectorStore for OpenAiVectorStore {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, DebateError> {
        self.retry
            .run("vector store search", || self.search_once(query, limit))
            .await
    }
}

// ─── Service ─────────────────────────────────────────────────────────────────

/// Search entry point used by the server.
#[derive(Clone)]
pub struct SearchService {
    config: SearchConfig,
    vector: Option<Arc<dyn VectorStore>>,
}

impl SearchService {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            vector: None,
        }
    }

    pub fn with_vector_store(mut self, vector: Arc<dyn VectorStore>) -> Self {
        self.vector = Some(vector);
        self
    }

    /// Validate and chunk a document for storage.
    pub fn prepare_document(
        &self,
        owner_id: Uuid,
        title: &str,
        source: Option<String>,
        shared: bool,
        text: &str,
    ) -> Result<NewDocument, DebateError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(DebateError::Validation("document title must not be empty".into()));
        }
        let chunks = chunk_text(text, self.config.chunk_chars, self.config.chunk_overlap);
        if chunks.is_empty() {
            return Err(DebateError::Validation("document text must not be empty".into()));
        }
        Ok(NewDocument {
            owner_id,
            title: title.to_string(),
            source: source.filter(|s| !s.trim().is_empty()),
            shared,
            chunks,
        })
    }

    pub async fn search<S: DebateStore>(
        &self,
        store: &S,
        user_id: Uuid,
        query: &str,
        limit: Option<usize>,
    ) -> Result<SearchResults, SearchError<S::Error>> {
        let query = query.trim();
        if query.chars().count() < 2 {
            return Err(DebateError::Validation(
                "search query must be at least 2 characters".into(),
            )
            .into());
        }
        let limit = limit
            .unwrap_or(self.config.default_limit)
            .clamp(1, MAX_RESULTS);

        if let Some(vector) = &self.vector {
            match vector.search(query, limit).await {
                Ok(hits) => {
                    return Ok(SearchResults {
                        query: query.to_string(),
                        backend: SearchBackend::Vector,
                        hits,
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "vector store search failed, using keyword search");
                }
            }
        }

        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(SearchResults {
                query: query.to_string(),
                backend: SearchBackend::Keyword,
                hits: Vec::new(),
            });
        }

        let candidates = store
            .keyword_candidates(user_id, terms, self.config.candidate_limit)
            .await
            .map_err(SearchError::Store)?;

        Ok(SearchResults {
            query: query.to_string(),
            backend: SearchBackend::Keyword,
            hits: rank_chunks(query, candidates, limit),
        })
    }
}
