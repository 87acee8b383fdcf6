//! In-memory fakes for the service traits (testing only)
//!
//! Every fake records what it was asked so tests can assert on call order
//! and concurrency without a network.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::blob::BlobStore;
use crate::chat::{ChatMessage, GenerationAdapter};
use crate::documents::DocumentParser;
use crate::error::AdapterError;
use crate::fetch::Fetcher;
use crate::retrieval::{FileSearch, StoreId};
use crate::search::WebSearch;
use crate::Result;

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Returns canned replies in order; errors once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedGeneration {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedGeneration {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every conversation passed to `generate`, in call order.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationAdapter for ScriptedGeneration {
    fn provider(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(AdapterError::EmptyResponse("scripted"))
    }
}

/// Computes each reply from the conversation with a closure.
pub struct FnGeneration<F> {
    reply: F,
    calls: AtomicUsize,
}

impl<F> FnGeneration<F>
where
    F: Fn(&[ChatMessage]) -> Result<String> + Send + Sync,
{
    pub fn new(reply: F) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F> GenerationAdapter for FnGeneration<F>
where
    F: Fn(&[ChatMessage]) -> Result<String> + Send + Sync,
{
    fn provider(&self) -> &str {
        "fn"
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.reply)(messages)
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Returns a fixed URL list, optionally failing the first N calls.
#[derive(Debug, Default)]
pub struct StaticSearch {
    urls: Vec<String>,
    failures_left: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl StaticSearch {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            failures_left: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Fail the next `n` searches with an API error.
    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebSearch for StaticSearch {
    async fn search(&self, query: &str, count: u32) -> Result<Vec<String>> {
        self.queries.lock().unwrap().push(query.to_string());
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(AdapterError::Api {
                service: "static-search",
                status: 429,
                body: "rate limited".to_string(),
            });
        }
        Ok(self.urls.iter().take(count as usize).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Serves bodies from a map and tracks peak concurrency.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    bodies: HashMap<String, Vec<u8>>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.bodies.insert(url.into(), body.into());
        self
    }

    /// Hold each fetch open for `delay` so overlapping calls are observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Highest number of fetches that were in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.bodies.get(url).cloned().ok_or_else(|| AdapterError::Api {
            service: "memory-fetch",
            status: 404,
            body: url.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Retrieval
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct FakeStore {
    name: String,
    files: Vec<PathBuf>,
}

/// Vector stores kept in a map. `ask` answers deterministically from the
/// uploaded file names.
#[derive(Debug, Default)]
pub struct MemoryFileSearch {
    stores: Mutex<HashMap<StoreId, FakeStore>>,
    next_id: AtomicUsize,
    deleted: Mutex<Vec<StoreId>>,
    questions: Mutex<Vec<String>>,
    fail_asks: bool,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MemoryFileSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `ask` fails with an API error.
    pub fn failing_asks(mut self) -> Self {
        self.fail_asks = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn deleted(&self) -> Vec<StoreId> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }

    /// Names of the stores that still exist.
    pub fn live_stores(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .stores
            .lock()
            .unwrap()
            .values()
            .map(|s| s.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn files_in(&self, store: &StoreId) -> Vec<PathBuf> {
        self.stores
            .lock()
            .unwrap()
            .get(store)
            .map(|s| s.files.clone())
            .unwrap_or_default()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileSearch for MemoryFileSearch {
    async fn create_store(&self, name: &str) -> Result<StoreId> {
        let id = StoreId(format!("vs_{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        self.stores.lock().unwrap().insert(
            id.clone(),
            FakeStore {
                name: name.to_string(),
                files: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn find_store(&self, name: &str) -> Result<Option<StoreId>> {
        Ok(self
            .stores
            .lock()
            .unwrap()
            .iter()
            .find(|(_, s)| s.name == name)
            .map(|(id, _)| id.clone()))
    }

    async fn upload_files(&self, store: &StoreId, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            if !path.exists() {
                return Err(AdapterError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    path.display().to_string(),
                )));
            }
        }
        let mut stores = self.stores.lock().unwrap();
        let entry = stores
            .get_mut(store)
            .ok_or_else(|| AdapterError::NotFound(store.0.clone()))?;
        entry.files.extend(paths.iter().cloned());
        Ok(())
    }

    async fn ask(&self, store: &StoreId, question: &str) -> Result<String> {
        self.questions.lock().unwrap().push(question.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_asks {
            return Err(AdapterError::Api {
                service: "memory-file-search",
                status: 500,
                body: "run failed".to_string(),
            });
        }

        let files = self.files_in(store);
        let mentioned = files.iter().find_map(|p| {
            let name = p.file_name()?.to_string_lossy().into_owned();
            question.contains(&name).then_some(name)
        });
        Ok(match mentioned {
            Some(name) => format!("Summary of {name}"),
            None => format!("Answer from {} files: {question}", files.len()),
        })
    }

    async fn delete_store(&self, store: &StoreId) -> Result<()> {
        self.stores.lock().unwrap().remove(store);
        self.deleted.lock().unwrap().push(store.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Documents and blobs
// ---------------------------------------------------------------------------

/// Treats the bytes as UTF-8 text and wraps them in a markdown heading.
#[derive(Debug, Default)]
pub struct MemoryDocumentParser {
    parsed: AtomicUsize,
}

impl MemoryDocumentParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parsed_count(&self) -> usize {
        self.parsed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentParser for MemoryDocumentParser {
    async fn to_markdown(&self, bytes: Vec<u8>) -> Result<String> {
        self.parsed.fetch_add(1, Ordering::SeqCst);
        Ok(format!("# Document\n\n{}", String::from_utf8_lossy(&bytes)))
    }
}

/// Blobs kept in a map keyed by URL.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub const BASE_URL: &'static str = "https://memory.blob.core.windows.net/uploads";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.blobs.lock().unwrap().insert(url.into(), bytes.into());
        self
    }

    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.blobs.lock().unwrap().keys().cloned().collect();
        urls.sort();
        urls
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| AdapterError::NotFound(url.to_string()))
    }

    async fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<String> {
        let url = format!("{}/{}", Self::BASE_URL, name.trim_start_matches('/'));
        self.blobs.lock().unwrap().insert(url.clone(), bytes);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_generation_replays_in_order_then_errors() {
        let gen = ScriptedGeneration::new(["first", "second"]);
        let convo = [ChatMessage::user("hi")];
        assert_eq!(gen.generate(&convo).await.unwrap(), "first");
        assert_eq!(gen.generate(&convo).await.unwrap(), "second");
        assert!(gen.generate(&convo).await.is_err());
        assert_eq!(gen.call_count(), 3);
    }

    #[tokio::test]
    async fn static_search_fails_then_recovers() {
        let search = StaticSearch::new(["https://a.example/x.pdf"]).failing_first(2);
        assert!(search.search("q", 10).await.is_err());
        assert!(search.search("q", 10).await.is_err());
        assert_eq!(search.search("q", 10).await.unwrap().len(), 1);
        assert_eq!(search.queries().len(), 3);
    }

    #[tokio::test]
    async fn get_or_create_store_reuses_by_name() {
        let fs = MemoryFileSearch::new();
        let a = fs.get_or_create_store("vector_store_7").await.unwrap();
        let b = fs.get_or_create_store("vector_store_7").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(fs.live_stores(), vec!["vector_store_7"]);
    }

    #[tokio::test]
    async fn ask_summarizes_mentioned_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let fs = MemoryFileSearch::new();
        let store = fs.create_store("data-1").await.unwrap();
        fs.upload_files(&store, &[path]).await.unwrap();

        let answer = fs
            .ask(&store, "Summarize contents of report.pdf in less than 100 words")
            .await
            .unwrap();
        assert_eq!(answer, "Summary of report.pdf");
    }

    #[tokio::test]
    async fn blob_upload_then_download() {
        let blobs = MemoryBlobStore::new();
        let url = blobs.upload("c1/a.txt", b"hello".to_vec()).await.unwrap();
        assert!(crate::blob::is_blob_url(&url));
        assert_eq!(blobs.download(&url).await.unwrap(), b"hello");
    }
}
