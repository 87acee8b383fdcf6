//! File-search retrieval over Azure OpenAI vector stores and assistants
//!
//! A vector store holds uploaded files; questions are answered by an
//! assistant with the `file_search` tool scoped to one store. All calls go
//! through the REST surface, polling the long-running steps (file batches,
//! runs) on a fixed interval.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::chat::AzureOpenAiConfig;
use crate::error::AdapterError;
use crate::http::{build_client, ensure_success, read_json, PollPolicy};
use crate::Result;

const SERVICE: &str = "azure-openai-assistants";

/// Vector store identifier issued by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreId(pub String);

impl std::fmt::Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Vector-store backed question answering.
#[async_trait]
pub trait FileSearch: Send + Sync {
    async fn create_store(&self, name: &str) -> Result<StoreId>;

    /// Look a store up by its display name.
    async fn find_store(&self, name: &str) -> Result<Option<StoreId>>;

    /// Upload local files and wait until they are indexed.
    async fn upload_files(&self, store: &StoreId, paths: &[PathBuf]) -> Result<()>;

    /// Answer a question from the store's files.
    async fn ask(&self, store: &StoreId, question: &str) -> Result<String>;

    async fn delete_store(&self, store: &StoreId) -> Result<()>;

    async fn get_or_create_store(&self, name: &str) -> Result<StoreId> {
        match self.find_store(name).await? {
            Some(id) => Ok(id),
            None => self.create_store(name).await,
        }
    }
}

/// The assistant used to answer questions. Looked up by name, created on
/// first use when missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantSpec {
    pub name: String,
    pub description: String,
    pub instructions: String,
    /// Model deployment the assistant runs on
    pub model: String,
}

impl AssistantSpec {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            instructions: instructions.into(),
            model: model.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Deserialize)]
#[serde(bound = "T: Deserialize<'de>")]
struct ListResponse<T> {
    #[serde(default)]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct Named {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct FileBatch {
    id: String,
    status: String,
    #[serde(default)]
    file_counts: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct Run {
    id: String,
    thread_id: String,
    status: String,
    #[serde(default)]
    last_error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<MessageText>,
}

#[derive(Deserialize)]
struct MessageText {
    value: String,
}

fn find_named(list: ListResponse<Named>, name: &str) -> Option<String> {
    list.data
        .into_iter()
        .find(|item| item.name.as_deref() == Some(name))
        .map(|item| item.id)
}

/// Text of the newest assistant message, joining multiple text parts.
fn latest_assistant_text(list: ListResponse<ThreadMessage>) -> Option<String> {
    list.data
        .into_iter()
        .find(|m| m.role == "assistant")
        .map(|m| {
            m.content
                .into_iter()
                .filter(|c| c.kind == "text")
                .filter_map(|c| c.text.map(|t| t.value))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|text| !text.is_empty())
}

/// Outcome of one poll of a long-running step.
#[derive(Debug, PartialEq)]
enum Progress {
    Pending,
    Finished,
}

fn batch_progress(batch: &FileBatch) -> Result<Progress> {
    match batch.status.as_str() {
        "in_progress" => Ok(Progress::Pending),
        "completed" => Ok(Progress::Finished),
        other => Err(AdapterError::OperationFailed {
            service: SERVICE,
            status: other.to_string(),
            detail: batch
                .file_counts
                .as_ref()
                .map(|c| c.to_string())
                .unwrap_or_default(),
        }),
    }
}

fn run_progress(run: &Run) -> Result<Progress> {
    match run.status.as_str() {
        "queued" | "in_progress" | "cancelling" => Ok(Progress::Pending),
        "completed" => Ok(Progress::Finished),
        other => Err(AdapterError::OperationFailed {
            service: SERVICE,
            status: other.to_string(),
            detail: run
                .last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default(),
        }),
    }
}

// ---------------------------------------------------------------------------
// AzureFileSearch
// ---------------------------------------------------------------------------

/// Azure OpenAI vector stores + assistants client.
pub struct AzureFileSearch {
    config: AzureOpenAiConfig,
    assistant: AssistantSpec,
    assistant_id: OnceCell<String>,
    poll: PollPolicy,
    http_client: reqwest::Client,
}

impl AzureFileSearch {
    pub fn new(config: AzureOpenAiConfig, assistant: AssistantSpec) -> Result<Self> {
        let http_client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            config,
            assistant,
            assistant_id: OnceCell::new(),
            poll: PollPolicy::default(),
            http_client,
        })
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .get(self.config.url(path))
            .header("api-key", &self.config.api_key)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .post(self.config.url(path))
            .header("api-key", &self.config.api_key)
    }

    async fn assistant_id(&self) -> Result<&str> {
        let id = self
            .assistant_id
            .get_or_try_init(|| async {
                let response = self.get("assistants").query(&[("limit", "100")]).send().await?;
                let list: ListResponse<Named> = read_json(SERVICE, response).await?;
                if let Some(id) = find_named(list, &self.assistant.name) {
                    debug!(assistant = %self.assistant.name, "reusing existing assistant");
                    return Ok(id);
                }

                let body = json!({
                    "name": self.assistant.name,
                    "description": self.assistant.description,
                    "instructions": self.assistant.instructions,
                    "model": self.assistant.model,
                    "tools": [{"type": "file_search"}],
                });
                let response = self.post("assistants").json(&body).send().await?;
                let created: Created = read_json(SERVICE, response).await?;
                info!(assistant = %self.assistant.name, "created assistant");
                Ok::<_, AdapterError>(created.id)
            })
            .await?;
        Ok(id.as_str())
    }

    async fn upload_file(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let form = Form::new()
            .text("purpose", "assistants")
            .part("file", Part::bytes(bytes).file_name(file_name));
        let response = self.post("files").multipart(form).send().await?;
        let created: Created = read_json(SERVICE, response).await?;
        Ok(created.id)
    }

    async fn wait_for_batch(&self, store: &StoreId, batch: FileBatch) -> Result<()> {
        let mut batch = batch;
        for _ in 0..self.poll.max_polls {
            if batch_progress(&batch)? == Progress::Finished {
                return Ok(());
            }
            tokio::time::sleep(self.poll.interval).await;
            let response = self
                .get(&format!("vector_stores/{}/file_batches/{}", store.0, batch.id))
                .send()
                .await?;
            batch = read_json(SERVICE, response).await?;
        }
        Err(AdapterError::PollExhausted {
            service: SERVICE,
            polls: self.poll.max_polls,
        })
    }

    async fn wait_for_run(&self, run: Run) -> Result<Run> {
        let mut run = run;
        for _ in 0..self.poll.max_polls {
            if run_progress(&run)? == Progress::Finished {
                return Ok(run);
            }
            tokio::time::sleep(self.poll.interval).await;
            let response = self
                .get(&format!("threads/{}/runs/{}", run.thread_id, run.id))
                .send()
                .await?;
            run = read_json(SERVICE, response).await?;
        }
        Err(AdapterError::PollExhausted {
            service: SERVICE,
            polls: self.poll.max_polls,
        })
    }
}

#[async_trait]
impl FileSearch for AzureFileSearch {
    #[instrument(skip(self))]
    async fn create_store(&self, name: &str) -> Result<StoreId> {
        let response = self
            .post("vector_stores")
            .json(&json!({ "name": name }))
            .send()
            .await?;
        let created: Created = read_json(SERVICE, response).await?;
        info!(store = %created.id, "created vector store");
        Ok(StoreId(created.id))
    }

    #[instrument(skip(self))]
    async fn find_store(&self, name: &str) -> Result<Option<StoreId>> {
        let response = self
            .get("vector_stores")
            .query(&[("limit", "100")])
            .send()
            .await?;
        let list: ListResponse<Named> = read_json(SERVICE, response).await?;
        Ok(find_named(list, name).map(StoreId))
    }

    #[instrument(skip(self, paths), fields(store = %store, files = paths.len()))]
    async fn upload_files(&self, store: &StoreId, paths: &[PathBuf]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let mut file_ids = Vec::with_capacity(paths.len());
        for path in paths {
            file_ids.push(self.upload_file(path).await?);
        }

        let response = self
            .post(&format!("vector_stores/{}/file_batches", store.0))
            .json(&json!({ "file_ids": file_ids }))
            .send()
            .await?;
        let batch: FileBatch = read_json(SERVICE, response).await?;
        self.wait_for_batch(store, batch).await?;

        info!("file batch indexed");
        Ok(())
    }

    #[instrument(skip(self, question), fields(store = %store))]
    async fn ask(&self, store: &StoreId, question: &str) -> Result<String> {
        let assistant_id = self.assistant_id().await?.to_string();

        let body = json!({
            "assistant_id": assistant_id,
            "thread": {
                "messages": [{ "role": "user", "content": question }],
                "tool_resources": {
                    "file_search": { "vector_store_ids": [store.0] }
                }
            }
        });
        let response = self.post("threads/runs").json(&body).send().await?;
        let run: Run = read_json(SERVICE, response).await?;
        let run = self.wait_for_run(run).await?;

        let response = self
            .get(&format!("threads/{}/messages", run.thread_id))
            .query(&[("order", "desc"), ("limit", "10")])
            .send()
            .await?;
        let messages: ListResponse<ThreadMessage> = read_json(SERVICE, response).await?;
        latest_assistant_text(messages).ok_or(AdapterError::EmptyResponse(SERVICE))
    }

    #[instrument(skip(self))]
    async fn delete_store(&self, store: &StoreId) -> Result<()> {
        let response = self
            .http_client
            .delete(self.config.url(&format!("vector_stores/{}", store.0)))
            .header("api-key", &self.config.api_key)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            warn!("vector store already gone");
            return Ok(());
        }
        ensure_success(SERVICE, response).await?;
        info!("deleted vector store");
        Ok(())
    }
}
