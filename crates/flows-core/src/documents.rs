//! Customer document question answering.
//!
//! A fixed pipeline: ingest the customer's files into their retrieval store,
//! answer the question with the last conversation as context, then persist
//! the exchange.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flows_adapters::{is_blob_url, BlobStore, DocumentParser, FileSearch, StoreId};
use flows_state::{ContentDigest, ConversationRecord, ConversationStore, StoredMessage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::domain::{FlowError, Result};
use crate::metrics::METRICS;
use crate::obs::{emit_session_finished, emit_session_started, session_span};
use crate::stream::{spawn_flow, FlowHandle, StreamSink};

pub const USER_PROXY: &str = "UserProxy";
pub const DOCUMENT_ASSISTANT: &str = "DocumentProcessingAssistant";
pub const QNA_ASSISTANT: &str = "CustomerProfileQnAAssistant";
const END_USER: &str = "EndUser";

/// Retrieval store holding one customer's documents.
pub fn customer_store_name(customer_id: &str) -> String {
    format!("vector_store_{customer_id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub customer_id: String,
    pub question: String,
    /// Local paths or blob URLs
    #[serde(default)]
    pub files: Vec<String>,
    /// Continue an existing conversation; a new id is minted when absent
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl DocumentRequest {
    pub fn new(customer_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            question: question.into(),
            files: Vec::new(),
            conversation_id: None,
        }
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files.extend(files.into_iter().map(Into::into));
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// Progress items published by the document flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentUpdate {
    Participants { names: Vec<String> },
    Ingested { file: String, source: String, markdown_bytes: usize },
    Indexed { store: String, files: usize },
    /// A message between participants
    Message {
        sender: String,
        receiver: String,
        content: String,
    },
    Saved { record_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAnswer {
    pub conversation_id: String,
    pub customer_id: String,
    pub answer: String,
    pub record_id: String,
    /// Markdown file names added to the store in this run
    pub ingested: Vec<String>,
}

/// Recent dialogue for a customer: the latest record's last five messages,
/// user and assistant turns only. Empty when the customer has no history.
pub async fn last_messages(
    store: &dyn ConversationStore,
    customer_id: &str,
) -> Result<Vec<StoredMessage>> {
    Ok(store
        .latest_for_customer(customer_id)
        .await?
        .map(|record| record.last_messages())
        .unwrap_or_default())
}

/// Prefix the question with prior dialogue, if there is any.
pub fn question_with_history(question: &str, history: &[StoredMessage]) -> Result<String> {
    if history.is_empty() {
        return Ok(question.to_string());
    }
    Ok(format!(
        "Below is last chat history in JSON format {}\n\n{question}",
        serde_json::to_string(history)?
    ))
}

pub struct DocumentFlow {
    blobs: Option<Arc<dyn BlobStore>>,
    parser: Arc<dyn DocumentParser>,
    files: Arc<dyn FileSearch>,
    conversations: Arc<dyn ConversationStore>,
}

impl DocumentFlow {
    pub fn new(
        parser: Arc<dyn DocumentParser>,
        files: Arc<dyn FileSearch>,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            blobs: None,
            parser,
            files,
            conversations,
        }
    }

    /// Enable blob URLs as sources and archive local files to blob storage.
    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn spawn(self, request: DocumentRequest) -> FlowHandle<DocumentUpdate, DocumentAnswer> {
        spawn_flow(move |sink| async move { self.run(request, &sink).await })
    }

    pub async fn run(
        &self,
        request: DocumentRequest,
        sink: &StreamSink<DocumentUpdate>,
    ) -> Result<DocumentAnswer> {
        if request.customer_id.trim().is_empty() {
            return Err(FlowError::Config("customer id must not be empty".into()));
        }
        let conversation_id = request
            .conversation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let started = std::time::Instant::now();
        emit_session_started(&conversation_id, "documents", 3);
        METRICS.inc_sessions();

        let result = self
            .answer(request, conversation_id.clone(), sink)
            .instrument(session_span("documents", &conversation_id))
            .await;

        emit_session_finished(
            &conversation_id,
            started.elapsed().as_millis() as u64,
            1,
            result.is_ok(),
        );
        result
    }

    async fn answer(
        &self,
        request: DocumentRequest,
        conversation_id: String,
        sink: &StreamSink<DocumentUpdate>,
    ) -> Result<DocumentAnswer> {
        sink.publish(DocumentUpdate::Participants {
            names: vec![
                USER_PROXY.to_string(),
                DOCUMENT_ASSISTANT.to_string(),
                QNA_ASSISTANT.to_string(),
            ],
        });

        let store = self
            .files
            .get_or_create_store(&customer_store_name(&request.customer_id))
            .await?;

        let ingested = if request.files.is_empty() {
            Vec::new()
        } else {
            self.ingest(&request.customer_id, &request.files, &store, sink)
                .await?
        };

        let history = last_messages(self.conversations.as_ref(), &request.customer_id).await?;
        debug!(messages = history.len(), "loaded prior dialogue");
        let prompt = question_with_history(&request.question, &history)?;
        sink.publish(DocumentUpdate::Message {
            sender: USER_PROXY.to_string(),
            receiver: QNA_ASSISTANT.to_string(),
            content: request.question.clone(),
        });

        let answer = self.files.ask(&store, &prompt).await?;
        METRICS.inc_generations();
        sink.publish(DocumentUpdate::Message {
            sender: QNA_ASSISTANT.to_string(),
            receiver: END_USER.to_string(),
            content: answer.clone(),
        });

        let mut messages = history;
        messages.push(StoredMessage::user(request.question.as_str()).with_name(USER_PROXY));
        if !ingested.is_empty() {
            messages.push(StoredMessage {
                role: "tool".to_string(),
                name: Some(DOCUMENT_ASSISTANT.to_string()),
                content: format!("Processed files: {}", ingested.join(", ")),
            });
        }
        messages.push(StoredMessage::assistant(answer.as_str()).with_name(QNA_ASSISTANT));

        let record = ConversationRecord::new(
            conversation_id.as_str(),
            request.customer_id.as_str(),
            messages,
        );
        let record_id = record.id.clone();
        self.conversations.save(record).await?;
        info!(%record_id, "conversation saved");
        sink.publish(DocumentUpdate::Saved {
            record_id: record_id.clone(),
        });

        Ok(DocumentAnswer {
            conversation_id,
            customer_id: request.customer_id,
            answer,
            record_id,
            ingested,
        })
    }

    /// Parse every file to markdown and add it to the customer's store.
    async fn ingest(
        &self,
        customer_id: &str,
        sources: &[String],
        store: &StoreId,
        sink: &StreamSink<DocumentUpdate>,
    ) -> Result<Vec<String>> {
        let workdir = tempfile::Builder::new().prefix("flows-docs-").tempdir()?;
        let mut markdown_files: Vec<PathBuf> = Vec::with_capacity(sources.len());
        let mut taken = HashSet::new();

        for (index, source) in sources.iter().enumerate() {
            let (name, bytes) = self.load(customer_id, source).await?;
            let markdown = self.parser.to_markdown(bytes).await?;
            let target = workdir
                .path()
                .join(markdown_name(&name, index + 1, &mut taken));
            tokio::fs::write(&target, &markdown).await?;
            sink.publish(DocumentUpdate::Ingested {
                file: name,
                source: source.clone(),
                markdown_bytes: markdown.len(),
            });
            markdown_files.push(target);
        }

        self.files.upload_files(store, &markdown_files).await?;
        sink.publish(DocumentUpdate::Indexed {
            store: store.to_string(),
            files: markdown_files.len(),
        });
        sink.publish(DocumentUpdate::Message {
            sender: DOCUMENT_ASSISTANT.to_string(),
            receiver: USER_PROXY.to_string(),
            content: format!("Done processing files. Ask {QNA_ASSISTANT} to search for the content."),
        });

        Ok(markdown_files
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect())
    }

    /// Bytes and display name of one source. With a blob store, local files
    /// are also copied to blob storage under a content-addressed name.
    async fn load(&self, customer_id: &str, source: &str) -> Result<(String, Vec<u8>)> {
        if is_blob_url(source) {
            let blobs = self.blobs.as_ref().ok_or_else(|| {
                FlowError::Config(format!("no blob store configured to read {source}"))
            })?;
            let name = source
                .split(['?', '#'])
                .next()
                .and_then(|p| p.rsplit('/').next())
                .unwrap_or(source)
                .to_string();
            let bytes = blobs.download(source).await?;
            return Ok((name, bytes));
        }

        let path = Path::new(source);
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.to_string());
        if let Some(blobs) = &self.blobs {
            let digest = ContentDigest::from_bytes(&bytes);
            let url = blobs
                .upload(&format!("{customer_id}/{}-{name}", digest.short()), bytes.clone())
                .await?;
            debug!(%url, "local file archived");
        }
        Ok((name, bytes))
    }
}

/// `report.pdf` becomes `report.md`; a stem already used in this batch gets
/// the source's position as a prefix.
fn markdown_name(name: &str, index: usize, taken: &mut HashSet<String>) -> String {
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    let mut candidate = format!("{stem}.md");
    let mut attempt = 1;
    while taken.contains(&candidate) {
        candidate = if attempt == 1 {
            format!("{index}-{stem}.md")
        } else {
            format!("{index}-{attempt}-{stem}.md")
        };
        attempt += 1;
    }
    taken.insert(candidate.clone());
    candidate
}
