use std::sync::Arc;

use flows_adapters::fakes::{MemoryBlobStore, MemoryDocumentParser, MemoryFileSearch};
use flows_adapters::FileSearch;
use flows_core::documents::{DOCUMENT_ASSISTANT, QNA_ASSISTANT, USER_PROXY};
use flows_core::{last_messages, DocumentFlow, DocumentRequest, DocumentUpdate, FlowError};
use flows_state::fakes::MemoryConversationStore;
use flows_state::ConversationStore;
use futures::StreamExt;

struct Fixture {
    parser: Arc<MemoryDocumentParser>,
    files: Arc<MemoryFileSearch>,
    conversations: Arc<MemoryConversationStore>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            parser: Arc::new(MemoryDocumentParser::new()),
            files: Arc::new(MemoryFileSearch::new()),
            conversations: Arc::new(MemoryConversationStore::new()),
        }
    }

    fn flow(&self) -> DocumentFlow {
        DocumentFlow::new(
            self.parser.clone(),
            self.files.clone(),
            self.conversations.clone(),
        )
    }
}

fn write_policy(dir: &tempfile::TempDir) -> String {
    let path = dir.path().join("policy.pdf");
    std::fs::write(&path, "coverage: full").unwrap();
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn ingests_answers_and_persists() {
    let fx = Fixture::new();
    let dir = tempfile::tempdir().unwrap();
    let request =
        DocumentRequest::new("c1", "What is covered?").with_files([write_policy(&dir)]);

    let mut handle = fx.flow().spawn(request);
    let updates: Vec<DocumentUpdate> = handle.stream().collect().await;
    let answer = handle.finish().await.unwrap();

    assert_eq!(answer.answer, "Answer from 1 files: What is covered?");
    assert_eq!(answer.ingested, vec!["policy.md"]);
    assert_eq!(fx.parser.parsed_count(), 1);
    assert_eq!(fx.files.live_stores(), vec!["vector_store_c1"]);

    assert!(matches!(
        &updates[0],
        DocumentUpdate::Participants { names } if names.len() == 3
    ));
    assert!(updates.iter().any(|u| matches!(
        u,
        DocumentUpdate::Ingested { file, markdown_bytes, .. }
            if file == "policy.pdf" && *markdown_bytes == "# Document\n\ncoverage: full".len()
    )));
    assert!(updates
        .iter()
        .any(|u| matches!(u, DocumentUpdate::Indexed { files: 1, .. })));
    assert!(matches!(
        updates.last(),
        Some(DocumentUpdate::Saved { record_id }) if *record_id == answer.record_id
    ));

    let record = fx
        .conversations
        .latest_for_customer("c1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.conversation_id, answer.conversation_id);
    let roles: Vec<(&str, Option<&str>)> = record
        .messages
        .iter()
        .map(|m| (m.role.as_str(), m.name.as_deref()))
        .collect();
    assert_eq!(
        roles,
        vec![
            ("user", Some(USER_PROXY)),
            ("tool", Some(DOCUMENT_ASSISTANT)),
            ("assistant", Some(QNA_ASSISTANT)),
        ]
    );
}

#[tokio::test]
async fn follow_up_question_carries_prior_dialogue() {
    let fx = Fixture::new();
    let dir = tempfile::tempdir().unwrap();

    let first = DocumentRequest::new("c1", "What is covered?").with_files([write_policy(&dir)]);
    let first = fx.flow().spawn(first).finish().await.unwrap();

    let second = DocumentRequest::new("c1", "And the deductible?")
        .with_conversation(first.conversation_id.as_str());
    let second = fx.flow().spawn(second).finish().await.unwrap();

    assert_eq!(second.conversation_id, first.conversation_id);
    assert!(second.ingested.is_empty());
    assert_eq!(fx.files.live_stores(), vec!["vector_store_c1"]);

    let questions = fx.files.questions();
    assert_eq!(questions[0], "What is covered?");
    assert!(questions[1].starts_with("Below is last chat history in JSON format ["));
    assert!(questions[1].contains("What is covered?"));
    assert!(!questions[1].contains("Processed files"));
    assert!(questions[1].ends_with("\n\nAnd the deductible?"));

    assert_eq!(fx.conversations.len(), 2);
    let recent = last_messages(fx.conversations.as_ref(), "c1").await.unwrap();
    let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents.last(), Some(&second.answer.as_str()));
    assert!(recent.iter().all(|m| m.role == "user" || m.role == "assistant"));
    assert!(recent.len() <= 5);
}

#[tokio::test]
async fn customers_do_not_share_history() {
    let fx = Fixture::new();
    fx.flow()
        .spawn(DocumentRequest::new("c1", "first"))
        .finish()
        .await
        .unwrap();
    fx.flow()
        .spawn(DocumentRequest::new("c2", "second"))
        .finish()
        .await
        .unwrap();

    assert_eq!(fx.files.questions(), vec!["first", "second"]);
    assert_eq!(
        fx.files.live_stores(),
        vec!["vector_store_c1", "vector_store_c2"]
    );
    assert!(last_messages(fx.conversations.as_ref(), "nobody")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn blob_sources_need_a_blob_store() {
    let fx = Fixture::new();
    let request = DocumentRequest::new("c1", "q")
        .with_files(["https://acct.blob.core.windows.net/docs/policy.pdf"]);
    let err = fx.flow().spawn(request).finish().await.unwrap_err();
    assert!(matches!(err, FlowError::Config(_)));
    assert!(fx.conversations.is_empty());
}

#[tokio::test]
async fn blob_store_serves_urls_and_archives_local_files() {
    let fx = Fixture::new();
    let url = "https://acct.blob.core.windows.net/docs/terms.pdf";
    let blobs = Arc::new(MemoryBlobStore::new().with_blob(url, b"terms text".to_vec()));
    let dir = tempfile::tempdir().unwrap();

    let request = DocumentRequest::new("c1", "q").with_files([url.to_string(), write_policy(&dir)]);
    let answer = fx
        .flow()
        .with_blob_store(blobs.clone())
        .spawn(request)
        .finish()
        .await
        .unwrap();

    assert_eq!(answer.ingested, vec!["terms.md", "policy.md"]);
    let archived: Vec<String> = blobs
        .urls()
        .into_iter()
        .filter(|u| u.starts_with(&format!("{}/c1/", MemoryBlobStore::BASE_URL)))
        .collect();
    assert_eq!(archived.len(), 1);
    assert!(archived[0].ends_with("-policy.pdf"));
}

#[tokio::test]
async fn empty_customer_id_is_rejected() {
    let fx = Fixture::new();
    let err = fx
        .flow()
        .spawn(DocumentRequest::new("  ", "q"))
        .finish()
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Config(_)));
    assert!(fx.files.live_stores().is_empty());
}

#[tokio::test]
async fn missing_local_file_fails_before_saving() {
    let fx = Fixture::new();
    let request = DocumentRequest::new("c1", "q").with_files(["/no/such/file.pdf"]);
    let err = fx.flow().spawn(request).finish().await.unwrap_err();
    assert!(matches!(err, FlowError::Io(_)));
    assert!(fx.conversations.is_empty());
}

#[tokio::test]
async fn files_sharing_a_stem_are_uploaded_separately() {
    let fx = Fixture::new();
    let dir = tempfile::tempdir().unwrap();
    let mut sources = Vec::new();
    for (folder, body) in [("a", "first"), ("b", "second")] {
        let path = dir.path().join(folder).join("report.pdf");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, body).unwrap();
        sources.push(path.to_string_lossy().into_owned());
    }

    let answer = fx
        .flow()
        .spawn(DocumentRequest::new("c1", "q").with_files(sources))
        .finish()
        .await
        .unwrap();

    assert_eq!(answer.ingested, vec!["report.md", "2-report.md"]);
    assert_eq!(fx.parser.parsed_count(), 2);

    let store = fx.files.find_store("vector_store_c1").await.unwrap().unwrap();
    let uploaded = fx.files.files_in(&store);
    assert_eq!(uploaded.len(), 2);
    assert_ne!(uploaded[0], uploaded[1]);
}
