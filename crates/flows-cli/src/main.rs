//! GenAI Flows CLI
//!
//! The `flows` command runs each flow against the configured cloud services
//! and prints its progress as it streams.
//!
//! ## Commands
//!
//! - `campaign`: reviewed marketing group chat for a product
//! - `research`: search a site for PDFs and summarize them
//! - `docs`: ingest customer documents and answer a question
//! - `chat`: single answer with trimmed history
//! - `history`: show saved conversations for a customer

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use tracing::{info, Level};

use flows_adapters::{
    AssistantSpec, AzureBlobStore, AzureFileSearch, AzureOpenAiChat, BingSearch,
    DocumentIntelligence, HttpFetcher,
};
use flows_core::documents::{DOCUMENT_ASSISTANT, QNA_ASSISTANT};
use flows_core::{
    ChatFlow, ChatTurn, DocumentFlow, DocumentRequest, DocumentUpdate, FlowConfig, FlowHandle,
    GroupChatSession, ResearchFlow, ResearchUpdate, SessionUpdate,
};
use flows_state::{ConversationRecord, ConversationStore, SurrealConversationStore};

const DOWNLOAD_TIMEOUT_SECS: u64 = 120;

#[derive(Parser)]
#[command(name = "flows")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run GenAI flows: reviewed campaigns, PDF research and document QnA", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and print stream items as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: flows.toml in the current directory, if present)
    #[arg(short, long, global = true, env = "FLOWS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Draft a marketing campaign reviewed by an editor
    Campaign {
        /// Product name or short description
        product: String,
    },

    /// Find files of one type on a site and summarize each
    Research {
        /// Question, optionally naming a site, e.g. "example.com annual report"
        question: String,

        /// File type to search for (overrides config)
        #[arg(long)]
        file_type: Option<String>,
    },

    /// Answer a question from a customer's documents
    Docs {
        /// Question to answer
        question: String,

        /// Customer whose documents and history are used
        #[arg(long)]
        customer_id: String,

        /// Local path or blob URL to ingest first (repeatable)
        #[arg(short, long = "file")]
        files: Vec<String>,

        /// Continue an existing conversation
        #[arg(long)]
        conversation_id: Option<String>,
    },

    /// Ask a single question with optional prior history
    Chat {
        /// Question to answer
        question: String,

        /// JSON file holding earlier turns: [{"question": "...", "answer": "..."}]
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Show saved conversations for a customer
    History {
        #[arg(long)]
        customer_id: String,

        /// Maximum number of records to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    flows_core::init_tracing(cli.json, level);

    let config = FlowConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Campaign { product } => cmd_campaign(&config, &product, cli.json).await,
        Commands::Research {
            question,
            file_type,
        } => cmd_research(config, &question, file_type, cli.json).await,
        Commands::Docs {
            question,
            customer_id,
            files,
            conversation_id,
        } => {
            let mut request = DocumentRequest::new(customer_id, question).with_files(files);
            if let Some(id) = conversation_id {
                request = request.with_conversation(id);
            }
            cmd_docs(&config, request, cli.json).await
        }
        Commands::Chat { question, history } => {
            cmd_chat(&config, &question, history.as_deref(), cli.json).await
        }
        Commands::History { customer_id, limit } => {
            cmd_history(&config, &customer_id, limit, cli.json).await
        }
    }
}

/// Print every item of a running flow, then wait for its result.
async fn drain<T, R>(mut handle: FlowHandle<T, R>, json: bool, render: fn(&T) -> String) -> Result<R>
where
    T: Serialize + Send + 'static,
    R: Send + 'static,
{
    while let Some(item) = handle.stream().next().await {
        if json {
            println!("{}", serde_json::to_string(&item)?);
        } else {
            let line = render(&item);
            if !line.is_empty() {
                println!("{line}");
            }
        }
    }
    Ok(handle.finish().await?)
}

async fn cmd_campaign(config: &FlowConfig, product: &str, json: bool) -> Result<()> {
    let chat = AzureOpenAiChat::new(config.azure_openai()?)
        .context("Failed to create Azure OpenAI client")?;
    let session = GroupChatSession::marketing(Arc::new(chat), config.session_config());
    info!(session_id = session.id(), "campaign session starting");

    let outcome = drain(session.spawn(product), json, render_session_update)
        .await
        .context("Campaign session failed")?;

    if json {
        println!("{}", serde_json::to_string(&outcome)?);
        return Ok(());
    }
    println!();
    println!("Approved after {} turns:", outcome.turns);
    for (producer, draft) in outcome.final_drafts() {
        println!();
        println!("== {producer} ==");
        println!("{draft}");
    }
    Ok(())
}

async fn cmd_research(
    mut config: FlowConfig,
    question: &str,
    file_type: Option<String>,
    json: bool,
) -> Result<()> {
    if let Some(file_type) = file_type {
        config.research.file_type = file_type.trim_start_matches('.').to_string();
    }
    let openai = config.azure_openai()?;
    let model = openai.deployment.clone();
    let search = BingSearch::new(config.search()?).context("Failed to create search client")?;
    let fetcher = HttpFetcher::new(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
        .context("Failed to create download client")?;
    let assistant = AssistantSpec::new(
        "Web_Research_Assistant",
        "You are a helpful AI assistant that can help summarize the files in less than 100 words.",
        model,
    )
    .with_description("Assistant that answers questions based on the files in the vector store");
    let files = AzureFileSearch::new(openai, assistant).context("Failed to create file search client")?;

    let flow = ResearchFlow::new(Arc::new(search), Arc::new(fetcher), Arc::new(files))
        .with_config(config.research.clone());
    let report = drain(flow.spawn(question), json, render_research_update)
        .await
        .context("Research failed")?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!();
        println!(
            "Summarized {} of {} files found for \"{}\"",
            report.summaries.len(),
            report.links.len(),
            report.query
        );
    }
    Ok(())
}

async fn cmd_docs(config: &FlowConfig, request: DocumentRequest, json: bool) -> Result<()> {
    let openai = config.azure_openai()?;
    let model = openai.deployment.clone();
    let assistant = AssistantSpec::new(
        QNA_ASSISTANT,
        "You answer questions about a customer using only the documents in the vector store. \
         Say so when the documents do not contain the answer.",
        model,
    )
    .with_description("Answers questions about a customer's profile documents");
    let files = AzureFileSearch::new(openai, assistant).context("Failed to create file search client")?;
    let parser = DocumentIntelligence::new(config.documents()?)
        .context("Failed to create document parser")?;
    let store = open_store(config).await?;

    let mut flow = DocumentFlow::new(Arc::new(parser), Arc::new(files), Arc::new(store));
    if let Some(blob) = config.blob()? {
        let blobs = AzureBlobStore::new(blob).context("Failed to create blob client")?;
        flow = flow.with_blob_store(Arc::new(blobs));
    }

    let answer = drain(flow.spawn(request), json, render_document_update)
        .await
        .context("Document flow failed")?;

    if json {
        println!("{}", serde_json::to_string(&answer)?);
    } else {
        println!();
        println!("{}", answer.answer);
        println!();
        println!("(conversation {})", answer.conversation_id);
    }
    Ok(())
}

async fn cmd_chat(
    config: &FlowConfig,
    question: &str,
    history: Option<&Path>,
    json: bool,
) -> Result<()> {
    let history = match history {
        Some(path) => read_history(path)?,
        None => Vec::new(),
    };
    let chat = AzureOpenAiChat::new(config.azure_openai()?)
        .context("Failed to create Azure OpenAI client")?;
    let flow = ChatFlow::new(Arc::new(chat)).with_config(config.chat.clone());

    let reply = flow.ask(question, &history).await.context("Chat failed")?;
    if json {
        println!("{}", serde_json::to_string(&reply)?);
    } else {
        println!("{}", reply.answer);
    }
    Ok(())
}

async fn cmd_history(config: &FlowConfig, customer_id: &str, limit: usize, json: bool) -> Result<()> {
    let store = open_store(config).await?;
    let records = store
        .list_for_customer(customer_id)
        .await
        .context(format!("Failed to list conversations for '{customer_id}'"))?;

    if records.is_empty() {
        println!("No conversations found for '{customer_id}'");
        return Ok(());
    }

    for record in records.iter().take(limit) {
        if json {
            println!("{}", serde_json::to_string(record)?);
        } else {
            print!("{}", render_record(record));
        }
    }
    Ok(())
}

async fn open_store(config: &FlowConfig) -> Result<SurrealConversationStore> {
    SurrealConversationStore::connect(&config.store())
        .await
        .context("Failed to connect to the conversation store")
}

fn read_history(path: &Path) -> Result<Vec<ChatTurn>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid history file {}", path.display()))
}

fn render_session_update(update: &SessionUpdate) -> String {
    match update {
        SessionUpdate::Spoke { role, content } => format!("[{role}]\n{content}\n"),
        SessionUpdate::Relayed { .. } => String::new(),
        SessionUpdate::Approved { producer } => format!("✓ {producer} approved\n"),
    }
}

fn render_research_update(update: &ResearchUpdate) -> String {
    match update {
        ResearchUpdate::Step {
            title,
            content,
            files,
        } => {
            let mut out = format!("## {title}");
            if !content.is_empty() {
                out.push('\n');
                out.push_str(content);
            }
            for file in files {
                out.push_str(&format!("\n  [{}] {}", file.name, file.path));
            }
            out
        }
        ResearchUpdate::Summary { file, content, .. } => format!("### {file}\n{content}"),
        ResearchUpdate::Failed { message } => format!("!! {message}"),
    }
}

fn render_document_update(update: &DocumentUpdate) -> String {
    match update {
        DocumentUpdate::Participants { names } => format!("Participants: {}", names.join(", ")),
        DocumentUpdate::Ingested { file, .. } => format!("[{DOCUMENT_ASSISTANT}] converted {file}"),
        DocumentUpdate::Indexed { store, files } => format!("[{DOCUMENT_ASSISTANT}] indexed {files} file(s) in {store}"),
        DocumentUpdate::Message {
            sender,
            receiver,
            content,
        } => format!("{sender} -> {receiver}: {content}"),
        DocumentUpdate::Saved { record_id } => format!("saved as {record_id}"),
    }
}

fn render_record(record: &ConversationRecord) -> String {
    let mut out = format!(
        "conversation {}\nrecord {}\nDate: {}\n\n",
        record.conversation_id,
        record.id,
        record.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for message in record.messages.iter().filter(|m| m.is_dialogue()) {
        let speaker = message.name.as_deref().unwrap_or(message.role.as_str());
        out.push_str(&format!("    {speaker}: {}\n", message.content));
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use flows_core::FileRef;
    use flows_state::StoredMessage;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn docs_accepts_repeated_files() {
        let cli = Cli::try_parse_from([
            "flows",
            "docs",
            "What is covered?",
            "--customer-id",
            "c1",
            "--file",
            "a.pdf",
            "-f",
            "https://acct.blob.core.windows.net/docs/b.pdf",
        ])
        .unwrap();
        match cli.command {
            Commands::Docs {
                customer_id, files, ..
            } => {
                assert_eq!(customer_id, "c1");
                assert_eq!(files.len(), 2);
            }
            _ => panic!("expected docs command"),
        }
    }

    #[test]
    fn history_requires_customer_id() {
        assert!(Cli::try_parse_from(["flows", "history"]).is_err());
    }

    #[test]
    fn research_step_lists_links() {
        let text = render_research_update(&ResearchUpdate::Step {
            title: "Execute Search Result".into(),
            content: "Downloading 1 PDF files for further processing.".into(),
            files: vec![FileRef {
                name: "link1".into(),
                path: "https://example.com/a.pdf".into(),
            }],
        });
        assert!(text.starts_with("## Execute Search Result\n"));
        assert!(text.ends_with("[link1] https://example.com/a.pdf"));
    }

    #[test]
    fn relayed_updates_are_not_printed() {
        let update = SessionUpdate::Relayed {
            from: "Editor".into(),
            to: "EmailWriter".into(),
            content: "shorter".into(),
            forwarded: true,
        };
        assert!(render_session_update(&update).is_empty());
    }

    #[test]
    fn record_rendering_hides_tool_messages() {
        let record = ConversationRecord::new(
            "conv-1",
            "c1",
            vec![
                StoredMessage::user("hi").with_name("UserProxy"),
                StoredMessage {
                    role: "tool".into(),
                    name: None,
                    content: "Processed files: a.md".into(),
                },
                StoredMessage::assistant("hello"),
            ],
        );
        let text = render_record(&record);
        assert!(text.contains("UserProxy: hi"));
        assert!(text.contains("assistant: hello"));
        assert!(!text.contains("Processed files"));
    }

    #[test]
    fn history_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, r#"[{"question":"q1","answer":"a1"}]"#).unwrap();
        assert_eq!(read_history(&path).unwrap(), vec![ChatTurn::new("q1", "a1")]);
        assert!(read_history(&dir.path().join("none.json")).is_err());
    }
}
