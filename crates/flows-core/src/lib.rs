//! flows-core: agent flows over cloud LLM, search, retrieval and storage
//! services.
//!
//! ## Layer 2 - Domain
//!
//! - [`coordinator`]: the turn state machine of a reviewed group chat
//! - [`session`]: drives a coordinator against generation adapters
//! - [`research`], [`documents`], [`chat`]: the other flows
//! - [`stream`]: progressive output shared by every flow
//!
//! Collaborators come from `flows-adapters` and the conversation store from
//! `flows-state`; every flow takes them as `Arc<dyn Trait>`.

pub mod chat;
pub mod config;
pub mod coordinator;
pub mod documents;
pub mod domain;
pub mod metrics;
pub mod obs;
pub mod relay;
pub mod research;
pub mod retry;
pub mod roles;
pub mod session;
pub mod stream;
pub mod telemetry;

pub use chat::{estimate_tokens, trim_history, ChatConfig, ChatFlow, ChatReply, ChatTurn};
pub use config::{FlowConfig, DEFAULT_CONFIG_FILE};
pub use coordinator::{
    ApprovalPolicy, CoordinatorError, CoordinatorState, Directive, LogEntry, SessionLog,
    TurnCoordinator, TurnMessage,
};
pub use documents::{
    customer_store_name, last_messages, DocumentAnswer, DocumentFlow, DocumentRequest,
    DocumentUpdate,
};
pub use domain::{FlowError, Result};
pub use relay::MessageRelay;
pub use research::{
    extract_domain_and_query, registrable_domain, FileRef, FileSummary, ResearchConfig,
    ResearchFlow, ResearchReport, ResearchUpdate,
};
pub use retry::{retry_with_backoff, RetryConfig};
pub use roles::{Role, RoleError, RoleId, RoleKind, RoleRegistry};
pub use session::{GroupChatSession, SessionConfig, SessionOutcome, SessionUpdate};
pub use stream::{spawn_flow, FlowHandle, StreamSink, TurnStream};

pub use metrics::METRICS;
pub use obs::{
    emit_review_verdict, emit_session_finished, emit_session_started, emit_turn_relayed,
};
pub use telemetry::init_tracing;

/// flows-core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
