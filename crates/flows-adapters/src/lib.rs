//! flows-adapters: clients for the external services the flows call
//!
//! ## Layer 1 - Collaborators
//!
//! Each service is an async trait with one reqwest implementation and one
//! in-memory fake (see [`fakes`]):
//!
//! - `GenerationAdapter` / `AzureOpenAiChat`: chat completions
//! - `WebSearch` / `BingSearch`: web search returning result URLs
//! - `Fetcher` / `HttpFetcher`: plain downloads
//! - `FileSearch` / `AzureFileSearch`: vector stores + file-search assistant
//! - `DocumentParser` / `DocumentIntelligence`: document to markdown
//! - `BlobStore` / `AzureBlobStore`: blob download and upload

pub mod blob;
pub mod chat;
pub mod documents;
mod error;
pub mod fakes;
pub mod fetch;
mod http;
pub mod retrieval;
pub mod search;

pub use blob::{is_blob_url, AzureBlobStore, BlobConfig, BlobStore};
pub use chat::{AzureOpenAiChat, AzureOpenAiConfig, ChatMessage, ChatRole, GenerationAdapter};
pub use documents::{DocumentIntelligence, DocumentIntelligenceConfig, DocumentParser};
pub use error::AdapterError;
pub use fetch::{Fetcher, HttpFetcher};
pub use http::PollPolicy;
pub use retrieval::{AssistantSpec, AzureFileSearch, FileSearch, StoreId};
pub use search::{BingSearch, BingSearchConfig, WebSearch};

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;
