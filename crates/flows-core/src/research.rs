//! Document research: search a site for files of one type, download them,
//! index them in a throwaway retrieval store and summarize each one.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use flows_adapters::{Fetcher, FileSearch, StoreId, WebSearch};
use futures::StreamExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::domain::{FlowError, Result};
use crate::metrics::METRICS;
use crate::obs::{emit_cleanup_error, emit_session_finished, emit_session_started, session_span};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::stream::{spawn_flow, FlowHandle, StreamSink};

/// First URL-like token: full URL, `www.` host or bare `host.tld`.
const URL_PATTERN: &str =
    r"(https?://[^\s]+|www\.[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}|[a-zA-Z0-9.-]+\.[a-zA-Z]{2,})";

/// Two-label public suffixes under which the registrable domain has three
/// labels.
const SECOND_LEVEL_SUFFIXES: &[&str] = &[
    "ac.uk", "co.uk", "gov.uk", "org.uk", "ltd.uk", "me.uk", "net.uk", "com.au", "net.au",
    "org.au", "edu.au", "gov.au", "co.nz", "org.nz", "govt.nz", "co.jp", "ne.jp", "or.jp",
    "ac.jp", "go.jp", "co.in", "gov.in", "ac.in", "com.br", "gov.br", "com.cn", "gov.cn",
    "com.mx", "co.za", "gov.za", "com.sg", "gov.sg", "co.kr", "com.tr", "com.hk",
];

pub const STEP_EXTRACT: &str = "Extracting Domain and Query";
pub const STEP_SEARCH: &str = "Execute Search Result";
pub const STEP_DOWNLOAD: &str = "Downloaded files";
pub const STEP_INDEX: &str = "Setting up file search";
pub const STEP_FINISHED: &str = "Finished processing the files.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Extension searched for and kept after download
    pub file_type: String,
    pub result_count: u32,
    pub download_concurrency: usize,
    pub summary_concurrency: usize,
    pub retry: RetryConfig,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            file_type: "pdf".to_string(),
            result_count: 10,
            download_concurrency: 5,
            summary_concurrency: 3,
            retry: RetryConfig::default(),
        }
    }
}

/// A named link or file shown with a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
    pub path: String,
}

/// Progress items published while research runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResearchUpdate {
    Step {
        title: String,
        content: String,
        files: Vec<FileRef>,
    },
    Summary {
        file: String,
        content: String,
        references: Vec<FileRef>,
    },
    Failed {
        message: String,
    },
}

impl ResearchUpdate {
    fn step(title: &str, content: impl Into<String>, files: Vec<FileRef>) -> Self {
        ResearchUpdate::Step {
            title: title.to_string(),
            content: content.into(),
            files,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub file: String,
    pub content: String,
}

/// Aggregate result of a research run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchReport {
    pub domain: Option<String>,
    pub query: String,
    pub links: Vec<String>,
    /// Names of the files that were downloaded and indexed
    pub files: Vec<String>,
    /// In completion order
    pub summaries: Vec<FileSummary>,
}

/// Split a question into the registrable domain it mentions (if any) and the
/// remaining query text.
pub fn extract_domain_and_query(question: &str) -> Result<(Option<String>, String)> {
    let pattern = Regex::new(URL_PATTERN)?;
    let Some(found) = pattern.find(question) else {
        return Ok((None, question.trim().to_string()));
    };
    let query = question.replace(found.as_str(), "").trim().to_string();
    Ok((registrable_domain(found.as_str()), query))
}

/// Reduce a URL or host to its registrable domain, e.g.
/// `https://www.research.example.co.uk/a.pdf` to `example.co.uk`.
pub fn registrable_domain(url: &str) -> Option<String> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = host.rsplit_once('@').map_or(host, |(_, h)| h);
    let host = host.split(':').next().unwrap_or_default();
    let host = host.trim_end_matches('.').to_ascii_lowercase();

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() < 2 {
        return None;
    }
    let last_two = labels[labels.len() - 2..].join(".");
    let keep = if SECOND_LEVEL_SUFFIXES.contains(&last_two.as_str()) {
        3
    } else {
        2
    };
    if labels.len() < keep {
        return None;
    }
    Some(labels[labels.len() - keep..].join("."))
}

/// Search string for the web search service.
pub fn search_query(domain: Option<&str>, file_type: &str, query: &str) -> String {
    match domain {
        Some(domain) => format!("site:{domain} filetype:{file_type} {query}"),
        None => format!("filetype:{file_type} {query}"),
    }
}

/// Drop repeated URLs, keeping first occurrences in order.
pub fn dedup_urls(urls: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
}

/// Local file name for a downloaded URL: the last path segment, made unique
/// within the run by prefixing its index when needed.
fn file_name_for(url: &str, index: usize, taken: &mut std::collections::HashSet<String>) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let base = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .unwrap_or("download");
    let mut name = base.to_string();
    let mut attempt = 1;
    while taken.contains(&name) {
        name = if attempt == 1 {
            format!("{index}-{base}")
        } else {
            format!("{index}-{attempt}-{base}")
        };
        attempt += 1;
    }
    taken.insert(name.clone());
    name
}

pub struct ResearchFlow {
    search: Arc<dyn WebSearch>,
    fetcher: Arc<dyn Fetcher>,
    files: Arc<dyn FileSearch>,
    config: ResearchConfig,
}

impl ResearchFlow {
    pub fn new(
        search: Arc<dyn WebSearch>,
        fetcher: Arc<dyn Fetcher>,
        files: Arc<dyn FileSearch>,
    ) -> Self {
        Self {
            search,
            fetcher,
            files,
            config: ResearchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ResearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    pub fn spawn(self, question: impl Into<String>) -> FlowHandle<ResearchUpdate, ResearchReport> {
        let question = question.into();
        spawn_flow(move |sink| async move { self.run(&question, &sink).await })
    }

    pub async fn run(
        &self,
        question: &str,
        sink: &StreamSink<ResearchUpdate>,
    ) -> Result<ResearchReport> {
        let run_id = Uuid::new_v4().to_string();
        let started = std::time::Instant::now();
        emit_session_started(&run_id, "research", 1);
        METRICS.inc_sessions();

        let result = self
            .research(question, sink)
            .instrument(session_span("research", &run_id))
            .await;

        emit_session_finished(
            &run_id,
            started.elapsed().as_millis() as u64,
            result.as_ref().map_or(0, |r| r.summaries.len() as u64),
            result.is_ok(),
        );
        result
    }

    async fn research(
        &self,
        question: &str,
        sink: &StreamSink<ResearchUpdate>,
    ) -> Result<ResearchReport> {
        let file_type = self.config.file_type.as_str();

        let (domain, query) = extract_domain_and_query(question)?;
        let extracted = match &domain {
            Some(d) => format!("Extracted domain: {d}, query: {query} for search"),
            None => {
                warn!(question, "no domain found in the question, searching the whole web");
                format!("No domain found, query: {query} for search")
            }
        };
        sink.publish(ResearchUpdate::step(STEP_EXTRACT, extracted, Vec::new()));

        let search_text = search_query(domain.as_deref(), file_type, &query);
        let links = retry_with_backoff(&self.config.retry, "web search", || {
            self.search.search(&search_text, self.config.result_count)
        })
        .await?;
        let links = dedup_urls(links);
        if links.is_empty() {
            return Err(FlowError::NoResults { query: search_text });
        }
        let references: Vec<FileRef> = links
            .iter()
            .enumerate()
            .map(|(i, url)| FileRef {
                name: format!("link{}", i + 1),
                path: url.clone(),
            })
            .collect();
        sink.publish(ResearchUpdate::step(
            STEP_SEARCH,
            format!(
                "Downloading {} {} files for further processing.",
                links.len(),
                file_type.to_uppercase()
            ),
            references.clone(),
        ));

        let workdir = tempfile::Builder::new().prefix("flows-research-").tempdir()?;
        let downloaded = self.download_all(&links, workdir.path()).await;
        if downloaded.is_empty() {
            return Err(FlowError::NoDownloads {
                file_type: file_type.to_string(),
            });
        }
        let names: Vec<String> = downloaded.iter().filter_map(|p| file_name(p)).collect();
        sink.publish(ResearchUpdate::step(
            STEP_DOWNLOAD,
            names
                .iter()
                .map(|n| format!("- {n}"))
                .collect::<Vec<_>>()
                .join("\n"),
            Vec::new(),
        ));

        let summaries = self.summarize(&downloaded, &references, sink).await;

        // The temp dir is removed on drop; remove it eagerly to surface errors.
        if let Err(e) = workdir.close() {
            emit_cleanup_error("research download directory", &e);
        }

        let summaries = summaries?;
        sink.publish(ResearchUpdate::step(STEP_FINISHED, "", Vec::new()));
        Ok(ResearchReport {
            domain,
            query,
            links,
            files: names,
            summaries,
        })
    }

    /// Download every link with bounded concurrency. Failures are logged and
    /// skipped; only files with the configured extension are kept.
    async fn download_all(&self, links: &[String], dir: &Path) -> Vec<PathBuf> {
        let semaphore = Arc::new(Semaphore::new(self.config.download_concurrency.max(1)));
        let mut taken = std::collections::HashSet::new();
        let mut tasks = Vec::with_capacity(links.len());

        for (index, url) in links.iter().enumerate() {
            let target = dir.join(file_name_for(url, index + 1, &mut taken));
            let url = url.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(&semaphore);
            tasks.push(tokio::spawn(
                async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    let bytes = fetcher.fetch(&url).await?;
                    tokio::fs::write(&target, bytes).await?;
                    debug!(path = %target.display(), "downloaded");
                    Ok::<_, FlowError>(target)
                }
                .in_current_span(),
            ));
        }

        let extension = format!(".{}", self.config.file_type.to_ascii_lowercase());
        let mut kept = Vec::new();
        for (task, url) in tasks.into_iter().zip(links) {
            match crate::stream::join(task).await {
                Ok(path) if has_extension(&path, &extension) => kept.push(path),
                Ok(path) => debug!(path = %path.display(), "skipping file with other extension"),
                Err(e) => warn!(%url, error = %e, "download failed"),
            }
        }
        kept
    }

    /// Index the files in a fresh store, summarize each one, and always
    /// delete the store.
    async fn summarize(
        &self,
        paths: &[PathBuf],
        references: &[FileRef],
        sink: &StreamSink<ResearchUpdate>,
    ) -> Result<Vec<FileSummary>> {
        let store = self.files.create_store(&format!("data-{}", Uuid::new_v4())).await?;
        let result = self.summarize_in(&store, paths, references, sink).await;

        if let Err(e) = self.files.delete_store(&store).await {
            emit_cleanup_error(&format!("retrieval store {store}"), &e);
        }
        if let Err(e) = &result {
            sink.publish(ResearchUpdate::Failed {
                message: format!("Error during processing: {e}"),
            });
        }
        result
    }

    async fn summarize_in(
        &self,
        store: &StoreId,
        paths: &[PathBuf],
        references: &[FileRef],
        sink: &StreamSink<ResearchUpdate>,
    ) -> Result<Vec<FileSummary>> {
        self.files.upload_files(store, paths).await?;
        sink.publish(ResearchUpdate::step(
            STEP_INDEX,
            format!("Indexed {} files.", paths.len()),
            Vec::new(),
        ));

        let names: Vec<String> = paths.iter().filter_map(|p| file_name(p)).collect();
        let mut pending = futures::stream::iter(names)
            .map(|file| async move {
                let question = format!("Summarize contents of {file} in less than 100 words");
                let answer = self.files.ask(store, &question).await;
                (file, answer)
            })
            .buffer_unordered(self.config.summary_concurrency.max(1));

        let mut summaries = Vec::new();
        while let Some((file, answer)) = pending.next().await {
            let content = answer?;
            info!(%file, "file summarized");
            sink.publish(ResearchUpdate::Summary {
                file: file.clone(),
                content: content.clone(),
                references: references.to_vec(),
            });
            summaries.push(FileSummary { file, content });
        }
        Ok(summaries)
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn has_extension(path: &Path, extension: &str) -> bool {
    file_name(path).is_some_and(|n| n.to_ascii_lowercase().ends_with(extension))
}
