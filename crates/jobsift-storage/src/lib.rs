//! HTTP fetch utilities + snapshot persistence for jobsift.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use jobsift_core::{Posting, RunSummary};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

pub const CRATE_NAME: &str = "jobsift-storage";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Thin reqwest wrapper with a per-call timeout and optional user agent.
/// One attempt per call: a slow or failing source is surfaced to the caller
/// and the run moves on to the next source.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    pub async fn fetch_bytes(&self, source: &str, url: &str) -> Result<FetchedResponse, FetchError> {
        debug!(source, url, "http fetch");
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let final_url = resp.url().to_string();

        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: final_url,
            });
        }

        let body = resp.bytes().await?.to_vec();
        Ok(FetchedResponse {
            status,
            final_url,
            body,
        })
    }
}

/// Column layout of the CSV snapshot.
pub const CSV_COLUMNS: [&str; 9] = [
    "title",
    "company",
    "url",
    "location",
    "is_remote",
    "relevance_score",
    "rationale",
    "posted_at",
    "scraped_at",
];

/// Run ids are start-time stamps, so lexicographic filename order equals
/// chronological order.
pub fn run_id_for(started_at: DateTime<Utc>) -> String {
    started_at.format("%Y%m%d_%H%M%S").to_string()
}

/// True for timestamped snapshot filenames (`jobs_<digits/underscore>.json`).
/// The `jobs_latest.json` alias deliberately fails this check so history
/// selection never picks it over a real run snapshot.
pub fn is_snapshot_name(name: &str) -> bool {
    let Some(stem) = name.strip_prefix("jobs_").and_then(|rest| rest.strip_suffix(".json")) else {
        return false;
    };
    !stem.is_empty() && stem.chars().all(|c| c.is_ascii_digit() || c == '_')
}

/// Data-dir handle for snapshot, latest-alias, and run-summary files.
///
/// Writes are plain (non-transactional): an interrupted process may leave a
/// truncated file, which the tolerant history loader reports as a run error
/// on the next execution.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating data directory {}", self.root.display()))
    }

    /// The lexicographically greatest timestamped snapshot, if any exists.
    pub async fn latest_snapshot_path(&self) -> anyhow::Result<Option<PathBuf>> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("reading data directory {}", self.root.display()))
            }
        };

        let mut best: Option<String> = None;
        while let Some(entry) = dir
            .next_entry()
            .await
            .with_context(|| format!("listing data directory {}", self.root.display()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_snapshot_name(&name) && best.as_deref().map_or(true, |b| name.as_str() > b) {
                best = Some(name);
            }
        }

        Ok(best.map(|name| self.root.join(name)))
    }

    pub async fn load_postings(&self, path: &Path) -> anyhow::Result<Vec<Posting>> {
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading snapshot {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing snapshot {}", path.display()))
    }

    /// Writes `jobs_<run_id>.json` and mirrors it to `jobs_latest.json`.
    pub async fn write_json_snapshot(
        &self,
        run_id: &str,
        postings: &[Posting],
    ) -> anyhow::Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(postings).context("serializing postings snapshot")?;
        let path = self.root.join(format!("jobs_{run_id}.json"));
        fs::write(&path, &bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        let latest = self.root.join("jobs_latest.json");
        fs::write(&latest, &bytes)
            .await
            .with_context(|| format!("writing {}", latest.display()))?;

        debug!(path = %path.display(), count = postings.len(), "wrote json snapshot");
        Ok(path)
    }

    /// Writes `jobs_<run_id>.csv` and mirrors it to `jobs_latest.csv`.
    pub async fn write_csv_snapshot(
        &self,
        run_id: &str,
        postings: &[Posting],
    ) -> anyhow::Result<PathBuf> {
        let bytes = postings_to_csv(postings)?;
        let path = self.root.join(format!("jobs_{run_id}.csv"));
        fs::write(&path, &bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        let latest = self.root.join("jobs_latest.csv");
        fs::write(&latest, &bytes)
            .await
            .with_context(|| format!("writing {}", latest.display()))?;

        debug!(path = %path.display(), count = postings.len(), "wrote csv snapshot");
        Ok(path)
    }

    pub async fn write_run_summary(&self, summary: &RunSummary) -> anyhow::Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(summary).context("serializing run summary")?;
        let path = self.root.join(format!("result_{}.json", summary.run_id));
        fs::write(&path, &bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}

pub fn postings_to_csv(postings: &[Posting]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_COLUMNS).context("writing csv header")?;

    for posting in postings {
        let score = posting
            .relevance_score
            .map(|s| s.to_string())
            .unwrap_or_default();
        let posted_at = posting
            .posted_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        let scraped_at = posting.scraped_at.to_rfc3339();

        writer
            .write_record([
                posting.title.as_str(),
                posting.company.as_str(),
                posting.url.as_str(),
                posting.location.as_str(),
                if posting.is_remote { "true" } else { "false" },
                score.as_str(),
                posting.relevance_rationale.as_deref().unwrap_or(""),
                posted_at.as_str(),
                scraped_at.as_str(),
            ])
            .context("writing csv row")?;
    }

    writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("flushing csv buffer: {err}"))
}
