//! Pipeline orchestration: fetch from every source, normalize against the
//! company registry, dedup, score, merge with the prior snapshot, persist.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use jobsift_adapters::{all_adapters, FetchQuery, SourceAdapter};
use jobsift_core::{title_matches_keywords, CompanyRegistry, Posting, RawPosting, RunSummary};
use jobsift_score::{
    criteria_text, score_batch, select_scorer, CriteriaSpec, RelevanceScorer, ScorerConfig,
};
use jobsift_storage::{run_id_for, HttpClientConfig, HttpFetcher, SnapshotStore};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};
use url::Url;

pub const CRATE_NAME: &str = "jobsift-sync";

/// Scored postings below this relevance are dropped before the merge.
pub const RELEVANCE_THRESHOLD: f64 = 0.5;

/// Default score floor for [`export_top_postings`].
pub const DEFAULT_EXPORT_MIN_SCORE: f64 = 0.7;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Snapshot formats the pipeline can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

/// Pipeline configuration. Every field has a workable default so a bare
/// environment still produces a useful run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub keywords: Vec<String>,
    pub remote_only: bool,
    pub min_employees: u32,
    pub min_years_in_business: u32,
    pub prefer_public: bool,
    pub max_postings_per_run: usize,
    pub data_dir: PathBuf,
    pub output_formats: Vec<OutputFormat>,
    pub companies_file: Option<PathBuf>,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub scorer: ScorerConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            keywords: vec![
                "data engineer".to_string(),
                "senior data engineer".to_string(),
                "software engineer".to_string(),
                "solutions architect".to_string(),
            ],
            remote_only: true,
            min_employees: 200,
            min_years_in_business: 5,
            prefer_public: true,
            max_postings_per_run: 100,
            data_dir: PathBuf::from("./data"),
            output_formats: vec![OutputFormat::Json, OutputFormat::Csv],
            companies_file: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            http_timeout_secs: 10,
            scorer: ScorerConfig::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let http_timeout_secs = std::env::var("JOBSIFT_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.http_timeout_secs);
        Self {
            keywords: std::env::var("JOBSIFT_TARGET_ROLES")
                .map(|v| parse_list(&v))
                .unwrap_or(defaults.keywords),
            remote_only: std::env::var("JOBSIFT_REMOTE_ONLY")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(defaults.remote_only),
            min_employees: std::env::var("JOBSIFT_MIN_EMPLOYEES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.min_employees),
            min_years_in_business: std::env::var("JOBSIFT_MIN_YEARS_IN_BUSINESS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.min_years_in_business),
            prefer_public: std::env::var("JOBSIFT_PREFER_PUBLIC")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(defaults.prefer_public),
            max_postings_per_run: std::env::var("JOBSIFT_MAX_POSTINGS_PER_RUN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_postings_per_run),
            data_dir: std::env::var("JOBSIFT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            output_formats: std::env::var("JOBSIFT_OUTPUT_FORMATS")
                .map(|v| parse_output_formats(&v))
                .unwrap_or(defaults.output_formats),
            companies_file: std::env::var("JOBSIFT_COMPANIES_FILE")
                .ok()
                .map(PathBuf::from),
            user_agent: std::env::var("JOBSIFT_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs,
            scorer: ScorerConfig {
                groq_api_key: std::env::var("GROQ_API_KEY").ok().filter(|v| !v.is_empty()),
                groq_model: std::env::var("GROQ_MODEL").unwrap_or(defaults.scorer.groq_model),
                ollama_base_url: std::env::var("OLLAMA_BASE_URL")
                    .unwrap_or(defaults.scorer.ollama_base_url),
                ollama_model: std::env::var("OLLAMA_MODEL")
                    .unwrap_or(defaults.scorer.ollama_model),
                openai_api_key: std::env::var("OPENAI_API_KEY")
                    .ok()
                    .filter(|v| !v.is_empty()),
                openai_base_url: std::env::var("OPENAI_BASE_URL")
                    .unwrap_or(defaults.scorer.openai_base_url),
                openai_model: std::env::var("OPENAI_MODEL")
                    .unwrap_or(defaults.scorer.openai_model),
                timeout: Duration::from_secs(http_timeout_secs),
            },
        }
    }

    /// Criteria block handed to the scoring prompt builder.
    pub fn criteria(&self) -> CriteriaSpec {
        CriteriaSpec {
            target_roles: self.keywords.clone(),
            remote_only: self.remote_only,
            min_employees: self.min_employees,
            min_years_in_business: self.min_years_in_business,
            prefer_public: self.prefer_public,
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_output_formats(raw: &str) -> Vec<OutputFormat> {
    raw.split(',')
        .filter_map(|part| match part.trim() {
            "json" => Some(OutputFormat::Json),
            "csv" => Some(OutputFormat::Csv),
            "" => None,
            other => {
                warn!(format = other, "ignoring unknown output format");
                None
            }
        })
        .collect()
}

/// Company and keyword gate between raw listings and canonical postings.
pub struct Normalizer {
    registry: CompanyRegistry,
    keywords: Vec<String>,
    min_employees: u32,
    min_years_in_business: u32,
}

impl Normalizer {
    pub fn new(
        registry: CompanyRegistry,
        keywords: Vec<String>,
        min_employees: u32,
        min_years_in_business: u32,
    ) -> Self {
        Self {
            registry,
            keywords,
            min_employees,
            min_years_in_business,
        }
    }

    /// One raw listing in, at most one canonical posting out. The URL is
    /// resolved against the source base and becomes the identity key; it is
    /// never recomputed after this point. No I/O happens here.
    pub fn normalize(&self, raw: RawPosting) -> Option<Posting> {
        let title = raw.title.trim();
        if title.is_empty() {
            warn!(source = %raw.source, url = %raw.url, "skipping listing with empty title");
            return None;
        }
        let Some(url) = resolve_listing_url(&raw.url, &raw.base_url) else {
            warn!(source = %raw.source, url = %raw.url, "skipping listing with unresolvable url");
            return None;
        };
        let company = raw.company.trim();
        let Some(profile) = self.registry.lookup(company) else {
            debug!(company, "company not in the registry");
            return None;
        };
        if !title_matches_keywords(title, &self.keywords) {
            debug!(title, "title matches no configured keyword");
            return None;
        }
        if !profile.meets_criteria(
            self.min_employees,
            self.min_years_in_business,
            Utc::now().year(),
        ) {
            debug!(company, "company fails the configured thresholds");
            return None;
        }
        Some(Posting {
            title: title.to_string(),
            company: profile.name.clone(),
            company_profile: Some(profile.clone()),
            url,
            location: raw.location,
            is_remote: raw.is_remote,
            description: raw.description,
            requirements: None,
            posted_at: raw.posted_at,
            relevance_score: None,
            relevance_rationale: None,
            scraped_at: Utc::now(),
        })
    }
}

/// Resolve a possibly-relative listing URL against its source's base.
fn resolve_listing_url(raw: &str, base: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match Url::parse(trimmed) {
        Ok(url) => Some(url.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(base)
            .ok()
            .and_then(|b| b.join(trimmed).ok())
            .map(|u| u.to_string()),
        Err(_) => None,
    }
}

/// First occurrence wins; later postings with a seen identity key drop.
pub fn dedup_postings(postings: Vec<Posting>) -> Vec<Posting> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(postings.len());
    for posting in postings {
        if seen.insert(posting.identity_key().to_string()) {
            unique.push(posting);
        }
    }
    unique
}

/// Append postings whose identity key is absent from `existing`, then sort
/// the union by `scraped_at` descending. Existing records win on a key
/// collision; the first-scraped version of a listing is canonical.
pub fn merge_postings(new: Vec<Posting>, existing: Vec<Posting>) -> Vec<Posting> {
    let mut keys: HashSet<String> = existing
        .iter()
        .map(|p| p.identity_key().to_string())
        .collect();
    let mut merged = existing;
    for posting in new {
        if keys.insert(posting.identity_key().to_string()) {
            merged.push(posting);
        }
    }
    merged.sort_by(|a, b| b.scraped_at.cmp(&a.scraped_at));
    merged
}

/// One-shot run over a fixed adapter list: fetch, normalize, dedup, score,
/// merge with history, persist.
pub struct ScrapePipeline {
    settings: Settings,
    http: HttpFetcher,
    store: SnapshotStore,
    normalizer: Normalizer,
    adapters: Vec<Box<dyn SourceAdapter>>,
    scorer: Option<Box<dyn RelevanceScorer>>,
}

impl ScrapePipeline {
    /// Builds against the builtin company registry and the standard adapter
    /// list; both can be swapped with the `with_` builders.
    pub fn new(settings: Settings) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(settings.http_timeout_secs),
            user_agent: Some(settings.user_agent.clone()),
        })?;
        let store = SnapshotStore::new(settings.data_dir.clone());
        let normalizer = Normalizer::new(
            CompanyRegistry::builtin(),
            settings.keywords.clone(),
            settings.min_employees,
            settings.min_years_in_business,
        );
        Ok(Self {
            settings,
            http,
            store,
            normalizer,
            adapters: all_adapters(),
            scorer: None,
        })
    }

    pub fn with_registry(mut self, registry: CompanyRegistry) -> Self {
        self.normalizer = Normalizer::new(
            registry,
            self.settings.keywords.clone(),
            self.settings.min_employees,
            self.settings.min_years_in_business,
        );
        self
    }

    pub fn with_adapters(mut self, adapters: Vec<Box<dyn SourceAdapter>>) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_scorer(mut self, scorer: Box<dyn RelevanceScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Executes the whole pipeline once. Per-source and per-posting failures
    /// are recorded on the summary and never abort the run; only data-dir
    /// creation errors propagate.
    pub async fn run_once(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let run_id = run_id_for(started_at);
        let mut summary = RunSummary::new(run_id.clone(), started_at);

        info!(run_id = %run_id, sources = self.adapters.len(), "starting scrape run");
        self.store.ensure_root().await?;

        let per_source_budget = if self.adapters.is_empty() {
            0
        } else {
            self.settings.max_postings_per_run / self.adapters.len()
        };
        let query = FetchQuery {
            keywords: self.settings.keywords.clone(),
            max_results: per_source_budget,
            remote_only: self.settings.remote_only,
        };

        let mut accumulated: Vec<Posting> = Vec::new();
        for adapter in &self.adapters {
            info!(source = adapter.name(), "fetching listings");
            match adapter.fetch(&self.http, &query).await {
                Ok(raw_postings) => {
                    let before = accumulated.len();
                    accumulated.extend(
                        raw_postings
                            .into_iter()
                            .filter_map(|raw| self.normalizer.normalize(raw)),
                    );
                    info!(
                        source = adapter.name(),
                        kept = accumulated.len() - before,
                        "normalized listings"
                    );
                    summary.sources.push(adapter.name().to_string());
                }
                Err(err) => {
                    error!(source = adapter.name(), error = %err, "source failed");
                    summary
                        .errors
                        .push(format!("Error with {}: {err}", adapter.name()));
                }
            }
        }

        summary.found_count = accumulated.len();
        if accumulated.is_empty() {
            warn!("no postings found this run");
            summary.finished_at = Utc::now();
            if let Err(err) = self.store.write_run_summary(&summary).await {
                error!(error = %err, "could not write run summary");
            }
            return Ok(summary);
        }

        let mut filtered = dedup_postings(accumulated);
        if let Some(scorer) = &self.scorer {
            info!(
                backend = scorer.backend_name(),
                count = filtered.len(),
                "scoring postings"
            );
            let criteria = criteria_text(&self.settings.criteria());
            let failures = score_batch(scorer.as_ref(), &mut filtered, &criteria).await;
            summary.errors.extend(failures);
            filtered.retain(|p| p.relevance_score.unwrap_or(0.0) >= RELEVANCE_THRESHOLD);
            filtered.sort_by(|a, b| {
                b.relevance_score
                    .unwrap_or(0.0)
                    .total_cmp(&a.relevance_score.unwrap_or(0.0))
            });
        }
        summary.filtered_count = filtered.len();

        let existing = match self.load_history().await {
            Ok(existing) => existing,
            Err(err) => {
                warn!(error = %err, "history unreadable, starting fresh");
                summary
                    .errors
                    .push(format!("Error loading history: {err:#}"));
                Vec::new()
            }
        };
        let merged = merge_postings(filtered, existing);
        summary.saved_count = merged.len();

        self.write_outputs(&run_id, &merged, &mut summary).await;

        summary.finished_at = Utc::now();
        if let Err(err) = self.store.write_run_summary(&summary).await {
            error!(error = %err, "could not write run summary");
        }

        info!(
            run_id = %run_id,
            found = summary.found_count,
            filtered = summary.filtered_count,
            saved = summary.saved_count,
            "scrape run finished"
        );
        Ok(summary)
    }

    async fn load_history(&self) -> Result<Vec<Posting>> {
        match self.store.latest_snapshot_path().await? {
            Some(path) => {
                debug!(path = %path.display(), "loading prior snapshot");
                self.store.load_postings(&path).await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Best effort per format: a failed write is recorded and the remaining
    /// formats are still attempted.
    async fn write_outputs(&self, run_id: &str, merged: &[Posting], summary: &mut RunSummary) {
        for format in &self.settings.output_formats {
            let result = match format {
                OutputFormat::Json => self.store.write_json_snapshot(run_id, merged).await,
                OutputFormat::Csv => self.store.write_csv_snapshot(run_id, merged).await,
            };
            if let Err(err) = result {
                error!(format = format.as_str(), error = %err, "output write failed");
                summary
                    .errors
                    .push(format!("Error writing {} output: {err:#}", format.as_str()));
            }
        }
    }
}

/// Environment-driven entry point used by the CLI `run` command.
pub async fn run_once_from_env() -> Result<RunSummary> {
    let settings = Settings::from_env();
    let registry = match &settings.companies_file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            CompanyRegistry::from_yaml_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => CompanyRegistry::builtin(),
    };
    let scorer = select_scorer(&settings.scorer).await;
    let mut pipeline = ScrapePipeline::new(settings)?.with_registry(registry);
    if let Some(scorer) = scorer {
        pipeline = pipeline.with_scorer(scorer);
    }
    pipeline.run_once().await
}

/// Load a snapshot as loosely typed values. Reporting stays readable even
/// when the snapshot predates the current schema.
pub fn load_snapshot_values(path: &Path) -> Result<Vec<JsonValue>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing snapshot {}", path.display()))
}

/// Plain-text summary of a snapshot. Missing fields are skipped and
/// out-of-range scores clamp to the bar width; nothing here panics on
/// malformed records.
pub fn render_report(postings: &[JsonValue]) -> String {
    let rule = "=".repeat(80);
    let mut lines = vec![
        rule.clone(),
        format!("Job postings report ({} total)", postings.len()),
        rule,
    ];
    if postings.is_empty() {
        lines.push("No postings in this snapshot.".to_string());
        lines.push(String::new());
        return lines.join("\n");
    }

    let scores: Vec<f64> = postings
        .iter()
        .filter_map(|p| p.get("relevance_score").and_then(JsonValue::as_f64))
        .collect();
    if !scores.is_empty() {
        let sum: f64 = scores.iter().sum();
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        lines.push(format!(
            "Relevance: average {:.2}, range {min:.2} - {max:.2} ({} scored)",
            sum / scores.len() as f64,
            scores.len()
        ));
    }
    lines.push(String::new());

    lines.push("Top companies:".to_string());
    for (company, count) in top_counts(postings, "company", 10) {
        lines.push(format!("  {count:2} - {company}"));
    }
    lines.push(String::new());

    lines.push("Top titles:".to_string());
    for (title, count) in top_counts(postings, "title", 10) {
        lines.push(format!("  {count:2} - {}", truncate_chars(&title, 60)));
    }
    lines.push(String::new());

    let remote = postings
        .iter()
        .filter(|p| {
            p.get("is_remote")
                .and_then(JsonValue::as_bool)
                .unwrap_or(false)
        })
        .count();
    lines.push(format!(
        "Remote: {remote} of {} ({:.1}%)",
        postings.len(),
        remote as f64 * 100.0 / postings.len() as f64
    ));

    let mut ranked: Vec<(f64, &JsonValue)> = postings
        .iter()
        .filter_map(|p| {
            p.get("relevance_score")
                .and_then(JsonValue::as_f64)
                .map(|score| (score, p))
        })
        .collect();
    if !ranked.is_empty() {
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        lines.push(String::new());
        lines.push("Top postings by relevance:".to_string());
        for (rank, (score, posting)) in ranked.iter().take(15).enumerate() {
            let company = posting
                .get("company")
                .and_then(JsonValue::as_str)
                .unwrap_or("?");
            let title = posting
                .get("title")
                .and_then(JsonValue::as_str)
                .unwrap_or("untitled");
            lines.push(format!(
                "  {:2}. [{score:.2}] {} {company} - {}",
                rank + 1,
                score_bar(*score),
                truncate_chars(title, 50)
            ));
        }
    }

    lines.push(String::new());
    lines.join("\n")
}

/// Write every posting at or above `min_score` to `top_postings.json` in
/// `dir` and return how many matched. Zero matches writes nothing.
pub fn export_top_postings(postings: &[JsonValue], dir: &Path, min_score: f64) -> Result<usize> {
    let top: Vec<&JsonValue> = postings
        .iter()
        .filter(|p| {
            p.get("relevance_score")
                .and_then(JsonValue::as_f64)
                .unwrap_or(0.0)
                >= min_score
        })
        .collect();
    if top.is_empty() {
        info!(min_score, "no postings at or above the export floor");
        return Ok(0);
    }
    let path = dir.join("top_postings.json");
    let bytes = serde_json::to_vec_pretty(&top).context("serializing top postings")?;
    std::fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
    info!(count = top.len(), path = %path.display(), "exported top postings");
    Ok(top.len())
}

fn top_counts(postings: &[JsonValue], field: &str, limit: usize) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for posting in postings {
        if let Some(value) = posting.get(field).and_then(JsonValue::as_str) {
            *counts.entry(value.to_string()).or_default() += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(limit);
    ranked
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

fn score_bar(score: f64) -> String {
    let filled = ((score * 20.0) as i64).clamp(0, 20) as usize;
    let mut bar = "█".repeat(filled);
    bar.push_str(&"░".repeat(20 - filled));
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};

    fn mk_raw(source: &str, base: &str, title: &str, company: &str, url: &str) -> RawPosting {
        RawPosting {
            source: source.to_string(),
            base_url: base.to_string(),
            title: title.to_string(),
            company: company.to_string(),
            url: url.to_string(),
            location: "Remote".to_string(),
            is_remote: true,
            description: None,
            posted_at: None,
        }
    }

    fn mk_posting(url: &str, scraped_at: DateTime<Utc>) -> Posting {
        Posting {
            title: "Senior Data Engineer".into(),
            company: "Snowflake".into(),
            company_profile: None,
            url: url.into(),
            location: "Remote".into(),
            is_remote: true,
            description: None,
            requirements: None,
            posted_at: None,
            relevance_score: None,
            relevance_rationale: None,
            scraped_at,
        }
    }

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, hour, 0, 0).single().unwrap()
    }

    fn default_normalizer() -> Normalizer {
        Normalizer::new(
            CompanyRegistry::builtin(),
            vec!["data engineer".to_string()],
            200,
            5,
        )
    }

    #[test]
    fn normalizer_accepts_known_company_with_matching_title() {
        let raw = mk_raw(
            "remoteok",
            "https://remoteok.com",
            "Senior Data Engineer",
            "Snowflake",
            "https://remoteok.com/remote-jobs/1",
        );
        let posting = default_normalizer().normalize(raw).expect("posting");
        assert_eq!(posting.company, "Snowflake");
        assert_eq!(posting.url, "https://remoteok.com/remote-jobs/1");
        assert_eq!(
            posting.company_profile.as_ref().map(|p| p.name.as_str()),
            Some("Snowflake")
        );
        assert!(posting.relevance_score.is_none());
    }

    #[test]
    fn normalizer_rejects_unknown_companies() {
        let raw = mk_raw(
            "remoteok",
            "https://remoteok.com",
            "Senior Data Engineer",
            "Unknown Startup Co",
            "https://remoteok.com/remote-jobs/2",
        );
        assert!(default_normalizer().normalize(raw).is_none());
    }

    #[test]
    fn normalizer_rejects_non_matching_titles() {
        let raw = mk_raw(
            "remoteok",
            "https://remoteok.com",
            "Marketing Manager",
            "Snowflake",
            "https://remoteok.com/remote-jobs/3",
        );
        assert!(default_normalizer().normalize(raw).is_none());
    }

    #[test]
    fn normalizer_resolves_relative_urls() {
        let raw = mk_raw(
            "weworkremotely",
            "https://weworkremotely.com",
            "Data Engineer",
            "GitLab",
            "/remote-jobs/gitlab-data-engineer",
        );
        let posting = default_normalizer().normalize(raw).expect("posting");
        assert_eq!(
            posting.url,
            "https://weworkremotely.com/remote-jobs/gitlab-data-engineer"
        );
    }

    #[test]
    fn normalizer_skips_malformed_records() {
        let no_title = mk_raw(
            "remoteok",
            "https://remoteok.com",
            "   ",
            "Snowflake",
            "https://remoteok.com/remote-jobs/4",
        );
        assert!(default_normalizer().normalize(no_title).is_none());

        let no_url = mk_raw(
            "remoteok",
            "https://remoteok.com",
            "Data Engineer",
            "Snowflake",
            "",
        );
        assert!(default_normalizer().normalize(no_url).is_none());
    }

    #[test]
    fn normalizer_enforces_live_thresholds() {
        let registry = CompanyRegistry::from_yaml_str(
            "companies:\n  - name: Garage Labs\n    employee_count: 15\n    founded_year: 2024\n",
        )
        .expect("registry");
        let normalizer = Normalizer::new(registry, vec!["data engineer".to_string()], 200, 5);
        let raw = mk_raw(
            "remoteok",
            "https://remoteok.com",
            "Data Engineer",
            "Garage Labs",
            "https://remoteok.com/remote-jobs/5",
        );
        assert!(normalizer.normalize(raw).is_none());
    }

    #[test]
    fn listing_urls_resolve_against_the_source_base() {
        assert_eq!(
            resolve_listing_url("https://x.test/job/1", "https://ignored.test"),
            Some("https://x.test/job/1".to_string())
        );
        assert_eq!(
            resolve_listing_url("/job/1", "https://x.test"),
            Some("https://x.test/job/1".to_string())
        );
        assert_eq!(resolve_listing_url("", "https://x.test"), None);
        assert_eq!(resolve_listing_url("/job/1", "not a base"), None);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let first = mk_posting("https://x.test/a", at_hour(10));
        let mut shadow = mk_posting("https://x.test/a", at_hour(11));
        shadow.title = "Different Title".into();
        let other = mk_posting("https://x.test/b", at_hour(10));

        let unique = dedup_postings(vec![first.clone(), shadow, other.clone()]);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0], first);
        assert_eq!(unique[1], other);
    }

    #[test]
    fn dedup_is_idempotent() {
        let postings = vec![
            mk_posting("https://x.test/a", at_hour(10)),
            mk_posting("https://x.test/a", at_hour(11)),
            mk_posting("https://x.test/b", at_hour(12)),
        ];
        let once = dedup_postings(postings);
        let twice = dedup_postings(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_never_loses_existing_and_never_duplicates() {
        let old = mk_posting("https://x.test/a", at_hour(10));
        let mut rescraped = mk_posting("https://x.test/a", at_hour(12));
        rescraped.title = "Rescraped Variant".into();
        let fresh = mk_posting("https://x.test/b", at_hour(11));
        let fresh_again = mk_posting("https://x.test/b", at_hour(13));

        let merged = merge_postings(vec![rescraped, fresh.clone(), fresh_again], vec![old.clone()]);
        assert_eq!(merged.len(), 2);
        assert!(merged.contains(&old), "existing record survives unchanged");
        assert!(merged.contains(&fresh), "first occurrence of the new key wins");
    }

    #[test]
    fn merge_sorts_by_scrape_time_descending() {
        let merged = merge_postings(
            vec![
                mk_posting("https://x.test/b", at_hour(9)),
                mk_posting("https://x.test/c", at_hour(14)),
            ],
            vec![mk_posting("https://x.test/a", at_hour(11))],
        );
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].url, "https://x.test/c");
        assert_eq!(merged[1].url, "https://x.test/a");
        assert_eq!(merged[2].url, "https://x.test/b");
    }

    #[test]
    fn list_and_format_parsing_trim_entries() {
        assert_eq!(
            parse_list("data engineer, solutions architect ,,"),
            vec!["data engineer", "solutions architect"]
        );
        assert_eq!(
            parse_output_formats("json, csv"),
            vec![OutputFormat::Json, OutputFormat::Csv]
        );
        assert_eq!(parse_output_formats("csv,bogus"), vec![OutputFormat::Csv]);
    }

    #[test]
    fn settings_map_into_criteria() {
        let settings = Settings::default();
        let criteria = settings.criteria();
        assert_eq!(criteria.target_roles, settings.keywords);
        assert!(criteria.remote_only);
        assert_eq!(criteria.min_employees, 200);
        assert_eq!(criteria.min_years_in_business, 5);
    }

    #[test]
    fn report_renders_empty_snapshot() {
        let text = render_report(&[]);
        assert!(text.contains("0 total"));
        assert!(text.contains("No postings in this snapshot."));
    }

    #[test]
    fn report_tolerates_missing_fields_and_wild_scores() {
        let values = vec![
            serde_json::json!({
                "title": "Data Engineer",
                "company": "Snowflake",
                "relevance_score": 7.5
            }),
            serde_json::json!({"company": "Snowflake", "is_remote": true}),
            serde_json::json!({}),
        ];
        let text = render_report(&values);
        assert!(text.contains("3 total"));
        assert!(text.contains("2 - Snowflake"));
        assert!(text.contains("Remote: 1 of 3"));
        assert!(text.contains("[7.50]"));
    }

    #[test]
    fn bars_clamp_out_of_range_scores() {
        assert_eq!(score_bar(0.0), "░".repeat(20));
        assert_eq!(score_bar(1.0), "█".repeat(20));
        assert_eq!(score_bar(2.5), "█".repeat(20));
        assert_eq!(score_bar(-1.0), "░".repeat(20));
        assert_eq!(score_bar(0.5).chars().filter(|c| *c == '█').count(), 10);
    }

    #[test]
    fn export_writes_only_at_or_above_floor() {
        let dir = tempfile::tempdir().expect("tempdir");
        let values = vec![
            serde_json::json!({"title": "Keeper", "relevance_score": 0.9}),
            serde_json::json!({"title": "Low", "relevance_score": 0.4}),
            serde_json::json!({"title": "Unscored"}),
        ];

        let count = export_top_postings(&values, dir.path(), DEFAULT_EXPORT_MIN_SCORE)
            .expect("export");
        assert_eq!(count, 1);
        let written =
            std::fs::read_to_string(dir.path().join("top_postings.json")).expect("export file");
        assert!(written.contains("Keeper"));
        assert!(!written.contains("Low"));

        let none = export_top_postings(&values, dir.path(), 0.95).expect("export");
        assert_eq!(none, 0);
    }
}
