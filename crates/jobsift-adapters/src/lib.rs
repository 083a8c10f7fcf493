//! Source adapter contract + job-board adapter implementations.
//!
//! Adapters only fetch and parse: they emit `RawPosting` records without
//! applying the company allow-list or keyword gates, which live in the
//! normalizer. The one exception is the careers-page adapter, whose boards
//! mix onsite and remote listings and which therefore honors the
//! `remote_only` flag itself; the other three sources are remote-native.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobsift_core::RawPosting;
use jobsift_storage::{FetchError, HttpFetcher};
use scraper::{ElementRef, Html, Selector};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "jobsift-adapters";

const REMOTEOK_BASE: &str = "https://remoteok.com";
const WWR_BASE: &str = "https://weworkremotely.com";
const REMOTIVE_BASE: &str = "https://remotive.com";
const GREENHOUSE_BASE: &str = "https://boards.greenhouse.io";
const LEVER_BASE: &str = "https://jobs.lever.co";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Per-run query handed to every adapter. `keywords` is part of the source
/// contract even though these boards have no server-side search; the keyword
/// gate itself is applied downstream.
#[derive(Debug, Clone)]
pub struct FetchQuery {
    pub keywords: Vec<String>,
    pub max_results: usize,
    pub remote_only: bool,
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &'static str;
    fn base_url(&self) -> &'static str;

    /// All-or-nothing per run: an `Err` discards partial results and is
    /// recorded as one failure against this source.
    async fn fetch(
        &self,
        http: &HttpFetcher,
        query: &FetchQuery,
    ) -> Result<Vec<RawPosting>, AdapterError>;
}

/// The fixed, ordered source list for a run.
pub fn all_adapters() -> Vec<Box<dyn SourceAdapter>> {
    vec![
        Box::new(RemoteOkAdapter),
        Box::new(WeWorkRemotelyAdapter),
        Box::new(RemotiveAdapter),
        Box::new(CompanyCareersPageAdapter::default()),
    ]
}

fn parse_selector(selector: &str) -> Result<Selector, AdapterError> {
    Selector::parse(selector).map_err(|e| AdapterError::Message(e.to_string()))
}

fn text_or_none(value: String) -> Option<String> {
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn element_first_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|n| text_or_none(n.text().collect::<String>()))
}

fn element_first_attr(element: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|n| n.value().attr(attr))
        .and_then(|s| text_or_none(s.to_string()))
}

fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    cur.as_str()
}

/// Like `json_str` but tolerates numeric scalars (RemoteOK listing ids have
/// shipped as both).
fn json_scalar_string(value: &JsonValue, path: &[&str]) -> Option<String> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    match cur {
        JsonValue::String(s) => text_or_none(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_listing_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// RemoteOK's public JSON API. No key required; the first array element is
/// API metadata, not a listing.
#[derive(Debug, Clone, Copy)]
pub struct RemoteOkAdapter;

#[async_trait]
impl SourceAdapter for RemoteOkAdapter {
    fn name(&self) -> &'static str {
        "RemoteOK"
    }

    fn base_url(&self) -> &'static str {
        REMOTEOK_BASE
    }

    async fn fetch(
        &self,
        http: &HttpFetcher,
        query: &FetchQuery,
    ) -> Result<Vec<RawPosting>, AdapterError> {
        let api_url = format!("{REMOTEOK_BASE}/api");
        let page = http.fetch_bytes(self.name(), &api_url).await?;
        let postings = parse_remoteok_listings(&page.text(), query.max_results)?;
        info!(source = self.name(), count = postings.len(), "fetched listings");
        Ok(postings)
    }
}

fn parse_remoteok_listings(body: &str, max_results: usize) -> Result<Vec<RawPosting>, AdapterError> {
    let data: JsonValue = serde_json::from_str(body)
        .map_err(|e| AdapterError::Message(format!("invalid RemoteOK payload: {e}")))?;
    let items = data
        .as_array()
        .ok_or_else(|| AdapterError::Message("RemoteOK payload is not an array".into()))?;

    let mut postings = Vec::new();
    for item in items.iter().skip(1) {
        if postings.len() >= max_results {
            break;
        }
        let Some(id) = json_scalar_string(item, &["id"]) else {
            warn!(source = "RemoteOK", "listing without id skipped");
            continue;
        };
        postings.push(RawPosting {
            source: "RemoteOK".to_string(),
            base_url: REMOTEOK_BASE.to_string(),
            title: json_str(item, &["position"]).unwrap_or_default().to_string(),
            company: json_str(item, &["company"]).unwrap_or_default().to_string(),
            url: format!("{REMOTEOK_BASE}/remote-jobs/{id}"),
            location: json_str(item, &["location"])
                .map(ToString::to_string)
                .unwrap_or_else(|| "Remote".to_string()),
            is_remote: true,
            description: json_str(item, &["description"]).and_then(|s| text_or_none(s.to_string())),
            posted_at: json_str(item, &["date"]).and_then(parse_listing_date),
        });
    }
    Ok(postings)
}

/// We Work Remotely's programming category page (HTML).
#[derive(Debug, Clone, Copy)]
pub struct WeWorkRemotelyAdapter;

#[async_trait]
impl SourceAdapter for WeWorkRemotelyAdapter {
    fn name(&self) -> &'static str {
        "WeWorkRemotely"
    }

    fn base_url(&self) -> &'static str {
        WWR_BASE
    }

    async fn fetch(
        &self,
        http: &HttpFetcher,
        query: &FetchQuery,
    ) -> Result<Vec<RawPosting>, AdapterError> {
        let url = format!("{WWR_BASE}/categories/remote-programming-jobs");
        let page = http.fetch_bytes(self.name(), &url).await?;
        let postings = parse_wwr_listings(&page.text(), query.max_results)?;
        info!(source = self.name(), count = postings.len(), "fetched listings");
        Ok(postings)
    }
}

fn parse_wwr_listings(html: &str, max_results: usize) -> Result<Vec<RawPosting>, AdapterError> {
    let document = Html::parse_document(html);
    let row_sel = parse_selector("li.feature")?;
    let title_sel = parse_selector("span.title")?;
    let company_sel = parse_selector("span.company")?;
    let link_sel = parse_selector("a[href]")?;

    let mut postings = Vec::new();
    for row in document.select(&row_sel) {
        if postings.len() >= max_results {
            break;
        }
        let (Some(title), Some(company), Some(href)) = (
            element_first_text(row, &title_sel),
            element_first_text(row, &company_sel),
            element_first_attr(row, &link_sel, "href"),
        ) else {
            warn!(source = "WeWorkRemotely", "incomplete listing row skipped");
            continue;
        };
        postings.push(RawPosting {
            source: "WeWorkRemotely".to_string(),
            base_url: WWR_BASE.to_string(),
            title,
            company,
            // Site-relative link; resolved against base_url downstream.
            url: href,
            location: "Remote".to_string(),
            is_remote: true,
            description: None,
            posted_at: None,
        });
    }
    Ok(postings)
}

/// Remotive's software-dev listings page (HTML).
#[derive(Debug, Clone, Copy)]
pub struct RemotiveAdapter;

#[async_trait]
impl SourceAdapter for RemotiveAdapter {
    fn name(&self) -> &'static str {
        "Remotive"
    }

    fn base_url(&self) -> &'static str {
        REMOTIVE_BASE
    }

    async fn fetch(
        &self,
        http: &HttpFetcher,
        query: &FetchQuery,
    ) -> Result<Vec<RawPosting>, AdapterError> {
        let url = format!("{REMOTIVE_BASE}/remote-jobs/software-dev");
        let page = http.fetch_bytes(self.name(), &url).await?;
        let postings = parse_remotive_listings(&page.text(), query.max_results)?;
        info!(source = self.name(), count = postings.len(), "fetched listings");
        Ok(postings)
    }
}

fn parse_remotive_listings(html: &str, max_results: usize) -> Result<Vec<RawPosting>, AdapterError> {
    let document = Html::parse_document(html);
    let row_sel = parse_selector("li.job-tile")?;
    let title_sel = parse_selector("a.job-tile-title")?;
    let company_sel = parse_selector("span.company")?;

    let mut postings = Vec::new();
    for row in document.select(&row_sel) {
        if postings.len() >= max_results {
            break;
        }
        let Some(link) = row.select(&title_sel).next() else {
            warn!(source = "Remotive", "listing row without title link skipped");
            continue;
        };
        let (Some(title), Some(href), Some(company)) = (
            text_or_none(link.text().collect::<String>()),
            link.value().attr("href").and_then(|s| text_or_none(s.to_string())),
            element_first_text(row, &company_sel),
        ) else {
            warn!(source = "Remotive", "incomplete listing row skipped");
            continue;
        };
        postings.push(RawPosting {
            source: "Remotive".to_string(),
            base_url: REMOTIVE_BASE.to_string(),
            title,
            company,
            url: href,
            location: "Remote".to_string(),
            is_remote: true,
            description: None,
            posted_at: None,
        });
    }
    Ok(postings)
}

/// Direct Greenhouse and Lever boards for a fixed company list. Board pages
/// mix onsite and remote roles, so this adapter applies the `remote_only`
/// gate itself. A single board failing to fetch or parse is logged and
/// skipped rather than failing the whole source.
#[derive(Debug, Clone)]
pub struct CompanyCareersPageAdapter {
    greenhouse_companies: Vec<&'static str>,
    lever_companies: Vec<&'static str>,
}

impl Default for CompanyCareersPageAdapter {
    fn default() -> Self {
        Self {
            greenhouse_companies: vec![
                "Databricks",
                "Snowflake",
                "GitLab",
                "Stripe",
                "Coinbase",
                "Spotify",
                "Airbnb",
                "DoorDash",
                "Robinhood",
            ],
            lever_companies: vec!["Netflix", "Canva", "Figma", "Discord", "Notion"],
        }
    }
}

#[async_trait]
impl SourceAdapter for CompanyCareersPageAdapter {
    fn name(&self) -> &'static str {
        "CompanyCareersPage"
    }

    fn base_url(&self) -> &'static str {
        GREENHOUSE_BASE
    }

    async fn fetch(
        &self,
        http: &HttpFetcher,
        query: &FetchQuery,
    ) -> Result<Vec<RawPosting>, AdapterError> {
        let per_board = query.max_results / 10;
        let mut postings = Vec::new();

        for company in &self.greenhouse_companies {
            if postings.len() >= query.max_results {
                break;
            }
            let url = format!("{GREENHOUSE_BASE}/{}", company_slug(company));
            match http.fetch_bytes(self.name(), &url).await {
                Ok(page) => match parse_greenhouse_board(
                    company,
                    &page.text(),
                    per_board,
                    query.remote_only,
                ) {
                    Ok(mut board) => postings.append(&mut board),
                    Err(err) => {
                        warn!(source = self.name(), company, error = %err, "board parse failed")
                    }
                },
                Err(err) => {
                    warn!(source = self.name(), company, error = %err, "board fetch failed")
                }
            }
        }

        for company in &self.lever_companies {
            if postings.len() >= query.max_results {
                break;
            }
            let url = format!("{LEVER_BASE}/{}", company_slug(company));
            match http.fetch_bytes(self.name(), &url).await {
                Ok(page) => {
                    match parse_lever_board(company, &page.text(), per_board, query.remote_only) {
                        Ok(mut board) => postings.append(&mut board),
                        Err(err) => {
                            warn!(source = self.name(), company, error = %err, "board parse failed")
                        }
                    }
                }
                Err(err) => {
                    warn!(source = self.name(), company, error = %err, "board fetch failed")
                }
            }
        }

        postings.truncate(query.max_results);
        info!(source = self.name(), count = postings.len(), "fetched listings");
        Ok(postings)
    }
}

fn company_slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

fn parse_greenhouse_board(
    company: &str,
    html: &str,
    max_results: usize,
    remote_only: bool,
) -> Result<Vec<RawPosting>, AdapterError> {
    let document = Html::parse_document(html);
    let row_sel = parse_selector("div.opening")?;
    let link_sel = parse_selector("a")?;
    let location_sel = parse_selector("span.location")?;

    let mut postings = Vec::new();
    for row in document.select(&row_sel).take(max_results) {
        let Some(link) = row.select(&link_sel).next() else {
            continue;
        };
        let (Some(title), Some(href)) = (
            text_or_none(link.text().collect::<String>()),
            link.value().attr("href").and_then(|s| text_or_none(s.to_string())),
        ) else {
            continue;
        };
        let location =
            element_first_text(row, &location_sel).unwrap_or_else(|| "Unknown".to_string());
        let is_remote = location.to_lowercase().contains("remote");
        if remote_only && !is_remote {
            continue;
        }
        postings.push(RawPosting {
            source: "CompanyCareersPage".to_string(),
            base_url: GREENHOUSE_BASE.to_string(),
            title,
            company: company.to_string(),
            url: href,
            location,
            is_remote,
            description: None,
            posted_at: None,
        });
    }
    Ok(postings)
}

fn parse_lever_board(
    company: &str,
    html: &str,
    max_results: usize,
    remote_only: bool,
) -> Result<Vec<RawPosting>, AdapterError> {
    let document = Html::parse_document(html);
    let row_sel = parse_selector("div.posting")?;
    let title_sel = parse_selector("h5")?;
    let link_sel = parse_selector("a.posting-title")?;
    let location_sel = parse_selector("span.location")?;

    let mut postings = Vec::new();
    for row in document.select(&row_sel).take(max_results) {
        let (Some(title), Some(href)) = (
            element_first_text(row, &title_sel),
            element_first_attr(row, &link_sel, "href"),
        ) else {
            continue;
        };
        let location =
            element_first_text(row, &location_sel).unwrap_or_else(|| "Unknown".to_string());
        let is_remote = location.to_lowercase().contains("remote");
        if remote_only && !is_remote {
            continue;
        }
        postings.push(RawPosting {
            source: "CompanyCareersPage".to_string(),
            base_url: LEVER_BASE.to_string(),
            title,
            company: company.to_string(),
            url: href,
            location,
            is_remote,
            description: None,
            posted_at: None,
        });
    }
    Ok(postings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REMOTEOK_FIXTURE: &str = r#"[
        {"legal": "API terms of service apply"},
        {
            "id": 101,
            "position": "Senior Data Engineer",
            "company": "Snowflake",
            "location": "Worldwide",
            "description": "Build the data cloud",
            "date": "2026-08-20T12:00:00+00:00"
        },
        {
            "position": "No Id Role",
            "company": "Stripe"
        },
        {
            "id": "abc202",
            "position": "Software Engineer",
            "company": "GitLab"
        }
    ]"#;

    const WWR_FIXTURE: &str = r#"
        <ul>
          <li class="feature">
            <a href="/remote-jobs/snowflake-senior-data-engineer">
              <span class="company">Snowflake</span>
              <span class="title">Senior Data Engineer</span>
            </a>
          </li>
          <li class="feature">
            <a href="/remote-jobs/no-company-listing">
              <span class="title">Orphan Listing</span>
            </a>
          </li>
          <li class="feature">
            <a href="/remote-jobs/gitlab-backend-engineer">
              <span class="company">GitLab</span>
              <span class="title">Backend Engineer</span>
            </a>
          </li>
        </ul>
    "#;

    const REMOTIVE_FIXTURE: &str = r#"
        <ul>
          <li class="job-tile">
            <a class="job-tile-title" href="/remote-jobs/software-dev/data-engineer-1">Data Engineer</a>
            <span class="company">Databricks</span>
          </li>
          <li class="job-tile">
            <a class="job-tile-title" href="https://remotive.com/remote-jobs/software-dev/platform-2">Platform Engineer</a>
            <span class="company">Stripe</span>
          </li>
          <li class="job-tile">
            <span class="company">Broken Row Inc</span>
          </li>
        </ul>
    "#;

    const GREENHOUSE_FIXTURE: &str = r#"
        <section>
          <div class="opening">
            <a href="/snowflake/jobs/1">Senior Data Engineer</a>
            <span class="location">Remote - US</span>
          </div>
          <div class="opening">
            <a href="/snowflake/jobs/2">Solutions Architect</a>
            <span class="location">San Mateo, CA</span>
          </div>
          <div class="opening">
            <a href="/snowflake/jobs/3">Data Platform Engineer</a>
          </div>
        </section>
    "#;

    const LEVER_FIXTURE: &str = r#"
        <div>
          <div class="posting">
            <a class="posting-title" href="https://jobs.lever.co/netflix/abc">
              <h5>Senior Software Engineer</h5>
            </a>
            <span class="location">Remote, United States</span>
          </div>
          <div class="posting">
            <a class="posting-title" href="https://jobs.lever.co/netflix/def">
              <h5>Engineering Manager</h5>
            </a>
            <span class="location">Los Gatos, CA</span>
          </div>
          <div class="posting">
            <span class="location">Remote</span>
          </div>
        </div>
    "#;

    #[test]
    fn remoteok_skips_metadata_and_idless_listings() {
        let postings = parse_remoteok_listings(REMOTEOK_FIXTURE, 50).expect("postings");
        assert_eq!(postings.len(), 2);

        let first = &postings[0];
        assert_eq!(first.title, "Senior Data Engineer");
        assert_eq!(first.company, "Snowflake");
        assert_eq!(first.url, "https://remoteok.com/remote-jobs/101");
        assert_eq!(first.location, "Worldwide");
        assert!(first.is_remote);
        assert_eq!(first.description.as_deref(), Some("Build the data cloud"));
        assert!(first.posted_at.is_some());

        let second = &postings[1];
        assert_eq!(second.url, "https://remoteok.com/remote-jobs/abc202");
        assert_eq!(second.location, "Remote");
        assert!(second.posted_at.is_none());
    }

    #[test]
    fn remoteok_respects_the_result_budget() {
        let postings = parse_remoteok_listings(REMOTEOK_FIXTURE, 1).expect("postings");
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].company, "Snowflake");
    }

    #[test]
    fn remoteok_rejects_non_array_payloads() {
        assert!(parse_remoteok_listings(r#"{"error": "rate limited"}"#, 10).is_err());
        assert!(parse_remoteok_listings("<html>block page</html>", 10).is_err());
    }

    #[test]
    fn wwr_parses_rows_and_keeps_relative_links() {
        let postings = parse_wwr_listings(WWR_FIXTURE, 50).expect("postings");
        assert_eq!(postings.len(), 2);
        assert_eq!(postings[0].title, "Senior Data Engineer");
        assert_eq!(postings[0].company, "Snowflake");
        assert_eq!(postings[0].url, "/remote-jobs/snowflake-senior-data-engineer");
        assert_eq!(postings[0].base_url, "https://weworkremotely.com");
        assert_eq!(postings[0].location, "Remote");
        assert_eq!(postings[1].company, "GitLab");
    }

    #[test]
    fn remotive_accepts_absolute_and_relative_links() {
        let postings = parse_remotive_listings(REMOTIVE_FIXTURE, 50).expect("postings");
        assert_eq!(postings.len(), 2);
        assert_eq!(postings[0].url, "/remote-jobs/software-dev/data-engineer-1");
        assert_eq!(
            postings[1].url,
            "https://remotive.com/remote-jobs/software-dev/platform-2"
        );
        assert_eq!(postings[1].company, "Stripe");
    }

    #[test]
    fn greenhouse_board_parses_locations_and_remote_flags() {
        let postings =
            parse_greenhouse_board("Snowflake", GREENHOUSE_FIXTURE, 10, false).expect("postings");
        assert_eq!(postings.len(), 3);
        assert_eq!(postings[0].company, "Snowflake");
        assert_eq!(postings[0].url, "/snowflake/jobs/1");
        assert!(postings[0].is_remote);
        assert!(!postings[1].is_remote);
        assert_eq!(postings[2].location, "Unknown");
        assert!(!postings[2].is_remote);
    }

    #[test]
    fn greenhouse_board_drops_onsite_when_remote_only() {
        let postings =
            parse_greenhouse_board("Snowflake", GREENHOUSE_FIXTURE, 10, true).expect("postings");
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].title, "Senior Data Engineer");
    }

    #[test]
    fn lever_board_parses_title_and_link() {
        let postings = parse_lever_board("Netflix", LEVER_FIXTURE, 10, false).expect("postings");
        assert_eq!(postings.len(), 2);
        assert_eq!(postings[0].title, "Senior Software Engineer");
        assert_eq!(postings[0].url, "https://jobs.lever.co/netflix/abc");
        assert!(postings[0].is_remote);
        assert_eq!(postings[1].location, "Los Gatos, CA");

        let remote_only = parse_lever_board("Netflix", LEVER_FIXTURE, 10, true).expect("postings");
        assert_eq!(remote_only.len(), 1);
    }

    #[test]
    fn board_budget_slices_rows_before_filtering() {
        let postings =
            parse_greenhouse_board("Snowflake", GREENHOUSE_FIXTURE, 1, false).expect("postings");
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].title, "Senior Data Engineer");
    }

    #[test]
    fn company_slugs_are_lowercase_hyphenated() {
        assert_eq!(company_slug("GitLab"), "gitlab");
        assert_eq!(company_slug("Scale AI"), "scale-ai");
        assert_eq!(company_slug("Palo Alto Networks"), "palo-alto-networks");
    }

    #[test]
    fn adapter_registry_is_fixed_and_ordered() {
        let adapters = all_adapters();
        let names: Vec<&str> = adapters.iter().map(|a| a.name()).collect();
        assert_eq!(
            names,
            vec!["RemoteOK", "WeWorkRemotely", "Remotive", "CompanyCareersPage"]
        );
    }
}
