//! Relevance scoring backends over OpenAI-compatible and Ollama chat APIs.
//!
//! One backend is selected per run by static priority (Groq, then a local
//! Ollama instance, then any OpenAI-compatible endpoint); there is no
//! per-posting fallback across backends. A posting whose scoring call fails
//! stays in the batch with a zero score and an explanatory rationale.

use std::time::Duration;

use async_trait::async_trait;
use jobsift_core::Posting;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const CRATE_NAME: &str = "jobsift-score";

pub const GROQ_OPENAI_BASE_URL: &str = "https://api.groq.com/openai/v1";

const SYSTEM_PROMPT: &str = "You are a job matching assistant. Respond only with JSON.";
const CHAT_TEMPERATURE: f64 = 0.3;
const DESCRIPTION_PROMPT_LIMIT: usize = 500;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("api error: {0}")]
    Api(String),
    #[error("parse error: {0}")]
    Parse(String),
}

/// Scorer verdict for one posting. `score` is whatever the backend returned;
/// the reporting side tolerates out-of-range values rather than this crate
/// clamping them.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub score: f64,
    pub rationale: String,
}

/// Search criteria rendered into the scoring prompt.
#[derive(Debug, Clone)]
pub struct CriteriaSpec {
    pub target_roles: Vec<String>,
    pub remote_only: bool,
    pub min_employees: u32,
    pub min_years_in_business: u32,
    pub prefer_public: bool,
}

/// Backend endpoints and credentials; populated from the environment by the
/// pipeline settings layer.
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    pub groq_api_key: Option<String>,
    pub groq_model: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub timeout: Duration,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            groq_api_key: None,
            groq_model: "llama-3.1-8b-instant".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            ollama_model: "llama2".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-3.5-turbo".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn assess(&self, posting: &Posting, criteria: &str) -> Result<Assessment, ScoreError>;
}

pub fn criteria_text(criteria: &CriteriaSpec) -> String {
    let remote = if criteria.remote_only {
        "Required"
    } else {
        "Preferred"
    };
    let company_type = if criteria.prefer_public {
        "Prefer public companies"
    } else {
        "Public or private"
    };
    format!(
        "Job Search Criteria:\n\
         - Target Roles: {}\n\
         - Remote Work: {}\n\
         - Company Size: Minimum {} employees\n\
         - Company Age: Minimum {} years in business\n\
         - Company Type: {}\n",
        criteria.target_roles.join(", "),
        remote,
        criteria.min_employees,
        criteria.min_years_in_business,
        company_type,
    )
}

fn build_prompt(posting: &Posting, criteria: &str) -> String {
    let description = posting
        .description
        .as_deref()
        .map(|d| d.chars().take(DESCRIPTION_PROMPT_LIMIT).collect::<String>())
        .unwrap_or_else(|| "N/A".to_string());
    format!(
        "Analyze this job posting and rate its relevance for the candidate.\n\n\
         User's Criteria:\n{criteria}\n\n\
         Job Details:\n\
         - Title: {}\n\
         - Company: {}\n\
         - Location: {}\n\
         - Remote: {}\n\
         - Description: {}\n\n\
         Provide a relevance score from 0.0 to 1.0 and a brief explanation.\n\
         Respond in JSON: {{\"score\": 0.0-1.0, \"analysis\": \"explanation\"}}\n",
        posting.title, posting.company, posting.location, posting.is_remote, description,
    )
}

fn default_analysis() -> String {
    "No analysis provided".to_string()
}

#[derive(Debug, Deserialize)]
struct RawAssessment {
    #[serde(default)]
    score: f64,
    #[serde(default = "default_analysis")]
    analysis: String,
}

fn parse_assessment(content: &str) -> Result<Assessment, ScoreError> {
    let raw: RawAssessment = serde_json::from_str(content)
        .map_err(|e| ScoreError::Parse(format!("malformed assessment json: {e}")))?;
    Ok(Assessment {
        score: raw.score,
        rationale: raw.analysis,
    })
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ScoreError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ScoreError::Config(format!("building http client: {e}")))
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Scorer over any `/chat/completions` endpoint with Bearer auth. Groq and
/// OpenAI proper differ only in base URL, key, and model.
#[derive(Debug)]
pub struct ChatCompletionScorer {
    client: reqwest::Client,
    backend: &'static str,
    api_key: String,
    base_url: String,
    model: String,
}

impl ChatCompletionScorer {
    pub fn new(
        backend: &'static str,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ScoreError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            backend,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    pub fn groq(config: &ScorerConfig) -> Result<Self, ScoreError> {
        let api_key = config
            .groq_api_key
            .as_deref()
            .ok_or_else(|| ScoreError::Config("GROQ_API_KEY not set".into()))?;
        Self::new(
            "groq",
            api_key,
            GROQ_OPENAI_BASE_URL,
            config.groq_model.clone(),
            config.timeout,
        )
    }

    pub fn openai(config: &ScorerConfig) -> Result<Self, ScoreError> {
        let api_key = config
            .openai_api_key
            .as_deref()
            .ok_or_else(|| ScoreError::Config("OPENAI_API_KEY not set".into()))?;
        Self::new(
            "openai",
            api_key,
            config.openai_base_url.clone(),
            config.openai_model.clone(),
            config.timeout,
        )
    }
}

#[async_trait]
impl RelevanceScorer for ChatCompletionScorer {
    fn backend_name(&self) -> &'static str {
        self.backend
    }

    async fn assess(&self, posting: &Posting, criteria: &str) -> Result<Assessment, ScoreError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(posting, criteria),
                },
            ],
            response_format: ResponseFormat { kind: "json_object" },
            temperature: CHAT_TEMPERATURE,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(backend = self.backend, error = %e, "chat completion request failed");
                ScoreError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(backend = self.backend, status = %status, error = %error_text, "chat completion api error");
            return Err(ScoreError::Api(format!(
                "{} api error: {}",
                self.backend, error_text
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ScoreError::Parse(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ScoreError::Api(format!("no choices from {}", self.backend)))?;

        debug!(backend = self.backend, model = %self.model, url = %posting.url, "scored posting");
        parse_assessment(&content)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    format: &'static str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Scorer against a local Ollama server (`/api/generate` with JSON output).
pub struct OllamaScorer {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaScorer {
    /// Probes `GET {base}/api/tags` so that an absent server fails
    /// initialization here and backend selection moves on.
    pub async fn connect(config: &ScorerConfig) -> Result<Self, ScoreError> {
        let client = build_http_client(config.timeout)?;
        let probe_url = format!("{}/api/tags", config.ollama_base_url);
        let response = client
            .get(&probe_url)
            .send()
            .await
            .map_err(|e| ScoreError::Network(format!("ollama unreachable at {probe_url}: {e}")))?;
        if !response.status().is_success() {
            return Err(ScoreError::Api(format!(
                "ollama probe {} returned status {}",
                probe_url,
                response.status()
            )));
        }
        Ok(Self {
            client,
            base_url: config.ollama_base_url.clone(),
            model: config.ollama_model.clone(),
        })
    }
}

#[async_trait]
impl RelevanceScorer for OllamaScorer {
    fn backend_name(&self) -> &'static str {
        "ollama"
    }

    async fn assess(&self, posting: &Posting, criteria: &str) -> Result<Assessment, ScoreError> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: build_prompt(posting, criteria),
            format: "json",
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "ollama request failed");
                ScoreError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "ollama api error");
            return Err(ScoreError::Api(format!("ollama api error: {error_text}")));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ScoreError::Parse(e.to_string()))?;

        debug!(model = %self.model, url = %posting.url, "scored posting");
        parse_assessment(&parsed.response)
    }
}

/// First backend that initializes wins for the whole run. `None` means the
/// run proceeds unscored.
pub async fn select_scorer(config: &ScorerConfig) -> Option<Box<dyn RelevanceScorer>> {
    if config.groq_api_key.is_some() {
        match ChatCompletionScorer::groq(config) {
            Ok(scorer) => {
                info!(model = %config.groq_model, "using groq scorer");
                return Some(Box::new(scorer));
            }
            Err(err) => warn!(error = %err, "could not initialize groq scorer"),
        }
    }

    match OllamaScorer::connect(config).await {
        Ok(scorer) => {
            info!(model = %config.ollama_model, "using ollama scorer");
            return Some(Box::new(scorer));
        }
        Err(err) => warn!(error = %err, "could not initialize ollama scorer"),
    }

    if config.openai_api_key.is_some() {
        match ChatCompletionScorer::openai(config) {
            Ok(scorer) => {
                info!(model = %config.openai_model, "using openai scorer");
                return Some(Box::new(scorer));
            }
            Err(err) => warn!(error = %err, "could not initialize openai scorer"),
        }
    }

    error!("no relevance scorer available; configure Groq, Ollama, or OpenAI");
    None
}

/// Sequential scoring of a batch. Failures never remove a posting: the
/// posting keeps a 0.0 score and a rationale naming the cause. Returns one
/// message per failed attempt for the caller's run audit.
pub async fn score_batch(
    scorer: &dyn RelevanceScorer,
    postings: &mut [Posting],
    criteria: &str,
) -> Vec<String> {
    let mut failures = Vec::new();
    for posting in postings.iter_mut() {
        match scorer.assess(posting, criteria).await {
            Ok(assessment) => {
                posting.relevance_score = Some(assessment.score);
                posting.relevance_rationale = Some(assessment.rationale);
            }
            Err(err) => {
                error!(url = %posting.url, error = %err, "scoring failed");
                failures.push(format!("Error scoring {}: {err}", posting.url));
                posting.relevance_score = Some(0.0);
                posting.relevance_rationale = Some(format!("analysis failed: {err}"));
            }
        }
    }
    failures
}
