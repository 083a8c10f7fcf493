//! Core domain model and company registry for jobsift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "jobsift-core";

/// Raw listing handoff contract from source adapters into the sync pipeline.
///
/// `url` may be relative; `base_url` is the adapter's site root it resolves
/// against during normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPosting {
    pub source: String,
    pub base_url: String,
    pub title: String,
    pub company: String,
    pub url: String,
    pub location: String,
    pub is_remote: bool,
    pub description: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

/// Canonical normalized job listing, the unit flowing through the pipeline.
///
/// `url` is the resolved absolute listing URL and doubles as the identity
/// key: it is assigned exactly once at normalization and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub title: String,
    pub company: String,
    pub company_profile: Option<CompanyProfile>,
    pub url: String,
    pub location: String,
    pub is_remote: bool,
    pub description: Option<String>,
    pub requirements: Option<Vec<String>>,
    pub posted_at: Option<DateTime<Utc>>,
    pub relevance_score: Option<f64>,
    pub relevance_rationale: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

impl Posting {
    /// Two postings denote the same listing iff their identity keys match.
    pub fn identity_key(&self) -> &str {
        &self.url
    }
}

/// Registry snapshot attached to accepted postings; immutable once attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: String,
    #[serde(default)]
    pub employee_count: Option<u32>,
    #[serde(default)]
    pub founded_year: Option<i32>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub industry: Option<String>,
}

impl CompanyProfile {
    /// Threshold check against minimum headcount and years in business.
    /// Absent fields pass; only a populated field can fail a threshold.
    pub fn meets_criteria(
        &self,
        min_employees: u32,
        min_years_in_business: u32,
        as_of_year: i32,
    ) -> bool {
        if let Some(count) = self.employee_count {
            if count < min_employees {
                return false;
            }
        }
        if let Some(founded) = self.founded_year {
            if as_of_year - founded < min_years_in_business as i32 {
                return false;
            }
        }
        true
    }
}

/// Immutable allow-list of established companies, keyed case-insensitively
/// by name.
#[derive(Debug, Clone, Deserialize)]
pub struct CompanyRegistry {
    companies: Vec<CompanyProfile>,
}

impl CompanyRegistry {
    pub fn new(companies: Vec<CompanyProfile>) -> Self {
        Self { companies }
    }

    /// The curated built-in table of established tech companies
    /// (200+ employees, 5+ years in business).
    pub fn builtin() -> Self {
        Self::new(
            BUILTIN_COMPANIES
                .iter()
                .map(|&(name, employee_count, founded_year, is_public, industry)| {
                    CompanyProfile {
                        name: name.to_string(),
                        employee_count: Some(employee_count),
                        founded_year: Some(founded_year),
                        is_public,
                        industry: Some(industry.to_string()),
                    }
                })
                .collect(),
        )
    }

    /// Parse an override table from YAML (`companies:` list of profiles).
    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn lookup(&self, name: &str) -> Option<&CompanyProfile> {
        self.companies
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.companies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }

    pub fn profiles(&self) -> &[CompanyProfile] {
        &self.companies
    }
}

/// True when any keyword occurs as a case-insensitive substring of the title.
pub fn title_matches_keywords(title: &str, keywords: &[String]) -> bool {
    let title_lower = title.to_lowercase();
    keywords
        .iter()
        .any(|keyword| title_lower.contains(&keyword.to_lowercase()))
}

/// Audit record of one pipeline execution, persisted once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub found_count: usize,
    pub filtered_count: usize,
    pub saved_count: usize,
    pub sources: Vec<String>,
    pub errors: Vec<String>,
}

impl RunSummary {
    pub fn new(run_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at,
            finished_at: started_at,
            found_count: 0,
            filtered_count: 0,
            saved_count: 0,
            sources: Vec::new(),
            errors: Vec::new(),
        }
    }
}

// name, employee_count, founded_year, is_public, industry
const BUILTIN_COMPANIES: &[(&str, u32, i32, bool, &str)] = &[
    // Major tech
    ("Microsoft", 221_000, 1975, true, "Software"),
    ("Amazon", 1_540_000, 1994, true, "E-commerce/Cloud"),
    ("Google", 190_000, 1998, true, "Technology"),
    ("Meta", 86_000, 2004, true, "Social Media"),
    ("Apple", 164_000, 1976, true, "Technology"),
    ("Netflix", 13_000, 1997, true, "Streaming"),
    ("Adobe", 29_000, 1982, true, "Software"),
    ("Salesforce", 80_000, 1999, true, "CRM/Cloud"),
    ("Oracle", 164_000, 1977, true, "Database/Cloud"),
    ("IBM", 282_000, 1911, true, "Technology"),
    ("Intel", 124_800, 1968, true, "Semiconductors"),
    ("Cisco", 83_000, 1984, true, "Networking"),
    ("VMware", 38_000, 1998, true, "Cloud/Virtualization"),
    ("SAP", 112_000, 1972, true, "Enterprise Software"),
    // Cloud & infrastructure
    ("Snowflake", 6_800, 2012, true, "Data Cloud"),
    ("Databricks", 5_000, 2013, false, "Data/AI"),
    ("MongoDB", 4_100, 2007, true, "Database"),
    ("Confluent", 3_000, 2014, true, "Data Streaming"),
    ("HashiCorp", 2_100, 2012, true, "Cloud Infrastructure"),
    ("GitLab", 2_200, 2014, true, "DevOps"),
    ("Atlassian", 11_000, 2002, true, "Software"),
    ("Elastic", 3_500, 2012, true, "Search/Analytics"),
    ("Cloudflare", 3_500, 2009, true, "CDN/Security"),
    ("Datadog", 6_500, 2010, true, "Monitoring"),
    // Fintech
    ("Stripe", 8_000, 2010, false, "Payments"),
    ("Square", 13_000, 2009, true, "FinTech"),
    ("PayPal", 30_000, 1998, true, "Payments"),
    ("Adyen", 3_800, 2006, true, "Payments"),
    ("Plaid", 1_000, 2013, false, "FinTech"),
    // E-commerce & marketplace
    ("Shopify", 11_600, 2006, true, "E-commerce"),
    ("eBay", 13_200, 1995, true, "E-commerce"),
    ("Etsy", 2_600, 2005, true, "E-commerce"),
    ("Wayfair", 16_800, 2002, true, "E-commerce"),
    // Cybersecurity
    ("CrowdStrike", 8_500, 2011, true, "Cybersecurity"),
    ("Palo Alto Networks", 13_800, 2005, true, "Cybersecurity"),
    ("Okta", 6_000, 2009, true, "Identity/Security"),
    ("Zscaler", 6_500, 2007, true, "Cloud Security"),
    ("Fortinet", 11_000, 2000, true, "Cybersecurity"),
    // Communication & collaboration
    ("Slack", 3_000, 2009, false, "Collaboration"),
    ("Zoom", 8_400, 2011, true, "Video Conferencing"),
    ("Twilio", 9_000, 2008, true, "Communications API"),
    ("DocuSign", 7_500, 2003, true, "Document Management"),
    // SaaS & business software
    ("ServiceNow", 22_000, 2003, true, "Enterprise SaaS"),
    ("Workday", 18_000, 2005, true, "HR/Finance SaaS"),
    ("HubSpot", 7_900, 2006, true, "Marketing Software"),
    ("Zendesk", 6_000, 2007, true, "Customer Service"),
    ("Splunk", 7_500, 2003, true, "Data Analytics"),
    ("Tableau", 5_000, 2003, false, "Analytics"),
    ("Asana", 1_600, 2008, true, "Project Management"),
    // Transportation
    ("Uber", 32_800, 2009, true, "Transportation"),
    ("Lyft", 4_000, 2012, true, "Transportation"),
    // Gaming
    ("Roblox", 2_400, 2004, true, "Gaming"),
    ("Unity", 7_700, 2004, true, "Gaming Engine"),
    // AI & ML
    ("Scale AI", 800, 2016, false, "AI/ML"),
    ("DataRobot", 1_000, 2012, false, "AI/ML"),
    // Established companies with large tech divisions
    ("Capital One", 55_000, 1994, true, "Financial Services"),
    ("JPMorgan Chase", 293_000, 1799, true, "Financial Services"),
    ("Goldman Sachs", 45_000, 1869, true, "Financial Services"),
    ("Bloomberg", 20_000, 1981, false, "Financial Data"),
    ("Visa", 26_500, 1958, true, "Payments"),
    ("Mastercard", 24_000, 1966, true, "Payments"),
    // European tech
    ("Spotify", 9_800, 2006, true, "Music Streaming"),
    ("Booking.com", 23_000, 1996, true, "Travel"),
    ("Delivery Hero", 42_000, 2011, true, "Food Delivery"),
];
