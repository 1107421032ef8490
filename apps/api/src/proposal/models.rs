//! Data models for the proposal generation pipeline.
//!
//! `ProposalRequest` is immutable once received — it is the sole input to
//! fingerprinting, prompt building, and validation. `ProposalResponse` is
//! immutable once constructed and safe to cache and serialize.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Project category a proposal is generated for. Each category has exactly
/// one active prompt template in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectCategory {
    WebDevelopment,
    MobileApp,
    Design,
    Consulting,
    Other,
}

impl ProjectCategory {
    /// Canonical lowercase label, used in fingerprints and prompt text.
    pub fn label(&self) -> &'static str {
        match self {
            ProjectCategory::WebDevelopment => "web-development",
            ProjectCategory::MobileApp => "mobile-app",
            ProjectCategory::Design => "design",
            ProjectCategory::Consulting => "consulting",
            ProjectCategory::Other => "other",
        }
    }
}

/// Inbound request for proposal generation.
///
/// `job_title` and `requirements` are required and must be non-empty after
/// trimming. All other fields are optional hints that enrich the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalRequest {
    pub job_title: String,
    pub requirements: String,
    pub project_type: ProjectCategory,
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default)]
    pub additional_context: Option<String>,
    /// Discrete requirement strings, rendered as a bullet list in the prompt.
    #[serde(default)]
    pub requirement_items: Vec<String>,
}

/// Metadata describing how a proposal was generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub model: String,
    pub tokens_used: u32,
    pub processing_time_ms: u64,
}

/// A fully generated, normalized proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalResponse {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub key_points: Vec<String>,
    pub estimated_budget: Option<String>,
    pub estimated_timeline: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata: GenerationMetadata,
}
