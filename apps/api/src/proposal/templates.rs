//! Template registry — one active prompt template per project category.
//!
//! Registration validates that every `{placeholder}` in the user-prompt text
//! appears in the template's declared variable set. That invariant is what
//! lets the prompt builder promise no unmatched placeholder ever survives
//! substitution at request time.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::proposal::models::ProjectCategory;

/// A reusable prompt template for one project category.
#[derive(Debug, Clone)]
pub struct ProposalTemplate {
    pub id: String,
    pub name: String,
    pub category: ProjectCategory,
    pub system_prompt: String,
    /// User-prompt skeleton with `{variable}` placeholders.
    pub user_template: String,
    /// Every placeholder in `user_template` must appear here.
    pub variables: Vec<String>,
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template '{template}' references undeclared placeholder '{{{placeholder}}}'")]
    UndeclaredPlaceholder {
        template: String,
        placeholder: String,
    },
}

/// Maps a project category to its active template.
/// Registering a second template for a category replaces the first.
pub struct TemplateRegistry {
    templates: HashMap<ProjectCategory, ProposalTemplate>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Registers a template after validating its placeholder set.
    pub fn register(&mut self, template: ProposalTemplate) -> Result<(), TemplateError> {
        let declared: HashSet<&str> = template.variables.iter().map(String::as_str).collect();
        for placeholder in extract_placeholders(&template.user_template) {
            if !declared.contains(placeholder.as_str()) {
                return Err(TemplateError::UndeclaredPlaceholder {
                    template: template.id.clone(),
                    placeholder,
                });
            }
        }
        self.templates.insert(template.category, template);
        Ok(())
    }

    /// Looks up the active template for a category.
    pub fn resolve(&self, category: ProjectCategory) -> Option<&ProposalTemplate> {
        self.templates.get(&category)
    }

    /// Registry pre-loaded with the built-in template set for all categories.
    pub fn builtin() -> Result<Self, TemplateError> {
        let mut registry = Self::new();
        for template in builtin_templates() {
            registry.register(template)?;
        }
        Ok(registry)
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts `{name}` placeholder tokens from template text.
/// Only simple identifier-like names count; stray braces are ignored.
fn extract_placeholders(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        rest = &rest[open + 1..];
        if let Some(close) = rest.find('}') {
            let candidate = &rest[..close];
            if !candidate.is_empty()
                && candidate
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                names.push(candidate.to_string());
            }
            rest = &rest[close + 1..];
        } else {
            break;
        }
    }
    names
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in templates
// ────────────────────────────────────────────────────────────────────────────

const PROPOSAL_SYSTEM: &str = "You are an experienced freelance consultant writing a project \
    proposal in response to a job posting. Write in a confident, professional tone. \
    Structure the proposal with a short title as a markdown heading, an approach section, \
    a bulleted list of key deliverables, and closing lines labelled 'Estimated Budget:' \
    and 'Estimated Timeline:' when enough information is available.";

const COMMON_BODY: &str = "\
JOB TITLE:
{job_title}

REQUIREMENTS:
{requirements}

CLIENT BUDGET HINT (may be empty):
{budget}

CLIENT TIMELINE HINT (may be empty):
{timeline}

ADDITIONAL CONTEXT (may be empty):
{additional_context}";

fn common_variables() -> Vec<String> {
    ["job_title", "requirements", "budget", "timeline", "additional_context"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn builtin_template(
    id: &str,
    name: &str,
    category: ProjectCategory,
    preamble: &str,
) -> ProposalTemplate {
    ProposalTemplate {
        id: id.to_string(),
        name: name.to_string(),
        category,
        system_prompt: PROPOSAL_SYSTEM.to_string(),
        user_template: format!("{preamble}\n\n{COMMON_BODY}"),
        variables: common_variables(),
    }
}

fn builtin_templates() -> Vec<ProposalTemplate> {
    vec![
        builtin_template(
            "web-development-v1",
            "Web Development Proposal",
            ProjectCategory::WebDevelopment,
            "Write a proposal for a web development project. Emphasise responsive \
             implementation, performance, and deployment.",
        ),
        builtin_template(
            "mobile-app-v1",
            "Mobile App Proposal",
            ProjectCategory::MobileApp,
            "Write a proposal for a mobile application project. Emphasise platform \
             coverage, store submission, and release support.",
        ),
        builtin_template(
            "design-v1",
            "Design Proposal",
            ProjectCategory::Design,
            "Write a proposal for a design engagement. Emphasise discovery, iteration \
             rounds, and deliverable formats.",
        ),
        builtin_template(
            "consulting-v1",
            "Consulting Proposal",
            ProjectCategory::Consulting,
            "Write a proposal for a consulting engagement. Emphasise audit, \
             recommendations, and knowledge transfer.",
        ),
        builtin_template(
            "other-v1",
            "General Proposal",
            ProjectCategory::Other,
            "Write a proposal for the project described below.",
        ),
    ]
}
