//! Prompt builder — fills a template's declared variables from request fields.
//!
//! Variable mapping is fixed and documented here:
//!
//! | variable             | source field                       | absent behaviour   |
//! |----------------------|------------------------------------|--------------------|
//! | `job_title`          | `job_title`                        | MissingVariables   |
//! | `requirements`       | `requirements` + bullet list of    | MissingVariables   |
//! |                      | `requirement_items`                |                    |
//! | `project_type`       | category label                     | never absent       |
//! | `budget`             | `budget`                           | empty string       |
//! | `timeline`           | `timeline`                         | empty string       |
//! | `additional_context` | `additional_context`               | empty string       |
//!
//! An unknown variable name has no source field and is reported as missing.
//! Unmatched placeholders cannot survive substitution: registration already
//! rejected any placeholder outside the declared set.

use crate::errors::AppError;
use crate::proposal::models::ProposalRequest;
use crate::proposal::templates::ProposalTemplate;

/// The final prompt pair sent to the gateway.
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    pub system: String,
    pub user: String,
}

/// Fills `template` from `request`. Returns `MissingVariables` listing every
/// required variable whose source field is absent or blank.
pub fn build(template: &ProposalTemplate, request: &ProposalRequest) -> Result<BuiltPrompt, AppError> {
    let mut missing = Vec::new();
    let mut user = template.user_template.clone();

    for variable in &template.variables {
        match resolve_variable(variable, request) {
            Resolved::Value(value) => {
                user = user.replace(&format!("{{{variable}}}"), &value);
            }
            Resolved::Missing => missing.push(variable.clone()),
        }
    }

    if !missing.is_empty() {
        return Err(AppError::MissingVariables(missing));
    }

    Ok(BuiltPrompt {
        system: template.system_prompt.clone(),
        user,
    })
}

enum Resolved {
    Value(String),
    Missing,
}

fn resolve_variable(name: &str, request: &ProposalRequest) -> Resolved {
    match name {
        "job_title" => required(request.job_title.trim()),
        "requirements" => {
            let base = request.requirements.trim();
            if base.is_empty() && request.requirement_items.is_empty() {
                return Resolved::Missing;
            }
            Resolved::Value(render_requirements(base, &request.requirement_items))
        }
        "project_type" => Resolved::Value(request.project_type.label().to_string()),
        "budget" => optional(request.budget.as_deref()),
        "timeline" => optional(request.timeline.as_deref()),
        "additional_context" => optional(request.additional_context.as_deref()),
        _ => Resolved::Missing,
    }
}

fn required(value: &str) -> Resolved {
    if value.is_empty() {
        Resolved::Missing
    } else {
        Resolved::Value(value.to_string())
    }
}

/// Optional source fields substitute as empty strings, never abort the build.
fn optional(value: Option<&str>) -> Resolved {
    Resolved::Value(value.map(str::trim).unwrap_or_default().to_string())
}

/// Free-text requirements followed by the discrete items as a bullet list.
fn render_requirements(base: &str, items: &[String]) -> String {
    let bullets: Vec<String> = items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| format!("- {item}"))
        .collect();

    match (base.is_empty(), bullets.is_empty()) {
        (false, true) => base.to_string(),
        (true, false) => bullets.join("\n"),
        (false, false) => format!("{base}\n{}", bullets.join("\n")),
        (true, true) => String::new(),
    }
}
