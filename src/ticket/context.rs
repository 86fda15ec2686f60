//! Ticket-to-prompt conversion.

use serde::Serialize;
use serde_json::Value;

use crate::adf;
use crate::ticket::jira::{affected_repositories, field_named};

pub const NO_TITLE: &str = "No title";
pub const NO_DESCRIPTION: &str = "No description";

const PREAMBLE: &str =
    "Based on this Jira ticket information, analyze the issue and implement a solution.";

const DEFAULT_GUIDELINES: &[&str] = &[
    "Analyze the issue to understand the root cause",
    "Develop a plan to resolve the issue",
    "Implement the necessary code changes",
    "If appropriate, add tests to verify the fix works",
    "Run the build and tests if the repository defines them (package.json, pyproject.toml, Cargo.toml, etc.)",
    "Review your changes for anything missed before finishing",
    "Follow the repository's existing coding standards",
    "Write code that is easy to understand and maintain",
];

/// Everything the agent is told about a ticket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketContext {
    pub issue_key: String,
    pub title: String,
    pub description: String,
    pub labels: Vec<String>,
    pub components: Vec<String>,
    pub acceptance_criteria: Option<String>,
    pub affected_repositories: Vec<String>,
    /// The raw `fields` object as returned by Jira.
    pub fields: Value,
    #[serde(skip)]
    guidelines: Vec<String>,
}

impl TicketContext {
    /// Render the agent prompt. Sections always appear in this order: key,
    /// title, description, labels, components, acceptance criteria,
    /// guidelines. Empty optional sections are left out entirely.
    pub fn prompt(&self) -> String {
        let mut out = String::new();
        out.push_str(PREAMBLE);
        out.push_str("\n\n");
        out.push_str(&format!("JIRA TICKET: {}\n", self.issue_key));
        out.push_str(&format!("TITLE: {}\n", self.title));
        out.push_str(&format!("DESCRIPTION:\n{}\n", self.description));

        let mut extra = Vec::new();
        if !self.labels.is_empty() {
            extra.push(format!("LABELS: {}", self.labels.join(", ")));
        }
        if !self.components.is_empty() {
            extra.push(format!("COMPONENTS: {}", self.components.join(", ")));
        }
        if let Some(criteria) = &self.acceptance_criteria {
            extra.push(format!("ACCEPTANCE CRITERIA:\n{}", criteria));
        }
        if !extra.is_empty() {
            out.push('\n');
            out.push_str(&extra.join("\n"));
            out.push('\n');
        }

        if !self.guidelines.is_empty() {
            out.push_str("\n## You must follow these guidelines:\n");
            for (i, line) in self.guidelines.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", i + 1, line));
            }
        }
        out.push_str(
            "\nFocus on addressing the requirements in the ticket description and acceptance criteria.\n",
        );
        out
    }

    pub fn has_affected_repositories(&self) -> bool {
        !self.affected_repositories.is_empty()
    }
}

/// Builds [`TicketContext`] from issue JSON of the shape
/// `{ "key": ..., "fields": {...}, "names": {...} }`.
#[derive(Debug, Clone)]
pub struct TicketContextBuilder {
    guidelines: Vec<String>,
}

impl Default for TicketContextBuilder {
    fn default() -> Self {
        Self {
            guidelines: DEFAULT_GUIDELINES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TicketContextBuilder {
    pub fn with_guidelines(mut self, guidelines: Vec<String>) -> Self {
        self.guidelines = guidelines;
        self
    }

    /// Never fails: missing fields fall back to placeholders or empty sets.
    /// `issue_key` wins over the JSON's own `key` unless it is empty.
    pub fn build(&self, issue_key: &str, issue: &Value) -> TicketContext {
        let fields = issue.get("fields").cloned().unwrap_or(Value::Null);

        let issue_key = if issue_key.is_empty() {
            issue
                .get("key")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        } else {
            issue_key.to_string()
        };

        let title = fields
            .get("summary")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(NO_TITLE)
            .to_string();

        let description = match fields.get("description") {
            None | Some(Value::Null) => NO_DESCRIPTION.to_string(),
            Some(value) => {
                let extracted = adf::extract_value(value);
                if extracted.malformed > 0 {
                    tracing::warn!(
                        issue = %issue_key,
                        malformed = extracted.malformed,
                        "partial description extracted"
                    );
                }
                if extracted.text.trim().is_empty() {
                    NO_DESCRIPTION.to_string()
                } else {
                    extracted.text
                }
            }
        };

        let labels = string_list(fields.get("labels"));
        let components = fields
            .get("components")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|c| c.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let acceptance_criteria = field_named(issue, &["acceptance criteria"])
            .map(|v| adf::extract_value(v).text)
            .filter(|s| !s.trim().is_empty());

        TicketContext {
            affected_repositories: affected_repositories(issue),
            issue_key,
            title,
            description,
            labels,
            components,
            acceptance_criteria,
            fields,
            guidelines: self.guidelines.clone(),
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
