//! Jira issue lookup and field helpers.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::config::JiraConfig;
use crate::errors::TicketError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

static ISSUE_KEY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/([A-Z][A-Z0-9]*-\d+)(?:/|$)").expect("issue key regex is valid")
});

/// Pull `PROJ-123` out of a browse URL such as
/// `https://acme.atlassian.net/browse/PROJ-123`.
pub fn extract_issue_key(url: &str) -> Result<String, TicketError> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    ISSUE_KEY_REGEX
        .captures(path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| TicketError::InvalidIssueUrl(url.to_string()))
}

/// An explicit id wins; otherwise the key is parsed from the URL.
pub fn resolve_issue_key(
    issue_id: Option<&str>,
    issue_url: Option<&str>,
) -> Result<String, TicketError> {
    let issue_id = issue_id.map(str::trim).filter(|s| !s.is_empty());
    let issue_url = issue_url.map(str::trim).filter(|s| !s.is_empty());
    match (issue_id, issue_url) {
        (Some(id), _) => Ok(id.to_string()),
        (None, Some(url)) => extract_issue_key(url),
        (None, None) => Err(TicketError::MissingIssueReference),
    }
}

/// First non-empty `customfield_*` whose display name (from the `names`
/// map returned with `expand=names`) contains any of `needles`,
/// case-insensitively.
pub fn field_named<'a>(issue: &'a Value, needles: &[&str]) -> Option<&'a Value> {
    let fields = issue.get("fields")?.as_object()?;
    let names = issue.get("names").and_then(Value::as_object);

    fields
        .iter()
        .filter(|(id, _)| id.starts_with("customfield_"))
        .find(|(id, value)| {
            let Some(name) = names.and_then(|n| n.get(id.as_str())).and_then(Value::as_str)
            else {
                return false;
            };
            let name = name.to_lowercase();
            needles.iter().any(|n| name.contains(n)) && !is_empty_value(value)
        })
        .map(|(_, value)| value)
}

/// Repository names listed in the issue's "Affected Repositories" field.
pub fn affected_repositories(issue: &Value) -> Vec<String> {
    field_named(issue, &["repository", "repositories", "affected"])
        .map(|value| {
            let mut names = Vec::new();
            collect_names(value, &mut names);
            names
        })
        .unwrap_or_default()
}

fn collect_names(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.extend(
            s.split([',', '\n'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        ),
        Value::Array(items) => items.iter().for_each(|item| collect_names(item, out)),
        // Select-list options come back as {"value": ...}, some plugins use "name".
        Value::Object(obj) => {
            if let Some(inner) = obj.get("value").or_else(|| obj.get("name")) {
                collect_names(inner, out);
            }
        }
        _ => {}
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Where issue JSON comes from. The server only depends on this seam.
#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Fetch `{ key, fields, names }` for one issue.
    async fn fetch_issue(&self, key: &str) -> Result<Value, TicketError>;
}

/// Jira Cloud REST v3 with basic auth (email + API token).
#[derive(Debug, Clone)]
pub struct JiraRestSource {
    client: reqwest::Client,
    base_url: String,
    email: String,
    api_token: String,
}

impl JiraRestSource {
    pub fn from_config(config: &JiraConfig) -> Result<Self, TicketError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or(TicketError::MissingCredentials("JIRA_BASE_URL/JIRA_URL"))?;
        let email = config
            .email
            .clone()
            .ok_or(TicketError::MissingCredentials("JIRA_EMAIL/JIRA_USERNAME"))?;
        let api_token = config
            .api_token
            .clone()
            .ok_or(TicketError::MissingCredentials("JIRA_API_TOKEN"))?;

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build Jira HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            email,
            api_token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl IssueSource for JiraRestSource {
    async fn fetch_issue(&self, key: &str) -> Result<Value, TicketError> {
        let url = format!("{}/rest/api/3/issue/{}", self.base_url, key);
        tracing::debug!(issue = %key, %url, "fetching Jira issue");

        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.email, Some(&self.api_token))
            .header("Accept", "application/json")
            .query(&[("expand", "names")])
            .send()
            .await
            .with_context(|| format!("Failed to reach Jira for issue {}", key))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(issue = %key, status = status.as_u16(), "Jira rejected issue lookup");
            return Err(TicketError::Upstream {
                key: key.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let issue = resp
            .json::<Value>()
            .await
            .with_context(|| format!("Failed to parse Jira response for issue {}", key))?;
        Ok(issue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ============================================================
    // Issue keys
    // ============================================================

    #[test]
    fn test_extract_issue_key_from_browse_url() {
        assert_eq!(
            extract_issue_key("https://acme.atlassian.net/browse/PROJ-123").unwrap(),
            "PROJ-123"
        );
    }

    #[test]
    fn test_extract_issue_key_with_trailing_slash_and_query() {
        assert_eq!(
            extract_issue_key("https://acme.atlassian.net/browse/AB2-9/?focusedCommentId=1").unwrap(),
            "AB2-9"
        );
    }

    #[test]
    fn test_extract_issue_key_rejects_lowercase_and_missing() {
        assert!(matches!(
            extract_issue_key("https://acme.atlassian.net/browse/proj-1"),
            Err(TicketError::InvalidIssueUrl(_))
        ));
        assert!(extract_issue_key("https://acme.atlassian.net/jira/your-work").is_err());
    }

    #[test]
    fn test_resolve_prefers_id_over_url() {
        assert_eq!(
            resolve_issue_key(Some("OPS-1"), Some("https://x/browse/OPS-2")).unwrap(),
            "OPS-1"
        );
        assert_eq!(
            resolve_issue_key(None, Some("https://x/browse/OPS-2")).unwrap(),
            "OPS-2"
        );
        assert!(matches!(
            resolve_issue_key(Some("  "), None),
            Err(TicketError::MissingIssueReference)
        ));
    }

    // ============================================================
    // Affected repositories
    // ============================================================

    fn with_field(value: Value, name: &str) -> Value {
        json!({
            "fields": {"summary": "x", "customfield_10100": value},
            "names": {"customfield_10100": name}
        })
    }

    #[test]
    fn test_affected_repositories_from_comma_string() {
        let issue = with_field(json!("api, web ,"), "Affected Repositories");
        assert_eq!(affected_repositories(&issue), vec!["api", "web"]);
    }

    #[test]
    fn test_affected_repositories_from_select_options() {
        let issue = with_field(
            json!([{"id": "1", "value": "api"}, {"id": "2", "value": "worker"}]),
            "Repository",
        );
        assert_eq!(affected_repositories(&issue), vec!["api", "worker"]);
    }

    #[test]
    fn test_empty_or_unnamed_field_is_ignored() {
        assert!(affected_repositories(&with_field(json!([]), "Affected Repositories")).is_empty());
        assert!(affected_repositories(&with_field(json!("api"), "Story Points")).is_empty());

        let no_names = json!({"fields": {"customfield_10100": "api"}});
        assert!(affected_repositories(&no_names).is_empty());
    }

    #[test]
    fn test_field_named_is_case_insensitive() {
        let issue = with_field(json!("done when green"), "ACCEPTANCE CRITERIA");
        assert_eq!(
            field_named(&issue, &["acceptance criteria"]),
            Some(&json!("done when green"))
        );
    }

    // ============================================================
    // REST source
    // ============================================================

    #[test]
    fn test_rest_source_requires_credentials() {
        let config = JiraConfig {
            base_url: Some("https://acme.atlassian.net".into()),
            email: None,
            api_token: Some("t".into()),
        };
        assert!(matches!(
            JiraRestSource::from_config(&config),
            Err(TicketError::MissingCredentials(_))
        ));
    }

    #[test]
    fn test_rest_source_trims_base_url() {
        let config = JiraConfig {
            base_url: Some("https://acme.atlassian.net/".into()),
            email: Some("me@acme.io".into()),
            api_token: Some("t".into()),
        };
        let source = JiraRestSource::from_config(&config).unwrap();
        assert_eq!(source.base_url(), "https://acme.atlassian.net");
    }

    async fn fake_jira() -> String {
        use axum::{Json, Router, extract::Path, http::StatusCode, routing::get};

        let app = Router::new().route(
            "/rest/api/3/issue/{key}",
            get(|Path(key): Path<String>, headers: axum::http::HeaderMap| async move {
                if !headers.contains_key("authorization") {
                    return (StatusCode::UNAUTHORIZED, Json(json!({})));
                }
                if key == "GONE-1" {
                    return (
                        StatusCode::NOT_FOUND,
                        Json(json!({"errorMessages": ["Issue does not exist"]})),
                    );
                }
                (
                    StatusCode::OK,
                    Json(json!({"key": key, "fields": {"summary": "From fake"}})),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn source_for(base_url: String) -> JiraRestSource {
        JiraRestSource::from_config(&JiraConfig {
            base_url: Some(base_url),
            email: Some("me@acme.io".into()),
            api_token: Some("secret".into()),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_issue_returns_json() {
        let source = source_for(fake_jira().await);
        let issue = source.fetch_issue("PROJ-5").await.unwrap();
        assert_eq!(issue["key"], "PROJ-5");
        assert_eq!(issue["fields"]["summary"], "From fake");
    }

    #[tokio::test]
    async fn test_fetch_issue_maps_error_status() {
        let source = source_for(fake_jira().await);
        match source.fetch_issue("GONE-1").await {
            Err(TicketError::Upstream { key, status, body }) => {
                assert_eq!(key, "GONE-1");
                assert_eq!(status, 404);
                assert!(body.contains("does not exist"));
            }
            other => panic!("Expected Upstream error, got {:?}", other),
        }
    }
}
