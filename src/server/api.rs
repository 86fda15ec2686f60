use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ExecutionError, TicketError};
use crate::execution::{ExecutionReport, ExecutionStatus, Executor};
use crate::ticket::{IssueSource, TicketContextBuilder, resolve_issue_key};

/// Agent used for ticket execution unless the request names another.
pub const TICKET_AGENT: &str = "claude";

pub const MISSING_REPOSITORIES_MESSAGE: &str = "Please fill 'Affected repositories'";
pub const READY_MESSAGE: &str = "I have enough information to work on this ticket";

// ============================================================
// Shared application state
// ============================================================

pub struct AppState {
    pub executor: Executor,
    /// `None` when Jira credentials are not configured.
    pub issues: Option<Arc<dyn IssueSource>>,
    pub tickets: TicketContextBuilder,
    pub query_timeout: Duration,
    pub ticket_timeout: Duration,
}

pub type SharedState = Arc<AppState>;

// ============================================================
// Request / response payloads
// ============================================================

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub repo: String,
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct IssueRequest {
    #[serde(default, rename = "issueId")]
    pub issue_id: Option<String>,
    #[serde(default, rename = "issueUrl")]
    pub issue_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IssueExecuteRequest {
    #[serde(default, rename = "issueId")]
    pub issue_id: Option<String>,
    #[serde(default, rename = "issueUrl")]
    pub issue_url: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IssueResponse {
    pub issue_id: String,
    pub title: String,
    pub details: String,
    pub labels: Vec<String>,
    pub fields: Value,
    pub affected_repositories: Vec<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct IssueExecuteResponse {
    pub issue_key: String,
    pub title: String,
    pub affected_repositories: Vec<String>,
    #[serde(flatten)]
    pub execution: ExecutionReport,
}

// ============================================================
// Errors
// ============================================================

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
    Upstream(StatusCode, String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Upstream(status, msg) => (status, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::RepoNotFound { .. } | ExecutionError::UnknownAgent(_) => {
                ApiError::NotFound(err.to_string())
            }
            ExecutionError::InvalidRepoName { .. } => ApiError::BadRequest(err.to_string()),
            ExecutionError::ReposRootUnavailable { .. } | ExecutionError::Config(_) => {
                tracing::error!(error = %err, "execution setup failed");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<TicketError> for ApiError {
    fn from(err: TicketError) -> Self {
        match &err {
            TicketError::MissingIssueReference
            | TicketError::InvalidIssueUrl(_)
            | TicketError::NoAffectedRepositories { .. } => ApiError::BadRequest(err.to_string()),
            TicketError::MissingCredentials(_) => ApiError::Internal(err.to_string()),
            TicketError::Upstream { status, .. } => ApiError::Upstream(
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                err.to_string(),
            ),
            TicketError::Other(_) => ApiError::Upstream(StatusCode::BAD_GATEWAY, format!("{:#}", err)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Success and partial success are 200; the rest carry the report in an
/// error status.
fn report_response<T: Serialize>(status: ExecutionStatus, body: T) -> Response {
    let code = match status {
        ExecutionStatus::Success | ExecutionStatus::PartialSuccess => StatusCode::OK,
        ExecutionStatus::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ExecutionStatus::Error => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, Json(body)).into_response()
}

// ============================================================
// Router
// ============================================================

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/claude-code", post(run_claude_code))
        .route("/codex", post(run_codex))
        .route("/agents/{agent}/run", post(run_agent))
        .route("/jira/issue", post(get_issue))
        .route("/jira/execute", post(execute_issue))
}

// ============================================================
// Handlers
// ============================================================

async fn health_check() -> &'static str {
    "ok"
}

async fn run_claude_code(
    State(state): State<SharedState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    run_query(&state, "claude", req).await
}

async fn run_codex(
    State(state): State<SharedState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    run_query(&state, "codex", req).await
}

async fn run_agent(
    State(state): State<SharedState>,
    Path(agent): Path<String>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    run_query(&state, &agent, req).await
}

async fn run_query(state: &AppState, agent: &str, req: QueryRequest) -> Result<Response, ApiError> {
    if req.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".into()));
    }
    let report = state
        .executor
        .run(agent, &req.repo, &req.query, state.query_timeout)
        .await?;
    Ok(report_response(report.status, report))
}

async fn fetch_issue(state: &AppState, key: &str) -> Result<Value, ApiError> {
    let source = state
        .issues
        .as_ref()
        .ok_or(TicketError::MissingCredentials(
            "JIRA_BASE_URL/JIRA_URL, JIRA_EMAIL/JIRA_USERNAME, JIRA_API_TOKEN",
        ))?;
    Ok(source.fetch_issue(key).await?)
}

async fn get_issue(
    State(state): State<SharedState>,
    payload: Result<Json<IssueRequest>, JsonRejection>,
) -> Result<Json<IssueResponse>, ApiError> {
    let Json(req) = payload?;
    let key = resolve_issue_key(req.issue_id.as_deref(), req.issue_url.as_deref())?;
    let issue = fetch_issue(&state, &key).await?;
    let ctx = state.tickets.build(&key, &issue);

    let message = if ctx.has_affected_repositories() {
        READY_MESSAGE
    } else {
        MISSING_REPOSITORIES_MESSAGE
    };

    Ok(Json(IssueResponse {
        issue_id: ctx.issue_key,
        title: ctx.title,
        details: ctx.description,
        labels: ctx.labels,
        fields: ctx.fields,
        affected_repositories: ctx.affected_repositories,
        message: message.to_string(),
    }))
}

async fn execute_issue(
    State(state): State<SharedState>,
    payload: Result<Json<IssueExecuteRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    let key = resolve_issue_key(req.issue_id.as_deref(), req.issue_url.as_deref())?;
    let issue = fetch_issue(&state, &key).await?;
    let ctx = state.tickets.build(&key, &issue);

    let repo = req
        .repository
        .clone()
        .filter(|r| !r.trim().is_empty())
        .or_else(|| ctx.affected_repositories.first().cloned())
        .ok_or_else(|| {
            tracing::warn!(issue = %key, "no repository given and none listed on the issue");
            TicketError::NoAffectedRepositories { key: key.clone() }
        })?;
    let agent = req.agent.as_deref().unwrap_or(TICKET_AGENT);

    let report = state
        .executor
        .run(agent, &repo, &ctx.prompt(), state.ticket_timeout)
        .await?;

    let status = report.status;
    Ok(report_response(
        status,
        IssueExecuteResponse {
            issue_key: ctx.issue_key,
            title: ctx.title,
            affected_repositories: ctx.affected_repositories,
            execution: report,
        },
    ))
}
