//! Typed error hierarchy for agentgate.
//!
//! Three top-level enums cover the three failure domains:
//! - `ExecutionError`: failures before an agent process is started
//! - `TicketError`: issue lookup and ticket reference failures
//! - `ConfigError`: configuration loading and validation failures
//!
//! Failures *during* an agent run (launch failure, timeout, prompt loop) are
//! not errors: they are terminal states recorded on `ExecutionResult`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while preparing an execution, before any repository lock is taken.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Repository '{name}' not found. Please clone it first.")]
    RepoNotFound { name: String },

    #[error("Invalid repository name '{name}': {reason}")]
    InvalidRepoName { name: String, reason: &'static str },

    #[error("Repositories root {path} is unavailable: {source}")]
    ReposRootUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown agent '{0}'")]
    UnknownAgent(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors from resolving and fetching tickets.
#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Either issueId or issueUrl must be provided")]
    MissingIssueReference,

    #[error("Could not extract issue key from '{0}'")]
    InvalidIssueUrl(String),

    #[error("Missing Jira credentials: {0}")]
    MissingCredentials(&'static str),

    #[error("Jira returned {status} for issue {key}: {body}")]
    Upstream {
        key: String,
        status: u16,
        body: String,
    },

    #[error("No affected repositories found for issue {key}")]
    NoAffectedRepositories { key: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from loading `agentgate.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Prompt pattern #{index} has an empty match string")]
    EmptyPromptPattern { index: usize },

    #[error("Prompt pattern #{index} of agent '{agent}' has an empty match string")]
    EmptyAgentPromptPattern { agent: String, index: usize },

    #[error("Agent '{agent}' has no program configured")]
    MissingProgram { agent: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_not_found_carries_name() {
        let err = ExecutionError::RepoNotFound {
            name: "widgets".to_string(),
        };
        match &err {
            ExecutionError::RepoNotFound { name } => assert_eq!(name, "widgets"),
            _ => panic!("Expected RepoNotFound"),
        }
        assert!(err.to_string().contains("widgets"));
    }

    #[test]
    fn repos_root_unavailable_carries_path_and_source() {
        let path = PathBuf::from("/srv/repos");
        let err = ExecutionError::ReposRootUnavailable {
            path: path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        match &err {
            ExecutionError::ReposRootUnavailable { path: p, source } => {
                assert_eq!(p, &path);
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            _ => panic!("Expected ReposRootUnavailable"),
        }
    }

    #[test]
    fn ticket_error_converts_from_anyhow() {
        let err: TicketError = anyhow::anyhow!("connection reset").into();
        assert!(matches!(err, TicketError::Other(_)));
        assert_eq!(err.to_string(), "connection reset");
    }

    #[test]
    fn config_error_empty_pattern_names_index() {
        let err = ConfigError::EmptyPromptPattern { index: 3 };
        assert!(err.to_string().contains("#3"));
    }

    #[test]
    fn config_error_agent_pattern_names_agent() {
        let err = ConfigError::EmptyAgentPromptPattern {
            agent: "codex".into(),
            index: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("#1"));
        assert!(msg.contains("'codex'"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ExecutionError::UnknownAgent("x".into()));
        assert_std_error(&TicketError::MissingIssueReference);
        assert_std_error(&ConfigError::MissingProgram { agent: "x".into() });
    }
}
