//! Service configuration loaded from `agentgate.toml`.
//!
//! Layering is file → environment → CLI. A missing file means defaults.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8000
//! cors = false
//!
//! [repos]
//! root = "/srv/repos"
//!
//! [limits]
//! max_auto_responses = 20
//! lock_stall_warning_secs = 60
//! drain_grace_ms = 2000
//!
//! [timeouts]
//! query_secs = 300
//! ticket_secs = 600
//!
//! [[prompts]]
//! match = "Do you want to proceed"
//! response = "y"
//!
//! [agents.claude]
//! program = "claude"
//! args = ["-p", "{prompt}", "--allowedTools", "Edit", "Bash"]
//! config_dir_env = "CLAUDE_CONFIG_DIR"
//! config_dir = "/home/agent/.claude"
//!
//! [tickets]
//! guidelines = ["Keep changes minimal", "Add a regression test"]
//!
//! [jira]
//! base_url = "https://acme.atlassian.net"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::prompt::PromptPattern;
use crate::ticket::TicketContextBuilder;

pub const CONFIG_FILE: &str = "agentgate.toml";

/// Placeholder in agent argument templates replaced by the prompt text.
pub const PROMPT_PLACEHOLDER: &str = "{prompt}";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allow cross-origin requests from any origin.
    #[serde(default)]
    pub cors: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReposSection {
    /// Directory holding one subdirectory per cloned repository.
    #[serde(default = "default_repos_root")]
    pub root: PathBuf,
}

fn default_repos_root() -> PathBuf {
    PathBuf::from("repos")
}

impl Default for ReposSection {
    fn default() -> Self {
        Self {
            root: default_repos_root(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSection {
    /// Answers per run before the agent is considered stuck in a prompt loop.
    #[serde(default = "default_max_auto_responses")]
    pub max_auto_responses: usize,
    #[serde(default = "default_lock_stall_warning_secs")]
    pub lock_stall_warning_secs: u64,
    /// How long to keep reading after the agent exits.
    #[serde(default = "default_drain_grace_ms")]
    pub drain_grace_ms: u64,
}

fn default_max_auto_responses() -> usize {
    crate::prompt::DEFAULT_MAX_AUTO_RESPONSES
}

fn default_lock_stall_warning_secs() -> u64 {
    60
}

fn default_drain_grace_ms() -> u64 {
    2000
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_auto_responses: default_max_auto_responses(),
            lock_stall_warning_secs: default_lock_stall_warning_secs(),
            drain_grace_ms: default_drain_grace_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsSection {
    #[serde(default = "default_query_secs")]
    pub query_secs: u64,
    /// Tickets get longer than free-form queries.
    #[serde(default = "default_ticket_secs")]
    pub ticket_secs: u64,
}

fn default_query_secs() -> u64 {
    300
}

fn default_ticket_secs() -> u64 {
    600
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            query_secs: default_query_secs(),
            ticket_secs: default_ticket_secs(),
        }
    }
}

/// How to invoke one agent CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub program: String,
    /// Argument template; `{prompt}` is substituted with the prompt text.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variable naming the agent's settings directory.
    #[serde(default)]
    pub config_dir_env: Option<String>,
    #[serde(default)]
    pub config_dir: Option<PathBuf>,
    /// Prompts specific to this agent, checked after the global list.
    #[serde(default)]
    pub prompts: Vec<PromptPattern>,
}

impl AgentProfile {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            config_dir_env: None,
            config_dir: None,
            prompts: Vec::new(),
        }
    }

    /// Concrete argv for `prompt`. When the template has no placeholder the
    /// prompt is appended as the final argument.
    pub fn render_args(&self, prompt: &str) -> Vec<String> {
        if !self.args.iter().any(|a| a.contains(PROMPT_PLACEHOLDER)) {
            let mut args = self.args.clone();
            args.push(prompt.to_string());
            return args;
        }
        self.args
            .iter()
            .map(|a| a.replace(PROMPT_PLACEHOLDER, prompt))
            .collect()
    }

    pub fn env(&self) -> Vec<(String, String)> {
        match (&self.config_dir_env, &self.config_dir) {
            (Some(var), Some(dir)) => vec![(var.clone(), dir.display().to_string())],
            _ => Vec::new(),
        }
    }
}

/// Built-in profiles, used unless the file defines an agent of the same name.
pub fn default_agents() -> BTreeMap<String, AgentProfile> {
    let mut claude = AgentProfile::new(
        "claude",
        &[
            "-p",
            PROMPT_PLACEHOLDER,
            "--allowedTools",
            "Edit",
            "Bash",
            "Search",
            "FileSearch",
            "ListDir",
            "Read",
            "Git",
        ],
    );
    claude.config_dir_env = Some("CLAUDE_CONFIG_DIR".to_string());

    let codex = AgentProfile::new("codex", &["-q", "-a", "full-auto", PROMPT_PLACEHOLDER]);

    BTreeMap::from([("claude".to_string(), claude), ("codex".to_string(), codex)])
}

fn default_prompts() -> Vec<PromptPattern> {
    vec![
        PromptPattern::new("Do you want to proceed", "y"),
        PromptPattern::new("Continue?", "y"),
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketsSection {
    /// Replaces the built-in guideline list when non-empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guidelines: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JiraConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
}

impl JiraConfig {
    pub fn is_configured(&self) -> bool {
        self.base_url.is_some() && self.email.is_some() && self.api_token.is_some()
    }
}

/// Top-level `agentgate.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub repos: ReposSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
    #[serde(default = "default_prompts")]
    pub prompts: Vec<PromptPattern>,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentProfile>,
    #[serde(default)]
    pub tickets: TicketsSection,
    #[serde(default)]
    pub jira: JiraConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            repos: ReposSection::default(),
            limits: LimitsSection::default(),
            timeouts: TimeoutsSection::default(),
            prompts: default_prompts(),
            agents: default_agents(),
            tickets: TicketsSection::default(),
            jira: JiraConfig::default(),
        }
    }
}

impl GateConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(content)?;
        for (name, profile) in default_agents() {
            config.agents.entry(name).or_insert(profile);
        }
        Ok(config)
    }

    /// Defaults when `path` does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    }

    /// Overlay environment variables, read through `lookup`.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(k));

        if let Some(root) = first(&["AGENTGATE_REPOS_DIR"]) {
            self.repos.root = PathBuf::from(root);
        }
        if let Some(host) = first(&["AGENTGATE_HOST"]) {
            self.server.host = host;
        }
        if let Some(port) = first(&["AGENTGATE_PORT"]) {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %port, "ignoring invalid AGENTGATE_PORT"),
            }
        }
        if let Some(url) = first(&["JIRA_BASE_URL", "JIRA_URL"]) {
            self.jira.base_url = Some(url);
        }
        if let Some(email) = first(&["JIRA_EMAIL", "JIRA_USERNAME"]) {
            self.jira.email = Some(email);
        }
        if let Some(token) = first(&["JIRA_API_TOKEN"]) {
            self.jira.api_token = Some(token);
        }
    }

    pub fn with_cli_overrides(
        mut self,
        host: Option<String>,
        port: Option<u16>,
        repos_root: Option<PathBuf>,
    ) -> Self {
        if let Some(host) = host {
            self.server.host = host;
        }
        if let Some(port) = port {
            self.server.port = port;
        }
        if let Some(root) = repos_root {
            self.repos.root = root;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(index) = self.prompts.iter().position(|p| p.needle.is_empty()) {
            return Err(ConfigError::EmptyPromptPattern { index });
        }
        for (name, profile) in &self.agents {
            if profile.program.trim().is_empty() {
                return Err(ConfigError::MissingProgram {
                    agent: name.clone(),
                });
            }
            if let Some(index) = profile.prompts.iter().position(|p| p.needle.is_empty()) {
                return Err(ConfigError::EmptyAgentPromptPattern {
                    agent: name.clone(),
                    index,
                });
            }
        }
        Ok(())
    }

    pub fn agent(&self, name: &str) -> Option<&AgentProfile> {
        self.agents.get(name)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.query_secs)
    }

    pub fn ticket_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.ticket_secs)
    }

    pub fn lock_stall_warning(&self) -> Duration {
        Duration::from_secs(self.limits.lock_stall_warning_secs)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.limits.drain_grace_ms)
    }

    /// Copy safe to print: secrets are masked.
    /// Ticket prompt builder using the configured guidelines, if any.
    pub fn ticket_builder(&self) -> TicketContextBuilder {
        let builder = TicketContextBuilder::default();
        if self.tickets.guidelines.is_empty() {
            builder
        } else {
            builder.with_guidelines(self.tickets.guidelines.clone())
        }
    }

    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.jira.api_token.is_some() {
            config.jira.api_token = Some("********".to_string());
        }
        config
    }
}
