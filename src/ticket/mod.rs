//! Tickets as agent input: Jira lookup plus prompt construction.

pub mod context;
pub mod jira;

pub use context::{TicketContext, TicketContextBuilder};
pub use jira::{
    IssueSource, JiraRestSource, affected_repositories, extract_issue_key, resolve_issue_key,
};
