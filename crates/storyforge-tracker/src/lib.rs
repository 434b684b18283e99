// ABOUTME: Issue-tracker collaborator: fetches epics, stories, and subtasks from Jira
// ABOUTME: and writes optimized descriptions back. Only plain text crosses this boundary.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const SEARCH_PAGE_SIZE: u32 = 100;

/// A tracker issue reduced to what the optimizer needs: a key and text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    pub summary: String,
    pub description: String,
}

/// Errors from the tracker boundary.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

/// Jira REST client scoped to one project.
#[derive(Debug)]
pub struct TrackerClient {
    http: reqwest::Client,
    base_url: String,
    email: String,
    api_token: String,
    project_key: String,
}

impl TrackerClient {
    /// Read connection details from the environment.
    /// Required: `JIRA_HOST`, `JIRA_EMAIL`, `JIRA_API_TOKEN`, `JIRA_PROJECT_KEY`.
    pub fn from_env() -> Result<Self, TrackerError> {
        let var = |name: &'static str| {
            std::env::var(name).map_err(|_| TrackerError::MissingConfig(name))
        };
        Ok(Self::new(
            var("JIRA_HOST")?,
            var("JIRA_EMAIL")?,
            var("JIRA_API_TOKEN")?,
            var("JIRA_PROJECT_KEY")?,
        ))
    }

    pub fn new(base_url: String, email: String, api_token: String, project_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            email,
            api_token,
            project_key,
        }
    }

    /// All epics in the project.
    pub async fn fetch_epics(&self) -> Result<Vec<Issue>, TrackerError> {
        self.search(&jql_epics(&self.project_key)).await
    }

    /// Stories attached to the given epic.
    pub async fn fetch_stories(&self, epic_key: &str) -> Result<Vec<Issue>, TrackerError> {
        self.search(&jql_children(&self.project_key, "Story", epic_key))
            .await
    }

    /// Sub-tasks attached to the given story.
    pub async fn fetch_subtasks(&self, story_key: &str) -> Result<Vec<Issue>, TrackerError> {
        self.search(&jql_children(&self.project_key, "Sub-task", story_key))
            .await
    }

    /// Replace an issue's description with the optimized text.
    pub async fn update_issue(
        &self,
        issue_key: &str,
        new_description: &str,
    ) -> Result<(), TrackerError> {
        let url = format!("{}/rest/api/2/issue/{issue_key}", self.base_url);
        let body = json!({ "fields": { "description": new_description } });

        let response = self
            .http
            .put(&url)
            .basic_auth(&self.email, Some(&self.api_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| TrackerError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(TrackerError::Request(format!(
                "update of {issue_key} failed with {status}: {error_body}"
            )));
        }
        tracing::info!(issue = %issue_key, "updated issue description");
        Ok(())
    }

    async fn search(&self, jql: &str) -> Result<Vec<Issue>, TrackerError> {
        let url = format!("{}/rest/api/2/search", self.base_url);
        let max_results = SEARCH_PAGE_SIZE.to_string();

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.email, Some(&self.api_token))
            .query(&[
                ("jql", jql),
                ("maxResults", max_results.as_str()),
                ("fields", "summary,description"),
            ])
            .send()
            .await
            .map_err(|e| TrackerError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(TrackerError::Request(format!(
                "search failed with {status}: {error_body}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TrackerError::InvalidResponse(e.to_string()))?;
        parse_search_response(&body)
    }
}

/// JQL selecting all epics of a project.
fn jql_epics(project_key: &str) -> String {
    format!("project = {project_key} AND issuetype = Epic ORDER BY created ASC")
}

/// JQL selecting children of one parent issue by type.
fn jql_children(project_key: &str, issue_type: &str, parent_key: &str) -> String {
    format!(
        "project = {project_key} AND issuetype = \"{issue_type}\" AND parent = {parent_key} \
         ORDER BY created ASC"
    )
}

/// Parse a Jira search response body into issues. Null or missing
/// descriptions become empty strings; a missing key is an error.
fn parse_search_response(body: &Value) -> Result<Vec<Issue>, TrackerError> {
    let issues = body
        .get("issues")
        .and_then(|i| i.as_array())
        .ok_or_else(|| TrackerError::InvalidResponse("missing issues array".to_string()))?;

    issues
        .iter()
        .map(|issue| {
            let key = issue
                .get("key")
                .and_then(|k| k.as_str())
                .ok_or_else(|| {
                    TrackerError::InvalidResponse("issue without a key".to_string())
                })?
                .to_string();
            let fields = issue.get("fields").cloned().unwrap_or(Value::Null);
            let summary = fields
                .get("summary")
                .and_then(|s| s.as_str())
                .unwrap_or("")
                .to_string();
            let description = fields
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or("")
                .to_string();
            Ok(Issue {
                key,
                summary,
                description,
            })
        })
        .collect()
}
