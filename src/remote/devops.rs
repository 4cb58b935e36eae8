//! Azure DevOps REST implementation of the remote store.
//!
//! Configuration is via environment variables:
//! - `AZURE_DEVOPS_ORG_NAME` - organization name
//! - `AZURE_DEVOPS_PROJECT_NAME` - project name
//! - `AZURE_DEVOPS_PERSONAL_ACCESS_TOKEN` - PAT, sent as the basic-auth password
//! - `AZURE_DEVOPS_API_VERSION` - optional, defaults to `7.1`

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::{
    Iteration, IterationUpdate, SubscriptionOutcome, WorkItem, WorkItemDraft, WorkItemType,
    WorkItemUpdate,
};
use crate::remote::{fields, normalize_date, RemoteError, RemoteStore};

/// Default REST API version.
const DEFAULT_API_VERSION: &str = "7.1";

/// The batch endpoint accepts at most this many ids per request.
const BATCH_CHUNK: usize = 200;

/// Connection settings for one organization/project pair.
#[derive(Debug, Clone)]
pub struct DevOpsConfig {
    pub organization: String,
    pub project: String,
    pub pat: String,
    pub api_version: String,
}

impl DevOpsConfig {
    /// Reads settings from the environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let organization = require_env("AZURE_DEVOPS_ORG_NAME")?;
        let project = require_env("AZURE_DEVOPS_PROJECT_NAME")?;
        let pat = require_env("AZURE_DEVOPS_PERSONAL_ACCESS_TOKEN")?;
        let api_version = std::env::var("AZURE_DEVOPS_API_VERSION")
            .unwrap_or_else(|_| DEFAULT_API_VERSION.to_string());
        Ok(Self {
            organization,
            project,
            pat,
            api_version,
        })
    }
}

fn require_env(name: &str) -> anyhow::Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => anyhow::bail!("environment variable {} is not set", name),
    }
}

/// HTTP client for the Azure DevOps work item tracking API.
#[derive(Debug, Clone)]
pub struct DevOpsClient {
    config: DevOpsConfig,
    client: Client,
}

impl DevOpsClient {
    pub fn new(config: DevOpsConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Create client from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self::new(DevOpsConfig::from_env()?))
    }

    fn wit_url(&self, path: &str) -> String {
        format!(
            "https://dev.azure.com/{}/{}/_apis/wit/{}",
            self.config.organization, self.config.project, path
        )
    }

    fn work_url(&self, path: &str) -> String {
        format!(
            "https://dev.azure.com/{}/{}/_apis/work/{}",
            self.config.organization, self.config.project, path
        )
    }

    /// Build a request with auth and the api-version query parameter.
    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth("", Some(&self.config.pat))
            .query(&[("api-version", self.config.api_version.as_str())])
    }

    /// Handle response, converting HTTP errors to RemoteError.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            match status {
                StatusCode::NOT_FOUND => Err(RemoteError::NotFound(body)),
                StatusCode::BAD_REQUEST => Err(RemoteError::BadRequest(body)),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::Unauthorized),
                _ => Err(RemoteError::Server(format!("{}: {}", status, body))),
            }
        }
    }

    /// Percent-encode a URL path segment (type and iteration names may
    /// contain spaces).
    fn encode(segment: &str) -> String {
        segment
            .chars()
            .map(|c| match c {
                ' ' => "%20".to_string(),
                '%' => "%25".to_string(),
                '/' => "%2F".to_string(),
                '?' => "%3F".to_string(),
                '#' => "%23".to_string(),
                '&' => "%26".to_string(),
                _ => c.to_string(),
            })
            .collect()
    }

    async fn run_wiql(&self, wiql: &str) -> Result<Vec<u64>, RemoteError> {
        let url = self.wit_url("wiql");
        let response = self
            .request(Method::POST, &url)
            .json(&json!({ "query": wiql }))
            .send()
            .await?;
        let parsed: WiqlResponse = self.handle_response(response).await?;
        Ok(parsed.work_items.into_iter().map(|r| r.id).collect())
    }

    /// Fetch work item details in chunks of 200 (API limit).
    async fn fetch_batch(&self, ids: &[u64]) -> Result<Vec<WorkItem>, RemoteError> {
        let field_list = [
            fields::ID,
            fields::TITLE,
            fields::WORK_ITEM_TYPE,
            fields::STATE,
            fields::DESCRIPTION,
            fields::PARENT,
            fields::ITERATION_PATH,
            fields::ACCEPTANCE_CRITERIA,
            fields::STORY_POINTS,
            fields::EFFORT,
        ]
        .join(",");

        let mut items = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_CHUNK) {
            let csv = chunk
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let url = self.wit_url("workitems");
            let response = self
                .request(Method::GET, &url)
                .query(&[("ids", csv.as_str()), ("fields", field_list.as_str())])
                .send()
                .await?;
            let batch: BatchResponse = self.handle_response(response).await?;
            items.extend(batch.value.into_iter().filter_map(RawWorkItem::into_work_item));
        }
        Ok(items)
    }
}

/// WIQL for an exact-title lookup, with single quotes doubled per the
/// query language's escaping rule.
fn title_wiql(title: &str) -> String {
    format!(
        "SELECT [{}] FROM WorkItems WHERE [{}] = '{}'",
        fields::ID,
        fields::TITLE,
        title.replace('\'', "''")
    )
}

#[async_trait]
impl RemoteStore for DevOpsClient {
    async fn create_item(
        &self,
        draft: &WorkItemDraft,
        parent_id: Option<u64>,
    ) -> Result<WorkItem, RemoteError> {
        let mut ops = vec![json!({
            "op": "add",
            "path": format!("/fields/{}", fields::TITLE),
            "value": draft.title,
        })];
        if let Some(ref description) = draft.description {
            ops.push(json!({
                "op": "add",
                "path": format!("/fields/{}", fields::DESCRIPTION),
                "value": to_html(description),
            }));
        }
        if let Some(ref criteria) = draft.acceptance_criteria {
            ops.push(json!({
                "op": "add",
                "path": format!("/fields/{}", fields::ACCEPTANCE_CRITERIA),
                "value": to_html(criteria),
            }));
        }
        if let Some(points) = draft.story_points {
            ops.push(json!({
                "op": "add",
                "path": format!("/fields/{}", fields::STORY_POINTS),
                "value": points,
            }));
        }
        if let Some(estimate) = draft.estimate {
            ops.push(json!({
                "op": "add",
                "path": format!("/fields/{}", fields::EFFORT),
                "value": estimate,
            }));
        }
        if let Some(ref path) = draft.iteration_path {
            ops.push(json!({
                "op": "add",
                "path": format!("/fields/{}", fields::ITERATION_PATH),
                "value": path,
            }));
        }
        if let Some(parent) = parent_id {
            ops.push(json!({
                "op": "add",
                "path": "/relations/-",
                "value": {
                    "rel": "System.LinkTypes.Hierarchy-Reverse",
                    "url": format!(
                        "https://dev.azure.com/{}/_apis/wit/workItems/{}",
                        self.config.organization, parent
                    ),
                },
            }));
        }

        let url = self.wit_url(&format!(
            "workitems/${}",
            Self::encode(draft.work_item_type.as_str())
        ));
        // Content-Type must be set before .json(); reqwest only writes the
        // header when it is absent.
        let response = self
            .request(Method::POST, &url)
            .header("Content-Type", "application/json-patch+json")
            .json(&ops)
            .send()
            .await?;
        let raw: RawWorkItem = self.handle_response(response).await?;
        raw.into_work_item().ok_or_else(|| {
            RemoteError::Server("created item has no recognizable work item type".to_string())
        })
    }

    async fn update_item(
        &self,
        id: u64,
        update: &WorkItemUpdate,
    ) -> Result<WorkItem, RemoteError> {
        if update.is_empty() {
            return self
                .get_item(id)
                .await?
                .ok_or_else(|| RemoteError::NotFound(format!("work item {} not found", id)));
        }

        let mut ops = Vec::new();
        if let Some(ref title) = update.title {
            ops.push(json!({
                "op": "replace",
                "path": format!("/fields/{}", fields::TITLE),
                "value": title,
            }));
        }
        if let Some(ref description) = update.description {
            ops.push(json!({
                "op": "replace",
                "path": format!("/fields/{}", fields::DESCRIPTION),
                "value": description,
            }));
        }
        if let Some(ref state) = update.state {
            ops.push(json!({
                "op": "replace",
                "path": format!("/fields/{}", fields::STATE),
                "value": state,
            }));
        }
        if let Some(ref path) = update.iteration_path {
            ops.push(json!({
                "op": "replace",
                "path": format!("/fields/{}", fields::ITERATION_PATH),
                "value": path,
            }));
        }

        let url = self.wit_url(&format!("workitems/{}", id));
        let response = self
            .request(Method::PATCH, &url)
            .header("Content-Type", "application/json-patch+json")
            .json(&ops)
            .send()
            .await?;
        let raw: RawWorkItem = self.handle_response(response).await?;
        raw.into_work_item().ok_or_else(|| {
            RemoteError::Server("updated item has no recognizable work item type".to_string())
        })
    }

    async fn get_item(&self, id: u64) -> Result<Option<WorkItem>, RemoteError> {
        let url = self.wit_url(&format!("workitems/{}", id));
        let response = self.request(Method::GET, &url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let raw: RawWorkItem = self.handle_response(response).await?;
        Ok(raw.into_work_item())
    }

    async fn search_items(&self, title: &str) -> Result<Vec<WorkItem>, RemoteError> {
        let ids = self.run_wiql(&title_wiql(title)).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_batch(&ids).await
    }

    async fn query(&self, wiql: &str) -> Result<Vec<WorkItem>, RemoteError> {
        let ids = self.run_wiql(wiql).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_batch(&ids).await
    }

    async fn list_iterations(&self) -> Result<Vec<Iteration>, RemoteError> {
        let url = self.wit_url("classificationnodes/iterations");
        let response = self
            .request(Method::GET, &url)
            .query(&[("$depth", "10")])
            .send()
            .await?;
        let root: IterationNode = self.handle_response(response).await?;

        // The root node is the project itself; only descendants are sprints.
        let mut iterations = Vec::new();
        for child in root.children {
            flatten_iterations(child, &mut iterations);
        }
        Ok(iterations)
    }

    async fn create_iteration(
        &self,
        name: &str,
        start_date: Option<&str>,
        finish_date: Option<&str>,
    ) -> Result<Iteration, RemoteError> {
        let mut body = serde_json::Map::new();
        body.insert("name".to_string(), json!(name));
        let mut attributes = serde_json::Map::new();
        if let Some(date) = start_date {
            attributes.insert("startDate".to_string(), json!(normalize_date(date)?));
        }
        if let Some(date) = finish_date {
            attributes.insert("finishDate".to_string(), json!(normalize_date(date)?));
        }
        if !attributes.is_empty() {
            body.insert("attributes".to_string(), Value::Object(attributes));
        }

        let url = self.wit_url("classificationnodes/iterations");
        let response = self.request(Method::POST, &url).json(&body).send().await?;
        let node: IterationNode = self.handle_response(response).await?;
        let iteration = node_to_iteration(node);

        // New iterations do not show on the board until the team picks
        // them up; a failed subscription leaves the created node in place.
        if !iteration.identifier.is_empty() {
            if let Err(e) = self.subscribe_iteration(&iteration.identifier).await {
                tracing::warn!(
                    iteration = %iteration.name,
                    error = %e,
                    "failed to subscribe new iteration to the team"
                );
            }
        }
        Ok(iteration)
    }

    async fn update_iteration(
        &self,
        current_name: &str,
        update: &IterationUpdate,
    ) -> Result<Iteration, RemoteError> {
        let mut body = serde_json::Map::new();
        if let Some(ref name) = update.name {
            body.insert("name".to_string(), json!(name));
        }
        let mut attributes = serde_json::Map::new();
        if let Some(ref date) = update.start_date {
            attributes.insert("startDate".to_string(), json!(normalize_date(date)?));
        }
        if let Some(ref date) = update.finish_date {
            attributes.insert("finishDate".to_string(), json!(normalize_date(date)?));
        }
        if !attributes.is_empty() {
            body.insert("attributes".to_string(), Value::Object(attributes));
        }

        let url = self.wit_url(&format!(
            "classificationnodes/iterations/{}",
            Self::encode(current_name)
        ));
        let response = self.request(Method::PATCH, &url).json(&body).send().await?;
        let node: IterationNode = self.handle_response(response).await?;
        Ok(node_to_iteration(node))
    }

    async fn subscribe_iteration(
        &self,
        identifier: &str,
    ) -> Result<SubscriptionOutcome, RemoteError> {
        let url = self.work_url("teamsettings/iterations");
        let response = self
            .request(Method::POST, &url)
            .json(&json!({ "id": identifier }))
            .send()
            .await?;
        // 409 Conflict means the team already has this iteration
        if response.status() == StatusCode::CONFLICT {
            return Ok(SubscriptionOutcome::AlreadySubscribed);
        }
        let _: Value = self.handle_response(response).await?;
        Ok(SubscriptionOutcome::Subscribed)
    }
}

#[derive(Debug, Deserialize)]
struct WiqlResponse {
    #[serde(rename = "workItems", default)]
    work_items: Vec<WiqlRef>,
}

#[derive(Debug, Deserialize)]
struct WiqlRef {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    value: Vec<RawWorkItem>,
}

#[derive(Debug, Deserialize)]
struct RawWorkItem {
    id: u64,
    #[serde(default)]
    fields: serde_json::Map<String, Value>,
}

impl RawWorkItem {
    /// Maps the raw field dictionary into a typed record. Items of types
    /// outside the four-level hierarchy (bugs, issues) are dropped.
    fn into_work_item(self) -> Option<WorkItem> {
        let type_name = self.fields.get(fields::WORK_ITEM_TYPE)?.as_str()?;
        let work_item_type = WorkItemType::from_str(type_name)?;
        Some(WorkItem {
            id: self.id,
            work_item_type,
            title: str_field(&self.fields, fields::TITLE).unwrap_or_default(),
            state: str_field(&self.fields, fields::STATE).unwrap_or_default(),
            description: str_field(&self.fields, fields::DESCRIPTION),
            acceptance_criteria: str_field(&self.fields, fields::ACCEPTANCE_CRITERIA),
            story_points: num_field(&self.fields, fields::STORY_POINTS),
            estimate: num_field(&self.fields, fields::EFFORT),
            parent_id: self.fields.get(fields::PARENT).and_then(Value::as_u64),
            iteration_path: str_field(&self.fields, fields::ITERATION_PATH),
        })
    }
}

fn str_field(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn num_field(map: &serde_json::Map<String, Value>, key: &str) -> Option<f64> {
    map.get(key).and_then(Value::as_f64)
}

#[derive(Debug, Deserialize)]
struct IterationNode {
    id: u64,
    #[serde(default)]
    identifier: String,
    name: String,
    #[serde(default)]
    path: String,
    attributes: Option<IterationAttributes>,
    #[serde(default)]
    children: Vec<IterationNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IterationAttributes {
    start_date: Option<String>,
    finish_date: Option<String>,
}

fn node_to_iteration(node: IterationNode) -> Iteration {
    let attrs = node.attributes.unwrap_or_default();
    Iteration {
        id: node.id,
        identifier: node.identifier,
        name: node.name,
        path: node.path,
        start_date: attrs.start_date,
        finish_date: attrs.finish_date,
    }
}

fn flatten_iterations(mut node: IterationNode, out: &mut Vec<Iteration>) {
    let children = std::mem::take(&mut node.children);
    out.push(node_to_iteration(node));
    for child in children {
        flatten_iterations(child, out);
    }
}

/// Converts plain text to the HTML the remote store renders in rich-text
/// fields. Bullet lines (`•`) group into `<ul><li>` lists, other non-empty
/// lines become `<p>` paragraphs, blank lines are dropped.
pub fn to_html(text: &str) -> String {
    let mut parts = String::new();
    let mut bullets: Vec<String> = Vec::new();
    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() {
            continue;
        }
        if let Some(rest) = stripped.strip_prefix('•') {
            bullets.push(
                rest.trim_start_matches(|c| c == ' ' || c == '•')
                    .trim()
                    .to_string(),
            );
        } else {
            flush_bullets(&mut parts, &mut bullets);
            parts.push_str("<p>");
            parts.push_str(stripped);
            parts.push_str("</p>");
        }
    }
    flush_bullets(&mut parts, &mut bullets);
    parts
}

fn flush_bullets(parts: &mut String, bullets: &mut Vec<String>) {
    if bullets.is_empty() {
        return;
    }
    parts.push_str("<ul>");
    for bullet in bullets.drain(..) {
        parts.push_str("<li>");
        parts.push_str(&bullet);
        parts.push_str("</li>");
    }
    parts.push_str("</ul>");
}
