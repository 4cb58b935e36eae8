//! MCP server exposing template expansion and work item synchronization tools.

mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use types::*;

use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Serialize;

use crate::models::*;
use crate::remote::{RemoteError, RemoteStore};
use crate::sync::{self, hierarchy, tree_render};
use crate::template;
use crate::template::expand::{exclude_features, expand, ExclusionPolicy, InstanceOverrides};
use crate::template::validate::{validate, Severity};

#[derive(Clone)]
pub struct McpServer {
    store: Arc<dyn RemoteStore>,
    data_dir: PathBuf,
    tool_router: ToolRouter<Self>,
}

impl McpServer {
    pub fn new(store: Arc<dyn RemoteStore>, data_dir: PathBuf) -> Self {
        Self {
            store,
            data_dir,
            tool_router: Self::tool_router(),
        }
    }

    fn remote_err(err: RemoteError) -> McpError {
        match err {
            RemoteError::NotFound(_) | RemoteError::BadRequest(_) => {
                McpError::invalid_params(err.to_string(), None)
            }
            RemoteError::Unauthorized => McpError::internal_error(
                "unauthorized: check AZURE_DEVOPS_PERSONAL_ACCESS_TOKEN",
                None,
            ),
            other => McpError::internal_error(other.to_string(), None),
        }
    }

    fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    /// Collects the per-concern instance flags into override rules. Dotted
    /// keys address a story inside a feature.
    fn build_overrides(req: &GenerateProjectRequest) -> InstanceOverrides {
        let mut overrides = InstanceOverrides::new();
        let flags = [
            (&req.datasources, "Data Source Integration"),
            (&req.dimensions, "Data Modeling Layer.Dimension"),
            (&req.facts, "Data Modeling Layer.Fact"),
            (&req.semantic_models, "Semantic Model"),
            (&req.visualizations, "Presentation Layer"),
        ];
        for (values, key) in flags {
            if let Some(values) = values {
                overrides.insert(key, values.clone());
            }
        }
        overrides
    }

    // ============================================================
    // Tool logic - typed methods shared by the tool handlers and tests
    // ============================================================

    pub async fn generate_project_impl(
        &self,
        req: GenerateProjectRequest,
    ) -> Result<GenerateProjectResponse, McpError> {
        let template_path = Path::new(&req.template_path);
        if !template_path.exists() {
            return Err(McpError::invalid_params(
                format!("Template not found: {}", req.template_path),
                None,
            ));
        }

        let mut doc = template::load_template(template_path)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        if let Some(ref name) = req.project_name {
            if let Some(epic) = doc.epics.first_mut() {
                epic.title = name.clone();
            }
        }

        let policy = if req.exclude_optional_only {
            ExclusionPolicy::OptionalOnly
        } else {
            ExclusionPolicy::AnyFeature
        };
        exclude_features(&mut doc, &req.exclude, policy);

        let overrides = Self::build_overrides(&req);
        let backlog =
            expand(&doc, &overrides).map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        let (errors, warnings): (Vec<_>, Vec<_>) = validate(&backlog)
            .into_iter()
            .partition(|issue| issue.severity == Severity::Error);
        if !errors.is_empty() {
            let detail = errors
                .iter()
                .map(|issue| issue.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(McpError::invalid_params(
                format!("Validation failed: {}", detail),
                None,
            ));
        }

        let output_path = match req.output_path {
            Some(path) => PathBuf::from(path),
            None => {
                let name = backlog
                    .epics
                    .first()
                    .map(|epic| epic.title.as_str())
                    .unwrap_or("project");
                self.data_dir
                    .join(format!("{}.yaml", template::slugify(name)))
            }
        };
        let written = template::save_backlog(&backlog, &output_path)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        Ok(GenerateProjectResponse {
            output_path: written.display().to_string(),
            counts: backlog.counts().into(),
            total_story_points: backlog.total_story_points(),
            total_estimate_hours: backlog.total_estimate_hours(),
            warnings: warnings.iter().map(|issue| issue.to_string()).collect(),
            tree: tree_render::render_backlog(&backlog),
        })
    }

    pub async fn upload_from_template_impl(
        &self,
        req: UploadFromTemplateRequest,
    ) -> Result<UploadFromTemplateResponse, McpError> {
        let path = Path::new(&req.yaml_path);
        if !path.exists() {
            return Err(McpError::invalid_params(
                format!("File not found: {}", req.yaml_path),
                None,
            ));
        }

        let doc = template::load_template(path)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        let backlog = expand(&doc, &InstanceOverrides::new())
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        let errors: Vec<_> = validate(&backlog)
            .into_iter()
            .filter(|issue| issue.severity == Severity::Error)
            .collect();
        if !errors.is_empty() {
            let detail = errors
                .iter()
                .map(|issue| issue.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(McpError::invalid_params(
                format!("Validation failed: {}", detail),
                None,
            ));
        }

        let report = sync::upload(&backlog, self.store.as_ref()).await;

        Ok(UploadFromTemplateResponse {
            file: req.yaml_path,
            report: UploadReportInfo::from(&report),
        })
    }

    pub async fn get_project_status_impl(
        &self,
        req: GetProjectStatusRequest,
    ) -> Result<ProjectStatusResponse, McpError> {
        let records = hierarchy::fetch_hierarchy(self.store.as_ref(), req.epic_title.as_deref())
            .await
            .map_err(Self::remote_err)?;
        if records.is_empty() {
            return Err(McpError::invalid_params("No work items found", None));
        }
        let total_records = records.len();

        let tree = hierarchy::build_tree(records);
        let summary = if req.include_summary {
            Some(SummaryInfo::from(hierarchy::compute_summary(&tree)))
        } else {
            None
        };
        let text = tree_render::render_hierarchy(&tree);

        // Snapshot each epic to YAML so it can be re-uploaded later
        let backlog = hierarchy::to_backlog(&tree);
        let mut saved_files = Vec::new();
        for epic in &backlog.epics {
            let path = self
                .data_dir
                .join(format!("{}.yaml", template::slugify(&epic.title)));
            let single = Backlog {
                epics: vec![epic.clone()],
            };
            let written = template::save_backlog(&single, &path)
                .map_err(|e| McpError::internal_error(e.to_string(), None))?;
            saved_files.push(written.display().to_string());
        }

        Ok(ProjectStatusResponse {
            tree: text,
            summary,
            saved_files,
            total_records,
        })
    }

    pub async fn get_work_item_impl(
        &self,
        req: GetWorkItemRequest,
    ) -> Result<WorkItemInfo, McpError> {
        let item = self
            .store
            .get_item(req.id)
            .await
            .map_err(Self::remote_err)?
            .ok_or_else(|| {
                McpError::invalid_params(format!("Work item {} not found", req.id), None)
            })?;
        Ok(item.into())
    }

    pub async fn search_work_items_impl(
        &self,
        req: SearchWorkItemsRequest,
    ) -> Result<WorkItemListResponse, McpError> {
        let items = self
            .store
            .search_items(&req.title)
            .await
            .map_err(Self::remote_err)?;
        Ok(WorkItemListResponse::new(items))
    }

    pub async fn create_work_item_impl(
        &self,
        req: CreateWorkItemRequest,
    ) -> Result<WorkItemInfo, McpError> {
        let work_item_type = WorkItemType::from_str(&req.work_item_type).ok_or_else(|| {
            McpError::invalid_params(
                format!(
                    "Invalid work item type '{}'. Must be: Epic, Feature, User Story, or Task",
                    req.work_item_type
                ),
                None,
            )
        })?;

        let draft = WorkItemDraft {
            work_item_type,
            title: req.title,
            description: req.description,
            acceptance_criteria: req.acceptance_criteria,
            story_points: req.story_points,
            estimate: req.estimate,
            iteration_path: req.iteration_path,
        }
        .sanitized();

        let item = self
            .store
            .create_item(&draft, req.parent_id)
            .await
            .map_err(Self::remote_err)?;
        Ok(item.into())
    }

    pub async fn update_work_item_impl(
        &self,
        req: UpdateWorkItemRequest,
    ) -> Result<WorkItemInfo, McpError> {
        let update = WorkItemUpdate {
            title: req.title,
            description: req.description,
            state: req.state,
            iteration_path: req.iteration_path,
        };
        let item = self
            .store
            .update_item(req.id, &update)
            .await
            .map_err(Self::remote_err)?;
        Ok(item.into())
    }

    pub async fn run_wiql_query_impl(
        &self,
        req: RunWiqlQueryRequest,
    ) -> Result<WorkItemListResponse, McpError> {
        let items = self
            .store
            .query(&req.query)
            .await
            .map_err(Self::remote_err)?;
        Ok(WorkItemListResponse::new(items))
    }

    pub async fn get_iterations_impl(&self) -> Result<IterationListResponse, McpError> {
        let iterations = self
            .store
            .list_iterations()
            .await
            .map_err(Self::remote_err)?;
        let iterations: Vec<IterationInfo> =
            iterations.into_iter().map(IterationInfo::from).collect();
        let count = iterations.len();
        Ok(IterationListResponse { iterations, count })
    }

    pub async fn create_iteration_impl(
        &self,
        req: CreateIterationRequest,
    ) -> Result<IterationInfo, McpError> {
        let iteration = self
            .store
            .create_iteration(&req.name, req.start_date.as_deref(), req.finish_date.as_deref())
            .await
            .map_err(Self::remote_err)?;
        Ok(iteration.into())
    }

    pub async fn update_iteration_impl(
        &self,
        req: UpdateIterationRequest,
    ) -> Result<IterationInfo, McpError> {
        let update = IterationUpdate {
            name: req.new_name,
            start_date: req.start_date,
            finish_date: req.finish_date,
        };
        let iteration = self
            .store
            .update_iteration(&req.current_name, &update)
            .await
            .map_err(Self::remote_err)?;
        Ok(iteration.into())
    }

    pub async fn subscribe_iterations_impl(
        &self,
        req: SubscribeIterationsRequest,
    ) -> Result<SubscribeIterationsResponse, McpError> {
        let known = self
            .store
            .list_iterations()
            .await
            .map_err(Self::remote_err)?;

        let mut results = Vec::new();
        for name in &req.names {
            let Some(iteration) = known.iter().find(|i| &i.name == name) else {
                results.push(SubscriptionResultInfo {
                    name: name.clone(),
                    identifier: None,
                    outcome: "not_found".to_string(),
                });
                continue;
            };
            let outcome = self
                .store
                .subscribe_iteration(&iteration.identifier)
                .await
                .map_err(Self::remote_err)?;
            results.push(SubscriptionResultInfo {
                name: name.clone(),
                identifier: Some(iteration.identifier.clone()),
                outcome: outcome.as_str().to_string(),
            });
        }

        Ok(SubscribeIterationsResponse { results })
    }
}

#[tool_router]
impl McpServer {
    // ============================================================
    // Template Tools - Expand and upload backlog templates
    // ============================================================

    #[tool(
        description = "Expand a YAML backlog template into a concrete Epic > Feature > User Story > Task hierarchy. Applies instance lists to parameterized features and stories ({{name}} placeholders), drops excluded features, validates the result, and writes the expanded backlog to a YAML file. Returns counts, point totals, validation warnings, and an ASCII preview. Nothing is uploaded; use upload_from_template for that."
    )]
    async fn generate_project(
        &self,
        params: Parameters<GenerateProjectRequest>,
    ) -> Result<CallToolResult, McpError> {
        let response = self.generate_project_impl(params.0).await?;
        Self::json_result(&response)
    }

    #[tool(
        description = "Expand a backlog YAML file and create the hierarchy in Azure DevOps. Idempotent: items whose title already exists under the same parent are skipped, so re-running after a partial failure only creates what is missing. Children of items that could not be created are reported as parent_unavailable. Returns a per-item report with created/skipped/failed counts."
    )]
    async fn upload_from_template(
        &self,
        params: Parameters<UploadFromTemplateRequest>,
    ) -> Result<CallToolResult, McpError> {
        let response = self.upload_from_template_impl(params.0).await?;
        Self::json_result(&response)
    }

    // ============================================================
    // Hierarchy Tools - Inspect what exists remotely
    // ============================================================

    #[tool(
        description = "Fetch the work item hierarchy from Azure DevOps and report it as an ASCII tree plus aggregate counts, state breakdowns, and point totals. Optionally restrict to one epic by exact title. Also writes a local YAML snapshot per epic, which can be re-uploaded with upload_from_template."
    )]
    async fn get_project_status(
        &self,
        params: Parameters<GetProjectStatusRequest>,
    ) -> Result<CallToolResult, McpError> {
        let response = self.get_project_status_impl(params.0).await?;
        Self::json_result(&response)
    }

    // ============================================================
    // Work Item Tools - Point lookups and one-off changes
    // ============================================================

    #[tool(
        description = "Fetch a single work item by id, including description, acceptance criteria, points, parent link, and iteration path."
    )]
    async fn get_work_item(
        &self,
        params: Parameters<GetWorkItemRequest>,
    ) -> Result<CallToolResult, McpError> {
        let response = self.get_work_item_impl(params.0).await?;
        Self::json_result(&response)
    }

    #[tool(
        description = "Find work items whose title matches exactly. Returns full details for each match."
    )]
    async fn search_work_items(
        &self,
        params: Parameters<SearchWorkItemsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let response = self.search_work_items_impl(params.0).await?;
        Self::json_result(&response)
    }

    #[tool(
        description = "Create a single work item. Type must be 'Epic', 'Feature', 'User Story', or 'Task'. Fields that do not apply to the type (e.g. estimate on an Epic) are dropped. Pass parent_id to link the new item under an existing one."
    )]
    async fn create_work_item(
        &self,
        params: Parameters<CreateWorkItemRequest>,
    ) -> Result<CallToolResult, McpError> {
        let response = self.create_work_item_impl(params.0).await?;
        Self::json_result(&response)
    }

    #[tool(
        description = "Update fields on an existing work item. Only the fields you pass are changed; omitted fields keep their current value."
    )]
    async fn update_work_item(
        &self,
        params: Parameters<UpdateWorkItemRequest>,
    ) -> Result<CallToolResult, McpError> {
        let response = self.update_work_item_impl(params.0).await?;
        Self::json_result(&response)
    }

    #[tool(
        description = "Run a raw WIQL query and return the matching work items with full details. The SELECT clause should include [System.Id]."
    )]
    async fn run_wiql_query(
        &self,
        params: Parameters<RunWiqlQueryRequest>,
    ) -> Result<CallToolResult, McpError> {
        let response = self.run_wiql_query_impl(params.0).await?;
        Self::json_result(&response)
    }

    // ============================================================
    // Iteration Tools - Sprint management
    // ============================================================

    #[tool(description = "List the project's iterations (sprints) with their dates and paths.")]
    async fn get_iterations(&self) -> Result<CallToolResult, McpError> {
        let response = self.get_iterations_impl().await?;
        Self::json_result(&response)
    }

    #[tool(
        description = "Create a project iteration and add it to the team's sprint board. Dates accept YYYY-MM-DD or RFC 3339."
    )]
    async fn create_iteration(
        &self,
        params: Parameters<CreateIterationRequest>,
    ) -> Result<CallToolResult, McpError> {
        let response = self.create_iteration_impl(params.0).await?;
        Self::json_result(&response)
    }

    #[tool(
        description = "Rename an iteration or change its dates. The iteration is looked up by its current name."
    )]
    async fn update_iteration(
        &self,
        params: Parameters<UpdateIterationRequest>,
    ) -> Result<CallToolResult, McpError> {
        let response = self.update_iteration_impl(params.0).await?;
        Self::json_result(&response)
    }

    #[tool(
        description = "Add existing iterations to the team's sprint board by name. Names that do not match an existing iteration are reported as not_found."
    )]
    async fn subscribe_iterations(
        &self,
        params: Parameters<SubscribeIterationsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let response = self.subscribe_iterations_impl(params.0).await?;
        Self::json_result(&response)
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: rmcp::model::Implementation {
                name: "backlog-forge".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            instructions: Some(
                r#"BacklogForge expands YAML backlog templates into Epic > Feature > User Story > Task hierarchies and synchronizes them with Azure DevOps.

TEMPLATE FORMAT:
A template is a YAML document with an `epics` list. Each epic has `features`,
each feature has `stories`, each story has `tasks`. Features and stories may
be parameterized: set `parameterized: true` and put a {{name}} placeholder in
the title (and optionally in descriptions, acceptance criteria, or iteration
paths). Expansion stamps out one copy per instance name with {{name}} replaced.
- default_instances: names used when no override list is supplied
- instance_key: the key override lists address a story by, when its title
  alone is ambiguous
- optional: marks a feature that exclusion keywords may target when
  exclude_optional_only is set

EXAMPLE:
  epics:
    - title: Acme Data Platform
      description: Data platform delivery backlog
      features:
        - title: Data Source Integration - {{name}}
          parameterized: true
          default_instances: [SAP, Salesforce]
          stories:
            - title: Connect to {{name}}
              description: Land raw {{name}} data
              story_points: 5
              tasks:
                - title: Configure {{name}} connection
                  estimate: 8

SETUP:
Set AZURE_DEVOPS_ORG_NAME, AZURE_DEVOPS_PROJECT_NAME, and
AZURE_DEVOPS_PERSONAL_ACCESS_TOKEN before starting the server.
AZURE_DEVOPS_API_VERSION overrides the default REST API version (7.1).

GENERATE (local, nothing uploaded):
1. Call generate_project with the template path and any instance lists
   (datasources, dimensions, facts, semantic_models, visualizations)
2. Review the returned tree, counts, and validation warnings
3. The expanded backlog is written to data/<project-slug>.yaml

UPLOAD:
1. Call upload_from_template with the expanded (or raw template) YAML path
2. Items that already exist under the same parent are skipped, so re-running
   after a partial failure is safe
3. Check the report for failed or parent_unavailable entries

INSPECT:
- get_project_status: ASCII tree plus summary of what exists remotely
- search_work_items / get_work_item / run_wiql_query for point lookups
- create_work_item / update_work_item for one-off fixes

ITERATIONS:
- get_iterations, create_iteration, update_iteration, and
  subscribe_iterations manage sprints; create_iteration also adds the new
  iteration to the team's sprint board."#
                    .into(),
            ),
            ..Default::default()
        }
    }
}

pub async fn run_stdio_server(store: Arc<dyn RemoteStore>, data_dir: PathBuf) -> anyhow::Result<()> {
    use tokio::io::{stdin, stdout};

    tracing::info!("Starting MCP server via stdio");

    let service = McpServer::new(store, data_dir);
    let server = service.serve((stdin(), stdout())).await?;

    let quit_reason = server.waiting().await?;
    tracing::info!("MCP server stopped: {:?}", quit_reason);

    Ok(())
}

pub async fn run_http_server(
    store: Arc<dyn RemoteStore>,
    data_dir: PathBuf,
    port: u16,
) -> anyhow::Result<()> {
    use rmcp::transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpService,
    };
    use tower_http::{cors::CorsLayer, trace::TraceLayer};

    let service = StreamableHttpService::new(
        move || Ok(McpServer::new(store.clone(), data_dir.clone())),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let app = axum::Router::new()
        .nest_service("/mcp", service)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("MCP server listening on http://127.0.0.1:{}/mcp", port);

    axum::serve(listener, app).await?;

    Ok(())
}
