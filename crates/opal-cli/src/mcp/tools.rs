//! MCP tool definitions and handlers over the OpenProject client.
//!
//! Every handler returns a JSON envelope with a `success` flag; failures
//! carry the error taxonomy kind and any field-level validation detail
//! the server supplied, so the calling agent can react to the failure
//! class rather than parse prose.

use super::protocol::{ToolCallResult, ToolDefinition};
use opal_client::{ApiError, OpenProjectClient};
use opal_core::{
    ProjectCreateRequest, RelationCreateRequest, SortOrder, WorkPackageCreateRequest,
    WorkPackageQuery, WorkPackageUpdate,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Get all available tool definitions.
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "openproject_health".to_string(),
            description: "Check connectivity to the OpenProject instance and report its version."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "openproject_list_projects".to_string(),
            description: "List projects. Set paginate to walk every page instead of the first one."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "paginate": {
                        "type": "boolean",
                        "description": "Fetch all pages (default: first page only)"
                    }
                },
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "openproject_create_project".to_string(),
            description: "Create a new project.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Project name" },
                    "description": { "type": "string", "description": "Project description" },
                    "status": {
                        "type": "string",
                        "description": "Project status (default: active)"
                    }
                },
                "required": ["name"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "openproject_list_work_packages".to_string(),
            description: "List the work packages of a project.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "project_id": { "type": "integer", "description": "Project ID" },
                    "paginate": {
                        "type": "boolean",
                        "description": "Fetch all pages (default: first page only)"
                    }
                },
                "required": ["project_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "openproject_get_work_package".to_string(),
            description: "Get a single work package by ID.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "work_package_id": { "type": "integer", "description": "Work package ID" }
                },
                "required": ["work_package_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "openproject_create_work_package".to_string(),
            description: "Create a work package in a project, with optional dates for the Gantt \
                          chart."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "project_id": { "type": "integer", "description": "Project ID" },
                    "subject": { "type": "string", "description": "Work package title" },
                    "description": { "type": "string", "description": "Detailed description" },
                    "type_id": { "type": "integer", "description": "Work package type ID" },
                    "status_id": { "type": "integer", "description": "Initial status ID" },
                    "priority_id": { "type": "integer", "description": "Priority ID" },
                    "assignee_id": { "type": "integer", "description": "User ID to assign to" },
                    "parent_id": {
                        "type": "integer",
                        "description": "Parent work package ID for hierarchy"
                    },
                    "start_date": { "type": "string", "description": "Start date (YYYY-MM-DD)" },
                    "due_date": { "type": "string", "description": "Due date (YYYY-MM-DD)" },
                    "estimated_hours": { "type": "number", "description": "Estimated hours" }
                },
                "required": ["project_id", "subject"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "openproject_update_work_package".to_string(),
            description: "Update fields on a work package. Only the supplied fields change; the \
                          update is concurrency-safe via optimistic locking."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "work_package_id": { "type": "integer", "description": "Work package ID" },
                    "subject": { "type": "string", "description": "New title" },
                    "description": { "type": "string", "description": "New description" },
                    "start_date": { "type": "string", "description": "New start date (YYYY-MM-DD)" },
                    "due_date": { "type": "string", "description": "New due date (YYYY-MM-DD)" },
                    "assignee_id": { "type": "integer", "description": "New assignee user ID" },
                    "status_id": { "type": "integer", "description": "New status ID" },
                    "estimated_hours": { "type": "number", "description": "New estimated hours" }
                },
                "required": ["work_package_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "openproject_search_work_packages".to_string(),
            description: "Search work packages with filters. Filters combine with AND; list-valued \
                          filters (status_ids, type_ids, priority_ids) use OR within the list."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "project_id": { "type": "integer", "description": "Filter by project" },
                    "status_ids": {
                        "type": "array", "items": { "type": "integer" },
                        "description": "Filter by status IDs (OR)"
                    },
                    "assignee_id": { "type": "integer", "description": "Filter by assignee" },
                    "type_ids": {
                        "type": "array", "items": { "type": "integer" },
                        "description": "Filter by type IDs (OR)"
                    },
                    "priority_ids": {
                        "type": "array", "items": { "type": "integer" },
                        "description": "Filter by priority IDs (OR)"
                    },
                    "created_after": { "type": "string", "description": "Created on/after (YYYY-MM-DD)" },
                    "created_before": { "type": "string", "description": "Created on/before (YYYY-MM-DD)" },
                    "due_after": { "type": "string", "description": "Due on/after (YYYY-MM-DD)" },
                    "due_before": { "type": "string", "description": "Due on/before (YYYY-MM-DD)" },
                    "subject_contains": { "type": "string", "description": "Substring match on subject" },
                    "custom_filters": {
                        "type": "array", "items": { "type": "object" },
                        "description": "Pre-built OpenProject filter objects, appended after the generated ones"
                    },
                    "sort_by": {
                        "type": "string",
                        "description": "Sort field (id, subject, updatedAt, createdAt, dueDate, startDate, status, priority, type)"
                    },
                    "sort_order": { "type": "string", "enum": ["asc", "desc"] },
                    "page_size": { "type": "integer", "description": "Results per page (1-100)" },
                    "offset": { "type": "integer", "description": "Pagination offset" }
                },
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "openproject_add_comment".to_string(),
            description: "Add a comment to a work package's activity stream.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "work_package_id": { "type": "integer", "description": "Work package ID" },
                    "comment": { "type": "string", "description": "Comment text" }
                },
                "required": ["work_package_id", "comment"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "openproject_list_activities".to_string(),
            description: "Get the activity history (comments, status changes, field updates) of a \
                          work package."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "work_package_id": { "type": "integer", "description": "Work package ID" }
                },
                "required": ["work_package_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "openproject_create_relation".to_string(),
            description: "Create a dependency between two work packages (follows, precedes, \
                          blocks, blocked, relates, duplicates, duplicated)."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "from_id": { "type": "integer", "description": "Source work package ID" },
                    "to_id": { "type": "integer", "description": "Target work package ID" },
                    "relation_type": {
                        "type": "string",
                        "description": "Relation type (default: follows)"
                    },
                    "description": { "type": "string", "description": "Relation description" },
                    "lag": {
                        "type": "integer",
                        "description": "Working days between predecessor finish and successor start"
                    }
                },
                "required": ["from_id", "to_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "openproject_list_relations".to_string(),
            description: "List all relations of a work package.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "work_package_id": { "type": "integer", "description": "Work package ID" }
                },
                "required": ["work_package_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "openproject_delete_relation".to_string(),
            description: "Delete a work package relation by its ID.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "relation_id": { "type": "integer", "description": "Relation ID" }
                },
                "required": ["relation_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "openproject_list_users".to_string(),
            description: "List users, optionally filtered by exact email address.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "email": { "type": "string", "description": "Exact email address filter" }
                },
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "openproject_assign_by_email".to_string(),
            description: "Assign a work package to the user with the given email address."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "work_package_id": { "type": "integer", "description": "Work package ID" },
                    "email": { "type": "string", "description": "Assignee email address" }
                },
                "required": ["work_package_id", "email"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "openproject_list_types".to_string(),
            description: "List work package types (cached; set refresh to bypass the cache)."
                .to_string(),
            input_schema: refresh_schema(),
        },
        ToolDefinition {
            name: "openproject_list_statuses".to_string(),
            description: "List work package statuses (cached; set refresh to bypass the cache)."
                .to_string(),
            input_schema: refresh_schema(),
        },
        ToolDefinition {
            name: "openproject_list_priorities".to_string(),
            description: "List priorities (cached; set refresh to bypass the cache).".to_string(),
            input_schema: refresh_schema(),
        },
        ToolDefinition {
            name: "openproject_list_memberships".to_string(),
            description: "List the members of a project.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "project_id": { "type": "integer", "description": "Project ID" }
                },
                "required": ["project_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "openproject_project_summary".to_string(),
            description: "Summarize a project: its work packages counted by status and by type."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "project_id": { "type": "integer", "description": "Project ID" }
                },
                "required": ["project_id"],
                "additionalProperties": false
            }),
        },
    ]
}

fn refresh_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "refresh": {
                "type": "boolean",
                "description": "Bypass the reference-data cache"
            }
        },
        "additionalProperties": false
    })
}

/// Handle a tool call and return the result.
pub async fn handle_tool_call(
    client: &OpenProjectClient,
    name: &str,
    arguments: Option<Value>,
) -> ToolCallResult {
    let args = arguments.unwrap_or(json!({}));

    match name {
        "openproject_health" => handle_health(client).await,
        "openproject_list_projects" => handle_list_projects(client, args).await,
        "openproject_create_project" => handle_create_project(client, args).await,
        "openproject_list_work_packages" => handle_list_work_packages(client, args).await,
        "openproject_get_work_package" => handle_get_work_package(client, args).await,
        "openproject_create_work_package" => handle_create_work_package(client, args).await,
        "openproject_update_work_package" => handle_update_work_package(client, args).await,
        "openproject_search_work_packages" => handle_search(client, args).await,
        "openproject_add_comment" => handle_add_comment(client, args).await,
        "openproject_list_activities" => handle_list_activities(client, args).await,
        "openproject_create_relation" => handle_create_relation(client, args).await,
        "openproject_list_relations" => handle_list_relations(client, args).await,
        "openproject_delete_relation" => handle_delete_relation(client, args).await,
        "openproject_list_users" => handle_list_users(client, args).await,
        "openproject_assign_by_email" => handle_assign_by_email(client, args).await,
        "openproject_list_types" => handle_reference(client, args, Reference::Types).await,
        "openproject_list_statuses" => handle_reference(client, args, Reference::Statuses).await,
        "openproject_list_priorities" => {
            handle_reference(client, args, Reference::Priorities).await
        }
        "openproject_list_memberships" => handle_list_memberships(client, args).await,
        "openproject_project_summary" => handle_project_summary(client, args).await,
        _ => ToolCallResult::error(format!("Unknown tool: {name}")),
    }
}

/// Render a success envelope.
fn ok(payload: Value) -> ToolCallResult {
    let mut envelope = json!({ "success": true });
    if let (Some(envelope), Some(payload)) = (envelope.as_object_mut(), payload.as_object()) {
        for (key, value) in payload {
            envelope.insert(key.clone(), value.clone());
        }
    }
    ToolCallResult::json(&envelope)
}

/// Render a failure envelope carrying the taxonomy kind and detail.
fn fail(error: &ApiError) -> ToolCallResult {
    let mut payload = json!({
        "success": false,
        "kind": kind(error),
        "error": error.to_string(),
    });
    if let Some(status) = error.status() {
        payload["status"] = json!(status);
    }
    if !error.validation_errors().is_empty() {
        payload["validation_errors"] = json!(error.validation_errors());
    }
    if let Some(body) = error.body() {
        payload["details"] = body.clone();
    }
    ToolCallResult::error(
        serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string()),
    )
}

const fn kind(error: &ApiError) -> &'static str {
    match error {
        ApiError::Transport(_) => "transport",
        ApiError::Protocol { .. } => "protocol",
        ApiError::Validation(_) => "validation",
        ApiError::State(_) => "state",
    }
}

fn bad_args(error: &serde_json::Error) -> ToolCallResult {
    ToolCallResult::error(format!("Invalid arguments: {error}"))
}

async fn handle_health(client: &OpenProjectClient) -> ToolCallResult {
    let status = client.test_connection().await;
    let payload = serde_json::to_value(&status).unwrap_or_default();
    if status.success {
        ToolCallResult::json(&payload)
    } else {
        ToolCallResult::error(
            serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string()),
        )
    }
}

#[derive(Deserialize, Default)]
struct PaginateArgs {
    #[serde(default)]
    paginate: bool,
}

async fn handle_list_projects(client: &OpenProjectClient, args: Value) -> ToolCallResult {
    let args: PaginateArgs = serde_json::from_value(args).unwrap_or_default();
    match client.get_projects(args.paginate).await {
        Ok(projects) => ok(json!({ "count": projects.len(), "projects": projects })),
        Err(e) => fail(&e),
    }
}

#[derive(Deserialize)]
struct CreateProjectArgs {
    name: String,
    #[serde(default)]
    description: String,
    status: Option<String>,
}

async fn handle_create_project(client: &OpenProjectClient, args: Value) -> ToolCallResult {
    let args: CreateProjectArgs = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return bad_args(&e),
    };

    let mut request = match ProjectCreateRequest::new(&args.name, args.description) {
        Ok(r) => r,
        Err(e) => return fail(&e.into()),
    };
    if let Some(status) = args.status {
        request = request.with_status(status);
    }

    match client.create_project(&request).await {
        Ok(project) => ok(json!({
            "message": format!("Project '{}' created successfully", request.name),
            "project": project,
        })),
        Err(e) => fail(&e),
    }
}

#[derive(Deserialize)]
struct ListWorkPackagesArgs {
    project_id: i64,
    #[serde(default)]
    paginate: bool,
}

async fn handle_list_work_packages(client: &OpenProjectClient, args: Value) -> ToolCallResult {
    let args: ListWorkPackagesArgs = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return bad_args(&e),
    };
    match client.get_work_packages(args.project_id, args.paginate).await {
        Ok(items) => ok(json!({ "count": items.len(), "work_packages": items })),
        Err(e) => fail(&e),
    }
}

#[derive(Deserialize)]
struct WorkPackageIdArgs {
    work_package_id: i64,
}

async fn handle_get_work_package(client: &OpenProjectClient, args: Value) -> ToolCallResult {
    let args: WorkPackageIdArgs = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return bad_args(&e),
    };
    match client.get_work_package(args.work_package_id).await {
        Ok(item) => ok(json!({ "work_package": item })),
        Err(e) => fail(&e),
    }
}

#[derive(Deserialize)]
struct CreateWorkPackageArgs {
    project_id: i64,
    subject: String,
    #[serde(default)]
    description: String,
    type_id: Option<i64>,
    status_id: Option<i64>,
    priority_id: Option<i64>,
    assignee_id: Option<i64>,
    parent_id: Option<i64>,
    start_date: Option<String>,
    due_date: Option<String>,
    estimated_hours: Option<f64>,
}

async fn handle_create_work_package(client: &OpenProjectClient, args: Value) -> ToolCallResult {
    let args: CreateWorkPackageArgs = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return bad_args(&e),
    };

    let mut request = match WorkPackageCreateRequest::new(args.project_id, &args.subject) {
        Ok(r) => r,
        Err(e) => return fail(&e.into()),
    };
    request = request.with_description(args.description);
    if let Some(id) = args.type_id {
        request = request.with_type(id);
    }
    if let Some(id) = args.status_id {
        request = request.with_status(id);
    }
    if let Some(id) = args.priority_id {
        request = request.with_priority(id);
    }
    if let Some(id) = args.assignee_id {
        request = request.with_assignee(id);
    }
    if let Some(id) = args.parent_id {
        request = request.with_parent(id);
    }
    if let Some(date) = args.start_date {
        request = request.with_start_date(date);
    }
    if let Some(date) = args.due_date {
        request = request.with_due_date(date);
    }
    if let Some(hours) = args.estimated_hours {
        request = request.with_estimated_hours(hours);
    }

    match client.create_work_package(&request).await {
        Ok(item) => ok(json!({
            "message": format!("Work package '{}' created successfully", request.subject),
            "work_package": item,
        })),
        Err(e) => fail(&e),
    }
}

#[derive(Deserialize)]
struct UpdateWorkPackageArgs {
    work_package_id: i64,
    subject: Option<String>,
    description: Option<String>,
    start_date: Option<String>,
    due_date: Option<String>,
    assignee_id: Option<i64>,
    status_id: Option<i64>,
    estimated_hours: Option<f64>,
}

async fn handle_update_work_package(client: &OpenProjectClient, args: Value) -> ToolCallResult {
    let args: UpdateWorkPackageArgs = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return bad_args(&e),
    };

    let update = WorkPackageUpdate {
        subject: args.subject,
        description: args.description,
        start_date: args.start_date,
        due_date: args.due_date,
        assignee_id: args.assignee_id,
        status_id: args.status_id,
        estimated_hours: args.estimated_hours,
    };

    match client.update_work_package(args.work_package_id, &update).await {
        Ok(item) => ok(json!({
            "message": format!("Work package {} updated successfully", args.work_package_id),
            "work_package": item,
        })),
        Err(e) => fail(&e),
    }
}

#[derive(Deserialize, Default)]
struct SearchArgs {
    project_id: Option<i64>,
    #[serde(default)]
    status_ids: Vec<i64>,
    assignee_id: Option<i64>,
    #[serde(default)]
    type_ids: Vec<i64>,
    #[serde(default)]
    priority_ids: Vec<i64>,
    created_after: Option<String>,
    created_before: Option<String>,
    due_after: Option<String>,
    due_before: Option<String>,
    subject_contains: Option<String>,
    #[serde(default)]
    custom_filters: Vec<Value>,
    sort_by: Option<String>,
    sort_order: Option<String>,
    page_size: Option<u32>,
    offset: Option<u32>,
}

async fn handle_search(client: &OpenProjectClient, args: Value) -> ToolCallResult {
    let args: SearchArgs = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return bad_args(&e),
    };

    // The query layer clamps silently; the tool surface rejects instead.
    if let Some(size) = args.page_size {
        if !(1..=100).contains(&size) {
            return fail(&ApiError::Validation(format!(
                "page_size must be between 1 and 100, got {size}"
            )));
        }
    }
    for (field, date) in [
        ("created_after", args.created_after.as_deref()),
        ("created_before", args.created_before.as_deref()),
        ("due_after", args.due_after.as_deref()),
        ("due_before", args.due_before.as_deref()),
    ] {
        if let Some(date) = date {
            if let Err(e) = opal_core::request::check_date(field, date) {
                return fail(&e.into());
            }
        }
    }
    if args.custom_filters.iter().any(|f| !f.is_object()) {
        return fail(&ApiError::Validation(
            "each custom filter must be a JSON object".to_string(),
        ));
    }

    let query = WorkPackageQuery {
        project_id: args.project_id,
        status_ids: args.status_ids,
        assignee_id: args.assignee_id,
        type_ids: args.type_ids,
        priority_ids: args.priority_ids,
        created_after: args.created_after,
        created_before: args.created_before,
        due_after: args.due_after,
        due_before: args.due_before,
        subject_contains: args.subject_contains,
        custom_filters: args.custom_filters,
        sort_by: args.sort_by,
        sort_order: match args.sort_order.as_deref() {
            Some("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        },
        page_size: args.page_size,
        offset: args.offset,
    };

    match client.search_work_packages(&query).await {
        Ok(envelope) => {
            let elements = opal_core::hal::elements(&envelope);
            ok(json!({
                "count": elements.len(),
                "total": opal_core::hal::total(&envelope),
                "work_packages": elements,
            }))
        }
        Err(e) => fail(&e),
    }
}

#[derive(Deserialize)]
struct AddCommentArgs {
    work_package_id: i64,
    comment: String,
}

async fn handle_add_comment(client: &OpenProjectClient, args: Value) -> ToolCallResult {
    let args: AddCommentArgs = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return bad_args(&e),
    };
    match client.add_comment(args.work_package_id, &args.comment).await {
        Ok(activity) => ok(json!({
            "message": format!("Comment added to work package {}", args.work_package_id),
            "activity": activity,
        })),
        Err(e) => fail(&e),
    }
}

async fn handle_list_activities(client: &OpenProjectClient, args: Value) -> ToolCallResult {
    let args: WorkPackageIdArgs = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return bad_args(&e),
    };
    match client.get_activities(args.work_package_id).await {
        Ok(activities) => ok(json!({ "count": activities.len(), "activities": activities })),
        Err(e) => fail(&e),
    }
}

#[derive(Deserialize)]
struct CreateRelationArgs {
    from_id: i64,
    to_id: i64,
    relation_type: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    lag: i64,
}

async fn handle_create_relation(client: &OpenProjectClient, args: Value) -> ToolCallResult {
    let args: CreateRelationArgs = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return bad_args(&e),
    };

    let mut request = match RelationCreateRequest::new(args.from_id, args.to_id) {
        Ok(r) => r,
        Err(e) => return fail(&e.into()),
    };
    if let Some(relation_type) = args.relation_type {
        request = request.with_type(relation_type);
    }
    request = request.with_description(args.description).with_lag(args.lag);

    match client.create_relation(&request).await {
        Ok(relation) => ok(json!({
            "message": format!(
                "Relation created: work package {} {} work package {}",
                request.from_id, request.relation_type, request.to_id
            ),
            "relation": relation,
        })),
        Err(e) => fail(&e),
    }
}

async fn handle_list_relations(client: &OpenProjectClient, args: Value) -> ToolCallResult {
    let args: WorkPackageIdArgs = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return bad_args(&e),
    };
    match client.get_relations(args.work_package_id).await {
        Ok(relations) => ok(json!({ "count": relations.len(), "relations": relations })),
        Err(e) => fail(&e),
    }
}

#[derive(Deserialize)]
struct DeleteRelationArgs {
    relation_id: i64,
}

async fn handle_delete_relation(client: &OpenProjectClient, args: Value) -> ToolCallResult {
    let args: DeleteRelationArgs = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return bad_args(&e),
    };
    match client.delete_relation(args.relation_id).await {
        Ok(_) => ok(json!({
            "message": format!("Relation {} deleted", args.relation_id),
        })),
        Err(e) => fail(&e),
    }
}

#[derive(Deserialize, Default)]
struct ListUsersArgs {
    email: Option<String>,
}

async fn handle_list_users(client: &OpenProjectClient, args: Value) -> ToolCallResult {
    let args: ListUsersArgs = serde_json::from_value(args).unwrap_or_default();
    match client.get_users(args.email.as_deref()).await {
        Ok(users) => ok(json!({ "count": users.len(), "users": users })),
        Err(e) => fail(&e),
    }
}

#[derive(Deserialize)]
struct AssignByEmailArgs {
    work_package_id: i64,
    email: String,
}

async fn handle_assign_by_email(client: &OpenProjectClient, args: Value) -> ToolCallResult {
    let args: AssignByEmailArgs = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return bad_args(&e),
    };
    match client
        .assign_work_package_by_email(args.work_package_id, &args.email)
        .await
    {
        Ok(item) => ok(json!({
            "message": format!(
                "Work package {} assigned to {}",
                args.work_package_id, args.email
            ),
            "work_package": item,
        })),
        Err(e) => fail(&e),
    }
}

#[derive(Clone, Copy)]
enum Reference {
    Types,
    Statuses,
    Priorities,
}

#[derive(Deserialize, Default)]
struct RefreshArgs {
    #[serde(default)]
    refresh: bool,
}

async fn handle_reference(
    client: &OpenProjectClient,
    args: Value,
    kind: Reference,
) -> ToolCallResult {
    let args: RefreshArgs = serde_json::from_value(args).unwrap_or_default();
    let use_cache = !args.refresh;
    let (result, key) = match kind {
        Reference::Types => (client.get_types(use_cache).await, "types"),
        Reference::Statuses => (client.get_statuses(use_cache).await, "statuses"),
        Reference::Priorities => (client.get_priorities(use_cache).await, "priorities"),
    };
    match result {
        Ok(items) => ok(json!({ "count": items.len(), key: items })),
        Err(e) => fail(&e),
    }
}

#[derive(Deserialize)]
struct ProjectIdArgs {
    project_id: i64,
}

async fn handle_list_memberships(client: &OpenProjectClient, args: Value) -> ToolCallResult {
    let args: ProjectIdArgs = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return bad_args(&e),
    };
    match client.get_project_memberships(args.project_id).await {
        Ok(members) => ok(json!({ "count": members.len(), "memberships": members })),
        Err(e) => fail(&e),
    }
}

async fn handle_project_summary(client: &OpenProjectClient, args: Value) -> ToolCallResult {
    let args: ProjectIdArgs = match serde_json::from_value(args) {
        Ok(a) => a,
        Err(e) => return bad_args(&e),
    };

    let projects = match client.get_projects(true).await {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    let Some(project) = projects
        .iter()
        .find(|p| p.get("id").and_then(Value::as_i64) == Some(args.project_id))
    else {
        return fail(&ApiError::State(format!(
            "no project found with ID {}",
            args.project_id
        )));
    };

    let items = match client.get_work_packages(args.project_id, true).await {
        Ok(items) => items,
        Err(e) => return fail(&e),
    };
    let (by_status, by_type) = breakdown(&items);

    ok(json!({
        "project": {
            "id": args.project_id,
            "name": project.get("name").cloned().unwrap_or(Value::Null),
        },
        "total_work_packages": items.len(),
        "by_status": by_status,
        "by_type": by_type,
    }))
}

/// Count work packages by the `title` of their status and type links.
/// Items missing a link are counted under `unknown`.
fn breakdown(items: &[Value]) -> (BTreeMap<String, usize>, BTreeMap<String, usize>) {
    let mut by_status = BTreeMap::new();
    let mut by_type = BTreeMap::new();
    for item in items {
        let status = opal_core::hal::link_title(item, "status").unwrap_or("unknown");
        *by_status.entry(status.to_string()).or_insert(0) += 1;
        let kind = opal_core::hal::link_title(item, "type").unwrap_or("unknown");
        *by_type.entry(kind.to_string()).or_insert(0) += 1;
    }
    (by_status, by_type)
}
