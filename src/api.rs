//! Programmatic JSON API.
//!
//! Every call authenticates with username + API key and is checked against the
//! caller's grants, whatever their role. Checks run in a fixed order: required
//! fields, credentials, target lookup, grant, then action validity.

use crate::error::{ControlError, Result};
use crate::gate;
use crate::inventory::InventoryHandle;
use crate::model::{Action, ContainerId, GroupId, User};
use crate::orchestrator::{self, ContainerOutcome, GroupRun, JobRegistry, JobSnapshot};
use crate::runtime::RuntimeClient;
use crate::status;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

#[derive(Clone)]
pub struct ApiState {
    pub inventory: InventoryHandle,
    pub runtime: Arc<dyn RuntimeClient>,
    pub jobs: JobRegistry,
}

/// Ids arrive as JSON numbers or as strings (query strings, form-ish clients).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawId {
    Num(u64),
    Text(String),
}

impl RawId {
    fn parse(&self) -> Option<u64> {
        match self {
            RawId::Num(n) => Some(*n),
            RawId::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Empty text and a JSON `0` both count as not supplied. The text `"0"`
    /// is supplied and simply names nothing.
    fn is_blank(&self) -> bool {
        match self {
            RawId::Num(n) => *n == 0,
            RawId::Text(s) => s.trim().is_empty(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ControlRequest {
    username: Option<String>,
    #[serde(alias = "apiKey")]
    api_key: Option<String>,
    #[serde(alias = "containerId")]
    container_id: Option<RawId>,
    action: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusQuery {
    username: Option<String>,
    #[serde(alias = "apiKey")]
    api_key: Option<String>,
    #[serde(alias = "containerId")]
    container_id: Option<RawId>,
}

#[derive(Debug, Default, Deserialize)]
struct GroupControlRequest {
    username: Option<String>,
    #[serde(alias = "apiKey")]
    api_key: Option<String>,
    #[serde(alias = "groupId")]
    group_id: Option<RawId>,
    action: Option<String>,
    wait: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct GroupStatusQuery {
    username: Option<String>,
    #[serde(alias = "apiKey")]
    api_key: Option<String>,
    #[serde(alias = "groupId")]
    group_id: Option<RawId>,
}

#[derive(Debug, Default, Deserialize)]
struct CredentialsQuery {
    username: Option<String>,
    #[serde(alias = "apiKey")]
    api_key: Option<String>,
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let code = match &self {
            ControlError::Validation(_) => StatusCode::BAD_REQUEST,
            ControlError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ControlError::Authorization(_) => StatusCode::FORBIDDEN,
            ControlError::NotFound(_) => StatusCode::NOT_FOUND,
            ControlError::Conflict(_) => StatusCode::CONFLICT,
            ControlError::Runtime(_) => StatusCode::BAD_GATEWAY,
            ControlError::Storage(_) | ControlError::Credential(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if code.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "API request failed");
        } else {
            tracing::debug!(kind = self.kind(), error = %self, "API request rejected");
        }
        (code, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Body or query that could not be decoded at all counts as missing input.
fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload.map(|Json(v)| v).map_err(|e| {
        tracing::debug!(error = %e, "Undecodable request body");
        ControlError::missing_parameters()
    })
}

fn query<T>(params: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    params.map(|Query(v)| v).map_err(|e| {
        tracing::debug!(error = %e, "Undecodable query string");
        ControlError::missing_parameters()
    })
}

fn present(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|v| !v.is_empty())
}

fn present_id(id: &Option<RawId>) -> Option<&RawId> {
    id.as_ref().filter(|id| !id.is_blank())
}

/// Resolve an already-validated id; an id that is not a number names nothing.
fn lookup_id(raw: &RawId, what: &str) -> Result<u64> {
    raw.parse()
        .ok_or_else(|| ControlError::NotFound(format!("{what} not found")))
}

fn caller(inv: &crate::inventory::Inventory, username: &str, api_key: &str) -> Result<User> {
    gate::authenticate_api(inv, username, api_key).cloned()
}

fn parse_action(raw: &str) -> Result<Action> {
    raw.parse()
        .map_err(|_| ControlError::Validation("Invalid action".into()))
}

async fn control(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<ControlRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let req = body(payload)?;
    let (Some(username), Some(api_key), Some(raw_id), Some(raw_action)) = (
        present(&req.username),
        present(&req.api_key),
        present_id(&req.container_id),
        present(&req.action),
    ) else {
        return Err(ControlError::missing_parameters());
    };

    let container = {
        let inv = state.inventory.read().await?;
        let user = caller(&inv, username, api_key)?;
        let container_id: ContainerId = lookup_id(raw_id, "Container")?;
        let container = inv
            .container(container_id)
            .ok_or_else(|| ControlError::NotFound("Container not found".into()))?;
        gate::check_container_grant(&user, container)?;
        container.clone()
    };
    let action = parse_action(raw_action)?;

    match orchestrator::control_container(state.runtime.as_ref(), &container, action).await? {
        ContainerOutcome::Applied => Ok(Json(json!({
            "status": "success",
            "container": container.display_name,
            "action": action,
        }))),
        ContainerOutcome::Missing(msg) => Err(ControlError::NotFound(msg)),
    }
}

async fn container_status(
    State(state): State<ApiState>,
    params: std::result::Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Json<Value>> {
    let q = query(params)?;
    let (Some(username), Some(api_key), Some(raw_id)) = (
        present(&q.username),
        present(&q.api_key),
        present_id(&q.container_id),
    ) else {
        return Err(ControlError::missing_parameters());
    };

    let container = {
        let inv = state.inventory.read().await?;
        let user = caller(&inv, username, api_key)?;
        let container = inv
            .container(lookup_id(raw_id, "Container")?)
            .ok_or_else(|| ControlError::NotFound("Container not found".into()))?;
        gate::check_container_grant(&user, container)?;
        container.clone()
    };

    let status = status::container_status(state.runtime.as_ref(), &container).await;
    Ok(Json(json!({
        "container_id": container.id,
        "container_name": container.display_name,
        "status": status,
    })))
}

async fn control_group(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<GroupControlRequest>, JsonRejection>,
) -> Result<Response> {
    let req = body(payload)?;
    let (Some(username), Some(api_key), Some(raw_id), Some(raw_action)) = (
        present(&req.username),
        present(&req.api_key),
        present_id(&req.group_id),
        present(&req.action),
    ) else {
        return Err(ControlError::missing_parameters());
    };

    let (user, mut run) = {
        let inv = state.inventory.read().await?;
        let user = caller(&inv, username, api_key)?;
        let group_id: GroupId = lookup_id(raw_id, "Group")?;
        let group = inv
            .group(group_id)
            .ok_or_else(|| ControlError::NotFound("Group not found".into()))?;
        gate::check_group_grant(&user, group)?;
        let action = parse_action(raw_action)?;
        (user, GroupRun::plan(&inv, group, action))
    };

    if req.wait == Some(false) {
        let group = run.group_name().to_string();
        let action = run.action();
        let job_id = state
            .jobs
            .submit(user.id, run, state.runtime.clone())
            .await;
        let accepted = json!({ "job_id": job_id, "group": group, "action": action });
        return Ok((StatusCode::ACCEPTED, Json(accepted)).into_response());
    }

    let outcome = orchestrator::drive(&mut run, state.runtime.as_ref()).await;
    Ok(Json(outcome).into_response())
}

async fn group_status(
    State(state): State<ApiState>,
    params: std::result::Result<Query<GroupStatusQuery>, QueryRejection>,
) -> Result<Json<Value>> {
    let q = query(params)?;
    let (Some(username), Some(api_key), Some(raw_id)) = (
        present(&q.username),
        present(&q.api_key),
        present_id(&q.group_id),
    ) else {
        return Err(ControlError::missing_parameters());
    };

    // Status lookups run against a snapshot so the inventory lock is not held
    // across runtime calls.
    let (inv, group) = {
        let guard = state.inventory.read().await?;
        let user = caller(&guard, username, api_key)?;
        let group = guard
            .group(lookup_id(raw_id, "Group")?)
            .ok_or_else(|| ControlError::NotFound("Group not found".into()))?;
        gate::check_group_grant(&user, group)?;
        let group = group.clone();
        (guard.clone(), group)
    };

    let summary = status::group_status(state.runtime.as_ref(), &inv, &group).await;
    Ok(Json(json!({
        "group_id": group.id,
        "group_name": group.name,
        "status": summary.summary(),
        "container_statuses": summary.members,
    })))
}

async fn job(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
    params: std::result::Result<Query<CredentialsQuery>, QueryRejection>,
) -> Result<Json<JobSnapshot>> {
    let q = query(params)?;
    let (Some(username), Some(api_key)) = (present(&q.username), present(&q.api_key)) else {
        return Err(ControlError::missing_parameters());
    };
    let user = {
        let inv = state.inventory.read().await?;
        caller(&inv, username, api_key)?
    };
    let not_found = || ControlError::NotFound("Job not found".into());
    let job_id = Uuid::parse_str(&job_id).map_err(|_| not_found())?;
    state
        .jobs
        .snapshot(job_id, user.id)
        .await
        .map(Json)
        .ok_or_else(not_found)
}

async fn health() -> &'static str {
    "ok"
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/control", post(control))
        .route("/api/status", get(container_status))
        .route("/api/control_group", post(control_group))
        .route("/api/group_status", get(group_status))
        .route("/api/jobs/{job_id}", get(job))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `addr` until ctrl-c.
pub async fn start(state: ApiState, addr: SocketAddr) -> anyhow::Result<()> {
    use anyhow::Context;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "API server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await
        .context("API server failed")
}
