// Data API for the coordination engine. Thin handlers: extract the verified
// actor, validate ids at the edge, delegate to the store, map the error
// taxonomy onto status codes. Bootstrap state is surfaced read-only and never
// gates any data-layer route.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use caseboard_core::{
    validate_id, CollaboratorRole, EngineError, InvestigationStatus, PresenceStatus, Priority,
    TaskStatus,
};
use caseboard_session::SessionBootstrapper;
use caseboard_store::{
    Database, EvidenceFilter, InvestigationFilter, InvestigationPatch, NewEvidence,
    NewInvestigation, NewTask, PresenceFilter,
};

use crate::auth::AuthContext;

// ============================================================================
// Application State
// ============================================================================

pub struct AppState {
    pub db: Arc<Database>,
    pub bootstrapper: Arc<SessionBootstrapper>,
    pub start_time: DateTime<Utc>,
}

pub type SharedState = Arc<AppState>;

// ============================================================================
// API envelope
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

type ApiFailure = (StatusCode, Json<ApiResponse<()>>);

fn fail(err: EngineError) -> ApiFailure {
    let status = match &err {
        EngineError::Validation { .. } => StatusCode::BAD_REQUEST,
        EngineError::InvalidTransition { .. }
        | EngineError::InvestigationArchived { .. }
        | EngineError::ConcurrentModification { .. }
        | EngineError::AlreadyMember { .. } => StatusCode::CONFLICT,
        EngineError::PermissionDenied { .. } | EngineError::NotAMember { .. } => {
            StatusCode::FORBIDDEN
        }
        EngineError::IntegrityMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };

    if status.is_server_error() {
        tracing::error!(kind = err.kind(), error = %err, "data api request failed");
    }

    (
        status,
        Json(ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                kind: err.kind(),
                field: err.field(),
                message: err.to_string(),
            }),
        }),
    )
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateInvestigationRequest {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub lead_investigator: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateInvestigationRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub lead_investigator: Option<String>,
    pub metadata: Option<serde_json::Value>,
    /// Optimistic version token from the caller's last read.
    pub expected_updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub target: InvestigationStatus,
    pub expected_updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskStatusRequest {
    pub target: TaskStatus,
    pub expected_updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RecordEvidenceRequest {
    pub task_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub evidence_type: String,
    pub source: String,
    pub content: String,
    pub hash: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub role: Option<CollaboratorRole>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: CollaboratorRole,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub status: PresenceStatus,
    pub investigation_id: Option<String>,
    pub current_location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InvestigationListQuery {
    pub status: Option<InvestigationStatus>,
    pub priority: Option<Priority>,
    pub created_by: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct EvidenceListQuery {
    pub evidence_type: Option<String>,
    pub task_id: Option<String>,
    pub source: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PresenceListQuery {
    pub investigation_id: Option<String>,
    pub status: Option<PresenceStatus>,
}

// ============================================================================
// Investigation endpoints
// ============================================================================

async fn list_investigations(
    State(state): State<SharedState>,
    AuthContext(_actor): AuthContext,
    Query(query): Query<InvestigationListQuery>,
) -> Result<Json<ApiResponse<Vec<caseboard_core::Investigation>>>, ApiFailure> {
    let filter = InvestigationFilter {
        status: query.status,
        priority: query.priority,
        created_by: query.created_by,
        limit: query.limit,
    };
    let investigations = state.db.list_investigations(&filter).map_err(fail)?;
    Ok(ApiResponse::ok(investigations))
}

async fn create_investigation(
    State(state): State<SharedState>,
    AuthContext(actor): AuthContext,
    Json(request): Json<CreateInvestigationRequest>,
) -> Result<Json<ApiResponse<caseboard_core::Investigation>>, ApiFailure> {
    let investigation = state
        .db
        .create_investigation(
            NewInvestigation {
                title: request.title,
                description: request.description,
                priority: request.priority,
                lead_investigator: request.lead_investigator,
                metadata: request.metadata,
            },
            &actor,
        )
        .map_err(fail)?;
    Ok(ApiResponse::ok(investigation))
}

async fn get_investigation(
    State(state): State<SharedState>,
    AuthContext(_actor): AuthContext,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<caseboard_core::Investigation>>, ApiFailure> {
    validate_id("id", &id).map_err(fail)?;
    let investigation = state.db.get_investigation(&id).map_err(fail)?;
    Ok(ApiResponse::ok(investigation))
}

async fn update_investigation(
    State(state): State<SharedState>,
    AuthContext(actor): AuthContext,
    Path(id): Path<String>,
    Json(request): Json<UpdateInvestigationRequest>,
) -> Result<Json<ApiResponse<caseboard_core::Investigation>>, ApiFailure> {
    validate_id("id", &id).map_err(fail)?;
    let investigation = state
        .db
        .update_investigation(
            &id,
            InvestigationPatch {
                title: request.title,
                description: request.description,
                priority: request.priority,
                lead_investigator: request.lead_investigator,
                metadata: request.metadata,
            },
            &actor,
            request.expected_updated_at,
        )
        .map_err(fail)?;
    Ok(ApiResponse::ok(investigation))
}

async fn delete_investigation(
    State(state): State<SharedState>,
    AuthContext(actor): AuthContext,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiFailure> {
    validate_id("id", &id).map_err(fail)?;
    state.db.delete_investigation(&id, &actor).map_err(fail)?;
    Ok(ApiResponse::ok(()))
}

async fn transition_investigation(
    State(state): State<SharedState>,
    AuthContext(actor): AuthContext,
    Path(id): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<ApiResponse<caseboard_core::Investigation>>, ApiFailure> {
    validate_id("id", &id).map_err(fail)?;
    let investigation = state
        .db
        .transition_status(&id, request.target, &actor, request.expected_updated_at)
        .map_err(fail)?;
    Ok(ApiResponse::ok(investigation))
}

// ============================================================================
// Task endpoints
// ============================================================================

async fn list_tasks(
    State(state): State<SharedState>,
    AuthContext(_actor): AuthContext,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<caseboard_core::Task>>>, ApiFailure> {
    validate_id("id", &id).map_err(fail)?;
    let tasks = state.db.list_tasks(&id).map_err(fail)?;
    Ok(ApiResponse::ok(tasks))
}

async fn create_task(
    State(state): State<SharedState>,
    AuthContext(actor): AuthContext,
    Path(id): Path<String>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<Json<ApiResponse<caseboard_core::Task>>, ApiFailure> {
    validate_id("id", &id).map_err(fail)?;
    let task = state
        .db
        .create_task(
            NewTask {
                investigation_id: id,
                title: request.title,
                description: request.description,
                priority: request.priority,
                assigned_to: request.assigned_to,
                due_date: request.due_date,
                metadata: request.metadata,
            },
            &actor,
        )
        .map_err(fail)?;
    Ok(ApiResponse::ok(task))
}

async fn update_task_status(
    State(state): State<SharedState>,
    AuthContext(actor): AuthContext,
    Path(id): Path<String>,
    Json(request): Json<UpdateTaskStatusRequest>,
) -> Result<Json<ApiResponse<caseboard_core::Task>>, ApiFailure> {
    validate_id("id", &id).map_err(fail)?;
    let task = state
        .db
        .update_task_status(&id, request.target, &actor, request.expected_updated_at)
        .map_err(fail)?;
    Ok(ApiResponse::ok(task))
}

// ============================================================================
// Evidence endpoints
// ============================================================================

async fn list_evidence(
    State(state): State<SharedState>,
    AuthContext(_actor): AuthContext,
    Path(id): Path<String>,
    Query(query): Query<EvidenceListQuery>,
) -> Result<Json<ApiResponse<Vec<caseboard_core::EvidenceItem>>>, ApiFailure> {
    validate_id("id", &id).map_err(fail)?;
    let filter = EvidenceFilter {
        evidence_type: query.evidence_type,
        task_id: query.task_id,
        source: query.source,
        limit: query.limit,
    };
    let items = state.db.list_evidence(&id, &filter).map_err(fail)?;
    Ok(ApiResponse::ok(items))
}

async fn record_evidence(
    State(state): State<SharedState>,
    AuthContext(actor): AuthContext,
    Path(id): Path<String>,
    Json(request): Json<RecordEvidenceRequest>,
) -> Result<Json<ApiResponse<caseboard_core::EvidenceItem>>, ApiFailure> {
    validate_id("id", &id).map_err(fail)?;
    let item = state
        .db
        .record_evidence(
            NewEvidence {
                investigation_id: id,
                task_id: request.task_id,
                title: request.title,
                description: request.description,
                evidence_type: request.evidence_type,
                source: request.source,
                content: request.content,
                hash: request.hash,
                metadata: request.metadata,
            },
            &actor,
        )
        .map_err(fail)?;
    Ok(ApiResponse::ok(item))
}

// ============================================================================
// Activity + replay endpoints
// ============================================================================

async fn list_activities(
    State(state): State<SharedState>,
    AuthContext(_actor): AuthContext,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<caseboard_core::Activity>>>, ApiFailure> {
    validate_id("id", &id).map_err(fail)?;
    let activities = state.db.list_activities(&id).map_err(fail)?;
    Ok(ApiResponse::ok(activities))
}

async fn replay_investigation(
    State(state): State<SharedState>,
    AuthContext(_actor): AuthContext,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<caseboard_store::ReplayedState>>, ApiFailure> {
    validate_id("id", &id).map_err(fail)?;
    let replayed = state.db.replay_investigation(&id).map_err(fail)?;
    Ok(ApiResponse::ok(replayed))
}

// ============================================================================
// Collaboration endpoints
// ============================================================================

async fn list_collaborators(
    State(state): State<SharedState>,
    AuthContext(_actor): AuthContext,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Vec<caseboard_core::Collaborator>>>, ApiFailure> {
    validate_id("id", &id).map_err(fail)?;
    let collaborators = state.db.list_collaborators(&id).map_err(fail)?;
    Ok(ApiResponse::ok(collaborators))
}

async fn join_investigation(
    State(state): State<SharedState>,
    AuthContext(actor): AuthContext,
    Path(id): Path<String>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<ApiResponse<caseboard_core::Collaborator>>, ApiFailure> {
    validate_id("id", &id).map_err(fail)?;
    let collaborator = state
        .db
        .join_investigation(&id, &actor.user_id, request.role)
        .map_err(fail)?;
    Ok(ApiResponse::ok(collaborator))
}

async fn leave_investigation(
    State(state): State<SharedState>,
    AuthContext(actor): AuthContext,
    Path((id, user_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<()>>, ApiFailure> {
    validate_id("id", &id).map_err(fail)?;
    if user_id != actor.user_id {
        return Err(fail(EngineError::PermissionDenied {
            user_id: actor.user_id,
            action: "leave on behalf of another user",
        }));
    }
    state.db.leave_investigation(&id, &user_id).map_err(fail)?;
    Ok(ApiResponse::ok(()))
}

async fn change_collaborator_role(
    State(state): State<SharedState>,
    AuthContext(actor): AuthContext,
    Path((id, user_id)): Path<(String, String)>,
    Json(request): Json<ChangeRoleRequest>,
) -> Result<Json<ApiResponse<caseboard_core::Collaborator>>, ApiFailure> {
    validate_id("id", &id).map_err(fail)?;
    let collaborator = state
        .db
        .change_collaborator_role(&id, &user_id, request.role, &actor)
        .map_err(fail)?;
    Ok(ApiResponse::ok(collaborator))
}

// ============================================================================
// Presence endpoints
// ============================================================================

async fn heartbeat(
    State(state): State<SharedState>,
    AuthContext(actor): AuthContext,
    Json(request): Json<HeartbeatRequest>,
) -> Result<Json<ApiResponse<caseboard_core::Presence>>, ApiFailure> {
    if let Some(ref id) = request.investigation_id {
        validate_id("investigation_id", id).map_err(fail)?;
    }
    let presence = state
        .db
        .heartbeat(
            &actor.user_id,
            request.status,
            request.investigation_id.as_deref(),
            request.current_location.as_deref(),
        )
        .map_err(fail)?;
    Ok(ApiResponse::ok(presence))
}

async fn list_presence(
    State(state): State<SharedState>,
    AuthContext(_actor): AuthContext,
    Query(query): Query<PresenceListQuery>,
) -> Result<Json<ApiResponse<Vec<caseboard_core::Presence>>>, ApiFailure> {
    let filter = PresenceFilter {
        investigation_id: query.investigation_id,
        status: query.status,
    };
    let presence = state.db.list_presence(&filter).map_err(fail)?;
    Ok(ApiResponse::ok(presence))
}

// ============================================================================
// Session + health endpoints
// ============================================================================

/// Bootstrap status channel: display-only, carries no data-layer semantics.
async fn bootstrap_status(
    State(state): State<SharedState>,
) -> Json<ApiResponse<caseboard_session::BootstrapStatus>> {
    let status = state.bootstrapper.status();
    Json(ApiResponse {
        success: true,
        data: Some(status),
        error: None,
    })
}

async fn health(State(state): State<SharedState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.db.health_check() {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "uptime_seconds": (Utc::now() - state.start_time).num_seconds(),
            })),
        ),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "degraded",
                "error": err.to_string(),
            })),
        ),
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/session/bootstrap", get(bootstrap_status))
        .route(
            "/api/investigations",
            get(list_investigations).post(create_investigation),
        )
        .route(
            "/api/investigations/:id",
            get(get_investigation)
                .put(update_investigation)
                .delete(delete_investigation),
        )
        .route(
            "/api/investigations/:id/transition",
            post(transition_investigation),
        )
        .route(
            "/api/investigations/:id/tasks",
            get(list_tasks).post(create_task),
        )
        .route("/api/tasks/:id/status", put(update_task_status))
        .route(
            "/api/investigations/:id/evidence",
            get(list_evidence).post(record_evidence),
        )
        .route("/api/investigations/:id/activities", get(list_activities))
        .route("/api/investigations/:id/replay", get(replay_investigation))
        .route(
            "/api/investigations/:id/collaborators",
            get(list_collaborators).post(join_investigation),
        )
        .route(
            "/api/investigations/:id/collaborators/:user_id",
            axum::routing::delete(leave_investigation),
        )
        .route(
            "/api/investigations/:id/collaborators/:user_id/role",
            put(change_collaborator_role),
        )
        .route("/api/presence", get(list_presence))
        .route("/api/presence/heartbeat", post(heartbeat))
        .with_state(state)
}
