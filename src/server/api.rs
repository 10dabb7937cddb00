//! JSON API over the experiment store
//!
//! Every mutation goes through the lifecycle controller, so the HTTP surface
//! cannot bypass the lifecycle rules. Errors map to status codes:
//! 409 lifecycle violation, 422 invalid input, 404 unknown experiment or
//! change set, 502 backend failure.

use crate::controller::lifecycle::{display_share, is_editable};
use crate::controller::EngineError;
use crate::model::{ArchivedResult, Experiment, ExperimentState, ObservedMetric, SubjectType};
use crate::server::health::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    /// A collaborator other than the backend failed (e.g. the sample source)
    Upstream(String),
    NotFound(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Engine(EngineError::InvalidOperation(_)) => StatusCode::CONFLICT,
            ApiError::Engine(EngineError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Engine(EngineError::Persistence(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Engine(EngineError::ExperimentNotFound(_))
            | ApiError::Engine(EngineError::ChangeSetOutOfRange { .. }) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Engine(e) => e.to_string(),
            ApiError::Upstream(message) | ApiError::NotFound(message) => message.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = %status, error = %self.message(), "Request failed upstream");
        }
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Experiment plus the fields derived from its flags
#[derive(Debug, Serialize, Deserialize)]
pub struct ExperimentView {
    #[serde(flatten)]
    pub experiment: Experiment,
    pub state: ExperimentState,
    pub editable: bool,
    /// Test share as shown in the percentage field ("" when cleared)
    #[serde(rename = "shareDisplay")]
    pub share_display: String,
}

impl From<Experiment> for ExperimentView {
    fn from(experiment: Experiment) -> Self {
        ExperimentView {
            state: experiment.state(),
            editable: is_editable(&experiment),
            share_display: display_share(experiment.audience.test_share),
            experiment,
        }
    }
}

fn view(experiment: Experiment) -> Json<ExperimentView> {
    Json(experiment.into())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MetadataRequest {
    pub name: Option<String>,
    pub codename: Option<String>,
    pub comment: Option<String>,
    #[serde(rename = "observedMetrics")]
    pub observed_metrics: Option<Vec<ObservedMetric>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AudienceRequest {
    #[serde(rename = "segmentID")]
    pub segment_id: Option<String>,
    /// Percentage as typed ("10" is 10%); "" clears
    pub share: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SubjectRequest {
    #[serde(rename = "subjectType")]
    pub subject_type: Option<SubjectType>,
    #[serde(rename = "subjectID")]
    pub subject_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OverrideFieldRequest {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct OverrideValueRequest {
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    #[serde(rename = "archivedResult")]
    pub archived_result: ArchivedResult,
    #[serde(rename = "shouldRollout", default)]
    pub should_rollout: bool,
}

#[derive(Debug, Deserialize)]
pub struct ArchivedResultRequest {
    #[serde(rename = "archivedResult")]
    pub archived_result: ArchivedResult,
}

async fn list_experiments(State(state): State<AppState>) -> Json<Vec<ExperimentView>> {
    Json(
        state
            .store
            .experiments()
            .into_iter()
            .map(ExperimentView::from)
            .collect(),
    )
}

async fn reload_experiments(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ExperimentView>>> {
    let experiments = state.store.list().await?;
    Ok(Json(
        experiments.into_iter().map(ExperimentView::from).collect(),
    ))
}

async fn create_experiment(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ExperimentView>)> {
    let mut draft = state.store.new_draft();
    if !body.is_empty() {
        let metadata: MetadataRequest = serde_json::from_slice(&body)
            .map_err(|e| EngineError::validation(format!("Invalid request body: {}", e)))?;
        apply_metadata(state.store.controller(), &mut draft, metadata)?;
    }
    let created = state.store.create(draft).await?;
    Ok((StatusCode::CREATED, view(created)))
}

async fn get_experiment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExperimentView>> {
    state
        .store
        .get(&id)
        .map(view)
        .ok_or_else(|| ApiError::NotFound(format!("Experiment not found: {}", id)))
}

async fn replace_experiment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(experiment): Json<Experiment>,
) -> ApiResult<Json<ExperimentView>> {
    if experiment.id != id {
        return Err(EngineError::validation(format!(
            "body id {} does not match path id {}",
            experiment.id, id
        ))
        .into());
    }
    state.store.update(experiment.clone())?;
    Ok(view(experiment))
}

async fn delete_experiment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExperimentView>> {
    Ok(view(state.store.delete(&id).await?))
}

fn apply_metadata(
    controller: &crate::controller::LifecycleController,
    experiment: &mut Experiment,
    metadata: MetadataRequest,
) -> Result<(), EngineError> {
    if let Some(name) = metadata.name {
        controller.set_name(experiment, name)?;
    }
    if let Some(codename) = metadata.codename {
        controller.set_codename(experiment, &codename)?;
    }
    if let Some(comment) = metadata.comment {
        controller.set_comment(experiment, comment)?;
    }
    if let Some(metrics) = metadata.observed_metrics {
        controller.set_observed_metrics(experiment, metrics)?;
    }
    Ok(())
}

async fn update_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(metadata): Json<MetadataRequest>,
) -> ApiResult<Json<ExperimentView>> {
    let (_, experiment) = state
        .store
        .edit(&id, |ctrl, exp| apply_metadata(ctrl, exp, metadata))?;
    Ok(view(experiment))
}

async fn start_experiment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExperimentView>> {
    let (_, experiment) = state.store.edit(&id, |ctrl, exp| ctrl.start(exp))?;
    Ok(view(experiment))
}

async fn pause_experiment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExperimentView>> {
    let (_, experiment) = state
        .store
        .edit(&id, |ctrl, exp| ctrl.set_paused(exp, true))?;
    Ok(view(experiment))
}

async fn resume_experiment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExperimentView>> {
    let (_, experiment) = state
        .store
        .edit(&id, |ctrl, exp| ctrl.set_paused(exp, false))?;
    Ok(view(experiment))
}

async fn archive_experiment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ArchiveRequest>,
) -> ApiResult<Json<ExperimentView>> {
    let current = state
        .store
        .get(&id)
        .ok_or_else(|| EngineError::ExperimentNotFound(id.clone()))?;
    let snapshot = state.results.snapshot(&current).await;
    let archived = state
        .store
        .archive(
            &id,
            request.archived_result,
            snapshot,
            request.should_rollout,
        )
        .await?;
    Ok(view(archived))
}

async fn set_archived_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ArchivedResultRequest>,
) -> ApiResult<Json<ExperimentView>> {
    let (_, experiment) = state.store.edit(&id, |ctrl, exp| {
        ctrl.set_archived_result(exp, request.archived_result)
    })?;
    Ok(view(experiment))
}

async fn update_audience(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AudienceRequest>,
) -> ApiResult<Json<ExperimentView>> {
    let (_, experiment) = state.store.edit(&id, |ctrl, exp| {
        if let Some(segment_id) = &request.segment_id {
            ctrl.set_base_segment(exp, segment_id)?;
        }
        if let Some(share) = &request.share {
            ctrl.set_share(exp, share)?;
        }
        Ok(())
    })?;
    Ok(view(experiment))
}

async fn add_change_set(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<ExperimentView>)> {
    let (_, experiment) = state
        .store
        .edit(&id, |ctrl, exp| ctrl.add_change_set(exp))?;
    Ok((StatusCode::CREATED, view(experiment)))
}

async fn remove_change_set(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
) -> ApiResult<Json<ExperimentView>> {
    let (_, experiment) = state
        .store
        .edit(&id, |ctrl, exp| ctrl.remove_change_set(exp, index))?;
    Ok(view(experiment))
}

async fn update_subject(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
    Json(request): Json<SubjectRequest>,
) -> ApiResult<Json<ExperimentView>> {
    let (_, experiment) = state.store.edit(&id, |ctrl, exp| {
        if let Some(subject_type) = request.subject_type {
            ctrl.set_subject_type(exp, index, subject_type)?;
        }
        if let Some(subject_id) = request.subject_id {
            ctrl.set_subject_id(exp, index, subject_id)?;
        }
        Ok(())
    })?;
    Ok(view(experiment))
}

async fn add_override_field(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
    Json(request): Json<OverrideFieldRequest>,
) -> ApiResult<(StatusCode, Json<ExperimentView>)> {
    let (_, experiment) = state.store.edit(&id, |ctrl, exp| {
        ctrl.add_override_field(exp, index, &request.key)
    })?;
    Ok((StatusCode::CREATED, view(experiment)))
}

async fn set_override_value(
    State(state): State<AppState>,
    Path((id, index, key)): Path<(String, usize, String)>,
    Json(request): Json<OverrideValueRequest>,
) -> ApiResult<Json<ExperimentView>> {
    let (_, experiment) = state.store.edit(&id, |ctrl, exp| {
        ctrl.set_override_value(exp, index, &key, request.value)
    })?;
    Ok(view(experiment))
}

async fn remove_override_field(
    State(state): State<AppState>,
    Path((id, index, key)): Path<(String, usize, String)>,
) -> ApiResult<Json<ExperimentView>> {
    let (_, experiment) = state
        .store
        .edit(&id, |ctrl, exp| ctrl.remove_override_field(exp, index, &key))?;
    Ok(view(experiment))
}

async fn experiment_results(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let experiment = state
        .store
        .get(&id)
        .ok_or_else(|| EngineError::ExperimentNotFound(id.clone()))?;
    let samples = state
        .results
        .time_series(&experiment)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    Ok(Json(json!({
        "experimentID": experiment.id,
        "state": experiment.state(),
        "samples": samples,
    })))
}

async fn flush_writes(State(state): State<AppState>) -> Json<Value> {
    let flushed = state.store.flush().await;
    Json(json!({ "flushed": flushed }))
}

/// Routes of the experiment API
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/experiments", get(list_experiments).post(create_experiment))
        .route("/experiments/reload", post(reload_experiments))
        .route("/experiments/flush", post(flush_writes))
        .route(
            "/experiments/{id}",
            get(get_experiment)
                .put(replace_experiment)
                .delete(delete_experiment),
        )
        .route("/experiments/{id}/metadata", put(update_metadata))
        .route("/experiments/{id}/start", post(start_experiment))
        .route("/experiments/{id}/pause", post(pause_experiment))
        .route("/experiments/{id}/resume", post(resume_experiment))
        .route("/experiments/{id}/archive", post(archive_experiment))
        .route("/experiments/{id}/archived-result", put(set_archived_result))
        .route("/experiments/{id}/audience", put(update_audience))
        .route("/experiments/{id}/results", get(experiment_results))
        .route("/experiments/{id}/change-sets", post(add_change_set))
        .route(
            "/experiments/{id}/change-sets/{index}",
            delete(remove_change_set),
        )
        .route(
            "/experiments/{id}/change-sets/{index}/subject",
            put(update_subject),
        )
        .route(
            "/experiments/{id}/change-sets/{index}/overrides",
            post(add_override_field),
        )
        .route(
            "/experiments/{id}/change-sets/{index}/overrides/{key}",
            put(set_override_value).delete(remove_override_field),
        )
}
