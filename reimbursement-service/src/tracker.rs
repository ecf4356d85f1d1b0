use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info};

use claims_core::{CaseStatus, SurgeryCase, TrackerConfig};

use crate::api::{ApiError, ApiResult, AppState, bad_request_error, internal_error, not_found_error};

/// Maps the five internal statuses onto the tracker's binary completed
/// flag. Lossy by design; do not infer richer semantics from it.
pub fn externally_completed(status: CaseStatus) -> bool {
    matches!(
        status,
        CaseStatus::Approved | CaseStatus::Rejected | CaseStatus::Completed
    )
}

/// One-way mirror into the external task tracker. Every call is
/// best-effort and attempted exactly once.
pub struct TrackerClient {
    http: reqwest::Client,
    config: TrackerConfig,
}

impl TrackerClient {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Creates the mirrored task and returns its external identifier.
    pub async fn create_task(&self, case: &SurgeryCase) -> anyhow::Result<String> {
        let task = json!({
            "data": {
                "name": format!("Reembolso - {} - {}", case.patient_name, case.surgery_type),
                "notes": format!(
                    "Paciente: {}\nCPF: {}\nTelefone: {}\nCirurgia: {}\nData da Cirurgia: {}\n\
                     Médico: {}\nHospital: {}\nConvênio: {}",
                    case.patient_name,
                    case.patient_cpf,
                    case.patient_phone,
                    case.surgery_type,
                    case.surgery_date.format("%Y-%m-%d"),
                    case.doctor_name,
                    case.hospital_name,
                    case.insurance_company,
                ),
                "projects": [self.config.project_id],
                "due_on": Utc::now().format("%Y-%m-%d").to_string(),
            }
        });

        let response = self
            .http
            .post(format!("{}/tasks", self.config.api_url))
            .bearer_auth(&self.config.api_token)
            .json(&task)
            .send()
            .await?;

        if response.status().as_u16() != 201 {
            anyhow::bail!("task create rejected with status {}", response.status());
        }

        let body: Value = response.json().await?;
        body.pointer("/data/gid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("task create response missing data.gid"))
    }

    pub async fn update_task_status(
        &self,
        task_id: &str,
        status: CaseStatus,
        notes: Option<&str>,
    ) -> anyhow::Result<()> {
        let mut data = json!({ "completed": externally_completed(status) });
        if let Some(notes) = notes {
            data["notes"] = json!(notes);
        }

        let response = self
            .http
            .put(format!("{}/tasks/{}", self.config.api_url, task_id))
            .bearer_auth(&self.config.api_token)
            .json(&json!({ "data": data }))
            .send()
            .await?;

        if response.status().as_u16() != 200 {
            anyhow::bail!("task update rejected with status {}", response.status());
        }
        Ok(())
    }

    pub async fn add_comment(&self, task_id: &str, text: &str) -> anyhow::Result<()> {
        let response = self
            .http
            .post(format!("{}/tasks/{}/stories", self.config.api_url, task_id))
            .bearer_auth(&self.config.api_token)
            .json(&json!({ "data": { "text": text } }))
            .send()
            .await?;

        if response.status().as_u16() != 201 {
            anyhow::bail!("comment rejected with status {}", response.status());
        }
        Ok(())
    }
}

// Inbound change events from the tracker.

#[derive(Debug, Deserialize)]
pub struct TrackerWebhookPayload {
    #[serde(default)]
    pub events: Vec<TrackerEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerEvent {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub action: String,
    pub resource: TrackerResource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerResource {
    pub gid: String,
}

/// Hook for reconciling inbound tracker changes onto local cases.
#[async_trait]
pub trait TrackerEventHandler: Send + Sync {
    async fn on_task_changed(
        &self,
        case: &SurgeryCase,
        event: &TrackerEvent,
    ) -> anyhow::Result<()>;
}

/// Default handler. No reconciliation is configured yet, so inbound
/// events are accepted and discarded.
pub struct NoopTrackerHandler;

#[async_trait]
impl TrackerEventHandler for NoopTrackerHandler {
    async fn on_task_changed(
        &self,
        case: &SurgeryCase,
        event: &TrackerEvent,
    ) -> anyhow::Result<()> {
        info!(
            case_id = case.id,
            task_gid = %event.resource.gid,
            action = %event.action,
            "tracker event received, no reconciliation configured"
        );
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub surgery_id: i64,
}

pub async fn create_task_route(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let case = load_case(&state, request.surgery_id).await?;

    match state.tracker.create_task(&case).await {
        Ok(task_id) => {
            state
                .store
                .set_tracker_task(case.id, task_id.clone())
                .await
                .map_err(|e| internal_error("Failed to store task reference", &e.to_string()))?;
            Ok((
                StatusCode::CREATED,
                Json(json!({
                    "message": "Tracker task created successfully",
                    "task_id": task_id
                })),
            ))
        }
        Err(e) => {
            error!(surgery_id = case.id, error = %e, "tracker task creation failed");
            Err(internal_error("Failed to create tracker task", &e.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub surgery_id: i64,
    pub status: CaseStatus,
    pub notes: Option<String>,
}

pub async fn update_task_route(
    State(state): State<AppState>,
    Json(request): Json<UpdateTaskRequest>,
) -> ApiResult<Value> {
    let case = load_case(&state, request.surgery_id).await?;
    let task_id = case
        .tracker_task_id
        .as_deref()
        .ok_or_else(|| bad_request_error("No tracker task associated with this surgery"))?;

    match state
        .tracker
        .update_task_status(task_id, request.status, request.notes.as_deref())
        .await
    {
        Ok(()) => Ok(Json(json!({ "message": "Tracker task updated successfully" }))),
        Err(e) => {
            error!(surgery_id = case.id, error = %e, "tracker task update failed");
            Err(internal_error("Failed to update tracker task", &e.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddCommentRequest {
    pub surgery_id: i64,
    pub comment: String,
}

pub async fn add_comment_route(
    State(state): State<AppState>,
    Json(request): Json<AddCommentRequest>,
) -> ApiResult<Value> {
    let case = load_case(&state, request.surgery_id).await?;
    let task_id = case
        .tracker_task_id
        .as_deref()
        .ok_or_else(|| bad_request_error("No tracker task associated with this surgery"))?;

    match state.tracker.add_comment(task_id, &request.comment).await {
        Ok(()) => Ok(Json(json!({ "message": "Comment added successfully" }))),
        Err(e) => {
            error!(surgery_id = case.id, error = %e, "tracker comment failed");
            Err(internal_error("Failed to add comment", &e.to_string()))
        }
    }
}

/// Inbound change events: resolve the referenced case and delegate to the
/// configured handler.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Json(payload): Json<TrackerWebhookPayload>,
) -> Json<Value> {
    for event in &payload.events {
        if event.resource_type != "task" || event.action != "changed" {
            debug!(resource_type = %event.resource_type, action = %event.action, "skipping event");
            continue;
        }

        match state.store.case_by_tracker_task(&event.resource.gid).await {
            Ok(Some(case)) => {
                if let Err(e) = state.tracker_events.on_task_changed(&case, event).await {
                    error!(case_id = case.id, error = %e, "tracker event handler failed");
                }
            }
            Ok(None) => {
                debug!(task_gid = %event.resource.gid, "no local case for tracker task");
            }
            Err(e) => {
                error!(task_gid = %event.resource.gid, error = %e, "tracker task lookup failed");
            }
        }
    }

    Json(json!({ "status": "success" }))
}

async fn load_case(state: &AppState, surgery_id: i64) -> Result<SurgeryCase, ApiError> {
    state
        .store
        .get_case(surgery_id)
        .await
        .map_err(|e| internal_error("Failed to load surgery case", &e.to_string()))?
        .ok_or_else(|| not_found_error("Surgery case not found", surgery_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_collapses_to_completed_flag() {
        assert!(!externally_completed(CaseStatus::Pending));
        assert!(!externally_completed(CaseStatus::InAnalysis));
        assert!(externally_completed(CaseStatus::Approved));
        assert!(externally_completed(CaseStatus::Rejected));
        assert!(externally_completed(CaseStatus::Completed));
    }

    #[test]
    fn webhook_events_parse() {
        let payload: TrackerWebhookPayload = serde_json::from_value(json!({
            "events": [
                { "type": "task", "action": "changed", "resource": { "gid": "120011" } },
                { "type": "story", "action": "added", "resource": { "gid": "120012" } }
            ]
        }))
        .unwrap();

        assert_eq!(payload.events.len(), 2);
        assert_eq!(payload.events[0].resource.gid, "120011");
        assert_eq!(payload.events[1].resource_type, "story");
    }

    #[test]
    fn empty_webhook_body_is_accepted() {
        let payload: TrackerWebhookPayload = serde_json::from_value(json!({})).unwrap();
        assert!(payload.events.is_empty());
    }
}
