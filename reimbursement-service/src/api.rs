use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post, put};
use axum::Router;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use claims_core::{
    CaseStatus, CaseStore, CaseUpdate, Document, DocumentType, DocumentUpdate, InMemoryCaseStore,
    NewDocument, NewReport, NewSurgeryCase, NewUser, PostgresCaseStore, Report, Settings,
    SurgeryCase, User, UserUpdate, classify_document,
};

use crate::assistant::AssistantClient;
use crate::tracker::{self, NoopTrackerHandler, TrackerClient, TrackerEventHandler};
use crate::whatsapp::{self, WhatsAppClient};

pub type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
pub type ApiError = (StatusCode, Json<Value>);

const SUMMARY_ERROR_CONTENT: &str = "Erro ao gerar resumo do relatório.";

pub fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

pub fn not_found_error(message: &str, id: i64) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "id": id
        })),
    )
}

pub fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CaseStore>,
    pub assistant: Arc<AssistantClient>,
    pub whatsapp: Arc<WhatsAppClient>,
    pub tracker: Arc<TrackerClient>,
    pub tracker_events: Arc<dyn TrackerEventHandler>,
}

pub async fn create_app(settings: Settings) -> Router {
    let store = create_store(&settings).await;

    let state = AppState {
        store,
        assistant: Arc::new(AssistantClient::new(settings.assistant.clone())),
        whatsapp: Arc::new(WhatsAppClient::new(settings.messaging.clone())),
        tracker: Arc::new(TrackerClient::new(settings.tracker.clone())),
        tracker_events: Arc::new(NoopTrackerHandler),
    };

    build_router(state)
}

async fn create_store(settings: &Settings) -> Arc<dyn CaseStore> {
    match &settings.database_url {
        Some(url) => {
            info!("Using PostgreSQL case store");
            match PostgresCaseStore::connect(url).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    error!(
                        "Failed to connect to PostgreSQL: {}. Falling back to in-memory storage.",
                        e
                    );
                    Arc::new(InMemoryCaseStore::new())
                }
            }
        }
        None => {
            info!("Using in-memory case store (set DATABASE_URL to use PostgreSQL)");
            Arc::new(InMemoryCaseStore::new())
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/surgeries", post(create_surgery).get(list_surgeries))
        .route(
            "/api/surgeries/{id}",
            get(get_surgery).put(update_surgery).delete(delete_surgery),
        )
        .route("/api/surgeries/{id}/status", put(update_surgery_status))
        .route(
            "/api/surgeries/{id}/documents",
            post(create_document).get(list_case_documents),
        )
        .route(
            "/api/documents/{id}",
            get(get_document).put(update_document).delete(delete_document),
        )
        .route("/api/reports", post(create_report).get(list_reports))
        .route("/api/reports/summary", post(generate_summary_report))
        .route("/api/reports/{id}", get(get_report).delete(delete_report))
        .route("/api/users", post(create_user).get(list_users))
        .route(
            "/api/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route(
            "/api/whatsapp/webhook",
            get(whatsapp::verify_webhook).post(whatsapp::receive_webhook),
        )
        .route("/api/whatsapp/send", post(whatsapp::send_message))
        .route("/api/tracker/create-task", post(tracker::create_task_route))
        .route("/api/tracker/update-task", put(tracker::update_task_route))
        .route("/api/tracker/add-comment", post(tracker::add_comment_route))
        .route("/api/tracker/webhook", post(tracker::receive_webhook))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

// ---- surgery cases ----

async fn create_surgery(
    State(state): State<AppState>,
    Json(payload): Json<NewSurgeryCase>,
) -> Result<(StatusCode, Json<SurgeryCase>), ApiError> {
    validate_new_case(&payload)?;

    let case = state
        .store
        .create_case(payload)
        .await
        .map_err(|e| internal_error("Failed to create surgery case", &e.to_string()))?;
    Ok((StatusCode::CREATED, Json(case)))
}

fn validate_new_case(payload: &NewSurgeryCase) -> Result<(), ApiError> {
    if payload.patient_name.trim().is_empty() {
        return Err(bad_request_error("patient_name is required"));
    }
    if payload.patient_phone.trim().is_empty() {
        return Err(bad_request_error("patient_phone is required"));
    }
    if payload.surgery_type.trim().is_empty() {
        return Err(bad_request_error("surgery_type is required"));
    }
    Ok(())
}

async fn list_surgeries(State(state): State<AppState>) -> ApiResult<Vec<SurgeryCase>> {
    state
        .store
        .list_cases()
        .await
        .map(Json)
        .map_err(|e| internal_error("Failed to list surgery cases", &e.to_string()))
}

async fn get_surgery(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<SurgeryCase> {
    match state.store.get_case(id).await {
        Ok(Some(case)) => Ok(Json(case)),
        Ok(None) => Err(not_found_error("Surgery case not found", id)),
        Err(e) => Err(internal_error("Failed to load surgery case", &e.to_string())),
    }
}

async fn update_surgery(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<CaseUpdate>,
) -> ApiResult<SurgeryCase> {
    state
        .store
        .update_case(id, update)
        .await
        .map(Json)
        .map_err(|e| store_error("Surgery case not found", id, e))
}

#[derive(Debug, Deserialize)]
struct StatusUpdateRequest {
    status: CaseStatus,
}

async fn update_surgery_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<StatusUpdateRequest>,
) -> ApiResult<SurgeryCase> {
    state
        .store
        .set_case_status(id, request.status)
        .await
        .map(Json)
        .map_err(|e| store_error("Surgery case not found", id, e))
}

async fn delete_surgery(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Value> {
    state
        .store
        .delete_case(id)
        .await
        .map(|()| Json(json!({ "message": "Surgery case deleted" })))
        .map_err(|e| store_error("Surgery case not found", id, e))
}

// ---- documents ----

#[derive(Debug, Deserialize)]
struct CreateDocumentRequest {
    document_type: Option<DocumentType>,
    file_name: String,
    file_path: String,
    file_size: i64,
    mime_type: String,
    extracted_text: Option<String>,
    is_valid: Option<bool>,
    validation_notes: Option<String>,
}

async fn create_document(
    State(state): State<AppState>,
    Path(case_id): Path<i64>,
    Json(request): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    if request.file_name.trim().is_empty() {
        return Err(bad_request_error("file_name is required"));
    }

    // no explicit type: classify from the extracted text when there is any
    let document_type = request.document_type.unwrap_or_else(|| {
        request
            .extracted_text
            .as_deref()
            .map(classify_document)
            .unwrap_or_default()
    });

    let new = NewDocument {
        document_type,
        file_name: request.file_name,
        file_path: request.file_path,
        file_size: request.file_size,
        mime_type: request.mime_type,
        is_processed: request.extracted_text.is_some(),
        extracted_text: request.extracted_text,
        is_valid: request.is_valid.unwrap_or(true),
        validation_notes: request.validation_notes,
    };

    state
        .store
        .add_document(case_id, new)
        .await
        .map(|doc| (StatusCode::CREATED, Json(doc)))
        .map_err(|e| store_error("Surgery case not found", case_id, e))
}

async fn list_case_documents(
    State(state): State<AppState>,
    Path(case_id): Path<i64>,
) -> ApiResult<Vec<Document>> {
    state
        .store
        .list_documents(case_id)
        .await
        .map(Json)
        .map_err(|e| internal_error("Failed to list documents", &e.to_string()))
}

async fn get_document(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Document> {
    match state.store.get_document(id).await {
        Ok(Some(document)) => Ok(Json(document)),
        Ok(None) => Err(not_found_error("Document not found", id)),
        Err(e) => Err(internal_error("Failed to load document", &e.to_string())),
    }
}

async fn update_document(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(mut update): Json<DocumentUpdate>,
) -> ApiResult<Document> {
    if update.document_type.is_none() {
        if let Some(text) = update.extracted_text.as_deref() {
            update.document_type = Some(classify_document(text));
            update.is_processed.get_or_insert(true);
        }
    }

    state
        .store
        .update_document(id, update)
        .await
        .map(Json)
        .map_err(|e| store_error("Document not found", id, e))
}

async fn delete_document(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Value> {
    state
        .store
        .delete_document(id)
        .await
        .map(|()| Json(json!({ "message": "Document deleted" })))
        .map_err(|e| store_error("Document not found", id, e))
}

// ---- reports ----

async fn create_report(
    State(state): State<AppState>,
    Json(payload): Json<NewReport>,
) -> Result<(StatusCode, Json<Report>), ApiError> {
    if payload.title.trim().is_empty() {
        return Err(bad_request_error("title is required"));
    }
    if payload.report_type.trim().is_empty() {
        return Err(bad_request_error("report_type is required"));
    }

    state
        .store
        .create_report(payload)
        .await
        .map(|report| (StatusCode::CREATED, Json(report)))
        .map_err(|e| internal_error("Failed to create report", &e.to_string()))
}

async fn list_reports(State(state): State<AppState>) -> ApiResult<Vec<Report>> {
    state
        .store
        .list_reports()
        .await
        .map(Json)
        .map_err(|e| internal_error("Failed to list reports", &e.to_string()))
}

async fn get_report(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Report> {
    match state.store.get_report(id).await {
        Ok(Some(report)) => Ok(Json(report)),
        Ok(None) => Err(not_found_error("Report not found", id)),
        Err(e) => Err(internal_error("Failed to load report", &e.to_string())),
    }
}

async fn delete_report(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Value> {
    state
        .store
        .delete_report(id)
        .await
        .map(|()| Json(json!({ "message": "Report deleted" })))
        .map_err(|e| store_error("Report not found", id, e))
}

/// Builds an executive summary over all cases through the assistant and
/// stores it as a system report. Provider failure keeps the report with
/// the fixed error content instead of failing the request.
async fn generate_summary_report(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Report>), ApiError> {
    let cases = state
        .store
        .list_cases()
        .await
        .map_err(|e| internal_error("Failed to list surgery cases", &e.to_string()))?;

    let content = match state.assistant.summarize_cases(&cases).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "report summary generation failed");
            SUMMARY_ERROR_CONTENT.to_string()
        }
    };

    let report = state
        .store
        .create_report(NewReport {
            report_type: "surgery_summary".to_string(),
            title: "Resumo executivo de cirurgias".to_string(),
            content,
            data: Some(json!({ "total_cases": cases.len() })),
            generated_by: "system".to_string(),
            period_start: None,
            period_end: None,
        })
        .await
        .map_err(|e| internal_error("Failed to store report", &e.to_string()))?;

    Ok((StatusCode::CREATED, Json(report)))
}

// ---- users ----

async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<NewUser>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    if payload.username.trim().is_empty() {
        return Err(bad_request_error("username is required"));
    }

    state
        .store
        .create_user(payload)
        .await
        .map(|user| (StatusCode::CREATED, Json(user)))
        .map_err(|e| internal_error("Failed to create user", &e.to_string()))
}

async fn list_users(State(state): State<AppState>) -> ApiResult<Vec<User>> {
    state
        .store
        .list_users()
        .await
        .map(Json)
        .map_err(|e| internal_error("Failed to list users", &e.to_string()))
}

async fn get_user(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<User> {
    match state.store.get_user(id).await {
        Ok(Some(user)) => Ok(Json(user)),
        Ok(None) => Err(not_found_error("User not found", id)),
        Err(e) => Err(internal_error("Failed to load user", &e.to_string())),
    }
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<UserUpdate>,
) -> ApiResult<User> {
    state
        .store
        .update_user(id, update)
        .await
        .map(Json)
        .map_err(|e| store_error("User not found", id, e))
}

async fn delete_user(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Value> {
    state
        .store
        .delete_user(id)
        .await
        .map(|()| Json(json!({ "message": "User deleted" })))
        .map_err(|e| store_error("User not found", id, e))
}

/// Missing records become 404, anything else 500.
fn store_error(not_found_message: &str, id: i64, error: claims_core::CoreError) -> ApiError {
    match error {
        claims_core::CoreError::NotFound(_) => not_found_error(not_found_message, id),
        other => internal_error("Storage error", &other.to_string()),
    }
}
