// rest_api/src/lib.rs

use axum::{
    extract::multipart::MultipartRejection,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use anyhow::Context;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;
use uuid::Uuid;

use models::{
    patient::DEFAULT_STATUS, AgeInput, NewPatient, PatientUpdate, StoreError, ValidationError,
};
use storage::{PatientFilter, PatientQuery, PatientStore, SortOrder, DEFAULT_SORT_FIELD};

mod config;
pub mod csv;

pub use crate::config::{ApiConfig, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_STATIC_DIR};

/// Upper bound on request bodies, sized for bulk CSV uploads.
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

// Define the patient API error enum
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing JSON body")]
    MissingBody,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Invalid id")]
    InvalidId,
    #[error("Not found")]
    NotFound,
    #[error("Invalid CSV file")]
    InvalidCsv,
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

// Implement IntoResponse for ApiError to convert it into an HTTP response
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingBody => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidId => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::InvalidCsv => StatusCode::BAD_REQUEST,
            ApiError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

// Shared state for the Axum application
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn PatientStore>,
}

/// Body of a create request. Presence is checked here so the error
/// names the first field the caller left out.
#[derive(Debug, Deserialize)]
pub struct CreatePatientRequest {
    pub name: Option<String>,
    pub age: Option<AgeInput>,
    pub gender: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub status: Option<String>,
}

impl CreatePatientRequest {
    fn into_new_patient(self) -> Result<NewPatient, ValidationError> {
        let name = self.name.ok_or(ValidationError::MissingField("name"))?;
        let age = self.age.ok_or(ValidationError::MissingField("age"))?;
        let gender = self.gender.ok_or(ValidationError::MissingField("gender"))?;
        let department = self
            .department
            .ok_or(ValidationError::MissingField("department"))?;
        let age = age.resolve()?;
        Ok(NewPatient {
            name,
            age,
            gender,
            department,
            phone: self.phone.unwrap_or_default(),
            address: self.address.unwrap_or_default(),
            notes: self.notes.unwrap_or_default(),
            status: self.status.unwrap_or_else(|| DEFAULT_STATUS.to_string()),
        })
    }
}

/// Body of an update request. Absent fields keep their stored values;
/// unknown keys are ignored.
#[derive(Debug, Deserialize)]
pub struct UpdatePatientRequest {
    pub name: Option<String>,
    pub age: Option<AgeInput>,
    pub gender: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub status: Option<String>,
}

impl UpdatePatientRequest {
    fn into_update(self) -> Result<PatientUpdate, ValidationError> {
        let age = match self.age {
            Some(age) => Some(age.resolve()?),
            None => None,
        };
        Ok(PatientUpdate {
            name: self.name,
            age,
            gender: self.gender,
            department: self.department,
            phone: self.phone,
            address: self.address,
            notes: self.notes,
            status: self.status,
        })
    }
}

/// Query string of a list request, before validation.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub search: Option<String>,
    pub department: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl ListParams {
    fn into_query(self) -> Result<PatientQuery, ValidationError> {
        let filter = PatientFilter::new(self.search.as_deref(), self.department.as_deref())?;
        Ok(PatientQuery {
            filter,
            sort_by: self
                .sort_by
                .unwrap_or_else(|| DEFAULT_SORT_FIELD.to_string()),
            order: SortOrder::parse(self.order.as_deref()),
            page: self.page.unwrap_or(1).max(1) as u64,
            per_page: self.per_page.unwrap_or(10).clamp(1, 100) as u64,
        })
    }
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::InvalidId)
}

/// Decodes a JSON body into a request type. An empty object, a
/// non-object, or a body that does not fit the type all count as
/// missing.
fn decode_body<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    match value.as_object() {
        Some(map) if !map.is_empty() => {}
        _ => return Err(ApiError::MissingBody),
    }
    serde_json::from_value(value).map_err(|_| ApiError::MissingBody)
}

// Handler for the POST /patients endpoint
async fn create_patient(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(value) = payload.map_err(|_| ApiError::MissingBody)?;
    let request: CreatePatientRequest = decode_body(value)?;
    let patient = state.store.insert(request.into_new_patient()?).await?;
    Ok((StatusCode::CREATED, Json(patient)))
}

// Handler for the GET /patients endpoint
async fn list_patients(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::InvalidQuery(e.body_text()))?;
    let query = params.into_query()?;
    let total = state.store.count(&query.filter).await?;
    let items = state.store.find(&query).await?;
    Ok(Json(json!({
        "total": total,
        "page": query.page,
        "per_page": query.per_page,
        "items": items,
    })))
}

// Handler for the GET /patients/:id endpoint
async fn get_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    match state.store.get(&id).await? {
        Some(patient) => Ok(Json(patient)),
        None => Err(ApiError::NotFound),
    }
}

// Handler for the PUT /patients/:id endpoint
async fn update_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let Json(value) = payload.map_err(|_| ApiError::MissingBody)?;
    let request: UpdatePatientRequest = decode_body(value)?;
    let update = request.into_update()?;
    let patient = if update.is_empty() {
        state.store.get(&id).await?
    } else {
        state.store.update(&id, update).await?
    };
    match patient {
        Some(patient) => Ok(Json(patient)),
        None => Err(ApiError::NotFound),
    }
}

// Handler for the DELETE /patients/:id endpoint
async fn delete_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let deleted = state.store.delete(&id).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

// Handler for the POST /import_csv endpoint
async fn import_csv(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut multipart = multipart.map_err(|_| ApiError::InvalidCsv)?;
    let mut upload: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::InvalidCsv)?
    {
        if field.name() != Some("file") {
            continue;
        }
        let is_csv = field
            .file_name()
            .map(|name| name.ends_with(".csv"))
            .unwrap_or(false);
        if !is_csv {
            return Err(ApiError::InvalidCsv);
        }
        upload = Some(field.text().await.map_err(|_| ApiError::InvalidCsv)?);
        break;
    }
    let data = upload.ok_or(ApiError::InvalidCsv)?;

    let patients = csv::parse_patients(&data)?;
    let mut inserted: u64 = 0;
    for patient in patients {
        state.store.insert(patient).await?;
        inserted += 1;
    }
    info!("Imported {} patient records from CSV upload", inserted);
    Ok((StatusCode::CREATED, Json(json!({ "inserted": inserted }))))
}

// Handler for the GET /export_csv endpoint
async fn export_csv(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let patients = state.store.all().await?;
    let body = csv::export_patients(&patients);
    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
        (
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"patients.csv\"",
        ),
    ];
    Ok((StatusCode::OK, headers, body))
}

// Handler for the GET /health endpoint
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

/// Builds the application router over the given store. Unmatched paths
/// fall through to the static UI directory.
pub fn router(store: Arc<dyn PatientStore>, static_dir: &str) -> Router {
    let state = AppState { store };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/patients", get(list_patients).post(create_patient))
        .route(
            "/patients/:id",
            get(get_patient).put(update_patient).delete(delete_patient),
        )
        .route("/import_csv", axum::routing::post(import_csv))
        .route("/export_csv", get(export_csv))
        .route("/health", get(health_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server and runs it until the shutdown signal fires
/// or the process receives an interrupt.
///
/// # Arguments
///
/// * `config` - Bind address and static file directory.
/// * `store` - Patient store backing the handlers.
/// * `shutdown_rx` - Receiver used to stop the server from outside.
///
/// # Errors
///
/// Returns an error if the bind address is invalid or the listener
/// cannot be bound.
pub async fn start_server(
    config: ApiConfig,
    store: Arc<dyn PatientStore>,
    shutdown_rx: oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let app = router(store, &config.static_dir);
    let addr = config
        .socket_addr()
        .context(format!("Invalid bind host: {}", config.host))?;

    let listener = TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind to address: {}", addr))?;
    info!("Patient record API listening on {}", addr);

    let combined_shutdown_signal = async move {
        tokio::select! {
            _ = shutdown_rx => {
                info!("Received shutdown signal");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received interrupt");
            }
        }
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(combined_shutdown_signal)
        .await
        .context("REST API server failed")?;

    info!("Patient record API stopped");
    Ok(())
}
