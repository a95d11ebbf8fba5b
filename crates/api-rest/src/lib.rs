//! # API REST
//!
//! REST API for the clinical record service.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (payload decoding, status mapping, CORS)
//!
//! All record processing lives in `clinrec-core`; handlers only decode requests, call the
//! core services and map [`RecordError`] onto HTTP statuses.

#![warn(rust_2018_idioms)]

use axum::{
    body::Bytes,
    extract::{
        rejection::JsonRejection, FromRequest, Multipart, Path as AxumPath, Query, Request,
        State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clinrec_core::{
    records::parse_fields, AnalyticsAggregator, AnalyticsSnapshot, CoreConfig, ImportPipeline,
    ImportRunSummary, RecordError, RecordService, RecordStore, TimelineBuilder, TimelineEvent,
    TimelineQuery, TransformEngine, TransformRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

/// Multipart field carrying an uploaded import file.
pub const IMPORT_FILE_FIELD: &str = "file";

/// Application state shared across REST API handlers.
///
/// Every service holds the same record store; the configuration is resolved once by the
/// binary that builds the state.
#[derive(Clone)]
pub struct AppState {
    importer: ImportPipeline,
    records: RecordService,
    transforms: TransformEngine,
    timelines: TimelineBuilder,
    analytics: AnalyticsAggregator,
}

impl AppState {
    pub fn new(cfg: &CoreConfig, store: Arc<dyn RecordStore>) -> Self {
        let max_rows = cfg.max_query_rows();
        Self {
            importer: ImportPipeline::with_default_rules(store.clone()),
            records: RecordService::new(store.clone(), max_rows),
            transforms: TransformEngine::new(store.clone(), max_rows),
            timelines: TimelineBuilder::with_default_rules(store.clone()),
            analytics: AnalyticsAggregator::new(store),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct RecordsParams {
    /// Only records of this resource type.
    pub resource_type: Option<String>,
    /// Only records with this subject reference.
    pub subject: Option<String>,
    /// Comma-separated extracted fields to return.
    pub fields: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FieldsParams {
    /// Comma-separated extracted fields to return.
    pub fields: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TimelineParams {
    /// Subject reference, e.g. `Patient/123`. Required.
    pub subject: Option<String>,
    /// Comma-separated resource types.
    pub resource_types: Option<String>,
    /// Inclusive lower bound (date or RFC 3339 timestamp).
    pub from: Option<String>,
    /// Inclusive upper bound (date or RFC 3339 timestamp).
    pub to: Option<String>,
    /// Maximum number of events; defaults to 100, capped at 500.
    pub limit: Option<i64>,
}

/// Error response carrying a status and a `{error}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
        }
    }

    fn empty_payload() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "empty_payload")
    }

    /// Map a core error, reporting caller errors with `caller_status`.
    fn from_record(err: RecordError, caller_status: StatusCode) -> Self {
        match err {
            RecordError::InvalidInput(message) => Self::new(caller_status, message),
            RecordError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "not_found"),
            other => {
                tracing::error!("Request failed: {:?}", other);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorRes { error: self.error })).into_response()
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        import,
        list_records,
        get_record,
        transform,
        analytics,
        timelines,
    ),
    components(schemas(HealthRes, ErrorRes))
)]
pub struct ApiDoc;

/// Build the REST router with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/import", post(import))
        .route("/records", get(list_records))
        .route("/records/:id", get(get_record))
        .route("/transform", post(transform))
        .route("/analytics", get(analytics))
        .route("/timelines", get(timelines))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint used by monitoring and load balancers.
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Clinical record REST API is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/import",
    request_body(
        content = String,
        description = "Line-delimited JSON, raw or as a multipart `file` field",
        content_type = "text/plain"
    ),
    responses(
        (status = 200, description = "Finalised import run", body = serde_json::Value),
        (status = 400, description = "Empty payload", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Import line-delimited JSON documents.
///
/// The payload is either the raw request body or the multipart field named `file`. Per-line
/// problems are reported on the returned run, not as HTTP errors.
///
/// # Errors
/// Returns `400 Bad Request` if the payload is empty or unreadable, and
/// `500 Internal Server Error` if the run itself failed.
#[axum::debug_handler]
async fn import(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<ImportRunSummary>, ApiError> {
    let text = read_import_payload(request).await?;
    if text.is_empty() {
        return Err(ApiError::empty_payload());
    }

    let run = state
        .importer
        .import(&text)
        .map_err(|e| ApiError::from_record(e, StatusCode::BAD_REQUEST))?;
    tracing::info!(
        "Import {} finished with status {:?}: {} of {} lines imported",
        run.id,
        run.status,
        run.successful_records,
        run.total_lines
    );
    Ok(Json(run.summary()))
}

async fn read_import_payload(request: Request) -> Result<String, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if !is_multipart {
        let body = Bytes::from_request(request, &())
            .await
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
        return String::from_utf8(body.to_vec())
            .map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "payload must be UTF-8"));
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?
    {
        if field.name() == Some(IMPORT_FILE_FIELD) {
            return field
                .text()
                .await
                .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()));
        }
    }

    Ok(String::new())
}

#[utoipa::path(
    get,
    path = "/records",
    params(RecordsParams),
    responses(
        (status = 200, description = "Extracted fields per record, newest first", body = [serde_json::Value]),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn list_records(
    State(state): State<AppState>,
    Query(params): Query<RecordsParams>,
) -> Result<Json<Vec<Map<String, Value>>>, ApiError> {
    let fields = params.fields.as_deref().map(parse_fields).unwrap_or_default();
    state
        .records
        .list(
            params.resource_type.as_deref(),
            params.subject.as_deref(),
            &fields,
        )
        .map(Json)
        .map_err(|e| ApiError::from_record(e, StatusCode::BAD_REQUEST))
}

#[utoipa::path(
    get,
    path = "/records/{id}",
    params(
        ("id" = String, Path, description = "Resource id"),
        FieldsParams
    ),
    responses(
        (status = 200, description = "Extracted fields of one record", body = serde_json::Value),
        (status = 404, description = "No record with this id", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_record(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Query(params): Query<FieldsParams>,
) -> Result<Json<Map<String, Value>>, ApiError> {
    let fields = params.fields.as_deref().map(parse_fields).unwrap_or_default();
    state
        .records
        .get(&id, &fields)
        .map(Json)
        .map_err(|e| ApiError::from_record(e, StatusCode::BAD_REQUEST))
}

#[utoipa::path(
    post,
    path = "/transform",
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Transformed rows", body = [serde_json::Value]),
        (status = 422, description = "Unusable transform request", body = ErrorRes)
    )
)]
/// Apply ad-hoc transformations to matching records without persisting the result.
#[axum::debug_handler]
async fn transform(
    State(state): State<AppState>,
    payload: Result<Json<TransformRequest>, JsonRejection>,
) -> Result<Json<Vec<Map<String, Value>>>, ApiError> {
    let Json(request) =
        payload.map_err(|e| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e.body_text()))?;
    state
        .transforms
        .transform(&request)
        .map(Json)
        .map_err(|e| ApiError::from_record(e, StatusCode::UNPROCESSABLE_ENTITY))
}

#[utoipa::path(
    get,
    path = "/analytics",
    responses(
        (status = 200, description = "Store-wide statistics", body = serde_json::Value),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn analytics(State(state): State<AppState>) -> Result<Json<AnalyticsSnapshot>, ApiError> {
    state
        .analytics
        .snapshot()
        .map(Json)
        .map_err(|e| ApiError::from_record(e, StatusCode::BAD_REQUEST))
}

#[utoipa::path(
    get,
    path = "/timelines",
    params(TimelineParams),
    responses(
        (status = 200, description = "Events for one subject, earliest first", body = [serde_json::Value]),
        (status = 422, description = "Missing subject or unreadable date bound", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn timelines(
    State(state): State<AppState>,
    Query(params): Query<TimelineParams>,
) -> Result<Json<Vec<TimelineEvent>>, ApiError> {
    let query = TimelineQuery {
        subject: params.subject,
        resource_types: params
            .resource_types
            .as_deref()
            .map(parse_fields)
            .unwrap_or_default(),
        from: params.from,
        to: params.to,
        limit: params.limit,
    };
    state
        .timelines
        .build(&query)
        .map(Json)
        .map_err(|e| ApiError::from_record(e, StatusCode::UNPROCESSABLE_ENTITY))
}
