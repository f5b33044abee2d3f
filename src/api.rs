use crate::config::ApiConfig;
use crate::error::CatalogError;
use crate::image_ingest::ImageIngestor;
use crate::materializer::{CatalogMaterializer, CatalogTree, VariantView};
use crate::model::{UpsertOutcome, VariantSubmission};
use crate::upsert::{validate_submission, UpsertEngine};
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use sqlx::postgres::PgPool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<UpsertEngine>,
    pub materializer: Arc<CatalogMaterializer>,
    pub ingestor: Arc<ImageIngestor>,
    pub db_pool: PgPool,
}

/// Upsert result response
#[derive(Debug, Serialize)]
pub struct UpsertResponse {
    pub id: Uuid,
    pub operation: UpsertOutcome,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(err: CatalogError) -> ApiError {
    let status = if err.is_client_error() {
        warn!(error = %err, "Rejected submission");
        StatusCode::BAD_REQUEST
    } else {
        error!(error = %err, "Request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
        }),
    )
}

fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
            code: "MALFORMED_REQUEST".to_string(),
        }),
    )
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route(
            "/api/v1/products",
            get(get_nested_catalog).post(submit_product),
        )
        .route("/api/v1/products/flat", get(get_flat_catalog))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "catalog-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    // Check database connectivity
    match sqlx::query("SELECT 1").fetch_one(&state.db_pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Raw multipart fields of a product submission.
#[derive(Debug, Default)]
struct SubmissionForm {
    product_type: Option<String>,
    product_name: Option<String>,
    size: Option<String>,
    price: Option<String>,
    amount: Option<String>,
    image: Option<(Vec<u8>, String)>,
}

async fn read_submission_form(mut multipart: Multipart) -> Result<SubmissionForm, ApiError> {
    let mut form = SubmissionForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(&format!("invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("product_type") => form.product_type = Some(read_text(field).await?),
            Some("product_name") => form.product_name = Some(read_text(field).await?),
            Some("size") => form.size = Some(read_text(field).await?),
            Some("price") => form.price = Some(read_text(field).await?),
            Some("amount") => form.amount = Some(read_text(field).await?),
            Some("image") => {
                let filename = field
                    .file_name()
                    .unwrap_or("upload")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(&format!("failed to read image field: {}", e)))?;
                form.image = Some((bytes.to_vec(), filename));
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| bad_request(&format!("failed to read form field: {}", e)))
}

fn require(value: Option<String>, field: &str) -> Result<String, CatalogError> {
    value.ok_or_else(|| CatalogError::Validation(format!("missing required field '{}'", field)))
}

/// Validate a submission, ingest its optional image, and upsert against the
/// unique (type, name, size) triple.
///
/// Validation runs to completion before the image is ingested: a rejected
/// submission never writes an object to storage, and a record never
/// references a key that was not fully written.
async fn process_submission(
    engine: &UpsertEngine,
    ingestor: &ImageIngestor,
    form: SubmissionForm,
) -> Result<UpsertResponse, CatalogError> {
    let product_type = require(form.product_type, "product_type")?;
    let product_name = require(form.product_name, "product_name")?;
    let size = require(form.size, "size")?;
    let price: f64 = require(form.price, "price")?
        .trim()
        .parse()
        .map_err(|_| CatalogError::Validation("price must be a number".to_string()))?;
    let amount: i64 = require(form.amount, "amount")?
        .trim()
        .parse()
        .map_err(|_| CatalogError::Validation("amount must be an integer".to_string()))?;

    let mut valid = validate_submission(VariantSubmission {
        product_type,
        product_name,
        size,
        price,
        amount,
        image_key: None,
    })?;

    if let Some((bytes, filename)) = form.image {
        if !bytes.is_empty() {
            valid.image_key = Some(ingestor.ingest(&bytes, &filename).await?);
        }
    }

    let result = engine.upsert_validated(valid).await?;

    Ok(UpsertResponse {
        id: result.id,
        operation: result.outcome,
    })
}

/// Submit a product variant
#[instrument(skip(state, multipart))]
async fn submit_product(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UpsertResponse>, ApiError> {
    let form = read_submission_form(multipart).await?;

    let response = process_submission(&state.engine, &state.ingestor, form)
        .await
        .map_err(error_response)?;

    Ok(Json(response))
}

/// Nested catalog: products grouped by type -> name -> size
#[instrument(skip(state))]
async fn get_nested_catalog(
    State(state): State<AppState>,
) -> Result<Json<CatalogTree>, ApiError> {
    let tree = state
        .materializer
        .list_nested()
        .await
        .map_err(error_response)?;

    Ok(Json(tree))
}

/// Flat catalog: one entry per stored variant
#[instrument(skip(state))]
async fn get_flat_catalog(
    State(state): State<AppState>,
) -> Result<Json<Vec<VariantView>>, ApiError> {
    let views = state.materializer.list_flat().await.map_err(error_response)?;

    Ok(Json(views))
}

/// Start the catalog API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting catalog API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}
