use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use uuid::Uuid;

use crate::auth::{self, AuthUser, Role};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::{CancelRequest, CreateTokenBookingRequest, StatusPatch, TokenBooking};
use crate::property;
use crate::store::BookingStore;
use crate::token_booking::TokenBookingService;
use crate::uploads::{StoredFile, UploadStore, UPLOADS_MOUNT};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn BookingStore>,
    pub bookings: Arc<TokenBookingService>,
    pub uploads: Arc<UploadStore>,
}

/// Success envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            data,
        })
    }

    pub fn with_message(message: &str, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.to_string()),
            data,
        })
    }
}

type BookingResponse = Json<ApiResponse<TokenBooking>>;

pub fn build_router(state: AppState) -> Router {
    // Multipart bodies carry some framing on top of the file itself.
    let body_limit = state.config.max_upload_bytes + 64 * 1024;

    let token_bookings = Router::new()
        .route("/", post(create_token_booking))
        .route("/my-bookings", get(my_token_bookings))
        .route(
            "/:id",
            get(get_token_booking)
                .put(update_token_booking)
                .delete(cancel_token_booking),
        )
        .route("/:id/cancel", post(cancel_token_booking))
        .route("/:id/payment-proof", post(upload_payment_proof))
        .route("/:id/agreement", post(upload_agreement));

    let protected_routes = Router::new()
        .nest("/token-bookings", token_bookings)
        .route("/properties", post(property::create_property))
        .route(
            "/properties/:id",
            get(property::get_property).put(property::update_property),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth::authenticate));

    Router::new()
        .route("/health", get(health))
        .route("/auth/dev-token", post(dev_token))
        .merge(protected_routes)
        .nest_service(
            &format!("/{}", UPLOADS_MOUNT),
            ServeDir::new(state.uploads.root().to_path_buf()),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::Validation(rejection.body_text()))
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::Validation("Invalid booking id".into()))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DevTokenRequest {
    user_id: String,
    #[serde(default)]
    role: Role,
}

#[derive(Serialize)]
struct DevTokenResponse {
    token: String,
}

async fn dev_token(
    State(state): State<AppState>,
    payload: Result<Json<DevTokenRequest>, JsonRejection>,
) -> Result<Json<DevTokenResponse>, ApiError> {
    if !state.config.allow_dev_login {
        return Err(ApiError::NotFound("Not found".into()));
    }
    let request = json_body(payload)?;
    if request.user_id.trim().is_empty() {
        return Err(ApiError::Validation("userId is required".into()));
    }
    let token = auth::create_token(&request.user_id, request.role, &state.config.jwt_secret)?;
    log::warn!("Issued development token for {}", request.user_id);
    Ok(Json(DevTokenResponse { token }))
}

async fn create_token_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<CreateTokenBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, BookingResponse), ApiError> {
    let request = json_body(payload)?;
    let booking = state.bookings.create(&user.id, request).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Token booking created", booking),
    ))
}

async fn my_token_bookings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<Vec<TokenBooking>>>, ApiError> {
    Ok(ApiResponse::ok(state.bookings.list_for_user(&user.id).await?))
}

async fn get_token_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<BookingResponse, ApiError> {
    let booking = state.bookings.get(&user.id, parse_id(&id)?).await?;
    Ok(ApiResponse::ok(booking))
}

async fn update_token_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<Json<StatusPatch>, JsonRejection>,
) -> Result<BookingResponse, ApiError> {
    let id = parse_id(&id)?;
    let patch = json_body(payload)?;
    let booking = state.bookings.update_status(&user.id, id, patch).await?;
    Ok(ApiResponse::with_message("Token booking updated", booking))
}

async fn cancel_token_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Option<Json<CancelRequest>>,
) -> Result<BookingResponse, ApiError> {
    let id = parse_id(&id)?;
    let reason = payload.and_then(|Json(body)| body.cancellation_reason);
    let booking = state.bookings.cancel(&user.id, id, reason).await?;
    Ok(ApiResponse::with_message("Token booking cancelled", booking))
}

/// Drops the stored file again when the booking refuses it.
async fn attach_or_discard<F>(
    state: &AppState,
    file: StoredFile,
    attach: F,
) -> Result<TokenBooking, ApiError>
where
    F: std::future::Future<Output = Result<TokenBooking, ApiError>>,
{
    match attach.await {
        Ok(booking) => Ok(booking),
        Err(e) => {
            state.uploads.discard(&file).await;
            Err(e)
        }
    }
}

async fn upload_payment_proof(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<BookingResponse, ApiError> {
    let id = parse_id(&id)?;
    let file = state
        .uploads
        .save_field(&mut multipart, "paymentProof", "payment-proofs")
        .await?;
    let booking = attach_or_discard(
        &state,
        file.clone(),
        state.bookings.attach_payment_proof(&user.id, id, &file),
    )
    .await?;
    Ok(ApiResponse::with_message("Payment proof uploaded", booking))
}

async fn upload_agreement(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<BookingResponse, ApiError> {
    let id = parse_id(&id)?;
    let file = state
        .uploads
        .save_field(&mut multipart, "agreementDocument", "agreements")
        .await?;
    let booking = attach_or_discard(
        &state,
        file.clone(),
        state.bookings.attach_agreement_document(&user.id, id, &file),
    )
    .await?;
    Ok(ApiResponse::with_message("Agreement document uploaded", booking))
}
