use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use log::{info, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::{ApiResponse, AppState};
use crate::models::{
    NewPropertyRequest, Property, PropertyChangeset, PropertyStatus, PropertyUpdate,
};

fn check_price(price: f64) -> Result<f64, ApiError> {
    if price.is_finite() && price >= 0.0 {
        Ok(price)
    } else {
        Err(ApiError::Validation("price must be a non-negative number".into()))
    }
}

fn parse_property_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::Validation("Invalid property id".into()))
}

/// Lists a new property owned by the caller.
pub async fn create_property(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<NewPropertyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Property>>), ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    let title = request.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::Validation("title is required".into()));
    }
    let price = check_price(request.price)?;

    let status = request.status.unwrap_or(PropertyStatus::Available);
    check_status_edit(PropertyStatus::Available, status)?;

    let property = Property::new(&user.id, title, price, status);
    let property = state.store.insert_property(property).await?;
    info!("Property {} listed by {}", property.id, user.id);
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Property listed", property),
    ))
}

/// Fetches a specific property by its ID
pub async fn get_property(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Property>>, ApiError> {
    let property = state
        .store
        .find_property(parse_property_id(&id)?)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property not found".into()))?;
    Ok(ApiResponse::ok(property))
}

/// Owner-only edit. Existing token bookings keep the price they snapshotted.
/// Only the supplied fields are written, and `token_booked` is reserved for
/// the booking lifecycle: the owner can neither set it nor move off it.
pub async fn update_property(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<Json<PropertyUpdate>, JsonRejection>,
) -> Result<Json<ApiResponse<Property>>, ApiError> {
    let Json(update) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    let property = state
        .store
        .find_property(parse_property_id(&id)?)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property not found".into()))?;
    if property.owner_id != user.id {
        return Err(ApiError::Forbidden("Only the owner can edit this property".into()));
    }

    let mut changes = PropertyChangeset {
        updated_at: Some(Utc::now()),
        ..Default::default()
    };
    if let Some(title) = update.title {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(ApiError::Validation("title must not be empty".into()));
        }
        changes.title = Some(title);
    }
    if let Some(price) = update.price {
        changes.price = Some(check_price(price)?);
    }
    let mut expected_status = None;
    if let Some(status) = update.status {
        check_status_edit(property.status, status)?;
        changes.status = Some(status);
        expected_status = Some(property.status);
    }

    let updated = state
        .store
        .update_property_fields(property.id, changes, expected_status)
        .await?
        .ok_or_else(|| {
            warn!("Property {} changed status during an edit by {}", property.id, user.id);
            ApiError::InvalidOperation("Property status changed meanwhile; reload and retry".into())
        })?;
    info!("Property {} updated by {}", updated.id, user.id);
    Ok(ApiResponse::with_message("Property updated", updated))
}

fn check_status_edit(current: PropertyStatus, next: PropertyStatus) -> Result<(), ApiError> {
    let held = |s: PropertyStatus| s == PropertyStatus::TokenBooked;
    if held(current) != held(next) {
        return Err(ApiError::InvalidOperation(
            "token_booked follows the property's token booking; cancel the booking instead".into(),
        ));
    }
    Ok(())
}
