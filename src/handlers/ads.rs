use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use validator::Validate;

use crate::{error::AppError, handlers::ApiResponse, models::rate_card::RateCardRequest, store::Store};

// Writes are mounted behind `admin_middleware`.

pub async fn create_rate_card(
    State(store): State<Arc<dyn Store>>,
    Json(payload): Json<RateCardRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let card = store.insert_rate_card(payload, Utc::now()).await?;
    tracing::info!("Rate card {} '{}' created", card.id, card.category);
    Ok(ApiResponse::created(card))
}

pub async fn list_rate_cards(
    State(store): State<Arc<dyn Store>>,
) -> Result<impl IntoResponse, AppError> {
    let cards = store.list_rate_cards().await?;
    Ok(ApiResponse::data(cards))
}

pub async fn get_rate_card(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let card = store
        .get_rate_card(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Rate card not found".to_string()))?;
    Ok(ApiResponse::data(card))
}

pub async fn update_rate_card(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
    Json(payload): Json<RateCardRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let card = store
        .update_rate_card(id, payload, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound("Rate card not found".to_string()))?;
    Ok(ApiResponse::data(card))
}

pub async fn delete_rate_card(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !store.delete_rate_card(id).await? {
        return Err(AppError::NotFound("Rate card not found".to_string()));
    }
    tracing::info!("Rate card {} deleted", id);
    Ok(ApiResponse::message("Rate card deleted successfully"))
}
