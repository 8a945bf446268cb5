use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    error::AppError,
    handlers::ApiResponse,
    models::sponsor::{CreateSponsorRequest, Sponsor, SponsorStatus, UpdateSponsorRequest},
    store::Store,
    utils::jwt::CurrentUser,
};

/// Whoever added a sponsor may change it, as may editors and admins.
fn ensure_can_manage(user: &CurrentUser, sponsor: &Sponsor) -> Result<(), AppError> {
    if sponsor.sponsor_added_by == user.id || user.role.is_editorial() {
        Ok(())
    } else {
        Err(AppError::unauthorized_role())
    }
}

async fn load_sponsor(store: &dyn Store, id: i64) -> Result<Sponsor, AppError> {
    store
        .get_sponsor(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Sponsor not found".to_string()))
}

pub async fn create_sponsor(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Json(payload): Json<CreateSponsorRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let now = Utc::now();
    let new_sponsor = payload.into_new_sponsor(user.id, now)?;
    if new_sponsor.status != SponsorStatus::Pending {
        user.require_reviewer()?;
    }

    let sponsor = store.insert_sponsor(new_sponsor, now).await?;
    tracing::info!("Sponsor {} '{}' added by user {}", sponsor.id, sponsor.sponsor_name, user.id);
    Ok(ApiResponse::created(sponsor))
}

pub async fn list_sponsors(
    State(store): State<Arc<dyn Store>>,
) -> Result<impl IntoResponse, AppError> {
    let sponsors = store.list_sponsors().await?;
    Ok(ApiResponse::data(sponsors))
}

pub async fn get_sponsor(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let sponsor = load_sponsor(store.as_ref(), id).await?;
    Ok(ApiResponse::data(sponsor))
}

pub async fn update_sponsor(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateSponsorRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut sponsor = load_sponsor(store.as_ref(), id).await?;
    ensure_can_manage(&user, &sponsor)?;

    if let Some(raw) = payload.status.as_deref() {
        let status = SponsorStatus::normalize(raw)?;
        if status != sponsor.status {
            user.require_reviewer()?;
            sponsor.status = status;
        }
    }
    if let Some(name) = payload.sponsor_name {
        sponsor.sponsor_name = name.trim().to_string();
    }
    if let Some(email) = payload.sponsor_email {
        sponsor.sponsor_email = Some(email);
    }
    if let Some(phone) = payload.sponsor_phone {
        sponsor.sponsor_phone = Some(phone);
    }
    if let Some(managed_by) = payload.sponsor_managed_by {
        sponsor.sponsor_managed_by = Some(managed_by);
    }
    if let Some(end_date) = payload.end_date {
        sponsor.end_date = Some(end_date);
    }
    if let Some(total_amount) = payload.total_amount {
        sponsor.total_amount = total_amount;
    }
    if let Some(day) = payload.day {
        sponsor.day = day;
    }
    if let Some(position) = payload.position {
        sponsor.position = position.trim().to_string();
    }
    if let Some(published) = payload.published {
        sponsor.published = published;
    }
    if let Some(sponsored_post) = payload.sponsored_post {
        sponsor.sponsored_post = Some(sponsored_post);
    }

    store.update_sponsor(&sponsor).await?;
    Ok(ApiResponse::data(sponsor))
}

pub async fn delete_sponsor(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let sponsor = load_sponsor(store.as_ref(), id).await?;
    ensure_can_manage(&user, &sponsor)?;

    if !store.delete_sponsor(id).await? {
        return Err(AppError::NotFound("Sponsor not found".to_string()));
    }

    tracing::info!("Sponsor {} deleted by user {}", id, user.id);
    Ok(ApiResponse::message("Sponsor deleted successfully"))
}
