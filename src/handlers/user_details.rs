use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    handlers::ApiResponse,
    models::{
        approval::Role,
        sponsor::{
            CreateProposalRequest, DeleteProposalRequest, SponsorProposal, SponsorStatus,
            UpdateProposalStatusRequest,
        },
        user::{CreateUserRequest, UpdateUserRequest, User},
    },
    store::Store,
    utils::jwt::CurrentUser,
};

fn ensure_self_or(user: &CurrentUser, owner_id: i64, allowed: &[Role]) -> Result<(), AppError> {
    if user.id == owner_id {
        Ok(())
    } else {
        user.require(allowed)
    }
}

/// Creates the caller's own profile. Id and role come from the token.
pub async fn create_user_details(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let profile = store
        .insert_user(User {
            id: user.id,
            name: payload.name.trim().to_string(),
            email: payload.email.trim().to_lowercase(),
            phone: payload.phone,
            role: user.role,
            created_at: Utc::now(),
        })
        .await?;

    tracing::info!("Profile created for user {} ({})", profile.id, profile.role);
    Ok(ApiResponse::created(profile))
}

pub async fn list_user_details(
    State(store): State<Arc<dyn Store>>,
) -> Result<impl IntoResponse, AppError> {
    let users = store.list_users().await?;
    Ok(ApiResponse::data(users))
}

pub async fn get_user_details(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let profile = store
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User details not found".to_string()))?;
    Ok(ApiResponse::data(profile))
}

/// Users edit their own profile; admins edit anyone's and alone may change roles.
pub async fn update_user_details(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    ensure_self_or(&user, id, &[Role::Admin])?;
    payload.validate()?;

    let mut profile = store
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User details not found".to_string()))?;

    if let Some(role) = payload.role.filter(|role| *role != profile.role) {
        user.require(&[Role::Admin])?;
        tracing::info!("User {} role changed from {} to {} by admin {}", id, profile.role, role, user.id);
        profile.role = role;
    }
    if let Some(name) = payload.name {
        profile.name = name.trim().to_string();
    }
    if let Some(email) = payload.email {
        profile.email = email.trim().to_lowercase();
    }
    if let Some(phone) = payload.phone {
        profile.phone = Some(phone).filter(|phone| !phone.is_empty());
    }

    store.update_user(&profile).await?;
    Ok(ApiResponse::data(profile))
}

pub async fn delete_user_details(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    user.require(&[Role::Admin])?;

    if !store.delete_user(id).await? {
        return Err(AppError::NotFound("User details not found".to_string()));
    }

    tracing::info!("Profile {} deleted by admin {}", id, user.id);
    Ok(ApiResponse::message("User details deleted successfully"))
}

/// Adds a pending sponsorship proposal to a profile, priced from the first
/// rate card that lists its ad type.
pub async fn add_sponsor_proposal(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Path(owner_id): Path<i64>,
    Json(payload): Json<CreateProposalRequest>,
) -> Result<impl IntoResponse, AppError> {
    ensure_self_or(&user, owner_id, &[Role::Editor, Role::Admin])?;
    payload.validate()?;

    let ad_type = payload
        .ad_type
        .map(|ad_type| ad_type.trim().to_string())
        .filter(|ad_type| !ad_type.is_empty());

    // first card (oldest first) that prices this ad type
    let total_amount = match &ad_type {
        Some(ad_type) => store
            .list_rate_cards()
            .await?
            .iter()
            .find_map(|card| card.price_for(ad_type))
            .unwrap_or(0),
        None => 0,
    };

    let now = Utc::now();
    let proposal = store
        .insert_proposal(SponsorProposal {
            id: Uuid::new_v4(),
            owner_id,
            sponsor_name: payload.sponsor_name.trim().to_string(),
            sponsor_email: payload.sponsor_email,
            sponsor_phone: payload.sponsor_phone,
            ad_type,
            start_date: payload.start_date.unwrap_or(now),
            end_date: payload.end_date,
            total_amount,
            status: SponsorStatus::Pending,
            created_at: now,
        })
        .await?;

    tracing::info!("Sponsor proposal {} added to profile {}", proposal.id, owner_id);
    Ok(ApiResponse::created(proposal))
}

pub async fn list_sponsor_proposals(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Path(owner_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    ensure_self_or(&user, owner_id, &[Role::SubEditor, Role::Editor, Role::Admin])?;
    let proposals = store.list_proposals(owner_id).await?;
    Ok(ApiResponse::data(proposals))
}

/// updateSponsorStatus: accepts or rejects a proposal on profile `owner_id`.
/// Acceptance forks a first-class sponsor, once per proposal.
pub async fn update_sponsor_status(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Path(owner_id): Path<i64>,
    Json(payload): Json<UpdateProposalStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    user.require_reviewer()?;
    payload.validate()?;
    let status = SponsorStatus::normalize(&payload.status)?;

    let review = store
        .review_proposal(owner_id, payload.sponsor_id, status, user.id, Utc::now())
        .await?;

    if let Some(sponsor) = &review.forked {
        tracing::info!(
            "Proposal {} accepted by user {}: sponsor {} created for user {}",
            review.proposal.id,
            user.id,
            sponsor.id,
            owner_id
        );
    }
    Ok(ApiResponse::with_message(
        format!("Sponsor status updated to {}", status),
        review.proposal,
    ))
}

/// Removes a proposal. A sponsor already forked from it is left alone.
pub async fn delete_sponsor_proposal(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Path(owner_id): Path<i64>,
    Json(payload): Json<DeleteProposalRequest>,
) -> Result<impl IntoResponse, AppError> {
    ensure_self_or(&user, owner_id, &[Role::SubEditor, Role::Editor, Role::Admin])?;

    if !store.delete_proposal(owner_id, payload.sponsor_id).await? {
        return Err(AppError::NotFound("Sponsor not found".to_string()));
    }

    Ok(ApiResponse::message("Sponsor deleted successfully"))
}
