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
    models::{
        approval::{ApprovalStatus, Tier},
        organized_post::{
            CategoryTopNewsUpdate, CreateWorkflowRequest, DailyTopNewsUpdate, OrganizedPost,
            UpdateWorkflowRequest,
        },
        post::ReviewRequest,
    },
    store::Store,
    utils::jwt::CurrentUser,
};

/// createWorkflowPost: records the actor's decision on the post, then
/// creates or refreshes the post's workflow aggregate from it.
///
/// The post write is not rolled back if the aggregate write fails.
pub async fn create_organized(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Json(payload): Json<CreateWorkflowRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let decision: ApprovalStatus = payload.status.parse()?;

    let mut newly_published = false;
    let post = store
        .modify_post(
            payload.post_id,
            Box::new(|post| {
                newly_published = post.workflow.submit_for_review(
                    user.id,
                    user.role,
                    decision,
                    payload.comment,
                    Utc::now(),
                )?;
                Ok(())
            }),
        )
        .await?;

    if newly_published {
        tracing::info!("Post {} published by {} {}", post.id, user.role, user.id);
    }

    let organized = store.upsert_organized(&post, Utc::now()).await?;
    tracing::info!("Workflow aggregate {} synced from post {}", organized.id, post.id);
    Ok(ApiResponse::created(organized))
}

pub async fn list_organized(
    State(store): State<Arc<dyn Store>>,
) -> Result<impl IntoResponse, AppError> {
    let organized = store.list_organized().await?;
    Ok(ApiResponse::data(organized))
}

pub async fn get_organized(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let organized = store
        .get_organized(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Workflow post not found".to_string()))?;
    Ok(ApiResponse::data(organized))
}

/// updateWorkflowPost (editor/admin).
///
/// A decision is appended to the actor's tier on the aggregate. An
/// `is_published` value is forced onto both the aggregate and its post,
/// bypassing the tier rules.
pub async fn update_organized(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateWorkflowRequest>,
) -> Result<impl IntoResponse, AppError> {
    user.require_editorial()?;
    payload.validate()?;

    let decision = payload
        .status
        .as_deref()
        .map(str::parse::<ApprovalStatus>)
        .transpose()?;
    let override_published = payload.is_published;
    let comment = payload.comment;

    let organized = store
        .modify_organized(
            id,
            Box::new(move |organized| {
                let now = Utc::now();
                if let Some(decision) = decision {
                    let tier = user.role.tier().ok_or_else(AppError::unauthorized_role)?;
                    organized
                        .workflow
                        .append_decision(tier, user.id, decision, comment, now);
                }
                if let Some(published) = override_published {
                    organized.workflow.override_published(published, now);
                }
                Ok(())
            }),
        )
        .await?;

    if let Some(published) = override_published {
        store
            .modify_post(
                organized.post_id,
                Box::new(move |post| {
                    post.workflow.override_published(published, Utc::now());
                    Ok(())
                }),
            )
            .await?;
        tracing::info!(
            "Publication of post {} forced to {} by {} {}",
            organized.post_id,
            published,
            user.role,
            user.id
        );
    }

    Ok(ApiResponse::data(organized))
}

pub async fn delete_organized(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    user.require_editorial()?;

    if !store.delete_organized(id).await? {
        return Err(AppError::NotFound("Workflow post not found".to_string()));
    }

    tracing::info!("Workflow aggregate {} deleted by user {}", id, user.id);
    Ok(ApiResponse::message("Workflow post deleted successfully"))
}

/// Appends a decision to one named tier of the aggregate.
/// The actor must act in exactly that tier. Publication only changes through
/// the `is_published` override of `update_organized`.
async fn tier_decision(
    store: &dyn Store,
    user: CurrentUser,
    tier: Tier,
    id: i64,
    payload: ReviewRequest,
) -> Result<Json<ApiResponse<OrganizedPost>>, AppError> {
    if user.role.tier() != Some(tier) {
        return Err(AppError::unauthorized_role());
    }
    payload.validate()?;
    let decision: ApprovalStatus = payload.status.parse()?;

    let organized = store
        .modify_organized(
            id,
            Box::new(move |organized| {
                organized.workflow.append_decision(
                    tier,
                    user.id,
                    decision,
                    payload.comment,
                    Utc::now(),
                );
                Ok(())
            }),
        )
        .await?;

    tracing::info!(
        "Workflow aggregate {}: {} decision '{}' by user {}",
        id,
        tier.as_str(),
        decision.as_str(),
        user.id
    );
    Ok(ApiResponse::data(organized))
}

pub async fn sub_editor_decision(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<ReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    tier_decision(store.as_ref(), user, Tier::SubEditor, id, payload).await
}

pub async fn editor_decision(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<ReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    tier_decision(store.as_ref(), user, Tier::Editor, id, payload).await
}

/// Upserts a daily top news entry on the aggregate `id`.
pub async fn daily_top_news(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<DailyTopNewsUpdate>,
) -> Result<impl IntoResponse, AppError> {
    user.require_editorial()?;
    payload.validate()?;

    let sets_main = payload.sets_main();
    let entry = store.set_daily_top_news(id, payload, Utc::now()).await?;

    if sets_main {
        tracing::info!("Post {} is now the main daily top news", entry.post_id);
    }
    Ok(ApiResponse::with_message(
        "Daily top news updated successfully",
        entry,
    ))
}

pub async fn category_top_news(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<CategoryTopNewsUpdate>,
) -> Result<impl IntoResponse, AppError> {
    user.require_editorial()?;
    payload.validate()?;

    let organized = store
        .modify_organized(
            id,
            Box::new(move |organized| {
                organized.set_category_top_news(&payload, Utc::now());
                Ok(())
            }),
        )
        .await?;

    Ok(ApiResponse::with_message(
        "Category top news updated successfully",
        organized,
    ))
}
