use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    handlers::ApiResponse,
    models::ledger::{
        FinancialSnapshot, NewPaymentRequest, PaymentSettlement, UserFinancialDetails,
        compute_financial_stats,
    },
    store::Store,
    utils::jwt::CurrentUser,
};

/// Recomputes a user's earnings from scratch and stores the snapshot.
///
/// Payment history is read, never written: `received_balance` and
/// `current_balance` are re-derived from the successful requests.
pub async fn persist_financial_snapshot(
    store: &dyn Store,
    user_id: i64,
    now: DateTime<Utc>,
) -> Result<FinancialSnapshot, AppError> {
    let user = store
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User details not found".to_string()))?;

    let posts = store.list_posts_by_author(user_id).await?;
    let sponsors = store.list_sponsors_managed_by(user_id).await?;
    let rate_card = store.global_rate_card().await?;
    let payments = store.list_payment_requests(user_id).await?;

    let stats = compute_financial_stats(&posts, &sponsors, rate_card.as_ref())?;
    let snapshot = FinancialSnapshot::from_stats(&user, stats, &payments, now);
    store.save_snapshot(&snapshot).await?;

    tracing::debug!(
        "Ledger recomputed for user {}: earned {}, balance {}",
        user_id,
        snapshot.earnings.total_earnings_user,
        snapshot.earnings.current_balance
    );
    Ok(snapshot)
}

async fn financial_details(
    store: &dyn Store,
    snapshot: FinancialSnapshot,
) -> Result<UserFinancialDetails, AppError> {
    let payment_requests = store.list_payment_requests(snapshot.user_id).await?;
    Ok(UserFinancialDetails {
        snapshot,
        payment_requests,
    })
}

/// The caller's last stored ledger.
pub async fn get_user_financials(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = store
        .get_snapshot(user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Financial details not found".to_string()))?;

    let details = financial_details(store.as_ref(), snapshot).await?;
    Ok(ApiResponse::data(details))
}

/// Recomputes and returns the caller's ledger.
pub async fn recompute_user_financials(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = persist_financial_snapshot(store.as_ref(), user.id, Utc::now()).await?;
    let details = financial_details(store.as_ref(), snapshot).await?;
    Ok(ApiResponse::with_message(
        "Financial details updated successfully",
        details,
    ))
}

/// Draws a payout request against the caller's current balance.
pub async fn request_payment(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Json(payload): Json<NewPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let (snapshot, request) = store.reserve_payment(user.id, payload, Utc::now()).await?;

    tracing::info!(
        "User {} requested payment {} of {} (balance now {})",
        user.id,
        request.id,
        request.requested_amount,
        snapshot.earnings.current_balance
    );
    Ok(ApiResponse::created(request))
}

/// Every payment request, with the requesting user's profile (editor/admin).
pub async fn all_requests(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    user.require_editorial()?;
    let requests = store.list_all_payment_requests().await?;
    Ok(ApiResponse::data(requests))
}

/// markPaymentGiven (editor/admin).
pub async fn payment_given(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Path(request_id): Path<Uuid>,
    Json(mut payload): Json<PaymentSettlement>,
) -> Result<impl IntoResponse, AppError> {
    user.require_editorial()?;
    payload.validate()?;

    if payload.paid_by.as_deref().is_none_or(|paid_by| paid_by.trim().is_empty()) {
        payload.paid_by = Some(user.role.to_string());
    }

    let (request, changed) = store.settle_payment(request_id, payload, Utc::now()).await?;

    if changed {
        tracing::info!(
            "Payment request {} marked {} ({}) by user {}",
            request.id,
            request.status,
            request.paid_amount,
            user.id
        );
        Ok(ApiResponse::with_message("Payment updated successfully", request))
    } else {
        Ok(ApiResponse::with_message("Payment already settled", request))
    }
}
