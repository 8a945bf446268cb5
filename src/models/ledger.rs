// src/models/ledger.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::MAX_MONEY_AMOUNT,
    error::AppError,
    models::{
        approval::ApprovalStatus,
        post::Post,
        rate_card::RateCard,
        sponsor::{Sponsor, SponsorStatus},
        user::User,
    },
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStats {
    pub total: i64,
    pub approved: i64,
    pub pending: i64,
    pub rejected: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorStats {
    pub total: i64,
    pub accepted: i64,
    pub pending: i64,
    pub rejected: i64,
}

/// Earnings from accepted sponsors of one rate-card ad type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorTypeDetail {
    #[serde(rename = "type")]
    pub ads_type: String,
    pub accepted: i64,
    pub total_days: i64,
    pub price_per_day: i64,
    /// Flat fee per acceptance; ignores duration.
    pub total_earnings_user: i64,
    /// Scales with the summed duration.
    pub total_earnings_agency: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Earnings {
    pub post_earnings: i64,
    pub sponsor_earnings_user: i64,
    pub sponsor_earnings_agency: i64,
    pub total_earnings_user: i64,
    pub total_earnings_agency: i64,
    pub current_balance: i64,
    pub received_balance: i64,
}

/// Output of the earnings computation for one user. Purely derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinancialStats {
    pub post_stats: PostStats,
    pub sponsor_stats: SponsorStats,
    pub sponsor_details_per_type_for_user: Vec<SponsorTypeDetail>,
    pub sponsor_details_per_type_for_agency: Vec<SponsorTypeDetail>,
    pub post_earnings: i64,
    pub sponsor_earnings_user: i64,
    pub sponsor_earnings_agency: i64,
    pub total_earnings_user: i64,
    pub total_earnings_agency: i64,
    pub price_per_post: i64,
}

/// Computes a user's earnings from their posts, the sponsors they manage
/// and the global rate card. No I/O, no clock.
///
/// Fails instead of wrapping when an amount leaves the `i64` range.
pub fn compute_financial_stats(
    posts: &[Post],
    sponsors: &[Sponsor],
    rate_card: Option<&RateCard>,
) -> Result<FinancialStats, AppError> {
    let price_per_post = rate_card.map(|card| card.price_per_post).unwrap_or(0);

    let count_posts = |status: ApprovalStatus| {
        posts.iter().filter(|post| post.workflow.status == status).count() as i64
    };
    let post_stats = PostStats {
        total: posts.len() as i64,
        approved: count_posts(ApprovalStatus::Approved),
        pending: count_posts(ApprovalStatus::Pending),
        rejected: count_posts(ApprovalStatus::Rejected),
    };

    let count_sponsors = |status: SponsorStatus| {
        sponsors.iter().filter(|sponsor| sponsor.status == status).count() as i64
    };
    let sponsor_stats = SponsorStats {
        total: sponsors.len() as i64,
        accepted: count_sponsors(SponsorStatus::Accepted),
        pending: count_sponsors(SponsorStatus::Pending),
        rejected: count_sponsors(SponsorStatus::Rejected),
    };

    let post_earnings = post_stats
        .approved
        .checked_mul(price_per_post)
        .ok_or_else(amount_overflow)?;

    let accepted: Vec<&Sponsor> = sponsors
        .iter()
        .filter(|sponsor| sponsor.status == SponsorStatus::Accepted)
        .collect();

    let details: Vec<SponsorTypeDetail> = rate_card
        .map(|card| card.ads_types.as_slice())
        .unwrap_or_default()
        .iter()
        .map(|ad| {
            let wanted = normalize_ad_type(&ad.ads_type);
            let matched: Vec<&&Sponsor> = accepted
                .iter()
                .filter(|sponsor| normalize_ad_type(&sponsor.position) == wanted)
                .collect();
            let count = matched.len() as i64;
            let total_days = checked_sum(
                matched
                    .iter()
                    .map(|sponsor| if sponsor.day > 0 { i64::from(sponsor.day) } else { 1 }),
            )?;
            let total_earnings_user = count.checked_mul(ad.price).ok_or_else(amount_overflow)?;
            let total_earnings_agency = total_earnings_user
                .checked_mul(total_days)
                .ok_or_else(amount_overflow)?;

            Ok(SponsorTypeDetail {
                ads_type: ad.ads_type.clone(),
                accepted: count,
                total_days,
                price_per_day: ad.price,
                total_earnings_user,
                total_earnings_agency,
            })
        })
        .collect::<Result<_, AppError>>()?;

    let sponsor_earnings_user = checked_sum(details.iter().map(|d| d.total_earnings_user))?;
    let sponsor_earnings_agency = checked_sum(details.iter().map(|d| d.total_earnings_agency))?;
    let total_earnings_user = post_earnings
        .checked_add(sponsor_earnings_user)
        .ok_or_else(amount_overflow)?;
    let total_earnings_agency = post_earnings
        .checked_add(sponsor_earnings_agency)
        .ok_or_else(amount_overflow)?;

    Ok(FinancialStats {
        post_stats,
        sponsor_stats,
        sponsor_details_per_type_for_user: details.clone(),
        sponsor_details_per_type_for_agency: details,
        post_earnings,
        sponsor_earnings_user,
        sponsor_earnings_agency,
        total_earnings_user,
        total_earnings_agency,
        price_per_post,
    })
}

fn amount_overflow() -> AppError {
    AppError::BadRequest("Amount exceeds the supported range".to_string())
}

fn checked_sum(mut values: impl Iterator<Item = i64>) -> Result<i64, AppError> {
    values.try_fold(0i64, |acc, value| acc.checked_add(value).ok_or_else(amount_overflow))
}

fn normalize_ad_type(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// The derived half of a user's ledger. Freely recomputable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSnapshot {
    pub user_id: i64,
    pub user_name: String,
    pub posts: PostStats,
    pub sponsors: SponsorStats,
    pub sponsor_details_per_type_for_user: Vec<SponsorTypeDetail>,
    pub sponsor_details_per_type_for_agency: Vec<SponsorTypeDetail>,
    pub earnings: Earnings,
    pub price_per_post: i64,
    pub updated_at: DateTime<Utc>,
}

impl FinancialSnapshot {
    /// Builds the snapshot from fresh stats and the payment history.
    /// `current_balance` is what was earned minus what was successfully paid.
    pub fn from_stats(
        user: &User,
        stats: FinancialStats,
        payments: &[PaymentRequest],
        now: DateTime<Utc>,
    ) -> Self {
        let total_paid = total_paid(payments);

        Self {
            user_id: user.id,
            user_name: user.name.clone(),
            posts: stats.post_stats,
            sponsors: stats.sponsor_stats,
            sponsor_details_per_type_for_user: stats.sponsor_details_per_type_for_user,
            sponsor_details_per_type_for_agency: stats.sponsor_details_per_type_for_agency,
            earnings: Earnings {
                post_earnings: stats.post_earnings,
                sponsor_earnings_user: stats.sponsor_earnings_user,
                sponsor_earnings_agency: stats.sponsor_earnings_agency,
                total_earnings_user: stats.total_earnings_user,
                total_earnings_agency: stats.total_earnings_agency,
                current_balance: stats.total_earnings_user - total_paid,
                received_balance: total_paid,
            },
            price_per_post: stats.price_per_post,
            updated_at: now,
        }
    }

    /// Reserves `request.requested_amount` against the current balance and
    /// returns the pending request to persist.
    ///
    /// The reservation is not given back if the request is later refused.
    pub fn reserve_payment(
        &mut self,
        request: NewPaymentRequest,
        now: DateTime<Utc>,
    ) -> Result<PaymentRequest, AppError> {
        if request.requested_amount <= 0 {
            return Err(AppError::BadRequest(
                "Requested amount must be positive".to_string(),
            ));
        }
        if request.requested_amount > self.earnings.current_balance {
            return Err(AppError::BadRequest(
                "Requested amount exceeds available balance".to_string(),
            ));
        }

        self.earnings.current_balance -= request.requested_amount;
        self.updated_at = now;

        Ok(PaymentRequest {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            name: request.name,
            phone: request.phone,
            bank: request.bank,
            bank_account: request.bank_account,
            bank_address: request.bank_address,
            transaction_id: request.transaction_id,
            reference: request.reference,
            status: PaymentStatus::Pending,
            requested_amount: request.requested_amount,
            paid_amount: 0,
            paid_by: None,
            requested_at: now,
            paid_at: None,
        })
    }

    /// Applies an admin's settlement to one of this user's requests.
    ///
    /// Only a transition into `successful` credits `received_balance`, so
    /// repeating a settlement never counts the same payment twice. Returns
    /// whether anything changed.
    pub fn settle_payment(
        &mut self,
        request: &mut PaymentRequest,
        settlement: PaymentSettlement,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let target = settlement.status.unwrap_or(PaymentStatus::Successful);

        if request.status.is_terminal() {
            if request.status == target {
                return Ok(false);
            }
            return Err(AppError::BadRequest(format!(
                "Payment request is already {}",
                request.status
            )));
        }
        if target == PaymentStatus::Pending {
            return Err(AppError::BadRequest(
                "A payment request cannot be moved back to pending".to_string(),
            ));
        }

        if let Some(transaction_id) = settlement.transaction_id.filter(|s| !s.is_empty()) {
            request.transaction_id = Some(transaction_id);
        }
        if let Some(reference) = settlement.reference.filter(|s| !s.is_empty()) {
            request.reference = Some(reference);
        }
        let paid_amount = settlement.paid_amount.unwrap_or(request.requested_amount);
        if paid_amount <= 0 || paid_amount > request.requested_amount {
            return Err(AppError::BadRequest(
                "Paid amount must be between 1 and the requested amount".to_string(),
            ));
        }
        let received_balance = if target == PaymentStatus::Successful {
            self.earnings
                .received_balance
                .checked_add(paid_amount)
                .ok_or_else(amount_overflow)?
        } else {
            self.earnings.received_balance
        };

        request.paid_amount = paid_amount;
        request.paid_by = Some(settlement.paid_by.unwrap_or_else(|| "admin".to_string()));
        request.paid_at = Some(now);
        request.status = target;

        self.earnings.received_balance = received_balance;
        self.updated_at = now;
        Ok(true)
    }
}

/// Sum of `paid_amount` over successful requests.
pub fn total_paid(payments: &[PaymentRequest]) -> i64 {
    payments
        .iter()
        .filter(|request| request.status == PaymentStatus::Successful)
        .map(|request| request.paid_amount)
        .sum()
}

/// A user's full ledger: derived snapshot plus authoritative payment history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserFinancialDetails {
    #[serde(flatten)]
    pub snapshot: FinancialSnapshot,
    pub payment_requests: Vec<PaymentRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Refused,
    Waiting,
    Successful,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Refused => "refused",
            PaymentStatus::Waiting => "waiting",
            PaymentStatus::Successful => "successful",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Refused | PaymentStatus::Successful)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "refused" => Ok(PaymentStatus::Refused),
            "waiting" => Ok(PaymentStatus::Waiting),
            "successful" => Ok(PaymentStatus::Successful),
            other => Err(AppError::BadRequest(format!(
                "Invalid payment status '{}'",
                other
            ))),
        }
    }
}

/// Represents the 'payment_requests' table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub id: Uuid,
    pub user_id: i64,
    pub name: String,
    pub phone: String,
    pub bank: Option<String>,
    pub bank_account: Option<String>,
    pub bank_address: Option<String>,
    pub transaction_id: Option<String>,
    pub reference: Option<String>,
    pub status: PaymentStatus,
    pub requested_amount: i64,
    pub paid_amount: i64,
    pub paid_by: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// DTO for a payout request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewPaymentRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 30))]
    pub phone: String,
    #[validate(length(max = 100))]
    pub bank: Option<String>,
    #[validate(length(max = 50))]
    pub bank_account: Option<String>,
    #[validate(length(max = 300))]
    pub bank_address: Option<String>,
    pub transaction_id: Option<String>,
    pub reference: Option<String>,
    #[validate(range(min = 1, max = MAX_MONEY_AMOUNT))]
    pub requested_amount: i64,
}

/// DTO for marking a payout as given. `paid_amount` defaults to the
/// requested amount and may not exceed it.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PaymentSettlement {
    #[validate(length(max = 100))]
    pub transaction_id: Option<String>,
    #[validate(length(max = 100))]
    pub reference: Option<String>,
    #[validate(range(min = 1, max = MAX_MONEY_AMOUNT))]
    pub paid_amount: Option<i64>,
    pub status: Option<PaymentStatus>,
    pub paid_by: Option<String>,
}

/// One row of the admin payment-request overview.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequestOverview {
    #[serde(flatten)]
    pub request: PaymentRequest,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub user_role: Option<String>,
}
