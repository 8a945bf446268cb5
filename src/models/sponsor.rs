use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::{DEFAULT_SPONSOR_DAYS, MAX_MONEY_AMOUNT},
    error::AppError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SponsorStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

impl SponsorStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SponsorStatus::Pending => "pending",
            SponsorStatus::Accepted => "accepted",
            SponsorStatus::Rejected => "rejected",
        }
    }

    /// Lenient parse for reviewer input: case-insensitive, and the common
    /// "accepte" misspelling counts as "accepted".
    pub fn normalize(raw: &str) -> Result<Self, AppError> {
        let lowered = raw.trim().to_lowercase();
        let canonical = if lowered == "accepte" { "accepted" } else { lowered.as_str() };
        canonical.parse()
    }
}

impl fmt::Display for SponsorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SponsorStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pending" => Ok(SponsorStatus::Pending),
            "accepted" => Ok(SponsorStatus::Accepted),
            "rejected" => Ok(SponsorStatus::Rejected),
            _ => Err(AppError::BadRequest("Invalid status value".to_string())),
        }
    }
}

/// Creative attached to a sponsorship.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct SponsoredPost {
    #[validate(length(max = 300))]
    pub title: Option<String>,
    #[validate(length(max = 500))]
    pub subtitle: Option<String>,
    pub video: Option<String>,
    pub photo: Option<String>,
    #[validate(custom(function = validate_url_string))]
    pub link: Option<String>,
}

/// Represents the 'sponsors' table: an accepted, first-class sponsorship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sponsor {
    pub id: i64,
    /// Who created or approved the sponsorship.
    pub sponsor_added_by: i64,
    /// The user whose ledger earns from it.
    pub sponsor_managed_by: Option<i64>,

    pub sponsor_name: String,
    pub sponsor_email: Option<String>,
    pub sponsor_phone: Option<String>,

    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub total_amount: i64,
    /// Sponsorship duration in days.
    pub day: i32,

    pub category: Option<String>,
    pub ads_type: Option<String>,
    /// Matched against rate card ad types when pricing earnings.
    pub position: String,

    pub status: SponsorStatus,
    pub published: bool,
    pub sponsored_post: Option<SponsoredPost>,

    /// Proposal entry this sponsor was forked from, if any.
    pub source_entry_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
}

/// Insert payload for `sponsors`.
#[derive(Debug, Clone)]
pub struct NewSponsor {
    pub sponsor_added_by: i64,
    pub sponsor_managed_by: Option<i64>,
    pub sponsor_name: String,
    pub sponsor_email: Option<String>,
    pub sponsor_phone: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub total_amount: i64,
    pub day: i32,
    pub category: Option<String>,
    pub ads_type: Option<String>,
    pub position: String,
    pub status: SponsorStatus,
    pub published: bool,
    pub sponsored_post: Option<SponsoredPost>,
    pub source_entry_id: Option<Uuid>,
}

/// DTO for creating a sponsor directly.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSponsorRequest {
    #[validate(length(min = 1, max = 200))]
    pub sponsor_name: String,
    #[validate(email)]
    pub sponsor_email: Option<String>,
    #[validate(length(min = 1, max = 30))]
    pub sponsor_phone: String,
    pub sponsor_managed_by: Option<i64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[validate(range(min = 0, max = MAX_MONEY_AMOUNT))]
    pub total_amount: Option<i64>,
    #[validate(range(min = 1, max = 365))]
    pub day: Option<i32>,
    pub category: Option<String>,
    pub ads_type: Option<String>,
    pub position: Option<String>,
    pub status: Option<String>,
    #[validate(nested)]
    pub sponsored_post: Option<SponsoredPost>,
}

impl CreateSponsorRequest {
    pub fn into_new_sponsor(self, added_by: i64, now: DateTime<Utc>) -> Result<NewSponsor, AppError> {
        let status = match self.status.as_deref() {
            Some(raw) => SponsorStatus::normalize(raw)?,
            None => SponsorStatus::Pending,
        };

        Ok(NewSponsor {
            sponsor_added_by: added_by,
            sponsor_managed_by: self.sponsor_managed_by,
            sponsor_name: self.sponsor_name,
            sponsor_email: self.sponsor_email,
            sponsor_phone: Some(self.sponsor_phone),
            start_date: self.start_date.unwrap_or(now),
            end_date: self.end_date,
            total_amount: self.total_amount.unwrap_or(0),
            day: self.day.unwrap_or(DEFAULT_SPONSOR_DAYS),
            category: self.category,
            ads_type: self.ads_type,
            position: self.position.unwrap_or_else(|| "post".to_string()),
            status,
            published: false,
            sponsored_post: self.sponsored_post,
            source_entry_id: None,
        })
    }
}

/// DTO for updating a sponsor. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSponsorRequest {
    #[validate(length(min = 1, max = 200))]
    pub sponsor_name: Option<String>,
    #[validate(email)]
    pub sponsor_email: Option<String>,
    #[validate(length(min = 1, max = 30))]
    pub sponsor_phone: Option<String>,
    pub sponsor_managed_by: Option<i64>,
    pub end_date: Option<DateTime<Utc>>,
    #[validate(range(min = 0, max = MAX_MONEY_AMOUNT))]
    pub total_amount: Option<i64>,
    #[validate(range(min = 1, max = 365))]
    pub day: Option<i32>,
    pub position: Option<String>,
    pub status: Option<String>,
    pub published: Option<bool>,
    #[validate(nested)]
    pub sponsored_post: Option<SponsoredPost>,
}

/// A pending sponsorship proposal attached to a user's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SponsorProposal {
    pub id: Uuid,
    pub owner_id: i64,
    pub sponsor_name: String,
    pub sponsor_email: Option<String>,
    pub sponsor_phone: Option<String>,
    pub ad_type: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub total_amount: i64,
    pub status: SponsorStatus,
    pub created_at: DateTime<Utc>,
}

impl SponsorProposal {
    /// The first-class sponsor created when this proposal is accepted.
    /// Always `accepted`, regardless of what the proposal row says.
    pub fn fork(&self, approver_id: i64) -> NewSponsor {
        NewSponsor {
            sponsor_added_by: approver_id,
            sponsor_managed_by: Some(self.owner_id),
            sponsor_name: self.sponsor_name.clone(),
            sponsor_email: self.sponsor_email.clone(),
            sponsor_phone: self.sponsor_phone.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            total_amount: self.total_amount,
            day: DEFAULT_SPONSOR_DAYS,
            category: None,
            ads_type: self.ad_type.clone(),
            position: self.ad_type.clone().unwrap_or_else(|| "post".to_string()),
            status: SponsorStatus::Accepted,
            published: false,
            sponsored_post: None,
            source_entry_id: Some(self.id),
        }
    }
}

/// DTO for proposing a sponsorship on a profile.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProposalRequest {
    #[validate(length(min = 1, max = 200))]
    pub sponsor_name: String,
    #[validate(email)]
    pub sponsor_email: Option<String>,
    #[validate(length(max = 30))]
    pub sponsor_phone: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub ad_type: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// DTO for accepting or rejecting a proposal.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProposalStatusRequest {
    pub sponsor_id: Uuid,
    #[validate(length(min = 1, max = 20))]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteProposalRequest {
    pub sponsor_id: Uuid,
}

/// Validates that a string is a correctly formatted URL.
fn validate_url_string(url: &str) -> Result<(), validator::ValidationError> {
    if Url::parse(url).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}
