//! Persistence seam. Handlers only see these traits; `PgStore` backs
//! production and `MemoryStore` backs tests and database-less runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        ledger::{
            FinancialSnapshot, NewPaymentRequest, PaymentRequest, PaymentRequestOverview,
            PaymentSettlement,
        },
        organized_post::{DailyTopNewsEntry, DailyTopNewsUpdate, OrganizedPost},
        post::{NewPost, Post},
        rate_card::{RateCard, RateCardRequest},
        sponsor::{NewSponsor, Sponsor, SponsorProposal, SponsorStatus},
        user::User,
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// In-place edit applied to a locked post row.
pub type PostEdit<'a> = Box<dyn FnOnce(&mut Post) -> Result<(), AppError> + Send + 'a>;

/// In-place edit applied to a locked workflow aggregate.
pub type OrganizedEdit<'a> = Box<dyn FnOnce(&mut OrganizedPost) -> Result<(), AppError> + Send + 'a>;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: User) -> Result<User, AppError>;
    async fn get_user(&self, id: i64) -> Result<Option<User>, AppError>;
    async fn list_users(&self) -> Result<Vec<User>, AppError>;
    async fn update_user(&self, user: &User) -> Result<(), AppError>;
    async fn delete_user(&self, id: i64) -> Result<bool, AppError>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Fails with 400 "Title already exists" when the slug is taken.
    async fn insert_post(&self, post: NewPost, now: DateTime<Utc>) -> Result<Post, AppError>;
    async fn get_post(&self, id: i64) -> Result<Option<Post>, AppError>;
    /// Newest first.
    async fn list_posts(&self) -> Result<Vec<Post>, AppError>;
    async fn list_posts_by_author(&self, author_id: i64) -> Result<Vec<Post>, AppError>;
    /// Loads the post under a row lock, applies `edit` and writes it back.
    async fn modify_post(&self, id: i64, edit: PostEdit<'_>) -> Result<Post, AppError>;
    /// Removes the post and its workflow aggregate. Returns the removed post.
    async fn delete_post(&self, id: i64) -> Result<Option<Post>, AppError>;
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Creates the post's aggregate, or refreshes its review snapshot
    /// while keeping sponsorship and rankings.
    async fn upsert_organized(&self, post: &Post, now: DateTime<Utc>) -> Result<OrganizedPost, AppError>;
    async fn get_organized(&self, id: i64) -> Result<Option<OrganizedPost>, AppError>;
    async fn list_organized(&self) -> Result<Vec<OrganizedPost>, AppError>;
    async fn modify_organized(&self, id: i64, edit: OrganizedEdit<'_>) -> Result<OrganizedPost, AppError>;
    async fn delete_organized(&self, id: i64) -> Result<bool, AppError>;
    /// Applies a daily top news change. When it sets `main`, every other
    /// aggregate loses its main entry in the same unit of work.
    async fn set_daily_top_news(
        &self,
        id: i64,
        update: DailyTopNewsUpdate,
        now: DateTime<Utc>,
    ) -> Result<DailyTopNewsEntry, AppError>;
}

/// Result of reviewing a sponsor proposal.
#[derive(Debug, Clone)]
pub struct ProposalReview {
    pub proposal: SponsorProposal,
    /// The sponsor created by this call. `None` when rejected or already forked.
    pub forked: Option<Sponsor>,
}

#[async_trait]
pub trait SponsorStore: Send + Sync {
    async fn insert_sponsor(&self, sponsor: NewSponsor, now: DateTime<Utc>) -> Result<Sponsor, AppError>;
    async fn get_sponsor(&self, id: i64) -> Result<Option<Sponsor>, AppError>;
    async fn list_sponsors(&self) -> Result<Vec<Sponsor>, AppError>;
    async fn list_sponsors_managed_by(&self, user_id: i64) -> Result<Vec<Sponsor>, AppError>;
    async fn update_sponsor(&self, sponsor: &Sponsor) -> Result<(), AppError>;
    async fn delete_sponsor(&self, id: i64) -> Result<bool, AppError>;

    async fn insert_proposal(&self, proposal: SponsorProposal) -> Result<SponsorProposal, AppError>;
    async fn list_proposals(&self, owner_id: i64) -> Result<Vec<SponsorProposal>, AppError>;
    /// Sets the proposal's status; acceptance forks a sponsor at most once.
    async fn review_proposal(
        &self,
        owner_id: i64,
        entry_id: Uuid,
        status: SponsorStatus,
        approver_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ProposalReview, AppError>;
    async fn delete_proposal(&self, owner_id: i64, entry_id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait RateCardStore: Send + Sync {
    /// Fails with 400 when the category is taken.
    async fn insert_rate_card(&self, card: RateCardRequest, now: DateTime<Utc>) -> Result<RateCard, AppError>;
    async fn get_rate_card(&self, id: i64) -> Result<Option<RateCard>, AppError>;
    async fn list_rate_cards(&self) -> Result<Vec<RateCard>, AppError>;
    async fn update_rate_card(
        &self,
        id: i64,
        card: RateCardRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<RateCard>, AppError>;
    async fn delete_rate_card(&self, id: i64) -> Result<bool, AppError>;
    /// The oldest card prices all earnings.
    async fn global_rate_card(&self) -> Result<Option<RateCard>, AppError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_snapshot(&self, user_id: i64) -> Result<Option<FinancialSnapshot>, AppError>;
    async fn save_snapshot(&self, snapshot: &FinancialSnapshot) -> Result<(), AppError>;
    async fn list_payment_requests(&self, user_id: i64) -> Result<Vec<PaymentRequest>, AppError>;
    async fn list_all_payment_requests(&self) -> Result<Vec<PaymentRequestOverview>, AppError>;
    /// Checks and decrements the balance and records the request atomically.
    async fn reserve_payment(
        &self,
        user_id: i64,
        request: NewPaymentRequest,
        now: DateTime<Utc>,
    ) -> Result<(FinancialSnapshot, PaymentRequest), AppError>;
    /// Settles a request and credits the owner's ledger atomically.
    /// The flag reports whether anything changed.
    async fn settle_payment(
        &self,
        request_id: Uuid,
        settlement: PaymentSettlement,
        now: DateTime<Utc>,
    ) -> Result<(PaymentRequest, bool), AppError>;
}

pub trait Store:
    UserStore + PostStore + WorkflowStore + SponsorStore + RateCardStore + LedgerStore
{
}

impl<T> Store for T where
    T: UserStore + PostStore + WorkflowStore + SponsorStore + RateCardStore + LedgerStore
{
}
