//! Postgres-backed store.
//!
//! Queries are checked at runtime so the crate builds without a live
//! database. Enum columns are TEXT and parsed on read; nested structures
//! live in JSONB.

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{
    PgConnection,
    postgres::{PgPool, PgPoolOptions},
    types::Json,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        approval::{ApprovalStatus, Workflow, normalize_approvals},
        ledger::{
            Earnings, FinancialSnapshot, NewPaymentRequest, PaymentRequest,
            PaymentRequestOverview, PaymentSettlement, PaymentStatus, PostStats, SponsorStats,
            SponsorTypeDetail,
        },
        organized_post::{
            CategoryTopNewsEntry, DailyTopNewsEntry, DailyTopNewsUpdate, OrganizedPost,
        },
        post::{NewPost, Post},
        rate_card::{AdsTypePrice, RateCard, RateCardRequest},
        sponsor::{NewSponsor, Sponsor, SponsorProposal, SponsorStatus, SponsoredPost},
        user::User,
    },
    store::{
        LedgerStore, OrganizedEdit, PostEdit, PostStore, ProposalReview, RateCardStore,
        SponsorStore, UserStore, WorkflowStore,
    },
};

/// Serializes writers that move the daily "main" flag between aggregates.
const DAILY_MAIN_LOCK_KEY: i64 = 0x6d61_696e;

const USER_COLUMNS: &str = "id, name, email, phone, role, created_at";

const POST_COLUMNS: &str = "id, author_id, author_name, title, slug, summary, content, category, \
    tags, keywords, meta_description, featured_image, attachments, video, \
    status, approvals, is_published, published_at, created_at, updated_at";

const ORGANIZED_COLUMNS: &str = "id, post_id, status, approvals, is_published, published_at, \
    sponsored, sponsor_id, category_top_news, daily_top_news, created_at, updated_at";

const SPONSOR_COLUMNS: &str = "id, sponsor_added_by, sponsor_managed_by, sponsor_name, \
    sponsor_email, sponsor_phone, start_date, end_date, total_amount, day, category, ads_type, \
    position, status, published, sponsored_post, source_entry_id, created_at";

const PROPOSAL_COLUMNS: &str = "id, owner_id, sponsor_name, sponsor_email, sponsor_phone, \
    ad_type, start_date, end_date, total_amount, status, created_at";

const RATE_CARD_COLUMNS: &str = "id, category, price_per_post, ads_types, created_at, updated_at";

const SNAPSHOT_COLUMNS: &str = "user_id, user_name, posts, sponsors, sponsor_details_user, \
    sponsor_details_agency, earnings, price_per_post, updated_at";

const PAYMENT_COLUMNS: &str = "id, user_id, name, phone, bank, bank_account, bank_address, \
    transaction_id, reference, status, requested_amount, paid_amount, paid_by, requested_at, paid_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .connect(url)
            .await
    }

    pub async fn run_migrations(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Parses an enum stored as TEXT. A bad value is corrupt data, not bad input.
fn stored<T>(raw: &str) -> Result<T, AppError>
where
    T: FromStr<Err = AppError>,
{
    raw.parse()
        .map_err(|err: AppError| AppError::InternalServerError(format!("corrupt column: {}", err)))
}

fn unique_violation(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::BadRequest(message.to_string())
        }
        _ => err.into(),
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    phone: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            role: stored(&row.role)?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    author_id: i64,
    author_name: String,
    title: String,
    slug: String,
    summary: Option<String>,
    content: String,
    category: String,
    tags: Json<Vec<String>>,
    keywords: Json<Vec<String>>,
    meta_description: Option<String>,
    featured_image: Option<String>,
    attachments: Json<Vec<String>>,
    video: Option<String>,
    status: String,
    approvals: Json<Value>,
    is_published: bool,
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PostRow> for Post {
    type Error = AppError;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            author_id: row.author_id,
            author_name: row.author_name,
            title: row.title,
            slug: row.slug,
            summary: row.summary,
            content: row.content,
            category: row.category,
            tags: row.tags.0,
            keywords: row.keywords.0,
            meta_description: row.meta_description,
            featured_image: row.featured_image,
            attachments: row.attachments.0,
            video: row.video,
            workflow: Workflow {
                status: stored::<ApprovalStatus>(&row.status)?,
                approvals: normalize_approvals(&row.approvals.0),
                is_published: row.is_published,
                published_at: row.published_at,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrganizedRow {
    id: i64,
    post_id: i64,
    status: String,
    approvals: Json<Value>,
    is_published: bool,
    published_at: Option<DateTime<Utc>>,
    sponsored: bool,
    sponsor_id: Option<i64>,
    category_top_news: Json<BTreeMap<String, Vec<CategoryTopNewsEntry>>>,
    daily_top_news: Json<Vec<DailyTopNewsEntry>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrganizedRow> for OrganizedPost {
    type Error = AppError;

    fn try_from(row: OrganizedRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            post_id: row.post_id,
            workflow: Workflow {
                status: stored::<ApprovalStatus>(&row.status)?,
                approvals: normalize_approvals(&row.approvals.0),
                is_published: row.is_published,
                published_at: row.published_at,
            },
            sponsored: row.sponsored,
            sponsor_id: row.sponsor_id,
            category_top_news: row.category_top_news.0,
            daily_top_news: row.daily_top_news.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SponsorRow {
    id: i64,
    sponsor_added_by: i64,
    sponsor_managed_by: Option<i64>,
    sponsor_name: String,
    sponsor_email: Option<String>,
    sponsor_phone: Option<String>,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    total_amount: i64,
    day: i32,
    category: Option<String>,
    ads_type: Option<String>,
    position: String,
    status: String,
    published: bool,
    sponsored_post: Option<Json<SponsoredPost>>,
    source_entry_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SponsorRow> for Sponsor {
    type Error = AppError;

    fn try_from(row: SponsorRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            sponsor_added_by: row.sponsor_added_by,
            sponsor_managed_by: row.sponsor_managed_by,
            sponsor_name: row.sponsor_name,
            sponsor_email: row.sponsor_email,
            sponsor_phone: row.sponsor_phone,
            start_date: row.start_date,
            end_date: row.end_date,
            total_amount: row.total_amount,
            day: row.day,
            category: row.category,
            ads_type: row.ads_type,
            position: row.position,
            status: stored(&row.status)?,
            published: row.published,
            sponsored_post: row.sponsored_post.map(|post| post.0),
            source_entry_id: row.source_entry_id,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProposalRow {
    id: Uuid,
    owner_id: i64,
    sponsor_name: String,
    sponsor_email: Option<String>,
    sponsor_phone: Option<String>,
    ad_type: Option<String>,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    total_amount: i64,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProposalRow> for SponsorProposal {
    type Error = AppError;

    fn try_from(row: ProposalRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            sponsor_name: row.sponsor_name,
            sponsor_email: row.sponsor_email,
            sponsor_phone: row.sponsor_phone,
            ad_type: row.ad_type,
            start_date: row.start_date,
            end_date: row.end_date,
            total_amount: row.total_amount,
            status: stored(&row.status)?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RateCardRow {
    id: i64,
    category: String,
    price_per_post: i64,
    ads_types: Json<Vec<AdsTypePrice>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RateCardRow> for RateCard {
    fn from(row: RateCardRow) -> Self {
        Self {
            id: row.id,
            category: row.category,
            price_per_post: row.price_per_post,
            ads_types: row.ads_types.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    user_id: i64,
    user_name: String,
    posts: Json<PostStats>,
    sponsors: Json<SponsorStats>,
    sponsor_details_user: Json<Vec<SponsorTypeDetail>>,
    sponsor_details_agency: Json<Vec<SponsorTypeDetail>>,
    earnings: Json<Earnings>,
    price_per_post: i64,
    updated_at: DateTime<Utc>,
}

impl From<SnapshotRow> for FinancialSnapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            user_id: row.user_id,
            user_name: row.user_name,
            posts: row.posts.0,
            sponsors: row.sponsors.0,
            sponsor_details_per_type_for_user: row.sponsor_details_user.0,
            sponsor_details_per_type_for_agency: row.sponsor_details_agency.0,
            earnings: row.earnings.0,
            price_per_post: row.price_per_post,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    user_id: i64,
    name: String,
    phone: String,
    bank: Option<String>,
    bank_account: Option<String>,
    bank_address: Option<String>,
    transaction_id: Option<String>,
    reference: Option<String>,
    status: String,
    requested_amount: i64,
    paid_amount: i64,
    paid_by: Option<String>,
    requested_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for PaymentRequest {
    type Error = AppError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            phone: row.phone,
            bank: row.bank,
            bank_account: row.bank_account,
            bank_address: row.bank_address,
            transaction_id: row.transaction_id,
            reference: row.reference,
            status: stored::<PaymentStatus>(&row.status)?,
            requested_amount: row.requested_amount,
            paid_amount: row.paid_amount,
            paid_by: row.paid_by,
            requested_at: row.requested_at,
            paid_at: row.paid_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentOverviewRow {
    #[sqlx(flatten)]
    request: PaymentRow,
    user_name: Option<String>,
    user_email: Option<String>,
    user_role: Option<String>,
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>, AppError>
where
    T: TryFrom<R, Error = AppError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ---------------------------------------------------------------------------
// Shared writes (run on a pool connection or inside a transaction)
// ---------------------------------------------------------------------------

async fn save_post(conn: &mut PgConnection, post: &Post) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE posts SET title = $2, summary = $3, content = $4, category = $5, tags = $6, \
         keywords = $7, meta_description = $8, featured_image = $9, attachments = $10, video = $11, \
         status = $12, approvals = $13, is_published = $14, published_at = $15, updated_at = $16 \
         WHERE id = $1",
    )
    .bind(post.id)
    .bind(&post.title)
    .bind(&post.summary)
    .bind(&post.content)
    .bind(&post.category)
    .bind(Json(&post.tags))
    .bind(Json(&post.keywords))
    .bind(&post.meta_description)
    .bind(&post.featured_image)
    .bind(Json(&post.attachments))
    .bind(&post.video)
    .bind(post.workflow.status.as_str())
    .bind(Json(&post.workflow.approvals))
    .bind(post.workflow.is_published)
    .bind(post.workflow.published_at)
    .bind(post.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn save_organized(conn: &mut PgConnection, organized: &OrganizedPost) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE organized_posts SET status = $2, approvals = $3, is_published = $4, \
         published_at = $5, sponsored = $6, sponsor_id = $7, category_top_news = $8, \
         daily_top_news = $9, updated_at = $10 WHERE id = $1",
    )
    .bind(organized.id)
    .bind(organized.workflow.status.as_str())
    .bind(Json(&organized.workflow.approvals))
    .bind(organized.workflow.is_published)
    .bind(organized.workflow.published_at)
    .bind(organized.sponsored)
    .bind(organized.sponsor_id)
    .bind(Json(&organized.category_top_news))
    .bind(Json(&organized.daily_top_news))
    .bind(organized.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn lock_organized(conn: &mut PgConnection, id: i64) -> Result<OrganizedPost, AppError> {
    let row = sqlx::query_as::<_, OrganizedRow>(&format!(
        "SELECT {ORGANIZED_COLUMNS} FROM organized_posts WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Organized post not found".to_string()))?;
    row.try_into()
}

async fn upsert_snapshot(conn: &mut PgConnection, snapshot: &FinancialSnapshot) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO financial_snapshots (user_id, user_name, posts, sponsors, sponsor_details_user, \
         sponsor_details_agency, earnings, price_per_post, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (user_id) DO UPDATE SET user_name = EXCLUDED.user_name, posts = EXCLUDED.posts, \
         sponsors = EXCLUDED.sponsors, sponsor_details_user = EXCLUDED.sponsor_details_user, \
         sponsor_details_agency = EXCLUDED.sponsor_details_agency, earnings = EXCLUDED.earnings, \
         price_per_post = EXCLUDED.price_per_post, updated_at = EXCLUDED.updated_at",
    )
    .bind(snapshot.user_id)
    .bind(&snapshot.user_name)
    .bind(Json(&snapshot.posts))
    .bind(Json(&snapshot.sponsors))
    .bind(Json(&snapshot.sponsor_details_per_type_for_user))
    .bind(Json(&snapshot.sponsor_details_per_type_for_agency))
    .bind(Json(&snapshot.earnings))
    .bind(snapshot.price_per_post)
    .bind(snapshot.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn lock_snapshot(conn: &mut PgConnection, user_id: i64) -> Result<FinancialSnapshot, AppError> {
    let row = sqlx::query_as::<_, SnapshotRow>(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM financial_snapshots WHERE user_id = $1 FOR UPDATE"
    ))
    .bind(user_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Financial details not found".to_string()))?;
    Ok(row.into())
}

async fn insert_sponsor_row(
    conn: &mut PgConnection,
    sponsor: NewSponsor,
    now: DateTime<Utc>,
    skip_if_forked: bool,
) -> Result<Option<Sponsor>, AppError> {
    let conflict = if skip_if_forked {
        "ON CONFLICT (source_entry_id) DO NOTHING"
    } else {
        ""
    };
    let row = sqlx::query_as::<_, SponsorRow>(&format!(
        "INSERT INTO sponsors (sponsor_added_by, sponsor_managed_by, sponsor_name, sponsor_email, \
         sponsor_phone, start_date, end_date, total_amount, day, category, ads_type, position, \
         status, published, sponsored_post, source_entry_id, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
         {conflict} RETURNING {SPONSOR_COLUMNS}"
    ))
    .bind(sponsor.sponsor_added_by)
    .bind(sponsor.sponsor_managed_by)
    .bind(sponsor.sponsor_name)
    .bind(sponsor.sponsor_email)
    .bind(sponsor.sponsor_phone)
    .bind(sponsor.start_date)
    .bind(sponsor.end_date)
    .bind(sponsor.total_amount)
    .bind(sponsor.day)
    .bind(sponsor.category)
    .bind(sponsor.ads_type)
    .bind(sponsor.position)
    .bind(sponsor.status.as_str())
    .bind(sponsor.published)
    .bind(sponsor.sponsored_post.map(Json))
    .bind(sponsor.source_entry_id)
    .bind(now)
    .fetch_optional(conn)
    .await?;

    row.map(Sponsor::try_from).transpose()
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: User) -> Result<User, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, name, email, phone, role, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| unique_violation(err, "User details already exist"))?;
        row.try_into()
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn update_user(&self, user: &User) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE users SET name = $2, email = $3, phone = $4, role = $5 WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.role.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    async fn delete_user(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn insert_post(&self, post: NewPost, now: DateTime<Utc>) -> Result<Post, AppError> {
        let workflow = Workflow::default();
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "INSERT INTO posts (author_id, author_name, title, slug, summary, content, category, \
             tags, keywords, meta_description, featured_image, attachments, video, \
             status, approvals, is_published, published_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, FALSE, NULL, $16, $16) \
             RETURNING {POST_COLUMNS}"
        ))
        .bind(post.author_id)
        .bind(post.author_name)
        .bind(post.title)
        .bind(post.slug)
        .bind(post.summary)
        .bind(post.content)
        .bind(post.category)
        .bind(Json(post.tags))
        .bind(Json(post.keywords))
        .bind(post.meta_description)
        .bind(post.featured_image)
        .bind(Json(post.attachments))
        .bind(post.video)
        .bind(workflow.status.as_str())
        .bind(Json(&workflow.approvals))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| unique_violation(err, "Title already exists"))?;
        row.try_into()
    }

    async fn get_post(&self, id: i64) -> Result<Option<Post>, AppError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Post::try_from).transpose()
    }

    async fn list_posts(&self) -> Result<Vec<Post>, AppError> {
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn list_posts_by_author(&self, author_id: i64) -> Result<Vec<Post>, AppError> {
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE author_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(author_id)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn modify_post(&self, id: i64, edit: PostEdit<'_>) -> Result<Post, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;
        let mut post = Post::try_from(row)?;

        edit(&mut post)?;
        post.updated_at = Utc::now();
        save_post(&mut tx, &post).await?;

        tx.commit().await?;
        Ok(post)
    }

    async fn delete_post(&self, id: i64) -> Result<Option<Post>, AppError> {
        // organized_posts rows go with it via ON DELETE CASCADE
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "DELETE FROM posts WHERE id = $1 RETURNING {POST_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Post::try_from).transpose()
    }
}

#[async_trait]
impl WorkflowStore for PgStore {
    async fn upsert_organized(&self, post: &Post, now: DateTime<Utc>) -> Result<OrganizedPost, AppError> {
        let row = sqlx::query_as::<_, OrganizedRow>(&format!(
            "INSERT INTO organized_posts (post_id, status, approvals, is_published, published_at, \
             sponsored, sponsor_id, category_top_news, daily_top_news, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, FALSE, NULL, '{{}}'::jsonb, '[]'::jsonb, $6, $6) \
             ON CONFLICT (post_id) DO UPDATE SET status = EXCLUDED.status, \
             approvals = EXCLUDED.approvals, is_published = EXCLUDED.is_published, \
             published_at = EXCLUDED.published_at, updated_at = EXCLUDED.updated_at \
             RETURNING {ORGANIZED_COLUMNS}"
        ))
        .bind(post.id)
        .bind(post.workflow.status.as_str())
        .bind(Json(&post.workflow.approvals))
        .bind(post.workflow.is_published)
        .bind(post.workflow.published_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_organized(&self, id: i64) -> Result<Option<OrganizedPost>, AppError> {
        let row = sqlx::query_as::<_, OrganizedRow>(&format!(
            "SELECT {ORGANIZED_COLUMNS} FROM organized_posts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(OrganizedPost::try_from).transpose()
    }

    async fn list_organized(&self) -> Result<Vec<OrganizedPost>, AppError> {
        let rows = sqlx::query_as::<_, OrganizedRow>(&format!(
            "SELECT {ORGANIZED_COLUMNS} FROM organized_posts ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn modify_organized(&self, id: i64, edit: OrganizedEdit<'_>) -> Result<OrganizedPost, AppError> {
        let mut tx = self.pool.begin().await?;

        let mut organized = lock_organized(&mut tx, id).await?;
        edit(&mut organized)?;
        organized.updated_at = Utc::now();
        save_organized(&mut tx, &organized).await?;

        tx.commit().await?;
        Ok(organized)
    }

    async fn delete_organized(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM organized_posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_daily_top_news(
        &self,
        id: i64,
        update: DailyTopNewsUpdate,
        now: DateTime<Utc>,
    ) -> Result<DailyTopNewsEntry, AppError> {
        let mut tx = self.pool.begin().await?;

        if update.sets_main() {
            sqlx::query("SELECT pg_advisory_xact_lock($1)")
                .bind(DAILY_MAIN_LOCK_KEY)
                .execute(&mut *tx)
                .await?;
        }

        let mut target = lock_organized(&mut tx, id).await?;
        let entry = target.apply_daily_top_news(&update, now)?;

        if update.sets_main() {
            let rows = sqlx::query_as::<_, OrganizedRow>(&format!(
                "SELECT {ORGANIZED_COLUMNS} FROM organized_posts \
                 WHERE id <> $1 AND daily_top_news @> '[{{\"main\": true}}]'::jsonb FOR UPDATE"
            ))
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

            for row in rows {
                let mut other = OrganizedPost::try_from(row)?;
                if other.clear_main(now) {
                    save_organized(&mut tx, &other).await?;
                }
            }
        }

        save_organized(&mut tx, &target).await?;
        tx.commit().await?;
        Ok(entry)
    }
}

#[async_trait]
impl SponsorStore for PgStore {
    async fn insert_sponsor(&self, sponsor: NewSponsor, now: DateTime<Utc>) -> Result<Sponsor, AppError> {
        let mut conn = self.pool.acquire().await?;
        insert_sponsor_row(&mut conn, sponsor, now, false)
            .await?
            .ok_or_else(|| AppError::InternalServerError("sponsor insert returned no row".to_string()))
    }

    async fn get_sponsor(&self, id: i64) -> Result<Option<Sponsor>, AppError> {
        let row = sqlx::query_as::<_, SponsorRow>(&format!(
            "SELECT {SPONSOR_COLUMNS} FROM sponsors WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Sponsor::try_from).transpose()
    }

    async fn list_sponsors(&self) -> Result<Vec<Sponsor>, AppError> {
        let rows = sqlx::query_as::<_, SponsorRow>(&format!(
            "SELECT {SPONSOR_COLUMNS} FROM sponsors ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn list_sponsors_managed_by(&self, user_id: i64) -> Result<Vec<Sponsor>, AppError> {
        let rows = sqlx::query_as::<_, SponsorRow>(&format!(
            "SELECT {SPONSOR_COLUMNS} FROM sponsors WHERE sponsor_managed_by = $1 ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn update_sponsor(&self, sponsor: &Sponsor) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE sponsors SET sponsor_managed_by = $2, sponsor_name = $3, sponsor_email = $4, \
             sponsor_phone = $5, end_date = $6, total_amount = $7, day = $8, position = $9, \
             status = $10, published = $11, sponsored_post = $12 WHERE id = $1",
        )
        .bind(sponsor.id)
        .bind(sponsor.sponsor_managed_by)
        .bind(&sponsor.sponsor_name)
        .bind(&sponsor.sponsor_email)
        .bind(&sponsor.sponsor_phone)
        .bind(sponsor.end_date)
        .bind(sponsor.total_amount)
        .bind(sponsor.day)
        .bind(&sponsor.position)
        .bind(sponsor.status.as_str())
        .bind(sponsor.published)
        .bind(sponsor.sponsored_post.as_ref().map(Json))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Sponsor not found".to_string()));
        }
        Ok(())
    }

    async fn delete_sponsor(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM sponsors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_proposal(&self, proposal: SponsorProposal) -> Result<SponsorProposal, AppError> {
        let row = sqlx::query_as::<_, ProposalRow>(&format!(
            "INSERT INTO sponsor_proposals (id, owner_id, sponsor_name, sponsor_email, sponsor_phone, \
             ad_type, start_date, end_date, total_amount, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {PROPOSAL_COLUMNS}"
        ))
        .bind(proposal.id)
        .bind(proposal.owner_id)
        .bind(&proposal.sponsor_name)
        .bind(&proposal.sponsor_email)
        .bind(&proposal.sponsor_phone)
        .bind(&proposal.ad_type)
        .bind(proposal.start_date)
        .bind(proposal.end_date)
        .bind(proposal.total_amount)
        .bind(proposal.status.as_str())
        .bind(proposal.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                AppError::NotFound("User not found".to_string())
            }
            _ => err.into(),
        })?;
        row.try_into()
    }

    async fn list_proposals(&self, owner_id: i64) -> Result<Vec<SponsorProposal>, AppError> {
        let rows = sqlx::query_as::<_, ProposalRow>(&format!(
            "SELECT {PROPOSAL_COLUMNS} FROM sponsor_proposals WHERE owner_id = $1 ORDER BY created_at"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn review_proposal(
        &self,
        owner_id: i64,
        entry_id: Uuid,
        status: SponsorStatus,
        approver_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ProposalReview, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ProposalRow>(&format!(
            "UPDATE sponsor_proposals SET status = $3 WHERE owner_id = $1 AND id = $2 \
             RETURNING {PROPOSAL_COLUMNS}"
        ))
        .bind(owner_id)
        .bind(entry_id)
        .bind(status.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Sponsor not found".to_string()))?;
        let proposal = SponsorProposal::try_from(row)?;

        let forked = if status == SponsorStatus::Accepted {
            insert_sponsor_row(&mut tx, proposal.fork(approver_id), now, true).await?
        } else {
            None
        };

        tx.commit().await?;
        Ok(ProposalReview { proposal, forked })
    }

    async fn delete_proposal(&self, owner_id: i64, entry_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM sponsor_proposals WHERE owner_id = $1 AND id = $2")
            .bind(owner_id)
            .bind(entry_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RateCardStore for PgStore {
    async fn insert_rate_card(&self, card: RateCardRequest, now: DateTime<Utc>) -> Result<RateCard, AppError> {
        let row = sqlx::query_as::<_, RateCardRow>(&format!(
            "INSERT INTO rate_cards (category, price_per_post, ads_types, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4) RETURNING {RATE_CARD_COLUMNS}"
        ))
        .bind(card.category())
        .bind(card.price_per_post)
        .bind(Json(&card.ads_types))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| unique_violation(err, "Category already exists"))?;
        Ok(row.into())
    }

    async fn get_rate_card(&self, id: i64) -> Result<Option<RateCard>, AppError> {
        let row = sqlx::query_as::<_, RateCardRow>(&format!(
            "SELECT {RATE_CARD_COLUMNS} FROM rate_cards WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RateCard::from))
    }

    async fn list_rate_cards(&self) -> Result<Vec<RateCard>, AppError> {
        let rows = sqlx::query_as::<_, RateCardRow>(&format!(
            "SELECT {RATE_CARD_COLUMNS} FROM rate_cards ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(RateCard::from).collect())
    }

    async fn update_rate_card(
        &self,
        id: i64,
        card: RateCardRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<RateCard>, AppError> {
        let row = sqlx::query_as::<_, RateCardRow>(&format!(
            "UPDATE rate_cards SET category = $2, price_per_post = $3, ads_types = $4, updated_at = $5 \
             WHERE id = $1 RETURNING {RATE_CARD_COLUMNS}"
        ))
        .bind(id)
        .bind(card.category())
        .bind(card.price_per_post)
        .bind(Json(&card.ads_types))
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| unique_violation(err, "Category already exists"))?;
        Ok(row.map(RateCard::from))
    }

    async fn delete_rate_card(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM rate_cards WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn global_rate_card(&self) -> Result<Option<RateCard>, AppError> {
        let row = sqlx::query_as::<_, RateCardRow>(&format!(
            "SELECT {RATE_CARD_COLUMNS} FROM rate_cards ORDER BY id LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(RateCard::from))
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn get_snapshot(&self, user_id: i64) -> Result<Option<FinancialSnapshot>, AppError> {
        let row = sqlx::query_as::<_, SnapshotRow>(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM financial_snapshots WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(FinancialSnapshot::from))
    }

    async fn save_snapshot(&self, snapshot: &FinancialSnapshot) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        upsert_snapshot(&mut conn, snapshot).await
    }

    async fn list_payment_requests(&self, user_id: i64) -> Result<Vec<PaymentRequest>, AppError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payment_requests WHERE user_id = $1 ORDER BY requested_at"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        collect(rows)
    }

    async fn list_all_payment_requests(&self) -> Result<Vec<PaymentRequestOverview>, AppError> {
        let rows = sqlx::query_as::<_, PaymentOverviewRow>(
            "SELECT p.id, p.user_id, p.name, p.phone, p.bank, p.bank_account, p.bank_address, \
             p.transaction_id, p.reference, p.status, p.requested_amount, p.paid_amount, p.paid_by, \
             p.requested_at, p.paid_at, u.name AS user_name, u.email AS user_email, u.role AS user_role \
             FROM payment_requests p LEFT JOIN users u ON u.id = p.user_id \
             ORDER BY p.requested_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(PaymentRequestOverview {
                    request: row.request.try_into()?,
                    user_name: row.user_name,
                    user_email: row.user_email,
                    user_role: row.user_role,
                })
            })
            .collect()
    }

    async fn reserve_payment(
        &self,
        user_id: i64,
        request: NewPaymentRequest,
        now: DateTime<Utc>,
    ) -> Result<(FinancialSnapshot, PaymentRequest), AppError> {
        let mut tx = self.pool.begin().await?;

        let mut snapshot = lock_snapshot(&mut tx, user_id).await?;
        let request = snapshot.reserve_payment(request, now)?;

        upsert_snapshot(&mut tx, &snapshot).await?;
        sqlx::query(
            "INSERT INTO payment_requests (id, user_id, name, phone, bank, bank_account, bank_address, \
             transaction_id, reference, status, requested_amount, paid_amount, paid_by, requested_at, paid_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(request.id)
        .bind(request.user_id)
        .bind(&request.name)
        .bind(&request.phone)
        .bind(&request.bank)
        .bind(&request.bank_account)
        .bind(&request.bank_address)
        .bind(&request.transaction_id)
        .bind(&request.reference)
        .bind(request.status.as_str())
        .bind(request.requested_amount)
        .bind(request.paid_amount)
        .bind(&request.paid_by)
        .bind(request.requested_at)
        .bind(request.paid_at)
        .execute(&mut *tx)
        .await
        .map_err(|err| unique_violation(err, "Duplicate payment request"))?;

        tx.commit().await?;
        Ok((snapshot, request))
    }

    async fn settle_payment(
        &self,
        request_id: Uuid,
        settlement: PaymentSettlement,
        now: DateTime<Utc>,
    ) -> Result<(PaymentRequest, bool), AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payment_requests WHERE id = $1 FOR UPDATE"
        ))
        .bind(request_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment request not found".to_string()))?;
        let mut request = PaymentRequest::try_from(row)?;
        let mut snapshot = lock_snapshot(&mut tx, request.user_id).await?;

        let changed = snapshot.settle_payment(&mut request, settlement, now)?;
        if changed {
            sqlx::query(
                "UPDATE payment_requests SET transaction_id = $2, reference = $3, status = $4, \
                 paid_amount = $5, paid_by = $6, paid_at = $7 WHERE id = $1",
            )
            .bind(request.id)
            .bind(&request.transaction_id)
            .bind(&request.reference)
            .bind(request.status.as_str())
            .bind(request.paid_amount)
            .bind(&request.paid_by)
            .bind(request.paid_at)
            .execute(&mut *tx)
            .await?;
            upsert_snapshot(&mut tx, &snapshot).await?;
        }

        tx.commit().await?;
        Ok((request, changed))
    }
}
