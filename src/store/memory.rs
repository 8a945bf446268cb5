use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

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
    store::{
        LedgerStore, OrganizedEdit, PostEdit, PostStore, ProposalReview, RateCardStore,
        SponsorStore, UserStore, WorkflowStore,
    },
};

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<i64, User>,
    posts: BTreeMap<i64, Post>,
    organized: BTreeMap<i64, OrganizedPost>,
    sponsors: BTreeMap<i64, Sponsor>,
    proposals: Vec<SponsorProposal>,
    rate_cards: BTreeMap<i64, RateCard>,
    snapshots: BTreeMap<i64, FinancialSnapshot>,
    payments: Vec<PaymentRequest>,
    last_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn insert_sponsor(&mut self, sponsor: NewSponsor, now: DateTime<Utc>) -> Sponsor {
        let sponsor = Sponsor {
            id: self.next_id(),
            sponsor_added_by: sponsor.sponsor_added_by,
            sponsor_managed_by: sponsor.sponsor_managed_by,
            sponsor_name: sponsor.sponsor_name,
            sponsor_email: sponsor.sponsor_email,
            sponsor_phone: sponsor.sponsor_phone,
            start_date: sponsor.start_date,
            end_date: sponsor.end_date,
            total_amount: sponsor.total_amount,
            day: sponsor.day,
            category: sponsor.category,
            ads_type: sponsor.ads_type,
            position: sponsor.position,
            status: sponsor.status,
            published: sponsor.published,
            sponsored_post: sponsor.sponsored_post,
            source_entry_id: sponsor.source_entry_id,
            created_at: now,
        };
        self.sponsors.insert(sponsor.id, sponsor.clone());
        sponsor
    }

    fn category_taken(&self, category: &str, except: Option<i64>) -> bool {
        self.rate_cards
            .values()
            .any(|card| card.category == category && Some(card.id) != except)
    }
}

/// Process-local store. Every operation runs under one lock, so the
/// multi-record invariants hold the same way they do in a transaction.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::InternalServerError("memory store lock poisoned".to_string()))
    }
}

fn newest_first<T>(mut items: Vec<T>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    items
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: User) -> Result<User, AppError> {
        let mut state = self.lock()?;
        if state.users.contains_key(&user.id) {
            return Err(AppError::BadRequest("User details already exist".to_string()));
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        Ok(self.lock()?.users.values().cloned().collect())
    }

    async fn update_user(&self, user: &User) -> Result<(), AppError> {
        let mut state = self.lock()?;
        match state.users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(AppError::NotFound("User not found".to_string())),
        }
    }

    async fn delete_user(&self, id: i64) -> Result<bool, AppError> {
        let mut state = self.lock()?;
        let removed = state.users.remove(&id).is_some();
        if removed {
            state.proposals.retain(|proposal| proposal.owner_id != id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn insert_post(&self, post: NewPost, now: DateTime<Utc>) -> Result<Post, AppError> {
        let mut state = self.lock()?;
        if state.posts.values().any(|existing| existing.slug == post.slug) {
            return Err(AppError::BadRequest("Title already exists".to_string()));
        }

        let post = Post {
            id: state.next_id(),
            author_id: post.author_id,
            author_name: post.author_name,
            title: post.title,
            slug: post.slug,
            summary: post.summary,
            content: post.content,
            category: post.category,
            tags: post.tags,
            keywords: post.keywords,
            meta_description: post.meta_description,
            featured_image: post.featured_image,
            attachments: post.attachments,
            video: post.video,
            workflow: Default::default(),
            created_at: now,
            updated_at: now,
        };
        state.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn get_post(&self, id: i64) -> Result<Option<Post>, AppError> {
        Ok(self.lock()?.posts.get(&id).cloned())
    }

    async fn list_posts(&self) -> Result<Vec<Post>, AppError> {
        let posts: Vec<Post> = self.lock()?.posts.values().cloned().collect();
        Ok(newest_first(posts, |post| post.created_at))
    }

    async fn list_posts_by_author(&self, author_id: i64) -> Result<Vec<Post>, AppError> {
        let posts: Vec<Post> = self
            .lock()?
            .posts
            .values()
            .filter(|post| post.author_id == author_id)
            .cloned()
            .collect();
        Ok(newest_first(posts, |post| post.created_at))
    }

    async fn modify_post(&self, id: i64, edit: PostEdit<'_>) -> Result<Post, AppError> {
        let mut state = self.lock()?;
        let mut post = state
            .posts
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

        edit(&mut post)?;
        post.updated_at = Utc::now();
        state.posts.insert(id, post.clone());
        Ok(post)
    }

    async fn delete_post(&self, id: i64) -> Result<Option<Post>, AppError> {
        let mut state = self.lock()?;
        let removed = state.posts.remove(&id);
        if removed.is_some() {
            state.organized.retain(|_, organized| organized.post_id != id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn upsert_organized(&self, post: &Post, now: DateTime<Utc>) -> Result<OrganizedPost, AppError> {
        let mut state = self.lock()?;
        if let Some(existing) = state
            .organized
            .values_mut()
            .find(|organized| organized.post_id == post.id)
        {
            existing.workflow = post.workflow.clone();
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let id = state.next_id();
        let organized = OrganizedPost::shadow_of(post, id, now);
        state.organized.insert(id, organized.clone());
        Ok(organized)
    }

    async fn get_organized(&self, id: i64) -> Result<Option<OrganizedPost>, AppError> {
        Ok(self.lock()?.organized.get(&id).cloned())
    }

    async fn list_organized(&self) -> Result<Vec<OrganizedPost>, AppError> {
        let all: Vec<OrganizedPost> = self.lock()?.organized.values().cloned().collect();
        Ok(newest_first(all, |organized| organized.created_at))
    }

    async fn modify_organized(&self, id: i64, edit: OrganizedEdit<'_>) -> Result<OrganizedPost, AppError> {
        let mut state = self.lock()?;
        let mut organized = state
            .organized
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Organized post not found".to_string()))?;

        edit(&mut organized)?;
        organized.updated_at = Utc::now();
        state.organized.insert(id, organized.clone());
        Ok(organized)
    }

    async fn delete_organized(&self, id: i64) -> Result<bool, AppError> {
        Ok(self.lock()?.organized.remove(&id).is_some())
    }

    async fn set_daily_top_news(
        &self,
        id: i64,
        update: DailyTopNewsUpdate,
        now: DateTime<Utc>,
    ) -> Result<DailyTopNewsEntry, AppError> {
        let mut state = self.lock()?;
        let mut target = state
            .organized
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Organized post not found".to_string()))?;

        let entry = target.apply_daily_top_news(&update, now)?;

        if update.sets_main() {
            for (_, other) in state.organized.iter_mut().filter(|(other_id, _)| **other_id != id) {
                other.clear_main(now);
            }
        }
        state.organized.insert(id, target);
        Ok(entry)
    }
}

#[async_trait]
impl SponsorStore for MemoryStore {
    async fn insert_sponsor(&self, sponsor: NewSponsor, now: DateTime<Utc>) -> Result<Sponsor, AppError> {
        let mut state = self.lock()?;
        Ok(state.insert_sponsor(sponsor, now))
    }

    async fn get_sponsor(&self, id: i64) -> Result<Option<Sponsor>, AppError> {
        Ok(self.lock()?.sponsors.get(&id).cloned())
    }

    async fn list_sponsors(&self) -> Result<Vec<Sponsor>, AppError> {
        let sponsors: Vec<Sponsor> = self.lock()?.sponsors.values().cloned().collect();
        Ok(newest_first(sponsors, |sponsor| sponsor.created_at))
    }

    async fn list_sponsors_managed_by(&self, user_id: i64) -> Result<Vec<Sponsor>, AppError> {
        Ok(self
            .lock()?
            .sponsors
            .values()
            .filter(|sponsor| sponsor.sponsor_managed_by == Some(user_id))
            .cloned()
            .collect())
    }

    async fn update_sponsor(&self, sponsor: &Sponsor) -> Result<(), AppError> {
        let mut state = self.lock()?;
        match state.sponsors.get_mut(&sponsor.id) {
            Some(existing) => {
                *existing = sponsor.clone();
                Ok(())
            }
            None => Err(AppError::NotFound("Sponsor not found".to_string())),
        }
    }

    async fn delete_sponsor(&self, id: i64) -> Result<bool, AppError> {
        Ok(self.lock()?.sponsors.remove(&id).is_some())
    }

    async fn insert_proposal(&self, proposal: SponsorProposal) -> Result<SponsorProposal, AppError> {
        let mut state = self.lock()?;
        if !state.users.contains_key(&proposal.owner_id) {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        state.proposals.push(proposal.clone());
        Ok(proposal)
    }

    async fn list_proposals(&self, owner_id: i64) -> Result<Vec<SponsorProposal>, AppError> {
        Ok(self
            .lock()?
            .proposals
            .iter()
            .filter(|proposal| proposal.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn review_proposal(
        &self,
        owner_id: i64,
        entry_id: Uuid,
        status: SponsorStatus,
        approver_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ProposalReview, AppError> {
        let mut state = self.lock()?;
        let proposal = state
            .proposals
            .iter_mut()
            .find(|proposal| proposal.owner_id == owner_id && proposal.id == entry_id)
            .ok_or_else(|| AppError::NotFound("Sponsor not found".to_string()))?;
        proposal.status = status;
        let proposal = proposal.clone();

        let already_forked = state
            .sponsors
            .values()
            .any(|sponsor| sponsor.source_entry_id == Some(entry_id));

        let forked = if status == SponsorStatus::Accepted && !already_forked {
            Some(state.insert_sponsor(proposal.fork(approver_id), now))
        } else {
            None
        };

        Ok(ProposalReview { proposal, forked })
    }

    async fn delete_proposal(&self, owner_id: i64, entry_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.lock()?;
        let before = state.proposals.len();
        state
            .proposals
            .retain(|proposal| !(proposal.owner_id == owner_id && proposal.id == entry_id));
        Ok(state.proposals.len() != before)
    }
}

#[async_trait]
impl RateCardStore for MemoryStore {
    async fn insert_rate_card(&self, card: RateCardRequest, now: DateTime<Utc>) -> Result<RateCard, AppError> {
        let mut state = self.lock()?;
        let category = card.category();
        if state.category_taken(&category, None) {
            return Err(AppError::BadRequest("Category already exists".to_string()));
        }

        let card = RateCard {
            id: state.next_id(),
            category,
            price_per_post: card.price_per_post,
            ads_types: card.ads_types,
            created_at: now,
            updated_at: now,
        };
        state.rate_cards.insert(card.id, card.clone());
        Ok(card)
    }

    async fn get_rate_card(&self, id: i64) -> Result<Option<RateCard>, AppError> {
        Ok(self.lock()?.rate_cards.get(&id).cloned())
    }

    async fn list_rate_cards(&self) -> Result<Vec<RateCard>, AppError> {
        Ok(self.lock()?.rate_cards.values().cloned().collect())
    }

    async fn update_rate_card(
        &self,
        id: i64,
        card: RateCardRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<RateCard>, AppError> {
        let mut state = self.lock()?;
        let category = card.category();
        if state.category_taken(&category, Some(id)) {
            return Err(AppError::BadRequest("Category already exists".to_string()));
        }

        Ok(state.rate_cards.get_mut(&id).map(|existing| {
            existing.category = category;
            existing.price_per_post = card.price_per_post;
            existing.ads_types = card.ads_types;
            existing.updated_at = now;
            existing.clone()
        }))
    }

    async fn delete_rate_card(&self, id: i64) -> Result<bool, AppError> {
        Ok(self.lock()?.rate_cards.remove(&id).is_some())
    }

    async fn global_rate_card(&self) -> Result<Option<RateCard>, AppError> {
        Ok(self.lock()?.rate_cards.values().next().cloned())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get_snapshot(&self, user_id: i64) -> Result<Option<FinancialSnapshot>, AppError> {
        Ok(self.lock()?.snapshots.get(&user_id).cloned())
    }

    async fn save_snapshot(&self, snapshot: &FinancialSnapshot) -> Result<(), AppError> {
        self.lock()?.snapshots.insert(snapshot.user_id, snapshot.clone());
        Ok(())
    }

    async fn list_payment_requests(&self, user_id: i64) -> Result<Vec<PaymentRequest>, AppError> {
        Ok(self
            .lock()?
            .payments
            .iter()
            .filter(|request| request.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_all_payment_requests(&self) -> Result<Vec<PaymentRequestOverview>, AppError> {
        let state = self.lock()?;
        let overview: Vec<PaymentRequestOverview> = state
            .payments
            .iter()
            .map(|request| {
                let user = state.users.get(&request.user_id);
                PaymentRequestOverview {
                    request: request.clone(),
                    user_name: user.map(|user| user.name.clone()),
                    user_email: user.map(|user| user.email.clone()),
                    user_role: user.map(|user| user.role.to_string()),
                }
            })
            .collect();
        Ok(newest_first(overview, |row| row.request.requested_at))
    }

    async fn reserve_payment(
        &self,
        user_id: i64,
        request: NewPaymentRequest,
        now: DateTime<Utc>,
    ) -> Result<(FinancialSnapshot, PaymentRequest), AppError> {
        let mut state = self.lock()?;
        let mut snapshot = state
            .snapshots
            .get(&user_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Financial details not found".to_string()))?;

        let request = snapshot.reserve_payment(request, now)?;
        state.snapshots.insert(user_id, snapshot.clone());
        state.payments.push(request.clone());
        Ok((snapshot, request))
    }

    async fn settle_payment(
        &self,
        request_id: Uuid,
        settlement: PaymentSettlement,
        now: DateTime<Utc>,
    ) -> Result<(PaymentRequest, bool), AppError> {
        let mut state = self.lock()?;
        let index = state
            .payments
            .iter()
            .position(|request| request.id == request_id)
            .ok_or_else(|| AppError::NotFound("Payment request not found".to_string()))?;
        let mut request = state.payments[index].clone();
        let mut snapshot = state
            .snapshots
            .get(&request.user_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Financial details not found".to_string()))?;

        let changed = snapshot.settle_payment(&mut request, settlement, now)?;
        if changed {
            state.snapshots.insert(snapshot.user_id, snapshot);
            state.payments[index] = request.clone();
        }
        Ok((request, changed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        approval::Role,
        ledger::{PaymentStatus, compute_financial_stats},
        organized_post::DailyTopNewsUpdate,
    };

    fn new_post(slug: &str) -> NewPost {
        NewPost {
            author_id: 1,
            author_name: "Writer".into(),
            title: slug.into(),
            slug: slug.into(),
            summary: None,
            content: "body".into(),
            category: "news".into(),
            tags: Vec::new(),
            keywords: Vec::new(),
            meta_description: None,
            featured_image: None,
            attachments: Vec::new(),
            video: None,
        }
    }

    fn user(id: i64) -> User {
        User {
            id,
            name: format!("User {id}"),
            email: format!("user{id}@example.com"),
            phone: None,
            role: Role::Writer,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_slug_is_rejected() {
        let store = MemoryStore::new();
        store.insert_post(new_post("breaking"), Utc::now()).await.unwrap();

        let err = store.insert_post(new_post("breaking"), Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg == "Title already exists"));
    }

    #[tokio::test]
    async fn failed_edit_leaves_post_untouched() {
        let store = MemoryStore::new();
        let post = store.insert_post(new_post("a"), Utc::now()).await.unwrap();

        let result = store
            .modify_post(
                post.id,
                Box::new(|post| {
                    post.title = "changed".into();
                    Err(AppError::BadRequest("nope".into()))
                }),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(store.get_post(post.id).await.unwrap().unwrap().title, "a");
    }

    #[tokio::test]
    async fn upsert_keeps_one_aggregate_per_post() {
        let store = MemoryStore::new();
        let post = store.insert_post(new_post("a"), Utc::now()).await.unwrap();

        let first = store.upsert_organized(&post, Utc::now()).await.unwrap();
        store
            .set_daily_top_news(first.id, DailyTopNewsUpdate::default(), Utc::now())
            .await
            .unwrap();
        let second = store.upsert_organized(&post, Utc::now()).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.daily_top_news.len(), 1);
        assert_eq!(store.list_organized().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn main_entry_is_unique_across_aggregates() {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for slug in ["a", "b", "c"] {
            let post = store.insert_post(new_post(slug), Utc::now()).await.unwrap();
            ids.push(store.upsert_organized(&post, Utc::now()).await.unwrap().id);
        }

        let main = DailyTopNewsUpdate {
            main: Some(true),
            ..Default::default()
        };
        for id in &ids {
            store.set_daily_top_news(*id, main.clone(), Utc::now()).await.unwrap();
        }

        let with_main: Vec<i64> = store
            .list_organized()
            .await
            .unwrap()
            .into_iter()
            .filter(OrganizedPost::has_main)
            .map(|organized| organized.id)
            .collect();
        assert_eq!(with_main, vec![ids[2]]);
    }

    #[tokio::test]
    async fn deleting_post_drops_its_aggregate() {
        let store = MemoryStore::new();
        let post = store.insert_post(new_post("a"), Utc::now()).await.unwrap();
        let organized = store.upsert_organized(&post, Utc::now()).await.unwrap();

        assert!(store.delete_post(post.id).await.unwrap().is_some());
        assert!(store.get_organized(organized.id).await.unwrap().is_none());
        assert!(store.delete_post(post.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn accepting_twice_forks_once() {
        let store = MemoryStore::new();
        store.insert_user(user(5)).await.unwrap();
        let proposal = SponsorProposal {
            id: Uuid::new_v4(),
            owner_id: 5,
            sponsor_name: "Acme".into(),
            sponsor_email: None,
            sponsor_phone: None,
            ad_type: Some("Banner".into()),
            start_date: Utc::now(),
            end_date: None,
            total_amount: 500,
            status: SponsorStatus::Pending,
            created_at: Utc::now(),
        };
        store.insert_proposal(proposal.clone()).await.unwrap();

        let first = store
            .review_proposal(5, proposal.id, SponsorStatus::Accepted, 9, Utc::now())
            .await
            .unwrap();
        let second = store
            .review_proposal(5, proposal.id, SponsorStatus::Accepted, 9, Utc::now())
            .await
            .unwrap();

        assert!(first.forked.is_some());
        assert!(second.forked.is_none());
        assert_eq!(store.list_sponsors_managed_by(5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_proposal_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .review_proposal(1, Uuid::new_v4(), SponsorStatus::Rejected, 2, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn reserve_and_settle_move_balances() {
        let store = MemoryStore::new();
        let owner = user(3);
        store.insert_user(owner.clone()).await.unwrap();
        store
            .insert_rate_card(
                RateCardRequest {
                    category: None,
                    price_per_post: 100,
                    ads_types: Vec::new(),
                },
                Utc::now(),
            )
            .await
            .unwrap();
        let card = store.global_rate_card().await.unwrap();

        let mut approved = store.insert_post(new_post("a"), Utc::now()).await.unwrap();
        approved.workflow.status = crate::models::approval::ApprovalStatus::Approved;
        let stats = compute_financial_stats(&[approved], &[], card.as_ref()).unwrap();
        store
            .save_snapshot(&FinancialSnapshot::from_stats(&owner, stats, &[], Utc::now()))
            .await
            .unwrap();

        let request = NewPaymentRequest {
            name: "User 3".into(),
            phone: "0100".into(),
            bank: None,
            bank_account: None,
            bank_address: None,
            transaction_id: None,
            reference: None,
            requested_amount: 70,
        };
        let (snapshot, pending) = store.reserve_payment(3, request, Utc::now()).await.unwrap();
        assert_eq!(snapshot.earnings.current_balance, 30);

        let (paid, changed) = store
            .settle_payment(pending.id, PaymentSettlement::default(), Utc::now())
            .await
            .unwrap();
        assert!(changed);
        assert_eq!(paid.status, PaymentStatus::Successful);

        let snapshot = store.get_snapshot(3).await.unwrap().unwrap();
        assert_eq!(snapshot.earnings.received_balance, 70);

        let overview = store.list_all_payment_requests().await.unwrap();
        assert_eq!(overview[0].user_name.as_deref(), Some("User 3"));
    }

    #[tokio::test]
    async fn rate_card_category_is_unique() {
        let store = MemoryStore::new();
        let card = || RateCardRequest {
            category: Some("front".into()),
            price_per_post: 1,
            ads_types: Vec::new(),
        };
        store.insert_rate_card(card(), Utc::now()).await.unwrap();
        assert!(matches!(
            store.insert_rate_card(card(), Utc::now()).await,
            Err(AppError::BadRequest(_))
        ));
    }
}
