use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    models::{approval::Workflow, post::Post},
};

/// Workflow-tracking shadow of a post. One per post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizedPost {
    pub id: i64,
    pub post_id: i64,

    /// Snapshot of the post's review state, then reviewed independently.
    #[serde(flatten)]
    pub workflow: Workflow,

    pub sponsored: bool,
    pub sponsor_id: Option<i64>,

    /// Category name -> ranked entries.
    pub category_top_news: BTreeMap<String, Vec<CategoryTopNewsEntry>>,
    pub daily_top_news: Vec<DailyTopNewsEntry>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTopNewsEntry {
    pub post_id: i64,
    /// 1..=8
    pub rank: u8,
    #[serde(default)]
    pub is_main: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTopNewsEntry {
    pub id: Uuid,
    pub post_id: i64,
    pub date: DateTime<Utc>,
    /// 0..=12. Several entries may share a rank.
    pub rank: u8,
    #[serde(default)]
    pub main: bool,
    #[serde(default)]
    pub is_popular: bool,
}

/// DTO for the daily top news upsert. Without `entry_id` a new entry is appended.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct DailyTopNewsUpdate {
    pub entry_id: Option<Uuid>,
    #[validate(range(max = 12, message = "Daily rank must be between 0 and 12"))]
    pub rank: Option<u8>,
    pub main: Option<bool>,
    #[serde(alias = "ispopular")]
    pub is_popular: Option<bool>,
}

impl DailyTopNewsUpdate {
    pub fn sets_main(&self) -> bool {
        self.main == Some(true)
    }
}

/// DTO for placing the post in a category's ranking.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CategoryTopNewsUpdate {
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    #[validate(range(min = 1, max = 8, message = "Category rank must be between 1 and 8"))]
    pub rank: u8,
    #[serde(default)]
    pub is_main: bool,
}

/// DTO for `createWorkflowPost`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateWorkflowRequest {
    pub post_id: i64,
    #[validate(length(min = 1, max = 20))]
    pub status: String,
    #[validate(length(max = 2000))]
    #[serde(alias = "notes")]
    pub comment: Option<String>,
}

/// DTO for `updateWorkflowPost`. Every field is optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateWorkflowRequest {
    #[validate(length(min = 1, max = 20))]
    pub status: Option<String>,
    #[validate(length(max = 2000))]
    #[serde(alias = "notes")]
    pub comment: Option<String>,
    pub is_published: Option<bool>,
}

impl OrganizedPost {
    /// A fresh aggregate mirroring the post's current review state.
    pub fn shadow_of(post: &Post, id: i64, now: DateTime<Utc>) -> Self {
        Self {
            id,
            post_id: post.id,
            workflow: post.workflow.clone(),
            sponsored: false,
            sponsor_id: None,
            category_top_news: BTreeMap::new(),
            daily_top_news: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_main(&self) -> bool {
        self.daily_top_news.iter().any(|entry| entry.main)
    }

    /// Applies a daily top news change and returns the affected entry.
    ///
    /// Setting `main` here also clears it on this aggregate's other entries;
    /// clearing it on other aggregates is the store's job.
    pub fn apply_daily_top_news(
        &mut self,
        update: &DailyTopNewsUpdate,
        now: DateTime<Utc>,
    ) -> Result<DailyTopNewsEntry, AppError> {
        let index = match update.entry_id {
            Some(entry_id) => {
                let index = self
                    .daily_top_news
                    .iter()
                    .position(|entry| entry.id == entry_id)
                    .ok_or_else(|| AppError::NotFound("Daily news entry not found".to_string()))?;
                let entry = &mut self.daily_top_news[index];
                if let Some(rank) = update.rank {
                    entry.rank = rank;
                }
                if let Some(main) = update.main {
                    entry.main = main;
                }
                if let Some(is_popular) = update.is_popular {
                    entry.is_popular = is_popular;
                }
                index
            }
            None => {
                self.daily_top_news.push(DailyTopNewsEntry {
                    id: Uuid::new_v4(),
                    post_id: self.post_id,
                    date: now,
                    rank: update.rank.unwrap_or(0),
                    main: update.main.unwrap_or(false),
                    is_popular: update.is_popular.unwrap_or(false),
                });
                self.daily_top_news.len() - 1
            }
        };

        if update.sets_main() {
            for (position, entry) in self.daily_top_news.iter_mut().enumerate() {
                if position != index {
                    entry.main = false;
                }
            }
        }

        self.updated_at = now;
        Ok(self.daily_top_news[index].clone())
    }

    /// Drops the `main` flag from every daily entry. Returns whether anything changed.
    pub fn clear_main(&mut self, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        for entry in self.daily_top_news.iter_mut().filter(|entry| entry.main) {
            entry.main = false;
            changed = true;
        }
        if changed {
            self.updated_at = now;
        }
        changed
    }

    /// Places this post in a category ranking, replacing its previous placement there.
    pub fn set_category_top_news(&mut self, update: &CategoryTopNewsUpdate, now: DateTime<Utc>) {
        let post_id = self.post_id;
        let entries = self
            .category_top_news
            .entry(update.category.trim().to_string())
            .or_default();

        if update.is_main {
            for entry in entries.iter_mut() {
                entry.is_main = false;
            }
        }

        match entries.iter_mut().find(|entry| entry.post_id == post_id) {
            Some(entry) => {
                entry.rank = update.rank;
                entry.is_main = update.is_main;
            }
            None => entries.push(CategoryTopNewsEntry {
                post_id,
                rank: update.rank,
                is_main: update.is_main,
            }),
        }
        self.updated_at = now;
    }
}
