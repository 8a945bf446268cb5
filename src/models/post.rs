use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::approval::Workflow;

/// Represents the 'posts' table in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub author_name: String,

    pub title: String,
    /// Unique, derived from the title at creation time.
    pub slug: String,
    pub summary: Option<String>,
    pub content: String,

    pub category: String,
    pub tags: Vec<String>,
    pub keywords: Vec<String>,
    pub meta_description: Option<String>,

    /// Stored file paths handed back by the file store.
    pub featured_image: Option<String>,
    pub attachments: Vec<String>,
    pub video: Option<String>,

    #[serde(flatten)]
    pub workflow: Workflow,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Every media path this post references.
    pub fn media_paths(&self) -> Vec<String> {
        self.featured_image
            .iter()
            .chain(self.attachments.iter())
            .cloned()
            .collect()
    }
}

/// Insert payload. Posts always start pending with empty approvals.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: i64,
    pub author_name: String,
    pub title: String,
    pub slug: String,
    pub summary: Option<String>,
    pub content: String,
    pub category: String,
    pub tags: Vec<String>,
    pub keywords: Vec<String>,
    pub meta_description: Option<String>,
    pub featured_image: Option<String>,
    pub attachments: Vec<String>,
    pub video: Option<String>,
}

/// Text part of the multipart post form.
#[derive(Debug, Default, Validate)]
pub struct PostFields {
    #[validate(length(
        min = 1,
        max = 300,
        message = "Title length must be between 1 and 300 chars"
    ))]
    pub title: Option<String>,

    #[validate(length(max = 1000))]
    pub summary: Option<String>,

    #[validate(length(
        min = 1,
        max = 100000,
        message = "Content length must be between 1 and 100000 chars"
    ))]
    pub content: Option<String>,

    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,

    /// `None` when the form did not carry the field.
    pub tags: Option<Vec<String>>,
    pub keywords: Option<Vec<String>>,

    #[validate(length(max = 500))]
    pub meta_description: Option<String>,

    #[validate(length(max = 500))]
    pub video: Option<String>,
}

/// DTO for a reviewer's decision on a post.
#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    #[validate(length(min = 1, max = 20))]
    pub status: String,

    #[validate(length(max = 2000))]
    #[serde(alias = "notes")]
    pub comment: Option<String>,
}
