use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use slug::slugify;
use validator::Validate;

use crate::{
    config::MAX_ATTACHMENTS,
    error::AppError,
    handlers::ApiResponse,
    models::{
        approval::{ApprovalStatus, Role},
        post::{NewPost, Post, PostFields, ReviewRequest},
    },
    state::AppState,
    store::Store,
    utils::{
        files::{FileStore, delete_all},
        html::{clean_html, clean_optional},
        jwt::CurrentUser,
    },
};

struct Upload {
    file_name: String,
    bytes: Bytes,
}

/// Parsed multipart post form.
#[derive(Default)]
struct PostForm {
    fields: PostFields,
    featured_image: Option<Upload>,
    /// `None` when no attachment part was sent.
    attachments: Option<Vec<Upload>>,
}

/// Accepts a JSON array or a comma-separated list.
fn parse_list(raw: &str) -> Vec<String> {
    let items = serde_json::from_str::<Vec<String>>(raw)
        .unwrap_or_else(|_| raw.split(',').map(str::to_string).collect());

    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::BadRequest(err.body_text())
}

async fn read_post_form(mut multipart: Multipart) -> Result<PostForm, AppError> {
    let mut form = PostForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "featuredImage" | "featured_image" => {
                let file_name = field.file_name().unwrap_or("featured").to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if !bytes.is_empty() {
                    form.featured_image = Some(Upload { file_name, bytes });
                }
            }
            "attachments" => {
                let file_name = field.file_name().unwrap_or("attachment").to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                let attachments = form.attachments.get_or_insert_with(Vec::new);
                if bytes.is_empty() {
                    continue;
                }
                if attachments.len() >= MAX_ATTACHMENTS {
                    return Err(AppError::BadRequest(format!(
                        "At most {} attachments are allowed",
                        MAX_ATTACHMENTS
                    )));
                }
                attachments.push(Upload { file_name, bytes });
            }
            _ => {
                let text = field.text().await.map_err(multipart_error)?;
                match name.as_str() {
                    "title" => form.fields.title = Some(text.trim().to_string()),
                    "summary" => form.fields.summary = Some(text),
                    "content" => form.fields.content = Some(text),
                    "category" => form.fields.category = Some(text.trim().to_string()),
                    "tags" => form.fields.tags = Some(parse_list(&text)),
                    "keywords" => form.fields.keywords = Some(parse_list(&text)),
                    "metaDescription" | "meta_description" => {
                        form.fields.meta_description = Some(text)
                    }
                    "video" => form.fields.video = Some(text.trim().to_string()),
                    other => tracing::debug!("Ignoring unknown form field '{}'", other),
                }
            }
        }
    }

    form.fields.validate()?;
    Ok(form)
}

/// Uploads the form's files. On failure, whatever was already stored is removed.
async fn store_uploads(
    files: &dyn FileStore,
    featured: Option<Upload>,
    attachments: Option<Vec<Upload>>,
) -> Result<(Option<String>, Option<Vec<String>>), AppError> {
    let mut stored = Vec::new();

    let featured = match featured {
        Some(upload) => match files.store(&upload.file_name, &upload.bytes).await {
            Ok(path) => {
                stored.push(path.clone());
                Some(path)
            }
            Err(err) => return Err(err),
        },
        None => None,
    };

    let attachments = match attachments {
        Some(uploads) => {
            let mut paths = Vec::with_capacity(uploads.len());
            for upload in uploads {
                match files.store(&upload.file_name, &upload.bytes).await {
                    Ok(path) => {
                        stored.push(path.clone());
                        paths.push(path);
                    }
                    Err(err) => {
                        delete_all(files, &stored).await;
                        return Err(err);
                    }
                }
            }
            Some(paths)
        }
        None => None,
    };

    Ok((featured, attachments))
}

/// Authors may edit their own posts; editors and admins may edit any.
fn ensure_can_edit(user: &CurrentUser, post: &Post) -> Result<(), AppError> {
    if post.author_id == user.id || user.role.is_editorial() {
        Ok(())
    } else {
        Err(AppError::unauthorized_role())
    }
}

/// Create a new post (multipart).
/// Starts pending and unpublished with empty approval histories.
pub async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    if user.role == Role::Reader {
        return Err(AppError::unauthorized_role());
    }

    let form = read_post_form(multipart).await?;
    let PostFields {
        title,
        summary,
        content,
        category,
        tags,
        keywords,
        meta_description,
        video,
    } = form.fields;

    let (Some(title), Some(content), Some(category)) = (title, content, category) else {
        return Err(AppError::BadRequest(
            "Title, content and category are required".to_string(),
        ));
    };

    let slug = slugify(&title);
    if slug.is_empty() {
        return Err(AppError::BadRequest(
            "Title must contain letters or digits".to_string(),
        ));
    }

    let author_name = state
        .store
        .get_user(user.id)
        .await?
        .map(|profile| profile.name)
        .unwrap_or_else(|| format!("user-{}", user.id));

    let (featured_image, attachments) =
        store_uploads(state.files.as_ref(), form.featured_image, form.attachments).await?;

    let new_post = NewPost {
        author_id: user.id,
        author_name,
        title,
        slug,
        summary: clean_optional(summary),
        content: clean_html(&content),
        category,
        tags: tags.unwrap_or_default(),
        keywords: keywords.unwrap_or_default(),
        meta_description,
        featured_image: featured_image.clone(),
        attachments: attachments.clone().unwrap_or_default(),
        video: video.filter(|video| !video.is_empty()),
    };

    let post = match state.store.insert_post(new_post, Utc::now()).await {
        Ok(post) => post,
        Err(err) => {
            let orphaned: Vec<String> = featured_image
                .into_iter()
                .chain(attachments.unwrap_or_default())
                .collect();
            delete_all(state.files.as_ref(), &orphaned).await;
            return Err(err);
        }
    };

    tracing::info!("Post {} '{}' created by user {}", post.id, post.slug, user.id);
    Ok(ApiResponse::created(post))
}

/// List all posts, newest first.
pub async fn list_posts(State(store): State<Arc<dyn Store>>) -> Result<impl IntoResponse, AppError> {
    let posts = store.list_posts().await?;
    Ok(ApiResponse::data(posts))
}

/// List one author's posts, newest first.
pub async fn list_posts_by_user(
    State(store): State<Arc<dyn Store>>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let posts = store.list_posts_by_author(user_id).await?;
    Ok(ApiResponse::data(posts))
}

pub async fn get_post(
    State(store): State<Arc<dyn Store>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let post = store
        .get_post(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;
    Ok(ApiResponse::data(post))
}

/// Update a post (multipart).
///
/// The slug and the review state are left as they are. Replacing the
/// featured image or the attachments deletes the files they replace.
pub async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let existing = state
        .store
        .get_post(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;
    ensure_can_edit(&user, &existing)?;

    let form = read_post_form(multipart).await?;
    let fields = form.fields;
    let (featured_image, attachments) =
        store_uploads(state.files.as_ref(), form.featured_image, form.attachments).await?;
    let uploaded: Vec<String> = featured_image
        .iter()
        .chain(attachments.iter().flatten())
        .cloned()
        .collect();

    let mut replaced = Vec::new();
    let result = state
        .store
        .modify_post(
            id,
            Box::new(|post| {
                if let Some(title) = fields.title {
                    post.title = title;
                }
                if let Some(summary) = fields.summary {
                    post.summary = clean_optional(Some(summary));
                }
                if let Some(content) = fields.content {
                    post.content = clean_html(&content);
                }
                if let Some(category) = fields.category {
                    post.category = category;
                }
                if let Some(tags) = fields.tags {
                    post.tags = tags;
                }
                if let Some(keywords) = fields.keywords {
                    post.keywords = keywords;
                }
                if let Some(meta_description) = fields.meta_description {
                    post.meta_description = Some(meta_description);
                }
                if let Some(video) = fields.video {
                    post.video = Some(video).filter(|video| !video.is_empty());
                }
                if let Some(path) = featured_image {
                    replaced.extend(post.featured_image.replace(path));
                }
                if let Some(paths) = attachments {
                    replaced.extend(std::mem::replace(&mut post.attachments, paths));
                }
                Ok(())
            }),
        )
        .await;

    let post = match result {
        Ok(post) => post,
        Err(err) => {
            delete_all(state.files.as_ref(), &uploaded).await;
            return Err(err);
        }
    };

    delete_all(state.files.as_ref(), &replaced).await;
    tracing::info!("Post {} updated by user {}", post.id, user.id);
    Ok(ApiResponse::data(post))
}

/// Delete a post, its media and its workflow aggregate.
pub async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let existing = state
        .store
        .get_post(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;
    ensure_can_edit(&user, &existing)?;

    let removed = state
        .store
        .delete_post(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;
    delete_all(state.files.as_ref(), &removed.media_paths()).await;

    tracing::info!("Post {} deleted by user {}", id, user.id);
    Ok(ApiResponse::message("Post deleted successfully"))
}

/// Record a reviewer's decision on a post in the tier matching their role.
pub async fn review_post(
    State(store): State<Arc<dyn Store>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    axum::Json(payload): axum::Json<ReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let decision: ApprovalStatus = payload.status.parse()?;

    let mut newly_published = false;
    let post = store
        .modify_post(
            id,
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
    Ok(ApiResponse::with_message(
        format!("Post {} by {}", decision.as_str(), user.role),
        post,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_accept_json_or_commas() {
        assert_eq!(parse_list(r#"["a", " b "]"#), vec!["a", "b"]);
        assert_eq!(parse_list("politics, world,,"), vec!["politics", "world"]);
        assert!(parse_list("").is_empty());
    }
}
