//! In-memory posts resource

use burrow_core::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

/// A blog post
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: u64,
    pub title: String,
    pub content: String,
    pub author: String,
    /// Unix seconds
    pub created_at: u64,
}

/// Fields accepted on create and update
#[derive(Debug, Default, Deserialize)]
struct PostInput {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

/// Shared post storage
pub type PostStore = Arc<RwLock<Vec<Post>>>;

/// Store pre-filled with three posts
pub fn seed() -> PostStore {
    let posts = [
        (1, "Hello World", "This is my first blog post!", 1_704_067_200),
        (2, "TypeScript Tips", "Some useful TypeScript tips...", 1_704_153_600),
        (3, "Web Development", "Modern web development practices...", 1_704_240_000),
    ]
    .into_iter()
    .map(|(id, title, content, created_at)| Post {
        id,
        title: title.to_string(),
        content: content.to_string(),
        author: "Admin".to_string(),
        created_at,
    })
    .collect();
    Arc::new(RwLock::new(posts))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Positive integer query value, or `default`
fn positive(ctx: &Context, key: &str, default: usize) -> usize {
    ctx.query(key)
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

/// Post id from the path, answering 400 when it is not a number
fn post_id(ctx: &Context) -> Result<Option<u64>> {
    match ctx.param("id").and_then(|id| id.parse().ok()) {
        Some(id) => Ok(Some(id)),
        None => {
            ctx.json_with_status(400, &json!({ "error": "Invalid post ID" }))?;
            Ok(None)
        }
    }
}

/// Title and content from the body, answering 400 when either is empty
fn post_input(ctx: &Context) -> Result<Option<PostInput>> {
    let input: PostInput = ctx.body_as().unwrap_or_default();
    if input.title.is_empty() || input.content.is_empty() {
        ctx.json_with_status(400, &json!({ "error": "Title and content are required" }))?;
        return Ok(None);
    }
    Ok(Some(input))
}

fn not_found(ctx: &Context) -> Result<()> {
    ctx.json_with_status(404, &json!({ "error": "Post not found" }))
}

/// `GET /api/posts?page=&limit=`
pub async fn list(ctx: Context, store: PostStore) -> Result<()> {
    let page = positive(&ctx, "page", 1);
    let limit = positive(&ctx, "limit", 10);
    let offset = (page - 1).saturating_mul(limit);

    let posts = store.read().await;
    let total = posts.len();
    let slice: Vec<&Post> = posts.iter().skip(offset).take(limit).collect();

    ctx.json(&json!({
        "posts": slice,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total,
            "pages": total.div_ceil(limit),
        }
    }))
}

/// `GET /api/posts/:id`
pub async fn show(ctx: Context, store: PostStore) -> Result<()> {
    let Some(id) = post_id(&ctx)? else {
        return Ok(());
    };
    let posts = store.read().await;
    match posts.iter().find(|p| p.id == id) {
        Some(post) => ctx.json(post),
        None => not_found(&ctx),
    }
}

/// `POST /api/posts`
pub async fn create(ctx: Context, store: PostStore) -> Result<()> {
    let Some(input) = post_input(&ctx)? else {
        return Ok(());
    };

    let mut posts = store.write().await;
    let post = Post {
        id: posts.iter().map(|p| p.id).max().unwrap_or(0) + 1,
        title: input.title,
        content: input.content,
        author: "Admin".to_string(),
        created_at: now_secs(),
    };
    posts.push(post.clone());
    ctx.json_with_status(201, &post)
}

/// `PUT /api/posts/:id`
pub async fn update(ctx: Context, store: PostStore) -> Result<()> {
    let Some(id) = post_id(&ctx)? else {
        return Ok(());
    };
    let Some(input) = post_input(&ctx)? else {
        return Ok(());
    };

    let mut posts = store.write().await;
    let Some(post) = posts.iter_mut().find(|p| p.id == id) else {
        return not_found(&ctx);
    };
    post.title = input.title;
    post.content = input.content;
    ctx.json(post)
}

/// `DELETE /api/posts/:id`
pub async fn remove(ctx: Context, store: PostStore) -> Result<()> {
    let Some(id) = post_id(&ctx)? else {
        return Ok(());
    };

    let mut posts = store.write().await;
    let Some(index) = posts.iter().position(|p| p.id == id) else {
        return not_found(&ctx);
    };
    posts.remove(index);
    ctx.set_status(204).text("");
    Ok(())
}
