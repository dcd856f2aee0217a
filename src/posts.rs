//! Posts: creation rules, feed queries, and anonymous display masking.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{Database, NewPostRow, Post, PostFilter};
use crate::error::{invalid, not_found, GenieError, Result};
use crate::hashtags;
use crate::utils::{now_millis, snippet, time_ago, SNIPPET_CHARS};

pub const MAX_TITLE_CHARS: usize = 120;
pub const MAX_CONTENT_CHARS: usize = 10_000;
pub const ANONYMOUS_NAME: &str = "Anonymous";

#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub author_id: i64,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub is_anonymous: bool,
}

/// Create a post. Explicit hashtags come first; tags written inline in the
/// content are merged in after them.
pub fn create_post(db: &Database, input: NewPost) -> Result<Post> {
    let title = input.title.trim();
    let content = input.content.trim();
    if title.is_empty() {
        return Err(invalid("Title is required"));
    }
    if content.is_empty() {
        return Err(invalid("Content is required"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(invalid(format!("Title exceeds {} characters", MAX_TITLE_CHARS)));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(invalid(format!("Content exceeds {} characters", MAX_CONTENT_CHARS)));
    }

    db.get_profile(input.author_id)?
        .ok_or_else(|| not_found(format!("Profile {} not found", input.author_id)))?;

    let mut raw_tags = input.hashtags;
    raw_tags.extend(hashtags::extract(content));
    let tags = hashtags::normalize(&raw_tags);

    let id = db.insert_post(&NewPostRow {
        author_id: input.author_id,
        title: title.to_string(),
        content: content.to_string(),
        hashtags: tags,
        is_anonymous: input.is_anonymous,
        created_at: now_millis(),
    })?;

    info!(post_id = id, author_id = input.author_id, anonymous = input.is_anonymous, "Post created");

    fetch_post(db, id)
}

pub fn fetch_post(db: &Database, id: i64) -> Result<Post> {
    db.get_post(id)?
        .ok_or_else(|| not_found(format!("Post {} not found", id)))
}

/// Feed, newest first
pub fn fetch_posts(db: &Database, filter: &PostFilter) -> Result<Vec<Post>> {
    Ok(db.list_posts(filter)?)
}

pub fn fetch_user_posts(db: &Database, author_id: i64) -> Result<Vec<Post>> {
    Ok(db.list_posts_by_author(author_id)?)
}

/// Only the author may delete; comments and reactions go with the post.
pub fn delete_post(db: &Database, post_id: i64, requester_id: i64) -> Result<()> {
    let post = fetch_post(db, post_id)?;
    if post.author_id != requester_id {
        return Err(GenieError::Forbidden("Only the author can delete this post".to_string()));
    }
    db.delete_post(post_id)?;
    info!(post_id, "Post deleted");
    Ok(())
}

/// Name shown for the post's author
pub fn display_name(post: &Post) -> &str {
    if post.is_anonymous {
        return ANONYMOUS_NAME;
    }
    post.author.as_ref().map(|a| a.nickname.as_str()).unwrap_or(ANONYMOUS_NAME)
}

/// Avatar shown for the post's author; hidden for anonymous posts
pub fn display_avatar(post: &Post) -> Option<&str> {
    if post.is_anonymous {
        return None;
    }
    post.author.as_ref().map(|a| a.avatar_emoji.as_str())
}

/// Feed card with the author masked as the post requests.
///
/// `author_id` is deliberately absent so anonymous posts stay anonymous.
#[derive(Debug, Clone, Serialize)]
pub struct PostCard {
    pub id: i64,
    pub name: String,
    pub avatar_emoji: Option<String>,
    pub time_ago: String,
    pub title: String,
    pub snippet: String,
    pub content: String,
    pub hashtags: Vec<String>,
    pub likes: i64,
    pub helpful: i64,
    pub comment_count: i64,
    pub is_anonymous: bool,
    pub created_at: i64,
}

impl PostCard {
    pub fn from_post(post: &Post, now_ms: i64) -> Self {
        Self {
            id: post.id,
            name: display_name(post).to_string(),
            avatar_emoji: display_avatar(post).map(str::to_string),
            time_ago: time_ago(post.created_at, now_ms),
            title: post.title.clone(),
            snippet: snippet(&post.content, SNIPPET_CHARS),
            content: post.content.clone(),
            hashtags: post.hashtags.clone(),
            likes: post.likes_count,
            helpful: post.helpful_count,
            comment_count: post.comment_count,
            is_anonymous: post.is_anonymous,
            created_at: post.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_post(author_id: i64, title: &str) -> NewPost {
        NewPost {
            author_id,
            title: title.to_string(),
            content: "Let's talk about #PayGap transparency".to_string(),
            hashtags: vec!["#Workplace".into(), "paygap".into()],
            is_anonymous: false,
        }
    }

    #[test]
    fn test_create_post_merges_hashtags() {
        let db = Database::in_memory().unwrap();
        let ada = db.insert_profile("ada", "🦊", 0).unwrap();
        let post = create_post(&db, new_post(ada.id, "  Salary talk  ")).unwrap();

        assert_eq!(post.title, "Salary talk");
        assert_eq!(post.hashtags, vec!["Workplace", "paygap"]);
        assert_eq!(post.likes_count, 0);
        assert_eq!(post.comment_count, 0);
    }

    #[test]
    fn test_create_post_validation() {
        let db = Database::in_memory().unwrap();
        let ada = db.insert_profile("ada", "🦊", 0).unwrap();

        assert!(matches!(create_post(&db, new_post(ada.id, " ")), Err(GenieError::InvalidInput(_))));
        let mut empty_body = new_post(ada.id, "t");
        empty_body.content = "\n".into();
        assert!(matches!(create_post(&db, empty_body), Err(GenieError::InvalidInput(_))));
        assert!(matches!(create_post(&db, new_post(77, "t")), Err(GenieError::NotFound(_))));
    }

    #[test]
    fn test_delete_post_requires_author() {
        let db = Database::in_memory().unwrap();
        let ada = db.insert_profile("ada", "🦊", 0).unwrap();
        let bo = db.insert_profile("bo", "🐻", 0).unwrap();
        let post = create_post(&db, new_post(ada.id, "Mine")).unwrap();

        assert!(matches!(delete_post(&db, post.id, bo.id), Err(GenieError::Forbidden(_))));
        delete_post(&db, post.id, ada.id).unwrap();
        assert!(matches!(fetch_post(&db, post.id), Err(GenieError::NotFound(_))));
    }

    #[test]
    fn test_anonymous_masking() {
        let db = Database::in_memory().unwrap();
        let ada = db.insert_profile("ada", "🦊", 0).unwrap();
        let mut input = new_post(ada.id, "Quiet question");
        input.is_anonymous = true;
        let anon = create_post(&db, input).unwrap();
        let named = create_post(&db, new_post(ada.id, "Loud question")).unwrap();

        assert_eq!(display_name(&anon), ANONYMOUS_NAME);
        assert_eq!(display_avatar(&anon), None);
        assert_eq!(display_name(&named), "ada");
        assert_eq!(display_avatar(&named), Some("🦊"));

        let card = PostCard::from_post(&anon, anon.created_at);
        assert_eq!(card.name, ANONYMOUS_NAME);
        assert_eq!(card.time_ago, "just now");
        let json = serde_json::to_value(&card).unwrap();
        assert!(json.get("author_id").is_none());
    }

    #[test]
    fn test_fetch_user_posts() {
        let db = Database::in_memory().unwrap();
        let ada = db.insert_profile("ada", "🦊", 0).unwrap();
        let bo = db.insert_profile("bo", "🐻", 0).unwrap();
        create_post(&db, new_post(ada.id, "a")).unwrap();
        create_post(&db, new_post(bo.id, "b")).unwrap();

        let mine = fetch_user_posts(&db, ada.id).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].title, "a");
        assert_eq!(fetch_posts(&db, &PostFilter::default()).unwrap().len(), 2);
    }
}
