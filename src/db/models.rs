use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Helpful,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionKind::Like => "like",
            ReactionKind::Helpful => "helpful",
        }
    }

    /// Row table holding one entry per (post, profile) pair
    pub(crate) fn table(&self) -> &'static str {
        match self {
            ReactionKind::Like => "post_likes",
            ReactionKind::Helpful => "post_helpfuls",
        }
    }

    /// Denormalised counter column on `posts`
    pub(crate) fn counter_column(&self) -> &'static str {
        match self {
            ReactionKind::Like => "likes_count",
            ReactionKind::Helpful => "helpful_count",
        }
    }
}

// All timestamps are Unix epoch milliseconds (UTC).

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: i64,
    pub nickname: String,
    pub avatar_emoji: String,
    pub created_at: i64,
}

/// Author columns joined onto posts and comments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorSummary {
    pub nickname: String,
    pub avatar_emoji: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub hashtags: Vec<String>,
    pub is_anonymous: bool,
    pub likes_count: i64,
    pub helpful_count: i64,
    pub comment_count: i64,
    pub created_at: i64,
    pub author: Option<AuthorSummary>,  // None when the profile row is gone
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentRow {
    pub id: i64,
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub author_id: i64,
    pub content: String,
    pub depth: i32,  // 0 = top-level comment on the post
    pub likes_count: i64,
    pub created_at: i64,
    pub author: Option<AuthorSummary>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserStats {
    pub posts: i64,
    pub likes: i64,     // likes received across the user's posts
    pub comments: i64,  // comments written by the user
    pub helpful: i64,   // helpful marks received across the user's posts
}

/// Outcome of a toggle: whether the caller's mark is now set, and the recounted total
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionState {
    pub active: bool,
    pub count: i64,
}

/// Feed query options; every field narrows the result
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostFilter {
    pub hashtag: Option<String>,
    pub query: Option<String>,
    pub author_id: Option<i64>,
    pub limit: Option<u32>,
}
