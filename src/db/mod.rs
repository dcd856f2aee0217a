mod schema;
mod models;

pub use schema::{Database, NewCommentRow, NewPostRow};
pub use models::{Profile, AuthorSummary, Post, CommentRow, UserStats, ReactionKind, ReactionState, PostFilter};
