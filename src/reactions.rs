//! Like / helpful toggles.
//!
//! The store flips the row and recounts inside one transaction; this layer
//! checks that both sides of the toggle exist first so callers get a
//! NotFound rather than a constraint failure.

use serde::Serialize;
use tracing::debug;

use crate::db::{Database, ReactionKind, ReactionState};
use crate::error::{not_found, GenieError, Result};
use crate::utils::now_millis;

/// Whether a given profile has liked / marked helpful a post
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ViewerState {
    pub liked: bool,
    pub helpful: bool,
}

pub fn toggle(db: &Database, kind: ReactionKind, post_id: i64, profile_id: i64) -> Result<ReactionState> {
    db.get_post(post_id)?
        .ok_or_else(|| not_found(format!("Post {} not found", post_id)))?;
    db.get_profile(profile_id)?
        .ok_or_else(|| not_found(format!("Profile {} not found", profile_id)))?;

    let state = db.toggle_reaction(kind, post_id, profile_id, now_millis())
        .map_err(|e| target_gone(e, "Post", post_id))?;
    debug!(post_id, profile_id, kind = kind.as_str(), active = state.active, count = state.count, "Reaction toggled");
    Ok(state)
}

pub fn toggle_like(db: &Database, post_id: i64, profile_id: i64) -> Result<ReactionState> {
    toggle(db, ReactionKind::Like, post_id, profile_id)
}

pub fn toggle_helpful(db: &Database, post_id: i64, profile_id: i64) -> Result<ReactionState> {
    toggle(db, ReactionKind::Helpful, post_id, profile_id)
}

pub fn toggle_comment_like(db: &Database, comment_id: i64, profile_id: i64) -> Result<ReactionState> {
    db.get_comment(comment_id)?
        .ok_or_else(|| not_found(format!("Comment {} not found", comment_id)))?;
    db.get_profile(profile_id)?
        .ok_or_else(|| not_found(format!("Profile {} not found", profile_id)))?;

    db.toggle_comment_like(comment_id, profile_id, now_millis())
        .map_err(|e| target_gone(e, "Comment", comment_id))
}

/// A target deleted after the existence check shows up as a foreign key
/// failure on insert; report it as NotFound like the check would have.
fn target_gone(err: rusqlite::Error, what: &str, id: i64) -> GenieError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
            not_found(format!("{} {} not found", what, id))
        }
        _ => GenieError::from(err),
    }
}

pub fn viewer_state(db: &Database, post_id: i64, profile_id: i64) -> Result<ViewerState> {
    Ok(ViewerState {
        liked: db.has_reacted(ReactionKind::Like, post_id, profile_id)?,
        helpful: db.has_reacted(ReactionKind::Helpful, post_id, profile_id)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewCommentRow, NewPostRow};

    fn setup() -> (Database, i64, i64, i64) {
        let db = Database::in_memory().unwrap();
        let ada = db.insert_profile("ada", "🦊", 0).unwrap();
        let bo = db.insert_profile("bo", "🐻", 0).unwrap();
        let post = db.insert_post(&NewPostRow {
            author_id: ada.id,
            title: "t".into(),
            content: "c".into(),
            hashtags: vec![],
            is_anonymous: false,
            created_at: 0,
        }).unwrap();
        (db, ada.id, bo.id, post)
    }

    #[test]
    fn test_like_and_helpful_are_independent() {
        let (db, ada, bo, post) = setup();

        assert_eq!(toggle_like(&db, post, bo).unwrap(), ReactionState { active: true, count: 1 });
        assert_eq!(toggle_helpful(&db, post, bo).unwrap(), ReactionState { active: true, count: 1 });
        assert_eq!(toggle_helpful(&db, post, ada).unwrap(), ReactionState { active: true, count: 2 });
        assert_eq!(toggle_like(&db, post, bo).unwrap(), ReactionState { active: false, count: 0 });

        assert_eq!(viewer_state(&db, post, bo).unwrap(), ViewerState { liked: false, helpful: true });
        let stored = db.get_post(post).unwrap().unwrap();
        assert_eq!((stored.likes_count, stored.helpful_count), (0, 2));
    }

    #[test]
    fn test_counter_matches_rows_after_many_toggles() {
        let (db, ada, bo, post) = setup();
        for i in 0..7 {
            let who = if i % 2 == 0 { ada } else { bo };
            toggle_like(&db, post, who).unwrap();
        }
        // ada toggled 4 times (off), bo 3 times (on)
        let stored = db.get_post(post).unwrap().unwrap();
        assert_eq!(stored.likes_count, 1);
        assert_eq!(viewer_state(&db, post, bo).unwrap().liked, true);
    }

    #[test]
    fn test_toggle_unknown_targets() {
        let (db, ada, _, post) = setup();
        assert!(matches!(toggle_like(&db, 999, ada), Err(GenieError::NotFound(_))));
        assert!(matches!(toggle_helpful(&db, post, 999), Err(GenieError::NotFound(_))));
        assert!(matches!(toggle_comment_like(&db, 999, ada), Err(GenieError::NotFound(_))));
    }

    #[test]
    fn test_comment_like() {
        let (db, ada, bo, post) = setup();
        let comment = db.insert_comment(&NewCommentRow {
            post_id: post, parent_id: None, author_id: ada,
            content: "hi".into(), depth: 0, created_at: 1,
        }).unwrap();

        assert_eq!(toggle_comment_like(&db, comment, bo).unwrap().count, 1);
        assert_eq!(toggle_comment_like(&db, comment, ada).unwrap().count, 2);
        assert_eq!(db.get_comment(comment).unwrap().unwrap().likes_count, 2);
        assert_eq!(toggle_comment_like(&db, comment, bo).unwrap(), ReactionState { active: false, count: 1 });
    }

    #[test]
    fn test_vanished_target_maps_to_not_found() {
        let (db, ada, _, _) = setup();
        // Skip the existence check, as if the post was deleted in between
        let err = db.toggle_reaction(ReactionKind::Like, 999, ada, 1).unwrap_err();
        assert!(matches!(target_gone(err, "Post", 999), GenieError::NotFound(msg) if msg == "Post 999 not found"));

        let err = db.toggle_comment_like(999, ada, 1).unwrap_err();
        assert!(matches!(target_gone(err, "Comment", 999), GenieError::NotFound(_)));

        let other = rusqlite::Error::QueryReturnedNoRows;
        assert!(matches!(target_gone(other, "Post", 1), GenieError::Database(_)));
    }
}
