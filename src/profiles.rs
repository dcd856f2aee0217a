//! Lightweight profiles: a nickname and an avatar emoji, nothing more.

use tracing::info;

use crate::db::{Database, Profile, UserStats};
use crate::error::{invalid, not_found, Result};
use crate::utils::now_millis;

pub const MAX_NICKNAME_CHARS: usize = 40;

fn validate(nickname: &str, avatar_emoji: &str) -> Result<(String, String)> {
    let nickname = nickname.trim();
    if nickname.is_empty() {
        return Err(invalid("Nickname is required"));
    }
    if nickname.chars().count() > MAX_NICKNAME_CHARS {
        return Err(invalid(format!("Nickname exceeds {} characters", MAX_NICKNAME_CHARS)));
    }
    let avatar_emoji = avatar_emoji.trim();
    if avatar_emoji.is_empty() {
        return Err(invalid("Avatar is required"));
    }
    Ok((nickname.to_string(), avatar_emoji.to_string()))
}

pub fn create_profile(db: &Database, nickname: &str, avatar_emoji: &str) -> Result<Profile> {
    let (nickname, avatar_emoji) = validate(nickname, avatar_emoji)?;
    let profile = db.insert_profile(&nickname, &avatar_emoji, now_millis())?;
    info!(profile_id = profile.id, nickname = %profile.nickname, "Profile created");
    Ok(profile)
}

pub fn get_profile(db: &Database, id: i64) -> Result<Profile> {
    db.get_profile(id)?
        .ok_or_else(|| not_found(format!("Profile {} not found", id)))
}

pub fn update_profile(db: &Database, id: i64, nickname: &str, avatar_emoji: &str) -> Result<Profile> {
    let (nickname, avatar_emoji) = validate(nickname, avatar_emoji)?;
    if !db.update_profile(id, &nickname, &avatar_emoji)? {
        return Err(not_found(format!("Profile {} not found", id)));
    }
    info!(profile_id = id, "Profile updated");
    get_profile(db, id)
}

pub fn user_stats(db: &Database, id: i64) -> Result<UserStats> {
    get_profile(db, id)?;
    Ok(db.user_stats(id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GenieError;

    #[test]
    fn test_create_trims_and_validates() {
        let db = Database::in_memory().unwrap();
        let profile = create_profile(&db, "  ada  ", "🦊").unwrap();
        assert_eq!(profile.nickname, "ada");

        assert!(matches!(create_profile(&db, "   ", "🦊"), Err(GenieError::InvalidInput(_))));
        assert!(matches!(create_profile(&db, "bo", ""), Err(GenieError::InvalidInput(_))));
        let long = "x".repeat(MAX_NICKNAME_CHARS + 1);
        assert!(matches!(create_profile(&db, &long, "🦊"), Err(GenieError::InvalidInput(_))));
    }

    #[test]
    fn test_update_profile() {
        let db = Database::in_memory().unwrap();
        let profile = create_profile(&db, "ada", "🦊").unwrap();
        let updated = update_profile(&db, profile.id, "Ada L.", "🦉").unwrap();
        assert_eq!(updated.nickname, "Ada L.");
        assert_eq!(updated.avatar_emoji, "🦉");

        assert!(matches!(update_profile(&db, 404, "x", "🦉"), Err(GenieError::NotFound(_))));
        assert!(matches!(update_profile(&db, profile.id, "", "🦉"), Err(GenieError::InvalidInput(_))));
    }

    #[test]
    fn test_stats_for_unknown_profile() {
        let db = Database::in_memory().unwrap();
        assert!(matches!(user_stats(&db, 1), Err(GenieError::NotFound(_))));
        let profile = create_profile(&db, "ada", "🦊").unwrap();
        assert_eq!(user_stats(&db, profile.id).unwrap(), UserStats::default());
    }
}
