//! Hashtag normalisation and the trending word cloud.

use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::db::Database;
use crate::error::Result;

pub const MAX_HASHTAGS_PER_POST: usize = 10;
pub const MAX_HASHTAG_CHARS: usize = 40;

/// A whole tag: letters, digits, `_`, `-`
static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\p{L}\p{N}_-]+$").expect("valid hashtag regex")
});

/// `#Tag` inside free text, not preceded by a word character or `&` (HTML entities)
static INLINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[^\p{L}\p{N}_&])#([\p{L}\p{N}_-]+)").expect("valid inline hashtag regex")
});

/// Clean user-entered hashtags.
///
/// Leading `#` is stripped, entries with other punctuation are dropped, and
/// duplicates are removed case-insensitively keeping the first spelling.
pub fn normalize<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tags = Vec::new();

    for entry in raw {
        let tag = entry.as_ref().trim().trim_start_matches('#').trim();
        if tag.is_empty() || tag.chars().count() > MAX_HASHTAG_CHARS || !TAG_REGEX.is_match(tag) {
            continue;
        }
        if seen.insert(tag.to_lowercase()) {
            tags.push(tag.to_string());
        }
        if tags.len() == MAX_HASHTAGS_PER_POST {
            break;
        }
    }

    tags
}

/// Hashtags written inline in text, e.g. "thoughts on #PayGap"
pub fn extract(text: &str) -> Vec<String> {
    let found: Vec<&str> = INLINE_REGEX
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    normalize(&found)
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SizeTier {
    Xs,
    Sm,
    Md,
    Lg,
    Xl,
}

/// Bubble size for a tag relative to the least and most used tags in view
pub fn size_tier(count: i64, min: i64, max: i64) -> SizeTier {
    if max == min {
        return SizeTier::Md;
    }
    let ratio = (count - min) as f64 / (max - min) as f64;
    if ratio > 0.8 {
        SizeTier::Xl
    } else if ratio > 0.55 {
        SizeTier::Lg
    } else if ratio > 0.3 {
        SizeTier::Md
    } else if ratio > 0.1 {
        SizeTier::Sm
    } else {
        SizeTier::Xs
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WordCloudItem {
    pub tag: String,
    pub count: i64,
    pub tier: SizeTier,
}

/// Most used hashtags with their word-cloud size
pub fn word_cloud(db: &Database, limit: u32) -> Result<Vec<WordCloudItem>> {
    let counts = db.hashtag_counts(limit)?;
    let min = counts.iter().map(|(_, c)| *c).min().unwrap_or(0);
    let max = counts.iter().map(|(_, c)| *c).max().unwrap_or(0);

    Ok(counts
        .into_iter()
        .map(|(tag, count)| WordCloudItem { tier: size_tier(count, min, max), tag, count })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewPostRow;

    #[test]
    fn test_normalize_strips_and_dedupes() {
        let tags = normalize(&["#PayGap", " paygap ", "##STEM", "", "#", "women in tech", "ally-ship", "Mentor_ship"]);
        assert_eq!(tags, vec!["PayGap", "STEM", "ally-ship", "Mentor_ship"]);
    }

    #[test]
    fn test_normalize_caps_count() {
        let raw: Vec<String> = (0..20).map(|i| format!("tag{}", i)).collect();
        let tags = normalize(&raw);
        assert_eq!(tags.len(), MAX_HASHTAGS_PER_POST);
        assert_eq!(tags[0], "tag0");
    }

    #[test]
    fn test_normalize_keeps_unicode_letters() {
        assert_eq!(normalize(&["#Égalité"]), vec!["Égalité"]);
    }

    #[test]
    fn test_extract_inline() {
        let tags = extract("Thoughts on #PayGap and #mentorship, see a&#39;b or mail me@x.com #paygap");
        assert_eq!(tags, vec!["PayGap", "mentorship"]);
        assert!(extract("no tags here").is_empty());
    }

    #[test]
    fn test_size_tier() {
        assert_eq!(size_tier(5, 5, 5), SizeTier::Md);
        assert_eq!(size_tier(10, 0, 10), SizeTier::Xl);
        assert_eq!(size_tier(8, 0, 10), SizeTier::Lg);
        assert_eq!(size_tier(6, 0, 10), SizeTier::Lg);
        assert_eq!(size_tier(4, 0, 10), SizeTier::Md);
        assert_eq!(size_tier(2, 0, 10), SizeTier::Sm);
        assert_eq!(size_tier(1, 0, 10), SizeTier::Xs);
        assert_eq!(size_tier(0, 0, 10), SizeTier::Xs);
    }

    #[test]
    fn test_word_cloud() {
        let db = Database::in_memory().unwrap();
        let ada = db.insert_profile("ada", "🦊", 0).unwrap();
        for (i, tags) in [vec!["STEM"], vec!["STEM", "PayGap"], vec!["stem"]].into_iter().enumerate() {
            db.insert_post(&NewPostRow {
                author_id: ada.id,
                title: format!("p{}", i),
                content: "c".into(),
                hashtags: tags.into_iter().map(String::from).collect(),
                is_anonymous: false,
                created_at: i as i64,
            }).unwrap();
        }

        let cloud = word_cloud(&db, 10).unwrap();
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud[0].count, 3);
        assert_eq!(cloud[0].tier, SizeTier::Xl);
        assert_eq!(cloud[1].tag, "PayGap");
        assert_eq!(cloud[1].tier, SizeTier::Xs);

        assert!(word_cloud(&Database::in_memory().unwrap(), 10).unwrap().is_empty());
    }
}
