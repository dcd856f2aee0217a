use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result, TransactionBehavior};
use rusqlite::types::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use super::models::{AuthorSummary, CommentRow, Post, PostFilter, Profile, ReactionKind, ReactionState, UserStats};

pub struct Database {
    conn: Mutex<Connection>,
    path: String,
}

/// Insert payload for `posts`; hashtags are already normalised
#[derive(Debug, Clone)]
pub struct NewPostRow {
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub hashtags: Vec<String>,
    pub is_anonymous: bool,
    pub created_at: i64,
}

/// Insert payload for `comments`; depth is computed by the caller from the parent row
#[derive(Debug, Clone)]
pub struct NewCommentRow {
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub author_id: i64,
    pub content: String,
    pub depth: i32,
    pub created_at: i64,
}

impl Database {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let conn = Connection::open(&path)?;
        let db = Database { conn: Mutex::new(conn), path: path_str };
        db.init()?;
        Ok(db)
    }

    pub fn get_path(&self) -> String {
        self.path.clone()
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn: Mutex::new(conn), path: ":memory:".to_string() };
        db.init()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves the connection itself usable
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn();

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nickname TEXT NOT NULL,
                avatar_emoji TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                author_id INTEGER NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                hashtags TEXT NOT NULL DEFAULT '[]',   -- JSON array of strings
                is_anonymous INTEGER NOT NULL DEFAULT 0,
                likes_count INTEGER NOT NULL DEFAULT 0,    -- = COUNT(post_likes)
                helpful_count INTEGER NOT NULL DEFAULT 0,  -- = COUNT(post_helpfuls)
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                parent_id INTEGER REFERENCES comments(id) ON DELETE CASCADE,
                author_id INTEGER NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                depth INTEGER NOT NULL DEFAULT 0,
                likes_count INTEGER NOT NULL DEFAULT 0,    -- = COUNT(comment_likes)
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS post_likes (
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                profile_id INTEGER NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (post_id, profile_id)
            );

            CREATE TABLE IF NOT EXISTS post_helpfuls (
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                profile_id INTEGER NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (post_id, profile_id)
            );

            CREATE TABLE IF NOT EXISTS comment_likes (
                comment_id INTEGER NOT NULL REFERENCES comments(id) ON DELETE CASCADE,
                profile_id INTEGER NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (comment_id, profile_id)
            );

            CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id);
            CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at);
            CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_comments_author ON comments(author_id);

            -- Full-text search over posts
            CREATE VIRTUAL TABLE IF NOT EXISTS posts_fts USING fts5(
                title,
                content,
                content='posts',
                content_rowid='id'
            );

            -- Triggers to keep FTS in sync
            CREATE TRIGGER IF NOT EXISTS posts_ai AFTER INSERT ON posts BEGIN
                INSERT INTO posts_fts(rowid, title, content) VALUES (NEW.id, NEW.title, NEW.content);
            END;

            CREATE TRIGGER IF NOT EXISTS posts_ad AFTER DELETE ON posts BEGIN
                INSERT INTO posts_fts(posts_fts, rowid, title, content) VALUES('delete', OLD.id, OLD.title, OLD.content);
            END;

            CREATE TRIGGER IF NOT EXISTS posts_au AFTER UPDATE OF title, content ON posts BEGIN
                INSERT INTO posts_fts(posts_fts, rowid, title, content) VALUES('delete', OLD.id, OLD.title, OLD.content);
                INSERT INTO posts_fts(rowid, title, content) VALUES (NEW.id, NEW.title, NEW.content);
            END;
            "
        )?;

        Ok(())
    }

    // Profile operations
    pub fn insert_profile(&self, nickname: &str, avatar_emoji: &str, created_at: i64) -> Result<Profile> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO profiles (nickname, avatar_emoji, created_at) VALUES (?1, ?2, ?3)",
            params![nickname, avatar_emoji, created_at],
        )?;
        Ok(Profile {
            id: conn.last_insert_rowid(),
            nickname: nickname.to_string(),
            avatar_emoji: avatar_emoji.to_string(),
            created_at,
        })
    }

    pub fn get_profile(&self, id: i64) -> Result<Option<Profile>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, nickname, avatar_emoji, created_at FROM profiles WHERE id = ?1",
            params![id],
            |row| Ok(Profile {
                id: row.get(0)?,
                nickname: row.get(1)?,
                avatar_emoji: row.get(2)?,
                created_at: row.get(3)?,
            }),
        ).optional()
    }

    /// Returns false when no profile has this id
    pub fn update_profile(&self, id: i64, nickname: &str, avatar_emoji: &str) -> Result<bool> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE profiles SET nickname = ?1, avatar_emoji = ?2 WHERE id = ?3",
            params![nickname, avatar_emoji, id],
        )?;
        Ok(changed > 0)
    }

    pub fn user_stats(&self, profile_id: i64) -> Result<UserStats> {
        let conn = self.conn();
        conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM posts WHERE author_id = ?1),
                (SELECT COALESCE(SUM(likes_count), 0) FROM posts WHERE author_id = ?1),
                (SELECT COUNT(*) FROM comments WHERE author_id = ?1),
                (SELECT COALESCE(SUM(helpful_count), 0) FROM posts WHERE author_id = ?1)",
            params![profile_id],
            |row| Ok(UserStats {
                posts: row.get(0)?,
                likes: row.get(1)?,
                comments: row.get(2)?,
                helpful: row.get(3)?,
            }),
        )
    }

    // Post operations

    /// Standard SELECT for posts with joined author and comment count
    const POST_SELECT: &'static str = "SELECT p.id, p.author_id, p.title, p.content, p.hashtags, p.is_anonymous,
            p.likes_count, p.helpful_count,
            (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id),
            p.created_at, pr.nickname, pr.avatar_emoji
         FROM posts p
         LEFT JOIN profiles pr ON pr.id = p.author_id";

    fn row_to_post(row: &rusqlite::Row) -> Result<Post> {
        let hashtags: String = row.get(4)?;
        let nickname: Option<String> = row.get(10)?;
        let avatar_emoji: Option<String> = row.get(11)?;
        Ok(Post {
            id: row.get(0)?,
            author_id: row.get(1)?,
            title: row.get(2)?,
            content: row.get(3)?,
            hashtags: serde_json::from_str(&hashtags).unwrap_or_default(),
            is_anonymous: row.get::<_, i32>(5)? != 0,
            likes_count: row.get(6)?,
            helpful_count: row.get(7)?,
            comment_count: row.get(8)?,
            created_at: row.get(9)?,
            author: nickname.map(|nickname| AuthorSummary {
                nickname,
                avatar_emoji: avatar_emoji.unwrap_or_default(),
            }),
        })
    }

    pub fn insert_post(&self, post: &NewPostRow) -> Result<i64> {
        let hashtags = serde_json::to_string(&post.hashtags)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO posts (author_id, title, content, hashtags, is_anonymous, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![post.author_id, post.title, post.content, hashtags, post.is_anonymous, post.created_at],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_post(&self, id: i64) -> Result<Option<Post>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{} WHERE p.id = ?1", Self::POST_SELECT))?;
        stmt.query_row(params![id], Self::row_to_post).optional()
    }

    /// Feed query, newest first
    pub fn list_posts(&self, filter: &PostFilter) -> Result<Vec<Post>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(tag) = filter.hashtag.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            clauses.push("EXISTS (SELECT 1 FROM json_each(p.hashtags) j WHERE lower(j.value) = lower(?))");
            values.push(Value::Text(tag.trim_start_matches('#').to_string()));
        }
        if let Some(query) = filter.query.as_deref().and_then(fts_query) {
            clauses.push("p.id IN (SELECT rowid FROM posts_fts WHERE posts_fts MATCH ?)");
            values.push(Value::Text(query));
        }
        if let Some(author_id) = filter.author_id {
            clauses.push("p.author_id = ?");
            values.push(Value::Integer(author_id));
        }

        let mut sql = Self::POST_SELECT.to_string();
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY p.created_at DESC, p.id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let posts = stmt.query_map(params_from_iter(values.iter()), Self::row_to_post)?
            .collect::<Result<Vec<_>>>()?;
        Ok(posts)
    }

    pub fn list_posts_by_author(&self, author_id: i64) -> Result<Vec<Post>> {
        self.list_posts(&PostFilter { author_id: Some(author_id), ..Default::default() })
    }

    /// Deletes the post with its comments and reaction rows. Returns false if it did not exist.
    pub fn delete_post(&self, id: i64) -> Result<bool> {
        let conn = self.conn();
        let deleted = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    // Comment operations
    const COMMENT_SELECT: &'static str = "SELECT c.id, c.post_id, c.parent_id, c.author_id, c.content, c.depth,
            c.likes_count, c.created_at, pr.nickname, pr.avatar_emoji
         FROM comments c
         LEFT JOIN profiles pr ON pr.id = c.author_id";

    fn row_to_comment(row: &rusqlite::Row) -> Result<CommentRow> {
        let nickname: Option<String> = row.get(8)?;
        let avatar_emoji: Option<String> = row.get(9)?;
        Ok(CommentRow {
            id: row.get(0)?,
            post_id: row.get(1)?,
            parent_id: row.get(2)?,
            author_id: row.get(3)?,
            content: row.get(4)?,
            depth: row.get(5)?,
            likes_count: row.get(6)?,
            created_at: row.get(7)?,
            author: nickname.map(|nickname| AuthorSummary {
                nickname,
                avatar_emoji: avatar_emoji.unwrap_or_default(),
            }),
        })
    }

    pub fn insert_comment(&self, comment: &NewCommentRow) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO comments (post_id, parent_id, author_id, content, depth, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![comment.post_id, comment.parent_id, comment.author_id, comment.content, comment.depth, comment.created_at],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_comment(&self, id: i64) -> Result<Option<CommentRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{} WHERE c.id = ?1", Self::COMMENT_SELECT))?;
        stmt.query_row(params![id], Self::row_to_comment).optional()
    }

    /// Flat comment list in chronological order
    pub fn list_comments(&self, post_id: i64) -> Result<Vec<CommentRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE c.post_id = ?1 ORDER BY c.created_at ASC, c.id ASC",
            Self::COMMENT_SELECT
        ))?;
        let comments = stmt.query_map(params![post_id], Self::row_to_comment)?
            .collect::<Result<Vec<_>>>()?;
        Ok(comments)
    }

    // Reactions

    /// Flip the (post, profile) row for `kind` and recount the post's counter.
    ///
    /// Runs in one IMMEDIATE transaction so concurrent toggles serialise and the
    /// counter column always equals the row count when the call returns.
    pub fn toggle_reaction(&self, kind: ReactionKind, post_id: i64, profile_id: i64, now: i64) -> Result<ReactionState> {
        let table = kind.table();
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let removed = tx.execute(
            &format!("DELETE FROM {table} WHERE post_id = ?1 AND profile_id = ?2"),
            params![post_id, profile_id],
        )?;
        if removed == 0 {
            tx.execute(
                &format!("INSERT INTO {table} (post_id, profile_id, created_at) VALUES (?1, ?2, ?3)"),
                params![post_id, profile_id, now],
            )?;
        }

        let count: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE post_id = ?1"),
            params![post_id],
            |row| row.get(0),
        )?;
        tx.execute(
            &format!("UPDATE posts SET {} = ?1 WHERE id = ?2", kind.counter_column()),
            params![count, post_id],
        )?;
        tx.commit()?;

        Ok(ReactionState { active: removed == 0, count })
    }

    pub fn has_reacted(&self, kind: ReactionKind, post_id: i64, profile_id: i64) -> Result<bool> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT COUNT(*) > 0 FROM {} WHERE post_id = ?1 AND profile_id = ?2", kind.table()),
            params![post_id, profile_id],
            |row| row.get(0),
        )
    }

    /// Same contract as `toggle_reaction`, over `comment_likes`
    pub fn toggle_comment_like(&self, comment_id: i64, profile_id: i64, now: i64) -> Result<ReactionState> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let removed = tx.execute(
            "DELETE FROM comment_likes WHERE comment_id = ?1 AND profile_id = ?2",
            params![comment_id, profile_id],
        )?;
        if removed == 0 {
            tx.execute(
                "INSERT INTO comment_likes (comment_id, profile_id, created_at) VALUES (?1, ?2, ?3)",
                params![comment_id, profile_id, now],
            )?;
        }

        let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM comment_likes WHERE comment_id = ?1",
            params![comment_id],
            |row| row.get(0),
        )?;
        tx.execute("UPDATE comments SET likes_count = ?1 WHERE id = ?2", params![count, comment_id])?;
        tx.commit()?;

        Ok(ReactionState { active: removed == 0, count })
    }

    // Hashtags

    /// (tag, posts using it), grouped case-insensitively, most used first
    pub fn hashtag_counts(&self, limit: u32) -> Result<Vec<(String, i64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT MIN(j.value) AS tag, COUNT(DISTINCT p.id) AS uses
             FROM posts p, json_each(p.hashtags) j
             GROUP BY lower(j.value)
             ORDER BY uses DESC, lower(MIN(j.value)) ASC
             LIMIT ?1"
        )?;
        let rows = stmt.query_map(params![limit], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// (profiles, posts, comments)
    pub fn get_stats(&self) -> Result<(usize, usize, usize)> {
        let conn = self.conn();
        conn.query_row(
            "SELECT (SELECT COUNT(*) FROM profiles), (SELECT COUNT(*) FROM posts), (SELECT COUNT(*) FROM comments)",
            [],
            |row| Ok((
                row.get::<_, i64>(0)? as usize,
                row.get::<_, i64>(1)? as usize,
                row.get::<_, i64>(2)? as usize,
            )),
        )
    }
}

/// Turn free text into an FTS5 query of quoted terms (implicit AND).
/// Returns None when nothing searchable remains.
fn fts_query(raw: &str) -> Option<String> {
    let terms: Vec<String> = raw
        .split_whitespace()
        .map(|t| t.replace('"', ""))
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}
