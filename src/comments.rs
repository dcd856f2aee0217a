//! Threaded comments: creation rules and flat-rows-to-tree construction.

use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

use crate::db::{CommentRow, Database, NewCommentRow};
use crate::error::{invalid, not_found, Result};
use crate::utils::now_millis;

/// Deepest depth a stored comment may have (top-level comments are depth 0)
pub const MAX_REPLY_DEPTH: i32 = 3;
pub const MAX_COMMENT_CHARS: usize = 2000;

/// A comment with its replies, serialised as the row fields plus `children`
#[derive(Debug, Clone, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: CommentRow,
    pub children: Vec<CommentNode>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub parent_id: Option<i64>,
    pub author_id: i64,
    pub content: String,
}

/// Build a reply forest from flat rows.
///
/// Every input row appears exactly once in the output. Rows whose parent is
/// missing from the input (or is the row itself) become roots; rows only
/// reachable through a parent cycle are promoted to roots in input order.
/// Siblings keep their input order.
pub fn build_comment_tree(rows: Vec<CommentRow>) -> Vec<CommentNode> {
    let n = rows.len();

    let mut position: HashMap<i64, usize> = HashMap::with_capacity(n);
    for (i, row) in rows.iter().enumerate() {
        position.entry(row.id).or_insert(i);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut roots = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        match row.parent_id.and_then(|p| position.get(&p).copied()).filter(|&p| p != i) {
            Some(parent) => children[parent].push(i),
            None => roots.push(i),
        }
    }

    // Pre-order walk from the natural roots, then from any row still unvisited.
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);
    let mut tree_roots = Vec::new();
    let mut tree_children: Vec<Vec<usize>> = vec![Vec::new(); n];

    for start in roots.into_iter().chain(0..n) {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        tree_roots.push(start);

        let mut stack = vec![start];
        while let Some(i) = stack.pop() {
            order.push(i);
            for &c in &children[i] {
                if !visited[c] {
                    visited[c] = true;
                    tree_children[i].push(c);
                }
            }
            // Reverse so the first child is popped first
            stack.extend(tree_children[i].iter().rev().copied());
        }
    }

    // Children come after their parent in pre-order, so building in reverse
    // finishes every subtree before its parent needs it.
    let mut slots: Vec<Option<CommentRow>> = rows.into_iter().map(Some).collect();
    let mut built: Vec<Option<CommentNode>> = (0..n).map(|_| None).collect();
    for &i in order.iter().rev() {
        let kids = tree_children[i].iter().filter_map(|&c| built[c].take()).collect();
        if let Some(comment) = slots[i].take() {
            built[i] = Some(CommentNode { comment, children: kids });
        }
    }

    tree_roots.into_iter().filter_map(|r| built[r].take()).collect()
}

/// Total number of comments in a forest
pub fn count_replies(nodes: &[CommentNode]) -> usize {
    let mut total = 0;
    let mut stack: Vec<&CommentNode> = nodes.iter().collect();
    while let Some(node) = stack.pop() {
        total += 1;
        stack.extend(node.children.iter());
    }
    total
}

/// Depth of comment `id` within the forest (roots are 0)
pub fn find_depth(nodes: &[CommentNode], id: i64) -> Option<usize> {
    let mut stack: Vec<(&CommentNode, usize)> = nodes.iter().map(|n| (n, 0)).collect();
    while let Some((node, depth)) = stack.pop() {
        if node.comment.id == id {
            return Some(depth);
        }
        stack.extend(node.children.iter().map(|c| (c, depth + 1)));
    }
    None
}

/// Flat comments for a post, oldest first
pub fn fetch_comments(db: &Database, post_id: i64) -> Result<Vec<CommentRow>> {
    Ok(db.list_comments(post_id)?)
}

pub fn fetch_comment_tree(db: &Database, post_id: i64) -> Result<Vec<CommentNode>> {
    Ok(build_comment_tree(db.list_comments(post_id)?))
}

/// Add a comment or reply. Depth is derived from the parent row.
pub fn create_comment(db: &Database, input: NewComment) -> Result<CommentRow> {
    let content = input.content.trim();
    if content.is_empty() {
        return Err(invalid("Comment cannot be empty"));
    }
    if content.chars().count() > MAX_COMMENT_CHARS {
        return Err(invalid(format!("Comment exceeds {} characters", MAX_COMMENT_CHARS)));
    }

    db.get_post(input.post_id)?
        .ok_or_else(|| not_found(format!("Post {} not found", input.post_id)))?;
    db.get_profile(input.author_id)?
        .ok_or_else(|| not_found(format!("Profile {} not found", input.author_id)))?;

    let depth = match input.parent_id {
        None => 0,
        Some(parent_id) => {
            let parent = db.get_comment(parent_id)?
                .ok_or_else(|| not_found(format!("Comment {} not found", parent_id)))?;
            if parent.post_id != input.post_id {
                return Err(invalid("Parent comment belongs to a different post"));
            }
            if parent.depth >= MAX_REPLY_DEPTH {
                return Err(invalid(format!("Replies are limited to {} levels", MAX_REPLY_DEPTH)));
            }
            parent.depth + 1
        }
    };

    let id = db.insert_comment(&NewCommentRow {
        post_id: input.post_id,
        parent_id: input.parent_id,
        author_id: input.author_id,
        content: content.to_string(),
        depth,
        created_at: now_millis(),
    })?;

    info!(comment_id = id, post_id = input.post_id, depth, "Comment created");

    db.get_comment(id)?
        .ok_or_else(|| not_found(format!("Comment {} not found after insert", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewPostRow;

    fn row(id: i64, parent_id: Option<i64>) -> CommentRow {
        CommentRow {
            id,
            post_id: 1,
            parent_id,
            author_id: 1,
            content: format!("c{}", id),
            depth: 0,
            likes_count: 0,
            created_at: id,
            author: None,
        }
    }

    fn ids(nodes: &[CommentNode]) -> Vec<i64> {
        nodes.iter().map(|n| n.comment.id).collect()
    }

    #[test]
    fn test_build_tree_nests_replies() {
        let tree = build_comment_tree(vec![
            row(1, None),
            row(2, Some(1)),
            row(3, None),
            row(4, Some(2)),
            row(5, Some(1)),
        ]);

        assert_eq!(ids(&tree), vec![1, 3]);
        assert_eq!(ids(&tree[0].children), vec![2, 5]);
        assert_eq!(ids(&tree[0].children[0].children), vec![4]);
        assert!(tree[1].children.is_empty());
        assert_eq!(count_replies(&tree), 5);
    }

    #[test]
    fn test_build_tree_child_before_parent() {
        let tree = build_comment_tree(vec![row(2, Some(1)), row(1, None)]);
        assert_eq!(ids(&tree), vec![1]);
        assert_eq!(ids(&tree[0].children), vec![2]);
    }

    #[test]
    fn test_build_tree_orphans_become_roots() {
        let tree = build_comment_tree(vec![row(1, None), row(2, Some(99)), row(3, Some(3))]);
        assert_eq!(ids(&tree), vec![1, 2, 3]);
        assert_eq!(count_replies(&tree), 3);
    }

    #[test]
    fn test_build_tree_cycle_loses_nothing() {
        let tree = build_comment_tree(vec![row(1, None), row(2, Some(3)), row(3, Some(2)), row(4, Some(3))]);
        assert_eq!(count_replies(&tree), 4);
        assert_eq!(ids(&tree), vec![1, 2]);
        assert_eq!(ids(&tree[1].children), vec![3]);
        assert_eq!(ids(&tree[1].children[0].children), vec![4]);
    }

    #[test]
    fn test_build_tree_empty() {
        assert!(build_comment_tree(Vec::new()).is_empty());
    }

    #[test]
    fn test_find_depth() {
        let tree = build_comment_tree(vec![row(1, None), row(2, Some(1)), row(3, Some(2))]);
        assert_eq!(find_depth(&tree, 1), Some(0));
        assert_eq!(find_depth(&tree, 3), Some(2));
        assert_eq!(find_depth(&tree, 42), None);
    }

    #[test]
    fn test_tree_json_shape() {
        let tree = build_comment_tree(vec![row(1, None), row(2, Some(1))]);
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json[0]["id"], 1);
        assert_eq!(json[0]["children"][0]["parent_id"], 1);
    }

    fn setup() -> (Database, i64, i64) {
        let db = Database::in_memory().unwrap();
        let ada = db.insert_profile("ada", "🦊", 0).unwrap();
        let post = db.insert_post(&NewPostRow {
            author_id: ada.id,
            title: "Thread".into(),
            content: "body".into(),
            hashtags: vec![],
            is_anonymous: false,
            created_at: 0,
        }).unwrap();
        (db, ada.id, post)
    }

    fn reply(db: &Database, post_id: i64, author_id: i64, parent_id: Option<i64>) -> Result<CommentRow> {
        create_comment(db, NewComment { post_id, parent_id, author_id, content: " hi ".into() })
    }

    #[test]
    fn test_create_comment_depths() {
        let (db, ada, post) = setup();
        let top = reply(&db, post, ada, None).unwrap();
        assert_eq!(top.depth, 0);
        assert_eq!(top.content, "hi");

        let d1 = reply(&db, post, ada, Some(top.id)).unwrap();
        let d2 = reply(&db, post, ada, Some(d1.id)).unwrap();
        let d3 = reply(&db, post, ada, Some(d2.id)).unwrap();
        assert_eq!((d1.depth, d2.depth, d3.depth), (1, 2, 3));

        let too_deep = reply(&db, post, ada, Some(d3.id));
        assert!(matches!(too_deep, Err(crate::GenieError::InvalidInput(_))));

        let tree = fetch_comment_tree(&db, post).unwrap();
        assert_eq!(count_replies(&tree), 4);
        assert_eq!(find_depth(&tree, d3.id), Some(3));
    }

    #[test]
    fn test_create_comment_rejects_bad_input() {
        let (db, ada, post) = setup();
        let empty = create_comment(&db, NewComment { post_id: post, parent_id: None, author_id: ada, content: "   ".into() });
        assert!(matches!(empty, Err(crate::GenieError::InvalidInput(_))));

        assert!(matches!(reply(&db, 999, ada, None), Err(crate::GenieError::NotFound(_))));
        assert!(matches!(reply(&db, post, 999, None), Err(crate::GenieError::NotFound(_))));
        assert!(matches!(reply(&db, post, ada, Some(999)), Err(crate::GenieError::NotFound(_))));
    }

    #[test]
    fn test_reply_must_stay_on_same_post() {
        let (db, ada, post) = setup();
        let other = db.insert_post(&NewPostRow {
            author_id: ada,
            title: "Other".into(),
            content: "body".into(),
            hashtags: vec![],
            is_anonymous: false,
            created_at: 1,
        }).unwrap();
        let top = reply(&db, post, ada, None).unwrap();
        assert!(matches!(reply(&db, other, ada, Some(top.id)), Err(crate::GenieError::InvalidInput(_))));
    }
}
