use rusqlite::{params, Connection};

use crate::db::models::Comment;
use crate::store::{required_text, StoreError, StoreResult};

pub const MAX_COMMENT_CHARS: usize = 500;

/// Append a comment. Comments are never edited or deleted on their own.
pub fn add(conn: &Connection, post_id: i64, author: &str, text: &str) -> StoreResult<i64> {
    let text = required_text("Comment", text, MAX_COMMENT_CHARS)?;

    let post_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |r| r.get(0),
    )?;
    if !post_exists {
        return Err(StoreError::NotFound(format!("Post {post_id}")));
    }

    conn.execute(
        "INSERT INTO comments (post_id, author, comment) VALUES (?1, ?2, ?3)",
        params![post_id, author, text],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list(conn: &Connection, post_id: i64) -> StoreResult<Vec<Comment>> {
    let mut stmt = conn.prepare(
        "SELECT id, post_id, author, comment, date
         FROM comments
         WHERE post_id = ?1
         ORDER BY id ASC",
    )?;

    let comments = stmt
        .query_map(params![post_id], |row| {
            Ok(Comment {
                id: row.get(0)?,
                post_id: row.get(1)?,
                author: row.get(2)?,
                comment: row.get(3)?,
                date: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(comments)
}
