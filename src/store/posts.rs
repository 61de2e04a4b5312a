use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::db::models::{Attachment, Post};
use crate::store::{bounded_text, required_text, StoreError, StoreResult};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_CONTENT_CHARS: usize = 10_000;

pub struct NewPost<'a> {
    pub author: &'a str,
    pub title: &'a str,
    pub content: &'a str,
    pub attachment: Option<Attachment>,
}

/// Result of a like toggle: whether the user now likes the post and the
/// post's counter after the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeState {
    pub liked: bool,
    pub likes: i64,
}

const POST_COLUMNS: &str = "id, author, title, content, file_name, date, likes";

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        author: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        file_name: row.get(4)?,
        date: row.get(5)?,
        likes: row.get(6)?,
    })
}

pub fn create(conn: &Connection, post: NewPost<'_>) -> StoreResult<i64> {
    let title = required_text("Title", post.title, MAX_TITLE_CHARS)?;
    let content = bounded_text("Content", post.content, MAX_CONTENT_CHARS)?;
    let (file_name, file_data) = match post.attachment {
        Some(a) => (Some(a.file_name), Some(a.data)),
        None => (None, None),
    };

    conn.execute(
        "INSERT INTO posts (author, title, content, file_name, file_data) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![post.author, title, content, file_name, file_data],
    )?;
    Ok(conn.last_insert_rowid())
}

/// All posts, newest first.
pub fn list(conn: &Connection) -> StoreResult<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {POST_COLUMNS} FROM posts ORDER BY id DESC"
    ))?;
    let posts = stmt
        .query_map([], post_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

/// Case-insensitive substring filter on title or author. A blank query keeps
/// every post.
pub fn search(posts: Vec<Post>, query: &str) -> Vec<Post> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return posts;
    }
    posts
        .into_iter()
        .filter(|p| {
            p.title.to_lowercase().contains(&needle) || p.author.to_lowercase().contains(&needle)
        })
        .collect()
}

pub fn get(conn: &Connection, id: i64) -> StoreResult<Post> {
    conn.query_row(
        &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
        params![id],
        post_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("Post {id}")))
}

pub fn attachment(conn: &Connection, id: i64) -> StoreResult<Option<Attachment>> {
    let row: Option<(Option<String>, Option<Vec<u8>>)> = conn
        .query_row(
            "SELECT file_name, file_data FROM posts WHERE id = ?1",
            params![id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    match row {
        None => Err(StoreError::NotFound(format!("Post {id}"))),
        Some((Some(file_name), data)) => Ok(Some(Attachment {
            file_name,
            data: data.unwrap_or_default(),
        })),
        Some((None, _)) => Ok(None),
    }
}

/// Check that `username` wrote post `id` and so may modify it.
pub fn authorize(conn: &Connection, id: i64, username: &str) -> StoreResult<()> {
    let author: String = conn
        .query_row(
            "SELECT author FROM posts WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("Post {id}")))?;

    if author != username {
        return Err(StoreError::Forbidden(format!(
            "Post {id} belongs to another user"
        )));
    }
    Ok(())
}

pub fn update(
    conn: &Connection,
    id: i64,
    editor: &str,
    title: &str,
    content: &str,
) -> StoreResult<()> {
    let title = required_text("Title", title, MAX_TITLE_CHARS)?;
    let content = bounded_text("Content", content, MAX_CONTENT_CHARS)?;
    authorize(conn, id, editor)?;

    conn.execute(
        "UPDATE posts SET title = ?1, content = ?2 WHERE id = ?3",
        params![title, content, id],
    )?;
    Ok(())
}

/// Delete a post together with its comments and likes.
pub fn delete(conn: &mut Connection, id: i64, requester: &str) -> StoreResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    authorize(&tx, id, requester)?;

    tx.execute("DELETE FROM likes_log WHERE post_id = ?1", params![id])?;
    tx.execute("DELETE FROM comments WHERE post_id = ?1", params![id])?;
    tx.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
    tx.commit()?;
    Ok(())
}

/// Flip `username`'s like on post `id`. The like row and the counter change
/// in the same transaction.
pub fn toggle_like(conn: &mut Connection, id: i64, username: &str) -> StoreResult<LikeState> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![id],
        |r| r.get(0),
    )?;
    if !exists {
        return Err(StoreError::NotFound(format!("Post {id}")));
    }

    let removed = tx.execute(
        "DELETE FROM likes_log WHERE post_id = ?1 AND username = ?2",
        params![id, username],
    )?;

    let liked = if removed > 0 {
        tx.execute(
            "UPDATE posts SET likes = likes - 1 WHERE id = ?1",
            params![id],
        )?;
        false
    } else {
        tx.execute(
            "INSERT INTO likes_log (post_id, username) VALUES (?1, ?2)",
            params![id, username],
        )?;
        tx.execute(
            "UPDATE posts SET likes = likes + 1 WHERE id = ?1",
            params![id],
        )?;
        true
    };

    let likes: i64 = tx.query_row(
        "SELECT likes FROM posts WHERE id = ?1",
        params![id],
        |r| r.get(0),
    )?;
    tx.commit()?;

    Ok(LikeState { liked, likes })
}

pub fn liked_by(conn: &Connection, id: i64, username: &str) -> StoreResult<bool> {
    let liked = conn.query_row(
        "SELECT COUNT(*) > 0 FROM likes_log WHERE post_id = ?1 AND username = ?2",
        params![id, username],
        |r| r.get(0),
    )?;
    Ok(liked)
}

/// Reset every drifted `likes` counter to its `likes_log` row count. Returns
/// the number of posts fixed.
pub fn reconcile_like_counts(conn: &Connection) -> StoreResult<usize> {
    let fixed = conn.execute(
        "UPDATE posts
         SET likes = (SELECT COUNT(*) FROM likes_log l WHERE l.post_id = posts.id)
         WHERE likes != (SELECT COUNT(*) FROM likes_log l WHERE l.post_id = posts.id)",
        [],
    )?;
    Ok(fixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn add_user(conn: &Connection, name: &str) {
        conn.execute(
            "INSERT INTO users (username, password) VALUES (?1, 'hash')",
            params![name],
        )
        .unwrap();
    }

    fn new_post<'a>(author: &'a str, title: &'a str) -> NewPost<'a> {
        NewPost {
            author,
            title,
            content: "body",
            attachment: None,
        }
    }

    fn like_rows(conn: &Connection, id: i64) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM likes_log WHERE post_id = ?1",
            params![id],
            |r| r.get(0),
        )
        .unwrap()
    }

    #[test]
    fn list_is_newest_first() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        add_user(&conn, "alice");
        create(&conn, new_post("alice", "first")).unwrap();
        create(&conn, new_post("alice", "second")).unwrap();

        let titles: Vec<String> = list(&conn).unwrap().into_iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["second", "first"]);
    }

    #[test]
    fn create_rejects_blank_title() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        add_user(&conn, "alice");
        let err = create(&conn, new_post("alice", "   ")).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn create_stores_timestamp_and_zero_likes() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        add_user(&conn, "alice");
        let id = create(&conn, new_post("alice", "dated")).unwrap();

        let post = get(&conn, id).unwrap();
        assert_eq!(post.likes, 0);
        assert!(chrono::NaiveDateTime::parse_from_str(&post.date, "%Y-%m-%d %H:%M:%S").is_ok());
    }

    #[test]
    fn search_matches_title_or_author_ignoring_case() {
        let post = |id: i64, author: &str, title: &str| Post {
            id,
            author: author.to_string(),
            title: title.to_string(),
            content: String::new(),
            file_name: None,
            date: String::new(),
            likes: 0,
        };
        let posts = vec![
            post(3, "carol", "Weekend FOOD"),
            post(2, "Foodie", "hello"),
            post(1, "dave", "nothing"),
        ];

        let ids: Vec<i64> = search(posts.clone(), "food").iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 2]);
        assert_eq!(search(posts, "  ").len(), 3);
    }

    #[test]
    fn update_by_non_author_is_forbidden() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        add_user(&conn, "alice");
        add_user(&conn, "mallory");
        let id = create(&conn, new_post("alice", "mine")).unwrap();

        let err = update(&conn, id, "mallory", "hacked", "").unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));
        assert_eq!(get(&conn, id).unwrap().title, "mine");

        update(&conn, id, "alice", "edited", "new body").unwrap();
        let post = get(&conn, id).unwrap();
        assert_eq!(post.title, "edited");
        assert_eq!(post.content, "new body");
    }

    #[test]
    fn content_is_stored_as_typed() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        add_user(&conn, "alice");
        let id = create(
            &conn,
            NewPost {
                content: "    indented line\n",
                ..new_post("alice", "code")
            },
        )
        .unwrap();
        assert_eq!(get(&conn, id).unwrap().content, "    indented line\n");

        update(&conn, id, "alice", "code", "\tstill indented").unwrap();
        assert_eq!(get(&conn, id).unwrap().content, "\tstill indented");
    }

    #[test]
    fn update_missing_post_is_not_found() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let err = update(&conn, 42, "alice", "t", "c").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn toggle_like_keeps_counter_in_step_with_log() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        add_user(&conn, "alice");
        add_user(&conn, "bob");
        let id = create(&conn, new_post("alice", "likeable")).unwrap();

        let state = toggle_like(&mut conn, id, "bob").unwrap();
        assert_eq!(state, LikeState { liked: true, likes: 1 });
        assert!(liked_by(&conn, id, "bob").unwrap());

        toggle_like(&mut conn, id, "alice").unwrap();
        assert_eq!(get(&conn, id).unwrap().likes, like_rows(&conn, id));

        let state = toggle_like(&mut conn, id, "bob").unwrap();
        assert_eq!(state, LikeState { liked: false, likes: 1 });
        assert!(!liked_by(&conn, id, "bob").unwrap());
        assert_eq!(like_rows(&conn, id), 1);
    }

    #[test]
    fn toggle_like_on_missing_post_is_not_found() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        add_user(&conn, "bob");
        let err = toggle_like(&mut conn, 9, "bob").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn delete_removes_comments_and_likes() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        add_user(&conn, "alice");
        add_user(&conn, "bob");
        let id = create(&conn, new_post("alice", "doomed")).unwrap();
        toggle_like(&mut conn, id, "bob").unwrap();
        crate::store::comments::add(&conn, id, "bob", "nice").unwrap();

        let err = delete(&mut conn, id, "bob").unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));

        delete(&mut conn, id, "alice").unwrap();
        assert!(list(&conn).unwrap().is_empty());
        assert_eq!(like_rows(&conn, id), 0);
        assert!(crate::store::comments::list(&conn, id).unwrap().is_empty());
    }

    #[test]
    fn attachment_round_trips_bytes() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        add_user(&conn, "alice");
        let bytes = vec![0u8, 159, 146, 150, 255];
        let id = create(
            &conn,
            NewPost {
                author: "alice",
                title: "with file",
                content: "",
                attachment: Some(Attachment {
                    file_name: "blob.bin".into(),
                    data: bytes.clone(),
                }),
            },
        )
        .unwrap();
        let plain = create(&conn, new_post("alice", "no file")).unwrap();

        let file = attachment(&conn, id).unwrap().unwrap();
        assert_eq!(file.file_name, "blob.bin");
        assert_eq!(file.data, bytes);
        assert!(get(&conn, id).unwrap().has_attachment());
        assert_eq!(attachment(&conn, plain).unwrap(), None);
        assert!(matches!(attachment(&conn, 99), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn reconcile_fixes_drifted_counters() {
        let pool = test_pool();
        let mut conn = pool.get().unwrap();
        add_user(&conn, "alice");
        let id = create(&conn, new_post("alice", "drift")).unwrap();
        toggle_like(&mut conn, id, "alice").unwrap();
        conn.execute("UPDATE posts SET likes = 5 WHERE id = ?1", params![id])
            .unwrap();

        assert_eq!(reconcile_like_counts(&conn).unwrap(), 1);
        assert_eq!(get(&conn, id).unwrap().likes, 1);
        assert_eq!(reconcile_like_counts(&conn).unwrap(), 0);
    }
}
