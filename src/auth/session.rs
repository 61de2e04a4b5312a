use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

/// Server-side session: who is logged in and which post (if any) they are
/// currently editing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub edit_post_id: Option<i64>,
}

impl Session {
    pub fn is_editing(&self) -> bool {
        self.edit_post_id.is_some()
    }
}

/// Create a new session for a user. Returns the session token.
pub fn create_session(
    conn: &Connection,
    username: &str,
    hours: u64,
) -> Result<String, rusqlite::Error> {
    let token = generate_token();

    conn.execute(
        "INSERT INTO sessions (token, username, expires_at) VALUES (?1, ?2, datetime('now', ?3))",
        params![token, username, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// Look up a live session by token. Expired sessions are treated as absent.
pub fn find_session(conn: &Connection, token: &str) -> Result<Option<Session>, rusqlite::Error> {
    conn.query_row(
        "SELECT token, username, edit_post_id FROM sessions \
         WHERE token = ?1 AND expires_at > datetime('now')",
        params![token],
        |row| {
            Ok(Session {
                token: row.get(0)?,
                username: row.get(1)?,
                edit_post_id: row.get(2)?,
            })
        },
    )
    .optional()
}

/// Delete a session by token.
pub fn delete_session(conn: &Connection, token: &str) -> Result<(), rusqlite::Error> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Switch the session into editing `post_id`, replacing any previous target.
pub fn begin_edit(conn: &Connection, token: &str, post_id: i64) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE sessions SET edit_post_id = ?1 WHERE token = ?2",
        params![post_id, token],
    )?;
    Ok(())
}

pub fn end_edit(conn: &Connection, token: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE sessions SET edit_post_id = NULL WHERE token = ?1",
        params![token],
    )?;
    Ok(())
}

/// Remove expired sessions. Returns how many were deleted.
pub fn purge_expired(conn: &Connection) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM sessions WHERE expires_at <= datetime('now')",
        [],
    )
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}
