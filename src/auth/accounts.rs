use rusqlite::{params, Connection, OptionalExtension};

use crate::auth::password;
use crate::db::models::User;
use crate::store::{is_unique_violation, required_text, StoreError, StoreResult};

pub const MAX_USERNAME_CHARS: usize = 32;

/// Create an account. Fails with `Conflict` when the username is taken.
pub fn register(conn: &Connection, username: &str, plaintext: &str, cost: u32) -> StoreResult<()> {
    let username = required_text("Username", username, MAX_USERNAME_CHARS)?;
    if plaintext.is_empty() {
        return Err(StoreError::Invalid("Password cannot be empty".into()));
    }

    let hash = password::hash(plaintext, cost)?;
    match conn.execute(
        "INSERT INTO users (username, password) VALUES (?1, ?2)",
        params![username, hash],
    ) {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(StoreError::Conflict(format!(
            "Username '{username}' already exists"
        ))),
        Err(e) => Err(e.into()),
    }
}

pub fn find_user(conn: &Connection, username: &str) -> StoreResult<Option<User>> {
    let user = conn
        .query_row(
            "SELECT username, password, created_at FROM users WHERE username = ?1",
            params![username],
            |row| {
                Ok(User {
                    username: row.get(0)?,
                    password_hash: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

/// Returns the stored username when the credentials match.
pub fn verify_credentials(
    conn: &Connection,
    username: &str,
    plaintext: &str,
) -> StoreResult<Option<String>> {
    let user = find_user(conn, username.trim())?;
    Ok(user
        .filter(|u| password::verify(plaintext, &u.password_hash))
        .map(|u| u.username))
}
