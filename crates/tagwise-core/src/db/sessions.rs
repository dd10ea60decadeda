//! Session operations

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{format_datetime, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::Session;

/// Attempts before giving up on minting a unique session id
const MAX_ID_ATTEMPTS: usize = 5;

/// Mint a 32-hex-character session id from the username, time and a random nonce
fn mint_session_id(username: &str) -> String {
    let seed = format!(
        "{}:{}:{}",
        username,
        Utc::now().to_rfc3339(),
        uuid::Uuid::new_v4()
    );
    let digest = Sha256::digest(seed.as_bytes());
    hex::encode(digest)[..32].to_string()
}

/// `start` pushed out by `ttl_hours`, rejecting ttls chrono cannot represent
fn expiry_after(start: DateTime<Utc>, ttl_hours: i64) -> Result<DateTime<Utc>> {
    Duration::try_hours(ttl_hours)
        .and_then(|ttl| start.checked_add_signed(ttl))
        .ok_or_else(|| Error::InvalidData(format!("session ttl of {} hours is out of range", ttl_hours)))
}

impl Database {
    /// Create a session for `username` that expires after `ttl_hours`
    pub fn create_session(&self, username: &str, ttl_hours: i64) -> Result<Session> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Error::InvalidData("username must not be empty".into()));
        }

        let conn = self.conn()?;
        let created_at = Utc::now();
        let expires_at = expiry_after(created_at, ttl_hours)?;

        for _ in 0..MAX_ID_ATTEMPTS {
            let session_id = mint_session_id(username);
            let inserted = conn.execute(
                r#"
                INSERT INTO sessions (session_id, username, created_at, expires_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(session_id) DO NOTHING
                "#,
                params![
                    session_id,
                    username,
                    format_datetime(&created_at),
                    format_datetime(&expires_at),
                ],
            )?;

            if inserted == 1 {
                info!("Created session {} for {}", session_id, username);
                return Ok(Session {
                    session_id,
                    username: username.to_string(),
                    created_at,
                    expires_at,
                });
            }
            debug!("Session id collision, retrying");
        }

        Err(Error::InvalidData(
            "Could not mint a unique session id".into(),
        ))
    }

    /// Look up a session by id (expired sessions included)
    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let conn = self.conn()?;
        let session = conn
            .query_row(
                "SELECT session_id, username, created_at, expires_at FROM sessions WHERE session_id = ?",
                params![session_id],
                |row| {
                    let created_at: String = row.get(2)?;
                    let expires_at: String = row.get(3)?;
                    Ok(Session {
                        session_id: row.get(0)?,
                        username: row.get(1)?,
                        created_at: parse_datetime(&created_at)?,
                        expires_at: parse_datetime(&expires_at)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    /// Return the session if it exists and has not expired
    pub fn require_active_session(&self, session_id: &str) -> Result<Session> {
        let session = self
            .get_session(session_id)?
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;

        if session.is_expired_at(Utc::now()) {
            return Err(Error::SessionExpired(session_id.to_string()));
        }
        Ok(session)
    }

    /// Push a session's expiry out by `ttl_hours` from now
    pub fn extend_session(&self, session_id: &str, ttl_hours: i64) -> Result<Session> {
        let conn = self.conn()?;
        let expires_at = expiry_after(Utc::now(), ttl_hours)?;
        let updated = conn.execute(
            "UPDATE sessions SET expires_at = ? WHERE session_id = ?",
            params![format_datetime(&expires_at), session_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("session {}", session_id)));
        }
        self.get_session(session_id)?
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))
    }
}
