//! SQLite-backed profile store: speakers, challenges, access logs.
//!
//! The store is the single owner of persisted state. Engines receive an
//! explicit handle and never cache rows across calls. Uniqueness (enroll),
//! single-use (challenge consumption) and read-modify-write isolation
//! (template fusion) are enforced here, at the store boundary, not by
//! application-level check-then-act.

use crate::embedding;
use crate::error::{AuthError, AuthResult};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Epoch milliseconds, UTC.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One enrolled identity with its reference embedding.
#[derive(Debug, Clone, Serialize)]
pub struct SpeakerTemplate {
    pub user_id: String,
    pub display_name: String,
    /// Unit-norm reference vector. Every write path re-normalizes.
    pub embedding: Vec<f32>,
    /// Number of audio samples fused into the current vector. Always >= 1.
    pub sample_count: u32,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// Speaker listing row (no embedding payload).
#[derive(Debug, Clone, Serialize)]
pub struct SpeakerSummary {
    pub user_id: String,
    pub display_name: String,
    pub sample_count: u32,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// One liveness challenge row.
#[derive(Debug, Clone, Serialize)]
pub struct Challenge {
    pub challenge_id: String,
    /// Unbound challenges (None) are valid for identification flows.
    pub user_id: Option<String>,
    pub prompt_text: String,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
    /// Monotonic false -> true; once used a challenge can never validate again.
    pub used: bool,
}

impl Challenge {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at_ms
    }
}

/// Final authentication outcome, persisted in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Granted,
    Denied,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
        }
    }

    fn from_db(s: &str) -> Self {
        if s == "granted" {
            Self::Granted
        } else {
            Self::Denied
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record for one verification attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AccessLogEntry {
    pub id: String,
    pub user_id: String,
    pub timestamp_ms: i64,
    pub decision: Decision,
    pub score: f32,
    pub threshold: f32,
    pub challenge_id: Option<String>,
    pub transcription: Option<String>,
    pub sentence_match: Option<bool>,
    pub liveness_passed: Option<bool>,
}

/// Store handle. Connections are opened per call; per-entity serialization
/// is provided by immediate transactions and SQLite key constraints.
pub struct ProfileStore {
    db_path: PathBuf,
    embedding_dim: usize,
}

impl ProfileStore {
    /// Open or create the database and ensure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P, embedding_dim: usize) -> AuthResult<Self> {
        if embedding_dim == 0 {
            return Err(AuthError::Validation("embedding_dim must be positive".into()));
        }
        let this = Self {
            db_path: path.as_ref().to_path_buf(),
            embedding_dim,
        };
        this.init()?;
        Ok(this)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn conn(&self) -> AuthResult<Connection> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "busy_timeout", 5_000)?;
        Ok(conn)
    }

    fn init(&self) -> AuthResult<()> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS speakers (
                user_id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                embedding BLOB NOT NULL,
                sample_count INTEGER NOT NULL,
                created_at_ms INTEGER NOT NULL,
                updated_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS challenges (
                challenge_id TEXT PRIMARY KEY,
                user_id TEXT NULL,
                prompt_text TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL,
                expires_at_ms INTEGER NOT NULL,
                used INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_challenges_expires_at ON challenges(expires_at_ms);

            CREATE TABLE IF NOT EXISTS access_logs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                decision TEXT NOT NULL,
                score REAL NOT NULL,
                threshold REAL NOT NULL,
                challenge_id TEXT NULL,
                transcription TEXT NULL,
                sentence_match INTEGER NULL,
                liveness_passed INTEGER NULL
            );
            CREATE INDEX IF NOT EXISTS idx_access_logs_user_id ON access_logs(user_id);
            CREATE INDEX IF NOT EXISTS idx_access_logs_timestamp ON access_logs(timestamp_ms);
            "#,
        )?;
        Ok(())
    }

    fn check_dim(&self, embedding: &[f32]) -> AuthResult<()> {
        if embedding.len() != self.embedding_dim {
            return Err(AuthError::DimensionMismatch {
                expected: self.embedding_dim,
                got: embedding.len(),
            });
        }
        Ok(())
    }

    // ==================== speakers ====================

    /// Insert a new speaker. The PRIMARY KEY constraint is the uniqueness
    /// check: a duplicate `user_id` maps to [`AuthError::Conflict`], so two
    /// racing enrollments resolve to exactly one winner.
    pub fn insert_speaker(
        &self,
        user_id: &str,
        display_name: &str,
        embedding: &[f32],
        sample_count: u32,
    ) -> AuthResult<SpeakerTemplate> {
        self.check_dim(embedding)?;
        if sample_count == 0 {
            return Err(AuthError::Validation("sample_count must be >= 1".into()));
        }
        let ts = now_ms();
        let conn = self.conn()?;
        let inserted = conn.execute(
            r#"
            INSERT INTO speakers (user_id, display_name, embedding, sample_count, created_at_ms, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                user_id,
                display_name.trim(),
                embedding::encode_blob(embedding),
                sample_count,
                ts,
                ts
            ],
        );
        match inserted {
            Ok(_) => Ok(SpeakerTemplate {
                user_id: user_id.to_string(),
                display_name: display_name.trim().to_string(),
                embedding: embedding.to_vec(),
                sample_count,
                created_at_ms: ts,
                updated_at_ms: ts,
            }),
            Err(e) if is_constraint_violation(&e) => Err(AuthError::Conflict(format!(
                "user '{user_id}' already exists"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_speaker(&self, user_id: &str) -> AuthResult<Option<SpeakerTemplate>> {
        let conn = self.conn()?;
        self.get_speaker_on(&conn, user_id)
    }

    fn get_speaker_on(&self, conn: &Connection, user_id: &str) -> AuthResult<Option<SpeakerTemplate>> {
        let row: Option<(String, String, Vec<u8>, u32, i64, i64)> = conn
            .query_row(
                "SELECT user_id, display_name, embedding, sample_count, created_at_ms, updated_at_ms
                 FROM speakers WHERE user_id = ?1",
                params![user_id],
                |r| {
                    Ok((
                        r.get(0)?,
                        r.get(1)?,
                        r.get(2)?,
                        r.get(3)?,
                        r.get(4)?,
                        r.get(5)?,
                    ))
                },
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((user_id, display_name, blob, sample_count, created_at_ms, updated_at_ms)) => {
                Ok(Some(SpeakerTemplate {
                    user_id,
                    display_name,
                    embedding: embedding::decode_blob(&blob, self.embedding_dim)?,
                    sample_count,
                    created_at_ms,
                    updated_at_ms,
                }))
            }
        }
    }

    /// List enrolled speakers without embedding payloads, in enrollment order.
    pub fn list_speakers(&self) -> AuthResult<Vec<SpeakerSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, display_name, sample_count, created_at_ms, updated_at_ms
             FROM speakers ORDER BY created_at_ms ASC, rowid ASC",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(SpeakerSummary {
                    user_id: r.get(0)?,
                    display_name: r.get(1)?,
                    sample_count: r.get(2)?,
                    created_at_ms: r.get(3)?,
                    updated_at_ms: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Load every template with its embedding, in enrollment order. Used by
    /// 1:N identification so tie-breaks stay deterministic.
    pub fn list_templates(&self) -> AuthResult<Vec<SpeakerTemplate>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, display_name, embedding, sample_count, created_at_ms, updated_at_ms
             FROM speakers ORDER BY created_at_ms ASC, rowid ASC",
        )?;
        let raw = stmt
            .query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Vec<u8>>(2)?,
                    r.get::<_, u32>(3)?,
                    r.get::<_, i64>(4)?,
                    r.get::<_, i64>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut out = Vec::with_capacity(raw.len());
        for (user_id, display_name, blob, sample_count, created_at_ms, updated_at_ms) in raw {
            out.push(SpeakerTemplate {
                user_id,
                display_name,
                embedding: embedding::decode_blob(&blob, self.embedding_dim)?,
                sample_count,
                created_at_ms,
                updated_at_ms,
            });
        }
        Ok(out)
    }

    /// Delete a speaker. Returns false when the user was unknown.
    ///
    /// Challenges bound to the user are left untouched: they stay usable
    /// until consumed or expired. A deleted user has no template, so any
    /// verification against them fails with NotFound before liveness runs.
    pub fn delete_speaker(&self, user_id: &str) -> AuthResult<bool> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM speakers WHERE user_id = ?1", params![user_id])?;
        Ok(n > 0)
    }

    /// Per-row atomic read-modify-write of a template. The closure receives
    /// a consistent (embedding, sample_count) pair and returns the new pair;
    /// the whole exchange runs inside one immediate transaction so two
    /// concurrent updates of the same user never interleave.
    pub fn update_speaker_atomic<F>(&self, user_id: &str, apply: F) -> AuthResult<SpeakerTemplate>
    where
        F: FnOnce(&SpeakerTemplate) -> AuthResult<(Vec<f32>, u32)>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = self
            .get_speaker_on(&tx, user_id)?
            .ok_or_else(|| AuthError::NotFound(format!("user '{user_id}' not found")))?;
        let (new_embedding, new_count) = apply(&current)?;
        self.check_dim(&new_embedding)?;
        if new_count == 0 {
            return Err(AuthError::Validation("sample_count must be >= 1".into()));
        }
        let ts = now_ms();
        tx.execute(
            "UPDATE speakers SET embedding = ?1, sample_count = ?2, updated_at_ms = ?3 WHERE user_id = ?4",
            params![embedding::encode_blob(&new_embedding), new_count, ts, user_id],
        )?;
        tx.commit()?;
        Ok(SpeakerTemplate {
            embedding: new_embedding,
            sample_count: new_count,
            updated_at_ms: ts,
            ..current
        })
    }

    // ==================== challenges ====================

    pub fn insert_challenge(&self, challenge: &Challenge) -> AuthResult<()> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            r#"
            INSERT INTO challenges (challenge_id, user_id, prompt_text, created_at_ms, expires_at_ms, used)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                challenge.challenge_id,
                challenge.user_id,
                challenge.prompt_text,
                challenge.created_at_ms,
                challenge.expires_at_ms,
                challenge.used
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(AuthError::Conflict(format!(
                "challenge '{}' already exists",
                challenge.challenge_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_challenge(&self, challenge_id: &str) -> AuthResult<Option<Challenge>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT challenge_id, user_id, prompt_text, created_at_ms, expires_at_ms, used
                 FROM challenges WHERE challenge_id = ?1",
                params![challenge_id],
                challenge_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Read a challenge and flip its used flag in one immediate transaction.
    /// Exactly one of any set of concurrent callers observes `used = false`;
    /// the rest get [`AuthError::ChallengeUsed`]. An expired challenge is
    /// rejected without being marked used.
    pub fn consume_challenge(&self, challenge_id: &str, now_ms: i64) -> AuthResult<Challenge> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let row = tx
            .query_row(
                "SELECT challenge_id, user_id, prompt_text, created_at_ms, expires_at_ms, used
                 FROM challenges WHERE challenge_id = ?1",
                params![challenge_id],
                challenge_from_row,
            )
            .optional()?;
        let mut challenge = row.ok_or_else(|| {
            AuthError::NotFound(format!("challenge '{challenge_id}' not found"))
        })?;
        if challenge.used {
            return Err(AuthError::ChallengeUsed(challenge_id.to_string()));
        }
        if challenge.is_expired(now_ms) {
            return Err(AuthError::ChallengeExpired(challenge_id.to_string()));
        }
        let flipped = tx.execute(
            "UPDATE challenges SET used = 1 WHERE challenge_id = ?1 AND used = 0",
            params![challenge_id],
        )?;
        if flipped == 0 {
            return Err(AuthError::ChallengeUsed(challenge_id.to_string()));
        }
        tx.commit()?;
        challenge.used = true;
        Ok(challenge)
    }

    /// Lazy purge: drop challenges that are consumed or past their TTL.
    /// Returns the number of rows removed.
    pub fn purge_stale_challenges(&self, now_ms: i64) -> AuthResult<usize> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM challenges WHERE used = 1 OR expires_at_ms < ?1",
            params![now_ms],
        )?;
        Ok(n)
    }

    // ==================== access logs ====================

    /// Append one immutable audit row. Id and timestamp are assigned here.
    #[allow(clippy::too_many_arguments)]
    pub fn append_log(
        &self,
        user_id: &str,
        decision: Decision,
        score: f32,
        threshold: f32,
        challenge_id: Option<&str>,
        transcription: Option<&str>,
        sentence_match: Option<bool>,
        liveness_passed: Option<bool>,
    ) -> AuthResult<AccessLogEntry> {
        let id = uuid::Uuid::new_v4().to_string();
        let ts = now_ms();
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO access_logs
                (id, user_id, timestamp_ms, decision, score, threshold, challenge_id, transcription, sentence_match, liveness_passed)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                id,
                user_id,
                ts,
                decision.as_str(),
                score,
                threshold,
                challenge_id,
                transcription,
                sentence_match,
                liveness_passed
            ],
        )?;
        Ok(AccessLogEntry {
            id,
            user_id: user_id.to_string(),
            timestamp_ms: ts,
            decision,
            score,
            threshold,
            challenge_id: challenge_id.map(String::from),
            transcription: transcription.map(String::from),
            sentence_match,
            liveness_passed,
        })
    }

    /// Recent audit rows, newest first, optionally filtered by user.
    pub fn access_logs(&self, user_id: Option<&str>, limit: u32) -> AuthResult<Vec<AccessLogEntry>> {
        let conn = self.conn()?;
        let sql_filtered = "SELECT id, user_id, timestamp_ms, decision, score, threshold, challenge_id, transcription, sentence_match, liveness_passed
             FROM access_logs WHERE user_id = ?1 ORDER BY timestamp_ms DESC, rowid DESC LIMIT ?2";
        let sql_all = "SELECT id, user_id, timestamp_ms, decision, score, threshold, challenge_id, transcription, sentence_match, liveness_passed
             FROM access_logs ORDER BY timestamp_ms DESC, rowid DESC LIMIT ?1";
        let rows = match user_id {
            Some(uid) => {
                let mut stmt = conn.prepare(sql_filtered)?;
                let rows = stmt
                    .query_map(params![uid, limit], log_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(sql_all)?;
                let rows = stmt
                    .query_map(params![limit], log_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }
}

fn challenge_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Challenge> {
    Ok(Challenge {
        challenge_id: r.get(0)?,
        user_id: r.get(1)?,
        prompt_text: r.get(2)?,
        created_at_ms: r.get(3)?,
        expires_at_ms: r.get(4)?,
        used: r.get(5)?,
    })
}

fn log_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<AccessLogEntry> {
    let decision: String = r.get(3)?;
    Ok(AccessLogEntry {
        id: r.get(0)?,
        user_id: r.get(1)?,
        timestamp_ms: r.get(2)?,
        decision: Decision::from_db(&decision),
        score: r.get(4)?,
        threshold: r.get(5)?,
        challenge_id: r.get(6)?,
        transcription: r.get(7)?,
        sentence_match: r.get(8)?,
        liveness_passed: r.get(9)?,
    })
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(info, _)
            if info.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
