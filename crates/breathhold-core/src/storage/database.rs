//! SQLite-based storage for finalized session results.
//!
//! One row per session, written once when the session ends. The hold and
//! rest sequences and the safety event log are kept as JSON columns so a
//! row rebuilds the full [`TrainingSessionResult`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::data_dir;
use crate::engine::PersistenceSink;
use crate::error::{CoreError, DatabaseError, Result};
use crate::safety::{ExperienceLevel, SafetyEventLog, UserHistory};
use crate::serde_ms::as_ms;
use crate::session::{CompletionReason, SafetyCompliance, TrainingSessionResult};

/// How far back session starts are loaded into a [`UserHistory`].
/// Longer than any rest interval and one UTC day.
const HISTORY_WINDOW_HOURS: i64 = 48;

const RESULT_COLUMNS: &str = "session_id, program_id, level, started_at, ended_at, total_ms,
     completion_reason, compliance, best_hold_ms, consistency_score,
     hold_times_ms, rest_times_ms, safety_events";

/// SQLite database for session results.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data dir>/breathhold.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("breathhold.db");
        Ok(Self::open_at(&path)?)
    }

    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS session_results (
                session_id        TEXT PRIMARY KEY,
                program_id        TEXT NOT NULL,
                level             TEXT NOT NULL,
                started_at        TEXT,
                ended_at          TEXT NOT NULL,
                total_ms          INTEGER NOT NULL,
                completion_reason TEXT NOT NULL,
                compliance        TEXT NOT NULL,
                best_hold_ms      INTEGER NOT NULL,
                consistency_score REAL NOT NULL,
                hold_times_ms     TEXT NOT NULL,
                rest_times_ms     TEXT NOT NULL,
                safety_events     TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_session_results_started_at ON session_results(started_at);
            CREATE INDEX IF NOT EXISTS idx_session_results_ended_at ON session_results(ended_at);",
        )?;
        Ok(())
    }

    /// Insert a finalized result. A second insert for the same session fails.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn insert_result(&self, result: &TrainingSessionResult) -> Result<()> {
        let holds: Vec<u64> = result.hold_times.iter().copied().map(as_ms).collect();
        let rests: Vec<u64> = result.rest_times.iter().copied().map(as_ms).collect();
        self.conn.execute(
            "INSERT INTO session_results (session_id, program_id, level, started_at, ended_at,
                total_ms, completion_reason, compliance, best_hold_ms, consistency_score,
                hold_times_ms, rest_times_ms, safety_events)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                result.session_id.to_string(),
                result.program_id,
                result.level.as_str(),
                result.started_at.map(|t| t.to_rfc3339()),
                result.ended_at.to_rfc3339(),
                as_ms(result.total_duration),
                result.completion_reason.as_str(),
                result.safety_compliance.as_str(),
                as_ms(result.best_hold),
                result.consistency_score,
                serde_json::to_string(&holds)?,
                serde_json::to_string(&rests)?,
                serde_json::to_string(&result.safety_events)?,
            ],
        )?;
        Ok(())
    }

    pub fn get_result(&self, session_id: Uuid) -> Result<Option<TrainingSessionResult>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RESULT_COLUMNS} FROM session_results WHERE session_id = ?1"
        ))?;
        let mut rows = stmt.query(params![session_id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(result_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Results ordered newest first.
    pub fn recent_results(&self, limit: usize) -> Result<Vec<TrainingSessionResult>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RESULT_COLUMNS} FROM session_results ORDER BY ended_at DESC LIMIT ?1"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let results = collect_results(stmt.query(params![limit])?)?;
        Ok(results)
    }

    /// Every stored result, oldest first.
    pub fn all_results(&self) -> Result<Vec<TrainingSessionResult>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RESULT_COLUMNS} FROM session_results ORDER BY ended_at ASC"
        ))?;
        let results = collect_results(stmt.query([])?)?;
        Ok(results)
    }

    /// Start times of recently started sessions, for the safety policy.
    pub fn user_history(&self, now: DateTime<Utc>) -> Result<UserHistory> {
        let since = now - chrono::Duration::hours(HISTORY_WINDOW_HOURS);
        let mut stmt = self.conn.prepare(
            "SELECT started_at FROM session_results
             WHERE started_at IS NOT NULL AND started_at >= ?1
             ORDER BY started_at ASC",
        )?;
        let rows = stmt.query_map(params![since.to_rfc3339()], |row| row.get::<_, String>(0))?;

        let mut starts = Vec::new();
        for row in rows {
            starts.push(parse_time(&row?)?);
        }
        Ok(UserHistory::new(starts))
    }

    pub fn count_results(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM session_results", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

impl PersistenceSink for Database {
    fn store(&mut self, result: &TrainingSessionResult) -> Result<()> {
        self.insert_result(result)
    }
}

fn collect_results(mut rows: rusqlite::Rows<'_>) -> Result<Vec<TrainingSessionResult>> {
    let mut results = Vec::new();
    while let Some(row) = rows.next()? {
        results.push(result_from_row(row)?);
    }
    Ok(results)
}

fn result_from_row(row: &Row<'_>) -> Result<TrainingSessionResult> {
    let session_id: String = row.get(0)?;
    let level: String = row.get(2)?;
    let started_at: Option<String> = row.get(3)?;
    let ended_at: String = row.get(4)?;
    let total_ms: i64 = row.get(5)?;
    let reason: String = row.get(6)?;
    let compliance: String = row.get(7)?;
    let best_hold_ms: i64 = row.get(8)?;
    let holds: String = row.get(10)?;
    let rests: String = row.get(11)?;
    let events: String = row.get(12)?;

    let holds: Vec<u64> = serde_json::from_str(&holds)?;
    let rests: Vec<u64> = serde_json::from_str(&rests)?;
    let safety_events: SafetyEventLog = serde_json::from_str(&events)?;

    Ok(TrainingSessionResult {
        session_id: Uuid::parse_str(&session_id).map_err(|e| corrupt(format!("session_id: {e}")))?,
        program_id: row.get(1)?,
        level: level
            .parse::<ExperienceLevel>()
            .map_err(|e| corrupt(e.to_string()))?,
        started_at: started_at.as_deref().map(parse_time).transpose()?,
        ended_at: parse_time(&ended_at)?,
        total_duration: millis(total_ms),
        hold_times: holds.into_iter().map(std::time::Duration::from_millis).collect(),
        rest_times: rests.into_iter().map(std::time::Duration::from_millis).collect(),
        safety_events,
        completion_reason: CompletionReason::parse(&reason)
            .ok_or_else(|| corrupt(format!("completion reason '{reason}'")))?,
        best_hold: millis(best_hold_ms),
        consistency_score: row.get(9)?,
        safety_compliance: SafetyCompliance::parse(&compliance)
            .ok_or_else(|| corrupt(format!("compliance '{compliance}'")))?,
    })
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(format!("timestamp '{s}': {e}")))
}

fn millis(ms: i64) -> std::time::Duration {
    std::time::Duration::from_millis(ms.max(0) as u64)
}

fn corrupt(message: String) -> CoreError {
    DatabaseError::Corrupt(message).into()
}
