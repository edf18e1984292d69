use std::path::Path;

use chrono::NaiveDate;
use log::info;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, SrsError};
use crate::models::{DifficultyTier, ReviewLogEntry, ReviewRecord, StudyMode, Theme, ThemeStatus};
use crate::store::{
    CompletionCommit, CreationCommit, MasteryCommit, NewLogEntry, NewReviewRecord, NewTheme,
    ThemeStore, UndoCommit,
};

const DATE_FMT: &str = "%Y-%m-%d";

/// SQLite-backed theme store. All commit payloads are applied inside a
/// single transaction, and every UPDATE carries the state the payload
/// was built from, so a commit based on stale reads from another
/// connection fails with `ConcurrentModification` instead of clobbering
/// newer rows. A busy or locked database surfaces the same way through
/// the error conversion.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS themes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                specialty TEXT,
                area TEXT,
                difficulty_tier TEXT NOT NULL DEFAULT 'easy'
                    CHECK(difficulty_tier IN ('easy', 'medium', 'hard')),
                progression_level INTEGER NOT NULL DEFAULT 0,
                questions_total INTEGER NOT NULL DEFAULT 0,
                questions_correct INTEGER NOT NULL DEFAULT 0,
                retention_rate INTEGER NOT NULL DEFAULT 0,
                last_review_date TEXT,
                next_review_date TEXT,
                study_mode TEXT NOT NULL CHECK(study_mode IN ('questions', 'self')),
                status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active', 'mastered'))
            );

            CREATE TABLE IF NOT EXISTS review_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                theme_id INTEGER NOT NULL,
                scheduled_date TEXT NOT NULL,
                completed_date TEXT,
                session_accuracy INTEGER,
                result_tier TEXT CHECK(result_tier IN ('easy', 'medium', 'hard')),
                FOREIGN KEY (theme_id) REFERENCES themes(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS review_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                theme_id INTEGER NOT NULL,
                questions_answered INTEGER NOT NULL,
                questions_correct INTEGER NOT NULL,
                result_tier TEXT NOT NULL CHECK(result_tier IN ('easy', 'medium', 'hard')),
                logged_on TEXT NOT NULL,
                FOREIGN KEY (theme_id) REFERENCES themes(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_themes_next_review ON themes(next_review_date);
            CREATE INDEX IF NOT EXISTS idx_records_theme ON review_records(theme_id, completed_date);
            CREATE INDEX IF NOT EXISTS idx_log_theme ON review_log(theme_id);
            "#,
        )?;
        info!("schema ready");
        Ok(())
    }
}

fn date_to_sql(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FMT).to_string())
}

fn sql_conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::<dyn std::error::Error + Send + Sync>::from(msg),
    )
}

fn parse_date(idx: usize, value: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    match value {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(&s, DATE_FMT)
            .map(Some)
            .map_err(|e| sql_conversion_error(idx, format!("bad date '{s}': {e}"))),
    }
}

fn parse_tier(idx: usize, s: &str) -> rusqlite::Result<DifficultyTier> {
    DifficultyTier::from_str(s)
        .ok_or_else(|| sql_conversion_error(idx, format!("unknown difficulty tier '{s}'")))
}

fn theme_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Theme> {
    let tier_str: String = row.get(4)?;
    let mode_str: String = row.get(11)?;
    let status_str: String = row.get(12)?;
    Ok(Theme {
        id: row.get(0)?,
        name: row.get(1)?,
        specialty: row.get(2)?,
        area: row.get(3)?,
        difficulty_tier: parse_tier(4, &tier_str)?,
        progression_level: row.get(5)?,
        questions_total: row.get(6)?,
        questions_correct: row.get(7)?,
        retention_rate: row.get(8)?,
        last_review_date: parse_date(9, row.get(9)?)?,
        next_review_date: parse_date(10, row.get(10)?)?,
        study_mode: StudyMode::from_str(&mode_str)
            .ok_or_else(|| sql_conversion_error(11, format!("unknown study mode '{mode_str}'")))?,
        status: ThemeStatus::from_str(&status_str)
            .ok_or_else(|| sql_conversion_error(12, format!("unknown status '{status_str}'")))?,
    })
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReviewRecord> {
    let tier_str: Option<String> = row.get(5)?;
    let result_tier = match tier_str {
        Some(s) => Some(parse_tier(5, &s)?),
        None => None,
    };
    Ok(ReviewRecord {
        id: row.get(0)?,
        theme_id: row.get(1)?,
        scheduled_date: parse_date(2, row.get(2)?)?
            .ok_or_else(|| sql_conversion_error(2, "missing scheduled date".to_string()))?,
        completed_date: parse_date(3, row.get(3)?)?,
        session_accuracy: row.get(4)?,
        result_tier,
    })
}

fn log_entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReviewLogEntry> {
    let tier_str: String = row.get(4)?;
    Ok(ReviewLogEntry {
        id: row.get(0)?,
        theme_id: row.get(1)?,
        questions_answered: row.get(2)?,
        questions_correct: row.get(3)?,
        result_tier: parse_tier(4, &tier_str)?,
        logged_on: parse_date(5, row.get(5)?)?
            .ok_or_else(|| sql_conversion_error(5, "missing log date".to_string()))?,
    })
}

const THEME_COLUMNS: &str = "id, name, specialty, area, difficulty_tier, progression_level, \
     questions_total, questions_correct, retention_rate, last_review_date, next_review_date, \
     study_mode, status";

const RECORD_COLUMNS: &str =
    "id, theme_id, scheduled_date, completed_date, session_accuracy, result_tier";

fn update_theme(conn: &Connection, theme: &Theme, expected_level: i32) -> Result<()> {
    let rows = conn.execute(
        r#"
        UPDATE themes
        SET name = ?1, specialty = ?2, area = ?3, difficulty_tier = ?4,
            progression_level = ?5, questions_total = ?6, questions_correct = ?7,
            retention_rate = ?8, last_review_date = ?9, next_review_date = ?10,
            study_mode = ?11, status = ?12
        WHERE id = ?13 AND progression_level = ?14
        "#,
        params![
            theme.name,
            theme.specialty,
            theme.area,
            theme.difficulty_tier.as_str(),
            theme.progression_level,
            theme.questions_total,
            theme.questions_correct,
            theme.retention_rate,
            date_to_sql(theme.last_review_date),
            date_to_sql(theme.next_review_date),
            theme.study_mode.as_str(),
            theme.status.as_str(),
            theme.id,
            expected_level
        ],
    )?;
    if rows == 0 {
        let exists = conn
            .query_row(
                "SELECT 1 FROM themes WHERE id = ?1",
                params![theme.id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if exists {
            return Err(SrsError::ConcurrentModification);
        }
        return Err(SrsError::NotFound(theme.id));
    }
    Ok(())
}

fn insert_pending(conn: &Connection, new: &NewReviewRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO review_records (theme_id, scheduled_date) VALUES (?1, ?2)",
        params![new.theme_id, new.scheduled_date.format(DATE_FMT).to_string()],
    )?;
    Ok(())
}

fn insert_log(conn: &Connection, entry: &NewLogEntry) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO review_log (theme_id, questions_answered, questions_correct, result_tier, logged_on)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            entry.theme_id,
            entry.questions_answered,
            entry.questions_correct,
            entry.result_tier.as_str(),
            entry.logged_on.format(DATE_FMT).to_string()
        ],
    )?;
    Ok(())
}

impl ThemeStore for SqliteStore {
    fn insert_theme(&mut self, new: &NewTheme) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO themes (name, specialty, area, study_mode) VALUES (?1, ?2, ?3, ?4)",
            params![new.name, new.specialty, new.area, new.study_mode.as_str()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn theme(&self, id: i64) -> Result<Option<Theme>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {THEME_COLUMNS} FROM themes WHERE id = ?1"))?;
        match stmt.query_row(params![id], theme_from_row) {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn all_themes(&self) -> Result<Vec<Theme>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {THEME_COLUMNS} FROM themes ORDER BY id"))?;
        let rows = stmt.query_map([], theme_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn due_on_or_before(&self, date: NaiveDate) -> Result<Vec<Theme>> {
        // ISO dates compare lexicographically in calendar order
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {THEME_COLUMNS} FROM themes \
             WHERE next_review_date IS NOT NULL AND next_review_date <= ?1 \
             ORDER BY next_review_date, id"
        ))?;
        let rows = stmt.query_map(params![date.format(DATE_FMT).to_string()], theme_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn due_exactly(&self, date: NaiveDate) -> Result<Vec<Theme>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {THEME_COLUMNS} FROM themes WHERE next_review_date = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![date.format(DATE_FMT).to_string()], theme_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn pending_record(&self, theme_id: i64) -> Result<Option<ReviewRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM review_records \
             WHERE theme_id = ?1 AND completed_date IS NULL \
             ORDER BY id DESC LIMIT 1"
        ))?;
        match stmt.query_row(params![theme_id], record_from_row) {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn latest_completed_record(&self, theme_id: i64) -> Result<Option<ReviewRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM review_records \
             WHERE theme_id = ?1 AND completed_date IS NOT NULL \
             ORDER BY id DESC LIMIT 1"
        ))?;
        match stmt.query_row(params![theme_id], record_from_row) {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn recent_log_entries(&self, theme_id: i64, limit: usize) -> Result<Vec<ReviewLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, theme_id, questions_answered, questions_correct, result_tier, logged_on \
             FROM review_log WHERE theme_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![theme_id, limit as i64], log_entry_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn commit_creation(&mut self, commit: &CreationCommit) -> Result<()> {
        let tx = self.conn.transaction()?;
        update_theme(&tx, &commit.theme, commit.expected_level)?;
        insert_pending(&tx, &commit.pending)?;
        insert_log(&tx, &commit.log_entry)?;
        tx.commit()?;
        Ok(())
    }

    fn commit_completion(&mut self, commit: &CompletionCommit) -> Result<()> {
        let tx = self.conn.transaction()?;
        update_theme(&tx, &commit.theme, commit.expected_level)?;

        let record = &commit.closed_record;
        if record.id == 0 {
            // Unscheduled review: the record never existed as pending
            tx.execute(
                r#"
                INSERT INTO review_records
                    (theme_id, scheduled_date, completed_date, session_accuracy, result_tier)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    record.theme_id,
                    record.scheduled_date.format(DATE_FMT).to_string(),
                    date_to_sql(record.completed_date),
                    record.session_accuracy,
                    record.result_tier.map(|t| t.as_str())
                ],
            )?;
        } else {
            // Guarded close: a record another writer already completed
            // must not be closed twice
            let rows = tx.execute(
                r#"
                UPDATE review_records
                SET completed_date = ?1, session_accuracy = ?2, result_tier = ?3
                WHERE id = ?4 AND completed_date IS NULL
                "#,
                params![
                    date_to_sql(record.completed_date),
                    record.session_accuracy,
                    record.result_tier.map(|t| t.as_str()),
                    record.id
                ],
            )?;
            if rows == 0 {
                return Err(SrsError::ConcurrentModification);
            }
        }

        insert_pending(&tx, &commit.new_pending)?;
        insert_log(&tx, &commit.log_entry)?;
        tx.commit()?;
        Ok(())
    }

    fn commit_undo(&mut self, commit: &UndoCommit) -> Result<()> {
        let tx = self.conn.transaction()?;
        update_theme(&tx, &commit.theme, commit.expected_level)?;

        if let Some(pending_id) = commit.remove_pending_id {
            tx.execute(
                "DELETE FROM review_records WHERE id = ?1",
                params![pending_id],
            )?;
        }

        // Guarded reopen: only a record that is still closed qualifies
        let record = &commit.reopened_record;
        let rows = tx.execute(
            r#"
            UPDATE review_records
            SET scheduled_date = ?1, completed_date = NULL,
                session_accuracy = NULL, result_tier = NULL
            WHERE id = ?2 AND completed_date IS NOT NULL
            "#,
            params![record.scheduled_date.format(DATE_FMT).to_string(), record.id],
        )?;
        if rows == 0 {
            return Err(SrsError::ConcurrentModification);
        }

        tx.execute(
            "DELETE FROM review_log WHERE id = ?1",
            params![commit.remove_log_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn commit_mastery(&mut self, commit: &MasteryCommit) -> Result<()> {
        let tx = self.conn.transaction()?;
        update_theme(&tx, &commit.theme, commit.expected_level)?;

        let scheduled = commit.scheduled_date.format(DATE_FMT).to_string();
        match commit.pending_id {
            Some(id) => {
                let rows = tx.execute(
                    "UPDATE review_records SET scheduled_date = ?1 \
                     WHERE id = ?2 AND completed_date IS NULL",
                    params![scheduled, id],
                )?;
                if rows == 0 {
                    return Err(SrsError::ConcurrentModification);
                }
            }
            None => {
                tx.execute(
                    "INSERT INTO review_records (theme_id, scheduled_date) VALUES (?1, ?2)",
                    params![commit.theme.id, scheduled],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
