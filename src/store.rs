use chrono::{Local, NaiveDate};

use crate::error::{Result, SrsError};
use crate::models::{ReviewLogEntry, ReviewRecord, StudyMode, Theme};

/// Source of "today". The kernel never reads the system clock directly;
/// the production impl normalizes through the local timezone exactly
/// once and hands out plain calendar dates from then on.
pub trait Clock {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Fixed clock for tests and replaying historical sessions.
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

// Fields the "add theme" collaborator supplies; scheduling fields are
// filled in by the engine's create_schedule.
#[derive(Debug, Clone)]
pub struct NewTheme {
    pub name: String,
    pub specialty: Option<String>,
    pub area: Option<String>,
    pub study_mode: StudyMode,
}

#[derive(Debug, Clone)]
pub struct NewReviewRecord {
    pub theme_id: i64,
    pub scheduled_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub theme_id: i64,
    pub questions_answered: i32,
    pub questions_correct: i32,
    pub result_tier: crate::models::DifficultyTier,
    pub logged_on: NaiveDate,
}

// Atomic write payloads. The engine computes the full after-state and
// the store applies it in one transaction; on failure nothing of the
// payload may be visible. `expected_level` is the progression level the
// engine read while building the payload; a store must reject the whole
// commit with `ConcurrentModification` if the stored theme no longer
// matches it, so interleaved writers on separate connections cannot
// apply stale state.

#[derive(Debug, Clone)]
pub struct CreationCommit {
    pub theme: Theme,
    pub expected_level: i32,
    pub pending: NewReviewRecord,
    pub log_entry: NewLogEntry,
}

#[derive(Debug, Clone)]
pub struct CompletionCommit {
    pub theme: Theme,
    pub expected_level: i32,
    /// Closed record. `id == 0` means no pending record existed and the
    /// store must insert this row already completed (unscheduled review).
    pub closed_record: ReviewRecord,
    pub new_pending: NewReviewRecord,
    pub log_entry: NewLogEntry,
}

#[derive(Debug, Clone)]
pub struct UndoCommit {
    pub theme: Theme,
    pub expected_level: i32,
    /// The just-closed record, reopened and rescheduled.
    pub reopened_record: ReviewRecord,
    /// Pending record created by the undone completion.
    pub remove_pending_id: Option<i64>,
    pub remove_log_id: i64,
}

#[derive(Debug, Clone)]
pub struct MasteryCommit {
    pub theme: Theme,
    pub expected_level: i32,
    /// Existing pending record to reschedule; `None` inserts a fresh one.
    pub pending_id: Option<i64>,
    pub scheduled_date: NaiveDate,
}

/// Storage collaborator. Reads are plain queries; writes are the commit
/// payloads above, each applied all-or-nothing.
pub trait ThemeStore {
    fn insert_theme(&mut self, new: &NewTheme) -> Result<i64>;
    fn theme(&self, id: i64) -> Result<Option<Theme>>;
    fn all_themes(&self) -> Result<Vec<Theme>>;

    fn due_on_or_before(&self, date: NaiveDate) -> Result<Vec<Theme>>;
    fn due_exactly(&self, date: NaiveDate) -> Result<Vec<Theme>>;

    fn pending_record(&self, theme_id: i64) -> Result<Option<ReviewRecord>>;
    fn latest_completed_record(&self, theme_id: i64) -> Result<Option<ReviewRecord>>;
    /// Newest first.
    fn recent_log_entries(&self, theme_id: i64, limit: usize) -> Result<Vec<ReviewLogEntry>>;

    fn commit_creation(&mut self, commit: &CreationCommit) -> Result<()>;
    fn commit_completion(&mut self, commit: &CompletionCommit) -> Result<()>;
    fn commit_undo(&mut self, commit: &UndoCommit) -> Result<()>;
    fn commit_mastery(&mut self, commit: &MasteryCommit) -> Result<()>;
}

/// In-memory store for tests and embedding without SQLite.
#[derive(Debug, Default)]
pub struct MemoryStore {
    themes: Vec<Theme>,
    records: Vec<ReviewRecord>,
    log: Vec<ReviewLogEntry>,
    next_theme_id: i64,
    next_record_id: i64,
    next_log_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_theme_id: 1,
            next_record_id: 1,
            next_log_id: 1,
            ..Default::default()
        }
    }

    fn theme_mut(&mut self, id: i64) -> Result<&mut Theme> {
        self.themes
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(SrsError::NotFound(id))
    }

    fn put_theme(&mut self, theme: &Theme, expected_level: i32) -> Result<()> {
        let stored = self.theme_mut(theme.id)?;
        if stored.progression_level != expected_level {
            return Err(SrsError::ConcurrentModification);
        }
        *stored = theme.clone();
        Ok(())
    }

    fn insert_record(&mut self, new: &NewReviewRecord) -> i64 {
        let id = self.next_record_id;
        self.next_record_id += 1;
        self.records.push(ReviewRecord {
            id,
            theme_id: new.theme_id,
            scheduled_date: new.scheduled_date,
            completed_date: None,
            session_accuracy: None,
            result_tier: None,
        });
        id
    }

    #[cfg(test)]
    pub(crate) fn records(&self) -> &[ReviewRecord] {
        &self.records
    }

    #[cfg(test)]
    pub(crate) fn log_entries(&self) -> &[ReviewLogEntry] {
        &self.log
    }

    fn insert_log(&mut self, new: &NewLogEntry) -> i64 {
        let id = self.next_log_id;
        self.next_log_id += 1;
        self.log.push(ReviewLogEntry {
            id,
            theme_id: new.theme_id,
            questions_answered: new.questions_answered,
            questions_correct: new.questions_correct,
            result_tier: new.result_tier,
            logged_on: new.logged_on,
        });
        id
    }
}

impl ThemeStore for MemoryStore {
    fn insert_theme(&mut self, new: &NewTheme) -> Result<i64> {
        use crate::models::{DifficultyTier, ThemeStatus};
        let id = self.next_theme_id;
        self.next_theme_id += 1;
        self.themes.push(Theme {
            id,
            name: new.name.clone(),
            specialty: new.specialty.clone(),
            area: new.area.clone(),
            difficulty_tier: DifficultyTier::Easy,
            progression_level: 0,
            questions_total: 0,
            questions_correct: 0,
            retention_rate: 0,
            last_review_date: None,
            next_review_date: None,
            study_mode: new.study_mode,
            status: ThemeStatus::Active,
        });
        Ok(id)
    }

    fn theme(&self, id: i64) -> Result<Option<Theme>> {
        Ok(self.themes.iter().find(|t| t.id == id).cloned())
    }

    fn all_themes(&self) -> Result<Vec<Theme>> {
        Ok(self.themes.clone())
    }

    fn due_on_or_before(&self, date: NaiveDate) -> Result<Vec<Theme>> {
        Ok(self
            .themes
            .iter()
            .filter(|t| matches!(t.next_review_date, Some(d) if d <= date))
            .cloned()
            .collect())
    }

    fn due_exactly(&self, date: NaiveDate) -> Result<Vec<Theme>> {
        Ok(self
            .themes
            .iter()
            .filter(|t| t.next_review_date == Some(date))
            .cloned()
            .collect())
    }

    fn pending_record(&self, theme_id: i64) -> Result<Option<ReviewRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.theme_id == theme_id && r.is_pending())
            .max_by_key(|r| r.id)
            .cloned())
    }

    fn latest_completed_record(&self, theme_id: i64) -> Result<Option<ReviewRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.theme_id == theme_id && !r.is_pending())
            .max_by_key(|r| r.id)
            .cloned())
    }

    fn recent_log_entries(&self, theme_id: i64, limit: usize) -> Result<Vec<ReviewLogEntry>> {
        let mut entries: Vec<ReviewLogEntry> = self
            .log
            .iter()
            .filter(|e| e.theme_id == theme_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.id.cmp(&a.id));
        entries.truncate(limit);
        Ok(entries)
    }

    fn commit_creation(&mut self, commit: &CreationCommit) -> Result<()> {
        self.put_theme(&commit.theme, commit.expected_level)?;
        self.insert_record(&commit.pending);
        self.insert_log(&commit.log_entry);
        Ok(())
    }

    fn commit_completion(&mut self, commit: &CompletionCommit) -> Result<()> {
        self.put_theme(&commit.theme, commit.expected_level)?;
        if commit.closed_record.id == 0 {
            let id = self.next_record_id;
            self.next_record_id += 1;
            let mut rec = commit.closed_record.clone();
            rec.id = id;
            self.records.push(rec);
        } else if let Some(rec) = self
            .records
            .iter_mut()
            .find(|r| r.id == commit.closed_record.id)
        {
            // Another writer already closed it
            if !rec.is_pending() {
                return Err(SrsError::ConcurrentModification);
            }
            *rec = commit.closed_record.clone();
        } else {
            return Err(SrsError::Storage(format!(
                "review record {} vanished",
                commit.closed_record.id
            )));
        }
        self.insert_record(&commit.new_pending);
        self.insert_log(&commit.log_entry);
        Ok(())
    }

    fn commit_undo(&mut self, commit: &UndoCommit) -> Result<()> {
        self.put_theme(&commit.theme, commit.expected_level)?;
        if let Some(pending_id) = commit.remove_pending_id {
            self.records.retain(|r| r.id != pending_id);
        }
        if let Some(rec) = self
            .records
            .iter_mut()
            .find(|r| r.id == commit.reopened_record.id)
        {
            // Only a record that is still closed can be reopened
            if rec.is_pending() {
                return Err(SrsError::ConcurrentModification);
            }
            *rec = commit.reopened_record.clone();
        } else {
            return Err(SrsError::Storage(format!(
                "review record {} vanished",
                commit.reopened_record.id
            )));
        }
        self.log.retain(|e| e.id != commit.remove_log_id);
        Ok(())
    }

    fn commit_mastery(&mut self, commit: &MasteryCommit) -> Result<()> {
        self.put_theme(&commit.theme, commit.expected_level)?;
        match commit.pending_id {
            Some(id) => {
                if let Some(rec) = self.records.iter_mut().find(|r| r.id == id) {
                    if !rec.is_pending() {
                        return Err(SrsError::ConcurrentModification);
                    }
                    rec.scheduled_date = commit.scheduled_date;
                } else {
                    return Err(SrsError::Storage(format!("review record {id} vanished")));
                }
            }
            None => {
                self.insert_record(&NewReviewRecord {
                    theme_id: commit.theme.id,
                    scheduled_date: commit.scheduled_date,
                });
            }
        }
        Ok(())
    }
}
