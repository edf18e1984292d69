use chrono::NaiveDate;
use log::debug;

use crate::classify::{accuracy_pct, classify};
use crate::error::{Result, SrsError};
use crate::load;
use crate::models::{
    DifficultyTier, LoadSignal, ReviewRecord, SessionInput, StudyMode, Theme, ThemeStatus,
};
use crate::schedule::{self, TableKind};
use crate::store::{
    Clock, CompletionCommit, CreationCommit, MasteryCommit, NewLogEntry, NewReviewRecord,
    NewTheme, ThemeStore, UndoCommit,
};

/// The scheduling kernel. Owns a storage collaborator and a clock;
/// every write path computes the complete after-state and hands it to
/// the store as a single atomic commit.
pub struct SrsEngine<S: ThemeStore, C: Clock> {
    store: S,
    clock: C,
}

impl<S: ThemeStore, C: Clock> SrsEngine<S, C> {
    pub fn new(store: S, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn theme(&self, id: i64) -> Result<Option<Theme>> {
        self.store.theme(id)
    }

    pub fn all_themes(&self) -> Result<Vec<Theme>> {
        self.store.all_themes()
    }

    fn require_theme(&self, id: i64) -> Result<Theme> {
        self.store.theme(id)?.ok_or(SrsError::NotFound(id))
    }

    /// Inserts a theme row and computes its first schedule in one go.
    /// Convenience for callers that own both halves of theme creation.
    pub fn add_theme(
        &mut self,
        new: &NewTheme,
        study_date: NaiveDate,
        input: SessionInput,
    ) -> Result<Theme> {
        if input.mode() != new.study_mode {
            return Err(SrsError::Validation(
                "session input does not match the theme's study mode".to_string(),
            ));
        }
        let id = self.store.insert_theme(new)?;
        self.create_schedule(id, study_date, input)?;
        self.require_theme(id)
    }

    /// First schedule for a freshly created theme: classifies the initial
    /// study session, seeds the aggregates, and opens the first pending
    /// review. Uses the first-schedule interval table.
    pub fn create_schedule(
        &mut self,
        theme_id: i64,
        study_date: NaiveDate,
        input: SessionInput,
    ) -> Result<(DifficultyTier, NaiveDate)> {
        let mut theme = self.require_theme(theme_id)?;
        if theme.progression_level > 0 || theme.next_review_date.is_some() {
            return Err(SrsError::Validation(format!(
                "theme {theme_id} already has a schedule"
            )));
        }
        check_mode(&theme, input)?;

        let (tier, accuracy) = classify(input)?;
        let (q_total, q_correct) = input.counters();

        let expected_level = theme.progression_level;
        theme.difficulty_tier = tier;
        theme.progression_level = 1;
        theme.questions_total = q_total;
        theme.questions_correct = q_correct;
        theme.retention_rate = accuracy;
        theme.last_review_date = Some(study_date);
        let next = schedule::next_date(study_date, tier, 1, TableKind::First);
        theme.next_review_date = Some(next);

        self.store.commit_creation(&CreationCommit {
            theme,
            expected_level,
            pending: NewReviewRecord {
                theme_id,
                scheduled_date: next,
            },
            log_entry: NewLogEntry {
                theme_id,
                questions_answered: q_total,
                questions_correct: q_correct,
                result_tier: tier,
                logged_on: study_date,
            },
        })?;

        debug!("theme {theme_id}: first schedule {} ({tier:?})", next);
        Ok((tier, next))
    }

    /// The core transaction: close the pending review, log the session,
    /// fold it into the theme's aggregates, and open the next pending
    /// review. If no review was pending one is synthesized at the
    /// completion date (logging an unscheduled session is allowed).
    pub fn complete_review(
        &mut self,
        theme_id: i64,
        completion_date: NaiveDate,
        input: SessionInput,
    ) -> Result<Theme> {
        let mut theme = self.require_theme(theme_id)?;
        if theme.status == ThemeStatus::Mastered {
            return Err(SrsError::Validation(format!(
                "theme {theme_id} is mastered; reviews are no longer tracked"
            )));
        }
        check_mode(&theme, input)?;

        let (tier, accuracy) = classify(input)?;

        let closed_record = match self.store.pending_record(theme_id)? {
            Some(mut record) => {
                record.completed_date = Some(completion_date);
                record.session_accuracy = Some(accuracy);
                record.result_tier = Some(tier);
                record
            }
            // Unscheduled review: synthesize the record, anchored at the
            // completion date. id 0 tells the store to insert it.
            None => ReviewRecord {
                id: 0,
                theme_id,
                scheduled_date: completion_date,
                completed_date: Some(completion_date),
                session_accuracy: Some(accuracy),
                result_tier: Some(tier),
            },
        };

        let expected_level = theme.progression_level;
        let (q_total, q_correct) = input.counters();
        theme.questions_total += q_total;
        theme.questions_correct += q_correct;
        theme.retention_rate = match input.mode() {
            StudyMode::QuantitativeQuestions => {
                accuracy_pct(theme.questions_total, theme.questions_correct)
            }
            // Self-evaluation never touches the counters; retention mirrors
            // the session's synthetic accuracy directly.
            StudyMode::SelfEvaluation => accuracy,
        };
        theme.progression_level += 1;
        theme.difficulty_tier = tier;
        theme.last_review_date = Some(completion_date);
        let next = schedule::next_date(
            completion_date,
            tier,
            theme.progression_level,
            TableKind::Subsequent,
        );
        theme.next_review_date = Some(next);

        self.store.commit_completion(&CompletionCommit {
            theme: theme.clone(),
            expected_level,
            closed_record,
            new_pending: NewReviewRecord {
                theme_id,
                scheduled_date: next,
            },
            log_entry: NewLogEntry {
                theme_id,
                questions_answered: q_total,
                questions_correct: q_correct,
                result_tier: tier,
                logged_on: completion_date,
            },
        })?;

        debug!(
            "theme {theme_id}: review completed on {completion_date}, next due {next} ({tier:?})"
        );
        Ok(theme)
    }

    /// Reverses the most recent review, and only on the calendar day it
    /// was completed. Restores aggregates from the review log, reopens
    /// the closed record, and makes the theme due again today.
    pub fn undo_last_review(&mut self, theme_id: i64) -> Result<Theme> {
        let mut theme = self.require_theme(theme_id)?;
        if theme.status == ThemeStatus::Mastered {
            return Err(SrsError::NotReversible);
        }

        let today = self.clock.today();
        let entries = self.store.recent_log_entries(theme_id, 2)?;
        let last = match entries.first() {
            Some(e) if e.logged_on == today => e.clone(),
            _ => return Err(SrsError::NotReversible),
        };
        let closed = match self.store.latest_completed_record(theme_id)? {
            Some(r) if r.completed_date == Some(today) => r,
            _ => return Err(SrsError::NotReversible),
        };
        let previous = entries.get(1);

        let expected_level = theme.progression_level;
        theme.questions_total = (theme.questions_total - last.questions_answered).max(0);
        theme.questions_correct = (theme.questions_correct - last.questions_correct).max(0);
        theme.retention_rate = accuracy_pct(theme.questions_total, theme.questions_correct);
        theme.difficulty_tier = previous.map(|e| e.result_tier).unwrap_or(DifficultyTier::Easy);
        theme.progression_level = (theme.progression_level - 1).max(0);
        theme.last_review_date = previous.map(|e| e.logged_on);
        theme.next_review_date = Some(today);

        let mut reopened = closed;
        reopened.scheduled_date = today;
        reopened.completed_date = None;
        reopened.session_accuracy = None;
        reopened.result_tier = None;

        let remove_pending_id = self.store.pending_record(theme_id)?.map(|r| r.id);

        self.store.commit_undo(&UndoCommit {
            theme: theme.clone(),
            expected_level,
            reopened_record: reopened,
            remove_pending_id,
            remove_log_id: last.id,
        })?;

        debug!("theme {theme_id}: review of {today} undone");
        Ok(theme)
    }

    /// Terminal operation: marks the theme mastered and parks its next
    /// review far in the future. Not a review -- no log entry, no counter
    /// changes, and it cannot be undone.
    pub fn master_theme(&mut self, theme_id: i64, completion_date: NaiveDate) -> Result<Theme> {
        let mut theme = self.require_theme(theme_id)?;

        let expected_level = theme.progression_level;
        theme.difficulty_tier = DifficultyTier::Easy;
        theme.progression_level = theme.progression_level.max(5);
        theme.last_review_date = Some(completion_date);
        let next = completion_date + chrono::Duration::days(schedule::MASTERY_INTERVAL_DAYS);
        theme.next_review_date = Some(next);
        theme.status = ThemeStatus::Mastered;

        let pending_id = self.store.pending_record(theme_id)?.map(|r| r.id);
        self.store.commit_mastery(&MasteryCommit {
            theme: theme.clone(),
            expected_level,
            pending_id,
            scheduled_date: next,
        })?;

        debug!("theme {theme_id}: mastered, parked until {next}");
        Ok(theme)
    }

    /// Themes due on or before `as_of`, overdue first, then ascending due
    /// date, harder tiers before easier ones on the same date, theme id
    /// as the final tiebreak. Overdue themes stay visible indefinitely.
    pub fn list_due(&self, as_of: NaiveDate) -> Result<Vec<Theme>> {
        let mut due = self.store.due_on_or_before(as_of)?;
        sort_due(&mut due, as_of);
        Ok(due)
    }

    /// Themes due on exactly `date` (e.g. a "tomorrow" preview).
    pub fn list_due_exactly(&self, date: NaiveDate) -> Result<Vec<Theme>> {
        let mut due = self.store.due_exactly(date)?;
        sort_due(&mut due, date);
        Ok(due)
    }

    pub fn estimate_daily_load(
        &self,
        as_of: NaiveDate,
        weekly_available_days: i32,
    ) -> Result<LoadSignal> {
        let due = self.store.due_on_or_before(as_of)?;
        Ok(load::estimate(&due, weekly_available_days))
    }
}

fn check_mode(theme: &Theme, input: SessionInput) -> Result<()> {
    if input.mode() != theme.study_mode {
        return Err(SrsError::Validation(format!(
            "theme {} tracks {} sessions, got {}",
            theme.id,
            theme.study_mode.as_str(),
            input.mode().as_str()
        )));
    }
    Ok(())
}

fn sort_due(themes: &mut [Theme], as_of: NaiveDate) {
    themes.sort_by_key(|t| {
        (
            !t.is_overdue(as_of),
            t.next_review_date.unwrap_or(NaiveDate::MAX),
            -t.difficulty_tier.weight(),
            t.id,
        )
    });
}
