use chrono::{Duration, NaiveDate};

use crate::models::DifficultyTier;

// Which interval table applies: the first schedule is computed at theme
// creation, every later one after a completed review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    First,
    Subsequent,
}

// Spaced repetition intervals in days, keyed by the tier of the most
// recent session. Once a tier's table is exhausted the last interval
// repeats (tiers plateau, they never run out).
const FIRST_EASY: &[i64] = &[7, 30, 90];
const FIRST_MEDIUM: &[i64] = &[3, 14, 45];
const FIRST_HARD: &[i64] = &[1, 7, 21];

const SUBSEQUENT_EASY: &[i64] = &[1, 7, 30, 90, 180];
const SUBSEQUENT_MEDIUM: &[i64] = &[1, 5, 15, 45, 90];
const SUBSEQUENT_HARD: &[i64] = &[1, 2, 5, 10, 10];

// Interval granted on explicit mastery
pub const MASTERY_INTERVAL_DAYS: i64 = 180;

fn table(kind: TableKind, tier: DifficultyTier) -> &'static [i64] {
    match (kind, tier) {
        (TableKind::First, DifficultyTier::Easy) => FIRST_EASY,
        (TableKind::First, DifficultyTier::Medium) => FIRST_MEDIUM,
        (TableKind::First, DifficultyTier::Hard) => FIRST_HARD,
        (TableKind::Subsequent, DifficultyTier::Easy) => SUBSEQUENT_EASY,
        (TableKind::Subsequent, DifficultyTier::Medium) => SUBSEQUENT_MEDIUM,
        (TableKind::Subsequent, DifficultyTier::Hard) => SUBSEQUENT_HARD,
    }
}

/// Interval in days for the progression level just reached (1-based),
/// clamped to the table's last entry.
pub fn interval_days(kind: TableKind, tier: DifficultyTier, level: i32) -> i64 {
    let t = table(kind, tier);
    let idx = (level.max(1) as usize - 1).min(t.len() - 1);
    t[idx]
}

/// Next due date from the calendar date of the study/review event.
///
/// Date-only arithmetic: the anchor is a plain calendar date and the
/// result is too. There is no floor to "tomorrow" -- a retroactive
/// anchor may produce a date that is already due.
pub fn next_date(
    anchor: NaiveDate,
    tier: DifficultyTier,
    level: i32,
    kind: TableKind,
) -> NaiveDate {
    anchor + Duration::days(interval_days(kind, tier, level))
}
