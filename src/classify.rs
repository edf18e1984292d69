use crate::error::{Result, SrsError};
use crate::models::{DifficultyTier, SelfEvaluation, SessionInput};

/// Maps one session's performance to a difficulty tier plus a 0-100
/// accuracy figure. Called identically at theme creation and at review
/// completion, with the same thresholds.
pub fn classify(input: SessionInput) -> Result<(DifficultyTier, i32)> {
    match input {
        SessionInput::Questions { total, correct } => {
            validate_counts(total, correct)?;
            let accuracy = accuracy_pct(total, correct);
            Ok((tier_for_accuracy(accuracy), accuracy))
        }
        SessionInput::SelfRated(rating) => Ok(match rating {
            SelfEvaluation::Confident => (DifficultyTier::Easy, 100),
            SelfEvaluation::Reasonable => (DifficultyTier::Medium, 70),
            SelfEvaluation::NeedsReview => (DifficultyTier::Hard, 30),
        }),
    }
}

pub fn validate_counts(total: i32, correct: i32) -> Result<()> {
    if total < 0 {
        return Err(SrsError::Validation(format!(
            "question total cannot be negative (got {total})"
        )));
    }
    if correct < 0 {
        return Err(SrsError::Validation(format!(
            "correct count cannot be negative (got {correct})"
        )));
    }
    if correct > total {
        return Err(SrsError::Validation(format!(
            "correct count {correct} exceeds question total {total}"
        )));
    }
    Ok(())
}

pub fn accuracy_pct(total: i32, correct: i32) -> i32 {
    if total > 0 {
        (correct as f64 / total as f64 * 100.0).round() as i32
    } else {
        0
    }
}

fn tier_for_accuracy(accuracy: i32) -> DifficultyTier {
    if accuracy >= 80 {
        DifficultyTier::Easy
    } else if accuracy >= 50 {
        DifficultyTier::Medium
    } else {
        DifficultyTier::Hard
    }
}
