use crate::models::{LoadLabel, LoadSignal, Theme};

/// Aggregates the due list into a capacity-relative load signal.
/// Read-only; the caller supplies the themes already known to be due.
pub fn estimate(due_themes: &[Theme], weekly_available_days: i32) -> LoadSignal {
    let weight: i32 = due_themes
        .iter()
        .map(|t| t.difficulty_tier.weight())
        .sum();
    let capacity = weekly_available_days.max(0) * 3;

    let percentage = if capacity > 0 {
        ((weight as f64 / capacity as f64 * 100.0).round() as i32).min(100)
    } else if weight > 0 {
        100
    } else {
        0
    };

    let label = if weight == 0 {
        LoadLabel::None
    } else if weight < 4 {
        LoadLabel::Low
    } else if weight < 7 {
        LoadLabel::Medium
    } else {
        LoadLabel::High
    };

    LoadSignal {
        weight,
        capacity,
        percentage,
        label,
    }
}
