use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// Coarse difficulty classification driving interval selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DifficultyTier {
    Easy,
    Medium,
    Hard,
}

impl DifficultyTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyTier::Easy => "easy",
            DifficultyTier::Medium => "medium",
            DifficultyTier::Hard => "hard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "easy" | "e" => Some(DifficultyTier::Easy),
            "medium" | "m" => Some(DifficultyTier::Medium),
            "hard" | "h" => Some(DifficultyTier::Hard),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DifficultyTier::Easy => "Easy",
            DifficultyTier::Medium => "Medium",
            DifficultyTier::Hard => "Hard",
        }
    }

    // Weight used for due-list tiebreaks and daily load
    pub fn weight(&self) -> i32 {
        match self {
            DifficultyTier::Easy => 1,
            DifficultyTier::Medium => 2,
            DifficultyTier::Hard => 3,
        }
    }
}

// How performance is reported for a theme's sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudyMode {
    QuantitativeQuestions,
    SelfEvaluation,
}

impl StudyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyMode::QuantitativeQuestions => "questions",
            StudyMode::SelfEvaluation => "self",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "questions" | "quantitative" | "q" => Some(StudyMode::QuantitativeQuestions),
            "self" | "self_evaluation" | "self-evaluation" | "s" => Some(StudyMode::SelfEvaluation),
            _ => None,
        }
    }
}

// Self-evaluation ratings. Absence of a rating is a validation error,
// never a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelfEvaluation {
    Confident,
    Reasonable,
    NeedsReview,
}

impl SelfEvaluation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelfEvaluation::Confident => "confident",
            SelfEvaluation::Reasonable => "reasonable",
            SelfEvaluation::NeedsReview => "needs_review",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "confident" | "c" => Some(SelfEvaluation::Confident),
            "reasonable" | "r" => Some(SelfEvaluation::Reasonable),
            "needs_review" | "needs-review" | "needsreview" | "n" => {
                Some(SelfEvaluation::NeedsReview)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThemeStatus {
    Active,
    Mastered,
}

impl ThemeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeStatus::Active => "active",
            ThemeStatus::Mastered => "mastered",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(ThemeStatus::Active),
            "mastered" => Some(ThemeStatus::Mastered),
            _ => None,
        }
    }
}

// Performance input for one study/review session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionInput {
    Questions { total: i32, correct: i32 },
    SelfRated(SelfEvaluation),
}

impl SessionInput {
    pub fn mode(&self) -> StudyMode {
        match self {
            SessionInput::Questions { .. } => StudyMode::QuantitativeQuestions,
            SessionInput::SelfRated(_) => StudyMode::SelfEvaluation,
        }
    }

    // Counter deltas applied to the theme's cumulative totals.
    // Self-evaluation never accumulates question counts.
    pub fn counters(&self) -> (i32, i32) {
        match self {
            SessionInput::Questions { total, correct } => (*total, *correct),
            SessionInput::SelfRated(_) => (0, 0),
        }
    }
}

// A trackable unit of study
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub id: i64,
    pub name: String,
    pub specialty: Option<String>,
    pub area: Option<String>,
    pub difficulty_tier: DifficultyTier,
    pub progression_level: i32,
    pub questions_total: i32,
    pub questions_correct: i32,
    pub retention_rate: i32,
    pub last_review_date: Option<NaiveDate>,
    pub next_review_date: Option<NaiveDate>,
    pub study_mode: StudyMode,
    pub status: ThemeStatus,
}

impl Theme {
    pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
        matches!(self.next_review_date, Some(d) if d < as_of)
    }
}

// One scheduled-or-completed revision event for a theme
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: i64,
    pub theme_id: i64,
    pub scheduled_date: NaiveDate,
    pub completed_date: Option<NaiveDate>,
    pub session_accuracy: Option<i32>,
    pub result_tier: Option<DifficultyTier>,
}

impl ReviewRecord {
    pub fn is_pending(&self) -> bool {
        self.completed_date.is_none()
    }
}

// Immutable audit record of a completed session's raw inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewLogEntry {
    pub id: i64,
    pub theme_id: i64,
    pub questions_answered: i32,
    pub questions_correct: i32,
    pub result_tier: DifficultyTier,
    pub logged_on: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadLabel {
    None,
    Low,
    Medium,
    High,
}

impl LoadLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadLabel::None => "none",
            LoadLabel::Low => "low",
            LoadLabel::Medium => "medium",
            LoadLabel::High => "high",
        }
    }
}

// Capacity-relative signal for how heavy today's due list is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSignal {
    pub weight: i32,
    pub capacity: i32,
    pub percentage: i32,
    pub label: LoadLabel,
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
