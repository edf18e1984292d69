use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use revise::db::SqliteStore;
use revise::models::{JsonOutput, SelfEvaluation, SessionInput, StudyMode, Theme, ThemeStatus};
use revise::store::{Clock, NewTheme, SystemClock};
use revise::SrsEngine;

const DEFAULT_DB_NAME: &str = "revise.db";

#[derive(Parser)]
#[command(name = "revise")]
#[command(about = "A spaced-repetition revision scheduler")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage themes
    #[command(subcommand)]
    Theme(ThemeCommands),

    /// List themes due for revision
    Due {
        /// Query date (YYYY-MM-DD), default today
        #[arg(long)]
        on: Option<String>,

        /// Only themes due exactly on the query date
        #[arg(long)]
        exact: bool,
    },

    /// Log a completed revision for a theme
    Review {
        /// Theme ID
        id: i64,

        /// Questions answered this session
        #[arg(long, short = 't')]
        total: Option<i32>,

        /// Questions answered correctly
        #[arg(long, short = 'c')]
        correct: Option<i32>,

        /// Self-evaluation: confident/reasonable/needs-review
        #[arg(long, short)]
        rating: Option<String>,

        /// Completion date (YYYY-MM-DD), default today
        #[arg(long, short)]
        date: Option<String>,
    },

    /// Undo the most recent same-day revision of a theme
    Undo {
        /// Theme ID
        id: i64,
    },

    /// Mark a theme as mastered
    Master {
        /// Theme ID
        id: i64,

        /// Date of mastery (YYYY-MM-DD), default today
        #[arg(long, short)]
        date: Option<String>,
    },

    /// Estimate today's revision load against weekly availability
    Load {
        /// Study days available per week
        #[arg(long, short)]
        days: i32,

        /// Query date (YYYY-MM-DD), default today
        #[arg(long)]
        on: Option<String>,
    },

    /// Show revision statistics
    Stats,
}

#[derive(Subcommand)]
enum ThemeCommands {
    /// Add a theme and schedule its first revision
    Add {
        /// Theme name
        name: String,

        /// Specialty label
        #[arg(long, short)]
        specialty: Option<String>,

        /// Area label
        #[arg(long, short)]
        area: Option<String>,

        /// Study mode: questions/self
        #[arg(long, short, default_value = "questions")]
        mode: String,

        /// Questions answered in the first study session
        #[arg(long, short = 't')]
        total: Option<i32>,

        /// Questions answered correctly
        #[arg(long, short = 'c')]
        correct: Option<i32>,

        /// Self-evaluation: confident/reasonable/needs-review
        #[arg(long, short)]
        rating: Option<String>,

        /// Study date (YYYY-MM-DD), default today
        #[arg(long, short)]
        date: Option<String>,
    },

    /// List all themes
    List,

    /// Show theme details
    Show {
        /// Theme ID
        id: i64,
    },
}

fn get_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("REVISE_DB") {
        return PathBuf::from(path);
    }

    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("revise");

    std::fs::create_dir_all(&config_dir).ok();
    config_dir.join(DEFAULT_DB_NAME)
}

fn parse_date_arg(arg: Option<&str>, default: NaiveDate) -> Result<NaiveDate, String> {
    match arg {
        None => Ok(default),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| format!("Invalid date '{}'. Use YYYY-MM-DD", s)),
    }
}

fn parse_session_input(
    mode: StudyMode,
    total: Option<i32>,
    correct: Option<i32>,
    rating: Option<&str>,
) -> Result<SessionInput, String> {
    match mode {
        StudyMode::QuantitativeQuestions => match (total, correct) {
            (Some(total), Some(correct)) => Ok(SessionInput::Questions { total, correct }),
            _ => Err("Quantitative themes need --total and --correct".to_string()),
        },
        StudyMode::SelfEvaluation => {
            let raw = rating
                .ok_or_else(|| "Self-evaluation themes need --rating".to_string())?;
            let rating = SelfEvaluation::from_str(raw).ok_or_else(|| {
                format!(
                    "Invalid rating '{}'. Use: confident, reasonable, or needs-review",
                    raw
                )
            })?;
            Ok(SessionInput::SelfRated(rating))
        }
    }
}

fn print_theme_line(theme: &Theme, as_of: NaiveDate) {
    let due = theme
        .next_review_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());
    let flag = if theme.is_overdue(as_of) { " (overdue)" } else { "" };
    println!(
        "{:<5} {:<32} {:<8} {:<6} {}{}",
        theme.id,
        truncate(&theme.name, 30),
        theme.difficulty_tier.label(),
        format!("L{}", theme.progression_level),
        due,
        flag
    );
}

fn print_theme_details(theme: &Theme) {
    println!("Theme: {}", theme.name);
    println!("ID: {}", theme.id);
    if let Some(specialty) = &theme.specialty {
        println!("Specialty: {}", specialty);
    }
    if let Some(area) = &theme.area {
        println!("Area: {}", area);
    }
    println!("Mode: {}", theme.study_mode.as_str());
    println!("Status: {}", theme.status.as_str());
    println!(
        "Difficulty: {} (level {})",
        theme.difficulty_tier.label(),
        theme.progression_level
    );
    if theme.questions_total > 0 {
        println!(
            "Questions: {}/{} ({}% retention)",
            theme.questions_correct, theme.questions_total, theme.retention_rate
        );
    } else {
        println!("Retention: {}%", theme.retention_rate);
    }
    if let Some(last) = theme.last_review_date {
        println!("Last reviewed: {}", last);
    }
    if let Some(next) = theme.next_review_date {
        println!("Next review: {}", next);
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = get_db_path();
    let store = SqliteStore::open(&db_path)?;

    if let Commands::Init = cli.command {
        store.init()?;
        if cli.json {
            println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
        } else {
            println!("Database initialized at: {}", db_path.display());
        }
        return Ok(());
    }

    let clock = SystemClock;
    let today = clock.today();
    let mut engine = SrsEngine::new(store, clock);

    match cli.command {
        Commands::Init => unreachable!("handled above"),

        Commands::Theme(theme_cmd) => match theme_cmd {
            ThemeCommands::Add {
                name,
                specialty,
                area,
                mode,
                total,
                correct,
                rating,
                date,
            } => {
                let mode = StudyMode::from_str(&mode)
                    .ok_or_else(|| format!("Invalid mode '{}'. Use: questions or self", mode))?;
                let study_date = parse_date_arg(date.as_deref(), today)?;
                let input = parse_session_input(mode, total, correct, rating.as_deref())?;

                let theme = engine.add_theme(
                    &NewTheme {
                        name,
                        specialty,
                        area,
                        study_mode: mode,
                    },
                    study_date,
                    input,
                )?;

                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&theme))?);
                } else {
                    println!("Added theme '{}' with ID: {}", theme.name, theme.id);
                    if let Some(next) = theme.next_review_date {
                        println!(
                            "Classified {} -- next review: {}",
                            theme.difficulty_tier.label(),
                            next
                        );
                    }
                }
            }

            ThemeCommands::List => {
                let themes = engine.all_themes()?;
                if cli.json {
                    println!("{}", serde_json::to_string(&JsonOutput::ok(&themes))?);
                } else if themes.is_empty() {
                    println!("No themes found.");
                } else {
                    println!("{:<5} {:<32} {:<8} {:<6} NEXT REVIEW", "ID", "NAME", "TIER", "LVL");
                    println!("{}", "-".repeat(70));
                    for theme in themes {
                        print_theme_line(&theme, today);
                    }
                }
            }

            ThemeCommands::Show { id } => {
                if let Some(theme) = engine.theme(id)? {
                    if cli.json {
                        println!("{}", serde_json::to_string(&JsonOutput::ok(&theme))?);
                    } else {
                        print_theme_details(&theme);
                    }
                } else if cli.json {
                    println!(
                        "{}",
                        serde_json::to_string(&JsonOutput::<()>::err("Theme not found"))?
                    );
                } else {
                    println!("Theme not found.");
                }
            }
        },

        Commands::Due { on, exact } => {
            let as_of = parse_date_arg(on.as_deref(), today)?;
            let themes = if exact {
                engine.list_due_exactly(as_of)?
            } else {
                engine.list_due(as_of)?
            };

            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&themes))?);
            } else if themes.is_empty() {
                println!("Nothing due on {}.", as_of);
            } else {
                println!("{:<5} {:<32} {:<8} {:<6} DUE", "ID", "NAME", "TIER", "LVL");
                println!("{}", "-".repeat(70));
                for theme in &themes {
                    print_theme_line(theme, as_of);
                }
            }
        }

        Commands::Review {
            id,
            total,
            correct,
            rating,
            date,
        } => {
            let theme = engine.theme(id)?.ok_or("Theme not found")?;
            let completion_date = parse_date_arg(date.as_deref(), today)?;
            let input =
                parse_session_input(theme.study_mode, total, correct, rating.as_deref())?;

            let updated = engine.complete_review(id, completion_date, input)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&updated))?);
            } else {
                println!("Review recorded for theme {}.", id);
                println!(
                    "Classified {} -- level {}, retention {}%",
                    updated.difficulty_tier.label(),
                    updated.progression_level,
                    updated.retention_rate
                );
                if let Some(next) = updated.next_review_date {
                    println!("Next review scheduled: {}", next);
                }
            }
        }

        Commands::Undo { id } => {
            let restored = engine.undo_last_review(id)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&restored))?);
            } else {
                println!("Last review undone for theme {}.", id);
                println!(
                    "Back to {} at level {}; due again today.",
                    restored.difficulty_tier.label(),
                    restored.progression_level
                );
            }
        }

        Commands::Master { id, date } => {
            let mastery_date = parse_date_arg(date.as_deref(), today)?;
            let mastered = engine.master_theme(id, mastery_date)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&mastered))?);
            } else {
                println!("Theme {} marked as mastered.", id);
                if let Some(next) = mastered.next_review_date {
                    println!("Next check-in: {}", next);
                }
            }
        }

        Commands::Load { days, on } => {
            let as_of = parse_date_arg(on.as_deref(), today)?;
            let signal = engine.estimate_daily_load(as_of, days)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&signal))?);
            } else {
                println!("=== Daily Load ({}) ===", as_of);
                println!("Weight: {} / capacity {}", signal.weight, signal.capacity);
                println!("Usage: {}%", signal.percentage);
                println!("Load: {}", signal.label.as_str());
            }
        }

        Commands::Stats => {
            let themes = engine.all_themes()?;
            let total = themes.len();
            let mastered = themes
                .iter()
                .filter(|t| t.status == ThemeStatus::Mastered)
                .count();
            let due_now = engine.list_due(today)?.len();
            let avg_retention = if total > 0 {
                themes.iter().map(|t| t.retention_rate as f64).sum::<f64>() / total as f64
            } else {
                0.0
            };

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "total_themes": total,
                        "mastered": mastered,
                        "due_now": due_now,
                        "avg_retention": avg_retention
                    })))?
                );
            } else {
                println!("=== Revision Statistics ===");
                println!("Total themes: {}", total);
                println!("Mastered: {}", mastered);
                println!("Due for revision: {}", due_now);
                println!("Average retention: {:.0}%", avg_retention);
            }
        }
    }

    Ok(())
}

// Cuts on character boundaries so multi-byte names never panic the
// display path
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod parse_session_input_tests {
        use super::*;

        #[test]
        fn quantitative_requires_both_counts() {
            assert!(parse_session_input(
                StudyMode::QuantitativeQuestions,
                Some(10),
                Some(8),
                None
            )
            .is_ok());
            assert!(
                parse_session_input(StudyMode::QuantitativeQuestions, Some(10), None, None)
                    .is_err()
            );
            assert!(
                parse_session_input(StudyMode::QuantitativeQuestions, None, Some(8), None)
                    .is_err()
            );
        }

        #[test]
        fn self_evaluation_requires_rating() {
            let input =
                parse_session_input(StudyMode::SelfEvaluation, None, None, Some("confident"))
                    .unwrap();
            assert_eq!(input, SessionInput::SelfRated(SelfEvaluation::Confident));

            // Absence of a selection is an error, never a default
            assert!(parse_session_input(StudyMode::SelfEvaluation, None, None, None).is_err());
            assert!(
                parse_session_input(StudyMode::SelfEvaluation, None, None, Some("fine")).is_err()
            );
        }
    }

    mod parse_date_tests {
        use super::*;

        fn default_day() -> NaiveDate {
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        }

        #[test]
        fn missing_arg_uses_default() {
            assert_eq!(parse_date_arg(None, default_day()).unwrap(), default_day());
        }

        #[test]
        fn valid_iso_date() {
            assert_eq!(
                parse_date_arg(Some("2024-03-15"), default_day()).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
            );
        }

        #[test]
        fn rejects_non_iso_formats() {
            assert!(parse_date_arg(Some("15/03/2024"), default_day()).is_err());
            assert!(parse_date_arg(Some("yesterday"), default_day()).is_err());
            assert!(parse_date_arg(Some(""), default_day()).is_err());
        }
    }

    mod truncate_tests {
        use super::*;

        #[test]
        fn truncate_short_string() {
            assert_eq!(truncate("hello", 10), "hello");
        }

        #[test]
        fn truncate_long_string() {
            assert_eq!(truncate("hello world", 8), "hello...");
        }

        #[test]
        fn truncate_cuts_multibyte_names_on_char_boundaries() {
            assert_eq!(truncate("néphrologie pédiatrique", 8), "néphr...");
            assert_eq!(truncate("ééééé", 10), "ééééé");
        }
    }

    mod cli_parsing_tests {
        use super::*;

        #[test]
        fn parse_init_command() {
            let cli = Cli::try_parse_from(["revise", "init"]).unwrap();
            assert!(!cli.json);
            assert!(matches!(cli.command, Commands::Init));
        }

        #[test]
        fn parse_theme_add_quantitative() {
            let cli = Cli::try_parse_from([
                "revise", "theme", "add", "Cardiology", "--total", "10", "--correct", "8",
            ])
            .unwrap();
            match cli.command {
                Commands::Theme(ThemeCommands::Add {
                    name,
                    mode,
                    total,
                    correct,
                    rating,
                    ..
                }) => {
                    assert_eq!(name, "Cardiology");
                    assert_eq!(mode, "questions");
                    assert_eq!(total, Some(10));
                    assert_eq!(correct, Some(8));
                    assert!(rating.is_none());
                }
                _ => panic!("Expected Theme Add command"),
            }
        }

        #[test]
        fn parse_theme_add_self_evaluation() {
            let cli = Cli::try_parse_from([
                "revise",
                "theme",
                "add",
                "Anatomy",
                "--mode",
                "self",
                "--rating",
                "reasonable",
                "--date",
                "2024-01-01",
            ])
            .unwrap();
            match cli.command {
                Commands::Theme(ThemeCommands::Add {
                    mode, rating, date, ..
                }) => {
                    assert_eq!(mode, "self");
                    assert_eq!(rating, Some("reasonable".to_string()));
                    assert_eq!(date, Some("2024-01-01".to_string()));
                }
                _ => panic!("Expected Theme Add command"),
            }
        }

        #[test]
        fn parse_due_with_flags() {
            let cli =
                Cli::try_parse_from(["revise", "due", "--on", "2024-01-08", "--exact"]).unwrap();
            match cli.command {
                Commands::Due { on, exact } => {
                    assert_eq!(on, Some("2024-01-08".to_string()));
                    assert!(exact);
                }
                _ => panic!("Expected Due command"),
            }
        }

        #[test]
        fn parse_review_command() {
            let cli = Cli::try_parse_from([
                "revise", "review", "7", "--total", "5", "--correct", "2",
            ])
            .unwrap();
            match cli.command {
                Commands::Review {
                    id, total, correct, ..
                } => {
                    assert_eq!(id, 7);
                    assert_eq!(total, Some(5));
                    assert_eq!(correct, Some(2));
                }
                _ => panic!("Expected Review command"),
            }
        }

        #[test]
        fn parse_undo_and_master() {
            let cli = Cli::try_parse_from(["revise", "undo", "3"]).unwrap();
            assert!(matches!(cli.command, Commands::Undo { id: 3 }));

            let cli =
                Cli::try_parse_from(["revise", "master", "4", "--date", "2024-01-08"]).unwrap();
            match cli.command {
                Commands::Master { id, date } => {
                    assert_eq!(id, 4);
                    assert_eq!(date, Some("2024-01-08".to_string()));
                }
                _ => panic!("Expected Master command"),
            }
        }

        #[test]
        fn parse_load_command() {
            let cli = Cli::try_parse_from(["revise", "load", "--days", "5"]).unwrap();
            match cli.command {
                Commands::Load { days, on } => {
                    assert_eq!(days, 5);
                    assert!(on.is_none());
                }
                _ => panic!("Expected Load command"),
            }
        }

        #[test]
        fn parse_json_flag_global() {
            let cli = Cli::try_parse_from(["revise", "--json", "stats"]).unwrap();
            assert!(cli.json);

            let cli = Cli::try_parse_from(["revise", "stats", "--json"]).unwrap();
            assert!(cli.json);
        }

        #[test]
        fn parse_missing_required_arg_fails() {
            assert!(Cli::try_parse_from(["revise", "theme", "add"]).is_err());
            assert!(Cli::try_parse_from(["revise", "review"]).is_err());
            assert!(Cli::try_parse_from(["revise", "load"]).is_err());
        }
    }
}
