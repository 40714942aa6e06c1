//! Question categories, the generation prompt, and the generator seam.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone};
use serde::{Deserialize, Serialize};

/// The seven question categories, rotated by day of month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCategory {
    Memories,
    PreferencesAndValues,
    Hypothetical,
    WorldView,
    DreamsAndFuture,
    Love,
    LightHearted,
}

impl QuestionCategory {
    pub const ALL: [QuestionCategory; 7] = [
        Self::Memories,
        Self::PreferencesAndValues,
        Self::Hypothetical,
        Self::WorldView,
        Self::DreamsAndFuture,
        Self::Love,
        Self::LightHearted,
    ];

    /// Category for a day of the month: `day mod 7`.
    pub fn for_day(day_of_month: u32) -> Self {
        Self::ALL[(day_of_month % 7) as usize]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Catalogue line shown to the model, with an example question.
    pub fn description(self) -> &'static str {
        match self {
            Self::Memories => {
                "Memories and time together (e.g. What is the most unforgettable thing we have done together?)"
            }
            Self::PreferencesAndValues => {
                "Preferences and values (e.g. What is your favourite way to unwind?)"
            }
            Self::Hypothetical => {
                "Hypothetical scenarios (e.g. If we won a hundred million, how would you spend it?)"
            }
            Self::WorldView => {
                "Society and world view (e.g. What kind of life counts as a successful one to you?)"
            }
            Self::DreamsAndFuture => {
                "Dreams and the future (e.g. What new thing do you most want to try in the next five years?)"
            }
            Self::Love => {
                "Views on love and relationships (e.g. What do you think matters most between us?)"
            }
            Self::LightHearted => {
                "Light-hearted fun (e.g. If we were cartoon characters, which pair would we be?)"
            }
        }
    }
}

impl fmt::Display for QuestionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memories => write!(f, "memories"),
            Self::PreferencesAndValues => write!(f, "preferences_and_values"),
            Self::Hypothetical => write!(f, "hypothetical"),
            Self::WorldView => write!(f, "world_view"),
            Self::DreamsAndFuture => write!(f, "dreams_and_future"),
            Self::Love => write!(f, "love"),
            Self::LightHearted => write!(f, "light_hearted"),
        }
    }
}

/// Wording knobs for the generation prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptStyle {
    /// Language the question must be written in.
    pub language: String,
    /// Upper bound on question length, in characters.
    pub max_chars: usize,
}

impl Default for PromptStyle {
    fn default() -> Self {
        Self {
            language: "Traditional Chinese".to_string(),
            max_chars: 50,
        }
    }
}

/// Everything the generator needs for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionPrompt {
    pub month: u32,
    pub day: u32,
    pub category: QuestionCategory,
    /// Previously asked questions, oldest first.
    pub recent: Vec<String>,
    pub style: PromptStyle,
}

impl QuestionPrompt {
    /// Build the prompt for the local date of `now`.
    pub fn for_date<Tz: TimeZone>(
        now: &DateTime<Tz>,
        recent: Vec<String>,
        style: PromptStyle,
    ) -> Self {
        Self {
            month: now.month(),
            day: now.day(),
            category: QuestionCategory::for_day(now.day()),
            recent,
            style,
        }
    }

    /// Render the full instruction text sent to the model.
    pub fn render(&self) -> String {
        let index = self.category.index();
        let history = if self.recent.is_empty() {
            "None".to_string()
        } else {
            self.recent
                .iter()
                .map(|q| format!("- {q}"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let catalogue = QuestionCategory::ALL
            .iter()
            .map(|c| format!("{}. {}", c.index(), c.description()))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Today is {month}/{day}. The day of the month is {day}, so type_index = {index}.\n\n\
             These questions were asked before. Do not repeat them or ask anything too similar:\n\
             {history}\n\n\
             Using the category list below, pick category {index} and write one new question \
             that helps a couple get to know each other a little better every day. \
             Write it in {language}.\n\n\
             Categories:\n\
             {catalogue}\n\n\
             The question must be different from the usual ones (such as \"Did you have a special \
             dream as a child?\"), open-ended, suited to a couple, and at most {max_chars} characters long.\n\
             Output only the single question itself: no category name, explanation, label or alternatives.",
            month = self.month,
            day = self.day,
            language = self.style.language,
            max_chars = self.style.max_chars,
        )
    }
}

/// Error type for question generation
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Generator request failed: {0}")]
    Request(String),

    #[error("Generator returned an unusable response: {0}")]
    BadResponse(String),
}

/// Produces question text. An empty string counts as a failure.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(&self, prompt: &QuestionPrompt) -> Result<String, GenerationError>;
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, Utc};

    use super::*;

    #[test]
    fn test_category_rotates_by_day() {
        assert_eq!(QuestionCategory::for_day(7), QuestionCategory::Memories);
        assert_eq!(QuestionCategory::for_day(1), QuestionCategory::PreferencesAndValues);
        assert_eq!(QuestionCategory::for_day(13), QuestionCategory::LightHearted);
        assert_eq!(QuestionCategory::for_day(25), QuestionCategory::DreamsAndFuture);
        assert_eq!(QuestionCategory::for_day(31), QuestionCategory::WorldView);
    }

    #[test]
    fn test_category_uses_local_day() {
        // 2025-03-09 18:00 UTC is already 03-10 in UTC+8
        let utc = Utc.with_ymd_and_hms(2025, 3, 9, 18, 0, 0).unwrap();
        let local = utc.with_timezone(&FixedOffset::east_opt(8 * 3600).unwrap());

        let prompt = QuestionPrompt::for_date(&local, Vec::new(), PromptStyle::default());
        assert_eq!(prompt.day, 10);
        assert_eq!(prompt.category.index(), 3);
    }

    #[test]
    fn test_render_embeds_index_and_history() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let prompt = QuestionPrompt::for_date(
            &now,
            vec!["Old one?".into(), "Newer one?".into()],
            PromptStyle::default(),
        );
        let text = prompt.render();

        assert!(text.contains("type_index = 1"));
        assert!(text.contains("- Old one?\n- Newer one?"));
        assert!(text.contains("Traditional Chinese"));
        assert!(text.contains("6. Light-hearted fun"));
    }

    #[test]
    fn test_render_without_history() {
        let now = Utc.with_ymd_and_hms(2025, 6, 14, 12, 0, 0).unwrap();
        let text = QuestionPrompt::for_date(&now, Vec::new(), PromptStyle::default()).render();
        assert!(text.contains("too similar:\nNone"));
    }

    #[test]
    fn test_category_serde() {
        let json = serde_json::to_string(&QuestionCategory::WorldView).unwrap();
        assert_eq!(json, "\"world_view\"");
    }
}
