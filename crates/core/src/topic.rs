use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A topic proposal that has not been persisted yet.
///
/// Produced by a teacher, by the curriculum generator, or by extracting
/// topics from an existing diagnostic lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopicDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// A short diagnostic question probing the topic.
    #[serde(default, alias = "first_question", alias = "question")]
    pub first_question: Option<String>,
    /// What a good answer to the first question would look like.
    #[serde(default, alias = "example_answer")]
    pub example_answer: Option<String>,
}

impl TopicDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            first_question: None,
            example_answer: None,
        }
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.first_question = Some(question.into());
        self
    }

    /// Trims all fields, turns blank optionals into `None` and rejects a blank title.
    pub fn normalized(self) -> Option<Self> {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        let title = self.title.trim().to_string();
        if title.is_empty() {
            return None;
        }
        Some(Self {
            title,
            description: clean(self.description),
            first_question: clean(self.first_question),
            example_answer: clean(self.example_answer),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_trims_and_drops_blanks() {
        let draft = TopicDraft {
            title: "  Fractions ".to_string(),
            description: Some("   ".to_string()),
            first_question: Some(" What is 1/2? ".to_string()),
            example_answer: None,
        };
        let draft = draft.normalized().unwrap();
        assert_eq!(draft.title, "Fractions");
        assert_eq!(draft.description, None);
        assert_eq!(draft.first_question.as_deref(), Some("What is 1/2?"));
    }

    #[test]
    fn test_blank_title_is_rejected() {
        assert!(TopicDraft::new("  ").normalized().is_none());
    }

    #[test]
    fn test_accepts_snake_case_and_question_aliases() {
        let draft: TopicDraft =
            serde_json::from_str(r#"{"title": "Decimals", "first_question": "What is 0.5?"}"#)
                .unwrap();
        assert_eq!(draft.first_question.as_deref(), Some("What is 0.5?"));

        let draft: TopicDraft =
            serde_json::from_str(r#"{"title": "Decimals", "question": "What is 0.5?"}"#).unwrap();
        assert_eq!(draft.first_question.as_deref(), Some("What is 0.5?"));

        let json = serde_json::to_value(TopicDraft::new("X").with_question("Y?")).unwrap();
        assert_eq!(json["firstQuestion"], "Y?");
    }
}
