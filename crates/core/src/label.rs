use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Answers longer than this (in characters) are treated as excellent by the heuristic.
pub const EXCELLENT_MIN_CHARS: usize = 200;
/// Answers longer than this (in characters) are treated as needing a refresh.
pub const REFRESH_MIN_CHARS: usize = 40;

/// The demonstrated mastery of a single answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KnowledgeLabel {
    Excellent,
    Refresh,
    Unknown,
}

impl KnowledgeLabel {
    pub const ALL: [KnowledgeLabel; 3] = [
        KnowledgeLabel::Excellent,
        KnowledgeLabel::Refresh,
        KnowledgeLabel::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KnowledgeLabel::Excellent => "EXCELLENT",
            KnowledgeLabel::Refresh => "REFRESH",
            KnowledgeLabel::Unknown => "UNKNOWN",
        }
    }

    /// Labels an answer purely by its length. Used whenever the model is unavailable.
    pub fn from_answer_length(answer: &str) -> Self {
        let len = answer.trim().chars().count();
        if len > EXCELLENT_MIN_CHARS {
            KnowledgeLabel::Excellent
        } else if len > REFRESH_MIN_CHARS {
            KnowledgeLabel::Refresh
        } else {
            KnowledgeLabel::Unknown
        }
    }

    /// Extracts a label from a free-form model reply.
    ///
    /// The reply is expected to be exactly one token, but models tend to add
    /// punctuation, quotes or a short sentence around it. The reply is usable
    /// only when exactly one distinct label word appears in it.
    pub fn from_model_reply(reply: &str) -> Option<Self> {
        let mut found = reply
            .split(|c: char| !c.is_ascii_alphabetic())
            .filter(|word| !word.is_empty())
            .filter_map(|word| word.parse::<Self>().ok());
        let label = found.next()?;
        found.all(|other| other == label).then_some(label)
    }
}

impl fmt::Display for KnowledgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("'{0}' is not a knowledge label")]
pub struct InvalidLabel(pub String);

impl FromStr for KnowledgeLabel {
    type Err = InvalidLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EXCELLENT" => Ok(KnowledgeLabel::Excellent),
            "REFRESH" => Ok(KnowledgeLabel::Refresh),
            "UNKNOWN" => Ok(KnowledgeLabel::Unknown),
            _ => Err(InvalidLabel(s.to_string())),
        }
    }
}

impl TryFrom<String> for KnowledgeLabel {
    type Error = InvalidLabel;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heuristic_thresholds() {
        assert_eq!(
            KnowledgeLabel::from_answer_length("I don't know"),
            KnowledgeLabel::Unknown
        );
        assert_eq!(
            KnowledgeLabel::from_answer_length(&"a".repeat(40)),
            KnowledgeLabel::Unknown
        );
        assert_eq!(
            KnowledgeLabel::from_answer_length(&"a".repeat(41)),
            KnowledgeLabel::Refresh
        );
        assert_eq!(
            KnowledgeLabel::from_answer_length(&"a".repeat(200)),
            KnowledgeLabel::Refresh
        );
        assert_eq!(
            KnowledgeLabel::from_answer_length(&"a".repeat(201)),
            KnowledgeLabel::Excellent
        );
    }

    #[test]
    fn test_heuristic_counts_characters_not_bytes() {
        // 30 two-byte characters: 60 bytes but only 30 chars.
        let answer = "é".repeat(30);
        assert_eq!(
            KnowledgeLabel::from_answer_length(&answer),
            KnowledgeLabel::Unknown
        );
    }

    #[test]
    fn test_short_scenario_answers_are_unknown() {
        assert_eq!(
            KnowledgeLabel::from_answer_length("I don't know"),
            KnowledgeLabel::Unknown
        );
        assert_eq!(
            KnowledgeLabel::from_answer_length("0.5 is half"),
            KnowledgeLabel::Unknown
        );
    }

    #[test]
    fn test_model_reply_parsing() {
        assert_eq!(
            KnowledgeLabel::from_model_reply("EXCELLENT"),
            Some(KnowledgeLabel::Excellent)
        );
        assert_eq!(
            KnowledgeLabel::from_model_reply("  \"refresh\".\n"),
            Some(KnowledgeLabel::Refresh)
        );
        assert_eq!(
            KnowledgeLabel::from_model_reply("Label: UNKNOWN"),
            Some(KnowledgeLabel::Unknown)
        );
        assert_eq!(
            KnowledgeLabel::from_model_reply("Refresh. The answer needs a refresh."),
            Some(KnowledgeLabel::Refresh)
        );
        assert_eq!(KnowledgeLabel::from_model_reply("great answer!"), None);
        assert_eq!(KnowledgeLabel::from_model_reply(""), None);
    }

    #[test]
    fn test_conflicting_labels_are_unusable() {
        assert_eq!(KnowledgeLabel::from_model_reply("Not EXCELLENT; REFRESH"), None);
        assert_eq!(
            KnowledgeLabel::from_model_reply("UNKNOWN or maybe REFRESH"),
            None
        );
    }

    #[test]
    fn test_serde_uses_uppercase_tokens() {
        let json = serde_json::to_string(&KnowledgeLabel::Refresh).unwrap();
        assert_eq!(json, "\"REFRESH\"");
        let parsed: KnowledgeLabel = serde_json::from_str("\"EXCELLENT\"").unwrap();
        assert_eq!(parsed, KnowledgeLabel::Excellent);
        assert!(serde_json::from_str::<KnowledgeLabel>("\"GOOD\"").is_err());
    }

    #[test]
    fn test_try_from_string() {
        assert_eq!(
            KnowledgeLabel::try_from("unknown".to_string()).unwrap(),
            KnowledgeLabel::Unknown
        );
        let err = KnowledgeLabel::try_from("maybe".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "'maybe' is not a knowledge label");
    }
}
