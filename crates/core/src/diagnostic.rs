//! Fixed texts and protocol definitions of the diagnostic interview.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hard upper bound on follow-up questions per topic.
pub const MAX_FOLLOWUPS_PER_TOPIC: usize = 2;

pub const INTRO: &str = "Before we start learning, let's find out what you already know. \
Answer each question in your own words. Short answers are fine, and it is okay to say you don't know.";

pub const DISCLAIMER: &str = "This is not a test and it is not graded. \
Answers are assessed automatically and may occasionally be misjudged; your teacher sees the summary.";

/// The question used when a topic has no stored first question, and for every
/// question of the stepwise protocol.
pub fn template_question(topic_title: &str) -> String {
    format!("What do you already know about \"{}\"?", topic_title)
}

/// The client protocol a session was started with. Fixed for the lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolVariant {
    /// All first questions up front, then one round of follow-ups.
    #[default]
    Batch,
    /// One templated question per topic, driven by a cursor.
    Stepwise,
}

impl ProtocolVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVariant::Batch => "batch",
            ProtocolVariant::Stepwise => "stepwise",
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown protocol variant '{0}'")]
pub struct InvalidProtocol(pub String);

impl FromStr for ProtocolVariant {
    type Err = InvalidProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "batch" => Ok(ProtocolVariant::Batch),
            "stepwise" => Ok(ProtocolVariant::Stepwise),
            _ => Err(InvalidProtocol(s.to_string())),
        }
    }
}

impl TryFrom<String> for ProtocolVariant {
    type Error = InvalidProtocol;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_question_mentions_topic() {
        assert_eq!(
            template_question("Fractions"),
            "What do you already know about \"Fractions\"?"
        );
    }

    #[test]
    fn test_protocol_variant_parsing() {
        assert_eq!("batch".parse::<ProtocolVariant>().unwrap(), ProtocolVariant::Batch);
        assert_eq!(
            "Stepwise".parse::<ProtocolVariant>().unwrap(),
            ProtocolVariant::Stepwise
        );
        assert!("legacy".parse::<ProtocolVariant>().is_err());
        assert_eq!(ProtocolVariant::default(), ProtocolVariant::Batch);
    }

    #[test]
    fn test_protocol_variant_serde() {
        assert_eq!(
            serde_json::to_string(&ProtocolVariant::Stepwise).unwrap(),
            "\"stepwise\""
        );
        let parsed: ProtocolVariant = serde_json::from_str("\"batch\"").unwrap();
        assert_eq!(parsed, ProtocolVariant::Batch);
    }
}
