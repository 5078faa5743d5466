//! Roadmap Synthesizer
//!
//! Buckets the labeled answers of a diagnostic session into a three-part
//! curriculum proposal. Pure and cheap; recomputed on every read.

use crate::label::KnowledgeLabel;
use serde::{Deserialize, Serialize};

pub const BASICS: &str = "Basics";
pub const REVIEW: &str = "Review";
pub const ADVANCED: &str = "Advanced";

/// The minimal view of a recorded turn the synthesizer needs.
#[derive(Debug, Clone, Copy)]
pub struct LabeledTopic<'a> {
    pub topic_title: &'a str,
    pub label: KnowledgeLabel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCounts {
    #[serde(rename = "EXCELLENT")]
    pub excellent: usize,
    #[serde(rename = "REFRESH")]
    pub refresh: usize,
    #[serde(rename = "UNKNOWN")]
    pub unknown: usize,
}

impl LabelCounts {
    fn bump(&mut self, label: KnowledgeLabel) {
        match label {
            KnowledgeLabel::Excellent => self.excellent += 1,
            KnowledgeLabel::Refresh => self.refresh += 1,
            KnowledgeLabel::Unknown => self.unknown += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticSummary {
    pub total: usize,
    pub labels: LabelCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadmapSection {
    pub title: String,
    pub lessons: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedRoadmap {
    pub sections: Vec<RoadmapSection>,
}

pub fn advanced_lesson(topic_title: &str) -> String {
    format!("{} — advanced exercises", topic_title)
}

pub fn summarize<'a, I>(turns: I) -> DiagnosticSummary
where
    I: IntoIterator<Item = LabeledTopic<'a>>,
{
    let mut summary = DiagnosticSummary::default();
    for turn in turns {
        summary.total += 1;
        summary.labels.bump(turn.label);
    }
    summary
}

/// Builds the suggested roadmap. Sections come out in Basics, Review, Advanced
/// order; empty sections are omitted and each lesson appears once per section
/// in order of first appearance.
pub fn suggest_roadmap<'a, I>(turns: I) -> SuggestedRoadmap
where
    I: IntoIterator<Item = LabeledTopic<'a>>,
{
    let mut basics: Vec<String> = Vec::new();
    let mut review: Vec<String> = Vec::new();
    let mut advanced: Vec<String> = Vec::new();

    for turn in turns {
        let (bucket, lesson) = match turn.label {
            KnowledgeLabel::Unknown => (&mut basics, turn.topic_title.to_string()),
            KnowledgeLabel::Refresh => (&mut review, turn.topic_title.to_string()),
            KnowledgeLabel::Excellent => (&mut advanced, advanced_lesson(turn.topic_title)),
        };
        if !bucket.contains(&lesson) {
            bucket.push(lesson);
        }
    }

    let sections = [(BASICS, basics), (REVIEW, review), (ADVANCED, advanced)]
        .into_iter()
        .filter(|(_, lessons)| !lessons.is_empty())
        .map(|(title, lessons)| RoadmapSection {
            title: title.to_string(),
            lessons,
        })
        .collect();

    SuggestedRoadmap { sections }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn turn(title: &str, label: KnowledgeLabel) -> LabeledTopic<'_> {
        LabeledTopic {
            topic_title: title,
            label,
        }
    }

    #[test]
    fn test_empty_turns() {
        let summary = summarize(Vec::new());
        assert_eq!(summary.total, 0);
        assert_eq!(summary.labels, LabelCounts::default());
        assert!(suggest_roadmap(Vec::new()).sections.is_empty());
    }

    #[test]
    fn test_sections_are_ordered_and_decorated() {
        let turns = vec![
            turn("Percentages", KnowledgeLabel::Excellent),
            turn("Fractions", KnowledgeLabel::Unknown),
            turn("Decimals", KnowledgeLabel::Refresh),
        ];
        let roadmap = suggest_roadmap(turns.clone());

        let titles: Vec<&str> = roadmap.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec![BASICS, REVIEW, ADVANCED]);
        assert_eq!(roadmap.sections[0].lessons, vec!["Fractions"]);
        assert_eq!(roadmap.sections[1].lessons, vec!["Decimals"]);
        assert_eq!(
            roadmap.sections[2].lessons,
            vec!["Percentages — advanced exercises"]
        );

        let summary = summarize(turns);
        assert_eq!(summary.total, 3);
        assert_eq!(
            summary.labels,
            LabelCounts {
                excellent: 1,
                refresh: 1,
                unknown: 1
            }
        );
    }

    #[test]
    fn test_empty_buckets_are_omitted() {
        let roadmap = suggest_roadmap(vec![
            turn("Fractions", KnowledgeLabel::Unknown),
            turn("Decimals", KnowledgeLabel::Unknown),
        ]);
        assert_eq!(roadmap.sections.len(), 1);
        assert_eq!(roadmap.sections[0].title, BASICS);
        assert!(roadmap.sections.iter().all(|s| !s.lessons.is_empty()));
    }

    #[test]
    fn test_repeated_topic_is_listed_once_per_section() {
        // First answer plus two follow-ups for the same topic.
        let turns = vec![
            turn("Fractions", KnowledgeLabel::Unknown),
            turn("Fractions", KnowledgeLabel::Unknown),
            turn("Fractions", KnowledgeLabel::Refresh),
        ];
        let roadmap = suggest_roadmap(turns.clone());
        assert_eq!(roadmap.sections.len(), 2);
        assert_eq!(roadmap.sections[0].lessons, vec!["Fractions"]);
        assert_eq!(roadmap.sections[1].lessons, vec!["Fractions"]);
        assert_eq!(summarize(turns).total, 3);
    }

    #[test]
    fn test_lessons_cover_every_topic() {
        let turns = vec![
            turn("A", KnowledgeLabel::Excellent),
            turn("B", KnowledgeLabel::Refresh),
            turn("C", KnowledgeLabel::Unknown),
            turn("A", KnowledgeLabel::Excellent),
        ];
        let roadmap = suggest_roadmap(turns);
        let lessons: HashSet<String> = roadmap
            .sections
            .into_iter()
            .flat_map(|s| s.lessons)
            .collect();
        let expected: HashSet<String> = ["C".to_string(), "B".to_string(), advanced_lesson("A")]
            .into_iter()
            .collect();
        assert_eq!(lessons, expected);
    }

    #[test]
    fn test_summary_serializes_with_label_keys() {
        let summary = summarize(vec![turn("A", KnowledgeLabel::Refresh)]);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["labels"]["REFRESH"], 1);
        assert_eq!(json["labels"]["EXCELLENT"], 0);
        assert_eq!(json["labels"]["UNKNOWN"], 0);
    }
}
