//! Topic extraction from a stored diagnostic lesson.
//!
//! Goals created before topics existed carry their diagnostic material as one
//! content blob. When a session starts on such a goal, topics are backfilled
//! from that blob. Two shapes are understood:
//!
//! - JSON: an array of topic objects, or an object with a `topics` array.
//! - Markdown/plain text: every heading or list item is a topic title, and the
//!   first following line ending in `?` becomes its first question.

use crate::topic::TopicDraft;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum LessonJson {
    List(Vec<TopicDraft>),
    Wrapped { topics: Vec<TopicDraft> },
}

pub fn extract_topics(content: &str) -> Vec<TopicDraft> {
    let content = content.trim();
    if content.is_empty() {
        return Vec::new();
    }

    let drafts = match serde_json::from_str::<LessonJson>(content) {
        Ok(LessonJson::List(topics)) | Ok(LessonJson::Wrapped { topics }) => topics,
        Err(_) => extract_from_text(content),
    };

    let mut seen = Vec::new();
    drafts
        .into_iter()
        .filter_map(TopicDraft::normalized)
        .filter(|draft| {
            let key = draft.title.to_lowercase();
            if seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        })
        .collect()
}

fn extract_from_text(content: &str) -> Vec<TopicDraft> {
    let mut drafts: Vec<TopicDraft> = Vec::new();

    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(title) = list_item_or_heading(line) {
            if title.ends_with('?') {
                if let Some(current) = drafts.last_mut() {
                    if current.first_question.is_none() {
                        current.first_question = Some(title.to_string());
                        continue;
                    }
                }
            }
            drafts.push(TopicDraft::new(title));
        } else if line.ends_with('?') {
            if let Some(current) = drafts.last_mut() {
                if current.first_question.is_none() {
                    current.first_question = Some(line.to_string());
                }
            }
        }
    }

    drafts
}

/// Strips heading markers (`#`), bullets (`-`, `*`) and numbering (`1.`, `2)`).
fn list_item_or_heading(line: &str) -> Option<&str> {
    let stripped = if line.starts_with('#') {
        line.trim_start_matches('#')
    } else if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        rest
    } else {
        let digits = line.chars().take_while(char::is_ascii_digit).count();
        if digits == 0 {
            return None;
        }
        line[digits..]
            .strip_prefix('.')
            .or_else(|| line[digits..].strip_prefix(')'))?
    };

    let title = stripped.trim();
    (!title.is_empty()).then_some(title)
}
