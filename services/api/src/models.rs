//! API and Database Models
//!
//! This module defines the core data structures used for both database mapping
//! with `sqlx` and for generating OpenAPI documentation with `utoipa`.

use chrono::{DateTime, Utc};
use mentor_core::{
    diagnostic::ProtocolVariant,
    label::KnowledgeLabel,
    roadmap::{DiagnosticSummary, SuggestedRoadmap},
    topic::TopicDraft,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(sqlx::Type, Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "diagnostic_status", rename_all = "lowercase")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Finished,
}

/// The role a caller acts in. Carried by the `x-user-role` header.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::Teacher => write!(f, "teacher"),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LearningGoal {
    pub id: Uuid,
    pub teacher_id: String,
    pub student_id: String,
    pub title: String,
    pub description: Option<String>,
    pub language: String,
    /// Legacy lesson content; topics are backfilled from it when none exist.
    pub diagnostic_lesson: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub position: i32,
    pub title: String,
    pub description: Option<String>,
    pub first_question: Option<String>,
    pub example_answer: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticSession {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub student_id: String,
    #[schema(value_type = String, example = "ACTIVE")]
    pub status: SessionStatus,
    #[sqlx(try_from = "String")]
    #[schema(value_type = String, example = "batch")]
    pub protocol: ProtocolVariant,
    /// Cursor of the stepwise protocol. Unused by batch sessions.
    pub current_idx: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DiagnosticSession {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticTurn {
    pub id: i64,
    pub session_id: Uuid,
    pub topic_id: Uuid,
    /// The topic title as it was when the question was answered.
    pub topic_title: String,
    pub question_text: String,
    pub student_answer: String,
    #[sqlx(try_from = "String")]
    #[schema(value_type = String, example = "REFRESH")]
    pub ai_label: KnowledgeLabel,
    pub created_at: DateTime<Utc>,
}

/// A learning goal about to be stored.
#[derive(Debug, Clone)]
pub struct NewGoal {
    pub teacher_id: String,
    pub student_id: String,
    pub title: String,
    pub description: Option<String>,
    pub language: String,
    pub diagnostic_lesson: Option<String>,
}

/// A turn that has been classified but not stored yet.
#[derive(Debug, Clone)]
pub struct NewTurn {
    pub topic_id: Uuid,
    pub topic_title: String,
    pub question_text: String,
    pub student_answer: String,
    pub ai_label: KnowledgeLabel,
}

// --- Request payloads ---

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateGoalPayload {
    #[schema(example = "student-42")]
    pub student_id: String,
    #[schema(example = "Fractions and decimals")]
    pub title: String,
    pub description: Option<String>,
    #[schema(example = "en")]
    pub language: Option<String>,
    pub diagnostic_lesson: Option<String>,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct CreateTopicsPayload {
    #[schema(value_type = Vec<Object>)]
    pub topics: Vec<TopicDraft>,
}

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StartDiagnosticPayload {
    pub goal_id: Uuid,
    /// `batch` (default) or `stepwise`. Ignored when an active session is resumed.
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "batch")]
    pub protocol: Option<ProtocolVariant>,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct AnswerPayload {
    #[schema(example = "A half is one of two equal parts.")]
    pub answer: String,
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FirstAnswer {
    pub topic_id: Uuid,
    pub answer: String,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct FirstAnswersPayload {
    pub answers: Vec<FirstAnswer>,
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: String,
}

#[derive(Deserialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FollowupItem {
    pub topic_id: Uuid,
    #[serde(default)]
    pub qa: Vec<QuestionAnswer>,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct FollowupAnswersPayload {
    #[serde(default)]
    pub items: Vec<FollowupItem>,
}

#[derive(Deserialize, ToSchema, Debug, Default)]
pub struct GenerateTopicsPayload {
    #[schema(example = 6)]
    pub count: Option<usize>,
}

// --- Response bodies ---

/// The envelope every successful response is wrapped in.
#[derive(Serialize, ToSchema, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    /// Debug detail of an internal error. Never present in production.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitialQuestion {
    pub topic_id: Uuid,
    pub title: String,
    pub first_question: String,
}

#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StartDiagnosticResponse {
    pub session_id: Uuid,
    pub intro: String,
    pub disclaimer: String,
    #[schema(value_type = String, example = "batch")]
    pub protocol: ProtocolVariant,
    pub total_topics: usize,
    pub initial_questions: Vec<InitialQuestion>,
}

#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetails {
    pub session: DiagnosticSession,
    pub total_topics: usize,
}

#[derive(Serialize, ToSchema, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NextQuestion {
    pub topic_id: Uuid,
    pub question: String,
    pub index: usize,
    pub total: usize,
}

#[derive(Serialize, ToSchema, Debug, PartialEq)]
pub struct DiagnosticDone {
    pub done: bool,
}

#[derive(Serialize, ToSchema, Debug, PartialEq)]
#[serde(untagged)]
pub enum NextStep {
    Question(NextQuestion),
    Done(DiagnosticDone),
}

#[derive(Serialize, ToSchema, Debug)]
pub struct TurnResponse {
    pub turn: DiagnosticTurn,
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TopicFollowups {
    pub topic_id: Uuid,
    pub questions: Vec<String>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct FollowupsResponse {
    pub followups: Vec<TopicFollowups>,
}

#[derive(Serialize, ToSchema, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FinishResponse {
    pub finished: bool,
    #[schema(value_type = Object)]
    pub summary: DiagnosticSummary,
    #[schema(value_type = Object)]
    pub suggested_roadmap: SuggestedRoadmap,
}

#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LatestSummaryResponse {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub summary: Option<DiagnosticSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub suggested_roadmap: Option<SuggestedRoadmap>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct GeneratedTopicsResponse {
    #[schema(value_type = Vec<Object>)]
    pub topics: Vec<TopicDraft>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct TopicsResponse {
    pub topics: Vec<Topic>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mentor_core::roadmap::{LabeledTopic, suggest_roadmap, summarize};
    use serde_json::json;

    #[test]
    fn test_session_status_serialization() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Active).unwrap(),
            "\"ACTIVE\""
        );
        assert_eq!(
            serde_json::to_string(&SessionStatus::Finished).unwrap(),
            "\"FINISHED\""
        );
        let parsed: SessionStatus = serde_json::from_str("\"FINISHED\"").unwrap();
        assert_eq!(parsed, SessionStatus::Finished);
        assert!(serde_json::from_str::<SessionStatus>("\"Ended\"").is_err());
    }

    #[test]
    fn test_role_deserialization_and_display() {
        let role: Role = serde_json::from_str("\"teacher\"").unwrap();
        assert_eq!(role, Role::Teacher);
        assert_eq!(format!("{}", Role::Student), "student");
    }

    #[test]
    fn test_start_payload_defaults_protocol() {
        let payload: StartDiagnosticPayload = serde_json::from_str(
            r#"{"goalId": "550e8400-e29b-41d4-a716-446655440000", "forceNew": true}"#,
        )
        .unwrap();
        assert_eq!(payload.protocol, None);

        let payload: StartDiagnosticPayload = serde_json::from_str(
            r#"{"goalId": "550e8400-e29b-41d4-a716-446655440000", "protocol": "stepwise"}"#,
        )
        .unwrap();
        assert_eq!(payload.protocol, Some(ProtocolVariant::Stepwise));
    }

    #[test]
    fn test_start_payload_missing_goal() {
        let result: Result<StartDiagnosticPayload, _> = serde_json::from_str("{}");
        assert!(result.is_err());
    }

    #[test]
    fn test_followup_payload_accepts_empty_items() {
        let payload: FollowupAnswersPayload = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert!(payload.items.is_empty());
        let payload: FollowupAnswersPayload = serde_json::from_str("{}").unwrap();
        assert!(payload.items.is_empty());
    }

    #[test]
    fn test_followup_payload_shape() {
        let payload: FollowupAnswersPayload = serde_json::from_value(json!({
            "items": [{
                "topicId": "550e8400-e29b-41d4-a716-446655440000",
                "qa": [{"question": "Why?", "answer": "Because."}]
            }]
        }))
        .unwrap();
        assert_eq!(payload.items[0].qa[0].answer, "Because.");
    }

    #[test]
    fn test_next_step_is_untagged() {
        let done = serde_json::to_value(NextStep::Done(DiagnosticDone { done: true })).unwrap();
        assert_eq!(done, json!({"done": true}));

        let topic_id = Uuid::new_v4();
        let question = serde_json::to_value(NextStep::Question(NextQuestion {
            topic_id,
            question: "Q?".to_string(),
            index: 0,
            total: 2,
        }))
        .unwrap();
        assert_eq!(question["topicId"], json!(topic_id));
        assert_eq!(question["total"], 2);
    }

    #[test]
    fn test_finish_response_uses_camel_case() {
        let turns = [LabeledTopic {
            topic_title: "Fractions",
            label: KnowledgeLabel::Unknown,
        }];
        let response = FinishResponse {
            finished: true,
            summary: summarize(turns),
            suggested_roadmap: suggest_roadmap(turns),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["finished"], true);
        assert_eq!(json["summary"]["labels"]["UNKNOWN"], 1);
        assert_eq!(
            json["suggestedRoadmap"]["sections"][0]["lessons"][0],
            "Fractions"
        );
    }

    #[test]
    fn test_latest_summary_omits_absent_fields() {
        let response = LatestSummaryResponse {
            exists: false,
            session_id: None,
            summary: None,
            suggested_roadmap: None,
        };
        assert_eq!(serde_json::to_value(&response).unwrap(), json!({"exists": false}));
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            success: false,
            message: "Session not found".to_string(),
            detail: None,
        };
        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, r#"{"success":false,"message":"Session not found"}"#);
    }

    #[test]
    fn test_turn_serialization() {
        let turn = DiagnosticTurn {
            id: 7,
            session_id: Uuid::new_v4(),
            topic_id: Uuid::new_v4(),
            topic_title: "Decimals".to_string(),
            question_text: "What is 0.5?".to_string(),
            student_answer: "Half".to_string(),
            ai_label: KnowledgeLabel::Refresh,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["aiLabel"], "REFRESH");
        assert_eq!(json["questionText"], "What is 0.5?");
    }
}
