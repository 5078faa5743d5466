//! In-process implementation of the data access layer.
//!
//! Mirrors the guarantees of the PostgreSQL schema (one active session per
//! goal and student, one turn per answered question) behind a single lock.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use mentor_core::{diagnostic::ProtocolVariant, topic::TopicDraft};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::DiagnosticStore;
use crate::models::{
    DiagnosticSession, DiagnosticTurn, LearningGoal, NewGoal, NewTurn, SessionStatus, Topic,
};

#[derive(Default)]
struct Tables {
    goals: Vec<LearningGoal>,
    topics: Vec<Topic>,
    sessions: Vec<DiagnosticSession>,
    turns: Vec<DiagnosticTurn>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn topics_of(&self, goal_id: Uuid) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self
            .topics
            .iter()
            .filter(|t| t.goal_id == goal_id)
            .cloned()
            .collect();
        topics.sort_by_key(|t| (t.position, t.created_at));
        topics
    }

    fn append_topics(&mut self, goal_id: Uuid, drafts: &[TopicDraft]) -> Vec<Topic> {
        let next_position = self
            .topics
            .iter()
            .filter(|t| t.goal_id == goal_id)
            .map(|t| t.position + 1)
            .max()
            .unwrap_or(0);

        let created: Vec<Topic> = drafts
            .iter()
            .enumerate()
            .map(|(offset, draft)| Topic {
                id: Uuid::new_v4(),
                goal_id,
                position: next_position + offset as i32,
                title: draft.title.clone(),
                description: draft.description.clone(),
                first_question: draft.first_question.clone(),
                example_answer: draft.example_answer.clone(),
                created_at: Utc::now(),
            })
            .collect();
        self.topics.extend(created.iter().cloned());
        created
    }

    fn session_mut(&mut self, session_id: Uuid) -> Result<&mut DiagnosticSession> {
        self.sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .with_context(|| format!("Session {} does not exist", session_id))
    }
}

#[async_trait]
impl DiagnosticStore for MemoryStore {
    async fn create_goal(&self, goal: &NewGoal) -> Result<LearningGoal> {
        let goal = LearningGoal {
            id: Uuid::new_v4(),
            teacher_id: goal.teacher_id.clone(),
            student_id: goal.student_id.clone(),
            title: goal.title.clone(),
            description: goal.description.clone(),
            language: goal.language.clone(),
            diagnostic_lesson: goal.diagnostic_lesson.clone(),
            created_at: Utc::now(),
        };
        self.tables.write().await.goals.push(goal.clone());
        Ok(goal)
    }

    async fn get_goal(&self, goal_id: Uuid) -> Result<Option<LearningGoal>> {
        let tables = self.tables.read().await;
        Ok(tables.goals.iter().find(|g| g.id == goal_id).cloned())
    }

    async fn list_topics(&self, goal_id: Uuid) -> Result<Vec<Topic>> {
        Ok(self.tables.read().await.topics_of(goal_id))
    }

    async fn insert_topics(&self, goal_id: Uuid, drafts: &[TopicDraft]) -> Result<Vec<Topic>> {
        Ok(self.tables.write().await.append_topics(goal_id, drafts))
    }

    async fn insert_topics_if_none(
        &self,
        goal_id: Uuid,
        drafts: &[TopicDraft],
    ) -> Result<Vec<Topic>> {
        let mut tables = self.tables.write().await;
        if !tables.goals.iter().any(|g| g.id == goal_id) {
            anyhow::bail!("Goal {} does not exist", goal_id);
        }
        let existing = tables.topics_of(goal_id);
        if existing.is_empty() {
            Ok(tables.append_topics(goal_id, drafts))
        } else {
            Ok(existing)
        }
    }

    async fn create_or_resume_session(
        &self,
        goal_id: Uuid,
        student_id: &str,
        protocol: ProtocolVariant,
    ) -> Result<(DiagnosticSession, bool)> {
        let mut tables = self.tables.write().await;
        if let Some(active) = tables.sessions.iter().find(|s| {
            s.goal_id == goal_id && s.student_id == student_id && s.status == SessionStatus::Active
        }) {
            return Ok((active.clone(), false));
        }

        let now = Utc::now();
        let session = DiagnosticSession {
            id: Uuid::new_v4(),
            goal_id,
            student_id: student_id.to_string(),
            status: SessionStatus::Active,
            protocol,
            current_idx: 0,
            created_at: now,
            updated_at: now,
            finished_at: None,
        };
        tables.sessions.push(session.clone());
        Ok((session, true))
    }

    async fn get_session(
        &self,
        session_id: Uuid,
        student_id: &str,
    ) -> Result<Option<DiagnosticSession>> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .iter()
            .find(|s| s.id == session_id && s.student_id == student_id)
            .cloned())
    }

    async fn record_turns(
        &self,
        session_id: Uuid,
        turns: &[NewTurn],
    ) -> Result<Vec<DiagnosticTurn>> {
        let mut tables = self.tables.write().await;
        tables.session_mut(session_id)?;

        let mut stored = Vec::with_capacity(turns.len());
        for turn in turns {
            let existing = tables.turns.iter().find(|t| {
                t.session_id == session_id
                    && t.topic_id == turn.topic_id
                    && t.question_text == turn.question_text
            });
            let turn = match existing {
                Some(existing) => existing.clone(),
                None => {
                    let created = DiagnosticTurn {
                        id: tables.turns.len() as i64 + 1,
                        session_id,
                        topic_id: turn.topic_id,
                        topic_title: turn.topic_title.clone(),
                        question_text: turn.question_text.clone(),
                        student_answer: turn.student_answer.clone(),
                        ai_label: turn.ai_label,
                        created_at: Utc::now(),
                    };
                    tables.turns.push(created.clone());
                    created
                }
            };
            stored.push(turn);
        }
        Ok(stored)
    }

    async fn list_turns(&self, session_id: Uuid) -> Result<Vec<DiagnosticTurn>> {
        let tables = self.tables.read().await;
        Ok(tables
            .turns
            .iter()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn advance_cursor(&self, session_id: Uuid, limit: i32) -> Result<DiagnosticSession> {
        let mut tables = self.tables.write().await;
        let session = tables.session_mut(session_id)?;
        session.current_idx = (session.current_idx + 1).min(limit);
        session.updated_at = Utc::now();
        Ok(session.clone())
    }

    async fn finish_session(&self, session_id: Uuid) -> Result<(DiagnosticSession, bool)> {
        let mut tables = self.tables.write().await;
        let session = tables.session_mut(session_id)?;
        if session.status == SessionStatus::Finished {
            return Ok((session.clone(), false));
        }
        let now = Utc::now();
        session.status = SessionStatus::Finished;
        session.finished_at = Some(now);
        session.updated_at = now;
        Ok((session.clone(), true))
    }

    async fn latest_finished_session(&self, goal_id: Uuid) -> Result<Option<DiagnosticSession>> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .iter()
            .filter(|s| s.goal_id == goal_id && s.status == SessionStatus::Finished)
            .max_by_key(|s| (s.finished_at, s.created_at))
            .cloned())
    }
}
