//! PostgreSQL implementation of the data access layer.
//!
//! It uses `sqlx` for robust connection pooling. Queries are checked at
//! runtime so the crate builds without a live database.

use anyhow::{Context, Result};
use async_trait::async_trait;
use mentor_core::{diagnostic::ProtocolVariant, topic::TopicDraft};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::DiagnosticStore;
use crate::models::{
    DiagnosticSession, DiagnosticTurn, LearningGoal, NewGoal, NewTurn, SessionStatus, Topic,
};

const GOAL_COLUMNS: &str =
    "id, teacher_id, student_id, title, description, language, diagnostic_lesson, created_at";
const TOPIC_COLUMNS: &str =
    "id, goal_id, position, title, description, first_question, example_answer, created_at";
const SESSION_COLUMNS: &str =
    "id, goal_id, student_id, status, protocol, current_idx, created_at, updated_at, finished_at";
const TURN_COLUMNS: &str = "id, session_id, topic_id, topic_title, question_text, student_answer, ai_label, created_at";

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn find_active_session(
        &self,
        goal_id: Uuid,
        student_id: &str,
    ) -> Result<Option<DiagnosticSession>> {
        let session = sqlx::query_as::<_, DiagnosticSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM diagnostic_sessions
             WHERE goal_id = $1 AND student_id = $2 AND status = $3"
        ))
        .bind(goal_id)
        .bind(student_id)
        .bind(SessionStatus::Active)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn session_by_id(&self, session_id: Uuid) -> Result<DiagnosticSession> {
        let session = sqlx::query_as::<_, DiagnosticSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM diagnostic_sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(session)
    }
}

/// Inserts topics after the goal's existing positions, inside `tx`.
async fn append_topics(
    tx: &mut Transaction<'_, Postgres>,
    goal_id: Uuid,
    drafts: &[TopicDraft],
) -> Result<Vec<Topic>> {
    let (next_position,): (i32,) =
        sqlx::query_as("SELECT COALESCE(MAX(position) + 1, 0) FROM topics WHERE goal_id = $1")
            .bind(goal_id)
            .fetch_one(&mut **tx)
            .await?;

    let mut topics = Vec::with_capacity(drafts.len());
    for (offset, draft) in drafts.iter().enumerate() {
        let topic = sqlx::query_as::<_, Topic>(&format!(
            "INSERT INTO topics (goal_id, position, title, description, first_question, example_answer)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {TOPIC_COLUMNS}"
        ))
        .bind(goal_id)
        .bind(next_position + offset as i32)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(&draft.first_question)
        .bind(&draft.example_answer)
        .fetch_one(&mut **tx)
        .await?;
        topics.push(topic);
    }
    Ok(topics)
}

#[async_trait]
impl DiagnosticStore for Db {
    async fn create_goal(&self, goal: &NewGoal) -> Result<LearningGoal> {
        let goal = sqlx::query_as::<_, LearningGoal>(&format!(
            "INSERT INTO learning_goals (teacher_id, student_id, title, description, language, diagnostic_lesson)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {GOAL_COLUMNS}"
        ))
        .bind(&goal.teacher_id)
        .bind(&goal.student_id)
        .bind(&goal.title)
        .bind(&goal.description)
        .bind(&goal.language)
        .bind(&goal.diagnostic_lesson)
        .fetch_one(&self.pool)
        .await?;
        Ok(goal)
    }

    async fn get_goal(&self, goal_id: Uuid) -> Result<Option<LearningGoal>> {
        let goal = sqlx::query_as::<_, LearningGoal>(&format!(
            "SELECT {GOAL_COLUMNS} FROM learning_goals WHERE id = $1"
        ))
        .bind(goal_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(goal)
    }

    async fn list_topics(&self, goal_id: Uuid) -> Result<Vec<Topic>> {
        let topics = sqlx::query_as::<_, Topic>(&format!(
            "SELECT {TOPIC_COLUMNS} FROM topics WHERE goal_id = $1 ORDER BY position ASC, created_at ASC"
        ))
        .bind(goal_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(topics)
    }

    async fn insert_topics(&self, goal_id: Uuid, drafts: &[TopicDraft]) -> Result<Vec<Topic>> {
        let mut tx = self.pool.begin().await?;
        let topics = append_topics(&mut tx, goal_id, drafts).await?;
        tx.commit().await?;
        Ok(topics)
    }

    async fn insert_topics_if_none(
        &self,
        goal_id: Uuid,
        drafts: &[TopicDraft],
    ) -> Result<Vec<Topic>> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent backfills of the same goal.
        sqlx::query("SELECT id FROM learning_goals WHERE id = $1 FOR UPDATE")
            .bind(goal_id)
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("Goal {} does not exist", goal_id))?;

        let existing = sqlx::query_as::<_, Topic>(&format!(
            "SELECT {TOPIC_COLUMNS} FROM topics WHERE goal_id = $1 ORDER BY position ASC, created_at ASC"
        ))
        .bind(goal_id)
        .fetch_all(&mut *tx)
        .await?;

        let topics = if existing.is_empty() {
            append_topics(&mut tx, goal_id, drafts).await?
        } else {
            debug!(%goal_id, "Topics already present; skipping backfill");
            existing
        };

        tx.commit().await?;
        Ok(topics)
    }

    async fn create_or_resume_session(
        &self,
        goal_id: Uuid,
        student_id: &str,
        protocol: ProtocolVariant,
    ) -> Result<(DiagnosticSession, bool)> {
        if let Some(session) = self.find_active_session(goal_id, student_id).await? {
            return Ok((session, false));
        }

        // The partial unique index turns a concurrent duplicate into a no-op.
        let created = sqlx::query_as::<_, DiagnosticSession>(&format!(
            "INSERT INTO diagnostic_sessions (goal_id, student_id, protocol)
             VALUES ($1, $2, $3)
             ON CONFLICT DO NOTHING
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(goal_id)
        .bind(student_id)
        .bind(protocol.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match created {
            Some(session) => Ok((session, true)),
            None => {
                let session = self
                    .find_active_session(goal_id, student_id)
                    .await?
                    .context("Active session vanished after insert conflict")?;
                Ok((session, false))
            }
        }
    }

    async fn get_session(
        &self,
        session_id: Uuid,
        student_id: &str,
    ) -> Result<Option<DiagnosticSession>> {
        let session = sqlx::query_as::<_, DiagnosticSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM diagnostic_sessions WHERE id = $1 AND student_id = $2"
        ))
        .bind(session_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn record_turns(
        &self,
        session_id: Uuid,
        turns: &[NewTurn],
    ) -> Result<Vec<DiagnosticTurn>> {
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(turns.len());

        for turn in turns {
            let inserted = sqlx::query_as::<_, DiagnosticTurn>(&format!(
                "INSERT INTO diagnostic_turns (session_id, topic_id, topic_title, question_text, student_answer, ai_label)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (session_id, topic_id, question_text) DO NOTHING
                 RETURNING {TURN_COLUMNS}"
            ))
            .bind(session_id)
            .bind(turn.topic_id)
            .bind(&turn.topic_title)
            .bind(&turn.question_text)
            .bind(&turn.student_answer)
            .bind(turn.ai_label.as_str())
            .fetch_optional(&mut *tx)
            .await?;

            let turn = match inserted {
                Some(turn) => turn,
                None => {
                    debug!(%session_id, topic_id = %turn.topic_id, "Question already answered; keeping the first answer");
                    sqlx::query_as::<_, DiagnosticTurn>(&format!(
                        "SELECT {TURN_COLUMNS} FROM diagnostic_turns
                         WHERE session_id = $1 AND topic_id = $2 AND question_text = $3"
                    ))
                    .bind(session_id)
                    .bind(turn.topic_id)
                    .bind(&turn.question_text)
                    .fetch_one(&mut *tx)
                    .await?
                }
            };
            stored.push(turn);
        }

        tx.commit().await?;
        Ok(stored)
    }

    async fn list_turns(&self, session_id: Uuid) -> Result<Vec<DiagnosticTurn>> {
        let turns = sqlx::query_as::<_, DiagnosticTurn>(&format!(
            "SELECT {TURN_COLUMNS} FROM diagnostic_turns WHERE session_id = $1 ORDER BY id ASC"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(turns)
    }

    async fn advance_cursor(&self, session_id: Uuid, limit: i32) -> Result<DiagnosticSession> {
        let session = sqlx::query_as::<_, DiagnosticSession>(&format!(
            "UPDATE diagnostic_sessions
             SET current_idx = LEAST(current_idx + 1, $2), updated_at = now()
             WHERE id = $1
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session_id)
        .bind(limit)
        .fetch_one(&self.pool)
        .await?;
        Ok(session)
    }

    async fn finish_session(&self, session_id: Uuid) -> Result<(DiagnosticSession, bool)> {
        let finished = sqlx::query_as::<_, DiagnosticSession>(&format!(
            "UPDATE diagnostic_sessions
             SET status = $2, finished_at = now(), updated_at = now()
             WHERE id = $1 AND status = $3
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session_id)
        .bind(SessionStatus::Finished)
        .bind(SessionStatus::Active)
        .fetch_optional(&self.pool)
        .await?;

        match finished {
            Some(session) => Ok((session, true)),
            None => Ok((self.session_by_id(session_id).await?, false)),
        }
    }

    async fn latest_finished_session(&self, goal_id: Uuid) -> Result<Option<DiagnosticSession>> {
        let session = sqlx::query_as::<_, DiagnosticSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM diagnostic_sessions
             WHERE goal_id = $1 AND status = $2
             ORDER BY finished_at DESC NULLS LAST, created_at DESC
             LIMIT 1"
        ))
        .bind(goal_id)
        .bind(SessionStatus::Finished)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }
}
