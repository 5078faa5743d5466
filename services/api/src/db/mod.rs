//! Data Access Layer
//!
//! `DiagnosticStore` is the persistence contract of the diagnostic flow.
//! `Db` implements it on PostgreSQL; `MemoryStore` keeps everything in
//! process for tests and local development.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::Db;

use anyhow::Result;
use async_trait::async_trait;
use mentor_core::{diagnostic::ProtocolVariant, topic::TopicDraft};
use uuid::Uuid;

use crate::models::{DiagnosticSession, DiagnosticTurn, LearningGoal, NewGoal, NewTurn, Topic};

#[async_trait]
pub trait DiagnosticStore: Send + Sync {
    async fn create_goal(&self, goal: &NewGoal) -> Result<LearningGoal>;

    async fn get_goal(&self, goal_id: Uuid) -> Result<Option<LearningGoal>>;

    /// Topics of a goal in presentation order (position, then creation time).
    async fn list_topics(&self, goal_id: Uuid) -> Result<Vec<Topic>>;

    /// Appends topics after the goal's existing ones, in a single transaction.
    async fn insert_topics(&self, goal_id: Uuid, drafts: &[TopicDraft]) -> Result<Vec<Topic>>;

    /// Inserts `drafts` only if the goal has no topics yet, checking and
    /// inserting as one step. Returns the goal's topics either way.
    async fn insert_topics_if_none(
        &self,
        goal_id: Uuid,
        drafts: &[TopicDraft],
    ) -> Result<Vec<Topic>>;

    /// Returns the ACTIVE session for (goal, student), creating one if none
    /// exists. The flag is `true` when a new session was created.
    async fn create_or_resume_session(
        &self,
        goal_id: Uuid,
        student_id: &str,
        protocol: ProtocolVariant,
    ) -> Result<(DiagnosticSession, bool)>;

    /// Retrieves a session scoped to the student that owns it.
    async fn get_session(
        &self,
        session_id: Uuid,
        student_id: &str,
    ) -> Result<Option<DiagnosticSession>>;

    /// Stores all turns atomically. A turn whose (topic, question) was already
    /// answered in the session is not stored again; the existing turn is
    /// returned in its place, so the result is aligned with `turns`.
    async fn record_turns(&self, session_id: Uuid, turns: &[NewTurn])
    -> Result<Vec<DiagnosticTurn>>;

    /// All turns of a session in insertion order.
    async fn list_turns(&self, session_id: Uuid) -> Result<Vec<DiagnosticTurn>>;

    /// Moves the stepwise cursor forward by one, never past `limit`.
    async fn advance_cursor(&self, session_id: Uuid, limit: i32) -> Result<DiagnosticSession>;

    /// Marks the session FINISHED. The flag is `true` only for the call that
    /// performed the transition.
    async fn finish_session(&self, session_id: Uuid) -> Result<(DiagnosticSession, bool)>;

    /// The most recently finished session of a goal, if any.
    async fn latest_finished_session(&self, goal_id: Uuid) -> Result<Option<DiagnosticSession>>;
}
